//! Constants shared by the host pipeline and the WGSL kernels.
//!
//! The window weights, SSIM constants and quantization scale are
//! contract-fixed: changing any of them changes every score this crate
//! produces. The WGSL sources carry the same values; the unit tests below
//! pin them.

// ============================================================================
// Fixed-point quantization
// ============================================================================

/// Integer scale applied to per-pixel DSSIM before rounding to `u32`.
///
/// `dssim_q = clamp(round(dssim * QSCALE), 0, QSCALE)`, so every pixel
/// contributes at most `QSCALE` to the 64-bit sum and
/// `QSCALE * w * h` never overflows `u64` for any mappable image.
pub const QSCALE: u32 = 100_000_000;

// ============================================================================
// Stage0 window
// ============================================================================

/// Half-width of the Stage0 statistics window.
pub const WINDOW_RADIUS: u32 = 2;

/// Full width of the Stage0 statistics window.
pub const WINDOW_SIZE: u32 = WINDOW_RADIUS * 2 + 1;

/// Separable 1-D window weights: the binomial `[1, 4, 6, 4, 1] / 16`,
/// equal to the `[1, 2, 1] / 4` blur kernel convolved with itself.
/// The 2-D outer product sums to 1.
pub const WINDOW_WEIGHTS: [f32; WINDOW_SIZE as usize] = [0.0625, 0.25, 0.375, 0.25, 0.0625];

// ============================================================================
// SSIM constants
// ============================================================================

/// SSIM `K1` stabilizer factor.
pub const SSIM_K1: f64 = 0.01;
/// SSIM `K2` stabilizer factor.
pub const SSIM_K2: f64 = 0.03;
/// Dynamic range of the luma channel (normalized input).
pub const SSIM_L: f64 = 1.0;
/// SSIM `C1 = (K1 * L)^2`.
pub const SSIM_C1: f64 = (SSIM_K1 * SSIM_L) * (SSIM_K1 * SSIM_L);
/// SSIM `C2 = (K2 * L)^2`.
pub const SSIM_C2: f64 = (SSIM_K2 * SSIM_L) * (SSIM_K2 * SSIM_L);

// ============================================================================
// Luma
// ============================================================================

/// Rec. 709 luma coefficients applied to the premultiplied linear channels.
/// These determine every downstream score and must match the preprocess
/// kernel.
pub const LUMA_COEFFS: [f32; 3] = [0.2126, 0.7152, 0.0722];

// ============================================================================
// Multi-scale driver
// ============================================================================

/// Per-level weights of the multi-scale aggregation. The level count is
/// fixed at the length of this array.
pub const SCALE_WEIGHTS: [f64; 5] = [0.028, 0.197, 0.322, 0.298, 0.155];

/// Smallest dimension a scale level may have. Downsampling stops when
/// either output dimension would drop below this.
pub const MIN_SCALE_DIM: u32 = 8;

// ============================================================================
// Dispatch geometry
// ============================================================================

/// Workgroup size of every kernel; dispatches are 1-D grids of
/// `ceil(n / WORKGROUP_SIZE)` groups.
pub const WORKGROUP_SIZE: u32 = 64;
