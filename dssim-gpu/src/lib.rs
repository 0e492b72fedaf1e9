//! # dssim-gpu
//!
//! Multi-scale Structural Dissimilarity (DSSIM) between two equally sized
//! RGBA images, computed on the GPU through wgpu compute pipelines.
//!
//! The pipeline per scale level:
//! - preprocess both premultiplied linear inputs to a luma record,
//! - compute Gaussian-windowed mean/variance/covariance and per-pixel
//!   SSIM over a 5x5 window, quantized to a fixed-point `u32` DSSIM map,
//! - 2x2 box downsample and repeat on up to five scales.
//!
//! The quantized maps are summed exactly in `u64` on the host, which keeps
//! per-scale sums bit-reproducible regardless of GPU reduction order. The
//! per-scale scores are combined with fixed weights and mapped to a final
//! score where 0 means identical and larger means more different.
//!
//! ## Example
//!
//! ```no_run
//! use dssim_gpu::{CompareOptions, DssimEngine, ImageRgba8, ShaderSet};
//!
//! # fn main() -> Result<(), dssim_gpu::DssimError> {
//! let shaders = ShaderSet::resolve(&std::env::current_exe()?)?;
//! let engine = DssimEngine::new(&shaders)?;
//!
//! let a = ImageRgba8::new(4, 4, vec![128; 64])?;
//! let b = ImageRgba8::new(4, 4, vec![128; 64])?;
//! let result = engine.compare(&a, &b, &CompareOptions::default())?;
//! assert_eq!(result.score, 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Numeric contract
//!
//! The values that determine scores are fixed and documented in
//! [`consts`]: Rec. 709 luma coefficients, the binomial 5-tap window
//! `[1, 4, 6, 4, 1] / 16`, SSIM `K1 = 0.01` / `K2 = 0.03` with `L = 1`,
//! quantization scale `1e8`, clamp-to-edge windows, truncating 2x2
//! downsampling and the five scale weights. Floating-point intermediates
//! may differ between adapters; the quantized sums are exact per run.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::similar_names)]

pub mod consts;
mod diff;
mod downsample;
mod error;
mod gpu;
pub mod image;
pub mod shaders;
mod stage0;

pub use crate::diff::{
    scale_statistics, score_from_weighted_ssim, weighted_ssim, CompareOptions, DssimEngine,
    MultiScaleResult, ScaleResult,
};
pub use crate::error::DssimError;
pub use crate::image::{ImageRgba8, LinearImage, LinearRgba};
pub use crate::shaders::ShaderSet;
pub use crate::stage0::WindowStats;
