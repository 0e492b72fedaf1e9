//! Multi-scale driver and score aggregation.
//!
//! This module ties the dispatches together: run preprocess + Stage0 on
//! the current image pair, fold the quantized DSSIM map into per-scale
//! statistics, downsample both images and repeat, then combine the
//! per-scale scores into the final result.

use std::time::Instant;

use crate::consts::{MIN_SCALE_DIM, QSCALE, SCALE_WEIGHTS};
use crate::downsample::run_downsample;
use crate::error::DssimError;
use crate::gpu::GpuContext;
use crate::image::{ImageRgba8, LinearImage};
use crate::shaders::{ShaderSet, DOWNSAMPLE_SHADER, PREPROCESS_SHADER, STAGE0_SHADER};
use crate::stage0::{run_stage0, WindowStats};

/// Options for one comparison.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompareOptions {
    /// Also read back the level-0 window statistics and retain the level-1
    /// downsampled images, for debug export.
    pub collect_intermediates: bool,
}

/// Outputs of one scale level.
#[derive(Debug, Clone)]
pub struct ScaleResult {
    /// Scale level, 0 = full resolution.
    pub level: u32,
    pub width: u32,
    pub height: u32,
    /// Quantized per-pixel DSSIM, `0..=QSCALE` each.
    pub dssim_q: Vec<u32>,
    /// Window statistics, present only when intermediates were collected
    /// (level 0 only).
    pub stats: Option<WindowStats>,
    /// Exact 64-bit sum of `dssim_q`.
    pub sum: u64,
    /// `sum / (QSCALE * w * h)`.
    pub mean_dssim: f64,
    /// Per-level score from the dispersion-from-mean formulation.
    pub ssim_score: f64,
}

/// Final multi-scale comparison result.
#[derive(Debug, Clone)]
pub struct MultiScaleResult {
    /// Produced scales, coarsest last; at least one, at most
    /// `SCALE_WEIGHTS.len()`.
    pub scales: Vec<ScaleResult>,
    /// Weighted per-scale score over the produced scales.
    pub weighted_ssim: f64,
    /// Final score: `1 / max(weighted_ssim, eps) - 1`. 0 = identical.
    pub score: f64,
    /// Level-1 downsampled inputs, retained only when intermediates were
    /// collected and a second scale was produced.
    pub level1_inputs: Option<(LinearImage, LinearImage)>,
}

impl MultiScaleResult {
    /// Number of scales actually produced.
    #[must_use]
    pub fn used_scale_count(&self) -> usize {
        self.scales.len()
    }
}

/// Per-scale statistics from a quantized DSSIM map.
///
/// Returns `(sum, mean_dssim, ssim_score)`. The sum is the exact 64-bit
/// accumulation; the score is `1 - mean(|avg - ssim_i|)` with
/// `ssim_i = 1 - 2 * q_i / qscale` and
/// `avg = max(mean(ssim), 0)^(0.5^level)`.
#[must_use]
pub fn scale_statistics(dssim_q: &[u32], qscale: u32, level: u32) -> (u64, f64, f64) {
    debug_assert!(!dssim_q.is_empty());
    let elem_count = dssim_q.len() as f64;
    let qscale_f = f64::from(qscale);

    let sum: u64 = dssim_q.iter().map(|&v| u64::from(v)).sum();
    let mean_dssim = sum as f64 / (elem_count * qscale_f);

    let ssim = |q: u32| 1.0 - 2.0 * (f64::from(q) / qscale_f);
    let mean_ssim = dssim_q.iter().map(|&q| ssim(q)).sum::<f64>() / elem_count;
    let avg = mean_ssim.max(0.0).powf(0.5f64.powi(level as i32));
    let deviation = dssim_q.iter().map(|&q| (avg - ssim(q)).abs()).sum::<f64>() / elem_count;

    (sum, mean_dssim, 1.0 - deviation)
}

/// Weighted combination of the produced scales' scores, normalized by the
/// weights actually used.
#[must_use]
pub fn weighted_ssim(scales: &[ScaleResult]) -> f64 {
    let mut weighted_sum = 0.0;
    let mut weight_total = 0.0;
    for scale in scales {
        let w = SCALE_WEIGHTS[scale.level as usize];
        weighted_sum += scale.ssim_score * w;
        weight_total += w;
    }
    weighted_sum / weight_total
}

/// Maps the weighted score to the final DSSIM-like score: 1 maps to 0,
/// smaller values grow without bound.
#[must_use]
pub fn score_from_weighted_ssim(weighted: f64) -> f64 {
    1.0 / weighted.max(f64::EPSILON) - 1.0
}

/// A ready-to-dispatch pipeline: GPU context plus the three compiled
/// shader modules. Construct once, compare many pairs.
pub struct DssimEngine {
    ctx: GpuContext,
    preprocess: wgpu::ShaderModule,
    stage0: wgpu::ShaderModule,
    downsample: wgpu::ShaderModule,
}

impl DssimEngine {
    /// Initializes the GPU and compiles the pipeline's shader modules.
    ///
    /// # Errors
    /// [`DssimError::GpuInit`] when no adapter/device is available;
    /// [`DssimError::ShaderCompile`] when a WGSL source fails validation.
    pub fn new(shaders: &ShaderSet) -> Result<Self, DssimError> {
        let ctx = GpuContext::new()?;
        let started = Instant::now();
        let preprocess = ctx.create_shader_module(PREPROCESS_SHADER, &shaders.preprocess)?;
        let stage0 = ctx.create_shader_module(STAGE0_SHADER, &shaders.stage0)?;
        let downsample = ctx.create_shader_module(DOWNSAMPLE_SHADER, &shaders.downsample)?;
        log::debug!(
            "shader modules compiled in {} ms",
            started.elapsed().as_millis()
        );
        Ok(Self {
            ctx,
            preprocess,
            stage0,
            downsample,
        })
    }

    /// Free-form description of the selected adapter.
    #[must_use]
    pub fn adapter_description(&self) -> &str {
        self.ctx.adapter_description()
    }

    /// Runs the full multi-scale pipeline on one image pair.
    ///
    /// # Errors
    /// [`DssimError::InvalidInput`] when the dimensions differ (checked
    /// before any GPU work); any GPU or dispatch error otherwise.
    pub fn compare(
        &self,
        image1: &ImageRgba8,
        image2: &ImageRgba8,
        options: &CompareOptions,
    ) -> Result<MultiScaleResult, DssimError> {
        ImageRgba8::ensure_same_dimensions(image1, image2)?;

        let mut current1 = image1.to_linear();
        let mut current2 = image2.to_linear();
        let level_count = SCALE_WEIGHTS.len() as u32;

        let mut scales: Vec<ScaleResult> = Vec::new();
        let mut level1_inputs = None;

        for level in 0..level_count {
            let read_stats = options.collect_intermediates && level == 0;
            let started = Instant::now();
            let output = run_stage0(
                &self.ctx,
                &self.preprocess,
                &self.stage0,
                &current1,
                &current2,
                read_stats,
            )?;
            let (sum, mean_dssim, ssim_score) = scale_statistics(&output.dssim_q, QSCALE, level);
            log::debug!(
                "level {level}: {}x{} sum={sum} ssim_score={ssim_score:.6} ({} ms)",
                current1.width(),
                current1.height(),
                started.elapsed().as_millis()
            );
            scales.push(ScaleResult {
                level,
                width: current1.width(),
                height: current1.height(),
                dssim_q: output.dssim_q,
                stats: output.stats,
                sum,
                mean_dssim,
                ssim_score,
            });

            if level + 1 >= level_count {
                break;
            }
            // Stop when either dimension would drop below the minimum.
            if current1.width() / 2 < MIN_SCALE_DIM || current1.height() / 2 < MIN_SCALE_DIM {
                break;
            }

            let next1 = run_downsample(&self.ctx, &self.downsample, &current1)?;
            let next2 = run_downsample(&self.ctx, &self.downsample, &current2)?;
            if level == 0 && options.collect_intermediates {
                level1_inputs = Some((next1.clone(), next2.clone()));
            }
            current1 = next1;
            current2 = next2;
        }

        let weighted = weighted_ssim(&scales);
        let score = score_from_weighted_ssim(weighted);
        Ok(MultiScaleResult {
            scales,
            weighted_ssim: weighted,
            score,
            level1_inputs,
        })
    }
}
