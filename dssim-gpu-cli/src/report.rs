//! JSON report of a comparison run.
//!
//! One object per run: inputs, decoded shapes, the reconstructed command
//! line, per-scale results, aggregation and the adapter. `score_bits_u64`
//! carries the IEEE-754 bits of the score as 0x-prefixed big-endian hex so
//! two reports can be compared bit-exactly.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use dssim_gpu::consts::{QSCALE, SCALE_WEIGHTS, WINDOW_RADIUS, WINDOW_SIZE};
use dssim_gpu::{ImageRgba8, MultiScaleResult};
use serde::Serialize;

use crate::dump::DumpManifest;
use crate::{absolute, Cli};

/// Identifies the pipeline variant producing the scores.
pub const ENGINE_ID: &str = "gpu-wgpu-wgsl-dssim-ms-stage5x5-gaussian-linear";
/// Engine version tag.
pub const VERSION_TAG: &str = "wgpu-dssim-ms-stage5x5-gaussian-linear-1";

const METRIC: &str = "dssim_5x5_gaussian_luma_linear";
const WINDOW_TYPE: &str = "gaussian_blur_kernel_x2";
const AGGREGATION_METHOD: &str = "reference_like_weighted_ssim_to_dssim";

#[derive(Serialize)]
struct Report<'a> {
    schema_version: u32,
    engine: &'static str,
    status: &'static str,
    input: InputPaths,
    decoded_input: DecodedInputs,
    command: String,
    version: &'static str,
    result: ResultBlock,
    adapter: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug_dumps: Option<&'a DumpManifest>,
}

#[derive(Serialize)]
struct InputPaths {
    image1: String,
    image2: String,
}

#[derive(Serialize)]
struct DecodedInputs {
    image1: DecodedInput,
    image2: DecodedInput,
}

#[derive(Serialize)]
struct DecodedInput {
    width: u32,
    height: u32,
    channels: u32,
    bytes: usize,
}

#[derive(Serialize)]
struct ResultBlock {
    score_text: String,
    score_f64: f64,
    score_bits_u64: String,
    compared_path: String,
    gpu_scales: Vec<ScaleBlock>,
    aggregation: Aggregation,
}

#[derive(Serialize)]
struct ScaleBlock {
    level: u32,
    width: u32,
    height: u32,
    metric: &'static str,
    window_radius: u32,
    window_size: u32,
    window_type: &'static str,
    qscale: u32,
    weight: f64,
    sum_u64: u64,
    elem_count: usize,
    mean_dssim_f64: f64,
    ssim_score_f64: f64,
}

#[derive(Serialize)]
struct Aggregation {
    method: &'static str,
    used_scale_count: usize,
    weighted_ssim_f64: f64,
}

fn decoded_input(image: &ImageRgba8) -> DecodedInput {
    DecodedInput {
        width: image.width(),
        height: image.height(),
        channels: image.channels(),
        bytes: image.pixels().len(),
    }
}

fn reconstruct_command(cli: &Cli) -> String {
    let mut command = format!(
        "dssim-gpu \"{}\" \"{}\"",
        absolute(&cli.image1).display(),
        absolute(&cli.image2).display()
    );
    if let Some(out) = &cli.out {
        command.push_str(&format!(" --out \"{}\"", absolute(out).display()));
    }
    if let Some(dir) = &cli.debug_dump_dir {
        command.push_str(&format!(" --debug-dump-dir \"{}\"", absolute(dir).display()));
    }
    command
}

fn build_report<'a>(
    cli: &Cli,
    image1: &ImageRgba8,
    image2: &ImageRgba8,
    result: &MultiScaleResult,
    adapter: &'a str,
    dumps: Option<&'a DumpManifest>,
) -> Report<'a> {
    let gpu_scales = result
        .scales
        .iter()
        .map(|scale| ScaleBlock {
            level: scale.level,
            width: scale.width,
            height: scale.height,
            metric: METRIC,
            window_radius: WINDOW_RADIUS,
            window_size: WINDOW_SIZE,
            window_type: WINDOW_TYPE,
            qscale: QSCALE,
            weight: SCALE_WEIGHTS[scale.level as usize],
            sum_u64: scale.sum,
            elem_count: scale.dssim_q.len(),
            mean_dssim_f64: scale.mean_dssim,
            ssim_score_f64: scale.ssim_score,
        })
        .collect();

    Report {
        schema_version: 1,
        engine: ENGINE_ID,
        status: "ok",
        input: InputPaths {
            image1: absolute(&cli.image1).display().to_string(),
            image2: absolute(&cli.image2).display().to_string(),
        },
        decoded_input: DecodedInputs {
            image1: decoded_input(image1),
            image2: decoded_input(image2),
        },
        command: reconstruct_command(cli),
        version: VERSION_TAG,
        result: ResultBlock {
            score_text: format!("{:.8}", result.score),
            score_f64: result.score,
            score_bits_u64: format!("0x{:016X}", result.score.to_bits()),
            compared_path: absolute(&cli.image2).display().to_string(),
            gpu_scales,
            aggregation: Aggregation {
                method: AGGREGATION_METHOD,
                used_scale_count: result.used_scale_count(),
                weighted_ssim_f64: result.weighted_ssim,
            },
        },
        adapter,
        debug_dumps: dumps,
    }
}

/// Serializes the report and writes it to `out`.
pub fn write_report(
    out: &Path,
    cli: &Cli,
    image1: &ImageRgba8,
    image2: &ImageRgba8,
    result: &MultiScaleResult,
    adapter: &str,
    dumps: Option<&DumpManifest>,
) -> Result<()> {
    let report = build_report(cli, image1, image2, result, adapter, dumps);
    let json =
        serde_json::to_string_pretty(&report).context("failed to serialize JSON report")?;
    if let Some(parent) = out.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create '{}'", parent.display()))?;
        }
    }
    fs::write(out, json + "\n")
        .with_context(|| format!("failed to write report '{}'", out.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dssim_gpu::ScaleResult;
    use std::path::PathBuf;

    fn fixture() -> (Cli, ImageRgba8, MultiScaleResult) {
        let cli = Cli {
            image1: PathBuf::from("a.png"),
            image2: PathBuf::from("b.png"),
            out: Some(PathBuf::from("report.json")),
            debug_dump_dir: None,
        };
        let image = ImageRgba8::new(4, 4, vec![128; 64]).unwrap();
        let result = MultiScaleResult {
            scales: vec![ScaleResult {
                level: 0,
                width: 4,
                height: 4,
                dssim_q: vec![0; 16],
                stats: None,
                sum: 0,
                mean_dssim: 0.0,
                ssim_score: 1.0,
            }],
            weighted_ssim: 1.0,
            score: 0.0,
            level1_inputs: None,
        };
        (cli, image, result)
    }

    #[test]
    fn report_shape_matches_schema() {
        let (cli, image, result) = fixture();
        let report = build_report(&cli, &image, &image, &result, "test adapter", None);
        let value = serde_json::to_value(&report).unwrap();

        assert_eq!(value["schema_version"], 1);
        assert_eq!(value["status"], "ok");
        assert_eq!(value["engine"], ENGINE_ID);
        assert_eq!(value["version"], VERSION_TAG);
        assert_eq!(value["decoded_input"]["image1"]["channels"], 4);
        assert_eq!(value["decoded_input"]["image2"]["bytes"], 64);
        assert_eq!(value["result"]["score_text"], "0.00000000");
        assert_eq!(value["result"]["gpu_scales"][0]["window_radius"], 2);
        assert_eq!(value["result"]["gpu_scales"][0]["window_size"], 5);
        assert_eq!(value["result"]["gpu_scales"][0]["qscale"], 100_000_000);
        assert_eq!(value["result"]["aggregation"]["used_scale_count"], 1);
        assert!(value["command"].as_str().unwrap().starts_with("dssim-gpu \""));
        assert!(value.get("debug_dumps").is_none());
    }

    #[test]
    fn score_bits_round_trip() {
        let (cli, image, mut result) = fixture();
        result.score = 0.123_456_789_012_345;
        let report = build_report(&cli, &image, &image, &result, "adapter", None);
        let value = serde_json::to_value(&report).unwrap();

        let bits_text = value["result"]["score_bits_u64"].as_str().unwrap();
        assert!(bits_text.starts_with("0x"));
        let bits = u64::from_str_radix(&bits_text[2..], 16).unwrap();
        let decoded = f64::from_bits(bits);
        assert_eq!(decoded, result.score);
        assert_eq!(decoded, value["result"]["score_f64"].as_f64().unwrap());
    }

    #[test]
    fn per_scale_weights_follow_level() {
        let (cli, image, mut result) = fixture();
        result.scales.push(ScaleResult {
            level: 1,
            width: 2,
            height: 2,
            dssim_q: vec![0; 4],
            stats: None,
            sum: 0,
            mean_dssim: 0.0,
            ssim_score: 1.0,
        });
        let report = build_report(&cli, &image, &image, &result, "adapter", None);
        let value = serde_json::to_value(&report).unwrap();
        let weight0 = value["result"]["gpu_scales"][0]["weight"].as_f64().unwrap();
        let weight1 = value["result"]["gpu_scales"][1]["weight"].as_f64().unwrap();
        assert!((weight0 - 0.028).abs() < 1e-12);
        assert!((weight1 - 0.197).abs() < 1e-12);
    }
}
