//! Debug exporter: raw pipeline tensors as little-endian binary blobs.
//!
//! Writes the original 8-bit inputs, the level-0 DSSIM map and window
//! statistics, and (when a second scale was produced) the re-encoded
//! level-1 images plus the level-1 DSSIM map. Refuses to export an empty
//! tensor.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use dssim_gpu::{ImageRgba8, MultiScaleResult};
use serde::Serialize;

/// One dumped tensor, as referenced from the JSON report.
#[derive(Debug, Serialize)]
pub struct DumpEntry {
    pub path: String,
    pub elem_type: &'static str,
    pub elem_count: usize,
}

/// Manifest of everything written into the dump directory.
#[derive(Debug, Serialize)]
pub struct DumpManifest {
    pub image1_rgba8: DumpEntry,
    pub image2_rgba8: DumpEntry,
    pub stage0_dssim5x5_gaussian_linear_u32le: DumpEntry,
    pub stage0_mu1_f32le: DumpEntry,
    pub stage0_mu2_f32le: DumpEntry,
    pub stage0_var1_f32le: DumpEntry,
    pub stage0_var2_f32le: DumpEntry,
    pub stage0_cov12_f32le: DumpEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image1_scale1_rgba8: Option<DumpEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image2_scale1_rgba8: Option<DumpEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stage1_dssim5x5_gaussian_linear_u32le: Option<DumpEntry>,
}

fn entry(path: &Path, elem_type: &'static str, elem_count: usize) -> DumpEntry {
    DumpEntry {
        path: crate::absolute(path).display().to_string(),
        elem_type,
        elem_count,
    }
}

fn write_u8(path: &Path, name: &str, values: &[u8]) -> Result<()> {
    if values.is_empty() {
        bail!("debug dump tensor {name} is empty");
    }
    fs::write(path, values).with_context(|| format!("failed to write '{}'", path.display()))
}

fn write_u32_le(path: &Path, name: &str, values: &[u32]) -> Result<()> {
    if values.is_empty() {
        bail!("debug dump tensor {name} is empty");
    }
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))
}

fn write_f32_le(path: &Path, name: &str, values: &[f32]) -> Result<()> {
    if values.is_empty() {
        bail!("debug dump tensor {name} is empty");
    }
    let mut bytes = Vec::with_capacity(values.len() * 4);
    for v in values {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    fs::write(path, bytes).with_context(|| format!("failed to write '{}'", path.display()))
}

/// Writes every dump file into `dir` and returns the manifest for the
/// JSON report.
///
/// # Errors
/// Fails when the comparison did not collect intermediates, when any
/// claimed tensor is empty, or on I/O errors. Nothing is retried.
pub fn write_dumps(
    dir: &Path,
    image1: &ImageRgba8,
    image2: &ImageRgba8,
    result: &MultiScaleResult,
) -> Result<DumpManifest> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create dump directory '{}'", dir.display()))?;

    let scale0 = result
        .scales
        .first()
        .context("no scales produced; nothing to dump")?;
    let stats = scale0
        .stats
        .as_ref()
        .context("level-0 window statistics were not collected")?;
    let elem_count = scale0.dssim_q.len();

    let image1_path = dir.join("image1_rgba8.gpu.bin");
    let image2_path = dir.join("image2_rgba8.gpu.bin");
    let dssim0_path = dir.join("stage0_dssim5x5_gaussian_linear_u32le.gpu.bin");
    let mu1_path = dir.join("stage0_mu1_f32le.gpu.bin");
    let mu2_path = dir.join("stage0_mu2_f32le.gpu.bin");
    let var1_path = dir.join("stage0_var1_f32le.gpu.bin");
    let var2_path = dir.join("stage0_var2_f32le.gpu.bin");
    let cov12_path = dir.join("stage0_cov12_f32le.gpu.bin");

    write_u8(&image1_path, "image1_rgba8", image1.pixels())?;
    write_u8(&image2_path, "image2_rgba8", image2.pixels())?;
    write_u32_le(&dssim0_path, "stage0_dssim", &scale0.dssim_q)?;
    write_f32_le(&mu1_path, "stage0_mu1", &stats.mu1)?;
    write_f32_le(&mu2_path, "stage0_mu2", &stats.mu2)?;
    write_f32_le(&var1_path, "stage0_var1", &stats.var1)?;
    write_f32_le(&var2_path, "stage0_var2", &stats.var2)?;
    write_f32_le(&cov12_path, "stage0_cov12", &stats.cov12)?;

    let mut manifest = DumpManifest {
        image1_rgba8: entry(&image1_path, "u8", image1.pixels().len()),
        image2_rgba8: entry(&image2_path, "u8", image2.pixels().len()),
        stage0_dssim5x5_gaussian_linear_u32le: entry(&dssim0_path, "u32_le", elem_count),
        stage0_mu1_f32le: entry(&mu1_path, "f32_le", elem_count),
        stage0_mu2_f32le: entry(&mu2_path, "f32_le", elem_count),
        stage0_var1_f32le: entry(&var1_path, "f32_le", elem_count),
        stage0_var2_f32le: entry(&var2_path, "f32_le", elem_count),
        stage0_cov12_f32le: entry(&cov12_path, "f32_le", elem_count),
        image1_scale1_rgba8: None,
        image2_scale1_rgba8: None,
        stage1_dssim5x5_gaussian_linear_u32le: None,
    };

    if let (Some(scale1), Some((down1, down2))) =
        (result.scales.get(1), result.level1_inputs.as_ref())
    {
        let image1_scale1_path = dir.join("image1_scale1_rgba8.gpu.bin");
        let image2_scale1_path = dir.join("image2_scale1_rgba8.gpu.bin");
        let dssim1_path = dir.join("stage1_dssim5x5_gaussian_linear_u32le.gpu.bin");

        let rgba1 = down1.to_rgba8();
        let rgba2 = down2.to_rgba8();
        write_u8(&image1_scale1_path, "image1_scale1_rgba8", rgba1.pixels())?;
        write_u8(&image2_scale1_path, "image2_scale1_rgba8", rgba2.pixels())?;
        write_u32_le(&dssim1_path, "stage1_dssim", &scale1.dssim_q)?;

        manifest.image1_scale1_rgba8 =
            Some(entry(&image1_scale1_path, "u8", rgba1.pixels().len()));
        manifest.image2_scale1_rgba8 =
            Some(entry(&image2_scale1_path, "u8", rgba2.pixels().len()));
        manifest.stage1_dssim5x5_gaussian_linear_u32le =
            Some(entry(&dssim1_path, "u32_le", scale1.dssim_q.len()));
    }

    Ok(manifest)
}

#[cfg(test)]
mod tests {
    use super::*;
    use dssim_gpu::{LinearImage, LinearRgba, MultiScaleResult, ScaleResult, WindowStats};
    use std::path::PathBuf;

    struct TempDir {
        root: PathBuf,
    }

    impl TempDir {
        fn new(tag: &str) -> Self {
            let root =
                std::env::temp_dir().join(format!("dssim-dump-{tag}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(&root).unwrap();
            Self { root }
        }
    }

    impl Drop for TempDir {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    fn synthetic_result(with_stats: bool, with_level1: bool) -> MultiScaleResult {
        let elem_count = 16;
        let stats = with_stats.then(|| WindowStats {
            mu1: vec![0.25; elem_count],
            mu2: vec![0.5; elem_count],
            var1: vec![0.01; elem_count],
            var2: vec![0.02; elem_count],
            cov12: vec![0.005; elem_count],
        });
        let mut scales = vec![ScaleResult {
            level: 0,
            width: 4,
            height: 4,
            dssim_q: vec![7; elem_count],
            stats,
            sum: 7 * elem_count as u64,
            mean_dssim: 0.0,
            ssim_score: 1.0,
        }];
        let level1_inputs = if with_level1 {
            scales.push(ScaleResult {
                level: 1,
                width: 2,
                height: 2,
                dssim_q: vec![1, 2, 3, 4],
                stats: None,
                sum: 10,
                mean_dssim: 0.0,
                ssim_score: 1.0,
            });
            let gray = LinearRgba {
                r: 0.5,
                g: 0.5,
                b: 0.5,
                a: 1.0,
            };
            Some((
                LinearImage::from_pixels(2, 2, vec![gray; 4]),
                LinearImage::from_pixels(2, 2, vec![gray; 4]),
            ))
        } else {
            None
        };
        MultiScaleResult {
            scales,
            weighted_ssim: 1.0,
            score: 0.0,
            level1_inputs,
        }
    }

    fn image_4x4() -> ImageRgba8 {
        ImageRgba8::new(4, 4, vec![128; 64]).unwrap()
    }

    #[test]
    fn writes_level0_tensors_little_endian() {
        let tmp = TempDir::new("level0");
        let result = synthetic_result(true, false);
        let manifest = write_dumps(&tmp.root, &image_4x4(), &image_4x4(), &result).unwrap();

        let dssim = fs::read(tmp.root.join("stage0_dssim5x5_gaussian_linear_u32le.gpu.bin")).unwrap();
        assert_eq!(dssim.len(), 16 * 4);
        assert_eq!(&dssim[..4], &7u32.to_le_bytes());

        let mu1 = fs::read(tmp.root.join("stage0_mu1_f32le.gpu.bin")).unwrap();
        assert_eq!(&mu1[..4], &0.25f32.to_le_bytes());

        assert_eq!(manifest.stage0_dssim5x5_gaussian_linear_u32le.elem_count, 16);
        assert_eq!(manifest.image1_rgba8.elem_count, 64);
        assert!(manifest.stage1_dssim5x5_gaussian_linear_u32le.is_none());
    }

    #[test]
    fn writes_level1_when_present() {
        let tmp = TempDir::new("level1");
        let result = synthetic_result(true, true);
        let manifest = write_dumps(&tmp.root, &image_4x4(), &image_4x4(), &result).unwrap();

        let scale1 = manifest.image1_scale1_rgba8.unwrap();
        assert_eq!(scale1.elem_count, 2 * 2 * 4);
        assert!(tmp.root.join("stage1_dssim5x5_gaussian_linear_u32le.gpu.bin").exists());

        // Re-encoded gray at full alpha: 0.5 linear -> 188 sRGB.
        let bytes = fs::read(tmp.root.join("image1_scale1_rgba8.gpu.bin")).unwrap();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[3], 255);
    }

    #[test]
    fn refuses_missing_stats() {
        let tmp = TempDir::new("nostats");
        let result = synthetic_result(false, false);
        let err = write_dumps(&tmp.root, &image_4x4(), &image_4x4(), &result).unwrap_err();
        assert!(err.to_string().contains("statistics"));
    }

    #[test]
    fn refuses_empty_tensor() {
        let tmp = TempDir::new("empty");
        let mut result = synthetic_result(true, false);
        result.scales[0].dssim_q.clear();
        let err = write_dumps(&tmp.root, &image_4x4(), &image_4x4(), &result).unwrap_err();
        assert!(err.to_string().contains("empty"));
    }
}
