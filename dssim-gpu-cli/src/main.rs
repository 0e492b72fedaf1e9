//! dssim-gpu CLI - GPU multi-scale DSSIM between two PNG images.
//!
//! Prints `<score>\t<image2-path>` on stdout; a score of 0.00000000 means
//! the images are identical. Optionally writes a JSON report and raw
//! pipeline tensors for offline inspection.

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use dssim_gpu::{CompareOptions, DssimEngine, DssimError, ImageRgba8, ShaderSet};

mod dump;
mod report;

/// GPU multi-scale DSSIM perceptual image comparison
///
/// Computes a structural-dissimilarity score between two equally sized
/// images on the GPU. Lower scores mean more similar; 0 means identical.
#[derive(Parser, Debug)]
#[command(name = "dssim-gpu")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// First image (reference)
    #[arg(value_name = "IMAGE1")]
    image1: PathBuf,

    /// Second image (compared)
    #[arg(value_name = "IMAGE2")]
    image2: PathBuf,

    /// Write a JSON report to this path
    #[arg(long, value_name = "JSON-PATH")]
    out: Option<PathBuf>,

    /// Dump raw pipeline tensors (little-endian) into this directory
    #[arg(long, value_name = "DIR")]
    debug_dump_dir: Option<PathBuf>,
}

fn main() -> ExitCode {
    env_logger::init();
    setup_colors();
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}: {e:#}", "error".red().bold());
            ExitCode::FAILURE
        }
    }
}

/// Disable colors when stderr isn't a terminal, so redirected diagnostics
/// don't carry escape codes.
fn setup_colors() {
    if !std::io::stderr().is_terminal() {
        colored::control::set_override(false);
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(dir) = &cli.debug_dump_dir {
        if dir.as_os_str().is_empty() {
            return Err(DssimError::InvalidArgs("empty --debug-dump-dir".to_string()).into());
        }
    }

    let image1 = load_png(&cli.image1)?;
    let image2 = load_png(&cli.image2)?;
    ImageRgba8::ensure_same_dimensions(&image1, &image2)?;
    log::debug!(
        "decoded {}x{} rgba8 inputs ({} bytes each)",
        image1.width(),
        image1.height(),
        image1.pixels().len()
    );

    let exe = std::env::current_exe().context("failed to locate executable")?;
    let shaders = ShaderSet::resolve(&exe)?;
    let engine = DssimEngine::new(&shaders)?;

    let options = CompareOptions {
        collect_intermediates: cli.debug_dump_dir.is_some(),
    };
    let result = engine.compare(&image1, &image2, &options)?;
    log::debug!(
        "score {:.8} from {} scale(s) on {}",
        result.score,
        result.used_scale_count(),
        engine.adapter_description()
    );

    let dumps = match &cli.debug_dump_dir {
        Some(dir) => Some(dump::write_dumps(dir, &image1, &image2, &result)?),
        None => None,
    };

    if let Some(out) = &cli.out {
        report::write_report(
            out,
            cli,
            &image1,
            &image2,
            &result,
            engine.adapter_description(),
            dumps.as_ref(),
        )?;
    }

    println!("{:.8}\t{}", result.score, cli.image2.display());
    Ok(())
}

fn load_png(path: &Path) -> Result<ImageRgba8> {
    let img = image::open(path).with_context(|| format!("failed to load '{}'", path.display()))?;
    let rgba = img.to_rgba8();
    let (width, height) = rgba.dimensions();
    Ok(ImageRgba8::new(width, height, rgba.into_raw())?)
}

/// Absolute form of `path` without requiring it to exist.
pub(crate) fn absolute(path: &Path) -> PathBuf {
    std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf())
}
