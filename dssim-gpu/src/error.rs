//! Error type for the DSSIM pipeline.
//!
//! Every failure aborts the whole computation; there is no retry layer and
//! no partial result. GPU resources are scoped, so all exit paths release
//! them.

use std::path::PathBuf;

/// Centralized error type for all pipeline operations.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum DssimError {
    /// Command-line usage error surfaced by callers of the library.
    #[error("invalid arguments: {0}")]
    InvalidArgs(String),

    /// Corrupt or mismatched input images.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Internal dimension mismatch detected before a dispatch was submitted.
    #[error("shape mismatch: expected {expected} elements, got {actual}")]
    InvalidShape { expected: usize, actual: usize },

    /// A shader source file was not found in any search location.
    #[error("shader file not found: {name}; searched: {}", format_searched(.searched))]
    ShaderNotFound {
        name: String,
        searched: Vec<PathBuf>,
    },

    /// A shader failed validation when compiled on the device.
    #[error("shader compilation failed for {name}: {message}")]
    ShaderCompile { name: String, message: String },

    /// Adapter or device request failed.
    #[error("GPU initialization failed: {0}")]
    GpuInit(String),

    /// Mapping a readback buffer failed.
    #[error("buffer map failed: {0}")]
    MapFailed(String),

    /// The device was lost while the pipeline was running.
    #[error("GPU device lost: {0}")]
    DeviceLost(String),

    /// A downsample would produce a zero-sized image.
    #[error("dimensions too small to downsample: {width}x{height}")]
    DimensionsTooSmall { width: u32, height: u32 },

    /// Reading or writing a file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn format_searched(searched: &[PathBuf]) -> String {
    searched
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_not_found_lists_searched_paths() {
        let err = DssimError::ShaderNotFound {
            name: "stage0_dssim.wgsl".to_string(),
            searched: vec![PathBuf::from("/a/shaders"), PathBuf::from("/b")],
        };
        let message = err.to_string();
        assert!(message.contains("stage0_dssim.wgsl"));
        assert!(message.contains("/a/shaders"));
        assert!(message.contains("/b"));
    }

    #[test]
    fn invalid_shape_reports_counts() {
        let err = DssimError::InvalidShape {
            expected: 64,
            actual: 60,
        };
        assert_eq!(err.to_string(), "shape mismatch: expected 64 elements, got 60");
    }
}
