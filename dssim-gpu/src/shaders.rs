//! Shader source resolution and loading.
//!
//! The three WGSL programs are shipped as files and resolved at startup by
//! searching, in order: `<exe-dir>/shaders/`, `<exe-dir>/`,
//! `<cwd>/src_gpu/shaders/`, `<cwd>/build/src_gpu/shaders/`. Sources are
//! read once and reused for every dispatch.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::DssimError;

/// File name of the preprocess kernel.
pub const PREPROCESS_SHADER: &str = "preprocess_luma.wgsl";
/// File name of the Stage0 window-statistics/DSSIM kernel.
pub const STAGE0_SHADER: &str = "stage0_dssim.wgsl";
/// File name of the 2x2 downsample kernel.
pub const DOWNSAMPLE_SHADER: &str = "downsample_2x2.wgsl";

/// The WGSL sources of the whole pipeline, loaded once at startup.
#[derive(Debug, Clone)]
pub struct ShaderSet {
    pub preprocess: String,
    pub stage0: String,
    pub downsample: String,
}

impl ShaderSet {
    /// Resolves and reads all three shaders relative to the executable at
    /// `exe_path` and the current working directory.
    ///
    /// # Errors
    /// [`DssimError::ShaderNotFound`] when a shader is missing from every
    /// search location; [`DssimError::Io`] when a found file cannot be
    /// read.
    pub fn resolve(exe_path: &Path) -> Result<Self, DssimError> {
        let exe_dir = exe_path.parent().unwrap_or_else(|| Path::new("."));
        let cwd = std::env::current_dir()?;
        Ok(Self {
            preprocess: read_source(&resolve_one(exe_dir, &cwd, PREPROCESS_SHADER)?)?,
            stage0: read_source(&resolve_one(exe_dir, &cwd, STAGE0_SHADER)?)?,
            downsample: read_source(&resolve_one(exe_dir, &cwd, DOWNSAMPLE_SHADER)?)?,
        })
    }

    /// Reads all three shaders from one directory. Intended for tests and
    /// embedders that manage shader placement themselves.
    ///
    /// # Errors
    /// [`DssimError::ShaderNotFound`] when a shader is missing from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Self, DssimError> {
        let load = |name: &str| -> Result<String, DssimError> {
            let path = dir.join(name);
            if !path.exists() {
                return Err(DssimError::ShaderNotFound {
                    name: name.to_string(),
                    searched: vec![path],
                });
            }
            read_source(&path)
        };
        Ok(Self {
            preprocess: load(PREPROCESS_SHADER)?,
            stage0: load(STAGE0_SHADER)?,
            downsample: load(DOWNSAMPLE_SHADER)?,
        })
    }
}

fn candidates(exe_dir: &Path, cwd: &Path, name: &str) -> [PathBuf; 4] {
    [
        exe_dir.join("shaders").join(name),
        exe_dir.join(name),
        cwd.join("src_gpu").join("shaders").join(name),
        cwd.join("build").join("src_gpu").join("shaders").join(name),
    ]
}

fn resolve_one(exe_dir: &Path, cwd: &Path, name: &str) -> Result<PathBuf, DssimError> {
    let searched = candidates(exe_dir, cwd, name);
    for candidate in &searched {
        if candidate.exists() {
            log::debug!("shader {name} resolved to {}", candidate.display());
            return Ok(candidate.clone());
        }
    }
    Err(DssimError::ShaderNotFound {
        name: name.to_string(),
        searched: searched.to_vec(),
    })
}

fn read_source(path: &Path) -> Result<String, DssimError> {
    Ok(fs::read_to_string(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TempTree {
        root: PathBuf,
    }

    impl TempTree {
        fn new(tag: &str) -> Self {
            let root = std::env::temp_dir().join(format!("dssim-shaders-{tag}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&root);
            fs::create_dir_all(&root).unwrap();
            Self { root }
        }
    }

    impl Drop for TempTree {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.root);
        }
    }

    #[test]
    fn exe_shaders_dir_wins_over_exe_dir() {
        let tmp = TempTree::new("order");
        let exe_dir = tmp.root.join("bin");
        fs::create_dir_all(exe_dir.join("shaders")).unwrap();
        fs::write(exe_dir.join("shaders").join(STAGE0_SHADER), "first").unwrap();
        fs::write(exe_dir.join(STAGE0_SHADER), "second").unwrap();

        let found = resolve_one(&exe_dir, &tmp.root, STAGE0_SHADER).unwrap();
        assert_eq!(found, exe_dir.join("shaders").join(STAGE0_SHADER));
    }

    #[test]
    fn falls_back_to_cwd_src_gpu() {
        let tmp = TempTree::new("cwd");
        let exe_dir = tmp.root.join("bin");
        fs::create_dir_all(&exe_dir).unwrap();
        let shader_dir = tmp.root.join("src_gpu").join("shaders");
        fs::create_dir_all(&shader_dir).unwrap();
        fs::write(shader_dir.join(DOWNSAMPLE_SHADER), "x").unwrap();

        let found = resolve_one(&exe_dir, &tmp.root, DOWNSAMPLE_SHADER).unwrap();
        assert_eq!(found, shader_dir.join(DOWNSAMPLE_SHADER));
    }

    #[test]
    fn missing_shader_reports_every_candidate() {
        let tmp = TempTree::new("missing");
        let exe_dir = tmp.root.join("bin");
        fs::create_dir_all(&exe_dir).unwrap();

        let err = resolve_one(&exe_dir, &tmp.root, PREPROCESS_SHADER).unwrap_err();
        match err {
            DssimError::ShaderNotFound { name, searched } => {
                assert_eq!(name, PREPROCESS_SHADER);
                assert_eq!(searched.len(), 4);
            }
            other => panic!("expected ShaderNotFound, got {other:?}"),
        }
    }

    #[test]
    fn load_from_dir_reads_repo_shaders() {
        // The workspace ships the canonical sources under src_gpu/shaders.
        let dir = Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("..")
            .join("src_gpu")
            .join("shaders");
        let set = ShaderSet::load_from_dir(&dir).unwrap();
        assert!(set.preprocess.contains("@compute"));
        assert!(set.stage0.contains("dssim_q"));
        assert!(set.downsample.contains("out_width"));
    }
}
