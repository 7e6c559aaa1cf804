use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Resolve the data directory from, in order of priority:
    /// 1. An explicit path (from --data-dir)
    /// 2. The DERLEM_DATA_DIR environment variable
    /// 3. The XDG data directory (~/.local/share/derlem/)
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        let root = if let Some(path) = explicit {
            path.to_path_buf()
        } else if let Ok(val) = std::env::var("DERLEM_DATA_DIR") {
            PathBuf::from(val)
        } else {
            xdg::BaseDirectories::with_prefix("derlem")
                .get_data_home()
                .ok_or_else(|| {
                    Error::Config(
                        "could not determine XDG data home directory".into(),
                    )
                })?
        };

        std::fs::create_dir_all(&root)
            .map_err(|_| Error::DataDir(root.clone()))?;

        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the index store for one provider+model pair.
    ///
    /// Each combination gets its own store so switching models never mixes
    /// vectors of different dimensionality.
    pub fn store_dir(&self, provider: &str, model: &str) -> PathBuf {
        let model = model.replace('/', "_");
        self.root.join(format!("{provider}_{model}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_with_explicit_path() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(dir.root(), tmp.path());
    }

    #[test]
    fn store_dir_per_provider_and_model() {
        let tmp = tempfile::tempdir().unwrap();
        let dir = DataDir::resolve(Some(tmp.path())).unwrap();

        assert_eq!(
            dir.store_dir("openai", "text-embedding-3-small"),
            tmp.path().join("openai_text-embedding-3-small")
        );
        // Slashes in model IDs must not create nested directories.
        assert_eq!(
            dir.store_dir("local", "intfloat/multilingual-e5-large"),
            tmp.path().join("local_intfloat_multilingual-e5-large")
        );
    }
}
