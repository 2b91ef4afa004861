//! On-disk layout of a working directory

use std::path::{Path, PathBuf};

/// Paths the toolkit reads from and writes to, rooted at one directory
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profiles_file(&self) -> PathBuf {
        self.root.join("config").join("profiles.json")
    }

    pub fn credentials_plain(&self) -> PathBuf {
        self.root.join("config").join("credentials.json")
    }

    pub fn credentials_encrypted(&self) -> PathBuf {
        self.root.join("config").join("credentials.enc")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.root.join("data").join("cache")
    }

    pub fn reports_dir(&self) -> PathBuf {
        self.root.join("reports")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("aref.log")
    }
}

impl Default for Workspace {
    fn default() -> Self {
        Self::new(".")
    }
}
