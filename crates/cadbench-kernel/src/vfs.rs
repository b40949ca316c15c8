//! In-memory virtual filesystem shared by kernel writers.

use crate::error::{KernelError, Result};
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Flat path-to-bytes store.
#[derive(Debug, Default)]
pub struct VirtualFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl VirtualFs {
    /// Create an empty filesystem.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create or overwrite a file.
    pub fn write_file(&self, path: &str, bytes: Vec<u8>) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.to_string(), bytes);
    }

    /// Read a file's contents.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| KernelError::FileNotFound(path.to_string()))
    }

    /// Remove a file. Returns whether it existed.
    pub fn unlink(&self, path: &str) -> bool {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(path)
            .is_some()
    }

    /// Whether a file exists.
    pub fn exists(&self, path: &str) -> bool {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }

    /// All paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}
