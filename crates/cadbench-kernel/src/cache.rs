//! Kernel loading and the process-wide caches.
//!
//! Loading a kernel means reading its asset files (the compiled module and
//! data tables a heavyweight kernel would need) and constructing the
//! instance. Asset bytes live in an [`AssetCache`] that a warmup task can
//! fill ahead of time; the instance itself lives in a [`KernelCache`] that
//! loads at most once no matter how many tasks ask concurrently.

use crate::error::{KernelError, Result};
use crate::Kernel;
use std::collections::HashMap;
use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use tokio::sync::OnceCell;

static ASSET_CACHE: OnceLock<AssetCache> = OnceLock::new();
static KERNEL_CACHE: OnceLock<KernelCache> = OnceLock::new();

/// Where the kernel's asset files are found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KernelOptions {
    /// Directory holding the assets. `None` means the kernel needs no assets.
    pub asset_dir: Option<PathBuf>,
    /// Asset file names relative to `asset_dir`.
    pub assets: Vec<String>,
}

impl KernelOptions {
    /// Full paths of every asset.
    pub fn asset_paths(&self) -> Vec<PathBuf> {
        match &self.asset_dir {
            Some(dir) => self.assets.iter().map(|a| dir.join(a)).collect(),
            None => Vec::new(),
        }
    }
}

/// Fetched asset bytes keyed by path.
#[derive(Debug, Default)]
pub struct AssetCache {
    entries: RwLock<HashMap<PathBuf, Arc<[u8]>>>,
}

impl AssetCache {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache shared by warmup and kernel loading.
    pub fn global() -> &'static AssetCache {
        ASSET_CACHE.get_or_init(AssetCache::new)
    }

    /// Cached bytes for `path`.
    pub fn get(&self, path: &std::path::Path) -> Option<Arc<[u8]>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
    }

    /// Whether `path` is cached.
    pub fn contains(&self, path: &std::path::Path) -> bool {
        self.get(path).is_some()
    }

    /// Number of cached assets.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read every asset in `options` that is not cached yet.
    ///
    /// Missing or empty files are load errors. Returns the number of assets
    /// read from disk.
    pub async fn prefetch(&self, options: &KernelOptions) -> Result<usize> {
        let mut fetched = 0;
        for path in options.asset_paths() {
            if self.contains(&path) {
                continue;
            }
            let bytes = tokio::fs::read(&path)
                .await
                .map_err(|e| KernelError::Load(format!("{}: {e}", path.display())))?;
            if bytes.is_empty() {
                return Err(KernelError::Load(format!("{}: empty asset", path.display())));
            }
            tracing::debug!(path = %path.display(), bytes = bytes.len(), "asset fetched");
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(path, Arc::from(bytes));
            fetched += 1;
        }
        Ok(fetched)
    }
}

impl Kernel {
    /// Load a kernel: make sure all assets are in `assets`, then construct it.
    pub async fn boot(options: &KernelOptions, assets: &AssetCache) -> Result<Kernel> {
        let fetched = assets.prefetch(options).await?;
        tracing::info!(
            assets = options.assets.len(),
            fetched,
            "geometry kernel loaded"
        );
        Ok(Kernel::new())
    }
}

/// Load-once holder for a shared kernel instance.
#[derive(Debug, Default)]
pub struct KernelCache {
    cell: OnceCell<Arc<Kernel>>,
    loads: AtomicUsize,
}

impl KernelCache {
    /// An empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// The loaded kernel, loading it with `options` if needed.
    ///
    /// Concurrent callers share one load and receive the same instance. A
    /// failed load leaves the cache empty so a later call can retry.
    pub async fn get_or_load(&self, options: &KernelOptions) -> Result<Arc<Kernel>> {
        self.get_or_load_with(|| async {
            Kernel::boot(options, AssetCache::global()).await
        })
        .await
    }

    /// Like [`get_or_load`](Self::get_or_load) with a custom loader.
    pub async fn get_or_load_with<F, Fut>(&self, load: F) -> Result<Arc<Kernel>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Kernel>>,
    {
        self.cell
            .get_or_try_init(|| async {
                self.loads.fetch_add(1, Ordering::SeqCst);
                load().await.map(Arc::new)
            })
            .await
            .cloned()
    }

    /// The kernel if it has been loaded.
    pub fn get(&self) -> Option<Arc<Kernel>> {
        self.cell.get().cloned()
    }

    /// How many loads have been started.
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

/// The process-wide kernel cache.
pub fn global_cache() -> &'static KernelCache {
    KERNEL_CACHE.get_or_init(KernelCache::new)
}

/// Load the process-wide kernel with no assets, or return it if loaded.
pub async fn initialize() -> Result<Arc<Kernel>> {
    global_cache().get_or_load(&KernelOptions::default()).await
}

/// The process-wide kernel if loaded.
pub fn loaded() -> Option<Arc<Kernel>> {
    global_cache().get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_loads_share_one_instance() {
        let cache = Arc::new(KernelCache::new());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .get_or_load_with(|| async {
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok(Kernel::new())
                    })
                    .await
                    .unwrap()
            }));
        }
        let mut kernels = Vec::new();
        for h in handles {
            kernels.push(h.await.unwrap());
        }
        assert!(kernels.iter().all(|k| Arc::ptr_eq(k, &kernels[0])));
        assert_eq!(cache.loads(), 1);
    }

    #[tokio::test]
    async fn test_failed_load_can_retry() {
        let cache = KernelCache::new();
        let err = cache
            .get_or_load_with(|| async { Err(KernelError::Load("offline".into())) })
            .await
            .unwrap_err();
        assert_eq!(err, KernelError::Load("offline".into()));
        assert!(cache.get().is_none());

        let kernel = cache
            .get_or_load_with(|| async { Ok(Kernel::new()) })
            .await
            .unwrap();
        assert!(Arc::ptr_eq(&kernel, &cache.get().unwrap()));
        assert_eq!(cache.loads(), 2);
    }

    #[tokio::test]
    async fn test_prefetch_reads_each_asset_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kernel.wasm"), b"\0asm").unwrap();
        let options = KernelOptions {
            asset_dir: Some(dir.path().to_path_buf()),
            assets: vec!["kernel.wasm".into()],
        };
        let assets = AssetCache::new();
        assert_eq!(assets.prefetch(&options).await.unwrap(), 1);
        assert_eq!(assets.prefetch(&options).await.unwrap(), 0);
        assert_eq!(
            assets.get(&dir.path().join("kernel.wasm")).unwrap().as_ref(),
            b"\0asm"
        );
        Kernel::boot(&options, &assets).await.unwrap();
    }

    #[tokio::test]
    async fn test_missing_or_empty_asset_fails_load() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("empty.bin"), b"").unwrap();
        let assets = AssetCache::new();
        for name in ["missing.bin", "empty.bin"] {
            let options = KernelOptions {
                asset_dir: Some(dir.path().to_path_buf()),
                assets: vec![name.into()],
            };
            assert!(matches!(
                Kernel::boot(&options, &assets).await,
                Err(KernelError::Load(_))
            ));
        }
        assert!(assets.is_empty());
    }

    #[tokio::test]
    async fn test_global_initialize_is_idempotent() {
        let a = initialize().await.unwrap();
        let b = initialize().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(loaded().is_some());
    }
}
