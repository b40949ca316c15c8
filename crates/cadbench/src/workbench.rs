//! The workbench: one editable model bound to a session.
//!
//! A run resolves the source through the session cache, builds it in the
//! shared kernel and meshes the result. Only a run that got all the way to
//! a mesh replaces the current shape and is remembered as last-good; a
//! failed run leaves shape, mesh and last-good exactly as they were.

use crate::config::WorkbenchConfig;
use crate::error::{Result, WorkbenchError};
use crate::runner::{build_model, parse_model};
use crate::session::SessionCache;
use crate::store::KeyValueStore;
use cadbench_export::{DownloadSink, ExportArtifact, ExportFormat, ExportInput, ShadedMaterial};
use cadbench_kernel::{global_cache, Kernel, KernelCache, KernelOptions, ShapeId};
use cadbench_tessellate::{tessellate, MeshParams, TriangleMesh};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

/// What the workbench is doing, for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkbenchStatus {
    /// Nothing has run yet.
    Idle,
    /// Waiting for the kernel.
    LoadingKernel,
    /// The current mesh is up to date.
    Ready {
        /// Triangles in the current mesh.
        triangles: usize,
    },
    /// The last run failed; the previous result is still shown.
    Failed(String),
    /// The kernel could not be loaded. Runs are refused from now on.
    KernelUnavailable(String),
}

impl fmt::Display for WorkbenchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkbenchStatus::Idle => f.write_str("idle"),
            WorkbenchStatus::LoadingKernel => f.write_str("loading kernel"),
            WorkbenchStatus::Ready { triangles } => write!(f, "ready ({triangles} triangles)"),
            WorkbenchStatus::Failed(msg) => write!(f, "failed: {msg}"),
            WorkbenchStatus::KernelUnavailable(msg) => write!(f, "kernel unavailable: {msg}"),
        }
    }
}

#[derive(Default)]
struct Current {
    kernel: Option<Arc<Kernel>>,
    shape: Option<ShapeId>,
    mesh: Option<Arc<TriangleMesh>>,
    material: ShadedMaterial,
}

/// One editable model with its session and current result.
pub struct Workbench {
    session: SessionCache,
    kernels: &'static KernelCache,
    kernel_options: KernelOptions,
    mesh_params: MeshParams,
    download_dir: PathBuf,
    // Runs queue on this lock in request order.
    current: Mutex<Current>,
    status: watch::Sender<WorkbenchStatus>,
}

impl fmt::Debug for Workbench {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Workbench")
            .field("session", &self.session)
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl Workbench {
    /// Open instance `instance` of `template`, with its session in `store`.
    pub fn new(
        config: &WorkbenchConfig,
        store: Arc<dyn KeyValueStore>,
        instance: &str,
        template: &str,
    ) -> Result<Self> {
        let session = SessionCache::load(store, &config.session.namespace, instance, template)?;
        let (status, _) = watch::channel(WorkbenchStatus::Idle);
        Ok(Self {
            session,
            kernels: global_cache(),
            kernel_options: config.kernel.options(),
            mesh_params: config.mesh,
            download_dir: config.export.download_dir.clone(),
            current: Mutex::new(Current::default()),
            status,
        })
    }

    /// Load kernels through `cache` instead of the process-wide one.
    pub fn with_kernel_cache(mut self, cache: &'static KernelCache) -> Self {
        self.kernels = cache;
        self
    }

    /// The session cache.
    pub fn session(&self) -> &SessionCache {
        &self.session
    }

    /// Current status.
    pub fn status(&self) -> WorkbenchStatus {
        self.status.borrow().clone()
    }

    /// A receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<WorkbenchStatus> {
        self.status.subscribe()
    }

    /// Handle of the current shape.
    pub async fn shape(&self) -> Option<ShapeId> {
        self.current.lock().await.shape
    }

    /// The current mesh.
    pub async fn mesh(&self) -> Option<Arc<TriangleMesh>> {
        self.current.lock().await.mesh.clone()
    }

    /// The kernel, once a run has loaded it.
    pub async fn kernel(&self) -> Option<Arc<Kernel>> {
        self.current.lock().await.kernel.clone()
    }

    /// Directory used by [`download_default`](Self::download_default).
    pub fn download_dir(&self) -> &std::path::Path {
        &self.download_dir
    }

    /// Persist an edit of the code.
    pub fn edit(&self, text: &str) -> Result<()> {
        Ok(self.session.write_code(text)?)
    }

    /// Reset the session to its template.
    pub fn reset(&self) -> Result<()> {
        Ok(self.session.reset()?)
    }

    async fn load_kernel(&self, current: &mut Current) -> Result<Arc<Kernel>> {
        if let WorkbenchStatus::KernelUnavailable(msg) = self.status() {
            return Err(WorkbenchError::KernelLoad(msg));
        }
        if let Some(kernel) = &current.kernel {
            return Ok(kernel.clone());
        }
        self.status.send_replace(WorkbenchStatus::LoadingKernel);
        match self.kernels.get_or_load(&self.kernel_options).await {
            Ok(kernel) => {
                current.kernel = Some(kernel.clone());
                Ok(kernel)
            }
            Err(e) => {
                let msg = e.to_string();
                tracing::error!(error = %msg, "geometry kernel unavailable");
                self.status
                    .send_replace(WorkbenchStatus::KernelUnavailable(msg.clone()));
                Err(WorkbenchError::KernelLoad(msg))
            }
        }
    }

    /// Build and mesh the model. `live` is unsaved editor text; without it
    /// the session decides what to run.
    ///
    /// Concurrent calls are queued and complete in the order they were made.
    pub async fn run(&self, live: Option<&str>) -> Result<Arc<TriangleMesh>> {
        let mut current = self.current.lock().await;
        let kernel = self.load_kernel(&mut current).await?;
        let source = self.session.resolve_source(live)?;

        let _span = tracing::info_span!("run", session = self.session.id()).entered();
        match self.build(&kernel, &source) {
            Ok((shape, mesh, material)) => {
                if let Err(e) = self.session.write_last_good(&source) {
                    kernel.release(shape);
                    return Err(self.fail(e.into()));
                }
                if let Some(previous) = current.shape.replace(shape) {
                    kernel.release(previous);
                }
                let mesh = Arc::new(mesh);
                current.mesh = Some(mesh.clone());
                current.material = material;
                tracing::info!(triangles = mesh.num_triangles(), "model updated");
                self.status.send_replace(WorkbenchStatus::Ready {
                    triangles: mesh.num_triangles(),
                });
                Ok(mesh)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn build(&self, kernel: &Kernel, source: &str) -> Result<(ShapeId, TriangleMesh, ShadedMaterial)> {
        let doc = parse_model(source)?;
        let shape = build_model(kernel, &doc)?;
        match tessellate(kernel, shape, &self.mesh_params) {
            Ok(mesh) => Ok((shape, mesh, ShadedMaterial::from(&doc.result_material()))),
            Err(e) => {
                kernel.release(shape);
                Err(e.into())
            }
        }
    }

    fn fail(&self, e: WorkbenchError) -> WorkbenchError {
        tracing::warn!(error = %e, "run failed, keeping previous result");
        self.status.send_replace(WorkbenchStatus::Failed(e.to_string()));
        e
    }

    /// Export the current result.
    pub async fn export(&self, format: ExportFormat, filename: &str) -> Result<ExportArtifact> {
        let current = self.current.lock().await;
        let Some(kernel) = current.kernel.as_deref() else {
            return Err(WorkbenchError::ExportPrecondition(
                "missing shape/geometry".into(),
            ));
        };

        if let (ExportFormat::Gltf | ExportFormat::Glb, Some(mesh)) = (format, &current.mesh) {
            let artifact = cadbench_export::export_gltf_async(
                Some(mesh.clone()),
                current.material.clone(),
                filename.to_string(),
                format == ExportFormat::Glb,
            )
            .await?;
            return Ok(artifact);
        }

        let mut input = ExportInput::new(kernel).with_material(&current.material);
        input.mesh_params = self.mesh_params;
        if let Some(shape) = current.shape {
            input = input.with_shape(shape);
        }
        if let Some(mesh) = current.mesh.as_deref() {
            input = input.with_mesh(mesh);
        }
        Ok(cadbench_export::export(format, &input, filename)?)
    }

    /// Export the current result and hand it to `sink`.
    pub async fn download<S: DownloadSink + ?Sized>(
        &self,
        format: ExportFormat,
        filename: &str,
        sink: &S,
    ) -> Result<PathBuf> {
        let artifact = self.export(format, filename).await?;
        Ok(sink.deliver(&artifact)?)
    }

    /// [`download`](Self::download) into the configured download directory.
    pub async fn download_default(&self, format: ExportFormat, filename: &str) -> Result<PathBuf> {
        let sink = cadbench_export::FileDownloads::new(&self.download_dir);
        self.download(format, filename, &sink).await
    }
}

impl Drop for Workbench {
    fn drop(&mut self) {
        let current = self.current.get_mut();
        if let (Some(kernel), Some(shape)) = (&current.kernel, current.shape.take()) {
            kernel.release(shape);
        }
    }
}
