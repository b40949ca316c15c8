#![warn(missing_docs)]

//! cadbench workbench: model scripts in, meshes and exports out.
//!
//! ```text
//! source ──session──▶ runner ──▶ kernel shape ──▶ tessellate ──▶ mesh
//!                                     │                           │
//!                                     └──────── export ◀──────────┘
//! ```
//!
//! [`Workbench`] ties the pieces together for one editable model. The
//! [`session`] cache decides which source runs and remembers the last one
//! that worked; the [`warmup`] worker prefetches kernel assets.

pub mod config;
pub mod error;
pub mod runner;
pub mod session;
pub mod store;
pub mod telemetry;
pub mod warmup;
pub mod workbench;

pub use config::{ConfigError, WorkbenchConfig};
pub use error::{Result, WorkbenchError};
pub use runner::{build_model, parse_model, run_model, BuildErrorKind, ModelBuildError};
pub use session::{session_key, template_hash, SessionCache};
pub use store::{open_store, FileStore, KeyValueStore, MemoryStore, StoreError};
pub use warmup::{start_warmup, Warmup, WarmupHandle, WarmupStatus};
pub use workbench::{Workbench, WorkbenchStatus};

pub use cadbench_export::{DownloadSink, ExportArtifact, ExportFormat, FileDownloads};
pub use cadbench_tessellate::{MeshParams, TriangleMesh};
