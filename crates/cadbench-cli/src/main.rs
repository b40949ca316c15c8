//! cadbench CLI - build, inspect and export model scripts.

use anyhow::{Context, Result};
use cadbench::{
    open_store, session_key, start_warmup, ExportFormat, Workbench, WorkbenchConfig,
};
use cadbench_ir::{CsgOp, Document};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "cadbench")]
#[command(about = "Build, inspect and export CAD model scripts", long_about = None)]
struct Cli {
    /// Workbench config file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a model and print mesh statistics
    Run {
        /// Model script (compact or JSON)
        script: PathBuf,
        /// Template the session starts from (default: the script itself)
        #[arg(long)]
        template: Option<PathBuf>,
        /// Session instance id
        #[arg(long, default_value = "default")]
        instance: String,
    },
    /// Build a model and export it
    Export {
        /// Model script (compact or JSON)
        script: PathBuf,
        /// Output file (format determined by extension: .step, .stp, .stl, .gltf, .glb)
        output: PathBuf,
        /// Write ASCII instead of binary STL
        #[arg(long)]
        ascii: bool,
    },
    /// Display information about a model script
    Info {
        /// Model script (compact or JSON)
        script: PathBuf,
    },
    /// Prefetch kernel assets and report the result
    Warmup,
    /// Inspect or clear persisted session state
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },
}

#[derive(Subcommand)]
enum SessionAction {
    /// Print the stored sources of an instance
    Show {
        /// Session instance id
        #[arg(long, default_value = "default")]
        instance: String,
    },
    /// Drop the stored sources of an instance
    Reset {
        /// Session instance id
        #[arg(long, default_value = "default")]
        instance: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    cadbench::telemetry::init_tracing("warn,cadbench=info");
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => WorkbenchConfig::load(path)?,
        None => WorkbenchConfig::default(),
    };

    match cli.command {
        Commands::Run {
            script,
            template,
            instance,
        } => run(&config, &script, template.as_deref(), &instance).await?,
        Commands::Export {
            script,
            output,
            ascii,
        } => export(&config, &script, &output, ascii).await?,
        Commands::Info { script } => show_info(&script)?,
        Commands::Warmup => warmup(&config).await?,
        Commands::Session { action } => session(&config, action)?,
    }

    Ok(())
}

fn read_script(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))
}

async fn run(
    config: &WorkbenchConfig,
    script: &Path,
    template: Option<&Path>,
    instance: &str,
) -> Result<()> {
    let source = read_script(script)?;
    let template = match template {
        Some(path) => read_script(path)?,
        None => source.clone(),
    };
    let warmup = if config.warmup.enabled {
        start_warmup(config.kernel.options(), config.warmup.idle_delay())
    } else {
        None
    };

    let store = open_store(config.session.state_file.as_deref())?;
    let workbench = Workbench::new(config, store, instance, &template)?;
    let mesh = workbench.run(Some(&source)).await?;

    println!("Triangles: {}", mesh.num_triangles());
    println!("Vertices: {}", mesh.num_vertices());
    if let Some(bounds) = mesh.bounds() {
        println!(
            "Bounds: [{:.3}, {:.3}, {:.3}] - [{:.3}, {:.3}, {:.3}]",
            bounds.min[0], bounds.min[1], bounds.min[2], bounds.max[0], bounds.max[1], bounds.max[2]
        );
    }
    if let Some(warmup) = warmup {
        tracing::debug!(status = %warmup.status(), "warmup");
    }
    Ok(())
}

async fn export(config: &WorkbenchConfig, script: &Path, output: &Path, ascii: bool) -> Result<()> {
    let format = ExportFormat::from_path(output, ascii).with_context(|| {
        format!(
            "Unknown output format: {}",
            output.extension().and_then(|e| e.to_str()).unwrap_or("")
        )
    })?;
    let source = read_script(script)?;

    let store = open_store(None)?;
    let workbench = Workbench::new(config, store, "export", &source)?;
    workbench.run(None).await?;

    let filename = output
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("model");
    let artifact = workbench.export(format, filename).await?;
    let path = output.with_file_name(&artifact.filename);
    std::fs::write(&path, &artifact.bytes)
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!(
        "Exported {} ({} bytes) to {}",
        artifact.mime,
        artifact.bytes.len(),
        path.display()
    );
    Ok(())
}

fn op_name(op: &CsgOp) -> &'static str {
    match op {
        CsgOp::Cube { .. } => "box",
        CsgOp::Cylinder { .. } => "cylinder",
        CsgOp::Cone { .. } => "cone",
        CsgOp::Sphere { .. } => "sphere",
        CsgOp::Plane { .. } => "plane",
        CsgOp::Union { .. } => "fuse",
        CsgOp::Difference { .. } => "cut",
        CsgOp::Intersection { .. } => "common",
        CsgOp::Compound { .. } => "compound",
        CsgOp::Translate { .. } => "translate",
        CsgOp::Rotate { .. } => "rotate",
        CsgOp::Scale { .. } => "scale",
        CsgOp::Reverse { .. } => "reverse",
    }
}

fn show_info(script: &Path) -> Result<()> {
    let doc: Document = cadbench::parse_model(&read_script(script)?)?;

    println!("Version: {}", doc.version);
    println!("Nodes: {}", doc.nodes.len());
    println!("Materials: {}", doc.materials.len());

    let mut ids: Vec<_> = doc.nodes.keys().copied().collect();
    ids.sort_unstable();
    for id in ids {
        let node = &doc.nodes[&id];
        match &node.name {
            Some(name) => println!("  {id}: {} \"{name}\"", op_name(&node.op)),
            None => println!("  {id}: {}", op_name(&node.op)),
        }
    }

    match doc.result() {
        Some(entry) => println!(
            "Returns: node {} (material: {})",
            entry.root,
            doc.result_material().name
        ),
        None => println!("Returns: nothing"),
    }
    Ok(())
}

async fn warmup(config: &WorkbenchConfig) -> Result<()> {
    let handle = start_warmup(config.kernel.options(), config.warmup.idle_delay())
        .context("warmup already started")?;
    let status = handle.finished().await;
    println!("Warmup: {status}");
    Ok(())
}

fn session(config: &WorkbenchConfig, action: SessionAction) -> Result<()> {
    let store = open_store(config.session.state_file.as_deref())?;
    let ns = &config.session.namespace;
    match action {
        SessionAction::Show { instance } => {
            for field in ["orig-hash", "code", "last-good"] {
                let key = session_key(ns, &instance, field);
                match store.get(&key)? {
                    Some(value) => println!("{key}:\n{value}\n"),
                    None => println!("{key}: (unset)"),
                }
            }
        }
        SessionAction::Reset { instance } => {
            store.remove(&session_key(ns, &instance, "code"))?;
            store.remove(&session_key(ns, &instance, "last-good"))?;
            println!("Session {ns}:{instance} reset");
        }
    }
    Ok(())
}
