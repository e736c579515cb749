//! Recorder - files captures into per-game folders
//!
//! Command-line host adapter: replays scripted host callbacks through the
//! dispatcher and manages the persisted settings and scene bindings.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use recorder::app;
use recorder::backend::{spawn_dispatcher, BackendEvent};
use recorder::title::StaticHost;
use recorder::utils::{self, AppSettings, SourceBindings};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, BufReader};
use tracing::info;

#[derive(Parser)]
#[command(name = "recorder", version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Replay a JSON-lines host event script
    Run {
        /// Settings file (defaults to the config directory)
        #[arg(long)]
        settings: Option<PathBuf>,

        /// Scene bindings file (defaults to the config directory)
        #[arg(long)]
        bindings: Option<PathBuf>,

        /// Script to replay, `-` for stdin
        #[arg(long, default_value = "-")]
        events: String,
    },
    /// Remember which source to watch in a scene
    Bind {
        #[arg(long)]
        collection: String,
        #[arg(long)]
        scene: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        bindings: Option<PathBuf>,
    },
    /// Write the default settings file
    InitConfig {
        #[arg(long)]
        settings: Option<PathBuf>,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async move {
        match args.command {
            Command::Run {
                settings,
                bindings,
                events,
            } => run(settings, bindings, events).await,
            Command::Bind {
                collection,
                scene,
                source,
                bindings,
            } => bind(collection, scene, source, bindings).await,
            Command::InitConfig { settings, force } => init_config(settings, force).await,
        }
    })
}

async fn run(settings: Option<PathBuf>, bindings: Option<PathBuf>, events: String) -> Result<()> {
    let settings_path = settings.unwrap_or_else(utils::get_settings_path);
    let bindings_path = bindings.unwrap_or_else(utils::get_bindings_path);

    let settings = AppSettings::load(&settings_path).await?;
    let bindings = Arc::new(SourceBindings::load(&bindings_path).await);
    let host = Arc::new(StaticHost::new());

    let (dispatcher, mut status) = spawn_dispatcher(settings, host.clone(), bindings);

    // Status reporter
    let reporter = tokio::spawn(async move {
        while let Some(event) = status.recv().await {
            println!("{}", describe(&event));
        }
    });

    let reader: Box<dyn AsyncBufRead + Unpin + Send> = if events == "-" {
        Box::new(BufReader::new(tokio::io::stdin()))
    } else {
        let file = tokio::fs::File::open(&events)
            .await
            .with_context(|| format!("Failed to open script {}", events))?;
        Box::new(BufReader::new(file))
    };

    let replayed = app::replay(reader, &host, &dispatcher).await;
    dispatcher.shutdown().await?;
    reporter.await?;

    let applied = replayed?;
    info!("Replayed {} event(s)", applied);
    Ok(())
}

async fn bind(
    collection: String,
    scene: String,
    source: String,
    bindings: Option<PathBuf>,
) -> Result<()> {
    let path = bindings.unwrap_or_else(utils::get_bindings_path);
    let mut table = SourceBindings::load(&path).await;
    table.bind(&collection, &scene, &source);
    table.save(&path).await?;

    println!("{} / {} -> {}", collection, scene, source);
    Ok(())
}

async fn init_config(settings: Option<PathBuf>, force: bool) -> Result<()> {
    let path = settings.unwrap_or_else(utils::get_settings_path);
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists, pass --force to overwrite", path);
    }

    AppSettings::default().save(&path).await?;
    println!("Wrote {}", path.display());
    Ok(())
}

fn describe(event: &BackendEvent) -> String {
    match event {
        BackendEvent::SessionStarted { session_id, title } => format!(
            "[{}] started, title {}",
            session_id,
            title.as_deref().unwrap_or("<unresolved>")
        ),
        BackendEvent::FileFiled {
            session_id,
            from,
            to,
        } => format!("[{}] filed {} -> {}", session_id, from.display(), to.display()),
        BackendEvent::FileLeftInPlace {
            session_id,
            path,
            reason,
        } => format!("[{}] left {} in place: {}", session_id, path.display(), reason),
        BackendEvent::FilingFailed {
            session_id,
            path,
            error,
        } => format!(
            "[{}] WARNING: could not file {}: {}",
            session_id,
            path.display(),
            error
        ),
        BackendEvent::SessionClosed { session_id, forced } => {
            if *forced {
                format!("[{}] closed (forced)", session_id)
            } else {
                format!("[{}] closed", session_id)
            }
        }
    }
}
