use clap::{ArgAction, Parser, Subcommand};
use pixel_upload::config::{self, UploadConfig};
use pixel_upload::output;
use pixel_upload::pipeline::{Phase, PipelineController};
use pixel_upload::storage::LocalDirStorage;
use pixel_upload::types::SourceFile;
use pixel_upload::validate::validate;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tokio::sync::mpsc::unbounded_channel;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

fn version_string() -> &'static str {
    let on_tag = env!("ON_RELEASE_TAG");
    if on_tag == "true" {
        env!("CARGO_PKG_VERSION")
    } else {
        let hash = env!("GIT_HASH");
        if hash.is_empty() {
            "dev@unknown"
        } else {
            // Leaked once at startup — trivial, called exactly once
            Box::leak(format!("dev@{hash}").into_boxed_str())
        }
    }
}

#[derive(Parser)]
#[command(name = "pixel-upload")]
#[command(about = "Validate, compress, and upload an image")]
#[command(long_about = "\
Validate, compress, and upload an image

The file is checked against the size limit and accepted types, scaled down to
fit max_width × max_height, re-encoded (PNG stays PNG, everything else becomes
JPEG), center-cropped if crop_aspect_ratio is set, and written to local
storage under a unique key:

  {destination_prefix}/{unix_millis}-{8 random chars}.{ext}

Animated GIFs and SVGs are uploaded untouched. A re-encode that does not
shrink the file is discarded in favor of the original.

Press Ctrl-C during an upload to cancel it.

Run 'pixel-upload gen-config' to generate a documented config.toml.")]
#[command(version = version_string())]
struct Cli {
    /// Config file (merged over stock defaults)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline: validate → transform → crop → upload
    Upload {
        /// Image to upload
        file: PathBuf,
        /// Storage directory (overrides storage.root)
        #[arg(long)]
        store: Option<PathBuf>,
        /// Public URL of the storage directory (overrides storage.public_base_url)
        #[arg(long)]
        base_url: Option<String>,
        /// Print each state as a JSON line
        #[arg(long)]
        json: bool,
    },
    /// Validate a file without uploading it
    Check {
        /// Image to check
        file: PathBuf,
    },
    /// Print a stock config.toml with all options documented
    GenConfig,
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Upload {
            file,
            store,
            base_url,
            json,
        } => {
            let mut config = config::load_config(cli.config.as_deref())?;
            if let Some(store) = store {
                config.storage.root = store.to_string_lossy().into_owned();
            }
            if let Some(base_url) = base_url {
                config.storage.public_base_url = base_url;
            }
            upload(config, &file, json).await
        }
        Command::Check { file } => {
            let config = config::load_config(cli.config.as_deref())?;
            let source = SourceFile::from_path(&file)?;
            let result = validate(&source, &config);
            output::print_check(&source, &result);
            Ok(if result.is_ok() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Drive one pipeline run, printing every published state.
async fn upload(
    config: UploadConfig,
    file: &Path,
    json: bool,
) -> Result<ExitCode, Box<dyn std::error::Error>> {
    let storage = LocalDirStorage::new(&config.storage.root, &config.storage.public_base_url);
    let (tx, mut events) = unbounded_channel();
    let controller = PipelineController::builder(config, Arc::new(storage))
        .with_events(tx)
        .build()?;

    let source = SourceFile::from_path(file)?;
    let filename = source.filename.clone();
    let run = controller.submit_file(source)?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut previous = None;

    loop {
        tokio::select! {
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                tracing::info!("interrupted; cancelling upload");
                controller.cancel();
            }
            state = events.recv() => {
                let Some(state) = state else { break };
                if json {
                    println!("{}", output::format_state_json(&state)?);
                } else {
                    output::print_transition(previous, &state, &filename);
                }
                previous = Some(state.phase);
                if !state.phase.is_active() {
                    break;
                }
            }
        }
    }
    run.await?;

    Ok(match previous {
        Some(Phase::Succeeded) => ExitCode::SUCCESS,
        Some(Phase::Cancelled) => ExitCode::from(130),
        _ => ExitCode::FAILURE,
    })
}
