//! panup command-line entry point.

mod config;
mod logging;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use panup_transfer::{DEFAULT_CHUNK_SIZE, format_duration, format_size};
use panup_upload::{
    DirectoryOptions, MirrorRemote, RemoteClient, UploadOutcome, Uploader, UploaderConfig,
    parse_exclude_list,
};

use crate::config::PanupConfig;
use crate::logging::LogLevel;

#[derive(Parser)]
#[command(name = "panup", version, about = "Resumable chunked uploads to cloud storage")]
struct Cli {
    #[command(flatten)]
    globals: GlobalArgs,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args)]
struct GlobalArgs {
    /// Config file path (default: ~/.config/panup/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Directory for staged chunk files (default: ./.chunks).
    #[arg(long, global = true)]
    cache_dir: Option<PathBuf>,
    /// Console log level. RUST_LOG takes precedence when set.
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,
    /// Also append logs to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Only print warnings and errors; no periodic progress.
    #[arg(short, long, global = true)]
    quiet: bool,
    /// Upload into this local directory instead of the configured remote.
    #[arg(long, global = true)]
    mirror: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Writes a default config file.
    Init {
        /// Overwrite an existing config file.
        #[arg(long)]
        force: bool,
    },
    /// Uploads a single file.
    File(FileArgs),
    /// Uploads a directory recursively.
    Folder(FolderArgs),
}

#[derive(Args)]
struct FileArgs {
    /// Local file to upload.
    path: PathBuf,
    /// Remote name under the app path (default: the local file name).
    #[arg(long)]
    name: Option<String>,
}

#[derive(Args)]
struct FolderArgs {
    /// Local directory to upload.
    path: PathBuf,
    /// Extra comma-separated exclusion patterns, e.g. "*.log,build".
    #[arg(long)]
    exclude: Option<String>,
    /// Upload every file directly under the folder name, dropping subdirectories.
    #[arg(long)]
    flatten: bool,
    /// Maximum number of files uploaded at once.
    #[arg(long)]
    concurrent: Option<usize>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = logging::init(
        cli.globals.log_level,
        cli.globals.quiet,
        cli.globals.log_file.as_deref(),
    ) {
        eprintln!("error: {e:#}");
        return ExitCode::FAILURE;
    }

    tracing::debug!(version = env!("CARGO_PKG_VERSION"), "starting panup");

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli
        .globals
        .config
        .clone()
        .unwrap_or_else(config::config_path);

    match cli.command {
        Command::Init { force } => {
            config::init(&config_path, force)?;
            println!("Config written to {}", config_path.display());
            println!("Set access_token (and mirror_dir for local uploads) before uploading.");
            Ok(())
        }
        Command::File(args) => {
            let config = PanupConfig::load(&config_path)?;
            upload_file(&cli.globals, &config, args).await
        }
        Command::Folder(args) => {
            let config = PanupConfig::load(&config_path)?;
            upload_folder(&cli.globals, &config, args).await
        }
    }
}

/// Resolves the remote side. Only the filesystem mirror ships with panup.
fn remote_for(globals: &GlobalArgs, config: &PanupConfig) -> Result<Arc<dyn RemoteClient>> {
    let root = globals
        .mirror
        .clone()
        .or_else(|| config.mirror_dir.clone())
        .context("no remote configured; pass --mirror <DIR> or set mirror_dir in the config file")?;
    tracing::info!(root = %root.display(), "uploading to filesystem mirror");
    Ok(Arc::new(
        MirrorRemote::new(root).with_chunk_size(DEFAULT_CHUNK_SIZE),
    ))
}

fn uploader_config(globals: &GlobalArgs, config: &PanupConfig) -> UploaderConfig {
    UploaderConfig {
        app_path: config.app_path.clone(),
        cache_dir: globals
            .cache_dir
            .clone()
            .or_else(|| config.upload.cache_dir.clone()),
        chunk_size: DEFAULT_CHUNK_SIZE,
        retry: config.upload.retry_policy(),
        progress_interval: if globals.quiet {
            None
        } else {
            config.upload.progress_interval()
        },
    }
}

async fn upload_file(globals: &GlobalArgs, config: &PanupConfig, args: FileArgs) -> Result<()> {
    check_path(&args.path, false)?;
    let credential = config.credential()?;
    let uploader = Uploader::new(remote_for(globals, config)?, uploader_config(globals, config));

    let outcome = uploader
        .upload_file(credential, &args.path, args.name.as_deref())
        .await
        .with_context(|| format!("failed to upload {}", args.path.display()))?;

    match outcome {
        UploadOutcome::Uploaded { remote_path, .. } => {
            println!("Uploaded {} -> {remote_path}", args.path.display());
        }
        UploadOutcome::AlreadyExists { remote_path } => {
            println!("Already uploaded: {remote_path}");
        }
    }
    Ok(())
}

async fn upload_folder(globals: &GlobalArgs, config: &PanupConfig, args: FolderArgs) -> Result<()> {
    check_path(&args.path, true)?;
    let credential = config.credential()?;

    let mut exclude = config.upload.exclude.clone();
    if let Some(list) = &args.exclude {
        exclude.extend(parse_exclude_list(list));
    }
    let options = DirectoryOptions {
        exclude,
        keep_structure: config.upload.keep_structure && !args.flatten,
        max_concurrency: args.concurrent.unwrap_or(config.upload.max_concurrency),
    };

    let uploader = Uploader::new(remote_for(globals, config)?, uploader_config(globals, config));
    let summary = uploader
        .upload_directory(credential, &args.path, &options)
        .await
        .with_context(|| format!("failed to upload {}", args.path.display()))?;

    println!(
        "Uploaded {} files ({}) in {}",
        summary.uploaded_files,
        format_size(summary.uploaded_bytes),
        format_duration(summary.elapsed)
    );
    Ok(())
}

fn check_path(path: &Path, want_dir: bool) -> Result<()> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("cannot access {}", path.display()))?;
    if want_dir && !metadata.is_dir() {
        bail!("{} is not a directory", path.display());
    }
    if !want_dir && !metadata.is_file() {
        bail!("{} is not a regular file", path.display());
    }
    Ok(())
}
