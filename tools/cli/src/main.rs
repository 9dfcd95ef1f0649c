//! cloudshelf CLI - Command line interface for storage operations.
//!
//! Browses and manipulates files in the configured storage backend. The
//! backend is selected from the environment (`STORAGE_TYPE` and friends) or
//! from a JSON configuration file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use cloudshelf_storage::{
    Backend, DownloadResponse, StorageBackend, StorageConfig, ThumbnailResponse,
};

#[derive(Parser)]
#[command(name = "cloudshelf")]
#[command(about = "cloudshelf - Files and folders on R2, GitHub or OneDrive")]
#[command(version)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,

    /// JSON configuration file. Defaults to the environment.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List one folder level.
    Ls {
        /// Folder prefix (default: root).
        #[arg(default_value = "")]
        prefix: String,
    },

    /// Show metadata for a key.
    Stat { key: String },

    /// Download a file.
    Get {
        key: String,

        /// Destination file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a local file.
    Put {
        /// Local file to upload.
        source: PathBuf,

        /// Destination key.
        key: String,

        /// Content type. Guessed from the extension when absent.
        #[arg(short = 't', long)]
        content_type: Option<String>,
    },

    /// Delete a file.
    Rm { key: String },

    /// Rename or move a file.
    Mv { from: String, to: String },

    /// Copy a file.
    Cp { from: String, to: String },

    /// Create a folder.
    Mkdir { path: String },

    /// Delete a folder and everything in it.
    Rmdir { prefix: String },

    /// Move a folder and everything in it.
    Mvdir { from: String, to: String },

    /// Copy a folder and everything in it.
    Cpdir { from: String, to: String },

    /// Print a direct URL for a file.
    Url {
        key: String,

        /// Lifetime of a presigned URL in seconds.
        #[arg(short, long)]
        expires: Option<u64>,
    },

    /// Show how a client would download a file.
    Download {
        key: String,

        /// Save relayed content here.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Write a JPEG thumbnail of an image.
    Thumb {
        key: String,

        /// Destination file.
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Check connectivity with the configured backend.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging; RUST_LOG wins when set
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let config = load_config(cli.config.as_deref()).await?;
    let backend = Backend::from_config(&config).context("Failed to set up storage backend")?;

    match cli.command {
        Commands::Ls { prefix } => cmd_ls(&backend, &prefix).await,
        Commands::Stat { key } => cmd_stat(&backend, &key).await,
        Commands::Get { key, output } => cmd_get(&backend, &key, output.as_deref()).await,
        Commands::Put {
            source,
            key,
            content_type,
        } => cmd_put(&backend, &source, &key, content_type.as_deref()).await,
        Commands::Rm { key } => {
            backend.delete(&key).await.context("Failed to delete file")?;
            println!("Deleted {}", key);
            Ok(())
        }
        Commands::Mv { from, to } => {
            backend.rename(&from, &to).await.context("Failed to move file")?;
            println!("Moved {} -> {}", from, to);
            Ok(())
        }
        Commands::Cp { from, to } => {
            backend.copy(&from, &to).await.context("Failed to copy file")?;
            println!("Copied {} -> {}", from, to);
            Ok(())
        }
        Commands::Mkdir { path } => {
            backend
                .create_folder(&path)
                .await
                .context("Failed to create folder")?;
            println!("Created {}", path);
            Ok(())
        }
        Commands::Rmdir { prefix } => {
            backend
                .delete_folder(&prefix)
                .await
                .context("Failed to delete folder")?;
            println!("Deleted folder {}", prefix);
            Ok(())
        }
        Commands::Mvdir { from, to } => {
            backend
                .rename_folder(&from, &to)
                .await
                .context("Failed to move folder")?;
            println!("Moved folder {} -> {}", from, to);
            Ok(())
        }
        Commands::Cpdir { from, to } => {
            backend
                .copy_folder(&from, &to)
                .await
                .context("Failed to copy folder")?;
            println!("Copied folder {} -> {}", from, to);
            Ok(())
        }
        Commands::Url { key, expires } => cmd_url(&backend, &key, expires).await,
        Commands::Download { key, output } => cmd_download(&backend, &key, output.as_deref()).await,
        Commands::Thumb { key, output } => cmd_thumb(&backend, &key, &output).await,
        Commands::Check => {
            backend.verify().await.context("Connectivity check failed")?;
            println!("{} backend is reachable.", backend.kind());
            Ok(())
        }
    }
}

/// Configuration from a JSON file, or from the environment.
async fn load_config(path: Option<&Path>) -> Result<StorageConfig> {
    let Some(path) = path else {
        return StorageConfig::from_env().context("Invalid storage configuration in environment");
    };
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let value: serde_json::Value =
        serde_json::from_slice(&raw).context("Configuration file is not valid JSON")?;
    StorageConfig::from_value(value).context("Invalid storage configuration")
}

/// List one folder level, directories first.
async fn cmd_ls(backend: &Backend, prefix: &str) -> Result<()> {
    let items = backend
        .list(prefix)
        .await
        .context("Failed to list folder")?
        .into_items();

    if items.is_empty() {
        println!("Folder is empty.");
        return Ok(());
    }

    for entry in items {
        if entry.is_directory {
            println!("  [DIR]  {}", entry.key);
        } else {
            let size = entry
                .size
                .map(|s| format!("{} bytes", s))
                .unwrap_or_default();
            println!(
                "  [FILE] {} ({}, {})",
                entry.key,
                size,
                entry.last_modified.format("%Y-%m-%d %H:%M")
            );
        }
    }
    Ok(())
}

async fn cmd_stat(backend: &Backend, key: &str) -> Result<()> {
    let entry = backend.stat(key).await.context("Failed to stat key")?;
    println!("{}", serde_json::to_string_pretty(&entry)?);
    Ok(())
}

async fn cmd_get(backend: &Backend, key: &str, output: Option<&Path>) -> Result<()> {
    let content = backend.read(key).await.context("Failed to read file")?;
    write_output(output, &content.bytes).await?;
    info!(key = %key, size = content.len(), content_type = %content.content_type, "Downloaded");
    Ok(())
}

async fn cmd_put(
    backend: &Backend,
    source: &Path,
    key: &str,
    content_type: Option<&str>,
) -> Result<()> {
    let data = tokio::fs::read(source)
        .await
        .context("Failed to read source file")?;
    let size = data.len();

    backend
        .upload(key, data.into(), content_type)
        .await
        .context("Failed to upload file")?;

    println!("Uploaded {} ({} bytes)", key, size);
    Ok(())
}

async fn cmd_url(backend: &Backend, key: &str, expires: Option<u64>) -> Result<()> {
    let ttl = expires
        .map(Duration::from_secs)
        .unwrap_or_else(|| backend.presign_ttl());

    if let Some(url) = backend
        .presigned_url(key, ttl)
        .await
        .context("Failed to create presigned URL")?
    {
        println!("{}", url);
        return Ok(());
    }
    match backend
        .public_url(key)
        .await
        .context("Failed to look up public URL")?
    {
        Some(url) => println!("{}", url),
        None => anyhow::bail!("{} backend has no direct URL for {}", backend.kind(), key),
    }
    Ok(())
}

async fn cmd_download(backend: &Backend, key: &str, output: Option<&Path>) -> Result<()> {
    let response = backend
        .download_response(key)
        .await
        .context("Failed to prepare download")?;

    match response {
        None => anyhow::bail!("No download available for {}", key),
        Some(DownloadResponse::Redirect { url }) => println!("Redirect: {}", url),
        Some(DownloadResponse::Content {
            bytes,
            headers,
            mimetype,
        }) => {
            println!("Content: {} bytes of {}", bytes.len(), mimetype);
            for (name, value) in &headers {
                println!("  {}: {}", name, value);
            }
            if let Some(path) = output {
                write_output(Some(path), &bytes).await?;
            }
        }
    }
    Ok(())
}

async fn cmd_thumb(backend: &Backend, key: &str, output: &Path) -> Result<()> {
    match backend
        .thumbnail(key)
        .await
        .context("Failed to create thumbnail")?
    {
        ThumbnailResponse::Image(jpeg) => {
            write_output(Some(output), &jpeg).await?;
            println!("Thumbnail written to {} ({} bytes)", output.display(), jpeg.len());
        }
        ThumbnailResponse::Redirect(url) => {
            println!("Source too large for a thumbnail, fetch it directly: {}", url);
        }
    }
    Ok(())
}

async fn write_output(path: Option<&Path>, data: &[u8]) -> Result<()> {
    match path {
        Some(path) => tokio::fs::write(path, data)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            let mut stdout = tokio::io::stdout();
            stdout.write_all(data).await?;
            stdout.flush().await?;
            Ok(())
        }
    }
}
