use std::io::SeekFrom;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use bytes::Bytes;
use colored::Colorize;
use serde::Serialize;
use stitch_server::{ServerConfig, StitchServer};
use stitch_upload::{MergeRequest, RawNumber, StageChunkRequest, StatusRequest, UploadService};
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::cli::*;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = resolve_config(cli.config.as_deref(), cli.data_dir.as_deref())?;
    let format = cli.format;
    match cli.command {
        Command::Serve(args) => cmd_serve(config, args).await,
        Command::Upload(args) => cmd_upload(&open(&config).await?, args, format).await,
        Command::Status(args) => cmd_status(&open(&config).await?, args, format).await,
        Command::Merge(args) => cmd_merge(&open(&config).await?, args, format).await,
        Command::Ls(_) => cmd_ls(&open(&config).await?, format).await,
        Command::Get(args) => cmd_get(&open(&config).await?, args).await,
        Command::Discard(args) => cmd_discard(&open(&config).await?, args, format).await,
    }
}

/// Config file first, then `--data-dir` on top.
fn resolve_config(path: Option<&Path>, data_dir: Option<&Path>) -> anyhow::Result<ServerConfig> {
    let mut config = match path {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(dir) = data_dir {
        config = config.with_data_dir(dir);
    }
    Ok(config)
}

async fn open(config: &ServerConfig) -> anyhow::Result<UploadService> {
    Ok(StitchServer::new(config.clone()).open_service().await?)
}

fn emit<T: Serialize>(format: OutputFormat, value: &T, text: impl FnOnce(&T)) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Text => text(value),
    }
    Ok(())
}

async fn cmd_serve(mut config: ServerConfig, args: ServeArgs) -> anyhow::Result<()> {
    if let Some(bind) = args.bind {
        config.bind_addr = bind
            .parse()
            .with_context(|| format!("invalid bind address `{bind}`"))?;
    }
    println!(
        "Stitch server on {} (staging: {}, uploads: {})",
        config.bind_addr.to_string().bold(),
        config.staging_dir.display(),
        config.artifacts_dir.display()
    );
    StitchServer::new(config).serve().await?;
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadReport {
    hash: String,
    filename: String,
    total_chunks: u32,
    staged: Vec<u32>,
    skipped: Vec<u32>,
    merged: bool,
    size: u64,
    locator: Option<String>,
}

async fn cmd_upload(svc: &UploadService, args: UploadArgs, format: OutputFormat) -> anyhow::Result<()> {
    if args.chunk_size == 0 {
        bail!("--chunk-size must be positive");
    }
    let filename = match args.name {
        Some(name) => name,
        None => args
            .path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .with_context(|| format!("cannot derive a file name from {}", args.path.display()))?,
    };

    let mut file = tokio::fs::File::open(&args.path)
        .await
        .with_context(|| format!("opening {}", args.path.display()))?;
    let len = file.metadata().await?.len();
    if len == 0 {
        bail!("{} is empty", args.path.display());
    }
    let total = u32::try_from(len.div_ceil(args.chunk_size))
        .context("too many chunks; raise --chunk-size")?;
    let hash = content_hash(&mut file).await?;

    let already = svc
        .check_status(&StatusRequest { hash: Some(hash.clone()) })
        .await?
        .uploaded_chunks;

    let mut staged = Vec::new();
    for index in (0..total).filter(|i| !already.contains(i)) {
        let data = read_chunk(&mut file, index, args.chunk_size).await?;
        svc.stage_chunk(StageChunkRequest {
            hash: Some(hash.clone()),
            chunk_index: Some(index.to_string()),
            total_chunks: Some(RawNumber::from(total)),
            filename: Some(filename.clone()),
            chunk: Some(data),
        })
        .await?;
        staged.push(index);
    }

    let mut report = UploadReport {
        hash: hash.clone(),
        filename: filename.clone(),
        total_chunks: total,
        staged,
        skipped: already,
        merged: false,
        size: len,
        locator: None,
    };
    if !args.no_merge {
        let merged = svc
            .merge(&MergeRequest {
                hash: Some(hash),
                filename: Some(filename),
                total_chunks: Some(RawNumber::from(total)),
            })
            .await?;
        report.merged = true;
        report.size = merged.size;
        report.locator = Some(merged.locator);
    }

    emit(format, &report, |r| {
        println!(
            "{} {} chunks staged, {} already present",
            "✓".green().bold(),
            r.staged.len().to_string().bold(),
            r.skipped.len()
        );
        println!("  Session: {}", r.hash.cyan());
        match &r.locator {
            Some(locator) => println!("  Merged: {} ({} bytes)", locator.yellow(), r.size),
            None => println!("  Not merged ({} chunks total)", r.total_chunks),
        }
    })
}

/// blake3 of the whole file, hex encoded.
async fn content_hash(file: &mut tokio::fs::File) -> anyhow::Result<String> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut hasher = blake3::Hasher::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

async fn read_chunk(file: &mut tokio::fs::File, index: u32, chunk_size: u64) -> anyhow::Result<Bytes> {
    file.seek(SeekFrom::Start(u64::from(index) * chunk_size)).await?;
    let mut buf = Vec::new();
    (&mut *file).take(chunk_size).read_to_end(&mut buf).await?;
    Ok(Bytes::from(buf))
}

async fn cmd_status(svc: &UploadService, args: StatusArgs, format: OutputFormat) -> anyhow::Result<()> {
    match svc.session(&args.hash).await? {
        Some(snapshot) => emit(format, &snapshot, |s| {
            println!("Session {} ({:?})", s.hash.cyan().bold(), s.state);
            if let Some(name) = &s.filename {
                println!("  File: {}", name.yellow());
            }
            let total = s.total_chunks.map_or("?".to_string(), |t| t.to_string());
            println!("  Chunks: {}/{} staged, {} bytes", s.uploaded_chunks.len(), total, s.staged_bytes);
            if let Some(merged) = &s.merged_into {
                println!("  Merged into: {}", merged.green());
            }
        }),
        None => emit(format, &serde_json::json!({ "uploadedChunks": [] }), |_| {
            println!("No chunks staged for {}.", args.hash.cyan());
        }),
    }
}

async fn cmd_merge(svc: &UploadService, args: MergeArgs, format: OutputFormat) -> anyhow::Result<()> {
    let merged = svc
        .merge(&MergeRequest {
            hash: Some(args.hash),
            filename: Some(args.filename),
            total_chunks: Some(RawNumber::from(args.total)),
        })
        .await?;
    emit(format, &merged, |m| {
        println!("{} Merged {} ({} bytes)", "✓".green().bold(), m.filename.yellow(), m.size);
        println!("  Locator: {}", m.locator);
    })
}

async fn cmd_ls(svc: &UploadService, format: OutputFormat) -> anyhow::Result<()> {
    let files = svc.list_files().await?;
    emit(format, &files, |files| {
        if files.is_empty() {
            println!("No files.");
        }
        for f in files {
            println!(
                "{:>12}  {}  {}",
                f.size,
                f.modified_time.format("%Y-%m-%d %H:%M:%S"),
                f.name.yellow()
            );
        }
    })
}

async fn cmd_get(svc: &UploadService, args: GetArgs) -> anyhow::Result<()> {
    let mut reader = svc.open_file(&args.filename).await?;
    let output = args.output.unwrap_or_else(|| PathBuf::from(&args.filename));
    if output.as_os_str() == "-" {
        tokio::io::copy(&mut reader, &mut tokio::io::stdout()).await?;
        return Ok(());
    }
    let mut out = tokio::fs::File::create(&output)
        .await
        .with_context(|| format!("creating {}", output.display()))?;
    let n = tokio::io::copy(&mut reader, &mut out).await?;
    eprintln!("{} Wrote {} bytes to {}", "✓".green(), n, output.display());
    Ok(())
}

async fn cmd_discard(svc: &UploadService, args: DiscardArgs, format: OutputFormat) -> anyhow::Result<()> {
    let removed = svc.discard(&args.hash).await?;
    emit(format, &serde_json::json!({ "hash": &args.hash, "removed": removed }), |_| {
        println!("Discarded {} chunks of {}", removed.to_string().bold(), args.hash.cyan());
    })
}
