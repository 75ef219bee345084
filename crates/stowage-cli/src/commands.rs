use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use colored::Colorize;
use stowage_blob::{open_backend, Backend, BlobError};
use stowage_crypto::{DigestAlgorithm, HashingReader};
use stowage_types::TracingCleanupObserver;
use tokio::io::AsyncWriteExt;

use crate::cli::*;
use crate::config::StowageConfig;

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = StowageConfig::load(&cli.config)?;
    match cli.command {
        Command::Blob(args) => match args.action {
            BlobAction::Put(args) => cmd_put(args, open(&config)?.as_ref()).await,
            BlobAction::Get(args) => cmd_get(args, open(&config)?.as_ref()).await,
            BlobAction::Rm(args) => cmd_rm(args, open(&config)?.as_ref()).await,
            BlobAction::Hash(args) => cmd_hash(args, config.blob.digest).await,
        },
        Command::Config(args) => match args.action {
            ConfigAction::Show => cmd_config_show(&config),
        },
    }
}

fn open(config: &StowageConfig) -> anyhow::Result<Arc<dyn Backend>> {
    open_backend(&config.blob, Arc::new(TracingCleanupObserver)).context("opening blob backend")
}

/// Stream `path` through the digest without keeping it in memory.
async fn hash_file(path: &Path, algorithm: DigestAlgorithm) -> anyhow::Result<(String, u64)> {
    let file = tokio::fs::File::open(path)
        .await
        .with_context(|| format!("opening {}", path.display()))?;
    let mut reader = HashingReader::new(file, algorithm);
    tokio::io::copy(&mut reader, &mut tokio::io::sink())
        .await
        .with_context(|| format!("reading {}", path.display()))?;
    Ok(reader.finish())
}

async fn cmd_hash(args: HashArgs, configured: DigestAlgorithm) -> anyhow::Result<()> {
    let algorithm = args.algorithm.unwrap_or(configured);
    let (digest, size) = hash_file(&args.file, algorithm).await?;
    println!(
        "{}  {}  ({} bytes, {})",
        digest.yellow(),
        args.file.display(),
        size,
        algorithm
    );
    Ok(())
}

async fn cmd_put(args: PutArgs, backend: &dyn Backend) -> anyhow::Result<()> {
    let algorithm = backend.digest_algorithm();
    let expected = match args.hash {
        Some(hash) => algorithm
            .parse_hex(&hash)
            .with_context(|| format!("--hash is not a {algorithm} digest"))?,
        None => hash_file(&args.file, algorithm).await?.0,
    };

    let mut file = tokio::fs::File::open(&args.file)
        .await
        .with_context(|| format!("opening {}", args.file.display()))?;
    let size = file
        .metadata()
        .await
        .with_context(|| format!("reading metadata of {}", args.file.display()))?
        .len();

    match backend.put(&args.name, &mut file, size, &expected).await {
        Ok(()) => {
            println!("{} Stored {} ({} bytes)", "✓".green().bold(), args.name.bold(), size);
            println!("  {}: {}", algorithm, expected.yellow());
            Ok(())
        }
        Err(BlobError::HashMismatch { computed, .. }) => {
            println!("{} Rejected {}", "✗".red().bold(), args.name.bold());
            println!("  expected: {}", expected.yellow());
            println!("  computed: {}", computed.red());
            anyhow::bail!("digest mismatch for {}", args.name)
        }
        Err(e) => Err(e).with_context(|| format!("storing {}", args.name)),
    }
}

async fn cmd_get(args: GetArgs, backend: &dyn Backend) -> anyhow::Result<()> {
    let mut blob = match backend.get(&args.name).await {
        Ok(blob) => blob,
        Err(e) if e.is_not_found() => anyhow::bail!("no such blob: {}", args.name),
        Err(e) => return Err(e).with_context(|| format!("opening {}", args.name)),
    };

    match &args.output {
        Some(path) => {
            let mut out = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            let copied = tokio::io::copy(&mut blob.reader, &mut out)
                .await
                .with_context(|| format!("downloading {}", args.name))?;
            out.flush().await?;
            eprintln!(
                "{} Wrote {} ({} bytes) to {}",
                "✓".green().bold(),
                args.name.bold(),
                copied,
                path.display()
            );
        }
        None => {
            let mut out = tokio::io::stdout();
            tokio::io::copy(&mut blob.reader, &mut out)
                .await
                .with_context(|| format!("downloading {}", args.name))?;
            out.flush().await?;
        }
    }
    Ok(())
}

async fn cmd_rm(args: RmArgs, backend: &dyn Backend) -> anyhow::Result<()> {
    match backend.remove(&args.name).await {
        Ok(()) => {
            println!("{} Removed {}", "✓".green().bold(), args.name.bold());
            Ok(())
        }
        Err(e) if e.is_not_found() => anyhow::bail!("no such blob: {}", args.name),
        Err(e) => Err(e).with_context(|| format!("removing {}", args.name)),
    }
}

fn cmd_config_show(config: &StowageConfig) -> anyhow::Result<()> {
    print!("{}", config.to_toml()?);
    Ok(())
}
