use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use stowage_crypto::DigestAlgorithm;

#[derive(Parser)]
#[command(
    name = "stowage",
    about = "Stowage: digest-verified blob storage",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file. Defaults are used if it does not exist.
    #[arg(short, long, global = true, default_value = "stowage.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Command {
    /// Store, fetch, and remove blobs
    Blob(BlobArgs),
    /// Inspect configuration
    Config(ConfigArgs),
}

#[derive(Args)]
pub struct BlobArgs {
    #[command(subcommand)]
    pub action: BlobAction,
}

#[derive(Subcommand)]
pub enum BlobAction {
    /// Upload a file, verifying it against an expected digest
    Put(PutArgs),
    /// Download a blob
    Get(GetArgs),
    /// Remove a blob
    Rm(RmArgs),
    /// Print the digest of a local file
    Hash(HashArgs),
}

#[derive(Args)]
pub struct PutArgs {
    pub name: String,
    pub file: PathBuf,
    /// Expected hex digest. Computed from the file when omitted.
    #[arg(long)]
    pub hash: Option<String>,
}

#[derive(Args)]
pub struct GetArgs {
    pub name: String,
    /// Write to this file instead of stdout.
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct RmArgs {
    pub name: String,
}

#[derive(Args)]
pub struct HashArgs {
    pub file: PathBuf,
    /// Overrides the configured algorithm.
    #[arg(short, long)]
    pub algorithm: Option<DigestAlgorithm>,
}

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
}
