use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "reef",
    about = "Reef -- sealed envelopes and content-addressed blob stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// TOML settings file
    #[arg(long, global = true, env = "REEF_SETTINGS")]
    pub settings: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create or inspect an encrypted identity file
    Identity(IdentityArgs),
    /// Seal a file into an envelope for a recipient
    Seal(SealArgs),
    /// Open an envelope addressed to you
    Open(OpenArgs),
    /// Administer per-owner blob stores
    Store(StoreArgs),
}

/// Location of an identity file and the password protecting it.
#[derive(Args)]
pub struct IdentityFile {
    #[arg(short, long, env = "REEF_IDENTITY", default_value = "identity.reef")]
    pub identity: PathBuf,
    #[arg(long, env = "REEF_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args)]
pub struct IdentityArgs {
    #[command(subcommand)]
    pub action: IdentityAction,
}

#[derive(Subcommand)]
pub enum IdentityAction {
    /// Generate a new key pair and save it
    Generate(IdentityFile),
    /// Print the public key of a saved identity
    Show(IdentityFile),
}

#[derive(Args)]
pub struct SealArgs {
    #[command(flatten)]
    pub from: IdentityFile,
    /// Recipient public key
    #[arg(long)]
    pub to: String,
    /// File to seal
    pub input: PathBuf,
    /// Write the envelope here
    #[arg(short, long, required_unless_present = "deliver", conflicts_with = "deliver")]
    pub output: Option<PathBuf>,
    /// Store the envelope in the recipient's store instead
    #[arg(long)]
    pub deliver: bool,
    #[arg(long, default_value = "application/octet-stream")]
    pub content_type: String,
    #[arg(long, default_value = "")]
    pub permit: String,
    /// Sealed chunk size; overrides the settings file
    #[arg(long)]
    pub chunk_size: Option<usize>,
}

#[derive(Args)]
pub struct OpenArgs {
    #[command(flatten)]
    pub me: IdentityFile,
    /// Envelope file
    #[arg(required_unless_present = "id", conflicts_with = "id")]
    pub input: Option<PathBuf>,
    /// Blob id in your own store
    #[arg(long)]
    pub id: Option<String>,
    /// Write the content here instead of stdout
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args)]
pub struct StoreArgs {
    #[command(subcommand)]
    pub action: StoreAction,
}

#[derive(Subcommand)]
pub enum StoreAction {
    /// Allocate a store for an owner
    Init {
        #[arg(long)]
        owner: String,
        /// Capacity in bytes, 0 for unlimited; overrides the settings file
        #[arg(long)]
        capacity: Option<u64>,
    },
    /// Store a file as a blob
    Put {
        #[arg(long)]
        owner: String,
        file: PathBuf,
    },
    /// Fetch a blob
    Get {
        #[arg(long)]
        owner: String,
        id: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List blobs in store order
    List {
        #[arg(long)]
        owner: String,
        #[arg(long, default_value = "0")]
        start: u64,
        #[arg(short = 'n', long, default_value = "50")]
        limit: usize,
    },
    /// Show usage for one owner, or list all owners
    Stat {
        #[arg(long)]
        owner: Option<String>,
    },
}
