#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use output::OutputMode;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "cst: tamper-evident custody ledger",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON output instead of human-readable text.
    #[arg(long, global = true)]
    json: bool,

    /// Project root holding custody.toml and the ledger database.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    /// Derive the output mode from flags.
    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Initialize a custody ledger",
        after_help = "EXAMPLES:\n    # Initialize in the current directory\n    cst init"
    )]
    Init(cmd::InitArgs),

    #[command(
        about = "Register a device or upgrade its signing scheme",
        after_help = "EXAMPLES:\n    # Register a software-tier device\n    cst register-device cam-07 --public-key 61626364 --crypto-version software-hmac"
    )]
    RegisterDevice(cmd::RegisterDeviceArgs),

    #[command(
        about = "Verify an upload and record the outcome",
        after_help = "EXAMPLES:\n    # Ingest a file\n    cst ingest clip.mp4 --device cam-07 --claimed-hash <sha256> \\\n        --signed-payload <hex> --signature <hex> --source live"
    )]
    Ingest(cmd::IngestArgs),

    #[command(
        about = "Append a generic event to the ledger",
        after_help = "EXAMPLES:\n    # Record a tag deletion\n    cst append tag_deleted tag:stale --data '{\"tag\":\"stale\"}' --actor admin:pat"
    )]
    Append(cmd::AppendArgs),

    #[command(
        about = "List ledger entries",
        after_help = "EXAMPLES:\n    # All upload events\n    cst list --event-type upload\n\n    # Machine-readable page\n    cst list --offset 100 --limit 50 --json"
    )]
    List(cmd::ListArgs),

    #[command(
        about = "Show the audit trail for one subject",
        after_help = "EXAMPLES:\n    # Everything that ever happened to one media record\n    cst trail md-3fa8c2d91b04"
    )]
    Trail(cmd::TrailArgs),

    #[command(
        about = "Verify the chain's integrity",
        after_help = "EXAMPLES:\n    # Full scan in default batches\n    cst verify\n\n    # Exit code is 1 when the chain is invalid\n    cst verify --batch-size 100 --json"
    )]
    Verify(cmd::VerifyArgs),
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let mode = cli.output_mode();
    let root = cli.root.clone();

    match &cli.command {
        Commands::Init(args) => cmd::init(args, &root, mode),
        Commands::RegisterDevice(args) => cmd::register_device(args, &root, mode),
        Commands::Ingest(args) => cmd::ingest(args, &root, mode),
        Commands::Append(args) => cmd::append(args, &root, mode),
        Commands::List(args) => cmd::list(args, &root, mode),
        Commands::Trail(args) => cmd::trail(args, &root, mode),
        Commands::Verify(args) => cmd::verify(args, &root, mode),
    }
}
