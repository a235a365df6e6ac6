use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use client_importer::config::ImporterConfig;
use client_importer::gateway::RpcGateway;
use client_importer::import::{
    file_identity, validate_file, BatchImporter, BatchResult, CheckpointStore, ImportRequest, LineStatus,
    RunReport, StartAt,
};
use client_importer::logging::init_logging;
use client_importer::reader::Dialect;
use client_importer::validation::document;

#[derive(Parser)]
#[command(name = "client_importer")]
#[command(about = "Bulk import of client records into the remote account system")]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./importer.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import a client file, resuming from its checkpoint when one exists
    Import {
        file: PathBuf,
        #[arg(long)]
        batch_size: Option<usize>,
        #[arg(long)]
        throttle_ms: Option<u64>,
        /// Start at this data-record offset instead of the checkpoint
        #[arg(long, conflicts_with = "fresh")]
        offset: Option<u64>,
        /// Ignore any stored checkpoint and start from the first record
        #[arg(long)]
        fresh: bool,
        /// Stop after this many chunks, keeping the checkpoint
        #[arg(long)]
        max_chunks: Option<usize>,
        /// Abort on the first line whose column count does not match the header
        #[arg(long)]
        strict: bool,
        #[arg(long)]
        json: bool,
    },
    /// Check a file without contacting the remote system
    Validate {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Validate and format a single tax document number
    Document { value: String },
    /// Test the connection to the remote endpoint
    Ping,
    /// Inspect or remove stored checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Subcommand)]
enum CheckpointAction {
    List,
    Clear { file: PathBuf },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = ImporterConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let _guard = init_logging(&config.import.log_dir);

    match cli.command {
        Commands::Import { file, batch_size, throttle_ms, offset, fresh, max_chunks, strict, json } => {
            if let Some(size) = batch_size {
                config.import.batch_size = size;
            }
            if let Some(ms) = throttle_ms {
                config.import.throttle_ms = ms;
            }
            config.api.validate()?;
            config.import.validate()?;

            let gateway = RpcGateway::new(config.api.clone()).context("failed to build HTTP client")?;
            let checkpoints = CheckpointStore::open(&config.import.checkpoint_dir)
                .context("failed to open checkpoint store")?;
            let importer = BatchImporter::new(Arc::new(gateway), config.import.clone(), checkpoints);

            let start = match (offset, fresh) {
                (Some(n), _) => StartAt::Offset(n),
                (None, true) => StartAt::Beginning,
                (None, false) => StartAt::Checkpoint,
            };
            let cancel = CancellationToken::new();
            let mut request = ImportRequest::new(&file).start_at(start).cancel_on(cancel.clone());
            if let Some(n) = max_chunks {
                request = request.max_chunks(n);
            }
            if strict {
                request = request.strict();
            }

            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupt received, stopping after the current record");
                    cancel.cancel();
                }
            });

            info!("Importing {}", file.display());
            let report = importer.import_file(request).await;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }
            if let Some(err) = &report.abort {
                bail!("import aborted: {}", err);
            }
        }
        Commands::Validate { file, json } => {
            let result = validate_file(&file, Dialect::default())
                .with_context(|| format!("failed to read {}", file.display()))?;
            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_summary(&result);
            }
            if result.failed > 0 {
                bail!("{} of {} records are invalid", result.failed, result.total);
            }
        }
        Commands::Document { value } => match document::normalize(&value) {
            Some(doc) => println!("{} {} ({})", doc.kind().label(), doc.formatted(), doc.digits()),
            None => bail!("'{}' is not a valid CPF or CNPJ", value),
        },
        Commands::Ping => {
            config.api.validate()?;
            let gateway = RpcGateway::new(config.api.clone())?;
            match gateway.test_connection().await {
                Ok(()) => println!("✅ Connected to {}", config.api.url),
                Err(e) => {
                    if let Some(body) = gateway.last_response() {
                        eprintln!("Last response: {}", body);
                    }
                    bail!("connection test failed: {}", e);
                }
            }
        }
        Commands::Checkpoint { action } => {
            let store = CheckpointStore::open(&config.import.checkpoint_dir)
                .context("failed to open checkpoint store")?;
            match action {
                CheckpointAction::List => {
                    let checkpoints = store.list()?;
                    if checkpoints.is_empty() {
                        println!("No checkpoints stored");
                    }
                    for cp in checkpoints {
                        println!(
                            "{}  next record {}  total {} (success {}, failed {}, skipped {})  updated {}",
                            cp.file_path,
                            cp.next_offset,
                            cp.totals.total,
                            cp.totals.success,
                            cp.totals.failed,
                            cp.totals.skipped,
                            cp.updated_at.format("%Y-%m-%d %H:%M:%S")
                        );
                    }
                }
                CheckpointAction::Clear { file } => clear_checkpoint(&store, &file)?,
            }
        }
    }

    Ok(())
}

fn clear_checkpoint(store: &CheckpointStore, file: &Path) -> Result<()> {
    let file_id = file_identity(file).with_context(|| format!("failed to hash {}", file.display()))?;
    if store.clear(&file_id)? {
        println!("Checkpoint for {} removed", file.display());
    } else {
        println!("No checkpoint for {}", file.display());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    print_summary(&report.summary);
    if let Some(offset) = report.resumed_from {
        println!("   Resumed from record: {}", offset);
    }
    println!(
        "   Cumulative: {} total, {} success, {} failed, {} skipped",
        report.totals.total, report.totals.success, report.totals.failed, report.totals.skipped
    );
    if !report.finished {
        println!("   Next record: {}", report.next_offset);
    }
    if let Some(path) = &report.log_file {
        println!("   Log file: {}", path.display());
    }
}

fn print_summary(result: &BatchResult) {
    for detail in &result.details {
        let mark = match detail.status {
            LineStatus::Success => "✅",
            LineStatus::Failed => "❌",
            LineStatus::Skipped => "⏭️",
        };
        println!("{} line {:>5}  {:<40} {}", mark, detail.line, detail.email, detail.message);
    }
    println!("\n📊 Results:");
    println!("   Total: {}", result.total);
    println!("   Success: {}", result.success);
    println!("   Failed: {}", result.failed);
    println!("   Skipped: {}", result.skipped);
}
