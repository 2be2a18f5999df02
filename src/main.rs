use clap::{Parser, Subcommand};
use listkeeper::{error::ListError, ListStore, Revision, StoreConfig};
use serde::Serialize;
use std::io::Write as _;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "listkeeper")]
#[command(about = "Manage plain-text feed lists for firewall external connectors")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Storage root (defaults to $LISTKEEPER_DIR or the platform data directory)
    #[arg(short, long, global = true)]
    dir: Option<PathBuf>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// List all list files
    Lists,
    /// Show the entries of a list with their indices
    Show {
        /// List file name, e.g. blocklist.txt
        name: String,
    },
    /// Append an entry
    Add { name: String, value: String },
    /// Replace the entry at an index
    Update {
        name: String,
        #[arg(allow_negative_numbers = true)]
        index: i64,
        value: String,
        /// Revision from a previous `show`; refuse if the list changed since
        #[arg(long)]
        expect: Option<String>,
    },
    /// Remove the entry at an index
    Delete {
        name: String,
        #[arg(allow_negative_numbers = true)]
        index: i64,
        #[arg(long)]
        expect: Option<String>,
    },
    /// Write the raw list file to stdout
    Export { name: String },
    /// Show ledger records
    History {
        /// Only records for this list
        #[arg(short, long)]
        list: Option<String>,
        /// Show at most this many of the latest records
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
    /// List backups of a list, oldest first
    Backups { name: String },
}

#[tokio::main]
async fn main() {
    // Logs go to stderr so `export` output stays byte-exact.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();
    let config = match &cli.dir {
        Some(dir) => StoreConfig::with_root(dir),
        None => StoreConfig::from_env(),
    };
    info!("📂 Managing lists in: {}", config.root.display());

    if let Err(e) = run(cli, config).await {
        eprintln!("❌ {}", e);
        std::process::exit(match e.status_code() {
            400..=499 => 2,
            _ => 1,
        });
    }
}

async fn run(cli: Cli, config: StoreConfig) -> Result<(), ListError> {
    let json = cli.json;
    // Store calls block on file locks; keep them off the async workers.
    tokio::task::spawn_blocking(move || {
        let store = ListStore::new(config)?;
        dispatch(&store, cli.command, json)
    })
    .await
    .map_err(|e| ListError::Io {
        context: "store worker".to_string(),
        source: std::io::Error::other(e),
    })?
}

fn dispatch(store: &ListStore, command: Commands, json: bool) -> Result<(), ListError> {
    match command {
        Commands::Lists => {
            let index = store.index()?;
            if json {
                return print_json(&index);
            }
            println!("🗂️  Lists:");
            println!("{}", "─".repeat(50));
            for name in &index.files {
                println!("📄 {}", name);
            }
        }
        Commands::Show { name } => {
            let snapshot = store.read(&name)?;
            if json {
                return print_json(&snapshot);
            }
            println!("📄 {} ({} entries, revision {})", snapshot.filename, snapshot.count, snapshot.revision);
            println!("{}", "─".repeat(50));
            for entry in &snapshot.entries {
                println!("{:>5}  {}", entry.index, entry.value);
            }
        }
        Commands::Add { name, value } => {
            let outcome = store.add(&name, &value)?;
            if json {
                return print_json(&outcome);
            }
            println!("✅ Added '{}' to {} at index {}", outcome.value, name, outcome.index);
        }
        Commands::Update {
            name,
            index,
            value,
            expect,
        } => {
            let outcome = match expect {
                Some(rev) => store.update_checked(&name, index, &value, &Revision::from(rev))?,
                None => store.update(&name, index, &value)?,
            };
            if json {
                return print_json(&outcome);
            }
            println!(
                "✅ Updated {}[{}]: '{}' -> '{}'",
                name, outcome.index, outcome.old_value, outcome.new_value
            );
        }
        Commands::Delete { name, index, expect } => {
            let outcome = match expect {
                Some(rev) => store.delete_checked(&name, index, &Revision::from(rev))?,
                None => store.delete(&name, index)?,
            };
            if json {
                return print_json(&outcome);
            }
            println!("🗑️  Deleted '{}' from {}", outcome.deleted_value, name);
        }
        Commands::Export { name } => {
            let bytes = store.export_raw(&name)?;
            let mut stdout = std::io::stdout().lock();
            stdout
                .write_all(&bytes)
                .and_then(|_| stdout.flush())
                .map_err(|e| ListError::Io {
                    context: "write export to stdout".to_string(),
                    source: e,
                })?;
        }
        Commands::History { list, limit } => {
            let mut records = store.audit_log().records()?;
            if let Some(list) = &list {
                records.retain(|r| &r.list == list);
            }
            let skip = records.len().saturating_sub(limit);
            let records = &records[skip..];
            if json {
                return print_json(&records);
            }
            for record in records {
                print!("{}", record.to_line());
            }
        }
        Commands::Backups { name } => {
            let path = store.resolve(&name)?;
            let backups = store.backups().list_backups(&path)?;
            if json {
                return print_json(&backups);
            }
            println!("🗄️  Backups of {}:", name);
            println!("{}", "─".repeat(50));
            for backup in &backups {
                println!("{}", backup.display());
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), ListError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
