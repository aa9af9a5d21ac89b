//! mkstore CLI
//!
//! Command-line interface for inspecting segment directories:
//! - Print segment statistics
//! - Look up rows by field value
//! - Scan a row range
//! - List segments in the data directory
//! - Generate a default config file

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mkstore::config::Config;
use mkstore::storage::{read_segment, ColumnScan, SegmentReader, SegmentSource, Value, INFO_FILE};

#[derive(Parser)]
#[command(name = "mkstore")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect columnar event segments")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Config file (default: standard locations, then environment)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show segment schema and per-column statistics
    Stats {
        /// Segment directory
        #[arg(short, long)]
        path: PathBuf,
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Find rows holding a value
    Lookup {
        /// Segment directory
        #[arg(short, long)]
        path: PathBuf,
        /// Field name
        #[arg(short, long)]
        field: String,
        /// Value, parsed by the field's type (timestamps: millis or RFC 3339)
        #[arg(short, long)]
        value: String,
        /// Row ids to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },

    /// Print rows [start, end)
    Scan {
        /// Segment directory
        #[arg(short, long)]
        path: PathBuf,
        /// Only this field (default: all fields)
        #[arg(short, long)]
        field: Option<String>,
        #[arg(long, default_value = "0")]
        start: u32,
        #[arg(long, default_value = "20")]
        end: u32,
        /// Print JSON lines
        #[arg(long)]
        json: bool,
    },

    /// List segments under a directory (default: storage.data_dir)
    List {
        dir: Option<PathBuf>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn init_tracing(config: &Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("mkstore={}", config.logging.level).into());

    if config.logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<Config> {
    match path {
        Some(path) => Config::load_with_env(path)
            .with_context(|| format!("Failed to load config {:?}", path)),
        None => Ok(Config::load_default()),
    }
}

fn main() {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        eprintln!("No command given. Run `mkstore --help` for usage.");
        std::process::exit(1);
    };

    let config = match load_config(cli.config.as_ref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    init_tracing(&config);

    if let Err(e) = run(command, &config) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(command: Commands, config: &Config) -> anyhow::Result<()> {
    match command {
        Commands::Stats { path, json } => {
            let reader = open(&resolve(config, path))?;
            let stats = reader.stats();

            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
                return Ok(());
            }

            println!("Index:    {}", stats.index);
            println!("Segment:  {}", stats.id);
            println!("Events:   {}", stats.event_count);
            if let (Some(min), Some(max)) = (stats.min_time, stats.max_time) {
                println!("Time:     {} .. {}", format_time(min), format_time(max));
            }
            println!("Fields:   {}", stats.field_count);
            println!();
            println!(
                "{:<4} {:<20} {:<10} {:<8} {:<13} {:>6} {:>12} {:>12} {:>10}",
                "ID", "Name", "Type", "Indexed", "Encoding", "Pages", "Data", "Index", "Distinct"
            );
            println!("{}", "-".repeat(103));
            for column in &stats.columns {
                println!(
                    "{:<4} {:<20} {:<10} {:<8} {:<13} {:>6} {:>12} {:>12} {:>10}",
                    column.id,
                    column.name,
                    column.field_type.to_string(),
                    if column.indexed { "yes" } else { "no" },
                    column.encoding.to_string(),
                    column.pages,
                    format_bytes(column.data_bytes),
                    format_bytes(column.index_bytes),
                    column
                        .cardinality
                        .map(|c| c.to_string())
                        .unwrap_or_else(|| "-".to_string()),
                );
            }
        }

        Commands::Lookup {
            path,
            field,
            value,
            limit,
        } => {
            let reader = open(&resolve(config, path))?;
            let column = reader
                .column(&field)
                .ok_or_else(|| anyhow!("Segment has no field {:?}", field))?;
            let value = Value::parse(&value, column.field().field_type)?;

            match column.lookup(&value)? {
                Some(rows) => {
                    println!("{} matching rows", rows.len());
                    let shown: Vec<String> = rows.iter().take(limit).map(|r| r.to_string()).collect();
                    println!("{}", shown.join(" "));
                    if rows.len() > limit as u64 {
                        println!("... ({} more)", rows.len() - limit as u64);
                    }
                }
                None => println!("0 matching rows"),
            }
        }

        Commands::Scan {
            path,
            field,
            start,
            end,
            json,
        } => {
            let reader = open(&resolve(config, path))?;
            match field {
                Some(name) => {
                    let column = reader
                        .column(&name)
                        .ok_or_else(|| anyhow!("Segment has no field {:?}", name))?;
                    let values = column.scan(start..end)?;
                    for (i, value) in values.iter().enumerate() {
                        if json {
                            println!(
                                "{}",
                                serde_json::json!({ "row": start as usize + i, "field": name, "value": value })
                            );
                        } else {
                            println!("{:>8}  {}", start as usize + i, value);
                        }
                    }
                }
                None => {
                    for (i, event) in reader.events(start..end)?.iter().enumerate() {
                        if json {
                            println!("{}", serde_json::to_string(event)?);
                        } else {
                            let fields: Vec<String> = event
                                .values
                                .iter()
                                .map(|(k, v)| format!("{}={}", k, v))
                                .collect();
                            println!(
                                "{:>8}  {}  {}",
                                start as usize + i,
                                format_time(event.timestamp),
                                fields.join(" ")
                            );
                        }
                    }
                }
            }
        }

        Commands::List { dir } => {
            let dir = dir.unwrap_or_else(|| PathBuf::from(&config.storage.data_dir));
            let mut entries: Vec<PathBuf> = std::fs::read_dir(&dir)
                .with_context(|| format!("Failed to list {:?}", dir))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| path.join(INFO_FILE).is_file())
                .collect();
            entries.sort();

            if entries.is_empty() {
                println!("No segments in {:?}", dir);
                return Ok(());
            }

            println!("{:<36} {:<16} {:>10}  {}", "Segment", "Index", "Events", "Path");
            println!("{}", "-".repeat(90));
            for path in entries {
                match read_segment(&path) {
                    Ok(reader) => println!(
                        "{:<36} {:<16} {:>10}  {}",
                        reader.id(),
                        reader.info().name,
                        reader.event_count(),
                        path.display()
                    ),
                    Err(e) => eprintln!("Skipping {:?}: {}", path, e),
                }
            }
        }

        Commands::Config { output } => {
            let config = mkstore::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }
    }

    Ok(())
}

/// Relative paths that do not exist here are looked up under `storage.data_dir`
fn resolve(config: &Config, path: PathBuf) -> PathBuf {
    if path.is_relative() && !path.exists() {
        let candidate = Path::new(&config.storage.data_dir).join(&path);
        if candidate.exists() {
            return candidate;
        }
    }
    path
}

fn open(path: &Path) -> anyhow::Result<SegmentReader> {
    read_segment(path).with_context(|| format!("Failed to read segment {:?}", path))
}

fn format_time(millis: i64) -> String {
    chrono::DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
        .unwrap_or_else(|| millis.to_string())
}

fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MiB", bytes as f64 / (1024.0 * 1024.0))
    }
}
