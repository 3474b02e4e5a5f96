use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use linkdex_core::{Error, Library, Settings};
use serde::Deserialize;
use tracing_subscriber::{fmt, EnvFilter};
use walkdir::WalkDir;

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One bookmark to import. Plain-text inputs carry only the URL.
#[derive(Debug, Deserialize, PartialEq)]
struct ImportRecord {
    url: String,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Default, PartialEq)]
struct ImportReport {
    added: usize,
    duplicates: usize,
    errors: Vec<String>,
}

#[derive(Parser)]
#[command(name = "indexer")]
#[command(about = "Import, rebuild and inspect a bookmark index", long_about = None)]
struct Cli {
    /// Database directory
    #[arg(long, env = "LINKDEX_DB", default_value = "./linkdex.db")]
    db: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Add bookmarks from a URL list, JSON or JSONL file, or a directory of them
    Import {
        /// Input path (file or directory)
        #[arg(long)]
        input: String,
    },
    /// Rebuild every posting from stored page content
    Reindex,
    /// Write every bookmark URL, one per line
    Export {
        /// Output file; stdout when omitted
        #[arg(long)]
        output: Option<String>,
    },
    /// Print every term with its bookmark ids
    DumpIndex,
    /// Record a stats sample and print the stats as JSON
    Stats,
}

fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let cli = Cli::parse();
    let library = Library::open(&cli.db, Settings::default())?;

    match cli.command {
        Commands::Import { input } => {
            let report = import_path(&library, Path::new(&input))?;
            for err in &report.errors {
                eprintln!("{err}");
            }
            tracing::info!(added = report.added, duplicates = report.duplicates, errors = report.errors.len(), "import complete");
        }
        Commands::Reindex => {
            let n = library.reindex_all()?;
            tracing::info!(bookmarks = n, "reindex complete");
        }
        Commands::Export { output } => match output {
            Some(path) => library.export_bookmarks(BufWriter::new(File::create(path)?))?,
            None => library.export_bookmarks(io::stdout().lock())?,
        },
        Commands::DumpIndex => {
            let mut out = BufWriter::new(io::stdout().lock());
            for (term, ids) in library.dump_index()? {
                let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                writeln!(out, "{term}: {}", ids.join(" "))?;
            }
        }
        Commands::Stats => {
            let stats = library.update_bookmark_stats()?;
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }
    library.store().flush()?;
    Ok(())
}

fn import_path(library: &Library, input: &Path) -> Result<ImportReport> {
    let mut files: Vec<PathBuf> = Vec::new();
    if input.is_dir() {
        for entry in WalkDir::new(input).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
            let p = entry.path();
            if p.is_file() && matches!(extension(p), Some("json" | "jsonl" | "txt")) {
                files.push(p.to_path_buf());
            }
        }
    } else if input.is_file() {
        files.push(input.to_path_buf());
    } else {
        return Err(anyhow!("input not found: {}", input.display()));
    }

    let mut report = ImportReport::default();
    for file in files {
        let records = read_records(&file)?;
        tracing::debug!(file = %file.display(), records = records.len(), "read import file");
        for rec in records {
            match library.add_bookmark(&rec.url, &rec.tags) {
                Ok(_) => report.added += 1,
                Err(Error::Duplicate(_)) => report.duplicates += 1,
                Err(err) => report.errors.push(format!("url: {} ({err})", rec.url)),
            }
        }
    }
    Ok(report)
}

fn extension(p: &Path) -> Option<&str> { p.extension().and_then(|s| s.to_str()) }

fn read_records(file: &Path) -> Result<Vec<ImportRecord>> {
    let reader = BufReader::new(File::open(file)?);
    let mut out = Vec::new();
    match extension(file) {
        Some("json") => match serde_json::from_reader(reader)? {
            serde_json::Value::Array(arr) => {
                for v in arr {
                    out.push(serde_json::from_value(v)?);
                }
            }
            v @ serde_json::Value::Object(_) => out.push(serde_json::from_value(v)?),
            _ => {}
        },
        Some("jsonl") => {
            for line in reader.lines() {
                let line = line?;
                if line.trim().is_empty() { continue; }
                out.push(serde_json::from_str(&line)?);
            }
        }
        _ => {
            for line in reader.lines() {
                let s = line?.trim().to_string();
                if s.is_empty() || s.starts_with('#') { continue; }
                out.push(ImportRecord { url: s, tags: Vec::new() });
            }
        }
    }
    Ok(out)
}
