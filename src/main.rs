//! Hoard CLI - Command-line tool for listing, extracting and repacking game
//! archives.
//!
//! This is the main entry point for the Hoard command-line application.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::debug;
use tracing_subscriber::{fmt, EnvFilter};

use hoard::prelude::*;

/// Hoard - game archive extraction tool
#[derive(Parser)]
#[command(name = "hoard")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Family configuration with game engines, keys and install paths
    #[arg(long, global = true, env = "HOARD_FAMILY")]
    family: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the contents of an archive
    List {
        /// Archive URI (`game:/Morrowind.bsa#Morrowind`, a path, or a wildcard)
        uri: String,

        /// Filter pattern (glob-style)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,

        /// Also list the contents of nested archives
        #[arg(short, long)]
        nested: bool,
    },

    /// Extract files from an archive
    Export {
        /// Archive URI (`game:/Morrowind.bsa#Morrowind`, a path, or a wildcard)
        uri: String,

        /// Output directory
        #[arg(short, long, env = "HOARD_OUTPUT")]
        output: PathBuf,

        /// Filter pattern (glob-style)
        #[arg(short, long, conflicts_with = "regex")]
        filter: Option<String>,

        /// Filter pattern (regular expression)
        #[arg(long)]
        regex: Option<String>,

        /// Worker threads
        #[arg(short, long, default_value_t = hoard::export::DEFAULT_WORKERS)]
        workers: usize,

        /// Write .set/.meta manifests for a later import
        #[arg(long)]
        marker: bool,

        /// Copy payloads verbatim, without parts or re-serialization
        #[arg(long)]
        raw: bool,

        /// Re-serialize typed objects where a factory supports it
        #[arg(long)]
        object: bool,
    },

    /// Rebuild archives from a directory exported with --marker
    Import {
        /// Exported directory containing a .set manifest
        input: PathBuf,

        /// Output directory for the rebuilt archives
        #[arg(short, long, env = "HOARD_OUTPUT")]
        output: PathBuf,

        /// Worker threads
        #[arg(short, long, alias = "import-workers", default_value_t = hoard::export::DEFAULT_WORKERS)]
        workers: usize,

        /// Game whose key material the writers use
        #[arg(short, long)]
        game: Option<String>,
    },
}

fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    fmt()
        .with_env_filter(filter)
        .with_target(verbosity >= 2)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let resolver = resolver(cli.family.as_deref())?;

    match cli.command {
        Commands::List {
            uri,
            filter,
            detailed,
            nested,
        } => {
            cmd_list(&resolver, &uri, filter.as_deref(), detailed, nested)?;
        }
        Commands::Export {
            uri,
            output,
            filter,
            regex,
            workers,
            marker,
            raw,
            object,
        } => {
            let mut option = FileOption::DEFAULT;
            option.set(FileOption::MARKER, marker);
            option.set(FileOption::RAW, raw);
            option.set(FileOption::OBJECT, object);

            let mut options = ExportOptions::default().with_option(option).with_workers(workers);
            if let Some(pattern) = filter {
                options = options.with_filter(Filter::glob(&pattern).context("Invalid filter")?);
            } else if let Some(pattern) = regex {
                options = options.with_filter(Filter::regex(&pattern).context("Invalid regex")?);
            }
            cmd_export(&resolver, &uri, &output, options)?;
        }
        Commands::Import {
            input,
            output,
            workers,
            game,
        } => {
            let mut importer = Importer::new(ImportOptions::default().with_workers(workers));
            if let Some(id) = game {
                let game = resolver.game(&id).context("Unknown game")?;
                importer = importer.with_game(game.clone());
            }
            cmd_import(&importer, &input, &output)?;
        }
    }

    Ok(())
}

fn resolver(family: Option<&Path>) -> Result<Resolver> {
    let resolver = Resolver::new();
    let Some(path) = family else {
        return Ok(resolver);
    };
    let family = FamilyConfig::load(path)
        .with_context(|| format!("Failed to load family configuration {}", path.display()))?;
    debug!(family = %family.id, games = family.games.len(), "Loaded family configuration");
    Ok(resolver.with_family(family))
}

fn open(resolver: &Resolver, uri: &str) -> Result<Opened> {
    let start = Instant::now();
    let opened = resolver
        .open(uri)
        .with_context(|| format!("Failed to open {uri}"))?;

    let entries: usize = opened
        .archives()
        .iter()
        .map(|a| a.files().map_or(0, <[FileSource]>::len))
        .sum();
    println!(
        "Opened {} ({} archive(s), {} entries) in {:?}",
        opened.name(),
        opened.archives().len(),
        entries,
        start.elapsed()
    );
    Ok(opened)
}

fn cmd_list(resolver: &Resolver, uri: &str, filter: Option<&str>, detailed: bool, nested: bool) -> Result<()> {
    let opened = open(resolver, uri)?;
    let filter = filter.map(Filter::glob).transpose().context("Invalid filter")?;

    let mut count = 0;
    for archive in opened.archives() {
        count += list_archive(archive, "", filter.as_ref(), detailed, nested)?;
    }

    println!("\nTotal: {} entries", count);

    Ok(())
}

fn list_archive(archive: &Archive, prefix: &str, filter: Option<&Filter>, detailed: bool, nested: bool) -> Result<usize> {
    let mut count = 0;
    for file in archive.files()? {
        let path = format!("{prefix}{}", file.path);

        if filter.map_or(true, |f| f.matches(&file.path)) {
            if detailed {
                println!(
                    "{:>12} {:>12} {} {}",
                    file.packed_size,
                    file.file_size,
                    if file.is_nested() { "+" } else { " " },
                    path
                );
            } else {
                println!("{}", path);
            }
            count += 1;
        }

        if nested && file.is_nested() {
            match archive.sub_archive(file) {
                Ok(child) => count += list_archive(child, &format!("{path}:"), filter, detailed, nested)?,
                Err(e) => debug!(path = %path, error = %e, "Entry is not a readable archive"),
            }
        }
    }
    Ok(count)
}

fn cmd_export(resolver: &Resolver, uri: &str, output: &Path, options: ExportOptions) -> Result<()> {
    let opened = open(resolver, uri)?;

    println!("Exporting to {}...", output.display());

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let progress = pb.clone();
    let failures = pb.clone();
    let exporter = Exporter::new(options)
        .on_progress(move |done, total, _| {
            progress.set_length(total as u64);
            progress.set_position(done as u64);
        })
        .on_failure(move |failure| {
            failures.println(format!("Error exporting {}: {}", failure.path, failure.message));
        });

    let start = Instant::now();
    let report = exporter
        .export_opened(&opened, output)
        .with_context(|| format!("Failed to export {uri}"))?;
    pb.finish_with_message("Done");

    let stats = report.stats;
    println!(
        "Exported {} files in {:?} ({} skipped, {} errors)",
        stats.exported,
        start.elapsed(),
        stats.skipped,
        stats.failed
    );

    Ok(())
}

fn cmd_import(importer: &Importer, input: &Path, output: &Path) -> Result<()> {
    println!("Importing {} -> {}", input.display(), output.display());

    let start = Instant::now();
    let report = importer
        .import(input, output)
        .with_context(|| format!("Failed to import {}", input.display()))?;

    for failure in &report.failures {
        eprintln!("Error importing {failure}");
    }
    for archive in &report.archives {
        println!("Wrote {}", archive.display());
    }
    println!(
        "Imported {} of {} files in {:?} ({} errors)",
        report.stats.imported,
        report.stats.total,
        start.elapsed(),
        report.stats.failed
    );

    Ok(())
}
