//! POD CLI - Command-line tool for POD v5 game archives.
//!
//! This is the main entry point for the `pod` command-line application.

use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use glob::{MatchOptions, Pattern};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use pod::prelude::*;

/// pod - list and unpack POD v5 game archives
#[derive(Parser)]
#[command(name = "pod")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show header information of a POD archive
    Info {
        /// Path to the POD file
        #[arg(env = "POD_ARCHIVE")]
        archive: PathBuf,
    },

    /// List contents of a POD archive
    List {
        /// Path to the POD file
        #[arg(env = "POD_ARCHIVE")]
        archive: PathBuf,

        /// Filter pattern (glob-style, either separator)
        #[arg(short, long)]
        filter: Option<String>,

        /// Show sizes and the opaque per-entry fields
        #[arg(short, long)]
        detailed: bool,

        /// Print the entry table as JSON
        #[arg(long, conflicts_with = "detailed")]
        json: bool,
    },

    /// Extract files from a POD archive
    Extract {
        /// Path to the POD file
        #[arg(env = "POD_ARCHIVE")]
        archive: PathBuf,

        /// Output directory
        #[arg(short, long, env = "POD_OUTPUT", default_value = ".")]
        output: PathBuf,

        /// Filter pattern (glob-style, either separator)
        #[arg(short, long)]
        filter: Option<String>,

        /// Report failed entries and continue with the rest
        #[arg(short, long)]
        keep_going: bool,

        /// Refuse to overwrite files that already exist
        #[arg(long)]
        no_clobber: bool,

        /// Extract entries on all cores (implies --keep-going)
        #[arg(short = 'j', long)]
        parallel: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { archive } => {
            cmd_info(&archive)?;
        }
        Commands::List {
            archive,
            filter,
            detailed,
            json,
        } => {
            cmd_list(&archive, filter.as_deref(), detailed, json)?;
        }
        Commands::Extract {
            archive,
            output,
            filter,
            keep_going,
            no_clobber,
            parallel,
        } => {
            let options = ExtractOptions {
                keep_going: keep_going || parallel,
                no_clobber,
                parallel,
            };
            cmd_extract(&archive, &output, filter.as_deref(), &options)?;
        }
    }

    Ok(())
}

/// Logs go to stderr so listings on stdout stay machine-readable.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn open_archive(path: &Path) -> Result<PodArchive> {
    let archive = PodArchive::open(path)
        .with_context(|| format!("Failed to open POD archive {}", path.display()))?;

    for (index, entry) in archive.out_of_bounds() {
        warn!(
            index,
            name = entry.name(),
            offset = entry.offset(),
            size = entry.size(),
            "entry extends past the end of the archive"
        );
    }

    Ok(archive)
}

fn cmd_info(path: &Path) -> Result<()> {
    let archive = open_archive(path)?;
    let header = archive.header();

    println!("Input is a POD file, version {}.", header.version);
    println!("Found {} files.", header.file_count);
    println!(
        "Table of contents at offset {}, names at offset {}.",
        header.table_offset,
        header.name_table_offset()
    );
    println!("Archive length: {} bytes", archive.len());

    let out_of_bounds = archive.out_of_bounds().count();
    if out_of_bounds > 0 {
        println!("{} entries extend past the end of the archive", out_of_bounds);
    }

    Ok(())
}

fn cmd_list(path: &Path, filter: Option<&str>, detailed: bool, json: bool) -> Result<()> {
    let archive = open_archive(path)?;
    let pattern = compile_filter(filter)?;

    let entries: Vec<&FileEntry> = archive
        .iter()
        .filter(|e| matches_filter(pattern.as_ref(), e.name()))
        .collect();

    if json {
        let out = serde_json::to_string_pretty(&entries).context("Failed to serialize entries")?;
        println!("{}", out);
        return Ok(());
    }

    println!("Input is a POD file, version {}.", archive.version());
    println!("Found {} files.", archive.entry_count());

    for entry in &entries {
        if detailed {
            println!("* {}", entry);
        } else {
            println!("{}", entry.name());
        }
    }

    println!("\nTotal: {} entries", entries.len());

    Ok(())
}

struct ExtractOptions {
    keep_going: bool,
    no_clobber: bool,
    parallel: bool,
}

fn cmd_extract(
    path: &Path,
    output: &Path,
    filter: Option<&str>,
    options: &ExtractOptions,
) -> Result<()> {
    let archive = open_archive(path)?;
    let pattern = compile_filter(filter)?;

    println!("Input is a POD file, version {}.", archive.version());
    println!("Found {} files.", archive.entry_count());

    // Resolve every destination before anything is written. Two entries
    // never share a destination.
    let mut failures = 0usize;
    let mut plan: Vec<(usize, PathBuf)> = Vec::new();
    let mut claimed: HashSet<PathBuf> = HashSet::new();
    for (index, entry) in archive.iter().enumerate() {
        if !matches_filter(pattern.as_ref(), entry.name()) {
            continue;
        }
        match entry.safe_output_path().map(|relative| output.join(relative)) {
            Ok(destination) if claimed.insert(destination.clone()) => {
                plan.push((index, destination))
            }
            Ok(destination) if options.keep_going => {
                warn!(
                    index,
                    "{} is already written by another entry",
                    destination.display()
                );
                failures += 1;
            }
            Ok(destination) => {
                anyhow::bail!(
                    "Entry #{} ({}) would overwrite {}",
                    index,
                    entry.name(),
                    destination.display()
                );
            }
            Err(e) if options.keep_going => {
                warn!("{}", e);
                failures += 1;
            }
            Err(e) => return Err(e).context("Cannot unpack entry"),
        }
    }

    println!("Extracting {} entries to {}...", plan.len(), output.display());
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory {}", output.display()))?;

    let pb = ProgressBar::new(plan.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})")?
            .progress_chars("#>-"),
    );

    let start = Instant::now();

    if options.parallel {
        let indices: Vec<usize> = plan.iter().map(|(index, _)| *index).collect();
        archive.extract_parallel(
            &indices,
            |entry| create_output(&output.join(entry.output_path()), options.no_clobber),
            |_, entry, result| {
                if let Err(e) = result {
                    pb.suspend(|| eprintln!("Error extracting {}: {}", entry.name(), e));
                    failures += 1;
                }
                pb.inc(1);
            },
        )?;
    } else {
        for (index, destination) in &plan {
            let name = archive.get(*index).map(|e| e.name()).unwrap_or_default();
            match extract_one(&archive, *index, destination, options.no_clobber) {
                Ok(copied) => debug!(name, copied, "wrote {}", destination.display()),
                Err(e) if options.keep_going => {
                    pb.suspend(|| eprintln!("Error extracting {}: {:#}", name, e));
                    failures += 1;
                }
                Err(e) => {
                    pb.abandon();
                    return Err(e.context(format!("Failed to extract {}", name)));
                }
            }
            pb.inc(1);
        }
    }

    pb.finish_with_message("Done");
    println!(
        "Extraction completed in {:?} ({} failed)",
        start.elapsed(),
        failures
    );

    if failures > 0 {
        anyhow::bail!("{} entries could not be extracted", failures);
    }

    Ok(())
}

fn extract_one(
    archive: &PodArchive,
    index: usize,
    destination: &Path,
    no_clobber: bool,
) -> Result<u64> {
    let mut sink = create_output(destination, no_clobber)
        .with_context(|| format!("Failed to create {}", destination.display()))?;

    let copied = archive.extract(index, &mut sink)?;
    sink.flush()
        .with_context(|| format!("Failed to sync {}", destination.display()))?;

    Ok(copied)
}

/// Extracted file. Flushing also syncs it to disk.
#[derive(Debug)]
struct OutputFile {
    inner: BufWriter<File>,
}

impl Write for OutputFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()?;
        self.inner.get_ref().sync_all()
    }
}

fn create_output(destination: &Path, no_clobber: bool) -> io::Result<OutputFile> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut options = OpenOptions::new();
    options.write(true);
    if no_clobber {
        options.create_new(true);
    } else {
        options.create(true).truncate(true);
    }

    Ok(OutputFile {
        inner: BufWriter::new(options.open(destination)?),
    })
}

fn compile_filter(filter: Option<&str>) -> Result<Option<Pattern>> {
    filter
        .map(|p| {
            Pattern::new(&p.replace('\\', "/"))
                .with_context(|| format!("Invalid filter pattern {}", p))
        })
        .transpose()
}

/// Match an archive name against the filter, ignoring case and separator
/// style. Patterns without wildcards match as substrings.
fn matches_filter(pattern: Option<&Pattern>, name: &str) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    let name = name.replace('\\', "/");
    if !pattern.as_str().contains(['*', '?', '[']) {
        return name
            .to_lowercase()
            .contains(&pattern.as_str().to_lowercase());
    }

    let options = MatchOptions {
        case_sensitive: false,
        require_literal_separator: false,
        require_literal_leading_dot: false,
    };
    pattern.matches_with(&name, options)
}
