//! epg-resolver - command-line host for the schedule engine
//!
//! Loads an XMLTV document from disk or a URL, then resolves playlist channel
//! names and prints what is airing on them.

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDateTime, TimeDelta};
use clap::{Parser, Subcommand};
use epg_resolver::epg::{EpgEngine, ProgramDescriptor, TimeConverter};
use epg_resolver::EngineConfig;
use std::io::BufRead;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod source;

/// Command-line arguments for epg-resolver
#[derive(Parser, Debug)]
#[command(name = "epg-resolver")]
#[command(about = "Match playlist channel names to an XMLTV guide and show what is on")]
#[command(version)]
struct Args {
    /// Schedule document: file path or http(s) URL, plain or gzip
    #[arg(short, long, env = "EPG_SCHEDULE")]
    schedule: String,

    /// Engine settings (JSON); defaults to the user config directory
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Query instant in host-local time, "YYYY-MM-DD HH:MM"; defaults to now
    #[arg(long, value_parser = parse_instant)]
    at: Option<NaiveDateTime>,

    /// UTC offset (hours) the schedule source writes its times in
    #[arg(long, allow_hyphen_values = true)]
    source_offset: Option<i32>,

    /// Host UTC offset (hours); defaults to the system time zone
    #[arg(long, allow_hyphen_values = true)]
    host_offset: Option<i32>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resolve names (arguments, or one per stdin line) and show the current programme
    Now { names: Vec<String> },
    /// Upcoming programmes for one playlist name
    Listing { name: String },
    /// Programmes overlapping the next few hours
    Range {
        name: String,
        #[arg(long, default_value = "6")]
        hours: i64,
    },
    /// Counts and date range of the loaded schedule
    Stats,
}

fn parse_instant(value: &str) -> Result<NaiveDateTime, String> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| format!("expected \"YYYY-MM-DD HH:MM\": {}", e))
}

fn build_engine(args: &Args) -> Result<EpgEngine> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load_from(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::load(),
    };
    if let Some(offset) = args.source_offset {
        config.source_utc_offset_hours = offset;
    }

    Ok(match args.host_offset {
        Some(hours) => {
            let converter = TimeConverter::new(
                config.source_utc_offset_hours,
                hours * 3600,
                config.timestamp_cache_size,
            )
            .with_embedded_offset(config.use_embedded_offset);
            EpgEngine::with_converter(config, converter)
        }
        None => EpgEngine::new(config),
    })
}

fn program_line(program: &ProgramDescriptor, is_current: bool) -> String {
    let mut line = format!(
        "{} {}-{}  {}",
        if is_current { "▶" } else { " " },
        TimeConverter::format(program.start),
        TimeConverter::format(program.ends_at),
        program.title
    );
    if let Some(episode) = &program.episode {
        line.push_str(&format!(" ({})", episode));
    }
    if let Some(category) = &program.category {
        line.push_str(&format!(" [{}]", category));
    }
    line
}

fn run_now(engine: &EpgEngine, names: Vec<String>, now: NaiveDateTime) -> Result<()> {
    let names = if names.is_empty() {
        std::io::stdin()
            .lock()
            .lines()
            .collect::<Result<Vec<_>, _>>()
            .context("failed to read names from stdin")?
    } else {
        names
    };

    for name in names.iter().filter(|n| !n.trim().is_empty()) {
        match engine.resolve(name) {
            Some(channel) => {
                let progress = engine
                    .progress_fraction(&channel.id, now)
                    .map(|f| format!(" ({:.0}%)", f * 100.0))
                    .unwrap_or_default();
                println!(
                    "{} -> {} [{}, {}]: {}{}",
                    name,
                    channel.name,
                    channel.id,
                    channel.tier.label(),
                    engine.describe(&channel.id, now),
                    progress
                );
            }
            None => println!("{} -> no match", name),
        }
    }
    Ok(())
}

fn run_listing(engine: &EpgEngine, name: &str, now: NaiveDateTime) -> Result<()> {
    let channel = engine
        .resolve(name)
        .with_context(|| format!("no schedule channel matches \"{}\"", name))?;
    println!("{} ({})", channel.name, channel.id);
    let entries = engine.listing(&channel.id, now);
    if entries.is_empty() {
        println!("  No schedule data");
    }
    for entry in entries {
        println!("  {}", program_line(&entry.program, entry.is_current));
    }
    Ok(())
}

fn run_range(engine: &EpgEngine, name: &str, hours: i64, now: NaiveDateTime) -> Result<()> {
    let channel = engine
        .resolve(name)
        .with_context(|| format!("no schedule channel matches \"{}\"", name))?;
    let to = now + TimeDelta::hours(hours.max(0));
    println!("{} ({}) {} - {}", channel.name, channel.id, now.format("%Y-%m-%d %H:%M"), to.format("%Y-%m-%d %H:%M"));
    for program in engine.programs_in_range(&channel.id, now, to) {
        let is_current = program.start <= now && now < program.ends_at;
        println!("  {}", program_line(&program, is_current));
    }
    Ok(())
}

fn run_stats(engine: &EpgEngine) {
    let stats = engine.stats();
    println!("channels:            {}", stats.channels);
    println!("programmes:          {}", stats.programs);
    println!("skipped channels:    {}", stats.skipped_channels);
    println!("skipped programmes:  {}", stats.skipped_programmes);
    if let (Some(first), Some(last)) = (&stats.first_start, &stats.last_stop) {
        println!("range:               {} .. {}", first, last);
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("epg_resolver=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let engine = build_engine(&args)?;

    let bytes = source::load(&args.schedule, &source::FetchConfig::default())?;
    info!(schedule = %args.schedule, bytes = bytes.len(), "loading schedule");
    engine
        .reload_bytes(&bytes)
        .with_context(|| format!("failed to parse schedule {}", args.schedule))?;

    let now = args.at.unwrap_or_else(|| Local::now().naive_local());

    match args.command {
        Command::Now { names } => run_now(&engine, names, now)?,
        Command::Listing { name } => run_listing(&engine, &name, now)?,
        Command::Range { name, hours } => run_range(&engine, &name, hours, now)?,
        Command::Stats => run_stats(&engine),
    }

    Ok(())
}
