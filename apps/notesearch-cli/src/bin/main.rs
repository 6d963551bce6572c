use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

use notesearch_core::config::Config;
use notesearch_embed::get_default_embedder;
use notesearch_service::{IndexRequest, NotesService, SearchRequest};

#[derive(Parser)]
#[command(name = "notesearch")]
#[command(version)]
#[command(about = "Index a folder of notes and search it by meaning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk, embed and index a notes folder (defaults to data.notes_dir)
    Index {
        folder: Option<PathBuf>,
        /// Hide the progress bar
        #[arg(long)]
        quiet: bool,
    },
    /// Return the chunks closest to QUERY
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
    },
    Health,
    /// Show whether an index exists and its size
    Status,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet { return Ok(ProgressBar::hidden()); }
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

fn run(cli: Cli) -> Result<()> {
    let settings = Config::load().context("loading configuration")?.settings()?;
    let embedder = Arc::new(get_default_embedder(&settings.embedding));
    let service = NotesService::new(settings, embedder);

    match cli.command {
        Commands::Index { folder, quiet } => {
            let pb = progress_bar(quiet)?;
            print_json(&service.index_with_progress(IndexRequest { folder }, &pb)?)
        }
        Commands::Search { query, k } => print_json(&service.search(SearchRequest { query, k })?),
        Commands::Health => print_json(&service.health()),
        Commands::Status => print_json(&service.status()?),
    }
}

fn main() {
    init_tracing();
    if let Err(e) = run(Cli::parse()) {
        error!("{e:#}");
        std::process::exit(1);
    }
}
