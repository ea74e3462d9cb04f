// SPDX-License-Identifier: MIT
//! Inspect and verify linked binary files

use std::env;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use linked_binary_file::{FileHeader, FileReader, LinkRecord, ReaderConfig};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "lbf", about = "Inspect and verify linked binary files")]
struct Cli {
    /// Log filter, falls back to LBF_LOG and then "warn"
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the header and link table
    Inspect {
        path: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Validate the file and exit non-zero on failure
    Verify { path: PathBuf },
}

#[derive(Serialize)]
struct Report {
    path: PathBuf,
    sha256: String,
    header: FileHeader,
    links: Vec<LinkRecord>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = cli
        .log_level
        .or_else(|| env::var("LBF_LOG").ok())
        .unwrap_or_else(|| "warn".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Inspect { path, json } => inspect(path, json),
        Command::Verify { path } => verify(path),
    }
}

fn load(path: &Path) -> anyhow::Result<FileReader<'static>> {
    FileReader::open_with(path, ReaderConfig::from_env())
        .with_context(|| format!("failed to load {}", path.display()))
}

fn inspect(path: PathBuf, json: bool) -> anyhow::Result<()> {
    let reader = load(&path)?;
    let report = Report {
        sha256: hex::encode(Sha256::digest(reader.as_bytes())),
        header: *reader.header(),
        links: reader.relocations().iter().collect(),
        path,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let header = &report.header;
    println!("file:               {}", report.path.display());
    println!("sha256:             {}", report.sha256);
    println!("magic:              {:#x}", header.magic_value());
    println!("version:            {:#x}", header.version);
    println!("flags:              {:#04x}", header.flags);
    println!("links_count:        {}", header.links_count);
    println!("links_table_offset: {}", header.links_table_offset);
    println!("start_offset:       {}", header.start_offset);
    println!("data_size:          {}", header.data_size);
    println!("file_size:          {}", header.file_size);
    for link in &report.links {
        println!("link:               {} -> {}", link.origin, link.destination);
    }

    Ok(())
}

fn verify(path: PathBuf) -> anyhow::Result<()> {
    let reader = load(&path)?;
    info!(links = reader.relocations().len(), "verified");
    println!("{}: ok", path.display());
    Ok(())
}
