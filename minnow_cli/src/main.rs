use std::io;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use log::info;
use xxhash_rust::xxh3::xxh3_64;

use minnow_core::{Reader, StreamWriter, Writer};
use minnow_groups::decoder_for;

mod manifest;

use manifest::Manifest;

// ── CLI definition ─────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(
    name = "minnow",
    about = "minnow container files: pack typed blocks, inspect the tail index, decode groups",
    version
)]
struct Cli {
    /// Verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build a minnow file from a TOML manifest of headers and groups
    Pack {
        /// Manifest describing header records and groups
        manifest: PathBuf,
        /// Destination minnow file ("-" writes to stdout)
        output: PathBuf,
    },
    /// Print the file header, header table, and group table
    Inspect {
        /// minnow file to inspect
        file: PathBuf,
        /// Print per-group details with a fingerprint of each data region
        #[arg(long)]
        groups: bool,
    },
    /// Hex-dump or extract a single header record
    Header {
        /// minnow file
        file: PathBuf,
        /// Zero-based header index
        #[arg(short, long)]
        index: u64,
        /// Write raw bytes to a file instead of printing a hex dump
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Decode and print the values of one group
    ///
    /// Only the requested group's data and trailer are read from disk.
    Dump {
        /// minnow file
        file: PathBuf,
        /// Zero-based group index
        #[arg(short, long)]
        group: u64,
        /// Decode only this block of the group (bit-packed int groups only)
        #[arg(short, long)]
        block: Option<u64>,
    },
}

// ── Helpers ────────────────────────────────────────────────────────────────

fn human_bytes(n: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut v = n as f64;
    let mut unit = 0;
    while v >= 1024.0 && unit < UNITS.len() - 1 {
        v /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", n)
    } else {
        format!("{:.2} {}", v, UNITS[unit])
    }
}

fn group_type_name(tag: u64, trailer: &[u8], file_blocks: u64) -> String {
    match decoder_for(tag, trailer, file_blocks) {
        Ok(decoder) => decoder.name().to_string(),
        Err(_) => format!("unknown({})", tag),
    }
}

fn hex_dump(bytes: &[u8]) {
    for (i, chunk) in bytes.chunks(16).enumerate() {
        print!("  {:04x}  ", i * 16);
        for b in chunk {
            print!("{:02x} ", b);
        }
        // padding
        for _ in chunk.len()..16 {
            print!("   ");
        }
        print!("  |");
        for b in chunk {
            if b.is_ascii_graphic() || *b == b' ' {
                print!("{}", *b as char);
            } else {
                print!(".");
            }
        }
        println!("|");
    }
}

fn open_reader(file: &Path) -> anyhow::Result<Reader<io::BufReader<std::fs::File>>> {
    Reader::open(file).with_context(|| format!("opening minnow file {:?}", file))
}

// ── Subcommand implementations ─────────────────────────────────────────────

fn run_pack(manifest_path: PathBuf, output: PathBuf) -> anyhow::Result<()> {
    let manifest = Manifest::from_file(&manifest_path)?;
    let t0 = Instant::now();

    let header = if output.to_str() == Some("-") {
        let mut writer = StreamWriter::new(io::stdout().lock())?;
        manifest.write_to(&mut writer)?;
        writer.close()?
    } else {
        let mut writer = Writer::create(&output)
            .with_context(|| format!("creating output file {:?}", output))?;
        manifest.write_to(&mut writer)?;
        writer.close()?
    };

    info!(
        "packed {:?}: {} headers, {} groups, {} blocks in {:.3}s",
        manifest_path,
        header.header_count,
        manifest.groups.len(),
        header.block_count,
        t0.elapsed().as_secs_f64()
    );
    eprintln!("  headers     : {}", header.header_count);
    eprintln!("  groups      : {}", manifest.groups.len());
    eprintln!("  blocks      : {}", header.block_count);
    eprintln!("  tail start  : {}", header.tail_start);
    Ok(())
}

fn run_inspect(file: PathBuf, show_groups: bool) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let file_size = std::fs::metadata(&file)?.len();
    let header = *reader.file_header();
    let index = reader.index().clone();

    println!("=== minnow file: {:?} ===", file);
    println!();
    println!("  magic          : 0x{:x}", header.magic);
    println!("  format version : {}", header.version);
    println!("  headers        : {}", header.header_count);
    println!("  groups         : {}", index.group_count());
    println!("  blocks         : {}", header.block_count);
    println!("  tail start     : {}", header.tail_start);
    println!("  tail index     : {}", human_bytes(index.encoded_len()));
    println!("  trailers       : {}", human_bytes(index.trailer_bytes()));
    println!("  file on disk   : {}", human_bytes(file_size));

    if index.header_count() > 0 {
        println!();
        println!("  {:>8}  {:>14}  {:>12}", "header", "file offset", "size");
        println!("  {}", "-".repeat(38));
        for i in 0..index.header_count() {
            println!(
                "  {:>8}  {:>14}  {:>12}",
                i,
                index.header_start(i),
                human_bytes(index.header_sizes[i])
            );
        }
    }

    if show_groups {
        println!();
        println!(
            "  {:>6}  {:>10}  {:>14}  {:>12}  {:>10}  {:>8}  {:>16}",
            "group", "type", "file offset", "data", "trailer", "blocks", "xxh3"
        );
        println!("  {}", "-".repeat(90));
        for i in 0..index.group_count() {
            let data = reader.read_group_data(i as u64)?;
            let trailer = reader.read_group_trailer(i as u64)?;
            let blocks = decoder_for(index.group_types[i], &trailer, header.block_count)
                .ok()
                .and_then(|d| d.block_count())
                .map_or_else(|| "-".to_string(), |n| n.to_string());
            println!(
                "  {:>6}  {:>10}  {:>14}  {:>12}  {:>10}  {:>8}  {:016x}",
                i,
                group_type_name(index.group_types[i], &trailer, header.block_count),
                index.group_offsets[i],
                human_bytes(index.group_data_sizes[i]),
                human_bytes(index.group_tail_sizes[i]),
                blocks,
                xxh3_64(&data)
            );
        }
    }

    Ok(())
}

fn run_header(file: PathBuf, index: u64, output: Option<PathBuf>) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let raw = reader.read_header(index)?;

    match output {
        Some(path) => {
            std::fs::write(&path, &raw)?;
            eprintln!("  written {} to {:?}", human_bytes(raw.len() as u64), path);
        }
        None => {
            println!("--- header {} ({} bytes) ---", index, raw.len());
            hex_dump(&raw);
        }
    }
    Ok(())
}

fn run_dump(file: PathBuf, group: u64, block: Option<u64>) -> anyhow::Result<()> {
    let mut reader = open_reader(&file)?;
    let tag = reader.group_type(group)?;
    let trailer = reader.read_group_trailer(group)?;
    let decoder = decoder_for(tag, &trailer, reader.block_count())
        .with_context(|| format!("group {} has type {}", group, tag))?;
    let data = reader.read_group_data(group)?;

    let values = match block {
        Some(b) => {
            if decoder.block_count().is_none() {
                bail!(
                    "{} groups do not record block boundaries; dump the whole group instead",
                    decoder.name()
                );
            }
            decoder.decode_block(&data, b)?
        }
        None => decoder.decode(&data)?,
    };

    println!(
        "--- group {} ({}, {} values) ---",
        group,
        decoder.name(),
        values.len()
    );
    for line in values.to_strings().chunks(8) {
        println!("  {}", line.join(" "));
    }
    Ok(())
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level)).init();

    match cli.command {
        Commands::Pack { manifest, output } => run_pack(manifest, output),
        Commands::Inspect { file, groups } => run_inspect(file, groups),
        Commands::Header {
            file,
            index,
            output,
        } => run_header(file, index, output),
        Commands::Dump { file, group, block } => run_dump(file, group, block),
    }
}
