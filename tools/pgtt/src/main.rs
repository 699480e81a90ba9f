//! Command-line entry point: reads a JSON memory-map document, builds the
//! translation tables it describes, and writes a binary table image and/or
//! AArch64 assembly.

mod config;
mod error;
mod summary;

use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use snafu::ResultExt;

use pgtt_core::{emit_assembly, emit_binary, map, Allocator, CompatMode};

use error::LoadError;
use summary::print_table_summary;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CompatArg {
    /// Architecturally correct: PXN/XN sourced from the execute-never attribute.
    Default,
    /// Reproduces the upstream tool's descriptor bug (PXN/XN sourced from NS).
    OriginalTool,
}

impl From<CompatArg> for CompatMode {
    fn from(v: CompatArg) -> Self {
        match v {
            CompatArg::Default => CompatMode::Default,
            CompatArg::OriginalTool => CompatMode::OriginalTool,
        }
    }
}

/// Generate AArch64 stage-1 translation tables from a JSON memory map.
#[derive(Debug, Parser)]
#[command(name = "pgtt", version, about)]
struct Cli {
    /// Path to the JSON memory-map document.
    #[arg(long, short = 'c')]
    config: PathBuf,

    /// Binary table image output path. With more than one `pagetables[]`
    /// entry, the page table's index is appended before the extension.
    #[arg(long)]
    out_bin: Option<PathBuf>,

    /// Assembly output path. Suffixed the same way as `--out-bin`.
    #[arg(long)]
    out_asm: Option<PathBuf>,

    /// Print a summary table of allocated tables to stdout.
    #[arg(long)]
    summary: bool,

    /// Descriptor bit 53/54 compatibility mode.
    #[arg(long, value_enum, default_value = "default")]
    compat: CompatArg,

    /// Increase log verbosity (may be repeated).
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all but error-level log output.
    #[arg(short = 'q', long)]
    quiet: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    if let Err(err) = run(&cli) {
        log::error!("{err}");
        anyhow::bail!(err);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), LoadError> {
    let raw = fs::read_to_string(&cli.config).map_err(|source| LoadError::Read {
        path: cli.config.display().to_string(),
        source,
    })?;
    let doc = config::load_document(&raw)?;

    let multi = doc.pagetables.len() > 1;

    for (idx, raw_pgt) in doc.pagetables.iter().enumerate() {
        log::info!("generating page table {idx}");
        let spec = config::build_page_table_spec(raw_pgt)?;

        let mut alloc = Allocator::new(spec.mmu.ttbr, spec.mmu.granule.bytes(), None);
        let root = alloc.build_root(&spec.mmu).context(error::BuildSnafu)?;
        for region in spec.regions {
            map(&mut alloc, &spec.mmu, root, region).context(error::BuildSnafu)?;
        }

        if cli.summary {
            println!("{}", format!("page table {idx}").bold());
            print_table_summary(&alloc);
        }

        if let Some(path) = &cli.out_bin {
            let path = suffixed_path(path, idx, multi);
            write_binary(&alloc, &spec.mmu, cli.compat.into(), &path)?;
            log::info!("{:>12} {}", "wrote".green().bold(), path.display());
        }

        if let Some(path) = &cli.out_asm {
            let path = suffixed_path(path, idx, multi);
            write_assembly(
                &alloc,
                &spec.mmu,
                cli.compat.into(),
                raw_pgt.gen_table_runtime,
                &path,
            )?;
            log::info!("{:>12} {}", "wrote".green().bold(), path.display());
        }
    }

    Ok(())
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn suffixed_path(path: &Path, idx: usize, multi: bool) -> PathBuf {
    if !multi {
        return path.to_path_buf();
    }
    let stem = path.file_stem().unwrap_or_default().to_string_lossy();
    let ext = path.extension().map(|e| e.to_string_lossy().to_string());
    let mut name = format!("{stem}_{idx}");
    if let Some(ext) = ext {
        name.push('.');
        name.push_str(&ext);
    }
    path.with_file_name(name)
}

fn write_binary(
    alloc: &Allocator,
    mmu: &pgtt_core::MmuConfig,
    compat: CompatMode,
    path: &Path,
) -> Result<(), LoadError> {
    let mut out = Vec::new();
    emit_binary(alloc, mmu, compat, &mut out).map_err(|source| LoadError::Write {
        path: path.display().to_string(),
        source,
    })?;
    fs::write(path, out).map_err(|source| LoadError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn write_assembly(
    alloc: &Allocator,
    mmu: &pgtt_core::MmuConfig,
    compat: CompatMode,
    gen_table_runtime: bool,
    path: &Path,
) -> Result<(), LoadError> {
    let mut out = String::new();
    emit_assembly(alloc, mmu, compat, gen_table_runtime, &mut out)
        .expect("writing to a String cannot fail");
    fs::write(path, out).map_err(|source| LoadError::Write {
        path: path.display().to_string(),
        source,
    })
}
