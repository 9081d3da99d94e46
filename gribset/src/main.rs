use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result, bail};
use clap::Parser;
use gribset::{
    Collection, DisplayConfig, OpenOptions, SalvageMode, Store, Value,
    codec::framed::FramedCodec,
};
use tracing::info;

/// Bytes of each encoded record shown by `--hex`.
const HEX_PREVIEW: usize = 32;

#[derive(Parser, Debug)]
#[command(name = "gribset")]
#[command(about = "Inspect, filter and rewrite files of framed messages")]
struct Args {
    /// Input file
    file: PathBuf,

    /// Comma separated keys to tabulate
    #[arg(long, value_delimiter = ',', conflicts_with = "namespace")]
    keys: Option<Vec<String>>,

    /// Tabulate the keys of this namespace instead
    #[arg(long)]
    namespace: Option<String>,

    /// Elide the middle of long listings
    #[arg(long, value_name = "N")]
    max_rows: Option<usize>,

    /// TOML display configuration; command line options override it
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Skip data payloads while decoding
    #[arg(long)]
    headers_only: bool,

    /// Keep the records decoded before a malformed one
    #[arg(long)]
    best_effort: bool,

    /// Keep only records where KEY equals VALUE (repeatable)
    #[arg(long, value_name = "KEY=VALUE")]
    filter: Vec<String>,

    /// Python-style slice START:END applied after filtering
    #[arg(long, value_name = "START:END")]
    slice: Option<String>,

    /// Repeat the selection N times
    #[arg(long, value_name = "N")]
    repeat: Option<usize>,

    /// Write the resulting records here
    #[arg(short, long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Print the leading bytes of every encoded record
    #[arg(long)]
    hex: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_tracing(verbose: bool) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("gribset=debug,info")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn parse_bound(s: &str) -> Result<Option<isize>> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(None);
    }
    Ok(Some(s.parse().with_context(|| format!("bad slice bound '{s}'"))?))
}

fn display_config(args: &Args) -> Result<DisplayConfig> {
    let mut cfg = match &args.config {
        Some(path) => DisplayConfig::from_path(path)?,
        None => DisplayConfig::default(),
    };
    if let Some(keys) = &args.keys {
        cfg.update("keys", &keys.join(","))?;
        cfg.namespace = None;
    }
    if let Some(ns) = &args.namespace {
        cfg.update("namespace", ns)?;
    }
    if let Some(n) = args.max_rows {
        cfg.max_rows = Some(n);
    }
    Ok(cfg)
}

fn main() -> Result<()> {
    let args = Args::parse();
    setup_tracing(args.verbose);

    let cfg = display_config(&args)?;
    let store = Store::new(Arc::new(FramedCodec::new()));

    let salvage = if args.best_effort {
        SalvageMode::BestEffort
    } else {
        SalvageMode::Conservative
    };
    let opts = OpenOptions::default()
        .headers_only(args.headers_only)
        .salvage(salvage);
    let mut coll = Collection::open_with(&store, &args.file, opts)
        .with_context(|| format!("opening {}", args.file.display()))?;
    if let Some(e) = coll.decode_error() {
        eprintln!("warning: stopped at a malformed record: {e}");
    }
    info!(records = coll.len(), "opened");

    if !args.filter.is_empty() {
        let mut criteria = Vec::with_capacity(args.filter.len());
        for f in &args.filter {
            let Some((key, value)) = f.split_once('=') else {
                bail!("filter '{f}' is not KEY=VALUE");
            };
            criteria.push((key.trim().to_owned(), Value::parse_literal(value.trim())));
        }
        coll = coll.filter(&criteria)?;
    }

    if let Some(bounds) = &args.slice {
        let Some((start, end)) = bounds.split_once(':') else {
            bail!("slice '{bounds}' is not START:END");
        };
        coll = coll.slice_span(parse_bound(start)?, parse_bound(end)?);
    }

    if let Some(n) = args.repeat {
        coll = &coll * n;
    }

    print!("{}", coll.render(&cfg)?);

    if args.hex {
        for (i, rec) in coll.iter().enumerate() {
            let bytes = rec?.encode()?;
            let shown = &bytes[..bytes.len().min(HEX_PREVIEW)];
            println!("record {i}: len={} {}", bytes.len(), hex::encode(shown));
        }
    }

    if let Some(out) = &args.output {
        coll.save(out)
            .with_context(|| format!("writing {}", out.display()))?;
        println!("wrote {} records to {}", coll.len(), out.display());
    }

    Ok(())
}
