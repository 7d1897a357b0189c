//! Run a [DataProcessor] over CSV samples and dump the pixel series.
//!
//! The input is `timestamp,value` rows with a constant timestamp step, each
//! timestamp marking the end of the interval the value covers. The rows are
//! loaded into an in-memory archive under the datasource name "value".

use std::{fs, path::PathBuf, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use indexmap::IndexMap;
use rrd_data::{
    backend::memory::{MemoryArchive, MemoryBackend},
    consol_fun::ConsolFun,
    processor::DataProcessor,
};

/// Resample a CSV series onto a pixel grid and print it.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// CSV file of `timestamp,value` rows ("-" reads stdin).
    input: PathBuf,

    /// Window start (defaults to the start of the first interval).
    #[arg(long)]
    start: Option<i64>,

    /// Window end (defaults to the last timestamp).
    #[arg(long)]
    end: Option<i64>,

    /// Pixel count of the output grid.
    #[arg(long, default_value_t = 16)]
    pixels: usize,

    /// Consolidation function the rows represent.
    #[arg(long, default_value_t = ConsolFun::Average)]
    cf: ConsolFun,

    /// Derived RPN series, as name=expression. May be repeated.
    #[arg(long)]
    cdef: Vec<String>,

    /// Print windowed aggregates of every series as JSON and exit.
    #[arg(long, default_value_t = false)]
    aggregates: bool,

    /// Emit the pixel series as JSON instead of a table.
    #[arg(long, default_value_t = false)]
    json: bool,
}

fn read_samples(input: &PathBuf) -> Result<(Vec<i64>, Vec<f64>)> {
    let text = if input.as_os_str() == "-" {
        std::io::read_to_string(std::io::stdin())?
    } else {
        fs::read_to_string(input).with_context(|| format!("cannot read {}", input.display()))?
    };

    let mut timestamps = Vec::new();
    let mut values = Vec::new();

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((timestamp, value)) = line.split_once(',') else {
            bail!("malformed row '{line}', expected timestamp,value");
        };
        timestamps.push(timestamp.trim().parse::<i64>().with_context(|| format!("bad timestamp in '{line}'"))?);
        values.push(match value.trim() {
            "" | "nan" | "NaN" | "U" => f64::NAN,
            value => value.parse().with_context(|| format!("bad value in '{line}'"))?,
        });
    }

    if timestamps.len() < 2 {
        bail!("need at least two rows to derive a step");
    }

    Ok((timestamps, values))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    let args = Args::parse();

    let (timestamps, values) = read_samples(&args.input)?;
    let step = timestamps[1] - timestamps[0];
    if step <= 0 {
        bail!("timestamps must be strictly increasing");
    }

    let start = args.start.unwrap_or(timestamps[0] - step);
    let end = args.end.unwrap_or(timestamps[timestamps.len() - 1]);

    let backend = MemoryBackend::new();
    backend.insert(
        "input",
        args.cf,
        MemoryArchive::new(timestamps[0] - step, step).with_datasource("value", values),
    );

    let mut dp = DataProcessor::new(start, end)?;
    dp.set_pixel_count(args.pixels)?;
    dp.add_def_with_backend("value", "input", "value", args.cf, Arc::new(backend));
    for cdef in &args.cdef {
        let Some((name, expression)) = cdef.split_once('=') else {
            bail!("invalid cdef '{cdef}', expected name=expression");
        };
        dp.add_cdef(name, expression);
    }
    dp.process_data()?;

    if args.aggregates {
        let mut aggregates = IndexMap::new();
        for name in dp.get_source_names() {
            aggregates.insert(name.to_string(), dp.get_aggregates(name, start, end)?);
        }
        println!("{}", serde_json::to_string_pretty(&aggregates)?);
        return Ok(());
    }

    if args.json {
        let mut series: IndexMap<String, Vec<f64>> = IndexMap::new();
        series.insert("timestamp".into(), dp.get_timestamps().to_vec());
        for name in dp.get_source_names() {
            series.insert(name.to_string(), dp.get_values(name)?.to_vec());
        }
        println!("{}", serde_json::to_string_pretty(&series)?);
        return Ok(());
    }

    print!("{}", dp.dump()?);
    Ok(())
}
