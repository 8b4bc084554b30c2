// Entry point and high-level CLI flow.
//
// - `build` runs the pipeline once: pivot the raw export, clean it, check the
//   date index and write the artifact (plus an optional JSON summary).
// - `explore` reads an artifact back and prints the rows/regions a dashboard
//   would chart for the given filters.
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use load_curve::util::format_int;
use load_curve::{
    preview_table, read_table, run, select, DateBounds, IndexMode, PipelineConfig, RangeMode,
    ReadOptions, Selection,
};

#[derive(Parser)]
#[command(name = "load-curve")]
#[command(about = "Daily per-region energy load curves from ONS exports")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose (debug-level) logging
    #[arg(long, global = true)]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    quiet: bool,
}

/// Optional completeness check of the output index.
#[derive(Args, Debug, Clone)]
struct RangeArgs {
    /// First year of the expected range (January 1)
    #[arg(long, requires = "end_year", conflicts_with_all = ["start_date", "end_date"])]
    start_year: Option<i32>,

    /// Last year of the expected range (December 31)
    #[arg(long, requires = "start_year")]
    end_year: Option<i32>,

    /// First day of the expected range (YYYY-MM-DD)
    #[arg(long, requires = "end_date")]
    start_date: Option<String>,

    /// Last day of the expected range (YYYY-MM-DD)
    #[arg(long, requires = "start_date")]
    end_date: Option<String>,

    /// "exact" (same days, same order) or "overlap" (any day in common)
    #[arg(long, default_value_t = RangeMode::Exact)]
    range_mode: RangeMode,
}

impl RangeArgs {
    fn bounds(&self) -> Result<Option<DateBounds>> {
        match (self.start_year, self.end_year, &self.start_date, &self.end_date) {
            (Some(start), Some(end), None, None) => Ok(Some(DateBounds::Years { start, end })),
            (None, None, Some(start), Some(end)) => {
                Ok(Some(DateBounds::from_date_strs(start, end)?))
            }
            (None, None, None, None) => Ok(None),
            _ => bail!("give either --start-year/--end-year or --start-date/--end-date"),
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Pivot, clean and persist a raw load export
    Build {
        /// Path to the raw export
        #[arg(long)]
        input: PathBuf,

        /// Field delimiter of the raw export
        #[arg(long, default_value_t = ';')]
        delimiter: char,

        /// Text encoding of the raw export (any WHATWG label)
        #[arg(long, default_value = "utf-8")]
        encoding: String,

        /// Output directory, created if absent
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,

        /// Output file name
        #[arg(long, default_value = "energy_load_curve.csv")]
        filename: String,

        /// Do not write the date index column
        #[arg(long, default_value_t = false)]
        no_index: bool,

        /// Keep trailing missing cells instead of failing
        #[arg(long, default_value_t = false)]
        allow_residual_gaps: bool,

        /// Write a JSON run summary next to the output file
        #[arg(long, default_value_t = false)]
        summary: bool,

        #[command(flatten)]
        range: RangeArgs,
    },

    /// Print the rows and regions a dashboard would chart
    Explore {
        /// Path to an artifact written by `build`
        #[arg(long)]
        artifact: PathBuf,

        /// Keep rows from this year on
        #[arg(long)]
        from_year: Option<i32>,

        /// Keep rows up to this year
        #[arg(long)]
        to_year: Option<i32>,

        /// Region code, name or full label (repeatable)
        #[arg(long = "region")]
        regions: Vec<String>,

        /// Maximum number of rows to print
        #[arg(long, default_value_t = 10)]
        rows: usize,
    },
}

/// Handle `build`: one pipeline run, reported on stderr through the log.
#[allow(clippy::too_many_arguments)]
fn handle_build(
    input: PathBuf,
    delimiter: char,
    encoding: String,
    output_dir: PathBuf,
    filename: String,
    no_index: bool,
    allow_residual_gaps: bool,
    summary: bool,
    range: RangeArgs,
) -> Result<()> {
    let config = PipelineConfig {
        input,
        read: ReadOptions {
            delimiter,
            encoding,
        },
        output_dir,
        filename,
        index: if no_index {
            IndexMode::Omit
        } else {
            IndexMode::Include
        },
        range: range.bounds()?.map(|b| (b, range.range_mode)),
        allow_residual_gaps,
        summary,
    };

    let report = run(&config)
        .with_context(|| format!("building load curve from {}", config.input.display()))?;
    match &report.output {
        Some(path) => info!(
            path = %path.display(),
            days = %format_int(report.rows),
            regions = report.columns,
            filled = %format_int(report.filled_cells),
            replaced = %format_int(report.replaced_cells),
            "load curve written"
        ),
        None => info!("no input data; nothing written"),
    }
    Ok(())
}

/// Handle `explore`: filter the artifact and print a markdown preview.
fn handle_explore(
    artifact: PathBuf,
    from_year: Option<i32>,
    to_year: Option<i32>,
    regions: Vec<String>,
    rows: usize,
) -> Result<()> {
    let table = read_table(&artifact)
        .with_context(|| format!("reading artifact {}", artifact.display()))?;
    let years = match (from_year, to_year) {
        (None, None) => None,
        (from, to) => Some(from.unwrap_or(i32::MIN)..=to.unwrap_or(i32::MAX)),
    };
    let selected = select(&table, &Selection { years, regions })?;

    println!("Brazil - Energy Load Curve (Avg MW per day)\n");
    println!("{}\n", preview_table(&selected, rows));
    let (n_rows, _) = selected.shape();
    if n_rows > rows {
        println!("({} of {} rows shown)", rows, format_int(n_rows));
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match (cli.verbose, cli.quiet) {
        (true, _) => EnvFilter::new("debug"),
        (_, true) => EnvFilter::new("error"),
        _ => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Build {
            input,
            delimiter,
            encoding,
            output_dir,
            filename,
            no_index,
            allow_residual_gaps,
            summary,
            range,
        } => handle_build(
            input,
            delimiter,
            encoding,
            output_dir,
            filename,
            no_index,
            allow_residual_gaps,
            summary,
            range,
        ),
        Command::Explore {
            artifact,
            from_year,
            to_year,
            regions,
            rows,
        } => handle_explore(artifact, from_year, to_year, regions, rows),
    }
}
