//! zonal CLI

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use zonal_core::{CanonicalTable, TableUnits, UnknownZonePolicy, ZoneRegistry};
use zonal_runner::{load_config, Pipeline, PipelineConfig};

#[derive(Parser)]
#[command(name = "zonal")]
#[command(about = "Tree canopy cover per ecological zone for an area of interest")]
#[command(version)]
struct Cli {
    /// Configuration file (YAML). Defaults apply when omitted.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for per-AOI results
    #[arg(long, global = true)]
    results_dir: Option<PathBuf>,

    /// More log output (-v debug, -vv trace). RUST_LOG takes precedence.
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Cell units of the published table.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnitsArg {
    /// Pixel counts at the statistics scale
    Pixels,
    /// Square kilometres
    #[value(name = "area_km2")]
    AreaKm2,
}

impl From<UnitsArg> for TableUnits {
    fn from(arg: UnitsArg) -> Self {
        match arg {
            UnitsArg::Pixels => TableUnits::Pixels,
            UnitsArg::AreaKm2 => TableUnits::AreaKm2,
        }
    }
}

/// Handling of rows whose zone code is not in the registry.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum UnknownZonesArg {
    /// Abort the run
    Fail,
    /// Drop the row with a warning
    Drop,
}

impl From<UnknownZonesArg> for UnknownZonePolicy {
    fn from(arg: UnknownZonesArg) -> Self {
        match arg {
            UnknownZonesArg::Fail => UnknownZonePolicy::Fail,
            UnknownZonesArg::Drop => UnknownZonePolicy::Drop,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Compute (or reuse) the stats table for an AOI
    Run {
        /// AOI reference (asset path or feature collection id)
        aoi: String,

        /// Histogram bin width
        #[arg(long)]
        bin_step: Option<u32>,

        /// Output units
        #[arg(long, value_enum)]
        units: Option<UnitsArg>,

        /// Ground resolution in meters
        #[arg(long)]
        scale: Option<f64>,

        /// Rows with unknown zone codes
        #[arg(long, value_enum)]
        unknown_zones: Option<UnknownZonesArg>,
    },

    /// List the ecological zone registry
    Zones,

    /// Print a cached stats table
    Show {
        aoi: String,
    },

    /// Remove cached artifacts so the next run recomputes them
    Clean {
        aoi: String,
    },
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn base_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path).with_context(|| format!("loading {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    if let Some(dir) = &cli.results_dir {
        config.output.results_dir = dir.clone();
    }
    Ok(config)
}

fn print_table(table: &CanonicalTable) -> Result<()> {
    table.write_csv(std::io::stdout().lock())?;
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    zonal_metrics::describe_metrics();

    let mut config = base_config(&cli)?;

    match &cli.command {
        Commands::Run {
            aoi,
            bin_step,
            units,
            scale,
            unknown_zones,
        } => {
            if let Some(step) = bin_step {
                config.bins.step = *step;
            }
            if let Some(units) = units {
                config.output.units = (*units).into();
            }
            if let Some(scale) = scale {
                config.scale_m = *scale;
            }
            if let Some(policy) = unknown_zones {
                config.unknown_zones = (*policy).into();
            }

            let pipeline = Pipeline::from_config(config)?.with_status(Box::new(|message| eprintln!("{}", message)));
            let output = pipeline.run(aoi)?;
            if let Some(report) = &output.report {
                tracing::info!(
                    "{} of {} raw rows used, {} remote attempts",
                    report.rows_used,
                    report.rows_read,
                    output.attempts
                );
            }
            println!("{}", output.stats_path.display());
        }
        Commands::Zones => {
            println!("{:>4}  {:<9}  name", "code", "color");
            for info in ZoneRegistry::default().iter() {
                println!("{:>4}  {:<9}  {}", info.code, info.color, info.name);
            }
        }
        Commands::Show { aoi } => {
            let pipeline = Pipeline::new(config)?;
            match pipeline.cached_table(aoi)? {
                Some(table) => print_table(&table)?,
                None => bail!("no cached stats table for '{}'", aoi),
            }
        }
        Commands::Clean { aoi } => {
            let pipeline = Pipeline::new(config)?;
            if pipeline.clean(aoi)? {
                println!("removed cached artifacts for {}", aoi);
            } else {
                println!("nothing cached for {}", aoi);
            }
        }
    }

    Ok(())
}
