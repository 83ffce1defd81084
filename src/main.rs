use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use season_trends::config::{ConfigOverrides, PipelineConfig};
use season_trends::pipeline::{Pipeline, StageReport, read_trend_raster};
use season_trends::render;
use season_trends::seasonal::SeasonStrategy;
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Subcommand)]
enum Command {
    /// Aggregate each year of the input grid into summer and winter rasters
    Seasons,
    /// Fit per-cell trends over the yearly seasonal rasters
    Slopes,
    /// Re-encode the trend raster with 32-bit types only
    Legacy,
    /// Area-weighted share of the globe per summer/winter slope comparison
    Percentages,
    /// Map every city to its nearest grid cell
    CityLookup,
    /// Write one seasonal series and trend file per city
    Cities,
    /// Global annual mean temperature series
    GridAnnual,
    /// Monthly mean temperature series per hemisphere
    GridMonthly,
    /// Annual mean temperature series for the polar caps
    PolesAnnual,
    /// Monthly mean temperature series for the polar caps
    PolesMonthly,
    /// World summer/winter series and trend from the hemisphere monthly series
    WorldSeasonal,
    /// Run every stage in order
    All,
    /// Show the trend raster in an interactive window
    View {
        /// Trend raster store (defaults to the configured slopes output)
        path: Option<PathBuf>,

        /// Show total change over the period instead of the yearly rate
        #[arg(long)]
        total_change: bool,
    },
}

#[derive(Parser)]
#[command(name = "season-trends")]
#[command(version)]
#[command(about = "Seasonal temperature trends from gridded reanalysis data")]
#[command(arg_required_else_help = true)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Data directory holding input/ and output/
    #[arg(long, global = true, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Input grid store (default: <data-dir>/input/era5_t2m_monthly.zarr)
    #[arg(long, global = true, value_name = "STORE")]
    input: Option<PathBuf>,

    /// Temperature variable in the input grid [default: t2m]
    #[arg(long, global = true, value_name = "VAR")]
    variable: Option<String>,

    /// Ensemble member to select, by coordinate value (e.g. an expver)
    #[arg(long, global = true, value_name = "VALUE")]
    member: Option<String>,

    /// First year of the seasonal archive
    #[arg(long, global = true)]
    start_year: Option<i32>,

    /// Last year of the seasonal archive and of every series
    #[arg(long, global = true)]
    end_year: Option<i32>,

    /// First year of the region series [default: 1940]
    #[arg(long, global = true)]
    stats_start_year: Option<i32>,

    /// How several qualifying months fill a season
    #[arg(long, global = true, value_enum)]
    season_strategy: Option<SeasonStrategy>,

    /// City list JSON (default: <data-dir>/input/cities.json)
    #[arg(long, global = true, value_name = "FILE")]
    cities: Option<PathBuf>,

    /// JSON config file; command-line options take precedence
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            data_dir: self.data_dir.clone(),
            input: self.input.clone(),
            variable: self.variable.clone(),
            member: self.member.clone(),
            start_year: self.start_year,
            end_year: self.end_year,
            stats_start_year: self.stats_start_year,
            season_strategy: self.season_strategy,
            cities: self.cities.clone(),
        }
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {}", e);

        for cause in e.chain().skip(1) {
            eprintln!("  Caused by: {}", cause);
        }

        process::exit(1);
    }
}

fn setup_logging(verbose: bool, use_color: bool) -> anyhow::Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(use_color)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logging subscriber")
}

async fn run() -> anyhow::Result<()> {
    let args = Args::parse();
    let use_color = !args.no_color;
    if !use_color {
        colored::control::set_override(false);
    }
    setup_logging(args.verbose, use_color)?;

    let config = PipelineConfig::load(args.config.as_deref(), args.overrides())
        .context("Invalid configuration")?;
    let pipeline = Pipeline::new(config);

    let reports = match &args.command {
        Command::Seasons => vec![pipeline.run_seasons().await?],
        Command::Slopes => vec![pipeline.run_slopes().await?],
        Command::Legacy => vec![pipeline.run_legacy().await?],
        Command::Percentages => vec![pipeline.run_percentages().await?],
        Command::CityLookup => vec![pipeline.run_city_lookup().await?],
        Command::Cities => vec![pipeline.run_city_trends().await?],
        Command::GridAnnual => vec![pipeline.run_grid_annual().await?],
        Command::GridMonthly => vec![pipeline.run_grid_monthly().await?],
        Command::PolesAnnual => vec![pipeline.run_poles_annual().await?],
        Command::PolesMonthly => vec![pipeline.run_poles_monthly().await?],
        Command::WorldSeasonal => vec![pipeline.run_world_seasonal()?],
        Command::All => pipeline.run_all().await?,
        Command::View { path, total_change } => {
            let path = path.clone().unwrap_or_else(|| pipeline.config().slopes_path());
            let raster = read_trend_raster(&path)
                .await
                .with_context(|| format!("Failed to read trend raster '{}'", path.display()))?;
            println!("Viewing {}: Tab=switch season, Esc/q=quit", path.display());
            render::show_trend_raster(&raster, *total_change)?;
            return Ok(());
        }
    };

    for report in &reports {
        print_report(report);
    }
    Ok(())
}

fn print_report(report: &StageReport) {
    println!(
        "{} {} ({} written)",
        "✓".green(),
        report.stage.bold(),
        report.written.len()
    );
    for path in &report.written {
        println!("    {}", path.display().to_string().cyan());
    }
    if !report.skipped.is_empty() {
        println!(
            "    {} {}",
            "skipped:".yellow(),
            report.skipped.join(", ")
        );
    }
}
