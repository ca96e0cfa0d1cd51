//! The command line interface for the tariff engine.
use crate::hierarchy::HierarchyKey;
use crate::hierarchy::weights::{WeightCache, precompute_country_weights};
use crate::id::{CountryCode, IDCollection};
use crate::log;
use crate::nipa::summarize;
use crate::output::{LayerWriter, create_output_directory, get_output_dir, write_hs4_weights};
use crate::scenario::Scenario;
use crate::settings::Settings;
use crate::vector::vector_sum;
use crate::weighting::TariffBatch;
use ::log::{info, warn};
use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use indexmap::IndexSet;
use std::path::{Path, PathBuf};

pub mod settings;
use settings::SettingsSubcommands;

/// The command line interface for the tariff engine.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// The available commands.
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Options for commands which write output files
#[derive(Args, Default)]
pub struct OutputOpts {
    /// Directory for output files
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
    /// Whether to overwrite the output directory if it already exists
    #[arg(long)]
    pub overwrite: bool,
}

/// The available commands.
#[derive(Subcommand)]
enum Commands {
    /// Import-weight tariff vectors and aggregate them into NIPA layers.
    Aggregate {
        /// Path to the scenario directory.
        data_dir: PathBuf,
        /// Only aggregate the vector for this country
        #[arg(long)]
        country: Option<String>,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Calculate relative HS4 weights within each chapter for a country.
    Weights {
        /// Path to the scenario directory.
        data_dir: PathBuf,
        /// The country to calculate weights for
        country: String,
        /// Output options
        #[command(flatten)]
        opts: OutputOpts,
    },
    /// Look up the tariff for a section, chapter or HS4 heading, optionally editing it.
    Tariff {
        /// Path to the scenario directory.
        data_dir: PathBuf,
        /// The country to look up
        country: String,
        /// Hierarchy key (e.g. `S1`, `S1_01` or `S1_01_0101`)
        key: String,
        /// Set the tariff to this value and propagate it through the hierarchy
        #[arg(long)]
        set: Option<f64>,
    },
    /// Validate a scenario.
    Validate {
        /// Path to the scenario directory.
        data_dir: PathBuf,
    },
    /// Manage the program settings file.
    Settings {
        /// The available subcommands for managing the settings file.
        #[command(subcommand)]
        subcommand: SettingsSubcommands,
    },
}

impl Commands {
    /// Execute the supplied CLI command
    fn execute(self) -> Result<()> {
        match self {
            Self::Aggregate {
                data_dir,
                country,
                opts,
            } => handle_aggregate_command(&data_dir, country.as_deref(), &opts, None),
            Self::Weights {
                data_dir,
                country,
                opts,
            } => handle_weights_command(&data_dir, &country, &opts, None),
            Self::Tariff {
                data_dir,
                country,
                key,
                set,
            } => handle_tariff_command(&data_dir, &country, &key, set, None),
            Self::Validate { data_dir } => handle_validate_command(&data_dir, None),
            Self::Settings { subcommand } => subcommand.execute(),
        }
    }
}

/// Parse CLI arguments and run the requested command
pub fn run_cli() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        let help_str = Cli::command().render_long_help().to_string();
        println!("{help_str}");
        return Ok(());
    };

    command.execute()
}

/// Use the provided settings or load them from the settings file
fn load_settings(settings: Option<Settings>) -> Result<Settings> {
    match settings {
        Some(settings) => Ok(settings),
        None => Settings::load().context("Failed to load settings."),
    }
}

/// Initialise the program logger, unless a previous command already has
fn init_logger(settings: &Settings, log_file_path: Option<&Path>) -> Result<()> {
    if log::is_logger_initialised() {
        return Ok(());
    }

    log::init(&settings.log_level, log_file_path).context("Failed to initialise logging.")
}

/// Create the output directory for a command and start logging to it
fn prepare_output(data_dir: &Path, opts: &OutputOpts, settings: &Settings) -> Result<PathBuf> {
    let output_path = match &opts.output_dir {
        Some(path) => path.clone(),
        None => get_output_dir(data_dir)?,
    };

    let overwrite = create_output_directory(&output_path, opts.overwrite || settings.overwrite)
        .with_context(|| {
            format!(
                "Failed to create output directory: {}",
                output_path.display()
            )
        })?;

    init_logger(settings, Some(&output_path))?;
    info!("Output folder: {}", output_path.display());

    // NB: We have to wait until the logger is initialised to display this warning
    if overwrite {
        warn!("Output folder will be overwritten");
    }

    Ok(output_path)
}

/// Restrict a batch to a single country
fn select_country(batch: TariffBatch, country: &str) -> Result<TariffBatch> {
    let countries: IndexSet<CountryCode> = batch.countries.iter().cloned().collect();
    let country = countries.get_id_by_str(country)?;
    let index = batch
        .countries
        .iter()
        .position(|c| *c == country)
        .context("Country missing from tariff vectors")?;
    let vector = batch
        .vectors
        .into_iter()
        .nth(index)
        .with_context(|| format!("No tariff vector for {country}"))?;

    Ok(TariffBatch {
        countries: vec![country],
        vectors: vec![vector],
        import_weighted: batch.import_weighted,
    })
}

/// Handle the `aggregate` command.
pub fn handle_aggregate_command(
    data_dir: &Path,
    country: Option<&str>,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(data_dir, opts, &settings)?;

    let scenario = Scenario::from_path(data_dir).context("Failed to load scenario.")?;
    info!("Loaded scenario from {}", data_dir.display());

    let order = scenario.classification_order()?;
    let mut batch = scenario.tariff_batch()?;
    if let Some(country) = country {
        batch = select_country(batch, country)?;
    }
    let batch = scenario.trade_weighter().weight_batch(batch, &order);

    let mut aggregator = scenario.nipa_aggregator();
    let options = scenario.parameters.aggregation_options();
    let mut writer = LayerWriter::create(&output_path)?;
    for (country, vector) in batch.countries.iter().zip(&batch.vectors) {
        let full = aggregator
            .aggregate_full(vector, &options)
            .context("Failed to aggregate tariff vectors.")?;
        let summaries = summarize(&full.layer_aggregations, vector_sum(vector));
        writer.write(country, &full.layer_aggregations, &summaries)?;
        info!(
            "Aggregated {country} into {} layers",
            full.layer_aggregations.len()
        );
    }
    writer.flush()?;
    info!("Aggregation complete!");

    Ok(())
}

/// Handle the `weights` command.
pub fn handle_weights_command(
    data_dir: &Path,
    country: &str,
    opts: &OutputOpts,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    let output_path = prepare_output(data_dir, opts, &settings)?;

    let scenario = Scenario::from_path(data_dir).context("Failed to load scenario.")?;
    let hierarchy = scenario.hierarchy()?;
    let weight_table = scenario.section_weights()?;

    let country = CountryCode::new(country);
    if !weight_table.contains_key(&country) {
        warn!("No section weights for {country}; chapters will be split equally");
    }

    let mut cache = WeightCache::new();
    let count = precompute_country_weights(&country, &hierarchy, &weight_table, &mut cache);
    write_hs4_weights(&output_path, &country, &hierarchy, &cache)?;
    info!("Calculated weights for {count} chapters for {country}");

    Ok(())
}

/// Handle the `tariff` command.
pub fn handle_tariff_command(
    data_dir: &Path,
    country: &str,
    key: &str,
    set: Option<f64>,
    settings: Option<Settings>,
) -> Result<()> {
    let settings = load_settings(settings)?;
    init_logger(&settings, None)?;

    let scenario = Scenario::from_path(data_dir).context("Failed to load scenario.")?;
    let hierarchy = scenario.hierarchy()?;
    let mut accessor = scenario.tariff_accessor()?;

    let country = CountryCode::new(country);
    let key: HierarchyKey = key.parse()?;
    key.check_exists(&hierarchy)?;
    let section = key.section().clone();
    accessor.capture_originals_for_country(&country);

    if let Some(value) = set {
        let weight_table = scenario.section_weights()?;
        let mut cache = WeightCache::new();
        accessor
            .apply_edit(&country, &key, value, &hierarchy, &weight_table, &mut cache)
            .with_context(|| format!("Failed to set tariff for {key}"))?;
    }

    let effective = accessor
        .effective_value(&country, &key)
        .with_context(|| format!("No tariff data for {country}, {key}"))?;
    info!("Effective tariff for {country}, {key}: {effective:.2}%");

    if let Some(original) = accessor.get_original_tariff(&country, &section) {
        info!(
            "Original tariff for {country}, section {section}: {:.2}%",
            original.us_tariff
        );
    }
    if let Some(change) = accessor.percent_change(&country, &section) {
        info!("Change for section {section}: {change:+.2}%");
    }

    Ok(())
}

/// Handle the `validate` command.
pub fn handle_validate_command(data_dir: &Path, settings: Option<Settings>) -> Result<()> {
    let settings = load_settings(settings)?;

    // We don't save log files when running the validate command
    init_logger(&settings, None)?;

    let scenario = Scenario::from_path(data_dir).context("Failed to load scenario.")?;
    scenario.validate().context("Failed to validate scenario.")?;
    info!("Scenario validation successful!");

    Ok(())
}
