//! glmap command-line entry point
//!
//! Reads a JSON request, runs one allocation operation, and writes the
//! JSON outcome to stdout.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use glmap_config::{Config, ConfigError};
use glmap_core::{
    Allocation, AllocationEngine, AllocationResult, BasisEntity, BasisLookup, CoreError,
    ExclusionSummaryComputer, Preset, PresetRowInput, RoundingPolicy, SourceAccount, WeightInput,
};
use rust_decimal::Decimal;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "glmap")]
#[command(version = "0.1.0")]
#[command(about = "Cent-exact ratio and preset allocation for account mapping", long_about = None)]
struct Args {
    /// Configuration file path (defaults to ./glmap.yaml when present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split an amount across a flat list of basis values
    Allocate { request: PathBuf },
    /// Split an amount across presets and non-preset weights
    Presets { request: PathBuf },
    /// Turn ratios into percentages summing to 100
    Normalize { request: PathBuf },
    /// Summarize excluded portions of dynamically mapped accounts
    Exclusions { request: PathBuf },
    /// Build a persistable allocation result for one period
    Snapshot { request: PathBuf },
    /// Print the default configuration file
    PrintConfig,
}

#[derive(Debug, Deserialize)]
struct AllocateRequest {
    source_amount: Decimal,
    #[serde(default)]
    basis_values: Vec<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PresetsRequest {
    source_amount: Decimal,
    #[serde(default)]
    preset_rows: Vec<PresetRowInput>,
    #[serde(default)]
    non_preset_weights: Vec<WeightInput>,
}

#[derive(Debug, Deserialize)]
struct NormalizeRequest {
    ratios: Vec<Decimal>,
}

#[derive(Debug, Deserialize)]
struct ExclusionsRequest {
    accounts: Vec<SourceAccount>,
    allocations: Vec<Allocation>,
    #[serde(default)]
    basis_entities: Vec<BasisEntity>,
    #[serde(default)]
    presets: Vec<Preset>,
    #[serde(default)]
    period_id: Option<String>,
    #[serde(default)]
    persisted_results: Vec<AllocationResult>,
}

#[derive(Debug, Deserialize)]
struct SnapshotRequest {
    allocation: Allocation,
    source_account: SourceAccount,
    #[serde(default)]
    basis_entities: Vec<BasisEntity>,
    #[serde(default)]
    presets: Vec<Preset>,
    #[serde(default)]
    period_id: Option<String>,
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::load(path).map_err(|e| anyhow::anyhow!(e.to_details().to_string())),
        None => match Config::load(Config::default_path()) {
            Ok(config) => Ok(config),
            Err(ConfigError::FileNotFound { .. }) => Ok(Config::default()),
            Err(e) => Err(anyhow::anyhow!(e.to_details().to_string())),
        },
    }
}

fn read_request<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = if path == Path::new("-") {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read request from stdin")?;
        buffer
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };

    serde_json::from_str(&content).with_context(|| format!("Invalid request in {}", path.display()))
}

fn write_response<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{}", json);
    Ok(())
}

fn run(args: Args) -> Result<()> {
    if let Command::PrintConfig = args.command {
        print!("{}", Config::generate_default());
        return Ok(());
    }

    let config = load_config(args.config.as_deref())?;
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(config.logging.level.as_str()))
        .init();

    let policy = RoundingPolicy::try_from(&config.rounding)?;
    let engine = AllocationEngine::new(policy);
    let pretty = config.output.pretty;
    log::debug!("rounding policy: {:?}", policy);

    match args.command {
        Command::Allocate { request } => {
            let request: AllocateRequest = read_request(&request)?;
            let outcome = engine.allocate(request.source_amount, &request.basis_values)?;
            write_response(&outcome, pretty)
        }
        Command::Presets { request } => {
            let request: PresetsRequest = read_request(&request)?;
            let outcome = engine.allocate_with_presets(
                request.source_amount,
                &request.preset_rows,
                &request.non_preset_weights,
            )?;
            write_response(&outcome, pretty)
        }
        Command::Normalize { request } => {
            let request: NormalizeRequest = read_request(&request)?;
            write_response(&engine.normalize_percentages(&request.ratios), pretty)
        }
        Command::Exclusions { request } => {
            let request: ExclusionsRequest = read_request(&request)?;
            let summaries = ExclusionSummaryComputer::new(engine).compute(
                &request.accounts,
                &request.allocations,
                &request.basis_entities,
                &request.presets,
                request.period_id.as_deref(),
                &request.persisted_results,
            );
            log::info!("{} of {} accounts have exclusion summaries", summaries.len(), request.accounts.len());
            write_response(&summaries, pretty)
        }
        Command::Snapshot { request } => {
            let request: SnapshotRequest = read_request(&request)?;
            if request.allocation.source_account_id != request.source_account.id {
                return Err(CoreError::ValidationError {
                    message: format!(
                        "allocation {} distributes account {}, not {}",
                        request.allocation.id, request.allocation.source_account_id, request.source_account.id
                    ),
                }
                .into());
            }
            let lookup = BasisLookup::new(&request.basis_entities, &request.presets);
            let period = request.period_id.as_deref();
            let source_value = glmap_core::resolve_basis_value(Some(&request.source_account), period);
            let result = engine.snapshot(&request.allocation, &lookup, period, source_value)?;
            write_response(&result, pretty)
        }
        Command::PrintConfig => Ok(()),
    }
}

fn main() {
    let args = Args::parse();

    if let Err(error) = run(args) {
        match error.downcast_ref::<CoreError>() {
            Some(core) => {
                log::error!("{}", core);
                eprintln!("{}", core.to_details());
            }
            None => eprintln!("[ERROR] {:#}", error),
        }
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glmap_core::ResultOrigin;

    fn parse<T: DeserializeOwned>(json: &str) -> T {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_allocate_demo() {
        let request: AllocateRequest = parse(include_str!("../demos/allocate.json"));
        let outcome = AllocationEngine::default()
            .allocate(request.source_amount, &request.basis_values)
            .unwrap();
        assert_eq!(outcome.total(), request.source_amount);
        assert_eq!(outcome.adjustment_index, None);
    }

    #[test]
    fn test_presets_demo() {
        let request: PresetsRequest = parse(include_str!("../demos/presets.json"));
        let outcome = AllocationEngine::default()
            .allocate_with_presets(request.source_amount, &request.preset_rows, &request.non_preset_weights)
            .unwrap();
        assert_eq!(outcome.total(), Decimal::new(-1_250_000, 2));
        assert_eq!(outcome.preset_allocations.len(), 2);
    }

    #[test]
    fn test_normalize_demo() {
        let request: NormalizeRequest = parse(include_str!("../demos/normalize.json"));
        let total: Decimal = AllocationEngine::default()
            .normalize_percentages(&request.ratios)
            .iter()
            .sum();
        assert_eq!(total, Decimal::ONE_HUNDRED);
    }

    #[test]
    fn test_exclusions_demo() {
        let request: ExclusionsRequest = parse(include_str!("../demos/exclusions.json"));
        let summaries = ExclusionSummaryComputer::new(AllocationEngine::default()).compute(
            &request.accounts,
            &request.allocations,
            &request.basis_entities,
            &request.presets,
            request.period_id.as_deref(),
            &request.persisted_results,
        );
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries["6100"].origin, ResultOrigin::Live);
        assert!(summaries["6100"].ratio > Decimal::ZERO);
    }

    #[test]
    fn test_snapshot_demo() {
        let request: SnapshotRequest = parse(include_str!("../demos/snapshot.json"));
        let lookup = BasisLookup::new(&request.basis_entities, &request.presets);
        let period = request.period_id.as_deref();
        let source_value = glmap_core::resolve_basis_value(Some(&request.source_account), period);
        let result = AllocationEngine::default()
            .snapshot(&request.allocation, &lookup, period, source_value)
            .unwrap();
        assert_eq!(result.source_value, Decimal::new(482_055, 2));
        assert_eq!(result.total(), result.source_value);
        assert!(result.entries[2].is_exclusion);
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        assert!(load_config(Some(Path::new("/nonexistent/glmap.yaml"))).is_err());
    }

    #[test]
    fn test_cli_parses_subcommand() {
        let args = Args::try_parse_from(["glmap", "--config", "custom.yaml", "allocate", "req.json"]).unwrap();
        assert_eq!(args.config, Some(PathBuf::from("custom.yaml")));
        assert!(matches!(args.command, Command::Allocate { .. }));
    }
}
