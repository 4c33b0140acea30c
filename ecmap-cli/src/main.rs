//! Thin CLI front-end over the `ecmap-core` pipelines: parses JSON inputs,
//! runs the requested pipeline, and writes each artifact file named exactly
//! as the pipeline contract specifies.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use ecmap_core::error::{Envelope, ErrorClass};
use ecmap_core::json::canonicalize;
use ecmap_core::orchestrator::{run_ec_pipeline, run_mapping_pipeline};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "ecmap")]
#[command(about = "Deterministic Effective Context + Mapping Resolution Artifact engine")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the EC pipeline (validation -> Step1 -> Step2 -> per-IUC Step3/Step4).
    RunEc {
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long)]
        iucs: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the mapping pipeline over already-computed EC profiles.
    RunMapping {
        #[arg(long)]
        profiles: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run the EC pipeline for every IUC, then the mapping pipeline over
    /// every profile pair in the mapping config, using each profile's own
    /// freshly computed EC output.
    RunAll {
        #[arg(long)]
        bundle: PathBuf,
        #[arg(long)]
        iucs: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn read_json(path: &Path, reason_prefix: &str) -> Result<Value, Envelope> {
    let text = std::fs::read_to_string(path).map_err(|err| {
        Envelope::with_stage(ErrorClass::Validation, format!("{reason_prefix}{err}"), "validation")
    })?;
    serde_json::from_str(&text)
        .map_err(|err| Envelope::with_stage(ErrorClass::Validation, format!("{reason_prefix}{err}"), "validation"))
}

fn write_artifacts(out_dir: &Path, artifacts: &HashMap<String, Value>) -> Result<()> {
    std::fs::create_dir_all(out_dir).with_context(|| format!("creating output directory {}", out_dir.display()))?;
    for (name, payload) in artifacts {
        let path = out_dir.join(name);
        std::fs::write(&path, canonicalize(payload)).with_context(|| format!("writing artifact {}", path.display()))?;
    }
    Ok(())
}

fn print_envelope_and_fail(envelope: &Envelope) -> ExitCode {
    let value = serde_json::to_value(envelope).expect("Envelope serializes infallibly");
    println!("{}", canonicalize(&value));
    ExitCode::from(2)
}

fn run_ec(bundle: &Path, iucs: &Path, out: &Path) -> Result<Result<(Vec<String>, HashMap<String, Value>), Envelope>> {
    let bundle_value = match read_json(bundle, "input-parse-error:") {
        Ok(v) => v,
        Err(envelope) => return Ok(Err(envelope)),
    };
    let iucs_value = match read_json(iucs, "input-parse-error:") {
        Ok(v) => v,
        Err(envelope) => return Ok(Err(envelope)),
    };

    match run_ec_pipeline(&bundle_value, &iucs_value) {
        Ok(output) => {
            write_artifacts(out, &output.artifacts)?;
            Ok(Ok((output.profile_ids, output.artifacts)))
        }
        Err(envelope) => Ok(Err(envelope)),
    }
}

fn run_mapping(profiles: &Path, config: &Path, out: &Path) -> Result<Result<(), Envelope>> {
    let profiles_value = match read_json(profiles, "mapping-input-parse-error:") {
        Ok(v) => v,
        Err(envelope) => return Ok(Err(envelope)),
    };
    let config_value = match read_json(config, "mapping-input-parse-error:") {
        Ok(v) => v,
        Err(envelope) => return Ok(Err(envelope)),
    };

    match run_mapping_pipeline(&profiles_value, &config_value) {
        Ok(output) => {
            write_artifacts(out, &output.artifacts)?;
            Ok(Ok(()))
        }
        Err(envelope) => Ok(Err(envelope)),
    }
}

/// Builds the `{profileId: {ec, profileSchema}}` map `run_mapping_pipeline`
/// expects, straight out of an already-run EC pipeline's own artifacts.
fn profiles_from_ec_artifacts(profile_ids: &[String], artifacts: &HashMap<String, Value>) -> Value {
    let mut map = serde_json::Map::new();
    for profile_id in profile_ids {
        let ec = artifacts
            .get(&format!("step3-ec.{profile_id}.json"))
            .and_then(|v| v.get("ec"))
            .cloned()
            .unwrap_or(Value::Null);
        let profile_schema = artifacts.get(&format!("step4-profile.{profile_id}.json")).cloned().unwrap_or(Value::Null);
        map.insert(profile_id.clone(), serde_json::json!({"ec": ec, "profileSchema": profile_schema}));
    }
    Value::Object(map)
}

fn run_all(bundle: &Path, iucs: &Path, config: &Path, out: &Path) -> Result<Result<(), Envelope>> {
    let (profile_ids, ec_artifacts) = match run_ec(bundle, iucs, out)? {
        Ok(pair) => pair,
        Err(envelope) => return Ok(Err(envelope)),
    };

    let config_value = match read_json(config, "mapping-input-parse-error:") {
        Ok(v) => v,
        Err(envelope) => return Ok(Err(envelope)),
    };

    let profiles_value = profiles_from_ec_artifacts(&profile_ids, &ec_artifacts);
    match run_mapping_pipeline(&profiles_value, &config_value) {
        Ok(output) => {
            write_artifacts(out, &output.artifacts)?;
            Ok(Ok(()))
        }
        Err(envelope) => Ok(Err(envelope)),
    }
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let cli = Cli::parse();
    let result = match &cli.command {
        Commands::RunEc { bundle, iucs, out } => run_ec(bundle, iucs, out)?.map(|_| ()),
        Commands::RunMapping { profiles, config, out } => run_mapping(profiles, config, out)?,
        Commands::RunAll { bundle, iucs, config, out } => run_all(bundle, iucs, config, out)?,
    };

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(envelope) => {
            tracing::warn!(error = ?envelope.error, reason = %envelope.reason, "pipeline aborted");
            Ok(print_envelope_and_fail(&envelope))
        }
    }
}
