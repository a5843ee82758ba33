// src/main.rs
//
// Study-file harness for the h2qra core.
//
// - Loads an optional YAML study (defaults otherwise).
// - Config precedence: CLI flags > H2QRA_* env > study `analysis:` > defaults.
// - Runs the deterministic pass and, when enabled, the uncertainty sweep.
// - Prints a summary table and writes <output-dir>/qra_result.json.
//
// Run examples:
//   cargo run -p h2qra -- --study studies/dispenser.yaml
//   cargo run -p h2qra -- --study studies/dispenser.yaml --uncertainty --samples 500 --threads 4
//   H2QRA_TELEMETRY_MODE=jsonl H2QRA_TELEMETRY_PATH=runs/t.jsonl cargo run -p h2qra -- --uncertainty

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use serde::Serialize;

use h2qra::analysis::{EvaluateOptions, QraResult, QraSession};
use h2qra::config::Config;
use h2qra::study::StudySpec;
use h2qra::telemetry::{self, TelemetrySink};
use h2qra::uncertainty::{self, CancelToken, UncertaintyResult, UncertaintySettings};

const RESULT_FILE: &str = "qra_result.json";

#[derive(Debug, Parser)]
#[command(
    name = "h2qra",
    about = "Hydrogen system quantitative risk assessment (PLL / FAR / AIR)",
    version
)]
struct Args {
    /// Study YAML file. Built-in defaults are used when omitted.
    #[arg(long)]
    study: Option<PathBuf>,

    /// Directory receiving qra_result.json.
    #[arg(long, default_value = "runs/h2qra")]
    output_dir: PathBuf,

    /// Run the Monte Carlo uncertainty sweep.
    #[arg(long)]
    uncertainty: bool,

    /// Monte Carlo sample count.
    #[arg(long)]
    samples: Option<usize>,

    /// Base seed; iteration i uses seed + i.
    #[arg(long)]
    seed: Option<u64>,

    /// Worker threads for the sweep.
    #[arg(long)]
    threads: Option<usize>,

    /// Verbosity: -v prints the ranking, -vv also the accident breakdown.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn apply_to(&self, cfg: &mut Config) {
        if self.uncertainty {
            cfg.uncertainty_enabled = true;
        }
        if let Some(v) = self.samples {
            cfg.uncertainty.samples = v;
        }
        if let Some(v) = self.seed {
            cfg.uncertainty.base_seed = v;
        }
        if let Some(v) = self.threads {
            cfg.uncertainty.threads = v.max(1);
        }
    }
}

#[derive(Serialize)]
struct RunOutput<'a> {
    schema_version: i64,
    h2qra_version: &'static str,
    study_id: &'a str,
    uncertainty_enabled: bool,
    settings: UncertaintySettings,
    result: &'a QraResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    uncertainty: Option<&'a UncertaintyResult>,
}

fn print_summary(study_id: &str, result: &QraResult, verbose: u8) {
    println!(
        "{:<8} {:>12} {:>10} {:>12} {:>12} {:>12} {:>12}",
        "leak", "f_total/yr", "rate kg/s", "jetfire", "explosion", "no_ignition", "pll"
    );
    for l in &result.leaks {
        let f = &l.event_tree.frequencies;
        println!(
            "{:<8} {:>12.3e} {:>10.4} {:>12.3e} {:>12.3e} {:>12.3e} {:>12.3e}",
            l.leak_size.label(),
            l.cut_set.total,
            l.release.mass_flow,
            f.jetfire,
            f.explosion,
            f.no_ignition,
            l.pll
        );
        if verbose >= 2 {
            for a in &l.cut_set.accidents {
                println!("         accident {:<24} {:>12.3e}", a.scenario.to_string(), a.frequency);
            }
        }
    }
    println!(
        "{} | PLL={:.3e} /yr | FAR={:.3e} | AIR={:.3e} /yr",
        study_id, result.total_pll, result.far, result.air
    );
    if verbose >= 1 {
        println!("ranking (by PLL contribution):");
        for row in result.ranking.iter().take(10) {
            println!(
                "  {:<6} {:<12} f={:.3e} pll={:.3e}",
                row.leak_size.label(),
                row.outcome.as_str(),
                row.frequency,
                row.pll
            );
        }
    }
}

fn print_uncertainty(u: &UncertaintyResult) {
    println!("uncertainty | samples={} | base_seed={}", u.samples, u.base_seed);
    for (name, s) in [("PLL", &u.pll), ("FAR", &u.far), ("AIR", &u.air)] {
        println!(
            "  {:<4} mean={:.3e} p05={:.3e} p50={:.3e} p95={:.3e}",
            name, s.mean, s.p05, s.p50, s.p95
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let study = match &args.study {
        Some(path) => Some(
            StudySpec::from_yaml_file(path)
                .with_context(|| format!("Failed to load study {}", path.display()))?,
        ),
        None => None,
    };

    let mut cfg = Config::default();
    if let Some(s) = &study {
        s.apply_analysis(&mut cfg);
    }
    cfg.apply_env();
    args.apply_to(&mut cfg);
    cfg.log_startup();

    let session = match &study {
        Some(s) => s.build_session().context("Failed to build session from study")?,
        None => QraSession::default(),
    };
    let study_id = study.as_ref().map_or("defaults", |s| s.study_id.as_str());

    let mut sink = TelemetrySink::from_env();

    let result = session
        .evaluate(EvaluateOptions {
            with_percentiles: cfg.uncertainty_enabled,
        })
        .context("Deterministic evaluation failed")?;
    sink.log_json(&telemetry::result_record(&result));
    print_summary(study_id, &result, args.verbose);

    let sweep = if cfg.uncertainty_enabled {
        let u = uncertainty::run(&session.snapshot(), &cfg.uncertainty, &CancelToken::new())
            .context("Uncertainty sweep failed")?;
        telemetry::log_uncertainty(&mut sink, &u);
        print_uncertainty(&u);
        Some(u)
    } else {
        None
    };
    sink.flush();

    fs::create_dir_all(&args.output_dir).with_context(|| {
        format!("Failed to create output directory {}", args.output_dir.display())
    })?;
    let out_path = args.output_dir.join(RESULT_FILE);
    let output = RunOutput {
        schema_version: telemetry::SCHEMA_VERSION,
        h2qra_version: cfg.version,
        study_id,
        uncertainty_enabled: cfg.uncertainty_enabled,
        settings: cfg.uncertainty,
        result: &result,
        uncertainty: sweep.as_ref(),
    };
    let json = serde_json::to_string_pretty(&output).context("Failed to serialize result")?;
    fs::write(&out_path, json)
        .with_context(|| format!("Failed to write {}", out_path.display()))?;

    println!("Output written to: {}", out_path.display());
    Ok(())
}
