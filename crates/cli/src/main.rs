mod primitives_io;
mod provenance;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use primsel::config::{DEFAULT_ENERGY_FILE, DEFAULT_MAX_ATTEMPTS, DEFAULT_TIME_LIMIT};
use primsel::error::ArtifactKind;
use primsel::sparse_io::read_dense_column;
use primsel::{
    Backend, ConfigError, Driver, EnergyProblem, ProblemWeights, SearchAlgorithm, SolveConfig,
    SolveError, StructuralMismatch,
};
use serde_json::json;
use tracing::Level;
use tracing_subscriber::fmt::SubscriberBuilder;

use crate::primitives_io::CsvPrimitiveIo;
use crate::provenance::{current_git_rev, write_sidecar, Payload};

#[derive(Parser)]
#[command(name = "primsel")]
#[command(about = "Primitive selection: solve a serialized energy problem and write the chosen primitives")]
struct Cmd {
    /// Debug-level logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    action: Action,
}

#[derive(Subcommand)]
enum Action {
    /// Solve the problem and write selection, diagnostics and energy artifacts
    Solve(SolveArgs),
    /// Split the energy of a stored solution into data, pairwise and complexity terms
    Energy(EnergyArgs),
    /// Print version, code revision and available backends as JSON
    Report,
}

#[derive(Args)]
struct SolveArgs {
    /// mosek, bonmin or gurobi
    #[arg(long)]
    solver: Backend,
    #[arg(long, default_value = "problem")]
    problem: PathBuf,
    /// Seconds per attempt; non-positive disables the limit
    #[arg(long, default_value_t = DEFAULT_TIME_LIMIT)]
    time: f64,
    /// Branch-and-bound algorithm mode
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=5))]
    bmode: u8,
    /// Output directory relative to the candidates file
    #[arg(long, default_value = ".")]
    rod: PathBuf,
    /// Starting point for the solver (sparse column vector)
    #[arg(long)]
    x0: Option<PathBuf>,
    /// Candidate primitives CSV; its `_it<k>` suffix names the iteration
    #[arg(long)]
    candidates: Option<PathBuf>,
    /// Energy ledger file name, placed next to the problem directory
    #[arg(long, default_value = DEFAULT_ENERGY_FILE)]
    energy: String,
    #[arg(long, default_value_t = DEFAULT_MAX_ATTEMPTS)]
    attempts: u32,
}

#[derive(Args)]
struct EnergyArgs {
    #[arg(long, default_value = "problem")]
    problem: PathBuf,
    /// Solution vector; defaults to `<problem>/x.csv`
    #[arg(long)]
    x: Option<PathBuf>,
    #[arg(long, default_value_t = 1.0)]
    data_weight: f64,
    #[arg(long, default_value_t = 1.0)]
    pairwise_weight: f64,
    #[arg(long, default_value_t = 1.0)]
    complexity_weight: f64,
}

fn main() -> ExitCode {
    let cmd = Cmd::parse();
    let level = if cmd.verbose { Level::DEBUG } else { Level::INFO };
    SubscriberBuilder::default()
        .with_target(false)
        .with_max_level(level)
        .init();
    let result = match cmd.action {
        Action::Solve(args) => solve(args, cmd.verbose),
        Action::Energy(args) => energy(args).map(|()| ExitCode::SUCCESS),
        Action::Report => report().map(|()| ExitCode::SUCCESS),
    };
    match result {
        Ok(code) => code,
        Err(err) => {
            tracing::error!("{err:#}");
            ExitCode::from(exit_status(&err))
        }
    }
}

/// 2 configuration, 3 no acceptable solution, 4 structural mismatch, 1 anything else.
fn exit_status(err: &anyhow::Error) -> u8 {
    if let Some(e) = err.downcast_ref::<SolveError>() {
        return match e {
            SolveError::Config(_) => 2,
            SolveError::AttemptsExhausted { .. } => 3,
            SolveError::Structural(_) => 4,
            SolveError::Candidates { .. } => 1,
        };
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return 2;
    }
    if err.downcast_ref::<StructuralMismatch>().is_some() {
        return 4;
    }
    1
}

fn solve_config(args: SolveArgs, verbose: bool) -> Result<SolveConfig> {
    let mut cfg = SolveConfig::new(args.solver, args.problem)
        .with_time_limit(args.time)
        .with_rel_out_dir(args.rod)
        .with_max_attempts(args.attempts);
    cfg.algorithm = SearchAlgorithm::try_from(args.bmode)?;
    cfg.energy_file = args.energy;
    cfg.verbose = verbose;
    if let Some(x0) = args.x0 {
        cfg = cfg.with_starting_point(x0);
    }
    if let Some(candidates) = args.candidates {
        cfg = cfg.with_candidates(candidates);
    }
    Ok(cfg)
}

fn solve(args: SolveArgs, verbose: bool) -> Result<ExitCode> {
    let cfg = solve_config(args, verbose)?;
    tracing::info!(
        backend = %cfg.backend,
        problem = %cfg.problem_dir.display(),
        time_limit = cfg.time_limit,
        algorithm = ?cfg.algorithm,
        "solve"
    );
    let report = Driver::new(&cfg, &CsvPrimitiveIo).solve()?;
    let mut failed = report.failures.len();

    if let Some(path) = report.artifact(ArtifactKind::Primitives) {
        let payload = Payload {
            params: serde_json::to_value(&cfg)?,
            energy: serde_json::to_value(report.energy)?,
            attempts: report.attempts,
        };
        match write_sidecar(path, payload) {
            Ok(sidecar) => tracing::info!(path = %sidecar.display(), "provenance written"),
            Err(err) => {
                tracing::error!("provenance: {err:#}");
                failed += 1;
            }
        }
    }

    tracing::info!(
        total = report.energy.total(),
        attempts = report.attempts,
        selected = report.selected,
        deferred = report.deferred,
        "done"
    );
    if failed > 0 {
        tracing::warn!(failed, "some artifacts were not written");
        return Ok(ExitCode::from(5));
    }
    Ok(ExitCode::SUCCESS)
}

fn energy(args: EnergyArgs) -> Result<()> {
    let problem = EnergyProblem::read_dir(&args.problem)
        .with_context(|| format!("reading problem {}", args.problem.display()))?;
    let x_path = args.x.unwrap_or_else(|| args.problem.join("x.csv"));
    let x = read_dense_column(&x_path)
        .with_context(|| format!("reading solution {}", x_path.display()))?;
    let weights = ProblemWeights {
        data: args.data_weight,
        pairwise: args.pairwise_weight,
        complexity: args.complexity_weight,
    };
    let terms = problem.decompose(&x, weights)?;
    let [data, pairwise, complexity] = terms.unweighted();
    let obj = json!({
        "total": terms.total(),
        "weighted": terms,
        "unweighted": {
            "data": data,
            "pairwise": pairwise,
            "complexity": complexity
        }
    });
    println!("{}", serde_json::to_string_pretty(&obj)?);
    Ok(())
}

fn report() -> Result<()> {
    let backends: serde_json::Map<String, serde_json::Value> = [Backend::Mosek, Backend::Bonmin, Backend::Gurobi]
        .into_iter()
        .map(|b| (b.name().to_string(), json!(b.is_available())))
        .collect();
    let obj = json!({
        "code_rev": current_git_rev(),
        "version": primsel::VERSION,
        "backends": backends
    });
    println!("{}", serde_json::to_string_pretty(&obj)?);
    Ok(())
}
