use std::path::PathBuf;

use anyhow::Context;
use bendersatsp_solver::{solve_with_settings, EngineKind, Settings};
use bendersatsp_structs::Instance;
use clap::{Parser, ValueEnum};
use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Benders' cuts only used as lazy constraints, to separate integer
    /// infeasible solutions.
    #[value(name = "0")]
    IntegerOnly,
    /// Benders' cuts also used as user cuts, to separate fractional
    /// infeasible solutions.
    #[value(name = "1")]
    Fractional,
}

/// Solves an asymmetric traveling salesman instance by Benders decomposition.
#[derive(Parser, Debug)]
#[command(name = "bendersatsp")]
#[command(version, about, long_about = None)]
struct Args {
    #[arg(value_enum)]
    mode: Mode,

    /// ATSP instance file (.dat or .json).
    #[arg(default_value = "data/atsp.dat")]
    file: PathBuf,

    /// TOML settings file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long, value_enum)]
    engine: Option<EngineKind>,

    /// Time limit in seconds for each master solve.
    #[arg(long)]
    time_limit: Option<f64>,

    /// Print the result as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut settings = match &args.config {
        Some(path) => Settings::load(path)?,
        None => Settings::default(),
    };
    settings.separate_fractional = args.mode == Mode::Fractional;
    if let Some(engine) = args.engine {
        settings.engine = engine;
    }
    if args.time_limit.is_some() {
        settings.time_limit = args.time_limit;
    }

    let instance = Instance::load(&args.file)
        .with_context(|| format!("could not read instance {}", args.file.display()))?;
    info!(
        "Read {} with {} nodes",
        args.file.display(),
        instance.num_nodes()
    );

    if !args.json {
        println!(
            "Benders' cuts separated to cut off: {}",
            match args.mode {
                Mode::IntegerOnly => "Only integer infeasible solutions.",
                Mode::Fractional => "Integer and fractional infeasible solutions.",
            }
        );
    }

    let report = solve_with_settings(&instance, &settings)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!();
    println!("Solution status: {}", report.status);
    if let Some(objective) = report.objective {
        println!("Objective value: {}", objective);
    }
    match &report.tour {
        Some(tour) => {
            println!("Optimal tour:");
            println!("{}", tour);
        }
        None => println!("Solution status is not optimal"),
    }
    println!(
        "Lazy callback: {} calls, {} cuts",
        report.lazy.calls, report.lazy.cuts
    );
    if let Some(user) = report.user {
        println!("User cut callback: {} calls, {} cuts", user.calls, user.cuts);
    }
    Ok(())
}
