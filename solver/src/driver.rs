use std::cell::RefCell;
use std::rc::Rc;

use bendersatsp_structs::{Instance, Tour};
use log::{info, warn};
use serde::Serialize;

use crate::callback::{BendersCallback, CallbackStats, CutCallback, CutKind};
use crate::engine::{BranchAndCut, Callbacks, CutLoopEngine, EngineStats};
use crate::error::{Result, SolverError};
use crate::extsolvers::{LPSolver, SolveOutcome};
use crate::master::build_master;
use crate::settings::{EngineKind, Settings};
use crate::worker::WorkerLp;

/// Arc values above this count as selected when reading off the tour.
pub const SUCCESSOR_THRESHOLD: f64 = 1e-3;

#[cfg(feature = "highs")]
pub type DefaultLp = crate::extsolvers::highs::HighsSolverInstance;
#[cfg(all(feature = "gurobi", not(feature = "highs")))]
pub type DefaultLp = crate::extsolvers::gurobi::GurobiSolver;

#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub status: &'static str,
    pub objective: Option<f64>,
    pub tour: Option<Tour>,
    pub engine: &'static str,
    pub engine_stats: EngineStats,
    pub lazy: CallbackStats,
    pub user: Option<CallbackStats>,
}

impl Report {
    pub fn is_optimal(&self) -> bool {
        self.tour.is_some()
    }
}

/// Solves the instance with Benders cuts separated by a worker LP on `LP`.
/// The lazy callback is always registered; the user cut callback only with
/// `separate_fractional`. Both share the one worker LP.
pub fn solve_instance<LP: LPSolver>(
    instance: &Instance,
    settings: &Settings,
    engine: &mut dyn BranchAndCut,
) -> Result<Report> {
    #[cfg(feature = "prof")]
    let _p = hprof::enter("solve instance");

    let master = build_master(instance);
    let worker = Rc::new(RefCell::new(WorkerLp::<LP>::new(
        instance.num_nodes(),
        settings.ray_tolerance,
    )?));

    let mut lazy = BendersCallback::new(CutKind::Lazy, master.arcs, Rc::clone(&worker));
    let mut user = settings
        .separate_fractional
        .then(|| BendersCallback::new(CutKind::User, master.arcs, Rc::clone(&worker)));

    info!(
        "Solving {} nodes with the {} engine, fractional separation {}",
        instance.num_nodes(),
        engine.name(),
        if user.is_some() { "on" } else { "off" }
    );

    let outcome = engine.solve(
        &master,
        Callbacks {
            lazy: Some(&mut lazy),
            user: user.as_mut().map(|u| u as &mut dyn CutCallback),
        },
    )?;

    let mut report = Report {
        status: outcome.status_name(),
        objective: None,
        tour: None,
        engine: engine.name(),
        engine_stats: engine.stats(),
        lazy: lazy.stats(),
        user: user.as_ref().map(|u| u.stats()),
    };

    match outcome {
        SolveOutcome::Optimal { objective, values } => {
            let successors = master.arcs.successors(&values, SUCCESSOR_THRESHOLD);
            let tour = Tour::from_successors(&successors)?;
            let tour_cost = tour.cost(instance.costs());
            if (tour_cost - objective).abs() > 1e-6 * objective.abs().max(1.0) {
                warn!("Tour cost {} differs from objective {}", tour_cost, objective);
            }
            report.objective = Some(objective);
            report.tour = Some(tour);
        }
        SolveOutcome::EngineError(msg) => return Err(SolverError::Engine(msg)),
        other => info!("No optimal solution: {}", other.status_name()),
    }
    Ok(report)
}

/// Solves the instance with the engine named in `settings`.
pub fn solve_with_settings(instance: &Instance, settings: &Settings) -> Result<Report> {
    settings.validate()?;
    match settings.engine {
        EngineKind::CutLoop => {
            let mut engine = CutLoopEngine::<DefaultLp>::new(settings.into());
            solve_instance::<DefaultLp>(instance, settings, &mut engine)
        }
        #[cfg(feature = "gurobi")]
        EngineKind::Gurobi => {
            let mut engine = crate::extsolvers::gurobi::GurobiBranchAndCut::new(settings.into());
            solve_instance::<DefaultLp>(instance, settings, &mut engine)
        }
        #[cfg(not(feature = "gurobi"))]
        EngineKind::Gurobi => Err(SolverError::Config(
            "the gurobi engine needs the `gurobi` feature".to_string(),
        )),
    }
}
