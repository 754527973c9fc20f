use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use serde::Serialize;

use crate::error::{Result, SolverError};
use crate::extsolvers::LPSolver;
use crate::master::{ArcVars, Row};
use crate::worker::WorkerLp;

/// Where in the search a separation procedure is invoked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CutKind {
    /// At every new integer-feasible candidate. Cuts become lazy constraints
    /// that every later candidate has to satisfy.
    Lazy,
    /// At a node whose relaxation the engine's own cut loop has finished
    /// with. Cuts only tighten the relaxation.
    User,
}

/// A procedure the search driver calls at well-defined points, with read
/// access to the current values of all master columns and a channel to
/// submit new rows.
pub trait CutCallback {
    fn kind(&self) -> CutKind;
    fn separate(&mut self, values: &[f64], cuts: &mut Vec<Row>) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CallbackStats {
    pub calls: usize,
    pub cuts: usize,
}

/// Separates Benders cuts by solving the worker LP for the current arc
/// values. The lazy and the user cut callback share one worker LP; sharing
/// goes through `Rc<RefCell<_>>`, which keeps both on the solving thread and
/// turns an overlapping separation into an error.
pub struct BendersCallback<LP: LPSolver> {
    kind: CutKind,
    arcs: ArcVars,
    worker: Rc<RefCell<WorkerLp<LP>>>,
    stats: CallbackStats,
}

impl<LP: LPSolver> BendersCallback<LP> {
    pub fn new(kind: CutKind, arcs: ArcVars, worker: Rc<RefCell<WorkerLp<LP>>>) -> Self {
        BendersCallback {
            kind,
            arcs,
            worker,
            stats: CallbackStats::default(),
        }
    }

    pub fn stats(&self) -> CallbackStats {
        self.stats
    }
}

impl<LP: LPSolver> CutCallback for BendersCallback<LP> {
    fn kind(&self) -> CutKind {
        self.kind
    }

    fn separate(&mut self, values: &[f64], cuts: &mut Vec<Row>) -> Result<()> {
        self.stats.calls += 1;
        let x = self.arcs.arc_matrix(values);

        let cut = self
            .worker
            .try_borrow_mut()
            .map_err(|_| SolverError::ReentrantSeparation)?
            .separate(&x)?;

        if let Some(cut) = cut {
            self.stats.cuts += 1;
            debug!(
                "{:?} callback call {}: adding cut with {} arcs",
                self.kind,
                self.stats.calls,
                cut.len()
            );
            cuts.push(self.arcs.cut_row(&cut));
        }
        Ok(())
    }
}
