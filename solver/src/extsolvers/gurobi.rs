#![cfg(feature = "gurobi")]

use std::cell::RefCell;

use grb::callback::{CbResult, Callback, Where};
use grb::constr::IneqExpr;
use grb::expr::LinExpr;
use grb::prelude::*;
use log::{debug, info};

use super::{LPSolver, SolveOutcome};
use crate::engine::{check_lazy_rows, BranchAndCut, Callbacks, EngineSettings, EngineStats};
use crate::error::{Result, SolverError};
use crate::master::{MasterModel, Row};

thread_local! {
static GLOBAL_GUROBI_ENV :RefCell<Option<grb::Env>> = const { RefCell::new(None) };
}

fn new_model() -> Result<grb::Model> {
    GLOBAL_GUROBI_ENV.with_borrow_mut(|env| {
        if env.is_none() {
            *env = Some(grb::Env::new("")?);
        }
        let env = env
            .as_ref()
            .ok_or_else(|| SolverError::Engine("no Gurobi environment".to_string()))?;
        let mut model = grb::Model::with_env("", env)?;
        model.set_param(param::OutputFlag, 0)?;
        Ok(model)
    })
}

pub struct GurobiSolver {
    grb: grb::Model,
    added_vars: Vec<grb::Var>,
    /// First failed model-building call, reported by the next `optimize`.
    failed: Option<String>,
}

impl GurobiSolver {
    fn record<T>(&mut self, result: grb::Result<T>) -> Option<T> {
        match result {
            Ok(x) => Some(x),
            Err(e) => {
                if self.failed.is_none() {
                    self.failed = Some(e.to_string());
                }
                None
            }
        }
    }

    fn var(&self, var: usize) -> Option<grb::Var> {
        self.added_vars.get(var).copied()
    }

    /// Looks up a variable for an attribute change. Gurobi only accepts
    /// attribute changes on variables that have been through an update.
    fn updated_var(&mut self, var: usize) -> Option<grb::Var> {
        let var = self.var(var)?;
        let r = self.grb.update();
        self.record(r)?;
        Some(var)
    }
}

impl LPSolver for GurobiSolver {
    type Var = usize;

    fn new() -> Result<Self> {
        Ok(Self {
            grb: new_model()?,
            added_vars: Vec::new(),
            failed: None,
        })
    }

    fn add_var(&mut self, cost: f64, lower: f64, upper: f64) -> Self::Var {
        let idx = self.added_vars.len();
        let r = self
            .grb
            .add_var("", VarType::Continuous, cost, lower, upper, std::iter::empty());
        if let Some(var) = self.record(r) {
            self.added_vars.push(var);
        }
        idx
    }

    fn set_binary(&mut self, var: Self::Var) {
        let Some(var) = self.updated_var(var) else { return };
        let r = self.grb.set_obj_attr(grb::attr::VType, &var, VarType::Integer);
        self.record(r);
    }

    fn set_cost(&mut self, var: Self::Var, cost: f64) {
        let Some(var) = self.updated_var(var) else { return };
        let r = self.grb.set_obj_attr(grb::attr::Obj, &var, cost);
        self.record(r);
    }

    fn add_constraint(&mut self, lb: f64, ub: f64, idxs: &[Self::Var], coeffs: &[f64]) {
        let vars = idxs.iter().filter_map(|i| self.var(*i)).collect::<Vec<_>>();
        if vars.len() != idxs.len() {
            return;
        }
        for constr in linear_constraints(&vars, coeffs, lb, ub) {
            let r = self.grb.add_constr("", constr);
            self.record(r);
        }
    }

    fn set_time_limit(&mut self, seconds: f64) {
        let r = self.grb.set_param(param::TimeLimit, seconds);
        self.record(r);
    }

    fn prepare_for_rays(&mut self) {
        for (p, v) in [
            (param::Presolve, 0),
            (param::Method, 0),
            (param::InfUnbdInfo, 1),
            (param::DualReductions, 0),
        ] {
            let r = self.grb.set_param(p, v);
            self.record(r);
        }
    }

    fn optimize(&mut self) -> SolveOutcome {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("gurobi optimize");

        if let Some(msg) = self.failed.take() {
            return SolveOutcome::EngineError(msg);
        }
        if let Err(e) = self.grb.optimize() {
            return SolveOutcome::EngineError(e.to_string());
        }
        outcome(&self.grb, &self.added_vars)
    }

    fn primal_ray(&mut self) -> Option<Vec<f64>> {
        self.grb
            .get_obj_attr_batch(grb::attr::UnbdRay, self.added_vars.iter().cloned())
            .ok()
    }

    fn inf(&self) -> f64 {
        f64::INFINITY
    }

    fn num_vars(&self) -> usize {
        self.added_vars.len()
    }
}

fn outcome(model: &grb::Model, vars: &[grb::Var]) -> SolveOutcome {
    let status = match model.status() {
        Ok(status) => status,
        Err(e) => return SolveOutcome::EngineError(e.to_string()),
    };
    match status {
        Status::Optimal => {
            let solution = model.get_attr(attr::ObjVal).and_then(|objective| {
                let values = model.get_obj_attr_batch(grb::attr::X, vars.iter().cloned())?;
                Ok((objective, values))
            });
            match solution {
                Ok((objective, values)) => SolveOutcome::Optimal { objective, values },
                Err(e) => SolveOutcome::EngineError(e.to_string()),
            }
        }
        Status::Infeasible => SolveOutcome::Infeasible,
        Status::Unbounded => SolveOutcome::Unbounded,
        Status::InfOrUnbd => SolveOutcome::InfeasibleOrUnbounded,
        Status::TimeLimit
        | Status::NodeLimit
        | Status::IterationLimit
        | Status::SolutionLimit => SolveOutcome::LimitReached,
        other => SolveOutcome::EngineError(format!("Gurobi status {:?}", other)),
    }
}

fn linear_constraints(vars: &[grb::Var], coeffs: &[f64], lb: f64, ub: f64) -> Vec<IneqExpr> {
    let mut expr = LinExpr::new();
    for (v, c) in vars.iter().zip(coeffs.iter()) {
        expr.add_term(*c, *v);
    }
    if lb == ub {
        return vec![c!(expr == lb)];
    }
    let mut constrs = Vec::new();
    if lb.is_finite() {
        constrs.push(c!(expr.clone() >= lb));
    }
    if ub.is_finite() {
        constrs.push(c!(expr <= ub));
    }
    constrs
}

fn row_constraints(row: &Row, vars: &[grb::Var]) -> Vec<IneqExpr> {
    let vars = row.idxs.iter().map(|i| vars[*i]).collect::<Vec<_>>();
    linear_constraints(&vars, &row.coeffs, row.lower, row.upper)
}

/// Gurobi's own branch-and-cut, with the lazy callback called at every new
/// incumbent (`MIPSOL`) and the user callback at nodes whose relaxation is
/// solved to optimality (`MIPNODE`). Runs single-threaded.
///
/// Gurobi does not report when its own cut loop at a node has settled, so the
/// user callback runs on every `MIPNODE` pass with an optimal relaxation, not
/// only the last one. Cuts violated by no more than `min_violation` are
/// dropped and `max_user_cut_rounds` bounds the passes that add cuts.
pub struct GurobiBranchAndCut {
    settings: EngineSettings,
    stats: EngineStats,
}

impl GurobiBranchAndCut {
    pub fn new(settings: EngineSettings) -> Self {
        GurobiBranchAndCut {
            settings,
            stats: EngineStats::default(),
        }
    }
}

struct MasterCallback<'a> {
    vars: Vec<grb::Var>,
    callbacks: Callbacks<'a>,
    settings: EngineSettings,
    stats: EngineStats,
    /// Separation errors stop the search and are returned from `solve`.
    error: Option<SolverError>,
}

impl Callback for MasterCallback<'_> {
    fn callback(&mut self, w: Where) -> CbResult {
        match w {
            Where::MIPSol(ctx) => {
                let Some(lazy) = self.callbacks.lazy.as_deref_mut() else {
                    return Ok(());
                };
                let values = ctx.get_solution(&self.vars)?;
                let mut cuts = Vec::new();
                if let Err(e) = lazy.separate(&values, &mut cuts) {
                    self.error = Some(e);
                    ctx.terminate();
                    return Ok(());
                }
                if cuts.is_empty() {
                    return Ok(());
                }
                if let Err(e) = check_lazy_rows(&cuts, &values, self.settings.min_violation) {
                    self.error = Some(e);
                    ctx.terminate();
                    return Ok(());
                }
                if let Some(limit) = self.settings.max_lazy_rounds {
                    if self.stats.lazy_rounds >= limit {
                        self.error = Some(SolverError::RoundLimit(limit));
                        ctx.terminate();
                        return Ok(());
                    }
                }
                self.stats.lazy_rounds += 1;
                self.stats.rows_added += cuts.len();
                for row in cuts.iter() {
                    for constr in row_constraints(row, &self.vars) {
                        ctx.add_lazy(constr)?;
                    }
                }
            }
            Where::MIPNode(ctx) => {
                let Some(user) = self.callbacks.user.as_deref_mut() else {
                    return Ok(());
                };
                if self.stats.user_rounds >= self.settings.max_user_cut_rounds
                    || ctx.status()? != Status::Optimal
                {
                    return Ok(());
                }
                let values = ctx.get_solution(&self.vars)?;
                let mut cuts = Vec::new();
                if let Err(e) = user.separate(&values, &mut cuts) {
                    self.error = Some(e);
                    ctx.terminate();
                    return Ok(());
                }
                let min_violation = self.settings.min_violation;
                cuts.retain(|row| row.violation(&values) > min_violation);
                if cuts.is_empty() {
                    return Ok(());
                }
                self.stats.user_rounds += 1;
                self.stats.rows_added += cuts.len();
                for row in cuts.iter() {
                    for constr in row_constraints(row, &self.vars) {
                        ctx.add_cut(constr)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }
}

impl BranchAndCut for GurobiBranchAndCut {
    fn name(&self) -> &'static str {
        "gurobi"
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }

    fn solve(&mut self, master: &MasterModel, callbacks: Callbacks<'_>) -> Result<SolveOutcome> {
        let mut model = new_model()?;
        model.set_param(param::Threads, 1)?;
        model.set_param(param::LazyConstraints, 1)?;
        model.set_param(param::PreCrush, 1)?;
        if let Some(t) = self.settings.time_limit {
            model.set_param(param::TimeLimit, t)?;
        }

        let mut vars = Vec::with_capacity(master.columns.len());
        for column in master.columns.iter() {
            let vtype = if column.binary {
                VarType::Binary
            } else {
                VarType::Continuous
            };
            vars.push(model.add_var(
                "",
                vtype,
                column.cost,
                column.lower,
                column.upper,
                std::iter::empty(),
            )?);
        }
        for row in master.rows.iter() {
            for constr in row_constraints(row, &vars) {
                model.add_constr("", constr)?;
            }
        }
        model.update()?;
        debug!(
            "Gurobi master: {} columns, {} rows",
            master.columns.len(),
            master.rows.len()
        );

        let mut cb = MasterCallback {
            vars,
            callbacks,
            settings: self.settings,
            stats: EngineStats::default(),
            error: None,
        };
        model.optimize_with_callback(&mut cb)?;

        self.stats = cb.stats;
        self.stats.master_solves = 1;
        if let Some(e) = cb.error {
            return Err(e);
        }

        let outcome = outcome(&model, &cb.vars);
        info!(
            "Gurobi master is {} after {} lazy rounds",
            outcome.status_name(),
            self.stats.lazy_rounds
        );
        Ok(outcome)
    }
}
