#[cfg(feature = "highs")]
pub mod highs;
#[cfg(feature = "gurobi")]
pub mod gurobi;

use crate::error::SolverError;

/// Outcome of one blocking solve.
#[derive(Debug, Clone, PartialEq)]
pub enum SolveOutcome {
    /// `values` holds one entry per variable, in creation order.
    Optimal { objective: f64, values: Vec<f64> },
    Infeasible,
    Unbounded,
    InfeasibleOrUnbounded,
    /// A time or iteration limit stopped the solve before optimality was proven.
    LimitReached,
    EngineError(String),
}

impl SolveOutcome {
    pub fn status_name(&self) -> &'static str {
        match self {
            SolveOutcome::Optimal { .. } => "optimal",
            SolveOutcome::Infeasible => "infeasible",
            SolveOutcome::Unbounded => "unbounded",
            SolveOutcome::InfeasibleOrUnbounded => "infeasible or unbounded",
            SolveOutcome::LimitReached => "limit reached",
            SolveOutcome::EngineError(_) => "engine error",
        }
    }

    pub fn is_optimal(&self) -> bool {
        matches!(self, SolveOutcome::Optimal { .. })
    }
}

/// The model-building and solving API consumed from an external LP/MIP engine.
/// Problems are always minimized.
pub trait LPSolver: Sized {
    type Var: Copy + Clone;
    fn new() -> Result<Self, SolverError>;
    fn add_var(&mut self, cost: f64, lower: f64, upper: f64) -> Self::Var;
    /// Marks the variable as integer. Bounds are left as they are.
    fn set_binary(&mut self, var: Self::Var);
    fn set_cost(&mut self, var: Self::Var, cost: f64);
    fn add_constraint(&mut self, lb: f64, ub: f64, idxs: &[Self::Var], coeffs: &[f64]);
    fn set_time_limit(&mut self, seconds: f64);
    /// Switches off presolve and selects primal simplex, so that an
    /// unbounded status comes with a ray.
    fn prepare_for_rays(&mut self);
    fn optimize(&mut self) -> SolveOutcome;
    /// After an unbounded solve: a direction of unbounded decrease, one entry
    /// per variable in creation order.
    fn primal_ray(&mut self) -> Option<Vec<f64>>;
    fn inf(&self) -> f64;
    fn num_vars(&self) -> usize;
}
