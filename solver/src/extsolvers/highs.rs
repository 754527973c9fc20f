use std::convert::TryFrom;
use std::ffi::{c_void, CStr};
use std::fmt::{Debug, Formatter};
use std::os::raw::c_int;

use highs_sys::*;

use super::{LPSolver, SolveOutcome};
use crate::error::SolverError;

pub struct HighsSolverInstance {
    ptr: *mut c_void,
    /// First failed model-building call, reported by the next `optimize`.
    failed: Option<String>,
}

impl Drop for HighsSolverInstance {
    fn drop(&mut self) {
        unsafe {
            highs_sys::Highs_destroy(self.ptr);
        }
    }
}

impl HighsSolverInstance {
    fn set_bool_option(&mut self, name: &CStr, value: bool) {
        let retval =
            unsafe { highs_sys::Highs_setBoolOptionValue(self.ptr, name.as_ptr(), value as c_int) };
        self.check(retval, name);
    }

    fn set_int_option(&mut self, name: &CStr, value: c_int) {
        let retval = unsafe { highs_sys::Highs_setIntOptionValue(self.ptr, name.as_ptr(), value) };
        self.check(retval, name);
    }

    fn set_double_option(&mut self, name: &CStr, value: f64) {
        let retval =
            unsafe { highs_sys::Highs_setDoubleOptionValue(self.ptr, name.as_ptr(), value) };
        self.check(retval, name);
    }

    fn set_string_option(&mut self, name: &CStr, value: &CStr) {
        let retval = unsafe {
            highs_sys::Highs_setStringOptionValue(self.ptr, name.as_ptr(), value.as_ptr())
        };
        self.check(retval, name);
    }

    fn check(&mut self, retval: c_int, what: &CStr) {
        if HighsStatus::try_from(retval) == Ok(HighsStatus::Error) && self.failed.is_none() {
            self.failed = Some(format!("HiGHS call {:?} failed", what));
        }
    }

    fn model_status(&mut self) -> Result<HighsModelStatus, InvalidStatus> {
        // Start every solve from the slack basis, so that identical models
        // give identical answers.
        unsafe { highs_sys::Highs_setLogicalBasis(self.ptr) };

        let _retval = unsafe { highs_sys::Highs_run(self.ptr) };
        let model_status_retval = unsafe { highs_sys::Highs_getModelStatus(self.ptr) };
        HighsModelStatus::try_from(model_status_retval)
    }

    fn solution(&mut self) -> (f64, Vec<f64>) {
        let num_cols = self.num_vars();
        let mut values = vec![0.0; num_cols];
        if num_cols > 0 {
            let null = std::ptr::null_mut();
            unsafe { highs_sys::Highs_getSolution(self.ptr, values.as_mut_ptr(), null, null, null) };
        }
        let objective = unsafe { highs_sys::Highs_getObjectiveValue(self.ptr) };
        (objective, values)
    }
}

impl LPSolver for HighsSolverInstance {
    type Var = u32;

    fn new() -> Result<Self, SolverError> {
        let ptr = unsafe { highs_sys::Highs_create() };
        if ptr.is_null() {
            return Err(SolverError::Engine("could not create a HiGHS instance".to_string()));
        }
        let mut instance = Self { ptr, failed: None };
        instance.set_string_option(c"presolve", c"on");
        instance.set_bool_option(c"output_flag", false);
        Ok(instance)
    }

    fn add_var(&mut self, cost: f64, lower: f64, upper: f64) -> Self::Var {
        let new_col_idx = self.num_vars() as u32;
        let retval = unsafe {
            highs_sys::Highs_addCol(
                self.ptr,
                cost,
                lower,
                upper,
                0,
                std::ptr::null(),
                std::ptr::null(),
            )
        };
        self.check(retval, c"Highs_addCol");
        new_col_idx
    }

    fn set_binary(&mut self, var: Self::Var) {
        let retval = unsafe {
            highs_sys::Highs_changeColIntegrality(
                self.ptr,
                var as HighsInt,
                highs_sys::kHighsVarTypeInteger,
            )
        };
        self.check(retval, c"Highs_changeColIntegrality");
    }

    fn set_cost(&mut self, var: Self::Var, cost: f64) {
        let retval = unsafe { highs_sys::Highs_changeColCost(self.ptr, var as HighsInt, cost) };
        self.check(retval, c"Highs_changeColCost");
    }

    fn add_constraint(&mut self, lb: f64, ub: f64, idxs: &[Self::Var], coeffs: &[f64]) {
        assert!(idxs.len() == coeffs.len());
        let idxs = idxs.iter().map(|i| *i as HighsInt).collect::<Vec<_>>();
        let retval = unsafe {
            highs_sys::Highs_addRow(
                self.ptr,
                lb,
                ub,
                idxs.len() as HighsInt,
                idxs.as_ptr(),
                coeffs.as_ptr(),
            )
        };
        self.check(retval, c"Highs_addRow");
    }

    fn set_time_limit(&mut self, seconds: f64) {
        self.set_double_option(c"time_limit", seconds);
    }

    fn prepare_for_rays(&mut self) {
        self.set_string_option(c"presolve", c"off");
        self.set_string_option(c"solver", c"simplex");
        // 4 = primal simplex
        self.set_int_option(c"simplex_strategy", 4);
    }

    fn optimize(&mut self) -> SolveOutcome {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("highs optimize");

        if let Some(msg) = self.failed.take() {
            return SolveOutcome::EngineError(msg);
        }

        match self.model_status() {
            Ok(HighsModelStatus::Optimal) | Ok(HighsModelStatus::ModelEmpty) => {
                let (objective, values) = self.solution();
                SolveOutcome::Optimal { objective, values }
            }
            Ok(HighsModelStatus::Infeasible) => SolveOutcome::Infeasible,
            Ok(HighsModelStatus::Unbounded) => SolveOutcome::Unbounded,
            Ok(HighsModelStatus::UnboundedOrInfeasible) => SolveOutcome::InfeasibleOrUnbounded,
            Ok(HighsModelStatus::ReachedTimeLimit) | Ok(HighsModelStatus::ReachedIterationLimit) => {
                SolveOutcome::LimitReached
            }
            Ok(status) => SolveOutcome::EngineError(format!("HiGHS model status {:?}", status)),
            Err(invalid) => SolveOutcome::EngineError(format!("{:?}", invalid)),
        }
    }

    fn primal_ray(&mut self) -> Option<Vec<f64>> {
        let mut has_primal_ray: HighsInt = 0;
        let mut ray = vec![0.0; self.num_vars()];
        let retval = unsafe {
            highs_sys::Highs_getPrimalRay(self.ptr, &mut has_primal_ray, ray.as_mut_ptr())
        };
        let ok = HighsStatus::try_from(retval)
            .map(|s| s != HighsStatus::Error)
            .unwrap_or(false);
        (ok && has_primal_ray != 0).then_some(ray)
    }

    fn inf(&self) -> f64 {
        unsafe { highs_sys::Highs_getInfinity(self.ptr) }
    }

    fn num_vars(&self) -> usize {
        (unsafe { highs_sys::Highs_getNumCol(self.ptr) }) as usize
    }
}

/// The kinds of results of an optimization
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsModelStatus {
    /// not initialized
    NotSet = MODEL_STATUS_NOTSET as isize,
    /// Unable to load model
    LoadError = MODEL_STATUS_LOAD_ERROR as isize,
    /// invalid model
    ModelError = MODEL_STATUS_MODEL_ERROR as isize,
    /// Unable to run the pre-solve phase
    PresolveError = MODEL_STATUS_PRESOLVE_ERROR as isize,
    /// Unable to solve
    SolveError = MODEL_STATUS_SOLVE_ERROR as isize,
    /// Unable to clean after solve
    PostsolveError = MODEL_STATUS_POSTSOLVE_ERROR as isize,
    /// No variables in the model: nothing to optimize
    ModelEmpty = MODEL_STATUS_MODEL_EMPTY as isize,
    /// There is no solution to the problem
    Infeasible = MODEL_STATUS_INFEASIBLE as isize,
    /// The problem in unbounded or infeasible
    UnboundedOrInfeasible = MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE as isize,
    /// The problem is unbounded: there is no single optimal value
    Unbounded = MODEL_STATUS_UNBOUNDED as isize,
    /// An optimal solution was found
    Optimal = MODEL_STATUS_OPTIMAL as isize,
    /// objective bound
    ObjectiveBound = MODEL_STATUS_OBJECTIVE_BOUND as isize,
    /// objective target
    ObjectiveTarget = MODEL_STATUS_OBJECTIVE_TARGET as isize,
    /// reached limit
    ReachedTimeLimit = MODEL_STATUS_REACHED_TIME_LIMIT as isize,
    /// reached limit
    ReachedIterationLimit = MODEL_STATUS_REACHED_ITERATION_LIMIT as isize,
    /// Unknown model status
    Unknown = MODEL_STATUS_UNKNOWN as isize,
}

/// An unexpected status was returned by the HiGHS library.
#[derive(PartialEq, Clone, Copy)]
pub struct InvalidStatus(pub c_int);

impl Debug for InvalidStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} is not a valid HiGHS model status", self.0)
    }
}

impl TryFrom<c_int> for HighsModelStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> Result<Self, Self::Error> {
        match value {
            MODEL_STATUS_NOTSET => Ok(Self::NotSet),
            MODEL_STATUS_LOAD_ERROR => Ok(Self::LoadError),
            MODEL_STATUS_MODEL_ERROR => Ok(Self::ModelError),
            MODEL_STATUS_PRESOLVE_ERROR => Ok(Self::PresolveError),
            MODEL_STATUS_SOLVE_ERROR => Ok(Self::SolveError),
            MODEL_STATUS_POSTSOLVE_ERROR => Ok(Self::PostsolveError),
            MODEL_STATUS_MODEL_EMPTY => Ok(Self::ModelEmpty),
            MODEL_STATUS_INFEASIBLE => Ok(Self::Infeasible),
            MODEL_STATUS_UNBOUNDED => Ok(Self::Unbounded),
            MODEL_STATUS_UNBOUNDED_OR_INFEASIBLE => Ok(Self::UnboundedOrInfeasible),
            MODEL_STATUS_OPTIMAL => Ok(Self::Optimal),
            MODEL_STATUS_OBJECTIVE_BOUND => Ok(Self::ObjectiveBound),
            MODEL_STATUS_OBJECTIVE_TARGET => Ok(Self::ObjectiveTarget),
            MODEL_STATUS_REACHED_TIME_LIMIT => Ok(Self::ReachedTimeLimit),
            MODEL_STATUS_REACHED_ITERATION_LIMIT => Ok(Self::ReachedIterationLimit),
            MODEL_STATUS_UNKNOWN => Ok(Self::Unknown),
            n => Err(InvalidStatus(n)),
        }
    }
}

/// The status of a highs operation
#[derive(Clone, Copy, Debug, PartialOrd, PartialEq, Ord, Eq)]
pub enum HighsStatus {
    /// Success
    OK,
    /// Done, with warning
    Warning,
    /// An error occurred
    Error,
}

impl TryFrom<c_int> for HighsStatus {
    type Error = InvalidStatus;

    fn try_from(value: c_int) -> Result<Self, InvalidStatus> {
        match value {
            STATUS_OK => Ok(Self::OK),
            STATUS_WARNING => Ok(Self::Warning),
            STATUS_ERROR => Ok(Self::Error),
            n => Err(InvalidStatus(n)),
        }
    }
}
