use bendersatsp_structs::{InstanceError, TourError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SolverError {
    #[error(transparent)]
    Instance(#[from] InstanceError),

    /// The LP/MIP engine failed during a master or worker solve.
    #[error("solver engine failed: {0}")]
    Engine(String),

    /// The worker LP always contains the zero point, so this is a defect.
    #[error("worker LP reported infeasible")]
    WorkerInfeasible,

    #[error("worker LP is unbounded but no unbounded ray could be recovered")]
    MissingRay,

    #[error("separation was entered again while already running")]
    ReentrantSeparation,

    #[error("solution is not a single tour: {0}")]
    BrokenTour(#[from] TourError),

    #[error("lazy constraint loop did not settle within {0} rounds")]
    RoundLimit(usize),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(feature = "gurobi")]
impl From<grb::Error> for SolverError {
    fn from(e: grb::Error) -> Self {
        SolverError::Engine(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SolverError>;
