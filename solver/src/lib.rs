#[cfg(not(any(feature = "highs", feature = "gurobi")))]
compile_error!("enable at least one LP engine feature: `highs` or `gurobi`");

pub mod callback;
pub mod driver;
pub mod engine;
pub mod error;
pub mod extsolvers;
pub mod master;
pub mod settings;
pub mod worker;

pub use driver::{solve_instance, solve_with_settings, Report};
pub use error::{Result, SolverError};
pub use settings::{EngineKind, Settings};
