use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SolverError};
use crate::worker::RAY_TOLERANCE;

/// Branch-and-cut engine used for the master problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    /// Re-solves the master after each round of cuts.
    #[default]
    CutLoop,
    /// Gurobi's branch-and-cut with native lazy constraint and user cut callbacks.
    Gurobi,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Also separate Benders cuts at fractional points, as user cuts.
    pub separate_fractional: bool,
    /// Ray components at or below this are ignored when deriving a cut.
    pub ray_tolerance: f64,
    /// User cuts violated by less than this do not count as progress.
    pub min_violation: f64,
    pub max_user_cut_rounds: usize,
    pub max_lazy_rounds: Option<usize>,
    /// Seconds, per master solve.
    pub time_limit: Option<f64>,
    pub engine: EngineKind,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            separate_fractional: false,
            ray_tolerance: RAY_TOLERANCE,
            min_violation: 1e-6,
            max_user_cut_rounds: 100,
            max_lazy_rounds: None,
            time_limit: None,
            engine: EngineKind::default(),
        }
    }
}

impl Settings {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(s).map_err(|e| SolverError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| SolverError::Config(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.ray_tolerance.is_finite() && self.ray_tolerance > 0.0) {
            return Err(SolverError::Config(format!(
                "ray_tolerance must be positive, got {}",
                self.ray_tolerance
            )));
        }
        if !(self.min_violation.is_finite() && self.min_violation >= 0.0) {
            return Err(SolverError::Config(format!(
                "min_violation must be non-negative, got {}",
                self.min_violation
            )));
        }
        if let Some(t) = self.time_limit {
            if !(t > 0.0) {
                return Err(SolverError::Config(format!(
                    "time_limit must be positive, got {}",
                    t
                )));
            }
        }
        Ok(())
    }
}
