use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct ArcCoef {
    pub from: usize,
    pub to: usize,
    pub coef: f64,
}

/// A Benders feasibility cut over the arc variables:
///
/// `sum(coef * x[from][to]) >= rhs`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct BendersCut {
    pub arcs: Vec<ArcCoef>,
    pub rhs: f64,
}

impl BendersCut {
    pub fn lhs(&self, x: &[Vec<f64>]) -> f64 {
        self.arcs.iter().map(|a| a.coef * x[a.from][a.to]).sum()
    }

    /// How far `x` falls short of the right-hand side. Positive means the
    /// cut cuts `x` off.
    pub fn violation(&self, x: &[Vec<f64>]) -> f64 {
        self.rhs - self.lhs(x)
    }

    pub fn is_violated_by(&self, x: &[Vec<f64>], tolerance: f64) -> bool {
        self.violation(x) > tolerance
    }

    pub fn len(&self) -> usize {
        self.arcs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arcs.is_empty()
    }

    pub fn coef(&self, from: usize, to: usize) -> Option<f64> {
        self.arcs
            .iter()
            .find(|a| a.from == from && a.to == to)
            .map(|a| a.coef)
    }
}

impl fmt::Display for BendersCut {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, a) in self.arcs.iter().enumerate() {
            if idx > 0 {
                write!(f, " + ")?;
            }
            write!(f, "{:.3} x.{}.{}", a.coef, a.from, a.to)?;
        }
        if self.arcs.is_empty() {
            write!(f, "0")?;
        }
        write!(f, " >= {:.3}", self.rhs)
    }
}
