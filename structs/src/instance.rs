use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum InstanceError {
    #[error("could not read instance: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not parse instance: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("instance data contains no cost matrix")]
    NoMatrix,
    #[error("instance has {0} nodes, at least 2 are needed")]
    TooFewNodes(usize),
    #[error("cost matrix row {row} has {len} entries, expected {expected}")]
    NotSquare {
        row: usize,
        len: usize,
        expected: usize,
    },
    #[error("arc cost ({row},{col}) is not a number")]
    NotANumber { row: usize, col: usize },
    #[error("arc cost ({row},{col}) is not finite")]
    NonFinite { row: usize, col: usize },
}

/// An ATSP instance: the arc cost matrix of a complete directed graph.
///
/// The matrix is square and its diagonal is zero. Instances are validated on
/// construction and never change afterwards.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(try_from = "RawInstance", into = "RawInstance")]
pub struct Instance {
    costs: Vec<Vec<f64>>,
}

#[derive(Serialize, Deserialize)]
struct RawInstance {
    costs: Vec<Vec<f64>>,
}

impl TryFrom<RawInstance> for Instance {
    type Error = InstanceError;

    fn try_from(raw: RawInstance) -> Result<Self, Self::Error> {
        Instance::new(raw.costs)
    }
}

impl From<Instance> for RawInstance {
    fn from(instance: Instance) -> Self {
        RawInstance {
            costs: instance.costs,
        }
    }
}

impl Instance {
    pub fn new(mut costs: Vec<Vec<f64>>) -> Result<Self, InstanceError> {
        let n = costs.len();
        if n < 2 {
            return Err(InstanceError::TooFewNodes(n));
        }

        for (row, arc_costs) in costs.iter_mut().enumerate() {
            if arc_costs.len() != n {
                return Err(InstanceError::NotSquare {
                    row,
                    len: arc_costs.len(),
                    expected: n,
                });
            }

            // Self loops never take part in a tour.
            arc_costs[row] = 0.0;

            if let Some(col) = arc_costs.iter().position(|c| !c.is_finite()) {
                return Err(InstanceError::NonFinite { row, col });
            }
        }

        Ok(Instance { costs })
    }

    /// Reads an instance from a file. Files ending in `.json` hold an object
    /// `{"costs": [[...], ...]}`, anything else is read as a `.dat` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, InstanceError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let instance = if is_json {
            Self::from_json_str(&contents)?
        } else {
            Self::from_dat_str(&contents)?
        };

        log::debug!(
            "loaded instance {} with {} nodes",
            path.display(),
            instance.num_nodes()
        );
        Ok(instance)
    }

    pub fn from_json_str(s: &str) -> Result<Self, InstanceError> {
        let raw: RawInstance = serde_json::from_str(s)?;
        Instance::try_from(raw)
    }

    /// Parses the `.dat` format: a whitespace separated sequence of literal
    /// entities (numbers and bracketed, comma separated lists). The arc cost
    /// matrix is the first entity that is a list of lists.
    pub fn from_dat_str(s: &str) -> Result<Self, InstanceError> {
        for entity in serde_json::Deserializer::from_str(s).into_iter::<Value>() {
            let Value::Array(rows) = entity? else {
                continue;
            };
            if rows.is_empty() || !rows.iter().all(Value::is_array) {
                continue;
            }

            let mut costs = Vec::with_capacity(rows.len());
            for (row, entries) in rows.iter().enumerate() {
                let entries = entries.as_array().map(Vec::as_slice).unwrap_or_default();
                let row_costs = entries
                    .iter()
                    .enumerate()
                    .map(|(col, value)| {
                        value.as_f64().ok_or(InstanceError::NotANumber { row, col })
                    })
                    .collect::<Result<Vec<f64>, _>>()?;
                costs.push(row_costs);
            }
            return Instance::new(costs);
        }

        Err(InstanceError::NoMatrix)
    }

    pub fn num_nodes(&self) -> usize {
        self.costs.len()
    }

    pub fn cost(&self, from: usize, to: usize) -> f64 {
        self.costs[from][to]
    }

    pub fn costs(&self) -> &[Vec<f64>] {
        &self.costs
    }
}
