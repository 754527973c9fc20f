use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TourError {
    #[error("node {0} has no selected outgoing arc")]
    MissingSuccessor(usize),
    #[error("successor {succ} of node {node} is not a node of the instance")]
    OutOfRange { node: usize, succ: usize },
    #[error("walk from node 0 enters node {0} twice")]
    Revisit(usize),
    #[error("walk from node 0 closed after {visited} of {expected} nodes")]
    Subtour { visited: usize, expected: usize },
}

/// A directed Hamiltonian cycle, stored as the visiting order starting at
/// node 0. The closing arc back to node 0 is implicit.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Tour {
    nodes: Vec<usize>,
}

impl Tour {
    /// Follows the successor function from node 0 until it returns to node 0.
    /// Anything but a single cycle through every node is an error.
    pub fn from_successors(succ: &[Option<usize>]) -> Result<Tour, TourError> {
        let n = succ.len();
        if n == 0 {
            return Err(TourError::MissingSuccessor(0));
        }
        let mut visited = vec![false; n];
        let mut nodes = Vec::with_capacity(n);

        let mut node = 0;
        loop {
            visited[node] = true;
            nodes.push(node);

            let next = succ[node].ok_or(TourError::MissingSuccessor(node))?;
            if next >= n {
                return Err(TourError::OutOfRange { node, succ: next });
            }
            if next == 0 {
                break;
            }
            if visited[next] {
                return Err(TourError::Revisit(next));
            }
            node = next;
        }

        if nodes.len() != n {
            return Err(TourError::Subtour {
                visited: nodes.len(),
                expected: n,
            });
        }

        Ok(Tour { nodes })
    }

    pub fn nodes(&self) -> &[usize] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The arcs of the cycle, including the one closing it.
    pub fn arcs(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.nodes
            .iter()
            .copied()
            .zip(self.nodes.iter().copied().cycle().skip(1))
    }

    pub fn cost(&self, costs: &[Vec<f64>]) -> f64 {
        self.arcs().map(|(i, j)| costs[i][j]).sum()
    }
}

impl fmt::Display for Tour {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node in self.nodes.iter() {
            write!(f, "{}, ", node)?;
        }
        write!(f, "{}", self.nodes.first().copied().unwrap_or(0))
    }
}
