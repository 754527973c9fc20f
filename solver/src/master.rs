//! The master integer program: one binary variable per ordered node pair and
//! the in/out degree constraints. Subtour elimination is left entirely to the
//! Benders cuts added during the search.

use bendersatsp_structs::{BendersCut, Instance};
use ordered_float::OrderedFloat;

use crate::extsolvers::LPSolver;

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub cost: f64,
    pub lower: f64,
    pub upper: f64,
    pub binary: bool,
}

/// A sparse linear row `lower <= sum(coeffs * x[idxs]) <= upper` over master
/// columns. Infinite bounds mean "no bound".
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub idxs: Vec<usize>,
    pub coeffs: Vec<f64>,
    pub lower: f64,
    pub upper: f64,
}

impl Row {
    pub fn activity(&self, values: &[f64]) -> f64 {
        self.idxs
            .iter()
            .zip(self.coeffs.iter())
            .map(|(i, c)| c * values[*i])
            .sum()
    }

    /// Amount by which `values` is outside the row's bounds, zero if inside.
    pub fn violation(&self, values: &[f64]) -> f64 {
        let activity = self.activity(values);
        (self.lower - activity).max(activity - self.upper).max(0.0)
    }
}

/// Column layout of the arc variables: `x[i][j]` is column `i * n + j`,
/// including the dummy self-loop columns that are fixed to zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArcVars {
    num_nodes: usize,
}

impl ArcVars {
    pub fn new(num_nodes: usize) -> Self {
        ArcVars { num_nodes }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn index(&self, from: usize, to: usize) -> usize {
        from * self.num_nodes + to
    }

    /// Current arc values as an `n x n` matrix.
    pub fn arc_matrix(&self, values: &[f64]) -> Vec<Vec<f64>> {
        values[..self.num_nodes * self.num_nodes]
            .chunks(self.num_nodes)
            .map(|row| row.to_vec())
            .collect()
    }

    /// The cut as a master row `sum(coef * x) >= rhs`.
    pub fn cut_row(&self, cut: &BendersCut) -> Row {
        Row {
            idxs: cut.arcs.iter().map(|a| self.index(a.from, a.to)).collect(),
            coeffs: cut.arcs.iter().map(|a| a.coef).collect(),
            lower: cut.rhs,
            upper: f64::INFINITY,
        }
    }

    /// For each node, the selected outgoing arc with the largest value above
    /// `threshold`.
    pub fn successors(&self, values: &[f64], threshold: f64) -> Vec<Option<usize>> {
        self.arc_matrix(values)
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .filter(|(_, v)| **v > threshold)
                    .max_by_key(|(_, v)| OrderedFloat(**v))
                    .map(|(j, _)| j)
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct MasterModel {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
    pub arcs: ArcVars,
}

pub fn build_master(instance: &Instance) -> MasterModel {
    let n = instance.num_nodes();
    let arcs = ArcVars::new(n);

    let mut columns = Vec::with_capacity(n * n);
    for i in 0..n {
        for j in 0..n {
            columns.push(Column {
                cost: instance.cost(i, j),
                lower: 0.0,
                upper: if i == j { 0.0 } else { 1.0 },
                binary: true,
            });
        }
    }

    let mut rows = Vec::with_capacity(2 * n);

    // Out degree
    for i in 0..n {
        let idxs = (0..n).filter(|j| *j != i).map(|j| arcs.index(i, j)).collect::<Vec<_>>();
        rows.push(Row {
            coeffs: vec![1.0; idxs.len()],
            idxs,
            lower: 1.0,
            upper: 1.0,
        });
    }

    // In degree
    for i in 0..n {
        let idxs = (0..n).filter(|j| *j != i).map(|j| arcs.index(j, i)).collect::<Vec<_>>();
        rows.push(Row {
            coeffs: vec![1.0; idxs.len()],
            idxs,
            lower: 1.0,
            upper: 1.0,
        });
    }

    MasterModel {
        columns,
        rows,
        arcs,
    }
}

impl MasterModel {
    /// Loads the model into a fresh solver instance. With `integer` unset the
    /// linear relaxation is loaded.
    pub fn load<LP: LPSolver>(&self, integer: bool) -> crate::error::Result<(LP, Vec<LP::Var>)> {
        let mut lp = LP::new()?;
        let mut vars = Vec::with_capacity(self.columns.len());
        for column in self.columns.iter() {
            let var = lp.add_var(column.cost, column.lower, column.upper);
            if integer && column.binary {
                lp.set_binary(var);
            }
            vars.push(var);
        }

        for row in self.rows.iter() {
            add_row(&mut lp, &vars, row);
        }
        Ok((lp, vars))
    }
}

pub fn add_row<LP: LPSolver>(lp: &mut LP, vars: &[LP::Var], row: &Row) {
    let inf = lp.inf();
    let lower = if row.lower.is_infinite() { -inf } else { row.lower };
    let upper = if row.upper.is_infinite() { inf } else { row.upper };
    let idxs = row.idxs.iter().map(|i| vars[*i]).collect::<Vec<_>>();
    lp.add_constraint(lower, upper, &idxs, &row.coeffs);
}

#[cfg(test)]
mod tests {
    use bendersatsp_structs::ArcCoef;

    use super::*;

    fn instance() -> Instance {
        Instance::new(vec![
            vec![0.0, 1.0, 2.0],
            vec![3.0, 0.0, 4.0],
            vec![5.0, 6.0, 0.0],
        ])
        .unwrap()
    }

    #[test]
    fn degree_constraints() {
        let master = build_master(&instance());
        assert_eq!(master.columns.len(), 9);
        assert_eq!(master.rows.len(), 6);

        for i in 0..3 {
            assert_eq!(master.columns[master.arcs.index(i, i)].upper, 0.0);
        }
        assert_eq!(master.columns[master.arcs.index(2, 1)].cost, 6.0);

        for row in master.rows.iter() {
            assert_eq!(row.idxs.len(), 2);
            assert_eq!((row.lower, row.upper), (1.0, 1.0));
        }
        // out degree of node 1, in degree of node 1
        assert_eq!(master.rows[1].idxs, vec![3, 5]);
        assert_eq!(master.rows[4].idxs, vec![1, 7]);
    }

    #[test]
    fn cut_rows_and_successors() {
        let arcs = ArcVars::new(3);
        let cut = BendersCut {
            arcs: vec![ArcCoef {
                from: 2,
                to: 0,
                coef: 1.5,
            }],
            rhs: 1.0,
        };
        let row = arcs.cut_row(&cut);
        assert_eq!(row.idxs, vec![6]);
        assert!(row.upper.is_infinite());

        let mut values = vec![0.0; 9];
        assert_eq!(row.violation(&values), 1.0);
        values[6] = 1.0;
        assert_eq!(row.violation(&values), 0.0);

        values[arcs.index(0, 1)] = 0.9999;
        values[arcs.index(1, 2)] = 0.0004;
        let succ = arcs.successors(&values, 1e-3);
        assert_eq!(succ, vec![Some(1), None, Some(0)]);
    }
}
