//! The worker LP: the dual of the flow and capacity constraints of the
//! multi-commodity flow formulation, with one commodity per node other than
//! node 0.
//!
//! ```text
//! min   sum(k, (i,j)) x(i,j) * v(k,i,j) - sum(k) u(k,0) + sum(k) u(k,k)
//! s.t.  u(k,i) - u(k,j) - v(k,i,j) <= 0     for all k, i != j
//!       v(k,i,j) >= 0,  u(k,i) free
//! ```
//!
//! The feasible region is a cone that never changes; only the objective
//! follows the candidate `x`. The LP is either optimal with value zero, in
//! which case `x` supports a unit flow from node 0 to every other node, or
//! unbounded, and the unbounded ray gives a violated cut
//!
//! ```text
//! sum((i,j)) (sum(k) v(k,i,j)) * x(i,j) >= sum(k) u(k,0) - u(k,k)
//! ```

use bendersatsp_structs::{ArcCoef, BendersCut};
use log::{debug, trace, warn};

use crate::error::{Result, SolverError};
use crate::extsolvers::{LPSolver, SolveOutcome};

/// Ray components at or below this are treated as zero when deriving a cut.
pub const RAY_TOLERANCE: f64 = 1e-3;

/// Column layout of the worker LP. All `v(k,i,j)` come first, commodity by
/// commodity, followed by all `u(k,i)`. Commodities are numbered `1..n`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerLayout {
    num_nodes: usize,
}

impl WorkerLayout {
    pub fn new(num_nodes: usize) -> Self {
        WorkerLayout { num_nodes }
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn commodities(&self) -> std::ops::Range<usize> {
        1..self.num_nodes
    }

    pub fn v(&self, k: usize, i: usize, j: usize) -> usize {
        let n = self.num_nodes;
        (k - 1) * n * n + i * n + j
    }

    pub fn u(&self, k: usize, i: usize) -> usize {
        let n = self.num_nodes;
        (n - 1) * n * n + (k - 1) * n + i
    }

    pub fn num_vars(&self) -> usize {
        let n = self.num_nodes;
        (n - 1) * n * n + (n - 1) * n
    }
}

/// Derives the Benders cut from an unbounded ray of the worker LP. Ray
/// components at or below `tolerance` do not contribute, and arcs whose
/// accumulated coefficient stays at or below `tolerance` are left out.
pub fn cut_from_ray(layout: &WorkerLayout, ray: &[f64], tolerance: f64) -> BendersCut {
    let n = layout.num_nodes();

    let mut arcs = Vec::new();
    for i in 0..n {
        for j in 0..n {
            let coef = layout
                .commodities()
                .map(|k| ray[layout.v(k, i, j)])
                .filter(|r| *r > tolerance)
                .sum::<f64>();
            if coef > tolerance {
                arcs.push(ArcCoef { from: i, to: j, coef });
            }
        }
    }

    let mut rhs = 0.0;
    for k in layout.commodities() {
        let source = ray[layout.u(k, 0)];
        if source.abs() > tolerance {
            rhs += source;
        }
        let sink = ray[layout.u(k, k)];
        if sink.abs() > tolerance {
            rhs -= sink;
        }
    }

    BendersCut { arcs, rhs }
}

/// Scales a point of the boxed worker LP so that its largest component has
/// magnitude one.
fn unit_scaled(mut ray: Vec<f64>) -> Vec<f64> {
    let max = ray.iter().fold(0.0f64, |m, r| m.max(r.abs()));
    if max > 0.0 {
        ray.iter_mut().for_each(|r| *r /= max);
    }
    ray
}

pub struct WorkerLp<LP: LPSolver> {
    layout: WorkerLayout,
    lp: LP,
    vars: Vec<LP::Var>,
    /// Same cone intersected with a unit box, built on first use. Its optimal
    /// point is a ray of the cone whenever the objective is negative, which
    /// covers engines that report unboundedness without a ray.
    boxed: Option<(LP, Vec<LP::Var>)>,
    tolerance: f64,
}

impl<LP: LPSolver> WorkerLp<LP> {
    pub fn new(num_nodes: usize, tolerance: f64) -> Result<Self> {
        let layout = WorkerLayout::new(num_nodes);
        let (lp, vars) = Self::build(&layout, false)?;
        debug!(
            "worker LP built: {} commodities, {} columns",
            num_nodes.saturating_sub(1),
            vars.len()
        );
        Ok(WorkerLp {
            layout,
            lp,
            vars,
            boxed: None,
            tolerance,
        })
    }

    fn build(layout: &WorkerLayout, boxed: bool) -> Result<(LP, Vec<LP::Var>)> {
        let n = layout.num_nodes();
        let mut lp = LP::new()?;
        lp.prepare_for_rays();
        let inf = lp.inf();
        let mut vars = Vec::with_capacity(layout.num_vars());

        let v_upper = if boxed { 1.0 } else { inf };
        for _k in layout.commodities() {
            for i in 0..n {
                for j in 0..n {
                    // v(k,i,i) are dummies fixed to zero
                    let upper = if i == j { 0.0 } else { v_upper };
                    vars.push(lp.add_var(0.0, 0.0, upper));
                }
            }
        }

        let (u_lower, u_upper) = if boxed { (-1.0, 1.0) } else { (-inf, inf) };
        for k in layout.commodities() {
            for i in 0..n {
                let cost = if i == 0 {
                    -1.0
                } else if i == k {
                    1.0
                } else {
                    0.0
                };
                vars.push(lp.add_var(cost, u_lower, u_upper));
            }
        }

        for k in layout.commodities() {
            for i in 0..n {
                for j in 0..n {
                    if i == j {
                        continue;
                    }
                    let idxs = [
                        vars[layout.v(k, i, j)],
                        vars[layout.u(k, i)],
                        vars[layout.u(k, j)],
                    ];
                    lp.add_constraint(-inf, 0.0, &idxs, &[-1.0, 1.0, -1.0]);
                }
            }
        }

        Ok((lp, vars))
    }

    fn set_objective(lp: &mut LP, vars: &[LP::Var], layout: &WorkerLayout, x: &[Vec<f64>]) {
        let n = layout.num_nodes();
        for k in layout.commodities() {
            for i in 0..n {
                for j in 0..n {
                    lp.set_cost(vars[layout.v(k, i, j)], x[i][j]);
                }
            }
        }
    }

    /// Looks for a Benders cut violated by the arc values `x`.
    pub fn separate(&mut self, x: &[Vec<f64>]) -> Result<Option<BendersCut>> {
        #[cfg(feature = "prof")]
        let _p = hprof::enter("worker separate");

        Self::set_objective(&mut self.lp, &self.vars, &self.layout, x);

        match self.lp.optimize() {
            SolveOutcome::Optimal { objective, .. } => {
                debug!("worker LP optimal ({:.6}), no cut", objective);
                Ok(None)
            }
            SolveOutcome::Unbounded | SolveOutcome::InfeasibleOrUnbounded => {
                let ray = match self.lp.primal_ray() {
                    Some(ray) => ray,
                    None => {
                        debug!("engine returned no ray, solving the boxed worker LP");
                        self.boxed_ray(x)?
                    }
                };
                let cut = cut_from_ray(&self.layout, &ray, self.tolerance);
                let violation = cut.violation(x);
                debug!(
                    "worker LP unbounded, cut with {} arcs, rhs {:.3}, violation {:.3}",
                    cut.len(),
                    cut.rhs,
                    violation
                );
                trace!("cut {}", cut);
                if !cut.is_violated_by(x, self.tolerance) {
                    warn!("derived cut is violated by only {:.6}", violation);
                }
                Ok(Some(cut))
            }
            SolveOutcome::Infeasible => Err(SolverError::WorkerInfeasible),
            SolveOutcome::LimitReached => {
                Err(SolverError::Engine("worker LP stopped at a limit".to_string()))
            }
            SolveOutcome::EngineError(msg) => Err(SolverError::Engine(msg)),
        }
    }

    fn boxed_ray(&mut self, x: &[Vec<f64>]) -> Result<Vec<f64>> {
        if self.boxed.is_none() {
            self.boxed = Some(Self::build(&self.layout, true)?);
        }
        let Some((lp, vars)) = self.boxed.as_mut() else {
            return Err(SolverError::MissingRay);
        };

        Self::set_objective(lp, vars, &self.layout, x);
        match lp.optimize() {
            SolveOutcome::Optimal { objective, values } if objective < -self.tolerance => {
                Ok(unit_scaled(values))
            }
            SolveOutcome::Optimal { .. } => Err(SolverError::MissingRay),
            SolveOutcome::Infeasible => Err(SolverError::WorkerInfeasible),
            SolveOutcome::EngineError(msg) => Err(SolverError::Engine(msg)),
            _ => Err(SolverError::MissingRay),
        }
    }
}

#[cfg(all(test, feature = "highs"))]
mod tests {
    use super::*;
    use crate::extsolvers::highs::HighsSolverInstance;

    fn worker(n: usize) -> WorkerLp<HighsSolverInstance> {
        let _ = env_logger::try_init();
        WorkerLp::new(n, RAY_TOLERANCE).unwrap()
    }

    /// Arc matrix of the cycles given as node sequences.
    fn cycles(n: usize, cycles: &[&[usize]]) -> Vec<Vec<f64>> {
        let mut x = vec![vec![0.0; n]; n];
        for cycle in cycles {
            for (a, b) in cycle.iter().zip(cycle.iter().cycle().skip(1)) {
                x[*a][*b] = 1.0;
            }
        }
        x
    }

    #[test]
    fn layout_is_dense() {
        let layout = WorkerLayout::new(4);
        assert_eq!(layout.v(1, 0, 0), 0);
        assert_eq!(layout.v(3, 3, 3), 3 * 16 - 1);
        assert_eq!(layout.u(1, 0), 3 * 16);
        assert_eq!(layout.u(3, 3) + 1, layout.num_vars());
    }

    #[test]
    fn hamiltonian_cycle_has_no_cut() {
        let mut worker = worker(5);
        let x = cycles(5, &[&[0, 3, 1, 4, 2]]);
        assert_eq!(worker.separate(&x).unwrap(), None);
    }

    #[test]
    fn subtours_are_cut_off() {
        let mut worker = worker(5);
        let x = cycles(5, &[&[0, 1], &[2, 3, 4]]);
        let cut = worker.separate(&x).unwrap().expect("subtours must be cut off");
        assert!(cut.violation(&x) > RAY_TOLERANCE);
        assert!(cut.rhs > 0.0);
        // only arcs leaving the cycle through node 0 can repair it
        for a in cut.arcs.iter() {
            assert_ne!(a.from, a.to);
        }
    }

    #[test]
    fn separation_is_idempotent() {
        let mut worker = worker(4);
        let x = cycles(4, &[&[0, 2], &[1, 3]]);
        let first = worker.separate(&x).unwrap();
        let second = worker.separate(&x).unwrap();
        assert!(first.is_some());
        assert_eq!(first, second);

        let tour = cycles(4, &[&[0, 1, 2, 3]]);
        assert_eq!(worker.separate(&tour).unwrap(), None);
        assert_eq!(worker.separate(&tour).unwrap(), None);
    }

    #[test]
    fn fractional_points() {
        let mut worker = worker(4);
        // half of the tour 0-1-2-3 and half of 0-3-2-1: still supports the flow
        let mut x = vec![vec![0.0; 4]; 4];
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0), (0, 3), (3, 2), (2, 1), (1, 0)] {
            x[a][b] = 0.5;
        }
        assert_eq!(worker.separate(&x).unwrap(), None);

        // half of two 2-cycles plus half of a tour: capacity out of {0, 1} is only 0.5
        let mut x = vec![vec![0.0; 4]; 4];
        for (a, b) in [(0, 1), (1, 0), (2, 3), (3, 2)] {
            x[a][b] += 0.5;
        }
        for (a, b) in [(0, 1), (1, 2), (2, 3), (3, 0)] {
            x[a][b] += 0.5;
        }
        let cut = worker.separate(&x).unwrap().expect("flow of 1 cannot pass 0.5 capacity");
        assert!(cut.is_violated_by(&x, RAY_TOLERANCE));
    }

    #[test]
    fn small_ray_components_are_dropped() {
        let layout = WorkerLayout::new(3);
        let mut ray = vec![0.0; layout.num_vars()];
        ray[layout.v(1, 0, 2)] = 1.0;
        ray[layout.v(2, 0, 2)] = 0.5;
        // below the tolerance on its own and together
        ray[layout.v(1, 0, 1)] = 0.0004;
        ray[layout.v(2, 0, 1)] = 0.0005;
        // a single component exactly at the tolerance
        ray[layout.v(1, 1, 2)] = RAY_TOLERANCE;
        // a tiny component next to a large one on the same arc
        ray[layout.v(1, 2, 0)] = 0.0009;
        ray[layout.v(2, 2, 0)] = 0.25;

        ray[layout.u(1, 0)] = 1.0;
        ray[layout.u(1, 1)] = 0.0002;
        ray[layout.u(2, 0)] = 1.0;
        ray[layout.u(2, 2)] = -0.5;

        let cut = cut_from_ray(&layout, &ray, RAY_TOLERANCE);
        assert_eq!(cut.len(), 2);
        assert_eq!(cut.coef(0, 2), Some(1.5));
        assert_eq!(cut.coef(2, 0), Some(0.25));
        assert_eq!(cut.coef(0, 1), None);
        assert_eq!(cut.coef(1, 2), None);
        assert_eq!(cut.rhs, 2.5);
    }

    mod prop {
        use super::*;
        use proptest::prelude::*;

        fn orders() -> impl Strategy<Value = Vec<usize>> {
            (3usize..7).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        }

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn any_hamiltonian_cycle_passes(order in orders()) {
                let n = order.len();
                let mut worker = worker(n);
                prop_assert_eq!(worker.separate(&cycles(n, &[&order])).unwrap(), None);
            }

            #[test]
            fn any_split_into_subtours_is_cut(order in orders(), split in 1usize..6) {
                let n = order.len();
                prop_assume!(split < n);
                let x = cycles(n, &[&order[..split], &order[split..]]);
                let mut worker = worker(n);
                let cut = worker.separate(&x).unwrap();
                prop_assert!(cut.is_some());
                prop_assert!(cut.unwrap().violation(&x) > RAY_TOLERANCE);
            }
        }
    }
}
