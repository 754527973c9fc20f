//! Branch-and-cut drivers for the master problem.
//!
//! An engine owns the search over the master model and calls the registered
//! cut callbacks: the lazy callback for every integer candidate it would
//! otherwise accept, the user callback on fractional relaxation points.

use std::marker::PhantomData;

use log::{debug, info, trace};
use serde::Serialize;

use crate::callback::CutCallback;
use crate::error::{Result, SolverError};
use crate::extsolvers::{LPSolver, SolveOutcome};
use crate::master::{add_row, MasterModel, Row};
use crate::settings::Settings;

#[derive(Default)]
pub struct Callbacks<'a> {
    pub lazy: Option<&'a mut dyn CutCallback>,
    pub user: Option<&'a mut dyn CutCallback>,
}

pub trait BranchAndCut {
    fn name(&self) -> &'static str;
    fn solve(&mut self, master: &MasterModel, callbacks: Callbacks<'_>) -> Result<SolveOutcome>;
    fn stats(&self) -> EngineStats;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EngineSettings {
    pub min_violation: f64,
    pub max_user_cut_rounds: usize,
    pub max_lazy_rounds: Option<usize>,
    pub time_limit: Option<f64>,
}

impl From<&Settings> for EngineSettings {
    fn from(s: &Settings) -> Self {
        EngineSettings {
            min_violation: s.min_violation,
            max_user_cut_rounds: s.max_user_cut_rounds,
            max_lazy_rounds: s.max_lazy_rounds,
            time_limit: s.time_limit,
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        (&Settings::default()).into()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EngineStats {
    pub master_solves: usize,
    pub user_rounds: usize,
    pub lazy_rounds: usize,
    pub rows_added: usize,
}

/// Rows returned by a lazy callback have to cut off the candidate they were
/// separated from, otherwise the engine would accept it anyway or loop.
pub fn check_lazy_rows(rows: &[Row], values: &[f64], min_violation: f64) -> Result<()> {
    if rows.iter().any(|row| row.violation(values) > min_violation) {
        Ok(())
    } else {
        Err(SolverError::Engine(
            "lazy constraints do not cut off the incumbent".to_string(),
        ))
    }
}

/// Branch-and-cut on top of any [`LPSolver`] with a MIP solver but no
/// callback API.
///
/// User cuts are separated at the root only: the LP relaxation is re-solved
/// until the user callback stops producing violated rows. The master MIP is
/// then solved to optimality, and each optimal solution is handed to the lazy
/// callback as the incumbent candidate. Rows it returns are added to the
/// model and the MIP is re-solved, so no candidate is accepted before the
/// lazy callback has seen it and added nothing.
pub struct CutLoopEngine<LP> {
    settings: EngineSettings,
    stats: EngineStats,
    lp: PhantomData<LP>,
}

impl<LP: LPSolver> CutLoopEngine<LP> {
    pub fn new(settings: EngineSettings) -> Self {
        CutLoopEngine {
            settings,
            stats: EngineStats::default(),
            lp: PhantomData,
        }
    }

    fn root_cut_loop(
        &mut self,
        master: &MasterModel,
        user: &mut dyn CutCallback,
        found: &mut Vec<Row>,
    ) -> Result<()> {
        let (mut lp, vars) = master.load::<LP>(false)?;
        if let Some(t) = self.settings.time_limit {
            lp.set_time_limit(t);
        }

        for round in 0..self.settings.max_user_cut_rounds {
            self.stats.master_solves += 1;
            let (objective, values) = match lp.optimize() {
                SolveOutcome::Optimal { objective, values } => (objective, values),
                SolveOutcome::EngineError(msg) => return Err(SolverError::Engine(msg)),
                other => {
                    debug!("Root relaxation is {}, leaving user cut loop", other.status_name());
                    return Ok(());
                }
            };
            trace!("Root relaxation round {} objective {}", round, objective);

            let mut cuts = Vec::new();
            user.separate(&values, &mut cuts)?;
            let min_violation = self.settings.min_violation;
            cuts.retain(|row| row.violation(&values) > min_violation);
            if cuts.is_empty() {
                debug!("Root relaxation settled at {} after {} rounds", objective, round);
                return Ok(());
            }

            for row in cuts.iter() {
                add_row(&mut lp, &vars, row);
            }
            self.stats.user_rounds += 1;
            self.stats.rows_added += cuts.len();
            found.extend(cuts);
        }
        debug!("User cut round limit reached");
        Ok(())
    }
}

impl<LP: LPSolver> BranchAndCut for CutLoopEngine<LP> {
    fn name(&self) -> &'static str {
        "cut-loop"
    }

    fn stats(&self) -> EngineStats {
        self.stats
    }

    fn solve(&mut self, master: &MasterModel, mut callbacks: Callbacks<'_>) -> Result<SolveOutcome> {
        let mut found = Vec::new();
        if let Some(user) = callbacks.user.as_deref_mut() {
            self.root_cut_loop(master, user, &mut found)?;
        }

        let (mut lp, vars) = master.load::<LP>(true)?;
        if let Some(t) = self.settings.time_limit {
            lp.set_time_limit(t);
        }
        for row in found.iter() {
            add_row(&mut lp, &vars, row);
        }

        loop {
            self.stats.master_solves += 1;
            let (objective, values) = match lp.optimize() {
                SolveOutcome::Optimal { objective, values } => (objective, values),
                other => {
                    info!("Master problem is {}", other.status_name());
                    return Ok(other);
                }
            };

            let lazy = match callbacks.lazy.as_deref_mut() {
                Some(lazy) => lazy,
                None => return Ok(SolveOutcome::Optimal { objective, values }),
            };

            let mut cuts = Vec::new();
            lazy.separate(&values, &mut cuts)?;
            if cuts.is_empty() {
                info!(
                    "Incumbent {} accepted after {} lazy rounds",
                    objective, self.stats.lazy_rounds
                );
                return Ok(SolveOutcome::Optimal { objective, values });
            }

            check_lazy_rows(&cuts, &values, self.settings.min_violation)?;
            if let Some(limit) = self.settings.max_lazy_rounds {
                if self.stats.lazy_rounds >= limit {
                    return Err(SolverError::RoundLimit(limit));
                }
            }

            debug!(
                "Lazy round {}: incumbent {} rejected by {} rows",
                self.stats.lazy_rounds,
                objective,
                cuts.len()
            );
            for row in cuts.iter() {
                add_row(&mut lp, &vars, row);
            }
            self.stats.lazy_rounds += 1;
            self.stats.rows_added += cuts.len();
        }
    }
}

#[cfg(all(test, feature = "highs"))]
mod tests {
    use bendersatsp_structs::{Instance, TourError};

    use super::*;
    use crate::callback::CutKind;
    use crate::extsolvers::highs::HighsSolverInstance;
    use crate::master::{build_master, ArcVars, Column};

    type Engine = CutLoopEngine<HighsSolverInstance>;

    /// Returns `row` whenever it is violated by more than 1e-6.
    struct FixedCut {
        kind: CutKind,
        row: Row,
        calls: usize,
    }

    impl CutCallback for FixedCut {
        fn kind(&self) -> CutKind {
            self.kind
        }

        fn separate(&mut self, values: &[f64], cuts: &mut Vec<Row>) -> Result<()> {
            self.calls += 1;
            if self.row.violation(values) > 1e-6 {
                cuts.push(self.row.clone());
            }
            Ok(())
        }
    }

    /// Always returns `row`, violated or not.
    struct StubbornCut(Row);

    impl CutCallback for StubbornCut {
        fn kind(&self) -> CutKind {
            CutKind::Lazy
        }

        fn separate(&mut self, _values: &[f64], cuts: &mut Vec<Row>) -> Result<()> {
            cuts.push(self.0.clone());
            Ok(())
        }
    }

    /// min x0 + 2 x1 s.t. x0 + x1 >= 1, binary.
    fn two_columns() -> MasterModel {
        let column = |cost| Column {
            cost,
            lower: 0.0,
            upper: 1.0,
            binary: true,
        };
        MasterModel {
            columns: vec![column(1.0), column(2.0)],
            rows: vec![Row {
                idxs: vec![0, 1],
                coeffs: vec![1.0, 1.0],
                lower: 1.0,
                upper: f64::INFINITY,
            }],
            arcs: ArcVars::new(1),
        }
    }

    fn objective(outcome: &SolveOutcome) -> f64 {
        match outcome {
            SolveOutcome::Optimal { objective, .. } => *objective,
            other => panic!("not optimal: {:?}", other),
        }
    }

    #[test]
    fn lazy_cut_rejects_incumbent() {
        let _ = env_logger::try_init();
        let mut lazy = FixedCut {
            kind: CutKind::Lazy,
            row: Row {
                idxs: vec![1],
                coeffs: vec![1.0],
                lower: 1.0,
                upper: f64::INFINITY,
            },
            calls: 0,
        };
        let mut engine = Engine::new(EngineSettings::default());
        let outcome = engine
            .solve(
                &two_columns(),
                Callbacks {
                    lazy: Some(&mut lazy),
                    user: None,
                },
            )
            .unwrap();

        assert!((objective(&outcome) - 2.0).abs() < 1e-6);
        assert_eq!(lazy.calls, 2);
        assert_eq!(engine.stats().lazy_rounds, 1);
        assert_eq!(engine.stats().master_solves, 2);
    }

    #[test]
    fn lazy_cut_must_cut_off_incumbent() {
        let mut lazy = StubbornCut(Row {
            idxs: vec![0],
            coeffs: vec![1.0],
            lower: 0.0,
            upper: f64::INFINITY,
        });
        let result = Engine::new(EngineSettings::default()).solve(
            &two_columns(),
            Callbacks {
                lazy: Some(&mut lazy),
                user: None,
            },
        );
        assert!(matches!(result, Err(SolverError::Engine(_))));
    }

    #[test]
    fn lazy_round_limit() {
        let mut lazy = FixedCut {
            kind: CutKind::Lazy,
            row: Row {
                idxs: vec![1],
                coeffs: vec![1.0],
                lower: 1.0,
                upper: f64::INFINITY,
            },
            calls: 0,
        };
        let settings = EngineSettings {
            max_lazy_rounds: Some(0),
            ..EngineSettings::default()
        };
        let result = Engine::new(settings).solve(
            &two_columns(),
            Callbacks {
                lazy: Some(&mut lazy),
                user: None,
            },
        );
        assert!(matches!(result, Err(SolverError::RoundLimit(0))));
    }

    #[test]
    fn user_cuts_tighten_root() {
        let _ = env_logger::try_init();
        // x0 <= 0.5 cuts off the relaxation optimum x0 = 1.
        let mut user = FixedCut {
            kind: CutKind::User,
            row: Row {
                idxs: vec![0],
                coeffs: vec![1.0],
                lower: f64::NEG_INFINITY,
                upper: 0.5,
            },
            calls: 0,
        };
        let mut engine = Engine::new(EngineSettings::default());
        let outcome = engine
            .solve(
                &two_columns(),
                Callbacks {
                    lazy: None,
                    user: Some(&mut user),
                },
            )
            .unwrap();

        assert!((objective(&outcome) - 2.0).abs() < 1e-6);
        assert_eq!(user.calls, 2);
        assert_eq!(engine.stats().user_rounds, 1);
        assert_eq!(engine.stats().rows_added, 1);
    }

    #[test]
    fn infeasible_master_is_reported() {
        let mut master = two_columns();
        master.rows.push(Row {
            idxs: vec![0, 1],
            coeffs: vec![1.0, 1.0],
            lower: f64::NEG_INFINITY,
            upper: -1.0,
        });
        let outcome = Engine::new(EngineSettings::default())
            .solve(&master, Callbacks::default())
            .unwrap();
        assert!(matches!(
            outcome,
            SolveOutcome::Infeasible | SolveOutcome::InfeasibleOrUnbounded
        ));
    }

    #[test]
    fn degree_constraints_alone_allow_subtours() {
        let _ = env_logger::try_init();
        let mut costs = vec![vec![10.0; 5]; 5];
        for (i, j) in [(0, 1), (1, 0), (2, 3), (3, 4), (4, 2)] {
            costs[i][j] = 1.0;
        }
        let master = build_master(&Instance::new(costs).unwrap());
        let outcome = Engine::new(EngineSettings::default())
            .solve(&master, Callbacks::default())
            .unwrap();
        assert!((objective(&outcome) - 5.0).abs() < 1e-6);

        let values = match outcome {
            SolveOutcome::Optimal { values, .. } => values,
            _ => unreachable!(),
        };
        let successors = master.arcs.successors(&values, 1e-3);
        assert_eq!(
            bendersatsp_structs::Tour::from_successors(&successors),
            Err(TourError::Subtour {
                visited: 2,
                expected: 5
            })
        );
    }
}

#[cfg(test)]
mod lazy_row_tests {
    use super::*;

    #[test]
    fn lazy_rows_must_cut_off_candidate() {
        let values = [1.0, 0.0];
        let at_least = |idx: usize, lower: f64| Row {
            idxs: vec![idx],
            coeffs: vec![1.0],
            lower,
            upper: f64::INFINITY,
        };

        assert!(check_lazy_rows(&[at_least(1, 1.0)], &values, 1e-6).is_ok());
        // one cutting row is enough
        assert!(check_lazy_rows(&[at_least(0, 0.0), at_least(1, 0.5)], &values, 1e-6).is_ok());
        assert!(matches!(
            check_lazy_rows(&[at_least(0, 1.0)], &values, 1e-6),
            Err(SolverError::Engine(_))
        ));
        assert!(matches!(
            check_lazy_rows(&[at_least(1, 1e-7)], &values, 1e-6),
            Err(SolverError::Engine(_))
        ));
    }
}
