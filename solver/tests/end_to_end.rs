#![cfg(feature = "highs")]

use bendersatsp_solver::{solve_with_settings, Report, Settings};
use bendersatsp_structs::Instance;
use proptest::prelude::*;

fn settings(separate_fractional: bool) -> Settings {
    Settings {
        separate_fractional,
        ..Settings::default()
    }
}

/// Degree constraints alone pick 0-1-0 and 2-3-4-2 at cost 5. The only tour
/// of cost 9 is 0-1-2-3-4-0.
fn two_cycles() -> Instance {
    let mut costs = vec![vec![10.0; 5]; 5];
    for (i, j) in [(0, 1), (1, 0), (2, 3), (3, 4), (4, 2)] {
        costs[i][j] = 1.0;
    }
    costs[1][2] = 3.0;
    costs[4][0] = 3.0;
    Instance::new(costs).unwrap()
}

/// Held-Karp dynamic program over subsets containing node 0.
fn optimal_tour_cost(costs: &[Vec<f64>]) -> f64 {
    let n = costs.len();
    let full = 1usize << n;
    let mut best = vec![vec![f64::INFINITY; n]; full];
    best[1][0] = 0.0;
    for set in 1..full {
        if set & 1 == 0 {
            continue;
        }
        for last in 0..n {
            let c = best[set][last];
            if c.is_infinite() {
                continue;
            }
            for next in 1..n {
                if set & (1 << next) != 0 {
                    continue;
                }
                let entry = &mut best[set | (1 << next)][next];
                *entry = entry.min(c + costs[last][next]);
            }
        }
    }
    (1..n)
        .map(|last| best[full - 1][last] + costs[last][0])
        .fold(f64::INFINITY, f64::min)
}

fn assert_optimal_tour(instance: &Instance, report: &Report) {
    let tour = report.tour.as_ref().expect("optimal tour");
    assert_eq!(tour.len(), instance.num_nodes());
    assert_eq!(tour.nodes()[0], 0);
    let mut seen = tour.nodes().to_vec();
    seen.sort();
    assert_eq!(seen, (0..instance.num_nodes()).collect::<Vec<_>>());

    let expected = optimal_tour_cost(instance.costs());
    let objective = report.objective.expect("objective");
    assert!((objective - expected).abs() < 1e-6, "{} != {}", objective, expected);
    assert!((tour.cost(instance.costs()) - expected).abs() < 1e-6);
}

#[test]
fn subtours_are_cut_off_lazily() {
    let _ = env_logger::try_init();
    let instance = two_cycles();
    let report = solve_with_settings(&instance, &settings(false)).unwrap();

    assert_eq!(report.status, "optimal");
    assert_eq!(report.objective.map(f64::round), Some(9.0));
    assert_eq!(report.tour.as_ref().unwrap().nodes(), &[0, 1, 2, 3, 4]);
    assert!(report.lazy.cuts >= 1);
    assert_eq!(report.user, None);
    assert_optimal_tour(&instance, &report);
}

#[test]
fn subtours_are_cut_off_with_user_cuts() {
    let _ = env_logger::try_init();
    let instance = two_cycles();
    let report = solve_with_settings(&instance, &settings(true)).unwrap();

    assert_eq!(report.tour.as_ref().unwrap().nodes(), &[0, 1, 2, 3, 4]);
    assert!(report.user.is_some());
    assert_optimal_tour(&instance, &report);
}

#[test]
fn bundled_instance() {
    let _ = env_logger::try_init();
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/../data/atsp.dat");
    let instance = Instance::load(path).unwrap();
    assert_eq!(instance.num_nodes(), 12);

    let lazy_only = solve_with_settings(&instance, &settings(false)).unwrap();
    assert_optimal_tour(&instance, &lazy_only);
    let with_user = solve_with_settings(&instance, &settings(true)).unwrap();
    assert_optimal_tour(&instance, &with_user);
}

#[test]
fn two_nodes() {
    let instance = Instance::new(vec![vec![0.0, 4.0], vec![7.0, 0.0]]).unwrap();
    let report = solve_with_settings(&instance, &settings(false)).unwrap();
    assert_eq!(report.objective.map(f64::round), Some(11.0));
    assert_eq!(report.tour.unwrap().nodes(), &[0, 1]);
}

fn instances() -> impl Strategy<Value = Instance> {
    (3usize..7).prop_flat_map(|n| {
        proptest::collection::vec(proptest::collection::vec(1u32..50, n), n).prop_map(|rows| {
            Instance::new(
                rows.into_iter()
                    .map(|row| row.into_iter().map(f64::from).collect())
                    .collect(),
            )
            .unwrap()
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn matches_held_karp(instance in instances(), separate_fractional in any::<bool>()) {
        let report = solve_with_settings(&instance, &settings(separate_fractional)).unwrap();
        assert_optimal_tour(&instance, &report);
    }
}
