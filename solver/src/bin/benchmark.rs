use std::fs::read_dir;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use bendersatsp_solver::{solve_with_settings, Settings};
use bendersatsp_structs::Instance;
use serde::Serialize;

const MODES: [(&str, bool); 2] = [("lazy", false), ("lazy+user", true)];

#[derive(Debug, Serialize)]
struct BenchResult {
    instance: String,
    nodes: usize,
    mode: &'static str,
    status: &'static str,
    time: f64,
    objective: Option<f64>,
    lazy_cuts: usize,
    user_cuts: usize,
    master_solves: usize,
}

fn get_instance_files() -> anyhow::Result<Vec<PathBuf>> {
    let mut filenames = Vec::new();
    for entry in read_dir("bench").context("benchmark instances are read from ./bench")? {
        let path = entry?.path();
        if path.extension().is_some_and(|e| e == "dat" || e == "json") {
            filenames.push(path);
        }
    }
    filenames.sort();
    Ok(filenames)
}

pub fn main() -> anyhow::Result<()> {
    env_logger::init();

    println!("------------------------------");
    println!("bendersatsp solver benchmarking");
    println!("------------------------------");
    println!();
    println!(
        "  modes: {}",
        MODES.iter().map(|(name, _)| *name).collect::<Vec<_>>().join(", ")
    );
    println!();

    let instance_files = get_instance_files()?;
    let mut results = Vec::new();

    println!("# RUNNING {} INSTANCES", instance_files.len());
    for filename in instance_files.iter() {
        let _p = hprof::enter("instance");
        let instance = {
            let _p = hprof::enter("read");
            Instance::load(filename)
                .with_context(|| format!("could not read {}", filename.display()))?
        };
        println!(
            " * instance {} with {} nodes",
            filename.display(),
            instance.num_nodes()
        );

        for (mode, separate_fractional) in MODES {
            println!("   - solving with: \"{}\"", mode);
            let settings = Settings {
                separate_fractional,
                ..Settings::default()
            };
            let t0 = Instant::now();
            let report = solve_with_settings(&instance, &settings)?;
            let time = t0.elapsed().as_secs_f64();
            results.push(BenchResult {
                instance: filename
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_default(),
                nodes: instance.num_nodes(),
                mode,
                status: report.status,
                time,
                objective: report.objective,
                lazy_cuts: report.lazy.cuts,
                user_cuts: report.user.map(|u| u.cuts).unwrap_or(0),
                master_solves: report.engine_stats.master_solves,
            });
        }
    }
    println!();
    println!("# PROFILER");
    hprof::profiler().print_timing();
    println!();

    println!("# RESULTS");
    let mut tablewriter = tabwriter::TabWriter::new(Vec::new());
    writeln!(
        &mut tablewriter,
        "instance\tnodes\tmode\tstatus\ttime\tobj\tlazy\tuser\tsolves"
    )?;
    writeln!(&mut tablewriter, "---\t---\t---\t---\t---\t---\t---\t---\t---")?;
    for r in results.iter() {
        let objective = r
            .objective
            .map(|o| format!("{:.0}", o))
            .unwrap_or_else(|| "-".to_string());
        writeln!(
            &mut tablewriter,
            "{}\t{}\t{}\t{}\t{:.2}\t{}\t{}\t{}\t{}",
            r.instance,
            r.nodes,
            r.mode,
            r.status,
            r.time,
            objective,
            r.lazy_cuts,
            r.user_cuts,
            r.master_solves
        )?;
    }
    let table = tablewriter
        .into_inner()
        .map_err(|e| anyhow::anyhow!("could not write table: {}", e.error()))?;
    let written = String::from_utf8(table)?;
    println!("{}", written);

    let mut csv = csv::Writer::from_path("bench_results.csv")?;
    for r in results.iter() {
        csv.serialize(r)?;
    }
    csv.flush()?;
    println!("Wrote bench_results.csv");
    Ok(())
}
