use log::{info, LevelFilter};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use structopt::StructOpt;
use tw_bench::log::build_logger_for_level;
use tw_bench::outcome::write_csv;
use tw_bench::tree_decomposition::validate_text;
use tw_bench::{BenchmarkRegistry, Scheduler, SolverRegistry, Summary};

#[cfg(not(target_env = "msvc"))]
use jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "tw-bench",
    about = "Runs tree decomposition solvers on benchmark graphs and checks their output."
)]
struct Opt {
    /// Directory holding `solvers.json` and `benchmarks.json`.
    #[structopt(long, default_value = "config", parse(from_os_str))]
    config_dir: PathBuf,

    /// Root of the solver checkouts.
    #[structopt(long, default_value = "solvers", parse(from_os_str))]
    solvers_dir: PathBuf,

    /// Root of the benchmark instances.
    #[structopt(long, default_value = "benchmarks", parse(from_os_str))]
    benchmarks_dir: PathBuf,

    /// Log every command line and termination step.
    #[structopt(short, long)]
    verbose: bool,

    #[structopt(subcommand)]
    cmd: Cmd,
}

#[derive(Debug, StructOpt)]
enum Cmd {
    /// Runs solvers on benchmark sets and writes a CSV report.
    Run {
        /// Solver names, or `all` for every installed solver.
        #[structopt(short, long = "solver", required = true)]
        solvers: Vec<String>,

        /// Benchmark set names, or `all` for every downloaded set.
        #[structopt(short, long = "benchmark", required = true)]
        benchmarks: Vec<String>,

        /// Wall clock limit per run in seconds.
        #[structopt(short, long, default_value = "300")]
        timeout: u64,

        /// Number of solver runs at the same time.
        #[structopt(short, long, default_value = "1")]
        jobs: usize,

        /// Use the heuristic command of solvers that have one.
        #[structopt(long)]
        heuristic: bool,

        /// Only run the first N instances of each set.
        #[structopt(long)]
        max_instances: Option<usize>,

        /// CSV report. `results/<timestamp>.csv` if not specified.
        #[structopt(short, long, parse(from_os_str))]
        output: Option<PathBuf>,
    },
    /// Lists configured solvers and benchmark sets.
    List,
    /// Checks a tree decomposition against its graph.
    Validate {
        #[structopt(parse(from_os_str))]
        graph: PathBuf,
        #[structopt(parse(from_os_str))]
        decomposition: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::from_args();
    build_logger_for_level(if opt.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    });

    match opt.cmd {
        Cmd::Run {
            solvers,
            benchmarks,
            timeout,
            jobs,
            heuristic,
            max_instances,
            output,
        } => {
            let solver_registry =
                SolverRegistry::load(opt.config_dir.join("solvers.json"), &opt.solvers_dir)?;
            let benchmark_registry = BenchmarkRegistry::load(
                opt.config_dir.join("benchmarks.json"),
                &opt.benchmarks_dir,
            )?;
            let solvers = solver_registry.resolve(&solvers);
            let sets = benchmark_registry.resolve(&benchmarks);
            if solvers.is_empty() {
                return Err("no installed solver selected".into());
            }
            if sets.is_empty() {
                return Err("no downloaded benchmark set selected".into());
            }

            let items = Scheduler::plan(&solvers, &sets, timeout, heuristic, max_instances);
            info!(
                "{} runs, {} jobs, timeout {}s{}",
                items.len(),
                jobs,
                timeout,
                if heuristic { ", heuristic" } else { "" }
            );
            let records = Scheduler::new(&solver_registry)
                .jobs(jobs)
                .run(&items, |_, _, _| {});

            let output = output.unwrap_or_else(|| {
                let stamp = chrono::Local::now().format("%Y-%m-%d_%H%M%S");
                PathBuf::from(format!("results/{}.csv", stamp))
            });
            write_csv(&records, &output)?;
            if !records.is_empty() {
                println!("results written to {}", output.display());
            }
            println!("{}", Summary::from_records(&records));
        }
        Cmd::List => {
            let solver_registry =
                SolverRegistry::load(opt.config_dir.join("solvers.json"), &opt.solvers_dir)?;
            let benchmark_registry = BenchmarkRegistry::load(
                opt.config_dir.join("benchmarks.json"),
                &opt.benchmarks_dir,
            )?;
            println!("solvers:");
            for solver in solver_registry.all() {
                let installed = if solver_registry.is_installed(&solver.name) {
                    "installed"
                } else {
                    "missing"
                };
                println!(
                    "  {:<24} {:<10} {}",
                    solver.name,
                    installed,
                    solver.kind.as_deref().unwrap_or("-")
                );
            }
            println!("benchmarks:");
            for set in benchmark_registry.all() {
                if set.is_installed() {
                    println!("  {:<24} {} instances", set.name, set.instances().len());
                } else {
                    println!("  {:<24} missing", set.name);
                }
            }
        }
        Cmd::Validate {
            graph,
            decomposition,
        } => {
            let graph = fs::read_to_string(graph)?;
            let decomposition = fs::read_to_string(decomposition)?;
            let validation = validate_text(&graph, &decomposition)?;
            if validation.is_valid() {
                println!("valid, width {}", validation.treewidth);
            } else {
                println!("invalid, width {}", validation.treewidth);
                for violation in &validation.violations {
                    println!("  {}", violation);
                }
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
