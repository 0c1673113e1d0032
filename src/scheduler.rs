use crate::benchmark::BenchmarkSet;
use crate::io::read_graph_info;
use crate::outcome::{OutcomeRecord, Status};
use crate::runner::{instance_name, run_in_set};
use crate::solver::SolverRegistry;
use log::{info, warn};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::mpsc;

/// One solver run on one instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    pub solver: String,
    pub instance: PathBuf,
    pub timeout: u64,
    pub benchmark_set: String,
    pub heuristic: bool,
}

impl WorkItem {
    fn failed(&self, status: Status) -> OutcomeRecord {
        let info = read_graph_info(&self.instance).unwrap_or_default();
        OutcomeRecord::new(
            &self.solver,
            &self.benchmark_set,
            &instance_name(&self.instance),
            info,
            None,
            status,
        )
    }
}

fn panic_message(cause: &(dyn Any + Send)) -> &str {
    if let Some(msg) = cause.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = cause.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

fn guarded<F>(job: &F, item: &WorkItem) -> OutcomeRecord
where
    F: Fn(&WorkItem) -> OutcomeRecord,
{
    match panic::catch_unwind(AssertUnwindSafe(|| job(item))) {
        Ok(record) => record,
        Err(cause) => {
            let msg = panic_message(cause.as_ref());
            warn!(
                "run of {} on {} panicked: {}",
                item.solver,
                item.instance.display(),
                msg
            );
            item.failed(Status::error(format!("panic: {}", msg)))
        }
    }
}

/// Runs work items one after another or on a fixed number of worker threads,
/// each of which supervises one solver process at a time. Workers are threads
/// of this process, not separate processes: a solver crash stays in its own
/// child process, and a panic in the harness code is caught per item.
pub struct Scheduler<'a> {
    registry: &'a SolverRegistry,
    jobs: usize,
}

impl<'a> Scheduler<'a> {
    pub fn new(registry: &'a SolverRegistry) -> Self {
        Self { registry, jobs: 1 }
    }

    impl_setter!(self, jobs, usize);

    /// Expands solvers × benchmarks × instances. Items are grouped by
    /// benchmark, then by solver, then follow the sorted instance list.
    pub fn plan<S: AsRef<str>>(
        solvers: &[S],
        benchmarks: &[&BenchmarkSet],
        timeout: u64,
        heuristic: bool,
        max_instances: Option<usize>,
    ) -> Vec<WorkItem> {
        let mut items = Vec::new();
        for benchmark in benchmarks {
            let instances = benchmark.instances_capped(max_instances);
            if instances.is_empty() {
                warn!("benchmark '{}' has no instances", benchmark.name);
            }
            for solver in solvers {
                items.extend(instances.iter().map(|instance| WorkItem {
                    solver: solver.as_ref().to_string(),
                    instance: instance.clone(),
                    timeout,
                    benchmark_set: benchmark.name.clone(),
                    heuristic,
                }));
            }
        }
        items
    }

    pub fn run_item(&self, item: &WorkItem) -> OutcomeRecord {
        match self.registry.get(&item.solver) {
            Ok(solver) => run_in_set(
                solver,
                &item.benchmark_set,
                &item.instance,
                item.timeout,
                item.heuristic,
            ),
            Err(_) => item.failed(Status::error("unknown solver")),
        }
    }

    /// Runs every item exactly once and calls `on_outcome(done, total,
    /// record)` as each one finishes. With a single job the records come back
    /// in submission order, otherwise in completion order.
    pub fn run<F>(&self, items: &[WorkItem], on_outcome: F) -> Vec<OutcomeRecord>
    where
        F: FnMut(usize, usize, &OutcomeRecord),
    {
        self.execute_all(items, |item| self.run_item(item), on_outcome)
    }

    fn execute_all<J, F>(&self, items: &[WorkItem], job: J, mut on_outcome: F) -> Vec<OutcomeRecord>
    where
        J: Fn(&WorkItem) -> OutcomeRecord + Sync,
        F: FnMut(usize, usize, &OutcomeRecord),
    {
        let total = items.len();
        let mut records = Vec::with_capacity(total);
        let mut finish = |record: OutcomeRecord| {
            let done = records.len() + 1;
            info!("[{}/{}] {}", done, total, record);
            on_outcome(done, total, &record);
            records.push(record);
        };

        if self.jobs <= 1 || total <= 1 {
            for item in items {
                finish(guarded(&job, item));
            }
            return records;
        }

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.jobs)
            .thread_name(|idx| format!("tw-bench-worker-{}", idx))
            .build()
        {
            Ok(pool) => pool,
            Err(e) => {
                warn!("failed to start {} workers, running sequentially: {}", self.jobs, e);
                for item in items {
                    finish(guarded(&job, item));
                }
                return records;
            }
        };

        let (tx, rx) = mpsc::channel();
        let job = &job;
        pool.in_place_scope_fifo(|scope| {
            for item in items {
                let tx = tx.clone();
                scope.spawn_fifo(move |_| {
                    let _ = tx.send(guarded(job, item));
                });
            }
            drop(tx);
            for record in rx {
                finish(record);
            }
        });
        records
    }
}
