#[macro_use]
mod util;

pub(crate) mod datastructures;

pub mod benchmark;
pub mod graph;
pub mod io;
#[cfg(feature = "logging")]
pub mod log;
pub mod outcome;
pub mod process;
pub mod runner;
pub mod scheduler;
pub mod solver;
pub mod tree_decomposition;

pub use benchmark::{BenchmarkRegistry, BenchmarkSet};
pub use graph::{Graph, GraphInfo};
pub use outcome::{OutcomeRecord, Status, Summary};
pub use runner::{run_in_set, run_solver};
pub use scheduler::{Scheduler, WorkItem};
pub use solver::{SolverDescriptor, SolverRegistry};
pub use tree_decomposition::{TreeDecomposition, Validation, Violation};
