//! Runs one solver on one instance and turns whatever happens into an
//! [`OutcomeRecord`].

use crate::graph::GraphInfo;
use crate::io::{convert_file_to_cnf, parse_solver_output, read_graph_info, FormatError};
use crate::outcome::{OutcomeRecord, Status};
use crate::process::{execute, Execution, Exit, Termination, GRACE_PERIOD};
use crate::solver::{InputFormat, RunMode, SolverDescriptor, Substitutions};
use log::{debug, warn};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;
use tempfile::TempDir;
use thiserror::Error;

const SHELL: &str = "/bin/sh";
const CONVERTED_INPUT: &str = "input.cnf";
const OUTPUT_FILE: &str = "solution.td";

/// Alternate result files looked up in the run directory, in this order.
const ALTERNATE_EXTENSIONS: [&str; 2] = ["twc", "td"];

#[derive(Debug, Error)]
pub enum RunError {
    #[error("failed to convert input: {0}")]
    Convert(#[from] FormatError),
    #[error("failed to start solver: {0}")]
    Spawn(io::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Runs `solver` on the graph at `input`, outside of any benchmark set.
pub fn run_solver(
    solver: &SolverDescriptor,
    input: &Path,
    timeout: u64,
    use_heuristic: bool,
) -> OutcomeRecord {
    run_in_set(solver, "", input, timeout, use_heuristic)
}

/// Runs `solver` on the graph at `input`. Never fails: problems end up in the
/// status of the returned record.
pub fn run_in_set(
    solver: &SolverDescriptor,
    benchmark_set: &str,
    input: &Path,
    timeout: u64,
    use_heuristic: bool,
) -> OutcomeRecord {
    let instance = instance_name(input);
    let record = |info, elapsed, status| {
        OutcomeRecord::new(&solver.name, benchmark_set, &instance, info, elapsed, status)
    };

    let info = match read_graph_info(input) {
        Ok(info) => info,
        Err(e) => return record(GraphInfo::default(), None, Status::error(e)),
    };

    let run = Run {
        solver,
        input,
        instance: &instance,
        timeout,
        use_heuristic,
    };
    match run.execute() {
        Ok((status, elapsed)) => record(info, Some(elapsed), status),
        Err(e) => {
            debug!("{} failed on {}: {}", solver.name, instance, e);
            record(info, None, Status::error(e))
        }
    }
}

pub(crate) fn instance_name(input: &Path) -> String {
    input
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn read_lossy(path: &Path) -> io::Result<String> {
    fs::read(path).map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}

fn non_empty(path: &Path) -> bool {
    fs::metadata(path).map_or(false, |meta| meta.is_file() && meta.len() > 0)
}

struct Run<'a> {
    solver: &'a SolverDescriptor,
    input: &'a Path,
    instance: &'a str,
    timeout: u64,
    use_heuristic: bool,
}

impl<'a> Run<'a> {
    /// Sets up the per-run directory, runs, and removes the directory again.
    fn execute(&self) -> Result<(Status, Duration), RunError> {
        let scratch = tempfile::Builder::new().prefix("tw-bench-").tempdir()?;
        let result = self.execute_in(&scratch);
        let path = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!("failed to remove {}: {}", path.display(), e);
        }
        result
    }

    fn execute_in(&self, scratch: &TempDir) -> Result<(Status, Duration), RunError> {
        let input = self.input.canonicalize()?;
        let input_dir = input
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let program_input = match self.solver.input_format {
            InputFormat::QuickbbCnf => {
                let converted = scratch.path().join(CONVERTED_INPUT);
                convert_file_to_cnf(&input, &converted)?;
                converted
            }
            InputFormat::PaceGr => input.clone(),
        };
        let output_td = scratch.path().join(OUTPUT_FILE);
        File::create(&output_td)?;

        let substitutions = Substitutions {
            input: program_input,
            input_dir,
            instance_name: self.instance.to_string(),
            output_td: output_td.clone(),
            output_dir: scratch.path().to_path_buf(),
            timeout: self.timeout,
        };
        let command_line = self
            .solver
            .command(self.use_heuristic)
            .render(&substitutions);
        debug!("{} on {}: {}", self.solver.name, self.instance, command_line);

        let mut command = Command::new(SHELL);
        command
            .arg("-c")
            .arg(&command_line)
            .current_dir(&self.solver.working_dir);

        let limit = Duration::from_secs(self.timeout);
        let (stdin, termination) = match self.solver.run_mode {
            RunMode::Stream | RunMode::Fallback => {
                (Stdio::from(File::open(&input)?), Termination::Kill)
            }
            RunMode::StreamWithSignalEscalation => (
                Stdio::from(File::open(&input)?),
                Termination::Escalate {
                    grace: GRACE_PERIOD,
                },
            ),
            RunMode::FileOutput => (Stdio::null(), Termination::Kill),
        };
        let execution =
            execute(&mut command, stdin, limit, termination).map_err(RunError::Spawn)?;
        if !execution.stderr.is_empty() {
            debug!(
                "{} on {} wrote to stderr: {}",
                self.solver.name,
                self.instance,
                execution.stderr.trim_end()
            );
        }

        let timed_out = (Status::Timeout, limit);
        match execution.exit {
            Exit::TimedOut { graceful: false } => Ok(timed_out),
            Exit::TimedOut { graceful: true } => {
                let (text, elapsed) = self.result_text(execution, scratch.path(), &output_td)?;
                Ok(parse_solver_output(&text).map_or(timed_out, |output| {
                    let status = Status::Ok {
                        treewidth: output.treewidth,
                    };
                    (status, elapsed)
                }))
            }
            Exit::Exited(_) => {
                let (text, elapsed) = self.result_text(execution, scratch.path(), &output_td)?;
                let status = parse_solver_output(&text).map_or(Status::ParseError, |output| {
                    Status::Ok {
                        treewidth: output.treewidth,
                    }
                });
                Ok((status, elapsed))
            }
        }
    }

    /// The text to parse: stdout for streaming solvers. File output solvers
    /// are read from the output file, then from `<instance>.twc` or
    /// `<instance>.td` in the run directory, then from stdout.
    fn result_text(
        &self,
        execution: Execution,
        run_dir: &Path,
        output_td: &Path,
    ) -> io::Result<(String, Duration)> {
        if self.solver.run_mode != RunMode::FileOutput {
            return Ok((execution.stdout, execution.elapsed));
        }
        let alternates = ALTERNATE_EXTENSIONS
            .iter()
            .map(|ext| run_dir.join(format!("{}.{}", self.instance, ext)));
        let found = std::iter::once(output_td.to_path_buf())
            .chain(alternates)
            .find(|path| non_empty(path));
        match found {
            Some(path) => {
                debug!("reading result of {} from {}", self.solver.name, path.display());
                Ok((read_lossy(&path)?, execution.elapsed))
            }
            None => Ok((execution.stdout, execution.elapsed)),
        }
    }
}
