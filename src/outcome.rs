use crate::graph::GraphInfo;
use crate::util::truncate;
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Longest error message kept in a status.
pub const MAX_ERROR_LEN: usize = 100;

/// Final state of one solver run. Only `Ok` carries a treewidth.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Status {
    Ok { treewidth: i64 },
    Timeout,
    ParseError,
    Error(String),
}

impl Status {
    pub fn error<M: fmt::Display>(msg: M) -> Self {
        let msg = msg.to_string();
        Status::Error(truncate(&msg, MAX_ERROR_LEN).to_string())
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Status::Ok { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Status::Timeout)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Status::Error(_))
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok { .. } => f.write_str("ok"),
            Status::Timeout => f.write_str("timeout"),
            Status::ParseError => f.write_str("parse_error"),
            Status::Error(msg) => write!(f, "error: {}", msg),
        }
    }
}

/// Normalized result of one work item. Never changed once built.
#[derive(Debug, Clone, PartialEq)]
pub struct OutcomeRecord {
    solver: String,
    benchmark_set: String,
    instance: String,
    info: GraphInfo,
    time_sec: Option<f64>,
    status: Status,
    memory_mb: Option<f64>,
}

fn round_millis(secs: f64) -> f64 {
    (secs * 1000.0).round() / 1000.0
}

impl OutcomeRecord {
    pub fn new(
        solver: &str,
        benchmark_set: &str,
        instance: &str,
        info: GraphInfo,
        elapsed: Option<Duration>,
        status: Status,
    ) -> Self {
        Self {
            solver: solver.to_string(),
            benchmark_set: benchmark_set.to_string(),
            instance: instance.to_string(),
            info,
            time_sec: elapsed.map(|d| round_millis(d.as_secs_f64())),
            status,
            memory_mb: None,
        }
    }

    pub fn solver(&self) -> &str {
        &self.solver
    }

    pub fn benchmark_set(&self) -> &str {
        &self.benchmark_set
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn vertices(&self) -> usize {
        self.info.vertices
    }

    pub fn edges(&self) -> usize {
        self.info.edges
    }

    pub fn treewidth(&self) -> Option<i64> {
        match self.status {
            Status::Ok { treewidth } => Some(treewidth),
            _ => None,
        }
    }

    /// Wall clock seconds, absent when the solver could not be run at all.
    pub fn time_sec(&self) -> Option<f64> {
        self.time_sec
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    pub fn memory_mb(&self) -> Option<f64> {
        self.memory_mb
    }

    fn row(&self) -> Row<'_> {
        Row {
            solver: &self.solver,
            benchmark_set: &self.benchmark_set,
            instance: &self.instance,
            vertices: self.vertices(),
            edges: self.edges(),
            treewidth: self.treewidth(),
            time_sec: self.time_sec,
            status: self.status.to_string(),
            memory_mb: self.memory_mb,
        }
    }
}

impl fmt::Display for OutcomeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tw = self
            .treewidth()
            .map_or_else(|| "-".to_string(), |tw| tw.to_string());
        let time = self
            .time_sec
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        write!(
            f,
            "{} on {}/{} tw={} t={}s [{}]",
            self.solver, self.benchmark_set, self.instance, tw, time, self.status
        )
    }
}

#[derive(Serialize)]
struct Row<'a> {
    solver: &'a str,
    benchmark_set: &'a str,
    instance: &'a str,
    vertices: usize,
    edges: usize,
    treewidth: Option<i64>,
    time_sec: Option<f64>,
    status: String,
    memory_mb: Option<f64>,
}

pub fn write_csv_to<W: std::io::Write>(records: &[OutcomeRecord], writer: W) -> csv::Result<()> {
    let mut writer = csv::Writer::from_writer(writer);
    for record in records {
        writer.serialize(record.row())?;
    }
    writer.flush()?;
    Ok(())
}

/// Writes one row per record, creating parent directories. Nothing is written
/// for an empty slice.
pub fn write_csv<P: AsRef<Path>>(records: &[OutcomeRecord], path: P) -> csv::Result<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.as_ref().parent() {
        fs::create_dir_all(parent)?;
    }
    write_csv_to(records, fs::File::create(path)?)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub total: usize,
    pub ok: usize,
    pub timeout: usize,
    /// Everything that is neither ok nor a timeout, parse errors included.
    pub error: usize,
}

impl Summary {
    pub fn from_records(records: &[OutcomeRecord]) -> Self {
        let total = records.len();
        let ok = records.iter().filter(|r| r.status().is_ok()).count();
        let timeout = records.iter().filter(|r| r.status().is_timeout()).count();
        Self {
            total,
            ok,
            timeout,
            error: total - ok - timeout,
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ok, {} timeout, {} error",
            self.ok, self.timeout, self.error
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::graph::GraphInfo;
    use crate::outcome::{write_csv, write_csv_to, OutcomeRecord, Status, Summary};
    use std::time::Duration;

    fn info() -> GraphInfo {
        GraphInfo {
            vertices: 5,
            edges: 7,
        }
    }

    fn records() -> Vec<OutcomeRecord> {
        vec![
            OutcomeRecord::new(
                "a",
                "set",
                "g1",
                info(),
                Some(Duration::from_micros(1_234_567)),
                Status::Ok { treewidth: 3 },
            ),
            OutcomeRecord::new(
                "a",
                "set",
                "g2",
                info(),
                Some(Duration::from_secs(5)),
                Status::Timeout,
            ),
            OutcomeRecord::new(
                "b",
                "set",
                "g1",
                info(),
                None,
                Status::error("No such file or directory (os error 2)"),
            ),
            OutcomeRecord::new(
                "b",
                "set",
                "g2",
                info(),
                Some(Duration::from_millis(20)),
                Status::ParseError,
            ),
        ]
    }

    #[test]
    fn treewidth_only_when_ok() {
        let records = records();
        assert_eq!(records[0].treewidth(), Some(3));
        assert!(records[1..].iter().all(|r| r.treewidth().is_none()));
        assert_eq!(records[0].time_sec(), Some(1.235));
        assert_eq!(records[2].time_sec(), None);
        assert_eq!(
            records[0].to_string(),
            "a on set/g1 tw=3 t=1.235s [ok]"
        );
        assert_eq!(
            records[2].to_string(),
            "b on set/g1 tw=- t=-s [error: No such file or directory (os error 2)]"
        );
    }

    #[test]
    fn status_strings() {
        assert_eq!(Status::Ok { treewidth: 1 }.to_string(), "ok");
        assert_eq!(Status::Timeout.to_string(), "timeout");
        assert_eq!(Status::ParseError.to_string(), "parse_error");
        assert_eq!(Status::error("boom").to_string(), "error: boom");
        let long = "x".repeat(500);
        assert_eq!(Status::error(&long).to_string().len(), "error: ".len() + 100);
    }

    #[test]
    fn csv() {
        let mut buf = Vec::new();
        write_csv_to(&records(), &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "solver,benchmark_set,instance,vertices,edges,treewidth,time_sec,status,memory_mb"
        );
        assert_eq!(lines[1], "a,set,g1,5,7,3,1.235,ok,");
        assert_eq!(lines[2], "a,set,g2,5,7,,5.0,timeout,");
        assert_eq!(
            lines[3],
            "b,set,g1,5,7,,,error: No such file or directory (os error 2),"
        );
        assert_eq!(lines.len(), 5);
    }

    #[test]
    fn csv_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results/run.csv");
        write_csv(&[], &path).unwrap();
        assert!(!path.exists());
        write_csv(&records(), &path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn summary() {
        let summary = Summary::from_records(&records());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.ok, 1);
        assert_eq!(summary.timeout, 1);
        assert_eq!(summary.error, 2);
        assert_eq!(summary.to_string(), "1 ok, 1 timeout, 2 error");
    }
}
