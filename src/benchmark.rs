use crate::solver::ConfigError;
use globset::{GlobBuilder, GlobMatcher};
use log::warn;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Instances of a set unless its entry says otherwise.
pub const DEFAULT_GLOB: &str = "**/*.gr";

/// A named directory of graph instances, selected by a glob relative to the
/// directory. `*` does not cross `/`, `**/` spans any number of directories.
#[derive(Debug, Clone)]
pub struct BenchmarkSet {
    pub name: String,
    pub dir: PathBuf,
    glob: String,
    matcher: GlobMatcher,
}

impl BenchmarkSet {
    pub fn new<P: Into<PathBuf>>(name: &str, dir: P) -> Result<Self, ConfigError> {
        Self::with_glob(name, dir, DEFAULT_GLOB)
    }

    pub fn with_glob<P: Into<PathBuf>>(
        name: &str,
        dir: P,
        glob: &str,
    ) -> Result<Self, ConfigError> {
        let matcher = GlobBuilder::new(glob)
            .literal_separator(true)
            .build()?
            .compile_matcher();
        Ok(Self {
            name: name.to_string(),
            dir: dir.into(),
            glob: glob.to_string(),
            matcher,
        })
    }

    pub fn glob(&self) -> &str {
        &self.glob
    }

    pub fn is_installed(&self) -> bool {
        self.dir.is_dir()
    }

    /// Every file below the set's directory matching its glob, sorted by path.
    pub fn instances(&self) -> Vec<PathBuf> {
        if !self.is_installed() {
            return Vec::new();
        }
        let mut files: Vec<PathBuf> = WalkDir::new(&self.dir)
            .follow_links(true)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!("skipping entry in benchmark '{}': {}", self.name, e);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| {
                entry
                    .path()
                    .strip_prefix(&self.dir)
                    .map_or(false, |relative| self.matcher.is_match(relative))
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();
        files
    }

    /// At most `max` instances, or all of them.
    pub fn instances_capped(&self, max: Option<usize>) -> Vec<PathBuf> {
        let mut instances = self.instances();
        if let Some(max) = max {
            instances.truncate(max);
        }
        instances
    }
}

#[derive(Deserialize)]
struct SetEntry {
    name: String,
    #[serde(default)]
    glob: Option<String>,
    #[serde(default)]
    dir: PathBuf,
}

/// Benchmark sets loaded from `benchmarks.json`.
#[derive(Debug, Clone, Default)]
pub struct BenchmarkRegistry {
    sets: Vec<BenchmarkSet>,
}

impl BenchmarkRegistry {
    pub fn new(sets: Vec<BenchmarkSet>) -> Self {
        Self { sets }
    }

    /// Reads a JSON array of sets. A set without `dir` lives in
    /// `<benchmarks_dir>/<name>`, a relative `dir` is taken below
    /// `benchmarks_dir`.
    pub fn from_reader<R: Read>(reader: R, benchmarks_dir: &Path) -> Result<Self, ConfigError> {
        let entries: Vec<SetEntry> = serde_json::from_reader(reader)?;
        let sets = entries
            .into_iter()
            .map(|entry| {
                let dir = if entry.dir.as_os_str().is_empty() {
                    benchmarks_dir.join(&entry.name)
                } else {
                    benchmarks_dir.join(&entry.dir)
                };
                let glob = entry.glob.as_deref().unwrap_or(DEFAULT_GLOB);
                BenchmarkSet::with_glob(&entry.name, dir, glob)
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { sets })
    }

    pub fn load<P: AsRef<Path>>(path: P, benchmarks_dir: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), benchmarks_dir)
    }

    pub fn all(&self) -> &[BenchmarkSet] {
        &self.sets
    }

    pub fn get(&self, name: &str) -> Result<&BenchmarkSet, ConfigError> {
        self.sets
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownBenchmark(name.to_string()))
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.get(name).map_or(false, BenchmarkSet::is_installed)
    }

    pub fn installed(&self) -> Vec<&BenchmarkSet> {
        self.sets.iter().filter(|s| s.is_installed()).collect()
    }

    /// Expands `all` to every installed set, otherwise keeps the installed
    /// sets in the given order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Vec<&BenchmarkSet> {
        if names.iter().any(|n| n.as_ref() == "all") {
            return self.installed();
        }
        names
            .iter()
            .filter_map(|name| match self.get(name.as_ref()) {
                Ok(set) if set.is_installed() => Some(set),
                _ => {
                    warn!("benchmark '{}' is not downloaded, skipping", name.as_ref());
                    None
                }
            })
            .collect()
    }
}
