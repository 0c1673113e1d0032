use crate::util::shell_quote;
use log::warn;
use serde::Deserialize;
use std::borrow::Cow;
use std::convert::TryFrom;
use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown placeholder `{{{0}}}` in command template")]
    UnknownPlaceholder(String),
    #[error("unterminated placeholder in command template `{0}`")]
    UnterminatedPlaceholder(String),
    #[error("unknown solver: {0}")]
    UnknownSolver(String),
    #[error("unknown benchmark: {0}")]
    UnknownBenchmark(String),
    #[error("invalid instance glob: {0}")]
    Glob(#[from] globset::Error),
    #[error("invalid registry file: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// How a solver gets its input and hands back its result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunMode {
    /// Graph on stdin, result on stdout, killed on timeout.
    #[serde(alias = "stdin_stdout")]
    Stream,
    /// Like `Stream`, but asked to stop with SIGTERM when the time is up.
    #[serde(alias = "stdin_stdout_signal")]
    StreamWithSignalEscalation,
    /// No stdin, result written to `{output_td}` or a solver specific file.
    #[serde(alias = "file")]
    FileOutput,
    /// Unrecognized tags behave like `Stream`.
    #[serde(other)]
    Fallback,
}

impl Default for RunMode {
    fn default() -> Self {
        Self::Stream
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    QuickbbCnf,
    #[serde(other)]
    PaceGr,
}

impl Default for InputFormat {
    fn default() -> Self {
        Self::PaceGr
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
    Input,
    InputDir,
    InstanceName,
    OutputTd,
    OutputDir,
    Timeout,
}

impl Placeholder {
    pub fn name(&self) -> &'static str {
        match self {
            Placeholder::Input => "input",
            Placeholder::InputDir => "input_dir",
            Placeholder::InstanceName => "instance_name",
            Placeholder::OutputTd => "output_td",
            Placeholder::OutputDir => "output_dir",
            Placeholder::Timeout => "timeout",
        }
    }
}

impl FromStr for Placeholder {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "input" => Ok(Placeholder::Input),
            "input_dir" => Ok(Placeholder::InputDir),
            "instance_name" => Ok(Placeholder::InstanceName),
            "output_td" => Ok(Placeholder::OutputTd),
            "output_dir" => Ok(Placeholder::OutputDir),
            "timeout" => Ok(Placeholder::Timeout),
            _ => Err(ConfigError::UnknownPlaceholder(s.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Placeholder(Placeholder),
}

/// Values substituted into a [`CommandTemplate`] for one run.
#[derive(Debug, Clone)]
pub struct Substitutions {
    pub input: PathBuf,
    pub input_dir: PathBuf,
    pub instance_name: String,
    pub output_td: PathBuf,
    pub output_dir: PathBuf,
    pub timeout: u64,
}

impl Substitutions {
    fn value(&self, placeholder: Placeholder) -> Cow<'_, str> {
        match placeholder {
            Placeholder::Input => self.input.to_string_lossy(),
            Placeholder::InputDir => self.input_dir.to_string_lossy(),
            Placeholder::InstanceName => Cow::Borrowed(self.instance_name.as_str()),
            Placeholder::OutputTd => self.output_td.to_string_lossy(),
            Placeholder::OutputDir => self.output_dir.to_string_lossy(),
            Placeholder::Timeout => Cow::Owned(self.timeout.to_string()),
        }
    }
}

/// A shell command with `{placeholder}` slots, checked when it is parsed.
/// `{{` and `}}` stand for literal braces.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct CommandTemplate {
    source: String,
    segments: Vec<Segment>,
}

impl CommandTemplate {
    pub fn parse(source: &str) -> Result<Self, ConfigError> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = source.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut name = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => name.push(c),
                            None => {
                                return Err(ConfigError::UnterminatedPlaceholder(
                                    source.to_string(),
                                ))
                            }
                        }
                    }
                    let placeholder = name.trim().parse()?;
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(Segment::Placeholder(placeholder));
                }
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self {
            source: source.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn placeholders(&self) -> impl Iterator<Item = Placeholder> + '_ {
        self.segments.iter().filter_map(|s| match s {
            Segment::Placeholder(p) => Some(*p),
            Segment::Literal(_) => None,
        })
    }

    /// Builds the shell command line, quoting every substituted value.
    pub fn render(&self, values: &Substitutions) -> String {
        let mut out = String::with_capacity(self.source.len() + 64);
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Placeholder(p) => out.push_str(&shell_quote(&values.value(*p))),
            }
        }
        out
    }
}

impl TryFrom<String> for CommandTemplate {
    type Error = ConfigError;

    fn try_from(source: String) -> Result<Self, Self::Error> {
        Self::parse(&source)
    }
}

impl fmt::Display for CommandTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Everything needed to invoke one external solver. Read only once loaded.
#[derive(Debug, Clone, Deserialize)]
pub struct SolverDescriptor {
    pub name: String,
    /// `exact` or `heuristic`, informational.
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Runtime the solver needs, e.g. `java`.
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub run_mode: RunMode,
    pub run_command: CommandTemplate,
    #[serde(default)]
    pub run_command_heuristic: Option<CommandTemplate>,
    #[serde(default)]
    pub input_format: InputFormat,
    #[serde(default)]
    pub working_dir: PathBuf,
}

impl SolverDescriptor {
    pub fn new<P: Into<PathBuf>>(
        name: &str,
        run_command: &str,
        working_dir: P,
    ) -> Result<Self, ConfigError> {
        Ok(Self {
            name: name.to_string(),
            kind: None,
            language: None,
            run_mode: RunMode::default(),
            run_command: CommandTemplate::parse(run_command)?,
            run_command_heuristic: None,
            input_format: InputFormat::default(),
            working_dir: working_dir.into(),
        })
    }

    impl_setter!(self, run_mode, RunMode);
    impl_setter!(self, input_format, InputFormat);
    impl_setter!(self, run_command_heuristic, Option<CommandTemplate>);

    /// The heuristic template when asked for and available, else the default.
    pub fn command(&self, use_heuristic: bool) -> &CommandTemplate {
        match (&self.run_command_heuristic, use_heuristic) {
            (Some(heuristic), true) => heuristic,
            _ => &self.run_command,
        }
    }
}

/// Solver descriptors loaded from `solvers.json`.
#[derive(Debug, Clone, Default)]
pub struct SolverRegistry {
    solvers: Vec<SolverDescriptor>,
}

impl SolverRegistry {
    pub fn new(solvers: Vec<SolverDescriptor>) -> Self {
        Self { solvers }
    }

    /// Reads a JSON array of descriptors. Solvers without a working directory
    /// run in `<solvers_dir>/<name>`, relative ones are taken below `solvers_dir`.
    pub fn from_reader<R: Read>(reader: R, solvers_dir: &Path) -> Result<Self, ConfigError> {
        let mut solvers: Vec<SolverDescriptor> = serde_json::from_reader(reader)?;
        for solver in solvers.iter_mut() {
            solver.working_dir = if solver.working_dir.as_os_str().is_empty() {
                solvers_dir.join(&solver.name)
            } else {
                solvers_dir.join(&solver.working_dir)
            };
        }
        Ok(Self { solvers })
    }

    pub fn load<P: AsRef<Path>>(path: P, solvers_dir: &Path) -> Result<Self, ConfigError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), solvers_dir)
    }

    pub fn all(&self) -> &[SolverDescriptor] {
        &self.solvers
    }

    pub fn get(&self, name: &str) -> Result<&SolverDescriptor, ConfigError> {
        self.solvers
            .iter()
            .find(|s| s.name == name)
            .ok_or_else(|| ConfigError::UnknownSolver(name.to_string()))
    }

    pub fn is_installed(&self, name: &str) -> bool {
        self.get(name).map_or(false, |s| s.working_dir.is_dir())
    }

    pub fn installed(&self) -> Vec<&str> {
        self.solvers
            .iter()
            .filter(|s| s.working_dir.is_dir())
            .map(|s| s.name.as_str())
            .collect()
    }

    /// Expands `all` to every installed solver, otherwise keeps the installed
    /// names in the given order.
    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Vec<String> {
        if names.iter().any(|n| n.as_ref() == "all") {
            return self.installed().into_iter().map(String::from).collect();
        }
        names
            .iter()
            .map(|name| name.as_ref())
            .filter(|name| {
                let installed = self.is_installed(name);
                if !installed {
                    warn!("solver '{}' is not installed, skipping", name);
                }
                installed
            })
            .map(String::from)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::solver::{
        CommandTemplate, ConfigError, InputFormat, Placeholder, RunMode, SolverDescriptor,
        SolverRegistry, Substitutions,
    };
    use std::path::{Path, PathBuf};

    fn substitutions() -> Substitutions {
        Substitutions {
            input: PathBuf::from("/data/my graph.gr"),
            input_dir: PathBuf::from("/data"),
            instance_name: "my graph".to_string(),
            output_td: PathBuf::from("/tmp/run/out.td"),
            output_dir: PathBuf::from("/tmp/run"),
            timeout: 30,
        }
    }

    #[test]
    fn render() {
        let template =
            CommandTemplate::parse("./solver -t {timeout} -o {output_td} {input} < {input}")
                .unwrap();
        assert_eq!(
            template.render(&substitutions()),
            "./solver -t 30 -o /tmp/run/out.td '/data/my graph.gr' < '/data/my graph.gr'"
        );
        assert_eq!(
            template.placeholders().collect::<Vec<_>>(),
            vec![
                Placeholder::Timeout,
                Placeholder::OutputTd,
                Placeholder::Input,
                Placeholder::Input
            ]
        );
    }

    #[test]
    fn escaped_braces() {
        let template = CommandTemplate::parse("awk '{{print $1}}' {output_dir}/x").unwrap();
        assert_eq!(
            template.render(&substitutions()),
            "awk '{print $1}' /tmp/run/x"
        );
    }

    #[test]
    fn rejects_unknown_placeholders() {
        assert!(matches!(
            CommandTemplate::parse("./solver {seed}"),
            Err(ConfigError::UnknownPlaceholder(name)) if name == "seed"
        ));
        assert!(matches!(
            CommandTemplate::parse("./solver {input"),
            Err(ConfigError::UnterminatedPlaceholder(_))
        ));
    }

    const REGISTRY: &str = r#"[
        {"name": "exact", "type": "exact", "language": "cpp", "repo": "https://example.org/x",
         "build_steps": ["make"], "run_command": "./tw-exact"},
        {"name": "heur", "run_mode": "stdin_stdout_signal", "run_command": "./tw -e",
         "run_command_heuristic": "./tw -h", "input_format": "quickbb_cnf",
         "working_dir": "/opt/heur"},
        {"name": "filer", "run_mode": "file", "run_command": "./f {input} {output_td}",
         "working_dir": "shared/tw"},
        {"name": "odd", "run_mode": "something-else", "run_command": "./odd",
         "input_format": "pace_gr"}
    ]"#;

    #[test]
    fn registry() {
        let registry = SolverRegistry::from_reader(REGISTRY.as_bytes(), Path::new("solvers"))
            .unwrap();
        assert_eq!(registry.all().len(), 4);

        let exact = registry.get("exact").unwrap();
        assert_eq!(exact.run_mode, RunMode::Stream);
        assert_eq!(exact.input_format, InputFormat::PaceGr);
        assert_eq!(exact.working_dir, PathBuf::from("solvers/exact"));
        assert_eq!(exact.command(true).as_str(), "./tw-exact");

        let heur = registry.get("heur").unwrap();
        assert_eq!(heur.run_mode, RunMode::StreamWithSignalEscalation);
        assert_eq!(heur.input_format, InputFormat::QuickbbCnf);
        assert_eq!(heur.working_dir, PathBuf::from("/opt/heur"));
        assert_eq!(heur.command(true).as_str(), "./tw -h");
        assert_eq!(heur.command(false).as_str(), "./tw -e");

        let filer = registry.get("filer").unwrap();
        assert_eq!(filer.run_mode, RunMode::FileOutput);
        assert_eq!(filer.working_dir, PathBuf::from("solvers/shared/tw"));
        assert_eq!(registry.get("odd").unwrap().run_mode, RunMode::Fallback);
        assert!(matches!(
            registry.get("missing"),
            Err(ConfigError::UnknownSolver(_))
        ));
    }

    #[test]
    fn registry_rejects_bad_template() {
        let json = r#"[{"name": "bad", "run_command": "./bad {nope}"}]"#;
        assert!(matches!(
            SolverRegistry::from_reader(json.as_bytes(), Path::new("solvers")),
            Err(ConfigError::Json(_))
        ));
    }

    #[test]
    fn resolve_skips_uninstalled() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("exact")).unwrap();
        let registry = SolverRegistry::from_reader(REGISTRY.as_bytes(), dir.path()).unwrap();
        assert_eq!(registry.installed(), vec!["exact"]);
        assert_eq!(registry.resolve(&["all"]), vec!["exact".to_string()]);
        assert_eq!(
            registry.resolve(&["filer", "exact", "nope"]),
            vec!["exact".to_string()]
        );
    }

    #[test]
    fn builder() {
        let solver = SolverDescriptor::new("s", "./s {input}", "/tmp")
            .unwrap()
            .run_mode(RunMode::FileOutput)
            .input_format(InputFormat::QuickbbCnf);
        assert_eq!(solver.run_mode, RunMode::FileOutput);
        assert_eq!(solver.input_format, InputFormat::QuickbbCnf);
        assert_eq!(solver.command(true).as_str(), "./s {input}");
    }
}
