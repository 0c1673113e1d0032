use crate::graph::{Graph, GraphInfo};
use crate::tree_decomposition::{DecompositionHeader, TreeDecomposition};
use fxhash::FxHashSet;
use log::debug;
use std::convert::TryFrom;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FormatError {
    #[error("missing `p` header line")]
    MissingHeader,
    #[error("invalid header on line {line}: `{content}`")]
    InvalidHeader { line: usize, content: String },
    #[error("invalid edge on line {line}: `{content}`")]
    InvalidEdge { line: usize, content: String },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl FormatError {
    /// True for errors caused by the file contents rather than by reading it.
    pub fn is_malformed(&self) -> bool {
        !matches!(self, FormatError::Io(_))
    }
}

fn parse_usize(token: Option<&str>) -> Option<usize> {
    token?.parse().ok()
}

/// Parses `p <format> <n> <m>`. The format token is not checked.
pub fn pace_p(line: &str) -> Option<(usize, usize)> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("p") {
        return None;
    }
    tokens.next()?;
    let n = parse_usize(tokens.next())?;
    let m = parse_usize(tokens.next())?;
    Some((n, m))
}

pub fn pace_e(line: &str) -> Option<(usize, usize)> {
    let mut tokens = line.split_whitespace();
    let u = parse_usize(tokens.next())?;
    let v = parse_usize(tokens.next())?;
    Some((u, v))
}

pub struct PaceReader<T: BufRead>(pub T);

impl<T: BufRead> TryFrom<PaceReader<T>> for Graph {
    type Error = FormatError;

    fn try_from(reader: PaceReader<T>) -> Result<Self, Self::Error> {
        let mut order: Option<usize> = None;
        let mut edges = Vec::new();
        for (idx, line) in reader.0.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            match trimmed.chars().next() {
                None | Some('c') => {}
                Some('p') => {
                    // the declared edge count is not checked against the body
                    let (n, _) = pace_p(trimmed).ok_or_else(|| FormatError::InvalidHeader {
                        line: idx + 1,
                        content: trimmed.to_string(),
                    })?;
                    order = Some(n);
                }
                _ => {
                    let edge = pace_e(trimmed).ok_or_else(|| FormatError::InvalidEdge {
                        line: idx + 1,
                        content: trimmed.to_string(),
                    })?;
                    edges.push(edge);
                }
            }
        }
        let order = order.ok_or(FormatError::MissingHeader)?;
        Ok(Graph::new(order, edges))
    }
}

pub fn parse_graph(text: &str) -> Result<Graph, FormatError> {
    Graph::try_from(PaceReader(text.as_bytes()))
}

pub fn read_graph<P: AsRef<Path>>(path: P) -> Result<Graph, FormatError> {
    let file = File::open(path)?;
    Graph::try_from(PaceReader(BufReader::new(file)))
}

/// Reads vertex and edge counts of an instance. When the body of a file is
/// malformed the counts of its first valid `p` line are reported, and a file
/// without one counts as an empty graph. Only I/O failures are returned.
pub fn read_graph_info<P: AsRef<Path>>(path: P) -> Result<GraphInfo, FormatError> {
    let path = path.as_ref();
    match read_graph(path) {
        Ok(graph) => Ok(GraphInfo::from(&graph)),
        Err(e) if e.is_malformed() => {
            let info = declared_info(BufReader::new(File::open(path)?))?;
            debug!(
                "{} is malformed, using its header counts {}/{}: {}",
                path.display(),
                info.vertices,
                info.edges,
                e
            );
            Ok(info)
        }
        Err(e) => Err(e),
    }
}

/// Counts from the first line that parses as a `p` header.
fn declared_info<R: BufRead>(reader: R) -> Result<GraphInfo, FormatError> {
    for line in reader.lines() {
        if let Some((vertices, edges)) = pace_p(line?.trim()) {
            return Ok(GraphInfo { vertices, edges });
        }
    }
    Ok(GraphInfo::default())
}

pub struct PaceWriter<'a, W: Write> {
    graph: &'a Graph,
    writer: W,
}

impl<'a, W: Write> PaceWriter<'a, W> {
    pub fn new(graph: &'a Graph, writer: W) -> Self {
        Self { graph, writer }
    }

    pub fn output(mut self) -> std::io::Result<()> {
        writeln!(self.writer, "p tw {} {}", self.graph.order(), self.graph.size())?;
        for (u, v) in self.graph.edges() {
            writeln!(self.writer, "{} {}", u, v)?;
        }
        self.writer.flush()
    }
}

pub fn write_graph<W: Write>(graph: &Graph, writer: W) -> std::io::Result<()> {
    PaceWriter::new(graph, writer).output()
}

/// Writes the QuickBB style encoding: `p cnf <n> <m>` followed by `<u> <v> 0`
/// per edge, the trailing `0` being the clause terminator of that format.
pub struct CnfWriter<'a, W: Write> {
    graph: &'a Graph,
    writer: W,
}

impl<'a, W: Write> CnfWriter<'a, W> {
    pub fn new(graph: &'a Graph, writer: W) -> Self {
        Self { graph, writer }
    }

    pub fn output(mut self) -> std::io::Result<()> {
        writeln!(self.writer, "p cnf {} {}", self.graph.order(), self.graph.size())?;
        for (u, v) in self.graph.edges() {
            writeln!(self.writer, "{} {} 0", u, v)?;
        }
        self.writer.flush()
    }
}

pub fn to_cnf(graph: &Graph) -> Vec<u8> {
    let mut buf = Vec::with_capacity(16 * (graph.size() + 1));
    // writing into a Vec cannot fail
    let _ = CnfWriter::new(graph, &mut buf).output();
    buf
}

pub fn convert_file_to_cnf<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<GraphInfo, FormatError> {
    let graph = read_graph(input)?;
    let writer = BufWriter::new(File::create(output)?);
    CnfWriter::new(&graph, writer).output()?;
    Ok(GraphInfo::from(&graph))
}

/// Treewidth extracted from whatever a solver printed or wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverOutput {
    pub treewidth: i64,
    pub bag_count: Option<usize>,
    pub vertex_count: Option<usize>,
}

fn solution_line(line: &str) -> Option<DecompositionHeader> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("s") || tokens.next() != Some("td") {
        return None;
    }
    let bag_count = parse_usize(tokens.next())?;
    let width_plus_one = parse_usize(tokens.next())?;
    let vertex_count = parse_usize(tokens.next())?;
    Some(DecompositionHeader {
        bag_count,
        width_plus_one,
        vertex_count,
    })
}

fn width_line(line: &str) -> Option<i64> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("c") || tokens.next() != Some("width") {
        return None;
    }
    tokens.next()?.parse().ok()
}

fn bare_width(line: &str) -> Option<i64> {
    if line.is_empty() || !line.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    line.parse().ok()
}

/// Extracts the treewidth from solver output. The rules are tried one after
/// another over the whole text, so a bare number is only taken when no
/// `s td` or `c width` line exists anywhere.
pub fn parse_solver_output(text: &str) -> Option<SolverOutput> {
    let lines = || text.lines().map(str::trim);
    let solution = lines()
        .filter_map(solution_line)
        .find_map(|header| i64::try_from(header.width_plus_one).ok().map(|w| (header, w)));
    if let Some((header, width_plus_one)) = solution {
        return Some(SolverOutput {
            treewidth: width_plus_one - 1,
            bag_count: Some(header.bag_count),
            vertex_count: Some(header.vertex_count),
        });
    }
    lines()
        .find_map(width_line)
        .or_else(|| lines().find_map(bare_width))
        .map(|treewidth| SolverOutput {
            treewidth,
            bag_count: None,
            vertex_count: None,
        })
}

fn bag_line(line: &str) -> Option<(usize, FxHashSet<usize>)> {
    let mut tokens = line.split_whitespace();
    if tokens.next() != Some("b") {
        return None;
    }
    let id = parse_usize(tokens.next())?;
    let vertices: Option<FxHashSet<usize>> = tokens.map(|t| t.parse().ok()).collect();
    Some((id, vertices?))
}

fn tree_edge_line(line: &str) -> Option<(usize, usize)> {
    let mut tokens = line.split_whitespace();
    let a = parse_usize(tokens.next())?;
    let b = parse_usize(tokens.next())?;
    match tokens.next() {
        None => Some((a, b)),
        Some(_) => None,
    }
}

pub struct TdReader<T: BufRead>(pub T);

impl<T: BufRead> TryFrom<TdReader<T>> for TreeDecomposition {
    type Error = std::io::Error;

    /// Lines that are neither comments, the `s td` header, bags nor tree
    /// edges are skipped.
    fn try_from(reader: TdReader<T>) -> Result<Self, Self::Error> {
        let mut td = TreeDecomposition::default();
        for line in reader.0.lines() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('c') {
                continue;
            }
            if let Some(header) = solution_line(line) {
                td.set_header(header);
            } else if let Some((id, vertices)) = bag_line(line) {
                td.add_bag(id, vertices);
            } else if let Some((a, b)) = tree_edge_line(line) {
                td.add_edge(a, b);
            }
        }
        Ok(td)
    }
}

pub fn parse_decomposition(text: &str) -> TreeDecomposition {
    // reading from a byte slice cannot fail
    TreeDecomposition::try_from(TdReader(text.as_bytes())).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use crate::graph::Graph;
    use crate::io::{
        parse_decomposition, parse_graph, parse_solver_output, pace_e, read_graph_info, to_cnf,
        write_graph, FormatError,
    };
    use std::fs;

    const PATH: &str = "c a path\np tw 4 3\n1 2\n2 3\n\n3 4\n";

    #[test]
    fn graph() {
        let graph = parse_graph(PATH).unwrap();
        assert_eq!(graph.order(), 4);
        assert_eq!(graph.edges(), &[(1, 2), (2, 3), (3, 4)]);
    }

    #[test]
    fn body_wins_over_declared_edge_count() {
        let graph = parse_graph("p tw 3 10\n1 2\n1 2\n").unwrap();
        assert_eq!(graph.size(), 2);
    }

    #[test]
    fn header_errors() {
        assert!(matches!(
            parse_graph("c nothing\n1 2\n"),
            Err(FormatError::MissingHeader)
        ));
        assert!(matches!(
            parse_graph("p tw 3\n1 2\n"),
            Err(FormatError::InvalidHeader { line: 1, .. })
        ));
        assert!(matches!(
            parse_graph("p tw 3 1\n1\n"),
            Err(FormatError::InvalidEdge { line: 2, .. })
        ));
        assert!(parse_graph("p tw 3 1\n1\n").unwrap_err().is_malformed());
    }

    #[test]
    fn cnf_preserves_edges() {
        let graph = parse_graph(PATH).unwrap();
        let cnf = String::from_utf8(to_cnf(&graph)).unwrap();
        let mut lines = cnf.lines();
        assert_eq!(lines.next(), Some("p cnf 4 3"));
        let edges: Vec<(usize, usize)> = lines
            .map(|l| {
                assert!(l.ends_with(" 0"));
                pace_e(l).unwrap()
            })
            .collect();
        assert_eq!(edges, graph.edges());
    }

    #[test]
    fn info_of_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let broken = dir.path().join("broken.gr");
        fs::write(&broken, "c header is fine\np tw 6 5\n1 2\nfoo\n").unwrap();
        let info = read_graph_info(&broken).unwrap();
        assert_eq!((info.vertices, info.edges), (6, 5));

        let headless = dir.path().join("headless.gr");
        fs::write(&headless, "c only comments\n1 2\n").unwrap();
        let info = read_graph_info(&headless).unwrap();
        assert_eq!((info.vertices, info.edges), (0, 0));

        assert!(read_graph_info(dir.path().join("gone.gr")).is_err());
    }

    #[test]
    fn pace_writer() {
        let graph = Graph::new(3, vec![(1, 2), (2, 3)]);
        let mut buf = Vec::new();
        write_graph(&graph, &mut buf).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "p tw 3 2\n1 2\n2 3\n");
        assert_eq!(parse_graph(&text).unwrap(), graph);
    }

    #[test]
    fn solution_line_beats_bare_number() {
        let out = parse_solver_output("7\ns td 2 4 5\nb 1 1 2 3 4\n").unwrap();
        assert_eq!(out.treewidth, 3);
        assert_eq!(out.bag_count, Some(2));
        assert_eq!(out.vertex_count, Some(5));
    }

    #[test]
    fn oversized_solution_line_is_skipped() {
        let huge = "s td 1 18446744073709551615 4\n";
        assert!(parse_solver_output(huge).is_none());
        let out = parse_solver_output(&format!("{}c width 3\n", huge)).unwrap();
        assert_eq!(out.treewidth, 3);
        let out = parse_solver_output(&format!("{}s td 1 5 4\n", huge)).unwrap();
        assert_eq!(out.treewidth, 4);
        assert_eq!(parse_solver_output("s td 0 0 0\n").unwrap().treewidth, -1);
    }

    #[test]
    fn width_line() {
        let out = parse_solver_output("c status\nc width 12\n").unwrap();
        assert_eq!(out.treewidth, 12);
        assert_eq!(out.bag_count, None);
        let out = parse_solver_output("5\nc width 3\n").unwrap();
        assert_eq!(out.treewidth, 3);
    }

    #[test]
    fn bare_number() {
        assert_eq!(parse_solver_output("c hi\n 4 \n9\n").unwrap().treewidth, 4);
        assert!(parse_solver_output("c nothing here\n1 2\n").is_none());
        assert!(parse_solver_output("").is_none());
        assert!(parse_solver_output("-3\n").is_none());
    }

    #[test]
    fn decomposition() {
        let td = parse_decomposition(
            "c solver banner\ns td 3 3 4\nb 1 1 2 3\nb 2 3 4\nb 3\n1 2\n2 3\nfoo bar\n1 2 3\n",
        );
        assert_eq!(td.bags().len(), 3);
        assert_eq!(td.tree_edges(), &[(1, 2), (2, 3)]);
        let header = td.header().unwrap();
        assert_eq!(header.bag_count, 3);
        assert_eq!(header.width_plus_one, 3);
        assert!(td.bag(3).unwrap().is_empty());
        assert!(td.bag(1).unwrap().contains(&2));
    }
}
