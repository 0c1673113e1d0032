use crate::datastructures::BitSet;
use crate::graph::Graph;
use crate::io::{parse_decomposition, parse_graph, FormatError};
use fxhash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;
use std::fmt;
use std::fmt::{Display, Formatter};

/// A single structural defect found while validating a decomposition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Violation {
    NoBags,
    MissingVertex(usize),
    MissingEdge((usize, usize)),
    NotInducingSubtree(usize),
}

impl Display for Violation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match *self {
            Violation::NoBags => write!(f, "no bags"),
            Violation::MissingVertex(v) => write!(f, "Vertex {} not in any bag", v),
            Violation::MissingEdge((u, v)) => {
                write!(f, "Edge ({},{}) not covered by any bag", u, v)
            }
            Violation::NotInducingSubtree(v) => {
                write!(f, "Bags for vertex {} are not connected", v)
            }
        }
    }
}

/// Counts declared by an `s td` line. Advisory only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecompositionHeader {
    pub bag_count: usize,
    pub width_plus_one: usize,
    pub vertex_count: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Bag {
    pub id: usize,
    pub vertex_set: FxHashSet<usize>,
}

impl Bag {
    pub fn contains(&self, v: &usize) -> bool {
        self.vertex_set.contains(v)
    }

    pub fn len(&self) -> usize {
        self.vertex_set.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vertex_set.is_empty()
    }
}

/// A decomposition as read from solver output. Bags keep the order in which
/// they were first declared; tree edges are stored by bag id and may refer to
/// ids that never got a bag.
#[derive(Debug, Default, Clone)]
pub struct TreeDecomposition {
    bags: Vec<Bag>,
    index: FxHashMap<usize, usize>,
    tree_edges: Vec<(usize, usize)>,
    header: Option<DecompositionHeader>,
}

impl TreeDecomposition {
    /// Adds a bag, replacing the contents of an earlier bag with the same id.
    pub fn add_bag(&mut self, id: usize, vertex_set: FxHashSet<usize>) -> usize {
        match self.index.get(&id) {
            Some(idx) => {
                self.bags[*idx].vertex_set = vertex_set;
                *idx
            }
            None => {
                let idx = self.bags.len();
                self.bags.push(Bag { id, vertex_set });
                self.index.insert(id, idx);
                idx
            }
        }
    }

    pub fn add_edge(&mut self, b1: usize, b2: usize) {
        self.tree_edges.push((b1, b2));
    }

    pub fn set_header(&mut self, header: DecompositionHeader) {
        self.header = Some(header);
    }

    pub fn header(&self) -> Option<&DecompositionHeader> {
        self.header.as_ref()
    }

    pub fn bags(&self) -> &[Bag] {
        &self.bags
    }

    pub fn bag(&self, id: usize) -> Option<&Bag> {
        self.index.get(&id).map(|idx| &self.bags[*idx])
    }

    pub fn tree_edges(&self) -> &[(usize, usize)] {
        &self.tree_edges
    }

    pub fn max_bag_size(&self) -> Option<usize> {
        self.bags.iter().map(Bag::len).max()
    }

    /// Largest bag size minus one, or `-1` without bags.
    pub fn width(&self) -> i64 {
        self.max_bag_size().map_or(-1, |size| size as i64 - 1)
    }

    /// Checks vertex coverage, edge coverage and the connected subtree
    /// property. All checks run to completion so every defect is reported.
    pub fn validate(&self, graph: &Graph) -> Validation {
        if self.bags.is_empty() {
            return Validation {
                treewidth: -1,
                violations: vec![Violation::NoBags],
            };
        }
        let mut violations = Vec::new();
        self.missing_vertices(graph, &mut violations);
        self.missing_edges(graph, &mut violations);
        self.vertices_not_inducing_subtree(&mut violations);
        Validation {
            treewidth: self.width(),
            violations,
        }
    }

    fn missing_vertices(&self, graph: &Graph, violations: &mut Vec<Violation>) {
        let covered: FxHashSet<usize> = self
            .bags
            .iter()
            .flat_map(|b| b.vertex_set.iter().copied())
            .collect();
        violations.extend(
            graph
                .vertices()
                .filter(|v| !covered.contains(v))
                .map(Violation::MissingVertex),
        );
    }

    fn missing_edges(&self, graph: &Graph, violations: &mut Vec<Violation>) {
        for (u, v) in graph.edges().iter().copied() {
            if !self.bags.iter().any(|b| b.contains(&u) && b.contains(&v)) {
                violations.push(Violation::MissingEdge((u, v)));
            }
        }
    }

    fn vertices_not_inducing_subtree(&self, violations: &mut Vec<Violation>) {
        let mut neighbors: Vec<Vec<usize>> = vec![Vec::new(); self.bags.len()];
        for (a, b) in &self.tree_edges {
            if let (Some(a), Some(b)) = (self.index.get(a), self.index.get(b)) {
                neighbors[*a].push(*b);
                neighbors[*b].push(*a);
            }
        }

        let mut owners: FxHashMap<usize, Vec<usize>> = FxHashMap::default();
        for (idx, bag) in self.bags.iter().enumerate() {
            for v in bag.vertex_set.iter() {
                owners.entry(*v).or_default().push(idx);
            }
        }
        let mut vertices: Vec<usize> = owners.keys().copied().collect();
        vertices.sort_unstable();

        for v in vertices {
            let inducing_bags = &owners[&v];
            if inducing_bags.len() < 2 {
                continue;
            }
            let first = inducing_bags[0];
            let mut visited = BitSet::new(self.bags.len());
            visited.set_bit(first);
            let mut queue = VecDeque::from(vec![first]);
            while let Some(c) = queue.pop_front() {
                for n in neighbors[c].iter().copied() {
                    if !visited[n] && self.bags[n].contains(&v) {
                        visited.set_bit(n);
                        queue.push_back(n);
                    }
                }
            }
            if visited.cardinality() != inducing_bags.len() {
                violations.push(Violation::NotInducingSubtree(v));
            }
        }
    }
}

/// Verdict of [`TreeDecomposition::validate`]. The width is reported even for
/// invalid decompositions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Validation {
    pub treewidth: i64,
    pub violations: Vec<Violation>,
}

impl Validation {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

pub fn validate_text(graph_text: &str, td_text: &str) -> Result<Validation, FormatError> {
    let graph = parse_graph(graph_text)?;
    Ok(parse_decomposition(td_text).validate(&graph))
}
