/// An undirected graph in the PACE `.gr` sense: vertices are `1..=n` and the
/// edge list is kept exactly as read, including self loops and duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Graph {
    order: usize,
    edges: Vec<(usize, usize)>,
}

impl Graph {
    pub fn new(order: usize, edges: Vec<(usize, usize)>) -> Self {
        Self { order, edges }
    }

    /// Number of vertices declared by the header.
    pub fn order(&self) -> usize {
        self.order
    }

    pub fn size(&self) -> usize {
        self.edges.len()
    }

    pub fn edges(&self) -> &[(usize, usize)] {
        self.edges.as_slice()
    }

    pub fn vertices(&self) -> impl Iterator<Item = usize> {
        1..=self.order
    }
}

/// Vertex and edge counts reported alongside every solver run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphInfo {
    pub vertices: usize,
    pub edges: usize,
}

impl From<&Graph> for GraphInfo {
    fn from(graph: &Graph) -> Self {
        Self {
            vertices: graph.order(),
            edges: graph.size(),
        }
    }
}
