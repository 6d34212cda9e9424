use crate::geom::wrap_angle;
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{Point2, Vector2};
use std::collections::VecDeque;
use std::f32::consts::{FRAC_PI_2, PI};

/// A ChESS corner candidate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Candidate {
    pub position: Point2<f32>,
    pub strength: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum NeighborDirection {
    Right,
    Left,
    Up,
    Down,
}

impl NeighborDirection {
    fn slot(self) -> usize {
        match self {
            NeighborDirection::Right => 0,
            NeighborDirection::Left => 1,
            NeighborDirection::Up => 2,
            NeighborDirection::Down => 3,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            NeighborDirection::Right => NeighborDirection::Left,
            NeighborDirection::Left => NeighborDirection::Right,
            NeighborDirection::Up => NeighborDirection::Down,
            NeighborDirection::Down => NeighborDirection::Up,
        }
    }

    /// Grid step `(di, dj)` along this direction.
    pub fn delta(self) -> (i32, i32) {
        match self {
            NeighborDirection::Right => (1, 0),
            NeighborDirection::Left => (-1, 0),
            NeighborDirection::Up => (0, -1),
            NeighborDirection::Down => (0, 1),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeNeighbor {
    pub direction: NeighborDirection,
    pub index: usize,
    pub distance: f32,
    pub score: f32,
}

/// Classify an edge against the grid axes `u = axis_angle`, `v = u + 90°`.
///
/// Returns the direction and the angular deviation from that axis.
fn classify_edge(edge: &Vector2<f32>, axis_angle: f32, tol: f32) -> Option<(NeighborDirection, f32)> {
    let psi = wrap_angle(edge.y.atan2(edge.x) - axis_angle);
    let candidates = [
        (NeighborDirection::Right, 0.0),
        (NeighborDirection::Down, FRAC_PI_2),
        (NeighborDirection::Up, -FRAC_PI_2),
        (NeighborDirection::Left, PI),
    ];
    candidates
        .into_iter()
        .map(|(dir, target)| (dir, wrap_angle(psi - target).abs()))
        .filter(|(_, dev)| *dev <= tol)
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Keep at most one neighbor per direction, choosing the lowest-score candidate.
fn select_neighbors(candidates: Vec<NodeNeighbor>) -> Vec<NodeNeighbor> {
    let mut best: [Option<NodeNeighbor>; 4] = [None, None, None, None];

    for candidate in candidates.into_iter() {
        let slot = &mut best[candidate.direction.slot()];

        let replace = match slot {
            None => true,
            Some(current) => {
                candidate.score < current.score
                    || (candidate.score == current.score && candidate.distance < current.distance)
            }
        };

        if replace {
            *slot = Some(candidate);
        }
    }

    best.into_iter().flatten().collect()
}

/// 4-connected neighbourhood graph over corner candidates.
pub struct GridGraph {
    pub neighbors: Vec<Vec<NodeNeighbor>>, // For each node, list of neighbors
}

impl GridGraph {
    /// Build the graph given the global axis angle (see
    /// [`crate::geom::dominant_axis_angle`]) and per-node spacing from
    /// [`local_spacings`].
    pub fn new(
        candidates: &[Candidate],
        spacing: &[f32],
        axis_angle: f32,
        params: &GridGraphParams,
    ) -> Self {
        let tree = build_tree(candidates);
        let tol = params.orientation_tolerance_deg.to_radians();
        let [min_ratio, max_ratio] = params.spacing_ratio;
        let mut neighbors = Vec::with_capacity(candidates.len());

        for (i, corner) in candidates.iter().enumerate() {
            let query = [corner.position.x, corner.position.y];
            let local = spacing[i];
            let mut node_neighbors = Vec::new();

            for nn in tree.nearest_n::<SquaredEuclidean>(&query, params.k_neighbors + 1) {
                let index = nn.item as usize;
                if index == i {
                    continue;
                }
                let edge = candidates[index].position - corner.position;
                let distance = edge.norm();
                if distance < params.min_spacing_pix
                    || distance > params.max_spacing_pix
                    || distance < min_ratio * local
                    || distance > max_ratio * local
                {
                    continue;
                }
                let Some((direction, deviation)) = classify_edge(&edge, axis_angle, tol) else {
                    continue;
                };
                // Prefer well-aligned, short edges.
                let score = deviation + 0.5 * (distance / local - 1.0).abs();
                node_neighbors.push(NodeNeighbor {
                    direction,
                    index,
                    distance,
                    score,
                });
            }

            neighbors.push(select_neighbors(node_neighbors));
        }

        let mut graph = Self { neighbors };
        graph.retain_mutual();
        graph
    }

    /// Drop edges that are not confirmed from the other end.
    fn retain_mutual(&mut self) {
        let snapshot: Vec<Vec<(NeighborDirection, usize)>> = self
            .neighbors
            .iter()
            .map(|ns| ns.iter().map(|n| (n.direction, n.index)).collect())
            .collect();
        for (i, ns) in self.neighbors.iter_mut().enumerate() {
            ns.retain(|n| {
                snapshot[n.index]
                    .iter()
                    .any(|&(dir, idx)| idx == i && dir == n.direction.opposite())
            });
        }
    }
}

pub(crate) fn build_tree(candidates: &[Candidate]) -> KdTree<f32, 2> {
    let coords = candidates
        .iter()
        .map(|c| [c.position.x, c.position.y])
        .collect::<Vec<_>>();
    (&coords).into()
}

/// Distance from every candidate to its nearest other candidate.
pub fn nearest_distances(candidates: &[Candidate]) -> Vec<(f32, Vector2<f32>)> {
    let tree = build_tree(candidates);
    candidates
        .iter()
        .enumerate()
        .map(|(i, c)| {
            tree.nearest_n::<SquaredEuclidean>(&[c.position.x, c.position.y], 2)
                .into_iter()
                .find(|nn| nn.item as usize != i)
                .map(|nn| {
                    let edge = candidates[nn.item as usize].position - c.position;
                    (edge.norm(), edge)
                })
                .unwrap_or((f32::INFINITY, Vector2::zeros()))
        })
        .collect()
}

/// Per-node spacing estimate: the nearest-neighbour distance clamped to
/// `[0.7, 1.4]` times the median over all nodes. Returns the median too.
pub fn local_spacings(nearest: &[f32]) -> Option<(Vec<f32>, f32)> {
    let mut finite: Vec<f32> = nearest.iter().copied().filter(|d| d.is_finite()).collect();
    if finite.is_empty() {
        return None;
    }
    finite.sort_by(|a, b| a.total_cmp(b));
    let median = finite[finite.len() / 2];
    let spacing = nearest
        .iter()
        .map(|d| {
            if d.is_finite() {
                d.clamp(0.7 * median, 1.4 * median)
            } else {
                median
            }
        })
        .collect();
    Some((spacing, median))
}

pub fn connected_components(graph: &GridGraph) -> Vec<Vec<usize>> {
    let mut visited = vec![false; graph.neighbors.len()];
    let mut components = Vec::new();

    for start in 0..graph.neighbors.len() {
        if visited[start] {
            continue;
        }

        let mut component = Vec::new();
        let mut stack = vec![start];

        while let Some(node) = stack.pop() {
            if visited[node] {
                continue;
            }
            visited[node] = true;
            component.push(node);

            for neighbor in &graph.neighbors[node] {
                if !visited[neighbor.index] {
                    stack.push(neighbor.index);
                }
            }
        }

        components.push(component);
    }

    components
}

/// BFS integer coordinates `(node, i, j)` for one component.
///
/// `None` when two paths disagree about a node's coordinates.
pub fn assign_grid_coordinates(
    graph: &GridGraph,
    component: &[usize],
) -> Option<Vec<(usize, i32, i32)>> {
    let start = *component.first()?;
    let mut assigned: Vec<Option<(i32, i32)>> = vec![None; graph.neighbors.len()];
    let mut coords = Vec::with_capacity(component.len());
    let mut queue = VecDeque::new();

    assigned[start] = Some((0, 0));
    queue.push_back(start);

    while let Some(node_idx) = queue.pop_front() {
        let (i, j) = assigned[node_idx]?;
        coords.push((node_idx, i, j));

        for neighbor in &graph.neighbors[node_idx] {
            let (di, dj) = neighbor.direction.delta();
            let expected = (i + di, j + dj);
            match assigned[neighbor.index] {
                None => {
                    assigned[neighbor.index] = Some(expected);
                    queue.push_back(neighbor.index);
                }
                Some(existing) if existing != expected => return None,
                Some(_) => {}
            }
        }
    }

    Some(coords)
}
