//! 4-connected grid graph over corner candidates.
//!
//! Every corner keeps at most one edge per image direction. An edge survives
//! only when both ends chose each other, which removes most links into
//! clutter next to the board.

use crate::corner::Corner;
use crate::geom::{axis_to_direction, is_perpendicular, wrapped_angle_diff};
use crate::params::GridGraphParams;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::Vector2;
use std::collections::VecDeque;
use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

/// Image-space direction of an edge. `South` points down (+y).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GridStep {
    East,
    West,
    North,
    South,
}

impl GridStep {
    pub const ALL: [GridStep; 4] = [GridStep::East, GridStep::West, GridStep::North, GridStep::South];

    /// Grid offset `(di, dj)` taken when following an edge in this direction.
    pub fn offset(self) -> (i32, i32) {
        match self {
            GridStep::East => (1, 0),
            GridStep::West => (-1, 0),
            GridStep::North => (0, -1),
            GridStep::South => (0, 1),
        }
    }

    pub fn opposite(self) -> GridStep {
        match self {
            GridStep::East => GridStep::West,
            GridStep::West => GridStep::East,
            GridStep::North => GridStep::South,
            GridStep::South => GridStep::North,
        }
    }

    fn slot(self) -> usize {
        self as usize
    }

    /// Dominant axis of `v`.
    fn of(v: &Vector2<f32>) -> GridStep {
        if v.x.abs() > v.y.abs() {
            if v.x >= 0.0 {
                GridStep::East
            } else {
                GridStep::West
            }
        } else if v.y >= 0.0 {
            GridStep::South
        } else {
            GridStep::North
        }
    }
}

/// Accepted link from one corner to an adjacent one.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge {
    pub to: usize,
    pub step: GridStep,
    pub length: f32,
    /// Sum of angular deviations from an ideal chessboard edge, in radians.
    pub cost: f32,
}

/// Judge whether `b` can be the grid neighbour of `a`.
///
/// Adjacent chessboard corners have perpendicular orientations, and the edge
/// between them runs at 45° to both.
fn link(a: &Corner, b: &Corner, to: usize, params: &GridGraphParams) -> Option<Edge> {
    let tol = params.orientation_tolerance_deg.to_radians();
    if !is_perpendicular(a.orientation, b.orientation, tol) {
        return None;
    }

    let v = b.position - a.position;
    let length = v.norm();
    if !(params.min_spacing_pix..=params.max_spacing_pix).contains(&length) {
        return None;
    }

    let heading = v.y.atan2(v.x);
    let dev_a = (axis_to_direction(a.orientation, heading) - FRAC_PI_4).abs();
    let dev_b = (axis_to_direction(b.orientation, heading) - FRAC_PI_4).abs();
    if dev_a > tol || dev_b > tol {
        return None;
    }
    let dev_pair = (FRAC_PI_2 - wrapped_angle_diff(a.orientation, b.orientation)).abs();

    Some(Edge {
        to,
        step: GridStep::of(&v),
        length,
        cost: dev_a + dev_b + dev_pair,
    })
}

fn better(candidate: &Edge, current: &Edge) -> bool {
    candidate.cost < current.cost || (candidate.cost == current.cost && candidate.length < current.length)
}

pub struct GridGraph {
    adjacency: Vec<[Option<Edge>; 4]>,
}

impl GridGraph {
    pub fn new(corners: &[Corner], params: &GridGraphParams) -> Self {
        let mut adjacency = vec![[None; 4]; corners.len()];
        if corners.len() < 2 {
            return Self { adjacency };
        }

        let points: Vec<[f32; 2]> = corners.iter().map(|c| [c.position.x, c.position.y]).collect();
        let tree: KdTree<f32, 2> = (&points).into();
        let k = params.k_neighbors.max(2).min(corners.len());

        for (i, corner) in corners.iter().enumerate() {
            let slots = &mut adjacency[i];
            for nn in tree.nearest_n::<SquaredEuclidean>(&points[i], k) {
                let j = nn.item as usize;
                if j == i {
                    continue;
                }
                let Some(edge) = link(corner, &corners[j], j, params) else {
                    continue;
                };
                let slot = &mut slots[edge.step.slot()];
                if slot.as_ref().is_none_or(|cur| better(&edge, cur)) {
                    *slot = Some(edge);
                }
            }
        }

        // Drop one-sided links.
        let snapshot = adjacency.clone();
        for (i, slots) in adjacency.iter_mut().enumerate() {
            for slot in slots.iter_mut() {
                let mutual = slot.is_some_and(|e| {
                    snapshot[e.to][e.step.opposite().slot()].is_some_and(|back| back.to == i)
                });
                if !mutual {
                    *slot = None;
                }
            }
        }

        Self { adjacency }
    }

    pub fn len(&self) -> usize {
        self.adjacency.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjacency.is_empty()
    }

    /// Edges leaving `node`.
    pub fn edges(&self, node: usize) -> impl Iterator<Item = &Edge> + '_ {
        self.adjacency
            .get(node)
            .into_iter()
            .flat_map(|slots| slots.iter().flatten())
    }

    /// Edge leaving `node` in direction `step`, if any.
    pub fn edge(&self, node: usize, step: GridStep) -> Option<&Edge> {
        self.adjacency.get(node)?[step.slot()].as_ref()
    }

    /// Connected components, each listed in BFS order from its lowest index.
    pub fn components(&self) -> Vec<Vec<usize>> {
        let mut seen = vec![false; self.len()];
        let mut out = Vec::new();
        for root in 0..self.len() {
            if seen[root] {
                continue;
            }
            seen[root] = true;
            let mut members = vec![root];
            let mut head = 0;
            while head < members.len() {
                let node = members[head];
                head += 1;
                for e in self.edges(node) {
                    if !seen[e.to] {
                        seen[e.to] = true;
                        members.push(e.to);
                    }
                }
            }
            out.push(members);
        }
        out
    }

    /// Integer grid coordinates `(node, i, j)` for one component, relative to
    /// its first node.
    pub fn grid_coordinates(&self, component: &[usize]) -> Vec<(usize, i32, i32)> {
        let Some(&root) = component.first() else {
            return Vec::new();
        };
        let mut seen = vec![false; self.len()];
        let mut out = Vec::with_capacity(component.len());
        let mut queue = VecDeque::from([(root, 0, 0)]);
        seen[root] = true;
        while let Some((node, i, j)) = queue.pop_front() {
            out.push((node, i, j));
            for e in self.edges(node) {
                if !seen[e.to] {
                    seen[e.to] = true;
                    let (di, dj) = e.step.offset();
                    queue.push_back((e.to, i + di, j + dj));
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(cols: usize, rows: usize, pitch: f32) -> Vec<Corner> {
        (0..rows)
            .flat_map(|j| (0..cols).map(move |i| (i, j)))
            .map(|(i, j)| {
                let o = if (i + j) % 2 == 0 { FRAC_PI_4 } else { 3.0 * FRAC_PI_4 };
                Corner::new(i as f32 * pitch, j as f32 * pitch, o, 1.0)
            })
            .collect()
    }

    #[test]
    fn interior_corner_has_four_edges() {
        let cols = 3;
        let corners = board(cols, 3, 10.0);
        let params = GridGraphParams {
            max_spacing_pix: 15.0,
            ..Default::default()
        };
        let graph = GridGraph::new(&corners, &params);
        let at = |i: usize, j: usize| j * cols + i;

        let centre = at(1, 1);
        assert_eq!(graph.edges(centre).count(), 4);
        assert_eq!(graph.edge(centre, GridStep::West).map(|e| e.to), Some(at(0, 1)));
        assert_eq!(graph.edge(centre, GridStep::East).map(|e| e.to), Some(at(2, 1)));
        assert_eq!(graph.edge(centre, GridStep::North).map(|e| e.to), Some(at(1, 0)));
        assert_eq!(graph.edge(centre, GridStep::South).map(|e| e.to), Some(at(1, 2)));
        assert!(graph.edges(centre).all(|e| (e.length - 10.0).abs() < 1e-4));

        let corner_steps: Vec<GridStep> = graph.edges(at(0, 0)).map(|e| e.step).collect();
        assert_eq!(corner_steps, [GridStep::East, GridStep::South]);
    }

    #[test]
    fn parallel_orientations_do_not_link() {
        let corners = [Corner::new(0.0, 0.0, FRAC_PI_4, 1.0), Corner::new(10.0, 0.0, FRAC_PI_4, 1.0)];
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        assert_eq!(graph.edges(0).count() + graph.edges(1).count(), 0);
    }

    #[test]
    fn spacing_window_is_enforced() {
        let corners = [
            Corner::new(0.0, 0.0, FRAC_PI_4, 1.0),
            Corner::new(30.0, 0.0, 3.0 * FRAC_PI_4, 1.0),
        ];
        let params = GridGraphParams {
            max_spacing_pix: 15.0,
            ..Default::default()
        };
        assert!(GridGraph::new(&corners, &params).edge(0, GridStep::East).is_none());
    }

    #[test]
    fn one_sided_links_are_dropped() {
        // Both 1 and 2 lie east of 0; 0 keeps the closer one, so the link
        // from 2 back to 0 is not reciprocated.
        let corners = [
            Corner::new(0.0, 0.0, FRAC_PI_4, 1.0),
            Corner::new(10.0, 0.0, 3.0 * FRAC_PI_4, 1.0),
            Corner::new(12.0, 0.0, 3.0 * FRAC_PI_4, 1.0),
        ];
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        assert_eq!(graph.edge(0, GridStep::East).map(|e| e.to), Some(1));
        assert_eq!(graph.edge(1, GridStep::West).map(|e| e.to), Some(0));
        assert!(graph.edge(2, GridStep::West).is_none());
    }

    #[test]
    fn coordinates_follow_the_grid() {
        let cols = 4;
        let corners = board(cols, 3, 20.0);
        let graph = GridGraph::new(&corners, &GridGraphParams::default());

        let components = graph.components();
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].len(), 12);

        let root = components[0][0];
        let (ri, rj) = ((root % cols) as i32, (root / cols) as i32);
        for (node, i, j) in graph.grid_coordinates(&components[0]) {
            assert_eq!((i + ri, j + rj), ((node % cols) as i32, (node / cols) as i32));
        }
    }

    #[test]
    fn far_corner_forms_its_own_component() {
        let mut corners = board(2, 2, 20.0);
        corners.push(Corner::new(500.0, 500.0, FRAC_PI_4, 1.0));
        let graph = GridGraph::new(&corners, &GridGraphParams::default());
        let mut sizes: Vec<usize> = graph.components().iter().map(Vec::len).collect();
        sizes.sort_unstable();
        assert_eq!(sizes, [1, 4]);
    }
}
