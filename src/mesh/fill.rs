//! Hole filling.
//!
//! Inner boundary loops are closed by ear clipping: the boundary vertex with
//! the smallest remaining exterior angle gets a triangle first.
//! Filled faces take part in solving but are never written back.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::f64::consts::PI;

use nalgebra::Point2;

use super::chart::{Chart, Edge, Face};
use super::index::{EdgeFlags, EdgeId, FaceFlags, FaceId, VertId};
use crate::algo::kernels::corner_angle;

/// Heap entry ordered so the smallest angle pops first.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    angle: f64,
    edge: EdgeId,
    version: u32,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .angle
            .total_cmp(&self.angle)
            .then_with(|| other.edge.cmp(&self.edge))
    }
}

/// Min-heap of boundary edges with lazy removal.
struct EdgeHeap {
    heap: BinaryHeap<Candidate>,
    /// Current version per edge; `None` when not in the heap.
    live: Vec<Option<u32>>,
    counter: u32,
}

impl EdgeHeap {
    fn new(num_edges: usize) -> Self {
        Self {
            heap: BinaryHeap::new(),
            live: vec![None; num_edges],
            counter: 0,
        }
    }

    fn insert(&mut self, edge: EdgeId, angle: f64) {
        if edge.index() >= self.live.len() {
            self.live.resize(edge.index() + 1, None);
        }
        self.counter = self.counter.wrapping_add(1);
        self.live[edge.index()] = Some(self.counter);
        self.heap.push(Candidate {
            angle,
            edge,
            version: self.counter,
        });
    }

    fn remove(&mut self, edge: EdgeId) {
        if let Some(slot) = self.live.get_mut(edge.index()) {
            *slot = None;
        }
    }

    fn pop_min(&mut self) -> Option<EdgeId> {
        while let Some(c) = self.heap.pop() {
            if self.live[c.edge.index()] == Some(c.version) {
                self.live[c.edge.index()] = None;
                return Some(c.edge);
            }
        }
        None
    }
}

/// Pi minus the sum of corner angles around the start vertex of a boundary edge.
fn boundary_angle(chart: &Chart, e: EdgeId) -> f64 {
    let v = chart.edge_vert(e);
    let co = chart.vert(v).co;
    let mut angle = PI;
    for we in chart.vert_edges(v) {
        let v1 = chart.vert(chart.edge_dest(we)).co;
        let v2 = chart.vert(chart.edge_vert(chart.prev(we))).co;
        angle -= corner_angle(&v1, &co, &v2);
    }
    angle
}

/// Append a face with three fresh edges starting at `v1`, `v2`, `v3`.
fn add_fill_face(chart: &mut Chart, [v1, v2, v3]: [VertId; 3]) -> FaceId {
    let f = FaceId::new(chart.faces.len());
    let base = chart.edges.len();
    let ids = [EdgeId::new(base), EdgeId::new(base + 1), EdgeId::new(base + 2)];
    for (k, v) in [v1, v2, v3].into_iter().enumerate() {
        chart.edges.push(Edge {
            vert: v,
            pair: None,
            next: ids[(k + 1) % 3],
            face: f,
            orig_uv: None,
            old_uv: Point2::origin(),
            flag: EdgeFlags::FILLED,
        });
    }
    chart.faces.push(Face {
        edge: ids[0],
        flag: FaceFlags::FILLED,
        key: u64::MAX,
    });
    f
}

fn link(chart: &mut Chart, a: EdgeId, b: EdgeId) {
    chart.edge_mut(a).pair = Some(b);
    chart.edge_mut(b).pair = Some(a);
}

/// Close one boundary loop of `nedges` edges starting at `be`.
fn fill_boundary(chart: &mut Chart, be: EdgeId, mut nedges: usize) {
    let mut heap = EdgeHeap::new(chart.num_edges() + 3 * nedges);

    for e in chart.boundary_loop(be) {
        heap.insert(e, boundary_angle(chart, e));
    }

    if nedges == 2 {
        // An isolated seam rather than a real hole
        let e = chart.boundary_edge_next(be);
        link(chart, e, be);
        return;
    }

    while nedges > 2 {
        let Some(e) = heap.pop_min() else {
            break;
        };
        let e1 = chart.boundary_edge_prev(e);
        let e2 = chart.boundary_edge_next(e);
        heap.remove(e1);
        heap.remove(e2);

        chart.edge_mut(e).flag.insert(EdgeFlags::FILLED);
        chart.edge_mut(e1).flag.insert(EdgeFlags::FILLED);

        let verts = [chart.edge_vert(e), chart.edge_vert(e1), chart.edge_vert(e2)];
        let f = add_fill_face(chart, verts);
        let [ne1, ne2, ne] = chart.face_edges(f);

        link(chart, e, ne);
        link(chart, e1, ne1);

        if nedges == 3 {
            link(chart, e2, ne2);
        } else {
            let v = chart.edge_vert(ne2);
            chart.vert_mut(v).edge = ne2;
            heap.insert(ne2, boundary_angle(chart, ne2));
            heap.insert(e2, boundary_angle(chart, e2));
        }
        nedges -= 1;
    }
}

/// Fill every boundary loop of the chart except the one containing `outer`.
pub(crate) fn fill_boundaries(chart: &mut Chart, outer: EdgeId) {
    let mut done = vec![false; chart.num_edges()];
    let mut loops = Vec::new();

    for e in chart.edge_ids() {
        if chart.pair(e).is_some() || done[e.index()] {
            continue;
        }
        let edges = chart.boundary_loop(e);
        for &be in &edges {
            done[be.index()] = true;
        }
        if !edges.contains(&outer) {
            loops.push((e, edges.len()));
        }
    }

    for &(start, nedges) in &loops {
        fill_boundary(chart, start, nedges);
    }
    if !loops.is_empty() {
        log::debug!("filled {} holes", loops.len());
    }
}

#[cfg(test)]
mod tests {
    use crate::mesh::builder::{ChartBuilder, FaceInput};
    use nalgebra::Point3;

    /// Four quads around a square hole.
    fn ring(builder: &mut ChartBuilder, uv: &[nalgebra::Point2<f64>]) {
        // Outer square 0..4, inner square 4..8
        let co = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(3.0, 0.0, 0.0),
            Point3::new(3.0, 3.0, 0.0),
            Point3::new(0.0, 3.0, 0.0),
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(2.0, 1.0, 0.0),
            Point3::new(2.0, 2.0, 0.0),
            Point3::new(1.0, 2.0, 0.0),
        ];
        let quads = [[0u64, 1, 5, 4], [1, 2, 6, 5], [2, 3, 7, 6], [3, 0, 4, 7]];
        for (i, q) in quads.iter().enumerate() {
            let pos = q.map(|k| co[k as usize]);
            let slots = [4 * i, 4 * i + 1, 4 * i + 2, 4 * i + 3];
            builder.add_face(&FaceInput::new(i as u64, q, &pos, &slots), uv).unwrap();
        }
    }

    #[test]
    fn test_ring_has_two_boundaries() {
        let uv = vec![nalgebra::Point2::origin(); 16];
        let mut builder = ChartBuilder::new();
        ring(&mut builder, &uv);
        let built = builder.end(&uv, 1.0, false, false);
        assert_eq!(built.charts.len(), 1);
        assert_eq!(built.charts[0].mesh.boundaries().count, 2);
    }

    #[test]
    fn test_fill_closes_inner_hole() {
        let uv = vec![nalgebra::Point2::origin(); 16];
        let mut builder = ChartBuilder::new();
        ring(&mut builder, &uv);
        let built = builder.end(&uv, 1.0, true, false);
        let chart = &built.charts[0].mesh;

        assert_eq!(chart.boundaries().count, 1);
        // A square hole takes two triangles
        let filled = chart
            .face_ids()
            .filter(|&f| chart.face(f).flag.contains(super::FaceFlags::FILLED))
            .count();
        assert_eq!(filled, 2);
        assert_eq!(chart.num_faces(), 10);

        // Every inner vertex is now surrounded
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            let inner = co.x > 0.5 && co.x < 2.5 && co.y > 0.5 && co.y < 2.5;
            assert_eq!(chart.vert_interior(v), inner);
        }

        // Fill edges carry no host UV
        for f in chart.face_ids().filter(|&f| chart.face(f).flag.contains(super::FaceFlags::FILLED)) {
            for e in chart.face_edges(f) {
                assert!(chart.edge(e).orig_uv.is_none());
                assert!(chart.pair(e).is_some());
            }
        }
    }

    #[test]
    fn test_heap_pops_smallest_live_entry() {
        use super::{EdgeHeap, EdgeId};
        let mut heap = EdgeHeap::new(4);
        heap.insert(EdgeId::new(0), 0.5);
        heap.insert(EdgeId::new(1), 0.1);
        heap.insert(EdgeId::new(2), 0.3);
        heap.remove(EdgeId::new(1));
        // Reinsertion replaces the old entry
        heap.insert(EdgeId::new(0), 0.2);

        assert_eq!(heap.pop_min(), Some(EdgeId::new(0)));
        assert_eq!(heap.pop_min(), Some(EdgeId::new(2)));
        assert_eq!(heap.pop_min(), None);
    }
}
