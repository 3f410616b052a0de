//! Half-edge chart data structure.
//!
//! A [`Chart`] is an arena of vertices, edges and faces. Every face owns
//! exactly three edges linked through `next`; an edge shared by two faces of
//! the chart is linked to its opposite through `pair`. Edges without a pair
//! lie on a boundary loop.
//!
//! # Traversal
//!
//! - `wheel_next(e)`: the next edge leaving the same vertex, `e.next.next.pair`
//! - `wheel_prev(e)`: the previous one, `e.pair.next`
//! - `boundary_edge_next(e)`: the next boundary edge along a loop, following
//!   the outgoing edge pointer of the destination vertex
//!
//! For every boundary vertex the outgoing edge pointer is an edge without a
//! pair, so a wheel walk started there visits the whole fan.

use nalgebra::{Matrix2, Point2, Point3, Vector2};

use super::index::{EdgeFlags, EdgeId, FaceFlags, FaceId, ParamKey, VertFlags, VertId};
use crate::algo::kernels::triangle_angles;

/// A chart vertex.
#[derive(Debug, Clone)]
pub struct Vert {
    /// 3D position.
    pub co: Point3<f64>,
    /// Current 2D position.
    pub uv: Point2<f64>,
    /// State bits.
    pub flag: VertFlags,
    /// One outgoing edge; a pairless one for boundary vertices.
    pub edge: EdgeId,
    /// Scalar weight for weighted parameterization.
    pub weight: f64,
    /// Host key.
    pub key: ParamKey,
}

/// A half-edge: the corner of a face starting at `vert`.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Vertex this edge starts at.
    pub vert: VertId,
    /// Opposite edge in the neighbouring face, if any.
    pub pair: Option<EdgeId>,
    /// Next edge around the face.
    pub next: EdgeId,
    /// Owning face.
    pub face: FaceId,
    /// Host UV slot of this corner. `None` for hole-filling edges.
    pub orig_uv: Option<usize>,
    /// UV backed up before solving, for blending and restore.
    pub old_uv: Point2<f64>,
    /// State bits.
    pub flag: EdgeFlags,
}

/// A triangular face.
#[derive(Debug, Clone)]
pub struct Face {
    /// One of the face's three edges.
    pub edge: EdgeId,
    /// State bits.
    pub flag: FaceFlags,
    /// Host key.
    pub key: ParamKey,
}

/// Result of scanning a chart's boundary loops.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Boundaries {
    /// Number of boundary loops.
    pub count: usize,
    /// An edge of the loop with the largest 3D length.
    pub outer: Option<EdgeId>,
}

/// A connected set of faces unwrapped as one piece.
#[derive(Debug, Clone, Default)]
pub struct Chart {
    pub(crate) verts: Vec<Vert>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) faces: Vec<Face>,
}

impl Chart {
    /// Create an empty chart.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of vertices.
    #[inline]
    pub fn num_verts(&self) -> usize {
        self.verts.len()
    }

    /// Number of half-edges.
    #[inline]
    pub fn num_edges(&self) -> usize {
        self.edges.len()
    }

    /// Number of faces.
    #[inline]
    pub fn num_faces(&self) -> usize {
        self.faces.len()
    }

    /// Get a vertex.
    #[inline]
    pub fn vert(&self, v: VertId) -> &Vert {
        &self.verts[v.index()]
    }

    /// Get a mutable vertex.
    #[inline]
    pub fn vert_mut(&mut self, v: VertId) -> &mut Vert {
        &mut self.verts[v.index()]
    }

    /// Get an edge.
    #[inline]
    pub fn edge(&self, e: EdgeId) -> &Edge {
        &self.edges[e.index()]
    }

    /// Get a mutable edge.
    #[inline]
    pub fn edge_mut(&mut self, e: EdgeId) -> &mut Edge {
        &mut self.edges[e.index()]
    }

    /// Get a face.
    #[inline]
    pub fn face(&self, f: FaceId) -> &Face {
        &self.faces[f.index()]
    }

    /// Get a mutable face.
    #[inline]
    pub fn face_mut(&mut self, f: FaceId) -> &mut Face {
        &mut self.faces[f.index()]
    }

    /// All vertex ids.
    pub fn vert_ids(&self) -> impl Iterator<Item = VertId> {
        (0..self.verts.len()).map(VertId::new)
    }

    /// All edge ids.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> {
        (0..self.edges.len()).map(EdgeId::new)
    }

    /// All face ids.
    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> {
        (0..self.faces.len()).map(FaceId::new)
    }

    /// Iterate over all vertices.
    pub fn verts(&self) -> impl Iterator<Item = &Vert> {
        self.verts.iter()
    }

    // ---- Navigation ----

    /// Next edge around the face.
    #[inline]
    pub fn next(&self, e: EdgeId) -> EdgeId {
        self.edges[e.index()].next
    }

    /// Previous edge around the (triangular) face.
    #[inline]
    pub fn prev(&self, e: EdgeId) -> EdgeId {
        self.next(self.next(e))
    }

    /// Opposite edge, if any.
    #[inline]
    pub fn pair(&self, e: EdgeId) -> Option<EdgeId> {
        self.edges[e.index()].pair
    }

    /// Start vertex of an edge.
    #[inline]
    pub fn edge_vert(&self, e: EdgeId) -> VertId {
        self.edges[e.index()].vert
    }

    /// End vertex of an edge.
    #[inline]
    pub fn edge_dest(&self, e: EdgeId) -> VertId {
        self.edge_vert(self.next(e))
    }

    /// Next edge in the fan around `e`'s start vertex.
    #[inline]
    pub fn wheel_next(&self, e: EdgeId) -> Option<EdgeId> {
        self.pair(self.prev(e))
    }

    /// Previous edge in the fan around `e`'s start vertex.
    #[inline]
    pub fn wheel_prev(&self, e: EdgeId) -> Option<EdgeId> {
        self.pair(e).map(|p| self.next(p))
    }

    /// Next edge along a boundary loop.
    #[inline]
    pub fn boundary_edge_next(&self, e: EdgeId) -> EdgeId {
        self.verts[self.edge_dest(e).index()].edge
    }

    /// Previous edge along a boundary loop.
    pub fn boundary_edge_prev(&self, e: EdgeId) -> EdgeId {
        let mut last = e;
        let mut we = e;
        while let Some(n) = self.wheel_next(we) {
            if n == e {
                break;
            }
            last = n;
            we = n;
        }
        self.prev(last)
    }

    /// True when the vertex is surrounded by faces.
    #[inline]
    pub fn vert_interior(&self, v: VertId) -> bool {
        self.pair(self.verts[v.index()].edge).is_some()
    }

    /// Iterate over the outgoing edges of a vertex, starting at its edge pointer.
    pub fn vert_edges(&self, v: VertId) -> WheelIter<'_> {
        let start = self.verts[v.index()].edge;
        WheelIter {
            chart: self,
            start,
            current: Some(start),
        }
    }

    /// The three edges of a face, starting at its edge pointer.
    #[inline]
    pub fn face_edges(&self, f: FaceId) -> [EdgeId; 3] {
        let e1 = self.faces[f.index()].edge;
        let e2 = self.next(e1);
        [e1, e2, self.next(e2)]
    }

    /// The three vertices of a face.
    #[inline]
    pub fn face_verts(&self, f: FaceId) -> [VertId; 3] {
        self.face_edges(f).map(|e| self.edge_vert(e))
    }

    // ---- Geometry ----

    /// 3D length of an edge.
    pub fn edge_length(&self, e: EdgeId) -> f64 {
        (self.vert(self.edge_dest(e)).co - self.vert(self.edge_vert(e)).co).norm()
    }

    /// 2D length of an edge.
    pub fn edge_uv_length(&self, e: EdgeId) -> f64 {
        (self.vert(self.edge_dest(e)).uv - self.vert(self.edge_vert(e)).uv).norm()
    }

    /// 3D area of a face.
    pub fn face_area(&self, f: FaceId) -> f64 {
        let [a, b, c] = self.face_verts(f).map(|v| self.vert(v).co);
        0.5 * (b - a).cross(&(c - a)).norm()
    }

    /// Signed UV area of a face; negative when flipped.
    pub fn face_uv_area_signed(&self, f: FaceId) -> f64 {
        let [a, b, c] = self.face_verts(f).map(|v| self.vert(v).uv);
        0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
    }

    /// Corner angles of a face in 3D, in `face_edges` order.
    pub fn face_angles(&self, f: FaceId) -> [f64; 3] {
        let [a, b, c] = self.face_verts(f).map(|v| self.vert(v).co);
        triangle_angles(&a, &b, &c)
    }

    /// 3D corner angle of the face owning `e`, at `e`'s start vertex.
    pub fn edge_angle(&self, e: EdgeId) -> f64 {
        let f = self.edge(e).face;
        let edges = self.face_edges(f);
        let angles = self.face_angles(f);
        let k = edges.iter().position(|&x| x == e).unwrap_or(0);
        angles[k]
    }

    /// Total 3D area of the chart.
    pub fn area(&self) -> f64 {
        self.face_ids().map(|f| self.face_area(f)).sum()
    }

    /// Total UV area of the chart, unsigned per face.
    pub fn uv_area(&self) -> f64 {
        self.face_ids()
            .map(|f| self.face_uv_area_signed(f).abs())
            .sum()
    }

    /// Count boundary loops and find the longest one.
    pub fn boundaries(&self) -> Boundaries {
        let mut visited = vec![false; self.edges.len()];
        let mut count = 0;
        let mut outer = None;
        let mut max_len = -1.0;

        for e in self.edge_ids() {
            if visited[e.index()] || self.pair(e).is_some() {
                continue;
            }
            count += 1;
            let mut len = 0.0;
            let mut be = e;
            loop {
                visited[be.index()] = true;
                len += self.edge_length(be);
                be = self.boundary_edge_next(be);
                if be == e || visited[be.index()] {
                    break;
                }
            }
            if len > max_len {
                outer = Some(e);
                max_len = len;
            }
        }

        Boundaries { count, outer }
    }

    /// Edges of the boundary loop containing `start`, in walking order.
    pub fn boundary_loop(&self, start: EdgeId) -> Vec<EdgeId> {
        let mut out = vec![start];
        let mut be = self.boundary_edge_next(start);
        while be != start && out.len() <= self.edges.len() {
            out.push(be);
            be = self.boundary_edge_next(be);
        }
        out
    }

    // ---- UV transforms ----

    /// Bounding box of the chart's UVs.
    pub fn uv_bbox(&self) -> (Point2<f64>, Point2<f64>) {
        let mut min = Point2::new(f64::INFINITY, f64::INFINITY);
        let mut max = Point2::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
        for v in &self.verts {
            min = min.inf(&v.uv);
            max = max.sup(&v.uv);
        }
        (min, max)
    }

    /// Translate all UVs.
    pub fn uv_translate(&mut self, t: Vector2<f64>) {
        for v in &mut self.verts {
            v.uv += t;
        }
    }

    /// Scale all UVs about the origin.
    pub fn uv_scale(&mut self, scale: f64) {
        for v in &mut self.verts {
            v.uv.coords *= scale;
        }
    }

    /// Scale U and V independently about the origin.
    pub fn uv_scale_xy(&mut self, x: f64, y: f64) {
        for v in &mut self.verts {
            v.uv.x *= x;
            v.uv.y *= y;
        }
    }

    /// Apply a linear map to all UVs.
    pub fn uv_transform(&mut self, m: &Matrix2<f64>) {
        for v in &mut self.verts {
            v.uv = Point2::from(m * v.uv.coords);
        }
    }

    /// Set every UV to zero.
    pub fn uv_zero(&mut self) {
        for v in &mut self.verts {
            v.uv = Point2::origin();
        }
    }

    /// Number of pinned vertices.
    pub fn num_pins(&self) -> usize {
        self.verts
            .iter()
            .filter(|v| v.flag.contains(VertFlags::PIN))
            .count()
    }

    /// Reverse the orientation of a face, keeping each corner's data with its vertex.
    pub fn face_flip(&mut self, f: FaceId) {
        let [e1, e2, e3] = self.face_edges(f);
        let (v1, v2, v3) = (self.edge_vert(e1), self.edge_vert(e2), self.edge_vert(e3));
        let uv1 = self.edge(e1).orig_uv;
        let uv2 = self.edge(e2).orig_uv;
        let uv3 = self.edge(e3).orig_uv;
        let old1 = self.edge(e1).old_uv;
        let old2 = self.edge(e2).old_uv;
        let old3 = self.edge(e3).old_uv;
        let fl1 = self.edge(e1).flag;
        let fl2 = self.edge(e2).flag;
        let fl3 = self.edge(e3).flag;

        let set = |chart: &mut Self, e: EdgeId, v: VertId, uv: Option<usize>, old, fl: EdgeFlags| {
            let edge = chart.edge_mut(e);
            edge.vert = v;
            edge.orig_uv = uv;
            edge.old_uv = old;
            edge.flag.set(EdgeFlags::PIN, fl.contains(EdgeFlags::PIN));
            edge.flag.set(EdgeFlags::SELECT, fl.contains(EdgeFlags::SELECT));
        };
        set(self, e1, v2, uv2, old2, fl2);
        set(self, e2, v3, uv3, old3, fl3);
        set(self, e3, v1, uv1, old1, fl1);

        // The face now runs e1 -> e3 -> e2
        self.edge_mut(e1).next = e3;
        self.edge_mut(e3).next = e2;
        self.edge_mut(e2).next = e1;
    }
}

/// Iterator over the outgoing edges of a vertex.
pub struct WheelIter<'a> {
    chart: &'a Chart,
    start: EdgeId,
    current: Option<EdgeId>,
}

impl Iterator for WheelIter<'_> {
    type Item = EdgeId;

    fn next(&mut self) -> Option<EdgeId> {
        let e = self.current?;
        self.current = self.chart.wheel_next(e).filter(|&n| n != self.start);
        Some(e)
    }
}
