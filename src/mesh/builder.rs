//! Chart construction.
//!
//! Faces are accumulated into one construction arena keyed by host vertex
//! keys. [`ChartBuilder::end`] then connects opposite edges, floods faces into
//! connected charts, splits non-manifold vertex fans and hands back one
//! [`Chart`] per component.

use std::collections::HashMap;

use nalgebra::{Point2, Point3};

use super::chart::{Chart, Edge, Face, Vert};
use super::fill::fill_boundaries;
use super::index::{EdgeFlags, EdgeId, FaceFlags, FaceId, ParamKey, VertFlags, VertId};
use crate::error::{ParamError, Result};

/// Two corner UVs closer than this are considered the same.
const IMPLICIT_SEAM_LIMIT: f64 = 1e-5;

/// Tie-break bias when both quad diagonals have the same length.
const QUAD_SPLIT_BIAS: f64 = 1.0 + 1e-6;

/// One polygon handed to [`ChartBuilder::add_face`].
///
/// All per-corner slices must have the same length: 3 for triangles, 4 for
/// quads.
#[derive(Debug, Clone, Copy)]
pub struct FaceInput<'a> {
    /// Host key of the face.
    pub key: ParamKey,
    /// Host keys of the corner vertices.
    pub vert_keys: &'a [ParamKey],
    /// 3D positions of the corners.
    pub positions: &'a [Point3<f64>],
    /// Slots of the corners in the host UV layer.
    pub uv_slots: &'a [usize],
    /// Per-corner pin flags.
    pub pins: Option<&'a [bool]>,
    /// Per-corner select flags.
    pub selects: Option<&'a [bool]>,
    /// Per-corner vertex weights.
    pub weights: Option<&'a [f64]>,
}

impl<'a> FaceInput<'a> {
    /// Create a face without pins, selection or weights.
    pub fn new(
        key: ParamKey,
        vert_keys: &'a [ParamKey],
        positions: &'a [Point3<f64>],
        uv_slots: &'a [usize],
    ) -> Self {
        Self {
            key,
            vert_keys,
            positions,
            uv_slots,
            pins: None,
            selects: None,
            weights: None,
        }
    }

    /// Set per-corner pin flags.
    pub fn with_pins(mut self, pins: &'a [bool]) -> Self {
        self.pins = Some(pins);
        self
    }

    /// Set per-corner select flags.
    pub fn with_selects(mut self, selects: &'a [bool]) -> Self {
        self.selects = Some(selects);
        self
    }

    /// Set per-corner vertex weights.
    pub fn with_weights(mut self, weights: &'a [f64]) -> Self {
        self.weights = Some(weights);
        self
    }

    fn validate(&self, uv_len: usize) -> Result<()> {
        let n = self.vert_keys.len();
        if n != 3 && n != 4 {
            return Err(ParamError::UnsupportedPolygon { nverts: n });
        }
        let lengths = [
            Some(self.positions.len()),
            Some(self.uv_slots.len()),
            self.pins.map(<[bool]>::len),
            self.selects.map(<[bool]>::len),
            self.weights.map(<[f64]>::len),
        ];
        if let Some(found) = lengths.into_iter().flatten().find(|&l| l != n) {
            return Err(ParamError::CornerCountMismatch {
                face: self.key,
                expected: n,
                found,
            });
        }
        for (i, k) in self.vert_keys.iter().enumerate() {
            if self.vert_keys[i + 1..].contains(k) {
                return Err(ParamError::DegenerateFace { face: self.key });
            }
        }
        if let Some(&slot) = self.uv_slots.iter().find(|&&s| s >= uv_len) {
            return Err(ParamError::InvalidUvSlot { slot, len: uv_len });
        }
        Ok(())
    }
}

/// Charts produced by [`ChartBuilder::end`].
#[derive(Debug, Default)]
pub struct BuiltCharts {
    /// The surviving charts.
    pub charts: Vec<BuiltChart>,
    /// Number of charts dropped for having no boundary.
    pub dropped: usize,
}

/// One chart plus what construction learned about it.
#[derive(Debug)]
pub struct BuiltChart {
    /// The chart's mesh.
    pub mesh: Chart,
    /// True when any corner of the chart is pinned.
    pub has_pins: bool,
}

/// Accumulates faces and seams, then splits them into charts.
#[derive(Debug, Default)]
pub struct ChartBuilder {
    mesh: Chart,
    vert_map: HashMap<ParamKey, VertId>,
    /// Edges by unordered vertex-key pair; several edges may share a key.
    edge_map: HashMap<(ParamKey, ParamKey), Vec<EdgeId>>,
}

#[inline]
fn edge_key(a: ParamKey, b: ParamKey) -> (ParamKey, ParamKey) {
    if a < b {
        (a, b)
    } else {
        (b, a)
    }
}

impl ChartBuilder {
    /// Create an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of triangles added so far.
    pub fn num_faces(&self) -> usize {
        self.mesh.num_faces()
    }

    /// Add a triangle or a quad. Quads are split into two triangles.
    ///
    /// `uv_layer` is the host UV storage the corner slots index into.
    pub fn add_face(&mut self, face: &FaceInput<'_>, uv_layer: &[Point2<f64>]) -> Result<()> {
        face.validate(uv_layer.len())?;

        if face.vert_keys.len() == 3 {
            self.add_triangle(face, [0, 1, 2]);
            return Ok(());
        }

        let tris = if self.quad_split_direction(face) {
            [[0, 1, 2], [0, 2, 3]]
        } else {
            [[0, 1, 3], [1, 2, 3]]
        };
        for tri in tris {
            if !self.face_exists(face.vert_keys, tri) {
                self.add_triangle(face, tri);
            }
        }
        Ok(())
    }

    /// Mark every edge between the two vertex keys as a seam.
    pub fn set_seam(&mut self, a: ParamKey, b: ParamKey) {
        let Some(list) = self.edge_map.get(&edge_key(a, b)) else {
            return;
        };
        for &e in list {
            let v1 = self.mesh.vert(self.mesh.edge_vert(e)).key;
            let v2 = self.mesh.vert(self.mesh.edge_dest(e)).key;
            if (v1 == a && v2 == b) || (v1 == b && v2 == a) {
                self.mesh.edge_mut(e).flag.insert(EdgeFlags::SEAM);
            }
        }
    }

    /// True to split along diagonal 0-2, false for 1-3.
    ///
    /// Prefers the shorter diagonal, but switches when a triangle of that
    /// split already exists (two quads sharing three vertices). Degenerate
    /// input can still yield duplicate triangles.
    fn quad_split_direction(&self, face: &FaceInput<'_>) -> bool {
        let co = face.positions;
        let fac = (co[0] - co[2]).norm() * QUAD_SPLIT_BIAS - (co[1] - co[3]).norm();
        let dir = fac <= 0.0;

        let keys = face.vert_keys;
        let exists = if dir {
            self.face_exists(keys, [0, 1, 2]) || self.face_exists(keys, [0, 2, 3])
        } else {
            self.face_exists(keys, [0, 1, 3]) || self.face_exists(keys, [1, 2, 3])
        };
        if exists {
            !dir
        } else {
            dir
        }
    }

    fn face_exists(&self, keys: &[ParamKey], [i1, i2, i3]: [usize; 3]) -> bool {
        let (k1, k2, k3) = (keys[i1], keys[i2], keys[i3]);
        let Some(list) = self.edge_map.get(&edge_key(k1, k2)) else {
            return false;
        };
        list.iter().any(|&e| {
            let a = self.mesh.vert(self.mesh.edge_vert(e)).key;
            let b = self.mesh.vert(self.mesh.edge_dest(e)).key;
            let c = self.mesh.vert(self.mesh.edge_vert(self.mesh.prev(e))).key;
            ((a == k1 && b == k2) || (a == k2 && b == k1)) && c == k3
        })
    }

    fn lookup_vert(&mut self, key: ParamKey, co: &Point3<f64>, weight: f64, e: EdgeId) -> VertId {
        if let Some(&v) = self.vert_map.get(&key) {
            return v;
        }
        let co = co.map(|c| if c.is_finite() { c } else { 0.0 });
        let v = VertId::new(self.mesh.verts.len());
        self.mesh.verts.push(Vert {
            co,
            uv: Point2::origin(),
            flag: VertFlags::empty(),
            edge: e,
            weight,
            key,
        });
        self.vert_map.insert(key, v);
        v
    }

    fn add_triangle(&mut self, face: &FaceInput<'_>, corners: [usize; 3]) {
        let f = FaceId::new(self.mesh.faces.len());
        let base = self.mesh.edges.len();
        let ids = [EdgeId::new(base), EdgeId::new(base + 1), EdgeId::new(base + 2)];

        for (k, &c) in corners.iter().enumerate() {
            let weight = face.weights.map_or(1.0, |w| w[c]);
            let v = self.lookup_vert(face.vert_keys[c], &face.positions[c], weight, ids[k]);
            let mut flag = EdgeFlags::empty();
            flag.set(EdgeFlags::PIN, face.pins.is_some_and(|p| p[c]));
            flag.set(EdgeFlags::SELECT, face.selects.is_some_and(|s| s[c]));
            self.mesh.edges.push(Edge {
                vert: v,
                pair: None,
                next: ids[(k + 1) % 3],
                face: f,
                orig_uv: Some(face.uv_slots[c]),
                old_uv: Point2::origin(),
                flag,
            });
        }
        self.mesh.faces.push(Face {
            edge: ids[0],
            flag: FaceFlags::empty(),
            key: face.key,
        });

        for k in 0..3 {
            let a = face.vert_keys[corners[k]];
            let b = face.vert_keys[corners[(k + 1) % 3]];
            self.edge_map.entry(edge_key(a, b)).or_default().push(ids[k]);
        }
    }

    /// Flag both edges as seams when their shared vertices carry different UVs.
    fn implicit_seam(&mut self, e: EdgeId, ep: EdgeId, uv_layer: &[Point2<f64>]) -> bool {
        let m = &self.mesh;
        let slot_uv = |e: EdgeId| m.edge(e).orig_uv.map(|s| uv_layer[s]);
        let (uv1, uv2) = (slot_uv(e), slot_uv(m.next(e)));
        let (uvp1, uvp2) = if m.vert(m.edge_vert(e)).key == m.vert(m.edge_vert(ep)).key {
            (slot_uv(ep), slot_uv(m.next(ep)))
        } else {
            (slot_uv(m.next(ep)), slot_uv(ep))
        };

        let differs = |a: Option<Point2<f64>>, b: Option<Point2<f64>>| match (a, b) {
            (Some(a), Some(b)) => {
                (a.x - b.x).abs() > IMPLICIT_SEAM_LIMIT || (a.y - b.y).abs() > IMPLICIT_SEAM_LIMIT
            }
            _ => false,
        };

        if differs(uv1, uvp1) || differs(uv2, uvp2) {
            self.mesh.edge_mut(e).flag.insert(EdgeFlags::SEAM);
            self.mesh.edge_mut(ep).flag.insert(EdgeFlags::SEAM);
            return true;
        }
        false
    }

    /// Find the unique edge `e` may be paired with.
    fn find_pair(&mut self, e: EdgeId, implicit_seams: bool, uv_layer: &[Point2<f64>]) -> Option<EdgeId> {
        if self.mesh.edge(e).flag.contains(EdgeFlags::SEAM) {
            return None;
        }
        let key1 = self.mesh.vert(self.mesh.edge_vert(e)).key;
        let key2 = self.mesh.vert(self.mesh.edge_dest(e)).key;
        let candidates = self.edge_map.get(&edge_key(key1, key2)).cloned().unwrap_or_default();

        let mut pair = None;
        for pe in candidates {
            if pe == e {
                continue;
            }
            let v1 = self.mesh.vert(self.mesh.edge_vert(pe)).key;
            let v2 = self.mesh.vert(self.mesh.edge_dest(pe)).key;
            if !((v1 == key1 && v2 == key2) || (v1 == key2 && v2 == key1)) {
                continue;
            }
            // Seams and t-junctions stay unconnected
            if self.mesh.edge(pe).flag.contains(EdgeFlags::SEAM)
                || pair.is_some()
                || (implicit_seams && self.implicit_seam(e, pe, uv_layer))
            {
                return None;
            }
            pair = Some(pe);
        }

        let p = pair?;
        if self.mesh.edge_vert(e) == self.mesh.edge_vert(p) {
            // Same direction: only fixable by flipping a still-unconnected face
            let n1 = self.mesh.next(p);
            let n2 = self.mesh.next(n1);
            if self.mesh.pair(n1).is_some() || self.mesh.pair(n2).is_some() {
                return None;
            }
        }
        Some(p)
    }

    fn connect_pair(
        &mut self,
        e: EdgeId,
        implicit_seams: bool,
        uv_layer: &[Point2<f64>],
        stack: &mut Vec<EdgeId>,
    ) -> bool {
        if self.mesh.pair(e).is_none() {
            if let Some(p) = self.find_pair(e, implicit_seams, uv_layer) {
                let pf = self.mesh.edge(p).face;
                if self.mesh.edge_vert(e) == self.mesh.edge_vert(p) {
                    self.mesh.face_flip(pf);
                }
                self.mesh.edge_mut(e).pair = Some(p);
                self.mesh.edge_mut(p).pair = Some(e);
                if !self.mesh.face(pf).flag.contains(FaceFlags::CONNECTED) {
                    stack.push(p);
                }
            }
        }
        self.mesh.pair(e).is_some()
    }

    /// Flood fill faces through pairable edges; returns the chart of every face.
    fn connect_pairs(&mut self, implicit_seams: bool, uv_layer: &[Point2<f64>]) -> (Vec<usize>, usize) {
        let mut chart_of = vec![usize::MAX; self.mesh.num_faces()];
        let mut ncharts = 0;
        let mut stack = Vec::new();

        for first in self.mesh.face_ids().collect::<Vec<_>>() {
            if self.mesh.face(first).flag.contains(FaceFlags::CONNECTED) {
                continue;
            }
            stack.push(self.mesh.face(first).edge);

            while let Some(e) = stack.pop() {
                let f = self.mesh.edge(e).face;
                self.mesh.face_mut(f).flag.insert(FaceFlags::CONNECTED);
                chart_of[f.index()] = ncharts;

                let e1 = self.mesh.next(e);
                let e2 = self.mesh.next(e1);
                for edge in [e, e1, e2] {
                    if !self.connect_pair(edge, implicit_seams, uv_layer, &mut stack) {
                        let v = self.mesh.edge_vert(edge);
                        self.mesh.vert_mut(v).edge = edge;
                    }
                }
            }
            ncharts += 1;
        }
        (chart_of, ncharts)
    }

    /// Give every manifold fan of a vertex its own vertex record.
    fn split_vert(&mut self, e: EdgeId, has_pins: &mut bool) {
        if self.mesh.edge(e).flag.contains(EdgeFlags::PIN) {
            *has_pins = true;
        }
        if self.mesh.edge(e).flag.contains(EdgeFlags::VERTEX_SPLIT) {
            return;
        }

        let v = self.mesh.edge_vert(e);

        // Rewind to the start of the fan
        let mut lastwe = e;
        let mut we = self.mesh.wheel_prev(e);
        while let Some(w) = we {
            if w == e {
                break;
            }
            lastwe = w;
            we = self.mesh.wheel_prev(w);
        }

        let mut copy = true;
        let mut we = Some(lastwe);
        while let Some(w) = we {
            if self.mesh.edge(w).flag.contains(EdgeFlags::VERTEX_SPLIT) {
                break;
            }
            self.mesh.edge_mut(w).flag.insert(EdgeFlags::VERTEX_SPLIT);
            if w == self.mesh.vert(v).edge {
                copy = false;
            }
            we = self.mesh.wheel_next(w);
        }

        if copy {
            self.mesh.vert_mut(v).flag.insert(VertFlags::SPLIT);
            let mut nv = self.mesh.vert(v).clone();
            nv.edge = lastwe;
            let nv_id = VertId::new(self.mesh.verts.len());
            self.mesh.verts.push(nv);

            let mut w = lastwe;
            loop {
                self.mesh.edge_mut(w).vert = nv_id;
                match self.mesh.wheel_next(w) {
                    Some(n) if n != lastwe => w = n,
                    _ => break,
                }
            }
        }
    }

    /// Finish construction.
    ///
    /// Connects pairs, splits the arena into charts, drops charts without a
    /// boundary (unless `implicit_seams`), fills inner holes when
    /// `fill_holes`, and loads pin/select state and UVs into the vertices.
    pub fn end(
        mut self,
        uv_layer: &[Point2<f64>],
        aspect_y: f64,
        fill_holes: bool,
        implicit_seams: bool,
    ) -> BuiltCharts {
        let (chart_of, ncharts) = self.connect_pairs(implicit_seams, uv_layer);

        let mut faces_of: Vec<Vec<FaceId>> = vec![Vec::new(); ncharts];
        let mut has_pins = vec![false; ncharts];
        for f in self.mesh.face_ids() {
            let c = chart_of[f.index()];
            faces_of[c].push(f);
            for e in self.mesh.face_edges(f) {
                self.split_vert(e, &mut has_pins[c]);
            }
        }

        let mut built = BuiltCharts::default();
        for (faces, pins) in faces_of.iter().zip(has_pins) {
            let mut mesh = self.extract(faces);
            let bounds = mesh.boundaries();

            if !implicit_seams && bounds.count == 0 {
                built.dropped += 1;
                continue;
            }
            if fill_holes && bounds.count > 1 {
                if let Some(outer) = bounds.outer {
                    fill_boundaries(&mut mesh, outer);
                }
            }
            for v in mesh.vert_ids().collect::<Vec<_>>() {
                load_pin_select_uvs(&mut mesh, v, uv_layer, aspect_y);
            }
            built.charts.push(BuiltChart {
                mesh,
                has_pins: pins,
            });
        }

        log::debug!(
            "constructed {} charts ({} dropped) from {} faces",
            built.charts.len(),
            built.dropped,
            self.mesh.num_faces()
        );
        built
    }

    /// Copy a set of faces into a standalone chart with compact indices.
    fn extract(&self, faces: &[FaceId]) -> Chart {
        let mut vert_remap: HashMap<VertId, VertId> = HashMap::new();
        let mut edge_remap: HashMap<EdgeId, EdgeId> = HashMap::with_capacity(faces.len() * 3);
        let mut chart = Chart::new();

        for (i, &f) in faces.iter().enumerate() {
            for (k, e) in self.mesh.face_edges(f).into_iter().enumerate() {
                edge_remap.insert(e, EdgeId::new(3 * i + k));
            }
        }

        for (i, &f) in faces.iter().enumerate() {
            let src = self.mesh.face(f);
            chart.faces.push(Face {
                edge: EdgeId::new(3 * i),
                flag: src.flag,
                key: src.key,
            });
            for (k, e) in self.mesh.face_edges(f).into_iter().enumerate() {
                let old = self.mesh.edge(e);
                let next_vert = chart.verts.len();
                let v = *vert_remap.entry(old.vert).or_insert_with(|| VertId::new(next_vert));
                if v.index() == next_vert {
                    chart.verts.push(self.mesh.vert(old.vert).clone());
                }
                let mut flag = old.flag;
                flag.remove(EdgeFlags::VERTEX_SPLIT);
                chart.edges.push(Edge {
                    vert: v,
                    pair: old.pair.and_then(|p| edge_remap.get(&p).copied()),
                    next: EdgeId::new(3 * i + (k + 1) % 3),
                    face: FaceId::new(i),
                    orig_uv: old.orig_uv,
                    old_uv: old.old_uv,
                    flag,
                });
            }
        }

        for v in &mut chart.verts {
            v.edge = edge_remap.get(&v.edge).copied().unwrap_or(EdgeId::new(0));
        }
        chart
    }
}

/// Average the host UVs of a vertex's corners into the vertex.
///
/// Pinned corners take precedence: if any corner is pinned the vertex is
/// pinned at their average.
pub(crate) fn load_pin_select_uvs(chart: &mut Chart, v: VertId, uv_layer: &[Point2<f64>], aspect_y: f64) {
    let mut uv = Point2::origin();
    let mut pin_uv = Point2::origin();
    let mut nedges = 0;
    let mut npins = 0;
    let mut select = false;

    for e in chart.vert_edges(v) {
        let edge = chart.edge(e);
        let Some(slot) = edge.orig_uv else {
            continue;
        };
        let host = uv_layer[slot];
        let scaled = Point2::new(host.x * aspect_y, host.y);
        select |= edge.flag.contains(EdgeFlags::SELECT);
        if edge.flag.contains(EdgeFlags::PIN) {
            pin_uv += scaled.coords;
            npins += 1;
        } else {
            uv += scaled.coords;
        }
        nedges += 1;
    }

    let vert = chart.vert_mut(v);
    if select {
        vert.flag.insert(VertFlags::SELECT);
    }
    if npins > 0 {
        vert.uv = pin_uv / npins as f64;
        vert.flag.insert(VertFlags::PIN);
    } else if nedges > 0 {
        vert.uv = uv / nedges as f64;
    } else {
        vert.uv = Point2::origin();
    }
}
