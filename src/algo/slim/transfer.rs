//! Moving charts between the half-edge representation and SLIM.
//!
//! A [`MatrixTransferChart`] is a dense copy of one chart: positions, UVs,
//! triangles, the outer boundary and the pins, with vertices renumbered so
//! the boundary comes first. It owns the chart's [`SlimData`] while a solve
//! or a live session is running. [`MatrixTransfer`] holds the charts of one
//! request together with the solver settings and drives them.

use std::sync::atomic::{AtomicUsize, Ordering};

use nalgebra::{Point2, Point3};
use rayon::prelude::*;

use crate::algo::parameterize::{convex_border_parameterization, map_vertices_to_convex_border, BorderMethod};
use crate::algo::progress::Progress;
use crate::error::{ParamError, Result};
use crate::mesh::{Chart, VertFlags, VertId};

use super::area_compensation::{correct_map_surface_area_if_necessary, correct_mesh_surface_area_if_necessary};
use super::line_search::count_flips;
use super::relocator::{adjust_pins, transform_initialization_if_necessary, PinnedVertexData};
use super::solver::{slim_precompute, slim_solve, sorted_pins, SlimData, SOFT_CONST_P};
use super::SlimOptions;

/// Edges shorter than this make a chart unsolvable.
const MIN_EDGE_LENGTH: f64 = 1e-5;

/// Iterations per live step.
const LIVE_ITERATIONS: usize = 3;

/// One chart in dense form.
#[derive(Debug, Clone, Default)]
pub struct MatrixTransferChart {
    /// 3D positions, boundary vertices first.
    pub v: Vec<Point3<f64>>,
    /// UVs, parallel to `v`.
    pub uv: Vec<Point2<f64>>,
    /// Triangles.
    pub f: Vec<[usize; 3]>,
    /// Outer boundary loop in walking order. Always `0..boundary.len()`.
    pub boundary: Vec<usize>,
    /// Pinned vertices.
    pub pinned_vertex_indices: Vec<usize>,
    /// UVs of the pinned vertices, parallel to the indices.
    pub pinned_vertex_positions: Vec<Point2<f64>>,
    /// Per-vertex weights.
    pub weights: Vec<f64>,
    /// Chart solved without error so far.
    pub succeeded: bool,
    /// Solver state while a solve is running.
    pub data: Option<SlimData>,

    /// Chart vertex index to row in the arrays above.
    slim_ids: Vec<usize>,
}

impl MatrixTransferChart {
    /// Copy a chart into dense arrays.
    ///
    /// Pins are the vertices flagged [`VertFlags::PIN`]; with
    /// `minimize_stretch`, every unselected vertex is pinned as well. A chart
    /// with an edge shorter than `1e-5` is marked as failed.
    pub fn from_chart(chart: &Chart, minimize_stretch: bool) -> Self {
        let nv = chart.num_verts();
        let mut slim_ids = vec![usize::MAX; nv];
        let mut order: Vec<VertId> = Vec::with_capacity(nv);
        let mut succeeded = true;

        if let Some(outer) = chart.boundaries().outer {
            for e in chart.boundary_loop(outer) {
                let v = chart.edge_vert(e);
                if slim_ids[v.index()] == usize::MAX {
                    slim_ids[v.index()] = order.len();
                    order.push(v);
                }
            }
        }
        let nb = order.len();
        for v in chart.vert_ids() {
            if slim_ids[v.index()] == usize::MAX {
                slim_ids[v.index()] = order.len();
                order.push(v);
            }
        }

        if chart.edge_ids().any(|e| chart.edge_length(e) < MIN_EDGE_LENGTH) {
            log::debug!("Chart has edges shorter than {MIN_EDGE_LENGTH}, not solving it");
            succeeded = false;
        }

        let mut out = Self {
            v: order.iter().map(|&v| chart.vert(v).co).collect(),
            uv: order.iter().map(|&v| chart.vert(v).uv).collect(),
            f: chart
                .face_ids()
                .map(|f| chart.face_verts(f).map(|v| slim_ids[v.index()]))
                .collect(),
            boundary: (0..nb).collect(),
            weights: order.iter().map(|&v| chart.vert(v).weight).collect(),
            succeeded,
            slim_ids,
            ..Default::default()
        };
        for (i, &v) in order.iter().enumerate() {
            let flag = chart.vert(v).flag;
            if flag.contains(VertFlags::PIN) || (minimize_stretch && !flag.contains(VertFlags::SELECT)) {
                out.pinned_vertex_indices.push(i);
                out.pinned_vertex_positions.push(chart.vert(v).uv);
            }
        }
        out
    }

    /// Number of vertices.
    pub fn num_verts(&self) -> usize {
        self.v.len()
    }

    /// Row of chart vertex `v`.
    #[inline]
    pub fn slim_id(&self, v: VertId) -> usize {
        self.slim_ids[v.index()]
    }

    /// Current UV of chart vertex `v`.
    #[inline]
    pub fn vertex_uv(&self, v: VertId) -> Point2<f64> {
        self.uv[self.slim_id(v)]
    }

    /// Read the pins of the chart again into `pinned`, outer boundary first.
    /// Also refreshes the pin positions stored on this chart.
    pub fn gather_pins(&mut self, chart: &Chart, minimize_stretch: bool, pinned: &mut PinnedVertexData) {
        pinned.clear();
        self.pinned_vertex_indices.clear();
        self.pinned_vertex_positions.clear();

        // Boundary rows come first
        let mut by_row: Vec<(usize, VertId)> = chart.vert_ids().map(|v| (self.slim_id(v), v)).collect();
        by_row.sort_unstable_by_key(|&(row, _)| row);

        for &(row, v) in &by_row {
            let vert = chart.vert(v);
            let pinned_here =
                vert.flag.contains(VertFlags::PIN) || (minimize_stretch && !vert.flag.contains(VertFlags::SELECT));
            if !pinned_here {
                continue;
            }
            let selected = vert.flag.contains(VertFlags::PIN) && vert.flag.contains(VertFlags::SELECT);
            pinned.push(row, vert.uv, selected);
            self.pinned_vertex_indices.push(row);
            self.pinned_vertex_positions.push(vert.uv);
        }
    }

    /// Build the solver state for this chart.
    ///
    /// On failure the chart is marked as failed and keeps no data.
    pub fn setup_slim_data(&mut self, options: &SlimOptions) {
        match GeometryData::new(self, options).construct_slim_data() {
            Ok(data) => self.data = Some(data),
            Err(err) => {
                log::warn!("SLIM setup failed: {err}");
                self.data = None;
                self.succeeded = false;
            }
        }
    }

    /// Drop the solver state.
    pub fn free_slim_data(&mut self) {
        self.data = None;
    }

    /// Run `iterations` iterations, marking the chart as failed on error.
    pub fn try_slim_solve(&mut self, iterations: usize) {
        let Some(data) = self.data.as_mut() else {
            return;
        };
        if let Err(err) = slim_solve(data, iterations) {
            log::warn!("SLIM solve failed: {err}");
            self.succeeded = false;
        }
    }

    /// One iteration, used by stretch minimization.
    pub fn parametrize_single_iteration(&mut self) {
        self.try_slim_solve(1);
    }

    /// Copy the solved layout into `uv`.
    pub fn transfer_uvs_back(&mut self) {
        if let Some(data) = self.data.as_mut() {
            correct_map_surface_area_if_necessary(data);
            self.uv.clone_from(&data.v_o);
        }
    }

    /// Copy `blend · old + (1 - blend) · solved` into `uv`.
    pub fn transfer_uvs_blended(&mut self, blend: f64) {
        if !self.succeeded {
            return;
        }
        if let Some(data) = self.data.as_mut() {
            correct_map_surface_area_if_necessary(data);
            self.uv = data
                .old_uvs
                .iter()
                .zip(&data.v_o)
                .map(|(old, new)| Point2::from(old.coords * blend + new.coords * (1.0 - blend)))
                .collect();
        }
    }

    /// Full solve of a chart that is not part of a live session.
    fn parametrize(&mut self, options: &SlimOptions) {
        if !self.succeeded {
            return;
        }
        self.setup_slim_data(options);
        if self.data.is_none() {
            return;
        }
        self.try_slim_solve(options.iterations);
        self.transfer_uvs_back();
        self.free_slim_data();
    }

    /// A few iterations towards freshly read pins.
    pub fn parametrize_live(&mut self, pinned: &PinnedVertexData) {
        let Some(data) = self.data.as_mut() else {
            return;
        };
        adjust_pins(data, pinned);
        self.try_slim_solve(LIVE_ITERATIONS);
        self.transfer_uvs_back();
    }
}

/// Settings and charts of one SLIM request.
#[derive(Debug, Default)]
pub struct MatrixTransfer {
    /// Solver settings.
    pub options: SlimOptions,
    /// Charts, in the order of the handle.
    pub charts: Vec<MatrixTransferChart>,
    /// Scratch buffer for live pins.
    pub pinned_vertex_data: PinnedVertexData,
}

impl MatrixTransfer {
    /// Create an empty transfer.
    pub fn new(options: SlimOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Solve every chart independently, in parallel.
    pub fn parametrize(&mut self) {
        self.parametrize_with_progress(&Progress::none());
    }

    /// Like [`parametrize`](Self::parametrize), reporting each finished chart.
    pub fn parametrize_with_progress(&mut self, progress: &Progress) {
        let options = &self.options;
        let total = self.charts.len();
        let done = AtomicUsize::new(0);
        self.charts.par_iter_mut().for_each(|chart| {
            chart.parametrize(options);
            let n = done.fetch_add(1, Ordering::Relaxed) + 1;
            progress.report(n, total, "Solving charts");
        });
    }

    /// Set up every chart for live solving.
    pub fn setup_slim_data(&mut self) {
        let options = &self.options;
        self.charts.par_iter_mut().for_each(|chart| {
            if chart.succeeded {
                chart.setup_slim_data(options);
            }
        });
    }

    /// Drop the solver state of every chart.
    pub fn free_slim_data(&mut self) {
        for chart in &mut self.charts {
            chart.free_slim_data();
        }
    }
}

/// The inputs SLIM needs to build its state for one chart.
#[derive(Debug, Clone, Copy)]
pub struct GeometryData<'a> {
    chart: &'a MatrixTransferChart,
    options: &'a SlimOptions,
}

impl<'a> GeometryData<'a> {
    /// Pair a dense chart with solver settings.
    pub fn new(chart: &'a MatrixTransferChart, options: &'a SlimOptions) -> Self {
        Self { chart, options }
    }

    /// Per-face weights from the vertex weights.
    ///
    /// A face with mean vertex weight `w` gets `(influence + 1)^(1 - 2w)`:
    /// weight 0 enlarges the face in UV space, weight 1 shrinks it.
    fn face_weights(&self) -> Vec<f64> {
        let influence = self.options.weight_influence;
        if influence <= 0.0 {
            return vec![1.0; self.chart.f.len()];
        }
        let max_factor = influence.abs() + 1.0;
        self.chart
            .f
            .iter()
            .map(|f| {
                let mean = f.iter().map(|&i| self.chart.weights[i]).sum::<f64>() / 3.0;
                max_factor.powf(2.0 * ((1.0 - mean) - 0.5))
            })
            .collect()
    }

    /// Build the SLIM state of the chart.
    ///
    /// The existing UVs are kept when `skip_initialization` is set and they
    /// contain no flipped triangle. Otherwise the outer boundary is mapped to
    /// a circle and the interior solved with mean value weights. The layout
    /// is then moved onto the pins, the 3D mesh rescaled when the map's area
    /// should be kept, and the solver precomputed.
    ///
    /// # Errors
    ///
    /// Returns [`ParamError::SlimFailed`] when the initial layout cannot be
    /// computed, typically for a chart without a boundary.
    pub fn construct_slim_data(&self) -> Result<SlimData> {
        let c = self.chart;
        let options = self.options;

        let mut data = SlimData::new(
            c.v.clone(),
            c.f.clone(),
            c.uv.clone(),
            c.pinned_vertex_indices.clone(),
            c.pinned_vertex_positions.clone(),
        );
        data.skip_initialization = options.skip_initialization && count_flips(&c.f, &c.uv) == 0;
        data.allow_reflection = options.allow_reflection;
        data.exp_factor = options.exp_factor;
        data.weight_per_face = self.face_weights();

        if !data.skip_initialization {
            let bnd_uv = map_vertices_to_convex_border(c.boundary.len());
            data.v_o = convex_border_parameterization(&c.v, &c.f, &c.boundary, &bnd_uv, BorderMethod::MeanValue)
                .map_err(|err| {
                    log::debug!("Convex border initialization failed: {err}");
                    ParamError::SlimFailed {
                        reason: "convex border initialization failed",
                    }
                })?;
        }

        if options.fixed_boundary {
            let mut b = std::mem::take(&mut data.b);
            let mut bc = std::mem::take(&mut data.bc);
            for &i in &c.boundary {
                b.push(i);
                bc.push(data.v_o[i]);
            }
            (data.b, data.bc) = sorted_pins(b, bc);
        }

        transform_initialization_if_necessary(&mut data);
        correct_mesh_surface_area_if_necessary(&mut data);
        slim_precompute(&mut data, options.energy, SOFT_CONST_P);
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::create_grid_chart;
    use crate::mesh::{ChartBuilder, FaceInput};

    #[test]
    fn test_boundary_comes_first() {
        let chart = create_grid_chart(3);
        let mt = MatrixTransferChart::from_chart(&chart, false);

        assert_eq!(mt.num_verts(), 16);
        assert_eq!(mt.boundary, (0..12).collect::<Vec<_>>());
        for v in chart.vert_ids() {
            assert_eq!(mt.slim_id(v) < 12, !chart.vert_interior(v));
        }
        assert!(mt.succeeded);
    }

    #[test]
    fn test_minimize_stretch_pins_unselected() {
        let mut chart = create_grid_chart(2);
        let first = chart.vert_ids().next().unwrap();
        chart.vert_mut(first).flag.insert(VertFlags::SELECT);

        let mt = MatrixTransferChart::from_chart(&chart, true);
        assert_eq!(mt.pinned_vertex_indices.len(), chart.num_verts() - 1);
        assert!(!mt.pinned_vertex_indices.contains(&mt.slim_id(first)));
    }

    #[test]
    fn test_construct_initializes_without_flips() {
        let chart = create_grid_chart(3);
        let mt = MatrixTransferChart::from_chart(&chart, false);
        let options = SlimOptions::default();
        let data = GeometryData::new(&mt, &options).construct_slim_data().unwrap();

        assert!(!data.skip_initialization);
        assert_eq!(count_flips(&data.f, &data.v_o), 0);
        // Boundary on the unit circle around (0.5, 0.5)
        for &i in &mt.boundary {
            assert!(((data.v_o[i] - Point2::new(0.5, 0.5)).norm() - 0.5).abs() < 1e-12);
        }
    }

    #[test]
    fn test_flipped_layout_is_not_kept() {
        let mut chart = create_grid_chart(2);
        for v in chart.vert_ids().collect::<Vec<_>>() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(-co.x, co.y);
        }
        let mt = MatrixTransferChart::from_chart(&chart, false);
        let options = SlimOptions::default().with_skip_initialization(true);
        let data = GeometryData::new(&mt, &options).construct_slim_data().unwrap();
        assert!(!data.skip_initialization);
    }

    #[test]
    fn test_parametrize_flattens_planar_chart() {
        let chart = create_grid_chart(3);
        let mut mt = MatrixTransfer::new(SlimOptions::default().with_iterations(30));
        mt.charts.push(MatrixTransferChart::from_chart(&chart, false));
        mt.parametrize();

        let c = &mt.charts[0];
        assert!(c.succeeded);
        assert!(c.data.is_none());
        assert_eq!(count_flips(&c.f, &c.uv), 0);

        // Planar input is recovered up to a rigid motion: unit edges
        for f in chart.face_ids() {
            for e in chart.face_edges(f) {
                let (a, b) = (chart.edge_vert(e), chart.edge_dest(e));
                let len3 = chart.edge_length(e);
                let len2 = (c.vertex_uv(a) - c.vertex_uv(b)).norm();
                assert!((len2 - len3).abs() < 0.1 * len3, "{len2} vs {len3}");
            }
        }
    }

    #[test]
    fn test_fixed_boundary_keeps_kept_boundary() {
        let mut chart = create_grid_chart(2);
        for v in chart.vert_ids().collect::<Vec<_>>() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(co.x * 1.3, co.y);
        }
        let mut mt = MatrixTransfer::new(
            SlimOptions::default()
                .with_skip_initialization(true)
                .with_fixed_boundary(true),
        );
        mt.charts.push(MatrixTransferChart::from_chart(&chart, false));
        let before: Vec<_> = mt.charts[0].boundary.iter().map(|&i| mt.charts[0].uv[i]).collect();
        mt.parametrize();

        let c = &mt.charts[0];
        for (&i, p) in c.boundary.iter().zip(&before) {
            assert_eq!(c.uv[i], *p);
        }
    }

    #[test]
    fn test_short_edges_fail_the_chart() {
        let co = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1e-6, 0.0, 0.0),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let uv = vec![Point2::origin(); 3];
        let mut builder = ChartBuilder::new();
        builder
            .add_face(&FaceInput::new(0, &[0, 1, 2], &co, &[0, 1, 2]), &uv)
            .unwrap();
        let chart = builder.end(&uv, 1.0, false, false).charts.remove(0).mesh;
        assert!(!MatrixTransferChart::from_chart(&chart, false).succeeded);
    }
}
