//! The unwrap lifecycle as seen by a host application.
//!
//! A [`ParamHandle`] owns the host's UV layer. Faces are added while the
//! handle is constructing; [`ParamHandle::end`] splits them into charts and
//! loads the current UVs, pins and selection into the chart vertices. The
//! solvers then work on vertex UVs, and [`ParamHandle::flush`] writes them
//! back into the layer.
//!
//! ```text
//! Constructing --end--> Constructed --lscm_begin------> Lscm ----lscm_end------> Constructed
//!                       Constructed --slim_live_begin-> SlimLive --slim_live_end-> Constructed
//! ```
//!
//! [`ParamHandle::slim_solve`], [`pack`](ParamHandle::pack),
//! [`average`](ParamHandle::average), [`smooth_area`](ParamHandle::smooth_area)
//! and [`scale`](ParamHandle::scale) work on a constructed handle. Calling an operation in the wrong state returns
//! [`ParamError::InvalidState`].
//!
//! # Example
//!
//! ```
//! use unfold::algo::pack::PackOptions;
//! use unfold::algo::parameterize::LscmOptions;
//! use unfold::handle::{ConstructOptions, ParamHandle};
//! use unfold::mesh::FaceInput;
//! use nalgebra::{Point2, Point3};
//!
//! let co = [
//!     Point3::new(0.0, 0.0, 0.0),
//!     Point3::new(1.0, 0.0, 0.0),
//!     Point3::new(1.0, 1.0, 0.2),
//!     Point3::new(0.0, 1.0, 0.0),
//! ];
//! let mut handle = ParamHandle::new(vec![Point2::origin(); 4]);
//! handle.add_face(&FaceInput::new(0, &[0, 1, 2, 3], &co, &[0, 1, 2, 3])).unwrap();
//! handle.end(&ConstructOptions::default()).unwrap();
//!
//! handle.lscm_begin(&LscmOptions::default()).unwrap();
//! let report = handle.lscm_solve().unwrap();
//! handle.lscm_end().unwrap();
//! handle.pack(&PackOptions::default()).unwrap();
//! handle.flush().unwrap();
//!
//! assert_eq!(report.changed, 1);
//! assert!(handle.uv_layer().iter().all(|uv| uv.x <= 1.0 + 1e-9 && uv.y <= 1.0 + 1e-9));
//! ```

use nalgebra::Point2;
use rayon::prelude::*;

use crate::algo::pack::{average_charts, pack_charts, PackOptions};
use crate::algo::parameterize::{lscm_begin, lscm_finish, lscm_solve, LscmContext, LscmOptions};
use crate::algo::progress::Progress;
use crate::algo::slim::{MatrixTransfer, MatrixTransferChart, SlimOptions};
use crate::algo::smooth::smooth_area;
use crate::error::{ParamError, Result};
use crate::mesh::{load_pin_select_uvs, BuiltChart, Chart, ChartBuilder, FaceInput, ParamKey, VertFlags};

/// Lifecycle state of a [`ParamHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleState {
    /// Accepting faces and seams.
    Constructing,
    /// Charts are built; no solve session is open.
    Constructed,
    /// Between [`ParamHandle::lscm_begin`] and [`ParamHandle::lscm_end`].
    Lscm,
    /// Between [`ParamHandle::slim_live_begin`] and [`ParamHandle::slim_live_end`].
    SlimLive,
}

impl HandleState {
    fn name(self) -> &'static str {
        match self {
            HandleState::Constructing => "constructing",
            HandleState::Constructed => "constructed",
            HandleState::Lscm => "lscm",
            HandleState::SlimLive => "slim live",
        }
    }
}

/// Options for [`ParamHandle::end`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstructOptions {
    /// Fill inner boundary loops so they do not distort the solve.
    pub fill_holes: bool,
    /// Cut closed charts along implicit seams instead of dropping them.
    pub implicit_seams: bool,
}

impl Default for ConstructOptions {
    fn default() -> Self {
        Self {
            fill_holes: true,
            implicit_seams: false,
        }
    }
}

impl ConstructOptions {
    /// Enable or disable hole filling.
    pub fn with_fill_holes(mut self, fill: bool) -> Self {
        self.fill_holes = fill;
        self
    }

    /// Enable or disable implicit seams.
    pub fn with_implicit_seams(mut self, implicit: bool) -> Self {
        self.implicit_seams = implicit;
        self
    }
}

/// Per-chart outcome of a solve.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SolveReport {
    /// Charts that received a new layout.
    pub changed: usize,
    /// Charts that could not be solved.
    pub failed: usize,
}

/// A chart plus the state the handle keeps for it.
#[derive(Debug)]
pub struct ParamChart {
    mesh: Chart,
    has_pins: bool,
    skip_flush: bool,
    nopack: bool,
    lscm: Option<LscmContext>,
}

impl ParamChart {
    fn new(built: BuiltChart) -> Self {
        Self {
            mesh: built.mesh,
            has_pins: built.has_pins,
            skip_flush: false,
            nopack: false,
            lscm: None,
        }
    }

    /// The chart's mesh.
    pub fn mesh(&self) -> &Chart {
        &self.mesh
    }

    /// True when any corner of the chart was pinned at construction.
    pub fn has_pins(&self) -> bool {
        self.has_pins
    }

    /// True when the chart's pins fix its layout, so packing leaves it alone.
    pub fn is_nopack(&self) -> bool {
        self.nopack
    }

    fn reload_pins(&mut self, uv_layer: &[Point2<f64>], aspect_y: f64) {
        for v in self.mesh.vert_ids() {
            if self.mesh.vert(v).flag.contains(VertFlags::PIN) {
                load_pin_select_uvs(&mut self.mesh, v, uv_layer, aspect_y);
            }
        }
    }
}

/// Owns a UV layer and the charts unwrapped into it.
#[derive(Debug)]
pub struct ParamHandle {
    state: HandleState,
    builder: ChartBuilder,
    charts: Vec<ParamChart>,
    dropped: usize,
    uv_layer: Vec<Point2<f64>>,
    aspect_y: f64,
    blend: f64,
    slim: Option<MatrixTransfer>,
}

impl ParamHandle {
    /// Start constructing charts over `uv_layer`. Face corners refer to
    /// slots of this layer.
    pub fn new(uv_layer: Vec<Point2<f64>>) -> Self {
        Self {
            state: HandleState::Constructing,
            builder: ChartBuilder::new(),
            charts: Vec::new(),
            dropped: 0,
            uv_layer,
            aspect_y: 1.0,
            blend: 0.0,
            slim: None,
        }
    }

    fn state_error(expected: HandleState, found: HandleState) -> ParamError {
        ParamError::InvalidState {
            expected: expected.name(),
            found: found.name(),
        }
    }

    fn expect_state(&self, expected: HandleState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(Self::state_error(expected, self.state))
        }
    }

    fn expect_built(&self) -> Result<()> {
        if self.state == HandleState::Constructing {
            Err(Self::state_error(HandleState::Constructed, self.state))
        } else {
            Ok(())
        }
    }

    // ---- Construction ----

    /// Set the texture aspect ratio.
    ///
    /// UVs are stretched by `aspx / aspy` along U while solving and
    /// compressed again on flush. Set it before [`end`](Self::end), which
    /// loads the layer into the charts.
    pub fn set_aspect_ratio(&mut self, aspx: f64, aspy: f64) -> Result<()> {
        if !(aspx > 0.0 && aspx.is_finite()) {
            return Err(ParamError::invalid_param("aspx", aspx, "must be positive"));
        }
        if !(aspy > 0.0 && aspy.is_finite()) {
            return Err(ParamError::invalid_param("aspy", aspy, "must be positive"));
        }
        self.aspect_y = aspx / aspy;
        Ok(())
    }

    /// Add a triangle or quad.
    pub fn add_face(&mut self, face: &FaceInput<'_>) -> Result<()> {
        self.expect_state(HandleState::Constructing)?;
        self.builder.add_face(face, &self.uv_layer)
    }

    /// Mark the edge between two vertex keys as a seam.
    pub fn set_seam(&mut self, a: ParamKey, b: ParamKey) -> Result<()> {
        self.expect_state(HandleState::Constructing)?;
        self.builder.set_seam(a, b);
        Ok(())
    }

    /// Split the added faces into charts.
    ///
    /// Charts without a boundary are dropped and counted in
    /// [`num_dropped`](Self::num_dropped).
    pub fn end(&mut self, options: &ConstructOptions) -> Result<()> {
        self.expect_state(HandleState::Constructing)?;
        let builder = std::mem::take(&mut self.builder);
        let built = builder.end(
            &self.uv_layer,
            self.aspect_y,
            options.fill_holes,
            options.implicit_seams,
        );
        self.dropped = built.dropped;
        self.charts = built.charts.into_iter().map(ParamChart::new).collect();
        self.state = HandleState::Constructed;
        Ok(())
    }

    // ---- LSCM ----

    /// Open an LSCM session: back up the layer, pick pins and run ABF.
    pub fn lscm_begin(&mut self, options: &LscmOptions) -> Result<()> {
        self.expect_state(HandleState::Constructed)?;
        self.backup_uvs();

        for chart in &mut self.charts {
            chart.lscm = lscm_begin(&mut chart.mesh, options);
            match &chart.lscm {
                Some(ctx) => chart.nopack |= ctx.nopack,
                None => chart.skip_flush = true,
            }
        }
        self.state = HandleState::Lscm;
        Ok(())
    }

    /// Solve every chart of the session.
    ///
    /// Pins are read again from the layer first, so a live caller can move
    /// them between solves. Charts without pins are solved once; their
    /// session state is dropped afterwards.
    pub fn lscm_solve(&mut self) -> Result<SolveReport> {
        self.expect_state(HandleState::Lscm)?;
        let mut report = SolveReport::default();

        for chart in &mut self.charts {
            let Some(mut ctx) = chart.lscm.take() else {
                continue;
            };
            chart.reload_pins(&self.uv_layer, self.aspect_y);

            match lscm_solve(&mut chart.mesh, &mut ctx) {
                Ok(()) => {
                    lscm_finish(&mut chart.mesh, &ctx);
                    report.changed += 1;
                    if chart.has_pins {
                        chart.lscm = Some(ctx);
                    }
                }
                Err(err) => {
                    log::warn!("LSCM solve failed: {err}");
                    report.failed += 1;
                }
            }
        }

        log::debug!("LSCM: {} charts changed, {} failed", report.changed, report.failed);
        Ok(report)
    }

    /// Close the LSCM session.
    pub fn lscm_end(&mut self) -> Result<()> {
        self.expect_state(HandleState::Lscm)?;
        for chart in &mut self.charts {
            chart.lscm = None;
            chart.skip_flush = false;
        }
        self.state = HandleState::Constructed;
        Ok(())
    }

    // ---- SLIM ----

    fn matrix_transfer(&self, options: &SlimOptions) -> MatrixTransfer {
        let mut mt = MatrixTransfer::new(*options);
        mt.charts = self
            .charts
            .iter()
            .map(|c| MatrixTransferChart::from_chart(&c.mesh, options.minimize_stretch))
            .collect();
        mt
    }

    /// Copy solved UVs of unpinned vertices into the charts.
    ///
    /// Failed charts are zeroed unless `live`, where they keep their layout.
    fn slim_flush_uvs(charts: &mut [ParamChart], mt: &MatrixTransfer, live: bool) -> SolveReport {
        let mut report = SolveReport::default();
        for (chart, mtc) in charts.iter_mut().zip(&mt.charts) {
            if mtc.succeeded {
                report.changed += 1;
                for v in chart.mesh.vert_ids() {
                    let vert = chart.mesh.vert_mut(v);
                    if !vert.flag.contains(VertFlags::PIN) {
                        vert.uv = mtc.vertex_uv(v);
                    }
                }
            } else {
                report.failed += 1;
                if !live {
                    chart.mesh.uv_zero();
                }
            }
        }
        report
    }

    /// Unwrap every chart with SLIM.
    pub fn slim_solve(&mut self, options: &SlimOptions) -> Result<SolveReport> {
        self.slim_solve_with_progress(options, &Progress::none())
    }

    /// Like [`slim_solve`](Self::slim_solve), reporting each finished chart.
    pub fn slim_solve_with_progress(&mut self, options: &SlimOptions, progress: &Progress) -> Result<SolveReport> {
        self.expect_state(HandleState::Constructed)?;
        let mut mt = self.matrix_transfer(options);
        mt.parametrize_with_progress(progress);

        let report = Self::slim_flush_uvs(&mut self.charts, &mt, false);
        log::debug!("SLIM: {} charts changed, {} failed", report.changed, report.failed);
        Ok(report)
    }

    /// Open an interactive SLIM session.
    ///
    /// Outside stretch minimization, only charts with a selected pin and at
    /// least one unselected vertex take part; the others are left untouched
    /// until [`slim_live_end`](Self::slim_live_end).
    pub fn slim_live_begin(&mut self, options: &SlimOptions) -> Result<()> {
        self.expect_state(HandleState::Constructed)?;
        self.backup_uvs();
        let mut mt = self.matrix_transfer(options);

        if !options.minimize_stretch {
            for (chart, mtc) in self.charts.iter_mut().zip(&mut mt.charts) {
                let select = chart
                    .mesh
                    .verts()
                    .any(|v| v.flag.contains(VertFlags::PIN | VertFlags::SELECT));
                let deselect = chart.mesh.verts().any(|v| !v.flag.contains(VertFlags::SELECT));
                if !select || !deselect {
                    chart.skip_flush = true;
                    mtc.succeeded = false;
                }
            }
        }

        mt.setup_slim_data();
        self.slim = Some(mt);
        self.state = HandleState::SlimLive;
        Ok(())
    }

    /// Solve a few iterations towards the pins' current positions in the layer.
    pub fn slim_live_solve_iteration(&mut self) -> Result<()> {
        self.expect_state(HandleState::SlimLive)?;
        let (uv_layer, aspect_y) = (&self.uv_layer, self.aspect_y);
        let Some(mt) = self.slim.as_mut() else {
            return Err(Self::state_error(HandleState::SlimLive, self.state));
        };
        let minimize = mt.options.minimize_stretch;

        for (chart, mtc) in self.charts.iter_mut().zip(&mut mt.charts) {
            if mtc.data.is_none() {
                continue;
            }
            chart.reload_pins(uv_layer, aspect_y);
            mtc.gather_pins(&chart.mesh, minimize, &mut mt.pinned_vertex_data);
            mtc.parametrize_live(&mt.pinned_vertex_data);
        }

        Self::slim_flush_uvs(&mut self.charts, mt, true);
        Ok(())
    }

    /// One stretch-minimizing iteration per chart, blended with the layout
    /// from the start of the session: `blend = 0` keeps the new layout.
    pub fn slim_stretch_iteration(&mut self, blend: f64) -> Result<()> {
        self.expect_state(HandleState::SlimLive)?;
        let Some(mt) = self.slim.as_mut() else {
            return Err(Self::state_error(HandleState::SlimLive, self.state));
        };

        mt.charts.par_iter_mut().for_each(|mtc| {
            if mtc.data.is_some() {
                mtc.parametrize_single_iteration();
                mtc.transfer_uvs_blended(blend);
            }
        });

        Self::slim_flush_uvs(&mut self.charts, mt, false);
        Ok(())
    }

    /// Close the interactive SLIM session.
    pub fn slim_live_end(&mut self) -> Result<()> {
        self.expect_state(HandleState::SlimLive)?;
        if let Some(mut mt) = self.slim.take() {
            mt.free_slim_data();
        }
        for chart in &mut self.charts {
            chart.skip_flush = false;
        }
        self.state = HandleState::Constructed;
        Ok(())
    }

    // ---- Layout ----

    /// Pack the charts into the unit square.
    ///
    /// Charts laid out by two or more user pins keep their place and are
    /// never rotated.
    pub fn pack(&mut self, options: &PackOptions) -> Result<()> {
        self.expect_built()?;
        if options.margin < 0.0 {
            return Err(ParamError::invalid_param("margin", options.margin, "must be non-negative"));
        }

        let aspect_y = self.aspect_y;
        if aspect_y != 1.0 {
            self.scale_charts(1.0 / aspect_y, 1.0);
        }
        let mut refs: Vec<&mut Chart> = self
            .charts
            .iter_mut()
            .filter(|c| !c.nopack)
            .map(|c| &mut c.mesh)
            .collect();
        pack_charts(&mut refs, options);
        if aspect_y != 1.0 {
            self.scale_charts(aspect_y, 1.0);
        }
        Ok(())
    }

    /// Even out the UV area of every chart relative to its 3D area.
    ///
    /// Smoothing moves every vertex, so all pins are cleared first.
    pub fn smooth_area(&mut self) -> Result<()> {
        self.expect_state(HandleState::Constructed)?;
        self.charts.par_iter_mut().for_each(|chart| {
            let mesh = &mut chart.mesh;
            for v in mesh.vert_ids() {
                mesh.vert_mut(v).flag.remove(VertFlags::PIN);
            }
            smooth_area(mesh);
        });
        Ok(())
    }

    /// Give all charts the same UV-to-3D area ratio.
    pub fn average(&mut self, ignore_pinned: bool) -> Result<()> {
        self.expect_built()?;
        let mut refs: Vec<&mut Chart> = self
            .charts
            .iter_mut()
            .filter(|c| !(ignore_pinned && c.has_pins))
            .map(|c| &mut c.mesh)
            .collect();
        average_charts(&mut refs);
        Ok(())
    }

    /// Scale every chart's UVs about the origin.
    pub fn scale(&mut self, x: f64, y: f64) -> Result<()> {
        self.expect_built()?;
        self.scale_charts(x, y);
        Ok(())
    }

    fn scale_charts(&mut self, x: f64, y: f64) {
        for chart in &mut self.charts {
            chart.mesh.uv_scale_xy(x, y);
        }
    }

    // ---- UV layer ----

    /// Set how much of the backed-up layout [`flush`](Self::flush) keeps.
    pub fn set_blend(&mut self, blend: f64) {
        self.blend = blend.clamp(0.0, 1.0);
    }

    fn backup_uvs(&mut self) {
        let layer = &self.uv_layer;
        for chart in &mut self.charts {
            for e in chart.mesh.edge_ids() {
                if let Some(slot) = chart.mesh.edge(e).orig_uv {
                    chart.mesh.edge_mut(e).old_uv = layer[slot];
                }
            }
        }
    }

    /// Write the charts' vertex UVs into the layer.
    ///
    /// Each slot receives `blend · backup + (1 - blend) · uv`, with U divided
    /// by the aspect ratio.
    pub fn flush(&mut self) -> Result<()> {
        self.expect_built()?;
        let blend = self.blend;
        let invblend = 1.0 - blend;
        let invblend_x = invblend / self.aspect_y;

        for chart in self.charts.iter().filter(|c| !c.skip_flush) {
            let mesh = &chart.mesh;
            for e in mesh.edge_ids() {
                let edge = mesh.edge(e);
                let Some(slot) = edge.orig_uv else {
                    continue;
                };
                let uv = mesh.vert(edge.vert).uv;
                self.uv_layer[slot] = Point2::new(
                    blend * edge.old_uv.x + invblend_x * uv.x,
                    blend * edge.old_uv.y + invblend * uv.y,
                );
            }
        }
        Ok(())
    }

    /// Write the backup taken by the last `lscm_begin` or `slim_live_begin`
    /// back into the layer.
    pub fn flush_restore(&mut self) -> Result<()> {
        self.expect_built()?;
        for chart in &self.charts {
            for e in chart.mesh.edge_ids() {
                let edge = chart.mesh.edge(e);
                if let Some(slot) = edge.orig_uv {
                    self.uv_layer[slot] = edge.old_uv;
                }
            }
        }
        Ok(())
    }

    // ---- Accessors ----

    /// Current lifecycle state.
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// The UV layer.
    pub fn uv_layer(&self) -> &[Point2<f64>] {
        &self.uv_layer
    }

    /// Mutable access to the UV layer, used to move pins during live sessions.
    pub fn uv_layer_mut(&mut self) -> &mut [Point2<f64>] {
        &mut self.uv_layer
    }

    /// Consume the handle, returning the UV layer.
    pub fn into_uv_layer(self) -> Vec<Point2<f64>> {
        self.uv_layer
    }

    /// The charts built by [`end`](Self::end).
    pub fn charts(&self) -> &[ParamChart] {
        &self.charts
    }

    /// Number of charts.
    pub fn num_charts(&self) -> usize {
        self.charts.len()
    }

    /// Number of charts dropped at construction for having no boundary.
    pub fn num_dropped(&self) -> usize {
        self.dropped
    }
}
