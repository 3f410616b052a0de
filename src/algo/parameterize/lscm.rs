//! Least Squares Conformal Maps (LSCM) parameterization.
//!
//! LSCM computes a conformal (angle-preserving) parameterization of a chart
//! by solving a sparse least-squares problem: every triangle contributes two
//! rows asking its UV image to be a similarity of a reference triangle. The
//! reference angles are the 3D corner angles, or the angles found by
//! [`abf_solve`](super::abf_solve) when ABF is enabled.
//!
//! A solve is split into three steps so interactive callers can move pins
//! and solve again without rebuilding anything:
//!
//! 1. [`lscm_begin`] picks pins and runs ABF once
//! 2. [`lscm_solve`] assembles and solves the system
//! 3. [`lscm_finish`] rotates or rescales the result
//!
//! # References
//!
//! - Lévy, B., Petitjean, S., Ray, N., & Maillot, J. (2002). "Least squares
//!   conformal maps for automatic texture atlas generation." ACM SIGGRAPH.

use nalgebra::{Point2, Rotation2, Vector2};

use crate::algo::sparse::LeastSquares;
use crate::error::{ParamError, Result};
use crate::mesh::{Chart, VertFlags, VertId};

use super::abf::abf_solve;
use super::hull::minimum_area_angle;
use super::pins::{extrema_verts, symmetry_pins};

/// Options for [`lscm_begin`].
#[derive(Debug, Clone)]
pub struct LscmOptions {
    /// Interactive mode: charts whose pins are not being dragged are skipped.
    pub live: bool,

    /// Optimize the reference angles with ABF before solving.
    pub use_abf: bool,
}

impl Default for LscmOptions {
    fn default() -> Self {
        Self {
            live: false,
            use_abf: true,
        }
    }
}

impl LscmOptions {
    /// Options for interactive pin dragging: live, without ABF.
    pub fn live() -> Self {
        Self {
            live: true,
            use_abf: false,
        }
    }

    /// Set live mode.
    pub fn with_live(mut self, live: bool) -> Self {
        self.live = live;
        self
    }

    /// Enable or disable ABF.
    pub fn with_abf(mut self, use_abf: bool) -> Self {
        self.use_abf = use_abf;
        self
    }
}

/// Per-chart state kept between [`lscm_begin`] and the end of solving.
#[derive(Debug, Clone, Default)]
pub struct LscmContext {
    /// Automatically chosen pins; `None` when the user pinned 2 or more vertices.
    pub pins: Option<(VertId, VertId)>,
    /// The user's pin when exactly one vertex is pinned.
    pub single_pin: Option<VertId>,
    /// UV area of the chart when a single pin was found.
    pub area_uv: f64,
    /// Position of the single pin at the last solve.
    pub origin: Point2<f64>,
    /// Planar angles per edge from ABF.
    pub abf_alpha: Option<Vec<f64>>,
    /// The user's pins define the layout; the chart must not be rotated or packed.
    pub nopack: bool,
}

/// Prepare a chart for LSCM.
///
/// Counts the user pins, runs ABF when asked, and picks two pins when the
/// user supplied fewer than two. Auto-pins get initial UVs from their 3D
/// positions.
///
/// Returns `None` in live mode when the chart has no selected pin or is
/// entirely selected; such charts are not touched by the solve.
pub fn lscm_begin(chart: &mut Chart, options: &LscmOptions) -> Option<LscmContext> {
    let mut npins = 0;
    let mut select = false;
    let mut deselect = false;
    let mut first_pin = None;

    for v in chart.vert_ids() {
        let flag = chart.vert(v).flag;
        if flag.contains(VertFlags::PIN) {
            npins += 1;
            first_pin.get_or_insert(v);
            if flag.contains(VertFlags::SELECT) {
                select = true;
            }
        }
        if !flag.contains(VertFlags::SELECT) {
            deselect = true;
        }
    }

    if options.live && (!select || !deselect) {
        return None;
    }

    let mut ctx = LscmContext::default();
    if npins == 1 {
        ctx.area_uv = chart.uv_area();
        ctx.single_pin = first_pin;
    }

    if options.use_abf {
        match abf_solve(chart) {
            Ok(alpha) => ctx.abf_alpha = Some(alpha),
            Err(err) => log::warn!("ABF solving failed, falling back to LSCM: {err}"),
        }
    }

    if npins <= 1 {
        let outer = chart.boundaries().outer;
        ctx.pins = outer
            .and_then(|outer| symmetry_pins(chart, outer))
            .or_else(|| extrema_verts(chart));
    } else {
        ctx.nopack = true;
    }

    Some(ctx)
}

/// Assemble and solve the LSCM system, writing the result into the chart's UVs.
///
/// Pinned vertices must already carry their target UVs.
///
/// # Errors
///
/// Returns [`ParamError::Factorization`] or [`ParamError::NonFinite`] when
/// the system cannot be solved. The chart's UVs are zeroed in that case.
pub fn lscm_solve(chart: &mut Chart, ctx: &mut LscmContext) -> Result<()> {
    if let Some(pin) = ctx.single_pin {
        ctx.origin = chart.vert(pin).uv;
    }

    let nvars = 2 * chart.num_verts();
    let locked: Vec<(usize, f64)> = match ctx.pins {
        Some((pin1, pin2)) => [pin1, pin2]
            .into_iter()
            .flat_map(|v| {
                let uv = chart.vert(v).uv;
                [(2 * v.index(), uv.x), (2 * v.index() + 1, uv.y)]
            })
            .collect(),
        None => chart
            .vert_ids()
            .filter(|&v| chart.vert(v).flag.contains(VertFlags::PIN))
            .flat_map(|v| {
                let uv = chart.vert(v).uv;
                [(2 * v.index(), uv.x), (2 * v.index() + 1, uv.y)]
            })
            .collect(),
    };
    let mut system = LeastSquares::with_locked(nvars, &locked);

    // Fully pinned faces decide which way the chart faces in UV space
    let (mut area_up, mut area_down) = (0.0, 0.0);
    for f in chart.face_ids() {
        let pinned = chart
            .face_verts(f)
            .iter()
            .all(|&v| chart.vert(v).flag.contains(VertFlags::PIN));
        if pinned {
            let area = chart.face_uv_area_signed(f);
            if area > 0.0 {
                area_up += area;
            } else {
                area_down -= area;
            }
        }
    }
    let flip_faces = area_down > area_up;

    for f in chart.face_ids() {
        let edges = chart.face_edges(f);
        let mut a = match &ctx.abf_alpha {
            Some(alpha) => edges.map(|e| alpha[e.index()]),
            None => chart.face_angles(f),
        };
        let mut v = chart.face_verts(f);

        if flip_faces {
            a.swap(1, 2);
            v.swap(1, 2);
        }

        // Put the corner with the largest sine in slot 3
        let mut s = a.map(f64::sin);
        let sinmax = s[0].max(s[1]).max(s[2]);
        if s[2] != sinmax {
            a.rotate_right(1);
            v.rotate_right(1);
            s.rotate_right(1);
            if s[1] == sinmax {
                a.rotate_right(1);
                v.rotate_right(1);
                s.rotate_right(1);
            }
        }

        let ratio = if s[2] == 0.0 { 1.0 } else { s[1] / s[2] };
        let cosine = a[0].cos() * ratio;
        let sine = s[0] * ratio;

        let [u1, u2, u3] = v.map(|v| 2 * v.index());
        let [v1, v2, v3] = v.map(|v| 2 * v.index() + 1);
        system.add_row(
            &[(u1, cosine - 1.0), (v1, -sine), (u2, -cosine), (v2, sine), (u3, 1.0)],
            0.0,
        );
        system.add_row(
            &[(u1, sine), (v1, cosine - 1.0), (u2, -sine), (v2, -cosine), (v3, 1.0)],
            0.0,
        );
    }

    let solution = system.solve("LSCM").and_then(|x| {
        if x.iter().all(|c| c.is_finite()) {
            Ok(x)
        } else {
            Err(ParamError::NonFinite { context: "LSCM" })
        }
    });

    match solution {
        Ok(x) => {
            for v in chart.vert_ids() {
                chart.vert_mut(v).uv = Point2::new(x[2 * v.index()], x[2 * v.index() + 1]);
            }
            Ok(())
        }
        Err(err) => {
            chart.uv_zero();
            Err(err)
        }
    }
}

/// Post-process a successful solve.
///
/// A chart with a single pin is rescaled to its previous UV area and moved so
/// the pin stays in place. A chart laid out by automatic pins is rotated to
/// its minimum-area bounding rectangle and scaled so its outer boundary is
/// as long in UV space as it is in 3D.
pub fn lscm_finish(chart: &mut Chart, ctx: &LscmContext) {
    if let Some(pin) = ctx.single_pin {
        transform_single_pin(chart, pin, ctx.area_uv, ctx.origin);
    } else if !ctx.nopack {
        rotate_minimum_area(chart);
        match_boundary_length(chart);
    }
}

/// Scale the chart about the origin so the UV length of its outer boundary
/// equals the 3D length.
///
/// Automatic pins only fix two points, so the solved chart can come out
/// larger or smaller than the surface it flattens.
pub fn match_boundary_length(chart: &mut Chart) {
    let Some(outer) = chart.boundaries().outer else {
        return;
    };
    let (mut len3, mut len2) = (0.0, 0.0);
    for e in chart.boundary_loop(outer) {
        len3 += chart.edge_length(e);
        len2 += chart.edge_uv_length(e);
    }
    if len2 > 0.0 && len3 > 0.0 {
        chart.uv_scale(len3 / len2);
    } else {
        log::debug!("skipping boundary length match: zero length boundary");
    }
}

/// Rotate the chart so its minimum-area enclosing rectangle is axis aligned.
///
/// Only the outer boundary matters for the hull. Charts without a boundary
/// or with fewer than two boundary points are left as they are.
pub fn rotate_minimum_area(chart: &mut Chart) {
    let Some(outer) = chart.boundaries().outer else {
        return;
    };
    let points: Vec<Point2<f64>> = chart
        .boundary_loop(outer)
        .into_iter()
        .map(|e| chart.vert(chart.edge_vert(e)).uv)
        .collect();

    match minimum_area_angle(&points) {
        Ok(angle) => chart.uv_transform(Rotation2::new(angle).matrix()),
        Err(err) => log::debug!("skipping minimum area rotation: {err}"),
    }
}

fn transform_single_pin(chart: &mut Chart, pin: VertId, area_uv: f64, origin: Point2<f64>) {
    let new_area = chart.uv_area();
    if new_area > 0.0 {
        let scale = area_uv / new_area;
        if scale > 0.0 {
            chart.uv_scale(scale.sqrt());
        }
    }

    let offset: Vector2<f64> = origin - chart.vert(pin).uv;
    chart.uv_translate(offset);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::testing::create_grid_chart;
    use nalgebra::Point3;

    fn assert_uv_matches_xy(chart: &Chart, tol: f64) {
        for v in chart.verts() {
            let err = (v.uv - Point2::new(v.co.x, v.co.y)).norm();
            assert!(err < tol, "uv {:?} vs co {:?}", v.uv, v.co);
        }
    }

    #[test]
    fn test_lscm_reproduces_flat_grid() {
        let mut chart = create_grid_chart(3);
        let mut ctx = lscm_begin(&mut chart, &LscmOptions::default().with_abf(false)).unwrap();
        assert!(ctx.pins.is_some());
        assert!(!ctx.nopack);

        lscm_solve(&mut chart, &mut ctx).unwrap();
        assert_uv_matches_xy(&chart, 1e-8);
    }

    #[test]
    fn test_lscm_with_abf_reproduces_flat_grid() {
        let mut chart = create_grid_chart(3);
        let mut ctx = lscm_begin(&mut chart, &LscmOptions::default()).unwrap();
        assert!(ctx.abf_alpha.is_some());

        lscm_solve(&mut chart, &mut ctx).unwrap();
        assert_uv_matches_xy(&chart, 1e-6);
    }

    #[test]
    fn test_user_pins_are_kept() {
        let mut chart = create_grid_chart(2);
        let (a, b) = (VertId::new(0), VertId::new(chart.num_verts() - 1));
        for (v, uv) in [(a, Point2::new(1.0, 1.0)), (b, Point2::new(3.0, 1.0))] {
            chart.vert_mut(v).flag.insert(VertFlags::PIN);
            chart.vert_mut(v).uv = uv;
        }

        let mut ctx = lscm_begin(&mut chart, &LscmOptions::default().with_abf(false)).unwrap();
        assert!(ctx.pins.is_none());
        assert!(ctx.nopack);

        lscm_solve(&mut chart, &mut ctx).unwrap();
        assert_eq!(chart.vert(a).uv, Point2::new(1.0, 1.0));
        assert_eq!(chart.vert(b).uv, Point2::new(3.0, 1.0));
        for f in chart.face_ids() {
            assert!(chart.face_uv_area_signed(f) > 0.0);
        }
    }

    #[test]
    fn test_live_skips_charts_without_selected_pins() {
        let mut chart = create_grid_chart(1);
        assert!(lscm_begin(&mut chart, &LscmOptions::live()).is_none());

        // A selected pin with something left unselected is solved
        let v = VertId::new(0);
        chart.vert_mut(v).flag.insert(VertFlags::PIN | VertFlags::SELECT);
        assert!(lscm_begin(&mut chart, &LscmOptions::live()).is_some());
    }

    #[test]
    fn test_single_pin_keeps_area_and_position() {
        let mut chart = create_grid_chart(2);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(2.0 * co.x, 2.0 * co.y);
        }
        // The centre vertex is never an automatic pin
        let pin = chart
            .vert_ids()
            .find(|&v| chart.vert(v).co == Point3::new(1.0, 1.0, 0.0))
            .unwrap();
        chart.vert_mut(pin).flag.insert(VertFlags::PIN);

        let mut ctx = lscm_begin(&mut chart, &LscmOptions::default().with_abf(false)).unwrap();
        assert_eq!(ctx.single_pin, Some(pin));
        assert!((ctx.area_uv - 16.0).abs() < 1e-12);

        chart.vert_mut(pin).uv = Point2::new(5.0, 5.0);
        lscm_solve(&mut chart, &mut ctx).unwrap();
        lscm_finish(&mut chart, &ctx);

        assert!((chart.uv_area() - 16.0).abs() < 1e-8);
        assert!((chart.vert(pin).uv - Point2::new(5.0, 5.0)).norm() < 1e-12);
    }

    #[test]
    fn test_rotate_minimum_area_aligns_chart() {
        let mut chart = create_grid_chart(2);
        let rot = Rotation2::new(0.4);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = rot * Point2::new(2.0 * co.x, co.y);
        }

        rotate_minimum_area(&mut chart);
        let (min, max) = chart.uv_bbox();
        let area = (max.x - min.x) * (max.y - min.y);
        assert!((area - 8.0).abs() < 1e-9, "bbox area {area}");
    }

    #[test]
    fn test_auto_pinned_chart_keeps_boundary_length() {
        let mut chart = create_grid_chart(2);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(3.0 * co.x, 3.0 * co.y);
        }

        lscm_finish(&mut chart, &LscmContext::default());
        for e in chart.edge_ids() {
            let ratio = chart.edge_uv_length(e) / chart.edge_length(e);
            assert!((ratio - 1.0).abs() < 1e-12, "ratio {ratio}");
        }
    }

    #[test]
    fn test_user_pinned_chart_is_not_rescaled() {
        let mut chart = create_grid_chart(2);
        for v in chart.vert_ids() {
            let co = chart.vert(v).co;
            chart.vert_mut(v).uv = Point2::new(3.0 * co.x, 3.0 * co.y);
        }

        let ctx = LscmContext {
            nopack: true,
            ..LscmContext::default()
        };
        lscm_finish(&mut chart, &ctx);
        for v in chart.verts() {
            assert_eq!(v.uv, Point2::new(3.0 * v.co.x, 3.0 * v.co.y));
        }
    }
}
