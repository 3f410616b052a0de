//! Arranging solved charts into one UV atlas.
//!
//! - [`pack_charts`]: optionally turn each chart to its tightest bounding
//!   rectangle, move charts next to each other without overlap and scale
//!   the result into the unit square
//! - [`average_charts`]: give every chart the same UV-to-3D area ratio
//!
//! # Example
//!
//! ```
//! use unfold::algo::pack::{pack_charts, PackOptions};
//! use unfold::mesh::Chart;
//!
//! let mut charts: Vec<Chart> = Vec::new();
//! let mut refs: Vec<&mut Chart> = charts.iter_mut().collect();
//! pack_charts(&mut refs, &PackOptions::default().with_margin(0.1));
//! ```

mod boxpack;

pub use boxpack::{boxpack2d, PackBox};

use nalgebra::{Point2, Rotation2, Vector2};

use crate::algo::parameterize::minimum_area_angle;
use crate::mesh::Chart;

/// Options for [`pack_charts`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PackOptions {
    /// Space between charts, relative to their size. `1.0` leaves a gap of
    /// a tenth of the summed chart extents.
    pub margin: f64,

    /// Rotate each chart to its minimum-area bounding rectangle first.
    pub rotate: bool,
}

impl PackOptions {
    /// Set the margin.
    pub fn with_margin(mut self, margin: f64) -> Self {
        self.margin = margin;
        self
    }

    /// Enable or disable per-chart rotation.
    pub fn with_rotate(mut self, rotate: bool) -> Self {
        self.rotate = rotate;
        self
    }
}

/// Rotate a chart so the minimum-area rectangle around all of its UVs is
/// axis aligned.
pub fn rotate_to_fit(chart: &mut Chart) {
    let points: Vec<Point2<f64>> = chart.verts().map(|v| v.uv).collect();
    match minimum_area_angle(&points) {
        Ok(angle) if angle != 0.0 => chart.uv_transform(Rotation2::new(angle).matrix()),
        Ok(_) => {}
        Err(err) => log::debug!("not rotating chart for packing: {err}"),
    }
}

/// Pack charts into the unit square.
///
/// Each chart is rotated when [`PackOptions::rotate`] is set, moved to the
/// origin, padded by the margin and placed with [`boxpack2d`]. The whole
/// layout is then scaled by `1 / max(width, height)`.
pub fn pack_charts(charts: &mut [&mut Chart], options: &PackOptions) {
    if charts.is_empty() {
        return;
    }

    if options.rotate {
        for chart in charts.iter_mut() {
            rotate_to_fit(chart);
        }
    }

    let mut boxes = Vec::with_capacity(charts.len());
    let mut extent = 0.0;
    for (i, chart) in charts.iter_mut().enumerate() {
        let (min, max) = chart.uv_bbox();
        chart.uv_translate(-min.coords);
        let (w, h) = (max.x - min.x, max.y - min.y);
        extent += (w * h).sqrt();
        boxes.push(PackBox::new(w, h, i));
    }

    if options.margin > 0.0 {
        // Relative to the chart sizes so repeated packing is stable
        let margin = options.margin * extent * 0.1;
        for (chart, b) in charts.iter_mut().zip(&mut boxes) {
            chart.uv_translate(Vector2::new(margin, margin));
            b.w += 2.0 * margin;
            b.h += 2.0 * margin;
        }
    }

    let (tot_w, tot_h) = boxpack2d(&mut boxes);
    let size = tot_w.max(tot_h);
    let scale = if size > 0.0 { 1.0 / size } else { 1.0 };
    log::debug!("packed {} charts into {tot_w:.4} x {tot_h:.4}", boxes.len());

    for b in &boxes {
        let chart = &mut charts[b.index];
        chart.uv_translate(Vector2::new(b.x, b.y));
        chart.uv_scale(scale);
    }
}

/// Scale charts so they all have the same ratio of UV area to 3D area,
/// keeping the total UV area. Each chart keeps its bounding box centre.
pub fn average_charts(charts: &mut [&mut Chart]) {
    if charts.is_empty() {
        return;
    }

    let areas: Vec<(f64, f64)> = charts.iter().map(|c| (c.area(), c.uv_area())).collect();
    let tot_3d: f64 = areas.iter().map(|a| a.0).sum();
    let tot_uv: f64 = areas.iter().map(|a| a.1).sum();
    if tot_3d == 0.0 || tot_uv == 0.0 {
        return;
    }
    let tot_fac = tot_3d / tot_uv;

    for (chart, &(area_3d, area_uv)) in charts.iter_mut().zip(&areas) {
        if area_3d == 0.0 || area_uv == 0.0 {
            continue;
        }
        let (min, max) = chart.uv_bbox();
        let origin = nalgebra::center(&min, &max);

        let fac = area_3d / area_uv;
        chart.uv_scale((fac / tot_fac).sqrt());

        let (min, max) = chart.uv_bbox();
        chart.uv_translate(origin - nalgebra::center(&min, &max));
    }
}
