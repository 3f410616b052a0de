//! Moving an initial layout onto its pins.
//!
//! A freshly initialized map lives on the unit disk and knows nothing about
//! where the user pinned vertices. Before SLIM runs, the whole map is moved
//! by the similarity transform that best carries the initial pin positions
//! onto their targets, so the solver starts close to the constrained
//! optimum instead of dragging the chart across the plane.
//!
//! During live solves pins are re-read from the host after every step;
//! [`adjust_pins`] merges them with the targets the solver already has.

use nalgebra::{Matrix2, Point2, Rotation2, Vector2};

use super::SlimData;

/// Pins gathered from the host for one live iteration.
#[derive(Debug, Clone, Default)]
pub struct PinnedVertexData {
    /// Pinned vertex indices.
    pub pinned_vertex_indices: Vec<usize>,
    /// Current UV of each pinned vertex, parallel to the indices.
    pub pinned_vertex_positions: Vec<Point2<f64>>,
    /// Pinned vertices the user is dragging.
    pub selected_pins: Vec<usize>,
}

impl PinnedVertexData {
    /// Forget all pins.
    pub fn clear(&mut self) {
        self.pinned_vertex_indices.clear();
        self.pinned_vertex_positions.clear();
        self.selected_pins.clear();
    }

    /// Add a pin.
    pub fn push(&mut self, index: usize, position: Point2<f64>, selected: bool) {
        self.pinned_vertex_indices.push(index);
        self.pinned_vertex_positions.push(position);
        if selected {
            self.selected_pins.push(index);
        }
    }
}

/// Apply `uv ↦ t · uv + translation` to the whole map.
fn apply(data: &mut SlimData, t: &Matrix2<f64>, translation: Vector2<f64>) {
    for p in &mut data.v_o {
        *p = Point2::from(t * p.coords + translation);
    }
}

fn centroid(points: &[Point2<f64>]) -> Point2<f64> {
    let sum = points.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords);
    Point2::from(sum / points.len() as f64)
}

/// Move a freshly initialized map onto its pins.
///
/// - One pin: translation.
/// - Two pins: the similarity transform carrying both exactly onto their
///   targets.
/// - More pins: least-squares rotation (Kabsch) and uniform scale. When
///   reflections are allowed and the best fit mirrors the map, the mirror
///   is kept and every face is flipped to stay positively oriented.
///
/// Nothing happens for maps that were not initialized by the solver or have
/// no pins.
pub fn transform_initialization_if_necessary(data: &mut SlimData) {
    if !data.valid || data.skip_initialization || data.b.is_empty() {
        return;
    }

    let init: Vec<Point2<f64>> = data.b.iter().map(|&i| data.v_o[i]).collect();
    let pins = data.bc.clone();

    match init.len() {
        1 => {
            let t = pins[0] - init[0];
            apply(data, &Matrix2::identity(), t);
        }
        2 => {
            let d_init = init[1] - init[0];
            let d_pin = pins[1] - pins[0];
            let len = d_init.norm();
            if len == 0.0 {
                log::debug!("Coincident initial pins, translating only");
                apply(data, &Matrix2::identity(), pins[0] - init[0]);
                return;
            }

            let scale = d_pin.norm() / len;
            let angle = d_init.perp(&d_pin).atan2(d_init.dot(&d_pin));
            let t = Rotation2::new(angle).into_inner() * scale;
            apply(data, &t, pins[0].coords - t * init[0].coords);

            // Exact up to rounding; remove the rounding
            for (&i, target) in data.b.iter().zip(&pins) {
                data.v_o[i] = *target;
            }
        }
        _ => {
            let c_init = centroid(&init);
            let c_pin = centroid(&pins);

            let mut s = Matrix2::zeros();
            for (a, b) in init.iter().zip(&pins) {
                s += (a - c_init) * (b - c_pin).transpose();
            }
            let svd = s.svd(true, true);
            let (u, v) = match (svd.u, svd.v_t) {
                (Some(u), Some(v_t)) => (u, v_t.transpose()),
                _ => return,
            };

            let mut rot = v * u.transpose();
            if rot.determinant() < 0.0 {
                if data.allow_reflection {
                    for f in &mut data.f {
                        f.swap(0, 2);
                    }
                } else {
                    rot = v * Matrix2::from_diagonal(&Vector2::new(1.0, -1.0)) * u.transpose();
                }
            }

            let (mut num, mut den) = (0.0, 0.0);
            for (a, b) in init.iter().zip(&pins) {
                let r = rot * (a - c_init);
                num += r.dot(&(b - c_pin));
                den += r.norm_squared();
            }
            // `rot` maximizes the correlation, so `num` is never negative;
            // zero means the pins carry no shape to fit.
            let scale = if den > 0.0 && num > 0.0 {
                num / den
            } else {
                log::debug!("Degenerate pin fit (num = {num}, den = {den}), keeping scale");
                1.0
            };

            let t = rot * scale;
            apply(data, &t, c_pin.coords - t * c_init.coords);
        }
    }
}

/// Replace the pins of `data` with a fresh set read from the host.
///
/// Pins the user is not dragging keep the target the solver already had for
/// them; new or selected pins take their current position.
pub fn adjust_pins(data: &mut SlimData, pinned: &PinnedVertexData) {
    if !data.valid {
        return;
    }

    let mut new_pins: Vec<(usize, Point2<f64>)> = pinned
        .pinned_vertex_indices
        .iter()
        .copied()
        .zip(pinned.pinned_vertex_positions.iter().copied())
        .collect();
    new_pins.sort_by_key(|&(i, _)| i);
    new_pins.dedup_by_key(|&mut (i, _)| i);
    let mut selected = pinned.selected_pins.clone();
    selected.sort_unstable();

    let old_b = std::mem::take(&mut data.b);
    let old_bc = std::mem::take(&mut data.bc);

    let mut old_ptr = 0;
    let mut sel_ptr = 0;
    for (index, position) in new_pins {
        while old_ptr < old_b.len() && old_b[old_ptr] < index {
            old_ptr += 1;
        }
        while sel_ptr < selected.len() && selected[sel_ptr] < index {
            sel_ptr += 1;
        }
        let had_target = old_ptr < old_b.len() && old_b[old_ptr] == index;
        let is_selected = sel_ptr < selected.len() && selected[sel_ptr] == index;

        data.b.push(index);
        data.bc.push(if had_target && !is_selected {
            old_bc[old_ptr]
        } else {
            position
        });
    }
}
