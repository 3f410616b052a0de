//! Automatic pin selection for LSCM.
//!
//! LSCM needs two fixed vertices. When the user supplied fewer, two are
//! picked here and given initial UVs from the dominant 3D axes.

use nalgebra::Point2;

use crate::mesh::{Chart, EdgeId, VertFlags, VertId};

/// Set the UVs of two pins from their 3D positions.
///
/// The axis along which the pins differ most becomes one UV axis and the
/// second largest becomes the other. Coincident or missing pins fall back to
/// the first two vertices of the chart at `(0, 0.5)` and `(1, 0.5)`.
/// Returns the pins actually used.
pub fn pin_positions(chart: &mut Chart, pins: Option<(VertId, VertId)>) -> Option<(VertId, VertId)> {
    let (pin1, pin2) = match pins {
        Some((a, b)) if a != b => (a, b),
        _ => {
            let f = chart.face_ids().next()?;
            let e = chart.face(f).edge;
            let (a, b) = (chart.edge_vert(e), chart.edge_dest(e));
            chart.vert_mut(a).uv = Point2::new(0.0, 0.5);
            chart.vert_mut(b).uv = Point2::new(1.0, 0.5);
            return Some((a, b));
        }
    };

    let co1 = chart.vert(pin1).co;
    let co2 = chart.vert(pin2).co;
    let sub = (co1 - co2).abs();

    let (dirx, diry) = if sub.x > sub.y && sub.x > sub.z {
        (0, if sub.y > sub.z { 1 } else { 2 })
    } else if sub.y > sub.x && sub.y > sub.z {
        (1, if sub.x > sub.z { 0 } else { 2 })
    } else {
        (2, if sub.x > sub.y { 0 } else { 1 })
    };
    let (diru, dirv) = if dirx == 2 { (1, 0) } else { (0, 1) };

    for (v, co) in [(pin1, co1), (pin2, co2)] {
        let uv = &mut chart.vert_mut(v).uv;
        uv[diru] = co[dirx];
        uv[dirv] = co[diry];
    }
    Some((pin1, pin2))
}

/// Pins on the symmetry axis of a chart that was cut open along a seam.
///
/// Finds the longest run of split vertices along the outer boundary. When it
/// covers at least half the boundary, the first pin is the middle of that run
/// and the second the middle of the rest.
pub fn symmetry_pins(chart: &mut Chart, outer: EdgeId) -> Option<(VertId, VertId)> {
    let is_split = |chart: &Chart, e: EdgeId| {
        chart.vert(chart.edge_vert(e)).flag.contains(VertFlags::SPLIT)
    };

    let loop_len = chart.boundary_loop(outer).len();
    let mut maxlen = 0.0;
    let mut curlen = 0.0;
    let mut totlen = 0.0;
    let mut firstlen = 0.0;
    let mut cure: Option<EdgeId> = None;
    let mut firste1: Option<EdgeId> = None;
    let mut firste2: Option<EdgeId> = None;
    let mut maxe1: Option<EdgeId> = None;
    let mut maxe2: Option<EdgeId> = None;

    let mut be = outer;
    let mut lastbe = chart.boundary_edge_prev(be);
    loop {
        totlen += chart.edge_length(be);
        let nextbe = chart.boundary_edge_next(be);

        if is_split(chart, be) || (is_split(chart, lastbe) && is_split(chart, nextbe)) {
            if cure.is_none() {
                if be == outer {
                    firste1 = Some(be);
                }
                cure = Some(be);
            } else {
                curlen += chart.edge_length(lastbe);
            }
        } else if let Some(c) = cure {
            if curlen > maxlen {
                maxlen = curlen;
                maxe1 = Some(c);
                maxe2 = Some(lastbe);
            }
            if firste1 == Some(c) {
                firstlen = curlen;
                firste2 = Some(lastbe);
            }
            curlen = 0.0;
            cure = None;
        }

        lastbe = be;
        be = nextbe;
        if be == outer {
            break;
        }
    }

    // A run wrapping over the starting edge
    if let Some(c) = cure.filter(|&c| c != outer) {
        firstlen += curlen + chart.edge_length(be);
        if firstlen > maxlen {
            maxlen = firstlen;
            maxe1 = Some(c);
            maxe2 = firste2;
        }
    }

    let (maxe1, maxe2) = (maxe1?, maxe2?);
    if maxlen < 0.5 * totlen {
        return None;
    }

    // Walk towards each other from both ends, inside then outside the run
    let limit = 2 * loop_len + 2;
    let meet = |inside: bool| -> Option<VertId> {
        let (mut be1, mut be2) = (maxe1, maxe2);
        let (mut len1, mut len2) = (0.0, 0.0);
        for _ in 0..limit {
            if len1 < len2 {
                if inside {
                    len1 += chart.edge_length(be1);
                    be1 = chart.boundary_edge_next(be1);
                } else {
                    be1 = chart.boundary_edge_prev(be1);
                    len1 += chart.edge_length(be1);
                }
            } else if inside {
                be2 = chart.boundary_edge_prev(be2);
                len2 += chart.edge_length(be2);
            } else {
                len2 += chart.edge_length(be2);
                be2 = chart.boundary_edge_next(be2);
            }
            if be1 == be2 {
                return Some(chart.edge_vert(be1));
            }
        }
        None
    };

    let pin1 = meet(true)?;
    let pin2 = meet(false)?;

    let (pin1, pin2) = pin_positions(chart, Some((pin1, pin2)))?;
    (chart.vert(pin1).co != chart.vert(pin2).co).then_some((pin1, pin2))
}

/// The lowest and highest vertex along the axis where the chart is longest.
pub fn extrema_verts(chart: &mut Chart) -> Option<(VertId, VertId)> {
    let mut minv = [f64::INFINITY; 3];
    let mut maxv = [f64::NEG_INFINITY; 3];
    let mut minvert: [Option<VertId>; 3] = [None; 3];
    let mut maxvert: [Option<VertId>; 3] = [None; 3];

    for v in chart.vert_ids() {
        let co = chart.vert(v).co;
        for i in 0..3 {
            if co[i] < minv[i] {
                minv[i] = co[i];
                minvert[i] = Some(v);
            }
            if co[i] > maxv[i] {
                maxv[i] = co[i];
                maxvert[i] = Some(v);
            }
        }
    }

    let mut dir = 0;
    let mut dirlen = -1.0;
    for i in 0..3 {
        if maxv[i] - minv[i] > dirlen {
            dir = i;
            dirlen = maxv[i] - minv[i];
        }
    }

    let pins = minvert[dir].zip(maxvert[dir]);
    pin_positions(chart, pins)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::{ChartBuilder, FaceInput};
    use nalgebra::Point3;

    fn strip() -> Chart {
        // Two triangles spanning x in [0, 4], y in [0, 1], tilted in z
        let co = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(4.0, 0.0, 0.5),
            Point3::new(4.0, 1.0, 0.5),
            Point3::new(0.0, 1.0, 0.0),
        ];
        let uv = vec![Point2::origin(); 6];
        let mut builder = ChartBuilder::new();
        builder
            .add_face(&FaceInput::new(0, &[0, 1, 2], &[co[0], co[1], co[2]], &[0, 1, 2]), &uv)
            .unwrap();
        builder
            .add_face(&FaceInput::new(1, &[0, 2, 3], &[co[0], co[2], co[3]], &[3, 4, 5]), &uv)
            .unwrap();
        builder.end(&uv, 1.0, false, false).charts.remove(0).mesh
    }

    #[test]
    fn test_extrema_use_longest_axis() {
        let mut chart = strip();
        let (a, b) = extrema_verts(&mut chart).unwrap();
        assert_eq!(chart.vert(a).co.x, 0.0);
        assert_eq!(chart.vert(b).co.x, 4.0);

        // x maps to u, the second largest axis (y) to v
        assert_eq!(chart.vert(a).uv, Point2::new(0.0, 0.0));
        assert_eq!(chart.vert(b).uv, Point2::new(4.0, 0.0));
    }

    #[test]
    fn test_degenerate_pins_fall_back() {
        let mut chart = strip();
        let v = chart.vert_ids().next().unwrap();
        let (a, b) = pin_positions(&mut chart, Some((v, v))).unwrap();
        assert_ne!(a, b);
        assert_eq!(chart.vert(a).uv, Point2::new(0.0, 0.5));
        assert_eq!(chart.vert(b).uv, Point2::new(1.0, 0.5));
    }

    #[test]
    fn test_z_dominant_pins_swap_axes() {
        let co = [
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.5, 0.0, 3.0),
            Point3::new(0.0, 0.2, 1.0),
        ];
        let uv = vec![Point2::origin(); 3];
        let mut builder = ChartBuilder::new();
        builder
            .add_face(&FaceInput::new(0, &[0, 1, 2], &co, &[0, 1, 2]), &uv)
            .unwrap();
        let mut chart = builder.end(&uv, 1.0, false, false).charts.remove(0).mesh;

        let (_, b) = extrema_verts(&mut chart).unwrap();
        // z is the dominant axis and lands in v; x is second and lands in u
        assert_eq!(chart.vert(b).uv, Point2::new(0.5, 3.0));
    }

    #[test]
    fn test_no_split_run_gives_no_symmetry_pins() {
        let mut chart = strip();
        let outer = chart.boundaries().outer.unwrap();
        assert!(symmetry_pins(&mut chart, outer).is_none());
    }
}
