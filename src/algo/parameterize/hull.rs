//! Convex hull and minimum-area bounding rectangle of 2D point sets.

use std::cmp::Ordering;
use std::f64::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use nalgebra::{Point2, Vector2};

use crate::error::{ParamError, Result};

/// A convex hull as indices into the input points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvexHull {
    /// Hull points: the upper chain left to right, then the lower chain back.
    pub points: Vec<usize>,
    /// Position of the rightmost point in `points`.
    pub right: usize,
}

#[inline]
fn area_signed(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    0.5 * ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y))
}

/// Angle at `b` between the rays towards `a` and `c`.
fn angle_2d(a: &Point2<f64>, b: &Point2<f64>, c: &Point2<f64>) -> f64 {
    let (Some(u), Some(v)) = ((a - b).try_normalize(0.0), (c - b).try_normalize(0.0)) else {
        return 0.0;
    };
    if u.dot(&v) >= 0.0 {
        2.0 * ((v - u).norm() / 2.0).min(1.0).asin()
    } else {
        PI - 2.0 * ((v + u).norm() / 2.0).min(1.0).asin()
    }
}

/// Monotone chain convex hull.
///
/// # Errors
///
/// Returns [`ParamError::TooFewPoints`] for fewer than 2 points.
pub fn convex_hull(points: &[Point2<f64>]) -> Result<ConvexHull> {
    if points.len() < 2 {
        return Err(ParamError::TooFewPoints {
            required: 2,
            found: points.len(),
        });
    }

    let mut order: Vec<usize> = (0..points.len()).collect();
    order.sort_by(|&a, &b| {
        let (pa, pb) = (&points[a], &points[b]);
        pa.x.partial_cmp(&pb.x)
            .unwrap_or(Ordering::Equal)
            .then(pa.y.partial_cmp(&pb.y).unwrap_or(Ordering::Equal))
    });

    let mut upper: Vec<usize> = Vec::with_capacity(order.len());
    let mut lower: Vec<usize> = Vec::with_capacity(order.len());
    for &i in &order {
        let p = &points[i];
        while upper.len() > 1
            && area_signed(&points[upper[upper.len() - 2]], p, &points[upper[upper.len() - 1]]) <= 0.0
        {
            upper.pop();
        }
        while lower.len() > 1
            && area_signed(&points[lower[lower.len() - 2]], p, &points[lower[lower.len() - 1]]) >= 0.0
        {
            lower.pop();
        }
        upper.push(i);
        lower.push(i);
    }

    let right = upper.len() - 1;
    let mut hull = upper;
    // The end points of the lower chain are already in the upper one
    if lower.len() > 2 {
        hull.extend(lower[1..lower.len() - 1].iter().rev());
    }

    Ok(ConvexHull {
        points: hull,
        right,
    })
}

/// Intersection of the line through `p1` along `d1` with the line through
/// `p2` along `d2`.
fn intersect_lines(p1: &Point2<f64>, d1: &Vector2<f64>, p2: &Point2<f64>, d2: &Vector2<f64>) -> Option<Point2<f64>> {
    let div = d2.x * d1.y - d2.y * d1.x;
    if div == 0.0 {
        return None;
    }
    let lambda = ((p1.y - p2.y) * d1.x - (p1.x - p2.x) * d1.y) / div;
    Some(Point2::new(p1.x + lambda * d2.x, p1.y + lambda * d2.y))
}

/// Area of the rectangle with one side through `p1` along `dir` and the
/// other three sides through `p2`, `p3`, `p4`.
fn rectangle_area(
    p1: &Point2<f64>,
    dir: &Vector2<f64>,
    p2: &Point2<f64>,
    p3: &Point2<f64>,
    p4: &Point2<f64>,
) -> f64 {
    let ortho = Vector2::new(dir.y, -dir.x);
    let corners = (
        intersect_lines(p1, dir, p2, &ortho),
        intersect_lines(p1, dir, p4, &ortho),
        intersect_lines(p3, dir, p4, &ortho),
    );
    match corners {
        (Some(c1), Some(c2), Some(c3)) => (c1 - c2).norm() * (c2 - c3).norm(),
        _ => 1e10,
    }
}

/// Rotation angle that aligns the minimum-area enclosing rectangle of the
/// points with the axes, found with four rotating calipers.
///
/// The result lies in `(-π/4, π/4]` so the rotation stays small.
pub fn minimum_area_angle(points: &[Point2<f64>]) -> Result<f64> {
    let hull = convex_hull(points)?;
    let pts: Vec<Point2<f64>> = hull.points.iter().map(|&i| points[i]).collect();
    let n = pts.len();

    let mut angles = vec![0.0; n];
    let (mut i_min, mut i_max) = (0, 0);
    let (mut miny, mut maxy) = (f64::INFINITY, f64::NEG_INFINITY);
    for i in 0..n {
        let p1 = &pts[(i + n - 1) % n];
        let p3 = &pts[(i + 1) % n];
        angles[i] = PI - angle_2d(p1, &pts[i], p3);
        if pts[i].y < miny {
            miny = pts[i].y;
            i_min = i;
        }
        if pts[i].y > maxy {
            maxy = pts[i].y;
            i_max = i;
        }
    }

    // Left, top, right, bottom
    let mut idx = [0, i_max, hull.right, i_min];
    let probes = [
        Vector2::new(0.0, 1.0),
        Vector2::new(1.0, 0.0),
        Vector2::new(0.0, -1.0),
        Vector2::new(-1.0, 0.0),
    ];
    let mut a = [0.0; 4];
    for k in 0..4 {
        let p = &pts[idx[k]];
        a[k] = angle_2d(&pts[(idx[k] + 1) % n], p, &(p + probes[k]));
    }

    let mut rotated = 0.0;
    let mut minarea = f64::INFINITY;
    let mut minangle = 0.0;

    while rotated <= FRAC_PI_2 {
        // Advance the caliper with the smallest angle
        let (k, mina) = a
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::INFINITY), |best, (k, x)| if x < best.1 { (k, x) } else { best });
        if !mina.is_finite() {
            break;
        }

        rotated += mina;
        let next = (idx[k] + 1) % n;
        a[k] = angles[next];
        for j in 1..4 {
            a[(k + j) % 4] -= mina;
        }

        let p1 = &pts[idx[k]];
        let p1n = &pts[next];
        if let Some(dir) = (p1n - p1).try_normalize(0.0) {
            let area = rectangle_area(
                p1,
                &dir,
                &pts[idx[(k + 1) % 4]],
                &pts[idx[(k + 2) % 4]],
                &pts[idx[(k + 3) % 4]],
            );
            if area < minarea {
                minarea = area;
                minangle = rotated;
            }
        }

        idx[k] = next;
    }

    if minangle > FRAC_PI_4 {
        minangle -= FRAC_PI_2;
    }
    Ok(minangle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Rotation2;

    #[test]
    fn test_hull_drops_interior_points() {
        let pts = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.5, 0.5),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let hull = convex_hull(&pts).unwrap();
        assert_eq!(hull.points.len(), 4);
        assert!(!hull.points.contains(&2));
        assert_eq!(pts[hull.points[hull.right]].x, 1.0);
    }

    #[test]
    fn test_hull_needs_two_points() {
        assert_eq!(
            convex_hull(&[Point2::origin()]),
            Err(ParamError::TooFewPoints { required: 2, found: 1 })
        );
    }

    #[test]
    fn test_minimum_area_aligns_rotated_rectangle() {
        let rot = Rotation2::new(0.3);
        let rect = [
            Point2::new(0.0, 0.0),
            Point2::new(4.0, 0.0),
            Point2::new(4.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let rotated: Vec<_> = rect.iter().map(|p| rot * p).collect();

        let angle = minimum_area_angle(&rotated).unwrap();
        let back = Rotation2::new(angle);
        let (mut min, mut max) = (Point2::new(f64::MAX, f64::MAX), Point2::new(f64::MIN, f64::MIN));
        for p in &rotated {
            let q = back * p;
            min = min.inf(&q);
            max = max.sup(&q);
        }
        let area = (max.x - min.x) * (max.y - min.y);
        assert!((area - 4.0).abs() < 1e-6, "bbox area {area}");
    }

    #[test]
    fn test_axis_aligned_square_needs_no_rotation() {
        let square = [
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(1.0, 1.0),
            Point2::new(0.0, 1.0),
        ];
        let angle = minimum_area_angle(&square).unwrap();
        assert!(angle.abs() < 1e-9 || (angle.abs() - FRAC_PI_2).abs() < 1e-9);
    }
}
