//! Flip-avoiding line search.
//!
//! Moving a triangle's vertices linearly from `x` to `x + t·d` changes its
//! signed area by a quadratic in `t`. The smallest positive root is the first
//! step at which the triangle degenerates; staying below it on every face
//! keeps the map free of new flips.
//!
//! # References
//!
//! - Smith, J., & Schaefer, S. (2015). "Bijective parameterization with free
//!   boundaries." ACM TOG.

use nalgebra::Point2;
use rayon::prelude::*;

use crate::algo::kernels::FACE_GRAIN;

/// Halvings tried before giving up on a step.
pub const MAX_STEP_SIZE_ITER: usize = 12;

/// Smallest positive root of `a t² + b t + c`, or infinity.
pub fn smallest_pos_quad_zero(a: f64, b: f64, c: f64) -> f64 {
    if a.abs() > 1e-10 {
        let delta_in = b * b - 4.0 * a * c;
        if delta_in <= 0.0 {
            return f64::INFINITY;
        }
        let delta = delta_in.sqrt();
        // Avoid subtracting two similar numbers
        let (mut t1, mut t2) = if b >= 0.0 {
            let bd = -b - delta;
            (2.0 * c / bd, bd / (2.0 * a))
        } else {
            let bd = -b + delta;
            (bd / (2.0 * a), 2.0 * c / bd)
        };
        if a < 0.0 {
            std::mem::swap(&mut t1, &mut t2);
        }
        if t1 > 0.0 {
            if t2 > 0.0 {
                t2
            } else {
                t1
            }
        } else {
            f64::INFINITY
        }
    } else {
        if b == 0.0 {
            return f64::INFINITY;
        }
        let t = -c / b;
        if t > 0.0 {
            t
        } else {
            f64::INFINITY
        }
    }
}

/// First step along `d` at which face `f` degenerates.
fn min_pos_root(uv: &[Point2<f64>], d: &[Point2<f64>], f: &[usize; 3]) -> f64 {
    let (u1, u2, u3) = (uv[f[0]], uv[f[1]], uv[f[2]]);
    let (v1, v2, v3) = (d[f[0]], d[f[1]], d[f[2]]);

    let a = v1.x * v2.y - v1.y * v2.x - v1.x * v3.y + v1.y * v3.x + v2.x * v3.y - v2.y * v3.x;
    let b = u1.x * v2.y - u1.y * v2.x - u2.x * v1.y + u2.y * v1.x - u1.x * v3.y + u1.y * v3.x
        + u3.x * v1.y
        - u3.y * v1.x
        + u2.x * v3.y
        - u2.y * v3.x
        - u3.x * v2.y
        + u3.y * v2.x;
    let c = u1.x * u2.y - u1.y * u2.x - u1.x * u3.y + u1.y * u3.x + u2.x * u3.y - u2.y * u3.x;

    smallest_pos_quad_zero(a, b, c)
}

/// Largest step along `d` that no face survives, over all faces.
pub fn max_step_from_singularities(uv: &[Point2<f64>], faces: &[[usize; 3]], d: &[Point2<f64>]) -> f64 {
    faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| min_pos_root(uv, d, f))
        .reduce(|| f64::INFINITY, f64::min)
}

/// Backtracking search along `d` starting at `step`.
///
/// The step is halved until the energy drops below `cur_energy`, at most
/// [`MAX_STEP_SIZE_ITER`] times. `x` is only moved to accepted positions.
/// Returns the energy at the final `x`.
pub fn line_search<E>(x: &mut Vec<Point2<f64>>, d: &[Point2<f64>], mut step: f64, energy: E, cur_energy: f64) -> f64
where
    E: Fn(&[Point2<f64>]) -> f64,
{
    let old_energy = if cur_energy > 0.0 { cur_energy } else { energy(x) };
    let mut new_energy = old_energy;

    let mut iter = 0;
    while new_energy >= old_energy && iter < MAX_STEP_SIZE_ITER {
        let candidate: Vec<Point2<f64>> = x.iter().zip(d).map(|(p, dp)| p + dp.coords * step).collect();
        let e = energy(&candidate);
        if e >= old_energy {
            step /= 2.0;
        } else {
            *x = candidate;
            new_energy = e;
        }
        iter += 1;
    }
    new_energy
}

/// Move `cur` towards `dst` as far as the energy improves without any
/// triangle degenerating. The step is capped at `min(1, 0.8 · first root)`.
pub fn flip_avoiding_line_search<E>(
    faces: &[[usize; 3]],
    cur: &mut Vec<Point2<f64>>,
    dst: &[Point2<f64>],
    energy: E,
    cur_energy: f64,
) -> f64
where
    E: Fn(&[Point2<f64>]) -> f64,
{
    let d: Vec<Point2<f64>> = cur.iter().zip(dst).map(|(c, t)| Point2::from(t - c)).collect();
    let min_step_to_singularity = max_step_from_singularities(cur, faces, &d);
    let max_step = (min_step_to_singularity * 0.8).min(1.0);
    line_search(cur, &d, max_step, energy, cur_energy)
}

/// Number of faces with non-positive signed area.
pub fn count_flips(faces: &[[usize; 3]], uv: &[Point2<f64>]) -> usize {
    faces
        .iter()
        .filter(|f| {
            let e1 = uv[f[1]] - uv[f[0]];
            let e2 = uv[f[2]] - uv[f[0]];
            e1.perp(&e2) <= 0.0
        })
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quadratic_roots() {
        // (t - 1)(t - 3)
        assert!((smallest_pos_quad_zero(1.0, -4.0, 3.0) - 1.0).abs() < 1e-12);
        // (t + 1)(t - 2), only one positive root
        assert!((smallest_pos_quad_zero(1.0, -1.0, -2.0) - 2.0).abs() < 1e-12);
        // No real roots
        assert_eq!(smallest_pos_quad_zero(1.0, 0.0, 1.0), f64::INFINITY);
        // Linear: 2t - 1
        assert!((smallest_pos_quad_zero(0.0, 2.0, -1.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_collapsing_vertex_limits_step() {
        let uv = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        // The apex moves straight down through the base at t = 0.5
        let d = vec![Point2::origin(), Point2::origin(), Point2::new(0.0, -2.0)];
        let t = max_step_from_singularities(&uv, &[[0, 1, 2]], &d);
        assert!((t - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_line_search_never_flips() {
        let faces = [[0, 1, 2]];
        let mut cur = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, 1.0)];
        let dst = vec![Point2::new(0.0, 0.0), Point2::new(1.0, 0.0), Point2::new(0.0, -1.0)];
        // An energy that always prefers moving down
        let energy = |x: &[Point2<f64>]| 10.0 + x[2].y;

        let e = flip_avoiding_line_search(&faces, &mut cur, &dst, energy, 0.0);
        assert!(e < 11.0);
        assert_eq!(count_flips(&faces, &cur), 0);
        assert!(cur[2].y > 0.0);
    }

    #[test]
    fn test_line_search_keeps_position_without_improvement() {
        let mut x = vec![Point2::new(0.0, 0.0)];
        let d = vec![Point2::new(1.0, 0.0)];
        let e = line_search(&mut x, &d, 1.0, |p| 1.0 + p[0].x, 1.0);
        assert_eq!(e, 1.0);
        assert_eq!(x[0], Point2::new(0.0, 0.0));
    }
}
