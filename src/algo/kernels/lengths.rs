//! Per-face edge lengths.

use nalgebra::Point;
use rayon::prelude::*;

use super::FACE_GRAIN;

/// Squared lengths of the three edges of every face.
///
/// Column `i` holds the edge opposite corner `i`: `[1,2]`, `[2,0]`, `[0,1]`.
pub fn squared_edge_lengths<const D: usize>(
    vertices: &[Point<f64, D>],
    faces: &[[usize; 3]],
) -> Vec<[f64; 3]> {
    faces
        .par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|f| {
            [
                (vertices[f[1]] - vertices[f[2]]).norm_squared(),
                (vertices[f[2]] - vertices[f[0]]).norm_squared(),
                (vertices[f[0]] - vertices[f[1]]).norm_squared(),
            ]
        })
        .collect()
}

/// Lengths of the three edges of every face, same column order as
/// [`squared_edge_lengths`].
pub fn edge_lengths<const D: usize>(
    vertices: &[Point<f64, D>],
    faces: &[[usize; 3]],
) -> Vec<[f64; 3]> {
    squared_edge_lengths(vertices, faces)
        .into_par_iter()
        .with_min_len(FACE_GRAIN)
        .map(|l| [l[0].sqrt(), l[1].sqrt(), l[2].sqrt()])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Point3};

    #[test]
    fn test_column_convention() {
        // Right triangle with legs 3 (x) and 4 (y)
        let v = vec![
            Point2::new(0.0, 0.0),
            Point2::new(3.0, 0.0),
            Point2::new(0.0, 4.0),
        ];
        let l = edge_lengths(&v, &[[0, 1, 2]]);

        assert!((l[0][0] - 5.0).abs() < 1e-12); // [1,2]
        assert!((l[0][1] - 4.0).abs() < 1e-12); // [2,0]
        assert!((l[0][2] - 3.0).abs() < 1e-12); // [0,1]
    }

    #[test]
    fn test_squared_3d() {
        let v = vec![
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(1.0, 1.0, 1.0),
            Point3::new(0.0, 0.0, 2.0),
        ];
        let l = squared_edge_lengths(&v, &[[0, 1, 2]]);
        assert_eq!(l[0], [3.0, 4.0, 3.0]);
    }
}
