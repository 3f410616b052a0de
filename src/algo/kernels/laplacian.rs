//! Cotangent Laplacian.

use nalgebra::Point;

use super::{doublearea_from_lengths, squared_edge_lengths};
use crate::algo::sparse::CsrMatrix;

/// Half cotangents of the three corner angles of every face, from squared
/// edge lengths (column `i` is the angle at corner `i`).
fn cotangent_entries(sq_lengths: &[[f64; 3]]) -> Vec<[f64; 3]> {
    let lengths: Vec<[f64; 3]> = sq_lengths
        .iter()
        .map(|l| [l[0].sqrt(), l[1].sqrt(), l[2].sqrt()])
        .collect();
    let dbl_area = doublearea_from_lengths(&lengths);

    sq_lengths
        .iter()
        .zip(dbl_area)
        .map(|(l, a)| {
            [
                (l[1] + l[2] - l[0]) / a / 4.0,
                (l[2] + l[0] - l[1]) / a / 4.0,
                (l[0] + l[1] - l[2]) / a / 4.0,
            ]
        })
        .collect()
}

/// Sparse cotangent Laplacian `L` (negative semi-definite).
///
/// Off-diagonal `L[i][j]` is half the sum of the cotangents opposite edge
/// `ij`; each diagonal is minus the sum of its row's off-diagonals.
pub fn cotmatrix<const D: usize>(vertices: &[Point<f64, D>], faces: &[[usize; 3]]) -> CsrMatrix {
    const EDGES: [[usize; 2]; 3] = [[1, 2], [2, 0], [0, 1]];

    let cot = cotangent_entries(&squared_edge_lengths(vertices, faces));
    let mut triplets = Vec::with_capacity(faces.len() * 12);

    for (f, c) in faces.iter().zip(&cot) {
        for (e, [s, d]) in EDGES.iter().enumerate() {
            let source = f[*s];
            let dest = f[*d];
            triplets.push((source, dest, c[e]));
            triplets.push((dest, source, c[e]));
            triplets.push((source, source, -c[e]));
            triplets.push((dest, dest, -c[e]));
        }
    }

    CsrMatrix::from_triplets(vertices.len(), vertices.len(), triplets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{DVector, Point2, Point3};

    fn fan() -> (Vec<Point3<f64>>, Vec<[usize; 3]>) {
        let v = vec![
            Point3::new(0.0, 0.0, 0.3),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(0.2, 1.1, 0.0),
            Point3::new(-0.9, 0.4, 0.1),
            Point3::new(-0.4, -1.0, 0.0),
        ];
        let f = vec![[0, 1, 2], [0, 2, 3], [0, 3, 4], [0, 4, 1]];
        (v, f)
    }

    #[test]
    fn test_rows_sum_to_zero() {
        let (v, f) = fan();
        let l = cotmatrix(&v, &f);
        let ones = DVector::from_element(v.len(), 1.0);
        let sums = l.mul_vec(&ones);
        for s in sums.iter() {
            assert!(s.abs() < 1e-12, "row sum {s}");
        }
    }

    #[test]
    fn test_symmetric_and_nonpositive_diagonal() {
        let (v, f) = fan();
        let l = cotmatrix(&v, &f);
        for (r, c, val) in l.iter() {
            assert!((val - l.get(c, r)).abs() < 1e-12);
            if r == c {
                assert!(val <= 0.0);
            }
        }
    }

    #[test]
    fn test_right_triangle_weights() {
        // Right angle at corner 0: the edge [1,2] gets cot(90) = 0
        let v = vec![
            Point2::new(0.0, 0.0),
            Point2::new(1.0, 0.0),
            Point2::new(0.0, 1.0),
        ];
        let l = cotmatrix(&v, &[[0, 1, 2]]);
        assert!(l.get(1, 2).abs() < 1e-12);
        // 45 degree corners: cot = 1, halved
        assert!((l.get(0, 1) - 0.5).abs() < 1e-12);
        assert!((l.get(0, 0) + 1.0).abs() < 1e-12);
    }
}
