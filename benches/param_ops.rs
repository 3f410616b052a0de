//! Benchmarks for unwrapping operations.

use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use nalgebra::{Point2, Point3};
use unfold::algo::kernels::cotmatrix;
use unfold::algo::parameterize::{convex_border_parameterization, map_vertices_to_convex_border, BorderMethod};
use unfold::prelude::*;

/// A wavy `n × n` quad grid. Each quad owns four UV slots.
fn create_grid_faces(n: usize) -> (Vec<Point3<f64>>, Vec<[usize; 4]>) {
    let mut vertices = Vec::with_capacity((n + 1) * (n + 1));
    let mut quads = Vec::with_capacity(n * n);

    for j in 0..=n {
        for i in 0..=n {
            let (x, y) = (i as f64 / n as f64, j as f64 / n as f64);
            let z = 0.1 * (x * 6.0).sin() * (y * 4.0).cos();
            vertices.push(Point3::new(x, y, z));
        }
    }

    for j in 0..n {
        for i in 0..n {
            let v00 = j * (n + 1) + i;
            let v10 = v00 + 1;
            let v01 = v00 + (n + 1);
            let v11 = v01 + 1;
            quads.push([v00, v10, v11, v01]);
        }
    }

    (vertices, quads)
}

fn create_handle(vertices: &[Point3<f64>], quads: &[[usize; 4]]) -> ParamHandle {
    let mut handle = ParamHandle::new(vec![Point2::origin(); 4 * quads.len()]);
    for (f, quad) in quads.iter().enumerate() {
        let keys = quad.map(|v| v as ParamKey);
        let pos = quad.map(|v| vertices[v]);
        let slots = [4 * f, 4 * f + 1, 4 * f + 2, 4 * f + 3];
        handle
            .add_face(&FaceInput::new(f as ParamKey, &keys, &pos, &slots))
            .unwrap();
    }
    handle.end(&ConstructOptions::default()).unwrap();
    handle
}

fn bench_construction(c: &mut Criterion) {
    let (vertices, quads) = create_grid_faces(30);

    c.bench_function("construct_grid_30x30", |b| {
        b.iter(|| create_handle(&vertices, &quads));
    });
}

fn bench_kernels(c: &mut Criterion) {
    let (vertices, quads) = create_grid_faces(50);
    let faces: Vec<[usize; 3]> = quads
        .iter()
        .flat_map(|q| [[q[0], q[1], q[2]], [q[0], q[2], q[3]]])
        .collect();
    let boundary: Vec<usize> = (0..=50)
        .chain((1..=50).map(|j| j * 51 + 50))
        .chain((0..50).rev().map(|i| 50 * 51 + i))
        .chain((1..50).rev().map(|j| j * 51))
        .collect();
    let bnd_uv = map_vertices_to_convex_border(boundary.len());

    c.bench_function("cotmatrix_grid_50x50", |b| {
        b.iter(|| cotmatrix(&vertices, &faces));
    });

    c.bench_function("mean_value_border_grid_50x50", |b| {
        b.iter(|| {
            convex_border_parameterization(&vertices, &faces, &boundary, &bnd_uv, BorderMethod::MeanValue)
                .unwrap()
        });
    });
}

fn bench_solvers(c: &mut Criterion) {
    let (vertices, quads) = create_grid_faces(20);

    c.bench_function("lscm_abf_grid_20x20", |b| {
        b.iter_batched(
            || create_handle(&vertices, &quads),
            |mut handle| {
                handle.lscm_begin(&LscmOptions::default()).unwrap();
                handle.lscm_solve().unwrap();
                handle.lscm_end().unwrap();
                handle
            },
            BatchSize::SmallInput,
        );
    });

    c.bench_function("slim_grid_20x20", |b| {
        b.iter_batched(
            || create_handle(&vertices, &quads),
            |mut handle| {
                handle.slim_solve(&SlimOptions::default()).unwrap();
                handle
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_pack(c: &mut Criterion) {
    let (vertices, quads) = create_grid_faces(20);
    let mut base = create_handle(&vertices, &quads);
    base.lscm_begin(&LscmOptions::default().with_abf(false)).unwrap();
    base.lscm_solve().unwrap();
    base.lscm_end().unwrap();

    c.bench_function("pack_boxes_200", |b| {
        b.iter_batched(
            || {
                (0..200)
                    .map(|i| unfold::algo::pack::PackBox::new(1.0 + (i % 7) as f64, 1.0 + (i % 5) as f64, i))
                    .collect::<Vec<_>>()
            },
            |mut boxes| unfold::algo::pack::boxpack2d(&mut boxes),
            BatchSize::SmallInput,
        );
    });

    c.bench_function("pack_single_chart", |b| {
        b.iter(|| base.pack(&PackOptions::default().with_margin(0.05)).unwrap());
    });
}

criterion_group!(benches, bench_construction, bench_kernels, bench_solvers, bench_pack);
criterion_main!(benches);
