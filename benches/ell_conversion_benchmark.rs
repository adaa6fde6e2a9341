use criterion::{criterion_group, criterion_main, Criterion};
use ldusolve::solver::ell::EllTopology;
use ldusolve::solver::LduSystemView;

/// Structured-grid LDU arrays sized like a mid-resolution 2D mesh.
struct GridLdu {
    n_cells: usize,
    low_faces_start: Vec<u32>,
    low_face: Vec<u32>,
    low_face_to_cell: Vec<u32>,
    low_values: Vec<f64>,
    diag: Vec<f64>,
    up_faces_start: Vec<u32>,
    up_face_to_cell: Vec<u32>,
    up_values: Vec<f64>,
}

fn grid(nx: usize, ny: usize) -> GridLdu {
    let n = nx * ny;
    let mut faces: Vec<(u32, u32)> = Vec::new();
    for y in 0..ny {
        for x in 0..nx {
            let i = (y * nx + x) as u32;
            if x + 1 < nx {
                faces.push((i, i + 1));
            }
            if y + 1 < ny {
                faces.push((i, i + nx as u32));
            }
        }
    }
    faces.sort();
    let f = faces.len();

    let mut up_faces_start = vec![0u32; n + 1];
    let mut low_faces_start = vec![0u32; n + 1];
    for &(lo, hi) in &faces {
        up_faces_start[lo as usize + 1] += 1;
        low_faces_start[hi as usize + 1] += 1;
    }
    for i in 0..n {
        up_faces_start[i + 1] += up_faces_start[i];
        low_faces_start[i + 1] += low_faces_start[i];
    }
    let mut cursor = low_faces_start.clone();
    let mut low_face = vec![0u32; f];
    for (face_id, &(_, hi)) in faces.iter().enumerate() {
        low_face[cursor[hi as usize] as usize] = face_id as u32;
        cursor[hi as usize] += 1;
    }

    GridLdu {
        n_cells: n,
        low_faces_start,
        low_face,
        low_face_to_cell: faces.iter().map(|&(lo, _)| lo).collect(),
        low_values: vec![-1.0; f],
        diag: vec![5.0; n],
        up_faces_start,
        up_face_to_cell: faces.iter().map(|&(_, hi)| hi).collect(),
        up_values: vec![-1.0; f],
    }
}

fn ell_conversion_benchmark(c: &mut Criterion) {
    let g = grid(256, 256);
    let view = LduSystemView {
        n_cells: g.n_cells,
        n_faces: g.low_face.len(),
        low_faces_start: &g.low_faces_start,
        low_face: &g.low_face,
        low_face_to_cell: &g.low_face_to_cell,
        low_cell_value_from_face: &g.low_values,
        diag_cell_value: &g.diag,
        up_faces_start: &g.up_faces_start,
        up_face_to_cell: &g.up_face_to_cell,
        up_cell_value_from_face: &g.up_values,
    };

    c.bench_function("ell_from_ldu_256x256", |bench| {
        bench.iter(|| EllTopology::from_ldu(&view))
    });

    let (topo, mut values) = EllTopology::from_ldu(&view);
    c.bench_function("ell_refresh_256x256", |bench| {
        bench.iter(|| values.refresh(&topo, &view))
    });
}

criterion_group!(benches, ell_conversion_benchmark);
criterion_main!(benches);
