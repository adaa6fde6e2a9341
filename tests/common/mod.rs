//! Builds LDU fixtures the way a finite-volume caller would hand them over:
//! upper entries face-ordered by owner, lower entries reached through the
//! per-cell sorted face list.

// Not every test binary uses every fixture helper.
#![allow(dead_code)]

use ldusolve::solver::LduSystemView;

pub fn init_logs() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct LduFixture {
    pub n_cells: usize,
    pub faces: Vec<(u32, u32, f64, f64)>, // (lo, hi, lower coeff, upper coeff)
    pub diag: Vec<f64>,
    pub low_faces_start: Vec<u32>,
    pub low_face: Vec<u32>,
    pub low_face_to_cell: Vec<u32>,
    pub low_values: Vec<f64>,
    pub up_faces_start: Vec<u32>,
    pub up_face_to_cell: Vec<u32>,
    pub up_values: Vec<f64>,
}

impl LduFixture {
    /// `faces` holds (lo, hi, coeff at (hi, lo), coeff at (lo, hi)) with
    /// `lo < hi`; `diag[i]` is the coefficient at (i, i).
    pub fn from_faces(n_cells: usize, mut faces: Vec<(u32, u32, f64, f64)>, diag: Vec<f64>) -> Self {
        assert_eq!(diag.len(), n_cells);
        faces.sort_by_key(|&(lo, hi, _, _)| (lo, hi));
        let n_faces = faces.len();

        let mut up_faces_start = vec![0u32; n_cells + 1];
        for &(lo, _, _, _) in &faces {
            up_faces_start[lo as usize + 1] += 1;
        }
        for i in 0..n_cells {
            up_faces_start[i + 1] += up_faces_start[i];
        }
        let up_face_to_cell: Vec<u32> = faces.iter().map(|&(_, hi, _, _)| hi).collect();
        let up_values: Vec<f64> = faces.iter().map(|&(_, _, _, up)| up).collect();

        let mut low_faces_start = vec![0u32; n_cells + 1];
        for &(_, hi, _, _) in &faces {
            low_faces_start[hi as usize + 1] += 1;
        }
        for i in 0..n_cells {
            low_faces_start[i + 1] += low_faces_start[i];
        }
        let mut cursor = low_faces_start.clone();
        let mut low_face = vec![0u32; n_faces];
        for (face_id, &(_, hi, _, _)) in faces.iter().enumerate() {
            low_face[cursor[hi as usize] as usize] = face_id as u32;
            cursor[hi as usize] += 1;
        }
        let low_face_to_cell: Vec<u32> = faces.iter().map(|&(lo, _, _, _)| lo).collect();
        let low_values: Vec<f64> = faces.iter().map(|&(_, _, low, _)| low).collect();

        Self {
            n_cells,
            faces,
            diag,
            low_faces_start,
            low_face,
            low_face_to_cell,
            low_values,
            up_faces_start,
            up_face_to_cell,
            up_values,
        }
    }

    /// Five-point Laplacian-style grid, strictly diagonally dominant and
    /// symmetric.
    pub fn grid_poisson(nx: usize, ny: usize) -> Self {
        let n = nx * ny;
        let mut faces = Vec::new();
        let mut degree = vec![0usize; n];
        for y in 0..ny {
            for x in 0..nx {
                let i = (y * nx + x) as u32;
                if x + 1 < nx {
                    faces.push((i, i + 1, -1.0, -1.0));
                    degree[i as usize] += 1;
                    degree[i as usize + 1] += 1;
                }
                if y + 1 < ny {
                    faces.push((i, i + nx as u32, -1.0, -1.0));
                    degree[i as usize] += 1;
                    degree[i as usize + nx] += 1;
                }
            }
        }
        let diag: Vec<f64> = degree.iter().map(|&d| d as f64 + 1.0).collect();
        Self::from_faces(n, faces, diag)
    }

    /// 1D convection-diffusion chain with upwind-biased, non-symmetric
    /// off-diagonals.
    pub fn chain_convection(n: usize) -> Self {
        let faces: Vec<(u32, u32, f64, f64)> = (0..n - 1)
            .map(|i| (i as u32, i as u32 + 1, -1.5, -0.2))
            .collect();
        let diag = vec![2.0; n];
        Self::from_faces(n, faces, diag)
    }

    pub fn view(&self) -> LduSystemView<'_> {
        LduSystemView {
            n_cells: self.n_cells,
            n_faces: self.faces.len(),
            low_faces_start: &self.low_faces_start,
            low_face: &self.low_face,
            low_face_to_cell: &self.low_face_to_cell,
            low_cell_value_from_face: &self.low_values,
            diag_cell_value: &self.diag,
            up_faces_start: &self.up_faces_start,
            up_face_to_cell: &self.up_face_to_cell,
            up_cell_value_from_face: &self.up_values,
        }
    }

    /// Host reference product, straight from the face list.
    pub fn matvec(&self, x: &[f64]) -> Vec<f64> {
        let mut y: Vec<f64> = self.diag.iter().zip(x).map(|(d, xi)| d * xi).collect();
        for &(lo, hi, low, up) in &self.faces {
            y[lo as usize] += up * x[hi as usize];
            y[hi as usize] += low * x[lo as usize];
        }
        y
    }

    pub fn degree(&self, cell: usize) -> usize {
        self.faces
            .iter()
            .filter(|&&(lo, hi, _, _)| lo as usize == cell || hi as usize == cell)
            .count()
    }
}
