//! Host engine. Vectors are plain `Vec<f64>`; the level-1 kernels run four
//! lanes at a time with `wide::f64x4`. Deterministic: repeated solves over
//! identical inputs reduce in the same order and produce bit-identical
//! results.

use wide::f64x4;

use crate::solver::ell::{EllTopology, EllValues, SENTINEL_COLUMN};
use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;

pub struct CpuEngine;

#[derive(Clone, Debug)]
pub struct CpuEllMatrix {
    pub num_rows: usize,
    pub max_entries_per_row: usize,
    pub column_indices: Vec<u32>,
    pub values: Vec<f64>,
}

impl ComputeEngine for CpuEngine {
    type Vector = Vec<f64>;
    type Matrix = CpuEllMatrix;

    fn upload_matrix(
        &self,
        topo: &EllTopology,
        values: &EllValues,
    ) -> Result<Self::Matrix, SolveError> {
        Ok(CpuEllMatrix {
            num_rows: topo.num_rows,
            max_entries_per_row: topo.max_entries_per_row,
            column_indices: topo.column_indices.clone(),
            values: values.0.clone(),
        })
    }

    fn refresh_matrix(
        &self,
        matrix: &mut Self::Matrix,
        values: &EllValues,
    ) -> Result<(), SolveError> {
        matrix.values.copy_from_slice(&values.0);
        Ok(())
    }

    fn upload_vector(&self, host: &[f64]) -> Result<Self::Vector, SolveError> {
        Ok(host.to_vec())
    }

    fn alloc_vector(&self, len: usize) -> Result<Self::Vector, SolveError> {
        Ok(vec![0.0; len])
    }

    fn download_vector(&self, v: &Self::Vector, out: &mut [f64]) -> Result<(), SolveError> {
        out.copy_from_slice(v);
        Ok(())
    }

    fn copy(&self, src: &Self::Vector, dst: &mut Self::Vector) -> Result<(), SolveError> {
        dst.copy_from_slice(src);
        Ok(())
    }

    fn fill(&self, v: &mut Self::Vector, value: f64) -> Result<(), SolveError> {
        v.iter_mut().for_each(|x| *x = value);
        Ok(())
    }

    fn spmv(
        &self,
        a: &Self::Matrix,
        x: &Self::Vector,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError> {
        let n = a.num_rows;
        for row in 0..n {
            let mut sum = 0.0;
            for slot in 0..a.max_entries_per_row {
                let idx = slot * n + row;
                let col = a.column_indices[idx];
                if col != SENTINEL_COLUMN {
                    sum += a.values[idx] * x[col as usize];
                }
            }
            y[row] = sum;
        }
        Ok(())
    }

    fn dot(&self, x: &Self::Vector, y: &Self::Vector) -> Result<f64, SolveError> {
        let n = x.len();
        let mut sum = f64x4::splat(0.0);
        let mut i = 0;
        while i + 4 <= n {
            let vx = f64x4::from(&x[i..i + 4]);
            let vy = f64x4::from(&y[i..i + 4]);
            sum += vx * vy;
            i += 4;
        }
        let mut s = sum.reduce_add();
        while i < n {
            s += x[i] * y[i];
            i += 1;
        }
        Ok(s)
    }

    fn sum(&self, x: &Self::Vector) -> Result<f64, SolveError> {
        let n = x.len();
        let mut sum = f64x4::splat(0.0);
        let mut i = 0;
        while i + 4 <= n {
            sum += f64x4::from(&x[i..i + 4]);
            i += 4;
        }
        let mut s = sum.reduce_add();
        while i < n {
            s += x[i];
            i += 1;
        }
        Ok(s)
    }

    fn abs_sum(&self, x: &Self::Vector) -> Result<f64, SolveError> {
        let n = x.len();
        let mut sum = f64x4::splat(0.0);
        let mut i = 0;
        while i + 4 <= n {
            sum += f64x4::from(&x[i..i + 4]).abs();
            i += 4;
        }
        let mut s = sum.reduce_add();
        while i < n {
            s += x[i].abs();
            i += 1;
        }
        Ok(s)
    }

    fn axpy(&self, alpha: f64, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError> {
        let n = x.len();
        let va = f64x4::splat(alpha);
        let mut i = 0;
        while i + 4 <= n {
            let vx = f64x4::from(&x[i..i + 4]);
            let vy = f64x4::from(&y[i..i + 4]);
            let res: [f64; 4] = (vy + va * vx).into();
            y[i..i + 4].copy_from_slice(&res);
            i += 4;
        }
        while i < n {
            y[i] += alpha * x[i];
            i += 1;
        }
        Ok(())
    }

    fn axpby(
        &self,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError> {
        let n = x.len();
        let va = f64x4::splat(alpha);
        let vb = f64x4::splat(beta);
        let mut i = 0;
        while i + 4 <= n {
            let vx = f64x4::from(&x[i..i + 4]);
            let vy = f64x4::from(&y[i..i + 4]);
            let res: [f64; 4] = (va * vx + vb * vy).into();
            y[i..i + 4].copy_from_slice(&res);
            i += 4;
        }
        while i < n {
            y[i] = alpha * x[i] + beta * y[i];
            i += 1;
        }
        Ok(())
    }

    fn mul_elem(&self, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError> {
        let n = x.len();
        let mut i = 0;
        while i + 4 <= n {
            let vx = f64x4::from(&x[i..i + 4]);
            let vy = f64x4::from(&y[i..i + 4]);
            let res: [f64; 4] = (vx * vy).into();
            y[i..i + 4].copy_from_slice(&res);
            i += 4;
        }
        while i < n {
            y[i] *= x[i];
            i += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spmv_skips_sentinel_slots() {
        let rows = vec![vec![(0u32, 2.0), (1, -1.0)], vec![(1, 3.0)]];
        let (topo, values) = EllTopology::from_rows(&rows);
        let engine = CpuEngine;
        let a = engine.upload_matrix(&topo, &values).unwrap();
        let x = vec![1.0, 2.0];
        let mut y = vec![0.0; 2];
        engine.spmv(&a, &x, &mut y).unwrap();
        assert_eq!(y, vec![0.0, 6.0]);
    }

    #[test]
    fn reductions_cover_the_simd_tail() {
        let engine = CpuEngine;
        let x: Vec<f64> = vec![1.0, -2.0, 3.0, -4.0, 5.0];
        assert_eq!(engine.sum(&x).unwrap(), 3.0);
        assert_eq!(engine.abs_sum(&x).unwrap(), 15.0);
        assert_eq!(engine.dot(&x, &x).unwrap(), 55.0);
    }
}
