//! The vector/matrix capability the solve pipeline runs on.
//!
//! Strategies, preconditioners, and the telemetry monitor are written against
//! this trait only, so the same orchestration drives the wgpu engine and the
//! SIMD host engine.

use crate::solver::ell::{EllTopology, EllValues};
use crate::solver::error::SolveError;

pub trait ComputeEngine: 'static {
    type Vector: 'static;
    type Matrix: 'static;

    fn upload_matrix(
        &self,
        topo: &EllTopology,
        values: &EllValues,
    ) -> Result<Self::Matrix, SolveError>;

    /// Overwrites the value array of an already-uploaded matrix. The index
    /// structure is untouched; `values` must come from the same topology.
    fn refresh_matrix(
        &self,
        matrix: &mut Self::Matrix,
        values: &EllValues,
    ) -> Result<(), SolveError>;

    fn upload_vector(&self, host: &[f64]) -> Result<Self::Vector, SolveError>;

    fn alloc_vector(&self, len: usize) -> Result<Self::Vector, SolveError>;

    fn download_vector(&self, v: &Self::Vector, out: &mut [f64]) -> Result<(), SolveError>;

    fn copy(&self, src: &Self::Vector, dst: &mut Self::Vector) -> Result<(), SolveError>;

    fn fill(&self, v: &mut Self::Vector, value: f64) -> Result<(), SolveError>;

    /// `y = A·x`. The output must be a distinct vector from `x`; the `&mut`
    /// receiver makes an aliased call unrepresentable, which is load-bearing:
    /// the product reads `x` while writing `y`.
    fn spmv(
        &self,
        a: &Self::Matrix,
        x: &Self::Vector,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError>;

    fn dot(&self, x: &Self::Vector, y: &Self::Vector) -> Result<f64, SolveError>;

    /// `Σ x_i`.
    fn sum(&self, x: &Self::Vector) -> Result<f64, SolveError>;

    /// `Σ |x_i|`, the magnitude-sum the telemetry monitor is built on.
    fn abs_sum(&self, x: &Self::Vector) -> Result<f64, SolveError>;

    /// `y += alpha * x`.
    fn axpy(&self, alpha: f64, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError>;

    /// `y = alpha * x + beta * y`.
    fn axpby(
        &self,
        alpha: f64,
        x: &Self::Vector,
        beta: f64,
        y: &mut Self::Vector,
    ) -> Result<(), SolveError>;

    /// `y_i *= x_i`.
    fn mul_elem(&self, x: &Self::Vector, y: &mut Self::Vector) -> Result<(), SolveError>;
}
