//! Convergence monitor matching the finite-volume `solverPerformance`
//! convention: residuals are magnitude sums (not Euclidean norms) and are
//! reported relative to a problem-scale normalization, so tolerances carry
//! the same meaning across physical quantities.

use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;

/// Floor for the normalization scale, so a uniformly zero matrix or RHS never
/// divides by zero.
pub const SMALL: f64 = 1e-20;

/// Constructed fresh for every solve call; the iterative strategy polls
/// [`finished`](SolverTelemetry::finished) once per iteration and calls
/// [`increment`](SolverTelemetry::increment) exactly once per iteration
/// performed.
#[derive(Clone, Debug)]
pub struct SolverTelemetry {
    norm: f64,
    /// Negative until the first residual is observed.
    norm_initial: f64,
    norm_scale: f64,
    relative_tol: f64,
    absolute_tol: f64,
    iteration_limit: u32,
    iteration_count: u32,
}

impl SolverTelemetry {
    pub fn new(iteration_limit: u32, relative_tol: f64, absolute_tol: f64) -> Self {
        Self {
            norm: f64::MAX,
            norm_initial: -1.0,
            norm_scale: 1.0,
            relative_tol,
            absolute_tol,
            iteration_limit,
            iteration_count: 0,
        }
    }

    /// Computes the normalization scale, once, before the first iteration:
    ///
    /// with `xref` the arithmetic mean of `x` broadcast to every entry,
    /// `scale = sum_i (|(A*x)_i - (A*xref)_i| + |b_i - (A*xref)_i|) + SMALL`.
    ///
    /// This measures a typical magnitude of the equation itself, independent
    /// of how far the current iterate happens to be from the solution.
    pub fn set_norm_scale<E: ComputeEngine>(
        &mut self,
        engine: &E,
        a: &E::Matrix,
        x: &E::Vector,
        b: &E::Vector,
        n: usize,
    ) -> Result<(), SolveError> {
        if n == 0 {
            self.norm_scale = SMALL;
            return Ok(());
        }

        let xref = engine.sum(x)? / n as f64;
        let mut xref_vector = engine.alloc_vector(n)?;
        engine.fill(&mut xref_vector, xref)?;

        let mut tmp = engine.alloc_vector(n)?;
        let mut ax = engine.alloc_vector(n)?;
        engine.spmv(a, &xref_vector, &mut tmp)?;
        engine.spmv(a, x, &mut ax)?;

        // ax := Ax - tmp, xref_vector := b - tmp
        engine.axpy(-1.0, &tmp, &mut ax)?;
        engine.copy(b, &mut xref_vector)?;
        engine.axpy(-1.0, &tmp, &mut xref_vector)?;

        self.norm_scale = engine.abs_sum(&ax)? + engine.abs_sum(&xref_vector)? + SMALL;
        Ok(())
    }

    /// Observes a residual vector and decides whether iteration should stop:
    /// true iff converged or the iteration limit has been reached. The very
    /// first observation fixes the initial residual.
    pub fn finished<E: ComputeEngine>(
        &mut self,
        engine: &E,
        r: &E::Vector,
    ) -> Result<bool, SolveError> {
        // Sum of magnitudes, deliberately not sqrt(sum of squares).
        self.norm = engine.abs_sum(r)?;
        if self.norm_initial < 0.0 {
            self.norm_initial = self.norm;
        }
        Ok(self.converged() || self.iteration_count >= self.iteration_limit)
    }

    pub fn converged(&self) -> bool {
        self.norm < self.relative_tol * self.norm_initial
            || self.norm < self.absolute_tol * self.norm_scale
    }

    /// Advances the iteration count by one.
    pub fn increment(&mut self) {
        self.iteration_count += 1;
    }

    /// Initial residual, normalized by the scale.
    pub fn initial_norm(&self) -> f64 {
        self.norm_initial / self.norm_scale
    }

    /// Latest residual, normalized by the scale.
    pub fn current_norm(&self) -> f64 {
        self.norm / self.norm_scale
    }

    pub fn iterations(&self) -> u32 {
        self.iteration_count
    }

    pub fn norm_scale(&self) -> f64 {
        self.norm_scale
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::cpu::CpuEngine;
    use crate::solver::ell::EllTopology;

    #[test]
    fn norm_scale_is_floored_for_all_zero_input() {
        let engine = CpuEngine;
        let (topo, values) = EllTopology::from_rows(&[vec![(0, 0.0)], vec![(1, 0.0)]]);
        let a = engine.upload_matrix(&topo, &values).unwrap();
        let x = vec![0.0; 2];
        let b = vec![0.0; 2];
        let mut monitor = SolverTelemetry::new(10, 1e-5, 1e-10);
        monitor.set_norm_scale(&engine, &a, &x, &b, 2).unwrap();
        assert_eq!(monitor.norm_scale(), SMALL);
        assert!(monitor.norm_scale() > 0.0);
    }

    #[test]
    fn first_observation_fixes_initial_norm() {
        let engine = CpuEngine;
        let mut monitor = SolverTelemetry::new(10, 1e-5, 1e-10);
        let r0 = vec![1.0, -2.0, 3.0];
        assert!(!monitor.finished(&engine, &r0).unwrap());
        assert_eq!(monitor.initial_norm(), 6.0);
        let r1 = vec![0.5, 0.5, 0.0];
        monitor.increment();
        assert!(!monitor.finished(&engine, &r1).unwrap());
        // Initial norm never moves after the first observation.
        assert_eq!(monitor.initial_norm(), 6.0);
        assert_eq!(monitor.current_norm(), 1.0);
        assert_eq!(monitor.iterations(), 1);
    }

    #[test]
    fn finished_is_limit_or_convergence() {
        let engine = CpuEngine;
        let mut monitor = SolverTelemetry::new(2, 1e-5, 1e-10);
        let r = vec![1.0];
        assert!(!monitor.finished(&engine, &r).unwrap());
        monitor.increment();
        assert!(!monitor.finished(&engine, &r).unwrap());
        monitor.increment();
        // Limit reached without convergence.
        assert!(monitor.finished(&engine, &r).unwrap());
        assert!(!monitor.converged());

        // Convergence path: a residual far below the relative tolerance.
        let tiny = vec![1e-9];
        assert!(monitor.finished(&engine, &tiny).unwrap());
        assert!(monitor.converged());
    }
}
