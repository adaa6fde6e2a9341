//! Iterative strategies. Each polls the telemetry monitor once per iteration
//! through `finished` and advances it with `increment` exactly once per
//! iteration performed; the monitor alone decides when to stop. Breakdown
//! (a vanishing denominator) ends the loop early, and the monitor then
//! reports whatever convergence state was actually reached.

use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;
use crate::solver::preconditioner::Preconditioner;
use crate::solver::telemetry::SolverTelemetry;

const BREAKDOWN: f64 = 1e-30;

pub trait SolverStrategy<E: ComputeEngine> {
    fn name(&self) -> &'static str;

    /// Runs the method until the monitor says stop, leaving the final iterate
    /// in `x`.
    fn perform(
        &self,
        engine: &E,
        a: &E::Matrix,
        x: &mut E::Vector,
        b: &E::Vector,
        n: usize,
        monitor: &mut SolverTelemetry,
        precond: &mut dyn Preconditioner<E>,
    ) -> Result<(), SolveError>;
}

/// Preconditioned conjugate gradients. Requires a symmetric positive-definite
/// matrix and preconditioner.
pub struct Cg;

impl<E: ComputeEngine> SolverStrategy<E> for Cg {
    fn name(&self) -> &'static str {
        "cg"
    }

    fn perform(
        &self,
        engine: &E,
        a: &E::Matrix,
        x: &mut E::Vector,
        b: &E::Vector,
        n: usize,
        monitor: &mut SolverTelemetry,
        precond: &mut dyn Preconditioner<E>,
    ) -> Result<(), SolveError> {
        let mut r = engine.alloc_vector(n)?;
        let mut z = engine.alloc_vector(n)?;
        let mut p = engine.alloc_vector(n)?;
        let mut q = engine.alloc_vector(n)?;

        // r = b - Ax
        engine.spmv(a, x, &mut r)?;
        engine.axpby(1.0, b, -1.0, &mut r)?;

        let mut rz_old = 0.0;
        let mut first = true;

        loop {
            if monitor.finished(engine, &r)? {
                return Ok(());
            }

            precond.apply(engine, a, &r, &mut z)?;
            let rz = engine.dot(&r, &z)?;
            if rz.abs() < BREAKDOWN {
                return Ok(());
            }

            if first {
                engine.copy(&z, &mut p)?;
                first = false;
            } else {
                // p = z + (rz / rz_old) p
                engine.axpby(1.0, &z, rz / rz_old, &mut p)?;
            }

            engine.spmv(a, &p, &mut q)?;
            let pq = engine.dot(&p, &q)?;
            if pq.abs() < BREAKDOWN {
                return Ok(());
            }
            let alpha = rz / pq;

            engine.axpy(alpha, &p, x)?;
            engine.axpy(-alpha, &q, &mut r)?;

            rz_old = rz;
            monitor.increment();
        }
    }
}

/// Preconditioned BiCGStab, for non-symmetric systems.
pub struct BiCgStab;

impl<E: ComputeEngine> SolverStrategy<E> for BiCgStab {
    fn name(&self) -> &'static str {
        "bicgstab"
    }

    fn perform(
        &self,
        engine: &E,
        a: &E::Matrix,
        x: &mut E::Vector,
        b: &E::Vector,
        n: usize,
        monitor: &mut SolverTelemetry,
        precond: &mut dyn Preconditioner<E>,
    ) -> Result<(), SolveError> {
        let mut r = engine.alloc_vector(n)?;
        let mut r0 = engine.alloc_vector(n)?;
        let mut p = engine.alloc_vector(n)?;
        let mut v = engine.alloc_vector(n)?;
        let mut s = engine.alloc_vector(n)?;
        let mut t = engine.alloc_vector(n)?;
        let mut phat = engine.alloc_vector(n)?;
        let mut shat = engine.alloc_vector(n)?;

        // r = b - Ax, r0 = r
        engine.spmv(a, x, &mut r)?;
        engine.axpby(1.0, b, -1.0, &mut r)?;
        engine.copy(&r, &mut r0)?;

        let mut rho_old = 1.0;
        let mut alpha = 1.0;
        let mut omega = 1.0;
        let mut first = true;

        loop {
            if monitor.finished(engine, &r)? {
                return Ok(());
            }

            let rho = engine.dot(&r0, &r)?;
            if rho.abs() < BREAKDOWN {
                return Ok(());
            }

            if first {
                engine.copy(&r, &mut p)?;
                first = false;
            } else {
                // p = r + beta (p - omega v)
                let beta = (rho / rho_old) * (alpha / omega);
                engine.axpy(-omega, &v, &mut p)?;
                engine.axpby(1.0, &r, beta, &mut p)?;
            }

            precond.apply(engine, a, &p, &mut phat)?;
            engine.spmv(a, &phat, &mut v)?;
            let r0v = engine.dot(&r0, &v)?;
            if r0v.abs() < BREAKDOWN {
                return Ok(());
            }
            alpha = rho / r0v;

            engine.copy(&r, &mut s)?;
            engine.axpy(-alpha, &v, &mut s)?;

            precond.apply(engine, a, &s, &mut shat)?;
            engine.spmv(a, &shat, &mut t)?;
            let tt = engine.dot(&t, &t)?;
            omega = if tt.abs() < BREAKDOWN {
                0.0
            } else {
                engine.dot(&t, &s)? / tt
            };

            engine.axpy(alpha, &phat, x)?;
            engine.axpy(omega, &shat, x)?;
            engine.copy(&s, &mut r)?;
            engine.axpy(-omega, &t, &mut r)?;

            monitor.increment();

            if omega == 0.0 {
                return Ok(());
            }
            rho_old = rho;
        }
    }
}
