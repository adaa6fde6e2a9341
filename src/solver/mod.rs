//! Iterative sparse linear solves for face-based LDU matrices.
//!
//! The caller hands over its LDU connectivity and coefficients; this module
//! converts them into a fixed-row-capacity (ELL) layout, caches the converted
//! topology across calls with unchanged structure, and drives a
//! preconditioned Krylov solve whose convergence bookkeeping follows the
//! finite-volume magnitude-sum convention.

pub mod args;
pub mod cpu;
pub mod ell;
pub mod engine;
pub mod error;
pub mod gpu;
pub mod preconditioner;
pub mod strategy;
pub mod system;
pub mod telemetry;

pub use args::{LduSystemView, SolveRequest, SolveStats};
pub use cpu::CpuEngine;
pub use engine::ComputeEngine;
pub use error::SolveError;
pub use gpu::{GpuContext, WgpuEngine};
pub use preconditioner::PreconditionerKind;
pub use strategy::{BiCgStab, Cg, SolverStrategy};
pub use system::SparseMatrixSystem;
pub use telemetry::SolverTelemetry;
