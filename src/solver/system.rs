//! The solve orchestrator: owns the engine-resident matrix, decides whether
//! the topology must be rebuilt or only the values refreshed, and drives a
//! solve call end to end.
//!
//! This is an ordinary value, not a process-wide singleton; hold one per
//! device context. `solve` takes `&mut self`, so the borrow checker enforces
//! the one-solve-in-flight rule a shared device state needs.

use std::collections::HashSet;

use crate::solver::args::{LduSystemView, SolveRequest, SolveStats};
use crate::solver::ell::{EllTopology, EllValues};
use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;
use crate::solver::preconditioner::PreconditionerKind;
use crate::solver::strategy::SolverStrategy;
use crate::solver::telemetry::SolverTelemetry;

/// Structural identity of a converted topology. Comparing this against the
/// incoming connectivity is O(N + F), the same order as a rebuild, but a hit
/// skips the device reallocation and index re-upload.
#[derive(Clone, Debug, PartialEq)]
struct TopologyFingerprint {
    n_cells: usize,
    n_faces: usize,
    low_faces_start: Vec<u32>,
    low_face: Vec<u32>,
    low_face_to_cell: Vec<u32>,
    up_faces_start: Vec<u32>,
    up_face_to_cell: Vec<u32>,
}

impl TopologyFingerprint {
    fn of(view: &LduSystemView) -> Self {
        Self {
            n_cells: view.n_cells,
            n_faces: view.n_faces,
            low_faces_start: view.low_faces_start.to_vec(),
            low_face: view.low_face.to_vec(),
            low_face_to_cell: view.low_face_to_cell.to_vec(),
            up_faces_start: view.up_faces_start.to_vec(),
            up_face_to_cell: view.up_face_to_cell.to_vec(),
        }
    }

    fn matches(&self, view: &LduSystemView) -> bool {
        self.n_cells == view.n_cells
            && self.n_faces == view.n_faces
            && self.low_faces_start == view.low_faces_start
            && self.low_face == view.low_face
            && self.low_face_to_cell == view.low_face_to_cell
            && self.up_faces_start == view.up_faces_start
            && self.up_face_to_cell == view.up_face_to_cell
    }
}

struct CachedMatrix<E: ComputeEngine> {
    fingerprint: TopologyFingerprint,
    topology: EllTopology,
    values: EllValues,
    device: E::Matrix,
}

pub struct SparseMatrixSystem<E: ComputeEngine> {
    engine: E,
    cached: Option<CachedMatrix<E>>,
    rebuilds: u64,
    refreshes: u64,
    warned_preconditioners: HashSet<String>,
}

impl<E: ComputeEngine> SparseMatrixSystem<E> {
    pub fn new(engine: E) -> Self {
        Self {
            engine,
            cached: None,
            rebuilds: 0,
            refreshes: 0,
            warned_preconditioners: HashSet::new(),
        }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Topology conversions performed so far.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    /// Value-only refreshes performed so far.
    pub fn refreshes(&self) -> u64 {
        self.refreshes
    }

    /// Distinct unrecognized preconditioner names warned about so far.
    /// Recognized names, `"no"` included, never land here.
    pub fn fallback_warnings(&self) -> usize {
        self.warned_preconditioners.len()
    }

    /// Runs one solve. `x` enters holding the initial guess and leaves
    /// holding the final iterate, whether or not the solve converged.
    /// Non-convergence is reported through the returned stats, never as an
    /// error; a device failure aborts with `Err` and leaves `x` untouched.
    pub fn solve(
        &mut self,
        strategy: &dyn SolverStrategy<E>,
        request: &SolveRequest,
        x: &mut [f64],
    ) -> Result<SolveStats, SolveError> {
        let view = &request.system;
        view.validate()?;
        let n = view.n_cells;
        if x.len() != n {
            return Err(SolveError::invalid(format!(
                "solution buffer has length {}, expected {n}",
                x.len()
            )));
        }
        if request.b_source.len() != n {
            return Err(SolveError::invalid(format!(
                "b_source has length {}, expected {n}",
                request.b_source.len()
            )));
        }

        // Degenerate but valid: nothing to solve.
        if n == 0 {
            return Ok(SolveStats {
                initial_residual: 0.0,
                final_residual: 0.0,
                iterations: 0,
                converged: true,
            });
        }

        self.update_matrix(view)?;
        let kind = self.resolve_preconditioner(request.preconditioner);
        let cached = self.cached.as_ref().unwrap();

        let mut x_dev = self.engine.upload_vector(x)?;
        let b_dev = self.engine.upload_vector(request.b_source)?;

        let mut monitor = SolverTelemetry::new(
            request.max_iterations,
            request.relative_tolerance,
            request.absolute_tolerance,
        );
        monitor.set_norm_scale(&self.engine, &cached.device, &x_dev, &b_dev, n)?;

        let mut precond = kind.build(&self.engine, &cached.topology, &cached.values)?;

        strategy.perform(
            &self.engine,
            &cached.device,
            &mut x_dev,
            &b_dev,
            n,
            &mut monitor,
            precond.as_mut(),
        )?;

        self.engine.download_vector(&x_dev, x)?;

        Ok(SolveStats {
            initial_residual: monitor.initial_norm(),
            final_residual: monitor.current_norm(),
            iterations: monitor.iterations(),
            converged: monitor.converged(),
        })
    }

    /// Rebuilds the index structure when the connectivity changed, otherwise
    /// refreshes the values in place. Values are rewritten on every call:
    /// coefficients change call to call even when the mesh does not.
    fn update_matrix(&mut self, view: &LduSystemView) -> Result<(), SolveError> {
        match &mut self.cached {
            Some(cached) if cached.fingerprint.matches(view) => {
                cached.values.refresh(&cached.topology, view);
                self.engine.refresh_matrix(&mut cached.device, &cached.values)?;
                self.refreshes += 1;
            }
            _ => {
                let (topology, values) = EllTopology::from_ldu(view);
                let device = self.engine.upload_matrix(&topology, &values)?;
                self.cached = Some(CachedMatrix {
                    fingerprint: TopologyFingerprint::of(view),
                    topology,
                    values,
                    device,
                });
                self.rebuilds += 1;
            }
        }
        Ok(())
    }

    fn resolve_preconditioner(&mut self, name: &str) -> PreconditionerKind {
        match PreconditionerKind::from_name(name) {
            Some(kind) => kind,
            None => {
                if self.warned_preconditioners.insert(name.to_string()) {
                    log::warn!("unsupported preconditioner: {name}, using: no");
                }
                PreconditionerKind::None
            }
        }
    }
}
