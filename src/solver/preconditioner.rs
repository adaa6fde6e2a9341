//! Preconditioner selection and construction.
//!
//! The configuration name is resolved once at the boundary into a closed
//! [`PreconditionerKind`]; construction then matches exhaustively. Setup runs
//! on the host from the ELL matrix; application goes through engine
//! primitives only, so every construction works on both engines.

use std::collections::BTreeMap;

use crate::solver::ell::{EllTopology, EllValues};
use crate::solver::engine::ComputeEngine;
use crate::solver::error::SolveError;

/// Drop tolerance for the incomplete biconjugation behind the approximate
/// inverses.
const AINV_DROP_TOL: f64 = 0.1;

/// Damping for the Jacobi smoothing inside smoothed aggregation.
const SA_OMEGA: f64 = 2.0 / 3.0;

/// Jacobi sweeps used as the coarse-level solve.
const SA_COARSE_SWEEPS: usize = 10;

/// The closed set of preconditioner constructions.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PreconditionerKind {
    /// Identity operator.
    None,
    /// Jacobi: reciprocal of the matrix diagonal.
    Diagonal,
    /// Two-level smoothed-aggregation multigrid.
    SmoothedAggregation,
    /// Approximate inverse with the factors folded into one scaled pair.
    ScaledBridsonAinv,
    /// Approximate inverse with an explicit diagonal, symmetric pattern.
    BridsonAinv,
    /// Approximate inverse with separately biconjugated left/right factors.
    NonsymBridsonAinv,
}

impl PreconditionerKind {
    /// Exact, case-sensitive name match. `None` (the Rust value) means the
    /// name is not in the set; the caller decides how loudly to fall back.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "no" => Some(Self::None),
            "diagonal" => Some(Self::Diagonal),
            "smoothed_aggregation" => Some(Self::SmoothedAggregation),
            "scaled_bridson_ainv" => Some(Self::ScaledBridsonAinv),
            "bridson_ainv" => Some(Self::BridsonAinv),
            "nonsym_bridson_ainv" => Some(Self::NonsymBridsonAinv),
            _ => None,
        }
    }

    /// Builds the selected construction over the current matrix.
    pub fn build<E: ComputeEngine>(
        self,
        engine: &E,
        topo: &EllTopology,
        values: &EllValues,
    ) -> Result<Box<dyn Preconditioner<E>>, SolveError> {
        match self {
            Self::None => Ok(Box::new(Identity)),
            Self::Diagonal => Ok(Box::new(Jacobi::build(engine, topo, values)?)),
            Self::SmoothedAggregation => Ok(Box::new(SmoothedAggregation::build(
                engine, topo, values,
            )?)),
            Self::ScaledBridsonAinv => Ok(Box::new(ApproximateInverse::build(
                engine,
                topo,
                values,
                AinvVariant::Scaled,
            )?)),
            Self::BridsonAinv => Ok(Box::new(ApproximateInverse::build(
                engine,
                topo,
                values,
                AinvVariant::Unscaled,
            )?)),
            Self::NonsymBridsonAinv => Ok(Box::new(ApproximateInverse::build(
                engine,
                topo,
                values,
                AinvVariant::Nonsym,
            )?)),
        }
    }
}

/// An operator `z ≈ M⁻¹ r` over the engine's vector space.
pub trait Preconditioner<E: ComputeEngine> {
    fn apply(
        &mut self,
        engine: &E,
        a: &E::Matrix,
        r: &E::Vector,
        z: &mut E::Vector,
    ) -> Result<(), SolveError>;
}

pub struct Identity;

impl<E: ComputeEngine> Preconditioner<E> for Identity {
    fn apply(
        &mut self,
        engine: &E,
        _a: &E::Matrix,
        r: &E::Vector,
        z: &mut E::Vector,
    ) -> Result<(), SolveError> {
        engine.copy(r, z)
    }
}

pub struct Jacobi<E: ComputeEngine> {
    inv_diag: E::Vector,
}

impl<E: ComputeEngine> Jacobi<E> {
    fn build(engine: &E, topo: &EllTopology, values: &EllValues) -> Result<Self, SolveError> {
        let inv_diag = invert_guarded(&diagonal_of(topo, values));
        Ok(Self {
            inv_diag: engine.upload_vector(&inv_diag)?,
        })
    }
}

impl<E: ComputeEngine> Preconditioner<E> for Jacobi<E> {
    fn apply(
        &mut self,
        engine: &E,
        _a: &E::Matrix,
        r: &E::Vector,
        z: &mut E::Vector,
    ) -> Result<(), SolveError> {
        engine.copy(r, z)?;
        engine.mul_elem(&self.inv_diag, z)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AinvVariant {
    Scaled,
    Unscaled,
    Nonsym,
}

/// `M⁻¹ ≈ Z D⁻¹ Wᵀ` from incomplete biconjugation. The application is two
/// sparse products and, except for the scaled variant, a diagonal scaling in
/// between.
pub struct ApproximateInverse<E: ComputeEngine> {
    left: E::Matrix,
    right_t: E::Matrix,
    inv_d: Option<E::Vector>,
    scratch: E::Vector,
}

impl<E: ComputeEngine> ApproximateInverse<E> {
    fn build(
        engine: &E,
        topo: &EllTopology,
        values: &EllValues,
        variant: AinvVariant,
    ) -> Result<Self, SolveError> {
        let a_rows = topo.to_rows(values);
        let n = a_rows.len();
        let (z_cols, w_cols, d) = biconjugate(&a_rows, variant == AinvVariant::Nonsym);

        let inv_d = invert_guarded(&d);
        let (left_rows, right_t_rows, inv_d) = match variant {
            AinvVariant::Scaled => {
                // Fold D^(-1/2) into the factor: M⁻¹ = (Z D^(-1/2))(Z D^(-1/2))ᵀ.
                let scale: Vec<f64> = inv_d.iter().map(|v| v.abs().sqrt()).collect();
                let ws_cols: Vec<BTreeMap<u32, f64>> = z_cols
                    .iter()
                    .enumerate()
                    .map(|(j, col)| col.iter().map(|(&k, &v)| (k, v * scale[j])).collect())
                    .collect();
                (cols_to_rows(&ws_cols, n), cols_as_rows(&ws_cols), None)
            }
            AinvVariant::Unscaled => (cols_to_rows(&z_cols, n), cols_as_rows(&z_cols), Some(inv_d)),
            AinvVariant::Nonsym => (cols_to_rows(&z_cols, n), cols_as_rows(&w_cols), Some(inv_d)),
        };

        let (left_topo, left_values) = EllTopology::from_rows(&left_rows);
        let (right_topo, right_values) = EllTopology::from_rows(&right_t_rows);

        Ok(Self {
            left: engine.upload_matrix(&left_topo, &left_values)?,
            right_t: engine.upload_matrix(&right_topo, &right_values)?,
            inv_d: inv_d.map(|d| engine.upload_vector(&d)).transpose()?,
            scratch: engine.alloc_vector(n)?,
        })
    }
}

impl<E: ComputeEngine> Preconditioner<E> for ApproximateInverse<E> {
    fn apply(
        &mut self,
        engine: &E,
        _a: &E::Matrix,
        r: &E::Vector,
        z: &mut E::Vector,
    ) -> Result<(), SolveError> {
        engine.spmv(&self.right_t, r, &mut self.scratch)?;
        if let Some(inv_d) = &self.inv_d {
            engine.mul_elem(inv_d, &mut self.scratch)?;
        }
        engine.spmv(&self.left, &self.scratch, z)
    }
}

/// Two-level smoothed aggregation: damped-Jacobi smoothing on the fine level,
/// a Jacobi-smoothed piecewise-constant prolongator, and a fixed number of
/// Jacobi sweeps as the coarse solve.
pub struct SmoothedAggregation<E: ComputeEngine> {
    inv_diag_f: E::Vector,
    inv_diag_c: E::Vector,
    p: E::Matrix,
    r_mat: E::Matrix,
    ac: E::Matrix,
    rf: E::Vector,
    tf: E::Vector,
    rc: E::Vector,
    ec: E::Vector,
    tc: E::Vector,
}

impl<E: ComputeEngine> SmoothedAggregation<E> {
    fn build(engine: &E, topo: &EllTopology, values: &EllValues) -> Result<Self, SolveError> {
        let a_rows = topo.to_rows(values);
        let n = a_rows.len();
        let diag = diagonal_of(topo, values);
        let inv_diag = invert_guarded(&diag);

        let aggregate = aggregate_greedy(&a_rows, n);
        let n_coarse = aggregate.iter().map(|&g| g as usize + 1).max().unwrap_or(0);

        // Smoothed prolongator P = (I - ω D⁻¹ A) T, with T the aggregate
        // indicator matrix.
        let mut p_rows: Vec<BTreeMap<u32, f64>> = vec![BTreeMap::new(); n];
        for i in 0..n {
            *p_rows[i].entry(aggregate[i]).or_insert(0.0) += 1.0;
            for &(k, a_ik) in &a_rows[i] {
                *p_rows[i].entry(aggregate[k as usize]).or_insert(0.0) +=
                    -SA_OMEGA * inv_diag[i] * a_ik;
            }
        }

        // R = Pᵀ and the Galerkin product Ac = R A P, on the host.
        let mut r_rows: Vec<BTreeMap<u32, f64>> = vec![BTreeMap::new(); n_coarse];
        for i in 0..n {
            for (&g, &v) in &p_rows[i] {
                r_rows[g as usize].insert(i as u32, v);
            }
        }
        let mut ac_rows: Vec<BTreeMap<u32, f64>> = vec![BTreeMap::new(); n_coarse];
        for i in 0..n {
            for &(k, a_ik) in &a_rows[i] {
                for (&g1, &p1) in &p_rows[i] {
                    for (&g2, &p2) in &p_rows[k as usize] {
                        *ac_rows[g1 as usize].entry(g2).or_insert(0.0) += p1 * a_ik * p2;
                    }
                }
            }
        }

        let mut diag_c = vec![0.0; n_coarse];
        for (g, row) in ac_rows.iter().enumerate() {
            diag_c[g] = row.get(&(g as u32)).copied().unwrap_or(0.0);
        }

        let (p_topo, p_values) = EllTopology::from_rows(&maps_to_rows(&p_rows));
        let (r_topo, r_values) = EllTopology::from_rows(&maps_to_rows(&r_rows));
        let (ac_topo, ac_values) = EllTopology::from_rows(&maps_to_rows(&ac_rows));

        Ok(Self {
            inv_diag_f: engine.upload_vector(&inv_diag)?,
            inv_diag_c: engine.upload_vector(&invert_guarded(&diag_c))?,
            p: engine.upload_matrix(&p_topo, &p_values)?,
            r_mat: engine.upload_matrix(&r_topo, &r_values)?,
            ac: engine.upload_matrix(&ac_topo, &ac_values)?,
            rf: engine.alloc_vector(n)?,
            tf: engine.alloc_vector(n)?,
            rc: engine.alloc_vector(n_coarse)?,
            ec: engine.alloc_vector(n_coarse)?,
            tc: engine.alloc_vector(n_coarse)?,
        })
    }
}

impl<E: ComputeEngine> Preconditioner<E> for SmoothedAggregation<E> {
    fn apply(
        &mut self,
        engine: &E,
        a: &E::Matrix,
        r: &E::Vector,
        z: &mut E::Vector,
    ) -> Result<(), SolveError> {
        // Pre-smooth from zero: z = ω D⁻¹ r.
        engine.copy(r, &mut self.tf)?;
        engine.mul_elem(&self.inv_diag_f, &mut self.tf)?;
        engine.axpby(SA_OMEGA, &self.tf, 0.0, z)?;

        // Restrict the residual.
        engine.spmv(a, z, &mut self.rf)?;
        engine.axpby(1.0, r, -1.0, &mut self.rf)?;
        engine.spmv(&self.r_mat, &self.rf, &mut self.rc)?;

        // Coarse solve: damped Jacobi from zero.
        engine.fill(&mut self.ec, 0.0)?;
        for _ in 0..SA_COARSE_SWEEPS {
            engine.spmv(&self.ac, &self.ec, &mut self.tc)?;
            engine.axpby(1.0, &self.rc, -1.0, &mut self.tc)?;
            engine.mul_elem(&self.inv_diag_c, &mut self.tc)?;
            engine.axpy(SA_OMEGA, &self.tc, &mut self.ec)?;
        }

        // Prolong and correct.
        engine.spmv(&self.p, &self.ec, &mut self.tf)?;
        engine.axpy(1.0, &self.tf, z)?;

        // Post-smooth: z += ω D⁻¹ (r - A z).
        engine.spmv(a, z, &mut self.rf)?;
        engine.axpby(1.0, r, -1.0, &mut self.rf)?;
        engine.mul_elem(&self.inv_diag_f, &mut self.rf)?;
        engine.axpy(SA_OMEGA, &self.rf, z)
    }
}

/// Greedy aggregation over the matrix graph: an unaggregated cell seeds an
/// aggregate and absorbs its unaggregated neighbors.
fn aggregate_greedy(a_rows: &[Vec<(u32, f64)>], n: usize) -> Vec<u32> {
    let mut aggregate = vec![u32::MAX; n];
    let mut next = 0u32;
    for i in 0..n {
        if aggregate[i] != u32::MAX {
            continue;
        }
        aggregate[i] = next;
        for &(k, _) in &a_rows[i] {
            let k = k as usize;
            if aggregate[k] == u32::MAX {
                aggregate[k] = next;
            }
        }
        next += 1;
    }
    aggregate
}

/// Incomplete biconjugation with a static one-level pattern: column `j` is
/// only updated against pivot `i` when `j` neighbors `i` in the matrix graph.
/// Entries below the drop tolerance (relative to the column's largest
/// magnitude) are discarded after each update.
///
/// Returns the columns of `Z`, the columns of `W` (empty unless `nonsym`),
/// and the pivot diagonal `D`.
fn biconjugate(
    a_rows: &[Vec<(u32, f64)>],
    nonsym: bool,
) -> (Vec<BTreeMap<u32, f64>>, Vec<BTreeMap<u32, f64>>, Vec<f64>) {
    let n = a_rows.len();
    let a_cols = transpose_rows(a_rows, n);

    let mut z: Vec<BTreeMap<u32, f64>> = (0..n).map(|j| BTreeMap::from([(j as u32, 1.0)])).collect();
    let mut w: Vec<BTreeMap<u32, f64>> = if nonsym { z.clone() } else { Vec::new() };
    let mut d = vec![1.0; n];

    let sparse_dot = |row: &[(u32, f64)], col: &BTreeMap<u32, f64>| -> f64 {
        row.iter()
            .map(|&(k, a)| a * col.get(&k).copied().unwrap_or(0.0))
            .sum()
    };

    for i in 0..n {
        let p_i = sparse_dot(&a_rows[i], &z[i]);
        // Breakdown guard for (near-)zero pivots.
        let p_i = if p_i.abs() < 1e-12 { 1.0 } else { p_i };
        d[i] = p_i;

        for &(j, _) in &a_rows[i] {
            let j = j as usize;
            if j <= i {
                continue;
            }
            let p_j = sparse_dot(&a_rows[i], &z[j]);
            if p_j != 0.0 {
                let zi = z[i].clone();
                subtract_scaled(&mut z[j], &zi, p_j / p_i);
            }
            if nonsym {
                let q_j = sparse_dot(&a_cols[i], &w[j]);
                if q_j != 0.0 {
                    let wi = w[i].clone();
                    subtract_scaled(&mut w[j], &wi, q_j / p_i);
                }
            }
        }
    }

    (z, w, d)
}

fn subtract_scaled(col: &mut BTreeMap<u32, f64>, other: &BTreeMap<u32, f64>, factor: f64) {
    for (&k, &v) in other {
        *col.entry(k).or_insert(0.0) -= factor * v;
    }
    let max = col.values().fold(0.0f64, |m, v| m.max(v.abs()));
    let cutoff = AINV_DROP_TOL * max;
    col.retain(|_, v| v.abs() >= cutoff);
}

fn transpose_rows(rows: &[Vec<(u32, f64)>], n_cols: usize) -> Vec<Vec<(u32, f64)>> {
    let mut cols = vec![Vec::new(); n_cols];
    for (i, row) in rows.iter().enumerate() {
        for &(k, v) in row {
            cols[k as usize].push((i as u32, v));
        }
    }
    cols
}

/// Columns of a factor reinterpreted as rows of its transpose.
fn cols_as_rows(cols: &[BTreeMap<u32, f64>]) -> Vec<Vec<(u32, f64)>> {
    cols.iter()
        .map(|col| col.iter().map(|(&k, &v)| (k, v)).collect())
        .collect()
}

fn cols_to_rows(cols: &[BTreeMap<u32, f64>], n_rows: usize) -> Vec<Vec<(u32, f64)>> {
    let mut rows = vec![Vec::new(); n_rows];
    for (j, col) in cols.iter().enumerate() {
        for (&k, &v) in col {
            rows[k as usize].push((j as u32, v));
        }
    }
    rows
}

fn maps_to_rows(maps: &[BTreeMap<u32, f64>]) -> Vec<Vec<(u32, f64)>> {
    maps.iter()
        .map(|m| m.iter().map(|(&k, &v)| (k, v)).collect())
        .collect()
}

fn diagonal_of(topo: &EllTopology, values: &EllValues) -> Vec<f64> {
    let rows = topo.to_rows(values);
    (0..topo.num_rows)
        .map(|i| {
            rows[i]
                .iter()
                .find(|&&(c, _)| c as usize == i)
                .map(|&(_, v)| v)
                .unwrap_or(0.0)
        })
        .collect()
}

fn invert_guarded(d: &[f64]) -> Vec<f64> {
    d.iter()
        .map(|&v| if v.abs() < 1e-300 { 1.0 } else { 1.0 / v })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::cpu::CpuEngine;

    #[test]
    fn name_resolution_is_exact_and_case_sensitive() {
        assert_eq!(PreconditionerKind::from_name("no"), Some(PreconditionerKind::None));
        assert_eq!(
            PreconditionerKind::from_name("diagonal"),
            Some(PreconditionerKind::Diagonal)
        );
        assert_eq!(
            PreconditionerKind::from_name("smoothed_aggregation"),
            Some(PreconditionerKind::SmoothedAggregation)
        );
        assert_eq!(PreconditionerKind::from_name("Diagonal"), None);
        assert_eq!(PreconditionerKind::from_name("bogus"), None);
    }

    #[test]
    fn jacobi_scales_by_reciprocal_diagonal() {
        let engine = CpuEngine;
        let (topo, values) =
            EllTopology::from_rows(&[vec![(0u32, 2.0)], vec![(1, 4.0)], vec![(2, 0.5)]]);
        let a = engine.upload_matrix(&topo, &values).unwrap();
        let mut m = PreconditionerKind::Diagonal
            .build(&engine, &topo, &values)
            .unwrap();
        let r = vec![2.0, 4.0, 1.0];
        let mut z = vec![0.0; 3];
        m.apply(&engine, &a, &r, &mut z).unwrap();
        assert_eq!(z, vec![1.0, 1.0, 2.0]);
    }

    #[test]
    fn ainv_of_a_diagonal_matrix_is_its_inverse() {
        let engine = CpuEngine;
        let (topo, values) = EllTopology::from_rows(&[vec![(0u32, 2.0)], vec![(1, 8.0)]]);
        let a = engine.upload_matrix(&topo, &values).unwrap();
        for kind in [
            PreconditionerKind::ScaledBridsonAinv,
            PreconditionerKind::BridsonAinv,
            PreconditionerKind::NonsymBridsonAinv,
        ] {
            let mut m = kind.build(&engine, &topo, &values).unwrap();
            let r = vec![2.0, 8.0];
            let mut z = vec![0.0; 2];
            m.apply(&engine, &a, &r, &mut z).unwrap();
            assert!((z[0] - 1.0).abs() < 1e-12, "{kind:?}: {z:?}");
            assert!((z[1] - 1.0).abs() < 1e-12, "{kind:?}: {z:?}");
        }
    }

    #[test]
    fn aggregation_covers_every_cell() {
        let rows = vec![
            vec![(0u32, 2.0), (1, -1.0)],
            vec![(1, 2.0), (0, -1.0), (2, -1.0)],
            vec![(2, 2.0), (1, -1.0)],
        ];
        let agg = aggregate_greedy(&rows, 3);
        assert!(agg.iter().all(|&g| g != u32::MAX));
    }
}
