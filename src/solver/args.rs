use crate::solver::error::SolveError;

/// Borrowed view of a face-based LDU system, as assembled by a finite-volume
/// caller. The caller owns every slice for the duration of the solve.
///
/// Addressing convention (lower-triangle entries need one indirection, upper
/// entries are naturally face-ordered):
///
/// * row `i` owns the upper entries for faces `up_faces_start[i]..up_faces_start[i+1]`;
///   face `f` contributes `up_cell_value_from_face[f]` at column `up_face_to_cell[f]`.
/// * row `i` owns the lower entries for positions `low_faces_start[i]..low_faces_start[i+1]`
///   of `low_face`; with `f = low_face[k]`, face `f` contributes
///   `low_cell_value_from_face[f]` at column `low_face_to_cell[f]`.
///
/// Every face links exactly two cells, so it appears exactly once on each
/// side. Duplicate or self-referencing faces are passed through unchanged.
#[derive(Clone, Copy, Debug)]
pub struct LduSystemView<'a> {
    pub n_cells: usize,
    pub n_faces: usize,
    pub low_faces_start: &'a [u32],
    pub low_face: &'a [u32],
    pub low_face_to_cell: &'a [u32],
    pub low_cell_value_from_face: &'a [f64],
    pub diag_cell_value: &'a [f64],
    pub up_faces_start: &'a [u32],
    pub up_face_to_cell: &'a [u32],
    pub up_cell_value_from_face: &'a [f64],
}

impl LduSystemView<'_> {
    /// Fail-fast structural validation, run once per solve before anything
    /// touches the device.
    pub fn validate(&self) -> Result<(), SolveError> {
        let n = self.n_cells;
        let f = self.n_faces;

        check_len("low_faces_start", self.low_faces_start.len(), n + 1)?;
        check_len("up_faces_start", self.up_faces_start.len(), n + 1)?;
        check_len("low_face", self.low_face.len(), f)?;
        check_len("low_face_to_cell", self.low_face_to_cell.len(), f)?;
        check_len(
            "low_cell_value_from_face",
            self.low_cell_value_from_face.len(),
            f,
        )?;
        check_len("diag_cell_value", self.diag_cell_value.len(), n)?;
        check_len("up_face_to_cell", self.up_face_to_cell.len(), f)?;
        check_len(
            "up_cell_value_from_face",
            self.up_cell_value_from_face.len(),
            f,
        )?;

        check_offsets("low_faces_start", self.low_faces_start, f)?;
        check_offsets("up_faces_start", self.up_faces_start, f)?;

        check_ids("low_face", self.low_face, f)?;
        check_ids("low_face_to_cell", self.low_face_to_cell, n)?;
        check_ids("up_face_to_cell", self.up_face_to_cell, n)?;

        Ok(())
    }
}

fn check_len(name: &str, got: usize, want: usize) -> Result<(), SolveError> {
    if got != want {
        return Err(SolveError::invalid(format!(
            "{name} has length {got}, expected {want}"
        )));
    }
    Ok(())
}

fn check_offsets(name: &str, offsets: &[u32], total: usize) -> Result<(), SolveError> {
    if offsets.first() != Some(&0) {
        return Err(SolveError::invalid(format!("{name} must start at 0")));
    }
    if let Some(w) = offsets.windows(2).position(|w| w[0] > w[1]) {
        return Err(SolveError::invalid(format!(
            "{name} decreases at position {w}"
        )));
    }
    let last = *offsets.last().unwrap_or(&0) as usize;
    if last != total {
        return Err(SolveError::invalid(format!(
            "{name} ends at {last}, expected {total}"
        )));
    }
    Ok(())
}

fn check_ids(name: &str, ids: &[u32], bound: usize) -> Result<(), SolveError> {
    if let Some(pos) = ids.iter().position(|&id| id as usize >= bound) {
        return Err(SolveError::invalid(format!(
            "{name}[{pos}] = {} is out of range (< {bound} required)",
            ids[pos]
        )));
    }
    Ok(())
}

/// Read-only description of one solve. The solution buffer travels separately
/// as `&mut [f64]` so that inputs and outputs never alias.
#[derive(Clone, Copy, Debug)]
pub struct SolveRequest<'a> {
    /// One of `"no"`, `"diagonal"`, `"smoothed_aggregation"`,
    /// `"scaled_bridson_ainv"`, `"bridson_ainv"`, `"nonsym_bridson_ainv"`.
    /// Anything else selects the identity preconditioner with a warning.
    pub preconditioner: &'a str,
    pub system: LduSystemView<'a>,
    /// Right-hand side, length `n_cells`.
    pub b_source: &'a [f64],
    pub max_iterations: u32,
    pub relative_tolerance: f64,
    pub absolute_tolerance: f64,
}

/// Outcome of one solve. Residuals are normalized by the telemetry scale,
/// matching the finite-volume convention of the callers this crate serves.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SolveStats {
    pub initial_residual: f64,
    pub final_residual: f64,
    pub iterations: u32,
    pub converged: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_view() -> LduSystemView<'static> {
        LduSystemView {
            n_cells: 0,
            n_faces: 0,
            low_faces_start: &[0],
            low_face: &[],
            low_face_to_cell: &[],
            low_cell_value_from_face: &[],
            diag_cell_value: &[],
            up_faces_start: &[0],
            up_face_to_cell: &[],
            up_cell_value_from_face: &[],
        }
    }

    #[test]
    fn empty_system_is_valid() {
        assert!(empty_view().validate().is_ok());
    }

    #[test]
    fn decreasing_offsets_are_rejected() {
        let low_faces_start = [0u32, 2, 1];
        let up_faces_start = [0u32, 1, 2];
        let faces = [0u32, 1];
        let cells = [0u32, 1];
        let vals = [1.0, 1.0];
        let diag = [1.0, 1.0];
        let view = LduSystemView {
            n_cells: 2,
            n_faces: 2,
            low_faces_start: &low_faces_start,
            low_face: &faces,
            low_face_to_cell: &cells,
            low_cell_value_from_face: &vals,
            diag_cell_value: &diag,
            up_faces_start: &up_faces_start,
            up_face_to_cell: &cells,
            up_cell_value_from_face: &vals,
        };
        let err = view.validate().unwrap_err();
        assert!(err.to_string().contains("low_faces_start"));
    }
}
