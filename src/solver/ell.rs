//! Conversion from face-based LDU connectivity to a fixed-row-capacity
//! (ELLPACK) sparse layout.
//!
//! Every row stores `max_entries_per_row` (column, value) slots, column-major
//! across rows (`slot * num_rows + row`) so adjacent GPU threads read adjacent
//! memory. Unused slots carry [`SENTINEL_COLUMN`] and a zero value, which the
//! sparse matrix-vector product treats as a no-op. Rows with few neighbors
//! waste padding; that is the accepted price of the fixed stride.

use crate::solver::args::LduSystemView;

/// Column marker for unused slots.
pub const SENTINEL_COLUMN: u32 = u32::MAX;

/// Index structure of an ELL matrix, plus the write plan that lets a value
/// refresh run without re-deriving the topology.
#[derive(Clone, Debug, PartialEq)]
pub struct EllTopology {
    pub num_rows: usize,
    pub max_entries_per_row: usize,
    /// `column_indices[slot * num_rows + row]`, sentinel-padded.
    pub column_indices: Vec<u32>,
    /// For each lower entry in traversal order: (flat slot position, face id).
    low_plan: Vec<(u32, u32)>,
    /// Same for the upper entries.
    up_plan: Vec<(u32, u32)>,
}

/// Value array matching an [`EllTopology`]. Sentinel slots hold 0.0.
#[derive(Clone, Debug, PartialEq)]
pub struct EllValues(pub Vec<f64>);

impl EllTopology {
    /// Converts LDU connectivity into ELL index structure and a first value
    /// fill. O(N + F); no faces are dropped. Zero cells or faces produce a
    /// degenerate but valid matrix. Expects a view that already passed
    /// validation.
    ///
    /// The row capacity is 1 (diagonal) + the maximum cell degree over the
    /// whole mesh. Each row lays out its diagonal first, then its lower
    /// neighbors, then its upper neighbors.
    pub fn from_ldu(view: &LduSystemView) -> (Self, EllValues) {
        let n = view.n_cells;

        let degree = |i: usize| -> usize {
            let low = (view.low_faces_start[i + 1] - view.low_faces_start[i]) as usize;
            let up = (view.up_faces_start[i + 1] - view.up_faces_start[i]) as usize;
            low + up
        };

        let max_entries_per_row = if n == 0 {
            0
        } else {
            1 + (0..n).map(degree).max().unwrap_or(0)
        };

        let mut column_indices = vec![SENTINEL_COLUMN; max_entries_per_row * n];
        let mut values = vec![0.0; max_entries_per_row * n];
        let total_low = *view.low_faces_start.last().unwrap_or(&0) as usize;
        let total_up = *view.up_faces_start.last().unwrap_or(&0) as usize;
        let mut low_plan = Vec::with_capacity(total_low);
        let mut up_plan = Vec::with_capacity(total_up);

        for row in 0..n {
            column_indices[row] = row as u32;
            values[row] = view.diag_cell_value[row];
            let mut slot = 1;

            for k in view.low_faces_start[row] as usize..view.low_faces_start[row + 1] as usize {
                let face = view.low_face[k] as usize;
                let pos = slot * n + row;
                column_indices[pos] = view.low_face_to_cell[face];
                values[pos] = view.low_cell_value_from_face[face];
                low_plan.push((pos as u32, face as u32));
                slot += 1;
            }

            for face in view.up_faces_start[row] as usize..view.up_faces_start[row + 1] as usize {
                let pos = slot * n + row;
                column_indices[pos] = view.up_face_to_cell[face];
                values[pos] = view.up_cell_value_from_face[face];
                up_plan.push((pos as u32, face as u32));
                slot += 1;
            }
        }

        (
            Self {
                num_rows: n,
                max_entries_per_row,
                column_indices,
                low_plan,
                up_plan,
            },
            EllValues(values),
        )
    }

    /// Builds an ELL matrix from explicit per-row (column, value) entries.
    /// Used for preconditioner factors; such matrices are never refreshed.
    pub fn from_rows(rows: &[Vec<(u32, f64)>]) -> (Self, EllValues) {
        let n = rows.len();
        let max_entries_per_row = rows.iter().map(Vec::len).max().unwrap_or(0);
        let mut column_indices = vec![SENTINEL_COLUMN; max_entries_per_row * n];
        let mut values = vec![0.0; max_entries_per_row * n];

        for (row, entries) in rows.iter().enumerate() {
            for (slot, &(col, val)) in entries.iter().enumerate() {
                column_indices[slot * n + row] = col;
                values[slot * n + row] = val;
            }
        }

        (
            Self {
                num_rows: n,
                max_entries_per_row,
                column_indices,
                low_plan: Vec::new(),
                up_plan: Vec::new(),
            },
            EllValues(values),
        )
    }

    /// Expands back to per-row (column, value) entries, diagonal-first order
    /// preserved. Host-side preconditioner setup starts from this.
    pub fn to_rows(&self, values: &EllValues) -> Vec<Vec<(u32, f64)>> {
        let n = self.num_rows;
        let mut rows = vec![Vec::new(); n];
        for slot in 0..self.max_entries_per_row {
            for row in 0..n {
                let col = self.column_indices[slot * n + row];
                if col != SENTINEL_COLUMN {
                    rows[row].push((col, values.0[slot * n + row]));
                }
            }
        }
        rows
    }

    /// Number of populated (non-sentinel) slots in `row`.
    pub fn row_population(&self, row: usize) -> usize {
        (0..self.max_entries_per_row)
            .filter(|slot| self.column_indices[slot * self.num_rows + row] != SENTINEL_COLUMN)
            .count()
    }
}

impl EllValues {
    /// Overwrites the coefficient array for unchanged topology. Pure
    /// overwrite: index arrays are neither reordered nor resized. Must run
    /// every solve call, since coefficients change even when connectivity
    /// does not.
    pub fn refresh(&mut self, topo: &EllTopology, view: &LduSystemView) {
        for row in 0..topo.num_rows {
            self.0[row] = view.diag_cell_value[row];
        }
        for &(pos, face) in &topo.low_plan {
            self.0[pos as usize] = view.low_cell_value_from_face[face as usize];
        }
        for &(pos, face) in &topo.up_plan {
            self.0[pos as usize] = view.up_cell_value_from_face[face as usize];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_round_trips() {
        let rows = vec![
            vec![(0u32, 2.0), (1, -1.0)],
            vec![(1, 2.0)],
            vec![(2, 2.0), (0, -0.5), (1, -0.5)],
        ];
        let (topo, values) = EllTopology::from_rows(&rows);
        assert_eq!(topo.max_entries_per_row, 3);
        assert_eq!(topo.row_population(1), 1);
        assert_eq!(topo.to_rows(&values), rows);
    }

    #[test]
    fn empty_input_yields_empty_matrix() {
        let view = LduSystemView {
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
        };
        let (topo, values) = EllTopology::from_ldu(&view);
        assert_eq!(topo.num_rows, 0);
        assert_eq!(topo.max_entries_per_row, 0);
        assert!(values.0.is_empty());
    }
}
