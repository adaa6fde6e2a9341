mod common;

use common::LduFixture;
use ldusolve::solver::ell::{EllTopology, EllValues, SENTINEL_COLUMN};

#[test]
fn row_population_matches_cell_degree() {
    let fixture = LduFixture::grid_poisson(4, 3);
    let view = fixture.view();
    let (topo, _values) = EllTopology::from_ldu(&view);

    let max_degree = (0..fixture.n_cells).map(|i| fixture.degree(i)).max().unwrap();
    assert_eq!(topo.max_entries_per_row, 1 + max_degree);

    for cell in 0..fixture.n_cells {
        let k = fixture.degree(cell);
        assert_eq!(topo.row_population(cell), 1 + k, "cell {cell}");
        let padded = (0..topo.max_entries_per_row)
            .filter(|slot| topo.column_indices[slot * topo.num_rows + cell] == SENTINEL_COLUMN)
            .count();
        assert_eq!(padded, topo.max_entries_per_row - 1 - k, "cell {cell}");
    }
}

#[test]
fn conversion_places_every_coefficient() {
    let fixture = LduFixture::grid_poisson(3, 3);
    let view = fixture.view();
    let (topo, values) = EllTopology::from_ldu(&view);

    let rows = topo.to_rows(&values);
    for (i, row) in rows.iter().enumerate() {
        // Diagonal first.
        assert_eq!(row[0], (i as u32, fixture.diag[i]));
    }
    for &(lo, hi, low, up) in &fixture.faces {
        assert!(rows[lo as usize].contains(&(hi, up)), "missing upper ({lo},{hi})");
        assert!(rows[hi as usize].contains(&(lo, low)), "missing lower ({hi},{lo})");
    }
}

#[test]
fn refresh_overwrites_values_without_touching_indices() {
    let fixture = LduFixture::grid_poisson(4, 4);
    let view = fixture.view();
    let (topo, mut values) = EllTopology::from_ldu(&view);
    let columns_before = topo.column_indices.clone();

    let mut scaled = LduFixture::grid_poisson(4, 4);
    for v in scaled
        .diag
        .iter_mut()
        .chain(scaled.low_values.iter_mut())
        .chain(scaled.up_values.iter_mut())
    {
        *v *= 3.0;
    }
    values.refresh(&topo, &scaled.view());

    assert_eq!(topo.column_indices, columns_before);
    let (_, fresh) = EllTopology::from_ldu(&scaled.view());
    assert_eq!(values, fresh);
}

#[test]
fn single_cell_matrix_is_diagonal_only() {
    let fixture = LduFixture::from_faces(1, vec![], vec![7.5]);
    let (topo, values) = EllTopology::from_ldu(&fixture.view());
    assert_eq!(topo.max_entries_per_row, 1);
    assert_eq!(topo.to_rows(&values), vec![vec![(0u32, 7.5)]]);
}
