//! Cubical Persistent Homology via Boundary Matrix Reduction
//!
//! Computes birth/death pairs of a filtered cubical complex with Z/2Z
//! coefficients, and records for every pair the grid cells whose field values
//! are its birth and death.
//!
//! ## Algorithm Overview
//!
//! 1. Sort cells by (filtration value, dimension, index)
//! 2. Reduce boundary columns, highest dimension first
//! 3. Clear the column of every pivot row: a cell that kills nothing and is
//!    itself killed reduces to zero, so it is skipped
//! 4. Pair (low(j), j) for every non-zero reduced column j; cells that are
//!    neither paired nor killing give essential classes
//!
//! ## Critical Cells
//!
//! The filtration value of any cell is the field value at one of its
//! top-dimensional cofaces. The birth (death) of a pair therefore equals the
//! field value at a single grid point, and its derivative with respect to the
//! field is an indicator on that grid point.
//!
//! ## Reference
//!
//! Edelsbrunner, Letscher, Zomorodian (2002). "Topological Persistence
//! and Simplification". Discrete & Computational Geometry.
//! Chen, Kerber (2011). "Persistent Homology Computation with a Twist".

use std::collections::BTreeSet;

use ndarray::ArrayView1;

use super::cubical::CubicalComplex;
use crate::error::Result;

/// A persistence pair with the grid cells that create and destroy it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PersistencePair {
    /// Homology dimension
    pub dimension: usize,
    /// Filtration value at birth
    pub birth: f64,
    /// Filtration value at death (infinite for essential classes)
    pub death: f64,
    /// Grid point whose value is `birth`
    pub birth_cell: usize,
    /// Grid point whose value is `death`, None for essential classes
    pub death_cell: Option<usize>,
}

impl PersistencePair {
    pub fn persistence(&self) -> f64 {
        if self.death.is_infinite() {
            f64::INFINITY
        } else {
            self.death - self.birth
        }
    }

    pub fn is_essential(&self) -> bool {
        self.death_cell.is_none()
    }
}

/// Persistence pairs of a cubical complex
///
/// Pairs are ordered by dimension, then by decreasing persistence (essential
/// classes first), then by birth cell.
#[derive(Debug, Clone, Default)]
pub struct CubicalPersistence {
    pub pairs: Vec<PersistencePair>,
}

impl CubicalPersistence {
    /// Pairs of dimension d, in enumeration order
    pub fn dim(&self, d: usize) -> Vec<&PersistencePair> {
        self.pairs.iter().filter(|p| p.dimension == d).collect()
    }

    /// Number of pairs of dimension d
    pub fn count(&self, d: usize) -> usize {
        self.pairs.iter().filter(|p| p.dimension == d).count()
    }
}

/// Sparse column over Z/2Z
#[derive(Debug, Clone, Default)]
struct SparseColumn {
    /// Non-zero rows, as positions in the filtration order
    rows: BTreeSet<usize>,
}

impl SparseColumn {
    fn from_rows(rows: impl IntoIterator<Item = usize>) -> Self {
        let mut column = Self::default();
        for row in rows {
            column.toggle(row);
        }
        column
    }

    fn is_zero(&self) -> bool {
        self.rows.is_empty()
    }

    /// Lowest (last in filtration order) non-zero row
    fn low(&self) -> Option<usize> {
        self.rows.iter().next_back().copied()
    }

    fn toggle(&mut self, row: usize) {
        if !self.rows.remove(&row) {
            self.rows.insert(row);
        }
    }

    /// Column addition in Z/2Z (symmetric difference)
    fn add_assign(&mut self, other: &SparseColumn) {
        for &row in &other.rows {
            self.toggle(row);
        }
    }
}

impl CubicalComplex {
    /// Persistence pairs with strictly positive persistence
    pub fn persistence(&self) -> CubicalPersistence {
        let order = self.filtration_order();
        let n = order.len();

        let mut position = vec![0usize; n];
        for (pos, &cell) in order.iter().enumerate() {
            position[cell] = pos;
        }
        let dims: Vec<usize> = order.iter().map(|&cell| self.cell_dimension(cell)).collect();

        let mut columns: Vec<SparseColumn> = vec![SparseColumn::default(); n];
        let mut low_to_col: Vec<Option<usize>> = vec![None; n];
        let mut cleared = vec![false; n];

        for dim in (1..=self.dimension()).rev() {
            for pos in 0..n {
                if dims[pos] != dim || cleared[pos] {
                    continue;
                }

                let faces = self.boundary(order[pos]).into_iter().map(|f| position[f]);
                let mut column = SparseColumn::from_rows(faces);

                while let Some(low) = column.low() {
                    match low_to_col[low] {
                        Some(pivot) => column.add_assign(&columns[pivot]),
                        None => break,
                    }
                }

                if let Some(low) = column.low() {
                    low_to_col[low] = Some(pos);
                    cleared[low] = true;
                }
                columns[pos] = column;
            }
        }

        let mut diagram = CubicalPersistence::default();
        let mut paired = vec![false; n];

        for (pos, column) in columns.iter().enumerate() {
            if let Some(low) = column.low() {
                paired[low] = true;
                paired[pos] = true;

                let birth_cell = order[low];
                let death_cell = order[pos];
                if self.filtration(death_cell) > self.filtration(birth_cell) {
                    diagram.pairs.push(PersistencePair {
                        dimension: dims[low],
                        birth: self.filtration(birth_cell),
                        death: self.filtration(death_cell),
                        birth_cell: self.critical_top_cell(birth_cell),
                        death_cell: Some(self.critical_top_cell(death_cell)),
                    });
                }
            }
        }

        for (pos, column) in columns.iter().enumerate() {
            if !paired[pos] && column.is_zero() {
                let cell = order[pos];
                diagram.pairs.push(PersistencePair {
                    dimension: dims[pos],
                    birth: self.filtration(cell),
                    death: f64::INFINITY,
                    birth_cell: self.critical_top_cell(cell),
                    death_cell: None,
                });
            }
        }

        diagram.pairs.sort_by(|a, b| {
            a.dimension
                .cmp(&b.dimension)
                .then(b.persistence().total_cmp(&a.persistence()))
                .then(a.birth_cell.cmp(&b.birth_cell))
                .then(a.death_cell.cmp(&b.death_cell))
        });

        log::trace!(
            "cubical persistence: {} cells, {} pairs",
            n,
            diagram.pairs.len()
        );

        diagram
    }
}

/// Persistence of a field over a grid of the given shape
pub fn compute_cubical_persistence(
    shape: &[usize],
    values: ArrayView1<'_, f64>,
) -> Result<CubicalPersistence> {
    Ok(CubicalComplex::from_top_cells(shape, values)?.persistence())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array1};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn chebyshev_shell(shape: &[usize]) -> Array1<f64> {
        // 0 on the shell around the centre, 5 at the centre, 3 outside
        let n: usize = shape.iter().product();
        let mut values = Array1::<f64>::zeros(n);
        for g in 0..n {
            let mut rest = g;
            let mut radius = 0usize;
            for &len in shape {
                let c = rest % len;
                rest /= len;
                radius = radius.max(c.abs_diff(len / 2));
            }
            values[g] = match radius {
                0 => 5.0,
                1 => 0.0,
                _ => 3.0,
            };
        }
        values
    }

    #[test]
    fn test_line_two_minima() {
        let values = array![2.0, 0.0, 3.0, 0.0, 1.0];
        let pd = compute_cubical_persistence(&[5], values.view()).unwrap();

        assert_eq!(
            pd.dim(0).into_iter().copied().collect::<Vec<_>>(),
            vec![
                PersistencePair {
                    dimension: 0,
                    birth: 0.0,
                    death: f64::INFINITY,
                    birth_cell: 1,
                    death_cell: None,
                },
                PersistencePair {
                    dimension: 0,
                    birth: 0.0,
                    death: 3.0,
                    birth_cell: 3,
                    death_cell: Some(2),
                },
            ]
        );
        assert_eq!(pd.pairs.len(), 2);
    }

    #[test]
    fn test_monotone_line_has_single_class() {
        let values = array![0.0, 1.0, 2.0, 3.0];
        let pd = compute_cubical_persistence(&[4], values.view()).unwrap();

        assert_eq!(pd.pairs.len(), 1);
        assert!(pd.pairs[0].is_essential());
        assert_eq!(pd.pairs[0].birth_cell, 0);
    }

    #[test]
    fn test_ring_has_one_loop() {
        let values = chebyshev_shell(&[5, 5]);
        let pd = compute_cubical_persistence(&[5, 5], values.view()).unwrap();

        let h1 = pd.dim(1);
        assert_eq!(h1.len(), 1);
        assert_eq!(h1[0].birth, 0.0);
        assert_eq!(h1[0].death, 5.0);
        assert_eq!(h1[0].death_cell, Some(12));
        assert_eq!(values[h1[0].birth_cell], 0.0);

        let h0 = pd.dim(0);
        assert_eq!(h0.len(), 1);
        assert!(h0[0].is_essential());
    }

    #[test]
    fn test_hollow_cube_has_one_void() {
        let values = chebyshev_shell(&[5, 5, 5]);
        let pd = compute_cubical_persistence(&[5, 5, 5], values.view()).unwrap();

        let h2 = pd.dim(2);
        assert_eq!(h2.len(), 1);
        assert_eq!(h2[0].birth, 0.0);
        assert_eq!(h2[0].death, 5.0);
        assert_eq!(h2[0].death_cell, Some(62));
        assert_eq!(pd.count(1), 0);
        assert_eq!(pd.count(0), 1);
    }

    #[test]
    fn test_pairs_read_field_at_critical_cells() {
        let mut rng = StdRng::seed_from_u64(42);
        let shape = [7, 6];
        let values = Array1::from_shape_fn(42, |_| rng.gen_range(0.0..1.0));
        let pd = compute_cubical_persistence(&shape, values.view()).unwrap();

        assert!(!pd.pairs.is_empty());
        for pair in &pd.pairs {
            assert!(pair.birth < pair.death);
            assert_eq!(values[pair.birth_cell], pair.birth);
            match pair.death_cell {
                Some(cell) => assert_eq!(values[cell], pair.death),
                None => assert!(pair.death.is_infinite()),
            }
        }

        let essential: Vec<_> = pd.pairs.iter().filter(|p| p.is_essential()).collect();
        assert_eq!(essential.len(), 1);
        assert_eq!(essential[0].dimension, 0);
        let global_min = values.iter().cloned().fold(f64::INFINITY, f64::min);
        assert_eq!(essential[0].birth, global_min);
    }

    #[test]
    fn test_enumeration_order() {
        let values = array![0.0, 4.0, 1.0, 2.0, 0.5, 5.0, 3.0];
        let pd = compute_cubical_persistence(&[7], values.view()).unwrap();

        let persistences: Vec<f64> = pd.dim(0).iter().map(|p| p.persistence()).collect();
        assert!(persistences[0].is_infinite());
        assert!(persistences.windows(2).all(|w| w[0] >= w[1]));
        // Minima at 0, 0.5, 1 and the boundary value 3
        assert_eq!(persistences.len(), 4);
        assert_eq!(&persistences[1..], &[3.5, 2.0, 1.0]);
    }
}
