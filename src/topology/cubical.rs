//! Cubical Complex over a Regular Grid
//!
//! A scalar field sampled on an n₀ × n₁ × ... grid is read as the values of
//! the top-dimensional cubes of a cubical complex. Every lower-dimensional
//! cube (faces, edges, vertices) enters the filtration together with its
//! first top-dimensional coface:
//!
//!   f(σ) = min { f(τ) : τ top-dimensional, σ ⊆ τ }
//!
//! ## Bitmap Representation
//!
//! Cells are stored in a bitmap with 2nᵢ + 1 slots per axis. A cell with
//! coordinates (c₀, c₁, ...) spans axis i iff cᵢ is odd, so its dimension is
//! the number of odd coordinates and top-dimensional cells have all odd
//! coordinates. The top cell with odd coordinates 2gᵢ + 1 corresponds to grid
//! point (g₀, g₁, ...), with the first axis varying fastest in both layouts.

use ndarray::ArrayView1;

use crate::error::{Result, TopoError};

/// Filtered cubical complex built from top-dimensional cell values
#[derive(Debug, Clone)]
pub struct CubicalComplex {
    /// Top cells per axis
    shape: Vec<usize>,
    /// Bitmap extent per axis (2nᵢ + 1)
    extents: Vec<usize>,
    /// Bitmap stride per axis
    strides: Vec<usize>,
    /// Filtration value per bitmap cell
    filtration: Vec<f64>,
}

impl CubicalComplex {
    /// Build the complex for a field over a grid of the given shape
    ///
    /// # Arguments
    /// * `shape` - Number of grid points per axis
    /// * `values` - Field value per grid point, first axis fastest
    pub fn from_top_cells(shape: &[usize], values: ArrayView1<'_, f64>) -> Result<Self> {
        if shape.is_empty() || shape.contains(&0) {
            return Err(TopoError::empty_input("cubical complex shape"));
        }
        let n_top: usize = shape.iter().product();
        if values.len() != n_top {
            return Err(TopoError::dimension_mismatch("field vs grid", n_top, values.len()));
        }
        if values.iter().any(|v| !v.is_finite()) {
            return Err(TopoError::non_finite("scalar field"));
        }

        let extents: Vec<usize> = shape.iter().map(|&n| 2 * n + 1).collect();
        let mut strides = Vec::with_capacity(extents.len());
        let mut stride = 1;
        for &e in &extents {
            strides.push(stride);
            stride *= e;
        }
        let n_cells = stride;

        let mut complex = Self {
            shape: shape.to_vec(),
            extents,
            strides,
            filtration: vec![f64::INFINITY; n_cells],
        };

        for (g, &v) in values.iter().enumerate() {
            let cell = complex.top_cell(g);
            complex.filtration[cell] = v;
        }

        // Sweep axis by axis: a cell that is even along axis i and odd along
        // every later axis takes the minimum of its two neighbours along i,
        // which were filled in by earlier sweeps.
        let dim = complex.dimension();
        let mut coords = vec![0usize; dim];
        for axis in 0..dim {
            for cell in 0..n_cells {
                complex.fill_coordinates(cell, &mut coords);
                if coords[axis] % 2 != 0 || coords[axis + 1..].iter().any(|c| c % 2 == 0) {
                    continue;
                }
                let stride = complex.strides[axis];
                let mut value = f64::INFINITY;
                if coords[axis] > 0 {
                    value = value.min(complex.filtration[cell - stride]);
                }
                if coords[axis] + 1 < complex.extents[axis] {
                    value = value.min(complex.filtration[cell + stride]);
                }
                complex.filtration[cell] = value;
            }
        }

        Ok(complex)
    }

    /// Spatial dimension of the complex
    pub fn dimension(&self) -> usize {
        self.shape.len()
    }

    /// Number of grid points per axis
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Total number of cells of every dimension
    pub fn n_cells(&self) -> usize {
        self.filtration.len()
    }

    /// Number of top-dimensional cells (grid points)
    pub fn n_top_cells(&self) -> usize {
        self.shape.iter().product()
    }

    /// Filtration value of a cell
    pub fn filtration(&self, cell: usize) -> f64 {
        self.filtration[cell]
    }

    /// Dimension of a cell (number of odd bitmap coordinates)
    pub fn cell_dimension(&self, cell: usize) -> usize {
        self.extents
            .iter()
            .zip(&self.strides)
            .filter(|&(&e, &s)| (cell / s) % e % 2 == 1)
            .count()
    }

    /// Bitmap cell of the top-dimensional cube for grid point `g`
    pub fn top_cell(&self, g: usize) -> usize {
        let mut rest = g;
        let mut cell = 0;
        for (&n, &stride) in self.shape.iter().zip(&self.strides) {
            cell += (2 * (rest % n) + 1) * stride;
            rest /= n;
        }
        cell
    }

    /// Grid point of a top-dimensional cell, None for lower cells
    pub fn grid_index(&self, cell: usize) -> Option<usize> {
        let mut g = 0;
        let mut scale = 1;
        for ((&e, &stride), &n) in self.extents.iter().zip(&self.strides).zip(&self.shape) {
            let c = (cell / stride) % e;
            if c % 2 == 0 {
                return None;
            }
            g += (c - 1) / 2 * scale;
            scale *= n;
        }
        Some(g)
    }

    /// Codimension-one faces of a cell
    pub fn boundary(&self, cell: usize) -> Vec<usize> {
        let mut faces = Vec::with_capacity(2 * self.dimension());
        for (&e, &stride) in self.extents.iter().zip(&self.strides) {
            if (cell / stride) % e % 2 == 1 {
                faces.push(cell - stride);
                faces.push(cell + stride);
            }
        }
        faces
    }

    /// Grid point whose value gives the cell its filtration value
    ///
    /// Among the top-dimensional cofaces attaining the minimum, the one with
    /// the lowest grid index is returned.
    pub fn critical_top_cell(&self, cell: usize) -> usize {
        let mut candidates = vec![cell];
        for (&e, &stride) in self.extents.iter().zip(&self.strides) {
            let c = (cell / stride) % e;
            if c % 2 == 1 {
                continue;
            }
            let mut expanded = Vec::with_capacity(candidates.len() * 2);
            for &cand in &candidates {
                if c > 0 {
                    expanded.push(cand - stride);
                }
                if c + 1 < e {
                    expanded.push(cand + stride);
                }
            }
            candidates = expanded;
        }

        candidates
            .into_iter()
            .filter_map(|top| self.grid_index(top).map(|g| (self.filtration[top], g)))
            .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
            .map(|(_, g)| g)
            .unwrap_or(0)
    }

    /// All cells sorted by (filtration value, dimension, bitmap index)
    ///
    /// Faces always precede their cofaces in this order, so it is a valid
    /// filtration ordering.
    pub fn filtration_order(&self) -> Vec<usize> {
        let dims: Vec<usize> = (0..self.n_cells()).map(|c| self.cell_dimension(c)).collect();
        let mut order: Vec<usize> = (0..self.n_cells()).collect();
        order.sort_by(|&a, &b| {
            self.filtration[a]
                .total_cmp(&self.filtration[b])
                .then(dims[a].cmp(&dims[b]))
                .then(a.cmp(&b))
        });
        order
    }

    fn fill_coordinates(&self, cell: usize, coords: &mut [usize]) {
        for ((c, &e), &stride) in coords.iter_mut().zip(&self.extents).zip(&self.strides) {
            *c = (cell / stride) % e;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_line_filtration() {
        let values = array![2.0, 0.0, 3.0, 0.0, 1.0];
        let cx = CubicalComplex::from_top_cells(&[5], values.view()).unwrap();

        assert_eq!(cx.n_cells(), 11);
        let filtration: Vec<f64> = (0..11).map(|c| cx.filtration(c)).collect();
        assert_eq!(
            filtration,
            vec![2.0, 2.0, 0.0, 0.0, 0.0, 3.0, 0.0, 0.0, 0.0, 1.0, 1.0]
        );
        assert_eq!(cx.cell_dimension(0), 0);
        assert_eq!(cx.cell_dimension(5), 1);
    }

    #[test]
    fn test_square_vertex_takes_min_of_four() {
        let values = array![4.0, 3.0, 2.0, 1.0];
        let cx = CubicalComplex::from_top_cells(&[2, 2], values.view()).unwrap();

        // Centre vertex of the 5x5 bitmap touches all four squares
        let centre = 2 + 5 * 2;
        assert_eq!(cx.cell_dimension(centre), 0);
        assert_eq!(cx.filtration(centre), 1.0);
        assert_eq!(cx.critical_top_cell(centre), 3);

        // Bottom-left corner only touches square 0
        assert_eq!(cx.filtration(0), 4.0);
        assert_eq!(cx.critical_top_cell(0), 0);
    }

    #[test]
    fn test_top_cell_round_trip() {
        let values = ndarray::Array1::<f64>::zeros(3 * 4 * 2);
        let cx = CubicalComplex::from_top_cells(&[3, 4, 2], values.view()).unwrap();
        for g in 0..cx.n_top_cells() {
            let cell = cx.top_cell(g);
            assert_eq!(cx.cell_dimension(cell), 3);
            assert_eq!(cx.grid_index(cell), Some(g));
        }
    }

    #[test]
    fn test_order_puts_faces_first() {
        let values = array![1.0, 5.0, 2.0, 0.5, 3.0, 4.0];
        let cx = CubicalComplex::from_top_cells(&[3, 2], values.view()).unwrap();
        let order = cx.filtration_order();

        let mut position = vec![0; order.len()];
        for (pos, &cell) in order.iter().enumerate() {
            position[cell] = pos;
        }
        for cell in 0..cx.n_cells() {
            for face in cx.boundary(cell) {
                assert!(position[face] < position[cell]);
            }
        }
    }

    #[test]
    fn test_rejects_bad_fields() {
        assert!(CubicalComplex::from_top_cells(&[3], array![1.0, 2.0].view()).is_err());
        assert!(CubicalComplex::from_top_cells(&[2], array![1.0, f64::NAN].view()).is_err());
        assert!(CubicalComplex::from_top_cells(&[], array![1.0].view()).is_err());
    }
}
