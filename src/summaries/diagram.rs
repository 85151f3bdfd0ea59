//! Fixed-capacity persistence diagrams
//!
//! Diagrams vary in size from sample to sample; downstream consumers want a
//! dense tensor. Each requested homology dimension gets `capacity` rows of
//! (birth, death), filled in enumeration order (most persistent first) and
//! zero padded. Extra pairs are dropped, and the true counts are kept so the
//! caller can detect truncation.

use ndarray::Array3;

use crate::topology::PersistencePair;

/// Zero-padded diagram, shape [n_dims, capacity, 2]
#[derive(Debug, Clone)]
pub struct PaddedDiagram {
    pub values: Array3<f64>,
    /// Number of pairs per requested dimension before truncation
    pub pair_counts: Vec<usize>,
    capacity: usize,
}

impl PaddedDiagram {
    /// Pack pairs into a dense diagram, replacing infinite deaths with `max_scale`
    pub fn from_pairs(
        pairs: &[PersistencePair],
        dimensions: &[usize],
        capacity: usize,
        max_scale: f64,
    ) -> Self {
        let mut values = Array3::<f64>::zeros((dimensions.len(), capacity, 2));
        let mut pair_counts = vec![0; dimensions.len()];

        for (i, &dim) in dimensions.iter().enumerate() {
            for pair in pairs.iter().filter(|p| p.dimension == dim) {
                let slot = pair_counts[i];
                pair_counts[i] += 1;
                if slot >= capacity {
                    continue;
                }
                let death = if pair.death.is_infinite() { max_scale } else { pair.death };
                values[[i, slot, 0]] = pair.birth;
                values[[i, slot, 1]] = death;
            }
        }

        Self {
            values,
            pair_counts,
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Largest pair count over the requested dimensions
    pub fn max_pair_count(&self) -> usize {
        self.pair_counts.iter().copied().max().unwrap_or(0)
    }

    /// True if some dimension had more pairs than the capacity
    pub fn overflowed(&self) -> bool {
        self.max_pair_count() > self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::topology::compute_cubical_persistence;
    use ndarray::{array, s};

    #[test]
    fn test_line_diagram() {
        let values = array![2.0, 0.0, 3.0, 0.0, 1.0];
        let pd = compute_cubical_persistence(&[5], values.view()).unwrap();
        let diag = PaddedDiagram::from_pairs(&pd.pairs, &[0], 4, 10.0);

        assert_eq!(diag.values.dim(), (1, 4, 2));
        assert_eq!(diag.values.slice(s![0, 0, ..]).to_vec(), vec![0.0, 10.0]);
        assert_eq!(diag.values.slice(s![0, 1, ..]).to_vec(), vec![0.0, 3.0]);
        assert!(diag.values.slice(s![0, 2.., ..]).iter().all(|v| *v == 0.0));
        assert_eq!(diag.pair_counts, vec![2]);
        assert!(!diag.overflowed());
    }

    #[test]
    fn test_truncation_keeps_most_persistent() {
        let pairs: Vec<PersistencePair> = [5.0, 4.0, 3.0, 2.0, 1.0]
            .iter()
            .enumerate()
            .map(|(i, &death)| PersistencePair {
                dimension: 1,
                birth: 0.0,
                death,
                birth_cell: i,
                death_cell: Some(i + 10),
            })
            .collect();
        let diag = PaddedDiagram::from_pairs(&pairs, &[0, 1], 3, 1.0);

        assert_eq!(diag.pair_counts, vec![0, 5]);
        assert_eq!(diag.max_pair_count(), 5);
        assert!(diag.overflowed());
        assert_eq!(diag.values.slice(s![1, .., 1]).to_vec(), vec![5.0, 4.0, 3.0]);
        assert!(diag.values.slice(s![0, .., ..]).iter().all(|v| *v == 0.0));
    }
}
