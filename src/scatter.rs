//! Scatter-Add: the inverse of a gather
//!
//! Gradients in this crate are first computed densely over a short list of
//! contributors (the k nearest neighbours of a grid point, or the critical
//! cells of the pair selected at a landscape rank) and then scattered into a
//! dense buffer indexed by input element.
//!
//! Several contributors may target the same input element. Their updates are
//! summed, never overwritten.

use ndarray::{ArrayView, ArrayViewMut, Axis, Dimension, RemoveAxis};

/// Add `updates[j, ...]` into `target[indices[j], ...]` for every `j`.
///
/// The scatter axis is axis 0 of both arrays; the remaining axes of
/// `updates` must match those of `target`.
///
/// # Panics
/// Panics if an index is out of bounds for axis 0 of `target`, or if the
/// trailing shapes disagree.
pub fn scatter_add<D>(
    mut target: ArrayViewMut<'_, f64, D>,
    indices: &[usize],
    updates: ArrayView<'_, f64, D>,
) where
    D: Dimension + RemoveAxis,
{
    debug_assert_eq!(indices.len(), updates.len_of(Axis(0)));

    for (&idx, update) in indices.iter().zip(updates.axis_iter(Axis(0))) {
        let mut slot = target.index_axis_mut(Axis(0), idx);
        slot += &update;
    }
}
