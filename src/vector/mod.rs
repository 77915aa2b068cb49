//! Vector value backends.
//!
//! A [`VectorValues`] is a lazy random-access view over `N` vectors of a
//! fixed dimension. Views come in two flavors: *owned* views hand out
//! borrowed slices, *shared* views hand out copies because the underlying
//! storage may be concurrently appended or reused as scratch. The
//! [`Cow`] return type captures that contract; callers who retain a vector
//! across the next access of a shared view must hold the owned copy.

use crate::error::{DiskVecError, Result};
use parking_lot::RwLock;
use std::borrow::Cow;

/// Random-access view over vectors of a fixed dimension.
///
/// Ordinals are contiguous integers in `[0, size)`. Accessing an ordinal
/// outside that range is a programming error and panics.
pub trait VectorValues: Send + Sync {
    /// Number of vectors in the view.
    fn size(&self) -> usize;

    /// Dimension shared by every vector in the view.
    fn dimension(&self) -> usize;

    /// The vector at `ordinal`.
    fn vector(&self, ordinal: u32) -> Cow<'_, [f32]>;

    /// Whether the view hands out aliased or transient storage.
    ///
    /// When true, a returned vector is only guaranteed valid until the next
    /// call; retain a copy if it must outlive that.
    fn is_shared(&self) -> bool {
        false
    }

    /// An independent dense copy of the view.
    fn copy_view(&self) -> DenseVectorValues {
        let mut dense = DenseVectorValues::new(self.dimension());
        for i in 0..self.size() {
            dense
                .push(&self.vector(i as u32))
                .expect("source view yields vectors of its own dimension");
        }
        dense
    }
}

/// Contiguous in-memory vector storage.
///
/// The layout is a single flat buffer `[v0_d0, .., v0_dD, v1_d0, ..]`, the
/// same shape the on-disk format uses per node.
#[derive(Debug, Clone, Default)]
pub struct DenseVectorValues {
    data: Vec<f32>,
    dimension: usize,
}

impl DenseVectorValues {
    /// Creates an empty store for vectors of `dimension`.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            data: Vec::new(),
            dimension,
        }
    }

    /// Creates an empty store with room for `capacity` vectors.
    #[must_use]
    pub fn with_capacity(dimension: usize, capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(dimension * capacity),
            dimension,
        }
    }

    /// Builds a store from row-major flat data.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if `data.len()` is not a
    /// multiple of `dimension`.
    pub fn from_flat(data: Vec<f32>, dimension: usize) -> Result<Self> {
        if dimension == 0 || data.len() % dimension != 0 {
            return Err(DiskVecError::DimensionMismatch {
                expected: dimension,
                actual: data.len(),
            });
        }
        Ok(Self { data, dimension })
    }

    /// Appends a vector, returning its ordinal.
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if `vector` has the
    /// wrong length.
    #[allow(clippy::cast_possible_truncation)]
    pub fn push(&mut self, vector: &[f32]) -> Result<u32> {
        if vector.len() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let ordinal = self.data.len() / self.dimension;
        self.data.extend_from_slice(vector);
        Ok(ordinal as u32)
    }

    /// Borrowed access to the vector at `ordinal`.
    ///
    /// # Panics
    ///
    /// Panics if `ordinal` is out of range.
    #[must_use]
    pub fn get(&self, ordinal: u32) -> &[f32] {
        let start = ordinal as usize * self.dimension;
        &self.data[start..start + self.dimension]
    }

    /// The flat row-major buffer.
    #[must_use]
    pub fn as_flat(&self) -> &[f32] {
        &self.data
    }
}

impl VectorValues for DenseVectorValues {
    fn size(&self) -> usize {
        if self.dimension == 0 {
            0
        } else {
            self.data.len() / self.dimension
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn vector(&self, ordinal: u32) -> Cow<'_, [f32]> {
        Cow::Borrowed(self.get(ordinal))
    }
}

/// Concurrently growable vector storage used during graph construction.
///
/// Ordinals are sparse while a build is in flight: each slot is written at
/// most once, by the thread that inserts that ordinal, and read by any
/// thread afterwards. Reads copy out from behind the lock, so this view is
/// `is_shared`.
#[derive(Debug)]
pub struct MutableVectorValues {
    dimension: usize,
    slots: RwLock<Vec<Option<Box<[f32]>>>>,
}

impl MutableVectorValues {
    /// Creates an empty store for vectors of `dimension`.
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            slots: RwLock::new(Vec::new()),
        }
    }

    /// Stores `vector` at `ordinal` unless the slot is already occupied.
    ///
    /// Returns `true` if the slot was newly written, `false` if a vector
    /// was already present (the existing vector is kept).
    ///
    /// # Errors
    ///
    /// Returns [`DiskVecError::DimensionMismatch`] if `vector` has the
    /// wrong length.
    pub fn try_set(&self, ordinal: u32, vector: &[f32]) -> Result<bool> {
        if vector.len() != self.dimension {
            return Err(DiskVecError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        let mut slots = self.slots.write();
        let idx = ordinal as usize;
        if idx >= slots.len() {
            slots.resize_with(idx + 1, || None);
        }
        if slots[idx].is_some() {
            return Ok(false);
        }
        slots[idx] = Some(vector.into());
        Ok(true)
    }

    /// Whether a vector has been stored at `ordinal`.
    #[must_use]
    pub fn contains(&self, ordinal: u32) -> bool {
        let slots = self.slots.read();
        matches!(slots.get(ordinal as usize), Some(Some(_)))
    }

    /// Number of occupied slots.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.slots.read().iter().filter(|s| s.is_some()).count()
    }
}

impl VectorValues for MutableVectorValues {
    fn size(&self) -> usize {
        self.slots.read().len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    /// # Panics
    ///
    /// Panics if `ordinal` has no stored vector.
    fn vector(&self, ordinal: u32) -> Cow<'_, [f32]> {
        let slots = self.slots.read();
        let v = slots[ordinal as usize]
            .as_ref()
            .expect("ordinal has no stored vector");
        Cow::Owned(v.to_vec())
    }

    fn is_shared(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dense_push_and_get() {
        let mut v = DenseVectorValues::new(2);
        assert_eq!(v.push(&[1.0, 2.0]).unwrap(), 0);
        assert_eq!(v.push(&[3.0, 4.0]).unwrap(), 1);
        assert_eq!(v.size(), 2);
        assert_eq!(v.get(1), &[3.0, 4.0]);
        assert!(!v.is_shared());
    }

    #[test]
    fn test_dense_rejects_wrong_dimension() {
        let mut v = DenseVectorValues::new(3);
        let err = v.push(&[1.0]).unwrap_err();
        assert!(matches!(
            err,
            DiskVecError::DimensionMismatch {
                expected: 3,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_mutable_is_idempotent_per_ordinal() {
        let v = MutableVectorValues::new(2);
        assert!(v.try_set(5, &[1.0, 0.0]).unwrap());
        assert!(!v.try_set(5, &[9.0, 9.0]).unwrap());
        assert_eq!(&*v.vector(5), &[1.0, 0.0]);
        assert_eq!(v.occupied(), 1);
        assert_eq!(v.size(), 6);
        assert!(v.is_shared());
    }

    #[test]
    fn test_copy_view_is_independent() {
        let v = MutableVectorValues::new(2);
        v.try_set(0, &[1.0, 2.0]).unwrap();
        v.try_set(1, &[3.0, 4.0]).unwrap();
        let dense = v.copy_view();
        assert_eq!(dense.size(), 2);
        assert_eq!(dense.get(0), &[1.0, 2.0]);
        assert_eq!(dense.get(1), &[3.0, 4.0]);
    }
}
