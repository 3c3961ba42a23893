//! Typed registry of additional per-particle columns.
//!
//! Kernels register the columns they read or write when they are constructed and keep
//! the returned [`FieldHandle`]. Registration is idempotent, so two kernels asking for
//! the same name and type share one column. Columns are never removed, which keeps every
//! handle valid for the lifetime of the store.

use std::collections::HashMap;
use std::marker::PhantomData;

use glam::{Mat3, Vec3};

use crate::error::{Result, SphError};

/// Index of a registered column of type `T`.
pub struct FieldHandle<T> {
    slot: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FieldHandle<T> {
    fn new(slot: usize) -> Self {
        Self {
            slot,
            _marker: PhantomData,
        }
    }
}

impl<T> Clone for FieldHandle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FieldHandle<T> {}

impl<T> PartialEq for FieldHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.slot == other.slot
    }
}

impl<T> Eq for FieldHandle<T> {}

impl<T> std::fmt::Debug for FieldHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("FieldHandle").field(&self.slot).finish()
    }
}

/// Columns of one element type.
#[derive(Debug, Default, Clone)]
pub struct Columns<T> {
    names: HashMap<String, usize>,
    data: Vec<Vec<T>>,
}

impl<T: Copy> Columns<T> {
    fn register(&mut self, name: &str, len: usize, initial: T) -> usize {
        if let Some(&slot) = self.names.get(name) {
            return slot;
        }
        let slot = self.data.len();
        self.data.push(vec![initial; len]);
        self.names.insert(name.to_owned(), slot);
        slot
    }

    fn resize(&mut self, len: usize, fill: T) {
        for column in &mut self.data {
            column.resize(len, fill);
        }
    }
}

/// Element types a column may hold.
pub trait FieldValue: Copy + Send + Sync + 'static {
    const ZERO: Self;
    fn columns(store: &FieldStore) -> &Columns<Self>;
    fn columns_mut(store: &mut FieldStore) -> &mut Columns<Self>;
}

impl FieldValue for f32 {
    const ZERO: Self = 0.0;
    fn columns(store: &FieldStore) -> &Columns<Self> {
        &store.scalars
    }
    fn columns_mut(store: &mut FieldStore) -> &mut Columns<Self> {
        &mut store.scalars
    }
}

impl FieldValue for Vec3 {
    const ZERO: Self = Vec3::ZERO;
    fn columns(store: &FieldStore) -> &Columns<Self> {
        &store.vectors
    }
    fn columns_mut(store: &mut FieldStore) -> &mut Columns<Self> {
        &mut store.vectors
    }
}

impl FieldValue for Mat3 {
    const ZERO: Self = Mat3::ZERO;
    fn columns(store: &FieldStore) -> &Columns<Self> {
        &store.matrices
    }
    fn columns_mut(store: &mut FieldStore) -> &mut Columns<Self> {
        &mut store.matrices
    }
}

#[derive(Debug, Default, Clone)]
pub struct FieldStore {
    len: usize,
    scalars: Columns<f32>,
    vectors: Columns<Vec3>,
    matrices: Columns<Mat3>,
}

impl FieldStore {
    pub fn new(len: usize) -> Self {
        Self {
            len,
            ..Default::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Register `name` filled with `initial`, or return the existing column's handle.
    pub fn register<T: FieldValue>(&mut self, name: &str, initial: T) -> FieldHandle<T> {
        let len = self.len;
        FieldHandle::new(T::columns_mut(self).register(name, len, initial))
    }

    /// Register a fresh column named `base`, or `base#1`, `base#2`, ... when taken.
    pub fn register_unique<T: FieldValue>(&mut self, base: &str, initial: T) -> FieldHandle<T> {
        let mut name = base.to_owned();
        let mut suffix = 0;
        while self.contains::<T>(&name) {
            suffix += 1;
            name = format!("{base}#{suffix}");
        }
        self.register(&name, initial)
    }

    /// Register `name` from explicit per-particle values.
    pub fn register_from<T: FieldValue>(
        &mut self,
        name: &str,
        values: Vec<T>,
    ) -> Result<FieldHandle<T>> {
        if values.len() != self.len {
            return Err(SphError::FieldSizeMismatch {
                name: name.to_owned(),
                expected: self.len,
                found: values.len(),
            });
        }
        let handle = self.register(name, T::ZERO);
        *self.get_mut(handle) = values;
        Ok(handle)
    }

    pub fn handle<T: FieldValue>(&self, name: &str) -> Option<FieldHandle<T>> {
        T::columns(self).names.get(name).map(|&slot| FieldHandle::new(slot))
    }

    pub fn contains<T: FieldValue>(&self, name: &str) -> bool {
        self.handle::<T>(name).is_some()
    }

    #[inline]
    pub fn get<T: FieldValue>(&self, handle: FieldHandle<T>) -> &[T] {
        &T::columns(self).data[handle.slot]
    }

    #[inline]
    pub fn get_mut<T: FieldValue>(&mut self, handle: FieldHandle<T>) -> &mut Vec<T> {
        &mut T::columns_mut(self).data[handle.slot]
    }

    /// Grow or shrink every column; new entries are zero.
    pub fn resize(&mut self, len: usize) {
        self.len = len;
        self.scalars.resize(len, 0.0);
        self.vectors.resize(len, Vec3::ZERO);
        self.matrices.resize(len, Mat3::ZERO);
    }
}
