// SPDX-FileCopyrightText: Copyright © 2025 Serpent OS Developers
//
// SPDX-License-Identifier: MPL-2.0

//! Growable, sparse, integer-indexed tables
//!
//! Every discovered adapter, local port and remote port lives in a
//! [`Table`]. Indices are stable: an index handed out by [`Table::insert`]
//! or [`Table::append`] refers to the same entry until it is removed.
//! Growing the table may move the backing storage, so only indices (never
//! references into the storage) may be retained across insertions.

use std::collections::TryReserveError;

use thiserror::Error;

/// Errors raised when a table can not hold a new entry
#[derive(Debug, Error)]
pub enum TableError {
    /// The backing storage could not be grown to cover the index
    #[error("unable to grow table to index {index}: {source}")]
    Grow {
        index: usize,
        #[source]
        source: TryReserveError,
    },

    /// The index can not be represented
    #[error("table index {0} out of range")]
    Overflow(usize),
}

/// A sparse table of entries keyed by index
#[derive(Debug, Clone)]
pub struct Table<T> {
    slots: Vec<Option<T>>,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self { slots: Vec::new() }
    }
}

impl<T> Table<T> {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// One past the highest slot ever covered by an insertion
    pub fn limit(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Returns true if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// Ensure `index` is covered by the backing storage, zero-filling new slots
    fn grow(&mut self, index: usize) -> Result<(), TableError> {
        let limit = index.checked_add(1).ok_or(TableError::Overflow(index))?;
        self.slots
            .try_reserve(limit - self.slots.len())
            .map_err(|source| TableError::Grow { index, source })?;
        self.slots.resize_with(limit, || None);
        Ok(())
    }

    /// Insert or replace the entry at `index`, growing the table as needed.
    ///
    /// # Returns
    ///
    /// The index of the entry, or an error if the table could not grow.
    pub fn insert(&mut self, index: usize, entry: T) -> Result<usize, TableError> {
        if index >= self.slots.len() {
            self.grow(index)?;
        }
        self.slots[index] = Some(entry);
        Ok(index)
    }

    /// Add an entry after the last covered slot and return its index
    pub fn append(&mut self, entry: T) -> Result<usize, TableError> {
        self.insert(self.slots.len(), entry)
    }

    /// Look up the entry at `index`
    pub fn get(&self, index: usize) -> Option<&T> {
        self.slots.get(index)?.as_ref()
    }

    /// Look up the entry at `index` for modification
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        self.slots.get_mut(index)?.as_mut()
    }

    /// Find the `n`th occupied entry (0-based), skipping empty slots
    pub fn nth(&self, n: usize) -> Option<&T> {
        self.values().nth(n)
    }

    /// Return the first entry, in index order, matching `predicate`.
    ///
    /// The table does not enforce uniqueness: callers that need exactly one
    /// match count the matches themselves.
    pub fn search<P>(&self, mut predicate: P) -> Option<&T>
    where
        P: FnMut(&T) -> bool,
    {
        self.values().find(|e| predicate(e))
    }

    /// Remove and return the entry at `index`, leaving the slot empty
    pub fn remove(&mut self, index: usize) -> Option<T> {
        self.slots.get_mut(index)?.take()
    }

    /// Iterate occupied slots in index order
    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.slots.iter().enumerate().filter_map(|(i, s)| Some((i, s.as_ref()?)))
    }

    /// Iterate occupied slots in index order, mutably
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (usize, &mut T)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, s)| Some((i, s.as_mut()?)))
    }

    /// Iterate occupied entries in index order
    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Drop every entry and release the backing storage
    pub fn destroy_all(&mut self) {
        self.slots = Vec::new();
    }
}
