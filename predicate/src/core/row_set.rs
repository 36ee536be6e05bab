//! Shared row-set abstractions built on top of roaring bitmaps.

use std::convert::TryFrom;

use roaring::RoaringBitmap;

/// Position of a row within one data file.
pub type RowId = u32;

/// Borrowed iterator that yields [`RowId`] values.
pub type RowIdIter<'a> = Box<dyn Iterator<Item = RowId> + Send + 'a>;

/// Abstract set of row identifiers.
pub trait RowSet: Send + Sync {
    /// Returns the number of rows tracked by the set.
    fn len(&self) -> usize;

    /// Returns true when the set is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns an iterator over row identifiers.
    fn iter(&self) -> RowIdIter<'_>;

    /// Returns the union between this set and `other`.
    fn union(&self, other: &Self) -> Self
    where
        Self: Sized;
}

/// [`RowSet`] implementation backed by a roaring bitmap.
#[derive(Clone, Debug, Default)]
pub struct BitmapRowSet {
    bitmap: RoaringBitmap,
}

impl BitmapRowSet {
    /// Creates an empty bitmap-backed row set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a row identifier into the set.
    pub fn insert(&mut self, row: RowId) {
        self.bitmap.insert(row);
    }

    /// Returns true when the set contains the provided row identifier.
    #[must_use]
    pub fn contains(&self, row: RowId) -> bool {
        self.bitmap.contains(row)
    }
}

impl FromIterator<RowId> for BitmapRowSet {
    fn from_iter<I: IntoIterator<Item = RowId>>(iter: I) -> Self {
        Self {
            bitmap: iter.into_iter().collect(),
        }
    }
}

impl Extend<RowId> for BitmapRowSet {
    fn extend<I: IntoIterator<Item = RowId>>(&mut self, iter: I) {
        self.bitmap.extend(iter);
    }
}

impl RowSet for BitmapRowSet {
    fn len(&self) -> usize {
        usize::try_from(self.bitmap.len()).unwrap_or(usize::MAX)
    }

    fn iter(&self) -> RowIdIter<'_> {
        Box::new(self.bitmap.iter())
    }

    fn union(&self, other: &Self) -> Self {
        let bitmap = &self.bitmap | &other.bitmap;
        Self { bitmap }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_merges_positions() {
        let deleted: BitmapRowSet = [1, 4].into_iter().collect();
        let mut matched: BitmapRowSet = [2, 4].into_iter().collect();
        matched.extend([9]);
        let merged = deleted.union(&matched);
        assert_eq!(merged.iter().collect::<Vec<_>>(), vec![1, 2, 4, 9]);
        assert!(merged.contains(9));
        assert!(!merged.is_empty());
        assert!(BitmapRowSet::new().is_empty());
    }
}
