use std::{
    fmt,
    sync::{Mutex, PoisonError},
};

use ulid::{Generator, Ulid};

/// Identifier used in data and delete file names.
pub type FileId = Ulid;

/// Thread-safe ULID generator shared by the writers of one file store.
pub struct FileIdGenerator {
    inner: Mutex<Generator>,
}

impl FileIdGenerator {
    /// Create a new generator seeded with the current time.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Generator::new()),
        }
    }

    /// Produce the next [`FileId`] in a monotonic, time-ordered sequence.
    pub fn generate(&self) -> FileId {
        let mut guard = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        // The monotonic counter only overflows after 2^80 ids in one millisecond.
        guard.generate().unwrap_or_else(|_| Ulid::new())
    }
}

impl fmt::Debug for FileIdGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileIdGenerator").finish_non_exhaustive()
    }
}

impl Default for FileIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_strictly_increasing() {
        let generator = FileIdGenerator::new();
        let first = generator.generate();
        let second = generator.generate();
        assert!(second > first);
        assert_eq!(format!("{generator:?}"), "FileIdGenerator { .. }");
    }
}
