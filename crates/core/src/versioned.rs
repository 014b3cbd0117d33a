//! Versioned values stored inside transactional cells

/// A value paired with its commit counter
///
/// The version of a cell starts at [`Versioned::INITIAL_VERSION`] and is
/// bumped by exactly one for every commit that changes the cell. Versions of
/// different cells are unrelated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<A> {
    /// Committed value
    pub value: A,
    /// Number of commits that changed this cell
    pub version: u64,
}

impl<A> Versioned<A> {
    /// Version of a freshly allocated cell
    pub const INITIAL_VERSION: u64 = 0;

    /// Wrap a value at the initial version
    pub fn new(value: A) -> Self {
        Self {
            value,
            version: Self::INITIAL_VERSION,
        }
    }

    /// Successor produced by a commit that observed this version
    ///
    /// The returned version is strictly greater than `self.version`.
    pub fn succeed(&self, value: A) -> Self {
        Self {
            value,
            version: self.version + 1,
        }
    }

    /// Borrow the committed value
    pub fn value(&self) -> &A {
        &self.value
    }

    /// Map the value, keeping the version
    pub fn map<B>(self, f: impl FnOnce(A) -> B) -> Versioned<B> {
        Versioned {
            value: f(self.value),
            version: self.version,
        }
    }
}
