use std::fmt;

use super::Truth;

/// Set of truth values a predicate may take over a group of rows.
///
/// An empty set means the group holds no rows at all.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct TruthSet(u8);

impl TruthSet {
    const TRUE: u8 = 0b001;
    const FALSE: u8 = 0b010;
    const UNKNOWN: u8 = 0b100;

    /// No outcome possible.
    pub const EMPTY: TruthSet = TruthSet(0);
    /// Every outcome possible.
    pub const ALL: TruthSet = TruthSet(Self::TRUE | Self::FALSE | Self::UNKNOWN);

    /// Set holding exactly `truth`.
    #[must_use]
    pub fn only(truth: Truth) -> Self {
        TruthSet(Self::bit(truth))
    }

    /// Set from explicit flags.
    #[must_use]
    pub fn of(can_be_true: bool, can_be_false: bool, can_be_unknown: bool) -> Self {
        let mut set = TruthSet::EMPTY;
        if can_be_true {
            set.insert(Truth::True);
        }
        if can_be_false {
            set.insert(Truth::False);
        }
        if can_be_unknown {
            set.insert(Truth::Unknown);
        }
        set
    }

    /// Adds an outcome.
    pub fn insert(&mut self, truth: Truth) {
        self.0 |= Self::bit(truth);
    }

    /// Whether `truth` is a possible outcome.
    #[must_use]
    pub fn contains(self, truth: Truth) -> bool {
        self.0 & Self::bit(truth) != 0
    }

    /// Some row may satisfy the predicate.
    #[must_use]
    pub fn can_be_true(self) -> bool {
        self.contains(Truth::True)
    }

    /// Every row satisfies the predicate (and there is at least one outcome).
    #[must_use]
    pub fn is_always_true(self) -> bool {
        self.0 == Self::TRUE
    }

    /// Set union.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        TruthSet(self.0 | other.0)
    }

    /// Pointwise Kleene negation.
    #[must_use]
    pub fn not(self) -> Self {
        self.map(Truth::not)
    }

    /// Pointwise Kleene conjunction over all pairs.
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        self.zip(other, Truth::and)
    }

    /// Pointwise Kleene disjunction over all pairs.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        self.zip(other, Truth::or)
    }

    fn iter(self) -> impl Iterator<Item = Truth> {
        [Truth::True, Truth::False, Truth::Unknown]
            .into_iter()
            .filter(move |truth| self.contains(*truth))
    }

    fn map(self, f: fn(Truth) -> Truth) -> Self {
        self.iter().fold(TruthSet::EMPTY, |mut acc, truth| {
            acc.insert(f(truth));
            acc
        })
    }

    fn zip(self, other: Self, f: fn(Truth, Truth) -> Truth) -> Self {
        let mut acc = TruthSet::EMPTY;
        for lhs in self.iter() {
            for rhs in other.iter() {
                acc.insert(f(lhs, rhs));
            }
        }
        acc
    }

    fn bit(truth: Truth) -> u8 {
        match truth {
            Truth::True => Self::TRUE,
            Truth::False => Self::FALSE,
            Truth::Unknown => Self::UNKNOWN,
        }
    }
}

impl fmt::Debug for TruthSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conjunction_with_false_collapses() {
        let maybe = TruthSet::ALL;
        let never = TruthSet::only(Truth::False);
        assert_eq!(maybe.and(never), never);
        assert_eq!(maybe.or(never), maybe);
        assert_eq!(
            TruthSet::of(true, false, true).not(),
            TruthSet::of(false, true, true)
        );
        assert!(TruthSet::only(Truth::True).is_always_true());
        assert!(!TruthSet::of(true, false, true).is_always_true());
    }
}
