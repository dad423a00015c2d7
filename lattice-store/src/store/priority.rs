//! Frame priorities.

use std::fmt;

/// Rank of a frame when several frames hold a value for the same property.
///
/// Lower numbers take precedence: a frame at priority `0` beats a frame at
/// priority `10`. Ties between frames of equal priority are broken by
/// insertion order, as configured by [`TieBreak`](crate::TieBreak).
///
/// # Example
///
/// ```rust
/// use lattice_store::Priority;
///
/// let animation = Priority::new(-1);
/// let local = Priority::new(0);
/// assert!(animation.outranks(local));
/// assert!(animation < local);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Priority(i32);

impl Priority {
    /// Create a priority from its numeric rank.
    pub const fn new(rank: i32) -> Self {
        Self(rank)
    }

    /// The numeric rank.
    pub const fn value(self) -> i32 {
        self.0
    }

    /// Whether a frame at this priority beats a frame at `other`.
    pub fn outranks(self, other: Self) -> bool {
        self.0 < other.0
    }
}

impl From<i32> for Priority {
    fn from(rank: i32) -> Self {
        Self(rank)
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_rank_outranks() {
        assert!(Priority::new(5).outranks(Priority::new(10)));
        assert!(!Priority::new(10).outranks(Priority::new(5)));
        assert!(!Priority::new(7).outranks(Priority::new(7)));
    }

    #[test]
    fn ordering_matches_precedence() {
        let mut priorities = vec![Priority::new(3), Priority::new(-2), Priority::new(0)];
        priorities.sort();
        assert_eq!(priorities, vec![Priority::new(-2), Priority::new(0), Priority::new(3)]);
        assert_eq!(Priority::from(4).value(), 4);
    }
}
