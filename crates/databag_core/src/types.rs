//! Counters the engine hands out as rows are applied.

use std::fmt;

macro_rules! counter {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        pub struct $name(pub u64);

        impl $name {
            /// The value after this one.
            #[must_use]
            pub const fn next(self) -> Self {
                Self(self.0 + 1)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

counter!(
    /// Position of a row in engine-wide write order.
    ///
    /// Shared by every bag on an engine; a larger number is a later write.
    /// `by_created` and query results are ordered on it.
    SequenceNumber,
    "seq"
);

counter!(
    /// Per-table id of an index row, assigned on insert.
    IndexRowId,
    "idx-row"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_advance_and_print() {
        let seq = SequenceNumber::default().next().next();
        assert_eq!(seq, SequenceNumber(2));
        assert!(seq > SequenceNumber(1));
        assert_eq!(seq.to_string(), "seq#2");
        assert_eq!(IndexRowId(9).next().to_string(), "idx-row#10");
    }
}
