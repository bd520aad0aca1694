//! Sequence bit of the alternating bit protocol.
//!
//! Reliable delivery keeps two independent bits per session: the next bit to
//! send and the bit expected on the next inbound Data message. Each only
//! advances on a confirmed match.

/// Single-bit sequence counter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlternatingBit(bool);

impl AlternatingBit {
    /// Create a bit starting at `false` (zero).
    pub const fn new() -> Self {
        Self(false)
    }

    /// Flip the bit.
    pub fn alternate(&mut self) {
        self.0 = !self.0;
    }

    /// Current value.
    pub const fn as_bool(self) -> bool {
        self.0
    }

    /// Whether a received bit matches the current value.
    pub const fn matches(self, bit: bool) -> bool {
        self.0 == bit
    }
}

impl From<bool> for AlternatingBit {
    fn from(bit: bool) -> Self {
        Self(bit)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_at_zero() {
        assert!(!AlternatingBit::new().as_bool());
        assert_eq!(AlternatingBit::default(), AlternatingBit::new());
    }

    #[test]
    fn alternate_toggles() {
        let mut bit = AlternatingBit::new();
        bit.alternate();
        assert!(bit.as_bool());
        assert!(bit.matches(true));
        assert!(!bit.matches(false));
        bit.alternate();
        assert!(!bit.as_bool());
    }

    proptest! {
        #[test]
        fn value_after_n_toggles_is_parity(initial in any::<bool>(), count in 0usize..512) {
            let mut bit = AlternatingBit::from(initial);
            for _ in 0..count {
                bit.alternate();
            }
            prop_assert_eq!(bit.as_bool(), initial ^ (count % 2 == 1));
        }
    }
}
