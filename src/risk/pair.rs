use serde::Serialize;
use std::fmt;

/// 无序身份对 (A,B) == (B,A)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct PairKey {
    lo: u32,
    hi: u32,
}

impl PairKey {
    pub fn new(a: u32, b: u32) -> Self {
        debug_assert_ne!(a, b, "pair of identical identities");
        Self {
            lo: a.min(b),
            hi: a.max(b),
        }
    }

    pub fn ids(&self) -> (u32, u32) {
        (self.lo, self.hi)
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lo == id || self.hi == id
    }
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_independent() {
        assert_eq!(PairKey::new(3, 7), PairKey::new(7, 3));
        assert_eq!(PairKey::new(7, 3).ids(), (3, 7));
        assert!(PairKey::new(7, 3).contains(7));
        assert!(!PairKey::new(7, 3).contains(5));
        assert_eq!(PairKey::new(9, 2).to_string(), "2-9");
    }
}
