use core::fmt;

/// Radio Network Temporary Identifier. Identifies one UE for the lifetime of its connection.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Rnti(pub u16);

/// First C-RNTI value handed out
pub const C_RNTI_MIN: u16 = 0x0001;
/// Values from here on are reserved
pub const C_RNTI_RESERVED: u16 = 0xFFF0;

impl fmt::Display for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:04x}", self.0)
    }
}

impl fmt::Debug for Rnti {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Rnti(0x{:04x})", self.0)
    }
}

/// Hands out C-RNTIs sequentially, wrapping from the reserved range back to the start
#[derive(Debug, Clone)]
pub struct RntiAllocator {
    next: u16,
    first: u16,
    /// One past the last value handed out
    end: u16,
}

impl Default for RntiAllocator {
    fn default() -> Self {
        Self::with_range(C_RNTI_MIN, C_RNTI_RESERVED)
    }
}

impl RntiAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocator restricted to `first..end`
    pub fn with_range(first: u16, end: u16) -> Self {
        Self { next: first, first, end: end.max(first) }
    }

    /// Returns the next C-RNTI for which `in_use` is false, or None if every value is taken
    pub fn allocate(&mut self, in_use: impl Fn(Rnti) -> bool) -> Option<Rnti> {
        let space = (self.end - self.first) as usize;
        for _ in 0..space {
            let candidate = Rnti(self.next);
            self.next += 1;
            if self.next >= self.end {
                self.next = self.first;
            }
            if !in_use(candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_and_skip() {
        let mut alloc = RntiAllocator::new();
        assert_eq!(alloc.allocate(|_| false), Some(Rnti(1)));
        assert_eq!(alloc.allocate(|r| r == Rnti(2)), Some(Rnti(3)));
    }

    #[test]
    fn test_wraps_before_reserved_range() {
        let mut alloc = RntiAllocator { next: C_RNTI_RESERVED - 1, ..RntiAllocator::new() };
        assert_eq!(alloc.allocate(|_| false), Some(Rnti(0xFFEF)));
        assert_eq!(alloc.allocate(|_| false), Some(Rnti(1)));
    }

    #[test]
    fn test_exhausted() {
        let mut alloc = RntiAllocator::new();
        assert_eq!(alloc.allocate(|_| true), None);

        let mut small = RntiAllocator::with_range(10, 12);
        assert_eq!(small.allocate(|r| r == Rnti(10)), Some(Rnti(11)));
        assert_eq!(small.allocate(|_| false), Some(Rnti(10)));
        assert_eq!(small.allocate(|r| r.0 < 12), None);
    }
}
