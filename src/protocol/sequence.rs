use std::sync::atomic::{AtomicU32, Ordering};

/// Per-connection, per-direction packet counter. Wraps at `u32::MAX`.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    next: AtomicU32,
}

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub(crate) fn starting_at(first: u32) -> Self {
        Self {
            next: AtomicU32::new(first),
        }
    }

    pub fn next(&self) -> u32 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    #[cfg(test)]
    pub(crate) fn peek(&self) -> u32 {
        self.next.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_up_and_wraps() {
        let c = SequenceCounter::new();
        assert_eq!(c.next(), 0);
        assert_eq!(c.next(), 1);
        assert_eq!(c.peek(), 2);

        let c = SequenceCounter::starting_at(u32::MAX);
        assert_eq!(c.next(), u32::MAX);
        assert_eq!(c.next(), 0);
    }
}
