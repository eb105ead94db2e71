//! Generation-based liveness for fetch operations.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic clock whose current value names the only live operation.
///
/// Advancing the clock invalidates every token issued before it in one step.
#[derive(Debug, Default, Clone)]
pub struct GenerationClock {
    current: Arc<AtomicU64>,
}

impl GenerationClock {
    /// Clock with no token issued yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate all outstanding tokens and issue the next one.
    #[must_use]
    pub fn advance(&self) -> SessionToken {
        let generation = self.current.fetch_add(1, Ordering::AcqRel).wrapping_add(1);
        SessionToken {
            generation,
            clock: Arc::clone(&self.current),
        }
    }

    /// Invalidate all outstanding tokens without issuing a new one.
    pub fn invalidate(&self) {
        self.current.fetch_add(1, Ordering::AcqRel);
    }

    /// Generation of the most recently issued token.
    #[must_use]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Acquire)
    }
}

/// Liveness handle of one fetch operation.
///
/// # Examples
/// ```
/// use osm_sync_core::GenerationClock;
///
/// let clock = GenerationClock::new();
/// let first = clock.advance();
/// let second = clock.advance();
/// assert!(!first.is_live());
/// assert!(second.is_live());
/// ```
#[derive(Debug, Clone)]
pub struct SessionToken {
    generation: u64,
    clock: Arc<AtomicU64>,
}

impl SessionToken {
    /// Operation id: the generation this token was issued for.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Whether no newer operation has been started since this one.
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.clock.load(Ordering::Acquire) == self.generation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn generations_increase_from_one() {
        let clock = GenerationClock::new();
        assert_eq!(clock.advance().generation(), 1);
        assert_eq!(clock.advance().generation(), 2);
        assert_eq!(clock.current(), 2);
    }

    #[rstest]
    fn invalidate_kills_the_live_token() {
        let clock = GenerationClock::new();
        let token = clock.advance();
        clock.invalidate();
        assert!(!token.is_live());
    }

    #[rstest]
    fn clones_share_the_clock() {
        let clock = GenerationClock::new();
        let token = clock.advance();
        let _newer = clock.clone().advance();
        assert!(!token.is_live());
    }
}
