//! Splay
//!
//! Nodes sleep a random, per-node delay before each run so a fleet does not
//! check in all at once. The delay is chosen once and remembered.

use crate::storage::RunState;
use rand::Rng;
use std::time::Duration;

/// Something that can wait.
pub trait Sleeper: Send {
    fn sleep(&mut self, duration: Duration);
}

/// Sleeps the current thread.
#[derive(Debug, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Return the remembered delay, choosing one uniformly in `[0, limit)` if
/// none is remembered yet. A zero limit always yields zero.
pub fn splay_time(state: &mut RunState, limit: u64) -> u64 {
    if let Some(time) = state.splay_time {
        return time;
    }
    let time = if limit == 0 {
        0
    } else {
        rand::rng().random_range(0..limit)
    };
    state.splay_time = Some(time);
    time
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chosen_once_and_reused() {
        let mut state = RunState::default();
        let first = splay_time(&mut state, 10);
        assert!(first < 10);
        assert_eq!(state.splay_time, Some(first));

        for _ in 0..20 {
            assert_eq!(splay_time(&mut state, 10), first);
        }
    }

    #[test]
    fn test_zero_limit() {
        let mut state = RunState::default();
        assert_eq!(splay_time(&mut state, 0), 0);
    }
}
