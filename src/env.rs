//! Ambient collaborators: wall clock and randomness.
//!
//! Storage keys embed the current time and a random suffix. Both are injected
//! so tests can pin keys exactly.

use rand::Rng;
use std::time::{SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    /// Milliseconds since the Unix epoch.
    fn now_millis(&self) -> u64;
}

pub trait RandomSource: Send + Sync {
    fn next_u64(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Thread-local RNG from `rand`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn next_u64(&self) -> u64 {
        rand::thread_rng().r#gen()
    }
}

/// Encode `value` in lowercase base 36, left-padded with zeros to `width`
/// and truncated to its last `width` digits.
pub fn base36(mut value: u64, width: usize) -> String {
    const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = vec![b'0'; width];
    for slot in out.iter_mut().rev() {
        *slot = DIGITS[(value % 36) as usize];
        value /= 36;
    }
    String::from_utf8(out).unwrap_or_default()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Clock pinned to a fixed instant.
    pub struct FixedClock(pub u64);

    impl Clock for FixedClock {
        fn now_millis(&self) -> u64 {
            self.0
        }
    }

    /// Replays a fixed sequence, repeating the last value once exhausted.
    pub struct SequenceRandom {
        values: Mutex<Vec<u64>>,
    }

    impl SequenceRandom {
        pub fn new(mut values: Vec<u64>) -> Self {
            values.reverse();
            Self {
                values: Mutex::new(values),
            }
        }
    }

    impl RandomSource for SequenceRandom {
        fn next_u64(&self) -> u64 {
            let mut values = self.values.lock().unwrap();
            if values.len() > 1 {
                values.pop().unwrap()
            } else {
                values.first().copied().unwrap_or(0)
            }
        }
    }

    #[test]
    fn base36_pads_to_width() {
        assert_eq!(base36(0, 4), "0000");
        assert_eq!(base36(35, 4), "000z");
        assert_eq!(base36(36, 4), "0010");
    }

    #[test]
    fn base36_keeps_low_digits() {
        // 36^2 + 1 = "101"; width 2 keeps "01"
        assert_eq!(base36(1297, 2), "01");
    }

    #[test]
    fn system_clock_is_after_2020() {
        assert!(SystemClock.now_millis() > 1_577_836_800_000);
    }

    #[test]
    fn sequence_random_replays() {
        let rng = SequenceRandom::new(vec![1, 2]);
        assert_eq!(rng.next_u64(), 1);
        assert_eq!(rng.next_u64(), 2);
        assert_eq!(rng.next_u64(), 2);
    }
}
