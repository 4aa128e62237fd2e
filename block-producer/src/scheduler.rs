//! C8 — Runtime Clock & Slot Scheduler.
//!
//! A round-robin turn scheduler over a fixed-width slot: turn `h` belongs to
//! producer `h mod bp_num`. `next_turn` is a monotone counter the main cycle
//! advances by one every time it successfully applies (or produces) a block.

use crate::config::EngineConfig;
use parking_lot::Mutex;
use std::time::Duration;

/// Round-robin slot scheduler, parameterized by wall-clock time passed in by
/// the caller rather than read internally, so it can be driven deterministically
/// in tests.
pub struct SlotScheduler {
    genesis_time: i64,
    period_secs: i64,
    tick_secs: i64,
    bp_num: u64,
    index: u64,
    next_turn: Mutex<u64>,
}

impl SlotScheduler {
    /// Build a scheduler from engine configuration, with the first turn set
    /// to 1 (height 0 is genesis and is never produced by this scheduler).
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            genesis_time: config.genesis_time,
            period_secs: config.period_secs as i64,
            tick_secs: config.tick_secs as i64,
            bp_num: config.bp_num,
            index: config.index,
            next_turn: Mutex::new(1),
        }
    }

    /// `height_from_time(t) = floor((t - genesis_time) / period)`.
    pub fn height_from_time(&self, now: i64) -> u64 {
        let delta = now - self.genesis_time;
        if delta < 0 {
            0
        } else {
            (delta / self.period_secs) as u64
        }
    }

    /// The wall-clock deadline at which `turn`'s slot begins.
    fn deadline(&self, turn: u64) -> i64 {
        self.genesis_time + self.period_secs * turn as i64
    }

    /// The next turn to be produced or checked against.
    pub fn next_turn(&self) -> u64 {
        *self.next_turn.lock()
    }

    /// Advance the monotone turn counter by one.
    pub fn set_next_turn(&self) {
        *self.next_turn.lock() += 1;
    }

    /// `is_my_turn() = (next_turn mod bp_num) == index`.
    pub fn is_my_turn(&self) -> bool {
        self.next_turn() % self.bp_num == self.index
    }

    /// `(now, wait)` where `wait = max(0, deadline(next_turn) - now)` clamped
    /// to `tick`, so the main cycle never sleeps past its poll interval even
    /// when the next slot is still far off.
    pub fn next_tick(&self, now: i64) -> (i64, Duration) {
        let wait_secs = (self.deadline(self.next_turn()) - now).max(0).min(self.tick_secs);
        (now, Duration::from_secs(wait_secs as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(bp_num: u64, index: u64) -> SlotScheduler {
        let config = EngineConfig {
            genesis_time: 0,
            period_secs: 10,
            tick_secs: 1,
            bp_num,
            index,
            ..EngineConfig::default()
        };
        SlotScheduler::new(&config)
    }

    #[test]
    fn height_from_time_floors_toward_genesis() {
        let sched = scheduler(3, 1);
        assert_eq!(sched.height_from_time(0), 0);
        assert_eq!(sched.height_from_time(9), 0);
        assert_eq!(sched.height_from_time(10), 1);
        assert_eq!(sched.height_from_time(25), 2);
    }

    #[test]
    fn is_my_turn_matches_p8_schedule() {
        let sched = scheduler(3, 1);
        let mut my_turns = Vec::new();
        for turn in 1..=10u64 {
            if sched.is_my_turn() {
                my_turns.push(turn);
            }
            sched.set_next_turn();
        }
        assert_eq!(my_turns, vec![1, 4, 7, 10]);
    }

    #[test]
    fn next_tick_clamps_to_tick_interval() {
        let sched = scheduler(1, 0);
        let (_, wait) = sched.next_tick(0);
        assert_eq!(wait, Duration::from_secs(1));
    }

    #[test]
    fn next_tick_is_zero_once_deadline_has_passed() {
        let sched = scheduler(1, 0);
        let (_, wait) = sched.next_tick(15);
        assert_eq!(wait, Duration::from_secs(0));
    }
}
