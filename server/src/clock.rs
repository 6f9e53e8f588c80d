//! Per-color thinking time
//!
//! Each color owns a countdown that only runs while it is that color's turn.
//! Time is charged whenever the clock is consulted, so a counter is exact
//! regardless of how late a timer wakes up. The next deadline is aligned to
//! the countdown's whole-second boundaries, which keeps displayed seconds
//! stepping down one at a time and lets the last deadline land exactly on
//! zero.

use shared::Color;
use std::time::Duration;
use tokio::time::Instant;

/// Interval between `tick` broadcasts
pub const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The color to move still has time left
    Tick { color: Color, seconds: u32 },
    /// The color to move has run out of time
    Expired(Color),
}

#[derive(Debug, Clone)]
pub struct TurnClock {
    remaining: [Duration; 2],
    turn: Color,
    /// When time was last charged to the color to move
    last_mark: Instant,
    deadline: Instant,
}

impl TurnClock {
    /// Starts black's countdown at `now`
    pub fn new(limit: Duration, now: Instant) -> Self {
        let mut clock = Self {
            remaining: [limit; 2],
            turn: Color::Black,
            last_mark: now,
            deadline: now,
        };
        clock.rearm(now);
        clock
    }

    pub fn turn(&self) -> Color {
        self.turn
    }

    pub fn deadline(&self) -> Instant {
        self.deadline
    }

    /// Time left for a color as of the last charge
    pub fn remaining(&self, color: Color) -> Duration {
        self.remaining[color.index()]
    }

    /// Whole seconds left for a color, rounded up
    pub fn seconds_left(&self, color: Color) -> u32 {
        let nanos = self.remaining(color).as_nanos();
        let period = TICK_PERIOD.as_nanos();
        ((nanos + period - 1) / period) as u32
    }

    /// The tick describing the color to move
    pub fn current_tick(&self) -> ClockEvent {
        ClockEvent::Tick {
            color: self.turn,
            seconds: self.seconds_left(self.turn),
        }
    }

    /// True if the color to move would have no time left at `now`
    pub fn has_expired(&self, now: Instant) -> bool {
        let elapsed = now.saturating_duration_since(self.last_mark);
        self.remaining(self.turn) <= elapsed
    }

    /// Charges time up to `now` and reports the state of the color to move
    pub fn tick(&mut self, now: Instant) -> ClockEvent {
        self.charge(now);
        if self.remaining(self.turn).is_zero() {
            return ClockEvent::Expired(self.turn);
        }
        self.rearm(now);
        self.current_tick()
    }

    /// Charges the mover and hands the turn to the other color
    pub fn end_turn(&mut self, now: Instant) {
        self.charge(now);
        self.turn = self.turn.opponent();
        self.rearm(now);
    }

    fn charge(&mut self, now: Instant) {
        let elapsed = now.saturating_duration_since(self.last_mark);
        let remaining = &mut self.remaining[self.turn.index()];
        *remaining = remaining.saturating_sub(elapsed);
        self.last_mark = now;
    }

    fn rearm(&mut self, now: Instant) {
        self.deadline = now + until_next_boundary(self.remaining(self.turn));
    }
}

/// Time until `remaining` next crosses a whole tick period
fn until_next_boundary(remaining: Duration) -> Duration {
    let period = TICK_PERIOD.as_nanos();
    let offset = (remaining.as_nanos() % period) as u64;
    if offset == 0 {
        TICK_PERIOD
    } else {
        Duration::from_nanos(offset)
    }
}
