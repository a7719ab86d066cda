//! Bounded waits for operator input.
//!
//! Every blocking read from the console goes through here and gives up after
//! a timeout measured on a monotonic [`Clock`]. Numeric reads report a timeout
//! as [`TIMEOUT_SENTINEL`], a value no 16-bit address or length can take, so
//! an abandoned prompt is never mistaken for a literal 0.

use core::time::Duration;

use tracing::debug;

use crate::error::{Error, Result};

/// Returned by [`read_number`] when no usable input arrived in time.
pub const TIMEOUT_SENTINEL: u32 = 0x1_0000;

/// Monotonic time source.
pub trait Clock {
    /// Time since an arbitrary fixed origin. Never goes backwards.
    fn now(&self) -> Duration;
}

/// Source of complete input lines.
pub trait LineSource {
    type Line: AsRef<str>;

    /// Return a line if one is ready. May block for a short while, but never
    /// indefinitely.
    fn poll_line(&mut self) -> Option<Self::Line>;

    /// No line will ever arrive again (end of input).
    fn is_closed(&self) -> bool {
        false
    }
}

/// [`Clock`] backed by [`std::time::Instant`].
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl MonotonicClock {
    pub fn new() -> Self {
        MonotonicClock { origin: std::time::Instant::now() }
    }
}

#[cfg(feature = "std")]
impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Wait for one line, at most `timeout`.
pub fn wait_line<S, C>(source: &mut S, clock: &C, timeout: Duration) -> Result<S::Line>
where
    S: LineSource + ?Sized,
    C: Clock + ?Sized,
{
    let start = clock.now();
    loop {
        if let Some(line) = source.poll_line() {
            return Ok(line);
        }
        if source.is_closed() {
            debug!("input closed");
            return Err(Error::InputTimeout);
        }
        if clock.now().saturating_sub(start) >= timeout {
            debug!(timeout_ms = timeout.as_millis() as u64, "input timed out");
            return Err(Error::InputTimeout);
        }
    }
}

/// Parse `0x`-prefixed hex or plain decimal.
pub fn parse_number(s: &str) -> Option<u32> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

/// Read a 16-bit number. A timeout, or a line that is not a number in
/// 0..=0xFFFF, yields [`TIMEOUT_SENTINEL`]: either way the operation is
/// abandoned.
pub fn read_number<S, C>(source: &mut S, clock: &C, timeout: Duration) -> u32
where
    S: LineSource + ?Sized,
    C: Clock + ?Sized,
{
    match wait_line(source, clock, timeout) {
        Ok(line) => match parse_number(line.as_ref()) {
            Some(n) if n <= u16::MAX as u32 => n,
            _ => TIMEOUT_SENTINEL,
        },
        Err(_) => TIMEOUT_SENTINEL,
    }
}

/// Ask for a yes. Only `y` or `yes` (any case) counts; silence is a no.
pub fn confirm<S, C>(source: &mut S, clock: &C, timeout: Duration) -> Result<bool>
where
    S: LineSource + ?Sized,
    C: Clock + ?Sized,
{
    let line = wait_line(source, clock, timeout)?;
    let answer = line.as_ref().trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::collections::VecDeque;

    /// Advances by `tick` every time it is read.
    struct FakeClock {
        t: Cell<Duration>,
        tick: Duration,
    }

    impl FakeClock {
        fn new(tick_ms: u64) -> Self {
            FakeClock { t: Cell::new(Duration::ZERO), tick: Duration::from_millis(tick_ms) }
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Duration {
            let t = self.t.get();
            self.t.set(t + self.tick);
            t
        }
    }

    /// Delivers each line after `delay` empty polls.
    struct Script {
        lines: VecDeque<&'static str>,
        delay: u32,
        waited: u32,
        polls: u32,
        /// Closes once the lines run out
        eof: bool,
    }

    impl Script {
        fn new(lines: &[&'static str], delay: u32) -> Self {
            Script { lines: lines.iter().copied().collect(), delay, waited: 0, polls: 0, eof: false }
        }
    }

    impl LineSource for Script {
        type Line = &'static str;

        fn poll_line(&mut self) -> Option<&'static str> {
            self.polls += 1;
            if self.waited < self.delay {
                self.waited += 1;
                return None;
            }
            self.waited = 0;
            self.lines.pop_front()
        }

        fn is_closed(&self) -> bool {
            self.eof && self.lines.is_empty()
        }
    }

    const TIMEOUT: Duration = Duration::from_millis(500);

    #[test]
    fn test_silence_returns_sentinel_before_deadline() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&[], 0);
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), TIMEOUT_SENTINEL);
        // one clock read for the start, one per poll
        assert!(src.polls <= 51, "polled {} times", src.polls);
        assert!(clock.t.get() <= TIMEOUT + Duration::from_millis(20));
    }

    #[test]
    fn test_wait_line_timeout_error() {
        let clock = FakeClock::new(100);
        let mut src = Script::new(&[], 0);
        assert_eq!(wait_line(&mut src, &clock, TIMEOUT), Err(Error::InputTimeout));
    }

    #[test]
    fn test_closed_source_ends_wait_at_once() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&["1"], 0);
        src.eof = true;
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), 1);
        assert_eq!(wait_line(&mut src, &clock, TIMEOUT), Err(Error::InputTimeout));
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Err(Error::InputTimeout));
        // one empty poll per wait, nowhere near the deadline
        assert_eq!(src.polls, 3);
        assert!(clock.t.get() < Duration::from_millis(100));
    }

    #[test]
    fn test_late_line_still_accepted() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&["0x1F0"], 20);
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), 0x1F0);
    }

    #[test]
    fn test_zero_is_not_the_sentinel() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&["0"], 0);
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), 0);
    }

    #[test]
    fn test_garbage_and_overflow_abandon() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&["zz", "0x10000"], 0);
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), TIMEOUT_SENTINEL);
        assert_eq!(read_number(&mut src, &clock, TIMEOUT), TIMEOUT_SENTINEL);
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0x50"), Some(0x50));
        assert_eq!(parse_number(" 512 "), Some(512));
        assert_eq!(parse_number("0XfF"), Some(0xFF));
        assert_eq!(parse_number("0x"), None);
        assert_eq!(parse_number("-1"), None);
    }

    #[test]
    fn test_confirm() {
        let clock = FakeClock::new(10);
        let mut src = Script::new(&["Y", "yes", "n", ""], 0);
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Ok(true));
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Ok(true));
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Ok(false));
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Ok(false));
        assert_eq!(confirm(&mut src, &clock, TIMEOUT), Err(Error::InputTimeout));
    }
}
