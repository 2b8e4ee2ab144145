//! Rate limiting for the replay loop.
//!
//! A throttle hands out a fixed budget of lines per one second interval. Once
//! the budget of the current interval is spent callers wait until the next
//! interval begins, when the budget is restored in full. Unused budget does
//! not carry over.

use std::{future::Future, num::NonZeroU32};

use tokio::time::{self, Duration, Instant};

// One tick is one microsecond.
const INTERVAL_TICKS: u64 = 1_000_000;

/// The source of time for a [`Throttle`].
pub trait Clock {
    /// Microseconds elapsed since the clock was created.
    fn ticks_elapsed(&self) -> u64;
    /// Wait for `ticks` microseconds.
    fn wait(&self, ticks: u64) -> impl Future<Output = ()> + Send;
}

#[derive(Debug, Clone, Copy)]
/// A clock that operates with respect to real-clock time.
pub struct RealClock {
    start: Instant,
}

impl Default for RealClock {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for RealClock {
    #[allow(clippy::cast_possible_truncation)]
    fn ticks_elapsed(&self) -> u64 {
        // Saturates after roughly half a million years.
        self.start.elapsed().as_micros().min(u128::from(u64::MAX)) as u64
    }

    fn wait(&self, ticks: u64) -> impl Future<Output = ()> + Send {
        time::sleep(Duration::from_micros(ticks))
    }
}

/// Per-interval line budget.
#[derive(Debug)]
struct Budget {
    per_interval: u32,
    remaining: u32,
    interval: u64,
}

impl Budget {
    fn new(per_interval: NonZeroU32) -> Self {
        Self {
            per_interval: per_interval.get(),
            remaining: per_interval.get(),
            interval: 0,
        }
    }

    /// Take one line from the budget at absolute time `ticks`. Returns zero if
    /// granted, else the ticks remaining until the next interval.
    fn take(&mut self, ticks: u64) -> u64 {
        let interval = ticks / INTERVAL_TICKS;
        if interval > self.interval {
            self.interval = interval;
            self.remaining = self.per_interval;
        }
        if self.remaining > 0 {
            self.remaining -= 1;
            0
        } else {
            INTERVAL_TICKS - (ticks % INTERVAL_TICKS)
        }
    }
}

/// Lines-per-second throttle. Unlimited unless constructed with a rate.
#[derive(Debug)]
pub struct Throttle<C = RealClock> {
    budget: Option<Budget>,
    clock: C,
}

impl Throttle<RealClock> {
    /// Create a new [`Throttle`] on the real clock. `None` places no limit on
    /// the rate.
    #[must_use]
    pub fn new(lines_per_second: Option<NonZeroU32>) -> Self {
        Self {
            budget: lines_per_second.map(Budget::new),
            clock: RealClock::default(),
        }
    }
}

impl<C> Throttle<C>
where
    C: Clock,
{
    /// Create a new [`Throttle`] limited to `lines_per_second` on `clock`.
    pub fn with_clock(lines_per_second: NonZeroU32, clock: C) -> Self {
        Self {
            budget: Some(Budget::new(lines_per_second)),
            clock,
        }
    }

    /// True if this throttle never waits.
    #[must_use]
    pub fn is_unlimited(&self) -> bool {
        self.budget.is_none()
    }

    /// Wait until one more line may be sent.
    pub async fn wait(&mut self) {
        let Some(budget) = self.budget.as_mut() else {
            return;
        };
        loop {
            let slop = budget.take(self.clock.ticks_elapsed());
            if slop == 0 {
                return;
            }
            self.clock.wait(slop).await;
        }
    }
}

#[cfg(test)]
mod test {
    use std::{cell::Cell, future::Future, num::NonZeroU32};

    use proptest::{collection, prelude::*};

    use super::{Budget, Clock, INTERVAL_TICKS, Throttle};

    #[derive(Debug, Default)]
    struct ManualClock {
        now: Cell<u64>,
    }

    impl Clock for ManualClock {
        fn ticks_elapsed(&self) -> u64 {
            self.now.get()
        }

        fn wait(&self, ticks: u64) -> impl Future<Output = ()> + Send {
            self.now.set(self.now.get() + ticks);
            std::future::ready(())
        }
    }

    #[tokio::test]
    async fn spreads_lines_over_intervals() {
        let rate = NonZeroU32::new(4).expect("non-zero");
        let mut throttle = Throttle::with_clock(rate, ManualClock::default());
        assert!(!throttle.is_unlimited());

        for _ in 0..10 {
            throttle.wait().await;
        }
        // Lines 1-4 in the first interval, 5-8 in the second, 9-10 in the
        // third.
        assert_eq!(throttle.clock.ticks_elapsed(), 2 * INTERVAL_TICKS);
    }

    #[tokio::test]
    async fn unlimited_never_waits() {
        let mut throttle = Throttle::new(None);
        assert!(throttle.is_unlimited());
        for _ in 0..1_000 {
            throttle.wait().await;
        }
    }

    proptest! {
        #[test]
        fn grants_never_exceed_budget(per_interval in 1..1_000_u32, steps in collection::vec(0..250_000_u64, 1..512)) {
            let mut budget = Budget::new(NonZeroU32::new(per_interval).expect("non-zero"));
            let mut ticks = 0_u64;
            let mut interval = 0_u64;
            let mut granted = 0_u32;

            for step in steps {
                ticks += step;
                if ticks / INTERVAL_TICKS > interval {
                    interval = ticks / INTERVAL_TICKS;
                    granted = 0;
                }
                match budget.take(ticks) {
                    0 => granted += 1,
                    slop => {
                        prop_assert!(slop <= INTERVAL_TICKS);
                        prop_assert_eq!((ticks + slop) % INTERVAL_TICKS, 0);
                    }
                }
                prop_assert!(granted <= per_interval);
            }
        }
    }
}
