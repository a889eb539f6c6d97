//! Circuit breaker for the shared-tier link
//!
//! Driven purely by consecutive success/failure counts from the client.
//! The state machine is `Healthy ⇄ Degraded → Unavailable → (cooldown) →
//! probe → Healthy` and runs on the injected clock, so cooldown behavior is
//! deterministic under test.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_utils::CachePadded;

use crate::cache::traits::Clock;
use crate::cache::types::L2LinkState;

const STATE_HEALTHY: u8 = 0;
const STATE_DEGRADED: u8 = 1;
const STATE_UNAVAILABLE: u8 = 2;

/// What the caller should do with the next shared-tier operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkDecision {
    /// The link is usable; perform the call
    Attempt,
    /// Cooldown elapsed; this caller won the single health probe
    Probe,
    /// Circuit open; skip the network entirely
    ShortCircuit,
}

/// Consecutive-failure circuit breaker with a cooldown deadline
#[derive(Debug)]
pub struct LinkBreaker {
    state: AtomicU8,
    consecutive_failures: CachePadded<AtomicU32>,
    open_until_ms: CachePadded<AtomicU64>,
    probe_in_flight: AtomicBool,
    failure_threshold: u32,
    cooldown: Duration,
    clock: Arc<dyn Clock>,
}

impl LinkBreaker {
    pub fn new(failure_threshold: u32, cooldown: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: AtomicU8::new(STATE_HEALTHY),
            consecutive_failures: CachePadded::new(AtomicU32::new(0)),
            open_until_ms: CachePadded::new(AtomicU64::new(0)),
            probe_in_flight: AtomicBool::new(false),
            failure_threshold,
            cooldown,
            clock,
        }
    }

    /// Current link state
    pub fn state(&self) -> L2LinkState {
        match self.state.load(Ordering::Acquire) {
            STATE_HEALTHY => L2LinkState::Healthy,
            STATE_DEGRADED => L2LinkState::Degraded,
            _ => L2LinkState::Unavailable,
        }
    }

    /// Decide whether the next operation may touch the network
    ///
    /// While the circuit is open and cooled down, exactly one caller wins the
    /// probe; everyone else keeps short-circuiting until it resolves.
    pub fn decide(&self) -> LinkDecision {
        if self.state.load(Ordering::Acquire) != STATE_UNAVAILABLE {
            return LinkDecision::Attempt;
        }
        let now = self.clock.epoch_millis();
        if now < self.open_until_ms.load(Ordering::Acquire) {
            return LinkDecision::ShortCircuit;
        }
        if self
            .probe_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            LinkDecision::Probe
        } else {
            LinkDecision::ShortCircuit
        }
    }

    /// Record a successful operation; returns the new state if it changed
    pub fn record_success(&self) -> Option<L2LinkState> {
        self.consecutive_failures.store(0, Ordering::Release);
        self.probe_in_flight.store(false, Ordering::Release);
        let previous = self.state.swap(STATE_HEALTHY, Ordering::AcqRel);
        (previous != STATE_HEALTHY).then_some(L2LinkState::Healthy)
    }

    /// Record a failed operation; returns the new state if it changed
    pub fn record_failure(&self) -> Option<L2LinkState> {
        self.probe_in_flight.store(false, Ordering::Release);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures >= self.failure_threshold {
            let reopen_at = self.clock.epoch_millis() + self.cooldown.as_millis() as u64;
            self.open_until_ms.store(reopen_at, Ordering::Release);
            let previous = self.state.swap(STATE_UNAVAILABLE, Ordering::AcqRel);
            (previous != STATE_UNAVAILABLE).then_some(L2LinkState::Unavailable)
        } else {
            let previous = self.state.swap(STATE_DEGRADED, Ordering::AcqRel);
            (previous == STATE_HEALTHY).then_some(L2LinkState::Degraded)
        }
    }

    /// Release a won probe slot without recording an outcome
    ///
    /// Used when the probe could not run at all (e.g. pool starvation) so the
    /// next caller can try again.
    pub fn cancel_probe(&self) {
        self.probe_in_flight.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::traits::ManualClock;

    fn breaker(threshold: u32, cooldown_ms: u64) -> (LinkBreaker, Arc<ManualClock>) {
        let clock = ManualClock::starting_at(0);
        (
            LinkBreaker::new(threshold, Duration::from_millis(cooldown_ms), clock.clone()),
            clock,
        )
    }

    #[test]
    fn starts_healthy_and_degrades_on_first_failure() {
        let (b, _clock) = breaker(3, 1_000);
        assert_eq!(b.state(), L2LinkState::Healthy);
        assert_eq!(b.record_failure(), Some(L2LinkState::Degraded));
        assert_eq!(b.state(), L2LinkState::Degraded);
        assert_eq!(b.decide(), LinkDecision::Attempt);
    }

    #[test]
    fn threshold_failures_open_the_circuit() {
        let (b, _clock) = breaker(3, 1_000);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.record_failure(), Some(L2LinkState::Unavailable));
        assert_eq!(b.state(), L2LinkState::Unavailable);
        assert_eq!(b.decide(), LinkDecision::ShortCircuit);
    }

    #[test]
    fn success_below_threshold_restores_healthy() {
        let (b, _clock) = breaker(3, 1_000);
        b.record_failure();
        assert_eq!(b.record_success(), Some(L2LinkState::Healthy));
        // The consecutive counter reset: three more failures are needed
        b.record_failure();
        b.record_failure();
        assert_eq!(b.state(), L2LinkState::Degraded);
    }

    #[test]
    fn cooldown_grants_exactly_one_probe() {
        let (b, clock) = breaker(2, 1_000);
        b.record_failure();
        b.record_failure();
        assert_eq!(b.decide(), LinkDecision::ShortCircuit);

        clock.advance(Duration::from_millis(1_000));
        assert_eq!(b.decide(), LinkDecision::Probe);
        assert_eq!(b.decide(), LinkDecision::ShortCircuit, "probe slot is single");
    }

    #[test]
    fn successful_probe_closes_the_circuit() {
        let (b, clock) = breaker(2, 1_000);
        b.record_failure();
        b.record_failure();
        clock.advance(Duration::from_millis(1_500));
        assert_eq!(b.decide(), LinkDecision::Probe);
        assert_eq!(b.record_success(), Some(L2LinkState::Healthy));
        assert_eq!(b.decide(), LinkDecision::Attempt);
    }

    #[test]
    fn failed_probe_reopens_for_a_full_cooldown() {
        let (b, clock) = breaker(2, 1_000);
        b.record_failure();
        b.record_failure();
        clock.advance(Duration::from_millis(1_000));
        assert_eq!(b.decide(), LinkDecision::Probe);
        assert_eq!(b.record_failure(), None, "already unavailable");

        // Deadline was pushed out again
        clock.advance(Duration::from_millis(500));
        assert_eq!(b.decide(), LinkDecision::ShortCircuit);
        clock.advance(Duration::from_millis(500));
        assert_eq!(b.decide(), LinkDecision::Probe);
    }

    #[test]
    fn cancelled_probe_frees_the_slot() {
        let (b, clock) = breaker(1, 1_000);
        b.record_failure();
        clock.advance(Duration::from_millis(1_000));
        assert_eq!(b.decide(), LinkDecision::Probe);
        b.cancel_probe();
        assert_eq!(b.decide(), LinkDecision::Probe, "slot available again");
    }
}
