//! Cancelable timing primitives: bounded readiness polling, the capture
//! countdown, and caption rotation. Each one stops at its next suspension
//! point once the session's cancellation token fires.

use std::time::Duration;
use tokio::time::{sleep, sleep_until, Instant};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    /// Total number of probes, including the first immediate one.
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    Ready(T),
    /// Every attempt came back empty; callers proceed on a best-effort basis.
    Exhausted,
}

/// Probe immediately, then once per `interval`, until `probe` yields a value or
/// the attempts run out. Returns `None` if `cancel` fires first.
pub async fn poll_until<T, F>(
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut probe: F,
) -> Option<PollOutcome<T>>
where
    F: FnMut() -> Option<T>,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return None;
        }
        if let Some(value) = probe() {
            tracing::debug!(attempt, "poll ready");
            return Some(PollOutcome::Ready(value));
        }
        if attempt < policy.max_attempts {
            tokio::select! {
                _ = sleep(policy.interval) => {}
                _ = cancel.cancelled() => return None,
            }
        }
    }
    tracing::debug!(attempts = policy.max_attempts, "poll exhausted");
    Some(PollOutcome::Exhausted)
}

/// Display countdown (`from`, ..., 1, then blank) that fires once `fire_after` has
/// elapsed. `fire_after` is independent of the tick length so the trigger can
/// land strictly after the last digit was shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    pub from: u32,
    pub tick: Duration,
    pub fire_after: Duration,
}

impl Countdown {
    pub fn new(from: u32, tick: Duration, fire_after: Duration) -> Self {
        Self {
            from,
            tick: tick.max(Duration::from_millis(1)),
            fire_after,
        }
    }

    /// Run to completion. `on_tick` sees `Some(n)` for each digit and `None` once the
    /// display clears. Returns `true` at the trigger, `false` if cancelled.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_tick: F) -> bool
    where
        F: FnMut(Option<u32>),
    {
        let start = Instant::now();
        let deadline = start + self.fire_after;
        let mut current = Some(self.from).filter(|n| *n > 0);
        on_tick(current);
        let mut next_tick = start + self.tick;

        loop {
            let wake = next_tick.min(deadline);
            tokio::select! {
                _ = sleep_until(wake) => {}
                _ = cancel.cancelled() => return false,
            }
            if wake >= deadline {
                if current.is_some() {
                    on_tick(None);
                }
                return true;
            }
            let next = match current {
                Some(n) if n > 1 => Some(n - 1),
                _ => None,
            };
            if next != current {
                current = next;
                on_tick(current);
            }
            next_tick += self.tick;
        }
    }
}

/// Cycles through captions at a fixed interval until cancelled.
#[derive(Debug, Clone, Copy)]
pub struct CaptionTicker {
    pub captions: &'static [&'static str],
    pub interval: Duration,
}

impl CaptionTicker {
    pub fn new(captions: &'static [&'static str], interval: Duration) -> Self {
        Self {
            captions,
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    /// Emits the first caption immediately, then the next one every interval.
    pub async fn run<F>(&self, cancel: &CancellationToken, mut on_caption: F)
    where
        F: FnMut(&'static str),
    {
        if self.captions.is_empty() {
            return;
        }
        let mut step = 0usize;
        on_caption(self.captions[step]);
        loop {
            tokio::select! {
                _ = sleep(self.interval) => {}
                _ = cancel.cancelled() => return,
            }
            step = (step + 1) % self.captions.len();
            on_caption(self.captions[step]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[tokio::test(start_paused = true)]
    async fn ready_on_first_probe_does_not_wait() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let outcome = poll_until(PollPolicy::new(Duration::from_millis(200), 20), &cancel, || {
            Some(7)
        })
        .await;
        assert_eq!(outcome, Some(PollOutcome::Ready(7)));
        assert_eq!(start.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_max_attempts() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let probes = Cell::new(0);
        let outcome: Option<PollOutcome<()>> =
            poll_until(PollPolicy::new(Duration::from_millis(200), 20), &cancel, || {
                probes.set(probes.get() + 1);
                None
            })
            .await;
        assert_eq!(outcome, Some(PollOutcome::Exhausted));
        assert_eq!(probes.get(), 20);
        assert_eq!(start.elapsed(), Duration::from_millis(200 * 19));
    }

    #[tokio::test(start_paused = true)]
    async fn ready_after_a_few_polls() {
        let cancel = CancellationToken::new();
        let probes = Cell::new(0);
        let outcome = poll_until(PollPolicy::new(Duration::from_millis(200), 20), &cancel, || {
            probes.set(probes.get() + 1);
            (probes.get() == 4).then_some("frame")
        })
        .await;
        assert_eq!(outcome, Some(PollOutcome::Ready("frame")));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_poll_returns_none() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = poll_until(PollPolicy::new(Duration::from_millis(200), 20), &cancel, || {
            Some(1)
        })
        .await;
        assert_eq!(outcome, None);
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ticks_then_fires_at_deadline() {
        let start = Instant::now();
        let cancel = CancellationToken::new();
        let mut seen = Vec::new();
        let countdown = Countdown::new(3, Duration::from_secs(1), Duration::from_millis(3500));
        let fired = countdown
            .run(&cancel, |v| seen.push((v, start.elapsed().as_millis())))
            .await;
        assert!(fired);
        assert_eq!(start.elapsed(), Duration::from_millis(3500));
        assert_eq!(
            seen,
            vec![(Some(3), 0), (Some(2), 1000), (Some(1), 2000), (None, 3000)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_stops_when_cancelled() {
        let cancel = CancellationToken::new();
        let countdown = Countdown::new(3, Duration::from_secs(1), Duration::from_millis(3500));
        let child = cancel.clone();
        let run = tokio::spawn(async move { countdown.run(&child, |_| {}).await });
        tokio::time::sleep(Duration::from_millis(1500)).await;
        cancel.cancel();
        assert!(!run.await.unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn captions_rotate_and_wrap() {
        static CAPTIONS: [&str; 2] = ["a", "b"];
        let cancel = CancellationToken::new();
        let ticker = CaptionTicker::new(&CAPTIONS, Duration::from_millis(1200));
        let mut seen = Vec::new();
        tokio::select! {
            _ = ticker.run(&cancel, |c| seen.push(c)) => {}
            _ = tokio::time::sleep(Duration::from_millis(3000)) => {}
        }
        assert_eq!(seen, vec!["a", "b", "a"]);
    }
}
