// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Timer state machine with exponential backoff.
//!
//! Shared by the `timer` and `dead_mans_switch` blocks. A timer is either idle
//! or armed; when armed it remembers whether the last firing was the first
//! `timeout` or a subsequent `repeat`.
//!
//! ```text
//!            message (timeout T)               fire
//!   Idle ─────────────────────────► Armed(T) ───────► emit "timeout"
//!                                     ▲                 next = repeat_after
//!                                     │ message           │
//!                                     │                   ▼
//!                                     └──────────── Armed(R), repeating
//!                                                     │ fire
//!                                                     ▼
//!                                                  emit "repeat"
//!                                                  next = R * backoff_factor
//! ```
//!
//! A zero period never arms. Every emission is bound to a fresh cancellation
//! token that the timer keeps; the next reset or firing cancels it first, so
//! at most one downstream notification per timer is ever outstanding.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::comm::Message;
use crate::errors::BlockError;
use crate::expr::MAX_PERIOD;
use crate::observability::messages::block::{HandlerFailed, InputChannelClosed};
use crate::observability::messages::timer::{NotificationCancelled, TimerFired, TimerReset};
use crate::observability::messages::StructuredLog;
use crate::observability::metrics::BlockMetrics;

/// What a timer emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerEvent {
    Reset,
    Timeout,
    Repeat,
}

impl TimerEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimerEvent::Reset => "reset",
            TimerEvent::Timeout => "timeout",
            TimerEvent::Repeat => "repeat",
        }
    }
}

/// Period after the first timeout and growth factor of the following ones.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    repeat_after: Duration,
    factor: f64,
}

impl Backoff {
    /// A factor below one (or missing) is clamped to one.
    pub fn new(repeat_after: Duration, factor: Option<f64>) -> Self {
        let factor = match factor {
            Some(factor) if factor >= 1.0 && factor.is_finite() => factor,
            _ => 1.0,
        };
        Self {
            repeat_after,
            factor,
        }
    }

    /// Fire once, never repeat.
    pub fn none() -> Self {
        Self::new(Duration::ZERO, None)
    }

    pub fn factor(&self) -> f64 {
        self.factor
    }

    /// Saturates at [`MAX_PERIOD`].
    fn grow(&self, period: Duration) -> Duration {
        Duration::try_from_secs_f64(period.as_secs_f64() * self.factor)
            .unwrap_or(MAX_PERIOD)
            .min(MAX_PERIOD)
    }
}

/// Mutable part of a timer, owned by a single task.
#[derive(Debug)]
pub struct TimerState {
    backoff: Backoff,
    current_timeout: Duration,
    on_repeat: bool,
    cancel_previous: Option<CancellationToken>,
}

impl TimerState {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            backoff,
            current_timeout: Duration::ZERO,
            on_repeat: false,
            cancel_previous: None,
        }
    }

    /// Starts a new period. Returns the period to arm for, `None` when idle.
    pub fn reset(&mut self, timeout: Duration) -> Option<Duration> {
        self.cancel_pending();
        self.on_repeat = false;
        self.current_timeout = timeout;
        non_zero(timeout)
    }

    /// Advances after the armed period elapsed. Returns the event to emit
    /// and the next period, `None` when the timer goes idle.
    pub fn fire(&mut self) -> (TimerEvent, Option<Duration>) {
        self.cancel_pending();
        let event = if self.on_repeat {
            self.current_timeout = self.backoff.grow(self.current_timeout);
            TimerEvent::Repeat
        } else {
            self.current_timeout = self.backoff.repeat_after;
            TimerEvent::Timeout
        };
        self.on_repeat = true;
        (event, non_zero(self.current_timeout))
    }

    /// Keeps the handle of the notification just sent.
    pub fn track(&mut self, token: CancellationToken) {
        self.cancel_previous = Some(token);
    }

    /// Cancels the outstanding notification, if any. Returns whether one was
    /// cancelled.
    pub fn cancel_pending(&mut self) -> bool {
        match self.cancel_previous.take() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_repeating(&self) -> bool {
        self.on_repeat
    }
}

fn non_zero(period: Duration) -> Option<Duration> {
    (!period.is_zero()).then_some(period)
}

fn deadline(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period.min(MAX_PERIOD)).unwrap_or(now)
}

fn within_range(period: Duration) -> Result<Duration, BlockError> {
    if period > MAX_PERIOD {
        return Err(BlockError::InvalidTimeout(format!("{:?} is out of range", period)));
    }
    Ok(period)
}

/// Where a timer's events go.
#[async_trait]
pub trait TimerSink: Send + 'static {
    /// Sends `event` downstream, bound to `ctx`. `timeout` is the next period,
    /// zero when the timer went idle.
    async fn notify(&mut self, event: TimerEvent, timeout: Duration, ctx: CancellationToken);
}

/// Computes the period requested by an inbound message.
pub trait TimeoutSource: Send + 'static {
    fn timeout_for(&self, msg: &Message) -> Result<Duration, BlockError>;
}

/// A fixed period, whatever the message says.
impl TimeoutSource for Duration {
    fn timeout_for(&self, _msg: &Message) -> Result<Duration, BlockError> {
        Ok(*self)
    }
}

/// The task driving a [`TimerState`] from its input channel and its clock.
pub struct TimerLoop<T, S> {
    block_id: String,
    initial_timeout: Duration,
    state: TimerState,
    source: T,
    sink: S,
    metrics: BlockMetrics,
}

impl<T: TimeoutSource, S: TimerSink> TimerLoop<T, S> {
    pub fn new(
        block_id: String,
        initial_timeout: Duration,
        backoff: Backoff,
        source: T,
        sink: S,
        metrics: BlockMetrics,
    ) -> Self {
        Self {
            block_id,
            initial_timeout,
            state: TimerState::new(backoff),
            source,
            sink,
            metrics,
        }
    }

    /// Runs until the input channel closes.
    pub async fn run(mut self, mut input: mpsc::Receiver<Message>) {
        let sleep = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(sleep);
        let mut armed = false;

        if let Some(period) = self.state.reset(self.initial_timeout) {
            sleep.as_mut().reset(deadline(period));
            armed = true;
            self.log_reset(period);
            self.emit(TimerEvent::Reset, period).await;
        }

        loop {
            tokio::select! {
                received = input.recv() => {
                    let Some(msg) = received else {
                        InputChannelClosed { block_id: &self.block_id }.log();
                        return;
                    };

                    let timeout = match self.source.timeout_for(&msg).and_then(within_range) {
                        Ok(timeout) => timeout,
                        Err(error) => {
                            HandlerFailed { block_id: &self.block_id, error: &error }.log();
                            msg.reply_with_error();
                            continue;
                        }
                    };

                    self.metrics.increment(TimerEvent::Reset.as_str());
                    if self.state.cancel_pending() {
                        NotificationCancelled { block_id: &self.block_id }.log();
                    }
                    match self.state.reset(timeout) {
                        Some(period) => {
                            sleep.as_mut().reset(deadline(period));
                            armed = true;
                            self.log_reset(period);
                            self.emit(TimerEvent::Reset, period).await;
                        }
                        None => {
                            armed = false;
                            self.log_reset(Duration::ZERO);
                        }
                    }
                    msg.close();
                }
                () = &mut sleep, if armed => {
                    let (event, next) = self.state.fire();
                    self.metrics.increment(event.as_str());
                    let next = match next {
                        Some(period) => {
                            sleep.as_mut().reset(deadline(period));
                            period
                        }
                        None => {
                            armed = false;
                            Duration::ZERO
                        }
                    };
                    TimerFired {
                        block_id: &self.block_id,
                        event: event.as_str(),
                        next_timeout: next,
                    }
                    .log();
                    self.emit(event, next).await;
                }
            }
        }
    }

    fn log_reset(&self, timeout: Duration) {
        TimerReset {
            block_id: &self.block_id,
            timeout,
        }
        .log();
    }

    async fn emit(&mut self, event: TimerEvent, timeout: Duration) {
        let ctx = CancellationToken::new();
        self.state.track(ctx.clone());
        self.sink.notify(event, timeout, ctx).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::metrics::InMemoryMetrics;
    use serde_json::json;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_backoff_factor_is_clamped() {
        assert_eq!(Backoff::new(Duration::ZERO, Some(0.5)).factor(), 1.0);
        assert_eq!(Backoff::new(Duration::ZERO, Some(f64::NAN)).factor(), 1.0);
        assert_eq!(Backoff::new(Duration::ZERO, None).factor(), 1.0);
        assert_eq!(Backoff::new(Duration::ZERO, Some(2.5)).factor(), 2.5);
    }

    #[test]
    fn test_state_backoff_sequence() {
        let secs = Duration::from_secs;
        let mut state = TimerState::new(Backoff::new(secs(2), Some(3.0)));

        assert_eq!(state.reset(secs(1)), Some(secs(1)));
        assert_eq!(state.fire(), (TimerEvent::Timeout, Some(secs(2))));
        assert_eq!(state.fire(), (TimerEvent::Repeat, Some(secs(6))));
        assert_eq!(state.fire(), (TimerEvent::Repeat, Some(secs(18))));

        // A reset starts over with a plain timeout.
        assert_eq!(state.reset(secs(5)), Some(secs(5)));
        assert!(!state.is_repeating());
        assert_eq!(state.fire(), (TimerEvent::Timeout, Some(secs(2))));
    }

    #[test]
    fn test_backoff_saturates_at_max_period() {
        let mut state = TimerState::new(Backoff::new(Duration::from_secs(1), Some(1e300)));
        state.reset(Duration::from_secs(1));
        assert_eq!(state.fire(), (TimerEvent::Timeout, Some(Duration::from_secs(1))));
        assert_eq!(state.fire(), (TimerEvent::Repeat, Some(MAX_PERIOD)));
        assert_eq!(state.fire(), (TimerEvent::Repeat, Some(MAX_PERIOD)));
    }

    #[test]
    fn test_zero_repeat_stops_after_timeout() {
        let mut state = TimerState::new(Backoff::none());
        assert_eq!(state.reset(Duration::ZERO), None);
        assert_eq!(state.reset(Duration::from_millis(10)), Some(Duration::from_millis(10)));
        assert_eq!(state.fire(), (TimerEvent::Timeout, None));
    }

    #[test]
    fn test_reset_and_fire_cancel_tracked_notification() {
        let mut state = TimerState::new(Backoff::new(Duration::from_secs(1), None));

        let first = CancellationToken::new();
        state.track(first.clone());
        state.reset(Duration::from_secs(1));
        assert!(first.is_cancelled());

        let second = CancellationToken::new();
        state.track(second.clone());
        state.fire();
        assert!(second.is_cancelled());
        assert!(!state.cancel_pending());
    }

    type Log = Arc<Mutex<Vec<(TimerEvent, Duration, Duration, CancellationToken)>>>;

    /// Records every notification with its offset from the start.
    struct Recorder {
        started: Instant,
        log: Log,
    }

    #[async_trait]
    impl TimerSink for Recorder {
        async fn notify(&mut self, event: TimerEvent, timeout: Duration, ctx: CancellationToken) {
            let at = Instant::now() - self.started;
            self.log.lock().unwrap().push((event, timeout, at, ctx));
        }
    }

    /// Reads the period from the message, in seconds.
    struct FromMessage;

    impl TimeoutSource for FromMessage {
        fn timeout_for(&self, msg: &Message) -> Result<Duration, BlockError> {
            crate::expr::timeout_from_value(msg.value())
        }
    }

    struct Fixture {
        log: Log,
        input: mpsc::Sender<Message>,
        sink: Arc<InMemoryMetrics>,
    }

    fn start(initial: Duration, backoff: Backoff) -> Fixture {
        let log: Log = Arc::default();
        let sink = Arc::new(InMemoryMetrics::new());
        let (input, receiver) = mpsc::channel(1);
        let timer = TimerLoop::new(
            "t".to_string(),
            initial,
            backoff,
            FromMessage,
            Recorder {
                started: Instant::now(),
                log: log.clone(),
            },
            BlockMetrics::new("t", sink.clone()),
        );
        tokio::spawn(timer.run(receiver));
        Fixture { log, input, sink }
    }

    fn events(log: &Log) -> Vec<(TimerEvent, Duration)> {
        log.lock()
            .unwrap()
            .iter()
            .map(|(event, timeout, _, _)| (*event, *timeout))
            .collect()
    }

    fn close_to(actual: Duration, expected: Duration) -> bool {
        actual >= expected && actual < expected + Duration::from_millis(10)
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_timeout_fires_once() {
        let fixture = start(Duration::from_secs(1), Backoff::none());
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(
            events(&fixture.log),
            vec![
                (TimerEvent::Reset, Duration::from_secs(1)),
                (TimerEvent::Timeout, Duration::ZERO),
            ]
        );
        assert_eq!(fixture.sink.get("t", "timeout"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_schedule() {
        let fixture = start(Duration::from_secs(1), Backoff::new(Duration::from_secs(2), Some(2.0)));
        tokio::time::sleep(Duration::from_millis(7500)).await;

        let log = fixture.log.lock().unwrap();
        let fired: Vec<_> = log
            .iter()
            .map(|(event, next, at, _)| (*event, *next, *at))
            .collect();
        assert_eq!(fired.len(), 4);
        assert_eq!(fired[1].0, TimerEvent::Timeout);
        assert_eq!(fired[1].1, Duration::from_secs(2));
        assert!(close_to(fired[1].2, Duration::from_secs(1)));
        assert_eq!(fired[2].0, TimerEvent::Repeat);
        assert_eq!(fired[2].1, Duration::from_secs(4));
        assert!(close_to(fired[2].2, Duration::from_secs(3)));
        assert_eq!(fired[3].0, TimerEvent::Repeat);
        assert_eq!(fired[3].1, Duration::from_secs(8));
        assert!(close_to(fired[3].2, Duration::from_secs(7)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_keep_timer_from_firing() {
        let fixture = start(Duration::ZERO, Backoff::none());
        for _ in 0..5 {
            let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(2));
            fixture.input.send(msg).await.unwrap();
            // Acknowledged by closing.
            assert!(rx.await.is_err());
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
        assert!(events(&fixture.log)
            .iter()
            .all(|(event, _)| *event == TimerEvent::Reset));

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(
            events(&fixture.log).last(),
            Some(&(TimerEvent::Timeout, Duration::ZERO))
        );
        assert_eq!(fixture.sink.get("t", "reset"), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_notification() {
        let fixture = start(Duration::from_secs(1), Backoff::none());
        tokio::time::sleep(Duration::from_secs(2)).await;

        let timeout_ctx = {
            let log = fixture.log.lock().unwrap();
            assert_eq!(log.last().map(|entry| entry.0), Some(TimerEvent::Timeout));
            log.last().map(|entry| entry.3.clone()).unwrap()
        };
        assert!(!timeout_ctx.is_cancelled());

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(5));
        fixture.input.send(msg).await.unwrap();
        assert!(rx.await.is_err());
        assert!(timeout_ctx.is_cancelled());
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_timeout_disarms() {
        let fixture = start(Duration::from_secs(1), Backoff::none());

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(0));
        fixture.input.send(msg).await.unwrap();
        assert!(rx.await.is_err());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            events(&fixture.log),
            vec![(TimerEvent::Reset, Duration::from_secs(1))]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_bad_timeout_is_error_replied_and_state_kept() {
        let fixture = start(Duration::from_secs(1), Backoff::none());

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(["nope"]));
        fixture.input.send(msg).await.unwrap();
        assert!(crate::comm::is_error_reply(&rx.await.unwrap()));

        // Still armed with the initial period.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            events(&fixture.log).last(),
            Some(&(TimerEvent::Timeout, Duration::ZERO))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_huge_timeout_is_error_replied_and_timer_survives() {
        let fixture = start(Duration::ZERO, Backoff::none());

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1e19));
        fixture.input.send(msg).await.unwrap();
        assert!(crate::comm::is_error_reply(&rx.await.unwrap()));

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1));
        fixture.input.send(msg).await.unwrap();
        assert!(rx.await.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            events(&fixture.log),
            vec![
                (TimerEvent::Reset, Duration::from_secs(1)),
                (TimerEvent::Timeout, Duration::ZERO),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_fixed_period_beyond_max_is_rejected() {
        let log: Log = Arc::default();
        let (input, receiver) = mpsc::channel(1);
        let timer = TimerLoop::new(
            "t".to_string(),
            Duration::ZERO,
            Backoff::none(),
            Duration::MAX,
            Recorder {
                started: Instant::now(),
                log: log.clone(),
            },
            BlockMetrics::new("t", Arc::new(InMemoryMetrics::new())),
        );
        tokio::spawn(timer.run(receiver));

        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(null));
        input.send(msg).await.unwrap();
        assert!(crate::comm::is_error_reply(&rx.await.unwrap()));
        assert!(events(&log).is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrepresentable_initial_timeout_is_clamped() {
        let fixture = start(Duration::MAX, Backoff::none());

        // Still accepting resets.
        let (msg, rx) = Message::with_reply(CancellationToken::new(), json!(1));
        fixture.input.send(msg).await.unwrap();
        assert!(rx.await.is_err());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(
            events(&fixture.log).last(),
            Some(&(TimerEvent::Timeout, Duration::ZERO))
        );
    }
}
