use std::future::Future;
use std::pin::pin;
use std::time::Duration;

use tether_protocol::SessionMessage;
use tether_protocol::SessionUpdate;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::Instant;
use tokio::time::sleep_until;
use tracing::debug;
use tracing::warn;

use crate::normalizer::UpdateNormalizer;

/// Quiet-period / drain-timeout pair governing one turn's completion race.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimingProfile {
    /// Required duration of update silence before the turn is considered
    /// naturally finished. Restarted by every update.
    pub quiet_period: Duration,
    /// Hard upper bound on waiting for trailing updates after the turn call
    /// resolves. Fixed origin; never restarted.
    pub drain_timeout: Duration,
}

impl TurnTimingProfile {
    pub fn new(quiet_period: Duration, drain_timeout: Duration) -> Self {
        Self {
            quiet_period,
            drain_timeout,
        }
    }
}

/// Separate timing profiles for the warm-up exchange and ordinary prompt
/// cycles. The defaults are a starting point; production deployments tune
/// these against observed backend latency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTimingConfig {
    /// First turn: short windows to minimize perceived startup latency.
    pub pre_prompt: TurnTimingProfile,
    /// Subsequent turns: longer windows that tolerate bursty tool-update
    /// delivery.
    pub in_turn: TurnTimingProfile,
}

impl Default for TurnTimingConfig {
    fn default() -> Self {
        Self {
            pre_prompt: TurnTimingProfile::new(Duration::from_millis(100), Duration::from_secs(2)),
            in_turn: TurnTimingProfile::new(Duration::from_millis(500), Duration::from_secs(10)),
        }
    }
}

/// Which arm of the completion race fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// No updates arrived for a full quiet period; the turn ended naturally.
    Quiet,
    /// The drain timeout expired while updates were still arriving;
    /// completion was forced to guarantee forward progress.
    DrainExpired,
    /// The update channel closed; nothing more can arrive.
    Disconnected,
}

/// Drive a single turn to completion.
///
/// `turn_call` is the backend's synchronous "run a turn" request, which may
/// resolve while causally-related updates are still in flight. Updates are
/// normalized and their messages forwarded as they arrive, independent of
/// completion timing. Once the call resolves, a restartable quiet timer
/// races a fixed-origin drain timer; whichever fires first flushes buffered
/// text and emits `turn_complete`.
///
/// Buffered text is therefore always the last substantive message of the
/// turn: consumers see tool context before any prose that may reference it.
pub async fn drive_turn<F>(
    turn_call: F,
    updates: &mut UnboundedReceiver<SessionUpdate>,
    normalizer: &mut UpdateNormalizer,
    outgoing: &UnboundedSender<SessionMessage>,
    profile: TurnTimingProfile,
) -> TurnOutcome
where
    F: Future<Output = anyhow::Result<()>>,
{
    let mut turn_call = pin!(turn_call);
    let mut disconnected = false;

    // Phase 1: updates flow through the normalizer while the turn call is
    // still in flight. Neither timer is running yet.
    loop {
        tokio::select! {
            result = &mut turn_call => {
                if let Err(err) = result {
                    warn!("turn call failed: {err:#}");
                    let _ = outgoing.send(SessionMessage::Error {
                        message: err.to_string(),
                    });
                }
                break;
            }
            maybe_update = updates.recv() => {
                match maybe_update {
                    Some(update) => forward(normalizer, outgoing, update),
                    None => {
                        disconnected = true;
                        break;
                    }
                }
            }
        }
    }

    // Phase 2: race the reset-on-activity quiet timer against the
    // fixed-deadline drain timer. Updates restart only the quiet timer.
    let outcome = if disconnected {
        TurnOutcome::Disconnected
    } else {
        let drain_deadline = Instant::now() + profile.drain_timeout;
        let mut quiet_deadline = Instant::now() + profile.quiet_period;
        loop {
            tokio::select! {
                _ = sleep_until(quiet_deadline) => break TurnOutcome::Quiet,
                _ = sleep_until(drain_deadline) => break TurnOutcome::DrainExpired,
                maybe_update = updates.recv() => {
                    match maybe_update {
                        Some(update) => {
                            forward(normalizer, outgoing, update);
                            quiet_deadline = Instant::now() + profile.quiet_period;
                        }
                        None => break TurnOutcome::Disconnected,
                    }
                }
            }
        }
    };

    if let Some(text) = normalizer.flush_text() {
        let _ = outgoing.send(text);
    }
    let _ = outgoing.send(SessionMessage::TurnComplete);
    debug!(?outcome, "turn complete");
    outcome
}

fn forward(
    normalizer: &mut UpdateNormalizer,
    outgoing: &UnboundedSender<SessionMessage>,
    update: SessionUpdate,
) {
    for message in normalizer.normalize(update) {
        let _ = outgoing.send(message);
    }
}

/// Per-session turn driver. Owns the normalizer (one text buffer per active
/// turn, a tool registry for the session's lifetime) and selects the
/// pre-prompt profile for the very first turn, the in-turn profile after.
#[derive(Debug, Default)]
pub struct Session {
    normalizer: UpdateNormalizer,
    timings: TurnTimingConfig,
    completed_first_turn: bool,
}

impl Session {
    pub fn new(timings: TurnTimingConfig) -> Self {
        Self {
            normalizer: UpdateNormalizer::new(),
            timings,
            completed_first_turn: false,
        }
    }

    pub fn normalizer(&self) -> &UpdateNormalizer {
        &self.normalizer
    }

    pub async fn run_turn<F>(
        &mut self,
        turn_call: F,
        updates: &mut UnboundedReceiver<SessionUpdate>,
        outgoing: &UnboundedSender<SessionMessage>,
    ) -> TurnOutcome
    where
        F: Future<Output = anyhow::Result<()>>,
    {
        let profile = if self.completed_first_turn {
            self.timings.in_turn
        } else {
            self.timings.pre_prompt
        };
        let outcome = drive_turn(
            turn_call,
            updates,
            &mut self.normalizer,
            outgoing,
            profile,
        )
        .await;
        self.completed_first_turn = true;
        outcome
    }
}
