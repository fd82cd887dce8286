//! Sends operator commands and confirms them by watching for a state change.
//!
//! The bridge only acknowledges delivery, so after a successful send the
//! dispatcher re-polls a bounded number of times and reports whether the
//! snapshot moved. A failed send is reported at once and never retried; the
//! controller may already have acted on it.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use shared::domain::{Control, EpochSeconds, Snapshot};
use tracing::{debug, info, warn};

use crate::{
    commands::ControlCommand,
    reconciler::{changed, StateReconciler},
};

pub const DEFAULT_CONFIRM_ATTEMPTS: usize = 6;
pub const DEFAULT_CONFIRM_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub attempts: usize,
    pub delay: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_CONFIRM_ATTEMPTS,
            delay: DEFAULT_CONFIRM_DELAY,
        }
    }
}

impl ConfirmationPolicy {
    /// Worst-case time spent confirming, excluding the send itself.
    pub fn budget(&self) -> Duration {
        self.delay * self.attempts as u32
    }
}

#[derive(Debug, Clone)]
pub enum Outcome {
    /// The snapshot changed after `attempts` confirmation polls.
    Confirmed {
        attempts: usize,
        snapshot: Arc<Snapshot>,
    },
    /// Delivered, but no change was seen within the budget. Not a failure.
    Unconfirmed { attempts: usize },
    /// The send itself failed. The command may or may not have arrived.
    TransportError { message: String },
}

impl Outcome {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Outcome::Confirmed { .. })
    }
}

struct PendingCommand {
    token: String,
    controls: Vec<Control>,
    sent_at: EpochSeconds,
    baseline: Option<Arc<Snapshot>>,
}

type ConfirmingCounts = Arc<Mutex<HashMap<Control, usize>>>;

/// Holds a control as "confirming" until dropped, including on cancellation.
struct ConfirmingGuard {
    controls: Vec<Control>,
    counts: ConfirmingCounts,
}

impl ConfirmingGuard {
    fn acquire(counts: &ConfirmingCounts, controls: &[Control]) -> Self {
        let mut guard = counts.lock().unwrap_or_else(PoisonError::into_inner);
        for control in controls {
            *guard.entry(*control).or_insert(0) += 1;
        }
        Self {
            controls: controls.to_vec(),
            counts: Arc::clone(counts),
        }
    }
}

impl Drop for ConfirmingGuard {
    fn drop(&mut self) {
        let mut guard = self.counts.lock().unwrap_or_else(PoisonError::into_inner);
        for control in &self.controls {
            if let Some(count) = guard.get_mut(control) {
                *count -= 1;
                if *count == 0 {
                    guard.remove(control);
                }
            }
        }
    }
}

#[derive(Clone)]
pub struct CommandDispatcher {
    reconciler: StateReconciler,
    policy: ConfirmationPolicy,
    confirming: ConfirmingCounts,
}

impl CommandDispatcher {
    pub fn new(reconciler: StateReconciler, policy: ConfirmationPolicy) -> Self {
        Self {
            reconciler,
            policy,
            confirming: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn policy(&self) -> ConfirmationPolicy {
        self.policy
    }

    /// Whether a dispatch touching `control` has not resolved yet.
    pub fn is_confirming(&self, control: Control) -> bool {
        self.confirming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&control)
    }

    pub async fn dispatch(&self, command: &ControlCommand) -> Outcome {
        let pending = PendingCommand {
            token: command.token(),
            controls: command.controls().to_vec(),
            sent_at: self.reconciler.clock().now(),
            baseline: self.reconciler.current(),
        };
        let _confirming = ConfirmingGuard::acquire(&self.confirming, &pending.controls);

        info!(cmd = %pending.token, "sending command");
        if let Err(error) = self.reconciler.transport().send_command(&pending.token).await {
            let message = format!("{error:#}");
            warn!(cmd = %pending.token, error = %message, "command send failed; not retrying");
            return Outcome::TransportError { message };
        }

        self.confirm(pending).await
    }

    async fn confirm(&self, pending: PendingCommand) -> Outcome {
        let mut baseline = pending.baseline;

        for attempt in 1..=self.policy.attempts {
            tokio::time::sleep(self.policy.delay).await;

            match self.reconciler.poll().await {
                Ok(snapshot) => match &baseline {
                    Some(before) if changed(before, &snapshot) => {
                        info!(
                            cmd = %pending.token,
                            attempt,
                            max_attempts = self.policy.attempts,
                            "command confirmed by state change"
                        );
                        return Outcome::Confirmed { attempts: attempt, snapshot };
                    }
                    Some(_) => {
                        debug!(cmd = %pending.token, attempt, "no state change yet");
                    }
                    None => {
                        // Nothing was known before sending; compare against the first view.
                        baseline = Some(snapshot);
                    }
                },
                Err(error) => {
                    debug!(cmd = %pending.token, attempt, %error, "confirmation poll failed");
                }
            }
        }

        info!(
            cmd = %pending.token,
            waited_s = self.reconciler.clock().now() - pending.sent_at,
            "no state change observed within confirmation budget"
        );
        Outcome::Unconfirmed {
            attempts: self.policy.attempts,
        }
    }
}

#[cfg(test)]
#[path = "tests/dispatcher_tests.rs"]
mod tests;
