use std::sync::Arc;

use anyhow::Result;
use shared::domain::{Control, Snapshot};
use thiserror::Error;
use tracing::info;

pub mod clock;
pub mod commands;
pub mod cooldown;
pub mod dispatcher;
pub mod error;
pub mod lock_policy;
pub mod reconciler;
pub mod tasks;
pub mod transport;

pub use clock::{Clock, ManualClock, SystemClock};
pub use commands::ControlCommand;
pub use dispatcher::{CommandDispatcher, ConfirmationPolicy, Outcome};
pub use error::{CommandError, PollError};
pub use lock_policy::Availability;
pub use reconciler::{StateReconciler, StateUpdate, Subscription, DEFAULT_POLL_PERIOD};
pub use transport::{ControllerTransport, HttpControllerTransport, HttpTransportConfig};

/// Why an operator action was refused before reaching the controller.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("no controller state available yet: {0}")]
    NoState(PollError),
    #[error("controller state is stale and could not be refreshed: {0}")]
    Stale(PollError),
    #[error("command '{0}' is not permitted by the current controller state")]
    NotPermitted(String),
    #[error("a previous {} command is still being confirmed", .0.as_str())]
    Busy(Control),
}

/// Reconciler and dispatcher wired to the same transport.
#[derive(Clone)]
pub struct ControlClient {
    reconciler: StateReconciler,
    dispatcher: CommandDispatcher,
}

impl ControlClient {
    pub fn connect(config: &HttpTransportConfig, policy: ConfirmationPolicy) -> Result<Self> {
        let transport = HttpControllerTransport::new(config)?;
        info!(controller = %config.base_url, "controller client configured");
        Ok(Self::with_transport(
            Arc::new(transport),
            Arc::new(SystemClock),
            policy,
        ))
    }

    pub fn with_transport(
        transport: Arc<dyn ControllerTransport>,
        clock: Arc<dyn Clock>,
        policy: ConfirmationPolicy,
    ) -> Self {
        let reconciler = StateReconciler::new(transport, clock);
        let dispatcher = CommandDispatcher::new(reconciler.clone(), policy);
        Self {
            reconciler,
            dispatcher,
        }
    }

    pub fn reconciler(&self) -> &StateReconciler {
        &self.reconciler
    }

    pub fn dispatcher(&self) -> &CommandDispatcher {
        &self.dispatcher
    }

    /// Polls once and evaluates the gates for the result.
    pub async fn refresh(&self) -> Result<(Arc<Snapshot>, Availability), PollError> {
        let snapshot = self.reconciler.poll().await?;
        let availability = lock_policy::evaluate(&snapshot, self.reconciler.clock().now());
        Ok((snapshot, availability))
    }

    /// Dispatches `command` only if the latest state allows it and no earlier
    /// command on the same control is still confirming. A held snapshot from
    /// before a failed poll is never trusted: it is refreshed first.
    pub async fn perform(&self, command: &ControlCommand) -> Result<Outcome, ActionError> {
        if let Some(busy) = command
            .controls()
            .iter()
            .copied()
            .find(|control| self.dispatcher.is_confirming(*control))
        {
            return Err(ActionError::Busy(busy));
        }

        let availability = match (self.reconciler.availability(), self.reconciler.is_stale()) {
            (Some(availability), false) => availability,
            (held, _) => match self.refresh().await {
                Ok((_, availability)) => availability,
                Err(error) if held.is_some() => return Err(ActionError::Stale(error)),
                Err(error) => return Err(ActionError::NoState(error)),
            },
        };
        if !availability.permits(command) {
            return Err(ActionError::NotPermitted(command.token()));
        }

        Ok(self.dispatcher.dispatch(command).await)
    }
}

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
