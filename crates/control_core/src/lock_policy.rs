//! Which operator actions the current snapshot permits.
//!
//! Every gate the operator panel shows is derived here and nowhere else.
//! Dosing is blocked by an active pH task, the safety lock, or the cooldown;
//! switching the pH loop's mode is blocked only by the first two.

use serde::Serialize;
use shared::domain::{EpochSeconds, SafetyLockKind, Snapshot};

use crate::{commands::ControlCommand, cooldown, tasks};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Availability {
    pub ph_dosing_allowed: bool,
    pub ph_toggle_allowed: bool,
    pub o2_toggle_allowed: bool,
    pub cooldown_remaining: f64,
    /// Time left on a timed safety lock. `None` while a lock without a
    /// deadline is active; `lock_reset_available` still reports it.
    pub lock_remaining: Option<f64>,
    pub lock_kind: Option<SafetyLockKind>,
    pub ph_task_remaining: Option<f64>,
    pub o2_task_remaining: Option<f64>,
    /// An aeration task is running, so the aerate action means "stop".
    pub aeration_running: bool,
    pub emergency_stop_visible: bool,
    pub lock_reset_available: bool,
}

pub fn evaluate(snapshot: &Snapshot, now: EpochSeconds) -> Availability {
    let lock_remaining = snapshot
        .safety_lock_until
        .filter(|_| snapshot.safety_lock_ph)
        .map(|until| (until - now).max(0.0));
    let cooldown_remaining = cooldown::remaining(snapshot, now);
    let ph_task = tasks::active_ph_task(snapshot);
    let o2_task = tasks::active_o2_task(snapshot);

    let has_ph_task = ph_task.is_some();
    let has_o2_task = o2_task.is_some();

    Availability {
        ph_dosing_allowed: !has_ph_task && !snapshot.safety_lock_ph && cooldown_remaining == 0.0,
        ph_toggle_allowed: !has_ph_task && !snapshot.safety_lock_ph,
        o2_toggle_allowed: !has_o2_task,
        cooldown_remaining,
        lock_remaining,
        lock_kind: snapshot
            .safety_lock_ph
            .then_some(snapshot.safety_lock_kind)
            .flatten(),
        ph_task_remaining: ph_task.map(|task| tasks::remaining(task, now)),
        o2_task_remaining: o2_task.map(|task| tasks::remaining(task, now)),
        aeration_running: has_o2_task,
        emergency_stop_visible: snapshot.pid_paused_ph || snapshot.pid_paused_o2,
        lock_reset_available: snapshot.safety_lock_ph,
    }
}

impl Availability {
    pub fn permits(&self, command: &ControlCommand) -> bool {
        match command {
            ControlCommand::DosePhUp { .. } | ControlCommand::DosePhDown { .. } => {
                self.ph_dosing_allowed
            }
            ControlCommand::PausePh | ControlCommand::ResumePh => self.ph_toggle_allowed,
            ControlCommand::PauseO2 | ControlCommand::ResumeO2 => self.o2_toggle_allowed,
            ControlCommand::ResumeAll => self.ph_toggle_allowed && self.o2_toggle_allowed,
            ControlCommand::Aerate { .. } => !self.aeration_running,
            ControlCommand::StopAerators => self.aeration_running,
            ControlCommand::ResetSafetyLock => self.lock_reset_available,
            ControlCommand::EmergencyStop | ControlCommand::Raw { .. } => true,
        }
    }
}

#[cfg(test)]
#[path = "tests/lock_policy_tests.rs"]
mod tests;
