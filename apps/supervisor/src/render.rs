use control_core::{Availability, Outcome, StateUpdate};
use shared::domain::{SafetyLockKind, Snapshot};

fn mode(paused: bool) -> &'static str {
    if paused {
        "manual"
    } else {
        "auto"
    }
}

pub fn cooldown_text(remaining: f64) -> String {
    if remaining <= 0.0 {
        "ready".to_string()
    } else {
        format!("{} min", (remaining / 60.0).ceil() as u64)
    }
}

/// Hourly locks count down in minutes, daily locks in hours.
pub fn lock_text(remaining: f64, kind: Option<SafetyLockKind>) -> String {
    let remaining = remaining.max(0.0);
    match kind {
        Some(SafetyLockKind::Daily) => format!("daily limit, {:.1} h left", remaining / 3600.0),
        Some(SafetyLockKind::Hourly) => {
            format!("hourly limit, {} min left", (remaining / 60.0).ceil() as u64)
        }
        None => format!("{} min left", (remaining / 60.0).ceil() as u64),
    }
}

pub fn task_text(remaining: f64) -> String {
    format!("{} s", remaining.max(0.0).ceil() as u64)
}

fn allowed(flag: bool) -> &'static str {
    if flag {
        "allowed"
    } else {
        "blocked"
    }
}

pub fn status_lines(snapshot: &Snapshot, availability: &Availability) -> Vec<String> {
    let mut lines = vec![
        format!(
            "pH loop: {} ({})",
            mode(snapshot.pid_paused_ph),
            allowed(availability.ph_toggle_allowed)
        ),
        format!(
            "O2 loop: {} ({})",
            mode(snapshot.pid_paused_o2),
            allowed(availability.o2_toggle_allowed)
        ),
        format!(
            "pH dosing: {}, cooldown {}",
            allowed(availability.ph_dosing_allowed),
            cooldown_text(availability.cooldown_remaining)
        ),
    ];

    if availability.lock_reset_available {
        let detail = match availability.lock_remaining {
            Some(remaining) => lock_text(remaining, availability.lock_kind),
            None => "active until reset".to_string(),
        };
        lines.push(format!("safety lock: {detail}"));
    }
    if let Some(remaining) = availability.ph_task_remaining {
        lines.push(format!("pH dose running: {}", task_text(remaining)));
    }
    if let Some(remaining) = availability.o2_task_remaining {
        lines.push(format!("aeration running: {}", task_text(remaining)));
    }
    lines
}

/// Status lines for a published update, led by a warning while it is stale.
pub fn update_lines(update: &StateUpdate) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(error) = &update.poll_error {
        lines.push(format!("STALE: showing last known state ({error})"));
    }
    lines.extend(status_lines(&update.snapshot, &update.availability));
    lines
}

pub fn outcome_line(token: &str, outcome: &Outcome) -> String {
    match outcome {
        Outcome::Confirmed { attempts, .. } => {
            format!("'{token}' confirmed after {attempts} poll(s)")
        }
        Outcome::Unconfirmed { attempts } => {
            format!("'{token}' sent, no state change seen in {attempts} poll(s)")
        }
        Outcome::TransportError { message } => format!("'{token}' failed: {message}"),
    }
}

#[cfg(test)]
#[path = "tests/render_tests.rs"]
mod tests;
