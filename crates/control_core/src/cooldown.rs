//! Rolling minimum spacing between pH doses.

use shared::domain::{EpochSeconds, Snapshot};

/// Most recent dose in either direction, if any was ever recorded.
pub fn last_dose(snapshot: &Snapshot) -> Option<EpochSeconds> {
    match (snapshot.last_ph_up_at, snapshot.last_ph_down_at) {
        (Some(up), Some(down)) => Some(up.max(down)),
        (up, down) => up.or(down),
    }
    .filter(|ts| *ts > 0.0)
}

/// Seconds until another pH dose may be issued.
///
/// A snapshot with no recorded dose never blocks. Remote and local clocks are
/// assumed to share an epoch; skew is not corrected here. The result is
/// rounded to whole milliseconds so it reaches exactly 0 at `last + cooldown`
/// even when epoch-sized timestamps lose precision.
pub fn remaining(snapshot: &Snapshot, now: EpochSeconds) -> f64 {
    let Some(last) = last_dose(snapshot) else {
        return 0.0;
    };
    let elapsed = now - last;
    let remaining = ((snapshot.cooldown_seconds - elapsed) * 1000.0).round() / 1000.0;
    remaining.max(0.0)
}

#[cfg(test)]
#[path = "tests/cooldown_tests.rs"]
mod tests;
