use shared::domain::{EpochSeconds, Snapshot, Task, TaskKind};

/// First task in list order whose kind satisfies `predicate`.
///
/// The controller keeps at most one task per kind, so list order is enough.
/// A task whose end time has passed stays active until a newer snapshot drops
/// it.
pub fn active_of(snapshot: &Snapshot, predicate: impl Fn(TaskKind) -> bool) -> Option<&Task> {
    snapshot.active_tasks.iter().find(|task| predicate(task.kind))
}

pub fn active_ph_task(snapshot: &Snapshot) -> Option<&Task> {
    active_of(snapshot, TaskKind::is_ph)
}

pub fn active_o2_task(snapshot: &Snapshot) -> Option<&Task> {
    active_of(snapshot, TaskKind::is_o2)
}

pub fn remaining(task: &Task, now: EpochSeconds) -> f64 {
    (task.ends_at - now).max(0.0)
}
