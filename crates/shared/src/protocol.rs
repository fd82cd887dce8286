use serde::{Deserialize, Serialize};

use crate::{
    domain::{EpochSeconds, SafetyLockKind, Snapshot, Task, TaskKind},
    error::SnapshotError,
};

/// State document served by the controller bridge.
///
/// Field names follow this crate's vocabulary; the aliases accept the keys the
/// controller itself publishes so either form decodes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateResponse {
    pub pid_paused_ph: bool,
    pub pid_paused_o2: bool,
    #[serde(alias = "bloqueo_ph")]
    pub safety_lock_ph: bool,
    #[serde(default, alias = "bloqueo_ph_hasta")]
    pub safety_lock_until: Option<EpochSeconds>,
    #[serde(default, alias = "bloqueo_ph_tipo")]
    pub safety_lock_kind: Option<SafetyLockKind>,
    #[serde(default, alias = "ultimo_ph_up")]
    pub last_ph_up_at: Option<EpochSeconds>,
    #[serde(default, alias = "ultimo_ph_down")]
    pub last_ph_down_at: Option<EpochSeconds>,
    #[serde(alias = "cooldown")]
    pub cooldown_seconds: f64,
    #[serde(alias = "tareas")]
    pub active_tasks: Vec<TaskRecord>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    #[serde(alias = "tipo")]
    pub kind: TaskKind,
    #[serde(alias = "t_fin")]
    pub ends_at: EpochSeconds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandRequest {
    pub cmd: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandResponse {
    pub ok: bool,
    #[serde(default, alias = "msg", skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Decodes and validates a raw state document in one step.
pub fn parse_snapshot(value: serde_json::Value) -> Result<Snapshot, SnapshotError> {
    let response: StateResponse = serde_json::from_value(value)?;
    Snapshot::try_from(response)
}

fn finite(field: &'static str, value: EpochSeconds) -> Result<EpochSeconds, SnapshotError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(SnapshotError::NonFiniteTimestamp { field })
    }
}

// The controller reports 0 for "never dosed".
fn last_dose(
    field: &'static str,
    value: Option<EpochSeconds>,
) -> Result<Option<EpochSeconds>, SnapshotError> {
    let Some(ts) = value else {
        return Ok(None);
    };
    let ts = finite(field, ts)?;
    Ok((ts > 0.0).then_some(ts))
}

impl TryFrom<StateResponse> for Snapshot {
    type Error = SnapshotError;

    fn try_from(value: StateResponse) -> Result<Self, Self::Error> {
        if !value.cooldown_seconds.is_finite() || value.cooldown_seconds < 0.0 {
            return Err(SnapshotError::InvalidCooldown(value.cooldown_seconds));
        }

        // Only timed locks carry a deadline. 0 reads as none, like the dose fields.
        let safety_lock_until = value
            .safety_lock_until
            .map(|until| finite("safety_lock_until", until))
            .transpose()?
            .filter(|until| *until > 0.0);

        let active_tasks = value
            .active_tasks
            .into_iter()
            .map(|task| {
                Ok(Task {
                    kind: task.kind,
                    ends_at: finite("ends_at", task.ends_at)?,
                })
            })
            .collect::<Result<Vec<_>, SnapshotError>>()?;

        Ok(Snapshot {
            pid_paused_ph: value.pid_paused_ph,
            pid_paused_o2: value.pid_paused_o2,
            safety_lock_ph: value.safety_lock_ph,
            safety_lock_until,
            safety_lock_kind: value.safety_lock_kind,
            last_ph_up_at: last_dose("last_ph_up_at", value.last_ph_up_at)?,
            last_ph_down_at: last_dose("last_ph_down_at", value.last_ph_down_at)?,
            cooldown_seconds: value.cooldown_seconds,
            active_tasks,
        })
    }
}

impl From<&Snapshot> for StateResponse {
    fn from(value: &Snapshot) -> Self {
        Self {
            pid_paused_ph: value.pid_paused_ph,
            pid_paused_o2: value.pid_paused_o2,
            safety_lock_ph: value.safety_lock_ph,
            safety_lock_until: value.safety_lock_until,
            safety_lock_kind: value.safety_lock_kind,
            last_ph_up_at: value.last_ph_up_at,
            last_ph_down_at: value.last_ph_down_at,
            cooldown_seconds: value.cooldown_seconds,
            active_tasks: value
                .active_tasks
                .iter()
                .map(|task| TaskRecord {
                    kind: task.kind,
                    ends_at: task.ends_at,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn decodes_controller_native_document() {
        let snapshot = parse_snapshot(json!({
            "pid_paused_ph": true,
            "pid_paused_o2": false,
            "bloqueo_ph": true,
            "ultimo_ph_up": 1_700_000_000.0,
            "ultimo_ph_down": 0,
            "cooldown": 1800,
            "tareas": [{ "tipo": "pH↑", "pin": 17, "t_fin": 1_700_000_042.5 }],
            "timestamp": 1_700_000_001.0
        }))
        .expect("snapshot");

        assert!(snapshot.safety_lock_ph);
        assert_eq!(snapshot.safety_lock_until, None);
        assert_eq!(snapshot.safety_lock_kind, None);
        assert_eq!(snapshot.last_ph_up_at, Some(1_700_000_000.0));
        assert_eq!(snapshot.last_ph_down_at, None);
        assert_eq!(snapshot.cooldown_seconds, 1800.0);
        assert_eq!(
            snapshot.active_tasks,
            vec![Task {
                kind: TaskKind::PhUp,
                ends_at: 1_700_000_042.5
            }]
        );
    }

    #[test]
    fn decodes_english_keys_without_optional_fields() {
        let snapshot = parse_snapshot(json!({
            "pid_paused_ph": false,
            "pid_paused_o2": true,
            "safety_lock_ph": false,
            "cooldown_seconds": 30,
            "active_tasks": [{ "kind": "o2", "ends_at": 10.0 }]
        }))
        .expect("snapshot");

        assert_eq!(snapshot.safety_lock_until, None);
        assert_eq!(snapshot.safety_lock_kind, None);
        assert_eq!(snapshot.active_tasks[0].kind, TaskKind::O2);
    }

    #[test]
    fn timed_lock_keeps_deadline_and_kind() {
        let snapshot = parse_snapshot(json!({
            "pid_paused_ph": true,
            "pid_paused_o2": false,
            "bloqueo_ph": true,
            "bloqueo_ph_hasta": 1_700_003_600.0,
            "bloqueo_ph_tipo": "hora",
            "ultimo_ph_up": 0,
            "ultimo_ph_down": 0,
            "cooldown": 1800,
            "tareas": []
        }))
        .expect("snapshot");

        assert_eq!(snapshot.safety_lock_until, Some(1_700_003_600.0));
        assert_eq!(snapshot.safety_lock_kind, Some(SafetyLockKind::Hourly));
    }

    #[test]
    fn zero_lock_deadline_means_none() {
        let snapshot = parse_snapshot(json!({
            "pid_paused_ph": false,
            "pid_paused_o2": false,
            "safety_lock_ph": true,
            "safety_lock_until": 0,
            "cooldown_seconds": 30,
            "active_tasks": []
        }))
        .expect("snapshot");
        assert!(snapshot.safety_lock_ph);
        assert_eq!(snapshot.safety_lock_until, None);
    }

    #[test]
    fn rejects_negative_cooldown() {
        let err = parse_snapshot(json!({
            "pid_paused_ph": false,
            "pid_paused_o2": false,
            "safety_lock_ph": false,
            "cooldown_seconds": -1,
            "active_tasks": []
        }))
        .expect_err("negative cooldown");
        assert_eq!(err, SnapshotError::InvalidCooldown(-1.0));
    }

    #[test]
    fn rejects_partial_documents() {
        let err = parse_snapshot(json!({ "pid_paused_ph": true })).expect_err("partial");
        assert!(matches!(err, SnapshotError::Decode(_)));
    }

    #[test]
    fn rejects_unknown_task_kind() {
        let err = parse_snapshot(json!({
            "pid_paused_ph": false,
            "pid_paused_o2": false,
            "safety_lock_ph": false,
            "cooldown_seconds": 30,
            "active_tasks": [{ "kind": "feeder", "ends_at": 1.0 }]
        }))
        .expect_err("unknown kind");
        assert!(matches!(err, SnapshotError::Decode(_)));
    }

    #[test]
    fn snapshot_survives_wire_encoding() {
        let mut snapshot = Snapshot::idle(30.0);
        snapshot.safety_lock_ph = true;
        snapshot.safety_lock_until = Some(500.0);
        snapshot.safety_lock_kind = Some(SafetyLockKind::Daily);
        snapshot.active_tasks.push(Task {
            kind: TaskKind::PhDown,
            ends_at: 12.0,
        });

        let value = serde_json::to_value(StateResponse::from(&snapshot)).expect("encode");
        assert_eq!(parse_snapshot(value).expect("decode"), snapshot);
    }
}
