use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch, as reported by the remote controller.
pub type EpochSeconds = f64;

/// Logical control loop an operator action belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Ph,
    O2,
}

impl Control {
    pub fn as_str(self) -> &'static str {
        match self {
            Control::Ph => "ph",
            Control::O2 => "o2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    #[serde(rename = "ph_up", alias = "pH↑")]
    PhUp,
    #[serde(rename = "ph_down", alias = "pH↓")]
    PhDown,
    #[serde(rename = "o2", alias = "O2")]
    O2,
}

impl TaskKind {
    pub fn control(self) -> Control {
        match self {
            TaskKind::PhUp | TaskKind::PhDown => Control::Ph,
            TaskKind::O2 => Control::O2,
        }
    }

    pub fn is_ph(self) -> bool {
        self.control() == Control::Ph
    }

    pub fn is_o2(self) -> bool {
        self.control() == Control::O2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SafetyLockKind {
    #[serde(rename = "hourly", alias = "hora")]
    Hourly,
    #[serde(rename = "daily", alias = "dia", alias = "día")]
    Daily,
}

/// A manual action the controller is currently executing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub kind: TaskKind,
    pub ends_at: EpochSeconds,
}

/// Point-in-time view of the remote controller.
///
/// Snapshots are only ever built from a fully validated state document (see
/// [`crate::protocol::StateResponse`]) and are replaced, never edited, when a
/// newer one arrives. Equality is structural, which is what change detection
/// after a command relies on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub pid_paused_ph: bool,
    pub pid_paused_o2: bool,
    pub safety_lock_ph: bool,
    /// Lock deadline when the controller reports one. A lock without a
    /// deadline holds until it is reset.
    pub safety_lock_until: Option<EpochSeconds>,
    pub safety_lock_kind: Option<SafetyLockKind>,
    pub last_ph_up_at: Option<EpochSeconds>,
    pub last_ph_down_at: Option<EpochSeconds>,
    pub cooldown_seconds: f64,
    pub active_tasks: Vec<Task>,
}

impl Snapshot {
    /// Neither loop under manual override, no lock, no history, no tasks.
    pub fn idle(cooldown_seconds: f64) -> Self {
        Self {
            pid_paused_ph: false,
            pid_paused_o2: false,
            safety_lock_ph: false,
            safety_lock_until: None,
            safety_lock_kind: None,
            last_ph_up_at: None,
            last_ph_down_at: None,
            cooldown_seconds,
            active_tasks: Vec::new(),
        }
    }

    pub fn is_manual(&self, control: Control) -> bool {
        match control {
            Control::Ph => self.pid_paused_ph,
            Control::O2 => self.pid_paused_o2,
        }
    }
}
