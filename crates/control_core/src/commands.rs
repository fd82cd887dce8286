//! Operator command vocabulary understood by the controller.
//!
//! The engine treats tokens as opaque: [`ControlCommand::token`] is what goes on
//! the wire, [`ControlCommand::controls`] is what `is_confirming` is keyed on.

use std::{fmt, str::FromStr};

use shared::domain::{Control, Snapshot};

use crate::error::CommandError;

const PH: &[Control] = &[Control::Ph];
const O2: &[Control] = &[Control::O2];
const BOTH: &[Control] = &[Control::Ph, Control::O2];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    ResumePh,
    ResumeO2,
    ResumeAll,
    PausePh,
    PauseO2,
    StopAerators,
    EmergencyStop,
    Aerate { seconds: u64 },
    DosePhUp { preset: u8 },
    DosePhDown { preset: u8 },
    ResetSafetyLock,
    Raw { token: String, controls: Vec<Control> },
}

impl ControlCommand {
    pub fn token(&self) -> String {
        match self {
            ControlCommand::ResumePh => "1".to_string(),
            ControlCommand::ResumeO2 => "2".to_string(),
            ControlCommand::ResumeAll => "3".to_string(),
            ControlCommand::PausePh => "4".to_string(),
            ControlCommand::PauseO2 => "5".to_string(),
            ControlCommand::StopAerators => "6 1".to_string(),
            ControlCommand::EmergencyStop => "6 2".to_string(),
            ControlCommand::Aerate { seconds } => format!("7 {seconds}"),
            ControlCommand::DosePhUp { preset } => format!("8 {preset}"),
            ControlCommand::DosePhDown { preset } => format!("9 {preset}"),
            ControlCommand::ResetSafetyLock => "10".to_string(),
            ControlCommand::Raw { token, .. } => token.clone(),
        }
    }

    pub fn controls(&self) -> &[Control] {
        match self {
            ControlCommand::ResumePh
            | ControlCommand::PausePh
            | ControlCommand::DosePhUp { .. }
            | ControlCommand::DosePhDown { .. }
            | ControlCommand::ResetSafetyLock => PH,
            ControlCommand::ResumeO2
            | ControlCommand::PauseO2
            | ControlCommand::StopAerators
            | ControlCommand::Aerate { .. } => O2,
            ControlCommand::ResumeAll | ControlCommand::EmergencyStop => BOTH,
            ControlCommand::Raw { controls, .. } => controls.as_slice(),
        }
    }

    pub fn raw(token: impl Into<String>, controls: impl Into<Vec<Control>>) -> Self {
        ControlCommand::Raw {
            token: token.into(),
            controls: controls.into(),
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.token())
    }
}

/// Leaves manual mode if the pH loop is paused, enters it otherwise.
pub fn toggle_ph(snapshot: &Snapshot) -> ControlCommand {
    if snapshot.pid_paused_ph {
        ControlCommand::ResumePh
    } else {
        ControlCommand::PausePh
    }
}

pub fn toggle_o2(snapshot: &Snapshot) -> ControlCommand {
    if snapshot.pid_paused_o2 {
        ControlCommand::ResumeO2
    } else {
        ControlCommand::PauseO2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationUnit {
    Seconds,
    Minutes,
    Hours,
}

impl DurationUnit {
    fn seconds(self) -> u64 {
        match self {
            DurationUnit::Seconds => 1,
            DurationUnit::Minutes => 60,
            DurationUnit::Hours => 3600,
        }
    }
}

impl FromStr for DurationUnit {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s" | "sec" | "seconds" => Ok(DurationUnit::Seconds),
            "min" | "minutes" => Ok(DurationUnit::Minutes),
            "h" | "hours" => Ok(DurationUnit::Hours),
            other => Err(CommandError::UnknownUnit(other.to_string())),
        }
    }
}

/// Aeration for `amount` units. The controller clamps to its own maximum.
pub fn aerate_for(amount: u64, unit: DurationUnit) -> Result<ControlCommand, CommandError> {
    if amount == 0 {
        return Err(CommandError::InvalidDuration);
    }
    let seconds = amount
        .checked_mul(unit.seconds())
        .ok_or(CommandError::InvalidDuration)?;
    Ok(ControlCommand::Aerate { seconds })
}
