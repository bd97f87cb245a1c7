//! # Telecommand module
//!
//! Telecommands are the instructions given to the drivetrain by the operator
//! or a script. They are carried as JSON of the form
//! `{"type": "<Variant>", "payload": <data>}`, with `payload` omitted for
//! variants which carry no data.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External
use serde::{Serialize, Deserialize};
use serde_json::{self, Value};
use thiserror::Error;

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// A telecommand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Tc {
    /// Put the drivetrain into safe mode, cancelling auto and stopping all
    /// modules.
    MakeSafe,

    /// Leave safe mode.
    MakeUnsafe,

    /// A manual drive demand in physical units.
    Drive {
        forward_ms: f64,
        sideways_ms: f64,
        rot_rads: f64,
        field_relative: bool,
    },

    /// Stop all modules.
    Stop,

    /// Enable or disable the heading lock.
    SetHeadingLock(bool),

    /// Enable or disable the reduced speed limit.
    SetSlowMode(bool),

    /// Enable or disable acting on drive commands.
    SetDriveEnabled(bool),

    /// Select a destination and start driving to it autonomously.
    ///
    /// Destinations are 1-based, `0` means no selection.
    AutoGoto {
        destination: usize
    },

    /// Cancel any running auto command.
    CancelAuto,

    /// Re-seed the pose estimate.
    ResetPose {
        x_m: f64,
        y_m: f64,
        heading_rad: f64,
    },
}

/// Possible parsing errors.
#[derive(Debug, Error)]
pub enum TcParseError {
    #[error("TC contains invalid JSON: {0}")]
    InvalidJson(serde_json::Error),

    #[error("TC has an invalid type ({0})")]
    InvalidType(String),

    #[error("TC of type {0} has an invalid payload: {1}")]
    InvalidPayload(String, serde_json::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Tc {

    /// Parse a new TC from a JSON packet
    pub fn from_json(json_str: &str) -> Result<Self, TcParseError> {
        let val: Value = serde_json::from_str(json_str)
            .map_err(TcParseError::InvalidJson)?;

        // Check the type first so that an unknown type gets a clearer error
        // than serde's variant mismatch.
        let tc_type = match val.get("type").and_then(Value::as_str) {
            Some(s) => s.to_string(),
            None => return Err(TcParseError::InvalidType(String::from(
                "Expected \"type\" to be a string"
            )))
        };

        if !Self::TYPES.contains(&tc_type.as_str()) {
            return Err(TcParseError::InvalidType(
                format!("{} is not a recognised TC type", tc_type)
            ))
        }

        serde_json::from_value(val)
            .map_err(|e| TcParseError::InvalidPayload(tc_type, e))
    }

    /// Serialise the TC into its JSON packet.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    const TYPES: [&'static str; 10] = [
        "MakeSafe",
        "MakeUnsafe",
        "Drive",
        "Stop",
        "SetHeadingLock",
        "SetSlowMode",
        "SetDriveEnabled",
        "AutoGoto",
        "CancelAuto",
        "ResetPose",
    ];
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_from_json() {
        assert_eq!(Tc::from_json(r#"{"type": "Stop"}"#).unwrap(), Tc::Stop);
        assert_eq!(
            Tc::from_json(r#"{"type": "SetHeadingLock", "payload": false}"#).unwrap(),
            Tc::SetHeadingLock(false)
        );
        assert_eq!(
            Tc::from_json(
                r#"{"type": "Drive", "payload": {"forward_ms": 1.0, "sideways_ms": -0.5, "rot_rads": 0.2, "field_relative": true}}"#
            ).unwrap(),
            Tc::Drive { forward_ms: 1.0, sideways_ms: -0.5, rot_rads: 0.2, field_relative: true }
        );

        let tc = Tc::ResetPose { x_m: 1.0, y_m: 2.0, heading_rad: 0.5 };
        assert_eq!(Tc::from_json(&tc.to_json().unwrap()).unwrap(), tc);
    }

    #[test]
    fn test_from_json_errors() {
        assert!(matches!(Tc::from_json("{"), Err(TcParseError::InvalidJson(_))));
        assert!(matches!(
            Tc::from_json(r#"{"type": "Launch"}"#), 
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"payload": 1}"#), 
            Err(TcParseError::InvalidType(_))
        ));
        assert!(matches!(
            Tc::from_json(r#"{"type": "AutoGoto", "payload": {"dest": 1}}"#),
            Err(TcParseError::InvalidPayload(_, _))
        ));
    }
}
