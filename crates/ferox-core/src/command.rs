use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;

/// External control commands, applied between ticks. Unknown tags and
/// malformed payloads are rejected without touching world state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    Pause,
    Resume,
    SpeedUp,
    SlowDown,
    Reset,
    /// Advisory; has no simulation effect.
    SelectColony { id: u32 },
    SpawnColony { x: u32, y: u32, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    Malformed(String),
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::Malformed(detail) => write!(f, "malformed command: {detail}"),
        }
    }
}

impl Error for CommandError {}

impl Command {
    /// Parse a tagged JSON command. Failures are typed so callers can drop
    /// the payload and keep the stream alive.
    pub fn from_json(payload: &str) -> Result<Self, CommandError> {
        serde_json::from_str(payload).map_err(|e| CommandError::Malformed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tagged_commands_parse() {
        assert_eq!(Command::from_json(r#"{"type":"pause"}"#).unwrap(), Command::Pause);
        assert_eq!(
            Command::from_json(r#"{"type":"select_colony","id":12}"#).unwrap(),
            Command::SelectColony { id: 12 }
        );
        assert_eq!(
            Command::from_json(r#"{"type":"spawn_colony","x":3,"y":4,"name":"vex"}"#).unwrap(),
            Command::SpawnColony {
                x: 3,
                y: 4,
                name: "vex".to_string()
            }
        );
    }

    #[test]
    fn unknown_tags_are_malformed() {
        assert!(Command::from_json(r#"{"type":"explode"}"#).is_err());
    }

    #[test]
    fn missing_fields_are_malformed() {
        assert!(Command::from_json(r#"{"type":"spawn_colony","x":3}"#).is_err());
        assert!(Command::from_json("not json at all").is_err());
    }

    #[test]
    fn commands_roundtrip_through_json() {
        let cmd = Command::SpawnColony {
            x: 1,
            y: 2,
            name: "petri".to_string(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        assert_eq!(Command::from_json(&json).unwrap(), cmd);
    }
}
