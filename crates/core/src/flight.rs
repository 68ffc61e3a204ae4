//! Flight command model.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Default translation distance in centimetres.
pub const DEFAULT_MOVE_CM: u32 = 30;

/// Default rotation angle in degrees.
pub const DEFAULT_ROTATE_DEG: u32 = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveDirection {
    Up,
    Down,
    Forward,
    Back,
    Left,
    Right,
}

impl MoveDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Forward => "forward",
            Self::Back => "back",
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for MoveDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "up" => Ok(Self::Up),
            "down" => Ok(Self::Down),
            "forward" => Ok(Self::Forward),
            "back" | "backward" => Ok(Self::Back),
            "left" => Ok(Self::Left),
            "right" => Ok(Self::Right),
            other => Err(format!("Unknown move direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RotateDirection {
    Left,
    Right,
}

impl RotateDirection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

impl FromStr for RotateDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "left" | "ccw" => Ok(Self::Left),
            "right" | "cw" => Ok(Self::Right),
            other => Err(format!("Unknown rotate direction: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightCommand {
    Takeoff,
    Land,
    Move {
        direction: MoveDirection,
        distance_cm: u32,
    },
    Rotate {
        direction: RotateDirection,
        angle_deg: u32,
    },
}

impl FlightCommand {
    /// A move by the default distance.
    pub fn step(direction: MoveDirection) -> Self {
        Self::Move {
            direction,
            distance_cm: DEFAULT_MOVE_CM,
        }
    }

    /// A rotation by the default angle.
    pub fn turn(direction: RotateDirection) -> Self {
        Self::Rotate {
            direction,
            angle_deg: DEFAULT_ROTATE_DEG,
        }
    }

    /// Rotation for a signed slider position: negative turns left.
    /// Returns `None` at the neutral position.
    pub fn from_slider(value: i32) -> Option<Self> {
        let direction = match value.signum() {
            -1 => RotateDirection::Left,
            1 => RotateDirection::Right,
            _ => return None,
        };
        Some(Self::Rotate {
            direction,
            angle_deg: value.unsigned_abs(),
        })
    }

    /// Name of the device control endpoint for this command.
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::Takeoff => "takeoff",
            Self::Land => "land",
            Self::Move { .. } => "move",
            Self::Rotate { .. } => "rotate",
        }
    }

    /// JSON body sent with the command, if any.
    pub fn body(&self) -> Option<serde_json::Value> {
        match self {
            Self::Takeoff | Self::Land => None,
            Self::Move {
                direction,
                distance_cm,
            } => Some(serde_json::json!({
                "direction": direction.as_str(),
                "distance": distance_cm,
            })),
            Self::Rotate {
                direction,
                angle_deg,
            } => Some(serde_json::json!({
                "direction": direction.as_str(),
                "angle": angle_deg,
            })),
        }
    }
}

impl fmt::Display for FlightCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Takeoff => f.write_str("takeoff"),
            Self::Land => f.write_str("land"),
            Self::Move {
                direction,
                distance_cm,
            } => write!(f, "move {} {distance_cm}cm", direction.as_str()),
            Self::Rotate {
                direction,
                angle_deg,
            } => write!(f, "rotate {} {angle_deg}deg", direction.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        assert_eq!(
            FlightCommand::step(MoveDirection::Forward),
            FlightCommand::Move {
                direction: MoveDirection::Forward,
                distance_cm: 30
            }
        );
        assert_eq!(
            FlightCommand::turn(RotateDirection::Left),
            FlightCommand::Rotate {
                direction: RotateDirection::Left,
                angle_deg: 15
            }
        );
    }

    #[test]
    fn slider_maps_sign_to_direction() {
        assert_eq!(
            FlightCommand::from_slider(-45),
            Some(FlightCommand::Rotate {
                direction: RotateDirection::Left,
                angle_deg: 45
            })
        );
        assert_eq!(
            FlightCommand::from_slider(90),
            Some(FlightCommand::Rotate {
                direction: RotateDirection::Right,
                angle_deg: 90
            })
        );
        assert_eq!(FlightCommand::from_slider(0), None);
    }

    #[test]
    fn move_body() {
        let body = FlightCommand::step(MoveDirection::Up).body().unwrap();
        assert_eq!(body["direction"], "up");
        assert_eq!(body["distance"], 30);
        assert!(FlightCommand::Takeoff.body().is_none());
        assert_eq!(FlightCommand::Land.endpoint(), "land");
    }

    #[test]
    fn parse_directions() {
        assert_eq!("Back".parse::<MoveDirection>(), Ok(MoveDirection::Back));
        assert_eq!("cw".parse::<RotateDirection>(), Ok(RotateDirection::Right));
        assert!("sideways".parse::<MoveDirection>().is_err());
    }
}
