//! Operator console command language.

use std::str::FromStr;

use dronelens_core::capture::Slot;
use dronelens_core::flight::{MoveDirection, RotateDirection};
use dronelens_core::session::BackendKind;

/// Text printed for `help`.
pub const HELP: &str = "\
Commands:
  connect drone|webcam     connect to a camera backend
  start | stop             start or stop the video stream
  capture 1|2              store the live frame in a slot
  clear 1|2                empty a slot
  compare                  compare both photos on every model
  report                   submit the last comparison again
  reset                    clear photos and results, stop narration
  takeoff | land
  move <dir> [cm]          dir: up down forward back left right
  rotate <dir> [deg]       dir: left right
  slide <deg>              move the rotation slider (-180..180)
  release                  release the slider and rotate
  status                   show the session state
  disconnect
  help | quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Connect(BackendKind),
    Start,
    Stop,
    Capture(Slot),
    Clear(Slot),
    Compare,
    Report,
    Reset,
    Takeoff,
    Land,
    Move {
        direction: MoveDirection,
        distance_cm: Option<u32>,
    },
    Rotate {
        direction: RotateDirection,
        angle_deg: Option<u32>,
    },
    Slide(i32),
    Release,
    Status,
    Disconnect,
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("Unknown command '{0}'. Type 'help' for a list")]
    Unknown(String),

    #[error("'{command}' needs {expected}")]
    MissingArgument {
        command: &'static str,
        expected: &'static str,
    },

    #[error("{0}")]
    InvalidArgument(String),
}

fn slot_arg(command: &'static str, arg: Option<&str>) -> Result<Slot, ParseError> {
    let raw = arg.ok_or(ParseError::MissingArgument {
        command,
        expected: "a slot number (1 or 2)",
    })?;
    raw.parse::<u8>()
        .ok()
        .and_then(Slot::from_number)
        .ok_or_else(|| ParseError::InvalidArgument(format!("Slot must be 1 or 2, got '{raw}'")))
}

fn amount_arg(arg: Option<&str>) -> Result<Option<u32>, ParseError> {
    arg.map(|raw| {
        raw.parse::<u32>()
            .map_err(|_| ParseError::InvalidArgument(format!("Expected a whole number, got '{raw}'")))
    })
    .transpose()
}

impl FromStr for ConsoleCommand {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Err(ParseError::Unknown(String::new()));
        };
        let first = words.next();
        let second = words.next();

        let command = match verb.to_ascii_lowercase().as_str() {
            "connect" => {
                let raw = first.ok_or(ParseError::MissingArgument {
                    command: "connect",
                    expected: "'drone' or 'webcam'",
                })?;
                Self::Connect(raw.parse().map_err(ParseError::InvalidArgument)?)
            }
            "start" => Self::Start,
            "stop" => Self::Stop,
            "capture" | "snap" => Self::Capture(slot_arg("capture", first)?),
            "clear" => Self::Clear(slot_arg("clear", first)?),
            "compare" => Self::Compare,
            "report" => Self::Report,
            "reset" => Self::Reset,
            "takeoff" => Self::Takeoff,
            "land" => Self::Land,
            "move" => {
                let raw = first.ok_or(ParseError::MissingArgument {
                    command: "move",
                    expected: "a direction",
                })?;
                Self::Move {
                    direction: raw.parse().map_err(ParseError::InvalidArgument)?,
                    distance_cm: amount_arg(second)?,
                }
            }
            "rotate" => {
                let raw = first.ok_or(ParseError::MissingArgument {
                    command: "rotate",
                    expected: "'left' or 'right'",
                })?;
                Self::Rotate {
                    direction: raw.parse().map_err(ParseError::InvalidArgument)?,
                    angle_deg: amount_arg(second)?,
                }
            }
            "slide" => {
                let raw = first.ok_or(ParseError::MissingArgument {
                    command: "slide",
                    expected: "an angle in degrees",
                })?;
                Self::Slide(raw.parse().map_err(|_| {
                    ParseError::InvalidArgument(format!("Expected an angle, got '{raw}'"))
                })?)
            }
            "release" => Self::Release,
            "status" => Self::Status,
            "disconnect" => Self::Disconnect,
            "help" | "?" => Self::Help,
            "quit" | "exit" => Self::Quit,
            other => return Err(ParseError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}
