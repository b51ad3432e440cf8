//! Operator commands read from stdin.

use mkhook_core::{MouseButton, Scope};
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("unknown command: {0} (try `help`)")]
    Unknown(String),
    #[error("{0} expects `on` or `off`")]
    ExpectedToggle(&'static str),
    #[error("app-click expects `<x> <y> [left|right|middle]`")]
    BadClick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Scope(Scope),
    SuppressMouse(bool),
    SuppressWheel(bool),
    /// Feed a click into the application port.
    AppClick { x: i32, y: i32, button: MouseButton },
    Status,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  global | app | none        switch hook scope
  suppress-mouse on|off      swallow right-button presses
  suppress-wheel on|off      swallow wheel moves
  app-click <x> <y> [btn]    deliver a click through the application port
  status                     show scope, suppression and pointer readout
  help                       show this text
  quit                       tear down and exit";

fn toggle(name: &'static str, arg: Option<&str>) -> Result<bool, CommandError> {
    match arg {
        Some("on") => Ok(true),
        Some("off") => Ok(false),
        _ => Err(CommandError::ExpectedToggle(name)),
    }
}

impl FromStr for Command {
    type Err = CommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut words = s.split_whitespace();
        let Some(head) = words.next() else {
            return Err(CommandError::Unknown(String::new()));
        };
        let command = match head.to_ascii_lowercase().as_str() {
            "global" => Command::Scope(Scope::Global),
            "app" | "application" => Command::Scope(Scope::Application),
            "none" => Command::Scope(Scope::None),
            "suppress-mouse" => Command::SuppressMouse(toggle("suppress-mouse", words.next())?),
            "suppress-wheel" => Command::SuppressWheel(toggle("suppress-wheel", words.next())?),
            "app-click" => {
                let mut coord = || {
                    words
                        .next()
                        .and_then(|w| w.parse::<i32>().ok())
                        .ok_or(CommandError::BadClick)
                };
                let (x, y) = (coord()?, coord()?);
                let button = match words.next() {
                    None | Some("left") => MouseButton::Left,
                    Some("right") => MouseButton::Right,
                    Some("middle") => MouseButton::Middle,
                    Some(_) => return Err(CommandError::BadClick),
                };
                Command::AppClick { x, y, button }
            }
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(CommandError::Unknown(other.to_string())),
        };
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_commands() {
        assert_eq!("global".parse(), Ok(Command::Scope(Scope::Global)));
        assert_eq!("  APP ".parse(), Ok(Command::Scope(Scope::Application)));
        assert_eq!("none".parse(), Ok(Command::Scope(Scope::None)));
    }

    #[test]
    fn test_toggles() {
        assert_eq!("suppress-mouse on".parse(), Ok(Command::SuppressMouse(true)));
        assert_eq!("suppress-wheel off".parse(), Ok(Command::SuppressWheel(false)));
        assert_eq!(
            "suppress-wheel maybe".parse::<Command>(),
            Err(CommandError::ExpectedToggle("suppress-wheel"))
        );
    }

    #[test]
    fn test_app_click() {
        assert_eq!(
            "app-click 10 -5 right".parse(),
            Ok(Command::AppClick {
                x: 10,
                y: -5,
                button: MouseButton::Right
            })
        );
        assert_eq!(
            "app-click 1 2".parse(),
            Ok(Command::AppClick {
                x: 1,
                y: 2,
                button: MouseButton::Left
            })
        );
        assert_eq!("app-click 1".parse::<Command>(), Err(CommandError::BadClick));
    }

    #[test]
    fn test_unknown() {
        assert_eq!(
            "dance".parse::<Command>(),
            Err(CommandError::Unknown("dance".into()))
        );
    }
}
