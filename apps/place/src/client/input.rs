use std::str::FromStr;

use crate::viewport::Point;

/// User gesture or command fed into the client loop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    DragStart(Point),
    DragMove(Point),
    DragEnd,
    /// Pan by a screen-space delta without a drag gesture.
    Pan(Point),
    Wheel(f64),
    ZoomIn,
    ZoomOut,
    Reset,
    /// Paint the selected color at the clicked screen position.
    Click(Point),
    SelectColor(u8),
    /// Paint the selected color under the crosshair.
    Apply,
    Resize { width: f64, height: f64 },
    Quit,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum InputParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("{command}: missing {argument}")]
    MissingArgument {
        command: &'static str,
        argument: &'static str,
    },
    #[error("{command}: {value:?} is not a valid {argument}")]
    InvalidArgument {
        command: &'static str,
        argument: &'static str,
        value: String,
    },
    #[error("{command}: unexpected trailing input {rest:?}")]
    Trailing { command: &'static str, rest: String },
}

/// Whitespace-separated command line: `pan 10 -4`, `zoom in`, `wheel 120`,
/// `click 300 200`, `color 5`, `paint`, `reset`, `resize 800 600`,
/// `drag start 1 2`, `drag move 5 6`, `drag end`, `quit`.
impl FromStr for InputEvent {
    type Err = InputParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut args = Args {
            tokens: line.split_whitespace(),
            command: "",
        };
        let Some(head) = args.tokens.next() else {
            return Err(InputParseError::Empty);
        };

        let event = match head.to_ascii_lowercase().as_str() {
            "pan" => {
                args.command = "pan";
                InputEvent::Pan(args.point("dx", "dy")?)
            }
            "drag" => {
                args.command = "drag";
                match args.word("phase")? {
                    "start" => InputEvent::DragStart(args.point("x", "y")?),
                    "move" => InputEvent::DragMove(args.point("x", "y")?),
                    "end" => InputEvent::DragEnd,
                    other => return Err(args.invalid("phase", other)),
                }
            }
            "wheel" => {
                args.command = "wheel";
                InputEvent::Wheel(args.number("delta")?)
            }
            "zoom" => {
                args.command = "zoom";
                match args.word("direction")? {
                    "in" => InputEvent::ZoomIn,
                    "out" => InputEvent::ZoomOut,
                    other => return Err(args.invalid("direction", other)),
                }
            }
            "reset" => InputEvent::Reset,
            "click" => {
                args.command = "click";
                InputEvent::Click(args.point("x", "y")?)
            }
            "color" => {
                args.command = "color";
                let raw = args.word("index")?;
                let index = raw
                    .parse::<u8>()
                    .map_err(|_| args.invalid("index", raw))?;
                InputEvent::SelectColor(index)
            }
            "paint" | "apply" => InputEvent::Apply,
            "resize" => {
                args.command = "resize";
                let size = args.point("width", "height")?;
                InputEvent::Resize {
                    width: size.x,
                    height: size.y,
                }
            }
            "quit" | "exit" => InputEvent::Quit,
            _ => return Err(InputParseError::Unknown(head.to_string())),
        };
        args.finish()?;
        Ok(event)
    }
}

struct Args<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    command: &'static str,
}

impl<'a> Args<'a> {
    fn word(&mut self, argument: &'static str) -> Result<&'a str, InputParseError> {
        self.tokens.next().ok_or(InputParseError::MissingArgument {
            command: self.command,
            argument,
        })
    }

    fn number(&mut self, argument: &'static str) -> Result<f64, InputParseError> {
        let raw = self.word(argument)?;
        match raw.parse::<f64>() {
            Ok(value) if value.is_finite() => Ok(value),
            _ => Err(self.invalid(argument, raw)),
        }
    }

    fn point(&mut self, x: &'static str, y: &'static str) -> Result<Point, InputParseError> {
        Ok(Point::new(self.number(x)?, self.number(y)?))
    }

    fn invalid(&self, argument: &'static str, value: &str) -> InputParseError {
        InputParseError::InvalidArgument {
            command: self.command,
            argument,
            value: value.to_string(),
        }
    }

    fn finish(mut self) -> Result<(), InputParseError> {
        let rest: Vec<&str> = self.tokens.by_ref().collect();
        if rest.is_empty() {
            Ok(())
        } else {
            Err(InputParseError::Trailing {
                command: self.command,
                rest: rest.join(" "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_gestures() {
        assert_eq!(
            "pan 10 -4".parse::<InputEvent>(),
            Ok(InputEvent::Pan(Point::new(10.0, -4.0)))
        );
        assert_eq!(
            "drag start 1 2".parse::<InputEvent>(),
            Ok(InputEvent::DragStart(Point::new(1.0, 2.0)))
        );
        assert_eq!("drag end".parse::<InputEvent>(), Ok(InputEvent::DragEnd));
        assert_eq!("  Zoom   in ".parse::<InputEvent>(), Ok(InputEvent::ZoomIn));
        assert_eq!("wheel 120".parse::<InputEvent>(), Ok(InputEvent::Wheel(120.0)));
        assert_eq!(
            "resize 800 600".parse::<InputEvent>(),
            Ok(InputEvent::Resize {
                width: 800.0,
                height: 600.0
            })
        );
    }

    #[test]
    fn parses_painting_commands() {
        assert_eq!(
            "click 300.5 200".parse::<InputEvent>(),
            Ok(InputEvent::Click(Point::new(300.5, 200.0)))
        );
        assert_eq!("color 5".parse::<InputEvent>(), Ok(InputEvent::SelectColor(5)));
        assert_eq!("paint".parse::<InputEvent>(), Ok(InputEvent::Apply));
        assert_eq!("reset".parse::<InputEvent>(), Ok(InputEvent::Reset));
        assert_eq!("quit".parse::<InputEvent>(), Ok(InputEvent::Quit));
    }

    #[test]
    fn reports_bad_input() {
        assert_eq!("".parse::<InputEvent>(), Err(InputParseError::Empty));
        assert_eq!(
            "jump".parse::<InputEvent>(),
            Err(InputParseError::Unknown("jump".into()))
        );
        assert_eq!(
            "pan 3".parse::<InputEvent>(),
            Err(InputParseError::MissingArgument {
                command: "pan",
                argument: "dy"
            })
        );
        assert_eq!(
            "wheel NaN".parse::<InputEvent>(),
            Err(InputParseError::InvalidArgument {
                command: "wheel",
                argument: "delta",
                value: "NaN".into()
            })
        );
        assert!(matches!(
            "color 300".parse::<InputEvent>(),
            Err(InputParseError::InvalidArgument { .. })
        ));
        assert!(matches!(
            "zoom in twice".parse::<InputEvent>(),
            Err(InputParseError::Trailing { .. })
        ));
    }
}
