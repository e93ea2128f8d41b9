use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::world::Vec2;

/// Raw shape of the object the model is asked to emit.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq)]
pub struct ActionWire {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub direction: Option<serde_json::Value>,
    #[serde(default)]
    pub distance: Option<serde_json::Value>,
}

/// Why a response could not be turned into an action. Messages are addressed to
/// the model and are sent back verbatim on retry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ParseFailure {
    #[error(
        "Your reply did not contain a JSON object. Reply with exactly one JSON object, for example {{\"action\": \"move\", \"direction\": \"up\", \"distance\": 1}}."
    )]
    NoJsonObject,
    #[error("Your JSON object has no \"action\" field. Set \"action\" to one of: move, feed, divide, idle.")]
    MissingAction,
    #[error("\"{0}\" is not a valid action. Set \"action\" to one of: move, feed, divide, idle.")]
    UnknownAction(String),
    #[error("A move needs a \"direction\". Use one of: right, up-right, up, up-left, left, down-left, down, down-right.")]
    MissingDirection,
    #[error("\"{0}\" is not a valid direction. Use one of: right, up-right, up, up-left, left, down-left, down, down-right.")]
    InvalidDirection(String),
    #[error("A move needs a numeric \"distance\" in body-lengths between {min} and {max}.")]
    MissingDistance { min: f64, max: f64 },
    #[error("\"{value}\" is not a valid distance. Give a number of body-lengths between {min} and {max}.")]
    InvalidDistance { value: String, min: f64, max: f64 },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum Direction {
    Right,
    UpRight,
    Up,
    UpLeft,
    Left,
    DownLeft,
    Down,
    DownRight,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::Right,
        Direction::UpRight,
        Direction::Up,
        Direction::UpLeft,
        Direction::Left,
        Direction::DownLeft,
        Direction::Down,
        Direction::DownRight,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Direction::Right => "right",
            Direction::UpRight => "up-right",
            Direction::Up => "up",
            Direction::UpLeft => "up-left",
            Direction::Left => "left",
            Direction::DownLeft => "down-left",
            Direction::Down => "down",
            Direction::DownRight => "down-right",
        }
    }

    /// Accepts `up_right`, `Up Right` and similar spellings.
    pub fn from_label(label: &str) -> Option<Self> {
        let normalized: String = label
            .trim()
            .to_ascii_lowercase()
            .chars()
            .map(|c| if c == '_' || c == ' ' { '-' } else { c })
            .collect();
        Self::ALL.into_iter().find(|d| d.label() == normalized)
    }

    /// Counter-clockwise angle from +x in degrees.
    pub fn angle_degrees(self) -> f64 {
        match self {
            Direction::Right => 0.0,
            Direction::UpRight => 45.0,
            Direction::Up => 90.0,
            Direction::UpLeft => 135.0,
            Direction::Left => 180.0,
            Direction::DownLeft => 225.0,
            Direction::Down => 270.0,
            Direction::DownRight => 315.0,
        }
    }

    /// Unit step in world coordinates (y grows downward, so "up" is -y).
    pub fn unit(self) -> Vec2 {
        let rad = self.angle_degrees().to_radians();
        Vec2::new(rad.cos(), -rad.sin())
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Move {
        direction: Direction,
        /// Body-lengths, already clamped.
        distance: f64,
    },
    Feed,
    Divide,
    Idle,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Move { .. } => "move",
            Action::Feed => "feed",
            Action::Divide => "divide",
            Action::Idle => "idle",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Move {
                direction,
                distance,
            } => write!(f, "move {direction} {distance:.2} bl"),
            other => f.write_str(other.name()),
        }
    }
}

/// Allowed move distance in body-lengths.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MoveBounds {
    pub min: f64,
    pub max: f64,
}

impl Default for MoveBounds {
    fn default() -> Self {
        Self { min: 0.5, max: 5.0 }
    }
}

fn parse_direction(value: Option<serde_json::Value>) -> Result<Direction, ParseFailure> {
    match value {
        None | Some(serde_json::Value::Null) => Err(ParseFailure::MissingDirection),
        Some(serde_json::Value::String(s)) if s.trim().is_empty() => {
            Err(ParseFailure::MissingDirection)
        }
        Some(serde_json::Value::String(s)) => {
            Direction::from_label(&s).ok_or(ParseFailure::InvalidDirection(s))
        }
        Some(other) => Err(ParseFailure::InvalidDirection(other.to_string())),
    }
}

fn parse_distance(value: Option<serde_json::Value>, bounds: MoveBounds) -> Result<f64, ParseFailure> {
    let invalid = |value: String| ParseFailure::InvalidDistance {
        value,
        min: bounds.min,
        max: bounds.max,
    };
    let raw = match value {
        None | Some(serde_json::Value::Null) => {
            return Err(ParseFailure::MissingDistance {
                min: bounds.min,
                max: bounds.max,
            });
        }
        Some(serde_json::Value::Number(n)) => n.as_f64().ok_or_else(|| invalid(n.to_string()))?,
        Some(serde_json::Value::String(s)) => s.trim().parse::<f64>().map_err(|_| invalid(s.clone()))?,
        Some(other) => return Err(invalid(other.to_string())),
    };
    if !raw.is_finite() {
        return Err(invalid(raw.to_string()));
    }
    Ok(raw.clamp(bounds.min, bounds.max))
}

impl Action {
    pub fn from_wire(wire: ActionWire, bounds: MoveBounds) -> Result<Self, ParseFailure> {
        let name = wire
            .action
            .as_deref()
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .ok_or(ParseFailure::MissingAction)?;
        match name.as_str() {
            "move" => {
                let direction = parse_direction(wire.direction)?;
                let distance = parse_distance(wire.distance, bounds)?;
                Ok(Action::Move {
                    direction,
                    distance,
                })
            }
            "feed" => Ok(Action::Feed),
            "divide" => Ok(Action::Divide),
            "idle" => Ok(Action::Idle),
            _ => Err(ParseFailure::UnknownAction(
                wire.action.unwrap_or_default().trim().to_string(),
            )),
        }
    }
}

impl TryFrom<ActionWire> for Action {
    type Error = ParseFailure;

    fn try_from(wire: ActionWire) -> Result<Self, Self::Error> {
        Action::from_wire(wire, MoveBounds::default())
    }
}

/// Returns the first JSON object embedded in `text`, skipping prose, code fences
/// and any brace that does not start a well-formed object.
pub fn extract_action_json(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    for (start, _) in text.match_indices('{') {
        let mut stream =
            serde_json::Deserializer::from_str(&text[start..]).into_iter::<serde_json::Value>();
        if let Some(Ok(serde_json::Value::Object(map))) = stream.next() {
            return Some(map);
        }
    }
    None
}

/// Parses a model reply into a validated [`Action`].
pub fn parse_action_with(raw: &str, bounds: MoveBounds) -> Result<Action, ParseFailure> {
    let object = extract_action_json(raw).ok_or(ParseFailure::NoJsonObject)?;
    let wire: ActionWire = serde_json::from_value(serde_json::Value::Object(object))
        .map_err(|_| ParseFailure::MissingAction)?;
    Action::from_wire(wire, bounds)
}

pub fn parse_action(raw: &str) -> Result<Action, ParseFailure> {
    parse_action_with(raw, MoveBounds::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_object_from_prose() {
        let raw = "Sure! I'll head for the food.\n```json\n{\"action\": \"move\", \"direction\": \"up\", \"distance\": 2}\n```";
        let action = parse_action(raw).unwrap();
        assert_eq!(
            action,
            Action::Move {
                direction: Direction::Up,
                distance: 2.0
            }
        );
    }

    #[test]
    fn skips_braces_that_are_not_json() {
        let raw = "thinking {not json} then {\"action\":\"feed\",\"direction\":null,\"distance\":null}";
        assert_eq!(parse_action(raw).unwrap(), Action::Feed);
    }

    #[test]
    fn nested_objects_are_accepted() {
        let raw = "{\"action\":\"idle\",\"meta\":{\"why\":\"resting\"}}";
        assert_eq!(parse_action(raw).unwrap(), Action::Idle);
    }

    #[test]
    fn plain_prose_is_a_parse_failure() {
        let err = parse_action("I think I will move towards the food.").unwrap_err();
        assert_eq!(err, ParseFailure::NoJsonObject);
        assert!(err.to_string().contains("JSON object"));
    }

    #[test]
    fn distances_are_clamped_not_rejected() {
        let far = parse_action("{\"action\":\"move\",\"direction\":\"left\",\"distance\":40}").unwrap();
        assert_eq!(
            far,
            Action::Move {
                direction: Direction::Left,
                distance: 5.0
            }
        );
        let near = parse_action("{\"action\":\"move\",\"direction\":\"left\",\"distance\":0.01}").unwrap();
        assert_eq!(
            near,
            Action::Move {
                direction: Direction::Left,
                distance: 0.5
            }
        );
    }

    #[test]
    fn numeric_strings_are_accepted_for_distance() {
        let action =
            parse_action("{\"action\":\"MOVE\",\"direction\":\"Down_Right\",\"distance\":\"1.5\"}").unwrap();
        assert_eq!(
            action,
            Action::Move {
                direction: Direction::DownRight,
                distance: 1.5
            }
        );
    }

    #[test]
    fn missing_or_bad_direction_is_never_guessed() {
        let missing = parse_action("{\"action\":\"move\",\"direction\":null,\"distance\":1}").unwrap_err();
        assert_eq!(missing, ParseFailure::MissingDirection);

        let bad = parse_action("{\"action\":\"move\",\"direction\":\"north\",\"distance\":1}").unwrap_err();
        assert_eq!(bad, ParseFailure::InvalidDirection("north".to_string()));
        assert!(bad.to_string().contains("up-right"));
    }

    #[test]
    fn move_without_distance_fails() {
        let err = parse_action("{\"action\":\"move\",\"direction\":\"up\"}").unwrap_err();
        assert!(matches!(err, ParseFailure::MissingDistance { .. }));

        let err = parse_action("{\"action\":\"move\",\"direction\":\"up\",\"distance\":\"far\"}").unwrap_err();
        assert!(matches!(err, ParseFailure::InvalidDistance { .. }));
    }

    #[test]
    fn unknown_and_missing_actions_fail() {
        let err = parse_action("{\"action\":\"explode\"}").unwrap_err();
        assert_eq!(err, ParseFailure::UnknownAction("explode".to_string()));

        let err = parse_action("{\"direction\":\"up\"}").unwrap_err();
        assert_eq!(err, ParseFailure::MissingAction);

        let err = parse_action("{\"action\":7}").unwrap_err();
        assert_eq!(err, ParseFailure::MissingAction);
    }

    #[test]
    fn direction_units_follow_screen_axes() {
        let up = Direction::Up.unit();
        assert!(up.x.abs() < 1e-12);
        assert!((up.y + 1.0).abs() < 1e-12);
        let dr = Direction::DownRight.unit();
        assert!(dr.x > 0.0 && dr.y > 0.0);
        assert!((dr.x.hypot(dr.y) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn action_display_is_compact() {
        let action = Action::Move {
            direction: Direction::UpLeft,
            distance: 1.5,
        };
        assert_eq!(action.to_string(), "move up-left 1.50 bl");
        assert_eq!(Action::Divide.to_string(), "divide");
    }
}
