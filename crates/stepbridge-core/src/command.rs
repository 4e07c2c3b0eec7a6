//! Host command grammar
//!
//! Classifies one host line into a [`Command`]. Matching is anchored and
//! whole-line: the line must end in exactly one `\n` and contain nothing else
//! outside the grammar. Anything that does not match becomes
//! [`Command::Invalid`]; parsing never fails.
//!
//! | Line                   | Command          |
//! |------------------------|------------------|
//! | `C`                    | `Heartbeat`      |
//! | `M<axis><±int>[G\|S]`  | relative `Move`  |
//! | `A<axis><±int>[G\|S]`  | absolute `Move`  |
//! | `H<axis>`              | `Home`           |
//! | `S`                    | `StatusRequest`  |
//! | `E`                    | `EmergencyStop`  |
//! | `K<axis>`              | `Kill`           |
//! | `P[V\|A]<uint>`        | `Profile`        |
//! | `T<uint>`              | `TimeoutSet`     |

use crate::axis::AxisId;
use crate::constants::LINE_TERMINATOR;
use crate::units::Unit;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Move reference frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MoveKind {
    /// `M`: offset from the current position
    Relative,
    /// `A`: absolute target position
    Absolute,
}

impl MoveKind {
    /// Wire letter
    pub fn letter(self) -> char {
        match self {
            Self::Relative => 'M',
            Self::Absolute => 'A',
        }
    }
}

/// Motion profile parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileKind {
    /// `PV`: velocity
    Velocity,
    /// `PA`: acceleration
    Acceleration,
}

impl ProfileKind {
    /// Wire letter following `P`
    pub fn letter(self) -> char {
        match self {
            Self::Velocity => 'V',
            Self::Acceleration => 'A',
        }
    }
}

/// One decoded host line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    /// `C`
    Heartbeat,
    /// `M`/`A` move
    Move {
        kind: MoveKind,
        axis: AxisId,
        value: i64,
        unit: Unit,
    },
    /// `H<axis>`
    Home { axis: AxisId },
    /// `S`
    StatusRequest,
    /// `E`
    EmergencyStop,
    /// `K<axis>`
    Kill { axis: AxisId },
    /// `PV<n>` / `PA<n>`
    Profile { kind: ProfileKind, value: u64 },
    /// `T<n>`
    TimeoutSet { value: u64 },
    /// Anything outside the grammar; `raw` is the line as received (lossy UTF-8)
    Invalid { raw: String },
}

impl Command {
    /// Classify one line, including its trailing `\n`
    pub fn parse(line: &[u8]) -> Self {
        Self::parse_body(line).unwrap_or_else(|| Self::Invalid {
            raw: String::from_utf8_lossy(line).into_owned(),
        })
    }

    fn parse_body(line: &[u8]) -> Option<Self> {
        let body = line.strip_suffix(&[LINE_TERMINATOR])?;
        let (&letter, rest) = body.split_first()?;

        match (letter, rest) {
            (b'C', []) => Some(Self::Heartbeat),
            (b'S', []) => Some(Self::StatusRequest),
            (b'E', []) => Some(Self::EmergencyStop),
            (b'H', [digit]) => AxisId::from_digit(*digit).map(|axis| Self::Home { axis }),
            (b'K', [digit]) => AxisId::from_digit(*digit).map(|axis| Self::Kill { axis }),
            (b'M', rest) => parse_move(MoveKind::Relative, rest),
            (b'A', rest) => parse_move(MoveKind::Absolute, rest),
            (b'P', [b'V', digits @ ..]) => parse_unsigned(digits).map(|value| Self::Profile {
                kind: ProfileKind::Velocity,
                value,
            }),
            (b'P', [b'A', digits @ ..]) => parse_unsigned(digits).map(|value| Self::Profile {
                kind: ProfileKind::Acceleration,
                value,
            }),
            (b'T', digits) => parse_unsigned(digits).map(|value| Self::TimeoutSet { value }),
            _ => None,
        }
    }

    /// True for everything except `Invalid`
    pub fn is_valid(&self) -> bool {
        !matches!(self, Self::Invalid { .. })
    }
}

/// Device-side wire form, without the trailing newline.
///
/// A `Move` is written with its value as-is and no unit suffix; callers
/// convert to steps first.
impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Heartbeat => write!(f, "C"),
            Self::Move {
                kind, axis, value, ..
            } => write!(f, "{}{}{}", kind.letter(), axis, value),
            Self::Home { axis } => write!(f, "H{}", axis),
            Self::StatusRequest => write!(f, "S"),
            Self::EmergencyStop => write!(f, "E"),
            Self::Kill { axis } => write!(f, "K{}", axis),
            Self::Profile { kind, value } => write!(f, "P{}{}", kind.letter(), value),
            Self::TimeoutSet { value } => write!(f, "T{}", value),
            Self::Invalid { raw } => write!(f, "{}", raw.trim_end_matches('\n')),
        }
    }
}

fn parse_move(kind: MoveKind, rest: &[u8]) -> Option<Command> {
    let (&digit, rest) = rest.split_first()?;
    let axis = AxisId::from_digit(digit)?;

    let (number, unit) = match rest.split_last() {
        Some((&suffix, number)) if !suffix.is_ascii_digit() => {
            (number, Unit::from_suffix(suffix)?)
        }
        _ => (rest, Unit::Steps),
    };

    Some(Command::Move {
        kind,
        axis,
        value: parse_signed(number)?,
        unit,
    })
}

/// `[+-]?[0-9]+`, within `i64`
fn parse_signed(bytes: &[u8]) -> Option<i64> {
    let digits = match bytes.first() {
        Some(b'+' | b'-') => &bytes[1..],
        _ => bytes,
    };
    if !is_digits(digits) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

/// `[0-9]+`, within `u64`
fn parse_unsigned(bytes: &[u8]) -> Option<u64> {
    if !is_digits(bytes) {
        return None;
    }
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn is_digits(bytes: &[u8]) -> bool {
    !bytes.is_empty() && bytes.iter().all(u8::is_ascii_digit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn axis(id: u8) -> AxisId {
        AxisId::new(id).unwrap()
    }

    #[test]
    fn test_parse_bare_letters() {
        assert_eq!(Command::parse(b"C\n"), Command::Heartbeat);
        assert_eq!(Command::parse(b"S\n"), Command::StatusRequest);
        assert_eq!(Command::parse(b"E\n"), Command::EmergencyStop);
    }

    #[test]
    fn test_parse_moves() {
        assert_eq!(
            Command::parse(b"M1100\n"),
            Command::Move {
                kind: MoveKind::Relative,
                axis: axis(1),
                value: 100,
                unit: Unit::Steps,
            }
        );
        assert_eq!(
            Command::parse(b"A2-90G\n"),
            Command::Move {
                kind: MoveKind::Absolute,
                axis: axis(2),
                value: -90,
                unit: Unit::Degrees,
            }
        );
        assert_eq!(
            Command::parse(b"M6+15S\n"),
            Command::Move {
                kind: MoveKind::Relative,
                axis: axis(6),
                value: 15,
                unit: Unit::Steps,
            }
        );
    }

    #[test]
    fn test_parse_axis_commands() {
        assert_eq!(Command::parse(b"H3\n"), Command::Home { axis: axis(3) });
        assert_eq!(Command::parse(b"K6\n"), Command::Kill { axis: axis(6) });
        assert!(!Command::parse(b"H0\n").is_valid());
        assert!(!Command::parse(b"H7\n").is_valid());
        assert!(!Command::parse(b"H\n").is_valid());
        assert!(!Command::parse(b"K12\n").is_valid());
    }

    #[test]
    fn test_parse_profile_and_timeout() {
        assert_eq!(
            Command::parse(b"PV1200\n"),
            Command::Profile {
                kind: ProfileKind::Velocity,
                value: 1200
            }
        );
        assert_eq!(
            Command::parse(b"PA500\n"),
            Command::Profile {
                kind: ProfileKind::Acceleration,
                value: 500
            }
        );
        assert_eq!(Command::parse(b"T3000\n"), Command::TimeoutSet { value: 3000 });
        assert!(!Command::parse(b"PX100\n").is_valid());
        assert!(!Command::parse(b"PV\n").is_valid());
        assert!(!Command::parse(b"PV-5\n").is_valid());
        assert!(!Command::parse(b"T\n").is_valid());
    }

    #[test]
    fn test_rejects_malformed_lines() {
        for line in [
            &b"Z9\n"[..],
            b"",
            b"\n",
            b"C",
            b"C\r\n",
            b"C\n\n",
            b"c\n",
            b"m1100\n",
            b" C\n",
            b"M7100\n",
            b"M1\n",
            b"M1+\n",
            b"M1100X\n",
            b"M1100GG\n",
            b"M1G\n",
            b"M1 100\n",
            b"S1\n",
            b"M199999999999999999999\n",
        ] {
            assert!(
                !Command::parse(line).is_valid(),
                "{:?} should be invalid",
                String::from_utf8_lossy(line)
            );
        }
    }

    #[test]
    fn test_invalid_keeps_raw_line() {
        assert_eq!(
            Command::parse(b"Z9\n"),
            Command::Invalid {
                raw: "Z9\n".to_string()
            }
        );
    }

    #[test]
    fn test_device_wire_form() {
        let cmd = Command::Move {
            kind: MoveKind::Absolute,
            axis: axis(2),
            value: -500,
            unit: Unit::Steps,
        };
        assert_eq!(cmd.to_string(), "A2-500");
        assert_eq!(Command::Kill { axis: axis(4) }.to_string(), "K4");
        assert_eq!(
            Command::Profile {
                kind: ProfileKind::Acceleration,
                value: 250
            }
            .to_string(),
            "PA250"
        );
    }

    proptest! {
        #[test]
        fn parse_is_total(line in proptest::collection::vec(any::<u8>(), 0..32)) {
            let _ = Command::parse(&line);
        }

        #[test]
        fn lines_without_terminator_are_invalid(body in "[A-Z0-9+-]{0,12}") {
            prop_assert!(!Command::parse(body.as_bytes()).is_valid());
        }

        #[test]
        fn pass_through_commands_round_trip(id in 1u8..=6, value in any::<u32>()) {
            for line in [
                format!("H{}\n", id),
                format!("K{}\n", id),
                format!("PV{}\n", value),
                format!("PA{}\n", value),
                format!("T{}\n", value),
            ] {
                let cmd = Command::parse(line.as_bytes());
                prop_assert!(cmd.is_valid());
                prop_assert_eq!(format!("{}\n", cmd), line);
            }
        }
    }
}
