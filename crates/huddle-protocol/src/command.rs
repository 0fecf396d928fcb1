//! Inbound command parsing.
//!
//! Each client frame is one line of text. A line must match exactly one of
//! six shapes, with a case-sensitive keyword, single-space separators, and
//! free-text tokens that contain no spaces:
//!
//! ```text
//! USER <nickname>
//! NEWG <name>
//! JOIN <groupId>
//! LINK <peerId> <label>
//! EXIT <groupId>
//! TEXT <groupId> <body>
//! ```
//!
//! Anything else is a [`ParseError`]. The relay's policy is permissive-drop:
//! callers discard parse failures without responding to the sender.

use crate::{GroupId, UserId};
use thiserror::Error;

/// A decoded client command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `USER <nickname>` - identify this connection.
    User { nickname: String },
    /// `NEWG <name>` - create a named room and join it.
    NewGroup { name: String },
    /// `JOIN <groupId>` - join an existing named room.
    Join { group: GroupId },
    /// `LINK <peerId> <label>` - open an anonymous two-party link.
    Link { peer: UserId, label: String },
    /// `EXIT <groupId>` - leave a room or link.
    Exit { group: GroupId },
    /// `TEXT <groupId> <body>` - relay chat content.
    Text { group: GroupId, body: String },
}

/// Why a line failed to parse.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// The line is empty.
    #[error("empty line")]
    Empty,

    /// The leading keyword is not one of the six commands.
    #[error("unknown command")]
    UnknownCommand,

    /// The keyword is valid but the arguments do not match its shape.
    #[error("malformed arguments for {0}")]
    BadArguments(&'static str),
}

/// Parse one line into a [`Command`].
///
/// # Errors
///
/// Returns a [`ParseError`] if the line matches none of the six command
/// shapes. Callers are expected to drop such lines silently.
pub fn parse(line: &str) -> Result<Command, ParseError> {
    if line.is_empty() {
        return Err(ParseError::Empty);
    }

    let (keyword, rest) = line.split_once(' ').ok_or(ParseError::UnknownCommand)?;

    match keyword {
        "USER" => Ok(Command::User {
            nickname: token(rest, "USER")?.to_owned(),
        }),
        "NEWG" => Ok(Command::NewGroup {
            name: token(rest, "NEWG")?.to_owned(),
        }),
        "JOIN" => Ok(Command::Join {
            group: number(rest, "JOIN")?,
        }),
        "LINK" => {
            let (peer, label) = rest.split_once(' ').ok_or(ParseError::BadArguments("LINK"))?;
            Ok(Command::Link {
                peer: number(peer, "LINK")?,
                label: token(label, "LINK")?.to_owned(),
            })
        }
        "EXIT" => Ok(Command::Exit {
            group: number(rest, "EXIT")?,
        }),
        "TEXT" => {
            let (group, body) = rest.split_once(' ').ok_or(ParseError::BadArguments("TEXT"))?;
            Ok(Command::Text {
                group: number(group, "TEXT")?,
                body: token(body, "TEXT")?.to_owned(),
            })
        }
        _ => Err(ParseError::UnknownCommand),
    }
}

/// A free-text token: non-empty, no spaces.
fn token<'a>(s: &'a str, cmd: &'static str) -> Result<&'a str, ParseError> {
    if s.is_empty() || s.contains(' ') {
        return Err(ParseError::BadArguments(cmd));
    }
    Ok(s)
}

/// A decimal id: non-empty digit run that fits in a u32.
fn number(s: &str, cmd: &'static str) -> Result<u32, ParseError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ParseError::BadArguments(cmd));
    }
    s.parse().map_err(|_| ParseError::BadArguments(cmd))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user() {
        assert_eq!(
            parse("USER alice"),
            Ok(Command::User {
                nickname: "alice".into()
            })
        );
    }

    #[test]
    fn test_parse_all_shapes() {
        assert_eq!(
            parse("NEWG lobby"),
            Ok(Command::NewGroup {
                name: "lobby".into()
            })
        );
        assert_eq!(parse("JOIN 0"), Ok(Command::Join { group: 0 }));
        assert_eq!(
            parse("LINK 7 bob"),
            Ok(Command::Link {
                peer: 7,
                label: "bob".into()
            })
        );
        assert_eq!(parse("EXIT 12"), Ok(Command::Exit { group: 12 }));
        assert_eq!(
            parse("TEXT 3 hello"),
            Ok(Command::Text {
                group: 3,
                body: "hello".into()
            })
        );
    }

    #[test]
    fn test_rejects_bare_keyword() {
        assert_eq!(parse("USER"), Err(ParseError::UnknownCommand));
        assert_eq!(parse("JOIN"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn test_rejects_empty_line() {
        assert_eq!(parse(""), Err(ParseError::Empty));
    }

    #[test]
    fn test_rejects_unknown_keyword() {
        assert_eq!(parse("PING 1"), Err(ParseError::UnknownCommand));
        // Keywords are case-sensitive.
        assert_eq!(parse("user alice"), Err(ParseError::UnknownCommand));
    }

    #[test]
    fn test_rejects_embedded_spaces() {
        // Free-text tokens must not contain spaces; full-match semantics.
        assert_eq!(
            parse("USER alice smith"),
            Err(ParseError::BadArguments("USER"))
        );
        assert_eq!(
            parse("TEXT 3 hello world"),
            Err(ParseError::BadArguments("TEXT"))
        );
        assert_eq!(parse("USER  alice"), Err(ParseError::BadArguments("USER")));
        assert_eq!(parse("USER alice "), Err(ParseError::BadArguments("USER")));
    }

    #[test]
    fn test_rejects_non_numeric_ids() {
        assert_eq!(parse("JOIN abc"), Err(ParseError::BadArguments("JOIN")));
        assert_eq!(parse("JOIN -1"), Err(ParseError::BadArguments("JOIN")));
        assert_eq!(parse("EXIT 1x"), Err(ParseError::BadArguments("EXIT")));
    }

    #[test]
    fn test_rejects_id_overflow() {
        assert_eq!(
            parse("JOIN 99999999999999999999"),
            Err(ParseError::BadArguments("JOIN"))
        );
    }
}
