//! Member names and the chat lines derived from them.

use std::fmt;

use thiserror::Error;

/// Display name a client supplies during the handshake.
///
/// The very first payload received on a new connection is interpreted as
/// the name, trimmed of surrounding whitespace. Names are set once and are
/// not guaranteed unique; registry identity is the connection, not the name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MemberName(String);

impl MemberName {
    /// Parses a raw handshake payload into a name.
    ///
    /// # Errors
    ///
    /// - `NameError::Empty` if the payload is empty after trimming
    pub fn parse(raw: &str) -> Result<Self, NameError> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(NameError::Empty);
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Returns the underlying string reference.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The announcement broadcast to existing members when this member joins.
    #[must_use]
    pub fn join_announcement(&self) -> String {
        format!("{} has joined the chat!", self.0)
    }

    /// The announcement broadcast to remaining members on a graceful leave.
    ///
    /// Abrupt disconnects produce no announcement, only a server log line.
    #[must_use]
    pub fn leave_announcement(&self) -> String {
        format!("{} has left the chat", self.0)
    }

    /// The sentinel payload that requests a graceful leave.
    #[must_use]
    pub fn quit_token(&self) -> String {
        format!("{}bye", self.0)
    }

    /// Checks whether a payload is this member's quit sentinel.
    ///
    /// The comparison trims surrounding whitespace and ignores ASCII case,
    /// so `"bobBYE\n"` quits a member named `Bob`.
    #[must_use]
    pub fn is_quit(&self, payload: &str) -> bool {
        payload.trim().eq_ignore_ascii_case(&self.quit_token())
    }
}

impl fmt::Display for MemberName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for MemberName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Errors produced while parsing a member name.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    /// The handshake payload was empty or whitespace only.
    #[error("display name is empty")]
    Empty,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_trims_surrounding_whitespace() {
        let name = MemberName::parse("  Alice \r\n").unwrap();
        assert_eq!(name.as_str(), "Alice");
    }

    #[test]
    fn parse_rejects_empty_and_whitespace_only() {
        assert_eq!(MemberName::parse(""), Err(NameError::Empty));
        assert_eq!(MemberName::parse(" \t\n"), Err(NameError::Empty));
    }

    #[test]
    fn announcements_use_exact_wording() {
        let name = MemberName::parse("Bob").unwrap();
        assert_eq!(name.join_announcement(), "Bob has joined the chat!");
        assert_eq!(name.leave_announcement(), "Bob has left the chat");
    }

    #[test]
    fn quit_token_matches_case_insensitively() {
        let name = MemberName::parse("Bob").unwrap();
        assert!(name.is_quit("Bobbye"));
        assert!(name.is_quit("BOBBYE"));
        assert!(name.is_quit("  bobbye\n"));
        assert!(!name.is_quit("Bob bye"));
        assert!(!name.is_quit("Alicebye"));
    }

    #[test]
    fn quit_token_never_matches_ordinary_chat() {
        let name = MemberName::parse("Bob").unwrap();
        assert!(!name.is_quit("Bob: bye everyone"));
        assert!(!name.is_quit(""));
    }
}
