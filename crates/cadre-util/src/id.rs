//! ULID-based identifiers.
//!
//! Identifiers follow the pattern `prefix_ulid`, for example `ses_01hqxyz...`.

use ulid::Ulid;

/// Known identifier prefixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdPrefix {
    Session,
    Message,
    Call,
    Memory,
}

impl IdPrefix {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdPrefix::Session => "ses",
            IdPrefix::Message => "msg",
            IdPrefix::Call => "call",
            IdPrefix::Memory => "mem",
        }
    }

    /// Parse a prefix from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ses" => Some(IdPrefix::Session),
            "msg" => Some(IdPrefix::Message),
            "call" => Some(IdPrefix::Call),
            "mem" => Some(IdPrefix::Memory),
            _ => None,
        }
    }
}

/// Identifier generation and parsing.
pub struct Identifier;

impl Identifier {
    /// Generate a new ascending identifier (newer = larger).
    pub fn ascending(prefix: IdPrefix) -> String {
        format!("{}_{}", prefix.as_str(), Ulid::new().to_string().to_lowercase())
    }

    /// Parse an identifier into its prefix and ULID parts.
    pub fn parse(id: &str) -> Option<(IdPrefix, Ulid)> {
        let (prefix, ulid) = id.split_once('_')?;
        let prefix = IdPrefix::parse(prefix)?;
        let ulid = Ulid::from_string(ulid).ok()?;
        Some((prefix, ulid))
    }

    pub fn session() -> String {
        Self::ascending(IdPrefix::Session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascending_id() {
        let id = Identifier::ascending(IdPrefix::Session);
        assert!(id.starts_with("ses_"));
        assert_eq!(id.len(), 30);
    }

    #[test]
    fn test_ascending_order() {
        let id1 = Identifier::ascending(IdPrefix::Message);
        std::thread::sleep(std::time::Duration::from_millis(2));
        let id2 = Identifier::ascending(IdPrefix::Message);
        assert!(id1 < id2);
    }

    #[test]
    fn test_parse_round_trip() {
        let id = Identifier::ascending(IdPrefix::Call);
        let (prefix, _) = Identifier::parse(&id).unwrap();
        assert_eq!(prefix, IdPrefix::Call);
    }

    #[test]
    fn test_parse_invalid() {
        assert!(Identifier::parse("nounderscore").is_none());
        assert!(Identifier::parse("xyz_01HQXYZ").is_none());
        assert!(Identifier::parse("ses_notaulid").is_none());
    }
}
