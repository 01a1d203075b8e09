/// Input validation shared by the relay codec, the presence directory and the routes
use thiserror::Error;

/// Separator between payload fields and between names in a presence entry.
pub const FIELD_SEPARATOR: char = ';';

/// Separator between names in a player list field.
pub const LIST_SEPARATOR: char = ',';

pub const MAX_SERVER_NAME_LEN: usize = 64;

pub const MAX_PLAYER_LIST_LEN: usize = 1000;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Player name cannot be empty")]
    PlayerNameEmpty,

    #[error("Player name too long (max 16 characters, got {0})")]
    PlayerNameTooLong(usize),

    #[error("Player name contains invalid characters (only alphanumeric and underscore allowed)")]
    PlayerNameInvalidChars,

    #[error("Player list cannot be empty")]
    PlayerListEmpty,

    #[error("Player list too large (max {max} players, got {actual})")]
    PlayerListTooLarge { max: usize, actual: usize },

    #[error("Server name cannot be empty")]
    ServerNameEmpty,

    #[error("Server name too long (max 64 characters, got {0})")]
    ServerNameTooLong(usize),

    #[error("Server name cannot contain ';', ',' or control characters")]
    ServerNameInvalidChars,

    #[error("Field '{field}' cannot contain the reserved ';' separator")]
    ReservedDelimiter { field: &'static str },

    #[error("Field '{field}' cannot be empty")]
    EmptyField { field: &'static str },

    #[error("Field '{field}' must be a finite number")]
    NotFinite { field: &'static str },
}

/// Validates a Minecraft player name
///
/// Rules:
/// - Cannot be empty
/// - Max 16 characters (Minecraft username limit)
/// - Only ASCII alphanumeric characters and underscores
pub fn validate_player_name(name: &str) -> Result<(), ValidationError> {
    if name.is_empty() {
        return Err(ValidationError::PlayerNameEmpty);
    }

    if name.len() > 16 {
        return Err(ValidationError::PlayerNameTooLong(name.len()));
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::PlayerNameInvalidChars);
    }

    Ok(())
}

/// Validates a server name as registered with the proxy
///
/// Server names end up as hash fields and inside `;`-separated payloads,
/// so both separators are rejected.
pub fn validate_server_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::ServerNameEmpty);
    }

    if name.len() > MAX_SERVER_NAME_LEN {
        return Err(ValidationError::ServerNameTooLong(name.len()));
    }

    if name
        .chars()
        .any(|c| c == FIELD_SEPARATOR || c == LIST_SEPARATOR || c.is_control())
    {
        return Err(ValidationError::ServerNameInvalidChars);
    }

    Ok(())
}

/// Validates a list of player names for bulk operations
///
/// Rules:
/// - Max 1000 players per request
/// - Each player name must be valid
pub fn validate_player_list(players: &[String]) -> Result<(), ValidationError> {
    if players.len() > MAX_PLAYER_LIST_LEN {
        return Err(ValidationError::PlayerListTooLarge {
            max: MAX_PLAYER_LIST_LEN,
            actual: players.len(),
        });
    }

    for player in players {
        validate_player_name(player)?;
    }

    Ok(())
}

/// Validates a free-text payload field (reasons, messages, sound ids, world names).
pub fn validate_text_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.contains(FIELD_SEPARATOR) {
        return Err(ValidationError::ReservedDelimiter { field });
    }
    Ok(())
}

/// Like `validate_text_field`, but the value must also be non-empty.
pub fn validate_required_field(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.is_empty() {
        return Err(ValidationError::EmptyField { field });
    }
    validate_text_field(field, value)
}

pub fn validate_finite(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NotFinite { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_player_names() {
        assert!(validate_player_name("Steve").is_ok());
        assert!(validate_player_name("Player_123").is_ok());
        assert!(validate_player_name("a").is_ok());
        assert!(validate_player_name("1234567890123456").is_ok()); // exactly 16 chars
    }

    #[test]
    fn test_empty_player_name() {
        assert_eq!(
            validate_player_name(""),
            Err(ValidationError::PlayerNameEmpty)
        );
    }

    #[test]
    fn test_player_name_too_long() {
        assert_eq!(
            validate_player_name("12345678901234567"),
            Err(ValidationError::PlayerNameTooLong(17))
        );
    }

    #[test]
    fn test_player_name_invalid_chars() {
        for name in ["Player-123", "Player 123", "Steve;Alex", "Steve,Alex", "Stéve"] {
            assert_eq!(
                validate_player_name(name),
                Err(ValidationError::PlayerNameInvalidChars),
                "{name}"
            );
        }
    }

    #[test]
    fn test_valid_server_names() {
        assert!(validate_server_name("lobby-1").is_ok());
        assert!(validate_server_name("Survival 2").is_ok());
        assert!(validate_server_name(&"s".repeat(64)).is_ok());
    }

    #[test]
    fn test_invalid_server_names() {
        assert_eq!(validate_server_name(""), Err(ValidationError::ServerNameEmpty));
        assert_eq!(validate_server_name("   "), Err(ValidationError::ServerNameEmpty));
        assert_eq!(
            validate_server_name(&"s".repeat(65)),
            Err(ValidationError::ServerNameTooLong(65))
        );
        assert_eq!(
            validate_server_name("lobby;1"),
            Err(ValidationError::ServerNameInvalidChars)
        );
        assert_eq!(
            validate_server_name("lobby,1"),
            Err(ValidationError::ServerNameInvalidChars)
        );
        assert_eq!(
            validate_server_name("lobby\n1"),
            Err(ValidationError::ServerNameInvalidChars)
        );
    }

    #[test]
    fn test_player_list_too_large() {
        let players: Vec<String> = (0..1001).map(|i| format!("Player{}", i)).collect();
        assert_eq!(
            validate_player_list(&players),
            Err(ValidationError::PlayerListTooLarge {
                max: 1000,
                actual: 1001
            })
        );
    }

    #[test]
    fn test_player_list_with_invalid_name() {
        let players = vec!["Steve".to_string(), "".to_string(), "Alex".to_string()];
        assert_eq!(
            validate_player_list(&players),
            Err(ValidationError::PlayerNameEmpty)
        );
        assert!(validate_player_list(&[]).is_ok());
    }

    #[test]
    fn test_text_fields() {
        assert!(validate_text_field("reason", "").is_ok());
        assert!(validate_text_field("reason", "Bye, see you").is_ok());
        assert_eq!(
            validate_text_field("reason", "a;b"),
            Err(ValidationError::ReservedDelimiter { field: "reason" })
        );
        assert_eq!(
            validate_required_field("permission", ""),
            Err(ValidationError::EmptyField { field: "permission" })
        );
    }

    #[test]
    fn test_finite_numbers() {
        assert!(validate_finite("x", -12.5).is_ok());
        assert_eq!(
            validate_finite("x", f64::NAN),
            Err(ValidationError::NotFinite { field: "x" })
        );
        assert_eq!(
            validate_finite("y", f64::INFINITY),
            Err(ValidationError::NotFinite { field: "y" })
        );
    }
}
