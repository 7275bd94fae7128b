pub mod storage;

pub use storage::{FileStorage, MemoryStorage};

/// JSON-encoded persisted auth state, `{"state": {"token": ...}}`.
pub const LEGACY_AUTH_KEY: &str = "auth-storage";
/// Flat bearer token entry.
pub const TOKEN_KEY: &str = "token";

/// Abstraction over persisted client-side key/value storage.
/// Implementations: FileStorage (JSON file on disk), MemoryStorage.
pub trait ClientStorage: Send + Sync {
    fn get_item(&self, key: &str) -> Option<String>;

    fn set_item(&self, key: &str, value: &str) -> anyhow::Result<()>;

    fn remove_item(&self, key: &str) -> anyhow::Result<()>;
}

/// Read the bearer token, trying the legacy JSON entry before the flat key.
/// Never fails: anything unreadable counts as "no token".
pub fn get_auth_token(storage: &dyn ClientStorage) -> Option<String> {
    if let Some(raw) = storage.get_item(LEGACY_AUTH_KEY) {
        match serde_json::from_str::<serde_json::Value>(&raw) {
            Ok(value) => {
                let token = value
                    .pointer("/state/token")
                    .or_else(|| value.get("token"))
                    .and_then(|t| t.as_str())
                    .map(str::trim)
                    .filter(|t| !t.is_empty());
                if let Some(token) = token {
                    return Some(token.to_string());
                }
            }
            Err(e) => {
                tracing::debug!(key = LEGACY_AUTH_KEY, error = %e, "unparseable auth entry, ignoring");
            }
        }
    }

    storage
        .get_item(TOKEN_KEY)
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_from_nested_legacy_state() {
        let storage = MemoryStorage::new();
        storage
            .set_item(LEGACY_AUTH_KEY, r#"{"state":{"token":"abc","user":{}},"version":0}"#)
            .unwrap();
        storage.set_item(TOKEN_KEY, "flat").unwrap();
        assert_eq!(get_auth_token(&storage).as_deref(), Some("abc"));
    }

    #[test]
    fn test_token_from_top_level_legacy_field() {
        let storage = MemoryStorage::new();
        storage.set_item(LEGACY_AUTH_KEY, r#"{"token":"top"}"#).unwrap();
        assert_eq!(get_auth_token(&storage).as_deref(), Some("top"));
    }

    #[test]
    fn test_falls_back_to_flat_key() {
        let storage = MemoryStorage::new();
        storage.set_item(LEGACY_AUTH_KEY, r#"{"state":{"token":null}}"#).unwrap();
        storage.set_item(TOKEN_KEY, "flat").unwrap();
        assert_eq!(get_auth_token(&storage).as_deref(), Some("flat"));
    }

    #[test]
    fn test_corrupt_legacy_entry_does_not_fail() {
        let storage = MemoryStorage::new();
        storage.set_item(LEGACY_AUTH_KEY, "{not json").unwrap();
        assert_eq!(get_auth_token(&storage), None);

        storage.set_item(TOKEN_KEY, "flat").unwrap();
        assert_eq!(get_auth_token(&storage).as_deref(), Some("flat"));
    }

    #[test]
    fn test_blank_tokens_are_absent() {
        let storage = MemoryStorage::new();
        storage.set_item(TOKEN_KEY, "   ").unwrap();
        assert_eq!(get_auth_token(&storage), None);
    }
}
