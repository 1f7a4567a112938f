//! Token extraction from auth endpoint replies.
//!
//! The backend has used several field names for the same token over time.
//! This module is the single normalization boundary for them: every caller
//! goes through these functions instead of reading a field directly, and the
//! accepted aliases must not be narrowed.

use serde_json::Value;

use crate::store::Secret;

/// Access token aliases accepted from the refresh endpoint, in priority order.
pub const REFRESH_ACCESS_FIELDS: &[&str] = &["access_token", "token", "access", "accessToken"];

/// Access token aliases accepted from the login endpoint, in priority order.
pub const LOGIN_ACCESS_FIELDS: &[&str] = &["access_token", "token", "access"];

/// Refresh token aliases, in priority order.
pub const REFRESH_TOKEN_FIELDS: &[&str] = &["refresh_token", "refreshToken", "refresh"];

/// First non-empty string among `fields`.
///
/// # Examples
///
/// ```
/// use serde_json::json;
/// use studyai_core::token::first_token;
///
/// let body = json!({ "token": "", "access": "abc" });
/// let token = first_token(&body, &["token", "access"]).unwrap();
/// assert_eq!(token.expose(), "abc");
/// ```
pub fn first_token(body: &Value, fields: &[&str]) -> Option<Secret> {
    fields
        .iter()
        .filter_map(|field| body.get(*field))
        .filter_map(Value::as_str)
        .find(|value| !value.is_empty())
        .map(Secret::new)
}

/// Access token from a refresh reply.
pub fn extract_refreshed_access(body: &Value) -> Option<Secret> {
    first_token(body, REFRESH_ACCESS_FIELDS)
}

/// Access token from a login reply.
pub fn extract_login_access(body: &Value) -> Option<Secret> {
    first_token(body, LOGIN_ACCESS_FIELDS)
}

/// Refresh token from a login or refresh reply.
pub fn extract_refresh_token(body: &Value) -> Option<Secret> {
    first_token(body, REFRESH_TOKEN_FIELDS)
}

/// Server-supplied error detail (`{"detail": "..."}`), if any.
pub fn error_detail(body: &Value) -> Option<String> {
    match body.get("detail")? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_refresh_accepts_every_alias() {
        for field in REFRESH_ACCESS_FIELDS {
            let mut map = serde_json::Map::new();
            map.insert(field.to_string(), json!("new-access"));
            let body = Value::Object(map);
            let token = extract_refreshed_access(&body).unwrap();
            assert_eq!(token.expose(), "new-access", "alias {}", field);
        }
    }

    #[test]
    fn test_priority_order() {
        let body = json!({ "accessToken": "d", "access": "c", "access_token": "a" });
        assert_eq!(extract_refreshed_access(&body).unwrap().expose(), "a");
    }

    #[test]
    fn test_login_ignores_camel_case_access() {
        let body = json!({ "accessToken": "x" });
        assert!(extract_login_access(&body).is_none());
    }

    #[test]
    fn test_non_string_and_empty_are_absent() {
        let body = json!({ "access_token": 42, "token": "", "access": null });
        assert!(extract_refreshed_access(&body).is_none());
    }

    #[test]
    fn test_refresh_token_aliases() {
        let body = json!({ "refreshToken": "r" });
        assert_eq!(extract_refresh_token(&body).unwrap().expose(), "r");
    }

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(&json!({ "detail": "Incorrect password" })).as_deref(),
            Some("Incorrect password")
        );
        assert!(error_detail(&json!({})).is_none());
    }
}
