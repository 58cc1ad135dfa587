pub mod catalog;
pub mod groups;
pub mod push;
pub mod quota;
pub mod requests;

use axum::Router;
use serde_json::json;
use std::sync::Arc;

use crate::AppState;
use crate::services::error::ApiError;

/// Build all routes for the API
pub fn build_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(catalog::routes())
        .merge(groups::routes())
        .merge(push::routes())
        .merge(quota::routes())
        .merge(requests::routes())
}

/// Trim a string field and enforce its length bounds, in characters.
pub(crate) fn trimmed_field(
    value: &str,
    field: &'static str,
    min: usize,
    max: usize,
) -> Result<String, ApiError> {
    let trimmed = value.trim();
    let length = trimmed.chars().count();
    if length < min || length > max {
        return Err(ApiError::invalid_payload(json!({
            "field": field,
            "message": format!("must be {} to {} characters", min, max),
        })));
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trimmed_field_trims_and_bounds() {
        assert_eq!(
            trimmed_field("  花子  ", "displayName", 1, 40).expect("valid"),
            "花子"
        );
        assert!(trimmed_field("   ", "displayName", 1, 40).is_err());
        assert!(trimmed_field(&"x".repeat(41), "displayName", 1, 40).is_err());
    }

    #[test]
    fn trimmed_field_counts_characters_not_bytes() {
        // 30 Japanese characters are 90 bytes but still within a 30-char cap.
        let name = "あ".repeat(30);
        assert!(trimmed_field(&name, "name", 1, 30).is_ok());
    }
}
