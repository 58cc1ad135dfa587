//! Shared data models used across modules

use axum::http::HeaderMap;
use serde::{Deserialize, Serialize};

/// Member role within a group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Member,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Member => "member",
        }
    }

    /// The role column is CHECK-constrained, so anything that is not "admin"
    /// is a regular member.
    pub fn from_db(value: &str) -> Role {
        if value == "admin" {
            Role::Admin
        } else {
            Role::Member
        }
    }
}

/// Lifecycle of a shopping request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Requested,
    Acknowledged,
    Completed,
}

impl RequestStatus {
    pub fn from_db(value: &str) -> RequestStatus {
        match value {
            "acknowledged" => RequestStatus::Acknowledged,
            "completed" => RequestStatus::Completed,
            _ => RequestStatus::Requested,
        }
    }
}

/// Display language for system catalog names
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogLanguage {
    Ja,
    En,
}

impl CatalogLanguage {
    /// Explicit `x-app-lang` wins; otherwise the `accept-language` prefix
    /// decides, defaulting to English.
    pub fn from_headers(headers: &HeaderMap) -> CatalogLanguage {
        if let Some(explicit) = headers.get("x-app-lang").and_then(|v| v.to_str().ok()) {
            match explicit {
                "ja" => return CatalogLanguage::Ja,
                "en" => return CatalogLanguage::En,
                _ => {}
            }
        }
        let accept = headers
            .get("accept-language")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("")
            .to_lowercase();
        if accept.starts_with("ja") {
            CatalogLanguage::Ja
        } else {
            CatalogLanguage::En
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn explicit_app_lang_header_wins() {
        let mut headers = HeaderMap::new();
        headers.insert("x-app-lang", HeaderValue::from_static("ja"));
        headers.insert("accept-language", HeaderValue::from_static("en-US"));
        assert_eq!(CatalogLanguage::from_headers(&headers), CatalogLanguage::Ja);
    }

    #[test]
    fn accept_language_prefix_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("accept-language", HeaderValue::from_static("ja-JP,ja;q=0.9"));
        assert_eq!(CatalogLanguage::from_headers(&headers), CatalogLanguage::Ja);

        let empty = HeaderMap::new();
        assert_eq!(CatalogLanguage::from_headers(&empty), CatalogLanguage::En);
    }

    #[test]
    fn unknown_explicit_language_falls_through() {
        let mut headers = HeaderMap::new();
        headers.insert("x-app-lang", HeaderValue::from_static("fr"));
        headers.insert("accept-language", HeaderValue::from_static("ja"));
        assert_eq!(CatalogLanguage::from_headers(&headers), CatalogLanguage::Ja);
    }

    #[test]
    fn role_round_trips_through_db_strings() {
        assert_eq!(Role::from_db("admin"), Role::Admin);
        assert_eq!(Role::from_db("member"), Role::Member);
        assert_eq!(Role::Admin.as_str(), "admin");
        assert_eq!(RequestStatus::from_db("completed"), RequestStatus::Completed);
        assert_eq!(RequestStatus::from_db("requested"), RequestStatus::Requested);
    }
}
