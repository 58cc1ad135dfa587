//! Member authentication and group secrets.
//!
//! Clients identify themselves with the mutual `x-member-id` and
//! `x-device-id` headers; both must resolve to a members row. Group
//! passphrases are stored as PBKDF2-HMAC-SHA256 strings, invite tokens as
//! SHA-256 hex digests of the random token handed to the group creator.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::AppState;
use crate::constants::{PASSPHRASE_ITERATIONS, PASSPHRASE_SALT_BYTES};
use crate::domain::groups;
use crate::models::Role;
use crate::services::error::{ApiError, LogErr};

const PASSHASH_PREFIX: &str = "pbkdf2_sha256";

type HmacSha256 = Hmac<Sha256>;

/// The `x-member-id` / `x-device-id` pair every member-scoped endpoint needs.
/// Rejects with 401 when either header is missing or malformed.
pub struct MemberHeaders {
    pub member_id: Uuid,
    pub device_id: String,
}

impl FromRequestParts<Arc<AppState>> for MemberHeaders {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        _state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let member_id = parts
            .headers
            .get("x-member-id")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| Uuid::parse_str(v).ok())
            .ok_or_else(ApiError::unauthorized)?;

        let device_id = parts
            .headers
            .get("x-device-id")
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .ok_or_else(ApiError::unauthorized)?;

        Ok(MemberHeaders {
            member_id,
            device_id,
        })
    }
}

/// A verified group membership
#[derive(Debug, Clone)]
pub struct AuthedMember {
    pub id: Uuid,
    pub group_id: Uuid,
    pub display_name: String,
    pub role: Role,
}

/// Resolve the caller to a member of the given group, or 401.
pub async fn require_member(
    db: &PgPool,
    headers: &MemberHeaders,
    group_id: Uuid,
) -> Result<AuthedMember, ApiError> {
    let row = groups::get_member(db, headers.member_id, group_id, &headers.device_id)
        .await
        .or_internal("Member lookup failed")?;

    row.map(AuthedMember::from_row)
        .ok_or_else(ApiError::unauthorized)
}

/// Resolve the caller to a member of any group (ack/complete endpoints carry
/// no group in the path), or 401.
pub async fn require_member_any_group(
    db: &PgPool,
    headers: &MemberHeaders,
) -> Result<AuthedMember, ApiError> {
    let row = groups::get_member_any_group(db, headers.member_id, &headers.device_id)
        .await
        .or_internal("Member lookup failed")?;

    row.map(AuthedMember::from_row)
        .ok_or_else(ApiError::unauthorized)
}

impl AuthedMember {
    fn from_row(row: groups::MemberRow) -> AuthedMember {
        AuthedMember {
            id: row.id,
            group_id: row.group_id,
            display_name: row.display_name,
            role: Role::from_db(&row.role),
        }
    }
}

/// Random URL-safe token of `byte_length` random bytes.
pub fn random_token(byte_length: usize) -> String {
    use rand::Rng;
    let mut bytes = vec![0u8; byte_length];
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Lowercase hex SHA-256 digest, used for invite token lookups.
pub fn sha256_hex(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

fn derive_passphrase_hash(passphrase: &str, salt: &[u8], iterations: u32) -> [u8; 32] {
    // PBKDF2-HMAC-SHA256 with a single 32-byte output block.
    let mut mac = HmacSha256::new_from_slice(passphrase.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(salt);
    mac.update(&1u32.to_be_bytes());
    let mut u = mac.finalize().into_bytes();

    let mut output = [0u8; 32];
    output.copy_from_slice(&u);

    for _ in 1..iterations {
        let mut mac = HmacSha256::new_from_slice(passphrase.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(&u);
        u = mac.finalize().into_bytes();
        for (out_byte, u_byte) in output.iter_mut().zip(u.iter()) {
            *out_byte ^= u_byte;
        }
    }
    output
}

/// `pbkdf2_sha256$<iterations>$<salt>$<hash>` with base64url fields.
pub fn hash_passphrase(passphrase: &str) -> String {
    use rand::Rng;
    let salt: [u8; PASSPHRASE_SALT_BYTES] = rand::rng().random();
    let hash = derive_passphrase_hash(passphrase, &salt, PASSPHRASE_ITERATIONS);
    format!(
        "{}${}${}${}",
        PASSHASH_PREFIX,
        PASSPHRASE_ITERATIONS,
        URL_SAFE_NO_PAD.encode(salt),
        URL_SAFE_NO_PAD.encode(hash)
    )
}

fn timing_safe_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    let mut diff = 0u8;
    for (l, r) in left.iter().zip(right.iter()) {
        diff |= l ^ r;
    }
    diff == 0
}

/// Verify against the PBKDF2 format, falling back to the legacy plain
/// SHA-256 hex hashes of groups created before the migration.
pub fn verify_passphrase(passphrase: &str, stored_hash: &str) -> bool {
    let parts: Vec<&str> = stored_hash.split('$').collect();
    if let [scheme, iteration_text, salt_text, hash_text] = parts[..] {
        if scheme == PASSHASH_PREFIX {
            let Ok(iterations) = iteration_text.parse::<u32>() else {
                return false;
            };
            if iterations == 0 {
                return false;
            }
            let (Ok(salt), Ok(expected)) = (
                URL_SAFE_NO_PAD.decode(salt_text),
                URL_SAFE_NO_PAD.decode(hash_text),
            ) else {
                return false;
            };
            let derived = derive_passphrase_hash(passphrase, &salt, iterations);
            return timing_safe_eq(&derived, &expected);
        }
    }

    sha256_hex(passphrase) == stored_hash
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(bytes: &[u8]) -> String {
        bytes.iter().map(|b| format!("{:02x}", b)).collect()
    }

    #[test]
    fn pbkdf2_matches_published_vectors() {
        assert_eq!(
            hex(&derive_passphrase_hash("password", b"salt", 1)),
            "120fb6cffcf8b32c43e7225256c4f837a86548c92ccc35480805987cb70be17b"
        );
        assert_eq!(
            hex(&derive_passphrase_hash("password", b"salt", 2)),
            "ae4d0c95af6b46d32d0adff928f06dd02a303f8ef3c251dfd6e2d85a95474c43"
        );
    }

    #[test]
    fn passphrase_round_trips() {
        let stored = hash_passphrase("kitchen-sink-42");
        assert!(stored.starts_with("pbkdf2_sha256$120000$"));
        assert!(verify_passphrase("kitchen-sink-42", &stored));
        assert!(!verify_passphrase("kitchen-sink-43", &stored));
    }

    #[test]
    fn legacy_sha256_hashes_still_verify() {
        let stored = sha256_hex("household");
        assert!(verify_passphrase("household", &stored));
        assert!(!verify_passphrase("neighbour", &stored));
    }

    #[test]
    fn malformed_stored_hashes_are_rejected() {
        assert!(!verify_passphrase("anything", "pbkdf2_sha256$zero$AA$AA"));
        assert!(!verify_passphrase("anything", "pbkdf2_sha256$0$AA$AA"));
        assert!(!verify_passphrase("anything", "pbkdf2_sha256$1$!!$AA"));
    }

    #[test]
    fn random_tokens_are_url_safe_and_distinct() {
        let token = random_token(24);
        assert_eq!(token.len(), 32);
        assert!(
            token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
        assert_ne!(token, random_token(24));
    }

    #[test]
    fn sha256_hex_is_lowercase_and_stable() {
        assert_eq!(
            sha256_hex("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn timing_safe_eq_compares_content() {
        assert!(timing_safe_eq(b"same", b"same"));
        assert!(!timing_safe_eq(b"same", b"sane"));
        assert!(!timing_safe_eq(b"same", b"longer"));
    }
}
