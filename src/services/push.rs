//! Web-push fanout for new shopping requests.
//!
//! Delivery is best effort: per-subscription failures are logged and never
//! fail the request that triggered them. Endpoints the push service reports
//! as gone are cleaned up afterwards.

use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;
use web_push::{
    ContentEncoding, IsahcWebPushClient, SubscriptionInfo, URL_SAFE_NO_PAD, Urgency,
    VapidSignatureBuilder, WebPushClient, WebPushError, WebPushMessageBuilder,
};

use crate::domain::push as domain_push;

/// Push TTL: a shopping request is stale after a few hours.
const PUSH_TTL_SECS: u32 = 4 * 60 * 60;

#[derive(Debug, Serialize)]
struct PushPayload {
    title: String,
    body: String,
    tag: String,
    data: PushPayloadData,
}

#[derive(Debug, Serialize)]
struct PushPayloadData {
    url: String,
    kind: String,
}

enum PushSendError {
    /// The push service no longer knows the endpoint (unsubscribed client)
    Expired,
    Other(String),
}

fn build_vapid_signature(
    private_key: &str,
    subscription_info: &SubscriptionInfo,
) -> Result<web_push::VapidSignature, String> {
    if private_key.contains("BEGIN PRIVATE KEY") || private_key.contains("BEGIN EC PRIVATE KEY") {
        VapidSignatureBuilder::from_pem(private_key.as_bytes(), subscription_info)
            .map_err(|error| error.to_string())?
            .build()
            .map_err(|error| error.to_string())
    } else {
        VapidSignatureBuilder::from_base64(private_key, URL_SAFE_NO_PAD, subscription_info)
            .map_err(|error| error.to_string())?
            .build()
            .map_err(|error| error.to_string())
    }
}

async fn send_push_message(
    client: &IsahcWebPushClient,
    payload: &[u8],
    subscription: &domain_push::PushSubscriptionData,
    private_key: &str,
) -> Result<(), PushSendError> {
    let subscription_info = SubscriptionInfo::new(
        &subscription.endpoint,
        &subscription.keys.p256dh,
        &subscription.keys.auth,
    );

    let signature =
        build_vapid_signature(private_key, &subscription_info).map_err(PushSendError::Other)?;

    let mut message = WebPushMessageBuilder::new(&subscription_info);
    message.set_payload(ContentEncoding::Aes128Gcm, payload);
    message.set_ttl(PUSH_TTL_SECS);
    message.set_urgency(Urgency::Normal);
    message.set_vapid_signature(signature);

    let message = message
        .build()
        .map_err(|error| PushSendError::Other(error.to_string()))?;

    match client.send(message).await {
        Ok(()) => Ok(()),
        Err(WebPushError::EndpointNotValid) | Err(WebPushError::EndpointNotFound) => {
            Err(PushSendError::Expired)
        }
        Err(error) => Err(PushSendError::Other(error.to_string())),
    }
}

/// Send a request notification to every subscription of the given members,
/// deleting subscriptions whose endpoints have expired.
pub async fn notify_members(
    db: &PgPool,
    recipient_member_ids: &[Uuid],
    message: &str,
) -> Result<(), String> {
    if recipient_member_ids.is_empty() {
        return Ok(());
    }

    let private_key = match std::env::var("VAPID_PRIVATE_KEY") {
        Ok(key) if !key.is_empty() => key,
        _ => {
            eprintln!("[push] Missing VAPID_PRIVATE_KEY; skipping notifications");
            return Ok(());
        }
    };

    let subscriptions = domain_push::list_subscriptions_for_members(db, recipient_member_ids)
        .await
        .map_err(|error| error.to_string())?;

    if subscriptions.is_empty() {
        return Ok(());
    }

    let client = IsahcWebPushClient::new().map_err(|error| error.to_string())?;

    let payload = PushPayload {
        title: "れんらくん".to_string(),
        body: message.to_string(),
        tag: "renrakun-request".to_string(),
        data: PushPayloadData {
            url: "/".to_string(),
            kind: "request".to_string(),
        },
    };
    let payload_bytes = serde_json::to_vec(&payload).map_err(|error| error.to_string())?;

    let mut stale_endpoints: Vec<String> = Vec::new();
    for subscription in subscriptions {
        match send_push_message(&client, &payload_bytes, &subscription, &private_key).await {
            Ok(()) => {}
            Err(PushSendError::Expired) => {
                stale_endpoints.push(subscription.endpoint.clone());
            }
            Err(PushSendError::Other(error)) => {
                eprintln!(
                    "[push] Failed to send notification to {}: {}",
                    subscription.endpoint, error
                );
            }
        }
    }

    if !stale_endpoints.is_empty() {
        println!(
            "[push] Removing {} expired subscription(s)",
            stale_endpoints.len()
        );
        domain_push::delete_subscriptions_by_endpoints(db, &stale_endpoints)
            .await
            .map_err(|error| error.to_string())?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_serializes_as_expected() {
        let payload = PushPayload {
            title: "れんらくん".to_string(),
            body: "花子さんがティッシュを買ってほしいと言っています".to_string(),
            tag: "renrakun-request".to_string(),
            data: PushPayloadData {
                url: "/".to_string(),
                kind: "request".to_string(),
            },
        };
        let json = serde_json::to_string(&payload).expect("serialize payload");
        assert!(json.contains("\"title\":\"れんらくん\""));
        assert!(json.contains("\"tag\":\"renrakun-request\""));
        assert!(json.contains("\"kind\":\"request\""));
    }
}
