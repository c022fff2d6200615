use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Requests older (or further in the future) than this are rejected as replays.
pub const MAX_CLOCK_SKEW_SECS: i64 = 60 * 5;

const VERSION: &str = "v0";

/// Computes the `X-Slack-Signature` value for a request body.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> Option<String> {
    let mac = mac_for(secret, timestamp, body)?;
    Some(format!("{VERSION}={}", hex::encode(mac.finalize().into_bytes())))
}

/// Verifies a Slack request signature using constant-time comparison.
///
/// Slack signs `v0:{timestamp}:{body}` with the app's signing secret and sends
/// the result as `X-Slack-Signature: v0=<hex>`.
pub fn verify(secret: &str, timestamp: &str, body: &[u8], signature_header: &str) -> bool {
    let Some(hex_sig) = signature_header.strip_prefix("v0=") else {
        return false;
    };
    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };
    let Some(mac) = mac_for(secret, timestamp, body) else {
        return false;
    };
    mac.verify_slice(&expected).is_ok()
}

/// Whether the request timestamp is close enough to `now` (both unix seconds).
pub fn is_fresh(timestamp: &str, now: i64) -> bool {
    timestamp
        .trim()
        .parse::<i64>()
        .map(|ts| now.abs_diff(ts) <= MAX_CLOCK_SKEW_SECS.unsigned_abs())
        .unwrap_or(false)
}

fn mac_for(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(VERSION.as_bytes());
    mac.update(b":");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_signature_passes() {
        let sig = sign("test-secret", "1700000000", b"{\"type\":\"event_callback\"}").unwrap();
        assert!(sig.starts_with("v0="));
        assert!(verify(
            "test-secret",
            "1700000000",
            b"{\"type\":\"event_callback\"}",
            &sig
        ));
    }

    #[test]
    fn wrong_secret_fails() {
        let sig = sign("correct-secret", "1", b"body").unwrap();
        assert!(!verify("wrong-secret", "1", b"body", &sig));
    }

    #[test]
    fn tampered_body_or_timestamp_fails() {
        let sig = sign("secret", "1700000000", b"original").unwrap();
        assert!(!verify("secret", "1700000000", b"tampered", &sig));
        assert!(!verify("secret", "1700000001", b"original", &sig));
    }

    #[test]
    fn missing_version_prefix_fails() {
        let sig = sign("secret", "1", b"body").unwrap();
        let raw_hex = sig.strip_prefix("v0=").unwrap();
        assert!(!verify("secret", "1", b"body", raw_hex));
    }

    #[test]
    fn invalid_hex_fails() {
        assert!(!verify("secret", "1", b"body", "v0=zz-not-hex"));
    }

    #[test]
    fn freshness_window() {
        assert!(is_fresh("1000", 1000 + MAX_CLOCK_SKEW_SECS));
        assert!(!is_fresh("1000", 1001 + MAX_CLOCK_SKEW_SECS));
        assert!(is_fresh("1300", 1000));
        assert!(!is_fresh("yesterday", 1000));
    }

    #[test]
    fn extreme_timestamps_are_stale_not_fatal() {
        assert!(!is_fresh("-9223372036854775808", 1_700_000_000));
        assert!(!is_fresh("9223372036854775807", -1_700_000_000));
        assert!(!is_fresh("9223372036854775807", 1_700_000_000));
    }
}
