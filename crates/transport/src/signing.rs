// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Channel-auth HMAC signing (§4.A).
//!
//! `auth = "<app_key>:<hex-hmac-sha256>"` where the signature is
//! `HMAC-SHA256(app_secret, socket_id + ":" + channel_name)`, hex-lowercased
//! — the one cryptographic primitive this daemon owns (§1 Non-goals).

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Sign a channel-auth request, returning the full `<app_key>:<hex>` string.
pub fn sign_channel(app_key: &str, app_secret: &str, socket_id: &str, channel_name: &str) -> String {
    let message = format!("{socket_id}:{channel_name}");
    let mut mac = <HmacSha256 as Mac>::new_from_slice(app_secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(message.as_bytes());
    let digest = mac.finalize().into_bytes();
    format!("{app_key}:{}", hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_is_deterministic_and_hex_lowercase() {
        let sig1 = sign_channel("key", "secret", "123.456", "private-chief-server.dev-1");
        let sig2 = sign_channel("key", "secret", "123.456", "private-chief-server.dev-1");
        assert_eq!(sig1, sig2);
        assert!(sig1.starts_with("key:"));
        let hex_part = sig1.strip_prefix("key:").unwrap();
        assert_eq!(hex_part.len(), 64);
        assert!(hex_part.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn different_channels_yield_different_signatures() {
        let sig1 = sign_channel("key", "secret", "123.456", "private-chief-server.dev-1");
        let sig2 = sign_channel("key", "secret", "123.456", "private-chief-server.dev-2");
        assert_ne!(sig1, sig2);
    }
}
