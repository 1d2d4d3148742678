//! STUN MESSAGE-INTEGRITY (RFC 5389 §15.4)
//!
//! HMAC-SHA1 keyed with the long-term credential key MD5(`username:realm:password`).

use super::attribute::{StunAttributeType, ATTRIBUTE_HEADER_SIZE, MESSAGE_INTEGRITY_SIZE};
use super::header::HEADER_SIZE;
use super::message::StunError;
use crate::config::StunConfig;
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::sync::OnceLock;
use tracing::{debug, error, info};

type HmacSha1 = Hmac<Sha1>;

/// RFC 2202 test case 2
const SELF_TEST_KEY: &[u8] = b"Jefe";
const SELF_TEST_DATA: &[u8] = b"what do ya want for nothing?";
const SELF_TEST_DIGEST: &str = "effcdf6ae5eb2fa2d27416d5f184df9c259a7c79";

static CRYPTO_READY: OnceLock<bool> = OnceLock::new();

/// Long-term credential used to sign and verify messages
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StunCredential {
    pub username: String,
    pub realm: String,
    pub password: String,
}

impl StunCredential {
    pub fn new(
        username: impl Into<String>,
        realm: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            username: username.into(),
            realm: realm.into(),
            password: password.into(),
        }
    }

    pub fn from_config(config: &StunConfig) -> Self {
        Self::new(&config.username, &config.realm, &config.password)
    }

    /// HMAC key: MD5 of `username:realm:password`
    pub fn key(&self) -> [u8; 16] {
        md5::compute(format!("{}:{}:{}", self.username, self.realm, self.password)).0
    }
}

/// Process-wide crypto initialisation.
///
/// Runs an HMAC-SHA1 known-answer test the first time it is called; later calls
/// return the cached outcome.
pub fn init() -> bool {
    *CRYPTO_READY.get_or_init(|| {
        let ok = compute_hmac(SELF_TEST_KEY, SELF_TEST_DATA)
            .map(|digest| hex::encode(digest) == SELF_TEST_DIGEST)
            .unwrap_or(false);
        if ok {
            info!("STUN integrity self-test passed");
        } else {
            error!("STUN integrity self-test failed");
        }
        ok
    })
}

pub fn compute_hmac(key: &[u8], data: &[u8]) -> Result<[u8; MESSAGE_INTEGRITY_SIZE], StunError> {
    let mut mac = HmacSha1::new_from_slice(key)
        .map_err(|e| StunError::Integrity(format!("invalid HMAC key: {}", e)))?;
    mac.update(data);
    let mut digest = [0u8; MESSAGE_INTEGRITY_SIZE];
    digest.copy_from_slice(&mac.finalize().into_bytes());
    Ok(digest)
}

/// Verify MESSAGE-INTEGRITY of a received message against a long-term credential
pub fn verify_message_integrity(data: &[u8], credential: &StunCredential) -> bool {
    verify_message_integrity_with_key(data, &credential.key())
}

/// Verify MESSAGE-INTEGRITY with a raw HMAC key (short-term credentials use
/// the password itself)
pub fn verify_message_integrity_with_key(data: &[u8], key: &[u8]) -> bool {
    if data.len() < HEADER_SIZE {
        return false;
    }
    let length = u16::from_be_bytes([data[2], data[3]]) as usize;
    let end = (HEADER_SIZE + length).min(data.len());

    let mut offset = HEADER_SIZE;
    while offset + ATTRIBUTE_HEADER_SIZE <= end {
        let attr_type = u16::from_be_bytes([data[offset], data[offset + 1]]);
        let attr_len = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
        let value_start = offset + ATTRIBUTE_HEADER_SIZE;

        if attr_type == StunAttributeType::MessageIntegrity as u16 {
            let value_end = value_start + MESSAGE_INTEGRITY_SIZE;
            if attr_len != MESSAGE_INTEGRITY_SIZE || value_end > end {
                return false;
            }

            // Header length as it was when the digest was computed
            let mut signed = data[..offset].to_vec();
            signed[2..4].copy_from_slice(&((value_end - HEADER_SIZE) as u16).to_be_bytes());

            return match compute_hmac(key, &signed) {
                Ok(expected) => {
                    let ok = expected[..] == data[value_start..value_end];
                    if !ok {
                        debug!("MESSAGE-INTEGRITY mismatch");
                    }
                    ok
                }
                Err(_) => false,
            };
        }

        offset = value_start + ((attr_len + 3) & !3);
    }

    debug!("No MESSAGE-INTEGRITY attribute");
    false
}
