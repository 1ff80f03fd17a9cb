//! Attendance integrity tags
//!
//! Each committed record carries an HMAC-SHA256 over its identifying fields
//! so that a later edit in storage is detectable when a lecturer reviews it.

use crate::config::AttendanceConfig;
use crate::models::AttendanceRecord;
use anyhow::Result;
use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{DateTime, Utc};
use data_encoding::HEXLOWER;
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Computes and checks record integrity tags
#[derive(Clone)]
pub struct ReceiptSigner {
    mac: HmacSha256,
}

impl std::fmt::Debug for ReceiptSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceiptSigner").finish_non_exhaustive()
    }
}

impl ReceiptSigner {
    pub fn new(secret: &[u8]) -> Result<Self> {
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| anyhow::anyhow!("Invalid receipt secret: {}", e))?;
        Ok(Self { mac })
    }

    /// Build from config. Without a configured secret a random key is used,
    /// so tags only verify within this process.
    pub fn from_config(config: &AttendanceConfig) -> Result<Self> {
        if config.receipt_secret.is_empty() {
            tracing::warn!(
                "attendance.receipt_secret is not set; using a random key, integrity tags will not survive a restart"
            );
            let mut key = [0u8; 32];
            OsRng.fill_bytes(&mut key);
            return Self::new(&key);
        }
        Self::new(config.receipt_secret.as_bytes())
    }

    /// Tag for the committed fields of a record
    pub fn tag(
        &self,
        session_id: i64,
        student_id: i64,
        timestamp: DateTime<Utc>,
        signature_url: &str,
    ) -> String {
        let mut mac = self.mac.clone();
        mac.update(&message(session_id, student_id, timestamp, signature_url));
        HEXLOWER.encode(&mac.finalize().into_bytes())
    }

    /// Whether the record's stored tag matches its fields
    pub fn verify(&self, record: &AttendanceRecord) -> bool {
        let expected = match HEXLOWER.decode(record.integrity_tag.as_bytes()) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let mut mac = self.mac.clone();
        mac.update(&message(
            record.session_id,
            record.student_id,
            record.timestamp,
            &record.signature_url,
        ));
        mac.verify_slice(&expected).is_ok()
    }
}

fn message(
    session_id: i64,
    student_id: i64,
    timestamp: DateTime<Utc>,
    signature_url: &str,
) -> Vec<u8> {
    format!(
        "{}|{}|{}|{}",
        session_id,
        student_id,
        timestamp.timestamp_millis(),
        signature_url
    )
    .into_bytes()
}
