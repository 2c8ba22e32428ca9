use chrono::{Duration, Utc};
use rand::Rng;
use wager_core::model::OtpRecord;
use wager_core::{Error, Result};

use super::hashing::{hash_secret, verify_secret};
use crate::store::EphemeralStore;

const OTP_TTL_SECS: u64 = 300;
const OTP_MAX_ATTEMPTS: i32 = 5;
const OTP_RATE_LIMIT_WINDOW_SECS: u64 = 60;
const OTP_RATE_LIMIT_MAX: i64 = 3;

fn generate_code() -> String {
    let n: u32 = rand::thread_rng().gen_range(0..1_000_000);
    format!("{n:06}")
}

/// Issues a fresh OTP for `phone`, rate limited per phone number per minute.
/// Returns the plaintext code — callers are responsible for delivering it
/// (SMS gateway, sandbox echo, whatever) and must never log it.
pub async fn request_otp(ephemeral: &EphemeralStore, phone: &str, action: Option<&str>) -> Result<String> {
    let count = ephemeral
        .incr_counter(&format!("otp_rate:{phone}"), OTP_RATE_LIMIT_WINDOW_SECS)
        .await?;
    if count > OTP_RATE_LIMIT_MAX {
        return Err(Error::RateLimited {
            retry_after_secs: OTP_RATE_LIMIT_WINDOW_SECS,
        });
    }

    let code = generate_code();
    let record = OtpRecord {
        phone: phone.to_string(),
        code_hash: hash_secret(&code)?,
        expires_at: Utc::now() + Duration::seconds(OTP_TTL_SECS as i64),
        attempts: 0,
        action: action.map(str::to_string),
    };
    ephemeral.put_otp(phone, record, OTP_TTL_SECS).await?;
    Ok(code)
}

/// Verifies `code` against the outstanding OTP for `phone`. Consumes the
/// record on success; on failure, increments the attempt counter in place
/// so a client can't brute-force a six-digit code against a single OTP.
pub async fn verify_otp(ephemeral: &EphemeralStore, phone: &str, code: &str) -> Result<()> {
    let Some(mut record) = ephemeral.get_otp(phone).await? else {
        return Err(Error::OtpInvalid);
    };
    if record.expires_at <= Utc::now() {
        ephemeral.delete_otp(phone).await?;
        return Err(Error::OtpInvalid);
    }
    if record.attempts >= OTP_MAX_ATTEMPTS {
        ephemeral.delete_otp(phone).await?;
        return Err(Error::OtpInvalid);
    }
    if !verify_secret(code, &record.code_hash) {
        record.attempts += 1;
        let remaining_ttl = (record.expires_at - Utc::now()).num_seconds().max(1) as u64;
        ephemeral.put_otp(phone, record, remaining_ttl).await?;
        return Err(Error::OtpInvalid);
    }
    ephemeral.delete_otp(phone).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn correct_code_verifies_once() {
        let ephemeral = EphemeralStore::in_memory();
        let code = request_otp(&ephemeral, "+15555550100", None).await.unwrap();
        verify_otp(&ephemeral, "+15555550100", &code).await.unwrap();
        // Consumed: a second attempt with the same code now fails.
        assert!(verify_otp(&ephemeral, "+15555550100", &code).await.is_err());
    }

    #[tokio::test]
    async fn wrong_code_is_rejected_and_counted() {
        let ephemeral = EphemeralStore::in_memory();
        let _ = request_otp(&ephemeral, "+15555550101", None).await.unwrap();
        assert!(verify_otp(&ephemeral, "+15555550101", "000000").await.is_err());
    }

    #[tokio::test]
    async fn fourth_request_within_a_minute_is_rate_limited() {
        let ephemeral = EphemeralStore::in_memory();
        for _ in 0..3 {
            request_otp(&ephemeral, "+15555550102", None).await.unwrap();
        }
        let err = request_otp(&ephemeral, "+15555550102", None).await.unwrap_err();
        assert!(matches!(err, Error::RateLimited { .. }));
    }
}
