//! Email one-time codes used to prove ownership of an address before
//! registration or password reset.
//!
//! A code is six random digits, valid for [`OTP_LIFETIME_MINUTES`], and
//! locked after [`MAX_ATTEMPTS`] wrong guesses. Once verified, the record id
//! doubles as the `verificationToken` that registration and password reset
//! consume.

pub mod mailer;
pub mod routes;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Serialize;
use uuid::Uuid;

pub const OTP_DIGITS: usize = 6;
pub const OTP_LIFETIME_MINUTES: i64 = 10;
pub const MAX_ATTEMPTS: i32 = 5;
pub const RESEND_COOLDOWN_SECONDS: i64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtpRecord {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub code: String,
    pub verified: bool,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Outcome of checking a submitted code against a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpCheck {
    Matches,
    WrongCode,
    Expired,
    TooManyAttempts,
}

impl OtpRecord {
    pub fn issue(email: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            email: email.into(),
            code: generate_code(),
            verified: false,
            attempts: 0,
            expires_at: now + Duration::minutes(OTP_LIFETIME_MINUTES),
            created_at: now,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn in_cooldown(&self, now: DateTime<Utc>) -> bool {
        now - self.created_at < Duration::seconds(RESEND_COOLDOWN_SECONDS)
    }

    /// Compare a submitted code against this snapshot of the record. The
    /// attempt counter itself only changes in storage, see
    /// `SqlStorage::otp_record_failure`.
    pub fn check(&self, code: &str, now: DateTime<Utc>) -> OtpCheck {
        if self.is_expired(now) {
            return OtpCheck::Expired;
        }
        if self.attempts >= MAX_ATTEMPTS {
            return OtpCheck::TooManyAttempts;
        }
        if self.code == code.trim() {
            OtpCheck::Matches
        } else {
            OtpCheck::WrongCode
        }
    }

    pub fn remaining_attempts(attempts: i32) -> i32 {
        (MAX_ATTEMPTS - attempts).max(0)
    }

    /// A verified record issued for `email` authorizes one
    /// registration or password reset.
    pub fn authorizes(&self, email: &str) -> bool {
        self.verified && self.email == email
    }
}

pub fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..OTP_DIGITS)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}

/// Lowercase and trim an address, the canonical form used for lookups.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Shape check only: one `@`, non-empty local part, and a dotted domain.
pub fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}
