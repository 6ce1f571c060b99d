use crate::api::{ApiChannel, ApiError, ApiResult};
use crate::credentials::{session_ttl, CredentialStore, MfaMethod};
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Shortest code accepted before a verification call goes out.
pub const MIN_CODE_LEN: usize = 6;

fn resend_cooldown() -> Duration {
    Duration::seconds(60)
}

/// Which kind of code the user entered in the authenticator-app variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeKind {
    Totp,
    Backup,
}

/// One second-factor challenge over the pending record that was active at
/// entry. The variant, temp token and user id are fixed for the challenge's
/// lifetime; if the store's pending record is replaced or cleared underneath
/// it, every subsequent action fails with `ChallengeExpired` instead of
/// committing a session the user already abandoned.
pub struct MfaChallenge {
    channel: ApiChannel,
    store: CredentialStore,
    temp_token: String,
    user_id: String,
    method: MfaMethod,
    resend_ready_at: Mutex<Option<DateTime<Utc>>>,
}

impl MfaChallenge {
    /// Enters the challenge for the store's active pending record. The email
    /// variant dispatches its one-time code here, exactly once, and arms the
    /// 60-second resend cooldown.
    pub async fn begin(channel: ApiChannel, store: CredentialStore) -> ApiResult<Self> {
        let pending = store.pending_mfa().ok_or(ApiError::ChallengeExpired)?;
        let challenge = Self {
            channel,
            store,
            temp_token: pending.temp_token,
            user_id: pending.user_id,
            method: pending.method,
            resend_ready_at: Mutex::new(None),
        };
        if challenge.method == MfaMethod::Email {
            challenge.dispatch_email_code().await?;
        }
        tracing::debug!(method = ?challenge.method, "entered MFA challenge");
        Ok(challenge)
    }

    pub fn method(&self) -> MfaMethod {
        self.method
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// Submits a user-entered code. Codes below the minimum length are
    /// rejected without a network call. A rejected code surfaces as
    /// `ChallengeInvalid` and leaves the pending record intact; the original
    /// 10-minute window still governs.
    pub async fn submit(&self, code: &str, kind: CodeKind) -> ApiResult<()> {
        let code = code.trim();
        if code.len() < MIN_CODE_LEN {
            return Err(ApiError::ChallengeInvalid(
                "Enter the full verification code.".into(),
            ));
        }
        self.ensure_active()?;

        let result = match self.method {
            MfaMethod::Email => self.channel.verify_email_login(&self.user_id, code).await,
            _ => {
                self.channel
                    .verify_mfa(
                        &self.temp_token,
                        &self.user_id,
                        code,
                        kind == CodeKind::Backup,
                    )
                    .await
            }
        };
        let grant = match result {
            Ok(grant) => grant,
            Err(ApiError::CredentialRejected) => {
                return Err(ApiError::ChallengeInvalid(
                    "That code was not accepted. Check it and try again.".into(),
                ));
            }
            Err(other) => return Err(other),
        };

        // A verification that raced a cancellation or a newer login attempt
        // must not commit; the pending record it started from is gone.
        self.ensure_active()?;
        let (profile, token) = grant.into_parts();
        self.store.set_session(profile, token, session_ttl());
        tracing::info!(user_id = %self.user_id, "second factor verified");
        Ok(())
    }

    /// Re-dispatches the email code unless the cooldown is still running.
    /// Returns `false` for the throttled no-op; throttling is not an error.
    pub async fn resend_email_code(&self) -> ApiResult<bool> {
        if self.method != MfaMethod::Email {
            return Ok(false);
        }
        if !self.can_resend_at(Utc::now()) {
            return Ok(false);
        }
        self.ensure_active()?;
        self.dispatch_email_code().await?;
        Ok(true)
    }

    pub fn can_resend_at(&self, now: DateTime<Utc>) -> bool {
        self.resend_ready_at
            .lock()
            .map_or(true, |ready| now >= ready)
    }

    pub fn resend_ready_at(&self) -> Option<DateTime<Utc>> {
        *self.resend_ready_at.lock()
    }

    /// Abandons the challenge and invalidates the pending record so it
    /// cannot be resumed.
    pub fn cancel(&self) {
        self.store.clear_pending_mfa();
        tracing::info!(user_id = %self.user_id, "MFA challenge cancelled");
    }

    async fn dispatch_email_code(&self) -> ApiResult<()> {
        self.channel.send_email_code(&self.user_id).await?;
        *self.resend_ready_at.lock() = Some(Utc::now() + resend_cooldown());
        Ok(())
    }

    fn ensure_active(&self) -> ApiResult<()> {
        match self.store.pending_mfa() {
            Some(pending) if pending.temp_token == self.temp_token => Ok(()),
            _ => Err(ApiError::ChallengeExpired),
        }
    }
}
