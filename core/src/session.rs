use crate::api::{ApiChannel, ApiError, ApiResult, LoginOutcome};
use crate::credentials::{session_ttl, CredentialStore, SessionState, UserProfile};
use crate::mfa::MfaChallenge;
use crate::routes::{GuardOutcome, RouteClass, RouteGuard, LOGIN_ROUTE};
use chrono::{DateTime, Utc};

/// What a login attempt advanced to.
pub enum LoginAdvance {
    Authenticated,
    MfaRequired(MfaChallenge),
}

/// Owns the credential store and the request channel, and is the single
/// component that turns a typed `CredentialRejected` signal into cleared
/// state plus a navigation request. The channel itself never navigates.
#[derive(Clone)]
pub struct SessionController {
    store: CredentialStore,
    channel: ApiChannel,
}

impl SessionController {
    pub fn new(store: CredentialStore, channel: ApiChannel) -> Self {
        Self { store, channel }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn channel(&self) -> &ApiChannel {
        &self.channel
    }

    pub fn state(&self) -> SessionState {
        self.store.current_state()
    }

    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        self.store.state_at(now)
    }

    /// Submits primary credentials. A full grant commits the session; an MFA
    /// hand-off records the pending challenge and enters it (dispatching the
    /// email code when that is the reported variant).
    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginAdvance> {
        match self.channel.login(email, password).await? {
            LoginOutcome::Authenticated(grant) => {
                let (profile, token) = grant.into_parts();
                self.store.set_session(profile, token, session_ttl());
                tracing::info!("signed in without second factor");
                Ok(LoginAdvance::Authenticated)
            }
            LoginOutcome::MfaRequired {
                method,
                temp_token,
                user_id,
            } => {
                self.store.set_pending_mfa(temp_token, user_id, method);
                let challenge =
                    MfaChallenge::begin(self.channel.clone(), self.store.clone()).await?;
                Ok(LoginAdvance::MfaRequired(challenge))
            }
        }
    }

    /// Clears credential, profile and any pending challenge together.
    pub fn logout(&self) {
        self.store.clear_pending_mfa();
        self.store.clear_session();
        tracing::info!("session cleared");
    }

    /// Re-reads the profile through the channel; called after entering an
    /// authenticated route so the cache never outlives a navigation.
    pub async fn refresh_profile(&self) -> ApiResult<UserProfile> {
        let profile = self.channel.current_user().await?;
        self.store.update_profile(profile.clone());
        Ok(profile)
    }

    /// Reconciles a navigation against the current state. Entering a
    /// protected route while authenticated refreshes the cached profile on
    /// the way in; a rejection during that refresh collapses the navigation
    /// to the anonymous entry point, while a transient failure keeps the
    /// stale cache (it is a read-through cache, staleness between logins is
    /// acceptable).
    pub async fn navigate(&self, guard: &RouteGuard, path: &str) -> GuardOutcome {
        let outcome = guard.decide(self.state(), path);
        if let GuardOutcome::Allow {
            refresh_profile: true,
        } = outcome
        {
            match self.refresh_profile().await {
                Ok(_) => {}
                Err(ApiError::CredentialRejected) => {
                    self.logout();
                    return GuardOutcome::Redirect(LOGIN_ROUTE.to_string());
                }
                Err(err) => {
                    tracing::warn!(%err, "profile refresh failed; keeping cached profile");
                }
            }
        }
        outcome
    }

    /// Translation point for authorization failures observed anywhere in the
    /// channel: on a protected route the stored state is cleared and the
    /// caller is told to navigate to the anonymous entry point. On public or
    /// challenge routes (mid-login, mid-verification) nothing is cleared and
    /// the error stays with the caller to display.
    ///
    /// Safe to invoke once per concurrent in-flight failure: re-clearing is
    /// a no-op and the duplicate redirect requests are identical.
    pub fn absorb_failure(&self, error: &ApiError, at: RouteClass) -> Option<String> {
        match (error, at) {
            (ApiError::CredentialRejected, RouteClass::Protected) => {
                self.logout();
                Some(LOGIN_ROUTE.to_string())
            }
            _ => None,
        }
    }
}
