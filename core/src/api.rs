use crate::config::RuntimeConfig;
use crate::credentials::{CredentialStore, MfaMethod, UserProfile};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;

/// Errors surfaced by the remote authentication service, already sorted into
/// the kinds the rest of the controller cares about. The channel never acts
/// on a rejection itself; it hands the typed signal up to the session
/// controller, which owns navigation.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("the server rejected the session credential")]
    CredentialRejected,
    #[error("verification failed: {0}")]
    ChallengeInvalid(String),
    #[error("the sign-in challenge has expired")]
    ChallengeExpired,
    #[error("request failed: {0}")]
    Transport(String),
    #[error("unexpected response from the server: {0}")]
    Unexpected(String),
}

impl ApiError {
    pub fn user_message(&self) -> String {
        match self {
            Self::CredentialRejected => "Your session has ended. Please sign in again.".to_string(),
            Self::ChallengeInvalid(detail) => detail.clone(),
            Self::ChallengeExpired => {
                "The sign-in challenge expired. Please sign in again.".to_string()
            }
            Self::Transport(_) => "Could not reach the server. Please try again.".to_string(),
            Self::Unexpected(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Full session grant returned by a successful login or MFA verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionGrant {
    pub token: String,
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "mfaEnabled", default)]
    pub mfa_enabled: bool,
    #[serde(rename = "mfaType", default)]
    pub mfa_method: MfaMethod,
}

impl SessionGrant {
    pub fn into_parts(self) -> (UserProfile, String) {
        let profile = UserProfile {
            id: self.id,
            name: self.name,
            email: self.email,
            role: self.role,
            mfa_enabled: self.mfa_enabled,
            mfa_method: self.mfa_method,
        };
        (profile, self.token)
    }
}

#[derive(Debug, Clone)]
pub enum LoginOutcome {
    Authenticated(SessionGrant),
    MfaRequired {
        method: MfaMethod,
        temp_token: String,
        user_id: String,
    },
}

/// Remote authentication contract. Every call carries the bearer credential
/// the channel resolved for it, or `None` when no unexpired credential
/// exists (login and MFA endpoints must work unannotated).
#[async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(
        &self,
        auth: Option<&str>,
        email: &str,
        password: &str,
    ) -> ApiResult<LoginOutcome>;

    async fn verify_mfa(
        &self,
        auth: Option<&str>,
        temp_token: &str,
        user_id: &str,
        code: &str,
        use_backup_code: bool,
    ) -> ApiResult<SessionGrant>;

    async fn send_email_code(&self, auth: Option<&str>, user_id: &str) -> ApiResult<()>;

    async fn verify_email_login(
        &self,
        auth: Option<&str>,
        user_id: &str,
        code: &str,
    ) -> ApiResult<SessionGrant>;

    async fn current_user(&self, auth: Option<&str>) -> ApiResult<UserProfile>;
}

/// Annotates every outbound request with the current credential and exposes
/// the remote contract as typed calls. Rejections come back as
/// `ApiError::CredentialRejected`; nothing here touches stored state.
#[derive(Clone)]
pub struct ApiChannel {
    backend: Arc<dyn AuthBackend>,
    store: CredentialStore,
}

impl ApiChannel {
    pub fn new(backend: Arc<dyn AuthBackend>, store: CredentialStore) -> Self {
        Self { backend, store }
    }

    pub fn http(config: &RuntimeConfig, store: CredentialStore) -> ApiResult<Self> {
        Ok(Self::new(Arc::new(HttpBackend::new(config)?), store))
    }

    fn bearer(&self) -> Option<String> {
        self.store.token()
    }

    pub async fn login(&self, email: &str, password: &str) -> ApiResult<LoginOutcome> {
        let auth = self.bearer();
        self.backend.login(auth.as_deref(), email, password).await
    }

    pub async fn verify_mfa(
        &self,
        temp_token: &str,
        user_id: &str,
        code: &str,
        use_backup_code: bool,
    ) -> ApiResult<SessionGrant> {
        let auth = self.bearer();
        self.backend
            .verify_mfa(auth.as_deref(), temp_token, user_id, code, use_backup_code)
            .await
    }

    pub async fn send_email_code(&self, user_id: &str) -> ApiResult<()> {
        let auth = self.bearer();
        self.backend.send_email_code(auth.as_deref(), user_id).await
    }

    pub async fn verify_email_login(&self, user_id: &str, code: &str) -> ApiResult<SessionGrant> {
        let auth = self.bearer();
        self.backend
            .verify_email_login(auth.as_deref(), user_id, code)
            .await
    }

    pub async fn current_user(&self) -> ApiResult<UserProfile> {
        let auth = self.bearer();
        self.backend.current_user(auth.as_deref()).await
    }
}

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyMfaRequest<'a> {
    #[serde(rename = "tempToken")]
    temp_token: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
    code: &'a str,
    #[serde(rename = "useBackupCode")]
    use_backup_code: bool,
}

#[derive(Debug, Serialize)]
struct EmailCodeRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Debug, Serialize)]
struct VerifyEmailLoginRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    code: &'a str,
}

/// Raw login response: either an MFA hand-off or a full grant.
#[derive(Debug, Deserialize)]
struct RawLoginResponse {
    #[serde(rename = "requireMFA", default)]
    require_mfa: bool,
    #[serde(rename = "mfaType")]
    mfa_type: Option<MfaMethod>,
    #[serde(rename = "tempToken")]
    temp_token: Option<String>,
    #[serde(rename = "userId")]
    user_id: Option<String>,
    token: Option<String>,
    id: Option<String>,
    name: Option<String>,
    email: Option<String>,
    role: Option<String>,
    #[serde(rename = "mfaEnabled", default)]
    mfa_enabled: bool,
}

impl TryFrom<RawLoginResponse> for LoginOutcome {
    type Error = ApiError;

    fn try_from(raw: RawLoginResponse) -> ApiResult<Self> {
        if raw.require_mfa {
            let method = raw
                .mfa_type
                .ok_or_else(|| ApiError::Unexpected("login response missing mfaType".into()))?;
            let temp_token = raw
                .temp_token
                .ok_or_else(|| ApiError::Unexpected("login response missing tempToken".into()))?;
            let user_id = raw
                .user_id
                .ok_or_else(|| ApiError::Unexpected("login response missing userId".into()))?;
            return Ok(LoginOutcome::MfaRequired {
                method,
                temp_token,
                user_id,
            });
        }
        match (raw.token, raw.id, raw.name, raw.email, raw.role) {
            (Some(token), Some(id), Some(name), Some(email), Some(role)) => {
                Ok(LoginOutcome::Authenticated(SessionGrant {
                    token,
                    id,
                    name,
                    email,
                    role,
                    mfa_enabled: raw.mfa_enabled,
                    mfa_method: raw.mfa_type.unwrap_or(MfaMethod::None),
                }))
            }
            _ => Err(ApiError::Unexpected(
                "login response carried neither a grant nor an MFA hand-off".into(),
            )),
        }
    }
}

/// reqwest-backed implementation of the remote contract.
pub struct HttpBackend {
    http: reqwest::Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &RuntimeConfig) -> ApiResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(transport)?;
        Ok(Self {
            http,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> ApiResult<reqwest::Response> {
        let response = request.send().await.map_err(transport)?;
        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(ApiError::CredentialRejected);
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Unexpected(format!("{status}: {body}")));
        }
        Ok(response)
    }

    async fn post_json<B, T>(&self, path: &str, auth: Option<&str>, body: &B) -> ApiResult<T>
    where
        B: Serialize + Sync,
        T: serde::de::DeserializeOwned,
    {
        let mut request = self.http.post(self.url(path)).json(body);
        if let Some(token) = auth {
            request = request.bearer_auth(token);
        }
        let response = self.execute(request).await?;
        response.json().await.map_err(transport)
    }

    async fn get_json<T>(&self, path: &str, auth: Option<&str>) -> ApiResult<T>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut request = self.http.get(self.url(path));
        if let Some(token) = auth {
            request = request.bearer_auth(token);
        }
        let response = self.execute(request).await?;
        response.json().await.map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> ApiError {
    ApiError::Transport(err.to_string())
}

#[async_trait]
impl AuthBackend for HttpBackend {
    async fn login(
        &self,
        auth: Option<&str>,
        email: &str,
        password: &str,
    ) -> ApiResult<LoginOutcome> {
        let raw: RawLoginResponse = self
            .post_json("/auth/login", auth, &LoginRequest { email, password })
            .await?;
        raw.try_into()
    }

    async fn verify_mfa(
        &self,
        auth: Option<&str>,
        temp_token: &str,
        user_id: &str,
        code: &str,
        use_backup_code: bool,
    ) -> ApiResult<SessionGrant> {
        self.post_json(
            "/auth/mfa/verify",
            auth,
            &VerifyMfaRequest {
                temp_token,
                user_id,
                code,
                use_backup_code,
            },
        )
        .await
    }

    async fn send_email_code(&self, auth: Option<&str>, user_id: &str) -> ApiResult<()> {
        let request = self
            .http
            .post(self.url("/auth/mfa/email/send"))
            .json(&EmailCodeRequest { user_id });
        let request = match auth {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        self.execute(request).await?;
        Ok(())
    }

    async fn verify_email_login(
        &self,
        auth: Option<&str>,
        user_id: &str,
        code: &str,
    ) -> ApiResult<SessionGrant> {
        self.post_json(
            "/auth/mfa/email/verify",
            auth,
            &VerifyEmailLoginRequest { user_id, code },
        )
        .await
    }

    async fn current_user(&self, auth: Option<&str>) -> ApiResult<UserProfile> {
        self.get_json("/auth/me", auth).await
    }
}

/// In-process backend with scripted responses. Lives in the crate, like any
/// other backend, so the test crate and the xtask smoke run can drive the
/// whole controller without a server.
#[derive(Default)]
pub struct StubBackend {
    state: Mutex<StubState>,
}

#[derive(Default)]
struct StubState {
    login: VecDeque<ApiResult<LoginOutcome>>,
    verify: VecDeque<ApiResult<SessionGrant>>,
    email_verify: VecDeque<ApiResult<SessionGrant>>,
    current_user: VecDeque<ApiResult<UserProfile>>,
    email_sends: Vec<String>,
    verify_calls: usize,
    backup_flags_seen: Vec<bool>,
    bearers_seen: Vec<Option<String>>,
}

impl StubBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queue_login(&self, outcome: ApiResult<LoginOutcome>) {
        self.state.lock().login.push_back(outcome);
    }

    pub fn queue_verify(&self, outcome: ApiResult<SessionGrant>) {
        self.state.lock().verify.push_back(outcome);
    }

    pub fn queue_email_verify(&self, outcome: ApiResult<SessionGrant>) {
        self.state.lock().email_verify.push_back(outcome);
    }

    pub fn queue_current_user(&self, outcome: ApiResult<UserProfile>) {
        self.state.lock().current_user.push_back(outcome);
    }

    /// User ids the backend dispatched an email code for, in order.
    pub fn email_sends(&self) -> Vec<String> {
        self.state.lock().email_sends.clone()
    }

    /// Verification calls that actually reached the backend.
    pub fn verify_calls(&self) -> usize {
        self.state.lock().verify_calls
    }

    /// The `useBackupCode` flag observed on each app-variant verification.
    pub fn backup_flags_seen(&self) -> Vec<bool> {
        self.state.lock().backup_flags_seen.clone()
    }

    /// Bearer credentials observed on each call, in order.
    pub fn bearers_seen(&self) -> Vec<Option<String>> {
        self.state.lock().bearers_seen.clone()
    }

    fn record_bearer(&self, auth: Option<&str>) {
        self.state
            .lock()
            .bearers_seen
            .push(auth.map(str::to_string));
    }
}

fn unscripted<T>() -> ApiResult<T> {
    Err(ApiError::Unexpected("no scripted response queued".into()))
}

#[async_trait]
impl AuthBackend for StubBackend {
    async fn login(
        &self,
        auth: Option<&str>,
        _email: &str,
        _password: &str,
    ) -> ApiResult<LoginOutcome> {
        self.record_bearer(auth);
        self.state
            .lock()
            .login
            .pop_front()
            .unwrap_or_else(unscripted)
    }

    async fn verify_mfa(
        &self,
        auth: Option<&str>,
        _temp_token: &str,
        _user_id: &str,
        _code: &str,
        use_backup_code: bool,
    ) -> ApiResult<SessionGrant> {
        self.record_bearer(auth);
        let mut state = self.state.lock();
        state.verify_calls += 1;
        state.backup_flags_seen.push(use_backup_code);
        state.verify.pop_front().unwrap_or_else(unscripted)
    }

    async fn send_email_code(&self, auth: Option<&str>, user_id: &str) -> ApiResult<()> {
        self.record_bearer(auth);
        self.state.lock().email_sends.push(user_id.to_string());
        Ok(())
    }

    async fn verify_email_login(
        &self,
        auth: Option<&str>,
        _user_id: &str,
        _code: &str,
    ) -> ApiResult<SessionGrant> {
        self.record_bearer(auth);
        let mut state = self.state.lock();
        state.verify_calls += 1;
        state.email_verify.pop_front().unwrap_or_else(unscripted)
    }

    async fn current_user(&self, auth: Option<&str>) -> ApiResult<UserProfile> {
        self.record_bearer(auth);
        if auth.is_none() {
            return Err(ApiError::CredentialRejected);
        }
        self.state
            .lock()
            .current_user
            .pop_front()
            .unwrap_or_else(unscripted)
    }
}
