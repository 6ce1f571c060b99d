use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

/// Validity of a committed session credential.
pub fn session_ttl() -> Duration {
    Duration::days(7)
}

/// Validity window of a pending MFA record, measured from creation.
pub fn mfa_window() -> Duration {
    Duration::minutes(10)
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MfaMethod {
    App,
    Email,
    #[default]
    None,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
    pub role: String,
    #[serde(rename = "mfaEnabled")]
    pub mfa_enabled: bool,
    #[serde(rename = "mfaType")]
    pub mfa_method: MfaMethod,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrimaryCredential {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl PrimaryCredential {
    fn live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingMfa {
    pub temp_token: String,
    pub user_id: String,
    pub method: MfaMethod,
    pub created_at: DateTime<Utc>,
}

impl PendingMfa {
    pub fn live_at(&self, now: DateTime<Utc>) -> bool {
        now < self.created_at + mfa_window()
    }
}

/// Where the visitor stands, derived from stored credentials at read time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Anonymous,
    AwaitingMfa,
    Authenticated,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredSession {
    credential: PrimaryCredential,
    profile: UserProfile,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct SessionDocument {
    #[serde(default)]
    session: Option<StoredSession>,
    #[serde(default)]
    pending: Option<PendingMfa>,
}

/// Sole owner of the session credential, the cached profile, and the pending
/// MFA record. Every mutation replaces the whole document and rewrites the
/// backing file; expiry is evaluated lazily on read, never by timers.
#[derive(Clone)]
pub struct CredentialStore {
    inner: Arc<RwLock<SessionDocument>>,
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        fs::create_dir_all(&root).ok();
        let path = root.join("session.json");
        let document = load_document(&path);
        Self {
            inner: Arc::new(RwLock::new(document)),
            path,
        }
    }

    pub fn in_memory() -> Self {
        let mut path = std::env::temp_dir();
        path.push(format!("wicket-{}", Uuid::new_v4()));
        Self::new(path)
    }

    /// Commits a full session: credential and profile land together and any
    /// pending MFA record is erased in the same write.
    pub fn set_session(&self, profile: UserProfile, token: impl Into<String>, ttl: Duration) {
        let document = SessionDocument {
            session: Some(StoredSession {
                credential: PrimaryCredential {
                    token: token.into(),
                    expires_at: Utc::now() + ttl,
                },
                profile,
            }),
            pending: None,
        };
        let mut inner = self.inner.write();
        *inner = document;
        self.persist(&inner);
    }

    /// Records a pending MFA challenge with the fixed 10-minute window,
    /// replacing any previous one. The session credential is left alone.
    pub fn set_pending_mfa(
        &self,
        temp_token: impl Into<String>,
        user_id: impl Into<String>,
        method: MfaMethod,
    ) {
        let mut inner = self.inner.write();
        inner.pending = Some(PendingMfa {
            temp_token: temp_token.into(),
            user_id: user_id.into(),
            method,
            created_at: Utc::now(),
        });
        self.persist(&inner);
    }

    pub fn clear_pending_mfa(&self) {
        let mut inner = self.inner.write();
        if inner.pending.take().is_some() {
            self.persist(&inner);
        }
    }

    pub fn clear_session(&self) {
        let mut inner = self.inner.write();
        if inner.session.take().is_some() {
            self.persist(&inner);
        }
    }

    /// Refreshes the cached profile. The profile never outlives the
    /// credential, so without a live session this is a no-op.
    pub fn update_profile(&self, profile: UserProfile) {
        let now = Utc::now();
        let mut inner = self.inner.write();
        match inner.session.as_mut() {
            Some(session) if session.credential.live_at(now) => {
                session.profile = profile;
            }
            _ => return,
        }
        self.persist(&inner);
    }

    pub fn current_state(&self) -> SessionState {
        self.state_at(Utc::now())
    }

    /// State derivation with an explicit clock, so deadline behavior can be
    /// probed without waiting. A live credential wins over a lingering
    /// pending record; expired entries read as absent.
    pub fn state_at(&self, now: DateTime<Utc>) -> SessionState {
        let inner = self.inner.read();
        if inner
            .session
            .as_ref()
            .is_some_and(|s| s.credential.live_at(now))
        {
            return SessionState::Authenticated;
        }
        if inner.pending.as_ref().is_some_and(|p| p.live_at(now)) {
            return SessionState::AwaitingMfa;
        }
        SessionState::Anonymous
    }

    /// The bearer token for outbound requests, if an unexpired one exists.
    pub fn token(&self) -> Option<String> {
        let now = Utc::now();
        let inner = self.inner.read();
        inner
            .session
            .as_ref()
            .filter(|s| s.credential.live_at(now))
            .map(|s| s.credential.token.clone())
    }

    pub fn profile(&self) -> Option<UserProfile> {
        let now = Utc::now();
        let inner = self.inner.read();
        inner
            .session
            .as_ref()
            .filter(|s| s.credential.live_at(now))
            .map(|s| s.profile.clone())
    }

    pub fn pending_mfa(&self) -> Option<PendingMfa> {
        let now = Utc::now();
        let inner = self.inner.read();
        inner.pending.as_ref().filter(|p| p.live_at(now)).cloned()
    }

    fn persist(&self, document: &SessionDocument) {
        if let Err(err) = write_document(&self.path, document) {
            tracing::warn!(%err, "failed to persist session state");
        }
    }
}

fn load_document(path: &Path) -> SessionDocument {
    let Ok(contents) = fs::read_to_string(path) else {
        return SessionDocument::default();
    };
    serde_json::from_str(&contents).unwrap_or_else(|err| {
        tracing::warn!(%err, "discarding unreadable session state");
        SessionDocument::default()
    })
}

fn write_document(path: &Path, document: &SessionDocument) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).ok();
    }
    let serialized = serde_json::to_vec_pretty(document)?;
    fs::write(path, serialized)?;
    Ok(())
}
