pub mod api;
pub mod config;
pub mod credentials;
pub mod mfa;
pub mod notify;
pub mod routes;
pub mod session;
pub mod telemetry;

pub use api::{
    ApiChannel, ApiError, AuthBackend, HttpBackend, LoginOutcome, SessionGrant, StubBackend,
};
pub use credentials::{CredentialStore, MfaMethod, PendingMfa, SessionState, UserProfile};
pub use mfa::{CodeKind, MfaChallenge};
pub use notify::{Notice, NoticeKind, Notifier};
pub use routes::{GuardOutcome, RouteClass, RouteGuard, RouteTable};
pub use session::{LoginAdvance, SessionController};
