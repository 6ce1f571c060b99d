use chrono::{Duration, Utc};
use std::sync::Arc;
use wicket_core::api::{ApiChannel, ApiError, LoginOutcome, SessionGrant, StubBackend};
use wicket_core::credentials::{CredentialStore, MfaMethod, SessionState, UserProfile};
use wicket_core::routes::{GuardOutcome, RouteClass, RouteGuard, HOME_ROUTE, LOGIN_ROUTE};
use wicket_core::session::{LoginAdvance, SessionController};

fn test_runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime")
}

fn grant() -> SessionGrant {
    SessionGrant {
        token: "tok".into(),
        id: "U1".into(),
        name: "Ada Park".into(),
        email: "ada@example.com".into(),
        role: "manager".into(),
        mfa_enabled: false,
        mfa_method: MfaMethod::None,
    }
}

fn profile(name: &str) -> UserProfile {
    UserProfile {
        id: "U1".into(),
        name: name.into(),
        email: "ada@example.com".into(),
        role: "manager".into(),
        mfa_enabled: false,
        mfa_method: MfaMethod::None,
    }
}

fn controller_with_stub() -> (SessionController, Arc<StubBackend>) {
    let store = CredentialStore::in_memory();
    let backend = StubBackend::new();
    let channel = ApiChannel::new(backend.clone(), store.clone());
    (SessionController::new(store, channel), backend)
}

#[test]
fn login_with_full_grant_authenticates() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));

    let advance = runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");
    assert!(matches!(advance, LoginAdvance::Authenticated));
    assert_eq!(controller.state(), SessionState::Authenticated);
    assert_eq!(controller.store().token().as_deref(), Some("tok"));

    let guard = RouteGuard::default();
    assert_eq!(
        guard.decide(controller.state(), "/employees"),
        GuardOutcome::Allow {
            refresh_profile: true
        }
    );
}

#[test]
fn login_with_email_mfa_dispatches_one_code_and_throttles_resend() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::MfaRequired {
        method: MfaMethod::Email,
        temp_token: "T1".into(),
        user_id: "U1".into(),
    }));

    let advance = runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");
    let challenge = match advance {
        LoginAdvance::MfaRequired(challenge) => challenge,
        LoginAdvance::Authenticated => panic!("expected an MFA hand-off"),
    };

    assert_eq!(controller.state(), SessionState::AwaitingMfa);
    assert_eq!(backend.email_sends(), vec!["U1".to_string()]);

    let now = Utc::now();
    assert!(!challenge.can_resend_at(now));
    assert!(challenge.can_resend_at(now + Duration::seconds(61)));

    // Inside the cooldown the resend is a no-op, not a second dispatch.
    let resent = runtime
        .block_on(challenge.resend_email_code())
        .expect("resend");
    assert!(!resent);
    assert_eq!(backend.email_sends().len(), 1);
}

#[test]
fn anonymous_visitor_is_redirected_from_protected_routes() {
    let (controller, _backend) = controller_with_stub();
    let guard = RouteGuard::default();
    assert_eq!(
        guard.decide(controller.state(), "/payroll/reports"),
        GuardOutcome::Redirect(LOGIN_ROUTE.to_string())
    );
    assert_eq!(
        guard.decide(controller.state(), "/login"),
        GuardOutcome::Allow {
            refresh_profile: false
        }
    );
}

#[test]
fn credential_rejection_clears_state_and_requests_one_redirect() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    let redirect = controller.absorb_failure(&ApiError::CredentialRejected, RouteClass::Protected);
    assert_eq!(redirect.as_deref(), Some(LOGIN_ROUTE));
    assert_eq!(controller.state(), SessionState::Anonymous);

    // Concurrent in-flight failures may each report the same rejection; the
    // second absorption is harmless and identical.
    let again = controller.absorb_failure(&ApiError::CredentialRejected, RouteClass::Protected);
    assert_eq!(again.as_deref(), Some(LOGIN_ROUTE));
    assert_eq!(controller.state(), SessionState::Anonymous);

    let guard = RouteGuard::default();
    assert_eq!(
        guard.decide(controller.state(), "/employees"),
        GuardOutcome::Redirect(LOGIN_ROUTE.to_string())
    );
}

#[test]
fn rejection_on_public_routes_is_left_with_the_caller() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    assert!(controller
        .absorb_failure(&ApiError::CredentialRejected, RouteClass::Public)
        .is_none());
    assert!(controller
        .absorb_failure(&ApiError::CredentialRejected, RouteClass::MfaChallenge)
        .is_none());
    assert_eq!(controller.state(), SessionState::Authenticated);
}

#[test]
fn transient_failures_do_not_log_out() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    backend.queue_current_user(Err(ApiError::Transport("connection reset".into())));
    let err = runtime
        .block_on(controller.refresh_profile())
        .expect_err("transport failure");
    assert!(matches!(err, ApiError::Transport(_)));
    assert!(controller
        .absorb_failure(&err, RouteClass::Protected)
        .is_none());
    assert_eq!(controller.state(), SessionState::Authenticated);
}

#[test]
fn refresh_profile_updates_cache_and_sends_bearer() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    backend.queue_current_user(Ok(profile("Ada P. Park")));
    let refreshed = runtime
        .block_on(controller.refresh_profile())
        .expect("refresh");
    assert_eq!(refreshed.name, "Ada P. Park");
    assert_eq!(
        controller.store().profile().map(|p| p.name),
        Some("Ada P. Park".to_string())
    );
    assert_eq!(
        backend.bearers_seen().last().cloned().flatten().as_deref(),
        Some("tok")
    );
}

#[test]
fn protected_navigation_refreshes_the_profile_on_entry() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    let guard = RouteGuard::default();
    backend.queue_current_user(Ok(profile("Ada P. Park")));
    let outcome = runtime.block_on(controller.navigate(&guard, "/employees"));
    assert_eq!(
        outcome,
        GuardOutcome::Allow {
            refresh_profile: true
        }
    );
    assert_eq!(
        controller.store().profile().map(|p| p.name),
        Some("Ada P. Park".to_string())
    );
}

#[test]
fn rejection_during_profile_refresh_collapses_the_navigation() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    let guard = RouteGuard::default();
    backend.queue_current_user(Err(ApiError::CredentialRejected));
    let outcome = runtime.block_on(controller.navigate(&guard, "/employees"));
    assert_eq!(outcome, GuardOutcome::Redirect(LOGIN_ROUTE.to_string()));
    assert_eq!(controller.state(), SessionState::Anonymous);
}

#[test]
fn transient_refresh_failure_keeps_the_stale_cache() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    let guard = RouteGuard::default();
    backend.queue_current_user(Err(ApiError::Transport("timed out".into())));
    let outcome = runtime.block_on(controller.navigate(&guard, "/employees"));
    assert_eq!(
        outcome,
        GuardOutcome::Allow {
            refresh_profile: true
        }
    );
    assert_eq!(controller.state(), SessionState::Authenticated);
    assert_eq!(
        controller.store().profile().map(|p| p.name),
        Some("Ada Park".to_string())
    );
}

#[test]
fn authenticated_visitor_is_bounced_from_login_to_home() {
    let runtime = test_runtime();
    let (controller, backend) = controller_with_stub();
    backend.queue_login(Ok(LoginOutcome::Authenticated(grant())));
    runtime
        .block_on(controller.login("ada@example.com", "pw"))
        .expect("login");

    let guard = RouteGuard::default();
    assert_eq!(
        guard.decide(controller.state(), "/login"),
        GuardOutcome::Redirect(HOME_ROUTE.to_string())
    );
}
