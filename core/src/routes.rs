use crate::credentials::SessionState;

/// Anonymous entry point.
pub const LOGIN_ROUTE: &str = "/login";
pub const REGISTER_ROUTE: &str = "/register";
/// Second-factor challenge screen.
pub const MFA_ROUTE: &str = "/login/verify";
/// Default landing page for an authenticated session.
pub const HOME_ROUTE: &str = "/dashboard";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Public,
    MfaChallenge,
    Protected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    Allow {
        /// True exactly when an authenticated visitor enters a protected
        /// route; the caller refreshes the cached profile on the way in.
        refresh_profile: bool,
    },
    Redirect(String),
}

/// Route classification. Anything not explicitly listed as public or as the
/// challenge screen is protected.
#[derive(Debug, Clone)]
pub struct RouteTable {
    public: Vec<String>,
    challenge: String,
}

impl Default for RouteTable {
    fn default() -> Self {
        Self {
            public: vec![LOGIN_ROUTE.to_string(), REGISTER_ROUTE.to_string()],
            challenge: MFA_ROUTE.to_string(),
        }
    }
}

impl RouteTable {
    pub fn classify(&self, path: &str) -> RouteClass {
        let path = normalize(path);
        if path == self.challenge {
            RouteClass::MfaChallenge
        } else if self.public.iter().any(|p| p == &path) {
            RouteClass::Public
        } else {
            RouteClass::Protected
        }
    }
}

fn normalize(path: &str) -> String {
    let path = path
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    if path.is_empty() {
        "/".to_string()
    } else {
        path.to_string()
    }
}

/// Reconciles the requested destination against the current session state on
/// every navigation, including initial load.
#[derive(Debug, Clone, Default)]
pub struct RouteGuard {
    table: RouteTable,
}

impl RouteGuard {
    pub fn new(table: RouteTable) -> Self {
        Self { table }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        self.table.classify(path)
    }

    pub fn decide(&self, state: SessionState, path: &str) -> GuardOutcome {
        match (state, self.table.classify(path)) {
            (SessionState::AwaitingMfa, RouteClass::MfaChallenge) => GuardOutcome::Allow {
                refresh_profile: false,
            },
            (SessionState::AwaitingMfa, _) => GuardOutcome::Redirect(MFA_ROUTE.to_string()),
            (SessionState::Authenticated, RouteClass::Protected) => GuardOutcome::Allow {
                refresh_profile: true,
            },
            (SessionState::Authenticated, _) => GuardOutcome::Redirect(HOME_ROUTE.to_string()),
            (SessionState::Anonymous, RouteClass::Public) => GuardOutcome::Allow {
                refresh_profile: false,
            },
            (SessionState::Anonymous, _) => GuardOutcome::Redirect(LOGIN_ROUTE.to_string()),
        }
    }
}
