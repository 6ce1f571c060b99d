use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use tempfile::TempDir;
use tokio::runtime::Runtime;
use tracing::info;
use wicket_core::api::{ApiChannel, LoginOutcome, SessionGrant, StubBackend};
use wicket_core::credentials::{CredentialStore, MfaMethod, SessionState, UserProfile};
use wicket_core::mfa::CodeKind;
use wicket_core::routes::RouteGuard;
use wicket_core::session::{LoginAdvance, SessionController};
use wicket_core::telemetry;

#[derive(Parser, Debug)]
#[command(name = "xtask", version, about = "Automation helpers for Wicket")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a lightweight smoke test that exercises the session controller.
    Smoke,
}

fn main() -> Result<()> {
    telemetry::init_default()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Smoke => smoke_test(),
    }
}

fn smoke_test() -> Result<()> {
    let runtime = Runtime::new()?;
    let temp_dir = TempDir::new()?;
    let store = CredentialStore::new(temp_dir.path());
    let backend = StubBackend::new();
    let channel = ApiChannel::new(backend.clone(), store.clone());
    let controller = SessionController::new(store, channel);
    let guard = RouteGuard::default();

    backend.queue_login(Ok(LoginOutcome::MfaRequired {
        method: MfaMethod::Email,
        temp_token: "smoke-temp".into(),
        user_id: "smoke-user".into(),
    }));
    backend.queue_email_verify(Ok(SessionGrant {
        token: "smoke-token".into(),
        id: "smoke-user".into(),
        name: "Smoke Tester".into(),
        email: "smoke@example.com".into(),
        role: "admin".into(),
        mfa_enabled: true,
        mfa_method: MfaMethod::Email,
    }));

    let advance = runtime.block_on(controller.login("smoke@example.com", "pw"))?;
    let challenge = match advance {
        LoginAdvance::MfaRequired(challenge) => challenge,
        LoginAdvance::Authenticated => return Err(anyhow!("expected an MFA hand-off")),
    };
    info!(
        state = ?controller.state(),
        decision = ?guard.decide(controller.state(), "/employees"),
        "mid-challenge navigation reconciled"
    );

    runtime.block_on(challenge.submit("123456", CodeKind::Totp))?;
    if controller.state() != SessionState::Authenticated {
        return Err(anyhow!("smoke login did not authenticate"));
    }

    backend.queue_current_user(Ok(UserProfile {
        id: "smoke-user".into(),
        name: "Smoke Tester".into(),
        email: "smoke@example.com".into(),
        role: "admin".into(),
        mfa_enabled: true,
        mfa_method: MfaMethod::Email,
    }));
    let decision = runtime.block_on(controller.navigate(&guard, "/employees"));
    info!(
        state = ?controller.state(),
        ?decision,
        "smoke session committed"
    );

    controller.logout();
    info!(state = ?controller.state(), "smoke session cleared");
    Ok(())
}
