//! Sign-in, sign-out, and session status commands.

use anyhow::Result;
use vigil_core::session::{LoginOutcome, SessionStatus, SessionStore};

use super::prompt;

pub async fn login(session: &SessionStore, username: &str, password: Option<String>) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password: ")?,
    };
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    match session.login(username, &password).await? {
        LoginOutcome::Authenticated => {}
        LoginOutcome::MfaRequired => verify_code(session).await?,
        LoginOutcome::Rejected(message) => anyhow::bail!("{message}"),
    }

    let state = session.state();
    let user = state.user.map(|user| user.username).unwrap_or_default();
    let tenant = state.tenant_id.unwrap_or_default();
    println!("Signed in as {user} (tenant {tenant})");
    Ok(())
}

/// Reads one-time codes until the server accepts one. A blank line
/// abandons the challenge.
async fn verify_code(session: &SessionStore) -> Result<()> {
    loop {
        let code = prompt("Verification code: ")?;
        if code.is_empty() {
            session.logout();
            anyhow::bail!("verification cancelled");
        }

        match session.verify_mfa(&code).await? {
            LoginOutcome::Authenticated => return Ok(()),
            LoginOutcome::Rejected(message) => eprintln!("{message}"),
            LoginOutcome::MfaRequired => {}
        }
    }
}

pub fn logout(session: &SessionStore) -> Result<()> {
    let was_signed_in = session.state().status == SessionStatus::Authenticated;
    session.logout();

    if was_signed_in {
        println!("Signed out.");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}

pub fn status(session: &SessionStore) -> Result<()> {
    let state = session.state();
    if state.status == SessionStatus::Authenticated {
        let user = state.user.map(|user| user.username).unwrap_or_default();
        let tenant = state.tenant_id.unwrap_or_default();
        println!("Signed in as {user} (tenant {tenant})");
    } else {
        println!("Not signed in.");
    }
    Ok(())
}
