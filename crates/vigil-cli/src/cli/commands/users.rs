//! User directory, registration, and MFA enrollment commands.

use anyhow::Result;
use vigil_core::api::ApiClient;
use vigil_core::session::SessionStore;
use vigil_core::users::{self, RegisterRequest};

use super::prompt;

pub async fn list(session: &SessionStore, api: &ApiClient) -> Result<()> {
    super::require_session(session)?;

    let users = users::list_users(api).await?;
    if users.is_empty() {
        println!("No users.");
        return Ok(());
    }

    println!(
        "{:<6}  {:<20}  {:<28}  {:<10}  {}",
        "ID", "USERNAME", "EMAIL", "ROLE", "TENANT"
    );
    for user in users {
        let tenant = user
            .tenant_name
            .unwrap_or_else(|| user.tenant_id.to_string());
        println!(
            "{:<6}  {:<20}  {:<28}  {:<10}  {}",
            user.id,
            user.username,
            user.email.unwrap_or_default(),
            user.role,
            tenant
        );
    }
    Ok(())
}

pub async fn register(
    api: &ApiClient,
    username: String,
    password: Option<String>,
    email: Option<String>,
    role: String,
    tenant_name: String,
) -> Result<()> {
    let password = match password {
        Some(password) => password,
        None => prompt("Password: ")?,
    };
    if password.is_empty() {
        anyhow::bail!("password must not be empty");
    }

    let message = users::register(
        api,
        &RegisterRequest {
            username,
            password,
            email,
            role,
            tenant_name,
        },
    )
    .await?;
    println!("{message}");
    Ok(())
}

pub async fn enable_mfa(session: &SessionStore, api: &ApiClient) -> Result<()> {
    super::require_session(session)?;

    let enrollment = users::enable_mfa(api).await?;
    println!("{}", enrollment.message);
    println!("{}", enrollment.qr_code);
    Ok(())
}
