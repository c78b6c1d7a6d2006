//! User directory and account management.

use serde::{Deserialize, Serialize};

use crate::api::{ApiClient, ApiError};

/// Directory entry for a user in the caller's tenant.
#[derive(Debug, Clone, Deserialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
    pub role: String,
    pub tenant_id: i64,
    #[serde(default)]
    pub tenant_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    users: Vec<UserRecord>,
}

/// New-account request for `POST /api/register`.
#[derive(Debug, Clone, Serialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    pub role: String,
    pub tenant_name: String,
}

#[derive(Debug, Deserialize)]
struct MessageResponse {
    message: String,
}

/// Outcome of MFA enrollment. `qr_code` is opaque display data for the
/// authenticator app.
#[derive(Debug, Clone, Deserialize)]
pub struct MfaEnrollment {
    pub message: String,
    pub qr_code: String,
}

/// Lists the users of the caller's tenant (`GET /api/users`).
///
/// # Errors
/// Returns an [`ApiError`]; the server enforces the admin requirement.
pub async fn list_users(api: &ApiClient) -> Result<Vec<UserRecord>, ApiError> {
    let response: UsersResponse = api.get_json("/api/users", &[]).await?;
    Ok(response.users)
}

/// Registers a new account (`POST /api/register`). Unauthenticated.
///
/// # Errors
/// Returns an [`ApiError`] describing the failure category.
pub async fn register(api: &ApiClient, request: &RegisterRequest) -> Result<String, ApiError> {
    let response: MessageResponse = api.post_json("/api/register", request).await?;
    Ok(response.message)
}

/// Enrolls the signed-in user into time-based one-time codes
/// (`POST /api/enable-mfa`).
///
/// # Errors
/// Returns an [`ApiError`] describing the failure category.
pub async fn enable_mfa(api: &ApiClient) -> Result<MfaEnrollment, ApiError> {
    api.post_empty("/api/enable-mfa").await
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: optional email is omitted from the registration payload.
    #[test]
    fn test_register_request_omits_absent_email() {
        let request = RegisterRequest {
            username: "bob".to_string(),
            password: "secret".to_string(),
            email: None,
            role: "user".to_string(),
            tenant_name: "acme".to_string(),
        };

        let json = serde_json::to_value(&request).unwrap();
        assert!(json.get("email").is_none());
        assert_eq!(json["tenant_name"], "acme");
    }
}
