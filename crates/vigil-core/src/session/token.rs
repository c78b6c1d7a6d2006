//! Bearer credential decoding and on-disk persistence.
//!
//! The credential is an opaque JWT issued by the server; the client never
//! verifies the signature, it only decodes the payload claims to learn who
//! is signed in, which tenant the session is scoped to, and when the token
//! lapses. The persisted copy lives in `<home>/token.json` with restricted
//! permissions (0600). Tokens are never logged in full.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Claims the client consumes from the credential payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenClaims {
    /// Username the credential was issued to.
    #[serde(rename = "sub")]
    pub subject: String,
    /// Tenant the session is scoped to.
    pub tenant_id: String,
    /// Expiry as seconds since the unix epoch.
    #[serde(rename = "exp")]
    pub expires_at: i64,
}

/// A bearer token together with its decoded claims.
#[derive(Debug, Clone)]
pub struct Credential {
    token: String,
    claims: TokenClaims,
}

impl Credential {
    /// Decodes the claims out of a compact JWT without verifying it.
    /// The server is the verifier; the client only needs the payload.
    ///
    /// # Errors
    /// Returns an error if the token is not a compact JWT or the payload
    /// lacks the required claims.
    pub fn decode(token: &str) -> Result<Self> {
        let mut parts = token.split('.');
        let (Some(_header), Some(payload), Some(_signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            anyhow::bail!("credential is not a compact JWT");
        };

        let decoded = URL_SAFE_NO_PAD
            .decode(payload)
            .context("credential payload is not base64url")?;
        let claims: TokenClaims =
            serde_json::from_slice(&decoded).context("credential payload is missing claims")?;

        Ok(Self {
            token: token.to_string(),
            claims,
        })
    }

    /// The opaque bearer string, exactly as issued.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn claims(&self) -> &TokenClaims {
        &self.claims
    }

    /// Returns true if the credential's expiry has passed.
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() >= self.claims.expires_at
    }

    /// Returns a masked version of the token for display.
    pub fn masked(&self) -> String {
        if self.token.len() <= 16 {
            return "***".to_string();
        }
        format!("{}...", &self.token[..12])
    }
}

/// Serialized shape of the persisted credential: one opaque string under a
/// single well-known key.
#[derive(Debug, Default, Serialize, Deserialize)]
struct TokenFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    access_token: Option<String>,
}

/// On-disk store for the persisted credential. Absence means signed out.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Loads the persisted token, if any. A missing file is `None`, not an
    /// error.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(&self) -> Result<Option<String>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read credential from {}", self.path.display()))?;
        let file: TokenFile = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse credential from {}", self.path.display()))?;

        Ok(file.access_token)
    }

    /// Saves the token to disk with restricted permissions (0600).
    ///
    /// # Errors
    /// Returns an error if the operation fails.
    pub fn save(&self, token: &str) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let contents = serde_json::to_string_pretty(&TokenFile {
            access_token: Some(token.to_string()),
        })
        .context("Failed to serialize credential")?;

        // Write with restricted permissions
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&self.path)
                .with_context(|| format!("Failed to open {} for writing", self.path.display()))?;
            file.write_all(contents.as_bytes())
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        #[cfg(not(unix))]
        {
            fs::write(&self.path, contents)
                .with_context(|| format!("Failed to write to {}", self.path.display()))?;
        }

        Ok(())
    }

    /// Removes the persisted token. Removing an absent token is fine.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be removed.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err)
                .with_context(|| format!("Failed to remove credential {}", self.path.display())),
        }
    }
}
