//! Command implementations.

pub mod auth;
pub mod config;
pub mod logs;
pub mod users;

use std::io::{self, BufRead, Write};

use anyhow::{Context, Result};
use vigil_core::guard::{self, RouteDecision};
use vigil_core::session::SessionStore;

/// Refuses to run a protected command without an established session.
pub fn require_session(session: &SessionStore) -> Result<()> {
    match guard::evaluate(&session.state()) {
        RouteDecision::Render => Ok(()),
        RouteDecision::Hold | RouteDecision::RedirectToLogin => {
            anyhow::bail!("not signed in; run `vigil login` first")
        }
    }
}

/// Reads one trimmed line from stdin after printing a label.
pub fn prompt(label: &str) -> Result<String> {
    print!("{label}");
    io::stdout().flush().context("flush stdout")?;

    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("read stdin")?;
    Ok(line.trim().to_string())
}
