//! The `proctor login` command.

use std::path::PathBuf;

use anyhow::{Context, Result};

use proctor_core::model::Role;
use proctor_core::traits::AuthCollaborator;
use proctor_stores::{load_config_from, ProctorConfig, RosterAuth};

pub async fn execute(username: String, password: String, config_path: Option<PathBuf>) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let roster = load_roster(&config)?;

    let role = authenticate(&roster, &username, &password).await?;
    println!("Logged in as {username} ({role})");
    if role.may_take_assessment() {
        println!("Start the assessment with: proctor run --username {username} --password ...");
    } else {
        println!("Operators can review results with: proctor sessions");
    }

    Ok(())
}

/// Load the roster named in the config.
pub fn load_roster(config: &ProctorConfig) -> Result<RosterAuth> {
    let path = config
        .roster
        .as_deref()
        .context("no roster configured; set `roster = \"roster.toml\"` in proctor.toml")?;
    RosterAuth::load(path)
}

/// Verify credentials and return the user's role.
pub async fn authenticate(auth: &dyn AuthCollaborator, username: &str, password: &str) -> Result<Role> {
    match auth
        .verify(username, password)
        .await
        .context("login rejected")?
    {
        Some(role) => {
            tracing::info!(username, %role, "login succeeded");
            Ok(role)
        }
        None => anyhow::bail!("invalid credentials, please contact your administrator"),
    }
}
