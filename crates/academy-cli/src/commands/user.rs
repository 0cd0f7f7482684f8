//! Current user command handlers

use anyhow::{Context, Result};

use academy_core::{Config, CurrentUser, LocalStore};

use crate::output::Output;

/// Show the user signed in on this device
pub fn show(config: &Config, output: &Output) -> Result<()> {
    let store = LocalStore::new(config);
    output.print_user(store.load_current_user().as_ref());
    Ok(())
}

/// Sign a user in on this device
pub fn set(config: &Config, name: String, role: Option<String>, output: &Output) -> Result<()> {
    let mut user = CurrentUser::new(name);
    if let Some(role) = role {
        user = user.with_role(role);
    }

    let store = LocalStore::new(config);
    store
        .save_current_user(&user)
        .context("Failed to save current user")?;

    output.success(&format!("Signed in as {}", user.name));
    Ok(())
}

/// Sign the current user out
pub fn clear(config: &Config, output: &Output) -> Result<()> {
    let store = LocalStore::new(config);
    store
        .clear_current_user()
        .context("Failed to clear current user")?;

    output.success("Signed out");
    Ok(())
}
