//! `validate`: check the state file without contacting the broker

use anyhow::Result;
use std::path::Path;

use crate::Context;
use crate::config::{Ensure, StateFile};
use crate::paths;
use crate::ui;

pub fn run(ctx: &Context, file: Option<&Path>) -> Result<()> {
    let path = paths::state_file(file)?;
    let state = StateFile::load(&path)?;

    for var in missing_password_vars(&state) {
        ui::warn(&format!("Environment variable {var} is not set"));
    }

    if !ctx.quiet {
        let absent = state
            .users
            .iter()
            .filter(|u| u.ensure == Ensure::Absent)
            .count();
        ui::success(&format!(
            "{} is valid: {} present, {} absent",
            path.display(),
            state.users.len() - absent,
            absent
        ));
    }
    Ok(())
}

/// `password_env` variables that apply would fail on
fn missing_password_vars(state: &StateFile) -> Vec<&str> {
    state
        .users
        .iter()
        .filter(|u| u.ensure == Ensure::Present)
        .filter_map(|u| u.password_env.as_deref())
        .filter(|var| std::env::var_os(var).is_none())
        .collect()
}
