//! Maps validated CLI matches to the action to run.

use crate::cli::{
    actions::{server::Args, Action},
    commands::{self, grid, login, offline},
};
use anyhow::{Context, Result};
use std::{net::IpAddr, time::Duration};

/// # Errors
/// Returns an error if an argument is missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let listen = matches
        .get_one::<IpAddr>(commands::ARG_LISTEN)
        .copied()
        .context("missing required argument: --listen")?;
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(9000);
    let handler_timeout = matches
        .get_one::<u64>(commands::ARG_HANDLER_TIMEOUT)
        .copied()
        .map_or(Duration::from_secs(30), Duration::from_secs);
    let max_body_bytes = matches
        .get_one::<usize>(commands::ARG_MAX_BODY_BYTES)
        .copied()
        .unwrap_or(2 * 1024 * 1024);

    let login = login::Options::parse(matches)?;
    let grid = grid::Options::parse(matches).context("invalid region or user arguments")?;

    Ok(Action::Server(Args {
        listen,
        port,
        handler_timeout,
        max_body_bytes,
        authenticate: login.authenticate,
        default_home_x: login.default_home_x,
        default_home_y: login.default_home_y,
        welcome_message: login.welcome_message,
        handoff_timeout: login.handoff_timeout,
        regions: grid.regions,
        users: grid.users,
        offline_limits: offline::parse(matches),
    }))
}
