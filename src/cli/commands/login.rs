use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::time::Duration;

pub const ARG_AUTHENTICATE: &str = "authenticate";
pub const ARG_DEFAULT_HOME_X: &str = "default-home-x";
pub const ARG_DEFAULT_HOME_Y: &str = "default-home-y";
pub const ARG_WELCOME_MESSAGE: &str = "welcome-message";
pub const ARG_HANDOFF_TIMEOUT: &str = "handoff-timeout";

#[derive(Debug, Clone)]
pub struct Options {
    pub authenticate: bool,
    pub default_home_x: u32,
    pub default_home_y: u32,
    pub welcome_message: String,
    pub handoff_timeout: Duration,
}

impl Options {
    /// Parse login arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow absent.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let read_u32 = |id: &str| -> Result<u32> {
            matches
                .get_one::<u32>(id)
                .copied()
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        Ok(Self {
            authenticate: matches.get_flag(ARG_AUTHENTICATE),
            default_home_x: read_u32(ARG_DEFAULT_HOME_X)?,
            default_home_y: read_u32(ARG_DEFAULT_HOME_Y)?,
            welcome_message: matches
                .get_one::<String>(ARG_WELCOME_MESSAGE)
                .cloned()
                .unwrap_or_default(),
            handoff_timeout: Duration::from_secs(
                matches
                    .get_one::<u64>(ARG_HANDOFF_TIMEOUT)
                    .copied()
                    .unwrap_or(10),
            ),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTHENTICATE)
                .long(ARG_AUTHENTICATE)
                .help("Require a known avatar and a matching password (default: sandbox mode)")
                .env("GRIDLOGIN_AUTHENTICATE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_DEFAULT_HOME_X)
                .long(ARG_DEFAULT_HOME_X)
                .help("Grid X of the home region given to avatars created in sandbox mode")
                .env("GRIDLOGIN_DEFAULT_HOME_X")
                .default_value("1000")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_DEFAULT_HOME_Y)
                .long(ARG_DEFAULT_HOME_Y)
                .help("Grid Y of the home region given to avatars created in sandbox mode")
                .env("GRIDLOGIN_DEFAULT_HOME_Y")
                .default_value("1000")
                .value_parser(clap::value_parser!(u32)),
        )
        .arg(
            Arg::new(ARG_WELCOME_MESSAGE)
                .long(ARG_WELCOME_MESSAGE)
                .help("Message shown by the viewer after a successful login")
                .env("GRIDLOGIN_WELCOME_MESSAGE")
                .default_value("Welcome to the grid"),
        )
        .arg(
            Arg::new(ARG_HANDOFF_TIMEOUT)
                .long(ARG_HANDOFF_TIMEOUT)
                .help("Seconds to wait for a region to accept a login handoff")
                .env("GRIDLOGIN_HANDOFF_TIMEOUT")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
