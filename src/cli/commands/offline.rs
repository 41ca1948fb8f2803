use crate::offline::OfflineLimits;
use clap::{Arg, ArgAction, ArgMatches, Command};

pub const ARG_MAX_OFFLINE_MESSAGES: &str = "max-offline-messages";
pub const ARG_MAX_GROUP_OFFLINE_MESSAGES: &str = "max-group-offline-messages";
pub const ARG_DISCARD_GROUP_OFFLINE_MESSAGES: &str = "discard-group-offline-messages";

#[must_use]
pub fn parse(matches: &ArgMatches) -> OfflineLimits {
    let defaults = OfflineLimits::default();

    OfflineLimits {
        max_messages: matches
            .get_one::<i32>(ARG_MAX_OFFLINE_MESSAGES)
            .copied()
            .unwrap_or(defaults.max_messages),
        max_group_messages: matches
            .get_one::<i32>(ARG_MAX_GROUP_OFFLINE_MESSAGES)
            .copied()
            .unwrap_or(defaults.max_group_messages),
        save_group_messages: !matches.get_flag(ARG_DISCARD_GROUP_OFFLINE_MESSAGES),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_MAX_OFFLINE_MESSAGES)
                .long(ARG_MAX_OFFLINE_MESSAGES)
                .help("Direct messages held per offline agent, 0 for unbounded")
                .env("GRIDLOGIN_MAX_OFFLINE_MESSAGES")
                .default_value("20")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new(ARG_MAX_GROUP_OFFLINE_MESSAGES)
                .long(ARG_MAX_GROUP_OFFLINE_MESSAGES)
                .help("Group messages held per offline agent, 0 for unbounded")
                .env("GRIDLOGIN_MAX_GROUP_OFFLINE_MESSAGES")
                .default_value("50")
                .allow_negative_numbers(true)
                .value_parser(clap::value_parser!(i32)),
        )
        .arg(
            Arg::new(ARG_DISCARD_GROUP_OFFLINE_MESSAGES)
                .long(ARG_DISCARD_GROUP_OFFLINE_MESSAGES)
                .help("Do not hold group chat for offline agents")
                .env("GRIDLOGIN_DISCARD_GROUP_OFFLINE_MESSAGES")
                .action(ArgAction::SetTrue),
        )
}
