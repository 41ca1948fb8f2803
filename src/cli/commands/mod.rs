pub mod grid;
pub mod logging;
pub mod login;
pub mod offline;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const ARG_LISTEN: &str = "listen";
pub const ARG_PORT: &str = "port";
pub const ARG_HANDLER_TIMEOUT: &str = "handler-timeout";
pub const ARG_MAX_BODY_BYTES: &str = "max-body-bytes";

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("gridlogin")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .arg(
            Arg::new(ARG_LISTEN)
                .long(ARG_LISTEN)
                .help("Address to listen on")
                .default_value("0.0.0.0")
                .env("GRIDLOGIN_LISTEN")
                .value_parser(clap::value_parser!(std::net::IpAddr)),
        )
        .arg(
            Arg::new(ARG_PORT)
                .short('p')
                .long(ARG_PORT)
                .help("Port to listen on, also used in seed capability URLs")
                .default_value("9000")
                .env("GRIDLOGIN_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_HANDLER_TIMEOUT)
                .long(ARG_HANDLER_TIMEOUT)
                .help("Seconds a handler may run before its request gets an empty answer")
                .default_value("30")
                .env("GRIDLOGIN_HANDLER_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_BODY_BYTES)
                .long(ARG_MAX_BODY_BYTES)
                .help("Largest request body accepted, in bytes")
                .default_value("2097152")
                .env("GRIDLOGIN_MAX_BODY_BYTES")
                .value_parser(clap::value_parser!(usize)),
        );

    let command = login::with_args(command);
    let command = grid::with_args(command);
    let command = offline::with_args(command);
    logging::with_args(command)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::{region_handle, RegionDescriptor};

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "gridlogin");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some(env!("CARGO_PKG_DESCRIPTION").to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        temp_env::with_vars_unset(
            [
                "GRIDLOGIN_PORT",
                "GRIDLOGIN_REGIONS",
                "GRIDLOGIN_AUTHENTICATE",
                "GRIDLOGIN_LOG_LEVEL",
            ],
            || {
                let matches = new().get_matches_from(vec!["gridlogin"]);

                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9000));
                assert_eq!(matches.get_one::<u64>(ARG_HANDLER_TIMEOUT).copied(), Some(30));
                assert_eq!(
                    matches.get_one::<usize>(ARG_MAX_BODY_BYTES).copied(),
                    Some(2 * 1024 * 1024)
                );
                assert!(!matches.get_flag(login::ARG_AUTHENTICATE));

                let regions: Vec<u64> = matches
                    .get_many::<RegionDescriptor>(grid::ARG_REGION)
                    .map(|values| values.map(RegionDescriptor::handle).collect())
                    .unwrap_or_default();
                assert_eq!(regions, vec![region_handle(1000, 1000)]);
                assert_eq!(matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(), Some(0));
            },
        );
    }

    #[test]
    fn test_check_args() {
        let matches = new().get_matches_from(vec![
            "gridlogin",
            "--port",
            "9100",
            "--authenticate",
            "--region",
            "1000:1000:127.0.0.1:9000",
            "--region",
            "1001:1000:127.0.0.1:9001:sim.example.org",
            "--user",
            "Ada:Lovelace:secret",
            "--max-offline-messages",
            "-1",
            "-vvv",
        ]);

        assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9100));
        assert!(matches.get_flag(login::ARG_AUTHENTICATE));
        assert_eq!(
            matches
                .get_many::<RegionDescriptor>(grid::ARG_REGION)
                .map(Iterator::count),
            Some(2)
        );
        assert_eq!(
            matches.get_one::<i32>(offline::ARG_MAX_OFFLINE_MESSAGES).copied(),
            Some(-1)
        );
        assert_eq!(matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(), Some(3));
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("GRIDLOGIN_PORT", Some("9200")),
                ("GRIDLOGIN_AUTHENTICATE", Some("true")),
                (
                    "GRIDLOGIN_REGIONS",
                    Some("1000:1000:127.0.0.1:9000,1000:1001:127.0.0.1:9001"),
                ),
                ("GRIDLOGIN_USERS", Some("Ada:Lovelace:secret,Grace:Hopper:cobol")),
                ("GRIDLOGIN_HANDOFF_TIMEOUT", Some("3")),
                ("GRIDLOGIN_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["gridlogin"]);
                assert_eq!(matches.get_one::<u16>(ARG_PORT).copied(), Some(9200));
                assert!(matches.get_flag(login::ARG_AUTHENTICATE));
                assert_eq!(
                    matches
                        .get_many::<RegionDescriptor>(grid::ARG_REGION)
                        .map(Iterator::count),
                    Some(2)
                );
                assert_eq!(
                    matches.get_many::<String>(grid::ARG_USER).map(Iterator::count),
                    Some(2)
                );
                assert_eq!(
                    matches.get_one::<u64>(login::ARG_HANDOFF_TIMEOUT).copied(),
                    Some(3)
                );
                assert_eq!(matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("GRIDLOGIN_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["gridlogin"]);
                assert_eq!(
                    matches.get_one::<u8>(logging::ARG_VERBOSITY).copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
