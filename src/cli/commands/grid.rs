use crate::grid::{RegionDescriptor, MAX_REGION_COORD};
use anyhow::{anyhow, Result};
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::net::{IpAddr, SocketAddr};

pub const ARG_REGION: &str = "region";
pub const ARG_USER: &str = "user";

/// An avatar created at startup.
#[derive(Debug)]
pub struct SeedUser {
    pub first: String,
    pub last: String,
    pub password: SecretString,
}

#[derive(Debug)]
pub struct Options {
    pub regions: Vec<RegionDescriptor>,
    pub users: Vec<SeedUser>,
}

impl Options {
    /// Parse region and user arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a `--user` value is not `first:last:password`.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let regions = matches
            .get_many::<RegionDescriptor>(ARG_REGION)
            .map(|values| values.cloned().collect())
            .unwrap_or_default();

        let users = matches
            .get_many::<String>(ARG_USER)
            .map(|values| values.map(|v| parse_user(v)).collect::<Result<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self { regions, users })
    }
}

/// `x:y:ip:port[:hostname]`
///
/// # Errors
/// Returns a message naming the malformed part.
pub fn parse_region(value: &str) -> std::result::Result<RegionDescriptor, String> {
    let parts: Vec<&str> = value.split(':').collect();
    if !(4..=5).contains(&parts.len()) {
        return Err(format!("expected x:y:ip:port[:hostname], got {value:?}"));
    }

    let loc_x = parts[0]
        .parse::<u32>()
        .map_err(|e| format!("invalid region x {:?}: {e}", parts[0]))?;
    let loc_y = parts[1]
        .parse::<u32>()
        .map_err(|e| format!("invalid region y {:?}: {e}", parts[1]))?;
    if loc_x > MAX_REGION_COORD || loc_y > MAX_REGION_COORD {
        return Err(format!(
            "region {loc_x},{loc_y} is off the grid (max coordinate {MAX_REGION_COORD})"
        ));
    }
    let ip = parts[2]
        .parse::<IpAddr>()
        .map_err(|e| format!("invalid region ip {:?}: {e}", parts[2]))?;
    let port = parts[3]
        .parse::<u16>()
        .map_err(|e| format!("invalid region port {:?}: {e}", parts[3]))?;

    let region = RegionDescriptor::new(
        format!("Region {loc_x},{loc_y}"),
        loc_x,
        loc_y,
        SocketAddr::new(ip, port),
    );

    Ok(match parts.get(4).filter(|host| !host.is_empty()) {
        Some(host) => region.with_external_host_name(*host),
        None => region,
    })
}

fn parse_user(value: &str) -> Result<SeedUser> {
    let mut parts = value.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(first), Some(last), Some(password)) if !first.is_empty() && !last.is_empty() => {
            Ok(SeedUser {
                first: first.to_string(),
                last: last.to_string(),
                password: SecretString::from(password.to_string()),
            })
        }
        _ => Err(anyhow!("invalid --user value, expected first:last:password")),
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REGION)
                .long(ARG_REGION)
                .help("Region hosted on this grid, as x:y:ip:port[:hostname] (repeatable)")
                .env("GRIDLOGIN_REGIONS")
                .action(ArgAction::Append)
                .value_delimiter(',')
                .default_value("1000:1000:127.0.0.1:9000")
                .value_parser(ValueParser::new(parse_region)),
        )
        .arg(
            Arg::new(ARG_USER)
                .long(ARG_USER)
                .help("Avatar to create at startup, as first:last:password (repeatable)")
                .env("GRIDLOGIN_USERS")
                .action(ArgAction::Append)
                .value_delimiter(','),
        )
}
