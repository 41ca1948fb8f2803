use crate::{
    cli::{commands::grid::SeedUser, telemetry},
    grid::{LocalGrid, RegionDescriptor},
    http::{self, health::Health, HttpServer, RestHandler, ServerConfig, ServerHandle},
    login::{LoginConfig, LoginService, LOGIN_METHOD},
    offline::{InMemoryOfflineMessages, OfflineLimits, OfflineMessagesHandler},
    profile::{InMemoryUserStore, UserStore},
};
use anyhow::{bail, Context, Result};
use secrecy::ExposeSecret;
use std::{net::IpAddr, sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub listen: IpAddr,
    pub port: u16,
    pub handler_timeout: Duration,
    pub max_body_bytes: usize,
    pub authenticate: bool,
    pub default_home_x: u32,
    pub default_home_y: u32,
    pub welcome_message: String,
    pub handoff_timeout: Duration,
    pub regions: Vec<RegionDescriptor>,
    pub users: Vec<SeedUser>,
    pub offline_limits: OfflineLimits,
}

/// A serving login node and the in-process grid behind it.
#[derive(Debug)]
pub struct Node {
    pub server: ServerHandle,
    pub grid: Arc<LocalGrid>,
}

/// Execute the server action: serve until interrupted.
/// # Errors
/// Returns an error if the node cannot be assembled or the listener fails.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let node = spawn(args).await?;

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutdown requested");

    node.server.shutdown().await?;
    telemetry::shutdown_tracer();

    Ok(())
}

/// Assemble the grid, stores and handlers, then start serving.
///
/// # Errors
/// Returns an error if seeding fails, a handler key collides, or the
/// listener cannot be bound.
pub async fn spawn(args: Args) -> Result<Node> {
    let grid = Arc::new(LocalGrid::new());
    for region in args.regions {
        grid.register_region(region)?;
    }

    let users = Arc::new(InMemoryUserStore::new());
    for user in &args.users {
        users
            .add_profile(
                &user.first,
                &user.last,
                user.password.expose_secret(),
                args.default_home_x,
                args.default_home_y,
            )
            .await
            .with_context(|| format!("failed to create user {} {}", user.first, user.last))?;
    }

    // bind first: seed capability URLs carry the real port, even for port 0
    let listener = http::bind(args.listen, args.port).await?;
    let http_port = listener.local_addr()?.port();

    let login = LoginService::new(
        LoginConfig::new(http_port)
            .with_authenticate(args.authenticate)
            .with_default_home(args.default_home_x, args.default_home_y)
            .with_welcome_message(args.welcome_message)
            .with_handoff_timeout(args.handoff_timeout),
        users,
        grid.clone(),
    );
    let offline = OfflineMessagesHandler::new(Arc::new(InMemoryOfflineMessages::new(
        args.offline_limits,
    )));

    let mut server = HttpServer::new(
        ServerConfig::new(args.port)
            .with_address(args.listen)
            .with_handler_timeout(args.handler_timeout)
            .with_max_body_bytes(args.max_body_bytes),
    );

    if !server.register_rpc_handler(LOGIN_METHOD, Arc::new(login)) {
        bail!("XML-RPC method {LOGIN_METHOD} registered twice");
    }
    let rest: [(&str, Arc<dyn RestHandler>); 2] =
        [("health", Arc::new(Health)), ("offline", Arc::new(offline))];
    for (path, handler) in rest {
        if !server.register_rest_handler(path, handler) {
            bail!("REST path {path} registered twice");
        }
    }

    let server = server.serve(listener)?;

    Ok(Node { server, grid })
}

fn log_startup_args(args: &Args) {
    let mode = if args.authenticate {
        "authenticated"
    } else {
        "sandbox"
    };
    let regions = args
        .regions
        .iter()
        .map(|r| format!("{}@{}", r.name, r.external_endpoint))
        .collect::<Vec<_>>()
        .join(", ");

    let entries = [
        ("listen", format!("{}:{}", args.listen, args.port)),
        ("mode", mode.to_string()),
        (
            "default_home",
            format!("{},{}", args.default_home_x, args.default_home_y),
        ),
        ("regions", regions),
        ("seeded_users", args.users.len().to_string()),
        ("handler_timeout", format!("{:?}", args.handler_timeout)),
        ("handoff_timeout", format!("{:?}", args.handoff_timeout)),
        ("max_body_bytes", args.max_body_bytes.to_string()),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "gridlogin {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
