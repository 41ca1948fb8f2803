//! Login handler for `login_to_simulator`.
//!
//! Flow Overview:
//! 1) Read `first`, `last`, `passwd` from the call and take the identity's lock.
//! 2) Resolve the profile; in sandbox mode unknown avatars are created.
//! 3) Authenticate against the stored salted hash (sandbox accepts anything).
//! 4) Resolve the destination region from the last placement or home.
//! 5) Issue session identifiers and a capability path, build the response.
//! 6) Push the handoff notice to the region, bounded by a timeout.
//! 7) Record the new placement on the profile.
//!
//! Any failure before step 7 answers with a `login: "false"` struct and the
//! region never hears about the attempt.

mod credential;
mod error;
mod locks;
mod response;

pub use self::{
    credential::LoginCredential,
    error::LoginError,
    locks::IdentityLocks,
    response::{home_descriptor, random_caps_path, LoginResponse, Session},
};

use crate::{
    grid::{GridCommunications, HandoffNotice, RegionDescriptor},
    http::{HandlerError, RpcHandler},
    profile::{AgentPlacement, UserProfile, UserStore},
    xmlrpc::{MethodCall, MethodResponse},
};
use async_trait::async_trait;
use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};
use tokio::time::timeout;
use tracing::{error, info, instrument, warn};

pub const LOGIN_METHOD: &str = "login_to_simulator";

/// Credential given to avatars created on the fly in sandbox mode.
const SANDBOX_PASSWORD: &str = "test";
const DEFAULT_HOME: u32 = 1000;
const DEFAULT_HANDOFF_TIMEOUT_SECONDS: u64 = 10;
const DEFAULT_WELCOME_MESSAGE: &str = "Welcome to the grid";

#[derive(Clone, Debug)]
pub struct LoginConfig {
    authenticate: bool,
    default_home_x: u32,
    default_home_y: u32,
    http_listener_port: u16,
    welcome_message: String,
    handoff_timeout: Duration,
}

impl LoginConfig {
    /// Sandbox mode, homed at (1000, 1000).
    #[must_use]
    pub fn new(http_listener_port: u16) -> Self {
        Self {
            authenticate: false,
            default_home_x: DEFAULT_HOME,
            default_home_y: DEFAULT_HOME,
            http_listener_port,
            welcome_message: DEFAULT_WELCOME_MESSAGE.to_string(),
            handoff_timeout: Duration::from_secs(DEFAULT_HANDOFF_TIMEOUT_SECONDS),
        }
    }

    #[must_use]
    pub fn with_authenticate(mut self, authenticate: bool) -> Self {
        self.authenticate = authenticate;
        self
    }

    #[must_use]
    pub fn with_default_home(mut self, x: u32, y: u32) -> Self {
        self.default_home_x = x;
        self.default_home_y = y;
        self
    }

    #[must_use]
    pub fn with_welcome_message(mut self, message: impl Into<String>) -> Self {
        self.welcome_message = message.into();
        self
    }

    #[must_use]
    pub fn with_handoff_timeout(mut self, handoff_timeout: Duration) -> Self {
        self.handoff_timeout = handoff_timeout;
        self
    }

    #[must_use]
    pub fn authenticate(&self) -> bool {
        self.authenticate
    }
}

pub struct LoginService {
    config: LoginConfig,
    users: Arc<dyn UserStore>,
    grid: Arc<dyn GridCommunications>,
    locks: IdentityLocks,
}

impl LoginService {
    #[must_use]
    pub fn new(
        config: LoginConfig,
        users: Arc<dyn UserStore>,
        grid: Arc<dyn GridCommunications>,
    ) -> Self {
        Self {
            config,
            users,
            grid,
            locks: IdentityLocks::new(),
        }
    }

    /// Run one login attempt. Never fails: terminal outcomes become the
    /// failure struct.
    pub async fn login(&self, call: &MethodCall) -> MethodResponse {
        match self.try_login(call).await {
            Ok(response) => MethodResponse::new(response.into_value()),
            Err(err) => {
                match &err {
                    LoginError::Internal(e) => error!("Login failed: {:#}", e),
                    other => warn!("Login refused: {}", other),
                }
                MethodResponse::new(err.to_value())
            }
        }
    }

    /// # Errors
    ///
    /// Returns the [`LoginError`] that ended the attempt.
    pub async fn try_login(&self, call: &MethodCall) -> Result<LoginResponse, LoginError> {
        let credential = LoginCredential::from_call(call)?;
        let _guard = self.locks.lock(&credential.identity()).await;

        let profile = self.resolve_profile(&credential).await?;
        self.authenticate(&profile, &credential)?;

        let region_handle = profile.last_region_handle();
        let region = self.resolve_region(region_handle).await?;

        let session = Session::issue();
        let notice = session.handoff_notice(&profile);
        let response = LoginResponse::new(
            &profile,
            &region,
            session,
            &self.config.welcome_message,
            self.config.http_listener_port,
        );

        self.notify(region.handle(), notice).await?;

        let placement = AgentPlacement {
            region_id: region.region_id,
            region_handle: region.handle(),
            session_id: response.session.session_id,
            secure_session_id: response.session.secure_session_id,
            login_time: SystemTime::now(),
        };
        self.users.record_placement(profile.id, placement).await?;

        info!(
            agent_id = %profile.id,
            region = %region.name,
            circuit_code = response.session.circuit_code,
            "{} {} logged in",
            profile.first_name,
            profile.last_name
        );

        Ok(response)
    }

    #[instrument(skip_all, fields(first = %credential.first, last = %credential.last))]
    async fn resolve_profile(&self, credential: &LoginCredential) -> Result<UserProfile, LoginError> {
        if let Some(profile) = self
            .users
            .profile_by_name(&credential.first, &credential.last)
            .await?
        {
            return Ok(profile);
        }

        if self.config.authenticate {
            return Err(LoginError::NoSuchUser);
        }

        info!("No profile found, creating one");
        self.users
            .add_profile(
                &credential.first,
                &credential.last,
                SANDBOX_PASSWORD,
                self.config.default_home_x,
                self.config.default_home_y,
            )
            .await?;

        self.users
            .profile_by_name(&credential.first, &credential.last)
            .await?
            .ok_or(LoginError::NoSuchUser)
    }

    fn authenticate(&self, profile: &UserProfile, credential: &LoginCredential) -> Result<(), LoginError> {
        if !self.config.authenticate {
            info!(agent_id = %profile.id, "Sandbox mode, accepting any password");
            return Ok(());
        }

        if credential.verify(profile) {
            Ok(())
        } else {
            Err(LoginError::BadPassword)
        }
    }

    async fn resolve_region(&self, region_handle: u64) -> Result<RegionDescriptor, LoginError> {
        self.grid
            .request_neighbour_info(region_handle)
            .await?
            .ok_or(LoginError::RegionNotFound(region_handle))
    }

    async fn notify(&self, region_handle: u64, notice: HandoffNotice) -> Result<(), LoginError> {
        let handoff_timeout = self.config.handoff_timeout;

        match timeout(
            handoff_timeout,
            self.grid.inform_region_of_login(region_handle, notice),
        )
        .await
        {
            Ok(Ok(())) => Ok(()),
            Ok(Err(source)) => Err(LoginError::HandoffFailed {
                region_handle,
                source,
            }),
            Err(_) => Err(LoginError::HandoffTimeout {
                region_handle,
                timeout: handoff_timeout,
            }),
        }
    }
}

#[async_trait]
impl RpcHandler for LoginService {
    async fn handle_rpc(&self, call: MethodCall) -> Result<MethodResponse, HandlerError> {
        Ok(self.login(&call).await)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        grid::{region_handle, LocalGrid, RegionCircuits},
        profile::{md5_hex, InMemoryUserStore},
        xmlrpc::Value,
    };
    use anyhow::{anyhow, Result};
    use std::{
        collections::BTreeMap,
        sync::atomic::{AtomicUsize, Ordering},
    };

    struct Fixture {
        service: Arc<LoginService>,
        users: Arc<InMemoryUserStore>,
        circuits: Arc<RegionCircuits>,
    }

    fn fixture(config: LoginConfig) -> Fixture {
        let grid = Arc::new(LocalGrid::new());
        let circuits = grid
            .register_region(RegionDescriptor::new(
                "Sandbox",
                1000,
                1000,
                "127.0.0.1:9000".parse().unwrap(),
            ))
            .unwrap();
        let users = Arc::new(InMemoryUserStore::new());
        let service = Arc::new(LoginService::new(config, users.clone(), grid));

        Fixture {
            service,
            users,
            circuits,
        }
    }

    fn login_call(first: &str, last: &str, plain_password: &str) -> MethodCall {
        let mut members = BTreeMap::new();
        members.insert("first".to_string(), Value::from(first));
        members.insert("last".to_string(), Value::from(last));
        members.insert(
            "passwd".to_string(),
            Value::from(format!("$1${}", md5_hex(plain_password))),
        );
        MethodCall {
            method_name: LOGIN_METHOD.to_string(),
            params: vec![Value::from(members)],
        }
    }

    fn member(response: &MethodResponse, name: &str) -> Option<String> {
        response.value.get(name).and_then(Value::as_str).map(ToOwned::to_owned)
    }

    /// Grid that knows one region but never accepts a handoff.
    struct UnreachableRegion {
        delay: Option<Duration>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl GridCommunications for UnreachableRegion {
        async fn request_neighbour_info(&self, handle: u64) -> Result<Option<RegionDescriptor>> {
            Ok(Some(RegionDescriptor::new(
                "Far",
                1000,
                1000,
                "127.0.0.1:9000".parse()?,
            ))
            .filter(|region| region.handle() == handle))
        }

        async fn inform_region_of_login(&self, _handle: u64, _notice: HandoffNotice) -> Result<()> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            match self.delay {
                Some(delay) => {
                    tokio::time::sleep(delay).await;
                    Ok(())
                }
                None => Err(anyhow!("connection refused")),
            }
        }
    }

    #[tokio::test]
    async fn sandbox_creates_unknown_avatar() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000));

        let response = fx.service.login(&login_call("Ada", "Lovelace", "anything")).await;
        assert_eq!(member(&response, "login").as_deref(), Some("true"));

        let profile = fx.users.profile_by_name("Ada", "Lovelace").await?.unwrap();
        // placeholder credential
        assert!(LoginCredential::new(
            "Ada",
            "Lovelace",
            format!("$1${}", md5_hex("test")).into()
        )
        .verify(&profile));
        assert_eq!(profile.home_region_handle, region_handle(1000, 1000));
        assert_eq!(fx.circuits.expected_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn sandbox_reuses_existing_profile() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000));
        fx.service.login(&login_call("Ada", "Lovelace", "x")).await;
        fx.service.login(&login_call("ada", "lovelace", "y")).await;

        assert_eq!(fx.users.len(), 1);
        assert_eq!(fx.circuits.expected_count(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn authenticated_login_succeeds_with_correct_password() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000).with_authenticate(true));
        let created = fx
            .users
            .add_profile("Ada", "Lovelace", "secret", 1000, 1000)
            .await?;

        let response = fx.service.try_login(&login_call("Ada", "Lovelace", "secret")).await?;
        assert_eq!(response.agent_id, created.id);

        let notice = fx.circuits.authenticate_circuit(
            created.id,
            response.session.session_id,
            response.session.circuit_code,
        );
        let notice = notice.ok_or_else(|| anyhow!("region did not get the handoff"))?;
        assert_eq!(notice.caps_path, response.session.caps_path);
        assert_eq!(notice.secure_session_id, response.session.secure_session_id);
        assert!(response
            .seed_capability
            .starts_with("http://127.0.0.1:9000/CAPS/"));
        assert!(response
            .seed_capability
            .ends_with(&format!("/CAPS/{}0000/", notice.caps_path)));

        let placed = fx.users.profile_by_name("Ada", "Lovelace").await?.unwrap();
        let placement = placed.current_agent.unwrap();
        assert_eq!(placement.session_id, response.session.session_id);
        assert_eq!(placement.region_handle, region_handle(1000, 1000));
        Ok(())
    }

    #[tokio::test]
    async fn wrong_password_sends_no_notice() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000).with_authenticate(true));
        fx.users
            .add_profile("Ada", "Lovelace", "secret", 1000, 1000)
            .await?;

        let response = fx.service.login(&login_call("Ada", "Lovelace", "guess")).await;
        assert_eq!(member(&response, "login").as_deref(), Some("false"));
        assert_eq!(
            member(&response, "message").as_deref(),
            Some(LoginError::BadPassword.message())
        );
        assert_eq!(fx.circuits.expected_count(), 0);

        let profile = fx.users.profile_by_name("Ada", "Lovelace").await?.unwrap();
        assert!(profile.current_agent.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn authenticated_mode_does_not_create_profiles() {
        let fx = fixture(LoginConfig::new(9000).with_authenticate(true));

        let result = fx.service.try_login(&login_call("Nobody", "Here", "x")).await;
        assert!(matches!(result, Err(LoginError::NoSuchUser)));
        assert!(fx.users.is_empty());
        assert_eq!(fx.circuits.expected_count(), 0);
    }

    #[tokio::test]
    async fn missing_region_is_a_failure() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000).with_default_home(2000, 2000));

        let result = fx.service.try_login(&login_call("Ada", "Lovelace", "x")).await;
        assert!(matches!(result, Err(LoginError::RegionNotFound(handle)) if handle == region_handle(2000, 2000)));
        assert_eq!(fx.circuits.expected_count(), 0);

        let profile = fx.users.profile_by_name("Ada", "Lovelace").await?.unwrap();
        assert!(profile.current_agent.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn malformed_request_is_invalid() {
        let fx = fixture(LoginConfig::new(9000));
        let call = MethodCall {
            method_name: LOGIN_METHOD.to_string(),
            params: vec![Value::from("not a struct")],
        };

        let response = fx.service.login(&call).await;
        assert_eq!(
            member(&response, "message").as_deref(),
            Some(LoginError::InvalidRequest.message())
        );
    }

    #[tokio::test]
    async fn refused_handoff_fails_the_login() -> Result<()> {
        let grid = Arc::new(UnreachableRegion {
            delay: None,
            attempts: AtomicUsize::new(0),
        });
        let users = Arc::new(InMemoryUserStore::new());
        let service = LoginService::new(LoginConfig::new(9000), users.clone(), grid.clone());

        let result = service.try_login(&login_call("Ada", "Lovelace", "x")).await;
        assert!(matches!(result, Err(LoginError::HandoffFailed { .. })));
        assert_eq!(grid.attempts.load(Ordering::SeqCst), 1);

        let profile = users.profile_by_name("Ada", "Lovelace").await?.unwrap();
        assert!(profile.current_agent.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn slow_handoff_times_out() {
        let grid = Arc::new(UnreachableRegion {
            delay: Some(Duration::from_secs(5)),
            attempts: AtomicUsize::new(0),
        });
        let service = LoginService::new(
            LoginConfig::new(9000).with_handoff_timeout(Duration::from_millis(50)),
            Arc::new(InMemoryUserStore::new()),
            grid,
        );

        let result = service.try_login(&login_call("Ada", "Lovelace", "x")).await;
        assert!(matches!(result, Err(LoginError::HandoffTimeout { .. })));
    }

    #[tokio::test]
    async fn concurrent_logins_for_one_identity_create_one_profile() -> Result<()> {
        let fx = fixture(LoginConfig::new(9000));

        let attempts: Vec<_> = (0..8)
            .map(|_| {
                let service = Arc::clone(&fx.service);
                tokio::spawn(async move { service.login(&login_call("Ada", "Lovelace", "x")).await })
            })
            .collect();

        for attempt in attempts {
            let response = attempt.await?;
            assert_eq!(member(&response, "login").as_deref(), Some("true"));
        }

        assert_eq!(fx.users.len(), 1);
        assert_eq!(fx.circuits.expected_count(), 8);
        Ok(())
    }
}
