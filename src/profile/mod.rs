//! User profiles and the store the login handler reads them from.

mod memory;

pub use self::memory::InMemoryUserStore;

use anyhow::Result;
use async_trait::async_trait;
use rand::{distributions::Alphanumeric, Rng};
use std::time::SystemTime;
use uuid::Uuid;

const SALT_LENGTH: usize = 32;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vector3 {
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Where an agent's current session lives.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentPlacement {
    pub region_id: Uuid,
    pub region_handle: u64,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub login_time: SystemTime,
}

#[derive(Clone, Debug, PartialEq)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Lowercase hex of `md5(md5(password) + ":" + salt)`.
    pub password_hash: String,
    pub password_salt: String,
    pub home_region_handle: u64,
    pub home_location: Vector3,
    pub home_look_at: Vector3,
    pub created: SystemTime,
    pub current_agent: Option<AgentPlacement>,
}

impl UserProfile {
    /// Region the next login should land in: the current placement if any,
    /// otherwise home.
    #[must_use]
    pub fn last_region_handle(&self) -> u64 {
        self.current_agent
            .as_ref()
            .map_or(self.home_region_handle, |agent| agent.region_handle)
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Case-insensitive lookup.
    async fn profile_by_name(&self, first: &str, last: &str) -> Result<Option<UserProfile>>;

    /// Create a profile homed at region grid coordinates `(home_x, home_y)`.
    async fn add_profile(
        &self,
        first: &str,
        last: &str,
        password: &str,
        home_x: u32,
        home_y: u32,
    ) -> Result<UserProfile>;

    async fn record_placement(&self, agent_id: Uuid, placement: AgentPlacement) -> Result<()>;
}

#[must_use]
pub fn md5_hex(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Stored hash for a plain password.
#[must_use]
pub fn password_hash(password: &str, salt: &str) -> String {
    md5_hex(&format!("{}:{salt}", md5_hex(password)))
}

#[must_use]
pub fn generate_salt() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(SALT_LENGTH)
        .map(char::from)
        .collect()
}
