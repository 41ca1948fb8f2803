use super::{generate_salt, password_hash, AgentPlacement, UserProfile, UserStore, Vector3};
use crate::grid::region_handle;
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::{collections::HashMap, sync::RwLock, time::SystemTime};
use tracing::{debug, info};
use uuid::Uuid;

const DEFAULT_HOME_LOCATION: Vector3 = Vector3::new(128.0, 128.0, 100.0);
const DEFAULT_HOME_LOOK_AT: Vector3 = Vector3::new(100.0, 100.0, 100.0);

/// Profiles kept in process memory, keyed by lowercased `first last`.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    profiles: RwLock<HashMap<String, UserProfile>>,
}

fn name_key(first: &str, last: &str) -> String {
    format!("{} {}", first.to_lowercase(), last.to_lowercase())
}

impl InMemoryUserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.read().map_or(0, |profiles| profiles.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn profile_by_name(&self, first: &str, last: &str) -> Result<Option<UserProfile>> {
        let profiles = self
            .profiles
            .read()
            .map_err(|_| anyhow!("profile table lock poisoned"))?;

        Ok(profiles.get(&name_key(first, last)).cloned())
    }

    async fn add_profile(
        &self,
        first: &str,
        last: &str,
        password: &str,
        home_x: u32,
        home_y: u32,
    ) -> Result<UserProfile> {
        let key = name_key(first, last);
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| anyhow!("profile table lock poisoned"))?;

        if profiles.contains_key(&key) {
            bail!("profile {first} {last} already exists");
        }

        let salt = generate_salt();
        let profile = UserProfile {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            password_hash: password_hash(password, &salt),
            password_salt: salt,
            home_region_handle: region_handle(home_x, home_y),
            home_location: DEFAULT_HOME_LOCATION,
            home_look_at: DEFAULT_HOME_LOOK_AT,
            created: SystemTime::now(),
            current_agent: None,
        };

        info!(agent_id = %profile.id, "created profile for {} {}", first, last);
        profiles.insert(key, profile.clone());

        Ok(profile)
    }

    async fn record_placement(&self, agent_id: Uuid, placement: AgentPlacement) -> Result<()> {
        let mut profiles = self
            .profiles
            .write()
            .map_err(|_| anyhow!("profile table lock poisoned"))?;

        let profile = profiles
            .values_mut()
            .find(|profile| profile.id == agent_id)
            .ok_or_else(|| anyhow!("no profile with id {agent_id}"))?;

        debug!(%agent_id, region_handle = placement.region_handle, "placement recorded");
        profile.current_agent = Some(placement);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profile::md5_hex;

    #[tokio::test]
    async fn lookup_ignores_case() -> Result<()> {
        let store = InMemoryUserStore::new();
        let created = store.add_profile("Ada", "Lovelace", "secret", 1000, 1000).await?;

        let found = store.profile_by_name("ada", "LOVELACE").await?;
        assert_eq!(found.as_ref().map(|p| p.id), Some(created.id));
        assert_eq!(found.map(|p| p.first_name), Some("Ada".to_string()));
        assert!(store.profile_by_name("Grace", "Hopper").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn new_profile_defaults() -> Result<()> {
        let store = InMemoryUserStore::new();
        let profile = store.add_profile("Ada", "Lovelace", "secret", 1000, 1001).await?;

        assert_eq!(profile.home_region_handle, region_handle(1000, 1001));
        assert_eq!(profile.home_location, Vector3::new(128.0, 128.0, 100.0));
        assert_eq!(profile.home_look_at, Vector3::new(100.0, 100.0, 100.0));
        assert!(profile.current_agent.is_none());
        assert_eq!(profile.last_region_handle(), profile.home_region_handle);
        assert_eq!(
            profile.password_hash,
            md5_hex(&format!("{}:{}", md5_hex("secret"), profile.password_salt))
        );
        Ok(())
    }

    #[tokio::test]
    async fn duplicate_profile_is_rejected() -> Result<()> {
        let store = InMemoryUserStore::new();
        store.add_profile("Ada", "Lovelace", "secret", 1000, 1000).await?;
        assert!(store
            .add_profile("ADA", "lovelace", "other", 1000, 1000)
            .await
            .is_err());
        assert_eq!(store.len(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn placement_moves_last_region() -> Result<()> {
        let store = InMemoryUserStore::new();
        let profile = store.add_profile("Ada", "Lovelace", "secret", 1000, 1000).await?;

        let placement = AgentPlacement {
            region_id: Uuid::new_v4(),
            region_handle: region_handle(1001, 1000),
            session_id: Uuid::new_v4(),
            secure_session_id: Uuid::new_v4(),
            login_time: SystemTime::now(),
        };
        store.record_placement(profile.id, placement.clone()).await?;

        let reread = store.profile_by_name("Ada", "Lovelace").await?;
        let reread = reread.ok_or_else(|| anyhow!("profile vanished"))?;
        assert_eq!(reread.current_agent, Some(placement.clone()));
        assert_eq!(reread.last_region_handle(), region_handle(1001, 1000));

        let stray = AgentPlacement {
            session_id: Uuid::new_v4(),
            ..placement
        };
        assert!(store.record_placement(Uuid::new_v4(), stray).await.is_err());
        Ok(())
    }
}
