//! In-process grid for standalone mode: the login node and its regions share
//! one process, so a handoff is a direct call into the region's circuit table.

use super::{GridCommunications, HandoffNotice, RegionDescriptor};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

/// Circuits a region has been told to expect, keyed by circuit code.
#[derive(Debug, Default)]
pub struct RegionCircuits {
    expected: Mutex<HashMap<u32, HandoffNotice>>,
}

impl RegionCircuits {
    /// Record an incoming circuit. A later notice for the same circuit code
    /// replaces the earlier one.
    pub fn expect_user(&self, notice: HandoffNotice) -> Result<()> {
        let mut expected = self
            .expected
            .lock()
            .map_err(|_| anyhow!("region circuit table lock poisoned"))?;

        info!(
            agent_id = %notice.agent_id,
            circuit_code = notice.circuit_code,
            "expecting circuit for {} {}",
            notice.first_name,
            notice.last_name
        );
        expected.insert(notice.circuit_code, notice);
        Ok(())
    }

    /// Accepts a viewer's circuit only if it matches a handoff exactly.
    #[must_use]
    pub fn authenticate_circuit(
        &self,
        agent_id: Uuid,
        session_id: Uuid,
        circuit_code: u32,
    ) -> Option<HandoffNotice> {
        let expected = self.expected.lock().ok()?;
        let notice = expected.get(&circuit_code)?;

        if notice.agent_id == agent_id && notice.session_id == session_id {
            Some(notice.clone())
        } else {
            warn!(circuit_code, %agent_id, "circuit rejected: session mismatch");
            None
        }
    }

    #[must_use]
    pub fn expected_count(&self) -> usize {
        self.expected.lock().map_or(0, |expected| expected.len())
    }
}

#[derive(Debug)]
struct RegionEntry {
    descriptor: RegionDescriptor,
    circuits: Arc<RegionCircuits>,
}

#[derive(Debug, Default)]
pub struct LocalGrid {
    regions: RwLock<HashMap<u64, RegionEntry>>,
}

impl LocalGrid {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a region, returning its circuit table. Registering a handle
    /// twice replaces the descriptor and starts a fresh table.
    pub fn register_region(&self, descriptor: RegionDescriptor) -> Result<Arc<RegionCircuits>> {
        let circuits = Arc::new(RegionCircuits::default());
        let handle = descriptor.handle();

        info!(
            region = %descriptor.name,
            handle,
            endpoint = %descriptor.external_endpoint,
            "region registered at ({}, {})",
            descriptor.loc_x,
            descriptor.loc_y
        );

        self.regions
            .write()
            .map_err(|_| anyhow!("region table lock poisoned"))?
            .insert(
                handle,
                RegionEntry {
                    descriptor,
                    circuits: Arc::clone(&circuits),
                },
            );

        Ok(circuits)
    }

    #[must_use]
    pub fn circuits(&self, region_handle: u64) -> Option<Arc<RegionCircuits>> {
        self.regions
            .read()
            .ok()?
            .get(&region_handle)
            .map(|entry| Arc::clone(&entry.circuits))
    }
}

#[async_trait]
impl GridCommunications for LocalGrid {
    #[instrument(skip(self))]
    async fn request_neighbour_info(&self, region_handle: u64) -> Result<Option<RegionDescriptor>> {
        let regions = self
            .regions
            .read()
            .map_err(|_| anyhow!("region table lock poisoned"))?;

        let descriptor = regions.get(&region_handle).map(|entry| entry.descriptor.clone());
        debug!(found = descriptor.is_some(), "region lookup");
        Ok(descriptor)
    }

    #[instrument(skip(self, notice), fields(agent_id = %notice.agent_id))]
    async fn inform_region_of_login(&self, region_handle: u64, notice: HandoffNotice) -> Result<()> {
        let circuits = self
            .circuits(region_handle)
            .ok_or_else(|| anyhow!("region {region_handle} is not registered"))?;

        circuits.expect_user(notice)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::grid::region_handle;

    fn sandbox() -> RegionDescriptor {
        RegionDescriptor::new("Sandbox", 1000, 1000, "127.0.0.1:9000".parse().unwrap())
    }

    fn notice(circuit_code: u32) -> HandoffNotice {
        HandoffNotice {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            agent_id: Uuid::new_v4(),
            session_id: Uuid::new_v4(),
            secure_session_id: Uuid::new_v4(),
            circuit_code,
            caps_path: "abc".to_string(),
        }
    }

    #[tokio::test]
    async fn lookup_by_handle() -> Result<()> {
        let grid = LocalGrid::new();
        grid.register_region(sandbox())?;

        let found = grid.request_neighbour_info(region_handle(1000, 1000)).await?;
        assert_eq!(found.map(|region| region.name), Some("Sandbox".to_string()));
        assert!(grid.request_neighbour_info(region_handle(1, 1)).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn handoff_reaches_region_circuits() -> Result<()> {
        let grid = LocalGrid::new();
        let circuits = grid.register_region(sandbox())?;
        let notice = notice(77);

        grid.inform_region_of_login(region_handle(1000, 1000), notice.clone())
            .await?;
        assert_eq!(circuits.expected_count(), 1);

        let accepted = circuits.authenticate_circuit(notice.agent_id, notice.session_id, 77);
        assert_eq!(accepted, Some(notice.clone()));

        // wrong session, wrong circuit
        assert!(circuits
            .authenticate_circuit(notice.agent_id, Uuid::new_v4(), 77)
            .is_none());
        assert!(circuits
            .authenticate_circuit(notice.agent_id, notice.session_id, 78)
            .is_none());
        Ok(())
    }

    #[tokio::test]
    async fn handoff_to_unknown_region_fails() {
        let grid = LocalGrid::new();
        let result = grid.inform_region_of_login(region_handle(5, 5), notice(1)).await;
        assert!(result.is_err());
    }
}
