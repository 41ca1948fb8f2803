//! Grid communications: region lookup and login handoff.

mod local;

pub use self::local::{LocalGrid, RegionCircuits};

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::net::SocketAddr;
use uuid::Uuid;

/// Width of a region in meters. Region grid coordinates are multiplied by this
/// to get world coordinates.
pub const REGION_SIZE: u32 = 256;

/// Largest grid coordinate whose world position still fits the 32-bit half of
/// a region handle.
pub const MAX_REGION_COORD: u32 = u32::MAX / REGION_SIZE;

/// Pack region grid coordinates into the 64-bit region handle.
#[must_use]
pub const fn region_handle(loc_x: u32, loc_y: u32) -> u64 {
    ((loc_x as u64 * REGION_SIZE as u64) << 32) | (loc_y as u64 * REGION_SIZE as u64)
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionDescriptor {
    pub region_id: Uuid,
    pub name: String,
    pub loc_x: u32,
    pub loc_y: u32,
    /// Where viewers open their circuit.
    pub external_endpoint: SocketAddr,
    /// Host name used in capability URLs.
    pub external_host_name: String,
}

impl RegionDescriptor {
    #[must_use]
    pub fn new(name: impl Into<String>, loc_x: u32, loc_y: u32, external_endpoint: SocketAddr) -> Self {
        Self {
            region_id: Uuid::new_v4(),
            name: name.into(),
            loc_x,
            loc_y,
            external_endpoint,
            external_host_name: external_endpoint.ip().to_string(),
        }
    }

    #[must_use]
    pub fn with_external_host_name(mut self, host: impl Into<String>) -> Self {
        self.external_host_name = host.into();
        self
    }

    /// World position of the region's south-west corner, in meters.
    #[must_use]
    pub const fn world_origin(&self) -> (u64, u64) {
        (
            self.loc_x as u64 * REGION_SIZE as u64,
            self.loc_y as u64 * REGION_SIZE as u64,
        )
    }

    #[must_use]
    pub const fn handle(&self) -> u64 {
        region_handle(self.loc_x, self.loc_y)
    }
}

/// What a region needs to accept an incoming circuit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HandoffNotice {
    pub first_name: String,
    pub last_name: String,
    pub agent_id: Uuid,
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub circuit_code: u32,
    pub caps_path: String,
}

#[async_trait]
pub trait GridCommunications: Send + Sync {
    async fn request_neighbour_info(&self, region_handle: u64) -> Result<Option<RegionDescriptor>>;

    /// Deliver `notice` to the region; completes once the region has it.
    async fn inform_region_of_login(&self, region_handle: u64, notice: HandoffNotice) -> Result<()>;
}
