use crate::{
    grid::{HandoffNotice, RegionDescriptor},
    profile::{UserProfile, Vector3},
    xmlrpc::Value,
};
use rand::Rng;
use std::{
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};
use uuid::Uuid;

/// Camera direction the viewer starts with.
const START_LOOK_AT: &str = "[r0.99949799999999999756,r0.03166859999999999814,r0]";
const START_LOCATION: &str = "last";
const AGENT_ACCESS: &str = "M";

/// Identifiers issued for one login attempt. The response and the handoff
/// notice are both built from the same session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Session {
    pub session_id: Uuid,
    pub secure_session_id: Uuid,
    pub circuit_code: u32,
    pub caps_path: String,
}

impl Session {
    #[must_use]
    pub fn issue() -> Self {
        let circuit_code = rand::thread_rng().gen_range(0..=i32::MAX).unsigned_abs();

        Self {
            session_id: Uuid::new_v4(),
            secure_session_id: Uuid::new_v4(),
            circuit_code,
            caps_path: random_caps_path(),
        }
    }

    #[must_use]
    pub fn handoff_notice(&self, profile: &UserProfile) -> HandoffNotice {
        HandoffNotice {
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            agent_id: profile.id,
            session_id: self.session_id,
            secure_session_id: self.secure_session_id,
            circuit_code: self.circuit_code,
            caps_path: self.caps_path.clone(),
        }
    }
}

/// Random UUID, hyphens removed, last four hex digits dropped. The seed
/// capability URL appends `0000` in their place.
#[must_use]
pub fn random_caps_path() -> String {
    let mut caps = Uuid::new_v4().hyphenated().to_string();
    caps.truncate(caps.len() - 4);
    caps.replace('-', "")
}

fn triple(v: Vector3) -> String {
    format!("[r{},r{},r{}]", v.x, v.y, v.z)
}

/// The home descriptor string the viewer parses, with the region position in
/// world meters.
#[must_use]
pub fn home_descriptor(region: &RegionDescriptor, profile: &UserProfile) -> String {
    let (world_x, world_y) = region.world_origin();
    format!(
        "{{'region_handle':[r{world_x},r{world_y}], 'position':{}, 'look_at':{}}}",
        triple(profile.home_location),
        triple(profile.home_look_at),
    )
}

#[derive(Clone, Debug, PartialEq)]
pub struct LoginResponse {
    pub message: String,
    pub first_name: String,
    pub last_name: String,
    pub agent_id: Uuid,
    pub session: Session,
    pub sim_ip: String,
    pub sim_port: u16,
    /// World meters, not region units.
    pub region_x: u64,
    pub region_y: u64,
    pub home: String,
    pub seed_capability: String,
}

impl LoginResponse {
    #[must_use]
    pub fn new(
        profile: &UserProfile,
        region: &RegionDescriptor,
        session: Session,
        message: &str,
        http_listener_port: u16,
    ) -> Self {
        let seed_capability = format!(
            "http://{}:{}/CAPS/{}0000/",
            region.external_host_name, http_listener_port, session.caps_path
        );

        let (region_x, region_y) = region.world_origin();

        Self {
            message: message.to_string(),
            first_name: profile.first_name.clone(),
            last_name: profile.last_name.clone(),
            agent_id: profile.id,
            sim_ip: region.external_endpoint.ip().to_string(),
            sim_port: region.external_endpoint.port(),
            region_x,
            region_y,
            home: home_descriptor(region, profile),
            seed_capability,
            session,
        }
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        let seconds_since_epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |elapsed| i32::try_from(elapsed.as_secs()).unwrap_or(i32::MAX));

        let members: BTreeMap<String, Value> = [
            ("login", Value::from("true")),
            ("message", Value::from(self.message)),
            ("first_name", Value::from(self.first_name)),
            ("last_name", Value::from(self.last_name)),
            ("agent_id", Value::from(self.agent_id.to_string())),
            ("session_id", Value::from(self.session.session_id.to_string())),
            (
                "secure_session_id",
                Value::from(self.session.secure_session_id.to_string()),
            ),
            (
                "circuit_code",
                Value::from(i32::try_from(self.session.circuit_code).unwrap_or(i32::MAX)),
            ),
            ("sim_ip", Value::from(self.sim_ip)),
            ("sim_port", Value::from(i32::from(self.sim_port))),
            ("region_x", Value::from(i32::try_from(self.region_x).unwrap_or(i32::MAX))),
            ("region_y", Value::from(i32::try_from(self.region_y).unwrap_or(i32::MAX))),
            ("home", Value::from(self.home)),
            ("look_at", Value::from(START_LOOK_AT)),
            ("seed_capability", Value::from(self.seed_capability)),
            ("start_location", Value::from(START_LOCATION)),
            ("agent_access", Value::from(AGENT_ACCESS)),
            ("seconds_since_epoch", Value::from(seconds_since_epoch)),
        ]
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect();

        Value::from(members)
    }
}
