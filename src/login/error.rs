use crate::xmlrpc::Value;
use std::{collections::BTreeMap, time::Duration};
use thiserror::Error;

const FAILURE_REASON: &str = "key";

const MESSAGE_BAD_CREDENTIALS: &str = "Could not authenticate your avatar. Please check your username and password, and check the grid if problems persist.";
const MESSAGE_DEAD_REGION: &str = "The region you are attempting to log into is not responding. Please select another region and try again.";
const MESSAGE_INVALID_REQUEST: &str =
    "Error connecting to grid. Could not perceive credentials from login XML.";
const MESSAGE_INTERNAL: &str = "Error generating Login Response (internal error)";

/// Terminal outcomes of a login attempt. None of them send a handoff notice.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("request does not carry first, last and passwd")]
    InvalidRequest,
    #[error("no such user")]
    NoSuchUser,
    #[error("password mismatch")]
    BadPassword,
    #[error("region {0} not found")]
    RegionNotFound(u64),
    #[error("region {region_handle} did not accept the handoff")]
    HandoffFailed {
        region_handle: u64,
        #[source]
        source: anyhow::Error,
    },
    #[error("region {region_handle} did not answer the handoff within {timeout:?}")]
    HandoffTimeout {
        region_handle: u64,
        timeout: Duration,
    },
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl LoginError {
    /// Message shown to the user by the viewer.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::InvalidRequest => MESSAGE_INVALID_REQUEST,
            Self::NoSuchUser | Self::BadPassword => MESSAGE_BAD_CREDENTIALS,
            Self::RegionNotFound(_) | Self::HandoffFailed { .. } | Self::HandoffTimeout { .. } => {
                MESSAGE_DEAD_REGION
            }
            Self::Internal(_) => MESSAGE_INTERNAL,
        }
    }

    /// The `login: "false"` struct sent back in place of a login response.
    #[must_use]
    pub fn to_value(&self) -> Value {
        let mut failure = BTreeMap::new();
        failure.insert("reason".to_string(), Value::from(FAILURE_REASON));
        failure.insert("message".to_string(), Value::from(self.message()));
        failure.insert("login".to_string(), Value::from("false"));
        Value::from(failure)
    }
}
