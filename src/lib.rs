//! # Gridlogin (Grid Login Node)
//!
//! `gridlogin` is the login node of a virtual-world grid. Viewers authenticate
//! here over XML-RPC; the node then hands the session off to the region
//! (simulator) that will host the avatar.
//!
//! ## Dispatch
//!
//! A single HTTP endpoint multiplexes three protocols, chosen by the request's
//! declared `Content-Type`:
//!
//! - **`text/xml`:** XML-RPC, dispatched by method name.
//! - **`application/x-www-form-urlencoded` or none:** REST, dispatched by the
//!   first path segment.
//! - **`application/xml`:** structured XML, reserved and answered with an empty body.
//!
//! ## Handoff
//!
//! A successful `login_to_simulator` call resolves the avatar's last region,
//! issues a seed capability and pre-authorizes the circuit at that region before
//! the viewer is told where to connect. The viewer and the region receive the
//! same session ids, circuit code and capability path.

pub mod cli;
pub mod grid;
pub mod http;
pub mod login;
pub mod offline;
pub mod profile;
pub mod xmlrpc;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
