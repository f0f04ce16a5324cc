//! Shared plumbing for the Portico crates: wire error codes, error bodies,
//! JSON persistence, data paths and validated domain names.

pub mod api;
pub mod capability;
pub mod domain;
pub mod error;
pub mod http;
pub mod id;
pub mod paths;
pub mod persist;
