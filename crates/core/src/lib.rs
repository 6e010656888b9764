//! Domain logic for the ideaforge analysis completion pipeline.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! repository layer, the pipeline services, the API server, and the
//! standalone poller worker.

pub mod analysis;
pub mod artifact;
pub mod error;
pub mod polling;
pub mod signature;
pub mod types;
