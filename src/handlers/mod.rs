//! HTTP handlers for the JSON API and operational endpoints.
//!
//! The webhook endpoint lives with the rest of the provider code in
//! [`crate::stripe::handler`].

pub mod auth;
pub mod billing;
pub mod projects;
pub mod status;

pub use status::{ServiceMetrics, StatusResponse};
