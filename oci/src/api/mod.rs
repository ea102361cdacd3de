//! OCI REST API client
//!
//! A single signed [`Client`] talks to every service; per-service wrappers
//! ([`CoreApi`](core::CoreApi), [`IdentityApi`](identity::IdentityApi),
//! [`LoadBalancerApi`](load_balancer::LoadBalancerApi)) borrow it.

pub mod auth;
pub mod client;
pub mod common;
pub mod core;
pub mod error;
pub mod identity;
pub mod load_balancer;

pub use auth::{AuthError, RequestSigner};
pub use client::{Client, ClientConfig, RetryConfig, Service};
pub use common::{ApiQueryParams, ApiResponse, ResponseHeaders};
pub use error::ApiError;
