//! Resource implementations

pub mod common;
pub mod core;
pub mod identity;
pub mod load_balancer;

pub use self::core::{InstanceResource, SubnetResource, VcnResource};
pub use identity::CompartmentResource;
pub use load_balancer::{BackendResource, BackendSetResource, LoadBalancerResource};
