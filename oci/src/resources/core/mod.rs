//! Core Services resources

pub mod resource_instance;
pub mod resource_subnet;
pub mod resource_vcn;

pub use resource_instance::InstanceResource;
pub use resource_subnet::SubnetResource;
pub use resource_vcn::VcnResource;
