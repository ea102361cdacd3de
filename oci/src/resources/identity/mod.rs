//! Identity resources

pub mod resource_compartment;

pub use resource_compartment::CompartmentResource;
