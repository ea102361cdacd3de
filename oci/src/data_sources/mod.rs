//! Data source implementations

pub mod data_source_availability_domains;
pub mod data_source_vcns;

pub use data_source_availability_domains::AvailabilityDomainsDataSource;
pub use data_source_vcns::VcnsDataSource;
