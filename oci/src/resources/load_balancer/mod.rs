//! Load balancer resources

pub mod resource_backend;
pub mod resource_backend_set;
pub mod resource_load_balancer;

pub use resource_backend::BackendResource;
pub use resource_backend_set::BackendSetResource;
pub use resource_load_balancer::LoadBalancerResource;

/// Key under which backend set and backend changes are serialized.
pub(crate) fn backend_set_lock_key(load_balancer_id: &str, backend_set_name: &str) -> String {
    format!("{}/{}", load_balancer_id, backend_set_name)
}
