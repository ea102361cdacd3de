//! Provider data handed to resources and data sources after configure

use crate::api::Client;
use crate::mutex_kv::KeyedMutex;
use std::sync::Arc;

#[derive(Clone)]
pub struct OciProviderData {
    pub client: Arc<Client>,
    /// Serializes changes to load balancer backend sets and their backends
    pub locks: Arc<KeyedMutex>,
}

impl OciProviderData {
    pub fn new(client: Client) -> Self {
        Self {
            client: Arc::new(client),
            locks: Arc::new(KeyedMutex::new()),
        }
    }
}
