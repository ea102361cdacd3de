//! Generated protobuf types for Terraform Plugin Protocol v6
//!
//! Request and response messages live in snake_case modules named after
//! their RPC (`read_resource::Request`). Several generated names collide
//! with framework types (`DynamicValue`, `Schema`, `Diagnostic`), so refer to
//! these through the `proto::` prefix.

include!(concat!(env!("OUT_DIR"), "/tfplugin6.rs"));

pub use provider_server::{Provider as ProtoProvider, ProviderServer};

/// go-plugin's controller service, used by Terraform to shut plugins down.
pub mod plugin {
    include!(concat!(env!("OUT_DIR"), "/plugin.rs"));

    pub use grpc_controller_server::{GrpcController, GrpcControllerServer};
}
