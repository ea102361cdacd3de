//! Terraform provider for Oracle Cloud Infrastructure

pub mod api;
pub mod composite_id;
pub mod config;
pub mod data_sources;
pub mod lifecycle;
pub mod mutex_kv;
pub mod provider_data;
pub mod resources;

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tfplug::context::Context;
use tfplug::data_source::DataSourceWithConfigure;
use tfplug::provider::{
    ConfigureProviderRequest, ConfigureProviderResponse, DataSourceFactory, Provider,
    ProviderSchemaRequest, ProviderSchemaResponse, ResourceFactory, ValidateProviderConfigRequest,
    ValidateProviderConfigResponse,
};
use tfplug::resource::ResourceWithConfigure;
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic};
use tfplug::validator::NumberRangeValidator;
use tracing::info;

use crate::config::{ProviderConfig, RawProviderConfig};
use crate::provider_data::OciProviderData;

#[derive(Default)]
pub struct OciProvider;

impl OciProvider {
    pub fn new() -> Self {
        Self
    }
}

fn string_attribute(name: &str, description: &str) -> tfplug::schema::Attribute {
    AttributeBuilder::new(name, AttributeType::String)
        .description(description)
        .optional()
        .build()
}

#[async_trait]
impl Provider for OciProvider {
    fn type_name(&self) -> &str {
        "oci"
    }

    async fn schema(&self, _ctx: Context, _request: ProviderSchemaRequest) -> ProviderSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Provider for Oracle Cloud Infrastructure")
            .attribute(string_attribute(
                "tenancy_ocid",
                "Tenancy OCID. Can also be set with OCI_TENANCY_OCID",
            ))
            .attribute(string_attribute(
                "user_ocid",
                "OCID of the user calling the API. Can also be set with OCI_USER_OCID",
            ))
            .attribute(string_attribute(
                "fingerprint",
                "Fingerprint of the API signing key. Can also be set with OCI_FINGERPRINT",
            ))
            .attribute(
                AttributeBuilder::new("private_key", AttributeType::String)
                    .description("PEM encoded API signing key. Can also be set with OCI_PRIVATE_KEY")
                    .optional()
                    .sensitive()
                    .build(),
            )
            .attribute(string_attribute(
                "private_key_path",
                "Path to the API signing key. Can also be set with OCI_PRIVATE_KEY_PATH",
            ))
            .attribute(string_attribute(
                "region",
                "Region identifier such as us-phoenix-1. Can also be set with OCI_REGION",
            ))
            .attribute(string_attribute(
                "config_file_profile",
                "Profile to read from the OCI config file. Defaults to DEFAULT",
            ))
            .attribute(
                AttributeBuilder::new("retry_duration_seconds", AttributeType::Number)
                    .description("How long retryable API errors keep being retried")
                    .optional()
                    .validator(NumberRangeValidator::between(0.0, 86400.0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("disable_auto_retries", AttributeType::Bool)
                    .description("Fail on the first retryable API error")
                    .optional()
                    .build(),
            )
            .build();

        ProviderSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateProviderConfigRequest,
    ) -> ValidateProviderConfigResponse {
        let mut diagnostics = vec![];
        let is_set = |name: &str| {
            request
                .config
                .get(&AttributePath::new(name))
                .map(|value| !value.is_null())
                .unwrap_or(false)
        };
        if is_set("private_key") && is_set("private_key_path") {
            diagnostics.push(
                Diagnostic::error(
                    "Conflicting provider attributes",
                    "Only one of private_key and private_key_path can be set",
                )
                .with_attribute(AttributePath::new("private_key_path")),
            );
        }
        ValidateProviderConfigResponse { diagnostics }
    }

    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureProviderRequest,
    ) -> ConfigureProviderResponse {
        let raw = RawProviderConfig::from_config(&request.config);
        let client = ProviderConfig::resolve(raw).and_then(|config| {
            info!(
                region = %config.region,
                terraform_version = %request.terraform_version,
                "configuring OCI provider"
            );
            config.build_client()
        });

        match client {
            Ok(client) => ConfigureProviderResponse {
                diagnostics: vec![],
                provider_data: Some(Arc::new(OciProviderData::new(client))),
            },
            Err(e) => ConfigureProviderResponse {
                diagnostics: vec![Diagnostic::error(
                    "Failed to configure the OCI provider",
                    e.to_string(),
                )],
                provider_data: None,
            },
        }
    }

    fn resources(&self) -> HashMap<String, ResourceFactory> {
        let mut resources: HashMap<String, ResourceFactory> = HashMap::new();
        resources.insert(
            "oci_core_vcn".to_string(),
            Box::new(|| Box::new(crate::resources::VcnResource::new()) as Box<dyn ResourceWithConfigure>),
        );
        resources.insert(
            "oci_core_subnet".to_string(),
            Box::new(|| Box::new(crate::resources::SubnetResource::new()) as Box<dyn ResourceWithConfigure>),
        );
        resources.insert(
            "oci_core_instance".to_string(),
            Box::new(|| {
                Box::new(crate::resources::InstanceResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        resources.insert(
            "oci_identity_compartment".to_string(),
            Box::new(|| {
                Box::new(crate::resources::CompartmentResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        resources.insert(
            "oci_load_balancer_load_balancer".to_string(),
            Box::new(|| {
                Box::new(crate::resources::LoadBalancerResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        resources.insert(
            "oci_load_balancer_backend_set".to_string(),
            Box::new(|| {
                Box::new(crate::resources::BackendSetResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        resources.insert(
            "oci_load_balancer_backend".to_string(),
            Box::new(|| {
                Box::new(crate::resources::BackendResource::new()) as Box<dyn ResourceWithConfigure>
            }),
        );
        resources
    }

    fn data_sources(&self) -> HashMap<String, DataSourceFactory> {
        let mut data_sources: HashMap<String, DataSourceFactory> = HashMap::new();
        data_sources.insert(
            "oci_identity_availability_domains".to_string(),
            Box::new(|| {
                Box::new(crate::data_sources::AvailabilityDomainsDataSource::new())
                    as Box<dyn DataSourceWithConfigure>
            }),
        );
        data_sources.insert(
            "oci_core_vcns".to_string(),
            Box::new(|| {
                Box::new(crate::data_sources::VcnsDataSource::new()) as Box<dyn DataSourceWithConfigure>
            }),
        );
        data_sources
    }
}
