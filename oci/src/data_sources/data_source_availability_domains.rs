//! Availability domains data source

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{Dynamic, DynamicValue};

use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, not_configured, required_string, StateBuilder,
};

#[derive(Default)]
pub struct AvailabilityDomainsDataSource {
    provider_data: Option<OciProviderData>,
}

impl AvailabilityDomainsDataSource {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DataSource for AvailabilityDomainsDataSource {
    fn type_name(&self) -> &str {
        "oci_identity_availability_domains"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Lists the availability domains visible to a compartment")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The data source ID")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .description("The OCID of the tenancy or compartment")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "availability_domains",
                    AttributeType::list(AttributeType::object([
                        ("id", AttributeType::String),
                        ("name", AttributeType::String),
                    ])),
                )
                .description("Availability domains, e.g. Uocm:PHX-AD-1")
                .computed()
                .build(),
            )
            .build();

        DataSourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn read(&self, _ctx: Context, request: ReadDataSourceRequest) -> ReadDataSourceResponse {
        let fail = |diagnostic| ReadDataSourceResponse {
            state: DynamicValue::null(),
            diagnostics: vec![diagnostic],
        };

        let Some(data) = &self.provider_data else {
            return fail(not_configured());
        };
        let compartment_id = match required_string(&request.config, "compartment_id") {
            Ok(id) => id,
            Err(diag) => return fail(diag),
        };

        tracing::debug!(compartment = %compartment_id, "listing availability domains");
        match data
            .client
            .identity()
            .list_availability_domains(&compartment_id)
            .await
        {
            Ok(domains) => {
                let domains = domains
                    .iter()
                    .map(|domain| {
                        StateBuilder::new()
                            .opt_string("id", domain.id.clone())
                            .string("name", &domain.name)
                            .build()
                            .value
                    })
                    .collect();
                ReadDataSourceResponse {
                    state: StateBuilder::new()
                        .string("id", &compartment_id)
                        .string("compartment_id", &compartment_id)
                        .value("availability_domains", Dynamic::List(domains))
                        .build(),
                    diagnostics: vec![],
                }
            }
            Err(e) => fail(api_error("list availability domains", &e)),
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for AvailabilityDomainsDataSource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureDataSourceRequest,
    ) -> ConfigureDataSourceResponse {
        let mut diagnostics = vec![];
        match extract_provider_data(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diag) => diagnostics.push(diag),
        }
        ConfigureDataSourceResponse { diagnostics }
    }
}
