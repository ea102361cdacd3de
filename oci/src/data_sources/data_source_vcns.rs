//! VCN list data source

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::data_source::{
    ConfigureDataSourceRequest, ConfigureDataSourceResponse, DataSource, DataSourceSchemaRequest,
    DataSourceSchemaResponse, DataSourceWithConfigure, ReadDataSourceRequest,
    ReadDataSourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{Dynamic, DynamicValue};
use tfplug::validator::StringOneOfValidator;
use tracing::debug;

use crate::api::core::Vcn;
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, not_configured, optional_string, required_string,
    StateBuilder,
};

#[derive(Default)]
pub struct VcnsDataSource {
    provider_data: Option<OciProviderData>,
}

impl VcnsDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    fn vcn_value(vcn: &Vcn) -> Dynamic {
        StateBuilder::new()
            .string("id", &vcn.id)
            .string("compartment_id", &vcn.compartment_id)
            .opt_string("display_name", vcn.display_name.clone())
            .string_list("cidr_blocks", &vcn.cidr_blocks)
            .opt_string("dns_label", vcn.dns_label.clone())
            .opt_string("vcn_domain_name", vcn.vcn_domain_name.clone())
            .opt_string("default_route_table_id", vcn.default_route_table_id.clone())
            .opt_string("default_security_list_id", vcn.default_security_list_id.clone())
            .opt_string("default_dhcp_options_id", vcn.default_dhcp_options_id.clone())
            .string("state", &vcn.lifecycle_state)
            .opt_string("time_created", vcn.time_created.clone())
            .string_map("freeform_tags", &vcn.freeform_tags)
            .build()
            .value
    }
}

#[async_trait]
impl DataSource for VcnsDataSource {
    fn type_name(&self) -> &str {
        "oci_core_vcns"
    }

    async fn schema(
        &self,
        _ctx: Context,
        _request: DataSourceSchemaRequest,
    ) -> DataSourceSchemaResponse {
        let vcn = AttributeType::object([
            ("id", AttributeType::String),
            ("compartment_id", AttributeType::String),
            ("display_name", AttributeType::String),
            ("cidr_blocks", AttributeType::list(AttributeType::String)),
            ("dns_label", AttributeType::String),
            ("vcn_domain_name", AttributeType::String),
            ("default_route_table_id", AttributeType::String),
            ("default_security_list_id", AttributeType::String),
            ("default_dhcp_options_id", AttributeType::String),
            ("state", AttributeType::String),
            ("time_created", AttributeType::String),
            ("freeform_tags", AttributeType::map(AttributeType::String)),
        ]);

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Lists the VCNs in a compartment")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("display_name", AttributeType::String)
                    .description("Only return VCNs with exactly this display name")
                    .optional()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("Only return VCNs in this lifecycle state")
                    .optional()
                    .validator(StringOneOfValidator::new([
                        "PROVISIONING",
                        "AVAILABLE",
                        "TERMINATING",
                        "TERMINATED",
                        "UPDATING",
                    ]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("virtual_networks", AttributeType::list(vcn))
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
        let config = &request.config;
        let compartment_id = match required_string(config, "compartment_id") {
            Ok(id) => id,
            Err(diag) => return fail(diag),
        };
        let display_name = optional_string(config, "display_name");
        let state = optional_string(config, "state");

        let vcns = match data
            .client
            .core()
            .list_vcns(&compartment_id, display_name.as_deref(), state.as_deref())
            .await
        {
            Ok(vcns) => vcns,
            Err(e) => return fail(api_error("list VCNs", &e)),
        };
        debug!(compartment = %compartment_id, count = vcns.len(), "listed VCNs");

        ReadDataSourceResponse {
            state: StateBuilder::new()
                .string("id", &compartment_id)
                .string("compartment_id", &compartment_id)
                .opt_string("display_name", display_name)
                .opt_string("state", state)
                .value(
                    "virtual_networks",
                    Dynamic::List(vcns.iter().map(Self::vcn_value).collect()),
                )
                .build(),
            diagnostics: vec![],
        }
    }
}

#[async_trait]
impl DataSourceWithConfigure for VcnsDataSource {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{provider_data, state};
    use mockito::{Matcher, Server};
    use tfplug::types::AttributePath;

    #[tokio::test]
    async fn read_passes_filters_to_the_api() {
        let mut server = Server::new_async().await;
        let list = server
            .mock("GET", "/20160918/vcns")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("compartmentId".into(), "ocid1.compartment.oc1..c".into()),
                Matcher::UrlEncoded("displayName".into(), "prod".into()),
                Matcher::UrlEncoded("lifecycleState".into(), "AVAILABLE".into()),
            ]))
            .with_status(200)
            .with_body(
                serde_json::json!([{
                    "id": "ocid1.vcn.oc1..v1",
                    "compartmentId": "ocid1.compartment.oc1..c",
                    "displayName": "prod",
                    "cidrBlocks": ["10.0.0.0/16"],
                    "lifecycleState": "AVAILABLE",
                    "freeformTags": {"env": "prod"}
                }])
                .to_string(),
            )
            .create_async()
            .await;

        let mut data_source = VcnsDataSource::new();
        data_source
            .configure(
                Context::new(),
                ConfigureDataSourceRequest {
                    provider_data: Some(provider_data(&server.url())),
                },
            )
            .await;
        let response = data_source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "oci_core_vcns".to_string(),
                    config: state(&[
                        ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
                        ("display_name", Dynamic::from("prod")),
                        ("state", Dynamic::from("AVAILABLE")),
                    ]),
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        list.assert_async().await;
        let first = AttributePath::new("virtual_networks").index(0);
        assert_eq!(
            response
                .state
                .get_string_list(&first.clone().attribute("cidr_blocks"))
                .unwrap(),
            vec!["10.0.0.0/16"]
        );
        assert_eq!(
            response
                .state
                .get_string(&first.attribute("freeform_tags").key("env"))
                .unwrap(),
            "prod"
        );
    }

    #[tokio::test]
    async fn api_errors_become_diagnostics() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/20160918/vcns")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":"InvalidParameter","message":"bad compartment"}"#)
            .create_async()
            .await;

        let mut data_source = VcnsDataSource::new();
        data_source
            .configure(
                Context::new(),
                ConfigureDataSourceRequest {
                    provider_data: Some(provider_data(&server.url())),
                },
            )
            .await;
        let response = data_source
            .read(
                Context::new(),
                ReadDataSourceRequest {
                    type_name: "oci_core_vcns".to_string(),
                    config: state(&[("compartment_id", Dynamic::from("bad"))]),
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert_eq!(response.diagnostics[0].summary, "Failed to list VCNs");
        assert!(response.diagnostics[0].detail.contains("bad compartment"));
    }
}
