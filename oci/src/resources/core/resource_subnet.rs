//! Subnet resource

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::import_state_passthrough_id;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, DynamicValue};
use tfplug::validator::StringPatternValidator;
use tracing::info;

use super::resource_vcn::DNS_LABEL_PATTERN;
use crate::api::core::{CreateSubnetDetails, Subnet, UpdateSubnetDetails};
use crate::lifecycle::{LifecycleStates, StateWaiter};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, freeform_tags_attribute, is_gone, not_configured,
    optional_bool, optional_string, optional_string_list, optional_string_map, required_string,
    timeouts_attribute, wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const CREATE_STATES: LifecycleStates = LifecycleStates::new(&["PROVISIONING"], &["AVAILABLE"]);
const UPDATE_STATES: LifecycleStates =
    LifecycleStates::new(&["PROVISIONING", "UPDATING"], &["AVAILABLE"]);
const DELETE_STATES: LifecycleStates = LifecycleStates::new(&["TERMINATING"], &["TERMINATED"]);

#[derive(Default)]
pub struct SubnetResource {
    provider_data: Option<OciProviderData>,
}

impl SubnetResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_details(plan: &DynamicValue) -> Result<CreateSubnetDetails, Diagnostic> {
        Ok(CreateSubnetDetails {
            compartment_id: required_string(plan, "compartment_id")?,
            vcn_id: required_string(plan, "vcn_id")?,
            cidr_block: required_string(plan, "cidr_block")?,
            availability_domain: optional_string(plan, "availability_domain"),
            display_name: optional_string(plan, "display_name"),
            dns_label: optional_string(plan, "dns_label"),
            route_table_id: optional_string(plan, "route_table_id"),
            security_list_ids: optional_string_list(plan, "security_list_ids"),
            prohibit_public_ip_on_vnic: optional_bool(plan, "prohibit_public_ip_on_vnic"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        })
    }

    fn update_details(plan: &DynamicValue) -> UpdateSubnetDetails {
        UpdateSubnetDetails {
            display_name: optional_string(plan, "display_name"),
            route_table_id: optional_string(plan, "route_table_id"),
            security_list_ids: optional_string_list(plan, "security_list_ids"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        }
    }

    fn state_from(subnet: &Subnet, source: &DynamicValue) -> DynamicValue {
        StateBuilder::new()
            .string("id", &subnet.id)
            .string("compartment_id", &subnet.compartment_id)
            .string("vcn_id", &subnet.vcn_id)
            .string("cidr_block", &subnet.cidr_block)
            .opt_string("availability_domain", subnet.availability_domain.clone())
            .opt_string("display_name", subnet.display_name.clone())
            .opt_string("dns_label", subnet.dns_label.clone())
            .opt_string("route_table_id", subnet.route_table_id.clone())
            .string_list("security_list_ids", &subnet.security_list_ids)
            .opt_bool("prohibit_public_ip_on_vnic", subnet.prohibit_public_ip_on_vnic)
            .opt_string("dhcp_options_id", subnet.dhcp_options_id.clone())
            .opt_string("subnet_domain_name", subnet.subnet_domain_name.clone())
            .opt_string("virtual_router_ip", subnet.virtual_router_ip.clone())
            .string_map("freeform_tags", &subnet.freeform_tags)
            .string("state", &subnet.lifecycle_state)
            .keep("timeouts", source)
            .build()
    }
}

#[async_trait]
impl Resource for SubnetResource {
    fn type_name(&self) -> &str {
        "oci_core_subnet"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let create_only = |name: &str, description: &str| {
            AttributeBuilder::new(name, AttributeType::String)
                .description(description)
                .required()
                .plan_modifier(RequiresReplace)
                .build()
        };
        let computed = |name: &str, description: &str| {
            AttributeBuilder::new(name, AttributeType::String)
                .description(description)
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build()
        };

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a subnet in a VCN")
            .attribute(computed("id", "The OCID of the subnet"))
            .attribute(create_only("compartment_id", "The OCID of the compartment"))
            .attribute(create_only("vcn_id", "The OCID of the VCN the subnet belongs to"))
            .attribute(create_only("cidr_block", "The subnet's IPv4 CIDR block"))
            .attribute(
                AttributeBuilder::new("availability_domain", AttributeType::String)
                    .description("Availability domain for an AD-specific subnet; omit for a regional subnet")
                    .optional()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("display_name", AttributeType::String)
                    .description("A user-friendly name")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("dns_label", AttributeType::String)
                    .description("DNS label for the subnet")
                    .optional()
                    .computed()
                    .validator(StringPatternValidator::new(
                        DNS_LABEL_PATTERN,
                        "starts with a letter, alphanumeric, at most 15 characters",
                    ))
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("route_table_id", AttributeType::String)
                    .description("The OCID of the route table; defaults to the VCN's")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("security_list_ids", AttributeType::list(AttributeType::String))
                    .description("Security lists associated with the subnet")
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("prohibit_public_ip_on_vnic", AttributeType::Bool)
                    .description("Whether VNICs in this subnet are denied public IPs")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(computed("dhcp_options_id", "The OCID of the DHCP options"))
            .attribute(computed("subnet_domain_name", "The subnet's domain name"))
            .attribute(computed("virtual_router_ip", "The subnet's default gateway address"))
            .attribute(freeform_tags_attribute())
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("The subnet's lifecycle state")
                    .computed()
                    .build(),
            )
            .attribute(timeouts_attribute())
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn create(&self, ctx: Context, request: CreateResourceRequest) -> CreateResourceResponse {
        let fail = |state: DynamicValue, diagnostic| CreateResourceResponse {
            new_state: state,
            private: vec![],
            diagnostics: vec![diagnostic],
        };

        let Some(data) = &self.provider_data else {
            return fail(request.planned_state, not_configured());
        };
        let details = match Self::create_details(&request.planned_state) {
            Ok(details) => details,
            Err(diag) => return fail(request.planned_state, diag),
        };

        let client = data.client.as_ref();
        let created = match client.core().create_subnet(&details).await {
            Ok(subnet) => subnet,
            Err(e) => return fail(request.planned_state, api_error("create subnet", &e)),
        };
        info!(id = %created.id, vcn_id = %created.vcn_id, "created subnet");

        let timeouts = Timeouts::from_value(&request.planned_state, DEFAULT_TIMEOUT);
        let id = created.id.as_str();
        match StateWaiter::new(format!("subnet {}", id), CREATE_STATES, timeouts.create)
            .wait_for_target(&ctx, || async move { client.core().get_subnet(id).await })
            .await
        {
            Ok(subnet) => CreateResourceResponse {
                new_state: Self::state_from(&subnet, &request.planned_state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(e) => fail(
                Self::state_from(&created, &request.planned_state),
                wait_error("wait for subnet to become available", &e),
            ),
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let Some(data) = &self.provider_data else {
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![not_configured()],
                private: request.private,
            };
        };
        let Ok(id) = request.current_state.get_string(&AttributePath::new("id")) else {
            return ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
                private: request.private,
            };
        };

        let (new_state, diagnostics) = match data.client.core().get_subnet(&id).await {
            Ok(subnet) if is_gone(&subnet.lifecycle_state) => (None, vec![]),
            Ok(subnet) => (Some(Self::state_from(&subnet, &request.current_state)), vec![]),
            Err(e) if e.is_not_found() => (None, vec![]),
            Err(e) => (
                Some(request.current_state),
                vec![api_error("read subnet", &e)],
            ),
        };
        if new_state.is_none() {
            info!(id = %id, "subnet is gone, removing from state");
        }
        ReadResourceResponse {
            new_state,
            diagnostics,
            private: request.private,
        }
    }

    async fn update(&self, ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let fail = |diagnostic| UpdateResourceResponse {
            new_state: request.prior_state.clone(),
            private: vec![],
            diagnostics: vec![diagnostic],
        };

        let Some(data) = &self.provider_data else {
            return fail(not_configured());
        };
        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => return fail(diag),
        };

        let client = data.client.as_ref();
        let details = Self::update_details(&request.planned_state);
        if let Err(e) = client.core().update_subnet(&id, &details).await {
            return fail(api_error("update subnet", &e));
        }

        let timeouts = Timeouts::from_value(&request.planned_state, DEFAULT_TIMEOUT);
        let subnet_id = id.as_str();
        match StateWaiter::new(format!("subnet {}", id), UPDATE_STATES, timeouts.update)
            .wait_for_target(&ctx, || async move { client.core().get_subnet(subnet_id).await })
            .await
        {
            Ok(subnet) => UpdateResourceResponse {
                new_state: Self::state_from(&subnet, &request.planned_state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(e) => fail(wait_error("wait for subnet update", &e)),
        }
    }

    async fn delete(&self, ctx: Context, request: DeleteResourceRequest) -> DeleteResourceResponse {
        let Some(data) = &self.provider_data else {
            return DeleteResourceResponse {
                diagnostics: vec![not_configured()],
            };
        };
        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => return DeleteResourceResponse { diagnostics: vec![diag] },
        };

        let client = data.client.as_ref();
        match client.core().delete_subnet(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete subnet", &e)],
                }
            }
        }

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        let subnet_id = id.as_str();
        let waited = StateWaiter::new(format!("subnet {}", id), DELETE_STATES, timeouts.delete)
            .deleting()
            .wait(&ctx, || async move { client.core().get_subnet(subnet_id).await })
            .await;

        DeleteResourceResponse {
            diagnostics: match waited {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for subnet deletion", &e)],
            },
        }
    }

    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        import_state_passthrough_id(AttributePath::new("id"), &request)
    }
}

#[async_trait]
impl ResourceWithConfigure for SubnetResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        let mut diagnostics = vec![];
        match extract_provider_data(request.provider_data) {
            Ok(data) => self.provider_data = Some(data),
            Err(diag) => diagnostics.push(diag),
        }
        ConfigureResourceResponse { diagnostics }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{provider_data, state};
    use mockito::{Matcher, Server};
    use tfplug::types::Dynamic;

    const SUBNET_JSON: &str = r#"{
        "id": "ocid1.subnet.oc1..s1",
        "compartmentId": "ocid1.compartment.oc1..c1",
        "vcnId": "ocid1.vcn.oc1..v1",
        "cidrBlock": "10.0.1.0/24",
        "displayName": "public",
        "routeTableId": "ocid1.routetable.oc1..r1",
        "securityListIds": ["ocid1.securitylist.oc1..sl1"],
        "prohibitPublicIpOnVnic": false,
        "lifecycleState": "AVAILABLE"
    }"#;

    async fn configured(url: &str) -> SubnetResource {
        let mut resource = SubnetResource::new();
        let response = resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(provider_data(url)),
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        resource
    }

    #[test]
    fn create_details_require_network_attributes() {
        let plan = state(&[("compartment_id", Dynamic::from("c1"))]);
        let err = SubnetResource::create_details(&plan).unwrap_err();
        assert!(err.summary.contains("vcn_id"));
    }

    #[tokio::test]
    async fn create_sends_optional_fields_only_when_set() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/20160918/subnets")
            .match_body(Matcher::Json(serde_json::json!({
                "compartmentId": "ocid1.compartment.oc1..c1",
                "vcnId": "ocid1.vcn.oc1..v1",
                "cidrBlock": "10.0.1.0/24",
                "displayName": "public"
            })))
            .with_status(200)
            .with_body(SUBNET_JSON.replace("AVAILABLE", "PROVISIONING"))
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/subnets/ocid1.subnet.oc1..s1")
            .with_status(200)
            .with_body(SUBNET_JSON)
            .create_async()
            .await;

        let plan = state(&[
            ("id", Dynamic::Unknown),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c1")),
            ("vcn_id", Dynamic::from("ocid1.vcn.oc1..v1")),
            ("cidr_block", Dynamic::from("10.0.1.0/24")),
            ("display_name", Dynamic::from("public")),
            ("security_list_ids", Dynamic::Unknown),
            ("prohibit_public_ip_on_vnic", Dynamic::Unknown),
        ]);
        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_core_subnet".to_string(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        create.assert_async().await;
        assert_eq!(
            response
                .new_state
                .get_string_list(&AttributePath::new("security_list_ids"))
                .unwrap(),
            vec!["ocid1.securitylist.oc1..sl1"]
        );
        assert!(!response
            .new_state
            .get_bool(&AttributePath::new("prohibit_public_ip_on_vnic"))
            .unwrap());
    }

    #[tokio::test]
    async fn update_sends_mutable_fields() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("PUT", "/20160918/subnets/ocid1.subnet.oc1..s1")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "displayName": "renamed"
            })))
            .with_status(200)
            .with_body(SUBNET_JSON.replace("public", "renamed"))
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/subnets/ocid1.subnet.oc1..s1")
            .with_status(200)
            .with_body(SUBNET_JSON.replace("public", "renamed"))
            .create_async()
            .await;

        let prior = state(&[
            ("id", Dynamic::from("ocid1.subnet.oc1..s1")),
            ("display_name", Dynamic::from("public")),
        ]);
        let planned = state(&[
            ("id", Dynamic::from("ocid1.subnet.oc1..s1")),
            ("display_name", Dynamic::from("renamed")),
        ]);
        let resource = configured(&server.url()).await;
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "oci_core_subnet".to_string(),
                    prior_state: prior,
                    planned_state: planned.clone(),
                    config: planned,
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        update.assert_async().await;
        assert_eq!(
            response
                .new_state
                .get_string(&AttributePath::new("display_name"))
                .unwrap(),
            "renamed"
        );
    }
}
