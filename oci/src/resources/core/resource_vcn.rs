//! Virtual cloud network resource

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, DynamicValue};
use tfplug::validator::{ListLengthValidator, StringPatternValidator};
use tfplug::import_state_passthrough_id;
use tracing::info;

use crate::api::core::{CreateVcnDetails, UpdateVcnDetails, Vcn};
use crate::lifecycle::{LifecycleStates, StateWaiter};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, freeform_tags_attribute, is_gone, not_configured,
    optional_string, optional_string_list, optional_string_map, required_string,
    timeouts_attribute, wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const CREATE_STATES: LifecycleStates = LifecycleStates::new(&["PROVISIONING"], &["AVAILABLE"]);
const UPDATE_STATES: LifecycleStates =
    LifecycleStates::new(&["PROVISIONING", "UPDATING"], &["AVAILABLE"]);
const DELETE_STATES: LifecycleStates = LifecycleStates::new(&["TERMINATING"], &["TERMINATED"]);

pub(crate) const DNS_LABEL_PATTERN: &str = "^[a-zA-Z][a-zA-Z0-9]{0,14}$";

#[derive(Default)]
pub struct VcnResource {
    provider_data: Option<OciProviderData>,
}

impl VcnResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn create_details(plan: &DynamicValue) -> Result<CreateVcnDetails, tfplug::Diagnostic> {
        Ok(CreateVcnDetails {
            compartment_id: required_string(plan, "compartment_id")?,
            cidr_blocks: optional_string_list(plan, "cidr_blocks").unwrap_or_default(),
            display_name: optional_string(plan, "display_name"),
            dns_label: optional_string(plan, "dns_label"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        })
    }

    /// State for `vcn`, carrying `timeouts` over from `source`.
    fn state_from(vcn: &Vcn, source: &DynamicValue) -> DynamicValue {
        let cidr_blocks = if vcn.cidr_blocks.is_empty() {
            vcn.cidr_block.iter().cloned().collect()
        } else {
            vcn.cidr_blocks.clone()
        };
        StateBuilder::new()
            .string("id", &vcn.id)
            .string("compartment_id", &vcn.compartment_id)
            .string_list("cidr_blocks", &cidr_blocks)
            .opt_string("display_name", vcn.display_name.clone())
            .opt_string("dns_label", vcn.dns_label.clone())
            .opt_string("vcn_domain_name", vcn.vcn_domain_name.clone())
            .opt_string("default_route_table_id", vcn.default_route_table_id.clone())
            .opt_string("default_security_list_id", vcn.default_security_list_id.clone())
            .opt_string("default_dhcp_options_id", vcn.default_dhcp_options_id.clone())
            .string_map("freeform_tags", &vcn.freeform_tags)
            .string("state", &vcn.lifecycle_state)
            .opt_string("time_created", vcn.time_created.clone())
            .keep("timeouts", source)
            .build()
    }
}

#[async_trait]
impl Resource for VcnResource {
    fn type_name(&self) -> &str {
        "oci_core_vcn"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let computed_id = |name: &str, description: &str| {
            AttributeBuilder::new(name, AttributeType::String)
                .description(description)
                .computed()
                .plan_modifier(UseStateForUnknown)
                .build()
        };

        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a virtual cloud network (VCN)")
            .attribute(computed_id("id", "The OCID of the VCN"))
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .description("The OCID of the compartment containing the VCN")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("cidr_blocks", AttributeType::list(AttributeType::String))
                    .description("IPv4 CIDR blocks of the VCN")
                    .required()
                    .validator(ListLengthValidator {
                        min: Some(1),
                        max: None,
                    })
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
                    .description("DNS label for the VCN, used with the subnet label to form host names")
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
            .attribute(computed_id("vcn_domain_name", "The VCN's domain name"))
            .attribute(computed_id(
                "default_route_table_id",
                "The OCID of the VCN's default route table",
            ))
            .attribute(computed_id(
                "default_security_list_id",
                "The OCID of the VCN's default security list",
            ))
            .attribute(computed_id(
                "default_dhcp_options_id",
                "The OCID of the VCN's default DHCP options",
            ))
            .attribute(freeform_tags_attribute())
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("The VCN's lifecycle state")
                    .computed()
                    .build(),
            )
            .attribute(computed_id("time_created", "Creation time (RFC 3339)"))
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
        let created = match client.core().create_vcn(&details).await {
            Ok(vcn) => vcn,
            Err(e) => return fail(request.planned_state, api_error("create VCN", &e)),
        };
        info!(id = %created.id, "created VCN");

        let timeouts = Timeouts::from_value(&request.planned_state, DEFAULT_TIMEOUT);
        let id = created.id.as_str();
        let waited = StateWaiter::new(format!("VCN {}", id), CREATE_STATES, timeouts.create)
            .wait_for_target(&ctx, || async move { client.core().get_vcn(id).await })
            .await;

        match waited {
            Ok(vcn) => CreateResourceResponse {
                new_state: Self::state_from(&vcn, &request.planned_state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(e) => fail(
                Self::state_from(&created, &request.planned_state),
                wait_error("wait for VCN to become available", &e),
            ),
        }
    }

    async fn read(&self, _ctx: Context, request: ReadResourceRequest) -> ReadResourceResponse {
        let mut diagnostics = vec![];

        let Some(data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics,
                private: request.private,
            };
        };

        let id = match request.current_state.get_string(&AttributePath::new("id")) {
            Ok(id) => id,
            Err(_) => {
                return ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                }
            }
        };

        match data.client.core().get_vcn(&id).await {
            Ok(vcn) if is_gone(&vcn.lifecycle_state) => {
                info!(id = %id, state = %vcn.lifecycle_state, "VCN is gone, removing from state");
                ReadResourceResponse {
                    new_state: None,
                    diagnostics,
                    private: request.private,
                }
            }
            Ok(vcn) => ReadResourceResponse {
                new_state: Some(Self::state_from(&vcn, &request.current_state)),
                diagnostics,
                private: request.private,
            },
            Err(e) if e.is_not_found() => ReadResourceResponse {
                new_state: None,
                diagnostics,
                private: request.private,
            },
            Err(e) => {
                diagnostics.push(api_error("read VCN", &e));
                ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics,
                    private: request.private,
                }
            }
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

        let details = UpdateVcnDetails {
            display_name: optional_string(&request.planned_state, "display_name"),
            freeform_tags: optional_string_map(&request.planned_state, "freeform_tags"),
        };
        let client = data.client.as_ref();
        if let Err(e) = client.core().update_vcn(&id, &details).await {
            return fail(api_error("update VCN", &e));
        }

        let timeouts = Timeouts::from_value(&request.planned_state, DEFAULT_TIMEOUT);
        let vcn_id = id.as_str();
        match StateWaiter::new(format!("VCN {}", id), UPDATE_STATES, timeouts.update)
            .wait_for_target(&ctx, || async move { client.core().get_vcn(vcn_id).await })
            .await
        {
            Ok(vcn) => UpdateResourceResponse {
                new_state: Self::state_from(&vcn, &request.planned_state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(e) => fail(wait_error("wait for VCN update", &e)),
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
        match client.core().delete_vcn(&id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete VCN", &e)],
                }
            }
        }

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        let vcn_id = id.as_str();
        let waited = StateWaiter::new(format!("VCN {}", id), DELETE_STATES, timeouts.delete)
            .deleting()
            .wait(&ctx, || async move { client.core().get_vcn(vcn_id).await })
            .await;

        DeleteResourceResponse {
            diagnostics: match waited {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for VCN deletion", &e)],
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
impl ResourceWithConfigure for VcnResource {
    async fn configure(
        &mut self,
        _ctx: Context,
        request: ConfigureResourceRequest,
    ) -> ConfigureResourceResponse {
        match extract_provider_data(request.provider_data) {
            Ok(data) => {
                self.provider_data = Some(data);
                ConfigureResourceResponse {
                    diagnostics: vec![],
                }
            }
            Err(diag) => ConfigureResourceResponse {
                diagnostics: vec![diag],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::test_support::{provider_data, state};
    use mockito::{Matcher, Server};
    use tfplug::types::Dynamic;

    const VCN_JSON: &str = r#"{
        "id": "ocid1.vcn.oc1..v1",
        "compartmentId": "ocid1.compartment.oc1..c1",
        "cidrBlocks": ["10.0.0.0/16"],
        "displayName": "main",
        "dnsLabel": "main",
        "vcnDomainName": "main.oraclevcn.com",
        "defaultRouteTableId": "ocid1.routetable.oc1..r1",
        "lifecycleState": "AVAILABLE",
        "timeCreated": "2024-01-01T00:00:00Z",
        "freeformTags": {"env": "test"}
    }"#;

    async fn configured(url: &str) -> VcnResource {
        let mut resource = VcnResource::new();
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

    fn plan() -> DynamicValue {
        state(&[
            ("id", Dynamic::Unknown),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c1")),
            ("cidr_blocks", Dynamic::List(vec![Dynamic::from("10.0.0.0/16")])),
            ("display_name", Dynamic::from("main")),
            ("dns_label", Dynamic::from("main")),
            ("freeform_tags", Dynamic::Unknown),
            ("state", Dynamic::Unknown),
            ("timeouts", Dynamic::Null),
        ])
    }

    #[tokio::test]
    async fn schema_marks_create_only_attributes() {
        let response = VcnResource::new()
            .schema(Context::new(), ResourceSchemaRequest)
            .await;
        let compartment = response.schema.attribute("compartment_id").unwrap();
        assert!(compartment.required);
        assert!(!compartment.plan_modifiers.is_empty());
        assert!(response.schema.attribute("id").unwrap().computed);
        assert!(response.schema.attribute("timeouts").unwrap().optional);
    }

    #[tokio::test]
    async fn create_waits_and_maps_state() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/20160918/vcns")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "compartmentId": "ocid1.compartment.oc1..c1",
                "cidrBlocks": ["10.0.0.0/16"],
                "dnsLabel": "main"
            })))
            .with_status(200)
            .with_body(VCN_JSON.replace("AVAILABLE", "PROVISIONING"))
            .create_async()
            .await;
        let get = server
            .mock("GET", "/20160918/vcns/ocid1.vcn.oc1..v1")
            .with_status(200)
            .with_body(VCN_JSON)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_core_vcn".to_string(),
                    planned_state: plan(),
                    config: plan(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        create.assert_async().await;
        get.assert_async().await;
        let new_state = response.new_state;
        assert_eq!(new_state.get_string(&AttributePath::new("id")).unwrap(), "ocid1.vcn.oc1..v1");
        assert_eq!(new_state.get_string(&AttributePath::new("state")).unwrap(), "AVAILABLE");
        assert_eq!(
            new_state
                .get_string(&AttributePath::new("freeform_tags").key("env"))
                .unwrap(),
            "test"
        );
    }

    #[tokio::test]
    async fn create_failure_keeps_the_created_id() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/20160918/vcns")
            .with_status(200)
            .with_body(VCN_JSON.replace("AVAILABLE", "PROVISIONING"))
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/vcns/ocid1.vcn.oc1..v1")
            .with_status(200)
            .with_body(VCN_JSON.replace("AVAILABLE", "FAULTY"))
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_core_vcn".to_string(),
                    planned_state: plan(),
                    config: plan(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("FAULTY"));
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            "ocid1.vcn.oc1..v1"
        );
    }

    #[tokio::test]
    async fn read_drops_terminated_and_missing_vcns() {
        let mut server = Server::new_async().await;
        server
            .mock("GET", "/20160918/vcns/ocid1.vcn.oc1..v1")
            .with_status(200)
            .with_body(VCN_JSON.replace("AVAILABLE", "TERMINATED"))
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/vcns/ocid1.vcn.oc1..v2")
            .with_status(404)
            .with_body(r#"{"code":"NotAuthorizedOrNotFound","message":"gone"}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        for id in ["ocid1.vcn.oc1..v1", "ocid1.vcn.oc1..v2"] {
            let response = resource
                .read(
                    Context::new(),
                    ReadResourceRequest {
                        type_name: "oci_core_vcn".to_string(),
                        current_state: state(&[("id", Dynamic::from(id))]),
                        private: vec![],
                    },
                )
                .await;
            assert!(response.diagnostics.is_empty());
            assert!(response.new_state.is_none(), "{} should be dropped", id);
        }
    }

    #[tokio::test]
    async fn delete_treats_missing_vcn_as_deleted() {
        let mut server = Server::new_async().await;
        server
            .mock("DELETE", "/20160918/vcns/ocid1.vcn.oc1..v1")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/vcns/ocid1.vcn.oc1..v1")
            .with_status(404)
            .with_body(r#"{"code":"NotAuthorizedOrNotFound","message":"gone"}"#)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "oci_core_vcn".to_string(),
                    prior_state: state(&[("id", Dynamic::from("ocid1.vcn.oc1..v1"))]),
                    planned_private: vec![],
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
    }

    #[tokio::test]
    async fn unconfigured_resource_reports_an_error() {
        let resource = VcnResource::new();
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "oci_core_vcn".to_string(),
                    prior_state: state(&[("id", Dynamic::from("ocid1.vcn.oc1..v1"))]),
                    planned_private: vec![],
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 1);
    }
}
