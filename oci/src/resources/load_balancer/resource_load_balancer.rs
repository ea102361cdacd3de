//! Load balancer resource

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
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::ListLengthValidator;
use tracing::{debug, info};

use crate::api::load_balancer::{
    CreateLoadBalancerDetails, LoadBalancer, ShapeDetails, UpdateLoadBalancerDetails,
    UpdateLoadBalancerShapeDetails,
};
use crate::api::Client;
use crate::lifecycle::{wait_for_work_request, LifecycleStates, StateWaiter, WaitError};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, freeform_tags_attribute, is_gone, not_configured,
    optional_bool, optional_string, optional_string_list, optional_string_map, partial_state,
    required_string, timeouts_attribute, wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const ACTIVE_STATES: LifecycleStates = LifecycleStates::new(&["CREATING"], &["ACTIVE"]);
/// Attributes saved alongside the id when a create does not finish.
const PARTIAL_KEEP: &[&str] = &["compartment_id", "display_name", "shape", "subnet_ids"];

#[derive(Default)]
pub struct LoadBalancerResource {
    provider_data: Option<OciProviderData>,
}

impl LoadBalancerResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn shape_details(plan: &DynamicValue) -> Option<ShapeDetails> {
        let path = AttributePath::new("shape_details");
        let minimum = plan
            .get_number(&path.clone().attribute("minimum_bandwidth_in_mbps"))
            .ok()?;
        let maximum = plan
            .get_number(&path.attribute("maximum_bandwidth_in_mbps"))
            .ok()?;
        Some(ShapeDetails {
            minimum_bandwidth_in_mbps: minimum as i64,
            maximum_bandwidth_in_mbps: maximum as i64,
        })
    }

    fn create_details(plan: &DynamicValue) -> Result<CreateLoadBalancerDetails, Diagnostic> {
        Ok(CreateLoadBalancerDetails {
            compartment_id: required_string(plan, "compartment_id")?,
            display_name: required_string(plan, "display_name")?,
            shape_name: required_string(plan, "shape")?,
            shape_details: Self::shape_details(plan),
            subnet_ids: optional_string_list(plan, "subnet_ids").unwrap_or_default(),
            is_private: optional_bool(plan, "is_private"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        })
    }

    fn state_from(lb: &LoadBalancer, source: &DynamicValue) -> DynamicValue {
        let shape_details = lb
            .shape_details
            .as_ref()
            .map(|details| {
                StateBuilder::new()
                    .number("minimum_bandwidth_in_mbps", details.minimum_bandwidth_in_mbps as f64)
                    .number("maximum_bandwidth_in_mbps", details.maximum_bandwidth_in_mbps as f64)
                    .build()
                    .value
            })
            .unwrap_or(Dynamic::Null);
        let ip_addresses: Vec<String> = lb
            .ip_addresses
            .iter()
            .map(|ip| ip.ip_address.clone())
            .collect();

        StateBuilder::new()
            .string("id", &lb.id)
            .string("compartment_id", &lb.compartment_id)
            .string("display_name", &lb.display_name)
            .string("shape", &lb.shape_name)
            .value("shape_details", shape_details)
            .string_list("subnet_ids", &lb.subnet_ids)
            .opt_bool("is_private", lb.is_private)
            .string_list("ip_addresses", &ip_addresses)
            .string_map("freeform_tags", &lb.freeform_tags)
            .string("state", &lb.lifecycle_state)
            .opt_string("time_created", lb.time_created.clone())
            .keep("timeouts", source)
            .build()
    }

    /// Re-read the load balancer once it is `ACTIVE`.
    async fn wait_active(
        ctx: &Context,
        client: &Client,
        id: &str,
        timeout: std::time::Duration,
    ) -> Result<LoadBalancer, Diagnostic> {
        StateWaiter::new(format!("load balancer {}", id), ACTIVE_STATES, timeout)
            .wait_for_target(ctx, || async move {
                client.load_balancer().get_load_balancer(id).await
            })
            .await
            .map_err(|e| wait_error("wait for load balancer", &e))
    }
}

#[async_trait]
impl Resource for LoadBalancerResource {
    fn type_name(&self) -> &str {
        "oci_load_balancer_load_balancer"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a load balancer")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The OCID of the load balancer")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .description("The OCID of the compartment")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("display_name", AttributeType::String)
                    .description("A user-friendly name")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("shape", AttributeType::String)
                    .description("Shape name, e.g. \"flexible\"")
                    .required()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "shape_details",
                    AttributeType::object([
                        ("minimum_bandwidth_in_mbps", AttributeType::Number),
                        ("maximum_bandwidth_in_mbps", AttributeType::Number),
                    ]),
                )
                .description("Bandwidth bounds for the flexible shape")
                .optional()
                .build(),
            )
            .attribute(
                AttributeBuilder::new("subnet_ids", AttributeType::list(AttributeType::String))
                    .description("Subnets to place the load balancer in")
                    .required()
                    .validator(ListLengthValidator {
                        min: Some(1),
                        max: Some(2),
                    })
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("is_private", AttributeType::Bool)
                    .description("Whether the load balancer only has a private IP")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ip_addresses", AttributeType::list(AttributeType::String))
                    .description("Addresses assigned to the load balancer")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(freeform_tags_attribute())
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("The load balancer's lifecycle state")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("time_created", AttributeType::String)
                    .description("Creation time (RFC 3339)")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
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
        let work_request_id = match client.load_balancer().create_load_balancer(&details).await {
            Ok(id) => id,
            Err(e) => return fail(request.planned_state, api_error("create load balancer", &e)),
        };
        info!(work_request = %work_request_id, "load balancer creation accepted");

        let timeouts = Timeouts::from_value(&request.planned_state, DEFAULT_TIMEOUT);
        let work_request =
            match wait_for_work_request(&ctx, client, &work_request_id, timeouts.create).await {
                Ok(work_request) => work_request,
                Err(e @ WaitError::WorkRequestFailed { .. }) => {
                    return fail(
                        request.planned_state,
                        wait_error("wait for load balancer creation", &e),
                    )
                }
                Err(e) => {
                    let diag = wait_error("wait for load balancer creation", &e);
                    // The work request names the load balancer even while it
                    // is still being built.
                    let state = match client.load_balancer().get_work_request(&work_request_id).await {
                        Ok(work_request) if !work_request.load_balancer_id.is_empty() => {
                            partial_state(&work_request.load_balancer_id, &request.planned_state, PARTIAL_KEEP)
                        }
                        Ok(_) => request.planned_state,
                        Err(e) => {
                            debug!(work_request = %work_request_id, error = %e, "could not look up the new load balancer id");
                            request.planned_state
                        }
                    };
                    return fail(state, diag);
                }
            };

        let id = work_request.load_balancer_id;
        match Self::wait_active(&ctx, client, &id, timeouts.create).await {
            Ok(lb) => CreateResourceResponse {
                new_state: Self::state_from(&lb, &request.planned_state),
                private: vec![],
                diagnostics: vec![],
            },
            Err(diag) => fail(partial_state(&id, &request.planned_state, PARTIAL_KEEP), diag),
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

        let (new_state, diagnostics) = match data.client.load_balancer().get_load_balancer(&id).await {
            Ok(lb) if is_gone(&lb.lifecycle_state) => (None, vec![]),
            Ok(lb) => (Some(Self::state_from(&lb, &request.current_state)), vec![]),
            Err(e) if e.is_not_found() => (None, vec![]),
            Err(e) => (
                Some(request.current_state),
                vec![api_error("read load balancer", &e)],
            ),
        };
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

        let plan = &request.planned_state;
        let prior = &request.prior_state;
        let changed =
            |name: &str| plan.get(&AttributePath::new(name)) != prior.get(&AttributePath::new(name));
        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let client = data.client.as_ref();

        let result = async {
            if changed("display_name") || changed("freeform_tags") {
                let details = UpdateLoadBalancerDetails {
                    display_name: optional_string(plan, "display_name"),
                    freeform_tags: optional_string_map(plan, "freeform_tags"),
                };
                let work_request = client
                    .load_balancer()
                    .update_load_balancer(&id, &details)
                    .await
                    .map_err(|e| api_error("update load balancer", &e))?;
                wait_for_work_request(&ctx, client, &work_request, timeouts.update)
                    .await
                    .map_err(|e| wait_error("wait for load balancer update", &e))?;
            }

            if changed("shape") || changed("shape_details") {
                let details = UpdateLoadBalancerShapeDetails {
                    shape_name: required_string(plan, "shape")?,
                    shape_details: Self::shape_details(plan),
                };
                let work_request = client
                    .load_balancer()
                    .update_load_balancer_shape(&id, &details)
                    .await
                    .map_err(|e| api_error("update load balancer shape", &e))?;
                info!(id = %id, shape = %details.shape_name, "changing load balancer shape");
                wait_for_work_request(&ctx, client, &work_request, timeouts.update)
                    .await
                    .map_err(|e| wait_error("wait for load balancer shape update", &e))?;
            }

            Self::wait_active(&ctx, client, &id, timeouts.update).await
        }
        .await;

        match result {
            Ok(lb) => UpdateResourceResponse {
                new_state: Self::state_from(&lb, plan),
                private: vec![],
                diagnostics: vec![],
            },
            Err(diag) => fail(diag),
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
        let work_request = match client.load_balancer().delete_load_balancer(&id).await {
            Ok(work_request) => work_request,
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete load balancer", &e)],
                }
            }
        };

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        DeleteResourceResponse {
            diagnostics: match wait_for_work_request(&ctx, client, &work_request, timeouts.delete).await {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for load balancer deletion", &e)],
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
impl ResourceWithConfigure for LoadBalancerResource {
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

    const LB_ID: &str = "ocid1.loadbalancer.oc1..lb1";

    fn lb_json() -> String {
        serde_json::json!({
            "id": LB_ID,
            "compartmentId": "ocid1.compartment.oc1..c1",
            "displayName": "edge",
            "shapeName": "flexible",
            "shapeDetails": {"minimumBandwidthInMbps": 10, "maximumBandwidthInMbps": 100},
            "ipAddresses": [{"ipAddress": "203.0.113.10", "isPublic": true}],
            "subnetIds": ["ocid1.subnet.oc1..s1"],
            "isPrivate": false,
            "lifecycleState": "ACTIVE"
        })
        .to_string()
    }

    fn work_request_json(id: &str) -> String {
        serde_json::json!({
            "id": id,
            "loadBalancerId": LB_ID,
            "type": "CreateLoadBalancer",
            "lifecycleState": "SUCCEEDED"
        })
        .to_string()
    }

    async fn configured(url: &str) -> LoadBalancerResource {
        let mut resource = LoadBalancerResource::new();
        resource
            .configure(
                Context::new(),
                ConfigureResourceRequest {
                    provider_data: Some(provider_data(url)),
                },
            )
            .await;
        resource
    }

    fn planned() -> DynamicValue {
        state(&[
            ("id", Dynamic::Unknown),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c1")),
            ("display_name", Dynamic::from("edge")),
            ("shape", Dynamic::from("flexible")),
            (
                "shape_details",
                state(&[
                    ("minimum_bandwidth_in_mbps", Dynamic::Number(10.0)),
                    ("maximum_bandwidth_in_mbps", Dynamic::Number(100.0)),
                ])
                .value,
            ),
            ("subnet_ids", Dynamic::List(vec![Dynamic::from("ocid1.subnet.oc1..s1")])),
            ("is_private", Dynamic::Unknown),
            ("ip_addresses", Dynamic::Unknown),
        ])
    }

    #[tokio::test]
    async fn create_follows_the_work_request() {
        let mut server = Server::new_async().await;
        let create = server
            .mock("POST", "/20170115/loadBalancers")
            .match_body(Matcher::PartialJson(serde_json::json!({
                "shapeName": "flexible",
                "shapeDetails": {"minimumBandwidthInMbps": 10, "maximumBandwidthInMbps": 100}
            })))
            .with_status(204)
            .with_header("opc-work-request-id", "wr1")
            .create_async()
            .await;
        let work_request = server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr1")
            .with_status(200)
            .with_body(work_request_json("wr1"))
            .create_async()
            .await;
        server
            .mock("GET", "/20170115/loadBalancers/ocid1.loadbalancer.oc1..lb1")
            .with_status(200)
            .with_body(lb_json())
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_load_balancer_load_balancer".to_string(),
                    planned_state: planned(),
                    config: planned(),
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        create.assert_async().await;
        work_request.assert_async().await;
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            LB_ID
        );
        assert_eq!(
            response
                .new_state
                .get_string_list(&AttributePath::new("ip_addresses"))
                .unwrap(),
            vec!["203.0.113.10"]
        );
    }

    #[tokio::test]
    async fn failed_work_request_is_reported() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/20170115/loadBalancers")
            .with_status(204)
            .with_header("opc-work-request-id", "wr1")
            .create_async()
            .await;
        server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr1")
            .with_status(200)
            .with_body(
                serde_json::json!({
                    "id": "wr1",
                    "loadBalancerId": LB_ID,
                    "lifecycleState": "FAILED",
                    "errorDetails": [{"errorCode": "BAD_INPUT", "message": "subnet is full"}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_load_balancer_load_balancer".to_string(),
                    planned_state: planned(),
                    config: planned(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("subnet is full"));
        assert!(response.new_state.get_string(&AttributePath::new("id")).is_err());
    }

    #[tokio::test]
    async fn interrupted_create_keeps_the_load_balancer_id() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/20170115/loadBalancers")
            .with_status(204)
            .with_header("opc-work-request-id", "wr1")
            .create_async()
            .await;
        let lookup = server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr1")
            .with_status(200)
            .with_body(work_request_json("wr1").replace("SUCCEEDED", "IN_PROGRESS"))
            .expect(1)
            .create_async()
            .await;

        let ctx = Context::new();
        ctx.cancel();
        let resource = configured(&server.url()).await;
        let response = resource
            .create(
                ctx,
                CreateResourceRequest {
                    type_name: "oci_load_balancer_load_balancer".to_string(),
                    planned_state: planned(),
                    config: planned(),
                    planned_private: vec![],
                },
            )
            .await;

        assert_eq!(response.diagnostics.len(), 1);
        assert!(response.diagnostics[0].detail.contains("cancelled"));
        lookup.assert_async().await;
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("id")).unwrap(),
            LB_ID
        );
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("display_name")).unwrap(),
            "edge"
        );
    }

    #[tokio::test]
    async fn unchanged_shape_skips_the_shape_update() {
        let mut server = Server::new_async().await;
        let update = server
            .mock("PUT", "/20170115/loadBalancers/ocid1.loadbalancer.oc1..lb1")
            .match_body(Matcher::PartialJson(serde_json::json!({"displayName": "edge"})))
            .with_status(204)
            .with_header("opc-work-request-id", "wr2")
            .create_async()
            .await;
        let shape = server
            .mock("PUT", "/20170115/loadBalancers/ocid1.loadbalancer.oc1..lb1/updateShape")
            .expect(0)
            .create_async()
            .await;
        server
            .mock("GET", "/20170115/loadBalancerWorkRequests/wr2")
            .with_status(200)
            .with_body(work_request_json("wr2"))
            .create_async()
            .await;
        server
            .mock("GET", "/20170115/loadBalancers/ocid1.loadbalancer.oc1..lb1")
            .with_status(200)
            .with_body(lb_json())
            .create_async()
            .await;

        let mut prior = planned();
        prior.set_string(&AttributePath::new("id"), LB_ID).unwrap();
        prior
            .set_string(&AttributePath::new("display_name"), "old")
            .unwrap();
        let mut plan = prior.clone();
        plan.set_string(&AttributePath::new("display_name"), "edge")
            .unwrap();

        let resource = configured(&server.url()).await;
        let response = resource
            .update(
                Context::new(),
                UpdateResourceRequest {
                    type_name: "oci_load_balancer_load_balancer".to_string(),
                    prior_state: prior,
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        update.assert_async().await;
        shape.assert_async().await;
    }
}
