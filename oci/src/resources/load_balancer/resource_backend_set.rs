//! Load balancer backend set resource
//!
//! OCI addresses backend sets by load balancer and name, so the resource id
//! is the composite `loadBalancers/{id}/backendSets/{name}`. Backends are
//! managed by `oci_load_balancer_backend`; an update re-sends whatever
//! backends the set currently has.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ImportedResource,
    ReadResourceRequest, ReadResourceResponse, Resource, ResourceSchemaRequest,
    ResourceSchemaResponse, ResourceWithConfigure, UpdateResourceRequest, UpdateResourceResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{StringLengthValidator, StringOneOfValidator};
use tracing::info;

use super::backend_set_lock_key;
use crate::api::load_balancer::{
    BackendDetails, BackendSet, CreateBackendSetDetails, HealthChecker, UpdateBackendSetDetails,
};
use crate::composite_id;
use crate::lifecycle::{wait_for_work_request, WaitError};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, not_configured, partial_state, required_string,
    timeouts_attribute, wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const ID_KEYS: [&str; 2] = ["loadBalancers", "backendSets"];
/// Attributes saved alongside the id when a create does not finish.
const PARTIAL_KEEP: &[&str] = &["load_balancer_id", "name", "policy", "health_checker"];

#[derive(Default)]
pub struct BackendSetResource {
    provider_data: Option<OciProviderData>,
}

impl BackendSetResource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load balancer id and backend set name, from the attributes or the
    /// composite id after an import.
    fn address(state: &DynamicValue) -> Result<(String, String), Diagnostic> {
        if let (Ok(lb), Ok(name)) = (
            required_string(state, "load_balancer_id"),
            required_string(state, "name"),
        ) {
            return Ok((lb, name));
        }
        let id = required_string(state, "id")?;
        let mut parts = composite_id::decode(&id, &ID_KEYS)
            .map_err(|e| Diagnostic::error("Invalid backend set id", e.to_string()))?
            .into_iter();
        match (parts.next(), parts.next()) {
            (Some(lb), Some(name)) => Ok((lb, name)),
            _ => Err(Diagnostic::error("Invalid backend set id", id)),
        }
    }

    fn health_checker(plan: &DynamicValue) -> Result<HealthChecker, Diagnostic> {
        let path = AttributePath::new("health_checker");
        let string = |name: &str| plan.get_string(&path.clone().attribute(name)).ok();
        let number = |name: &str| {
            plan.get_number(&path.clone().attribute(name))
                .ok()
                .map(|n| n as i64)
        };
        let protocol = string("protocol").ok_or_else(|| {
            Diagnostic::error("Missing health checker protocol", "health_checker.protocol must be set")
                .with_attribute(path.clone().attribute("protocol"))
        })?;
        Ok(HealthChecker {
            protocol,
            port: number("port"),
            url_path: string("url_path"),
            return_code: number("return_code"),
            interval_in_millis: number("interval_ms"),
            timeout_in_millis: number("timeout_in_millis"),
            retries: number("retries"),
            response_body_regex: string("response_body_regex"),
        })
    }

    fn create_details(plan: &DynamicValue) -> Result<(String, CreateBackendSetDetails), Diagnostic> {
        let load_balancer_id = required_string(plan, "load_balancer_id")?;
        let details = CreateBackendSetDetails {
            name: required_string(plan, "name")?,
            policy: required_string(plan, "policy")?,
            health_checker: Self::health_checker(plan)?,
            backends: vec![],
        };
        Ok((load_balancer_id, details))
    }

    fn health_checker_value(checker: &HealthChecker) -> Dynamic {
        let number = |n: Option<i64>| n.map(|n| n as f64);
        StateBuilder::new()
            .string("protocol", &checker.protocol)
            .opt_number("port", number(checker.port))
            .opt_string("url_path", checker.url_path.clone())
            .opt_number("return_code", number(checker.return_code))
            .opt_number("interval_ms", number(checker.interval_in_millis))
            .opt_number("timeout_in_millis", number(checker.timeout_in_millis))
            .opt_number("retries", number(checker.retries))
            .opt_string("response_body_regex", checker.response_body_regex.clone())
            .build()
            .value
    }

    fn id(load_balancer_id: &str, name: &str) -> String {
        composite_id::encode(&[("loadBalancers", load_balancer_id), ("backendSets", name)])
    }

    fn state_from(load_balancer_id: &str, set: &BackendSet, source: &DynamicValue) -> DynamicValue {
        let backend_names: Vec<String> = set.backends.iter().map(|b| b.name.clone()).collect();
        StateBuilder::new()
            .string("id", Self::id(load_balancer_id, &set.name))
            .string("load_balancer_id", load_balancer_id)
            .string("name", &set.name)
            .string("policy", &set.policy)
            .prefer(
                "health_checker",
                source,
                Self::health_checker_value(&set.health_checker),
            )
            .string_list("backend_names", &backend_names)
            .keep("timeouts", source)
            .build()
    }
}

#[async_trait]
impl Resource for BackendSetResource {
    fn type_name(&self) -> &str {
        "oci_load_balancer_backend_set"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a backend set of a load balancer")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("loadBalancers/{load_balancer_id}/backendSets/{name}")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("load_balancer_id", AttributeType::String)
                    .description("The OCID of the load balancer")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Backend set name, unique within the load balancer")
                    .required()
                    .validator(StringLengthValidator::between(1, 32))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("policy", AttributeType::String)
                    .description("Load balancing policy")
                    .required()
                    .validator(StringOneOfValidator::new([
                        "ROUND_ROBIN",
                        "LEAST_CONNECTIONS",
                        "IP_HASH",
                    ]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "health_checker",
                    AttributeType::object([
                        ("protocol", AttributeType::String),
                        ("port", AttributeType::Number),
                        ("url_path", AttributeType::String),
                        ("return_code", AttributeType::Number),
                        ("interval_ms", AttributeType::Number),
                        ("timeout_in_millis", AttributeType::Number),
                        ("retries", AttributeType::Number),
                        ("response_body_regex", AttributeType::String),
                    ]),
                )
                .description("Health check settings; protocol is HTTP or TCP")
                .required()
                .build(),
            )
            .attribute(
                AttributeBuilder::new("backend_names", AttributeType::list(AttributeType::String))
                    .description("Names of the backends currently in the set")
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
        let fail = |diagnostic| CreateResourceResponse {
            new_state: request.planned_state.clone(),
            private: vec![],
            diagnostics: vec![diagnostic],
        };

        let Some(data) = &self.provider_data else {
            return fail(not_configured());
        };
        let plan = &request.planned_state;
        let (load_balancer_id, details) = match Self::create_details(plan) {
            Ok(details) => details,
            Err(diag) => return fail(diag),
        };

        let client = data.client.as_ref();
        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let _guard = data
            .locks
            .lock(&backend_set_lock_key(&load_balancer_id, &details.name))
            .await;

        let work_request = match client
            .load_balancer()
            .create_backend_set(&load_balancer_id, &details)
            .await
        {
            Ok(work_request) => work_request,
            Err(e) => return fail(api_error("create backend set", &e)),
        };
        let id = Self::id(&load_balancer_id, &details.name);

        if let Err(e) = wait_for_work_request(&ctx, client, &work_request, timeouts.create).await {
            let new_state = match &e {
                WaitError::WorkRequestFailed { .. } => request.planned_state.clone(),
                _ => partial_state(&id, plan, PARTIAL_KEEP),
            };
            return CreateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![wait_error("wait for backend set creation", &e)],
            };
        }

        match client
            .load_balancer()
            .get_backend_set(&load_balancer_id, &details.name)
            .await
        {
            Ok(set) => {
                info!(load_balancer = %load_balancer_id, name = %set.name, "created backend set");
                CreateResourceResponse {
                    new_state: Self::state_from(&load_balancer_id, &set, plan),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(e) => CreateResourceResponse {
                new_state: partial_state(&id, plan, PARTIAL_KEEP),
                private: vec![],
                diagnostics: vec![api_error("read backend set", &e)],
            },
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
        let (load_balancer_id, name) = match Self::address(&request.current_state) {
            Ok(address) => address,
            Err(diag) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![diag],
                    private: request.private,
                }
            }
        };

        match data
            .client
            .load_balancer()
            .get_backend_set(&load_balancer_id, &name)
            .await
        {
            Ok(set) => ReadResourceResponse {
                new_state: Some(Self::state_from(&load_balancer_id, &set, &request.current_state)),
                diagnostics: vec![],
                private: request.private,
            },
            Err(e) if e.is_not_found() => ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
                private: request.private,
            },
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![api_error("read backend set", &e)],
                private: request.private,
            },
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
        let plan = &request.planned_state;
        let (load_balancer_id, name) = match Self::address(&request.prior_state) {
            Ok(address) => address,
            Err(diag) => return fail(diag),
        };
        let policy = match required_string(plan, "policy") {
            Ok(policy) => policy,
            Err(diag) => return fail(diag),
        };
        let health_checker = match Self::health_checker(plan) {
            Ok(checker) => checker,
            Err(diag) => return fail(diag),
        };

        let client = data.client.as_ref();
        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let _guard = data
            .locks
            .lock(&backend_set_lock_key(&load_balancer_id, &name))
            .await;

        let result = async {
            // The update replaces the backend list, so send the current one.
            let current = client
                .load_balancer()
                .get_backend_set(&load_balancer_id, &name)
                .await
                .map_err(|e| api_error("read backend set", &e))?;
            let details = UpdateBackendSetDetails {
                policy,
                health_checker,
                backends: current.backends.iter().map(BackendDetails::from).collect(),
            };
            let work_request = client
                .load_balancer()
                .update_backend_set(&load_balancer_id, &name, &details)
                .await
                .map_err(|e| api_error("update backend set", &e))?;
            wait_for_work_request(&ctx, client, &work_request, timeouts.update)
                .await
                .map_err(|e| wait_error("wait for backend set update", &e))?;
            client
                .load_balancer()
                .get_backend_set(&load_balancer_id, &name)
                .await
                .map_err(|e| api_error("read backend set", &e))
        }
        .await;

        match result {
            Ok(set) => UpdateResourceResponse {
                new_state: Self::state_from(&load_balancer_id, &set, plan),
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
        let (load_balancer_id, name) = match Self::address(&request.prior_state) {
            Ok(address) => address,
            Err(diag) => return DeleteResourceResponse { diagnostics: vec![diag] },
        };

        let client = data.client.as_ref();
        let _guard = data
            .locks
            .lock(&backend_set_lock_key(&load_balancer_id, &name))
            .await;
        let work_request = match client
            .load_balancer()
            .delete_backend_set(&load_balancer_id, &name)
            .await
        {
            Ok(work_request) => work_request,
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete backend set", &e)],
                }
            }
        };

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        DeleteResourceResponse {
            diagnostics: match wait_for_work_request(&ctx, client, &work_request, timeouts.delete).await {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for backend set deletion", &e)],
            },
        }
    }

    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        match composite_id::decode(&request.id, &ID_KEYS) {
            Ok(parts) => {
                let state = StateBuilder::new()
                    .string("id", &request.id)
                    .string("load_balancer_id", &parts[0])
                    .string("name", &parts[1])
                    .build();
                ImportResourceStateResponse {
                    imported_resources: vec![ImportedResource {
                        type_name: request.type_name,
                        state,
                        private: vec![],
                    }],
                    diagnostics: vec![],
                }
            }
            Err(e) => ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![Diagnostic::error(
                    "Invalid import ID",
                    format!("Expected loadBalancers/{{id}}/backendSets/{{name}}: {}", e),
                )],
            },
        }
    }
}

#[async_trait]
impl ResourceWithConfigure for BackendSetResource {
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
