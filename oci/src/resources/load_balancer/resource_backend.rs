//! Load balancer backend resource

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
use tfplug::types::{Diagnostic, DynamicValue};
use tfplug::validator::NumberRangeValidator;
use tracing::{debug, info};

use super::backend_set_lock_key;
use crate::api::load_balancer::{Backend, BackendDetails, UpdateBackendDetails};
use crate::composite_id;
use crate::lifecycle::{wait_for_work_request, WaitError};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, not_configured, optional_bool, optional_i64,
    required_string, timeouts_attribute, wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const ID_KEYS: [&str; 3] = ["loadBalancers", "backendSets", "backends"];

/// Where a backend lives: load balancer, backend set and backend name.
#[derive(Debug, Clone, PartialEq)]
struct BackendAddress {
    load_balancer_id: String,
    backend_set_name: String,
    name: String,
}

impl BackendAddress {
    fn from_state(state: &DynamicValue) -> Result<Self, Diagnostic> {
        if let (Ok(load_balancer_id), Ok(backend_set_name), Ok(name)) = (
            required_string(state, "load_balancer_id"),
            required_string(state, "backendset_name"),
            required_string(state, "name"),
        ) {
            return Ok(Self {
                load_balancer_id,
                backend_set_name,
                name,
            });
        }
        Self::from_id(&required_string(state, "id")?)
    }

    fn from_id(id: &str) -> Result<Self, Diagnostic> {
        let parts = composite_id::decode(id, &ID_KEYS)
            .map_err(|e| Diagnostic::error("Invalid backend id", e.to_string()))?;
        match parts.as_slice() {
            [load_balancer_id, backend_set_name, name] => Ok(Self {
                load_balancer_id: load_balancer_id.clone(),
                backend_set_name: backend_set_name.clone(),
                name: name.clone(),
            }),
            _ => Err(Diagnostic::error("Invalid backend id", id)),
        }
    }

    fn id(&self) -> String {
        composite_id::encode(&[
            ("loadBalancers", self.load_balancer_id.as_str()),
            ("backendSets", self.backend_set_name.as_str()),
            ("backends", self.name.as_str()),
        ])
    }

    fn lock_key(&self) -> String {
        backend_set_lock_key(&self.load_balancer_id, &self.backend_set_name)
    }
}

#[derive(Default)]
pub struct BackendResource {
    provider_data: Option<OciProviderData>,
}

impl BackendResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_from(address: &BackendAddress, backend: &Backend, source: &DynamicValue) -> DynamicValue {
        StateBuilder::new()
            .string("id", address.id())
            .string("load_balancer_id", &address.load_balancer_id)
            .string("backendset_name", &address.backend_set_name)
            .string("name", &backend.name)
            .string("ip_address", &backend.ip_address)
            .number("port", backend.port as f64)
            .number("weight", backend.weight.unwrap_or(1) as f64)
            .bool("backup", backend.backup)
            .bool("drain", backend.drain)
            .bool("offline", backend.offline)
            .keep("timeouts", source)
            .build()
    }

    /// State for a backend OCI accepted but did not finish creating.
    fn partial_state(address: &BackendAddress, plan: &DynamicValue) -> DynamicValue {
        StateBuilder::new()
            .string("id", address.id())
            .string("load_balancer_id", &address.load_balancer_id)
            .string("backendset_name", &address.backend_set_name)
            .string("name", &address.name)
            .keep("ip_address", plan)
            .keep("port", plan)
            .keep("timeouts", plan)
            .build()
    }

    /// Plan value, then prior state, then the API default.
    fn update_details(plan: &DynamicValue, prior: &DynamicValue) -> UpdateBackendDetails {
        let flag = |name: &str| {
            optional_bool(plan, name)
                .or_else(|| optional_bool(prior, name))
                .unwrap_or(false)
        };
        UpdateBackendDetails {
            weight: optional_i64(plan, "weight")
                .or_else(|| optional_i64(prior, "weight"))
                .unwrap_or(1),
            backup: flag("backup"),
            drain: flag("drain"),
            offline: flag("offline"),
        }
    }

    async fn get(&self, data: &OciProviderData, address: &BackendAddress) -> Result<Backend, Diagnostic> {
        data.client
            .load_balancer()
            .get_backend(&address.load_balancer_id, &address.backend_set_name, &address.name)
            .await
            .map_err(|e| api_error("read backend", &e))
    }
}

#[async_trait]
impl Resource for BackendResource {
    fn type_name(&self) -> &str {
        "oci_load_balancer_backend"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages a backend server within a load balancer backend set")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("load_balancer_id", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("backendset_name", AttributeType::String)
                    .description("Name of the backend set the backend belongs to")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("ip_address", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("port", AttributeType::Number)
                    .required()
                    .validator(NumberRangeValidator::between(1.0, 65535.0))
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("ip_address:port, assigned by the service")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("weight", AttributeType::Number)
                    .description("Share of traffic for weighted round robin")
                    .optional()
                    .computed()
                    .validator(NumberRangeValidator::between(1.0, 100.0))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("backup", AttributeType::Bool)
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("drain", AttributeType::Bool)
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("offline", AttributeType::Bool)
                    .optional()
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
        let fields = (
            required_string(plan, "load_balancer_id"),
            required_string(plan, "backendset_name"),
            required_string(plan, "ip_address"),
            optional_i64(plan, "port"),
        );
        let (load_balancer_id, backend_set_name, ip_address, port) = match fields {
            (Ok(lb), Ok(set), Ok(ip), Some(port)) => (lb, set, ip, port),
            (Err(diag), ..) | (_, Err(diag), ..) | (_, _, Err(diag), _) => return fail(diag),
            (.., None) => return fail(Diagnostic::error("Missing port", "port must be set")),
        };

        let address = BackendAddress {
            load_balancer_id,
            backend_set_name,
            // OCI names backends after their endpoint.
            name: format!("{}:{}", ip_address, port),
        };
        let details = BackendDetails {
            ip_address,
            port,
            weight: optional_i64(plan, "weight"),
            backup: optional_bool(plan, "backup"),
            drain: optional_bool(plan, "drain"),
            offline: optional_bool(plan, "offline"),
        };

        let client = data.client.as_ref();
        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let _guard = data.locks.lock(&address.lock_key()).await;
        debug!(backend = %address.name, lock = %address.lock_key(), "acquired backend set lock");

        let work_request = match client
            .load_balancer()
            .create_backend(&address.load_balancer_id, &address.backend_set_name, &details)
            .await
        {
            Ok(work_request) => work_request,
            Err(e) => return fail(api_error("create backend", &e)),
        };

        if let Err(e) = wait_for_work_request(&ctx, client, &work_request, timeouts.create).await {
            let new_state = match &e {
                WaitError::WorkRequestFailed { .. } => request.planned_state.clone(),
                _ => Self::partial_state(&address, plan),
            };
            return CreateResourceResponse {
                new_state,
                private: vec![],
                diagnostics: vec![wait_error("wait for backend creation", &e)],
            };
        }

        match self.get(data, &address).await {
            Ok(backend) => {
                info!(backend = %backend.name, backend_set = %address.backend_set_name, "created backend");
                CreateResourceResponse {
                    new_state: Self::state_from(&address, &backend, plan),
                    private: vec![],
                    diagnostics: vec![],
                }
            }
            Err(diag) => CreateResourceResponse {
                new_state: Self::partial_state(&address, plan),
                private: vec![],
                diagnostics: vec![diag],
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
        let address = match BackendAddress::from_state(&request.current_state) {
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
            .get_backend(&address.load_balancer_id, &address.backend_set_name, &address.name)
            .await
        {
            Ok(backend) => ReadResourceResponse {
                new_state: Some(Self::state_from(&address, &backend, &request.current_state)),
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
                diagnostics: vec![api_error("read backend", &e)],
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
        let address = match BackendAddress::from_state(&request.prior_state) {
            Ok(address) => address,
            Err(diag) => return fail(diag),
        };
        let plan = &request.planned_state;
        let details = Self::update_details(plan, &request.prior_state);

        let client = data.client.as_ref();
        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let _guard = data.locks.lock(&address.lock_key()).await;

        let result = async {
            let work_request = client
                .load_balancer()
                .update_backend(
                    &address.load_balancer_id,
                    &address.backend_set_name,
                    &address.name,
                    &details,
                )
                .await
                .map_err(|e| api_error("update backend", &e))?;
            wait_for_work_request(&ctx, client, &work_request, timeouts.update)
                .await
                .map_err(|e| wait_error("wait for backend update", &e))?;
            self.get(data, &address).await
        }
        .await;

        match result {
            Ok(backend) => UpdateResourceResponse {
                new_state: Self::state_from(&address, &backend, plan),
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
        let address = match BackendAddress::from_state(&request.prior_state) {
            Ok(address) => address,
            Err(diag) => return DeleteResourceResponse { diagnostics: vec![diag] },
        };

        let client = data.client.as_ref();
        let _guard = data.locks.lock(&address.lock_key()).await;
        let work_request = match client
            .load_balancer()
            .delete_backend(&address.load_balancer_id, &address.backend_set_name, &address.name)
            .await
        {
            Ok(work_request) => work_request,
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete backend", &e)],
                }
            }
        };

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        let diagnostics = match wait_for_work_request(&ctx, client, &work_request, timeouts.delete).await {
            Ok(_) => vec![],
            Err(e) => vec![wait_error("wait for backend deletion", &e)],
        };
        DeleteResourceResponse { diagnostics }
    }

    async fn import_state(
        &self,
        _ctx: Context,
        request: ImportResourceStateRequest,
    ) -> ImportResourceStateResponse {
        match BackendAddress::from_id(&request.id) {
            Ok(address) => ImportResourceStateResponse {
                imported_resources: vec![ImportedResource {
                    type_name: request.type_name,
                    state: StateBuilder::new()
                        .string("id", &request.id)
                        .string("load_balancer_id", &address.load_balancer_id)
                        .string("backendset_name", &address.backend_set_name)
                        .string("name", &address.name)
                        .build(),
                    private: vec![],
                }],
                diagnostics: vec![],
            },
            Err(diag) => ImportResourceStateResponse {
                imported_resources: vec![],
                diagnostics: vec![diag],
            },
        }
    }
}

#[async_trait]
impl ResourceWithConfigure for BackendResource {
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
