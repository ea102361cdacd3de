//! gRPC service implementation of the Terraform Plugin Protocol v6
//!
//! Resources and data sources are created on demand from the provider's
//! factories, configured with the provider data and dropped after the call.
//! Schemas are collected once and cached for validation and planning.

use crate::context::Context;
use crate::data_source::{
    ConfigureDataSourceRequest, DataSourceSchemaRequest, DataSourceWithConfigure,
    ReadDataSourceRequest, ValidateDataSourceConfigRequest,
};
use crate::error::TfplugError;
use crate::plan_modifier::{values_equal, PlanModifyRequest};
use crate::proto;
use crate::provider::{
    ConfigureProviderRequest, DataSourceFactory, Provider, ProviderSchemaRequest, ResourceFactory,
    StopProviderRequest, ValidateProviderConfigRequest,
};
use crate::resource::{
    ConfigureResourceRequest, CreateResourceRequest, DeleteResourceRequest,
    ImportResourceStateRequest, ReadResourceRequest, ResourceSchemaRequest, ResourceWithConfigure,
    UpdateResourceRequest, ValidateResourceConfigRequest,
};
use crate::schema::Schema;
use crate::types::{
    has_errors, AttributePath, AttributePathStep, Diagnostic, DiagnosticSeverity, Dynamic,
    DynamicValue,
};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tonic::{Request, Response, Status};
use tracing::{debug, info, warn};

type ProviderData = Option<Arc<dyn Any + Send + Sync>>;

static NULL: Dynamic = Dynamic::Null;

struct Schemas {
    provider: Schema,
    resources: HashMap<String, Schema>,
    data_sources: HashMap<String, Schema>,
}

pub struct ProviderService<P: Provider> {
    provider: Arc<RwLock<P>>,
    resources: Arc<HashMap<String, ResourceFactory>>,
    data_sources: Arc<HashMap<String, DataSourceFactory>>,
    provider_data: Arc<RwLock<ProviderData>>,
    schemas: Arc<OnceCell<Schemas>>,
    root: Context,
}

impl<P: Provider + 'static> ProviderService<P> {
    pub fn new(provider: P) -> Self {
        Self::with_context(provider, Context::new())
    }

    /// Build the service around a root context; cancelling it cancels every
    /// in-flight call.
    pub fn with_context(provider: P, root: Context) -> Self {
        let resources = provider.resources();
        let data_sources = provider.data_sources();
        Self {
            provider: Arc::new(RwLock::new(provider)),
            resources: Arc::new(resources),
            data_sources: Arc::new(data_sources),
            provider_data: Arc::new(RwLock::new(None)),
            schemas: Arc::new(OnceCell::new()),
            root,
        }
    }

    pub fn root_context(&self) -> Context {
        self.root.clone()
    }

    async fn schemas(&self) -> &Schemas {
        self.schemas
            .get_or_init(|| async {
                let ctx = self.root.child_context();

                let provider = self
                    .provider
                    .read()
                    .await
                    .schema(ctx.clone(), ProviderSchemaRequest)
                    .await
                    .schema;

                let mut resources = HashMap::new();
                for (name, factory) in self.resources.iter() {
                    let response = factory().schema(ctx.clone(), ResourceSchemaRequest).await;
                    resources.insert(name.clone(), response.schema);
                }

                let mut data_sources = HashMap::new();
                for (name, factory) in self.data_sources.iter() {
                    let response = factory().schema(ctx.clone(), DataSourceSchemaRequest).await;
                    data_sources.insert(name.clone(), response.schema);
                }

                Schemas {
                    provider,
                    resources,
                    data_sources,
                }
            })
            .await
    }

    async fn resource_schema(&self, type_name: &str) -> Result<&Schema, Status> {
        self.schemas()
            .await
            .resources
            .get(type_name)
            .ok_or_else(|| TfplugError::ResourceNotFound(type_name.to_string()).into())
    }

    async fn data_source_schema(&self, type_name: &str) -> Result<&Schema, Status> {
        self.schemas()
            .await
            .data_sources
            .get(type_name)
            .ok_or_else(|| TfplugError::DataSourceNotFound(type_name.to_string()).into())
    }

    /// Instantiate and configure a resource. Configure diagnostics are
    /// returned alongside so the caller can stop on errors.
    async fn resource(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<(Box<dyn ResourceWithConfigure>, Vec<Diagnostic>), Status> {
        let factory = self
            .resources
            .get(type_name)
            .ok_or_else(|| Status::from(TfplugError::ResourceNotFound(type_name.to_string())))?;
        let mut resource = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = resource
            .configure(ctx.clone(), ConfigureResourceRequest { provider_data })
            .await;
        Ok((resource, response.diagnostics))
    }

    async fn data_source(
        &self,
        ctx: &Context,
        type_name: &str,
    ) -> Result<(Box<dyn DataSourceWithConfigure>, Vec<Diagnostic>), Status> {
        let factory = self
            .data_sources
            .get(type_name)
            .ok_or_else(|| Status::from(TfplugError::DataSourceNotFound(type_name.to_string())))?;
        let mut data_source = factory();
        let provider_data = self.provider_data.read().await.clone();
        let response = data_source
            .configure(ctx.clone(), ConfigureDataSourceRequest { provider_data })
            .await;
        Ok((data_source, response.diagnostics))
    }
}

#[tonic::async_trait]
impl<P: Provider + 'static> proto::ProtoProvider for ProviderService<P> {
    async fn get_metadata(
        &self,
        _request: Request<proto::get_metadata::Request>,
    ) -> Result<Response<proto::get_metadata::Response>, Status> {
        let mut resources: Vec<_> = self.resources.keys().cloned().collect();
        resources.sort();
        let mut data_sources: Vec<_> = self.data_sources.keys().cloned().collect();
        data_sources.sort();

        Ok(Response::new(proto::get_metadata::Response {
            server_capabilities: Some(server_capabilities()),
            diagnostics: vec![],
            data_sources: data_sources
                .into_iter()
                .map(|type_name| proto::get_metadata::DataSourceMetadata { type_name })
                .collect(),
            resources: resources
                .into_iter()
                .map(|type_name| proto::get_metadata::ResourceMetadata { type_name })
                .collect(),
        }))
    }

    async fn get_provider_schema(
        &self,
        _request: Request<proto::get_provider_schema::Request>,
    ) -> Result<Response<proto::get_provider_schema::Response>, Status> {
        let schemas = self.schemas().await;

        Ok(Response::new(proto::get_provider_schema::Response {
            provider: Some(schema_to_proto(&schemas.provider)),
            resource_schemas: schemas
                .resources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            data_source_schemas: schemas
                .data_sources
                .iter()
                .map(|(name, schema)| (name.clone(), schema_to_proto(schema)))
                .collect(),
            diagnostics: vec![],
            provider_meta: None,
            server_capabilities: Some(server_capabilities()),
        }))
    }

    async fn validate_provider_config(
        &self,
        request: Request<proto::validate_provider_config::Request>,
    ) -> Result<Response<proto::validate_provider_config::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;
        let schemas = self.schemas().await;

        let mut diagnostics = validate_config(&schemas.provider, &config.value);
        if !has_errors(&diagnostics) {
            let response = self
                .provider
                .read()
                .await
                .validate(
                    self.root.child_context(),
                    ValidateProviderConfigRequest { config },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_provider_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_resource_config(
        &self,
        request: Request<proto::validate_resource_config::Request>,
    ) -> Result<Response<proto::validate_resource_config::Response>, Status> {
        let req = request.into_inner();
        let schema = self.resource_schema(&req.type_name).await?;
        let config = decode_dynamic_value(req.config.as_ref())?;

        let mut diagnostics = validate_config(schema, &config.value);
        if !has_errors(&diagnostics) {
            let ctx = self.root.child_context();
            let (resource, _) = self.resource(&ctx, &req.type_name).await?;
            let response = resource
                .validate(
                    ctx,
                    ValidateResourceConfigRequest {
                        type_name: req.type_name,
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn validate_data_resource_config(
        &self,
        request: Request<proto::validate_data_resource_config::Request>,
    ) -> Result<Response<proto::validate_data_resource_config::Response>, Status> {
        let req = request.into_inner();
        let schema = self.data_source_schema(&req.type_name).await?;
        let config = decode_dynamic_value(req.config.as_ref())?;

        let mut diagnostics = validate_config(schema, &config.value);
        if !has_errors(&diagnostics) {
            let ctx = self.root.child_context();
            let (data_source, _) = self.data_source(&ctx, &req.type_name).await?;
            let response = data_source
                .validate(
                    ctx,
                    ValidateDataSourceConfigRequest {
                        type_name: req.type_name,
                        config,
                    },
                )
                .await;
            diagnostics.extend(response.diagnostics);
        }

        Ok(Response::new(proto::validate_data_resource_config::Response {
            diagnostics: diagnostics_to_proto(diagnostics),
        }))
    }

    async fn upgrade_resource_state(
        &self,
        request: Request<proto::upgrade_resource_state::Request>,
    ) -> Result<Response<proto::upgrade_resource_state::Response>, Status> {
        let req = request.into_inner();
        let schema = self.resource_schema(&req.type_name).await?;

        if req.version > schema.version {
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                    "Unsupported state version",
                    format!(
                        "State for {} has schema version {} but this provider only knows version {}",
                        req.type_name, req.version, schema.version
                    ),
                )]),
            }));
        }

        let raw = req.raw_state.unwrap_or_default();
        let state = if !raw.json.is_empty() {
            DynamicValue::decode_json(&raw.json).map_err(|e| {
                Status::from(TfplugError::UpgradeFailed(format!(
                    "{}: {}",
                    req.type_name, e
                )))
            })?
        } else if raw.flatmap.is_empty() {
            DynamicValue::null()
        } else {
            return Ok(Response::new(proto::upgrade_resource_state::Response {
                upgraded_state: None,
                diagnostics: diagnostics_to_proto(vec![Diagnostic::error(
                    "Unsupported state format",
                    "Flatmap state from Terraform 0.11 and earlier cannot be upgraded",
                )]),
            }));
        };

        let upgraded = DynamicValue::new(schema.conform(&state.value));
        Ok(Response::new(proto::upgrade_resource_state::Response {
            upgraded_state: Some(encode_dynamic_value(&upgraded)?),
            diagnostics: vec![],
        }))
    }

    async fn configure_provider(
        &self,
        request: Request<proto::configure_provider::Request>,
    ) -> Result<Response<proto::configure_provider::Response>, Status> {
        let req = request.into_inner();
        let config = decode_dynamic_value(req.config.as_ref())?;
        info!(terraform_version = %req.terraform_version, "configuring provider");

        let response = self
            .provider
            .write()
            .await
            .configure(
                self.root.child_context(),
                ConfigureProviderRequest {
                    terraform_version: req.terraform_version,
                    config,
                },
            )
            .await;

        if !has_errors(&response.diagnostics) {
            *self.provider_data.write().await = response.provider_data;
        }

        Ok(Response::new(proto::configure_provider::Response {
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_resource(
        &self,
        request: Request<proto::read_resource::Request>,
    ) -> Result<Response<proto::read_resource::Response>, Status> {
        let req = request.into_inner();
        debug!(type_name = %req.type_name, "ReadResource");
        let schema = self.resource_schema(&req.type_name).await?;
        let current_state = decode_dynamic_value(req.current_state.as_ref())?;

        if current_state.is_null() {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: Some(encode_dynamic_value(&current_state)?),
                diagnostics: vec![],
                private: req.private,
            }));
        }

        let ctx = self.root.child_context();
        let (resource, configure_diags) = self.resource(&ctx, &req.type_name).await?;
        if has_errors(&configure_diags) {
            return Ok(Response::new(proto::read_resource::Response {
                new_state: Some(encode_dynamic_value(&current_state)?),
                diagnostics: diagnostics_to_proto(configure_diags),
                private: req.private,
            }));
        }

        let response = resource
            .read(
                ctx,
                ReadResourceRequest {
                    type_name: req.type_name.clone(),
                    current_state: current_state.clone(),
                    private: req.private.clone(),
                },
            )
            .await;

        let mut diagnostics = configure_diags;
        let errored = has_errors(&response.diagnostics);
        diagnostics.extend(response.diagnostics);

        let (new_state, private) = if errored {
            (current_state, req.private)
        } else {
            match response.new_state {
                Some(state) => (finalize_state(schema, &state), response.private),
                None => {
                    info!(type_name = %req.type_name, "resource no longer exists, removing from state");
                    (DynamicValue::null(), Vec::new())
                }
            }
        };

        Ok(Response::new(proto::read_resource::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            diagnostics: diagnostics_to_proto(diagnostics),
            private,
        }))
    }

    async fn plan_resource_change(
        &self,
        request: Request<proto::plan_resource_change::Request>,
    ) -> Result<Response<proto::plan_resource_change::Response>, Status> {
        let req = request.into_inner();
        debug!(type_name = %req.type_name, "PlanResourceChange");
        let schema = self.resource_schema(&req.type_name).await?;

        let prior_state = decode_dynamic_value(req.prior_state.as_ref())?;
        let proposed = decode_dynamic_value(req.proposed_new_state.as_ref())?;
        let config = decode_dynamic_value(req.config.as_ref())?;

        let plan = plan_resource(schema, &prior_state.value, &proposed.value, &config.value);

        Ok(Response::new(proto::plan_resource_change::Response {
            planned_state: Some(encode_dynamic_value(&DynamicValue::new(plan.planned_state))?),
            requires_replace: plan
                .requires_replace
                .iter()
                .map(attribute_path_to_proto)
                .collect(),
            planned_private: req.prior_private,
            diagnostics: diagnostics_to_proto(plan.diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn apply_resource_change(
        &self,
        request: Request<proto::apply_resource_change::Request>,
    ) -> Result<Response<proto::apply_resource_change::Response>, Status> {
        let req = request.into_inner();
        let schema = self.resource_schema(&req.type_name).await?;

        let prior_state = decode_dynamic_value(req.prior_state.as_ref())?;
        let planned_state = decode_dynamic_value(req.planned_state.as_ref())?;
        let config = decode_dynamic_value(req.config.as_ref())?;

        if prior_state.is_null() && planned_state.is_null() {
            return Ok(Response::new(proto::apply_resource_change::Response {
                new_state: Some(encode_dynamic_value(&DynamicValue::null())?),
                private: vec![],
                diagnostics: vec![],
                legacy_type_system: false,
            }));
        }

        let ctx = self.root.child_context();
        let (resource, configure_diags) = self.resource(&ctx, &req.type_name).await?;
        if has_errors(&configure_diags) {
            return Ok(Response::new(proto::apply_resource_change::Response {
                new_state: Some(encode_dynamic_value(&prior_state)?),
                private: req.planned_private,
                diagnostics: diagnostics_to_proto(configure_diags),
                legacy_type_system: false,
            }));
        }

        let type_name = req.type_name.clone();
        let (new_state, private, diagnostics) = if prior_state.is_null() {
            info!(type_name = %type_name, "creating resource");
            let response = resource
                .create(
                    ctx,
                    CreateResourceRequest {
                        type_name,
                        planned_state,
                        config,
                        planned_private: req.planned_private,
                    },
                )
                .await;
            let state = if !has_errors(&response.diagnostics) {
                finalize_state(schema, &response.new_state)
            } else if created_partially(&response.new_state) {
                // Terraform keeps partially created objects as tainted.
                finalize_state(schema, &response.new_state)
            } else {
                DynamicValue::null()
            };
            (state, response.private, response.diagnostics)
        } else if planned_state.is_null() {
            info!(type_name = %type_name, "deleting resource");
            let response = resource
                .delete(
                    ctx,
                    DeleteResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_private: req.planned_private.clone(),
                    },
                )
                .await;
            if has_errors(&response.diagnostics) {
                (prior_state, req.planned_private, response.diagnostics)
            } else {
                (DynamicValue::null(), vec![], response.diagnostics)
            }
        } else {
            info!(type_name = %type_name, "updating resource");
            let response = resource
                .update(
                    ctx,
                    UpdateResourceRequest {
                        type_name,
                        prior_state: prior_state.clone(),
                        planned_state,
                        config,
                        planned_private: req.planned_private.clone(),
                    },
                )
                .await;
            if has_errors(&response.diagnostics) {
                (prior_state, req.planned_private, response.diagnostics)
            } else {
                (
                    finalize_state(schema, &response.new_state),
                    response.private,
                    response.diagnostics,
                )
            }
        };

        if has_errors(&diagnostics) {
            warn!(type_name = %req.type_name, "apply finished with errors");
        }

        Ok(Response::new(proto::apply_resource_change::Response {
            new_state: Some(encode_dynamic_value(&new_state)?),
            private,
            diagnostics: diagnostics_to_proto(diagnostics),
            legacy_type_system: false,
        }))
    }

    async fn import_resource_state(
        &self,
        request: Request<proto::import_resource_state::Request>,
    ) -> Result<Response<proto::import_resource_state::Response>, Status> {
        let req = request.into_inner();
        info!(type_name = %req.type_name, id = %req.id, "importing resource");
        let schema = self.resource_schema(&req.type_name).await?;

        let ctx = self.root.child_context();
        let (resource, configure_diags) = self.resource(&ctx, &req.type_name).await?;
        if has_errors(&configure_diags) {
            return Ok(Response::new(proto::import_resource_state::Response {
                imported_resources: vec![],
                diagnostics: diagnostics_to_proto(configure_diags),
            }));
        }

        let response = resource
            .import_state(
                ctx,
                ImportResourceStateRequest {
                    type_name: req.type_name,
                    id: req.id,
                },
            )
            .await;

        let mut imported_resources = Vec::with_capacity(response.imported_resources.len());
        for imported in response.imported_resources {
            let state = finalize_state(schema, &imported.state);
            imported_resources.push(proto::import_resource_state::ImportedResource {
                type_name: imported.type_name,
                state: Some(encode_dynamic_value(&state)?),
                private: imported.private,
            });
        }

        Ok(Response::new(proto::import_resource_state::Response {
            imported_resources,
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn read_data_source(
        &self,
        request: Request<proto::read_data_source::Request>,
    ) -> Result<Response<proto::read_data_source::Response>, Status> {
        let req = request.into_inner();
        debug!(type_name = %req.type_name, "ReadDataSource");
        let schema = self.data_source_schema(&req.type_name).await?;
        let config = decode_dynamic_value(req.config.as_ref())?;

        let ctx = self.root.child_context();
        let (data_source, configure_diags) = self.data_source(&ctx, &req.type_name).await?;
        if has_errors(&configure_diags) {
            return Ok(Response::new(proto::read_data_source::Response {
                state: Some(encode_dynamic_value(&config)?),
                diagnostics: diagnostics_to_proto(configure_diags),
            }));
        }

        let response = data_source
            .read(
                ctx,
                ReadDataSourceRequest {
                    type_name: req.type_name,
                    config: config.clone(),
                },
            )
            .await;

        let state = if has_errors(&response.diagnostics) {
            config
        } else {
            finalize_state(schema, &response.state)
        };

        Ok(Response::new(proto::read_data_source::Response {
            state: Some(encode_dynamic_value(&state)?),
            diagnostics: diagnostics_to_proto(response.diagnostics),
        }))
    }

    async fn stop_provider(
        &self,
        _request: Request<proto::stop_provider::Request>,
    ) -> Result<Response<proto::stop_provider::Response>, Status> {
        info!("stop requested, cancelling in-flight operations");
        self.root.cancel();

        let response = self
            .provider
            .read()
            .await
            .stop(Context::new(), StopProviderRequest)
            .await;

        Ok(Response::new(proto::stop_provider::Response {
            error: response.error.unwrap_or_default(),
        }))
    }
}

fn server_capabilities() -> proto::ServerCapabilities {
    proto::ServerCapabilities {
        plan_destroy: false,
        get_provider_schema_optional: false,
    }
}

/// Outcome of planning a single resource change.
#[derive(Debug)]
pub struct PlannedChange {
    pub planned_state: Dynamic,
    pub requires_replace: Vec<AttributePath>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Compute the planned state from Terraform's proposed new state.
///
/// Defaults fill null optional+computed attributes. Computed attributes that
/// are null in config become unknown on create, and on update when any
/// configurable attribute changed. Plan modifiers run last.
pub fn plan_resource(
    schema: &Schema,
    prior: &Dynamic,
    proposed: &Dynamic,
    config: &Dynamic,
) -> PlannedChange {
    if proposed.is_null() {
        return PlannedChange {
            planned_state: Dynamic::Null,
            requires_replace: vec![],
            diagnostics: vec![],
        };
    }

    let mut planned = match schema.conform(proposed) {
        Dynamic::Map(map) => map,
        _ => HashMap::new(),
    };
    let is_create = prior.is_null();
    let attr = |value: &Dynamic, name: &str| -> Dynamic {
        value
            .as_map()
            .and_then(|m| m.get(name))
            .cloned()
            .unwrap_or(Dynamic::Null)
    };

    for attribute in &schema.block.attributes {
        if !attribute.optional || !attr(config, &attribute.name).is_null() {
            continue;
        }
        if let Some(default) = &attribute.default {
            planned.insert(attribute.name.clone(), default.default_value());
        }
    }

    let changed = !is_create
        && schema.block.attributes.iter().any(|attribute| {
            (attribute.required || attribute.optional)
                && !values_equal(
                    &attr(prior, &attribute.name),
                    planned.get(&attribute.name).unwrap_or(&NULL),
                )
        });

    for attribute in &schema.block.attributes {
        if !attribute.computed || attribute.default.is_some() {
            continue;
        }
        if !attr(config, &attribute.name).is_null() {
            continue;
        }
        if is_create || changed {
            planned.insert(attribute.name.clone(), Dynamic::Unknown);
        }
    }

    let mut requires_replace = Vec::new();
    let mut diagnostics = Vec::new();
    for attribute in &schema.block.attributes {
        if attribute.plan_modifiers.is_empty() {
            continue;
        }
        let path = AttributePath::new(&attribute.name);
        let state_value = attr(prior, &attribute.name);
        let config_value = attr(config, &attribute.name);
        let mut plan_value = planned
            .get(&attribute.name)
            .cloned()
            .unwrap_or(Dynamic::Null);

        for modifier in &attribute.plan_modifiers {
            let response = modifier.modify_plan(PlanModifyRequest {
                state: state_value.clone(),
                plan: plan_value,
                config: config_value.clone(),
                attribute_path: path.clone(),
            });
            plan_value = response.plan_value;
            if response.requires_replace && !requires_replace.contains(&path) {
                requires_replace.push(path.clone());
            }
            diagnostics.extend(response.diagnostics);
        }
        planned.insert(attribute.name.clone(), plan_value);
    }

    PlannedChange {
        planned_state: Dynamic::Map(planned),
        requires_replace,
        diagnostics,
    }
}

/// Check a configuration against its schema and run attribute validators.
pub fn validate_config(schema: &Schema, config: &Dynamic) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let Some(values) = config.as_map() else {
        return diagnostics;
    };

    for attribute in &schema.block.attributes {
        let path = AttributePath::new(&attribute.name);
        let value = values.get(&attribute.name).unwrap_or(&NULL);

        if attribute.required && value.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    "Missing required argument",
                    format!("The argument \"{}\" is required, but no definition was found.", attribute.name),
                )
                .with_attribute(path),
            );
            continue;
        }

        if attribute.computed && !attribute.optional && !attribute.required && !value.is_null() {
            diagnostics.push(
                Diagnostic::error(
                    "Invalid configuration for read-only attribute",
                    format!("\"{}\" is computed by the provider and cannot be set.", attribute.name),
                )
                .with_attribute(path),
            );
            continue;
        }

        if !attribute.r#type.accepts(value) {
            diagnostics.push(
                Diagnostic::error(
                    "Incorrect attribute value type",
                    format!(
                        "\"{}\" expects {} but got {}",
                        attribute.name,
                        attribute.r#type,
                        value.type_name()
                    ),
                )
                .with_attribute(path),
            );
            continue;
        }

        if value.is_null() || value.is_unknown() {
            continue;
        }
        for validator in &attribute.validators {
            validator.validate(value, &path, &mut diagnostics);
        }
    }

    let mut undeclared: Vec<_> = values
        .keys()
        .filter(|name| schema.attribute(name).is_none())
        .collect();
    undeclared.sort();
    for name in undeclared {
        diagnostics.push(
            Diagnostic::error(
                "Unsupported argument",
                format!("An argument named \"{}\" is not expected here.", name),
            )
            .with_attribute(AttributePath::new(name)),
        );
    }

    diagnostics
}

/// Shape a provider returned state to the schema and replace any unknown
/// left behind with null; Terraform rejects unknowns after apply.
fn finalize_state(schema: &Schema, state: &DynamicValue) -> DynamicValue {
    DynamicValue::new(strip_unknowns(schema.conform(&state.value)))
}

fn strip_unknowns(value: Dynamic) -> Dynamic {
    match value {
        Dynamic::Unknown => Dynamic::Null,
        Dynamic::List(items) => Dynamic::List(items.into_iter().map(strip_unknowns).collect()),
        Dynamic::Map(map) => {
            Dynamic::Map(map.into_iter().map(|(k, v)| (k, strip_unknowns(v))).collect())
        }
        other => other,
    }
}

/// A failed create that still recorded an id left a real object behind.
fn created_partially(state: &DynamicValue) -> bool {
    state.get_string(&AttributePath::new("id")).is_ok()
}

fn decode_dynamic_value(value: Option<&proto::DynamicValue>) -> Result<DynamicValue, Status> {
    let Some(value) = value else {
        return Ok(DynamicValue::null());
    };
    let decoded = if !value.msgpack.is_empty() {
        DynamicValue::decode_msgpack(&value.msgpack)
    } else if !value.json.is_empty() {
        DynamicValue::decode_json(&value.json)
    } else {
        Ok(DynamicValue::null())
    };
    decoded.map_err(Status::from)
}

fn encode_dynamic_value(value: &DynamicValue) -> Result<proto::DynamicValue, Status> {
    Ok(proto::DynamicValue {
        msgpack: value.encode_msgpack().map_err(Status::from)?,
        json: vec![],
    })
}

fn attribute_path_to_proto(path: &AttributePath) -> proto::AttributePath {
    use proto::attribute_path::step::Selector;
    proto::AttributePath {
        steps: path
            .steps
            .iter()
            .map(|step| proto::attribute_path::Step {
                selector: Some(match step {
                    AttributePathStep::AttributeName(name) => Selector::AttributeName(name.clone()),
                    AttributePathStep::ElementKeyString(key) => {
                        Selector::ElementKeyString(key.clone())
                    }
                    AttributePathStep::ElementKeyInt(idx) => Selector::ElementKeyInt(*idx),
                }),
            })
            .collect(),
    }
}

fn diagnostics_to_proto(diagnostics: Vec<Diagnostic>) -> Vec<proto::Diagnostic> {
    diagnostics
        .into_iter()
        .map(|diag| proto::Diagnostic {
            severity: match diag.severity {
                DiagnosticSeverity::Invalid => proto::diagnostic::Severity::Invalid,
                DiagnosticSeverity::Error => proto::diagnostic::Severity::Error,
                DiagnosticSeverity::Warning => proto::diagnostic::Severity::Warning,
            } as i32,
            summary: diag.summary,
            detail: diag.detail,
            attribute: diag.attribute.as_ref().map(attribute_path_to_proto),
        })
        .collect()
}

fn schema_to_proto(schema: &Schema) -> proto::Schema {
    let block = &schema.block;
    proto::Schema {
        version: schema.version,
        block: Some(proto::schema::Block {
            version: block.version,
            attributes: block
                .attributes
                .iter()
                .map(|attr| proto::schema::Attribute {
                    name: attr.name.clone(),
                    r#type: attr.r#type.to_bytes(),
                    nested_type: None,
                    description: attr.description.clone(),
                    required: attr.required,
                    optional: attr.optional,
                    computed: attr.computed,
                    sensitive: attr.sensitive,
                    description_kind: proto::StringKind::Plain as i32,
                    deprecated: attr.deprecated,
                })
                .collect(),
            block_types: vec![],
            description: block.description.clone(),
            description_kind: match block.description_kind {
                crate::schema::StringKind::Plain => proto::StringKind::Plain,
                crate::schema::StringKind::Markdown => proto::StringKind::Markdown,
            } as i32,
            deprecated: block.deprecated,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaults::StaticDefault;
    use crate::plan_modifier::{RequiresReplace, UseStateForUnknown};
    use crate::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
    use crate::validator::StringOneOfValidator;

    fn widget_schema() -> Schema {
        SchemaBuilder::new()
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("display_name", AttributeType::String)
                    .optional()
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .optional()
                    .computed()
                    .default(StaticDefault::string("RUNNING"))
                    .validator(StringOneOfValidator::new(["RUNNING", "STOPPED"]))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("time_created", AttributeType::String)
                    .computed()
                    .build(),
            )
            .build()
    }

    fn object(pairs: &[(&str, Dynamic)]) -> Dynamic {
        Dynamic::Map(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn field<'a>(value: &'a Dynamic, name: &str) -> &'a Dynamic {
        &value.as_map().unwrap()[name]
    }

    #[test]
    fn plan_create_marks_computed_unknown_and_applies_defaults() {
        let schema = widget_schema();
        let config = object(&[
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
            ("display_name", Dynamic::Null),
            ("state", Dynamic::Null),
            ("id", Dynamic::Null),
            ("time_created", Dynamic::Null),
        ]);

        let plan = plan_resource(&schema, &Dynamic::Null, &config, &config);

        assert!(plan.requires_replace.is_empty());
        assert_eq!(field(&plan.planned_state, "id"), &Dynamic::Unknown);
        assert_eq!(field(&plan.planned_state, "display_name"), &Dynamic::Unknown);
        assert_eq!(field(&plan.planned_state, "time_created"), &Dynamic::Unknown);
        assert_eq!(field(&plan.planned_state, "state"), &Dynamic::from("RUNNING"));
    }

    #[test]
    fn plan_without_changes_keeps_prior_computed_values() {
        let schema = widget_schema();
        let prior = object(&[
            ("id", Dynamic::from("ocid1.widget.oc1..w")),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
            ("display_name", Dynamic::from("generated")),
            ("state", Dynamic::from("RUNNING")),
            ("time_created", Dynamic::from("2024-01-01T00:00:00Z")),
        ]);
        let config = object(&[
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
            ("display_name", Dynamic::Null),
            ("state", Dynamic::Null),
            ("id", Dynamic::Null),
            ("time_created", Dynamic::Null),
        ]);

        let plan = plan_resource(&schema, &prior, &prior, &config);

        assert_eq!(plan.planned_state, prior);
        assert!(plan.requires_replace.is_empty());
    }

    #[test]
    fn plan_update_marks_computed_unknown_but_keeps_id() {
        let schema = widget_schema();
        let prior = object(&[
            ("id", Dynamic::from("ocid1.widget.oc1..w")),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
            ("display_name", Dynamic::from("old")),
            ("state", Dynamic::from("RUNNING")),
            ("time_created", Dynamic::from("2024-01-01T00:00:00Z")),
        ]);
        let config = object(&[
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..c")),
            ("display_name", Dynamic::Null),
            ("state", Dynamic::from("STOPPED")),
            ("id", Dynamic::Null),
            ("time_created", Dynamic::Null),
        ]);
        let mut proposed = prior.clone();
        if let Dynamic::Map(m) = &mut proposed {
            m.insert("state".to_string(), Dynamic::from("STOPPED"));
        }

        let plan = plan_resource(&schema, &prior, &proposed, &config);

        assert_eq!(field(&plan.planned_state, "id"), &Dynamic::from("ocid1.widget.oc1..w"));
        assert_eq!(field(&plan.planned_state, "time_created"), &Dynamic::Unknown);
        assert_eq!(field(&plan.planned_state, "state"), &Dynamic::from("STOPPED"));
        assert!(plan.requires_replace.is_empty());
    }

    #[test]
    fn plan_collects_requires_replace() {
        let schema = widget_schema();
        let prior = object(&[
            ("id", Dynamic::from("ocid1.widget.oc1..w")),
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..a")),
            ("display_name", Dynamic::from("w")),
            ("state", Dynamic::from("RUNNING")),
            ("time_created", Dynamic::from("t")),
        ]);
        let mut proposed = prior.clone();
        if let Dynamic::Map(m) = &mut proposed {
            m.insert("compartment_id".to_string(), Dynamic::from("ocid1.compartment.oc1..b"));
        }
        let config = object(&[
            ("compartment_id", Dynamic::from("ocid1.compartment.oc1..b")),
            ("display_name", Dynamic::from("w")),
            ("state", Dynamic::from("RUNNING")),
        ]);

        let plan = plan_resource(&schema, &prior, &proposed, &config);
        assert_eq!(plan.requires_replace, vec![AttributePath::new("compartment_id")]);
    }

    #[test]
    fn plan_destroy_passes_through() {
        let schema = widget_schema();
        let prior = object(&[("id", Dynamic::from("x"))]);
        let plan = plan_resource(&schema, &prior, &Dynamic::Null, &Dynamic::Null);
        assert_eq!(plan.planned_state, Dynamic::Null);
    }

    #[test]
    fn validate_reports_missing_unknown_and_mistyped_attributes() {
        let schema = widget_schema();
        let config = object(&[
            ("display_name", Dynamic::Number(3.0)),
            ("state", Dynamic::from("PAUSED")),
            ("time_created", Dynamic::from("now")),
            ("bogus", Dynamic::Bool(true)),
        ]);

        let diags = validate_config(&schema, &config);
        let summaries: Vec<_> = diags.iter().map(|d| d.summary.as_str()).collect();

        assert!(summaries.contains(&"Missing required argument"));
        assert!(summaries.contains(&"Incorrect attribute value type"));
        assert!(summaries.contains(&"Invalid configuration for read-only attribute"));
        assert!(summaries.contains(&"Unsupported argument"));
        assert!(summaries.iter().any(|s| s.contains("invalid value")));
    }

    #[test]
    fn validate_allows_unknown_required_values() {
        let schema = widget_schema();
        let config = object(&[("compartment_id", Dynamic::Unknown)]);
        assert!(validate_config(&schema, &config).is_empty());
    }

    #[test]
    fn finalize_state_conforms_and_strips_unknowns() {
        let schema = widget_schema();
        let state = DynamicValue::new(object(&[
            ("id", Dynamic::from("x")),
            ("time_created", Dynamic::Unknown),
            ("extra", Dynamic::Bool(true)),
        ]));

        let finalized = finalize_state(&schema, &state);
        let map = finalized.value.as_map().unwrap();
        assert_eq!(map.len(), 5);
        assert_eq!(map["time_created"], Dynamic::Null);
        assert_eq!(map["compartment_id"], Dynamic::Null);
        assert!(!map.contains_key("extra"));
    }

    #[test]
    fn diagnostics_convert_to_proto() {
        let diags = diagnostics_to_proto(vec![Diagnostic::error("boom", "detail")
            .with_attribute(AttributePath::new("tags").key("env"))]);

        assert_eq!(diags[0].severity, proto::diagnostic::Severity::Error as i32);
        let steps = &diags[0].attribute.as_ref().unwrap().steps;
        assert_eq!(steps.len(), 2);
        assert_eq!(
            steps[1].selector,
            Some(proto::attribute_path::step::Selector::ElementKeyString("env".to_string()))
        );
    }

    #[test]
    fn schema_converts_to_proto() {
        let proto_schema = schema_to_proto(&widget_schema());
        let block = proto_schema.block.unwrap();
        let id = block.attributes.iter().find(|a| a.name == "id").unwrap();
        assert!(id.computed);
        assert_eq!(id.r#type, b"\"string\"".to_vec());
        assert!(block.block_types.is_empty());
    }
}
