//! Compute instance resource
//!
//! Launching waits for `RUNNING`. The optional `state` attribute drives the
//! START/STOP instance actions, so an instance can be kept stopped. The
//! primary VNIC's addresses are exposed as `private_ip` and `public_ip`.

use async_trait::async_trait;
use futures::future::try_join_all;
use std::time::Duration;
use tfplug::context::Context;
use tfplug::import_state_passthrough_id;
use tfplug::plan_modifier::{RequiresReplace, UseStateForUnknown};
use tfplug::resource::{
    ConfigureResourceRequest, ConfigureResourceResponse, CreateResourceRequest,
    CreateResourceResponse, DeleteResourceRequest, DeleteResourceResponse,
    ImportResourceStateRequest, ImportResourceStateResponse, ReadResourceRequest,
    ReadResourceResponse, Resource, ResourceSchemaRequest, ResourceSchemaResponse,
    ResourceWithConfigure, UpdateResourceRequest, UpdateResourceResponse,
    ValidateResourceConfigRequest, ValidateResourceConfigResponse,
};
use tfplug::schema::{AttributeBuilder, AttributeType, SchemaBuilder};
use tfplug::types::{AttributePath, Diagnostic, Dynamic, DynamicValue};
use tfplug::validator::{NumberRangeValidator, StringOneOfValidator, Validator};
use tracing::{debug, info};

use crate::api::core::{
    CreateVnicDetails, Instance, InstanceAction, InstanceShapeConfig, InstanceSourceDetails,
    LaunchInstanceDetails, UpdateInstanceDetails, Vnic,
};
use crate::api::{ApiError, Client};
use crate::lifecycle::{LifecycleStates, StateWaiter};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, freeform_tags_attribute, is_gone, not_configured,
    optional_string, optional_string_map, required_string, string_map, timeouts_attribute,
    wait_error, StateBuilder, Timeouts,
};

const LAUNCH_STATES: LifecycleStates =
    LifecycleStates::new(&["PROVISIONING", "STARTING"], &["RUNNING"]);
const START_STATES: LifecycleStates = LifecycleStates::new(&["STOPPED", "STARTING"], &["RUNNING"]);
const STOP_STATES: LifecycleStates = LifecycleStates::new(&["RUNNING", "STOPPING"], &["STOPPED"]);
/// Shape changes restart or move the instance before it settles.
const SETTLE_STATES: LifecycleStates = LifecycleStates::new(
    &["PROVISIONING", "MOVING", "STARTING", "STOPPING", "CREATING_IMAGE"],
    &["RUNNING", "STOPPED"],
);
const DELETE_STATES: LifecycleStates = LifecycleStates::new(
    &["RUNNING", "STOPPING", "STOPPED", "TERMINATING"],
    &["TERMINATED"],
);

const INSTANCE_TIMEOUT: Duration = Duration::from_secs(45 * 60);

#[derive(Default)]
pub struct InstanceResource {
    provider_data: Option<OciProviderData>,
}

impl InstanceResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn launch_details(plan: &DynamicValue) -> Result<LaunchInstanceDetails, Diagnostic> {
        let source = AttributePath::new("source_details");
        let vnic = AttributePath::new("create_vnic_details");

        let source_details = InstanceSourceDetails {
            source_type: plan
                .get_string(&source.clone().attribute("source_type"))
                .unwrap_or_else(|_| "image".to_string()),
            image_id: plan.get_string(&source.clone().attribute("image_id")).ok(),
            boot_volume_size_in_gbs: plan
                .get_number(&source.clone().attribute("boot_volume_size_in_gbs"))
                .ok()
                .map(|n| n as i64),
        };
        if source_details.image_id.is_none() {
            return Err(Diagnostic::error(
                "Missing image",
                "source_details.image_id must be set",
            )
            .with_attribute(source.attribute("image_id")));
        }

        let subnet_id = plan
            .get_string(&vnic.clone().attribute("subnet_id"))
            .map_err(|_| {
                Diagnostic::error("Missing subnet", "create_vnic_details.subnet_id must be set")
                    .with_attribute(vnic.clone().attribute("subnet_id"))
            })?;

        Ok(LaunchInstanceDetails {
            compartment_id: required_string(plan, "compartment_id")?,
            availability_domain: required_string(plan, "availability_domain")?,
            shape: required_string(plan, "shape")?,
            display_name: optional_string(plan, "display_name"),
            fault_domain: optional_string(plan, "fault_domain"),
            shape_config: Self::shape_config(plan),
            source_details,
            create_vnic_details: CreateVnicDetails {
                subnet_id,
                assign_public_ip: plan.get_bool(&vnic.clone().attribute("assign_public_ip")).ok(),
                display_name: plan.get_string(&vnic.clone().attribute("display_name")).ok(),
                hostname_label: plan.get_string(&vnic.clone().attribute("hostname_label")).ok(),
                private_ip: plan.get_string(&vnic.attribute("private_ip")).ok(),
            },
            metadata: optional_string_map(plan, "metadata"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        })
    }

    fn shape_config(plan: &DynamicValue) -> Option<InstanceShapeConfig> {
        let path = AttributePath::new("shape_config");
        plan.get_map(&path).ok()?;
        let config = InstanceShapeConfig {
            ocpus: plan.get_number(&path.clone().attribute("ocpus")).ok(),
            memory_in_gbs: plan.get_number(&path.attribute("memory_in_gbs")).ok(),
        };
        (config.ocpus.is_some() || config.memory_in_gbs.is_some()).then_some(config)
    }

    fn desired_state(plan: &DynamicValue) -> Option<String> {
        optional_string(plan, "state").filter(|s| s == "RUNNING" || s == "STOPPED")
    }

    fn state_from(instance: &Instance, vnic: Option<&Vnic>, source: &DynamicValue) -> DynamicValue {
        let shape_config = instance
            .shape_config
            .as_ref()
            .map(|config| {
                StateBuilder::new()
                    .opt_number("ocpus", config.ocpus)
                    .opt_number("memory_in_gbs", config.memory_in_gbs)
                    .build()
                    .value
            })
            .unwrap_or(Dynamic::Null);
        let source_details = instance
            .source_details
            .as_ref()
            .map(|details| {
                StateBuilder::new()
                    .string("source_type", &details.source_type)
                    .opt_string("image_id", details.image_id.clone())
                    .opt_number(
                        "boot_volume_size_in_gbs",
                        details.boot_volume_size_in_gbs.map(|n| n as f64),
                    )
                    .build()
                    .value
            })
            .unwrap_or(Dynamic::Null);
        let vnic_details = vnic
            .and_then(|vnic| {
                let subnet_id = vnic.subnet_id.clone()?;
                Some(
                    StateBuilder::new()
                        .string("subnet_id", subnet_id)
                        .bool("assign_public_ip", vnic.public_ip.is_some())
                        .opt_string("display_name", None)
                        .opt_string("hostname_label", vnic.hostname_label.clone())
                        .opt_string("private_ip", vnic.private_ip.clone())
                        .build()
                        .value,
                )
            })
            .unwrap_or(Dynamic::Null);
        let metadata = if instance.metadata.is_empty() {
            Dynamic::Null
        } else {
            string_map(&instance.metadata)
        };

        StateBuilder::new()
            .string("id", &instance.id)
            .string("compartment_id", &instance.compartment_id)
            .string("availability_domain", &instance.availability_domain)
            .string("shape", &instance.shape)
            .opt_string("display_name", instance.display_name.clone())
            .opt_string("fault_domain", instance.fault_domain.clone())
            .opt_string("region", instance.region.clone())
            .prefer("shape_config", source, shape_config)
            .prefer("source_details", source, source_details)
            .prefer("create_vnic_details", source, vnic_details)
            .prefer("metadata", source, metadata)
            .string_map("freeform_tags", &instance.freeform_tags)
            .string("state", &instance.lifecycle_state)
            .opt_string("private_ip", vnic.and_then(|v| v.private_ip.clone()))
            .opt_string("public_ip", vnic.and_then(|v| v.public_ip.clone()))
            .opt_string("time_created", instance.time_created.clone())
            .keep("timeouts", source)
            .build()
    }
}

/// The instance's primary VNIC, looked up through its attachments.
async fn primary_vnic(client: &Client, instance: &Instance) -> Result<Option<Vnic>, ApiError> {
    let core = client.core();
    let attachments = core
        .list_vnic_attachments(&instance.compartment_id, &instance.id)
        .await?;
    let vnics = try_join_all(
        attachments
            .iter()
            .filter(|attachment| attachment.lifecycle_state == "ATTACHED")
            .filter_map(|attachment| attachment.vnic_id.as_deref())
            .map(|vnic_id| core.get_vnic(vnic_id)),
    )
    .await?;
    debug!(instance = %instance.id, count = vnics.len(), "fetched attached VNICs");
    Ok(vnics.into_iter().find(|vnic| vnic.is_primary.unwrap_or(false)))
}

async fn wait_for(
    ctx: &Context,
    client: &Client,
    id: &str,
    states: LifecycleStates,
    timeout: Duration,
) -> Result<Instance, Diagnostic> {
    StateWaiter::new(format!("instance {}", id), states, timeout)
        .wait_for_target(ctx, || async move { client.core().get_instance(id).await })
        .await
        .map_err(|e| wait_error("wait for instance", &e))
}

/// Start or stop `instance` when it is not in the `desired` power state.
async fn apply_power_state(
    ctx: &Context,
    client: &Client,
    instance: Instance,
    desired: Option<&str>,
    timeout: Duration,
) -> Result<Instance, Diagnostic> {
    let (action, states) = match (desired, instance.lifecycle_state.as_str()) {
        (Some("STOPPED"), "RUNNING") => (InstanceAction::Stop, STOP_STATES),
        (Some("RUNNING"), "STOPPED") => (InstanceAction::Start, START_STATES),
        _ => return Ok(instance),
    };

    info!(id = %instance.id, action = action.as_str(), "changing instance power state");
    client
        .core()
        .instance_action(&instance.id, action)
        .await
        .map_err(|e| api_error("change instance power state", &e))?;
    wait_for(ctx, client, &instance.id, states, timeout).await
}

#[async_trait]
impl Resource for InstanceResource {
    fn type_name(&self) -> &str {
        "oci_core_instance"
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
            .description("Manages a compute instance")
            .attribute(computed("id", "The OCID of the instance"))
            .attribute(create_only("compartment_id", "The OCID of the compartment"))
            .attribute(create_only(
                "availability_domain",
                "The availability domain to launch in, e.g. Uocm:PHX-AD-1",
            ))
            .attribute(
                AttributeBuilder::new("shape", AttributeType::String)
                    .description("The instance shape, e.g. VM.Standard.E4.Flex")
                    .required()
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
                AttributeBuilder::new("fault_domain", AttributeType::String)
                    .description("Fault domain to place the instance in")
                    .optional()
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "shape_config",
                    AttributeType::object([
                        ("ocpus", AttributeType::Number),
                        ("memory_in_gbs", AttributeType::Number),
                    ]),
                )
                .description("OCPUs and memory for flexible shapes")
                .optional()
                .computed()
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "source_details",
                    AttributeType::object([
                        ("source_type", AttributeType::String),
                        ("image_id", AttributeType::String),
                        ("boot_volume_size_in_gbs", AttributeType::Number),
                    ]),
                )
                .description("Boot source: source_type \"image\" and image_id")
                .required()
                .plan_modifier(RequiresReplace)
                .build(),
            )
            .attribute(
                AttributeBuilder::new(
                    "create_vnic_details",
                    AttributeType::object([
                        ("subnet_id", AttributeType::String),
                        ("assign_public_ip", AttributeType::Bool),
                        ("display_name", AttributeType::String),
                        ("hostname_label", AttributeType::String),
                        ("private_ip", AttributeType::String),
                    ]),
                )
                .description("Primary VNIC settings")
                .required()
                .plan_modifier(RequiresReplace)
                .build(),
            )
            .attribute(
                AttributeBuilder::new("metadata", AttributeType::map(AttributeType::String))
                    .description("Instance metadata such as ssh_authorized_keys and user_data")
                    .optional()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(freeform_tags_attribute())
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("Desired power state, RUNNING or STOPPED; reports the lifecycle state")
                    .optional()
                    .computed()
                    .validator(StringOneOfValidator::new(["RUNNING", "STOPPED"]))
                    .build(),
            )
            .attribute(computed("region", "The region the instance runs in"))
            .attribute(
                AttributeBuilder::new("private_ip", AttributeType::String)
                    .description("Private IP of the primary VNIC")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("public_ip", AttributeType::String)
                    .description("Public IP of the primary VNIC, if any")
                    .computed()
                    .build(),
            )
            .attribute(computed("time_created", "Creation time (RFC 3339)"))
            .attribute(timeouts_attribute())
            .build();

        ResourceSchemaResponse {
            schema,
            diagnostics: vec![],
        }
    }

    async fn validate(
        &self,
        _ctx: Context,
        request: ValidateResourceConfigRequest,
    ) -> ValidateResourceConfigResponse {
        let mut diagnostics = vec![];
        let ocpus = AttributePath::new("shape_config").attribute("ocpus");
        if let Some(value) = request.config.get(&ocpus) {
            NumberRangeValidator::between(1.0, 128.0).validate(value, &ocpus, &mut diagnostics);
        }
        ValidateResourceConfigResponse { diagnostics }
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
        let details = match Self::launch_details(&request.planned_state) {
            Ok(details) => details,
            Err(diag) => return fail(request.planned_state, diag),
        };

        let client = data.client.as_ref();
        let launched = match client.core().launch_instance(&details).await {
            Ok(instance) => instance,
            Err(e) => return fail(request.planned_state, api_error("launch instance", &e)),
        };
        info!(id = %launched.id, shape = %launched.shape, "launched instance");

        let plan = &request.planned_state;
        let timeouts = Timeouts::from_value(plan, INSTANCE_TIMEOUT);
        let desired = Self::desired_state(plan);
        let settled = async {
            let running = wait_for(&ctx, client, &launched.id, LAUNCH_STATES, timeouts.create).await?;
            let instance =
                apply_power_state(&ctx, client, running, desired.as_deref(), timeouts.create).await?;
            let vnic = primary_vnic(client, &instance)
                .await
                .map_err(|e| api_error("read instance VNICs", &e))?;
            Ok::<_, Diagnostic>((instance, vnic))
        }
        .await;

        match settled {
            Ok((instance, vnic)) => CreateResourceResponse {
                new_state: Self::state_from(&instance, vnic.as_ref(), plan),
                private: vec![],
                diagnostics: vec![],
            },
            Err(diag) => fail(Self::state_from(&launched, None, plan), diag),
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

        let client = data.client.as_ref();
        let instance = match client.core().get_instance(&id).await {
            Ok(instance) if is_gone(&instance.lifecycle_state) => None,
            Ok(instance) => Some(instance),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                return ReadResourceResponse {
                    new_state: Some(request.current_state),
                    diagnostics: vec![api_error("read instance", &e)],
                    private: request.private,
                }
            }
        };
        let Some(instance) = instance else {
            info!(id = %id, "instance is gone, removing from state");
            return ReadResourceResponse {
                new_state: None,
                diagnostics: vec![],
                private: request.private,
            };
        };

        match primary_vnic(client, &instance).await {
            Ok(vnic) => ReadResourceResponse {
                new_state: Some(Self::state_from(&instance, vnic.as_ref(), &request.current_state)),
                diagnostics: vec![],
                private: request.private,
            },
            Err(e) => ReadResourceResponse {
                new_state: Some(request.current_state),
                diagnostics: vec![api_error("read instance VNICs", &e)],
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
        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => return fail(diag),
        };

        let plan = &request.planned_state;
        let prior = &request.prior_state;
        let timeouts = Timeouts::from_value(plan, INSTANCE_TIMEOUT);
        let client = data.client.as_ref();

        let changed =
            |name: &str| plan.get(&AttributePath::new(name)) != prior.get(&AttributePath::new(name));
        let needs_update = ["display_name", "shape", "shape_config", "freeform_tags"]
            .into_iter()
            .any(changed);

        let updated = async {
            let instance = if needs_update {
                let details = UpdateInstanceDetails {
                    display_name: optional_string(plan, "display_name"),
                    shape: optional_string(plan, "shape"),
                    shape_config: Self::shape_config(plan),
                    freeform_tags: optional_string_map(plan, "freeform_tags"),
                };
                client
                    .core()
                    .update_instance(&id, &details)
                    .await
                    .map_err(|e| api_error("update instance", &e))?;
                wait_for(&ctx, client, &id, SETTLE_STATES, timeouts.update).await?
            } else {
                client
                    .core()
                    .get_instance(&id)
                    .await
                    .map_err(|e| api_error("read instance", &e))?
            };
            let desired = Self::desired_state(plan);
            let instance =
                apply_power_state(&ctx, client, instance, desired.as_deref(), timeouts.update).await?;
            let vnic = primary_vnic(client, &instance)
                .await
                .map_err(|e| api_error("read instance VNICs", &e))?;
            Ok::<_, Diagnostic>((instance, vnic))
        }
        .await;

        match updated {
            Ok((instance, vnic)) => UpdateResourceResponse {
                new_state: Self::state_from(&instance, vnic.as_ref(), plan),
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
        match client.core().terminate_instance(&id).await {
            Ok(()) => info!(id = %id, "terminating instance"),
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("terminate instance", &e)],
                }
            }
        }

        let timeouts = Timeouts::from_value(&request.prior_state, INSTANCE_TIMEOUT);
        let instance_id = id.as_str();
        let waited = StateWaiter::new(format!("instance {}", id), DELETE_STATES, timeouts.delete)
            .deleting()
            .wait(&ctx, || async move { client.core().get_instance(instance_id).await })
            .await;

        DeleteResourceResponse {
            diagnostics: match waited {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for instance termination", &e)],
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
impl ResourceWithConfigure for InstanceResource {
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
#[path = "./resource_instance_test.rs"]
mod resource_instance_test;
