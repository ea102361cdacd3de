//! Compartment resource
//!
//! Deleting a compartment is slow and fails while it still holds resources,
//! so `terraform destroy` only removes it from state unless `enable_delete`
//! is set.

use async_trait::async_trait;
use tfplug::context::Context;
use tfplug::defaults::StaticDefault;
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
use tfplug::types::{AttributePath, Dynamic, DynamicValue};
use tfplug::validator::StringLengthValidator;
use tracing::{info, warn};

use crate::api::identity::{Compartment, CreateCompartmentDetails, UpdateCompartmentDetails};
use crate::lifecycle::{LifecycleStates, StateWaiter};
use crate::provider_data::OciProviderData;
use crate::resources::common::{
    api_error, extract_provider_data, freeform_tags_attribute, is_gone, not_configured,
    optional_bool, optional_string, optional_string_map, required_string, timeouts_attribute,
    wait_error, StateBuilder, Timeouts, DEFAULT_TIMEOUT,
};

const CREATE_STATES: LifecycleStates = LifecycleStates::new(&["CREATING"], &["ACTIVE"]);
const DELETE_STATES: LifecycleStates = LifecycleStates::new(&["ACTIVE", "DELETING"], &["DELETED"]);

#[derive(Default)]
pub struct CompartmentResource {
    provider_data: Option<OciProviderData>,
}

impl CompartmentResource {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_from(compartment: &Compartment, source: &DynamicValue) -> DynamicValue {
        StateBuilder::new()
            .string("id", &compartment.id)
            .string("compartment_id", &compartment.compartment_id)
            .string("name", &compartment.name)
            .string("description", &compartment.description)
            .prefer("enable_delete", source, Dynamic::Bool(false))
            .string_map("freeform_tags", &compartment.freeform_tags)
            .opt_bool("is_accessible", compartment.is_accessible)
            .string("state", &compartment.lifecycle_state)
            .opt_string("time_created", compartment.time_created.clone())
            .keep("timeouts", source)
            .build()
    }
}

#[async_trait]
impl Resource for CompartmentResource {
    fn type_name(&self) -> &str {
        "oci_identity_compartment"
    }

    async fn schema(&self, _ctx: Context, _request: ResourceSchemaRequest) -> ResourceSchemaResponse {
        let schema = SchemaBuilder::new()
            .version(0)
            .description("Manages an IAM compartment")
            .attribute(
                AttributeBuilder::new("id", AttributeType::String)
                    .description("The OCID of the compartment")
                    .computed()
                    .plan_modifier(UseStateForUnknown)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("compartment_id", AttributeType::String)
                    .description("The OCID of the parent compartment or tenancy")
                    .required()
                    .plan_modifier(RequiresReplace)
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("name", AttributeType::String)
                    .description("Compartment name, unique within the tenancy")
                    .required()
                    .validator(StringLengthValidator::between(1, 100))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("description", AttributeType::String)
                    .description("Compartment description")
                    .required()
                    .validator(StringLengthValidator::between(1, 400))
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("enable_delete", AttributeType::Bool)
                    .description("Delete the compartment on destroy instead of only forgetting it")
                    .optional()
                    .computed()
                    .default(StaticDefault::bool(false))
                    .build(),
            )
            .attribute(freeform_tags_attribute())
            .attribute(
                AttributeBuilder::new("is_accessible", AttributeType::Bool)
                    .description("Whether the caller can access the compartment")
                    .computed()
                    .build(),
            )
            .attribute(
                AttributeBuilder::new("state", AttributeType::String)
                    .description("The compartment's lifecycle state")
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
        let mut diagnostics = vec![];

        let Some(data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return CreateResourceResponse {
                new_state: request.planned_state,
                private: vec![],
                diagnostics,
            };
        };

        let plan = &request.planned_state;
        let details = match (
            required_string(plan, "compartment_id"),
            required_string(plan, "name"),
            required_string(plan, "description"),
        ) {
            (Ok(compartment_id), Ok(name), Ok(description)) => CreateCompartmentDetails {
                compartment_id,
                name,
                description,
                freeform_tags: optional_string_map(plan, "freeform_tags"),
            },
            (a, b, c) => {
                diagnostics.extend([a.err(), b.err(), c.err()].into_iter().flatten());
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };

        let client = data.client.as_ref();
        let created = match client.identity().create_compartment(&details).await {
            Ok(compartment) => compartment,
            Err(e) => {
                diagnostics.push(api_error("create compartment", &e));
                return CreateResourceResponse {
                    new_state: request.planned_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };
        info!(id = %created.id, name = %created.name, "created compartment");

        let timeouts = Timeouts::from_value(plan, DEFAULT_TIMEOUT);
        let id = created.id.as_str();
        let new_state = match StateWaiter::new(format!("compartment {}", id), CREATE_STATES, timeouts.create)
            .wait_for_target(&ctx, || async move { client.identity().get_compartment(id).await })
            .await
        {
            Ok(compartment) => Self::state_from(&compartment, plan),
            Err(e) => {
                diagnostics.push(wait_error("wait for compartment to become active", &e));
                Self::state_from(&created, plan)
            }
        };

        CreateResourceResponse {
            new_state,
            private: vec![],
            diagnostics,
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

        match data.client.identity().get_compartment(&id).await {
            Ok(compartment) if !is_gone(&compartment.lifecycle_state) => ReadResourceResponse {
                new_state: Some(Self::state_from(&compartment, &request.current_state)),
                diagnostics: vec![],
                private: request.private,
            },
            Ok(_) => ReadResourceResponse {
                new_state: None,
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
                diagnostics: vec![api_error("read compartment", &e)],
                private: request.private,
            },
        }
    }

    async fn update(&self, _ctx: Context, request: UpdateResourceRequest) -> UpdateResourceResponse {
        let mut diagnostics = vec![];

        let Some(data) = &self.provider_data else {
            diagnostics.push(not_configured());
            return UpdateResourceResponse {
                new_state: request.prior_state,
                private: vec![],
                diagnostics,
            };
        };
        let id = match required_string(&request.prior_state, "id") {
            Ok(id) => id,
            Err(diag) => {
                diagnostics.push(diag);
                return UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                };
            }
        };

        let plan = &request.planned_state;
        let details = UpdateCompartmentDetails {
            name: optional_string(plan, "name"),
            description: optional_string(plan, "description"),
            freeform_tags: optional_string_map(plan, "freeform_tags"),
        };
        // Compartment updates apply synchronously.
        match data.client.identity().update_compartment(&id, &details).await {
            Ok(compartment) => UpdateResourceResponse {
                new_state: Self::state_from(&compartment, plan),
                private: vec![],
                diagnostics,
            },
            Err(e) => {
                diagnostics.push(api_error("update compartment", &e));
                UpdateResourceResponse {
                    new_state: request.prior_state,
                    private: vec![],
                    diagnostics,
                }
            }
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

        if !optional_bool(&request.prior_state, "enable_delete").unwrap_or(false) {
            warn!(id = %id, "enable_delete is false, removing compartment from state only");
            return DeleteResourceResponse {
                diagnostics: vec![],
            };
        }

        let client = data.client.as_ref();
        match client.identity().delete_compartment(&id).await {
            Ok(()) => info!(id = %id, "deleting compartment"),
            Err(e) if e.is_not_found() => return DeleteResourceResponse { diagnostics: vec![] },
            Err(e) => {
                return DeleteResourceResponse {
                    diagnostics: vec![api_error("delete compartment", &e)],
                }
            }
        }

        let timeouts = Timeouts::from_value(&request.prior_state, DEFAULT_TIMEOUT);
        let compartment_id = id.as_str();
        let waited = StateWaiter::new(format!("compartment {}", id), DELETE_STATES, timeouts.delete)
            .deleting()
            .wait(&ctx, || async move {
                client.identity().get_compartment(compartment_id).await
            })
            .await;

        DeleteResourceResponse {
            diagnostics: match waited {
                Ok(_) => vec![],
                Err(e) => vec![wait_error("wait for compartment deletion", &e)],
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
impl ResourceWithConfigure for CompartmentResource {
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
    use mockito::Server;

    const COMPARTMENT_JSON: &str = r#"{
        "id": "ocid1.compartment.oc1..child",
        "compartmentId": "ocid1.tenancy.oc1..t",
        "name": "apps",
        "description": "application resources",
        "lifecycleState": "ACTIVE",
        "isAccessible": true
    }"#;

    async fn configured(url: &str) -> CompartmentResource {
        let mut resource = CompartmentResource::new();
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

    fn prior(enable_delete: bool) -> DynamicValue {
        state(&[
            ("id", Dynamic::from("ocid1.compartment.oc1..child")),
            ("enable_delete", Dynamic::Bool(enable_delete)),
        ])
    }

    #[tokio::test]
    async fn schema_defaults_enable_delete_to_false() {
        let response = CompartmentResource::new()
            .schema(Context::new(), ResourceSchemaRequest)
            .await;
        let enable_delete = response.schema.attribute("enable_delete").unwrap();
        assert!(enable_delete.default.is_some());
        assert!(enable_delete.optional && enable_delete.computed);
    }

    #[tokio::test]
    async fn create_reports_every_missing_attribute() {
        let server = Server::new_async().await;
        let resource = configured(&server.url()).await;
        let plan = state(&[("compartment_id", Dynamic::from("ocid1.tenancy.oc1..t"))]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_identity_compartment".to_string(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                },
            )
            .await;
        assert_eq!(response.diagnostics.len(), 2);
    }

    #[tokio::test]
    async fn create_waits_for_active() {
        let mut server = Server::new_async().await;
        server
            .mock("POST", "/20160918/compartments")
            .with_status(200)
            .with_body(COMPARTMENT_JSON.replace("ACTIVE", "CREATING"))
            .create_async()
            .await;
        let get = server
            .mock("GET", "/20160918/compartments/ocid1.compartment.oc1..child")
            .with_status(200)
            .with_body(COMPARTMENT_JSON)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let plan = state(&[
            ("id", Dynamic::Unknown),
            ("compartment_id", Dynamic::from("ocid1.tenancy.oc1..t")),
            ("name", Dynamic::from("apps")),
            ("description", Dynamic::from("application resources")),
            ("enable_delete", Dynamic::Bool(false)),
        ]);
        let response = resource
            .create(
                Context::new(),
                CreateResourceRequest {
                    type_name: "oci_identity_compartment".to_string(),
                    planned_state: plan.clone(),
                    config: plan,
                    planned_private: vec![],
                },
            )
            .await;

        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        get.assert_async().await;
        assert_eq!(
            response.new_state.get_string(&AttributePath::new("state")).unwrap(),
            "ACTIVE"
        );
        assert!(!response
            .new_state
            .get_bool(&AttributePath::new("enable_delete"))
            .unwrap());
    }

    #[tokio::test]
    async fn delete_without_enable_delete_only_forgets() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/20160918/compartments/ocid1.compartment.oc1..child")
            .expect(0)
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "oci_identity_compartment".to_string(),
                    prior_state: prior(false),
                    planned_private: vec![],
                },
            )
            .await;
        assert!(response.diagnostics.is_empty());
        delete.assert_async().await;
    }

    #[tokio::test]
    async fn delete_with_enable_delete_waits_for_deleted() {
        let mut server = Server::new_async().await;
        let delete = server
            .mock("DELETE", "/20160918/compartments/ocid1.compartment.oc1..child")
            .with_status(204)
            .create_async()
            .await;
        server
            .mock("GET", "/20160918/compartments/ocid1.compartment.oc1..child")
            .with_status(200)
            .with_body(COMPARTMENT_JSON.replace("ACTIVE", "DELETED"))
            .create_async()
            .await;

        let resource = configured(&server.url()).await;
        let response = resource
            .delete(
                Context::new(),
                DeleteResourceRequest {
                    type_name: "oci_identity_compartment".to_string(),
                    prior_state: prior(true),
                    planned_private: vec![],
                },
            )
            .await;
        assert!(response.diagnostics.is_empty(), "{:?}", response.diagnostics);
        delete.assert_async().await;
    }
}
