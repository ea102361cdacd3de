//! Identity API: compartments and availability domains

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client::{Client, Service};
use super::common::ApiQueryParams;
use super::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Compartment {
    pub id: String,
    pub compartment_id: String,
    pub name: String,
    pub description: String,
    pub lifecycle_state: String,
    #[serde(default)]
    pub is_accessible: Option<bool>,
    #[serde(default)]
    pub time_created: Option<String>,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateCompartmentDetails {
    /// Parent compartment (or tenancy) OCID
    pub compartment_id: String,
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCompartmentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailabilityDomain {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub compartment_id: Option<String>,
}

pub struct IdentityApi<'a> {
    client: &'a Client,
}

impl<'a> IdentityApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_compartment(
        &self,
        details: &CreateCompartmentDetails,
    ) -> Result<Compartment, ApiError> {
        Ok(self
            .client
            .post(Service::Identity, "/compartments", &ApiQueryParams::new(), details)
            .await?
            .data)
    }

    pub async fn get_compartment(&self, compartment_id: &str) -> Result<Compartment, ApiError> {
        let path = format!("/compartments/{}", compartment_id);
        Ok(self
            .client
            .get(Service::Identity, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_compartment(
        &self,
        compartment_id: &str,
        details: &UpdateCompartmentDetails,
    ) -> Result<Compartment, ApiError> {
        let path = format!("/compartments/{}", compartment_id);
        Ok(self.client.put(Service::Identity, &path, details).await?.data)
    }

    pub async fn delete_compartment(&self, compartment_id: &str) -> Result<(), ApiError> {
        let path = format!("/compartments/{}", compartment_id);
        self.client
            .delete(Service::Identity, &path, &ApiQueryParams::new())
            .await
            .map(|_| ())
    }

    pub async fn list_availability_domains(
        &self,
        compartment_id: &str,
    ) -> Result<Vec<AvailabilityDomain>, ApiError> {
        let query = ApiQueryParams::new().add("compartmentId", compartment_id);
        Ok(self
            .client
            .get(Service::Identity, "/availabilityDomains", &query)
            .await?
            .data)
    }
}
