//! Core Services API: virtual cloud networks, subnets, instances and VNICs

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client::{Client, Service};
use super::common::ApiQueryParams;
use super::error::ApiError;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vcn {
    pub id: String,
    pub compartment_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub cidr_block: Option<String>,
    #[serde(default)]
    pub cidr_blocks: Vec<String>,
    #[serde(default)]
    pub dns_label: Option<String>,
    #[serde(default)]
    pub vcn_domain_name: Option<String>,
    #[serde(default)]
    pub default_route_table_id: Option<String>,
    #[serde(default)]
    pub default_security_list_id: Option<String>,
    #[serde(default)]
    pub default_dhcp_options_id: Option<String>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub time_created: Option<String>,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVcnDetails {
    pub compartment_id: String,
    pub cidr_blocks: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVcnDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subnet {
    pub id: String,
    pub compartment_id: String,
    pub vcn_id: String,
    pub cidr_block: String,
    #[serde(default)]
    pub availability_domain: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub dns_label: Option<String>,
    #[serde(default)]
    pub route_table_id: Option<String>,
    #[serde(default)]
    pub security_list_ids: Vec<String>,
    #[serde(default)]
    pub dhcp_options_id: Option<String>,
    #[serde(default)]
    pub prohibit_public_ip_on_vnic: Option<bool>,
    #[serde(default)]
    pub subnet_domain_name: Option<String>,
    #[serde(default)]
    pub virtual_router_ip: Option<String>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSubnetDetails {
    pub compartment_id: String,
    pub vcn_id: String,
    pub cidr_block: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dns_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_list_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prohibit_public_ip_on_vnic: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSubnetDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub route_table_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub security_list_ids: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceShapeConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocpus: Option<f64>,
    #[serde(
        rename = "memoryInGBs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub memory_in_gbs: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceSourceDetails {
    pub source_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(
        rename = "bootVolumeSizeInGBs",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub boot_volume_size_in_gbs: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,
    pub compartment_id: String,
    pub availability_domain: String,
    pub shape: String,
    #[serde(default)]
    pub display_name: Option<String>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub fault_domain: Option<String>,
    #[serde(default)]
    pub shape_config: Option<InstanceShapeConfig>,
    #[serde(default)]
    pub source_details: Option<InstanceSourceDetails>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
    #[serde(default)]
    pub time_created: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVnicDetails {
    pub subnet_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assign_public_ip: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub private_ip: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchInstanceDetails {
    pub compartment_id: String,
    pub availability_domain: String,
    pub shape: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fault_domain: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_config: Option<InstanceShapeConfig>,
    pub source_details: InstanceSourceDetails,
    pub create_vnic_details: CreateVnicDetails,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateInstanceDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_config: Option<InstanceShapeConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

/// Power actions accepted by `POST /instances/{id}?action=`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceAction {
    Start,
    Stop,
    SoftStop,
    Reset,
}

impl InstanceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstanceAction::Start => "START",
            InstanceAction::Stop => "STOP",
            InstanceAction::SoftStop => "SOFTSTOP",
            InstanceAction::Reset => "RESET",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VnicAttachment {
    pub id: String,
    pub instance_id: String,
    #[serde(default)]
    pub vnic_id: Option<String>,
    pub lifecycle_state: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vnic {
    pub id: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub is_primary: Option<bool>,
    #[serde(default)]
    pub hostname_label: Option<String>,
    #[serde(default)]
    pub subnet_id: Option<String>,
}

/// Core Services API (`iaas`, version 20160918)
pub struct CoreApi<'a> {
    client: &'a Client,
}

impl<'a> CoreApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    pub async fn create_vcn(&self, details: &CreateVcnDetails) -> Result<Vcn, ApiError> {
        let response = self
            .client
            .post(Service::Core, "/vcns", &ApiQueryParams::new(), details)
            .await?;
        Ok(response.data)
    }

    pub async fn get_vcn(&self, vcn_id: &str) -> Result<Vcn, ApiError> {
        let path = format!("/vcns/{}", vcn_id);
        Ok(self
            .client
            .get(Service::Core, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_vcn(&self, vcn_id: &str, details: &UpdateVcnDetails) -> Result<Vcn, ApiError> {
        let path = format!("/vcns/{}", vcn_id);
        Ok(self.client.put(Service::Core, &path, details).await?.data)
    }

    pub async fn delete_vcn(&self, vcn_id: &str) -> Result<(), ApiError> {
        let path = format!("/vcns/{}", vcn_id);
        self.client
            .delete(Service::Core, &path, &ApiQueryParams::new())
            .await
            .map(|_| ())
    }

    /// All VCNs in a compartment, across pages.
    pub async fn list_vcns(
        &self,
        compartment_id: &str,
        display_name: Option<&str>,
        lifecycle_state: Option<&str>,
    ) -> Result<Vec<Vcn>, ApiError> {
        let query = ApiQueryParams::new()
            .add("compartmentId", compartment_id)
            .add_optional("displayName", display_name)
            .add_optional("lifecycleState", lifecycle_state);
        self.client.list_all(Service::Core, "/vcns", &query).await
    }

    pub async fn create_subnet(&self, details: &CreateSubnetDetails) -> Result<Subnet, ApiError> {
        Ok(self
            .client
            .post(Service::Core, "/subnets", &ApiQueryParams::new(), details)
            .await?
            .data)
    }

    pub async fn get_subnet(&self, subnet_id: &str) -> Result<Subnet, ApiError> {
        let path = format!("/subnets/{}", subnet_id);
        Ok(self
            .client
            .get(Service::Core, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_subnet(
        &self,
        subnet_id: &str,
        details: &UpdateSubnetDetails,
    ) -> Result<Subnet, ApiError> {
        let path = format!("/subnets/{}", subnet_id);
        Ok(self.client.put(Service::Core, &path, details).await?.data)
    }

    pub async fn delete_subnet(&self, subnet_id: &str) -> Result<(), ApiError> {
        let path = format!("/subnets/{}", subnet_id);
        self.client
            .delete(Service::Core, &path, &ApiQueryParams::new())
            .await
            .map(|_| ())
    }

    pub async fn launch_instance(&self, details: &LaunchInstanceDetails) -> Result<Instance, ApiError> {
        Ok(self
            .client
            .post(Service::Core, "/instances", &ApiQueryParams::new(), details)
            .await?
            .data)
    }

    pub async fn get_instance(&self, instance_id: &str) -> Result<Instance, ApiError> {
        let path = format!("/instances/{}", instance_id);
        Ok(self
            .client
            .get(Service::Core, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_instance(
        &self,
        instance_id: &str,
        details: &UpdateInstanceDetails,
    ) -> Result<Instance, ApiError> {
        let path = format!("/instances/{}", instance_id);
        Ok(self.client.put(Service::Core, &path, details).await?.data)
    }

    pub async fn instance_action(
        &self,
        instance_id: &str,
        action: InstanceAction,
    ) -> Result<Instance, ApiError> {
        let path = format!("/instances/{}", instance_id);
        let query = ApiQueryParams::new().add("action", action.as_str());
        Ok(self
            .client
            .post(Service::Core, &path, &query, &serde_json::json!({}))
            .await?
            .data)
    }

    /// Terminate an instance together with its boot volume.
    pub async fn terminate_instance(&self, instance_id: &str) -> Result<(), ApiError> {
        let path = format!("/instances/{}", instance_id);
        let query = ApiQueryParams::new().add("preserveBootVolume", false);
        self.client
            .delete(Service::Core, &path, &query)
            .await
            .map(|_| ())
    }

    pub async fn list_vnic_attachments(
        &self,
        compartment_id: &str,
        instance_id: &str,
    ) -> Result<Vec<VnicAttachment>, ApiError> {
        let query = ApiQueryParams::new()
            .add("compartmentId", compartment_id)
            .add("instanceId", instance_id);
        self.client
            .list_all(Service::Core, "/vnicAttachments", &query)
            .await
    }

    pub async fn get_vnic(&self, vnic_id: &str) -> Result<Vnic, ApiError> {
        let path = format!("/vnics/{}", vnic_id);
        Ok(self
            .client
            .get(Service::Core, &path, &ApiQueryParams::new())
            .await?
            .data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::tests::test_client;
    use mockito::{Matcher, Server};

    #[test]
    fn instance_deserializes_nested_details() {
        let instance: Instance = serde_json::from_str(
            r#"{
                "id": "ocid1.instance.oc1..i",
                "compartmentId": "c1",
                "availabilityDomain": "Uocm:PHX-AD-1",
                "shape": "VM.Standard.E4.Flex",
                "lifecycleState": "RUNNING",
                "shapeConfig": {"ocpus": 2.0, "memoryInGBs": 16.0, "gpus": 0},
                "sourceDetails": {"sourceType": "image", "imageId": "img", "bootVolumeSizeInGBs": 50},
                "metadata": {"ssh_authorized_keys": "ssh-rsa AAA"}
            }"#,
        )
        .unwrap();

        let shape = instance.shape_config.unwrap();
        assert_eq!(shape.ocpus, Some(2.0));
        assert_eq!(shape.memory_in_gbs, Some(16.0));
        let source = instance.source_details.unwrap();
        assert_eq!(source.boot_volume_size_in_gbs, Some(50));
        assert_eq!(instance.metadata["ssh_authorized_keys"], "ssh-rsa AAA");
        assert!(instance.freeform_tags.is_empty());
    }

    #[test]
    fn create_details_skip_unset_fields() {
        let details = CreateVcnDetails {
            compartment_id: "c1".to_string(),
            cidr_blocks: vec!["10.0.0.0/16".to_string()],
            display_name: None,
            dns_label: Some("main".to_string()),
            freeform_tags: None,
        };
        assert_eq!(
            serde_json::to_value(&details).unwrap(),
            serde_json::json!({
                "compartmentId": "c1",
                "cidrBlocks": ["10.0.0.0/16"],
                "dnsLabel": "main"
            })
        );
    }

    #[tokio::test]
    async fn instance_actions_use_query_parameter() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/20160918/instances/i1")
            .match_query(Matcher::UrlEncoded("action".into(), "STOP".into()))
            .with_body(
                r#"{"id":"i1","compartmentId":"c1","availabilityDomain":"AD-1","shape":"s","lifecycleState":"STOPPING"}"#,
            )
            .create_async()
            .await;

        let client = test_client(&server.url());
        let instance = client
            .core()
            .instance_action("i1", InstanceAction::Stop)
            .await
            .unwrap();
        assert_eq!(instance.lifecycle_state, "STOPPING");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn terminate_drops_boot_volume() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("DELETE", "/20160918/instances/i1")
            .match_query(Matcher::UrlEncoded(
                "preserveBootVolume".into(),
                "false".into(),
            ))
            .with_status(204)
            .create_async()
            .await;

        let client = test_client(&server.url());
        client.core().terminate_instance("i1").await.unwrap();
        mock.assert_async().await;
    }
}
