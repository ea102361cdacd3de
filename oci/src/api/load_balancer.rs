//! Load Balancing API (version 20170115)
//!
//! Every mutating call is asynchronous: OCI answers with an
//! `opc-work-request-id` header and the change is applied once that work
//! request succeeds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::client::{Client, Service};
use super::common::{ApiQueryParams, ResponseHeaders};
use super::error::ApiError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShapeDetails {
    pub minimum_bandwidth_in_mbps: i64,
    pub maximum_bandwidth_in_mbps: i64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IpAddress {
    pub ip_address: String,
    #[serde(default)]
    pub is_public: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadBalancer {
    pub id: String,
    pub compartment_id: String,
    pub display_name: String,
    pub shape_name: String,
    #[serde(default)]
    pub shape_details: Option<ShapeDetails>,
    #[serde(default)]
    pub ip_addresses: Vec<IpAddress>,
    #[serde(default)]
    pub subnet_ids: Vec<String>,
    #[serde(default)]
    pub is_private: Option<bool>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub time_created: Option<String>,
    #[serde(default)]
    pub freeform_tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoadBalancerDetails {
    pub compartment_id: String,
    pub display_name: String,
    pub shape_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_details: Option<ShapeDetails>,
    pub subnet_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_private: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoadBalancerDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub freeform_tags: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLoadBalancerShapeDetails {
    pub shape_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub shape_details: Option<ShapeDetails>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthChecker {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interval_in_millis: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_in_millis: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retries: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body_regex: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backend {
    pub name: String,
    pub ip_address: String,
    pub port: i64,
    #[serde(default)]
    pub weight: Option<i64>,
    #[serde(default)]
    pub backup: bool,
    #[serde(default)]
    pub drain: bool,
    #[serde(default)]
    pub offline: bool,
}

/// Backend as sent in create and backend set update requests
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendDetails {
    pub ip_address: String,
    pub port: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weight: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub drain: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offline: Option<bool>,
}

impl From<&Backend> for BackendDetails {
    fn from(backend: &Backend) -> Self {
        Self {
            ip_address: backend.ip_address.clone(),
            port: backend.port,
            weight: backend.weight,
            backup: Some(backend.backup),
            drain: Some(backend.drain),
            offline: Some(backend.offline),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBackendDetails {
    pub weight: i64,
    pub backup: bool,
    pub drain: bool,
    pub offline: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendSet {
    pub name: String,
    pub policy: String,
    pub health_checker: HealthChecker,
    #[serde(default)]
    pub backends: Vec<Backend>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBackendSetDetails {
    pub name: String,
    pub policy: String,
    pub health_checker: HealthChecker,
    pub backends: Vec<BackendDetails>,
}

/// Replaces the whole backend set, backends included.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBackendSetDetails {
    pub policy: String,
    pub health_checker: HealthChecker,
    pub backends: Vec<BackendDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequestError {
    #[serde(default)]
    pub error_code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkRequest {
    pub id: String,
    pub load_balancer_id: String,
    #[serde(rename = "type", default)]
    pub operation: Option<String>,
    pub lifecycle_state: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error_details: Vec<WorkRequestError>,
}

impl WorkRequest {
    /// Human readable failure reason, falling back to the status message.
    pub fn failure_message(&self) -> String {
        let details: Vec<String> = self
            .error_details
            .iter()
            .filter_map(|e| match (&e.error_code, &e.message) {
                (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
                (None, Some(message)) => Some(message.clone()),
                (Some(code), None) => Some(code.clone()),
                (None, None) => None,
            })
            .collect();
        if details.is_empty() {
            self.message
                .clone()
                .unwrap_or_else(|| "no details reported".to_string())
        } else {
            details.join("; ")
        }
    }
}

fn work_request_id(headers: ResponseHeaders) -> Result<String, ApiError> {
    headers
        .work_request_id
        .ok_or(ApiError::MissingHeader("opc-work-request-id"))
}

fn backend_set_path(load_balancer_id: &str, backend_set_name: &str) -> String {
    format!(
        "/loadBalancers/{}/backendSets/{}",
        load_balancer_id,
        urlencoding::encode(backend_set_name)
    )
}

fn backend_path(load_balancer_id: &str, backend_set_name: &str, backend_name: &str) -> String {
    format!(
        "{}/backends/{}",
        backend_set_path(load_balancer_id, backend_set_name),
        urlencoding::encode(backend_name)
    )
}

pub struct LoadBalancerApi<'a> {
    client: &'a Client,
}

impl<'a> LoadBalancerApi<'a> {
    pub fn new(client: &'a Client) -> Self {
        Self { client }
    }

    /// Returns the work request id.
    pub async fn create_load_balancer(
        &self,
        details: &CreateLoadBalancerDetails,
    ) -> Result<String, ApiError> {
        let response = self
            .client
            .post::<(), _>(
                Service::LoadBalancer,
                "/loadBalancers",
                &ApiQueryParams::new(),
                details,
            )
            .await?;
        work_request_id(response.headers)
    }

    pub async fn get_load_balancer(&self, load_balancer_id: &str) -> Result<LoadBalancer, ApiError> {
        let path = format!("/loadBalancers/{}", load_balancer_id);
        Ok(self
            .client
            .get(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_load_balancer(
        &self,
        load_balancer_id: &str,
        details: &UpdateLoadBalancerDetails,
    ) -> Result<String, ApiError> {
        let path = format!("/loadBalancers/{}", load_balancer_id);
        let response = self
            .client
            .put::<(), _>(Service::LoadBalancer, &path, details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn update_load_balancer_shape(
        &self,
        load_balancer_id: &str,
        details: &UpdateLoadBalancerShapeDetails,
    ) -> Result<String, ApiError> {
        let path = format!("/loadBalancers/{}/updateShape", load_balancer_id);
        let response = self
            .client
            .put::<(), _>(Service::LoadBalancer, &path, details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn delete_load_balancer(&self, load_balancer_id: &str) -> Result<String, ApiError> {
        let path = format!("/loadBalancers/{}", load_balancer_id);
        let headers = self
            .client
            .delete(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?;
        work_request_id(headers)
    }

    pub async fn create_backend_set(
        &self,
        load_balancer_id: &str,
        details: &CreateBackendSetDetails,
    ) -> Result<String, ApiError> {
        let path = format!("/loadBalancers/{}/backendSets", load_balancer_id);
        let response = self
            .client
            .post::<(), _>(Service::LoadBalancer, &path, &ApiQueryParams::new(), details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn get_backend_set(
        &self,
        load_balancer_id: &str,
        name: &str,
    ) -> Result<BackendSet, ApiError> {
        let path = backend_set_path(load_balancer_id, name);
        Ok(self
            .client
            .get(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_backend_set(
        &self,
        load_balancer_id: &str,
        name: &str,
        details: &UpdateBackendSetDetails,
    ) -> Result<String, ApiError> {
        let path = backend_set_path(load_balancer_id, name);
        let response = self
            .client
            .put::<(), _>(Service::LoadBalancer, &path, details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn delete_backend_set(
        &self,
        load_balancer_id: &str,
        name: &str,
    ) -> Result<String, ApiError> {
        let path = backend_set_path(load_balancer_id, name);
        let headers = self
            .client
            .delete(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?;
        work_request_id(headers)
    }

    pub async fn create_backend(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        details: &BackendDetails,
    ) -> Result<String, ApiError> {
        let path = format!("{}/backends", backend_set_path(load_balancer_id, backend_set_name));
        let response = self
            .client
            .post::<(), _>(Service::LoadBalancer, &path, &ApiQueryParams::new(), details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn get_backend(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        backend_name: &str,
    ) -> Result<Backend, ApiError> {
        let path = backend_path(load_balancer_id, backend_set_name, backend_name);
        Ok(self
            .client
            .get(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?
            .data)
    }

    pub async fn update_backend(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        backend_name: &str,
        details: &UpdateBackendDetails,
    ) -> Result<String, ApiError> {
        let path = backend_path(load_balancer_id, backend_set_name, backend_name);
        let response = self
            .client
            .put::<(), _>(Service::LoadBalancer, &path, details)
            .await?;
        work_request_id(response.headers)
    }

    pub async fn delete_backend(
        &self,
        load_balancer_id: &str,
        backend_set_name: &str,
        backend_name: &str,
    ) -> Result<String, ApiError> {
        let path = backend_path(load_balancer_id, backend_set_name, backend_name);
        let headers = self
            .client
            .delete(Service::LoadBalancer, &path, &ApiQueryParams::new())
            .await?;
        work_request_id(headers)
    }

    pub async fn get_work_request(&self, work_request_id: &str) -> Result<WorkRequest, ApiError> {
        let path = format!("/loadBalancerWorkRequests/{}", work_request_id);
        Ok(self
            .client
            .get(Service::LoadBalancer, &path, &ApiQueryParams::new())
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
    fn backend_paths_escape_names() {
        assert_eq!(
            backend_path("lb1", "web set", "10.0.0.3:80"),
            "/loadBalancers/lb1/backendSets/web%20set/backends/10.0.0.3%3A80"
        );
    }

    #[test]
    fn work_request_failure_prefers_error_details() {
        let request: WorkRequest = serde_json::from_str(
            r#"{
                "id": "wr1",
                "loadBalancerId": "lb1",
                "type": "CreateBackend",
                "lifecycleState": "FAILED",
                "message": "failed",
                "errorDetails": [{"errorCode": "BAD_INPUT", "message": "port out of range"}]
            }"#,
        )
        .unwrap();
        assert_eq!(request.failure_message(), "BAD_INPUT: port out of range");
        assert_eq!(request.operation.as_deref(), Some("CreateBackend"));

        let bare: WorkRequest = serde_json::from_str(
            r#"{"id":"wr2","loadBalancerId":"lb1","lifecycleState":"FAILED","message":"quota exceeded"}"#,
        )
        .unwrap();
        assert_eq!(bare.failure_message(), "quota exceeded");
    }

    #[tokio::test]
    async fn mutations_return_work_request_ids() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("POST", "/20170115/loadBalancers/lb1/backendSets")
            .match_body(Matcher::PartialJsonString(r#"{"name":"web","policy":"ROUND_ROBIN"}"#.to_string()))
            .with_status(204)
            .with_header("opc-work-request-id", "wr-1")
            .create_async()
            .await;

        let client = test_client(&server.url());
        let details = CreateBackendSetDetails {
            name: "web".to_string(),
            policy: "ROUND_ROBIN".to_string(),
            health_checker: HealthChecker {
                protocol: "HTTP".to_string(),
                port: Some(80),
                url_path: Some("/".to_string()),
                return_code: None,
                interval_in_millis: None,
                timeout_in_millis: None,
                retries: None,
                response_body_regex: None,
            },
            backends: vec![],
        };
        let id = client
            .load_balancer()
            .create_backend_set("lb1", &details)
            .await
            .unwrap();
        assert_eq!(id, "wr-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn missing_work_request_header_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("DELETE", "/20170115/loadBalancers/lb1")
            .with_status(204)
            .create_async()
            .await;

        let client = test_client(&server.url());
        let error = client
            .load_balancer()
            .delete_load_balancer("lb1")
            .await
            .unwrap_err();
        assert!(matches!(error, ApiError::MissingHeader("opc-work-request-id")));
    }
}
