// HTTP request and response descriptors

use crate::Extensions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// HTTP request descriptor
///
/// Carries everything the tenancy layer needs from an inbound request:
/// headers, route parameters, query string values, the body, and typed
/// per-request extensions attached by middleware.
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    pub path_params: HashMap<String, String>,
    pub query_params: HashMap<String, String>,
    pub extensions: Extensions,
}

impl HttpRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Add a header (names are stored lowercase)
    pub fn with_header(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Add a route parameter
    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_params.insert(name.into(), value.into());
        self
    }

    /// Add a query parameter
    pub fn with_query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.query_params.insert(name.into(), value.into());
        self
    }

    /// Set the body
    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Set a JSON body
    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value.as_str());
        }
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The `Host` header, if present
    pub fn host(&self) -> Option<&str> {
        self.header("host")
    }

    /// Parse the request body as JSON
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, crate::Error> {
        serde_json::from_slice(&self.body).map_err(|e| crate::Error::Deserialization(e.to_string()))
    }

    /// Get a path parameter by name
    pub fn param(&self, name: &str) -> Option<&String> {
        self.path_params.get(name)
    }

    /// Get a query parameter by name
    pub fn query(&self, name: &str) -> Option<&String> {
        self.query_params.get(name)
    }
}

/// HTTP response descriptor
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: HashMap::new(),
            body: Vec::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(200)
    }

    pub fn created() -> Self {
        Self::new(201)
    }

    pub fn no_content() -> Self {
        Self::new(204)
    }

    /// 200 response with a JSON body
    pub fn json<T: Serialize>(value: &T) -> Result<Self, crate::Error> {
        Self::ok().with_json(value)
    }

    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    pub fn with_json<T: Serialize>(mut self, value: &T) -> Result<Self, crate::Error> {
        self.body =
            serde_json::to_vec(value).map_err(|e| crate::Error::Serialization(e.to_string()))?;
        self.headers
            .insert("content-type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn with_header(mut self, key: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.headers
            .insert(key.as_ref().to_ascii_lowercase(), value.into());
        self
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut request = HttpRequest::new("GET", "/api/users");
        request
            .headers
            .insert("X-Tenant-Slug".to_string(), "acme".to_string());

        assert_eq!(request.header("x-tenant-slug"), Some("acme"));
        assert_eq!(request.header("X-TENANT-SLUG"), Some("acme"));
        assert_eq!(request.header("x-other"), None);
    }

    #[test]
    fn test_request_builder() {
        let request = HttpRequest::new("GET", "/orgs/acme/users")
            .with_header("Host", "acme.example.com")
            .with_param("tenantSlug", "acme")
            .with_query("page", "2");

        assert_eq!(request.host(), Some("acme.example.com"));
        assert_eq!(request.param("tenantSlug"), Some(&"acme".to_string()));
        assert_eq!(request.query("page"), Some(&"2".to_string()));
    }

    #[test]
    fn test_json_round_trip() {
        #[derive(Serialize, Deserialize, PartialEq, Debug)]
        struct Payload {
            name: String,
        }

        let request = HttpRequest::new("POST", "/api/tenants")
            .with_json(&Payload {
                name: "Acme Inc.".to_string(),
            })
            .unwrap();

        let payload: Payload = request.json().unwrap();
        assert_eq!(payload.name, "Acme Inc.");
        assert_eq!(request.header("content-type"), Some("application/json"));
    }

    #[test]
    fn test_invalid_json_is_client_error() {
        let request = HttpRequest::new("POST", "/").with_body(b"{not json".to_vec());
        let result: Result<serde_json::Value, _> = request.json();
        assert!(result.unwrap_err().is_client_error());
    }

    #[test]
    fn test_response_helpers() {
        let response = HttpResponse::created().with_header("X-Tenant-Id", "t-1");
        assert_eq!(response.status, 201);
        assert_eq!(response.header("x-tenant-id"), Some("t-1"));
        assert!(response.is_success());
        assert!(!HttpResponse::new(404).is_success());
    }
}
