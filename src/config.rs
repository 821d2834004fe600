//! Configuration for the mock API server.
//!
//! Defines projects, endpoints, resource collections, and server settings.

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

/// Main configuration for the mock API server.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Global settings
    #[serde(default)]
    pub settings: Settings,

    /// Projects loaded into the store on start
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl ServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut ids = HashSet::new();
        for (i, project) in self.projects.iter().enumerate() {
            project
                .validate()
                .map_err(|e| anyhow::anyhow!("Project {} ({}): {}", i, project.name, e))?;
            if !ids.insert(project.id) {
                anyhow::bail!("Project {} ({}): duplicate project id {}", i, project.name, project.id);
            }
        }
        Ok(())
    }
}

/// A mock project: a named set of endpoints and resource collections.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    #[serde(rename = "projectName")]
    pub name: String,

    /// Owning user; not authenticated
    #[serde(default)]
    pub owner: Option<String>,

    /// Endpoints in definition order (first match wins)
    #[serde(default)]
    pub endpoints: Vec<Endpoint>,

    /// Named resource collections used for dynamic responses
    #[serde(default)]
    pub resources: BTreeMap<String, Vec<Value>>,

    /// Body returned when no endpoint matches
    #[serde(default)]
    pub not_found_response: Option<Value>,

    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl Project {
    /// Create an empty project.
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            owner: None,
            endpoints: Vec::new(),
            resources: BTreeMap::new(),
            not_found_response: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// The body sent for requests that match no endpoint.
    pub fn not_found_body(&self) -> Value {
        self.not_found_response
            .clone()
            .unwrap_or_else(default_not_found_body)
    }

    /// Validate the project definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.trim().is_empty() {
            anyhow::bail!("Project name cannot be empty");
        }
        let mut ids = HashSet::new();
        for (i, endpoint) in self.endpoints.iter().enumerate() {
            endpoint
                .validate()
                .map_err(|e| anyhow::anyhow!("Endpoint {} ({}): {}", i, endpoint.path, e))?;
            if !ids.insert(endpoint.id) {
                anyhow::bail!("Endpoint {} ({}): duplicate endpoint id {}", i, endpoint.path, endpoint.id);
            }
        }
        Ok(())
    }
}

/// Generic not-found payload used when a project has none configured.
pub fn default_not_found_body() -> Value {
    json!({ "status": "error", "message": "Path not found" })
}

/// A single mock endpoint: one (method, path pattern) to response rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(default = "Uuid::new_v4")]
    pub id: Uuid,

    /// Path pattern, e.g. `/products/:id`
    pub path: String,

    pub method: HttpMethod,

    #[serde(default)]
    pub description: Option<String>,

    /// Static response payload
    #[serde(default)]
    pub response_data: Value,

    #[serde(default = "default_status")]
    pub status_code: u16,

    /// Artificial latency in milliseconds
    #[serde(default)]
    pub delay: u64,

    /// Resolve the body from a resource collection when the path has a parameter
    #[serde(default)]
    pub prefer_dynamic_response: bool,

    /// Stored with the endpoint; dispatch does not consult it
    #[serde(default)]
    pub not_found_response: Option<Value>,
}

fn default_status() -> u16 {
    200
}

impl Endpoint {
    /// Create an endpoint with default status, no delay, and a static body.
    pub fn new(method: HttpMethod, path: impl Into<String>, response_data: Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
            method,
            description: None,
            response_data,
            status_code: default_status(),
            delay: 0,
            prefer_dynamic_response: false,
            not_found_response: None,
        }
    }

    /// Status code to respond with; an unset (zero) code means 200.
    pub fn effective_status(&self) -> u16 {
        if self.status_code == 0 {
            default_status()
        } else {
            self.status_code
        }
    }

    /// Validate the endpoint definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.path.trim().is_empty() {
            anyhow::bail!("Endpoint path cannot be empty");
        }
        if self.status_code != 0 && !(100..=599).contains(&self.status_code) {
            anyhow::bail!("Invalid status code: {}", self.status_code);
        }
        for segment in self.path.split('/') {
            if let Some(name) = segment.strip_prefix(':') {
                if !param_name_regex().is_match(name) {
                    anyhow::bail!("Invalid path parameter name: {:?}", segment);
                }
            }
        }
        Ok(())
    }
}

fn param_name_regex() -> &'static Regex {
    static PARAM_NAME: OnceLock<Regex> = OnceLock::new();
    PARAM_NAME.get_or_init(|| Regex::new(r"^\w+$").expect("static regex"))
}

/// HTTP methods an endpoint may be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", try_from = "String")]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Options,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Options => "OPTIONS",
        }
    }

    /// Case-insensitive comparison against a request method.
    pub fn matches(&self, method: &str) -> bool {
        self.as_str().eq_ignore_ascii_case(method)
    }
}

impl TryFrom<String> for HttpMethod {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HttpMethod {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(HttpMethod::Get),
            "POST" => Ok(HttpMethod::Post),
            "PUT" => Ok(HttpMethod::Put),
            "PATCH" => Ok(HttpMethod::Patch),
            "DELETE" => Ok(HttpMethod::Delete),
            "OPTIONS" => Ok(HttpMethod::Options),
            other => anyhow::bail!("Unsupported method: {}", other),
        }
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Address the HTTP server binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Base URL used when rendering public mock URLs
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Allowed CORS origins (empty = any)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Log all matched endpoints
    #[serde(default = "default_true")]
    pub log_matches: bool,

    /// Log unmatched requests
    #[serde(default = "default_true")]
    pub log_unmatched: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_base_url: default_public_base_url(),
            cors_origins: Vec::new(),
            log_matches: true,
            log_unmatched: true,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 3000))
}

fn default_public_base_url() -> String {
    "http://localhost:3000".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_simple_project() {
        let yaml = r#"
projects:
  - projectName: shop
    endpoints:
      - path: /products
        method: GET
        responseData:
          - id: "1"
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.projects.len(), 1);
        let endpoint = &config.projects[0].endpoints[0];
        assert_eq!(endpoint.method, HttpMethod::Get);
        assert_eq!(endpoint.status_code, 200);
        assert_eq!(endpoint.delay, 0);
        assert!(!endpoint.prefer_dynamic_response);
    }

    #[test]
    fn test_parse_dynamic_endpoint_and_resources() {
        let yaml = r#"
projects:
  - projectName: shop
    notFoundResponse:
      error: nope
    endpoints:
      - path: /products/:id
        method: get
        statusCode: 201
        delay: 250
        preferDynamicResponse: true
    resources:
      products:
        - id: "1"
          name: A
"#;
        let config: ServerConfig = serde_yaml::from_str(yaml).unwrap();
        let project = &config.projects[0];
        let endpoint = &project.endpoints[0];
        assert_eq!(endpoint.status_code, 201);
        assert_eq!(endpoint.delay, 250);
        assert!(endpoint.prefer_dynamic_response);
        assert_eq!(project.resources["products"].len(), 1);
        assert_eq!(project.not_found_body(), json!({ "error": "nope" }));
    }

    #[test]
    fn test_unsupported_method_rejected() {
        let yaml = r#"
projects:
  - projectName: shop
    endpoints:
      - path: /x
        method: TRACE
"#;
        assert!(serde_yaml::from_str::<ServerConfig>(yaml).is_err());
    }

    #[test]
    fn test_default_not_found_body() {
        let project = Project::new("demo");
        assert_eq!(
            project.not_found_body(),
            json!({ "status": "error", "message": "Path not found" })
        );
    }

    #[test]
    fn test_endpoint_validation() {
        let ok = Endpoint::new(HttpMethod::Get, "/users/:user_id", Value::Null);
        assert!(ok.validate().is_ok());

        let bad_param = Endpoint::new(HttpMethod::Get, "/users/:", Value::Null);
        assert!(bad_param.validate().is_err());

        let bad_param = Endpoint::new(HttpMethod::Get, "/users/:id-x", Value::Null);
        assert!(bad_param.validate().is_err());

        let mut bad_status = Endpoint::new(HttpMethod::Get, "/users", Value::Null);
        bad_status.status_code = 700;
        assert!(bad_status.validate().is_err());

        let empty = Endpoint::new(HttpMethod::Get, "  ", Value::Null);
        assert!(empty.validate().is_err());
    }

    #[test]
    fn test_effective_status() {
        let mut endpoint = Endpoint::new(HttpMethod::Post, "/a", Value::Null);
        assert_eq!(endpoint.effective_status(), 200);
        endpoint.status_code = 0;
        assert_eq!(endpoint.effective_status(), 200);
        endpoint.status_code = 418;
        assert_eq!(endpoint.effective_status(), 418);
    }

    #[test]
    fn test_method_parsing() {
        assert_eq!("patch".parse::<HttpMethod>().unwrap(), HttpMethod::Patch);
        assert!("head".parse::<HttpMethod>().is_err());
        assert!(HttpMethod::Delete.matches("delete"));
        assert!(!HttpMethod::Delete.matches("GET"));
    }

    #[test]
    fn test_bundled_default_config_is_valid() {
        let config: ServerConfig =
            serde_yaml::from_str(include_str!("../config/default-config.yaml")).unwrap();
        config.validate().unwrap();
        assert_eq!(config.projects[0].endpoints.len(), 3);
    }

    #[test]
    fn test_duplicate_project_ids_rejected() {
        let a = Project::new("a");
        let mut b = Project::new("b");
        b.id = a.id;
        let config = ServerConfig {
            projects: vec![a, b],
            ..ServerConfig::default()
        };

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate project id"));
    }

    #[test]
    fn test_duplicate_endpoint_ids_rejected() {
        let first = Endpoint::new(HttpMethod::Get, "/a", Value::Null);
        let mut second = Endpoint::new(HttpMethod::Post, "/b", Value::Null);
        second.id = first.id;
        let mut project = Project::new("shop");
        project.endpoints = vec![first, second];

        let err = project.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate endpoint id"));

        let config = ServerConfig {
            projects: vec![project],
            ..ServerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file_validates() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "settings:\n  listen: 0.0.0.0:8080\nprojects:\n  - projectName: \"\"\n"
        )
        .unwrap();
        assert!(ServerConfig::from_file(file.path()).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "settings:\n  listen: 0.0.0.0:8080\n").unwrap();
        let config = ServerConfig::from_file(file.path()).unwrap();
        assert_eq!(config.settings.listen.port(), 8080);
        assert!(config.settings.log_matches);
    }
}
