//! Mock request dispatch: resolves an endpoint and synthesizes its response.

use crate::config::{Endpoint, Project, Settings};
use crate::matcher::{Binding, MatchResult, Matcher};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// A project together with its compiled endpoint matcher.
///
/// Snapshots are immutable; the store replaces them on every mutation.
#[derive(Debug, Clone)]
pub struct ProjectSnapshot {
    project: Project,
    matcher: Matcher,
}

impl ProjectSnapshot {
    pub fn new(project: Project) -> Self {
        let matcher = Matcher::new(&project.endpoints);
        Self { project, matcher }
    }

    pub fn project(&self) -> &Project {
        &self.project
    }

    /// Find the first endpoint matching the request.
    pub fn resolve(&self, method: &str, path: &str) -> Option<MatchResult<'_>> {
        self.matcher
            .find_match(&self.project.endpoints, method, path)
    }
}

/// How a response body was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Endpoint matched; static payload
    Static,
    /// Endpoint matched; record found in a resource collection
    Dynamic,
    /// Endpoint matched; dynamic lookup found nothing
    DynamicMiss,
    /// No endpoint matched
    NotFound,
}

/// Synthesized response handed to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    pub status: u16,
    /// `None` means an empty body
    pub body: Option<Value>,
    pub delay_ms: u64,
    pub outcome: Outcome,
}

impl MockResponse {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Build the response for a request against a project.
///
/// `resolved` is the result of endpoint resolution; `None` yields the
/// project's not-found response.
pub fn synthesize(project: &Project, resolved: Option<&MatchResult<'_>>) -> MockResponse {
    let Some(resolved) = resolved else {
        return MockResponse {
            status: 404,
            body: Some(project.not_found_body()),
            delay_ms: 0,
            outcome: Outcome::NotFound,
        };
    };

    let endpoint = resolved.endpoint;
    let (body, outcome) = match resolved.bindings.first() {
        Some(binding) if endpoint.prefer_dynamic_response => {
            match lookup_resource(project, binding) {
                Some(record) => (Some(record.clone()), Outcome::Dynamic),
                None => (None, Outcome::DynamicMiss),
            }
        }
        _ => (Some(endpoint.response_data.clone()), Outcome::Static),
    };

    MockResponse {
        status: endpoint.effective_status(),
        body,
        delay_ms: endpoint.delay,
        outcome,
    }
}

/// Find the first record in the binding's resource collection whose
/// `param` field equals the bound value, comparing string forms.
pub fn lookup_resource<'a>(project: &'a Project, binding: &Binding) -> Option<&'a Value> {
    let collection = project.resources.get(binding.resource.as_deref()?)?;

    collection.iter().find(|record| {
        record
            .get(&binding.param)
            .map(coerce_to_string)
            .is_some_and(|field| field == binding.value)
    })
}

/// String form of a field value for lookup comparison.
///
/// Follows the usual JSON-to-text rules of JavaScript hosts: integral floats
/// print without a fraction below `1e21`, larger or tiny magnitudes use
/// exponent form (`1e+21`), arrays join their items with `,`, and objects
/// print as `[object Object]`.
fn coerce_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if n.is_f64() => float_to_string(f),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Null => String::new(),
                other => coerce_to_string(other),
            })
            .collect::<Vec<_>>()
            .join(","),
        Value::Object(_) => "[object Object]".to_string(),
    }
}

fn float_to_string(f: f64) -> String {
    if f == 0.0 {
        return "0".to_string();
    }
    if (1e-6..1e21).contains(&f.abs()) {
        return format!("{f}");
    }

    let exp = format!("{f:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

/// Dispatch counters.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct DispatchStats {
    pub requests_total: u64,
    pub requests_matched: u64,
    pub requests_unmatched: u64,
    pub dynamic_lookups: u64,
    pub dynamic_misses: u64,
}

/// Mock request dispatcher.
///
/// Resolves requests against project snapshots, logs outcomes, keeps
/// counters, and applies the configured latency.
#[derive(Debug)]
pub struct Dispatcher {
    log_matches: bool,
    log_unmatched: bool,
    requests_total: AtomicU64,
    requests_matched: AtomicU64,
    requests_unmatched: AtomicU64,
    dynamic_lookups: AtomicU64,
    dynamic_misses: AtomicU64,
}

impl Dispatcher {
    pub fn new(settings: &Settings) -> Self {
        Self {
            log_matches: settings.log_matches,
            log_unmatched: settings.log_unmatched,
            requests_total: AtomicU64::new(0),
            requests_matched: AtomicU64::new(0),
            requests_unmatched: AtomicU64::new(0),
            dynamic_lookups: AtomicU64::new(0),
            dynamic_misses: AtomicU64::new(0),
        }
    }

    /// Resolve and synthesize without waiting for the delay.
    pub fn dispatch(&self, snapshot: &ProjectSnapshot, method: &str, path: &str) -> MockResponse {
        self.requests_total.fetch_add(1, Ordering::Relaxed);

        let project = snapshot.project();
        let resolved = snapshot.resolve(method, path);
        let response = synthesize(project, resolved.as_ref());

        match &resolved {
            Some(result) => self.record_match(project, result.endpoint, &response, method, path),
            None => {
                self.requests_unmatched.fetch_add(1, Ordering::Relaxed);
                if self.log_unmatched {
                    warn!(
                        project_id = %project.id,
                        method = %method,
                        path = %path,
                        "No matching endpoint found"
                    );
                }
            }
        }

        response
    }

    fn record_match(
        &self,
        project: &Project,
        endpoint: &Endpoint,
        response: &MockResponse,
        method: &str,
        path: &str,
    ) {
        self.requests_matched.fetch_add(1, Ordering::Relaxed);

        match response.outcome {
            Outcome::Dynamic => {
                self.dynamic_lookups.fetch_add(1, Ordering::Relaxed);
            }
            Outcome::DynamicMiss => {
                self.dynamic_lookups.fetch_add(1, Ordering::Relaxed);
                self.dynamic_misses.fetch_add(1, Ordering::Relaxed);
                debug!(
                    endpoint_id = %endpoint.id,
                    path = %path,
                    "Dynamic lookup found no record"
                );
            }
            _ => {}
        }

        if self.log_matches {
            info!(
                project_id = %project.id,
                endpoint_id = %endpoint.id,
                method = %method,
                path = %path,
                status = response.status,
                outcome = ?response.outcome,
                "Request matched endpoint"
            );
        }
    }

    /// Dispatch a request and return once its delay has elapsed.
    ///
    /// The delay is measured from the start of dispatch.
    pub async fn respond(
        &self,
        snapshot: &ProjectSnapshot,
        method: &str,
        path: &str,
    ) -> MockResponse {
        let started = Instant::now();
        let response = self.dispatch(snapshot, method, path);

        if response.delay_ms > 0 {
            debug!(delay_ms = response.delay_ms, "Applying delay");
            tokio::time::sleep_until(started + response.delay()).await;
        }

        response
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_matched: self.requests_matched.load(Ordering::Relaxed),
            requests_unmatched: self.requests_unmatched.load(Ordering::Relaxed),
            dynamic_lookups: self.dynamic_lookups.load(Ordering::Relaxed),
            dynamic_misses: self.dynamic_misses.load(Ordering::Relaxed),
        }
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(&Settings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HttpMethod;
    use serde_json::json;

    fn shop_project() -> Project {
        let yaml = r#"
projectName: shop
endpoints:
  - path: /products/:id
    method: GET
    preferDynamicResponse: true
    responseData:
      static: true
  - path: /products
    method: GET
    statusCode: 202
    delay: 50
    responseData:
      - id: "1"
  - path: /orders/:id
    method: GET
    responseData:
      static: order
  - path: /:id
    method: GET
    preferDynamicResponse: true
    responseData: fallback
  - path: /carts/:id
    method: GET
    statusCode: 201
    preferDynamicResponse: true
resources:
  products:
    - id: "1"
      name: A
    - id: "2"
      name: B
    - id: 3
      name: C
    - id: "2"
      name: duplicate
"#;
        serde_yaml::from_str(yaml).unwrap()
    }

    fn respond(project: &Project, method: &str, path: &str) -> MockResponse {
        let snapshot = ProjectSnapshot::new(project.clone());
        Dispatcher::default().dispatch(&snapshot, method, path)
    }

    #[test]
    fn test_dynamic_resolution() {
        let response = respond(&shop_project(), "GET", "/products/2");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, Some(json!({ "id": "2", "name": "B" })));
        assert_eq!(response.outcome, Outcome::Dynamic);
    }

    #[test]
    fn test_dynamic_lookup_coerces_numbers() {
        let response = respond(&shop_project(), "GET", "/products/3");
        assert_eq!(response.body, Some(json!({ "id": 3, "name": "C" })));
    }

    #[test]
    fn test_dynamic_miss_keeps_status() {
        let response = respond(&shop_project(), "GET", "/products/99");
        assert_eq!(response.status, 200);
        assert_eq!(response.body, None);
        assert_eq!(response.outcome, Outcome::DynamicMiss);
    }

    #[test]
    fn test_dynamic_missing_collection() {
        let response = respond(&shop_project(), "GET", "/carts/1");
        assert_eq!(response.status, 201);
        assert_eq!(response.body, None);
        assert_eq!(response.outcome, Outcome::DynamicMiss);
    }

    #[test]
    fn test_dynamic_without_owning_resource() {
        let response = respond(&shop_project(), "GET", "/5");
        assert_eq!(response.body, None);
        assert_eq!(response.outcome, Outcome::DynamicMiss);
    }

    #[test]
    fn test_static_response() {
        let response = respond(&shop_project(), "GET", "/products");
        assert_eq!(response.status, 202);
        assert_eq!(response.delay_ms, 50);
        assert_eq!(response.body, Some(json!([{ "id": "1" }])));
        assert_eq!(response.outcome, Outcome::Static);
    }

    #[test]
    fn test_static_when_dynamic_not_preferred() {
        let response = respond(&shop_project(), "GET", "/orders/1");
        assert_eq!(response.body, Some(json!({ "static": "order" })));
    }

    #[test]
    fn test_not_found_default_body() {
        let response = respond(&shop_project(), "POST", "/products");
        assert_eq!(response.status, 404);
        assert_eq!(response.delay_ms, 0);
        assert_eq!(
            response.body,
            Some(json!({ "status": "error", "message": "Path not found" }))
        );
    }

    #[test]
    fn test_not_found_custom_body() {
        let mut project = shop_project();
        project.not_found_response = Some(json!({ "oops": true }));
        let response = respond(&project, "GET", "/nothing/here/at/all");
        assert_eq!(response.status, 404);
        assert_eq!(response.body, Some(json!({ "oops": true })));
        assert_eq!(response.outcome, Outcome::NotFound);
    }

    #[test]
    fn test_only_first_binding_consulted() {
        let mut project = Project::new("nested");
        let mut endpoint = Endpoint::new(HttpMethod::Get, "/users/:id/posts/:post", json!(null));
        endpoint.prefer_dynamic_response = true;
        project.endpoints.push(endpoint);
        project.resources.insert(
            "users".to_string(),
            vec![json!({ "id": "7", "name": "u7" })],
        );
        project.resources.insert(
            "posts".to_string(),
            vec![json!({ "post": "1", "title": "p1" })],
        );

        let response = respond(&project, "GET", "/users/7/posts/1");
        assert_eq!(response.body, Some(json!({ "id": "7", "name": "u7" })));
    }

    #[test]
    fn test_coerce_to_string() {
        assert_eq!(coerce_to_string(&json!("x")), "x");
        assert_eq!(coerce_to_string(&json!(2)), "2");
        assert_eq!(coerce_to_string(&json!(2.0)), "2");
        assert_eq!(coerce_to_string(&json!(2.5)), "2.5");
        assert_eq!(coerce_to_string(&json!(true)), "true");
        assert_eq!(coerce_to_string(&json!(null)), "null");
        assert_eq!(coerce_to_string(&json!([1, "a"])), "1,a");
        assert_eq!(coerce_to_string(&json!([1, null, 2])), "1,,2");
        assert_eq!(coerce_to_string(&json!({ "a": 1 })), "[object Object]");
    }

    #[test]
    fn test_coerce_large_and_nested_values() {
        assert_eq!(coerce_to_string(&json!(1e16)), "10000000000000000");
        assert_eq!(coerce_to_string(&json!(1.5e20)), "150000000000000000000");
        assert_eq!(coerce_to_string(&json!(1e21)), "1e+21");
        assert_eq!(coerce_to_string(&json!(1e-7)), "1e-7");
        assert_eq!(coerce_to_string(&json!(-0.0)), "0");
        assert_eq!(coerce_to_string(&json!([{ "a": 1 }])), "[object Object]");
        assert_eq!(coerce_to_string(&json!([[1, 2], 3])), "1,2,3");
    }

    #[test]
    fn test_lookup_matches_large_integral_float() {
        let mut project = shop_project();
        project
            .resources
            .insert("orders".to_string(), vec![json!({ "id": 1e16, "total": 9 })]);
        let binding = Binding {
            resource: Some("orders".to_string()),
            param: "id".to_string(),
            value: "10000000000000000".to_string(),
        };

        assert_eq!(
            lookup_resource(&project, &binding).cloned(),
            Some(json!({ "id": 1e16, "total": 9 }))
        );
    }

    #[test]
    fn test_stats_counters() {
        let snapshot = ProjectSnapshot::new(shop_project());
        let dispatcher = Dispatcher::default();

        dispatcher.dispatch(&snapshot, "GET", "/products/1");
        dispatcher.dispatch(&snapshot, "GET", "/products/99");
        dispatcher.dispatch(&snapshot, "GET", "/products");
        dispatcher.dispatch(&snapshot, "GET", "/missing/a/b");

        let stats = dispatcher.stats();
        assert_eq!(stats.requests_total, 4);
        assert_eq!(stats.requests_matched, 3);
        assert_eq!(stats.requests_unmatched, 1);
        assert_eq!(stats.dynamic_lookups, 2);
        assert_eq!(stats.dynamic_misses, 1);
    }

    #[tokio::test]
    async fn test_respond_waits_for_delay() {
        let snapshot = ProjectSnapshot::new(shop_project());
        let dispatcher = Dispatcher::default();

        let started = std::time::Instant::now();
        let response = dispatcher.respond(&snapshot, "GET", "/products").await;
        assert_eq!(response.delay_ms, 50);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_delays_run_concurrently() {
        let mut project = shop_project();
        project.endpoints[1].delay = 300;
        let snapshot = ProjectSnapshot::new(project);
        let dispatcher = Dispatcher::default();

        let started = std::time::Instant::now();
        let slow = async {
            dispatcher.respond(&snapshot, "GET", "/products").await;
            started.elapsed()
        };
        let fast = async {
            dispatcher.respond(&snapshot, "GET", "/orders/1").await;
            started.elapsed()
        };
        let (slow_elapsed, fast_elapsed) = tokio::join!(slow, fast);

        assert!(slow_elapsed >= Duration::from_millis(300));
        assert!(fast_elapsed < Duration::from_millis(300));
    }
}
