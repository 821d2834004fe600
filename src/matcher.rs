//! Request matching logic.
//!
//! Matches incoming requests against a project's endpoints and binds path
//! parameters to the resource collections that own them.
//!
//! Patterns are plain `/`-separated segments. A segment starting with `:` is a
//! placeholder for exactly one non-empty request segment; every other segment
//! must match byte for byte.

use crate::config::Endpoint;

/// Strip exactly one leading and one trailing `/`.
pub fn normalize(path: &str) -> &str {
    let path = path.strip_prefix('/').unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

fn split_segments(path: &str) -> Vec<&str> {
    normalize(path).split('/').collect()
}

/// Returns true if `request_path` matches `pattern`.
pub fn matches(pattern: &str, request_path: &str) -> bool {
    PathPattern::parse(pattern).matches(request_path)
}

/// A parameter bound from a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    /// Literal segment preceding the parameter, if any
    pub resource: Option<String>,
    /// Parameter name without the leading colon
    pub param: String,
    /// Request segment captured by the parameter
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Param(String),
}

/// A pre-parsed endpoint path pattern.
#[derive(Debug, Clone)]
pub struct PathPattern {
    segments: Vec<Segment>,
}

impl PathPattern {
    pub fn parse(pattern: &str) -> Self {
        let segments = split_segments(pattern)
            .into_iter()
            .map(|segment| match segment.strip_prefix(':') {
                Some(name) => Segment::Param(name.to_string()),
                None => Segment::Literal(segment.to_string()),
            })
            .collect();

        Self { segments }
    }

    /// Number of placeholders in the pattern.
    pub fn param_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, Segment::Param(_)))
            .count()
    }

    pub fn matches(&self, request_path: &str) -> bool {
        self.matches_segments(&split_segments(request_path))
    }

    fn matches_segments(&self, request: &[&str]) -> bool {
        if self.segments.len() != request.len() {
            return false;
        }

        self.segments
            .iter()
            .zip(request)
            .all(|(segment, actual)| match segment {
                Segment::Literal(lit) => lit == actual,
                Segment::Param(_) => !actual.is_empty(),
            })
    }

    /// Bind each placeholder to the request segment at the same position.
    ///
    /// The owning resource of a placeholder is the last literal segment seen
    /// before it. Literal segments never produce bindings.
    pub fn bind(&self, request: &[&str]) -> Vec<Binding> {
        let mut resources: Vec<&str> = Vec::new();
        let mut bindings = Vec::new();

        for (segment, value) in self.segments.iter().zip(request) {
            match segment {
                Segment::Literal(lit) => resources.push(lit),
                Segment::Param(name) => bindings.push(Binding {
                    resource: resources.last().map(|r| r.to_string()),
                    param: name.clone(),
                    value: value.to_string(),
                }),
            }
        }

        bindings
    }
}

/// Result of matching a request against a project's endpoints.
#[derive(Debug)]
pub struct MatchResult<'a> {
    /// The matched endpoint
    pub endpoint: &'a Endpoint,
    /// Parameters bound from the request path, in pattern order
    pub bindings: Vec<Binding>,
}

/// Request matcher engine.
///
/// Holds one compiled pattern per endpoint, index-aligned with the endpoint
/// list it was built from.
#[derive(Debug, Clone)]
pub struct Matcher {
    patterns: Vec<PathPattern>,
}

impl Matcher {
    /// Create a new matcher from endpoint definitions.
    pub fn new(endpoints: &[Endpoint]) -> Self {
        let patterns = endpoints
            .iter()
            .map(|endpoint| PathPattern::parse(&endpoint.path))
            .collect();

        Self { patterns }
    }

    /// Find the first endpoint matching the request, in definition order.
    pub fn find_match<'a>(
        &self,
        endpoints: &'a [Endpoint],
        method: &str,
        path: &str,
    ) -> Option<MatchResult<'a>> {
        let request = split_segments(path);

        endpoints
            .iter()
            .zip(&self.patterns)
            .find(|(endpoint, pattern)| {
                endpoint.method.matches(method) && pattern.matches_segments(&request)
            })
            .map(|(endpoint, pattern)| MatchResult {
                endpoint,
                bindings: pattern.bind(&request),
            })
    }
}
