//! Mock API Server
//!
//! Serves user-defined projects as live mock APIs. Each project holds an
//! ordered list of endpoints and a set of named resource collections.
//!
//! # Features
//!
//! - **Path Patterns**: `/users/:id` style patterns, one segment per parameter
//! - **First Match Wins**: endpoints are tried in definition order
//! - **Static Responses**: return the endpoint's stored payload
//! - **Dynamic Responses**: look up a record in the resource collection named
//!   by the literal segment before the first path parameter
//! - **Latency Simulation**: per-endpoint delay without blocking other requests
//! - **Management API**: CRUD for projects, endpoints, and resources
//!
//! # Example Configuration
//!
//! ```yaml
//! settings:
//!   listen: 127.0.0.1:3000
//! projects:
//!   - projectName: shop
//!     endpoints:
//!       - path: /products/:id
//!         method: GET
//!         preferDynamicResponse: true
//!     resources:
//!       products:
//!         - id: "1"
//!           name: Keyboard
//! ```

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod matcher;
pub mod server;
pub mod store;

pub use config::ServerConfig;
pub use dispatcher::{Dispatcher, MockResponse, ProjectSnapshot};
pub use server::build_app;
