//! Project persistence.
//!
//! Stores hand out immutable [`ProjectSnapshot`]s. Every mutation builds a new
//! snapshot and swaps it in, so dispatch never holds a lock while matching.

use crate::config::{Endpoint, Project};
use crate::dispatcher::ProjectSnapshot;
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Fields of a project that can be updated in place.
#[derive(Debug, Clone, Default)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    /// `Some(None)` resets the project to the default not-found body.
    pub not_found_response: Option<Option<Value>>,
}

/// Persistence for projects, their endpoints, and resource collections.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn list_projects(&self, owner: Option<&str>) -> Vec<Arc<ProjectSnapshot>>;

    async fn get_project(&self, id: Uuid) -> Option<Arc<ProjectSnapshot>>;

    async fn create_project(&self, project: Project) -> Result<Arc<ProjectSnapshot>, StoreError>;

    async fn update_project(
        &self,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Arc<ProjectSnapshot>, StoreError>;

    /// Delete a project with all its endpoints and resources.
    async fn delete_project(&self, id: Uuid) -> Result<(), StoreError>;

    async fn create_endpoint(&self, project_id: Uuid, endpoint: Endpoint)
        -> Result<Endpoint, StoreError>;

    /// Replace an endpoint, keeping its id and position.
    async fn update_endpoint(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
        endpoint: Endpoint,
    ) -> Result<Endpoint, StoreError>;

    async fn delete_endpoint(&self, project_id: Uuid, endpoint_id: Uuid) -> Result<(), StoreError>;

    /// Create or replace a named resource collection.
    async fn put_resource(
        &self,
        project_id: Uuid,
        name: &str,
        records: Vec<Value>,
    ) -> Result<BTreeMap<String, Vec<Value>>, StoreError>;

    async fn delete_resource(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<Value>>, StoreError>;
}

/// In-memory project store.
#[derive(Debug, Default)]
pub struct InMemoryProjectStore {
    projects: RwLock<HashMap<Uuid, Arc<ProjectSnapshot>>>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with projects from configuration.
    ///
    /// A project whose id was already seeded is skipped; the first one wins.
    pub fn with_projects(projects: Vec<Project>) -> Self {
        let mut seeded = HashMap::with_capacity(projects.len());
        for project in projects {
            match seeded.entry(project.id) {
                Entry::Occupied(_) => {
                    warn!(
                        project_id = %project.id,
                        name = %project.name,
                        "Skipping seed project with duplicate id"
                    );
                }
                Entry::Vacant(slot) => {
                    slot.insert(Arc::new(ProjectSnapshot::new(project)));
                }
            }
        }

        Self {
            projects: RwLock::new(seeded),
        }
    }

    /// Apply `f` to a copy of the project and swap in the new snapshot.
    async fn modify<T: Send>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut Project) -> Result<T, StoreError> + Send,
    ) -> Result<(T, Arc<ProjectSnapshot>), StoreError> {
        let mut projects = self.projects.write().await;
        let current = projects.get(&id).ok_or(StoreError::ProjectNotFound(id))?;

        // Mutate a copy so readers keep the old snapshot until the swap
        let mut project = current.project().clone();
        let value = f(&mut project)?;
        project.updated_at = Utc::now();

        let snapshot = Arc::new(ProjectSnapshot::new(project));
        projects.insert(id, snapshot.clone());
        Ok((value, snapshot))
    }
}

fn validate_endpoint(endpoint: &Endpoint) -> Result<(), StoreError> {
    endpoint
        .validate()
        .map_err(|e| StoreError::Invalid(e.to_string()))
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn list_projects(&self, owner: Option<&str>) -> Vec<Arc<ProjectSnapshot>> {
        let projects = self.projects.read().await;
        let mut listed: Vec<_> = projects
            .values()
            .filter(|s| owner.is_none() || s.project().owner.as_deref() == owner)
            .cloned()
            .collect();
        listed.sort_by_key(|s| s.project().created_at);
        listed
    }

    async fn get_project(&self, id: Uuid) -> Option<Arc<ProjectSnapshot>> {
        self.projects.read().await.get(&id).cloned()
    }

    async fn create_project(&self, project: Project) -> Result<Arc<ProjectSnapshot>, StoreError> {
        project
            .validate()
            .map_err(|e| StoreError::Invalid(e.to_string()))?;

        // Reject id collisions
        let mut projects = self.projects.write().await;
        if projects.contains_key(&project.id) {
            return Err(StoreError::Invalid(format!(
                "project {} already exists",
                project.id
            )));
        }

        info!(
            project_id = %project.id,
            endpoints = project.endpoints.len(),
            "Project created"
        );
        let snapshot = Arc::new(ProjectSnapshot::new(project));
        projects.insert(snapshot.project().id, snapshot.clone());
        Ok(snapshot)
    }

    async fn update_project(
        &self,
        id: Uuid,
        update: ProjectUpdate,
    ) -> Result<Arc<ProjectSnapshot>, StoreError> {
        let (_, snapshot) = self
            .modify(id, |project| {
                if let Some(name) = update.name {
                    if name.trim().is_empty() {
                        return Err(StoreError::Invalid(
                            "Project name cannot be empty".to_string(),
                        ));
                    }
                    project.name = name;
                }
                // Explicit null resets to the default body
                if let Some(body) = update.not_found_response {
                    project.not_found_response = body;
                }
                Ok(())
            })
            .await?;
        Ok(snapshot)
    }

    async fn delete_project(&self, id: Uuid) -> Result<(), StoreError> {
        if self.projects.write().await.remove(&id).is_none() {
            return Err(StoreError::ProjectNotFound(id));
        }
        info!(project_id = %id, "Project deleted");
        Ok(())
    }

    async fn create_endpoint(
        &self,
        project_id: Uuid,
        mut endpoint: Endpoint,
    ) -> Result<Endpoint, StoreError> {
        // Server assigns endpoint ids
        validate_endpoint(&endpoint)?;
        endpoint.id = Uuid::new_v4();

        let (created, _) = self
            .modify(project_id, |project| {
                project.endpoints.push(endpoint.clone());
                Ok(endpoint)
            })
            .await?;
        Ok(created)
    }

    async fn update_endpoint(
        &self,
        project_id: Uuid,
        endpoint_id: Uuid,
        mut endpoint: Endpoint,
    ) -> Result<Endpoint, StoreError> {
        validate_endpoint(&endpoint)?;
        endpoint.id = endpoint_id;

        let (updated, _) = self
            .modify(project_id, |project| {
                let slot = project
                    .endpoints
                    .iter_mut()
                    .find(|e| e.id == endpoint_id)
                    .ok_or(StoreError::EndpointNotFound(endpoint_id))?;
                *slot = endpoint.clone();
                Ok(endpoint)
            })
            .await?;
        Ok(updated)
    }

    async fn delete_endpoint(&self, project_id: Uuid, endpoint_id: Uuid) -> Result<(), StoreError> {
        self.modify(project_id, |project| {
            let before = project.endpoints.len();
            project.endpoints.retain(|e| e.id != endpoint_id);
            if project.endpoints.len() == before {
                return Err(StoreError::EndpointNotFound(endpoint_id));
            }
            Ok(())
        })
        .await?;
        Ok(())
    }

    async fn put_resource(
        &self,
        project_id: Uuid,
        name: &str,
        records: Vec<Value>,
    ) -> Result<BTreeMap<String, Vec<Value>>, StoreError> {
        if name.trim().is_empty() {
            return Err(StoreError::Invalid("Resource name cannot be empty".to_string()));
        }

        let (resources, _) = self
            .modify(project_id, |project| {
                project.resources.insert(name.to_string(), records);
                Ok(project.resources.clone())
            })
            .await?;
        Ok(resources)
    }

    async fn delete_resource(
        &self,
        project_id: Uuid,
        name: &str,
    ) -> Result<BTreeMap<String, Vec<Value>>, StoreError> {
        let (resources, _) = self
            .modify(project_id, |project| {
                project
                    .resources
                    .remove(name)
                    .ok_or_else(|| StoreError::ResourceNotFound(name.to_string()))?;
                Ok(project.resources.clone())
            })
            .await?;
        Ok(resources)
    }
}
