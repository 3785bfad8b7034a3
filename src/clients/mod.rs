pub mod apps;
pub mod platform_auth;
pub mod platform_api;

use crate::auth::Permission;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use url::Url;

pub use apps::AppsApiClient;
pub use platform_auth::AuthClient;
pub use platform_api::ApiClient;

/// Reports which of the requested permissions a user does not hold.
#[async_trait]
pub trait AuthorizationClient: Send + Sync {
    async fn get_missing_permissions(
        &self,
        user_name: &str,
        permissions: &[Permission],
    ) -> Result<Vec<Permission>>;
}

/// Looks up platform jobs. Unknown ids fail with [`Error::NotFound`].
#[async_trait]
pub trait JobResolver: Send + Sync {
    async fn get_job(&self, job_id: &str) -> Result<Job>;
}

/// Looks up app instances by name. Unknown or ambiguous names fail with
/// [`Error::NotFound`].
#[async_trait]
pub trait AppResolver: Send + Sync {
    async fn get_app_by_name(&self, app_instance_name: &str) -> Result<AppInstance>;
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Job {
    pub id: String,
    #[serde(default)]
    pub org_name: Option<String>,
    pub project_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct AppInstance {
    pub id: String,
    pub name: String,
    pub cluster_name: String,
    #[serde(default)]
    pub org_name: Option<String>,
    pub project_name: String,
    pub namespace: String,
    pub created_at: DateTime<Utc>,
}

/// Appends path segments to a base URL, escaping each segment.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| Error::Config(format!("{base} cannot be used as a base URL")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

pub(crate) fn bearer(token: &str) -> String {
    format!("Bearer {token}")
}
