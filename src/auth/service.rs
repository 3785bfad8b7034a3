use crate::auth::permission::{ClusterPermissions, Permission};
use crate::auth::permissions_service::{is_platform_job_id, PermissionsService};
use crate::clients::{AppResolver, AuthorizationClient, JobResolver};
use crate::error::Result;
use crate::metrics::expression_validator::all_vectors_have_job_matcher;
use crate::metrics::{parse_query, Vector};
use log::{info, warn};
use std::collections::HashMap;
use std::sync::Arc;

/// Grafana dashboards served through the proxy, by uid.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Dashboard {
    Nodes,
    Services,
    Prices,
    Overview,
    Job,
    App,
    Jobs,
    ProjectJobs,
    OrgJobs,
    Credits,
    ProjectCredits,
    OrgCredits,
}

impl Dashboard {
    pub fn from_id(dashboard_id: &str) -> Option<Self> {
        let dashboard = match dashboard_id {
            "nodes" => Dashboard::Nodes,
            "services" => Dashboard::Services,
            "prices" => Dashboard::Prices,
            "overview" => Dashboard::Overview,
            "job" => Dashboard::Job,
            "app" => Dashboard::App,
            "jobs" => Dashboard::Jobs,
            "project_jobs" => Dashboard::ProjectJobs,
            "org_jobs" => Dashboard::OrgJobs,
            "credits" => Dashboard::Credits,
            "project_credits" => Dashboard::ProjectCredits,
            "org_credits" => Dashboard::OrgCredits,
            _ => return None,
        };
        Some(dashboard)
    }
}

/// Decides whether a user may read the requested metrics.
#[derive(Clone)]
pub struct AuthService {
    auth_client: Arc<dyn AuthorizationClient>,
    jobs: Arc<dyn JobResolver>,
    apps: Option<Arc<dyn AppResolver>>,
    permissions: ClusterPermissions,
}

impl AuthService {
    pub fn new(
        auth_client: Arc<dyn AuthorizationClient>,
        jobs: Arc<dyn JobResolver>,
        apps: Option<Arc<dyn AppResolver>>,
        cluster_name: impl Into<String>,
    ) -> Self {
        Self {
            auth_client,
            jobs,
            apps,
            permissions: ClusterPermissions::new(cluster_name),
        }
    }

    pub fn cluster_permissions(&self) -> &ClusterPermissions {
        &self.permissions
    }

    pub async fn check_permissions(
        &self,
        user_name: &str,
        permissions: Vec<Permission>,
    ) -> Result<bool> {
        let mut permissions = permissions;
        permissions.sort();
        permissions.dedup();
        if permissions.is_empty() {
            warn!("user {:?} doesn't have any permission to check", user_name);
            return Ok(true);
        }

        info!("checking user {:?} has permissions {:?}", user_name, permissions);
        let missing = self
            .auth_client
            .get_missing_permissions(user_name, &permissions)
            .await?;
        if missing.is_empty() {
            info!("user {:?} has permissions {:?}", user_name, permissions);
        } else {
            info!("user {:?} doesn't have permissions {:?}", user_name, missing);
        }
        Ok(missing.is_empty())
    }

    pub async fn check_dashboard_permissions(
        &self,
        user_name: &str,
        dashboard_id: &str,
        params: &HashMap<String, String>,
    ) -> Result<bool> {
        let Some(dashboard) = Dashboard::from_id(dashboard_id) else {
            info!("dashboard {:?} is not known", dashboard_id);
            return Ok(false);
        };
        let param = |name: &str| params.get(name).map(String::as_str).filter(|v| !v.is_empty());

        let mut service = self.permissions_service();
        let resolved = match dashboard {
            Dashboard::Nodes | Dashboard::Services | Dashboard::Prices | Dashboard::Overview => {
                Ok(vec![self.permissions.manager()])
            }
            Dashboard::Job => match param("var-job_id").filter(|id| is_platform_job_id(id)) {
                Some(job_id) => service.get_job_permissions(&[job_id]).await,
                None => Ok(Vec::new()),
            },
            Dashboard::App => match param("var-app_instance_name") {
                Some(app_name) => service.get_app_permissions(&[app_name]).await,
                None => {
                    info!("app dashboard requested without an app instance name");
                    return Ok(false);
                }
            },
            Dashboard::Jobs | Dashboard::Credits => Ok(vec![self.permissions.job(None, None)]),
            Dashboard::ProjectJobs | Dashboard::ProjectCredits => Ok(param("var-project_name")
                .map(|project| vec![self.permissions.job(None, Some(project))])
                .unwrap_or_default()),
            Dashboard::OrgJobs | Dashboard::OrgCredits => {
                Ok(vec![self.permissions.job(param("var-org_name"), None)])
            }
        };

        let mut permissions = match resolved {
            Ok(permissions) => permissions,
            Err(e) if e.is_not_found() => {
                info!("dashboard {:?} references {}", dashboard_id, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if permissions.is_empty() {
            // every cluster user may open the dashboard for their own jobs
            permissions.push(self.permissions.access());
        }
        self.check_permissions(user_name, permissions).await
    }

    /// Fails with a syntax error when a query is not valid PromQL.
    pub async fn check_query_permissions<S: AsRef<str>>(
        &self,
        user_name: &str,
        queries: &[S],
    ) -> Result<bool> {
        let vectors = parse_queries(queries)?;

        // NOTE: All vectors are required to have a job filter
        // (e.g. kubelet, node-exporter etc). Otherwise we need to have a registry
        // with all the vectors which are exported by Prometheus jobs.
        if !vectors.iter().all(all_vectors_have_job_matcher) {
            info!("user {:?} queried vectors without a job matcher", user_name);
            return Ok(false);
        }

        let mut permissions = match self
            .permissions_service()
            .get_vector_permissions(&vectors)
            .await
        {
            Ok(permissions) => permissions,
            Err(e) if e.is_not_found() => {
                info!("user {:?} queried metrics of {}", user_name, e);
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        if permissions.is_empty() {
            permissions.push(self.permissions.access());
        }
        self.check_permissions(user_name, permissions).await
    }

    fn permissions_service(&self) -> PermissionsService {
        PermissionsService::new(
            self.jobs.clone(),
            self.apps.clone(),
            self.permissions.clone(),
        )
    }
}

fn parse_queries<S: AsRef<str>>(queries: &[S]) -> Result<Vec<Vector>> {
    let mut vectors = Vec::new();
    for query in queries {
        if let Some(vector) = parse_query(query.as_ref())? {
            vectors.push(vector);
        }
    }
    Ok(vectors)
}
