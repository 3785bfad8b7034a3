use crate::auth::permission::{strongest, weakest, ClusterPermissions, Permission};
use crate::clients::{AppResolver, JobResolver};
use crate::error::{Error, Result};
use crate::metrics::{InstantVector, LabelMatcher, Vector, VectorMatch};
use futures::future::try_join_all;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

lazy_static! {
    static ref PLATFORM_JOB_RE: Regex =
        Regex::new(r"^job-[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$")
            .expect("Failed to compile platform job id regex");
}

const POD_LABEL: &str = "pod";
const SERVICE_LABEL: &str = "label_service";
const ORG_LABELS: &[&str] = &[
    "label_platform_apolo_us_org",
    "label_platform_neuromation_io_org",
];
const PROJECT_LABELS: &[&str] = &[
    "label_platform_apolo_us_project",
    "label_platform_neuromation_io_project",
];
const APP_INSTANCE_LABELS: &[&str] = &[
    "label_platform_apolo_us_app_instance_name",
    "label_platform_neuromation_io_app_instance_name",
];

pub fn is_platform_job_id(value: &str) -> bool {
    PLATFORM_JOB_RE.is_match(value)
}

/// Prometheus scrape jobs with a known permission policy, in evaluation order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Exporter {
    NodeExporter,
    KubeStateMetrics,
    Kubelet,
    NvidiaDcgmExporter,
    NeuroMetricsExporter,
}

impl Exporter {
    const ALL: [Exporter; 5] = [
        Exporter::NodeExporter,
        Exporter::KubeStateMetrics,
        Exporter::Kubelet,
        Exporter::NvidiaDcgmExporter,
        Exporter::NeuroMetricsExporter,
    ];

    fn job_name(self) -> &'static str {
        match self {
            Exporter::NodeExporter => "node-exporter",
            Exporter::KubeStateMetrics => "kube-state-metrics",
            Exporter::Kubelet => "kubelet",
            Exporter::NvidiaDcgmExporter => "nvidia-dcgm-exporter",
            Exporter::NeuroMetricsExporter => "neuro-metrics-exporter",
        }
    }

    fn requirement(
        self,
        vector: &InstantVector,
        permissions: &ClusterPermissions,
    ) -> Requirement {
        match self {
            // node metrics are never tenant scoped
            Exporter::NodeExporter => Requirement::Permission(permissions.manager()),
            Exporter::KubeStateMetrics => kube_state_metrics_requirement(vector, permissions),
            Exporter::Kubelet | Exporter::NvidiaDcgmExporter | Exporter::NeuroMetricsExporter => {
                match platform_job_id(vector) {
                    Some(job_id) => Requirement::Job(job_id.to_owned()),
                    None => Requirement::Permission(permissions.manager()),
                }
            }
        }
    }
}

/// What a selector needs before job and app references are resolved.
#[derive(Clone, Debug, PartialEq, Eq)]
enum Requirement {
    Permission(Permission),
    Job(String),
    App(String),
}

fn kube_state_metrics_requirement(
    vector: &InstantVector,
    permissions: &ClusterPermissions,
) -> Requirement {
    if vector.get_eq_label_matcher(SERVICE_LABEL).is_some() {
        return Requirement::Permission(permissions.manager());
    }
    if let Some(job_id) = platform_job_id(vector) {
        return Requirement::Job(job_id.to_owned());
    }
    if let Some(matcher) = first_eq_label_matcher(vector, APP_INSTANCE_LABELS) {
        return Requirement::App(matcher.value.clone());
    }

    let org_name = first_eq_label_matcher(vector, ORG_LABELS).map(|m| m.value.as_str());
    let project_name = first_eq_label_matcher(vector, PROJECT_LABELS).map(|m| m.value.as_str());
    if org_name.is_some() || project_name.is_some() {
        return Requirement::Permission(permissions.job(org_name, project_name));
    }
    Requirement::Permission(permissions.manager())
}

fn platform_job_id(vector: &InstantVector) -> Option<&str> {
    vector
        .get_eq_label_matcher(POD_LABEL)
        .map(|matcher| matcher.value.as_str())
        .filter(|value| is_platform_job_id(value))
}

fn first_eq_label_matcher<'a>(
    vector: &'a InstantVector,
    names: &[&str],
) -> Option<&'a LabelMatcher> {
    names
        .iter()
        .find_map(|name| vector.get_eq_label_matcher(name))
}

/// Derives the permissions needed to read the series selected by PromQL
/// vectors.
///
/// An instance serves a single request: resolved job and app owners are
/// memoized for its lifetime only.
pub struct PermissionsService {
    jobs: Arc<dyn JobResolver>,
    apps: Option<Arc<dyn AppResolver>>,
    permissions: ClusterPermissions,
    job_permissions: HashMap<String, Permission>,
    app_permissions: HashMap<String, Permission>,
}

impl PermissionsService {
    pub fn new(
        jobs: Arc<dyn JobResolver>,
        apps: Option<Arc<dyn AppResolver>>,
        permissions: ClusterPermissions,
    ) -> Self {
        Self {
            jobs,
            apps,
            permissions,
            job_permissions: HashMap::new(),
            app_permissions: HashMap::new(),
        }
    }

    pub async fn get_vector_permissions(
        &mut self,
        vectors: &[Vector],
    ) -> Result<Vec<Permission>> {
        let mut job_ids = BTreeSet::new();
        let mut app_names = BTreeSet::new();
        for vector in vectors {
            for instant in vector.instant_vectors() {
                for requirement in self.requirements(instant) {
                    match requirement {
                        Requirement::Job(job_id) => {
                            job_ids.insert(job_id);
                        }
                        Requirement::App(app_name) => {
                            app_names.insert(app_name);
                        }
                        Requirement::Permission(_) => {}
                    }
                }
            }
        }
        self.resolve_jobs(job_ids).await?;
        self.resolve_apps(app_names).await?;

        let mut permissions = Vec::new();
        for vector in vectors {
            permissions.extend(strongest(self.derive(vector)?));
        }
        let result = strongest(permissions);

        let manager = self.permissions.manager();
        if result.contains(&manager) {
            // the cluster manager covers everything else
            return Ok(vec![manager]);
        }
        Ok(result)
    }

    /// Owner permissions of the given platform jobs.
    pub async fn get_job_permissions(&mut self, job_ids: &[&str]) -> Result<Vec<Permission>> {
        self.resolve_jobs(job_ids.iter().map(|id| id.to_string()))
            .await?;
        let unique: BTreeSet<&str> = job_ids.iter().copied().filter(|id| !id.is_empty()).collect();
        unique.into_iter().map(|id| self.job_permission(id)).collect()
    }

    /// Owner permissions of the given app instances.
    pub async fn get_app_permissions(&mut self, app_names: &[&str]) -> Result<Vec<Permission>> {
        self.resolve_apps(app_names.iter().map(|name| name.to_string()))
            .await?;
        app_names.iter().map(|name| self.app_permission(name)).collect()
    }

    fn requirements(&self, vector: &InstantVector) -> Vec<Requirement> {
        Exporter::ALL
            .iter()
            .filter(|exporter| vector.is_from_job(exporter.job_name()))
            .map(|exporter| exporter.requirement(vector, &self.permissions))
            .collect()
    }

    fn derive(&self, vector: &Vector) -> Result<Vec<Permission>> {
        match vector {
            Vector::Instant(instant) => self
                .requirements(instant)
                .into_iter()
                .map(|requirement| self.resolve(requirement))
                .collect(),
            Vector::Match(vector_match) => self.derive_match(vector_match),
        }
    }

    fn derive_match(&self, vector: &VectorMatch) -> Result<Vec<Permission>> {
        let mut permissions = self.derive(&vector.left)?;
        permissions.extend(self.derive(&vector.right)?);

        match vector.operator.as_str() {
            "or" | "unless" => Ok(strongest(permissions)),
            // both sides are joined on the same pod, the narrowest scope wins
            _ if vector.on().iter().any(|label| label == POD_LABEL) => {
                Ok(weakest(permissions, &self.permissions.manager()))
            }
            _ => Ok(strongest(permissions)),
        }
    }

    fn resolve(&self, requirement: Requirement) -> Result<Permission> {
        match requirement {
            Requirement::Permission(permission) => Ok(permission),
            Requirement::Job(job_id) => self.job_permission(&job_id),
            Requirement::App(app_name) => self.app_permission(&app_name),
        }
    }

    fn job_permission(&self, job_id: &str) -> Result<Permission> {
        self.job_permissions
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))
    }

    fn app_permission(&self, app_name: &str) -> Result<Permission> {
        self.app_permissions
            .get(app_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("app instance {app_name}")))
    }

    async fn resolve_jobs(&mut self, job_ids: impl IntoIterator<Item = String>) -> Result<()> {
        let pending: BTreeSet<String> = job_ids
            .into_iter()
            .filter(|id| !id.is_empty() && !self.job_permissions.contains_key(id))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        debug!("Resolving platform jobs {:?}", pending);

        let jobs = try_join_all(pending.iter().map(|id| self.jobs.get_job(id))).await?;
        for (job_id, job) in pending.into_iter().zip(jobs) {
            let permission = self
                .permissions
                .job(job.org_name.as_deref(), Some(job.project_name.as_str()));
            self.job_permissions.insert(job_id, permission);
        }
        Ok(())
    }

    async fn resolve_apps(&mut self, app_names: impl IntoIterator<Item = String>) -> Result<()> {
        let pending: BTreeSet<String> = app_names
            .into_iter()
            .filter(|name| !self.app_permissions.contains_key(name))
            .collect();
        if pending.is_empty() {
            return Ok(());
        }
        let Some(apps) = &self.apps else {
            return Err(Error::AppsClientNotConfigured);
        };
        debug!("Resolving app instances {:?}", pending);

        let instances = try_join_all(pending.iter().map(|name| apps.get_app_by_name(name))).await?;
        for (app_name, app) in pending.into_iter().zip(instances) {
            let permission = self
                .permissions
                .app(app.org_name.as_deref(), Some(app.project_name.as_str()));
            self.app_permissions.insert(app_name, permission);
        }
        Ok(())
    }
}
