use crate::auth::Permission;
use crate::clients::{AppInstance, AppResolver, AuthorizationClient, Job, JobResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub const JOB_ID: &str = "job-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee";
pub const OTHER_JOB_ID: &str = "job-11111111-2222-3333-4444-555555555555";

#[derive(Default)]
pub struct FakeJobResolver {
    jobs: HashMap<String, Job>,
    calls: AtomicUsize,
}

impl FakeJobResolver {
    pub fn with_job(mut self, id: &str, org_name: Option<&str>, project_name: &str) -> Self {
        self.jobs.insert(
            id.to_string(),
            Job {
                id: id.to_string(),
                org_name: org_name.map(str::to_string),
                project_name: project_name.to_string(),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobResolver for FakeJobResolver {
    async fn get_job(&self, job_id: &str) -> Result<Job> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.jobs
            .get(job_id)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("job {job_id}")))
    }
}

#[derive(Default)]
pub struct FakeAppResolver {
    apps: HashMap<String, AppInstance>,
    calls: AtomicUsize,
}

impl FakeAppResolver {
    pub fn with_app(mut self, name: &str, org_name: Option<&str>, project_name: &str) -> Self {
        self.apps.insert(
            name.to_string(),
            AppInstance {
                id: format!("{name}-id"),
                name: name.to_string(),
                cluster_name: "default".to_string(),
                org_name: org_name.map(str::to_string),
                project_name: project_name.to_string(),
                namespace: "platform--apps".to_string(),
                created_at: Utc::now(),
            },
        );
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AppResolver for FakeAppResolver {
    async fn get_app_by_name(&self, app_instance_name: &str) -> Result<AppInstance> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.apps
            .get(app_instance_name)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("app instance {app_instance_name}")))
    }
}

/// Grants everything except the configured permissions and records every
/// request it receives.
#[derive(Default)]
pub struct FakeAuthClient {
    denied: Vec<Permission>,
    requests: Mutex<Vec<Vec<Permission>>>,
}

impl FakeAuthClient {
    pub fn denying(denied: Vec<Permission>) -> Self {
        Self {
            denied,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<Vec<Permission>> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthorizationClient for FakeAuthClient {
    async fn get_missing_permissions(
        &self,
        _user_name: &str,
        permissions: &[Permission],
    ) -> Result<Vec<Permission>> {
        self.requests.lock().unwrap().push(permissions.to_vec());
        Ok(permissions
            .iter()
            .filter(|permission| self.denied.contains(permission))
            .cloned()
            .collect())
    }
}
