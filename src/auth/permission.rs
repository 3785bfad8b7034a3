use serde::{Deserialize, Serialize};

const READ: &str = "read";
// org name of resources that belong to no organization
const NO_ORG: &str = "no_org";

/// A platform permission: an action on a hierarchical resource URI such as
/// `job://cluster/org/project`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Permission {
    pub uri: String,
    pub action: String,
}

impl Permission {
    pub fn read(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            action: READ.to_owned(),
        }
    }

    /// Whether holding `self` implies holding `other`: `other` is the same
    /// resource or lies below it in the URI path.
    pub fn covers(&self, other: &Permission) -> bool {
        other
            .uri
            .strip_prefix(self.uri.as_str())
            .map(|rest| rest.is_empty() || rest.starts_with('/'))
            .unwrap_or(false)
    }
}

/// Smallest set of the broadest permissions that together cover every input.
pub fn strongest(permissions: impl IntoIterator<Item = Permission>) -> Vec<Permission> {
    let mut permissions: Vec<Permission> = permissions.into_iter().collect();
    permissions.sort_by(|a, b| a.uri.cmp(&b.uri));

    let mut result: Vec<Permission> = Vec::new();
    for permission in permissions {
        if !result.iter().any(|kept| kept.covers(&permission)) {
            result.push(permission);
        }
    }
    result
}

/// The narrowest permissions of the input: anything covering an already
/// selected permission is dropped. `manager` is removed when it remains next
/// to narrower permissions.
pub fn weakest(
    permissions: impl IntoIterator<Item = Permission>,
    manager: &Permission,
) -> Vec<Permission> {
    let mut permissions: Vec<Permission> = permissions.into_iter().collect();
    permissions.sort_by(|a, b| b.uri.cmp(&a.uri));

    let mut result: Vec<Permission> = Vec::new();
    for permission in permissions {
        if !result.iter().any(|kept| permission.covers(kept)) {
            result.push(permission);
        }
    }

    if result.len() > 1 {
        result.retain(|permission| permission != manager);
    }
    result
}

/// Builds the permissions of a single cluster.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClusterPermissions {
    cluster_name: String,
}

impl ClusterPermissions {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    /// Covers every tenant resource of the cluster.
    pub fn manager(&self) -> Permission {
        Permission::read(format!("role://{}/manager", self.cluster_name))
    }

    /// Baseline permission of every cluster user.
    pub fn access(&self) -> Permission {
        Permission::read(format!("cluster://{}/access", self.cluster_name))
    }

    pub fn job(&self, org_name: Option<&str>, project_name: Option<&str>) -> Permission {
        Permission::read(self.scoped_uri("job", org_name, project_name))
    }

    pub fn app(&self, org_name: Option<&str>, project_name: Option<&str>) -> Permission {
        Permission::read(self.scoped_uri("app", org_name, project_name))
    }

    fn scoped_uri(
        &self,
        scheme: &str,
        org_name: Option<&str>,
        project_name: Option<&str>,
    ) -> String {
        let mut uri = format!("{scheme}://{}", self.cluster_name);
        if let Some(org_name) = org_name.filter(|org| !org.is_empty() && *org != NO_ORG) {
            uri.push('/');
            uri.push_str(org_name);
        }
        if let Some(project_name) = project_name.filter(|project| !project.is_empty()) {
            uri.push('/');
            uri.push_str(project_name);
        }
        uri
    }
}
