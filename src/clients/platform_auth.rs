use crate::auth::Permission;
use crate::clients::{bearer, endpoint, AuthorizationClient};
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Serialize)]
struct CheckPermissionsRequest<'a> {
    permissions: &'a [Permission],
}

#[derive(Deserialize)]
struct CheckPermissionsResponse {
    missing: Vec<Permission>,
}

impl CheckPermissionsResponse {
    /// A denial that names nothing denies everything that was requested.
    fn into_missing(self, requested: &[Permission]) -> Vec<Permission> {
        if self.missing.is_empty() {
            requested.to_vec()
        } else {
            self.missing
        }
    }
}

/// Client of the platform authorization service.
#[derive(Clone, Debug)]
pub struct AuthClient {
    client: reqwest::Client,
    // None disables every check
    url: Option<Url>,
    token: String,
}

impl AuthClient {
    pub fn new(client: reqwest::Client, url: Option<Url>, token: impl Into<String>) -> Self {
        if url.is_none() {
            warn!("Authorization service is not configured, permission checks are disabled");
        }
        Self {
            client,
            url,
            token: token.into(),
        }
    }
}

#[async_trait]
impl AuthorizationClient for AuthClient {
    async fn get_missing_permissions(
        &self,
        user_name: &str,
        permissions: &[Permission],
    ) -> Result<Vec<Permission>> {
        let Some(base_url) = &self.url else {
            return Ok(Vec::new());
        };
        let url = endpoint(
            base_url,
            &["api", "v1", "users", user_name, "permissions", "check"],
        )?;
        debug!("POST {}", url);

        let response = self
            .client
            .post(url)
            .header(AUTHORIZATION, bearer(&self.token))
            .json(&CheckPermissionsRequest { permissions })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => Ok(Vec::new()),
            // the service answers 403 with the permissions the user lacks
            StatusCode::FORBIDDEN => {
                let body: CheckPermissionsResponse = response.json().await?;
                Ok(body.into_missing(permissions))
            }
            status => Err(Error::UpstreamStatus {
                service: "platform-auth",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}
