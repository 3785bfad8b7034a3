use crate::clients::{bearer, endpoint, AppInstance, AppResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use serde::Deserialize;
use url::Url;

const API_VERSION: &str = "v2";

#[derive(Deserialize)]
struct AppInstanceList {
    items: Vec<AppInstance>,
}

/// Client of the platform apps service.
#[derive(Clone, Debug)]
pub struct AppsApiClient {
    client: reqwest::Client,
    url: Url,
    token: String,
}

impl AppsApiClient {
    pub fn new(client: reqwest::Client, url: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            url,
            token: token.into(),
        }
    }
}

#[async_trait]
impl AppResolver for AppsApiClient {
    async fn get_app_by_name(&self, app_instance_name: &str) -> Result<AppInstance> {
        let url = endpoint(&self.url, &["apis", "apps", API_VERSION, "instances"])?;
        debug!("GET {} name={}", url, app_instance_name);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer(&self.token))
            .query(&[("name", app_instance_name)])
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("app instance {app_instance_name}")));
        }
        if !status.is_success() {
            return Err(Error::UpstreamStatus {
                service: "platform-apps",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            });
        }

        let list: AppInstanceList = response.json().await?;
        single_app(list.items, app_instance_name)
    }
}

// A name that matches several instances is as unusable as an unknown one.
fn single_app(items: Vec<AppInstance>, app_instance_name: &str) -> Result<AppInstance> {
    let mut items = items.into_iter();
    match (items.next(), items.next()) {
        (Some(app), None) => Ok(app),
        _ => Err(Error::NotFound(format!("app instance {app_instance_name}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn app(id: &str) -> AppInstance {
        AppInstance {
            id: id.to_string(),
            name: "jupyter".to_string(),
            cluster_name: "default".to_string(),
            org_name: Some("org".to_string()),
            project_name: "project".to_string(),
            namespace: "platform--org--project".to_string(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_single_app() {
        assert_eq!(single_app(vec![app("1")], "jupyter").unwrap().id, "1");
        assert!(single_app(vec![], "jupyter").unwrap_err().is_not_found());
        assert!(single_app(vec![app("1"), app("2")], "jupyter")
            .unwrap_err()
            .is_not_found());
    }
}
