use crate::clients::{bearer, endpoint, Job, JobResolver};
use crate::error::{Error, Result};
use async_trait::async_trait;
use log::debug;
use reqwest::header::AUTHORIZATION;
use reqwest::StatusCode;
use url::Url;

/// Client of the platform API, used to find the owner of a job.
#[derive(Clone, Debug)]
pub struct ApiClient {
    client: reqwest::Client,
    url: Url,
    token: String,
}

impl ApiClient {
    pub fn new(client: reqwest::Client, url: Url, token: impl Into<String>) -> Self {
        Self {
            client,
            url,
            token: token.into(),
        }
    }
}

#[async_trait]
impl JobResolver for ApiClient {
    async fn get_job(&self, job_id: &str) -> Result<Job> {
        let url = endpoint(&self.url, &["api", "v1", "jobs", job_id])?;
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .header(AUTHORIZATION, bearer(&self.token))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(response.json().await?),
            StatusCode::NOT_FOUND => Err(Error::NotFound(format!("job {job_id}"))),
            status => Err(Error::UpstreamStatus {
                service: "platform-api",
                status: status.as_u16(),
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_deserialize() {
        let job: Job = serde_json::from_str(
            r#"{
                "id": "job-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee",
                "owner": "user",
                "org_name": null,
                "project_name": "ml",
                "status": "running"
            }"#,
        )
        .unwrap();
        assert_eq!(job.id, "job-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee");
        assert_eq!(job.org_name, None);
        assert_eq!(job.project_name, "ml");
    }
}
