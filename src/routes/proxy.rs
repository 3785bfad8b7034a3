use crate::error::{Error, Result};
use actix_web::http::StatusCode;
use actix_web::{web, HttpRequest, HttpResponse};
use log::debug;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use url::Url;

// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP_HEADERS: &[&str] = &["connection", "transfer-encoding", "host", "keep-alive"];

/// The service requests are forwarded to once they are authorized.
#[derive(Clone, Debug)]
pub struct Upstream {
    pub client: reqwest::Client,
    pub url: Url,
}

impl Upstream {
    pub fn new(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    /// The request URL rebased onto the upstream scheme, host and port.
    pub fn request_url(&self, req: &HttpRequest) -> Url {
        let mut url = self.url.clone();
        url.set_path(req.path());
        let query = req.query_string();
        url.set_query(if query.is_empty() { None } else { Some(query) });
        url
    }

    /// Forwards the request and streams the upstream response back unchanged.
    pub async fn forward(&self, req: &HttpRequest, body: web::Bytes) -> Result<HttpResponse> {
        let url = self.request_url(req);
        let method = reqwest::Method::from_bytes(req.method().as_str().as_bytes())
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
        debug!("upstream request: {} {}", method, url);

        let mut headers = HeaderMap::new();
        for (name, value) in req.headers() {
            if HOP_BY_HOP_HEADERS.contains(&name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_str().as_bytes()),
                HeaderValue::from_bytes(value.as_bytes()),
            ) {
                headers.append(name, value);
            }
        }

        let mut request = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            request = request.body(body);
        }
        let response = request.send().await?;
        debug!("upstream response: {}", response.status());

        let status = StatusCode::from_u16(response.status().as_u16())
            .unwrap_or(StatusCode::BAD_GATEWAY);
        let mut builder = HttpResponse::build(status);
        for (name, value) in response.headers() {
            if HOP_BY_HOP_HEADERS.contains(&name.as_str())
                || *name == reqwest::header::CONTENT_LENGTH
            {
                continue;
            }
            builder.append_header((name.as_str(), value.as_bytes()));
        }
        if let Some(length) = response.content_length() {
            builder.no_chunking(length);
        }
        Ok(builder.streaming(response.bytes_stream()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::start_upstream;
    use actix_web::body::{BodySize, MessageBody};
    use actix_web::http::header;
    use actix_web::test::{self, TestRequest};
    use actix_web::App;
    use reqwest::redirect::Policy;
    use std::collections::BTreeMap;

    fn upstream(url: &str) -> Upstream {
        Upstream::new(reqwest::Client::new(), Url::parse(url).unwrap())
    }

    // Describes the request it received, or redirects `/redirect`.
    async fn echo(req: HttpRequest, body: web::Bytes) -> HttpResponse {
        if req.path() == "/redirect" {
            return HttpResponse::Found()
                .insert_header((header::LOCATION, "/login"))
                .finish();
        }
        let headers: BTreeMap<String, String> = req
            .headers()
            .iter()
            .map(|(name, value)| {
                (name.to_string(), value.to_str().unwrap_or_default().to_string())
            })
            .collect();
        HttpResponse::Ok()
            .insert_header(("x-upstream", "echo"))
            .json(serde_json::json!({
                "method": req.method().as_str(),
                "path": req.path(),
                "query": req.query_string(),
                "headers": headers,
                "body": String::from_utf8_lossy(&body),
            }))
    }

    async fn forward(
        upstream: web::Data<Upstream>,
        req: HttpRequest,
        body: web::Bytes,
    ) -> Result<HttpResponse> {
        upstream.forward(&req, body).await
    }

    fn echo_upstream() -> web::Data<Upstream> {
        let client = reqwest::Client::builder()
            .redirect(Policy::none())
            .build()
            .unwrap();
        web::Data::new(Upstream::new(client, start_upstream(echo)))
    }

    #[test]
    fn test_request_url() {
        let req = TestRequest::get()
            .uri("/api/v1/query?query=up%7Bjob%3D%22kubelet%22%7D&time=1")
            .to_http_request();
        assert_eq!(
            upstream("http://prometheus:9090").request_url(&req).as_str(),
            "http://prometheus:9090/api/v1/query?query=up%7Bjob%3D%22kubelet%22%7D&time=1"
        );
    }

    #[test]
    fn test_request_url_without_query() {
        let req = TestRequest::get().uri("/api/health").to_http_request();
        assert_eq!(
            upstream("https://grafana:3000/").request_url(&req).as_str(),
            "https://grafana:3000/api/health"
        );
    }

    #[actix_web::test]
    async fn test_forward_request() {
        let app = test::init_service(
            App::new()
                .app_data(echo_upstream())
                .default_service(web::to(forward)),
        )
        .await;
        let req = TestRequest::post()
            .uri("/api/v1/query?query=up&time=1")
            .insert_header((header::HOST, "prometheus.example"))
            .insert_header(("keep-alive", "timeout=5"))
            .insert_header((header::COOKIE, "sat=token"))
            .insert_header(("x-grafana-org-id", "1"))
            .set_payload("query=up")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers().get("x-upstream").unwrap(), "echo");

        let size = resp.response().body().size();
        let body = test::read_body(resp).await;
        assert_eq!(size, BodySize::Sized(body.len() as u64));

        let echoed: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(echoed["method"], "POST");
        assert_eq!(echoed["path"], "/api/v1/query");
        assert_eq!(echoed["query"], "query=up&time=1");
        assert_eq!(echoed["body"], "query=up");
        assert_eq!(echoed["headers"]["cookie"], "sat=token");
        assert_eq!(echoed["headers"]["x-grafana-org-id"], "1");
        assert!(echoed["headers"].get("keep-alive").is_none());
        assert_ne!(echoed["headers"]["host"], "prometheus.example");
    }

    #[actix_web::test]
    async fn test_redirects_are_passed_back() {
        let app = test::init_service(
            App::new()
                .app_data(echo_upstream())
                .default_service(web::to(forward)),
        )
        .await;
        let req = TestRequest::get().uri("/redirect").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FOUND);
        assert_eq!(resp.headers().get(header::LOCATION).unwrap(), "/login");
    }
}
