use crate::error::{Error, Result};
use crate::routes::user::get_user_name;
use crate::routes::{query_values, ProxyState};
use actix_web::{get, web, HttpRequest, HttpResponse};
use log::info;
use utoipa::OpenApi;

// https://prometheus.io/docs/prometheus/latest/querying/api/

#[derive(OpenApi)]
#[openapi(paths(query, query_range, query_exemplars, series))]
pub struct ApiDoc;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(openapi_json).service(
        web::scope("/api/v1")
            .service(crate::routes::health::ping)
            .service(query)
            .service(query_range)
            .service(query_exemplars)
            .service(series)
            .route("/{sub_path:.*}", web::get().to(other)),
    );
}

#[get("/api-doc/openapi.json")]
async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[utoipa::path(
    context_path = "/api/v1",
    params(
        ("query" = String, Query, example = "node_load1{job=\"node-exporter\"}", description = "PromQL instant query"),
        ("time" = Option<String>, Query, example = "1686780828", description = "Evaluation timestamp"),
    ),
    responses(
        (status = 200, description = "Prometheus response, forwarded unchanged"),
        (status = 400, description = "Query is missing or is not valid PromQL"),
        (status = 403, description = "Not authorized for query"),
    )
)]
#[get("/query")]
pub async fn query(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    forward_query(&state, &req, body).await
}

#[utoipa::path(
    context_path = "/api/v1",
    params(
        ("query" = String, Query, example = "rate(container_cpu_usage_seconds_total{job=\"kubelet\",pod=\"job-aaaaaaaa-bbbb-cccc-dddd-eeeeeeeeeeee\"}[5m])", description = "PromQL range query"),
        ("start" = String, Query, example = "1686780828", description = "Range start, unix timestamp"),
        ("end" = String, Query, example = "1686784428", description = "Range end, unix timestamp"),
        ("step" = String, Query, example = "60s", description = "Query resolution step"),
    ),
    responses(
        (status = 200, description = "Prometheus response, forwarded unchanged"),
        (status = 400, description = "Query is missing or is not valid PromQL"),
        (status = 403, description = "Not authorized for query"),
    )
)]
#[get("/query_range")]
pub async fn query_range(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    forward_query(&state, &req, body).await
}

#[utoipa::path(
    context_path = "/api/v1",
    params(
        ("query" = String, Query, description = "PromQL query"),
    ),
    responses(
        (status = 200, description = "Prometheus response, forwarded unchanged"),
        (status = 400, description = "Query is missing or is not valid PromQL"),
        (status = 403, description = "Not authorized for query"),
    )
)]
#[get("/query_exemplars")]
pub async fn query_exemplars(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    forward_query(&state, &req, body).await
}

#[utoipa::path(
    context_path = "/api/v1",
    params(
        ("match[]" = Vec<String>, Query, description = "Series selectors, every one is authorized"),
    ),
    responses(
        (status = 200, description = "Prometheus response, forwarded unchanged"),
        (status = 400, description = "A selector is not valid PromQL"),
        (status = 403, description = "Not authorized for a selector"),
    )
)]
#[get("/series")]
pub async fn series(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    let user_name = get_user_name(&req, &state.config.access_token_cookie_names)?;
    let queries = query_values(&req, "match[]");
    forward_if_authorized(&state, &req, body, &user_name, &queries).await
}

/// Any other Prometheus API path can expose every series, so it is
/// reserved for cluster managers.
pub async fn other(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    let user_name = get_user_name(&req, &state.config.access_token_cookie_names)?;
    let manager = state.auth_service.cluster_permissions().manager();
    if !state
        .auth_service
        .check_permissions(&user_name, vec![manager])
        .await?
    {
        return Ok(HttpResponse::Forbidden().finish());
    }
    state.upstream.forward(&req, body).await
}

async fn forward_query(
    state: &ProxyState,
    req: &HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse> {
    let user_name = get_user_name(req, &state.config.access_token_cookie_names)?;
    let queries = query_values(req, "query");
    if queries.is_empty() {
        return Err(Error::InvalidRequest("query parameter is required".to_owned()));
    }
    forward_if_authorized(state, req, body, &user_name, &queries).await
}

async fn forward_if_authorized(
    state: &ProxyState,
    req: &HttpRequest,
    body: web::Bytes,
    user_name: &str,
    queries: &[String],
) -> Result<HttpResponse> {
    info!("user {:?} requested {} {:?}", user_name, req.path(), queries);
    if !state
        .auth_service
        .check_query_permissions(user_name, queries)
        .await?
    {
        return Ok(HttpResponse::Forbidden().finish());
    }
    state.upstream.forward(req, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::testing::test_state;
    use crate::routes::user::tests::user_token;
    use actix_web::cookie::Cookie;
    use actix_web::http::StatusCode;
    use actix_web::{test, App};

    fn encode(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }

    #[actix_web::test]
    async fn test_ping() {
        let (state, _) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get().uri("/api/v1/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[actix_web::test]
    async fn test_openapi_document() {
        let (state, _) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api-doc/openapi.json")
            .to_request();
        let doc: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert!(doc["paths"]["/api/v1/query_range"].is_object());
        assert!(doc["paths"]["/api/v1/series"].is_object());
    }

    #[actix_web::test]
    async fn test_missing_access_token() {
        let (state, auth_client) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/query?query={}", encode(r#"up{job="kubelet"}"#)))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert!(auth_client.requests().is_empty());
    }

    #[actix_web::test]
    async fn test_query_is_required() {
        let (state, _) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api/v1/query_range?start=1&end=2")
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[actix_web::test]
    async fn test_invalid_query() {
        let (state, _) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/query?query={}", encode("up{")))
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let body: serde_json::Value = test::read_body_json(resp).await;
        assert!(body["error"].as_str().unwrap().starts_with("invalid PromQL query"));
    }

    #[actix_web::test]
    async fn test_query_without_job_is_forbidden() {
        let (state, auth_client) = test_state(&[]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri(&format!("/api/v1/query?query={}", encode("up")))
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert!(auth_client.requests().is_empty());
    }

    #[actix_web::test]
    async fn test_query_denied() {
        let (state, auth_client) = test_state(&["role://default/manager"]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/query_range?query={}&start=1&end=2&step=60s",
                encode(r#"node_load1{job="node-exporter"}"#)
            ))
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(auth_client.requests().len(), 1);
    }

    #[actix_web::test]
    async fn test_series_checks_every_matcher() {
        let (state, auth_client) = test_state(&["job://default/acme"]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri(&format!(
                "/api/v1/series?match%5B%5D={}&match%5B%5D={}",
                encode(r#"up{job="kube-state-metrics",label_platform_apolo_us_org="acme"}"#),
                encode(r#"up{job="kube-state-metrics",label_platform_apolo_us_org="other"}"#),
            ))
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            auth_client.requests(),
            vec![vec![
                crate::auth::Permission::read("job://default/acme"),
                crate::auth::Permission::read("job://default/other"),
            ]]
        );
    }

    #[actix_web::test]
    async fn test_other_paths_require_manager() {
        let (state, auth_client) = test_state(&["role://default/manager"]);
        let app = test::init_service(App::new().app_data(state).configure(configure)).await;
        let req = test::TestRequest::get()
            .uri("/api/v1/label/__name__/values")
            .cookie(Cookie::new("sat", user_token("alice")))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            auth_client.requests(),
            vec![vec![crate::auth::Permission::read("role://default/manager")]]
        );
    }
}
