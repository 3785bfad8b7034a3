use crate::error::Error;
use crate::routes::user::get_user_name;
use crate::routes::{query_params, ProxyState};
use actix_web::{get, web, HttpRequest, HttpResponse};
use log::info;
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(paths(crate::routes::health::ping, get_dashboard))]
pub struct ApiDoc;

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(crate::routes::health::ping)
        .service(openapi_json)
        .service(get_dashboard)
        .default_service(web::to(other));
}

#[get("/api-doc/openapi.json")]
async fn openapi_json() -> HttpResponse {
    HttpResponse::Ok().json(ApiDoc::openapi())
}

#[utoipa::path(
    params(
        ("dashboard_id" = String, Path, example = "job", description = "Platform dashboard uid"),
        ("var-job_id" = Option<String>, Query, description = "Job shown by the job dashboard"),
        ("var-app_instance_name" = Option<String>, Query, description = "App instance shown by the app dashboard"),
        ("var-org_name" = Option<String>, Query, description = "Organization of the org dashboards"),
        ("var-project_name" = Option<String>, Query, description = "Project of the project dashboards"),
    ),
    responses(
        (status = 200, description = "Grafana dashboard, forwarded unchanged"),
        (status = 400, description = "Request doesn't have a valid access token"),
        (status = 403, description = "Not authorized for dashboard"),
    )
)]
#[get("/api/dashboards/uid/{dashboard_id}")]
pub async fn get_dashboard(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    let user_name = get_user_name(&req, &state.config.access_token_cookie_names)?;
    let dashboard_id = path.into_inner();
    info!("user {:?} requested dashboard {:?}", user_name, dashboard_id);
    if !state
        .auth_service
        .check_dashboard_permissions(&user_name, &dashboard_id, &query_params(&req))
        .await?
    {
        return Ok(HttpResponse::Forbidden().finish());
    }
    state.upstream.forward(&req, body).await
}

/// Grafana assets and APIs other than dashboards are open to every user of
/// the cluster.
pub async fn other(
    state: web::Data<ProxyState>,
    req: HttpRequest,
    body: web::Bytes,
) -> Result<HttpResponse, Error> {
    let user_name = get_user_name(&req, &state.config.access_token_cookie_names)?;
    let access = state.auth_service.cluster_permissions().access();
    if !state
        .auth_service
        .check_permissions(&user_name, vec![access])
        .await?
    {
        return Ok(HttpResponse::Forbidden().finish());
    }
    state.upstream.forward(&req, body).await
}
