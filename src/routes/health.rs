use actix_web::{get, HttpResponse, Responder};

#[utoipa::path(
    responses(
        (status = 200, description = "The service is up", body = String),
    )
)]
#[get("/ping")]
pub async fn ping() -> impl Responder {
    HttpResponse::Ok().content_type("text/plain").body("Pong")
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{test, App};

    #[actix_web::test]
    async fn test_ping() {
        let app = test::init_service(App::new().service(ping)).await;
        let req = test::TestRequest::get().uri("/ping").to_request();
        let resp = test::call_service(&app, req).await;
        assert!(resp.status().is_success());
        let body = test::read_body(resp).await;
        assert_eq!(body, "Pong");
    }
}
