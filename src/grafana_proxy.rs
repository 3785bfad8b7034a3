use actix_web::middleware::{DefaultHeaders, Logger};
use actix_web::{web, App, HttpServer};
use env_logger::Env;
use log::{debug, error, info};
use metrics_gateway::config::Config;
use metrics_gateway::routes::{grafana, ProxyState};
use std::io;

const SERVICE_VERSION: &str = concat!("metrics-gateway/", env!("CARGO_PKG_VERSION"));

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::init_from_env(Env::default().default_filter_or("info"));

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;
    let state = ProxyState::new(config.clone(), config.grafana_url.clone()).map_err(|e| {
        error!("Failed to create the proxy: {}", e);
        io::Error::new(io::ErrorKind::Other, e.to_string())
    })?;
    let state = web::Data::new(state);

    let server_bind_address = format!("{}:{}", config.server_host, config.server_port);
    let server = HttpServer::new(move || {
        App::new()
            .app_data(state.clone())
            .wrap(DefaultHeaders::new().add(("X-Service-Version", SERVICE_VERSION)))
            .wrap(Logger::default().exclude("/ping"))
            .configure(grafana::configure)
    })
    .bind(server_bind_address)?
    .shutdown_timeout(5)
    .run();

    info!(
        "Starting Grafana proxy at http://{}:{}/, upstream {}",
        config.server_host, config.server_port, config.grafana_url
    );
    debug!("Config: {:?}", config);
    server.await
}
