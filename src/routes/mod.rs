pub mod grafana;
pub mod health;
pub mod prometheus;
pub mod proxy;
pub mod user;

use crate::auth::AuthService;
use crate::clients::{ApiClient, AppResolver, AppsApiClient, AuthClient};
use crate::config::Config;
use crate::error::Result;
use actix_web::HttpRequest;
use proxy::Upstream;
use reqwest::redirect::Policy;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Application data shared by the handlers of both proxies.
pub struct ProxyState {
    pub config: Config,
    pub auth_service: AuthService,
    pub upstream: Upstream,
}

impl ProxyState {
    pub fn new(config: Config, upstream_url: Url) -> Result<Self> {
        let client = http_client(&config)?;
        let auth_service = auth_service(&config, &client);
        Ok(Self {
            config,
            auth_service,
            upstream: Upstream::new(client, upstream_url),
        })
    }
}

/// Client shared by the upstream proxy and the platform service clients.
/// Redirects are handed back to the caller.
pub fn http_client(config: &Config) -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .redirect(Policy::none())
        .build()?)
}

pub fn auth_service(config: &Config, client: &reqwest::Client) -> AuthService {
    let auth_client = AuthClient::new(client.clone(), config.auth_url.clone(), &config.token);
    let api_client = ApiClient::new(client.clone(), config.api_url.clone(), &config.token);
    let apps_client = config.apps_url.clone().map(|url| {
        Arc::new(AppsApiClient::new(client.clone(), url, &config.token)) as Arc<dyn AppResolver>
    });
    AuthService::new(
        Arc::new(auth_client),
        Arc::new(api_client),
        apps_client,
        &config.cluster_name,
    )
}

/// Every value of a repeated query parameter, e.g. `match[]`.
pub(crate) fn query_values(req: &HttpRequest, name: &str) -> Vec<String> {
    url::form_urlencoded::parse(req.query_string().as_bytes())
        .filter(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .collect()
}

/// Query parameters keyed by name; the first value of a repeated parameter wins.
pub(crate) fn query_params(req: &HttpRequest) -> HashMap<String, String> {
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(req.query_string().as_bytes()) {
        params
            .entry(key.into_owned())
            .or_insert_with(|| value.into_owned());
    }
    params
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::auth::testing::{FakeAppResolver, FakeAuthClient, FakeJobResolver, JOB_ID};
    use actix_web::{web, App, FromRequest, Handler, HttpServer, Responder};

    /// Serves `handler` for every path on an ephemeral local port and returns
    /// the server's base URL. Must be called from an actix runtime.
    pub fn start_upstream<F, Args>(handler: F) -> Url
    where
        F: Handler<Args> + Send,
        Args: FromRequest + 'static,
        F::Output: Responder + 'static,
    {
        let server = HttpServer::new(move || App::new().default_service(web::to(handler.clone())))
            .workers(1)
            .disable_signals()
            .bind(("127.0.0.1", 0))
            .unwrap();
        let address = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        Url::parse(&format!("http://{address}/")).unwrap()
    }

    pub fn test_config() -> Config {
        Config::from_lookup(|key: &str| {
            let value = match key {
                "NP_AUTH_URL" => "http://platform-auth:8080",
                "NP_API_URL" => "http://platform-api:8080",
                "NP_TOKEN" => "token",
                "NP_CLUSTER_NAME" => "default",
                "NP_AUTH_ACCESS_TOKEN_COOKIE_NAMES" => "sat,dat",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap()
    }

    /// State whose authorization client denies the given permission URIs.
    /// Authorized requests go to an upstream that is never reached in tests.
    pub fn test_state(denied: &[&str]) -> (web::Data<ProxyState>, Arc<FakeAuthClient>) {
        let config = test_config();
        let auth_client = Arc::new(FakeAuthClient::denying(
            denied.iter().map(|uri| crate::auth::Permission::read(*uri)).collect(),
        ));
        let auth_service = AuthService::new(
            auth_client.clone(),
            Arc::new(FakeJobResolver::default().with_job(JOB_ID, Some("acme"), "ml")),
            Some(Arc::new(FakeAppResolver::default().with_app("jupyter", Some("acme"), "ml"))),
            &config.cluster_name,
        );
        let upstream = Upstream::new(reqwest::Client::new(), config.prometheus_url.clone());
        let state = ProxyState {
            config,
            auth_service,
            upstream,
        };
        (web::Data::new(state), auth_client)
    }
}
