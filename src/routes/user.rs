use crate::error::{Error, Result};
use actix_web::HttpRequest;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde_json::Value;

const USER_CLAIM: &str = "https://platform.neuromation.io/user";

/// Name of the platform user who sent the request, taken from the first
/// non-empty access token cookie.
pub fn get_user_name(req: &HttpRequest, access_token_cookie_names: &[String]) -> Result<String> {
    let access_token = access_token_cookie_names
        .iter()
        .filter_map(|name| req.cookie(name))
        .map(|cookie| cookie.value().to_owned())
        .find(|value| !value.is_empty())
        .ok_or(Error::MissingAccessToken)?;
    user_name_from_token(&access_token)
}

// Claims are read without verifying the signature. The authorization
// service validates the token when permissions are checked.
fn user_name_from_token(token: &str) -> Result<String> {
    let mut segments = token.split('.');
    let payload = match (segments.next(), segments.next(), segments.next(), segments.next()) {
        (Some(_), Some(payload), Some(_), None) => payload,
        _ => {
            return Err(Error::MalformedAccessToken(
                "expected a JWT with three segments".to_owned(),
            ))
        }
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| Error::MalformedAccessToken(e.to_string()))?;
    let claims: Value = serde_json::from_slice(&payload)
        .map_err(|e| Error::MalformedAccessToken(e.to_string()))?;

    claims
        .get(USER_CLAIM)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::MalformedAccessToken(format!("{USER_CLAIM} claim is missing")))
}
