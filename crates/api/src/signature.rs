//! `Authorization` header signing for HTTP-trigger and invocation API requests.

use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use fc_local_models::{Credentials, LocalError};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::borrow::Cow;

type HmacSha256 = Hmac<Sha256>;

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

/// `x-fc-*` headers as sorted `key:value\n` lines, keys lowercased.
fn canonical_headers(headers: &HeaderMap) -> String {
    let mut fc_headers: Vec<(String, String)> = headers
        .keys()
        .filter(|name| name.as_str().starts_with("x-fc-"))
        .map(|name| {
            let values: Vec<&str> = headers
                .get_all(name)
                .iter()
                .filter_map(|v| v.to_str().ok())
                .collect();
            (name.as_str().to_ascii_lowercase(), values.join(","))
        })
        .collect();
    fc_headers.sort();
    fc_headers
        .into_iter()
        .map(|(k, v)| format!("{k}:{v}\n"))
        .collect()
}

/// Percent-decoded path plus the sorted `k=v` query lines. Keys without a
/// value render bare; every value of a repeated key renders.
fn canonical_resource(path: &str, query: Option<&str>) -> String {
    let path = urlencoding::decode(path).unwrap_or(Cow::Borrowed(path));
    let mut rendered: Vec<String> = query
        .map(|q| {
            form_urlencoded::parse(q.as_bytes())
                .map(|(k, v)| if v.is_empty() { k.into_owned() } else { format!("{k}={v}") })
                .collect()
        })
        .unwrap_or_default();
    if rendered.is_empty() {
        return path.into_owned();
    }
    rendered.sort();
    format!("{path}\n{}", rendered.join("\n"))
}

pub fn string_to_sign(method: &str, path: &str, query: Option<&str>, headers: &HeaderMap) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}{}",
        method.to_ascii_uppercase(),
        header_str(headers, "content-md5"),
        header_str(headers, "content-type"),
        header_str(headers, "date"),
        canonical_headers(headers),
        canonical_resource(path, query)
    )
}

/// `FC {accessKeyId}:{base64(hmac-sha256)}` for the request.
pub fn sign(
    credentials: &Credentials,
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<String, LocalError> {
    let mut mac = HmacSha256::new_from_slice(credentials.access_key_secret.as_bytes()).map_err(
        |e| LocalError::ConfigError {
            reason: format!("invalid access key secret: {e}"),
        },
    )?;
    mac.update(string_to_sign(method, path, query, headers).as_bytes());
    let digest = STANDARD.encode(mac.finalize().into_bytes());
    Ok(format!("FC {}:{}", credentials.access_key_id, digest))
}

/// Compares the client's `Authorization` header with the locally computed signature.
pub fn verify(
    credentials: &Credentials,
    method: &str,
    path: &str,
    query: Option<&str>,
    headers: &HeaderMap,
) -> Result<(), LocalError> {
    let server = sign(credentials, method, path, query, headers)?;
    let client = header_str(headers, "authorization");
    if client == server {
        Ok(())
    } else {
        Err(LocalError::SignatureMismatch {
            client: client.to_string(),
            server,
        })
    }
}
