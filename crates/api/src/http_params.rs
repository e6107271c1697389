use axum::http::{HeaderMap, Method, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Serialize;
use std::collections::BTreeMap;

/// Request description handed to HTTP-trigger functions through `FC_HTTP_PARAMS`.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HttpParams {
    #[serde(rename = "requestURI")]
    pub request_uri: String,
    pub method: String,
    pub path: String,
    #[serde(rename = "clientIP")]
    pub client_ip: String,
    pub queries_map: BTreeMap<String, Vec<String>>,
    pub headers_map: BTreeMap<String, Vec<String>>,
    pub host: String,
}

impl HttpParams {
    pub fn from_request(
        method: &Method,
        uri: &Uri,
        headers: &HeaderMap,
        client_ip: &str,
        prefix: &str,
    ) -> Self {
        let full_path = uri.path();
        let path = full_path.strip_prefix(prefix).unwrap_or(full_path);

        let mut queries_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let Some(query) = uri.query() {
            for (k, v) in form_urlencoded::parse(query.as_bytes()).into_owned() {
                queries_map.entry(k).or_default().push(v);
            }
        }

        let mut headers_map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for (name, value) in headers {
            let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
            headers_map.entry(name.to_string()).or_default().push(value);
        }

        let host = headers
            .get("host")
            .and_then(|v| v.to_str().ok())
            .map(|h| h.split(':').next().unwrap_or(h).to_string())
            .unwrap_or_default();

        Self {
            request_uri: uri
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_else(|| full_path.to_string()),
            method: method.as_str().to_string(),
            path: path.to_string(),
            client_ip: client_ip.to_string(),
            queries_map,
            headers_map,
            host,
        }
    }

    pub fn encode(&self) -> String {
        STANDARD.encode(serde_json::to_vec(self).unwrap_or_default())
    }
}
