//! HTTP capability -- GET, POST, generic API calls, and downloads.
//!
//! Built on the blocking [`reqwest`] client so that a workflow step blocks
//! its thread until the response arrives, like every other step.  JSON
//! response bodies are returned parsed; anything else comes back as text.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use autho_kernel::{Capability, CapabilityError, OperationSpec, Params, require_str};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::error::{AdapterError, Result};
use crate::filesystem::safe_resolve;

/// Default request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default `User-Agent` header.
pub const DEFAULT_USER_AGENT: &str = concat!("autho/", env!("CARGO_PKG_VERSION"));

/// HTTP capability.
pub struct HttpAdapter {
    /// Unique identifier for this adapter instance.
    id: String,
    /// Shared blocking client.
    client: Client,
    /// Per-request timeout.
    timeout_secs: u64,
    /// Directory `download_file` writes into.
    download_root: PathBuf,
}

impl HttpAdapter {
    /// Create a new HTTP adapter with default settings.
    pub fn new(id: impl Into<String>) -> Self {
        Self::with_settings(id, DEFAULT_USER_AGENT, DEFAULT_TIMEOUT_SECS, ".")
    }

    /// Create a new HTTP adapter with explicit settings.
    pub fn with_settings(
        id: impl Into<String>,
        user_agent: &str,
        timeout_secs: u64,
        download_root: impl Into<PathBuf>,
    ) -> Self {
        let client = Client::builder()
            .user_agent(user_agent.to_string())
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_default();

        Self {
            id: id.into(),
            client,
            timeout_secs,
            download_root: download_root.into(),
        }
    }

    // -- Operations -----------------------------------------------------------

    fn http_get(&self, params: &Params) -> Result<Value> {
        let url = require_url(params, "http_get")?;
        let mut request = self.client.get(url.as_str());
        request = apply_headers(request, params, "http_get")?;
        if let Some(query) = params.get("params").and_then(Value::as_object) {
            request = request.query(&string_pairs(query));
        }

        let response = self.send(request, "http_get", url.as_str())?;
        let status = response.status().as_u16();
        let final_url = response.url().to_string();
        let body = read_body(response, "http_get")?;

        Ok(json!({
            "status": status,
            "url": final_url,
            "body": body,
        }))
    }

    fn http_post(&self, params: &Params) -> Result<Value> {
        let url = require_url(params, "http_post")?;
        let mut request = self.client.post(url.as_str());
        request = apply_headers(request, params, "http_post")?;
        request = apply_body(request, params);

        let response = self.send(request, "http_post", url.as_str())?;
        read_body(response, "http_post")
    }

    fn api_call(&self, params: &Params) -> Result<Value> {
        let url = require_url(params, "api_call")?;
        let method_str = params.get("method").and_then(Value::as_str).unwrap_or("GET");
        let method = parse_method(method_str).ok_or_else(|| AdapterError::InvalidParams {
            operation: "api_call".into(),
            reason: format!(
                "unsupported HTTP method `{method_str}`. Supported: GET, POST, PUT, PATCH, DELETE, HEAD"
            ),
        })?;

        let mut request = self.client.request(method, url.as_str());
        request = apply_headers(request, params, "api_call")?;
        if let Some(query) = params.get("params").and_then(Value::as_object) {
            request = request.query(&string_pairs(query));
        }
        if let Some(data) = params.get("data") {
            request = request.json(data);
        }

        let response = self.send(request, "api_call", url.as_str())?;
        read_body(response, "api_call")
    }

    fn download_file(&self, params: &Params) -> Result<Value> {
        let url = require_url(params, "download_file")?;
        let output = require_str(params, "output_path", "download_file")?;
        let target = safe_resolve(&self.download_root, output, "download_file")?;

        let response = self.send(self.client.get(url.as_str()), "download_file", url.as_str())?;
        let bytes = response.bytes().map_err(|e| AdapterError::ExecutionFailed {
            operation: "download_file".into(),
            reason: format!("failed to read response body: {e}"),
        })?;

        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&target, &bytes)?;

        info!(url = %url, path = %output, bytes = bytes.len(), "downloaded");
        Ok(Value::String(output.to_string()))
    }

    // -- Helpers --------------------------------------------------------------

    fn send(&self, request: RequestBuilder, operation: &str, url: &str) -> Result<Response> {
        let start = Instant::now();
        let response = request.send().map_err(|e| {
            if e.is_timeout() {
                AdapterError::Timeout {
                    operation: operation.to_string(),
                    seconds: self.timeout_secs,
                    reason: format!("request to `{url}` timed out"),
                }
            } else {
                AdapterError::ExecutionFailed {
                    operation: operation.to_string(),
                    reason: format!("request failed: {e}"),
                }
            }
        })?;

        let status = response.status();
        debug!(
            operation = operation,
            url = url,
            status = status.as_u16(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "HTTP request completed"
        );

        if !status.is_success() {
            return Err(AdapterError::ExecutionFailed {
                operation: operation.to_string(),
                reason: format!("HTTP {status} from `{url}`"),
            });
        }
        Ok(response)
    }
}

impl Capability for HttpAdapter {
    fn id(&self) -> &str {
        &self.id
    }

    fn operations(&self) -> Vec<OperationSpec> {
        vec![
            OperationSpec::new("http_get", "Fetch a URL with GET").with_required(&["url"]),
            OperationSpec::new("http_post", "POST JSON or form data to a URL").with_required(&["url"]),
            OperationSpec::new("api_call", "Call an HTTP API with an arbitrary method")
                .with_required(&["url"]),
            OperationSpec::new("download_file", "Download a URL to a local file")
                .with_required(&["url", "output_path"]),
        ]
    }

    fn invoke(&self, operation: &str, params: &Params) -> std::result::Result<Value, CapabilityError> {
        let result = match operation {
            "http_get" => self.http_get(params),
            "http_post" => self.http_post(params),
            "api_call" => self.api_call(params),
            "download_file" => self.download_file(params),
            _ => Err(AdapterError::OperationNotFound {
                adapter_id: self.id.clone(),
                operation: operation.to_string(),
            }),
        };
        result.map_err(Into::into)
    }
}

// ---------------------------------------------------------------------------
// Request helpers
// ---------------------------------------------------------------------------

fn require_url(params: &Params, operation: &str) -> Result<url::Url> {
    let raw = require_str(params, "url", operation)?;
    url::Url::parse(raw).map_err(|e| AdapterError::InvalidParams {
        operation: operation.to_string(),
        reason: format!("invalid URL `{raw}`: {e}"),
    })
}

fn apply_headers(mut request: RequestBuilder, params: &Params, operation: &str) -> Result<RequestBuilder> {
    let Some(headers) = params.get("headers").and_then(Value::as_object) else {
        return Ok(request);
    };

    for (key, value) in headers {
        let Some(val_str) = value.as_str() else {
            continue;
        };
        let header_name = reqwest::header::HeaderName::from_bytes(key.as_bytes()).map_err(|e| {
            AdapterError::InvalidParams {
                operation: operation.to_string(),
                reason: format!("invalid header name `{key}`: {e}"),
            }
        })?;
        let header_value = reqwest::header::HeaderValue::from_str(val_str).map_err(|e| {
            AdapterError::InvalidParams {
                operation: operation.to_string(),
                reason: format!("invalid header value for `{key}`: {e}"),
            }
        })?;
        request = request.header(header_name, header_value);
    }
    Ok(request)
}

/// `json` wins over `data`; a `data` mapping is sent form-encoded and any
/// other `data` value as a raw body.
fn apply_body(request: RequestBuilder, params: &Params) -> RequestBuilder {
    if let Some(body) = params.get("json") {
        return request.json(body);
    }
    match params.get("data") {
        Some(Value::Object(form)) => request.form(&string_pairs(form)),
        Some(Value::String(raw)) => request.body(raw.clone()),
        Some(other) => request.body(other.to_string()),
        None => request,
    }
}

fn string_pairs(map: &serde_json::Map<String, Value>) -> Vec<(String, String)> {
    map.iter()
        .map(|(k, v)| (k.clone(), autho_kernel::display_value(v)))
        .collect()
}

fn read_body(response: Response, operation: &str) -> Result<Value> {
    let text = response.text().map_err(|e| AdapterError::ExecutionFailed {
        operation: operation.to_string(),
        reason: format!("failed to read response body: {e}"),
    })?;
    Ok(parse_body(text))
}

/// Parse a body as JSON when possible, otherwise keep it as text.
fn parse_body(text: String) -> Value {
    serde_json::from_str(&text).unwrap_or(Value::String(text))
}

/// Parse an HTTP method string into a `reqwest::Method`.
fn parse_method(method: &str) -> Option<reqwest::Method> {
    match method.to_uppercase().as_str() {
        "GET" => Some(reqwest::Method::GET),
        "POST" => Some(reqwest::Method::POST),
        "PUT" => Some(reqwest::Method::PUT),
        "PATCH" => Some(reqwest::Method::PATCH),
        "DELETE" => Some(reqwest::Method::DELETE),
        "HEAD" => Some(reqwest::Method::HEAD),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;

    fn params(value: Value) -> Params {
        value.as_object().cloned().unwrap_or_default()
    }

    /// Serve one canned response per connection on a local port.  Each
    /// raw request (head and body) is forwarded on the returned channel.
    fn serve(responses: Vec<(&'static str, &'static str, &'static str)>) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();

        std::thread::spawn(move || {
            for (status, content_type, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                tx.send(read_request(&mut stream)).unwrap();
                let reply = format!(
                    "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                stream.write_all(reply.as_bytes()).unwrap();
            }
        });
        (base, rx)
    }

    fn read_request(stream: &mut impl Read) -> String {
        let mut raw = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            raw.extend_from_slice(&chunk[..n]);
            let text = String::from_utf8_lossy(&raw).to_string();
            if let Some(head_end) = text.find("\r\n\r\n") {
                let length = text[..head_end]
                    .lines()
                    .find_map(|line| {
                        let (name, value) = line.split_once(':')?;
                        name.eq_ignore_ascii_case("content-length")
                            .then(|| value.trim().parse::<usize>().ok())
                            .flatten()
                    })
                    .unwrap_or(0);
                if raw.len() >= head_end + 4 + length {
                    return text;
                }
            }
        }
        String::from_utf8_lossy(&raw).to_string()
    }

    // -- Requests against a local server ---------------------------------------

    #[test]
    fn get_returns_status_url_and_parsed_body() {
        let (base, requests) = serve(vec![("200 OK", "application/json", r#"{"ok":true}"#)]);
        let adapter = HttpAdapter::new("http-test");

        let result = adapter
            .invoke(
                "http_get",
                &params(json!({
                    "url": format!("{base}/items"),
                    "params": {"page": 2},
                    "headers": {"X-Token": "abc"},
                })),
            )
            .unwrap();

        assert_eq!(result["status"], 200);
        assert_eq!(result["url"], format!("{base}/items?page=2"));
        assert_eq!(result["body"], json!({"ok": true}));

        let request = requests.recv().unwrap().to_lowercase();
        assert!(request.starts_with("get /items?page=2 http/1.1"), "{request}");
        assert!(request.contains("x-token: abc"), "{request}");
        assert!(request.contains(&format!("user-agent: {}", DEFAULT_USER_AGENT.to_lowercase())));
    }

    #[test]
    fn non_success_status_is_execution_failure() {
        let (base, _requests) = serve(vec![("404 Not Found", "text/plain", "missing")]);
        let adapter = HttpAdapter::new("http-test");

        let err = adapter
            .invoke("http_get", &params(json!({"url": format!("{base}/gone")})))
            .unwrap_err();
        assert!(matches!(err, CapabilityError::ExecutionFailed { .. }));
        assert!(err.to_string().contains("404"), "{err}");
    }

    #[test]
    fn post_sends_json_and_returns_text_body() {
        let (base, requests) = serve(vec![("201 Created", "text/plain", "created")]);
        let adapter = HttpAdapter::new("http-test");

        let result = adapter
            .invoke("http_post", &params(json!({"url": format!("{base}/rows"), "json": {"a": 1}})))
            .unwrap();
        assert_eq!(result, json!("created"));

        let request = requests.recv().unwrap();
        assert!(request.starts_with("POST /rows "), "{request}");
        assert!(request.to_lowercase().contains("content-type: application/json"));
        assert!(request.ends_with(r#"{"a":1}"#), "{request}");
    }

    #[test]
    fn api_call_uses_requested_method() {
        let (base, requests) = serve(vec![("200 OK", "application/json", r#"{"deleted":3}"#)]);
        let adapter = HttpAdapter::new("http-test");

        let result = adapter
            .invoke("api_call", &params(json!({"url": format!("{base}/rows/3"), "method": "delete"})))
            .unwrap();
        assert_eq!(result, json!({"deleted": 3}));
        assert!(requests.recv().unwrap().starts_with("DELETE /rows/3 "));
    }

    #[test]
    fn download_file_writes_inside_root() {
        let (base, _requests) = serve(vec![("200 OK", "text/plain", "hello")]);
        let dir = tempfile::tempdir().unwrap();
        let adapter = HttpAdapter::with_settings("http-test", DEFAULT_USER_AGENT, 5, dir.path());

        let result = adapter
            .invoke(
                "download_file",
                &params(json!({"url": format!("{base}/file.txt"), "output_path": "out/file.txt"})),
            )
            .unwrap();
        assert_eq!(result, json!("out/file.txt"));
        assert_eq!(std::fs::read_to_string(dir.path().join("out/file.txt")).unwrap(), "hello");
    }

    #[test]
    fn download_file_rejects_escaping_path() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = HttpAdapter::with_settings("http-test", DEFAULT_USER_AGENT, 5, dir.path());

        let err = adapter
            .invoke(
                "download_file",
                &params(json!({"url": "http://127.0.0.1:9/x", "output_path": "../escape.txt"})),
            )
            .unwrap_err();
        assert!(err.to_string().contains("outside the root directory"), "{err}");
    }

    // -- Argument handling -------------------------------------------------------

    #[test]
    fn declares_operations() {
        let adapter = HttpAdapter::new("http-test");
        let names: Vec<String> = adapter.operations().into_iter().map(|o| o.name).collect();
        assert_eq!(names, vec!["http_get", "http_post", "api_call", "download_file"]);
    }

    #[test]
    fn missing_url_is_invalid_params() {
        let adapter = HttpAdapter::new("http-test");
        let err = adapter.invoke("http_get", &Params::new()).unwrap_err();
        assert!(matches!(err, CapabilityError::InvalidParams { .. }));
    }

    #[test]
    fn malformed_url_is_rejected_before_sending() {
        let adapter = HttpAdapter::new("http-test");
        let err = adapter
            .invoke("http_get", &params(json!({"url": "not a url"})))
            .unwrap_err();
        assert!(err.to_string().contains("invalid URL"));
    }

    #[test]
    fn unsupported_method_is_rejected() {
        let adapter = HttpAdapter::new("http-test");
        let err = adapter
            .invoke("api_call", &params(json!({"url": "https://example.com", "method": "BREW"})))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported HTTP method"));
    }

    #[test]
    fn body_parsing_prefers_json() {
        assert_eq!(parse_body(r#"{"ok":true}"#.into()), json!({"ok": true}));
        assert_eq!(parse_body("<html></html>".into()), json!("<html></html>"));
    }

    #[test]
    fn parse_method_case_insensitive() {
        assert_eq!(parse_method("post"), Some(reqwest::Method::POST));
        assert!(parse_method("TRACE").is_none());
    }
}
