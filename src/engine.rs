// Copyright 2026 Lexsearch Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Search engine client boundary. Everything above this module is pure; all
//! network I/O goes through [`EngineClient`].

use std::time::Duration;

use reqwest::blocking::Client;
use reqwest::blocking::Response;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use serde_json::Value;
use serde_json::json;
use tracing::debug;
use tracing::warn;

use crate::error::Result;
use crate::error::SearchError;

const TOO_MANY_BUCKETS: &str = "too_many_buckets_exception";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRequest {
    pub indices: Vec<String>,
    pub body: Value,
}

/// One response of a batch, tagged with the position of its request.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchResponse {
    pub position: usize,
    pub body: Value,
}

pub trait EngineClient: Send + Sync {
    fn search(&self, indices: &[String], body: &Value) -> Result<Value>;

    /// Runs all requests in one round trip. Responses may come back in any
    /// order; callers reorder by [`BatchResponse::position`].
    fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<BatchResponse>>;

    /// Raw `_mapping` body for an index or alias.
    fn mapping(&self, index: &str) -> Result<Value>;

    /// Physical index names behind `alias`.
    fn aliases(&self, alias: &str) -> Result<Vec<String>>;
}

#[derive(Clone)]
pub struct EsClient {
    base_url: String,
    http: Client,
}

impl std::fmt::Debug for EsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EsClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl EsClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

impl EngineClient for EsClient {
    fn search(&self, indices: &[String], body: &Value) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url, indices.join(","));
        let resp = self.http.post(url).json(body).send()?;
        read_response(resp)
    }

    fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<BatchResponse>> {
        let url = format!("{}/_msearch", self.base_url);
        let payload = msearch_body(requests)?;
        debug!(requests = requests.len(), "multi search");
        let resp = self
            .http
            .post(url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(payload)
            .send()?;
        let body = read_response(resp)?;
        let responses = body
            .get("responses")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                SearchError::MalformedResponse("multi search response has no responses".into())
            })?;
        if responses.len() != requests.len() {
            return Err(SearchError::MalformedResponse(format!(
                "multi search returned {} responses for {} requests",
                responses.len(),
                requests.len()
            )));
        }
        responses
            .iter()
            .enumerate()
            .map(|(position, body)| {
                if body.get("error").is_some() {
                    let status = body
                        .get("status")
                        .and_then(Value::as_u64)
                        .and_then(|s| u16::try_from(s).ok())
                        .unwrap_or(500);
                    return Err(backend_error(status, body));
                }
                Ok(BatchResponse {
                    position,
                    body: body.clone(),
                })
            })
            .collect()
    }

    fn mapping(&self, index: &str) -> Result<Value> {
        let url = format!("{}/{}/_mapping", self.base_url, index);
        let resp = self.http.get(url).send()?;
        read_response(resp)
    }

    fn aliases(&self, alias: &str) -> Result<Vec<String>> {
        let url = format!("{}/_alias/{}", self.base_url, alias);
        let resp = self.http.get(url).send()?;
        if resp.status().as_u16() == 404 {
            // Not an alias; the name is a concrete index.
            return Ok(vec![alias.to_string()]);
        }
        let body = read_response(resp)?;
        let indices = body
            .as_object()
            .map(|obj| obj.keys().cloned().collect())
            .unwrap_or_default();
        Ok(indices)
    }
}

fn read_response(resp: Response) -> Result<Value> {
    let status = resp.status();
    let text = resp.text()?;
    if status.is_success() {
        return Ok(serde_json::from_str(&text)?);
    }
    let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
    Err(backend_error(status.as_u16(), &body))
}

/// Newline-delimited header/body pairs for `_msearch`.
pub(crate) fn msearch_body(requests: &[SearchRequest]) -> Result<String> {
    let mut out = String::new();
    for request in requests {
        out.push_str(&serde_json::to_string(
            &json!({ "index": request.indices.join(",") }),
        )?);
        out.push('\n');
        out.push_str(&serde_json::to_string(&request.body)?);
        out.push('\n');
    }
    Ok(out)
}

/// Builds a backend error from an engine error body. The innermost cause is
/// often the informative one, so a bucket-limit cause anywhere in the chain
/// wins over the outer type.
pub(crate) fn backend_error(status: u16, body: &Value) -> SearchError {
    let error = body.get("error").unwrap_or(body);
    let mut types = Vec::new();
    collect_error_types(error, &mut types);
    let error_type = if types.iter().any(|t| t == TOO_MANY_BUCKETS) {
        TOO_MANY_BUCKETS.to_string()
    } else {
        types
            .into_iter()
            .next()
            .unwrap_or_else(|| "unknown".to_string())
    };
    let reason = error
        .get("reason")
        .and_then(Value::as_str)
        .map(str::to_string)
        .or_else(|| error.as_str().map(str::to_string))
        .unwrap_or_default();
    warn!(status, error_type = %error_type, reason = %reason, "engine request failed");
    SearchError::Backend {
        status,
        error_type,
        reason,
    }
}

fn collect_error_types(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            if let Some(ty) = map.get("type").and_then(Value::as_str) {
                out.push(ty.to_string());
            }
            for (key, child) in map {
                if key != "type" {
                    collect_error_types(child, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_error_types(item, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn is_too_many_buckets(err: &SearchError) -> bool {
    matches!(err, SearchError::Backend { error_type, .. } if error_type == TOO_MANY_BUCKETS)
}
