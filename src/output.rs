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

use anyhow::Result;
use lexsearch::SearchError;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Default)]
pub struct QueryOut {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub canonical: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub resources: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorOut {
    pub code: String,
    pub message: String,
    pub details: Option<Value>,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct JsonResponse {
    pub ok: bool,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryOut>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorOut>,
}

impl JsonResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            schema_version: "1".to_string(),
            ..Default::default()
        }
    }

    pub fn error(code: &str, message: &str) -> Self {
        Self {
            ok: false,
            schema_version: "1".to_string(),
            error: Some(ErrorOut {
                code: code.to_string(),
                message: message.to_string(),
                details: None,
                hint: None,
            }),
            ..Default::default()
        }
    }

    /// Error envelope for `err`, carrying the stable code of a
    /// [`SearchError`] when there is one underneath.
    pub fn from_error(err: &anyhow::Error) -> Self {
        let Some(search) = err.downcast_ref::<SearchError>() else {
            return Self::error("ERROR", &format!("{err:#}"));
        };
        let mut resp = Self::error(search.code(), &search.to_string());
        if let Some(error) = &mut resp.error {
            error.details = search.details();
            error.hint = hint_for(search);
        }
        resp
    }

    pub fn with_query(mut self, query: QueryOut) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }
}

fn hint_for(err: &SearchError) -> Option<String> {
    match err {
        SearchError::UnsupportedField(_) => {
            Some("run `lexsearch fields` to list the searchable fields".to_string())
        }
        SearchError::TooManyBuckets { .. } => {
            Some("add a query or pick a field with fewer distinct values".to_string())
        }
        _ => None,
    }
}

pub fn print_json(resp: &JsonResponse) -> Result<()> {
    let text = serde_json::to_string_pretty(resp)?;
    println!("{text}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use lexsearch::ParseError;

    use super::*;

    #[test]
    fn search_errors_keep_their_code() {
        let err = anyhow::Error::new(SearchError::from(ParseError::new("|x", "expected field")));
        let resp = JsonResponse::from_error(&err);
        let error = resp.error.unwrap();
        assert!(!resp.ok);
        assert_eq!(error.code, "PARSE_ERROR");
        assert_eq!(error.details.unwrap()["fragment"], "|x");

        let other = JsonResponse::from_error(&anyhow::anyhow!("read config"));
        assert_eq!(other.error.unwrap().code, "ERROR");
    }
}
