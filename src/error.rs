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

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// Syntax error in a query string. Shown verbatim to callers, so the
/// fragment is the unparsed remainder starting at the failure position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("parse error at '{fragment}': {description}")]
pub struct ParseError {
    pub fragment: String,
    pub description: String,
}

impl ParseError {
    pub fn new(fragment: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            fragment: fragment.into(),
            description: description.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SearchError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("unsupported field: {0}")]
    UnsupportedField(String),

    #[error("unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("incomplete query '{failing_query}': {description}")]
    IncompleteQuery {
        failing_query: String,
        description: String,
    },

    #[error("too many buckets: aggregation exceeds {limit} distinct values, narrow your aggregation")]
    TooManyBuckets { limit: usize },

    #[error("backend error ({status}) {error_type}: {reason}")]
    Backend {
        status: u16,
        error_type: String,
        reason: String,
    },

    #[error("malformed engine response: {0}")]
    MalformedResponse(String),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl SearchError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Parse(_) => "PARSE_ERROR",
            Self::UnsupportedField(_) => "UNSUPPORTED_FIELD",
            Self::UnsupportedQuery(_) => "UNSUPPORTED_QUERY",
            Self::IncompleteQuery { .. } => "INCOMPLETE_QUERY",
            Self::TooManyBuckets { .. } => "TOO_MANY_BUCKETS",
            Self::Backend { .. } => "BACKEND_ERROR",
            Self::MalformedResponse(_) => "BACKEND_ERROR",
            Self::Http(_) => "BACKEND_ERROR",
            Self::Json(_) => "BACKEND_ERROR",
        }
    }

    /// Caller mistakes (4xx class) as opposed to engine or transport failures.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse(_)
                | Self::UnsupportedField(_)
                | Self::UnsupportedQuery(_)
                | Self::IncompleteQuery { .. }
                | Self::TooManyBuckets { .. }
        )
    }

    /// Extra detail for the JSON envelope, when the variant carries any.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Parse(err) => Some(serde_json::json!({
                "fragment": err.fragment,
                "description": err.description,
            })),
            Self::UnsupportedField(field) => Some(serde_json::json!({ "field": field })),
            Self::IncompleteQuery {
                failing_query,
                description,
            } => Some(serde_json::json!({
                "failing_query": failing_query,
                "description": description,
            })),
            Self::TooManyBuckets { limit } => Some(serde_json::json!({ "limit": limit })),
            Self::Backend {
                status, error_type, ..
            } => Some(serde_json::json!({ "status": status, "type": error_type })),
            _ => None,
        }
    }

    pub(crate) fn incomplete(failing_query: impl ToString, description: impl Into<String>) -> Self {
        Self::IncompleteQuery {
            failing_query: failing_query.to_string(),
            description: description.into(),
        }
    }
}
