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

//! Request and result types shared by the query pipeline.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::ast::AstNode;
use crate::error::Result;
use crate::error::SearchError;
use crate::parser::parse;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HighlightMode {
    #[default]
    Off,
    /// Un-indexed paths with fragments flattened per path.
    Legacy,
    /// Index-qualified paths such as `larger_place[2].name`.
    Indexed,
}

impl HighlightMode {
    pub fn from_param(value: &str) -> Result<Self> {
        match value {
            "false" => Ok(Self::Off),
            "true" => Ok(Self::Legacy),
            "new" => Ok(Self::Indexed),
            other => Err(SearchError::UnsupportedQuery(format!(
                "highlight must be one of false, true, new (got '{other}')"
            ))),
        }
    }

    pub fn is_on(self) -> bool {
        self != Self::Off
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl SortSpec {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
        }
    }

    /// Parses one `field` or `field|asc` / `field|desc` entry.
    pub fn parse(entry: &str) -> Result<Self> {
        let (field, order) = match entry.split_once('|') {
            Some((field, order)) => (field.trim(), order.trim()),
            None => (entry.trim(), "asc"),
        };
        if field.is_empty() {
            return Err(SearchError::UnsupportedQuery(format!(
                "sort entry '{entry}' has no field"
            )));
        }
        let order = match order {
            "asc" => SortOrder::Asc,
            "desc" => SortOrder::Desc,
            other => {
                return Err(SearchError::UnsupportedQuery(format!(
                    "sort order must be asc or desc (got '{other}')"
                )));
            }
        };
        Ok(Self {
            field: field.to_string(),
            order,
        })
    }

    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        list.split(',')
            .filter(|entry| !entry.trim().is_empty())
            .map(Self::parse)
            .collect()
    }
}

/// Raw parameters as they arrive from an HTTP query string.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub resources: String,
    pub q: Option<String>,
    pub from: Option<u32>,
    pub size: Option<u32>,
    pub sort: Option<String>,
    pub lexicon_stats: Option<bool>,
    pub path: Option<String>,
    pub highlight: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryRequest {
    pub resources: Vec<String>,
    pub query: Option<AstNode>,
    pub from: u32,
    /// `None` lets the engine cap the page at its result window.
    pub size: Option<u32>,
    pub sort: Vec<SortSpec>,
    pub lexicon_stats: bool,
    pub highlight: HighlightMode,
    pub path: Option<String>,
}

impl QueryRequest {
    pub fn new<I, S>(resources: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let resources: Vec<String> = resources.into_iter().map(Into::into).collect();
        if resources.is_empty() {
            return Err(SearchError::UnsupportedQuery(
                "at least one resource is required".to_string(),
            ));
        }
        Ok(Self {
            resources,
            query: None,
            from: 0,
            size: None,
            sort: Vec::new(),
            lexicon_stats: false,
            highlight: HighlightMode::Off,
            path: None,
        })
    }

    pub fn from_params(params: &QueryParams) -> Result<Self> {
        let resources: Vec<&str> = params
            .resources
            .split(',')
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .collect();
        let mut request = Self::new(resources)?;
        if let Some(q) = params.q.as_deref().filter(|q| !q.trim().is_empty()) {
            request.query = Some(parse(q)?);
        }
        request.from = params.from.unwrap_or(0);
        request.size = params.size;
        if let Some(sort) = &params.sort {
            request.sort = SortSpec::parse_list(sort)?;
        }
        request.lexicon_stats = params.lexicon_stats.unwrap_or(false);
        request.path = params.path.clone().filter(|p| !p.is_empty());
        if let Some(highlight) = &params.highlight {
            request.highlight = HighlightMode::from_param(highlight)?;
        }
        Ok(request)
    }

    pub fn with_query(mut self, query: AstNode) -> Self {
        self.query = Some(query);
        self
    }

    pub fn with_from(mut self, from: u32) -> Self {
        self.from = from;
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_sort(mut self, sort: Vec<SortSpec>) -> Self {
        self.sort = sort;
        self
    }

    pub fn with_lexicon_stats(mut self, lexicon_stats: bool) -> Self {
        self.lexicon_stats = lexicon_stats;
        self
    }

    pub fn with_highlight(mut self, highlight: HighlightMode) -> Self {
        self.highlight = highlight;
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Hit {
    pub resource: String,
    pub id: String,
    pub entry: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub highlight: Option<BTreeMap<String, Vec<String>>>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SearchResult {
    pub total: u64,
    pub hits: Vec<Hit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution: Option<BTreeMap<String, u64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldValueCount {
    pub value: Value,
    pub count: u64,
}
