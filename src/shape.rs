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

//! Turns raw engine responses into [`SearchResult`]s.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde_json::Value;

use crate::error::Result;
use crate::error::SearchError;
use crate::model::HighlightMode;
use crate::model::Hit;
use crate::model::QueryRequest;
use crate::model::SearchResult;
use crate::schema::SchemaSnapshot;

pub fn shape(raw: &Value, request: &QueryRequest, schema: &SchemaSnapshot) -> Result<SearchResult> {
    let hits_obj = raw
        .get("hits")
        .ok_or_else(|| SearchError::MalformedResponse("response has no hits".into()))?;
    let total = match hits_obj.get("total") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(total) => total.get("value").and_then(Value::as_u64),
        None => None,
    }
    .ok_or_else(|| SearchError::MalformedResponse("response has no hit total".into()))?;

    let raw_hits = hits_obj
        .get("hits")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let hits = raw_hits
        .iter()
        .map(|hit| shape_hit(hit, request, schema))
        .collect::<Result<Vec<_>>>()?;

    let distribution = if request.lexicon_stats {
        Some(distribution(raw, request, schema)?)
    } else {
        None
    };
    Ok(SearchResult {
        total,
        hits,
        distribution,
    })
}

fn shape_hit(hit: &Value, request: &QueryRequest, schema: &SchemaSnapshot) -> Result<Hit> {
    let index = hit.get("_index").and_then(Value::as_str).unwrap_or_default();
    let resource = resolve_resource(index, request, schema)?;
    let id = match hit.get("_id") {
        Some(Value::String(id)) => id.clone(),
        Some(other) => other.to_string(),
        None => return Err(SearchError::MalformedResponse("hit has no _id".into())),
    };
    let source = hit.get("_source").cloned().unwrap_or(Value::Null);
    let entry = match &request.path {
        Some(path) => project(&source, path),
        None => source,
    };
    let highlight = if request.highlight.is_on() {
        reconcile_highlight(hit, request.highlight)
    } else {
        None
    };
    Ok(Hit {
        resource,
        id,
        entry,
        highlight,
    })
}

/// Maps a physical index name back to the resource that owns it. A single
/// resource request still resolves when the alias moved after publication.
fn resolve_resource(index: &str, request: &QueryRequest, schema: &SchemaSnapshot) -> Result<String> {
    if let Some(resource) = schema.resource_for_index(index) {
        return Ok(resource.to_string());
    }
    match request.resources.as_slice() {
        [only] => Ok(only.clone()),
        _ => Err(SearchError::MalformedResponse(format!(
            "hit from unknown index '{index}'"
        ))),
    }
}

fn distribution(
    raw: &Value,
    request: &QueryRequest,
    schema: &SchemaSnapshot,
) -> Result<BTreeMap<String, u64>> {
    let buckets = raw
        .pointer("/aggregations/distribution/buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| {
            SearchError::MalformedResponse("response has no distribution aggregation".into())
        })?;
    let mut out: BTreeMap<String, u64> = request
        .resources
        .iter()
        .map(|resource| (resource.clone(), 0))
        .collect();
    for bucket in buckets {
        let index = bucket.get("key").and_then(Value::as_str).unwrap_or_default();
        let count = bucket.get("doc_count").and_then(Value::as_u64).unwrap_or(0);
        let resource = resolve_resource(index, request, schema)?;
        *out.entry(resource).or_default() += count;
    }
    Ok(out)
}

/// Value at the dotted `path` within `entry`. Crossing an array anywhere on
/// the way yields an array of every value found; a missing path is null.
pub fn project(entry: &Value, path: &str) -> Value {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let mut found = Vec::new();
    let mut crossed = false;
    collect_path(entry, &segments, &mut found, &mut crossed);
    if crossed {
        Value::Array(found.into_iter().cloned().collect())
    } else {
        found.first().map(|v| (*v).clone()).unwrap_or(Value::Null)
    }
}

fn collect_path<'v>(value: &'v Value, segments: &[&str], out: &mut Vec<&'v Value>, crossed: &mut bool) {
    match (value, segments.split_first()) {
        (_, None) => out.push(value),
        (Value::Array(items), Some(_)) => {
            *crossed = true;
            for item in items {
                collect_path(item, segments, out, crossed);
            }
        }
        (Value::Object(map), Some((head, rest))) => {
            if let Some(child) = map.get(*head) {
                collect_path(child, rest, out, crossed);
            }
        }
        _ => {}
    }
}

/// A highlight found inside an inner hit.
#[derive(Debug)]
struct InnerHighlight {
    plain: String,
    indexed: String,
    fragments: Vec<String>,
}

#[derive(Debug, Clone, Default)]
struct NestedPrefix {
    plain: String,
    indexed: String,
}

fn reconcile_highlight(hit: &Value, mode: HighlightMode) -> Option<BTreeMap<String, Vec<String>>> {
    let mut merged = fragments_of(hit.get("highlight"));
    let mut inner = Vec::new();
    collect_inner_highlights(hit, &NestedPrefix::default(), &mut inner);

    let mut consumed = BTreeSet::new();
    for entry in inner {
        // The indexed inner entry replaces the un-indexed outer duplicate.
        if consumed.insert(entry.plain.clone()) {
            merged.remove(&entry.plain);
        }
        let key = match mode {
            HighlightMode::Legacy => entry.plain,
            _ => entry.indexed,
        };
        let slot = merged.entry(key).or_default();
        for fragment in entry.fragments {
            if !slot.contains(&fragment) {
                slot.push(fragment);
            }
        }
    }
    (!merged.is_empty()).then_some(merged)
}

fn fragments_of(highlight: Option<&Value>) -> BTreeMap<String, Vec<String>> {
    let Some(Value::Object(map)) = highlight else {
        return BTreeMap::new();
    };
    map.iter()
        .map(|(path, frags)| {
            let frags = frags
                .as_array()
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default();
            (path.clone(), frags)
        })
        .filter(|(_, frags): &(String, Vec<String>)| !frags.is_empty())
        .collect()
}

fn collect_inner_highlights(hit: &Value, parent: &NestedPrefix, out: &mut Vec<InnerHighlight>) {
    let Some(Value::Object(groups)) = hit.get("inner_hits") else {
        return;
    };
    for group in groups.values() {
        let Some(inner_hits) = group.pointer("/hits/hits").and_then(Value::as_array) else {
            continue;
        };
        for inner_hit in inner_hits {
            let prefix = nested_prefix(inner_hit.get("_nested"), parent);
            for (path, fragments) in fragments_of(inner_hit.get("highlight")) {
                let indexed = match path
                    .strip_prefix(prefix.plain.as_str())
                    .and_then(|rest| rest.strip_prefix('.'))
                {
                    Some(rest) => format!("{}.{rest}", prefix.indexed),
                    None => path.clone(),
                };
                out.push(InnerHighlight {
                    plain: path,
                    indexed,
                    fragments,
                });
            }
            collect_inner_highlights(inner_hit, &prefix, out);
        }
    }
}

/// Rebuilds `a[2].b[0]` from an inner hit's `_nested` chain. Chains relative
/// to the enclosing inner hit are joined onto its prefix.
fn nested_prefix(nested: Option<&Value>, parent: &NestedPrefix) -> NestedPrefix {
    let mut plain = Vec::new();
    let mut indexed = Vec::new();
    let mut cursor = nested;
    while let Some(level) = cursor {
        let Some(field) = level.get("field").and_then(Value::as_str) else {
            break;
        };
        let offset = level.get("offset").and_then(Value::as_u64).unwrap_or(0);
        plain.push(field.to_string());
        indexed.push(format!("{field}[{offset}]"));
        cursor = level.get("_nested");
    }
    let plain = plain.join(".");
    let indexed = indexed.join(".");
    let absolute = parent.plain.is_empty()
        || plain == parent.plain
        || plain.starts_with(&format!("{}.", parent.plain));
    if absolute {
        NestedPrefix { plain, indexed }
    } else {
        NestedPrefix {
            plain: format!("{}.{plain}", parent.plain),
            indexed: format!("{}.{indexed}", parent.indexed),
        }
    }
}
