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

//! Distinct value counts for one field, counted per parent document.

use serde_json::Value;
use serde_json::json;

use crate::error::Result;
use crate::error::SearchError;
use crate::model::FieldValueCount;
use crate::schema::SchemaSnapshot;

const VALUES: &str = "values";
const PARENT_DOC_COUNT: &str = "parent_doc_count";

/// Aggregation request for the distinct values of `field` in `resource`.
///
/// Fields under nested arrays get one `nested` aggregation per boundary, and
/// every level carries a `reverse_nested` count so a value repeated inside one
/// document's array counts that document once.
pub fn statistics_body(
    schema: &SchemaSnapshot,
    resource: &str,
    field: &str,
    bucket_ceiling: usize,
) -> Result<Value> {
    let target = schema.sortable(resource, field)?;
    let ancestors = schema.nesting_ancestors(resource, &target);

    let mut agg = json!({ "terms": { "field": target, "size": bucket_ceiling } });
    if !ancestors.is_empty() {
        agg["aggs"] = json!({ PARENT_DOC_COUNT: { "reverse_nested": {} } });
    }
    for path in ancestors.iter().rev() {
        agg = json!({
            "nested": { "path": path },
            "aggs": {
                VALUES: agg,
                PARENT_DOC_COUNT: { "reverse_nested": {} },
            },
        });
    }
    Ok(json!({
        "size": 0,
        "track_total_hits": false,
        "aggs": { VALUES: agg },
    }))
}

pub fn shape_statistics(raw: &Value, bucket_ceiling: usize) -> Result<Vec<FieldValueCount>> {
    let mut node = raw
        .get("aggregations")
        .and_then(|aggs| aggs.get(VALUES))
        .ok_or_else(|| SearchError::MalformedResponse("response has no value aggregation".into()))?;
    while node.get("buckets").is_none() {
        node = node.get(VALUES).ok_or_else(|| {
            SearchError::MalformedResponse("value aggregation has no buckets".into())
        })?;
    }
    let buckets = node
        .get("buckets")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::MalformedResponse("buckets is not an array".into()))?;
    let other = node
        .get("sum_other_doc_count")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if other > 0 || buckets.len() > bucket_ceiling {
        return Err(SearchError::TooManyBuckets {
            limit: bucket_ceiling,
        });
    }

    buckets
        .iter()
        .map(|bucket| {
            let value = bucket
                .get("key_as_string")
                .or_else(|| bucket.get("key"))
                .cloned()
                .ok_or_else(|| SearchError::MalformedResponse("bucket has no key".into()))?;
            let count = bucket
                .get(PARENT_DOC_COUNT)
                .and_then(|parent| parent.get("doc_count"))
                .or_else(|| bucket.get("doc_count"))
                .and_then(Value::as_u64)
                .unwrap_or(0);
            Ok(FieldValueCount { value, count })
        })
        .collect()
}
