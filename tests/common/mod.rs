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

//! In-memory engine that evaluates the subset of the query DSL the compiler
//! emits. Nested fields are only visible through `nested` queries, so a
//! missing or doubled wrap changes the result set the way it would on a real
//! engine.

#![allow(dead_code)]

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering as AtomicOrdering;

use lexsearch::BatchResponse;
use lexsearch::EngineClient;
use lexsearch::FieldType;
use lexsearch::ResourceSchema;
use lexsearch::SearchError;
use lexsearch::SearchRequest;
use lexsearch::shape::project;
use regex::Regex;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

pub const INDEX: &str = "places_20260101";
pub const MAPPING: &str = include_str!("../fixtures/places_mapping.json");

pub fn place_docs() -> Vec<(String, Value)> {
    vec![
        (
            "grund-test".into(),
            json!({
                "name": "Grund test", "population": 120, "code": "GT",
                "municipality": 1, "active": true,
                "info": { "note": "by the lake", "founded": "1540-01-01" },
            }),
        ),
        (
            "grunds".into(),
            json!({ "name": "Grunds", "population": 40, "code": "GR", "municipality": 1 }),
        ),
        (
            "botten-test".into(),
            json!({ "name": "Botten test", "population": 900, "code": "BT", "municipality": 2 }),
        ),
        (
            "hambo".into(),
            json!({
                "name": "Hambo", "population": 75, "code": "HB", "municipality": 2,
                "larger_place": "botten-test",
                "v_larger_place": [{
                    "name": "Botten test", "population": 900,
                    "districts": [
                        { "name": "Norr", "code": "N1" },
                        { "name": "Söder", "code": "S1" },
                    ],
                }],
            }),
        ),
        (
            "rutvik".into(),
            json!({
                "name": "Rutvik", "population": 310, "code": "RV", "municipality": 3,
                "larger_place": "alvik",
                "v_larger_place": [{
                    "name": "Alvik", "population": 1500,
                    "districts": [
                        { "name": "Norr", "code": "N1" },
                        { "name": "Norr strand", "code": "N1" },
                    ],
                }],
            }),
        ),
        (
            "alvik".into(),
            json!({ "name": "Alvik", "population": 1500, "code": "AV", "municipality": 3, "active": false }),
        ),
        (
            "alhamn".into(),
            json!({ "name": "Alhamn", "population": 12, "code": ["AH", "AH2"], "municipality": 3 }),
        ),
        (
            "bjurvik".into(),
            json!({ "name": "Bjurvik", "population": 210, "code": "BV", "municipality": 4 }),
        ),
    ]
}

#[derive(Debug)]
pub struct MemoryEngine {
    schema: ResourceSchema,
    docs: Vec<(String, Value)>,
    searches: AtomicUsize,
    batches: AtomicUsize,
    reverse_batches: bool,
    fail_with: Option<(u16, String)>,
}

impl MemoryEngine {
    pub fn places() -> Self {
        let mapping: Value = serde_json::from_str(MAPPING).expect("mapping fixture");
        let schema = ResourceSchema::from_mapping("places", "places", vec![INDEX.into()], &mapping)
            .expect("schema");
        Self {
            schema,
            docs: place_docs(),
            searches: AtomicUsize::new(0),
            batches: AtomicUsize::new(0),
            reverse_batches: false,
            fail_with: None,
        }
    }

    /// Answers batches in reverse order, tagged with their positions.
    pub fn reversing_batches(mut self) -> Self {
        self.reverse_batches = true;
        self
    }

    pub fn failing_with(mut self, status: u16, error_type: &str) -> Self {
        self.fail_with = Some((status, error_type.to_string()));
        self
    }

    pub fn search_calls(&self) -> usize {
        self.searches.load(AtomicOrdering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batches.load(AtomicOrdering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.search_calls() + self.batch_calls()
    }

    fn run(&self, body: &Value) -> Result<Value, SearchError> {
        if let Some((status, error_type)) = &self.fail_with {
            return Err(SearchError::Backend {
                status: *status,
                error_type: error_type.clone(),
                reason: "injected failure".into(),
            });
        }
        let eval = Eval {
            schema: &self.schema,
            runtime: body.get("runtime_mappings").and_then(Value::as_object),
        };
        let match_all = json!({ "match_all": {} });
        let query = body.get("query").unwrap_or(&match_all);
        let mut matched: Vec<usize> = (0..self.docs.len())
            .filter(|&i| eval.matches(query, &self.docs[i].1, ""))
            .collect();

        if let Some(sort) = body.get("sort").and_then(Value::as_array) {
            matched.sort_by(|&a, &b| self.compare_docs(sort, a, b));
        }

        let total = matched.len();
        let from = body.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;
        let size = body.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let hits: Vec<Value> = matched
            .iter()
            .skip(from)
            .take(size)
            .map(|&i| json!({ "_index": INDEX, "_id": self.docs[i].0, "_source": self.docs[i].1 }))
            .collect();

        let mut response = json!({
            "hits": { "total": { "value": total, "relation": "eq" }, "hits": hits },
        });
        if let Some(aggs) = body.get("aggs") {
            let mut out = Map::new();
            if aggs.get("distribution").is_some() {
                let buckets = if total > 0 {
                    json!([{ "key": INDEX, "doc_count": total }])
                } else {
                    json!([])
                };
                out.insert("distribution".into(), json!({ "buckets": buckets }));
            }
            if let Some(values) = aggs.get("values") {
                let items = matched
                    .iter()
                    .map(|&i| (i, self.docs[i].1.clone(), String::new()))
                    .collect();
                out.insert("values".into(), eval.aggregate(values, items));
            }
            response["aggregations"] = Value::Object(out);
        }
        Ok(response)
    }

    fn compare_docs(&self, sort: &[Value], a: usize, b: usize) -> Ordering {
        for clause in sort {
            let Some((field, spec)) = clause.as_object().and_then(|o| o.iter().next()) else {
                continue;
            };
            if field == "_score" {
                continue;
            }
            let base = self
                .schema
                .field(field)
                .and_then(|f| f.multi_field_of.clone())
                .unwrap_or_else(|| field.clone());
            let key = |i: usize| first_scalar(&project(&self.docs[i].1, &base));
            let ord = compare_values(&key(a), &key(b));
            let ord = if spec["order"] == "desc" { ord.reverse() } else { ord };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }
}

impl EngineClient for MemoryEngine {
    fn search(&self, _indices: &[String], body: &Value) -> Result<Value, SearchError> {
        self.searches.fetch_add(1, AtomicOrdering::SeqCst);
        self.run(body)
    }

    fn multi_search(&self, requests: &[SearchRequest]) -> Result<Vec<BatchResponse>, SearchError> {
        self.batches.fetch_add(1, AtomicOrdering::SeqCst);
        let mut out = requests
            .iter()
            .enumerate()
            .map(|(position, request)| {
                Ok(BatchResponse {
                    position,
                    body: self.run(&request.body)?,
                })
            })
            .collect::<Result<Vec<_>, SearchError>>()?;
        if self.reverse_batches {
            out.reverse();
        }
        Ok(out)
    }

    fn mapping(&self, _index: &str) -> Result<Value, SearchError> {
        Ok(serde_json::from_str(MAPPING)?)
    }

    fn aliases(&self, _alias: &str) -> Result<Vec<String>, SearchError> {
        Ok(vec![INDEX.to_string()])
    }
}

struct Eval<'a> {
    schema: &'a ResourceSchema,
    runtime: Option<&'a Map<String, Value>>,
}

impl Eval<'_> {
    fn matches(&self, query: &Value, ctx: &Value, scope: &str) -> bool {
        let (kind, spec) = query
            .as_object()
            .and_then(|o| o.iter().next())
            .expect("query object");
        match kind.as_str() {
            "match_all" => true,
            "match_none" => false,
            "bool" => self.bool_matches(spec, ctx, scope),
            "nested" => {
                let path = spec["path"].as_str().expect("nested path");
                self.nested_elements(ctx, scope, path)
                    .iter()
                    .any(|element| self.matches(&spec["query"], element, path))
            }
            "exists" => {
                let field = spec["field"].as_str().expect("exists field");
                !self.values(ctx, scope, field).is_empty()
            }
            "term" | "match_phrase" | "match" | "regexp" | "range" => {
                let (field, params) = spec
                    .as_object()
                    .and_then(|o| o.iter().next())
                    .expect("leaf query");
                self.leaf_matches(kind, field, params, ctx, scope)
            }
            "multi_match" => self
                .expand_fields(&spec["fields"])
                .iter()
                .any(|field| {
                    let params = json!({ "query": spec["query"] });
                    self.leaf_matches("match_phrase", field, &params, ctx, scope)
                }),
            "query_string" => {
                let pattern = spec["query"].as_str().expect("query string");
                let pattern = pattern.trim_start_matches('/').trim_end_matches('/');
                self.expand_fields(&spec["fields"]).iter().any(|field| {
                    let params = json!({ "value": pattern, "case_insensitive": true });
                    self.leaf_matches("regexp", field, &params, ctx, scope)
                })
            }
            other => panic!("unsupported query type {other}"),
        }
    }

    fn bool_matches(&self, spec: &Value, ctx: &Value, scope: &str) -> bool {
        let clauses = |key: &str| {
            spec.get(key)
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default()
        };
        let must = clauses("must");
        let filter = clauses("filter");
        let must_not = clauses("must_not");
        let should = clauses("should");
        if !must.iter().chain(&filter).all(|q| self.matches(q, ctx, scope)) {
            return false;
        }
        if must_not.iter().any(|q| self.matches(q, ctx, scope)) {
            return false;
        }
        let default_min = if must.is_empty() && filter.is_empty() && !should.is_empty() {
            1
        } else {
            0
        };
        let min = spec
            .get("minimum_should_match")
            .and_then(Value::as_u64)
            .unwrap_or(default_min) as usize;
        should.iter().filter(|q| self.matches(q, ctx, scope)).count() >= min
    }

    fn expand_fields(&self, fields: &Value) -> Vec<String> {
        let mut out = Vec::new();
        for pattern in fields.as_array().into_iter().flatten().filter_map(Value::as_str) {
            if pattern.contains('*') {
                let re = Regex::new(&format!("^{}$", regex::escape(pattern).replace("\\*", ".*")))
                    .expect("field pattern");
                out.extend(
                    self.schema
                        .fields
                        .values()
                        .filter(|f| f.is_leaf() && f.nesting_ancestors.is_empty())
                        .filter(|f| re.is_match(&f.path))
                        .map(|f| f.path.clone()),
                );
            } else {
                out.push(pattern.to_string());
            }
        }
        out
    }

    fn field_type(&self, field: &str) -> FieldType {
        if self.runtime.is_some_and(|r| r.contains_key(field)) {
            return FieldType::Long;
        }
        self.schema
            .field(field)
            .map(|f| f.declared_type.clone())
            .unwrap_or(FieldType::Other("unknown".into()))
    }

    /// Values of `field` visible from `ctx`. Stepping into a nested array
    /// yields nothing; only a `nested` query can reach inside.
    fn values(&self, ctx: &Value, scope: &str, field: &str) -> Vec<Value> {
        if let Some(def) = self.runtime.and_then(|r| r.get(field)) {
            let source = def["script"]["source"].as_str().expect("script source");
            let target = Regex::new(r"doc\['([^']+)'\]")
                .expect("script regex")
                .captures(source)
                .expect("doc access")[1]
                .to_string();
            return vec![json!(self.values(ctx, scope, &target).len())];
        }
        let field = self
            .schema
            .field(field)
            .and_then(|f| f.multi_field_of.clone())
            .unwrap_or_else(|| field.to_string());
        let Some(rel) = relative(&field, scope) else {
            return Vec::new();
        };
        let mut current = vec![ctx.clone()];
        let mut prefix = scope.to_string();
        for segment in rel.split('.') {
            prefix = join(&prefix, segment);
            if self.is_nested(&prefix) {
                return Vec::new();
            }
            current = children(&current, segment);
        }
        current
    }

    fn nested_elements(&self, ctx: &Value, scope: &str, path: &str) -> Vec<Value> {
        let Some(rel) = relative(path, scope) else {
            return Vec::new();
        };
        let mut current = vec![ctx.clone()];
        let mut prefix = scope.to_string();
        for segment in rel.split('.') {
            prefix = join(&prefix, segment);
            if prefix != path && self.is_nested(&prefix) {
                return Vec::new();
            }
            current = children(&current, segment);
        }
        current
    }

    fn is_nested(&self, path: &str) -> bool {
        self.schema
            .field(path)
            .is_some_and(|f| f.declared_type == FieldType::Nested)
    }

    fn leaf_matches(&self, kind: &str, field: &str, params: &Value, ctx: &Value, scope: &str) -> bool {
        let values = self.values(ctx, scope, field);
        let ty = self.field_type(field);
        match kind {
            "term" => {
                let expected = params.get("value").unwrap_or(params);
                values.iter().any(|v| equal(v, expected, &ty))
            }
            "match_phrase" | "match" => {
                let query = &params["query"];
                if ty == FieldType::Text {
                    let wanted = tokens(&text_of(query));
                    values.iter().any(|v| {
                        let have = tokens(&text_of(v));
                        if kind == "match" {
                            wanted.iter().any(|t| have.contains(t))
                        } else {
                            !wanted.is_empty() && have.windows(wanted.len()).any(|w| w == wanted)
                        }
                    })
                } else {
                    values.iter().any(|v| equal(v, query, &ty))
                }
            }
            "regexp" => {
                let pattern = params["value"].as_str().expect("regexp value");
                let flags = if params["case_insensitive"] == true { "(?i)" } else { "" };
                let re = Regex::new(&format!("{flags}^(?:{pattern})$")).expect("regexp");
                if ty == FieldType::Text {
                    values
                        .iter()
                        .any(|v| tokens(&text_of(v)).iter().any(|t| re.is_match(t)))
                } else {
                    values.iter().any(|v| re.is_match(&text_of(v)))
                }
            }
            "range" => values.iter().any(|v| {
                params.as_object().into_iter().flatten().all(|(op, bound)| {
                    let ord = compare_values(v, bound);
                    match op.as_str() {
                        "gt" => ord == Ordering::Greater,
                        "gte" => ord != Ordering::Less,
                        "lt" => ord == Ordering::Less,
                        "lte" => ord != Ordering::Greater,
                        other => panic!("unsupported range op {other}"),
                    }
                })
            }),
            other => panic!("unsupported leaf query {other}"),
        }
    }

    fn aggregate(&self, agg: &Value, items: Vec<(usize, Value, String)>) -> Value {
        if let Some(nested) = agg.get("nested") {
            let path = nested["path"].as_str().expect("nested path");
            let mut inner = Vec::new();
            for (parent, ctx, scope) in &items {
                for element in self.nested_elements(ctx, scope, path) {
                    inner.push((*parent, element, path.to_string()));
                }
            }
            let parents: BTreeSet<usize> = inner.iter().map(|(p, _, _)| *p).collect();
            let mut out = json!({ "doc_count": inner.len() });
            if agg["aggs"].get("parent_doc_count").is_some() {
                out["parent_doc_count"] = json!({ "doc_count": parents.len() });
            }
            out["values"] = self.aggregate(&agg["aggs"]["values"], inner);
            return out;
        }

        let terms = &agg["terms"];
        let field = terms["field"].as_str().expect("terms field");
        let size = terms["size"].as_u64().unwrap_or(10) as usize;
        let with_parents = agg
            .get("aggs")
            .and_then(|a| a.get("parent_doc_count"))
            .is_some();
        let mut counts: BTreeMap<String, (Value, usize, BTreeSet<usize>)> = BTreeMap::new();
        for (parent, ctx, scope) in &items {
            let mut seen = BTreeSet::new();
            for value in self.values(ctx, scope, field) {
                let key = text_of(&value);
                if seen.insert(key.clone()) {
                    let entry = counts
                        .entry(key)
                        .or_insert_with(|| (value.clone(), 0, BTreeSet::new()));
                    entry.1 += 1;
                    entry.2.insert(*parent);
                }
            }
        }
        let mut buckets: Vec<(Value, usize, BTreeSet<usize>)> = counts.into_values().collect();
        buckets.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| text_of(&a.0).cmp(&text_of(&b.0))));
        let other: usize = buckets.iter().skip(size).map(|b| b.1).sum();
        buckets.truncate(size);
        let buckets: Vec<Value> = buckets
            .into_iter()
            .map(|(key, count, parents)| {
                let mut bucket = json!({ "key": key, "doc_count": count });
                if with_parents {
                    bucket["parent_doc_count"] = json!({ "doc_count": parents.len() });
                }
                bucket
            })
            .collect();
        json!({ "sum_other_doc_count": other, "buckets": buckets })
    }
}

fn relative(path: &str, scope: &str) -> Option<String> {
    if scope.is_empty() {
        return Some(path.to_string());
    }
    path.strip_prefix(scope)
        .and_then(|rest| rest.strip_prefix('.'))
        .map(str::to_string)
}

fn join(prefix: &str, segment: &str) -> String {
    if prefix.is_empty() {
        segment.to_string()
    } else {
        format!("{prefix}.{segment}")
    }
}

fn children(current: &[Value], segment: &str) -> Vec<Value> {
    let mut next = Vec::new();
    for value in current {
        match value.get(segment) {
            Some(Value::Array(items)) => next.extend(items.iter().filter(|v| !v.is_null()).cloned()),
            Some(Value::Null) | None => {}
            Some(other) => next.push(other.clone()),
        }
    }
    next
}

fn tokens(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn equal(value: &Value, expected: &Value, ty: &FieldType) -> bool {
    match ty {
        FieldType::Long | FieldType::Double => {
            matches!((as_number(value), as_number(expected)), (Some(a), Some(b)) if a == b)
        }
        FieldType::Boolean => text_of(value) == text_of(expected).to_lowercase(),
        FieldType::Text => tokens(&text_of(value)).contains(&text_of(expected).to_lowercase()),
        _ => text_of(value) == text_of(expected),
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
        _ => text_of(a).cmp(&text_of(b)),
    }
}

fn first_scalar(value: &Value) -> Value {
    match value {
        Value::Array(items) => items.first().map(first_scalar).unwrap_or(Value::Null),
        other => other.clone(),
    }
}
