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

use std::sync::Arc;

use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use crate::compile::CompiledQuery;
use crate::compile::compile_optional;
use crate::config::Config;
use crate::engine::EngineClient;
use crate::engine::SearchRequest;
use crate::engine::is_too_many_buckets;
use crate::error::Result;
use crate::error::SearchError;
use crate::model::FieldValueCount;
use crate::model::QueryRequest;
use crate::model::SearchResult;
use crate::model::SortSpec;
use crate::schema::FieldSchemaRegistry;
use crate::schema::ResourceSchema;
use crate::schema::SchemaSnapshot;
use crate::shape::shape;
use crate::stats::shape_statistics;
use crate::stats::statistics_body;

/// Engine request body for `request`, using the already compiled query.
///
/// Sort fields are translated here so an unsortable field fails before any
/// request reaches the engine.
pub fn build_search_body(
    request: &QueryRequest,
    compiled: &CompiledQuery,
    schema: &SchemaSnapshot,
    max_result_window: u32,
) -> Result<Value> {
    let mut body = Map::new();
    body.insert("query".into(), compiled.query.clone());
    body.insert("from".into(), json!(request.from));
    let size = request
        .size
        .unwrap_or_else(|| max_result_window.saturating_sub(request.from));
    body.insert("size".into(), json!(size));
    body.insert("track_total_hits".into(), json!(true));

    if !request.sort.is_empty() {
        body.insert(
            "sort".into(),
            Value::Array(sort_clauses(&request.sort, &request.resources, schema)?),
        );
    }
    if !compiled.runtime_mappings.is_empty() {
        body.insert(
            "runtime_mappings".into(),
            Value::Object(compiled.runtime_mappings.clone()),
        );
    }
    if request.highlight.is_on() && !compiled.highlight_fields.is_empty() {
        let fields: Map<String, Value> = compiled
            .highlight_fields
            .iter()
            .map(|field| (field.clone(), json!({})))
            .collect();
        body.insert("highlight".into(), json!({ "fields": fields }));
    }
    if request.lexicon_stats {
        // One bucket per physical index; an alias spans several mid reindex.
        let size = request
            .resources
            .iter()
            .map(|resource| {
                schema
                    .resource(resource)
                    .map(|found| found.indices.len().max(1))
            })
            .sum::<Result<usize>>()?;
        body.insert(
            "aggs".into(),
            json!({ "distribution": { "terms": {
                "field": "_index",
                "size": size,
            } } }),
        );
    }
    Ok(Value::Object(body))
}

fn sort_clauses(sort: &[SortSpec], resources: &[String], schema: &SchemaSnapshot) -> Result<Vec<Value>> {
    let mut clauses = Vec::new();
    for spec in sort {
        let order = spec.order.as_str();
        if spec.field == "_score" {
            clauses.push(json!({ "_score": { "order": order } }));
            continue;
        }
        let mut targets: Vec<(String, Vec<String>)> = Vec::new();
        for resource in resources {
            let target = schema.sortable(resource, &spec.field)?;
            if targets.iter().any(|(t, _)| *t == target) {
                continue;
            }
            let ancestors = schema.nesting_ancestors(resource, &target);
            targets.push((target, ancestors));
        }
        for (target, ancestors) in targets {
            let mut clause = Map::new();
            clause.insert("order".into(), json!(order));
            if let Some(nested) = nested_sort(&ancestors) {
                clause.insert("nested".into(), nested);
            }
            clauses.push(json!({ target: clause }));
        }
    }
    Ok(clauses)
}

/// The engine's `nested` sort clause: outermost path on top, each deeper
/// boundary in its own `nested` child.
fn nested_sort(ancestors: &[String]) -> Option<Value> {
    let mut nested: Option<Value> = None;
    for path in ancestors.iter().rev() {
        let mut level = json!({ "path": path });
        if let Some(inner) = nested {
            level["nested"] = inner;
        }
        nested = Some(level);
    }
    nested
}

/// Runs queries against one engine, reading schemas from a shared registry.
#[derive(Debug)]
pub struct Searcher<C> {
    client: C,
    registry: Arc<FieldSchemaRegistry>,
    config: Config,
}

impl<C: EngineClient> Searcher<C> {
    pub fn new(client: C, config: Config) -> Self {
        Self::with_registry(client, Arc::new(FieldSchemaRegistry::new()), config)
    }

    pub fn with_registry(client: C, registry: Arc<FieldSchemaRegistry>, config: Config) -> Self {
        Self {
            client,
            registry,
            config,
        }
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn registry(&self) -> &Arc<FieldSchemaRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Fetches the engine mapping for `resource` and swaps the rebuilt
    /// schema into the registry.
    pub fn publish(&self, resource: &str) -> Result<()> {
        let alias = self.config.alias_for(resource);
        let mapping = self.client.mapping(&alias)?;
        let indices = self.client.aliases(&alias)?;
        let schema = ResourceSchema::from_mapping(resource, &alias, indices, &mapping)?;
        self.registry.publish(schema);
        Ok(())
    }

    /// Publishes `resource` from a mapping already at hand.
    pub fn publish_mapping(&self, resource: &str, mapping: &Value) -> Result<()> {
        let alias = self.config.alias_for(resource);
        let schema = ResourceSchema::from_mapping(resource, &alias, vec![alias.clone()], mapping)?;
        self.registry.publish(schema);
        Ok(())
    }

    pub fn compile(&self, request: &QueryRequest) -> Result<CompiledQuery> {
        let snapshot = self.registry.snapshot();
        compile_optional(
            request.query.as_ref(),
            &request.resources,
            &snapshot,
            request.highlight.is_on(),
        )
    }

    /// The complete engine request for `request`, without sending it.
    pub fn prepare(&self, compiled: &CompiledQuery, request: &QueryRequest) -> Result<SearchRequest> {
        let snapshot = self.registry.snapshot();
        self.prepare_with(compiled, request, &snapshot)
    }

    fn prepare_with(
        &self,
        compiled: &CompiledQuery,
        request: &QueryRequest,
        snapshot: &SchemaSnapshot,
    ) -> Result<SearchRequest> {
        let indices = request
            .resources
            .iter()
            .map(|resource| snapshot.resource(resource).map(|schema| schema.alias.clone()))
            .collect::<Result<Vec<_>>>()?;
        let body = build_search_body(request, compiled, snapshot, self.config.max_result_window)?;
        Ok(SearchRequest { indices, body })
    }

    pub fn search(&self, request: &QueryRequest) -> Result<SearchResult> {
        let compiled = self.compile(request)?;
        self.execute(&compiled, request)
    }

    pub fn execute(&self, compiled: &CompiledQuery, request: &QueryRequest) -> Result<SearchResult> {
        let snapshot = self.registry.snapshot();
        let prepared = self.prepare_with(compiled, request, &snapshot)?;
        let raw = self.client.search(&prepared.indices, &prepared.body)?;
        shape(&raw, request, &snapshot)
    }

    pub fn search_many(&self, requests: &[QueryRequest]) -> Result<Vec<SearchResult>> {
        let pairs = requests
            .iter()
            .map(|request| Ok((self.compile(request)?, request.clone())))
            .collect::<Result<Vec<_>>>()?;
        self.execute_many(&pairs)
    }

    /// Executes all pairs in one batched engine call. Results line up with
    /// `pairs` index for index; an empty batch never reaches the engine.
    pub fn execute_many(&self, pairs: &[(CompiledQuery, QueryRequest)]) -> Result<Vec<SearchResult>> {
        if pairs.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.registry.snapshot();
        let prepared = pairs
            .iter()
            .map(|(compiled, request)| self.prepare_with(compiled, request, &snapshot))
            .collect::<Result<Vec<_>>>()?;
        debug!(batch = prepared.len(), "executing batch");
        let responses = self.client.multi_search(&prepared)?;

        let mut slots: Vec<Option<Value>> = vec![None; pairs.len()];
        for response in responses {
            let slot = slots.get_mut(response.position).ok_or_else(|| {
                SearchError::MalformedResponse(format!(
                    "batch response for unknown position {}",
                    response.position
                ))
            })?;
            if slot.replace(response.body).is_some() {
                return Err(SearchError::MalformedResponse(format!(
                    "duplicate batch response for position {}",
                    response.position
                )));
            }
        }
        slots
            .into_iter()
            .zip(pairs)
            .enumerate()
            .map(|(position, (raw, (_, request)))| {
                let raw = raw.ok_or_else(|| {
                    SearchError::MalformedResponse(format!(
                        "batch response missing for position {position}"
                    ))
                })?;
                shape(&raw, request, &snapshot)
            })
            .collect()
    }

    pub fn statistics(&self, resource: &str, field: &str) -> Result<Vec<FieldValueCount>> {
        let snapshot = self.registry.snapshot();
        let alias = snapshot.resource(resource)?.alias.clone();
        let ceiling = self.config.bucket_ceiling;
        let body = statistics_body(&snapshot, resource, field, ceiling)?;
        let raw = self
            .client
            .search(&[alias], &body)
            .map_err(|err| match err {
                err if is_too_many_buckets(&err) => SearchError::TooManyBuckets { limit: ceiling },
                err => err,
            })?;
        shape_statistics(&raw, ceiling)
    }
}

pub fn print_table(result: &SearchResult) {
    println!("total\t{}", result.total);
    for hit in &result.hits {
        println!("{}\t{}\t{}", hit.resource, hit.id, hit.entry);
        if let Some(highlight) = &hit.highlight {
            for (path, fragments) in highlight {
                println!("\t{}\t{}", path, fragments.join(" … "));
            }
        }
    }
    if let Some(distribution) = &result.distribution {
        for (resource, count) in distribution {
            println!("#{resource}\t{count}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile;
    use crate::model::HighlightMode;
    use crate::parser::parse;
    use crate::schema::tests::places_snapshot;

    fn body_for(request: &QueryRequest) -> Result<Value> {
        let snapshot = places_snapshot();
        let compiled = compile_optional(
            request.query.as_ref(),
            &request.resources,
            &snapshot,
            request.highlight.is_on(),
        )?;
        build_search_body(request, &compiled, &snapshot, 10_000)
    }

    #[test]
    fn default_size_fills_result_window() {
        let request = QueryRequest::new(["places"]).unwrap().with_from(40);
        let body = body_for(&request).unwrap();
        assert_eq!(body["size"], json!(9960));
        assert_eq!(body["query"], json!({ "match_all": {} }));
        assert!(body.get("sort").is_none());
        assert!(body.get("aggs").is_none());
    }

    #[test]
    fn sort_uses_sortable_targets_and_nested_clauses() {
        let request = QueryRequest::new(["places"]).unwrap().with_sort(vec![
            SortSpec::desc("name"),
            SortSpec::asc("v_larger_place.districts.code"),
            SortSpec::desc("_score"),
        ]);
        let body = body_for(&request).unwrap();
        assert_eq!(
            body["sort"],
            json!([
                { "name.raw": { "order": "desc" } },
                { "v_larger_place.districts.code": {
                    "order": "asc",
                    "nested": {
                        "path": "v_larger_place",
                        "nested": { "path": "v_larger_place.districts" },
                    },
                } },
                { "_score": { "order": "desc" } },
            ])
        );
    }

    #[test]
    fn unsortable_sort_field_fails() {
        let request = QueryRequest::new(["places"])
            .unwrap()
            .with_sort(vec![SortSpec::asc("unknown_field")]);
        assert!(matches!(
            body_for(&request),
            Err(SearchError::UnsupportedField(f)) if f == "unknown_field"
        ));
    }

    #[test]
    fn highlight_runtime_fields_and_distribution() {
        let request = QueryRequest::new(["places"])
            .unwrap()
            .with_query(parse("and(equals|name|grund||gt|name.length|3)").unwrap())
            .with_highlight(HighlightMode::Indexed)
            .with_lexicon_stats(true);
        let body = body_for(&request).unwrap();
        assert_eq!(body["highlight"], json!({ "fields": { "name": {} } }));
        assert_eq!(body["runtime_mappings"]["name.length"]["type"], json!("long"));
        assert_eq!(
            body["aggs"],
            json!({ "distribution": { "terms": { "field": "_index", "size": 1 } } })
        );
    }

    #[test]
    fn distribution_covers_every_physical_index() {
        let registry = FieldSchemaRegistry::new();
        let mut schema = crate::schema::tests::places_schema();
        schema.indices = vec!["places_20260101".to_string(), "places_20260301".to_string()];
        registry.publish(schema);
        let snapshot = registry.snapshot();
        let request = QueryRequest::new(["places"])
            .unwrap()
            .with_lexicon_stats(true);
        let body =
            build_search_body(&request, &CompiledQuery::match_all(), &snapshot, 10_000).unwrap();
        assert_eq!(body["aggs"]["distribution"]["terms"]["size"], json!(2));

        let missing = QueryRequest::new(["places", "other"])
            .unwrap()
            .with_lexicon_stats(true);
        assert!(
            build_search_body(&missing, &CompiledQuery::match_all(), &snapshot, 10_000).is_err()
        );
    }

    #[test]
    fn compile_is_reused_by_body_builder() {
        let snapshot = places_snapshot();
        let ast = parse("equals|code|A").unwrap();
        let compiled = compile(&ast, &["places".to_string()], &snapshot, false).unwrap();
        let request = QueryRequest::new(["places"]).unwrap().with_size(3);
        let body = build_search_body(&request, &compiled, &snapshot, 10_000).unwrap();
        assert_eq!(body["query"], compiled.query);
        assert_eq!(body["size"], json!(3));
    }
}
