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

//! Compiles an [`AstNode`] into the engine's nested boolean query DSL.
//!
//! Every field-referencing leaf is wrapped in one `nested` query per nesting
//! boundary between the field and the current scope. Boundaries opened by an
//! enclosing sub query are never wrapped a second time.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;
use tracing::debug;

use crate::ast::AstNode;
use crate::ast::BinaryOperator;
use crate::ast::Literal;
use crate::error::Result;
use crate::error::SearchError;
use crate::schema::FieldInfo;
use crate::schema::FieldType;
use crate::schema::SchemaSnapshot;
use crate::schema::join_path;

const LENGTH_SUFFIX: &str = ".length";
/// Inner hits returned per nested clause. The engine defaults to 3 and
/// rejects anything above its `max_inner_result_window` (100 by default).
pub const INNER_HITS_SIZE: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledQuery {
    pub query: Value,
    pub referenced_fields: BTreeSet<String>,
    pub length_fields: BTreeSet<String>,
    /// Runtime field definitions backing `length_fields`.
    pub runtime_mappings: Map<String, Value>,
    /// Referenced fields outside any nested scope; highlighted on the hit
    /// itself rather than through inner hits.
    pub highlight_fields: BTreeSet<String>,
}

impl CompiledQuery {
    pub fn match_all() -> Self {
        Self {
            query: json!({ "match_all": {} }),
            referenced_fields: BTreeSet::new(),
            length_fields: BTreeSet::new(),
            runtime_mappings: Map::new(),
            highlight_fields: BTreeSet::new(),
        }
    }
}

pub fn compile(
    ast: &AstNode,
    resources: &[String],
    schema: &SchemaSnapshot,
    highlight: bool,
) -> Result<CompiledQuery> {
    let mut compiler = Compiler::new(schema, resources, highlight);
    let query = compiler.walk(ast)?;
    debug!(query = %ast, resources = ?resources, "compiled query");
    let highlight_fields = compiler
        .referenced
        .iter()
        .filter(|(path, innermost)| innermost.is_none() && !compiler.length_fields.contains(*path))
        .map(|(path, _)| path.clone())
        .collect();
    Ok(CompiledQuery {
        query,
        referenced_fields: compiler.referenced.keys().cloned().collect(),
        length_fields: compiler.length_fields,
        runtime_mappings: compiler.runtime_mappings,
        highlight_fields,
    })
}

/// Compiles `ast`, or matches everything when there is no query.
pub fn compile_optional(
    ast: Option<&AstNode>,
    resources: &[String],
    schema: &SchemaSnapshot,
    highlight: bool,
) -> Result<CompiledQuery> {
    match ast {
        Some(ast) => compile(ast, resources, schema, highlight),
        None => Ok(CompiledQuery::match_all()),
    }
}

/// A field reference together with the innermost nested boundary above it.
type FieldRef = (String, Option<String>);

struct Compiler<'a> {
    schema: &'a SchemaSnapshot,
    resources: &'a [String],
    highlight: bool,
    /// Absolute path of the enclosing sub query field; relative field names
    /// are resolved under it.
    scope: Option<String>,
    /// Nested boundaries already established by enclosing sub queries.
    opened: Vec<String>,
    negated: bool,
    inner_hits_seq: usize,
    referenced: BTreeMap<String, Option<String>>,
    length_fields: BTreeSet<String>,
    runtime_mappings: Map<String, Value>,
}

impl<'a> Compiler<'a> {
    fn new(schema: &'a SchemaSnapshot, resources: &'a [String], highlight: bool) -> Self {
        Self {
            schema,
            resources,
            highlight,
            scope: None,
            opened: Vec::new(),
            negated: false,
            inner_hits_seq: 0,
            referenced: BTreeMap::new(),
            length_fields: BTreeSet::new(),
            runtime_mappings: Map::new(),
        }
    }

    fn walk(&mut self, node: &AstNode) -> Result<Value> {
        match node {
            AstNode::And(children) => {
                if children.is_empty() {
                    return Ok(json!({ "match_all": {} }));
                }
                let mut clauses = self.walk_all(children)?;
                if clauses.len() == 1 {
                    return Ok(clauses.remove(0));
                }
                Ok(json!({ "bool": { "must": clauses } }))
            }
            AstNode::Or(children) => {
                if children.is_empty() {
                    return Ok(json!({ "match_none": {} }));
                }
                let clauses = self.walk_all(children)?;
                Ok(should(clauses))
            }
            AstNode::Not(children) => {
                let was_negated = std::mem::replace(&mut self.negated, true);
                let clauses = self.walk_all(children);
                self.negated = was_negated;
                let clauses = clauses?;
                Ok(json!({ "bool": { "must_not": clauses } }))
            }
            AstNode::Freetext(arg) => self.freetext(arg),
            AstNode::FreeRegexp(arg) => self.free_regexp(arg),
            AstNode::Exists(field) => self.exists(field),
            AstNode::Missing(field) => {
                let was_negated = std::mem::replace(&mut self.negated, true);
                let exists = self.exists(field);
                self.negated = was_negated;
                let exists = exists?;
                Ok(json!({ "bool": { "must_not": [exists] } }))
            }
            AstNode::SubQuery { field, inner } => self.sub_query(node, field, inner),
            AstNode::BinaryOp { op, field, arg } => self.binary(*op, field, arg),
        }
    }

    fn walk_all(&mut self, children: &[AstNode]) -> Result<Vec<Value>> {
        children.iter().map(|child| self.walk(child)).collect()
    }

    fn resolve(&self, field: &str) -> String {
        match &self.scope {
            Some(scope) => join_path(scope, field),
            None => field.to_string(),
        }
    }

    fn lookup(&self, path: &str) -> Result<&'a FieldInfo> {
        self.schema.lookup(self.resources, path)
    }

    fn reference(&mut self, info: &FieldInfo) -> FieldRef {
        let innermost = info.innermost_nesting().map(str::to_string);
        self.referenced.insert(info.path.clone(), innermost.clone());
        (info.path.clone(), innermost)
    }

    fn sub_query(&mut self, node: &AstNode, field: &str, inner: &AstNode) -> Result<Value> {
        let path = self.resolve(field);
        let info = self.lookup(&path)?;
        if info.is_leaf() {
            return Err(SearchError::incomplete(
                node,
                format!(
                    "sub query needs an object or nested field, '{path}' is {}",
                    info.declared_type.as_str()
                ),
            ));
        }
        let boundaries = info.boundaries();
        let before: BTreeSet<String> = self.referenced.keys().cloned().collect();

        let saved_scope = self.scope.replace(path);
        let saved_opened = self.opened.clone();
        for boundary in &boundaries {
            if !self.opened.contains(boundary) {
                self.opened.push(boundary.clone());
            }
        }
        let compiled = self.walk(inner);
        self.scope = saved_scope;
        self.opened = saved_opened;
        let compiled = compiled?;

        let fields: Vec<FieldRef> = self
            .referenced
            .iter()
            .filter(|(path, _)| !before.contains(*path))
            .map(|(path, innermost)| (path.clone(), innermost.clone()))
            .collect();
        Ok(self.wrap_nested(compiled, &boundaries, &fields))
    }

    fn exists(&mut self, field: &str) -> Result<Value> {
        if is_multi_field(field) {
            let fields = self.multi_fields(field);
            let clauses = fields
                .into_iter()
                .map(|f| json!({ "exists": { "field": f } }))
                .collect();
            return Ok(should(clauses));
        }
        let path = self.resolve(field);
        let info = self.lookup(&path)?;
        let field_ref = self.reference(info);
        if info.declared_type == FieldType::Nested {
            let query = json!({ "match_all": {} });
            return Ok(self.wrap_nested(query, &info.boundaries(), &[field_ref]));
        }
        let query = json!({ "exists": { "field": info.path } });
        Ok(self.wrap_nested(query, &info.nesting_ancestors, &[field_ref]))
    }

    fn freetext(&mut self, arg: &Literal) -> Result<Value> {
        let text = arg.text();
        let leaves = self.schema.leaf_fields(self.resources, self.scope.as_deref())?;
        let leaves: Vec<&FieldInfo> = leaves
            .into_iter()
            .filter(|info| !matches!(info.declared_type, FieldType::Other(_)))
            .collect();
        self.grouped_leaf_queries(leaves, |info| {
            if info.is_text() {
                json!({ "match_phrase": { info.path.as_str(): { "query": text } } })
            } else {
                json!({ "match": { info.path.as_str(): { "query": text, "lenient": true } } })
            }
        })
    }

    fn free_regexp(&mut self, arg: &Literal) -> Result<Value> {
        let pattern = arg.text();
        let leaves = self.schema.leaf_fields(self.resources, self.scope.as_deref())?;
        let leaves: Vec<&FieldInfo> = leaves
            .into_iter()
            .filter(|info| matches!(info.declared_type, FieldType::Text | FieldType::Keyword))
            .collect();
        self.grouped_leaf_queries(leaves, |info| regexp_query(info, &pattern))
    }

    /// One disjunction over `leaves`, with leaves sharing a nesting chain
    /// wrapped together.
    fn grouped_leaf_queries(
        &mut self,
        leaves: Vec<&FieldInfo>,
        leaf_query: impl Fn(&FieldInfo) -> Value,
    ) -> Result<Value> {
        let mut groups: BTreeMap<Vec<String>, Vec<&FieldInfo>> = BTreeMap::new();
        for info in leaves {
            groups
                .entry(info.nesting_ancestors.clone())
                .or_default()
                .push(info);
        }
        let mut clauses = Vec::new();
        for (ancestors, infos) in groups {
            let mut refs = Vec::new();
            let mut queries = Vec::new();
            for info in infos {
                refs.push(self.reference(info));
                queries.push(leaf_query(info));
            }
            let query = if queries.len() == 1 {
                queries.remove(0)
            } else {
                should(queries)
            };
            clauses.push(self.wrap_nested(query, &ancestors, &refs));
        }
        match clauses.len() {
            0 => Ok(json!({ "match_none": {} })),
            1 => Ok(clauses.remove(0)),
            _ => Ok(should(clauses)),
        }
    }

    fn binary(&mut self, op: BinaryOperator, field: &str, arg: &Literal) -> Result<Value> {
        if is_multi_field(field) {
            return self.multi_field_binary(op, field, arg);
        }
        let path = self.resolve(field);
        if let Some(base) = path.strip_suffix(LENGTH_SUFFIX)
            && self.lookup(&path).is_err()
        {
            return self.length_binary(op, &path, base, arg);
        }
        let info = self.lookup(&path)?;
        if !info.is_leaf() {
            return Err(SearchError::UnsupportedQuery(format!(
                "operator '{}' cannot target {} field '{}'",
                op.as_str(),
                info.declared_type.as_str(),
                info.path
            )));
        }
        let query = match op {
            BinaryOperator::Equals => equals_query(info, arg),
            BinaryOperator::Contains | BinaryOperator::Startswith | BinaryOperator::Endswith => {
                require_string_field(op, info)?;
                let escaped = escape_regexp(&arg.text());
                let pattern = match op {
                    BinaryOperator::Contains => format!(".*{escaped}.*"),
                    BinaryOperator::Startswith => format!("{escaped}.*"),
                    _ => format!(".*{escaped}"),
                };
                let pattern = if info.is_text() {
                    pattern.to_lowercase()
                } else {
                    pattern
                };
                json!({ "regexp": { info.path.as_str(): { "value": pattern } } })
            }
            BinaryOperator::Regexp => {
                require_string_field(op, info)?;
                regexp_query(info, &arg.text())
            }
            BinaryOperator::Gt | BinaryOperator::Gte | BinaryOperator::Lt | BinaryOperator::Lte => {
                let target = if info.is_text() {
                    info.sortable_target.as_deref().unwrap_or(&info.path)
                } else {
                    &info.path
                };
                range_query(target, op, arg)
            }
        };
        let field_ref = self.reference(info);
        Ok(self.wrap_nested(query, &info.nesting_ancestors, &[field_ref]))
    }

    fn length_binary(
        &mut self,
        op: BinaryOperator,
        path: &str,
        base: &str,
        arg: &Literal,
    ) -> Result<Value> {
        let info = self.lookup(base)?;
        if !info.nesting_ancestors.is_empty() {
            return Err(SearchError::UnsupportedQuery(format!(
                "length of '{base}' is not available inside a nested field"
            )));
        }
        let target = match &info.declared_type {
            FieldType::Text => info.sortable_target.clone(),
            ty if ty.is_sortable() => Some(info.path.clone()),
            _ => None,
        }
        .ok_or_else(|| {
            SearchError::UnsupportedQuery(format!(
                "length needs an unanalyzed value for '{base}'"
            ))
        })?;
        let query = match op {
            BinaryOperator::Equals => json!({ "term": { path: { "value": arg.to_json() } } }),
            op if op.is_range() => range_query(path, op, arg),
            op => {
                return Err(SearchError::UnsupportedQuery(format!(
                    "operator '{}' is not supported on length field '{path}'",
                    op.as_str()
                )));
            }
        };
        self.runtime_mappings.insert(
            path.to_string(),
            json!({
                "type": "long",
                "script": { "source": format!("emit(doc['{target}'].length)") },
            }),
        );
        self.length_fields.insert(path.to_string());
        self.referenced.insert(path.to_string(), None);
        Ok(query)
    }

    fn multi_fields(&mut self, field: &str) -> Vec<String> {
        let fields: Vec<String> = field
            .split(',')
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .map(|f| self.resolve(f))
            .collect();
        for f in &fields {
            self.referenced.insert(f.clone(), None);
        }
        fields
    }

    fn multi_field_binary(&mut self, op: BinaryOperator, field: &str, arg: &Literal) -> Result<Value> {
        let fields = self.multi_fields(field);
        let text = arg.text();
        let query = match op {
            BinaryOperator::Equals => json!({
                "multi_match": {
                    "query": text,
                    "fields": fields,
                    "type": "phrase",
                    "lenient": true,
                }
            }),
            BinaryOperator::Contains | BinaryOperator::Startswith | BinaryOperator::Endswith => {
                let escaped = escape_regexp(&text.to_lowercase());
                let pattern = match op {
                    BinaryOperator::Contains => format!(".*{escaped}.*"),
                    BinaryOperator::Startswith => format!("{escaped}.*"),
                    _ => format!(".*{escaped}"),
                };
                json!({ "query_string": { "query": format!("/{pattern}/"), "fields": fields } })
            }
            BinaryOperator::Regexp => {
                json!({ "query_string": { "query": format!("/{text}/"), "fields": fields } })
            }
            op => {
                if fields.iter().any(|f| f.contains('*')) {
                    return Err(SearchError::UnsupportedQuery(format!(
                        "operator '{}' does not accept wildcard fields",
                        op.as_str()
                    )));
                }
                should(fields.iter().map(|f| range_query(f, op, arg)).collect())
            }
        };
        Ok(query)
    }

    /// Wraps `query` in a nested query for every boundary in `ancestors`
    /// (outermost first) that is not already open, innermost boundary first.
    fn wrap_nested(&mut self, query: Value, ancestors: &[String], fields: &[FieldRef]) -> Value {
        let mut query = query;
        for boundary in ancestors.iter().rev() {
            if self.opened.contains(boundary) {
                continue;
            }
            let mut nested = Map::new();
            nested.insert("path".into(), json!(boundary));
            nested.insert("query".into(), query);
            if self.highlight && !self.negated {
                nested.insert("inner_hits".into(), self.inner_hits(boundary, fields));
            }
            query = json!({ "nested": nested });
        }
        query
    }

    fn inner_hits(&mut self, boundary: &str, fields: &[FieldRef]) -> Value {
        self.inner_hits_seq += 1;
        let mut inner_hits = Map::new();
        inner_hits.insert(
            "name".into(),
            json!(format!("{boundary}#{}", self.inner_hits_seq)),
        );
        inner_hits.insert("_source".into(), json!(false));
        inner_hits.insert("size".into(), json!(INNER_HITS_SIZE));
        let highlighted: Map<String, Value> = fields
            .iter()
            .filter(|(_, innermost)| innermost.as_deref() == Some(boundary))
            .map(|(path, _)| (path.clone(), json!({})))
            .collect();
        if !highlighted.is_empty() {
            inner_hits.insert("highlight".into(), json!({ "fields": highlighted }));
        }
        Value::Object(inner_hits)
    }
}

fn should(clauses: Vec<Value>) -> Value {
    json!({ "bool": { "should": clauses, "minimum_should_match": 1 } })
}

fn equals_query(info: &FieldInfo, arg: &Literal) -> Value {
    let path = info.path.as_str();
    match info.declared_type {
        FieldType::Text => {
            json!({ "match_phrase": { path: { "query": arg.text().to_lowercase() } } })
        }
        FieldType::Keyword => json!({ "term": { path: { "value": arg.text() } } }),
        FieldType::Boolean if arg.is_string() => {
            json!({ "term": { path: { "value": arg.text().to_lowercase() } } })
        }
        _ => json!({ "term": { path: { "value": arg.to_json() } } }),
    }
}

fn regexp_query(info: &FieldInfo, pattern: &str) -> Value {
    let path = info.path.as_str();
    if info.is_text() {
        json!({ "regexp": { path: { "value": pattern, "case_insensitive": true } } })
    } else {
        json!({ "regexp": { path: { "value": pattern } } })
    }
}

fn range_query(path: &str, op: BinaryOperator, arg: &Literal) -> Value {
    json!({ "range": { path: { op.as_str(): arg.to_json() } } })
}

fn require_string_field(op: BinaryOperator, info: &FieldInfo) -> Result<()> {
    if matches!(info.declared_type, FieldType::Text | FieldType::Keyword) {
        Ok(())
    } else {
        Err(SearchError::UnsupportedQuery(format!(
            "operator '{}' needs a text or keyword field, '{}' is {}",
            op.as_str(),
            info.path,
            info.declared_type.as_str()
        )))
    }
}

fn is_multi_field(field: &str) -> bool {
    field.contains('*') || field.contains(',')
}

/// Escapes the engine's regular expression operators so `text` matches
/// literally.
pub(crate) fn escape_regexp(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if matches!(
            c,
            '.' | '?'
                | '+'
                | '*'
                | '|'
                | '{'
                | '}'
                | '['
                | ']'
                | '('
                | ')'
                | '"'
                | '\\'
                | '#'
                | '@'
                | '&'
                | '<'
                | '>'
                | '~'
                | '/'
                | '^'
                | '$'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}
