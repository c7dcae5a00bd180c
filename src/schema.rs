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

//! Per-resource field schema, derived from the engine's field mapping.
//!
//! A [`SchemaSnapshot`] is immutable. Publishing a resource builds a new
//! snapshot and swaps it into the [`FieldSchemaRegistry`]; readers keep
//! whatever snapshot they took for the duration of their call.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::info;

use crate::error::Result;
use crate::error::SearchError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Object,
    Nested,
    Text,
    Keyword,
    Long,
    Double,
    Boolean,
    Date,
    Ip,
    DenseVector,
    Other(String),
}

impl FieldType {
    fn from_mapping(name: &str) -> Self {
        match name {
            "object" => FieldType::Object,
            "nested" => FieldType::Nested,
            "text" | "match_only_text" => FieldType::Text,
            "keyword" | "constant_keyword" | "wildcard" => FieldType::Keyword,
            "long" | "integer" | "short" | "byte" | "unsigned_long" => FieldType::Long,
            "double" | "float" | "half_float" | "scaled_float" => FieldType::Double,
            "boolean" => FieldType::Boolean,
            "date" | "date_nanos" => FieldType::Date,
            "ip" => FieldType::Ip,
            "dense_vector" => FieldType::DenseVector,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Object => "object",
            FieldType::Nested => "nested",
            FieldType::Text => "text",
            FieldType::Keyword => "keyword",
            FieldType::Long => "long",
            FieldType::Double => "double",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Ip => "ip",
            FieldType::DenseVector => "dense_vector",
            FieldType::Other(name) => name,
        }
    }

    /// Types the engine can sort and aggregate on directly.
    pub fn is_sortable(&self) -> bool {
        matches!(
            self,
            FieldType::Boolean
                | FieldType::Long
                | FieldType::Double
                | FieldType::Keyword
                | FieldType::Date
                | FieldType::Ip
        )
    }

    pub fn is_leaf(&self) -> bool {
        !matches!(self, FieldType::Object | FieldType::Nested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldInfo {
    pub path: String,
    pub declared_type: FieldType,
    /// Nested boundaries above this field, outermost first. A nested field
    /// does not list itself.
    pub nesting_ancestors: Vec<String>,
    pub sortable_target: Option<String>,
    /// Set for multi-field siblings such as `name.raw`; holds `name`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub multi_field_of: Option<String>,
}

impl FieldInfo {
    pub fn is_leaf(&self) -> bool {
        self.declared_type.is_leaf()
    }

    pub fn is_text(&self) -> bool {
        self.declared_type == FieldType::Text
    }

    pub fn innermost_nesting(&self) -> Option<&str> {
        self.nesting_ancestors.last().map(String::as_str)
    }

    /// The nested boundaries crossed to reach this field's values, including
    /// the field itself when it is a nested array.
    pub fn boundaries(&self) -> Vec<String> {
        let mut out = self.nesting_ancestors.clone();
        if self.declared_type == FieldType::Nested {
            out.push(self.path.clone());
        }
        out
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResourceSchema {
    pub resource_id: String,
    pub alias: String,
    /// Physical index names currently behind `alias`.
    pub indices: Vec<String>,
    pub fields: BTreeMap<String, FieldInfo>,
}

impl ResourceSchema {
    /// Builds a schema from a mapping response. Accepts the full
    /// `GET <index>/_mapping` body, a `{"mappings": ..}` object or a bare
    /// `{"properties": ..}` object.
    pub fn from_mapping(
        resource_id: &str,
        alias: &str,
        indices: Vec<String>,
        mapping: &Value,
    ) -> Result<Self> {
        let properties = locate_properties(mapping).ok_or_else(|| {
            SearchError::MalformedResponse(format!("mapping for '{resource_id}' has no properties"))
        })?;
        let mut fields = BTreeMap::new();
        walk_properties(properties, "", &[], &mut fields);
        let targets: Vec<(String, Option<String>)> = fields
            .values()
            .map(|info| (info.path.clone(), sortable_target(info, &fields)))
            .collect();
        for (path, target) in targets {
            if let Some(info) = fields.get_mut(&path) {
                info.sortable_target = target;
            }
        }
        Ok(Self {
            resource_id: resource_id.to_string(),
            alias: alias.to_string(),
            indices,
            fields,
        })
    }

    pub fn field(&self, path: &str) -> Option<&FieldInfo> {
        self.fields.get(path)
    }
}

fn locate_properties(mapping: &Value) -> Option<&serde_json::Map<String, Value>> {
    if let Some(props) = mapping.get("properties").and_then(Value::as_object) {
        return Some(props);
    }
    if let Some(mappings) = mapping.get("mappings") {
        return locate_properties(mappings);
    }
    let obj = mapping.as_object()?;
    obj.values()
        .find_map(|index| index.get("mappings").and_then(locate_properties))
}

fn walk_properties(
    properties: &serde_json::Map<String, Value>,
    prefix: &str,
    ancestors: &[String],
    out: &mut BTreeMap<String, FieldInfo>,
) {
    for (name, def) in properties {
        let path = join_path(prefix, name);
        let children = def.get("properties").and_then(Value::as_object);
        let declared_type = match def.get("type").and_then(Value::as_str) {
            Some(ty) => FieldType::from_mapping(ty),
            None => FieldType::Object,
        };
        if let Some(subfields) = def.get("fields").and_then(Value::as_object) {
            for (sub, subdef) in subfields {
                let sub_path = join_path(&path, sub);
                let sub_type = subdef
                    .get("type")
                    .and_then(Value::as_str)
                    .map(FieldType::from_mapping)
                    .unwrap_or(FieldType::Keyword);
                out.insert(
                    sub_path.clone(),
                    FieldInfo {
                        path: sub_path,
                        declared_type: sub_type,
                        nesting_ancestors: ancestors.to_vec(),
                        sortable_target: None,
                        multi_field_of: Some(path.clone()),
                    },
                );
            }
        }
        let is_nested = declared_type == FieldType::Nested;
        out.insert(
            path.clone(),
            FieldInfo {
                path: path.clone(),
                declared_type,
                nesting_ancestors: ancestors.to_vec(),
                sortable_target: None,
                multi_field_of: None,
            },
        );
        if let Some(children) = children {
            if is_nested {
                let mut inner = ancestors.to_vec();
                inner.push(path.clone());
                walk_properties(children, &path, &inner, out);
            } else {
                walk_properties(children, &path, ancestors, out);
            }
        }
    }
}

fn sortable_target(info: &FieldInfo, fields: &BTreeMap<String, FieldInfo>) -> Option<String> {
    if info.declared_type.is_sortable() {
        return Some(info.path.clone());
    }
    if info.is_text() && info.multi_field_of.is_none() {
        for sibling in ["raw", "sort"] {
            let candidate = join_path(&info.path, sibling);
            if fields
                .get(&candidate)
                .is_some_and(|f| f.declared_type.is_sortable())
            {
                return Some(candidate);
            }
        }
    }
    None
}

pub(crate) fn join_path(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    resources: BTreeMap<String, Arc<ResourceSchema>>,
}

impl SchemaSnapshot {
    pub fn resource(&self, resource: &str) -> Result<&ResourceSchema> {
        self.resources
            .get(resource)
            .map(Arc::as_ref)
            .ok_or_else(|| SearchError::UnsupportedQuery(format!("unknown resource '{resource}'")))
    }

    pub fn resource_ids(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }

    /// Resolves `path` against the first resource of `resources` that
    /// declares it.
    pub fn lookup(&self, resources: &[String], path: &str) -> Result<&FieldInfo> {
        for resource in resources {
            if let Some(info) = self.resource(resource)?.field(path) {
                return Ok(info);
            }
        }
        Err(SearchError::UnsupportedField(path.to_string()))
    }

    pub fn sortable(&self, resource: &str, field: &str) -> Result<String> {
        self.resource(resource)?
            .field(field)
            .and_then(|info| info.sortable_target.clone())
            .ok_or_else(|| SearchError::UnsupportedField(field.to_string()))
    }

    pub fn nesting_ancestors(&self, resource: &str, path: &str) -> Vec<String> {
        let Ok(schema) = self.resource(resource) else {
            return Vec::new();
        };
        if let Some(info) = schema.field(path) {
            return info.nesting_ancestors.clone();
        }
        let mut out = Vec::new();
        let mut prefix = String::new();
        let segments: Vec<&str> = path.split('.').collect();
        for segment in &segments[..segments.len().saturating_sub(1)] {
            prefix = join_path(&prefix, segment);
            if schema
                .field(&prefix)
                .is_some_and(|f| f.declared_type == FieldType::Nested)
            {
                out.push(prefix.clone());
            }
        }
        out
    }

    /// Searchable leaf fields under `scope` (or everywhere when `None`),
    /// excluding multi-field siblings and vector fields.
    pub fn leaf_fields(&self, resources: &[String], scope: Option<&str>) -> Result<Vec<&FieldInfo>> {
        let mut seen = BTreeMap::new();
        for resource in resources {
            for info in self.resource(resource)?.fields.values() {
                if !info.is_leaf()
                    || info.multi_field_of.is_some()
                    || info.declared_type == FieldType::DenseVector
                {
                    continue;
                }
                if let Some(scope) = scope
                    && !info.path.starts_with(&format!("{scope}."))
                {
                    continue;
                }
                seen.entry(info.path.as_str()).or_insert(info);
            }
        }
        Ok(seen.into_values().collect())
    }

    /// Maps a physical index name (or an alias) back to its resource id.
    pub fn resource_for_index(&self, index: &str) -> Option<&str> {
        self.resources.values().find_map(|schema| {
            (schema.alias == index || schema.indices.iter().any(|i| i == index))
                .then_some(schema.resource_id.as_str())
        })
    }
}

#[derive(Debug, Default)]
pub struct FieldSchemaRegistry {
    current: RwLock<Arc<SchemaSnapshot>>,
}

impl FieldSchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Arc<SchemaSnapshot> {
        Arc::clone(&self.current.read())
    }

    pub fn publish(&self, schema: ResourceSchema) {
        let mut current = self.current.write();
        let mut next = SchemaSnapshot::clone(&current);
        info!(
            resource = %schema.resource_id,
            alias = %schema.alias,
            fields = schema.fields.len(),
            "schema published"
        );
        next.resources
            .insert(schema.resource_id.clone(), Arc::new(schema));
        *current = Arc::new(next);
    }

    pub fn unpublish(&self, resource: &str) {
        let mut current = self.current.write();
        if !current.resources.contains_key(resource) {
            return;
        }
        let mut next = SchemaSnapshot::clone(&current);
        next.resources.remove(resource);
        *current = Arc::new(next);
    }

    pub fn lookup(&self, resources: &[String], path: &str) -> Result<FieldInfo> {
        self.snapshot().lookup(resources, path).cloned()
    }

    pub fn sortable(&self, resource: &str, field: &str) -> Result<String> {
        self.snapshot().sortable(resource, field)
    }

    pub fn nesting_ancestors(&self, resource: &str, path: &str) -> Vec<String> {
        self.snapshot().nesting_ancestors(resource, path)
    }
}
