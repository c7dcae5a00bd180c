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

//! Lexicon search: a pipe-delimited query language compiled to nested
//! boolean engine queries, with schema-aware result shaping.

pub mod ast;
pub mod compile;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod parser;
pub mod query;
pub mod schema;
pub mod shape;
pub mod stats;

pub use ast::AstNode;
pub use ast::BinaryOperator;
pub use ast::Literal;
pub use compile::CompiledQuery;
pub use compile::compile;
pub use config::Config;
pub use engine::BatchResponse;
pub use engine::EngineClient;
pub use engine::EsClient;
pub use engine::SearchRequest;
pub use error::ParseError;
pub use error::SearchError;
pub use model::FieldValueCount;
pub use model::HighlightMode;
pub use model::Hit;
pub use model::QueryParams;
pub use model::QueryRequest;
pub use model::SearchResult;
pub use model::SortOrder;
pub use model::SortSpec;
pub use parser::parse;
pub use query::Searcher;
pub use schema::FieldInfo;
pub use schema::FieldSchemaRegistry;
pub use schema::FieldType;
pub use schema::ResourceSchema;
pub use schema::SchemaSnapshot;
