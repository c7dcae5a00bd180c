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

//! Query expression tree produced by the parser and consumed by the compiler.

use std::fmt;

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AstNode {
    And(Vec<AstNode>),
    Or(Vec<AstNode>),
    /// Matches documents matching none of the children.
    Not(Vec<AstNode>),
    Freetext(Literal),
    FreeRegexp(Literal),
    Exists(String),
    Missing(String),
    SubQuery {
        field: String,
        inner: Box<AstNode>,
    },
    BinaryOp {
        op: BinaryOperator,
        field: String,
        arg: Literal,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOperator {
    Equals,
    Gt,
    Gte,
    Lt,
    Lte,
    Contains,
    Startswith,
    Endswith,
    Regexp,
}

impl BinaryOperator {
    pub const ALL: [BinaryOperator; 9] = [
        BinaryOperator::Equals,
        BinaryOperator::Gt,
        BinaryOperator::Gte,
        BinaryOperator::Lt,
        BinaryOperator::Lte,
        BinaryOperator::Contains,
        BinaryOperator::Startswith,
        BinaryOperator::Endswith,
        BinaryOperator::Regexp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Equals => "equals",
            BinaryOperator::Gt => "gt",
            BinaryOperator::Gte => "gte",
            BinaryOperator::Lt => "lt",
            BinaryOperator::Lte => "lte",
            BinaryOperator::Contains => "contains",
            BinaryOperator::Startswith => "startswith",
            BinaryOperator::Endswith => "endswith",
            BinaryOperator::Regexp => "regexp",
        }
    }

    pub fn from_keyword(word: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.as_str() == word)
    }

    /// Operators that take a numeric argument as well as a string one.
    pub fn accepts_numbers(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equals
                | BinaryOperator::Gt
                | BinaryOperator::Gte
                | BinaryOperator::Lt
                | BinaryOperator::Lte
        )
    }

    pub fn is_range(self) -> bool {
        matches!(
            self,
            BinaryOperator::Gt | BinaryOperator::Gte | BinaryOperator::Lt | BinaryOperator::Lte
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    Str(String),
    QuotedStr(String),
}

impl Literal {
    pub fn is_string(&self) -> bool {
        matches!(self, Literal::Str(_) | Literal::QuotedStr(_))
    }

    /// The literal as text, the way it is sent to the engine.
    pub fn text(&self) -> String {
        match self {
            Literal::Int(n) => n.to_string(),
            Literal::Float(f) => format!("{f:?}"),
            Literal::Str(s) | Literal::QuotedStr(s) => s.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Literal::Int(n) => serde_json::json!(n),
            Literal::Float(f) => serde_json::json!(f),
            Literal::Str(s) | Literal::QuotedStr(s) => serde_json::json!(s),
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(x) => write!(f, "{x:?}"),
            Literal::Str(s) => write!(f, "{s}"),
            Literal::QuotedStr(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
        }
    }
}

/// Canonical textual form; `parse(node.to_string())` yields `node` again.
impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AstNode::And(children) => write_logical(f, "and", children),
            AstNode::Or(children) => write_logical(f, "or", children),
            AstNode::Not(children) => write_logical(f, "not", children),
            AstNode::Freetext(arg) => write!(f, "freetext|{arg}"),
            AstNode::FreeRegexp(arg) => write!(f, "freergxp|{arg}"),
            AstNode::Exists(field) => write!(f, "exists|{field}"),
            AstNode::Missing(field) => write!(f, "missing|{field}"),
            AstNode::SubQuery { field, inner } => write!(f, "{field}({inner})"),
            AstNode::BinaryOp { op, field, arg } => write!(f, "{}|{field}|{arg}", op.as_str()),
        }
    }
}

fn write_logical(f: &mut fmt::Formatter<'_>, name: &str, children: &[AstNode]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (i, child) in children.iter().enumerate() {
        if i > 0 {
            f.write_str("||")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}
