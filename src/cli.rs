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

use std::path::PathBuf;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use lexsearch::QueryParams;

#[derive(Parser, Debug)]
#[command(name = "lexsearch", version, about = "Lexicon search query compiler and client")]
pub struct Cli {
    /// Config file (defaults to the global lexsearch.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Parse a query and print its tree
    Parse(ParseArgs),

    /// Print the engine request a search would send
    Compile(CompileArgs),

    /// List the schema fields of a resource
    Fields(FieldsArgs),

    /// Run a search against the engine
    Search(SearchArgs),

    /// Count distinct values of a field
    Stats(StatsArgs),
}

#[derive(Args, Debug)]
pub struct ParseArgs {
    /// Query text
    pub query: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RequestArgs {
    /// Comma-separated resource ids
    #[arg(long)]
    pub resources: String,

    /// Query text
    #[arg(long)]
    pub q: Option<String>,

    /// Comma-separated sort fields, each optionally suffixed |asc or |desc
    #[arg(long)]
    pub sort: Option<String>,

    /// Highlight mode: false, true or new
    #[arg(long)]
    pub highlight: Option<String>,

    /// Include per-resource hit counts
    #[arg(long)]
    pub lexicon_stats: bool,

    /// Project each hit to this dotted path
    #[arg(long)]
    pub path: Option<String>,

    #[arg(long)]
    pub from: Option<u32>,

    #[arg(long)]
    pub size: Option<u32>,
}

impl RequestArgs {
    pub fn to_params(&self) -> QueryParams {
        QueryParams {
            resources: self.resources.clone(),
            q: self.q.clone(),
            from: self.from,
            size: self.size,
            sort: self.sort.clone(),
            lexicon_stats: Some(self.lexicon_stats),
            path: self.path.clone(),
            highlight: self.highlight.clone(),
        }
    }
}

#[derive(Args, Debug)]
pub struct CompileArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Offline mapping as RESOURCE=FILE; resources without one are fetched
    #[arg(long)]
    pub mapping: Vec<String>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct FieldsArgs {
    /// Resource id
    #[arg(long)]
    pub resource: String,

    /// Offline mapping file
    #[arg(long)]
    pub mapping: Option<PathBuf>,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub request: RequestArgs,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct StatsArgs {
    /// Resource id
    #[arg(long)]
    pub resource: String,

    /// Field to count values of
    #[arg(long)]
    pub field: String,

    /// Output JSON
    #[arg(long)]
    pub json: bool,
}
