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

mod cli;
mod output;

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use anyhow::Context as _;
use anyhow::Result;
use clap::Parser;
use lexsearch::Config;
use lexsearch::EsClient;
use lexsearch::QueryRequest;
use lexsearch::SearchError;
use lexsearch::Searcher;
use lexsearch::parse;
use lexsearch::query::print_table;
use serde_json::Value;
use serde_json::json;
use tracing_subscriber::EnvFilter;

use crate::cli::Cli;
use crate::cli::Commands;
use crate::cli::RequestArgs;
use crate::output::JsonResponse;
use crate::output::QueryOut;
use crate::output::print_json;

fn main() {
    init_tracing();
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("LEXSEARCH_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config;
    match cli.command {
        Commands::Parse(args) => handle_result(cmd_parse(&args.query, args.json), args.json),
        Commands::Compile(args) => handle_result(
            cmd_compile(config_path.as_deref(), &args.request, &args.mapping, args.json),
            args.json,
        ),
        Commands::Fields(args) => handle_result(
            cmd_fields(
                config_path.as_deref(),
                &args.resource,
                args.mapping.as_deref(),
                args.json,
            ),
            args.json,
        ),
        Commands::Search(args) => handle_result(
            cmd_search(config_path.as_deref(), &args.request, args.json),
            args.json,
        ),
        Commands::Stats(args) => handle_result(
            cmd_stats(config_path.as_deref(), &args.resource, &args.field, args.json),
            args.json,
        ),
    }
}

fn handle_result(result: Result<()>, json: bool) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(err) => {
            if json {
                print_json(&JsonResponse::from_error(&err))?;
                Ok(())
            } else {
                Err(err)
            }
        }
    }
}

/// Builds a searcher and publishes `resources`, from local mapping files
/// where given and from the engine otherwise.
fn load_searcher(
    config_path: Option<&Path>,
    resources: &[String],
    mappings: &BTreeMap<String, PathBuf>,
) -> Result<Searcher<EsClient>> {
    let config = Config::load(config_path)?;
    let client = EsClient::new(&config.engine_url, config.timeout())?;
    let searcher = Searcher::new(client, config);
    for resource in resources {
        match mappings.get(resource) {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("read {}", path.display()))?;
                let mapping: Value = serde_json::from_str(&text)
                    .with_context(|| format!("parse {}", path.display()))?;
                searcher.publish_mapping(resource, &mapping)?;
            }
            None => searcher
                .publish(resource)
                .with_context(|| format!("load schema for '{resource}'"))?,
        }
    }
    Ok(searcher)
}

fn parse_mapping_args(args: &[String]) -> Result<BTreeMap<String, PathBuf>> {
    args.iter()
        .map(|arg| {
            let (resource, file) = arg
                .split_once('=')
                .with_context(|| format!("--mapping expects RESOURCE=FILE, got '{arg}'"))?;
            Ok((resource.trim().to_string(), PathBuf::from(file)))
        })
        .collect()
}

fn query_out(request: &QueryRequest, text: Option<&str>) -> QueryOut {
    QueryOut {
        text: text.map(str::to_string),
        canonical: request.query.as_ref().map(ToString::to_string),
        resources: request.resources.clone(),
    }
}

fn cmd_parse(text: &str, json: bool) -> Result<()> {
    let ast = parse(text).map_err(SearchError::from)?;
    if json {
        let resp = JsonResponse::ok()
            .with_query(QueryOut {
                text: Some(text.to_string()),
                canonical: Some(ast.to_string()),
                resources: Vec::new(),
            })
            .with_result(serde_json::to_value(&ast)?);
        print_json(&resp)?;
    } else {
        println!("{ast}");
    }
    Ok(())
}

fn cmd_compile(
    config_path: Option<&Path>,
    args: &RequestArgs,
    mapping_args: &[String],
    json: bool,
) -> Result<()> {
    let request = QueryRequest::from_params(&args.to_params())?;
    let mappings = parse_mapping_args(mapping_args)?;
    let searcher = load_searcher(config_path, &request.resources, &mappings)?;
    let compiled = searcher.compile(&request)?;
    let prepared = searcher.prepare(&compiled, &request)?;
    if json {
        let resp = JsonResponse::ok()
            .with_query(query_out(&request, args.q.as_deref()))
            .with_result(json!({
                "indices": prepared.indices,
                "body": prepared.body,
                "referenced_fields": compiled.referenced_fields,
            }));
        print_json(&resp)?;
    } else {
        println!("{}", serde_json::to_string_pretty(&prepared.body)?);
    }
    Ok(())
}

fn cmd_fields(
    config_path: Option<&Path>,
    resource: &str,
    mapping: Option<&Path>,
    json: bool,
) -> Result<()> {
    let mappings: BTreeMap<String, PathBuf> = mapping
        .map(|path| (resource.to_string(), path.to_path_buf()))
        .into_iter()
        .collect();
    let searcher = load_searcher(config_path, &[resource.to_string()], &mappings)?;
    let snapshot = searcher.registry().snapshot();
    let schema = snapshot.resource(resource)?;
    if json {
        let fields: Vec<_> = schema.fields.values().collect();
        let resp = JsonResponse::ok()
            .with_query(QueryOut {
                resources: vec![resource.to_string()],
                ..Default::default()
            })
            .with_result(serde_json::to_value(fields)?);
        print_json(&resp)?;
    } else {
        for info in schema.fields.values() {
            println!(
                "{}\t{}\t{}\t{}",
                info.path,
                info.declared_type.as_str(),
                info.sortable_target.as_deref().unwrap_or("-"),
                info.nesting_ancestors.join(">")
            );
        }
    }
    Ok(())
}

fn cmd_search(config_path: Option<&Path>, args: &RequestArgs, json: bool) -> Result<()> {
    let request = QueryRequest::from_params(&args.to_params())?;
    let searcher = load_searcher(config_path, &request.resources, &BTreeMap::new())?;
    let result = searcher.search(&request)?;
    if json {
        let resp = JsonResponse::ok()
            .with_query(query_out(&request, args.q.as_deref()))
            .with_result(serde_json::to_value(&result)?);
        print_json(&resp)?;
    } else {
        print_table(&result);
    }
    Ok(())
}

fn cmd_stats(config_path: Option<&Path>, resource: &str, field: &str, json: bool) -> Result<()> {
    let searcher = load_searcher(config_path, &[resource.to_string()], &BTreeMap::new())?;
    let counts = searcher.statistics(resource, field)?;
    if json {
        let resp = JsonResponse::ok()
            .with_query(QueryOut {
                resources: vec![resource.to_string()],
                ..Default::default()
            })
            .with_result(json!({ "field": field, "values": counts }));
        print_json(&resp)?;
    } else {
        for count in &counts {
            println!("{}\t{}", count.value, count.count);
        }
    }
    Ok(())
}
