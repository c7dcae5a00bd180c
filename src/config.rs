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

use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

pub const DEFAULT_BUCKET_CEILING: usize = 66000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub engine_url: String,
    /// Prepended to a resource id to form its engine alias.
    pub index_prefix: String,
    pub timeout_ms: u64,
    pub max_result_window: u32,
    pub bucket_ceiling: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine_url: "http://localhost:9200".to_string(),
            index_prefix: String::new(),
            timeout_ms: 30_000,
            max_result_window: 10_000,
            bucket_ceiling: DEFAULT_BUCKET_CEILING,
        }
    }
}

impl Config {
    /// Reads `explicit` when given, otherwise the global config file, falling
    /// back to defaults when it does not exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => read_config(path),
            None => load_global_config(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn alias_for(&self, resource: &str) -> String {
        format!("{}{}", self.index_prefix, resource)
    }
}

fn config_dir() -> Option<PathBuf> {
    if cfg!(target_os = "windows") {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return Some(PathBuf::from(appdata));
        }
        if let Ok(profile) = std::env::var("USERPROFILE") {
            return Some(PathBuf::from(profile).join("AppData").join("Roaming"));
        }
        return None;
    }

    if cfg!(target_os = "macos") {
        let home = std::env::var("HOME").ok()?;
        return Some(
            PathBuf::from(home)
                .join("Library")
                .join("Application Support"),
        );
    }

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return Some(PathBuf::from(xdg));
    }
    let home = std::env::var("HOME").ok()?;
    Some(PathBuf::from(home).join(".config"))
}

pub fn global_config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("lexsearch").join("lexsearch.toml"))
}

pub fn load_global_config() -> Result<Config> {
    let Some(path) = global_config_path() else {
        return Ok(Config::default());
    };
    if !path.exists() {
        return Ok(Config::default());
    }
    read_config(&path)
}

pub fn read_config(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut config: Config =
        toml::from_str(&text).with_context(|| format!("parse {}", path.display()))?;
    if config.bucket_ceiling == 0 {
        config.bucket_ceiling = DEFAULT_BUCKET_CEILING;
    }
    config.engine_url = config.engine_url.trim_end_matches('/').to_string();
    Ok(config)
}
