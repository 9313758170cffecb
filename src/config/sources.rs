// src/config/sources.rs
//! Source registry files.
//!
//! TOML: `[[sources]]` tables. JSON: `{"sources": [...]}` or a bare array.
//! Each entry is a `SourceDescriptor` with its rule inline (`rule.kind`).

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

use crate::registry::{Registry, SourceDescriptor};

const ENV_PATH: &str = "STATUS_SOURCES_PATH";

#[derive(Deserialize)]
struct SourcesFile {
    sources: Vec<SourceDescriptor>,
}

/// Load and validate a registry from an explicit path.
pub fn load_registry_from(path: &Path) -> Result<Registry> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("reading sources from {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let sources = parse_sources(&content, ext.as_str())
        .with_context(|| format!("parsing {}", path.display()))?;
    Registry::new(sources)
}

/// Registry using env var + fallbacks:
/// 1) $STATUS_SOURCES_PATH (must exist)
/// 2) config/sources.toml
/// 3) config/sources.json
/// 4) built-in sources
pub fn load_registry_default() -> Result<Registry> {
    if let Ok(p) = std::env::var(ENV_PATH) {
        let pb = PathBuf::from(p);
        if pb.exists() {
            return load_registry_from(&pb);
        } else {
            return Err(anyhow!("{ENV_PATH} points to non-existent path"));
        }
    }
    let toml_p = PathBuf::from("config/sources.toml");
    if toml_p.exists() {
        return load_registry_from(&toml_p);
    }
    let json_p = PathBuf::from("config/sources.json");
    if json_p.exists() {
        return load_registry_from(&json_p);
    }
    Ok(Registry::builtin())
}

fn parse_sources(s: &str, hint_ext: &str) -> Result<Vec<SourceDescriptor>> {
    if hint_ext == "json" || s.trim_start().starts_with(['{', '[']) {
        return parse_json(s);
    }
    let file: SourcesFile = toml::from_str(s).context("sources toml")?;
    Ok(file.sources)
}

fn parse_json(s: &str) -> Result<Vec<SourceDescriptor>> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum JsonSources {
        Wrapped(SourcesFile),
        Bare(Vec<SourceDescriptor>),
    }
    let v: JsonSources = serde_json::from_str(s).context("sources json")?;
    Ok(match v {
        JsonSources::Wrapped(f) => f.sources,
        JsonSources::Bare(v) => v,
    })
}
