//! `spine config <verb>` — layered environment configuration (spec.md §6
//! "Environment & config"). Local-only: this area inspects the same
//! `.env.base` → `.env.<tier>` → `.env.local` → `.env` → real-env cascade
//! `spine-api` loads at startup, grounded in
//! `original_source/.../core/config/loader.py`'s `discover_env_files` /
//! `get_effective_env`, rather than calling out to a running server.

use std::path::{Path, PathBuf};

use clap::Subcommand;

use crate::error::CliResult;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show {
        #[arg(long, default_value = "table", value_parser = ["table", "env", "json"])]
        format: String,
    },
    /// Print the active deployment tier
    Tier,
    /// List the env files that would be loaded, in precedence order
    Env,
}

pub async fn run(command: ConfigCommand) -> CliResult<()> {
    match command {
        ConfigCommand::Show { format } => show(&format),
        ConfigCommand::Tier => tier(),
        ConfigCommand::Env => env_files(),
    }
}

fn resolve_tier() -> String {
    std::env::var("SPINE_TIER").or_else(|_| std::env::var("APP_ENV")).unwrap_or_else(|_| "development".to_string())
}

/// Walks upward from the current directory looking for a project root
/// marker, mirroring `find_project_root`'s `pyproject.toml`/`.git`/
/// `setup.py` checks — this tier substitutes `Cargo.toml` for
/// `pyproject.toml` as the Rust-native root marker.
fn find_project_root() -> PathBuf {
    let mut current = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    loop {
        if current.join("Cargo.toml").exists() || current.join(".git").exists() {
            return current;
        }
        if !current.pop() {
            return std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        }
    }
}

fn discover_env_files(root: &Path, tier: &str) -> Vec<PathBuf> {
    let mut candidates = vec![root.join(".env.base"), root.join(format!(".env.{tier}")), root.join(".env.local"), root.join(".env")];
    candidates.retain(|p| p.exists());
    candidates
}

fn resolved_settings() -> Vec<(String, String)> {
    let tier = resolve_tier();
    let root = find_project_root();
    let mut merged = std::collections::BTreeMap::new();
    for file in discover_env_files(&root, &tier) {
        if let Ok(contents) = std::fs::read_to_string(&file) {
            for line in contents.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    merged.insert(key.trim().to_string(), value.trim().trim_matches('"').to_string());
                }
            }
        }
    }
    for (key, value) in std::env::vars() {
        if key.starts_with("SPINE_") || key == "DATABASE_URL" {
            merged.insert(key, value);
        }
    }
    merged.into_iter().collect()
}

fn show(format: &str) -> CliResult<()> {
    let settings = resolved_settings();
    match format {
        "json" => {
            let map: std::collections::BTreeMap<_, _> = settings.into_iter().collect();
            println!("{}", serde_json::to_string_pretty(&map).unwrap());
        }
        "env" => {
            for (key, value) in &settings {
                println!("{key}={value}");
            }
        }
        _ => {
            println!("{:<28} {}", "tier:", resolve_tier());
            println!();
            for (key, value) in &settings {
                println!("{key:<28} {value}");
            }
        }
    }
    Ok(())
}

fn tier() -> CliResult<()> {
    println!("{}", resolve_tier());
    Ok(())
}

fn env_files() -> CliResult<()> {
    let tier = resolve_tier();
    let root = find_project_root();
    let files = discover_env_files(&root, &tier);
    if files.is_empty() {
        println!("No env files found");
        return Ok(());
    }
    for file in files {
        println!("{}", file.display());
    }
    Ok(())
}
