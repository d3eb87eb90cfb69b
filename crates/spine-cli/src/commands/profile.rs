//! `spine profile <verb>` — named, inheritable TOML configuration profiles
//! (spec.md §6 CLI area `profile`). Entirely local-filesystem state, not a
//! REST resource: grounded verbatim on
//! `original_source/.../core/config/profiles.py`'s `Profile`/
//! `ProfileManager` — project-scoped profiles under `.spine/profiles/`
//! beat user-scoped ones under `~/.spine/profiles/`, profiles may
//! `inherits` another profile with cycle detection, and `to_env_dict`
//! flattens nested TOML tables into `SPINE_SECTION_KEY` env-var pairs.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use clap::Subcommand;
use serde::Deserialize;

use crate::error::{CliError, CliResult};

#[derive(Subcommand)]
pub enum ProfileCommand {
    /// List available profiles
    List,
    /// Show a profile's resolved settings
    Show {
        name: String,
        #[arg(long, default_value = "table", value_parser = ["table", "env", "json"])]
        format: String,
    },
    /// Create an empty profile
    Create {
        name: String,
        #[arg(long)]
        inherits: Option<String>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "project", value_parser = ["project", "user"])]
        scope: String,
    },
    /// Mark a profile as the active (default) one
    Use { name: String },
    /// Delete a profile
    Delete {
        name: String,
        #[arg(long)]
        force: bool,
        #[arg(long, default_value = "project", value_parser = ["project", "user"])]
        scope: String,
    },
    /// Show the currently active profile name
    Active,
    /// Print a profile's resolved settings as `export KEY=VALUE` lines
    Export { name: String },
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ProfileMeta {
    name: Option<String>,
    inherits: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Clone)]
struct Profile {
    name: String,
    path: PathBuf,
    inherits: Option<String>,
    description: Option<String>,
    /// Every non-`[profile]` table/key, as raw TOML values — nested tables
    /// stay nested until `to_env_dict` flattens them.
    settings: toml::Table,
}

impl Profile {
    fn from_toml(path: &Path) -> CliResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| CliError::user(format!("failed to read {}: {e}", path.display())))?;
        let mut data: toml::Table = toml::from_str(&contents).map_err(|e| CliError::user(format!("invalid TOML in {}: {e}", path.display())))?;
        let meta: ProfileMeta = data
            .remove("profile")
            .map(|v| v.try_into())
            .transpose()
            .map_err(|e| CliError::user(format!("invalid [profile] table in {}: {e}", path.display())))?
            .unwrap_or_default();
        let name = meta.name.unwrap_or_else(|| path.file_stem().unwrap().to_string_lossy().to_string());
        Ok(Profile {
            name,
            path: path.to_path_buf(),
            inherits: meta.inherits.filter(|s| !s.is_empty()),
            description: meta.description,
            settings: data,
        })
    }

    /// Flattens `settings` into `SPINE_*` env-var pairs the way
    /// `Profile.to_env_dict` does: one level of table nesting joins with
    /// `_`, e.g. `[database] pool_size = 10` becomes `SPINE_DATABASE_POOL_SIZE`.
    fn to_env_dict(&self) -> BTreeMap<String, String> {
        let mut result = BTreeMap::new();
        for (key, value) in &self.settings {
            match value {
                toml::Value::Table(table) => {
                    for (subkey, subvalue) in table {
                        result.insert(format!("SPINE_{key}_{subkey}").to_uppercase(), toml_value_to_string(subvalue));
                    }
                }
                other => {
                    result.insert(format!("SPINE_{key}").to_uppercase(), toml_value_to_string(other));
                }
            }
        }
        result
    }
}

fn toml_value_to_string(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Array(items) => {
            let rendered: Vec<String> = items.iter().map(|v| format!("\"{}\"", toml_value_to_string(v))).collect();
            format!("[{}]", rendered.join(","))
        }
        other => other.to_string(),
    }
}

struct ProfileManager {
    project_root: PathBuf,
    user_dir: PathBuf,
}

impl ProfileManager {
    fn new() -> Self {
        let project_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let user_dir = dirs_home().join(".spine").join("profiles");
        Self { project_root, user_dir }
    }

    fn project_profile_dir(&self) -> PathBuf {
        self.project_root.join(".spine").join("profiles")
    }

    fn user_profile_dir(&self) -> PathBuf {
        self.user_dir.clone()
    }

    fn scan_dir(&self, dir: &Path) -> CliResult<Vec<Profile>> {
        if !dir.is_dir() {
            return Ok(vec![]);
        }
        let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
            .map_err(|e| CliError::user(format!("failed to read {}: {e}", dir.display())))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|ext| ext == "toml").unwrap_or(false))
            .filter(|p| p.file_stem().map(|s| s != "config").unwrap_or(true))
            .collect();
        entries.sort();
        entries.iter().map(|p| Profile::from_toml(p)).collect()
    }

    /// Project profiles first, user profiles only if the name isn't
    /// already present — matches `ProfileManager.list_profiles`'s
    /// project-wins-over-user merge.
    fn list_profiles(&self) -> CliResult<Vec<Profile>> {
        let mut profiles = self.scan_dir(&self.project_profile_dir())?;
        let seen: std::collections::HashSet<String> = profiles.iter().map(|p| p.name.clone()).collect();
        for profile in self.scan_dir(&self.user_profile_dir())? {
            if !seen.contains(&profile.name) {
                profiles.push(profile);
            }
        }
        Ok(profiles)
    }

    fn get_profile(&self, name: &str) -> CliResult<Option<Profile>> {
        let project_path = self.project_profile_dir().join(format!("{name}.toml"));
        if project_path.is_file() {
            return Ok(Some(Profile::from_toml(&project_path)?));
        }
        let user_path = self.user_profile_dir().join(format!("{name}.toml"));
        if user_path.is_file() {
            return Ok(Some(Profile::from_toml(&user_path)?));
        }
        Ok(None)
    }

    /// Resolution order per `get_active_profile`: `SPINE_PROFILE` env var,
    /// then the project's `.spine/config.toml`, then the user's
    /// `~/.spine/config.toml`, both keyed on `default_profile`.
    fn get_active_profile(&self) -> Option<String> {
        if let Ok(name) = std::env::var("SPINE_PROFILE") {
            if !name.is_empty() {
                return Some(name);
            }
        }
        if let Some(name) = read_default_profile(&self.project_root.join(".spine").join("config.toml")) {
            return Some(name);
        }
        read_default_profile(&self.user_dir.parent().unwrap().join("config.toml"))
    }

    /// Recursive inheritance resolution with cycle detection, mirroring
    /// `ProfileManager.resolve_profile`: parent settings resolve first,
    /// then the child's own `to_env_dict` overrides them.
    fn resolve_profile(&self, name: &str, visited: &mut std::collections::HashSet<String>) -> CliResult<BTreeMap<String, String>> {
        if !visited.insert(name.to_string()) {
            return Err(CliError::user(format!("circular profile inheritance detected: {name}")));
        }
        let profile = self.get_profile(name)?.ok_or_else(|| CliError::user(format!("profile not found: {name}")))?;
        let mut base = match &profile.inherits {
            Some(parent) => self.resolve_profile(parent, visited)?,
            None => BTreeMap::new(),
        };
        base.extend(profile.to_env_dict());
        Ok(base)
    }

    fn create_profile(&self, name: &str, inherits: Option<&str>, description: &str, scope: &str) -> CliResult<PathBuf> {
        let dir = if scope == "project" { self.project_profile_dir() } else { self.user_profile_dir() };
        std::fs::create_dir_all(&dir).map_err(|e| CliError::user(format!("failed to create {}: {e}", dir.display())))?;
        let path = dir.join(format!("{name}.toml"));
        if path.exists() {
            return Err(CliError::user(format!("profile already exists: {}", path.display())));
        }
        let mut content = format!("[profile]\nname = \"{name}\"\n");
        if let Some(parent) = inherits {
            content.push_str(&format!("inherits = \"{parent}\"\n"));
        }
        if !description.is_empty() {
            content.push_str(&format!("description = \"{description}\"\n"));
        }
        std::fs::write(&path, content).map_err(|e| CliError::user(format!("failed to write {}: {e}", path.display())))?;
        Ok(path)
    }

    fn delete_profile(&self, name: &str, scope: &str) -> CliResult<bool> {
        let dir = if scope == "project" { self.project_profile_dir() } else { self.user_profile_dir() };
        let path = dir.join(format!("{name}.toml"));
        if path.is_file() {
            std::fs::remove_file(&path).map_err(|e| CliError::user(format!("failed to delete {}: {e}", path.display())))?;
            return Ok(true);
        }
        Ok(false)
    }

    fn set_default_profile(&self, name: &str, scope: &str) -> CliResult<()> {
        let config_dir = if scope == "project" { self.project_root.join(".spine") } else { self.user_dir.parent().unwrap().to_path_buf() };
        std::fs::create_dir_all(&config_dir).map_err(|e| CliError::user(format!("failed to create {}: {e}", config_dir.display())))?;
        let config_path = config_dir.join("config.toml");
        std::fs::write(&config_path, format!("default_profile = \"{name}\"\n")).map_err(|e| CliError::user(format!("failed to write {}: {e}", config_path.display())))?;
        Ok(())
    }
}

fn read_default_profile(config_path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(config_path).ok()?;
    let data: toml::Table = toml::from_str(&contents).ok()?;
    data.get("default_profile")?.as_str().map(str::to_string)
}

fn dirs_home() -> PathBuf {
    std::env::var("HOME").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("."))
}

pub async fn run(command: ProfileCommand) -> CliResult<()> {
    let manager = ProfileManager::new();
    match command {
        ProfileCommand::List => list(&manager),
        ProfileCommand::Show { name, format } => show(&manager, &name, &format),
        ProfileCommand::Create { name, inherits, description, scope } => create(&manager, &name, inherits, &description, &scope),
        ProfileCommand::Use { name } => use_profile(&manager, &name),
        ProfileCommand::Delete { name, force, scope } => delete(&manager, &name, force, &scope),
        ProfileCommand::Active => active(&manager),
        ProfileCommand::Export { name } => export(&manager, &name),
    }
}

fn list(manager: &ProfileManager) -> CliResult<()> {
    let profiles = manager.list_profiles()?;
    if profiles.is_empty() {
        println!("No profiles found");
        return Ok(());
    }
    let active = manager.get_active_profile();
    for profile in &profiles {
        let marker = if active.as_deref() == Some(profile.name.as_str()) { "*" } else { " " };
        let inherits = profile.inherits.as_deref().unwrap_or("-");
        println!("{marker} {:<16} inherits={:<12} {}", profile.name, inherits, profile.path.display());
    }
    Ok(())
}

fn show(manager: &ProfileManager, name: &str, format: &str) -> CliResult<()> {
    let profile = manager.get_profile(name)?.ok_or_else(|| CliError::user(format!("profile not found: {name}")))?;
    match format {
        "json" => {
            println!(
                "{}",
                serde_json::json!({
                    "name": profile.name,
                    "path": profile.path.display().to_string(),
                    "inherits": profile.inherits,
                    "description": profile.description,
                })
            );
        }
        "env" => {
            let mut visited = std::collections::HashSet::new();
            let resolved = manager.resolve_profile(name, &mut visited)?;
            for (key, value) in &resolved {
                println!("{key}={value}");
            }
        }
        _ => {
            println!("Name:        {}", profile.name);
            println!("Path:        {}", profile.path.display());
            println!("Inherits:    {}", profile.inherits.as_deref().unwrap_or("-"));
            println!("Description: {}", profile.description.as_deref().unwrap_or("-"));
        }
    }
    Ok(())
}

fn create(manager: &ProfileManager, name: &str, inherits: Option<String>, description: &str, scope: &str) -> CliResult<()> {
    if manager.get_profile(name)?.is_some() {
        return Err(CliError::user(format!("profile already exists: {name}")));
    }
    let path = manager.create_profile(name, inherits.as_deref(), description, scope)?;
    println!("Created profile: {}", path.display());
    Ok(())
}

fn use_profile(manager: &ProfileManager, name: &str) -> CliResult<()> {
    if manager.get_profile(name)?.is_none() {
        return Err(CliError::user(format!("profile not found: {name}")));
    }
    manager.set_default_profile(name, "project")?;
    println!("Active profile set to: {name}");
    Ok(())
}

fn delete(manager: &ProfileManager, name: &str, force: bool, scope: &str) -> CliResult<()> {
    if manager.get_profile(name)?.is_none() {
        return Err(CliError::user(format!("profile not found: {name}")));
    }
    if !force {
        return Err(CliError::user("pass --force to confirm deletion"));
    }
    manager.delete_profile(name, scope)?;
    println!("Deleted profile: {name}");
    Ok(())
}

fn active(manager: &ProfileManager) -> CliResult<()> {
    match manager.get_active_profile() {
        Some(name) => println!("{name}"),
        None => println!("No active profile"),
    }
    Ok(())
}

fn export(manager: &ProfileManager, name: &str) -> CliResult<()> {
    if manager.get_profile(name)?.is_none() {
        return Err(CliError::user(format!("profile not found: {name}")));
    }
    let mut visited = std::collections::HashSet::new();
    let resolved = manager.resolve_profile(name, &mut visited)?;
    for (key, value) in &resolved {
        println!("export {key}={value}");
    }
    Ok(())
}
