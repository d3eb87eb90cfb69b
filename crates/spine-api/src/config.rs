//! Layered environment loading (spec.md §6 "Environment & config",
//! SPEC_FULL.md §9): `.env.base` → `.env.<tier>` → `.env.local` → `.env`,
//! each subsequent file overriding keys the previous one set, with the
//! real process environment always winning last. Grounded in the
//! teacher's single `dotenvy::dotenv()` call
//! (`everruns-api/src/bin/reencrypt_secrets.rs`), generalized here to the
//! tiered loader `examples/original_source/src/spine/core/config/loader.py`
//! implements.

use std::path::Path;

/// Reads `SPINE_TIER` (falling back to `APP_ENV`, then `"development"`)
/// and loads the four files in precedence order. Each layer is loaded with
/// `from_filename_override` so a later file wins over an earlier one; the
/// real process environment is snapshotted first and reapplied afterward
/// so it always wins over every file, matching the documented precedence
/// `.env.base` → `.env.<tier>` → `.env.local` → `.env` → real environment.
pub fn load_layered_env() -> String {
    let tier = std::env::var("SPINE_TIER")
        .or_else(|_| std::env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string());

    let real_env: Vec<(String, String)> = std::env::vars().collect();

    for filename in [".env.base".to_string(), format!(".env.{tier}"), ".env.local".to_string(), ".env".to_string()] {
        if Path::new(&filename).exists() {
            match dotenvy::from_filename_override(&filename) {
                Ok(_) => tracing::debug!(file = %filename, "loaded env layer"),
                Err(e) => tracing::warn!(file = %filename, error = %e, "failed to load env layer"),
            }
        }
    }

    for (key, value) in real_env {
        std::env::set_var(key, value);
    }

    tier
}
