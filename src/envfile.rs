//! `.env` file loading.
//!
//! `KEY=VALUE` lines, `#` comments, surrounding quotes stripped. Existing
//! process environment always wins over file values.

use anyhow::{Context, Result};
use std::path::Path;
use tracing::debug;

/// Load `path` into the process environment, skipping keys that are
/// already set. Returns the number of variables actually loaded.
pub fn load_env_file(path: &Path) -> Result<usize> {
    let mut loaded = 0;
    for item in dotenvy::from_path_iter(path)
        .with_context(|| format!("could not read env file {}", path.display()))?
    {
        let (key, value) =
            item.with_context(|| format!("malformed line in {}", path.display()))?;
        if std::env::var_os(&key).is_some() {
            continue;
        }
        // Startup is single-threaded; nothing is reading the environment
        // concurrently at this point.
        unsafe { std::env::set_var(&key, &value) };
        loaded += 1;
    }
    debug!(path = %path.display(), loaded, "env file loaded");
    Ok(loaded)
}
