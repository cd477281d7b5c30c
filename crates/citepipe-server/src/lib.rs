//! `citepipe` crate (library surface).
//!
//! The binary is the usual entrypoint. The HTTP router and error envelope live here so
//! they can be mounted or tested without spawning a process.

pub mod envelope;
pub mod http;

pub use citepipe_core as core;
pub use citepipe_local as local;

/// Load `KEY=VALUE` lines from `path` into the process environment.
///
/// Blank lines and `#` comments are skipped. Variables already set are left alone.
/// Returns how many variables were set; values are never logged.
pub fn load_env_file(path: &std::path::Path) -> std::io::Result<usize> {
    let txt = std::fs::read_to_string(path)?;
    let mut n = 0;
    for raw in txt.lines() {
        let s = raw.trim();
        if s.is_empty() || s.starts_with('#') {
            continue;
        }
        let Some((k, v)) = s.split_once('=') else {
            continue;
        };
        let k = k.trim();
        if k.is_empty() {
            continue;
        }
        if std::env::var_os(k).is_none() {
            std::env::set_var(k, v.trim());
            n += 1;
        }
    }
    Ok(n)
}
