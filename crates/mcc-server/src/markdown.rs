//! The workspace's markdown memory files: line search, export, import and
//! clearing.
//!
//! Search is used when the gateway's `memory_search` comes back empty or
//! fails.

use crate::config::Paths;
use chrono::{DateTime, SecondsFormat, Utc};
use mcc_core::{DETAIL_LIMIT, bounded};
use serde::{Deserialize, Serialize};
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

pub const SOURCE: &str = "local-markdown";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Hit {
    pub snippet: String,
    pub path: String,
    pub line: usize,
    pub source: &'static str,
}

/// `MEMORY.md` plus `memory/*.md`, most recently modified first.
pub fn memory_files(paths: &Paths) -> Vec<PathBuf> {
    let mut files = Vec::new();
    if paths.long_term_memory.is_file() {
        files.push(paths.long_term_memory.clone());
    }
    if let Ok(entries) = std::fs::read_dir(&paths.memory_dir) {
        files.extend(
            entries
                .filter_map(Result::ok)
                .map(|e| e.path())
                .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md")),
        );
    }
    files.sort_by_key(|p| std::cmp::Reverse(modified(p)));
    files
}

fn modified(path: &Path) -> SystemTime {
    std::fs::metadata(path)
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Case-insensitive substring match, at most `max_results` hits.
pub fn search(paths: &Paths, query: &str, max_results: usize) -> Vec<Hit> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() || max_results == 0 {
        return Vec::new();
    }

    let mut hits = Vec::new();
    for file in memory_files(paths) {
        let content = match std::fs::read_to_string(&file) {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!(file = %file.display(), %err, "skipping unreadable memory file");
                continue;
            }
        };
        let rel = relative_to(&file, &paths.workspace);
        let lines: Vec<&str> = content.lines().collect();

        for (idx, line) in lines.iter().enumerate() {
            if !line.to_lowercase().contains(&needle) {
                continue;
            }
            hits.push(Hit {
                snippet: snippet(&lines, idx),
                path: rel.clone(),
                line: idx + 1,
                source: SOURCE,
            });
            if hits.len() >= max_results {
                return hits;
            }
        }
    }
    hits
}

fn relative_to(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .or_else(|| file.file_name().map(Path::new))
        .unwrap_or(file)
        .to_string_lossy()
        .replace('\\', "/")
}

/// The matched line with one line of context each side, whitespace collapsed.
fn snippet(lines: &[&str], idx: usize) -> String {
    let start = idx.saturating_sub(1);
    let end = (idx + 2).min(lines.len());
    let joined = lines[start..end]
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if joined.is_empty() {
        return "(empty line match)".to_string();
    }
    bounded(&joined, DETAIL_LIMIT)
}

/// One memory file as carried by export and import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryItem {
    /// Relative to the workspace, `/`-separated.
    pub path: String,
    pub content: String,
    #[serde(default, skip_deserializing)]
    pub updated_at: String,
}

/// Every memory file with its content and modification time.
pub fn export(paths: &Paths) -> io::Result<Vec<MemoryItem>> {
    memory_files(paths)
        .into_iter()
        .map(|file| {
            let content = std::fs::read_to_string(&file)?;
            let updated = DateTime::<Utc>::from(std::fs::metadata(&file)?.modified()?);
            Ok(MemoryItem {
                path: relative_to(&file, &paths.workspace),
                content,
                updated_at: updated.to_rfc3339_opts(SecondsFormat::Millis, true),
            })
        })
        .collect()
}

/// Resolve a relative path inside `workspace`. `None` if it is absolute,
/// empty, or climbs out of the workspace.
pub fn resolve_in_workspace(workspace: &Path, rel: &str) -> Option<PathBuf> {
    let normalized = rel.replace('\\', "/");
    let normalized = normalized.trim();
    if normalized.is_empty() || normalized.starts_with('/') {
        return None;
    }
    let mut parts: Vec<&std::ffi::OsStr> = Vec::new();
    for component in Path::new(normalized).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.iter().fold(workspace.to_path_buf(), |acc, p| acc.join(p)))
}

/// Write `.md` items into the workspace and return how many were written.
/// Items outside the workspace are skipped, as are existing files unless
/// `overwrite` is set.
pub fn import(paths: &Paths, items: &[MemoryItem], overwrite: bool) -> io::Result<usize> {
    let mut written = 0;
    for item in items {
        if !item.path.ends_with(".md") {
            continue;
        }
        let Some(target) = resolve_in_workspace(&paths.workspace, &item.path) else {
            tracing::warn!(path = %item.path, "refusing memory import outside the workspace");
            continue;
        };
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        if !overwrite && target.exists() {
            continue;
        }
        std::fs::write(&target, &item.content)?;
        written += 1;
    }
    Ok(written)
}

/// Which memory files [`clear`] resets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ClearTarget {
    Daily,
    LongTerm,
    #[default]
    All,
}

impl ClearTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::LongTerm => "long-term",
            Self::All => "all",
        }
    }
}

/// Reset memory files to a bare heading. Returns the relative paths touched.
pub fn clear(paths: &Paths, target: ClearTarget) -> io::Result<Vec<String>> {
    let mut touched = Vec::new();
    if target != ClearTarget::Daily && paths.long_term_memory.is_file() {
        std::fs::write(&paths.long_term_memory, "# MEMORY.md\n\n")?;
        touched.push("MEMORY.md".to_string());
    }
    if target != ClearTarget::LongTerm && paths.memory_dir.is_dir() {
        let mut daily: Vec<PathBuf> = std::fs::read_dir(&paths.memory_dir)?
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "md"))
            .collect();
        daily.sort();
        for file in daily {
            let stem = file.file_stem().unwrap_or_default().to_string_lossy().into_owned();
            std::fs::write(&file, format!("# {stem}\n\n"))?;
            touched.push(relative_to(&file, &paths.workspace));
        }
    }
    Ok(touched)
}
