//! Skill documents under `<workspace>/company/skills`.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use std::io;
use std::path::{Path, PathBuf};

pub const SOURCE: &str = "local-filesystem";
const DOC_NAME: &str = "SKILL.md";
const MAX_DEPTH: usize = 4;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Skill {
    /// Directory relative to the skills root.
    pub id: String,
    pub name: String,
    pub summary: Option<String>,
    pub skill_path: String,
    pub skill_doc: String,
    pub updated_at: String,
}

pub fn root(workspace: &Path) -> PathBuf {
    workspace.join("company").join("skills")
}

/// Every skill under the root, ordered by document path. A missing root is
/// an empty list.
pub fn list(workspace: &Path) -> io::Result<Vec<Skill>> {
    let root = root(workspace);
    let mut docs = Vec::new();
    find_docs(&root, 0, &mut docs)?;
    docs.sort();
    docs.iter().map(|doc| describe(workspace, &root, doc)).collect()
}

fn find_docs(dir: &Path, depth: usize, out: &mut Vec<PathBuf>) -> io::Result<()> {
    if depth > MAX_DEPTH || !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let kind = entry.file_type()?;
        if kind.is_dir() {
            find_docs(&entry.path(), depth + 1, out)?;
        } else if kind.is_file() && entry.file_name() == DOC_NAME {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn describe(workspace: &Path, root: &Path, doc: &Path) -> io::Result<Skill> {
    let dir = doc.parent().unwrap_or(root);
    let content = std::fs::read_to_string(doc)?;
    let modified = DateTime::<Utc>::from(std::fs::metadata(doc)?.modified()?);
    let (title, summary) = parse_doc(&content);
    let dir_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(Skill {
        id: slash_path(dir.strip_prefix(root).unwrap_or(dir)),
        name: title.unwrap_or(dir_name),
        summary,
        skill_path: slash_path(dir.strip_prefix(workspace).unwrap_or(dir)),
        skill_doc: slash_path(doc.strip_prefix(workspace).unwrap_or(doc)),
        updated_at: modified.to_rfc3339_opts(SecondsFormat::Millis, true),
    })
}

/// First `# ` heading, and the first line that is neither a heading nor a
/// code fence.
fn parse_doc(content: &str) -> (Option<String>, Option<String>) {
    let lines = || content.lines().map(str::trim).filter(|l| !l.is_empty());
    let title = lines()
        .find_map(|l| l.strip_prefix('#').filter(|rest| rest.starts_with(char::is_whitespace)))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty());
    let summary = lines()
        .find(|l| !l.starts_with('#') && !l.starts_with("```"))
        .map(str::to_string);
    (title, summary)
}

pub fn slash_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn parses_title_and_summary() {
        let doc = "\n# Deploy helper \n\n```sh\n## Usage\nShips builds to staging.\nmore\n";
        assert_eq!(
            parse_doc(doc),
            (
                Some("Deploy helper".to_string()),
                Some("Ships builds to staging.".to_string())
            )
        );
        assert_eq!(parse_doc("#hashtag only\n"), (None, None));
        assert_eq!(parse_doc(""), (None, None));
    }

    #[test]
    fn lists_nested_skills_and_skips_hidden() {
        let dir = tempfile::tempdir().unwrap();
        let ws = dir.path();
        let root = root(ws);
        fs::create_dir_all(root.join("ops/deploy")).unwrap();
        fs::create_dir_all(root.join("writer")).unwrap();
        fs::create_dir_all(root.join(".draft")).unwrap();
        fs::write(root.join("ops/deploy/SKILL.md"), "# Deploy\nShip it.\n").unwrap();
        fs::write(root.join("writer/SKILL.md"), "No heading here.\n").unwrap();
        fs::write(root.join(".draft/SKILL.md"), "# Hidden\n").unwrap();
        fs::write(root.join("writer/README.md"), "# Not a skill\n").unwrap();

        let skills = list(ws).unwrap();
        let ids: Vec<_> = skills.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, ["ops/deploy", "writer"]);
        assert_eq!(skills[0].name, "Deploy");
        assert_eq!(skills[0].skill_path, "company/skills/ops/deploy");
        assert_eq!(skills[0].skill_doc, "company/skills/ops/deploy/SKILL.md");
        assert_eq!(skills[1].name, "writer");
        assert_eq!(skills[1].summary.as_deref(), Some("No heading here."));
    }

    #[test]
    fn depth_is_limited_and_missing_root_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(list(dir.path()).unwrap().is_empty());

        let deep = root(dir.path()).join("a/b/c/d/e");
        fs::create_dir_all(&deep).unwrap();
        fs::write(deep.join("SKILL.md"), "# Too deep\n").unwrap();
        fs::write(root(dir.path()).join("a/b/c/d/SKILL.md"), "# Deep enough\n").unwrap();
        let names: Vec<_> = list(dir.path()).unwrap().into_iter().map(|s| s.name).collect();
        assert_eq!(names, ["Deep enough"]);
    }
}
