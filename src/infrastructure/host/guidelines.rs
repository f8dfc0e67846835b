use glob::glob;
use std::path::PathBuf;
use tracing::{debug, warn};

const MAIN_GUIDELINE_NAMES: [&str; 2] = ["reviewer.md", "codestyle.md"];

/// Review guidelines on disk: one rules root holding markdown documents,
/// discovered recursively.
#[derive(Debug, Clone)]
pub struct KnowledgeBase {
    root: PathBuf,
}

impl KnowledgeBase {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Relative paths of every markdown document under the root, sorted for
    /// a stable index.
    pub fn discover(&self) -> Vec<String> {
        let pattern = format!("{}/**/*.md", self.root.display());
        let mut paths: Vec<String> = match glob(&pattern) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok())
                .filter_map(|path| {
                    path.strip_prefix(&self.root)
                        .ok()
                        .map(|rel| rel.to_string_lossy().replace('\\', "/"))
                })
                .collect(),
            Err(err) => {
                warn!(%err, root = %self.root.display(), "invalid rules glob pattern");
                Vec::new()
            }
        };
        paths.sort();
        paths
    }

    /// Assembled guideline document: the main rules file in full plus an
    /// index of everything else the model may fetch with `read_kb_file`.
    pub fn review_guidelines(&self) -> String {
        let all_files = self.discover();
        if all_files.is_empty() {
            return format!(
                "Warning: no review rules found under '{}'. Populate the rules directory to enable guideline checks.",
                self.root.display()
            );
        }

        let mut main_instructions = String::new();
        let main_file = all_files.iter().find(|file| {
            MAIN_GUIDELINE_NAMES
                .iter()
                .any(|candidate| file.contains(candidate))
        });

        if let Some(file) = main_file {
            match std::fs::read_to_string(self.root.join(file)) {
                Ok(content) => {
                    main_instructions = format!("=== MAIN GUIDELINES ({file}) ===\n{content}\n");
                }
                Err(err) => {
                    warn!(%err, file, "primary guideline file could not be read");
                    main_instructions = "Note: primary guideline file could not be read.\n".into();
                }
            }
        }

        let index = all_files
            .iter()
            .map(|file| format!("- {file}"))
            .collect::<Vec<_>>()
            .join("\n");

        format!(
            "{main_instructions}\n=== KNOWLEDGE BASE INDEX ===\nThe following additional rules and standards are available:\n{index}\n\nUse 'read_kb_file' with a path from the list above to see specific requirements."
        )
    }

    /// Where a requested document resolves after traversal stripping. Always
    /// inside the root: `../` sequences are removed, not rejected.
    pub fn resolve(&self, requested: &str) -> PathBuf {
        let safe = requested.replace("../", "").replace("..\\", "");
        self.root.join(safe.trim_start_matches(['/', '\\']))
    }

    pub fn read_document(&self, requested: &str) -> Result<String, std::io::Error> {
        let path = self.resolve(requested);
        debug!(path = %path.display(), "Reading knowledge base document");
        std::fs::read_to_string(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn seeded_kb() -> (tempfile::TempDir, KnowledgeBase) {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("reviewer.md"), "Always check error paths.").expect("write");
        fs::create_dir(dir.path().join("standards")).expect("mkdir");
        fs::write(
            dir.path().join("standards").join("naming.md"),
            "Use snake_case.",
        )
        .expect("write");
        fs::write(dir.path().join("notes.txt"), "not markdown").expect("write");
        let kb = KnowledgeBase::new(dir.path());
        (dir, kb)
    }

    #[test]
    fn discovers_only_markdown_recursively() {
        let (_dir, kb) = seeded_kb();
        let files = kb.discover();
        assert_eq!(files, vec!["reviewer.md", "standards/naming.md"]);
    }

    #[test]
    fn guidelines_include_main_file_and_index() {
        let (_dir, kb) = seeded_kb();
        let text = kb.review_guidelines();
        assert!(text.contains("=== MAIN GUIDELINES (reviewer.md) ==="));
        assert!(text.contains("Always check error paths."));
        assert!(text.contains("- standards/naming.md"));
    }

    #[test]
    fn empty_root_yields_warning_text() {
        let dir = tempfile::tempdir().expect("tempdir");
        let kb = KnowledgeBase::new(dir.path());
        assert!(kb.review_guidelines().starts_with("Warning: no review rules"));
    }

    #[test]
    fn traversal_sequences_are_stripped_not_rejected() {
        let (_dir, kb) = seeded_kb();
        let resolved = kb.resolve("../../etc/passwd");
        assert!(resolved.starts_with(&kb.root));
        assert_eq!(resolved, kb.root.join("etc/passwd"));
    }

    #[test]
    fn reads_nested_document_by_relative_path() {
        let (_dir, kb) = seeded_kb();
        let content = kb.read_document("standards/naming.md").expect("read");
        assert_eq!(content, "Use snake_case.");
    }
}
