use super::gitlab::{CodeHost, DiscussionDraft};
use super::guidelines::KnowledgeBase;
use super::jira::IssueTracker;
use crate::application::tooling::ToolDescriptor;
use serde::Deserialize;
use serde_json::{Value, json};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown tool requested: {0}")]
    UnknownTool(String),
}

/// The capability provider: a fixed registry of review tools plus the one
/// piece of mutable recovery state, the most recently observed diff_refs.
/// One instance per host process; the serve loop is the only caller, so the
/// cache has a single writer and a single reader.
pub struct ToolRegistry {
    code_host: Arc<dyn CodeHost>,
    tracker: Arc<dyn IssueTracker>,
    knowledge: KnowledgeBase,
    last_diff_refs: Option<Value>,
}

impl ToolRegistry {
    pub fn new(
        code_host: Arc<dyn CodeHost>,
        tracker: Arc<dyn IssueTracker>,
        knowledge: KnowledgeBase,
    ) -> Self {
        Self {
            code_host,
            tracker,
            knowledge,
            last_diff_refs: None,
        }
    }

    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        vec![
            ToolDescriptor {
                name: "get_review_guidelines".into(),
                description:
                    "Retrieve global project rules and the knowledge base index. Should be called first."
                        .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {},
                    "additionalProperties": false
                }),
            },
            ToolDescriptor {
                name: "read_kb_file".into(),
                description: "Read a specific file from the knowledge base.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "kb_file_path": {
                            "type": "string",
                            "description": "Path to the file, taken from the index."
                        }
                    },
                    "required": ["kb_file_path"]
                }),
            },
            ToolDescriptor {
                name: "get_mr_diff".into(),
                description:
                    "Fetch changes (diff) of a GitLab merge request. Returns the title, the list of changed files and diff_refs."
                        .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "project_id": {"type": "string", "description": "GitLab project ID"},
                        "mr_iid": {"type": "string", "description": "Merge request IID"}
                    },
                    "required": ["project_id", "mr_iid"]
                }),
            },
            ToolDescriptor {
                name: "post_mr_discussion".into(),
                description: "Post a targeted discussion comment on a specific line of code.".into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "project_id": {"type": "string"},
                        "mr_iid": {"type": "string"},
                        "body": {"type": "string", "description": "The text of the review comment."},
                        "path": {"type": "string", "description": "The file path (new_path from the diff)."},
                        "new_line": {
                            "type": "number",
                            "description": "The line number in the NEW version of the file."
                        },
                        "diff_refs": {
                            "type": "object",
                            "description": "The diff_refs object obtained from get_mr_diff."
                        }
                    },
                    "required": ["project_id", "mr_iid", "body", "path", "new_line", "diff_refs"]
                }),
            },
            ToolDescriptor {
                name: "get_jira_issue".into(),
                description:
                    "Fetch summary, description and status of a Jira ticket. Use this when the MR title carries a ticket key (e.g. PROJ-123)."
                        .into(),
                input_schema: json!({
                    "type": "object",
                    "properties": {
                        "issue_key": {"type": "string", "description": "The Jira ticket key (e.g. PROJ-512)"}
                    },
                    "required": ["issue_key"]
                }),
            },
        ]
    }

    /// Dispatch one tool invocation. Tool-internal failures come back as
    /// `isError` text payloads so the model always receives an answer; only
    /// an unknown tool name is a protocol-level error.
    pub async fn invoke(&mut self, tool: &str, arguments: Value) -> Result<Value, RegistryError> {
        match tool {
            "get_review_guidelines" => Ok(text_result(self.knowledge.review_guidelines())),
            "read_kb_file" => Ok(self.read_kb_file(arguments)),
            "get_mr_diff" => Ok(self.get_mr_diff(arguments).await),
            "post_mr_discussion" => Ok(self.post_mr_discussion(arguments).await),
            "get_jira_issue" => Ok(self.get_jira_issue(arguments).await),
            other => Err(RegistryError::UnknownTool(other.to_string())),
        }
    }

    fn read_kb_file(&self, arguments: Value) -> Value {
        let args: ReadKbArgs = decode_arguments(arguments);
        if args.kb_file_path.trim().is_empty() {
            return error_result("Error: kb_file_path is required.");
        }
        if !args.kb_file_path.ends_with(".md") {
            return error_result(format!(
                "Error: '{}' is not a markdown knowledge base file.",
                args.kb_file_path
            ));
        }
        match self.knowledge.read_document(&args.kb_file_path) {
            Ok(content) => text_result(content),
            Err(err) => error_result(format!(
                "Error reading file {}: {err}",
                args.kb_file_path
            )),
        }
    }

    async fn get_mr_diff(&mut self, arguments: Value) -> Value {
        let args: MrDiffArgs = decode_arguments(arguments);
        match self
            .code_host
            .fetch_changes(&args.project_id, &args.mr_iid)
            .await
        {
            Ok(diff) => {
                if is_valid_refs(&diff.diff_refs) {
                    self.last_diff_refs = Some(diff.diff_refs.clone());
                }
                text_result(
                    serde_json::to_string(&diff)
                        .unwrap_or_else(|_| "Error: failed to encode merge request diff.".into()),
                )
            }
            Err(err) => error_result(format!("Error fetching merge request diff: {err}")),
        }
    }

    async fn post_mr_discussion(&mut self, arguments: Value) -> Value {
        let args: DiscussionArgs = decode_arguments(arguments);

        let mut diff_refs = args.diff_refs;
        if !is_valid_refs(&diff_refs) {
            if let Some(cached) = &self.last_diff_refs {
                info!(
                    path = args.path,
                    "Model sent invalid diff_refs; substituting cached version"
                );
                diff_refs = cached.clone();
            }
            // Without a cached value the invalid refs go through unchanged;
            // the code host rejects them downstream.
        }

        let draft = DiscussionDraft {
            project_id: args.project_id,
            mr_iid: args.mr_iid,
            body: args.body,
            path: args.path,
            new_line: args.new_line,
            diff_refs,
        };

        match self.code_host.post_discussion(draft).await {
            Ok(()) => text_result("Discussion posted successfully"),
            Err(err) => error_result(format!("Error posting discussion: {err}")),
        }
    }

    async fn get_jira_issue(&self, arguments: Value) -> Value {
        let args: JiraArgs = decode_arguments(arguments);
        if args.issue_key.trim().is_empty() {
            return error_result("Error: issue_key is required.");
        }
        text_result(self.tracker.fetch_issue(&args.issue_key).await)
    }
}

/// A usable reference object is a JSON object with at least one attribute;
/// bare strings and empty objects do not qualify.
fn is_valid_refs(value: &Value) -> bool {
    matches!(value, Value::Object(map) if !map.is_empty())
}

/// Schema-checked decode with a fallback to the empty argument set: a
/// malformed payload must never abort the session.
fn decode_arguments<T: Default + for<'de> Deserialize<'de>>(arguments: Value) -> T {
    match serde_json::from_value(arguments) {
        Ok(args) => args,
        Err(err) => {
            warn!(%err, "Tool arguments did not match the expected shape; using defaults");
            T::default()
        }
    }
}

fn text_result(text: impl Into<String>) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}]
    })
}

fn error_result(text: impl Into<String>) -> Value {
    json!({
        "content": [{"type": "text", "text": text.into()}],
        "isError": true
    })
}

#[derive(Debug, Default, Deserialize)]
struct ReadKbArgs {
    #[serde(default)]
    kb_file_path: String,
}

#[derive(Debug, Default, Deserialize)]
struct MrDiffArgs {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    mr_iid: String,
}

#[derive(Debug, Default, Deserialize)]
struct DiscussionArgs {
    #[serde(default)]
    project_id: String,
    #[serde(default)]
    mr_iid: String,
    #[serde(default)]
    body: String,
    #[serde(default)]
    path: String,
    #[serde(default)]
    new_line: u64,
    #[serde(default)]
    diff_refs: Value,
}

#[derive(Debug, Default, Deserialize)]
struct JiraArgs {
    #[serde(default)]
    issue_key: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::host::gitlab::{CodeHostError, FileChange, MrDiff};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct StubCodeHost {
        diffs: Mutex<Vec<MrDiff>>,
        posted: Mutex<Vec<DiscussionDraft>>,
    }

    impl StubCodeHost {
        fn with_diffs(diffs: Vec<MrDiff>) -> Arc<Self> {
            Arc::new(Self {
                diffs: Mutex::new(diffs),
                posted: Mutex::new(Vec::new()),
            })
        }

        fn posted(&self) -> Vec<DiscussionDraft> {
            self.posted.lock().expect("posted lock").clone()
        }
    }

    #[async_trait]
    impl CodeHost for StubCodeHost {
        async fn fetch_changes(
            &self,
            _project_id: &str,
            _mr_iid: &str,
        ) -> Result<MrDiff, CodeHostError> {
            let mut diffs = self.diffs.lock().expect("diffs lock");
            Ok(diffs.remove(0))
        }

        async fn post_discussion(&self, draft: DiscussionDraft) -> Result<(), CodeHostError> {
            self.posted.lock().expect("posted lock").push(draft);
            Ok(())
        }
    }

    struct StubTracker;

    #[async_trait]
    impl IssueTracker for StubTracker {
        async fn fetch_issue(&self, issue_key: &str) -> String {
            format!("ticket {issue_key}")
        }
    }

    fn diff_with_refs(refs: Value) -> MrDiff {
        MrDiff {
            title: "PROJ-1 Fix login".into(),
            diff_refs: refs,
            changes: vec![FileChange {
                path: "src/login.rs".into(),
                new_path: "src/login.rs".into(),
                old_path: "src/login.rs".into(),
                diff: "@@ -1 +1 @@".into(),
            }],
        }
    }

    fn registry_with(code_host: Arc<StubCodeHost>) -> ToolRegistry {
        let dir = tempfile::tempdir().expect("tempdir");
        ToolRegistry::new(
            code_host,
            Arc::new(StubTracker),
            KnowledgeBase::new(dir.path()),
        )
    }

    fn refs(tag: &str) -> Value {
        json!({"base_sha": format!("{tag}-base"), "start_sha": format!("{tag}-start"), "head_sha": format!("{tag}-head")})
    }

    fn post_args(diff_refs: Value) -> Value {
        json!({
            "project_id": "42",
            "mr_iid": "7",
            "body": "Missing error handling.",
            "path": "src/login.rs",
            "new_line": 14,
            "diff_refs": diff_refs,
        })
    }

    #[tokio::test]
    async fn diff_retrieval_caches_reference_object_last_write_wins() {
        let host = StubCodeHost::with_diffs(vec![
            diff_with_refs(refs("first")),
            diff_with_refs(refs("second")),
        ]);
        let mut registry = registry_with(host);

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "7"}))
            .await
            .expect("first fetch");
        assert_eq!(registry.last_diff_refs, Some(refs("first")));

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "8"}))
            .await
            .expect("second fetch");
        assert_eq!(registry.last_diff_refs, Some(refs("second")));
    }

    #[tokio::test]
    async fn empty_reference_objects_never_enter_the_cache() {
        let host = StubCodeHost::with_diffs(vec![diff_with_refs(json!({}))]);
        let mut registry = registry_with(host);

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "7"}))
            .await
            .expect("fetch");
        assert!(registry.last_diff_refs.is_none());
    }

    #[tokio::test]
    async fn posting_with_empty_refs_uses_cached_reference() {
        let host = StubCodeHost::with_diffs(vec![diff_with_refs(refs("cached"))]);
        let mut registry = registry_with(host.clone());

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "7"}))
            .await
            .expect("fetch");
        registry
            .invoke("post_mr_discussion", post_args(json!({})))
            .await
            .expect("post");

        let posted = host.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].diff_refs, refs("cached"));
    }

    #[tokio::test]
    async fn bare_string_refs_are_repaired_from_cache() {
        let host = StubCodeHost::with_diffs(vec![diff_with_refs(refs("cached"))]);
        let mut registry = registry_with(host.clone());

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "7"}))
            .await
            .expect("fetch");
        registry
            .invoke("post_mr_discussion", post_args(json!("base..head")))
            .await
            .expect("post");

        assert_eq!(host.posted()[0].diff_refs, refs("cached"));
    }

    #[tokio::test]
    async fn posting_without_cache_dispatches_invalid_refs_unchanged() {
        let host = StubCodeHost::with_diffs(vec![]);
        let mut registry = registry_with(host.clone());

        registry
            .invoke("post_mr_discussion", post_args(json!({})))
            .await
            .expect("post");

        let posted = host.posted();
        assert_eq!(posted.len(), 1);
        assert_eq!(posted[0].diff_refs, json!({}));
    }

    #[tokio::test]
    async fn valid_supplied_refs_are_not_replaced() {
        let host = StubCodeHost::with_diffs(vec![diff_with_refs(refs("cached"))]);
        let mut registry = registry_with(host.clone());

        registry
            .invoke("get_mr_diff", json!({"project_id": "42", "mr_iid": "7"}))
            .await
            .expect("fetch");
        registry
            .invoke("post_mr_discussion", post_args(refs("supplied")))
            .await
            .expect("post");

        assert_eq!(host.posted()[0].diff_refs, refs("supplied"));
    }

    #[tokio::test]
    async fn non_markdown_reads_are_rejected_with_error_text() {
        let mut registry = registry_with(StubCodeHost::with_diffs(vec![]));
        let result = registry
            .invoke("read_kb_file", json!({"kb_file_path": "secrets.txt"}))
            .await
            .expect("invoke");
        assert_eq!(result["isError"], json!(true));
        assert!(result["content"][0]["text"]
            .as_str()
            .expect("text")
            .contains("secrets.txt"));
    }

    #[tokio::test]
    async fn unknown_tool_is_a_registry_error() {
        let mut registry = registry_with(StubCodeHost::with_diffs(vec![]));
        let result = registry.invoke("delete_everything", json!({})).await;
        assert!(matches!(result, Err(RegistryError::UnknownTool(name)) if name == "delete_everything"));
    }

    #[tokio::test]
    async fn jira_lookup_returns_text_content() {
        let mut registry = registry_with(StubCodeHost::with_diffs(vec![]));
        let result = registry
            .invoke("get_jira_issue", json!({"issue_key": "PROJ-9"}))
            .await
            .expect("invoke");
        assert_eq!(result["content"][0]["text"], json!("ticket PROJ-9"));
    }

    #[tokio::test]
    async fn undecodable_arguments_fall_back_to_defaults() {
        let mut registry = registry_with(StubCodeHost::with_diffs(vec![]));
        // An array is structurally wrong for every tool; decoding falls back
        // to the empty argument set and the tool reports the gap as text.
        let result = registry
            .invoke("read_kb_file", json!(["not", "an", "object"]))
            .await
            .expect("invoke");
        assert_eq!(result["isError"], json!(true));
    }

    #[test]
    fn descriptor_names_are_unique_and_complete() {
        let registry = registry_with(StubCodeHost::with_diffs(vec![]));
        let names: Vec<String> = registry
            .descriptors()
            .into_iter()
            .map(|descriptor| descriptor.name)
            .collect();
        assert_eq!(
            names,
            vec![
                "get_review_guidelines",
                "read_kb_file",
                "get_mr_diff",
                "post_mr_discussion",
                "get_jira_issue"
            ]
        );
    }
}
