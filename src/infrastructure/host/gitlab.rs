use crate::config::GitLabSettings;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum CodeHostError {
    #[error("code host request failed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Merge-request changes as returned to the model: title, the diff_refs
/// revision triple, and per-file raw diffs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MrDiff {
    pub title: String,
    pub diff_refs: Value,
    pub changes: Vec<FileChange>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileChange {
    pub path: String,
    pub new_path: String,
    pub old_path: String,
    pub diff: String,
}

/// A line-anchored review comment ready for dispatch. `new_line` refers to
/// the new revision's numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscussionDraft {
    pub project_id: String,
    pub mr_iid: String,
    pub body: String,
    pub path: String,
    pub new_line: u64,
    pub diff_refs: Value,
}

#[async_trait]
pub trait CodeHost: Send + Sync {
    async fn fetch_changes(&self, project_id: &str, mr_iid: &str)
    -> Result<MrDiff, CodeHostError>;

    async fn post_discussion(&self, draft: DiscussionDraft) -> Result<(), CodeHostError>;
}

#[derive(Clone)]
pub struct GitLabClient {
    http: Client,
    base_url: String,
    token: String,
}

impl GitLabClient {
    pub fn new(settings: GitLabSettings) -> Self {
        Self {
            http: Client::new(),
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            token: settings.token,
        }
    }

    fn mr_endpoint(&self, project_id: &str, mr_iid: &str, suffix: &str) -> String {
        let encoded = urlencoding::encode(project_id);
        format!(
            "{}/api/v4/projects/{encoded}/merge_requests/{mr_iid}/{suffix}",
            self.base_url
        )
    }
}

#[async_trait]
impl CodeHost for GitLabClient {
    async fn fetch_changes(
        &self,
        project_id: &str,
        mr_iid: &str,
    ) -> Result<MrDiff, CodeHostError> {
        let url = self.mr_endpoint(project_id, mr_iid, "changes");
        debug!(%url, "Fetching merge request changes");

        let response: ChangesResponse = self
            .http
            .get(url)
            .header("PRIVATE-TOKEN", &self.token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        info!(
            project_id,
            mr_iid,
            files = response.changes.len(),
            "Fetched merge request changes"
        );

        Ok(MrDiff {
            title: response.title,
            diff_refs: response.diff_refs,
            changes: response
                .changes
                .into_iter()
                .map(|change| FileChange {
                    path: change.new_path.clone(),
                    new_path: change.new_path,
                    old_path: change.old_path,
                    diff: change.diff,
                })
                .collect(),
        })
    }

    async fn post_discussion(&self, draft: DiscussionDraft) -> Result<(), CodeHostError> {
        let url = self.mr_endpoint(&draft.project_id, &draft.mr_iid, "discussions");

        let payload = json!({
            "body": draft.body,
            "position": {
                "base_sha": draft.diff_refs.get("base_sha").cloned().unwrap_or(Value::Null),
                "start_sha": draft.diff_refs.get("start_sha").cloned().unwrap_or(Value::Null),
                "head_sha": draft.diff_refs.get("head_sha").cloned().unwrap_or(Value::Null),
                "position_type": "text",
                "new_path": draft.path,
                "new_line": draft.new_line,
            },
        });

        self.http
            .post(url)
            .header("PRIVATE-TOKEN", &self.token)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        info!(
            project_id = draft.project_id,
            mr_iid = draft.mr_iid,
            "Posted merge request discussion"
        );
        Ok(())
    }
}

#[derive(Deserialize)]
struct ChangesResponse {
    #[serde(default)]
    title: String,
    #[serde(default)]
    diff_refs: Value,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Deserialize)]
struct RawChange {
    #[serde(default)]
    new_path: String,
    #[serde(default)]
    old_path: String,
    #[serde(default)]
    diff: String,
}
