use crate::config::JiraSettings;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

pub const CREDENTIALS_MISSING_TEXT: &str =
    "Jira credentials are not fully configured. Skipping ticket check.";
pub const AUTH_FAILED_TEXT: &str =
    "Jira authentication failed. Your server likely requires a Personal Access Token (Bearer).";

/// Ticket lookup never fails hard: every failure mode is encoded as a
/// textual answer the model must read, keeping the agent loop simple.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    async fn fetch_issue(&self, issue_key: &str) -> String;
}

#[derive(Clone)]
pub struct JiraClient {
    http: Client,
    settings: JiraSettings,
}

impl JiraClient {
    pub fn new(settings: JiraSettings) -> Self {
        Self {
            http: Client::new(),
            settings,
        }
    }
}

#[async_trait]
impl IssueTracker for JiraClient {
    async fn fetch_issue(&self, issue_key: &str) -> String {
        let (Some(host), Some(token)) = (&self.settings.host, &self.settings.token) else {
            return CREDENTIALS_MISSING_TEXT.to_string();
        };

        let url = format!(
            "{}/rest/api/2/issue/{issue_key}?fields=summary,description,status",
            host.trim_end_matches('/')
        );
        debug!(issue_key, "Fetching Jira ticket");

        let response = match self
            .http
            .get(url)
            .header("Authorization", format!("Bearer {token}"))
            .header("Accept", "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                warn!(issue_key, %err, "Jira request failed");
                return generic_failure_text(&err.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            warn!(issue_key, status = status.as_u16(), "Jira returned an error status");
            return failure_text(status, issue_key);
        }

        match response.json::<IssueResponse>().await {
            Ok(issue) => render_issue(issue_key, issue),
            Err(err) => {
                warn!(issue_key, %err, "Jira returned an unreadable payload");
                generic_failure_text(&err.to_string())
            }
        }
    }
}

pub(crate) fn failure_text(status: StatusCode, issue_key: &str) -> String {
    match status {
        StatusCode::NOT_FOUND => format!("Jira ticket {issue_key} not found."),
        StatusCode::UNAUTHORIZED => AUTH_FAILED_TEXT.to_string(),
        other => generic_failure_text(&format!("status {}", other.as_u16())),
    }
}

fn generic_failure_text(reason: &str) -> String {
    format!("Failed to fetch Jira ticket: {reason}")
}

fn render_issue(issue_key: &str, issue: IssueResponse) -> String {
    let fields = issue.fields;
    let description = match fields.description {
        Value::String(text) => text,
        Value::Null => String::new(),
        other => other.to_string(),
    };

    format!(
        "=== JIRA TICKET: {issue_key} ===\nSTATUS: {}\nSUMMARY: {}\nDESCRIPTION: {}\n================================",
        fields.status.name, fields.summary, description
    )
}

#[derive(Debug, Deserialize)]
struct IssueResponse {
    #[serde(default)]
    fields: IssueFields,
}

#[derive(Debug, Default, Deserialize)]
struct IssueFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    description: Value,
    #[serde(default)]
    status: IssueStatus,
}

#[derive(Debug, Default, Deserialize)]
struct IssueStatus {
    #[serde(default)]
    name: String,
}
