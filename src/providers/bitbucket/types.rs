use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

/// One page of a paginated Bitbucket listing.
#[derive(Debug, Deserialize)]
pub struct Page {
    /// Absolute URL of the following page, absent on the last one
    #[serde(default)]
    pub next: Option<String>,
    /// Raw records on this page, in server order
    #[serde(default)]
    pub values: Vec<Value>,
}

/// A Bitbucket account: a team member, a PR author or a participant.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct User {
    /// Account UUID including braces (e.g., "{6ccb2745-...}")
    #[serde(default, alias = "UUID")]
    pub uuid: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Repository {
    #[serde(default)]
    pub name: String,
    /// Workspace-qualified name (e.g., "example-team/example-repo")
    #[serde(default)]
    pub full_name: String,
    /// URL-safe repository identifier
    #[serde(default)]
    pub slug: String,
}

impl fmt::Display for User {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name.is_empty() {
            f.write_str(&self.uuid)
        } else {
            f.write_str(&self.display_name)
        }
    }
}

impl fmt::Display for Repository {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.full_name.is_empty() {
            f.write_str(&self.slug)
        } else {
            f.write_str(&self.full_name)
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Branch {
    #[serde(default)]
    pub name: String,
}

/// One side of a pull request: where it merges from or into.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Endpoint {
    #[serde(default)]
    pub repository: Repository,
    #[serde(default)]
    pub branch: Branch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Link {
    #[serde(default)]
    pub href: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Links {
    #[serde(default)]
    pub html: Link,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum PullRequestState {
    #[default]
    Open,
    Merged,
    Declined,
    Superseded,
    Other(String),
}

impl PullRequestState {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Open => "OPEN",
            Self::Merged => "MERGED",
            Self::Declined => "DECLINED",
            Self::Superseded => "SUPERSEDED",
            Self::Other(state) => state,
        }
    }
}

impl From<String> for PullRequestState {
    fn from(value: String) -> Self {
        match value.as_str() {
            "OPEN" => Self::Open,
            "MERGED" => Self::Merged,
            "DECLINED" => Self::Declined,
            "SUPERSEDED" => Self::Superseded,
            _ => Self::Other(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum ParticipantRole {
    Reviewer,
    #[default]
    Participant,
    Other(String),
}

impl From<String> for ParticipantRole {
    fn from(value: String) -> Self {
        match value.as_str() {
            "REVIEWER" => Self::Reviewer,
            "PARTICIPANT" => Self::Participant,
            _ => Self::Other(value),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Participant {
    #[serde(default)]
    pub user: User,
    #[serde(default)]
    pub role: ParticipantRole,
    #[serde(default)]
    pub approved: bool,
}

/// A pull request as returned by the pull request listing endpoints.
///
/// Everything but `id` falls back to a default, since the `fields` selector
/// makes the server drop whatever was not asked for.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PullRequest {
    pub id: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub state: PullRequestState,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub task_count: i64,
    #[serde(default)]
    pub author: User,
    #[serde(default)]
    pub created_on: DateTime<Utc>,
    #[serde(default)]
    pub updated_on: DateTime<Utc>,
    #[serde(default)]
    pub source: Endpoint,
    #[serde(default)]
    pub destination: Endpoint,
    /// Ordered as the server lists them
    #[serde(default)]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub links: Links,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_pull_request_parses_nested_fields() {
        let raw = json!({
            "id": 1,
            "title": "example-pr",
            "state": "OPEN",
            "comment_count": 2,
            "task_count": 1,
            "author": {"display_name": "Example Dude", "nickname": "dude"},
            "created_on": "2020-02-06T16:51:48.123456+00:00",
            "updated_on": "2020-02-06T16:52:40+00:00",
            "source": {
                "repository": {"name": "example-repo", "full_name": "example-team/example-repo", "slug": "example-repo"},
                "branch": {"name": "example_branch"}
            },
            "destination": {
                "repository": {"name": "example-repo"},
                "branch": {"name": "master"}
            },
            "participants": [
                {"user": {"display_name": "Goldie Locks"}, "role": "REVIEWER", "approved": true}
            ],
            "links": {"html": {"href": "https://example.com/html"}}
        });

        let pr: PullRequest = serde_json::from_value(raw).unwrap();

        assert_eq!(pr.id, 1);
        assert_eq!(pr.state, PullRequestState::Open);
        assert_eq!(pr.task_count, 1);
        assert_eq!(pr.author.display_name, "Example Dude");
        assert_eq!(pr.created_on.timestamp(), 1_581_007_908);
        assert_eq!(pr.updated_on.timestamp(), 1_581_007_960);
        assert_eq!(pr.source.repository.full_name, "example-team/example-repo");
        assert_eq!(pr.destination.branch.name, "master");
        assert_eq!(pr.participants[0].role, ParticipantRole::Reviewer);
        assert!(pr.participants[0].approved);
        assert_eq!(pr.links.html.href, "https://example.com/html");
    }

    #[test]
    fn test_pull_request_requires_id() {
        let result: Result<PullRequest, _> = serde_json::from_value(json!({"title": "no id"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_state_is_kept_verbatim() {
        let pr: PullRequest =
            serde_json::from_value(json!({"id": 3, "state": "QUEUED"})).unwrap();
        assert_eq!(pr.state.as_str(), "QUEUED");
    }

    #[test]
    fn test_member_uuid_accepts_both_casings() {
        let lower: User = serde_json::from_value(json!({"uuid": "{a}"})).unwrap();
        let upper: User = serde_json::from_value(json!({"UUID": "{b}"})).unwrap();
        assert_eq!(lower.uuid, "{a}");
        assert_eq!(upper.uuid, "{b}");
    }

    #[test]
    fn test_page_without_next_or_values() {
        let page: Page = serde_json::from_value(json!({})).unwrap();
        assert!(page.next.is_none());
        assert!(page.values.is_empty());
    }
}
