use crate::metrics::{FieldValue, Fields, Tags};

use super::types::{ParticipantRole, PullRequest};

/// Marker placed directly before the name of a reviewer who approved.
pub const APPROVED_MARKER: char = '\u{2705}';

/// Reviewer-derived fields of one pull request.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ReviewSummary {
    /// All reviewers in participant order, approved ones marked
    pub reviewers: String,
    /// Approving reviewers in participant order
    pub approved: String,
    pub approval_count: i64,
}

/// Aggregates the REVIEWER participants; everyone else is ignored.
pub fn summarize_reviews(pr: &PullRequest) -> ReviewSummary {
    let mut reviewers = Vec::new();
    let mut approved = Vec::new();

    for participant in pr
        .participants
        .iter()
        .filter(|p| p.role == ParticipantRole::Reviewer)
    {
        let name = participant.user.display_name.as_str();
        if participant.approved {
            reviewers.push(format!("{APPROVED_MARKER}{name}"));
            approved.push(name);
        } else {
            reviewers.push(name.to_string());
        }
    }

    #[allow(clippy::cast_possible_wrap)]
    let approval_count = approved.len() as i64;

    ReviewSummary {
        reviewers: reviewers.join(", "),
        approved: approved.join(", "),
        approval_count,
    }
}

/// Flattens a pull request into measurement fields.
pub fn pr_fields(pr: &PullRequest) -> Fields {
    let reviews = summarize_reviews(pr);

    let entries: [(&str, FieldValue); 16] = [
        ("id", pr.id.into()),
        ("title", pr.title.as_str().into()),
        ("pr_state", pr.state.as_str().into()),
        ("comment_count", pr.comment_count.into()),
        ("task_count", pr.task_count.into()),
        ("author", pr.author.display_name.as_str().into()),
        ("created_on", pr.created_on.timestamp().into()),
        ("updated_on", pr.updated_on.timestamp().into()),
        ("src_repo", pr.source.repository.name.as_str().into()),
        ("src_branch", pr.source.branch.name.as_str().into()),
        ("dest_repo", pr.destination.repository.name.as_str().into()),
        ("dest_branch", pr.destination.branch.name.as_str().into()),
        ("reviewers", reviews.reviewers.into()),
        ("approved", reviews.approved.into()),
        ("approval_count", reviews.approval_count.into()),
        ("link", pr.links.html.href.as_str().into()),
    ];

    entries
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub fn pr_tags(pr: &PullRequest) -> Tags {
    let mut tags = Tags::new();
    tags.insert("state".to_string(), pr.state.as_str().to_string());
    tags.insert(
        "source_repo".to_string(),
        pr.source.repository.slug.clone(),
    );
    tags
}

/// Reduces one pull request into its `(fields, tags)` record.
pub fn reduce(pr: &PullRequest) -> (Fields, Tags) {
    (pr_fields(pr), pr_tags(pr))
}
