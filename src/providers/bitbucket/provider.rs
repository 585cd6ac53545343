use std::str::FromStr;
use std::time::Duration;

use chrono::Utc;
use log::{info, warn};
use tokio::sync::OnceCell;

use crate::auth::ClientCredentials;
use crate::error::{PulseError, Result};
use crate::metrics::{MetricSink, MEASUREMENT};

use super::client::BitbucketClient;
use super::reducer::reduce;
use super::types::{PullRequest, User};

/// Which pull requests a gather cycle collects for the owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatherType {
    /// PRs authored by every member of the owner team
    Team,
    /// PRs authored by the owner account itself
    User,
    /// PRs on every repository the owner owns
    Repos,
}

impl FromStr for GatherType {
    type Err = PulseError;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "team" => Ok(Self::Team),
            "user" => Ok(Self::User),
            "repos" => Ok(Self::Repos),
            other => Err(PulseError::InvalidGatherType(other.to_string())),
        }
    }
}

/// Startup parameters for [`BitbucketProvider`].
#[derive(Debug, Clone)]
pub struct GatherSettings {
    /// Team or user account name
    pub owner: String,
    /// Raw gather type, validated at the start of every cycle
    pub gather_type: String,
    pub api_base_url: String,
    pub credentials: Option<ClientCredentials>,
    pub http_timeout: Duration,
    /// Cap on concurrent per-entity fetches, unbounded when `None`
    pub max_concurrency: Option<usize>,
}

/// Collects pull request metrics from Bitbucket Cloud.
///
/// The authenticated client is built on the first gather cycle and reused by
/// every later one.
pub struct BitbucketProvider {
    settings: GatherSettings,
    client: OnceCell<BitbucketClient>,
}

impl BitbucketProvider {
    pub fn new(settings: GatherSettings) -> Self {
        Self {
            settings,
            client: OnceCell::new(),
        }
    }

    async fn client(&self) -> Result<&BitbucketClient> {
        self.client
            .get_or_try_init(|| {
                BitbucketClient::connect(
                    &self.settings.api_base_url,
                    self.settings.credentials.as_ref(),
                    self.settings.http_timeout,
                )
            })
            .await
    }

    /// Runs one gather cycle and pushes a record per pull request to `sink`.
    ///
    /// Returns the number of records emitted. Failures are reported through
    /// the sink's error channel: a failing entity only loses its own pull
    /// requests, while a failing member or repository listing ends the cycle
    /// with nothing emitted.
    ///
    /// # Errors
    ///
    /// Returns an error only for an unrecognised gather type, after reporting
    /// it to the sink.
    pub async fn gather(&self, sink: &mut dyn MetricSink) -> Result<usize> {
        let gather_type = match self.settings.gather_type.parse::<GatherType>() {
            Ok(gather_type) => gather_type,
            Err(err) => {
                sink.add_error(&err);
                return Err(err);
            }
        };

        info!(
            "Starting {gather_type:?} gather cycle for {}",
            self.settings.owner
        );

        let prs = match self.collect(gather_type, sink).await {
            Ok(prs) => prs,
            Err(err) => {
                warn!("Gather cycle aborted: {err}");
                sink.add_error(&err);
                return Ok(0);
            }
        };

        let now = Utc::now();
        for pr in &prs {
            let (fields, tags) = reduce(pr);
            sink.add_fields(MEASUREMENT, fields, tags, now);
        }

        info!("Emitted {} pull request records", prs.len());
        Ok(prs.len())
    }

    /// Resolves the entities for `gather_type` and fans out over them.
    /// Only client construction and entity resolution errors surface here.
    async fn collect(
        &self,
        gather_type: GatherType,
        sink: &mut dyn MetricSink,
    ) -> Result<Vec<PullRequest>> {
        let client = self.client().await?;
        let owner = self.settings.owner.as_str();
        let limit = self.settings.max_concurrency;

        let prs = match gather_type {
            GatherType::Team => {
                let members = client.resolve_members(owner).await?;
                client
                    .collect_pull_requests(&members, |m| user_prs_url(client, m), limit, sink)
                    .await
            }
            GatherType::User => {
                let users = [User {
                    uuid: owner.to_string(),
                    display_name: owner.to_string(),
                }];
                client
                    .collect_pull_requests(&users, |u| user_prs_url(client, u), limit, sink)
                    .await
            }
            GatherType::Repos => {
                let repos = client.resolve_repositories(owner).await?;
                client
                    .collect_pull_requests(
                        &repos,
                        |r| {
                            client.endpoint(&[
                                "repositories",
                                owner,
                                r.slug.as_str(),
                                "pullrequests",
                            ])
                        },
                        limit,
                        sink,
                    )
                    .await
            }
        };

        Ok(prs)
    }
}

fn user_prs_url(client: &BitbucketClient, user: &User) -> Result<url::Url> {
    client.endpoint(&["pullrequests", user.uuid.as_str()])
}
