use log::info;

use super::client::BitbucketClient;
use super::paginator::parse_records;
use super::types::{Repository, User};
use crate::error::Result;

/// Largest page the listing endpoints accept.
const LISTING_PAGELEN: u32 = 100;

const MEMBER_FIELDS: &str = "values.uuid,values.display_name";
const REPOSITORY_FIELDS: &str = "values.name,values.full_name,values.slug";

impl BitbucketClient {
    /// Lists every member of `team`.
    ///
    /// # Errors
    ///
    /// Fails if the listing cannot be fetched or any member record is
    /// malformed; no partial member list is returned.
    pub async fn resolve_members(&self, team: &str) -> Result<Vec<User>> {
        let url = self.endpoint(&["users", team, "members"])?;
        let members: Vec<User> =
            parse_records(self.fetch_all(url, MEMBER_FIELDS, LISTING_PAGELEN).await?)?;

        info!("Resolved {} members of team {team}", members.len());
        Ok(members)
    }

    /// Lists every repository owned by `owner`.
    ///
    /// # Errors
    ///
    /// Fails if the listing cannot be fetched or any repository record is
    /// malformed; no partial repository list is returned.
    pub async fn resolve_repositories(&self, owner: &str) -> Result<Vec<Repository>> {
        let url = self.endpoint(&["repositories", owner])?;
        let repositories: Vec<Repository> =
            parse_records(self.fetch_all(url, REPOSITORY_FIELDS, LISTING_PAGELEN).await?)?;

        info!("Resolved {} repositories of {owner}", repositories.len());
        Ok(repositories)
    }
}
