use log::debug;
use serde::de::{DeserializeOwned, Error as _};
use serde_json::Value;
use url::Url;

use super::client::BitbucketClient;
use super::types::Page;
use crate::error::Result;

impl BitbucketClient {
    /// Fetches every page of a listing, starting at `seed`, and returns all
    /// raw records in cursor order.
    ///
    /// `pagelen` and `fields` are merged into each request URL unless the URL
    /// already carries them; the server's `next` links embed both, so they are
    /// never duplicated or overridden when following the cursor.
    ///
    /// # Errors
    ///
    /// Fails on the first transport error, non-2xx status, malformed page or
    /// unparseable `next` link. Records gathered before the failure are
    /// discarded, since a truncated listing cannot be told apart from a
    /// complete one.
    pub async fn fetch_all(&self, seed: Url, fields: &str, pagelen: u32) -> Result<Vec<Value>> {
        let pagelen = pagelen.to_string();
        let mut values = Vec::new();
        let mut next = Some(seed);
        let mut pages = 0usize;

        while let Some(mut url) = next.take() {
            merge_query(&mut url, &[("pagelen", pagelen.as_str()), ("fields", fields)]);
            debug!("Fetching page {}: {url}", pages + 1);

            let body = self.perform(url).await?.bytes().await?;
            let page: Page = from_object(serde_json::from_slice(&body)?)?;

            pages += 1;
            values.extend(page.values);

            next = match page.next.as_deref() {
                Some(cursor) if !cursor.is_empty() => Some(Url::parse(cursor)?),
                _ => None,
            };
        }

        debug!("Fetched {} records over {pages} pages", values.len());
        Ok(values)
    }
}

/// Appends each `(key, value)` pair whose key is not already in the query.
/// Existing parameters always win.
pub(super) fn merge_query(url: &mut Url, defaults: &[(&str, &str)]) {
    let missing: Vec<_> = defaults
        .iter()
        .filter(|(key, _)| !url.query_pairs().any(|(existing, _)| existing == *key))
        .collect();

    if missing.is_empty() {
        return;
    }

    let mut pairs = url.query_pairs_mut();
    for (key, value) in missing {
        pairs.append_pair(key, value);
    }
}

/// Parses raw records one by one, stopping at the first malformed one.
pub(super) fn parse_records<T: DeserializeOwned>(raw: Vec<Value>) -> Result<Vec<T>> {
    raw.into_iter().map(from_object).collect()
}

// Derived struct impls also accept a positional array, which would turn `[]`
// into an all-default page or record.
fn from_object<T: DeserializeOwned>(value: Value) -> Result<T> {
    if !value.is_object() {
        return Err(serde_json::Error::custom(format!(
            "expected a JSON object, found {value}"
        ))
        .into());
    }
    Ok(serde_json::from_value(value)?)
}
