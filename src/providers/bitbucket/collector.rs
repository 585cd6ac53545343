use std::fmt::Display;

use futures::stream::{self, StreamExt};
use log::{info, warn};
use url::Url;

use super::client::BitbucketClient;
use super::paginator::parse_records;
use super::types::PullRequest;
use crate::error::Result;
use crate::metrics::MetricSink;

/// Every pull request attribute the reducer reads.
pub(super) const PULL_REQUEST_FIELDS: &str = "values.id,values.title,values.state,\
values.comment_count,values.task_count,values.author.display_name,\
values.created_on,values.updated_on,\
values.source.repository.name,values.source.repository.full_name,\
values.source.repository.slug,values.source.branch.name,\
values.destination.repository.name,values.destination.branch.name,\
values.participants.role,values.participants.approved,\
values.participants.user.display_name,values.links.html.href";

// The pull request endpoints reject the 100 the listing endpoints allow.
const PULL_REQUEST_PAGELEN: u32 = 25;

impl BitbucketClient {
    /// Fetches and parses every pull request behind one listing URL.
    ///
    /// # Errors
    ///
    /// Fails if any page cannot be fetched or any record is malformed.
    pub async fn fetch_pull_requests(&self, url: Url) -> Result<Vec<PullRequest>> {
        let raw = self
            .fetch_all(url, PULL_REQUEST_FIELDS, PULL_REQUEST_PAGELEN)
            .await?;
        parse_records(raw)
    }

    /// Fetches the pull requests of every entity concurrently and merges them.
    ///
    /// `url_for` maps an entity to its pull request listing. An entity whose
    /// URL, fetch or parse fails is reported to `sink` once and contributes
    /// nothing; its siblings are unaffected. With `max_concurrency` unset,
    /// every entity is in flight at once.
    pub async fn collect_pull_requests<E, F>(
        &self,
        entities: &[E],
        url_for: F,
        max_concurrency: Option<usize>,
        sink: &mut dyn MetricSink,
    ) -> Vec<PullRequest>
    where
        E: Display,
        F: Fn(&E) -> Result<Url>,
    {
        let limit = max_concurrency.unwrap_or(entities.len()).max(1);
        let url_for = &url_for;

        let results: Vec<Result<Vec<PullRequest>>> = stream::iter(entities)
            .map(|entity| async move {
                let url = url_for(entity)?;
                self.fetch_pull_requests(url).await
            })
            .buffered(limit)
            .collect()
            .await;

        let mut pull_requests = Vec::new();
        let mut failed = 0usize;

        for (entity, result) in entities.iter().zip(results) {
            match result {
                Ok(prs) => pull_requests.extend(prs),
                Err(err) => {
                    warn!("Skipping pull requests for {entity}: {err}");
                    sink.add_error(&err);
                    failed += 1;
                }
            }
        }

        info!(
            "Collected {} pull requests from {} of {} entities",
            pull_requests.len(),
            entities.len() - failed,
            entities.len()
        );

        pull_requests
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::testing::RecordingSink;
    use crate::providers::bitbucket::types::Repository;
    use mockito::Matcher;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn client(server: &mockito::Server) -> BitbucketClient {
        BitbucketClient::new(&server.url(), None, Duration::from_secs(5)).unwrap()
    }

    fn repo(slug: &str) -> Repository {
        Repository {
            name: slug.to_string(),
            full_name: format!("team/{slug}"),
            slug: slug.to_string(),
        }
    }

    fn pr_page(ids: &[i64]) -> String {
        let values: Vec<_> = ids
            .iter()
            .map(|id| json!({"id": id, "title": format!("pr-{id}"), "state": "OPEN"}))
            .collect();
        json!({ "values": values }).to_string()
    }

    fn url_for(client: &BitbucketClient) -> impl Fn(&Repository) -> Result<Url> + '_ {
        move |r: &Repository| {
            client.endpoint(&["repositories", "team", r.slug.as_str(), "pullrequests"])
        }
    }

    #[tokio::test]
    async fn test_fetch_pull_requests_requests_reducer_fields() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/repositories/team/one/pullrequests")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("pagelen".into(), "25".into()),
                Matcher::UrlEncoded("fields".into(), PULL_REQUEST_FIELDS.into()),
            ]))
            .with_body(pr_page(&[1]))
            .create_async()
            .await;

        let client = client(&server);
        let url = url_for(&client)(&repo("one")).unwrap();
        let prs = client.fetch_pull_requests(url).await.unwrap();

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].title, "pr-1");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_collect_isolates_failing_entity() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/team/one/pullrequests")
            .match_query(Matcher::Any)
            .with_body(pr_page(&[1, 2]))
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/team/two/pullrequests")
            .match_query(Matcher::Any)
            .with_status(500)
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/team/three/pullrequests")
            .match_query(Matcher::Any)
            .with_body(pr_page(&[3]))
            .create_async()
            .await;

        let client = client(&server);
        let repos = vec![repo("one"), repo("two"), repo("three")];
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&repos, url_for(&client), None, &mut sink)
            .await;

        let mut ids: Vec<i64> = prs.iter().map(|pr| pr.id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("500"));
        assert!(sink.metrics.is_empty());
    }

    #[tokio::test]
    async fn test_collect_drops_entity_with_malformed_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/team/one/pullrequests")
            .match_query(Matcher::Any)
            .with_body(json!({"values": [{"id": 1}, {"id": "broken"}]}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/team/two/pullrequests")
            .match_query(Matcher::Any)
            .with_body(pr_page(&[7]))
            .create_async()
            .await;

        let client = client(&server);
        let repos = vec![repo("one"), repo("two")];
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&repos, url_for(&client), Some(1), &mut sink)
            .await;

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].id, 7);
        assert_eq!(sink.errors.len(), 1);
    }

    /// Answers every request with `body` after a pause, recording the peak
    /// number of requests held at once.
    async fn spawn_slow_server(body: String) -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let observed = Arc::clone(&peak);

        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let in_flight = Arc::clone(&in_flight);
                let peak = Arc::clone(&peak);
                let body = body.clone();

                tokio::spawn(async move {
                    let mut request = Vec::new();
                    let mut buf = [0u8; 1024];
                    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                        match socket.read(&mut buf).await {
                            Ok(0) | Err(_) => return,
                            Ok(n) => request.extend_from_slice(&buf[..n]),
                        }
                    }

                    let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(250)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);

                    let response = format!(
                        "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\n\
                         Content-Length: {}\r\nConnection: close\r\n\r\n{body}",
                        body.len()
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        (format!("http://{addr}"), observed)
    }

    #[tokio::test]
    async fn test_collect_fetches_all_entities_at_once_by_default() {
        let (url, peak) = spawn_slow_server(pr_page(&[1])).await;
        let client = BitbucketClient::new(&url, None, Duration::from_secs(5)).unwrap();
        let repos = vec![repo("one"), repo("two"), repo("three"), repo("four")];
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&repos, url_for(&client), None, &mut sink)
            .await;

        assert_eq!(prs.len(), 4);
        assert!(sink.errors.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_collect_respects_max_concurrency() {
        let (url, peak) = spawn_slow_server(pr_page(&[1])).await;
        let client = BitbucketClient::new(&url, None, Duration::from_secs(5)).unwrap();
        let repos = vec![repo("one"), repo("two"), repo("three")];
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&repos, url_for(&client), Some(1), &mut sink)
            .await;

        assert_eq!(prs.len(), 3);
        assert!(sink.errors.is_empty());
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_collect_drops_entity_with_array_record() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/repositories/team/one/pullrequests")
            .match_query(Matcher::Any)
            .with_body(json!({"values": [[7]]}).to_string())
            .create_async()
            .await;
        server
            .mock("GET", "/repositories/team/two/pullrequests")
            .match_query(Matcher::Any)
            .with_body(pr_page(&[8]))
            .create_async()
            .await;

        let client = client(&server);
        let repos = vec![repo("one"), repo("two")];
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&repos, url_for(&client), None, &mut sink)
            .await;

        assert_eq!(prs.len(), 1);
        assert_eq!(prs[0].id, 8);
        assert_eq!(sink.errors.len(), 1);
        assert!(sink.errors[0].contains("expected a JSON object"));
    }

    #[tokio::test]
    async fn test_collect_with_no_entities() {
        let server = mockito::Server::new_async().await;
        let client = client(&server);
        let mut sink = RecordingSink::default();

        let prs = client
            .collect_pull_requests(&Vec::<Repository>::new(), url_for(&client), None, &mut sink)
            .await;

        assert!(prs.is_empty());
        assert!(sink.errors.is_empty());
    }
}
