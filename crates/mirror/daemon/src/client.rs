//! HTTP adapter for the remote tracker API.
//!
//! Requests carry the API token in the `X-TrackerToken` header. Story
//! listings that fail to decode are errors; activity feeds that fail to
//! decode are reported as `Ok(None)` so the poller can treat them as empty.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use mirror_engine::{ApiError, ApiResult, TrackerApi};
use mirror_types::{Activity, Block, ProjectId, StoryId, StoryNode};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use crate::config::TrackerConfig;
use crate::error::{DaemonError, DaemonResult};

const TOKEN_HEADER: &str = "X-TrackerToken";

/// Story search built from filter terms.
///
/// Each filter appends one term to the previous ones, separated by a space.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorySearch {
    base_url: String,
    project_id: ProjectId,
    filter: Option<String>,
}

impl StorySearch {
    pub fn new(base_url: impl Into<String>, project_id: ProjectId) -> Self {
        Self {
            base_url: base_url.into(),
            project_id,
            filter: None,
        }
    }

    fn term(mut self, term: String) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(filter) => format!("{} {}", filter, term),
            None => term,
        });
        self
    }

    pub fn by_id(self, id: StoryId) -> Self {
        self.term(format!("id:{}", id.get()))
    }

    pub fn by_ids(self, ids: &[StoryId]) -> Self {
        let ids: Vec<String> = ids.iter().map(|id| id.get().to_string()).collect();
        self.term(format!("id:{}", ids.join(",")))
    }

    pub fn by_requester(self, requester: &str) -> Self {
        self.term(format!("requester:{}", requester))
    }

    /// Include stories completed in previous iterations.
    pub fn include_done(self) -> Self {
        self.term("includedone:true".to_string())
    }

    pub fn modified_since(self, since: DateTime<Utc>) -> Self {
        self.term(format!(
            "modified_since:\"{}\"",
            since.format("%m/%d/%Y %H:%M:%S")
        ))
    }

    pub fn by_states<S: AsRef<str>>(self, states: &[S]) -> Self {
        let states: Vec<&str> = states.iter().map(|state| state.as_ref()).collect();
        self.term(format!("state:{}", states.join(",")))
    }

    pub fn by_label(self, label: &str) -> Self {
        self.term(format!("label:{}", label))
    }

    pub fn by_type(self, story_type: &str) -> Self {
        self.term(format!("type:{}", story_type))
    }

    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Search URL with the filter as a form-encoded `filter` parameter.
    pub fn url(&self) -> ApiResult<Url> {
        let base = format!(
            "{}/projects/{}/stories",
            self.base_url.trim_end_matches('/'),
            self.project_id.get()
        );
        let parsed = match &self.filter {
            Some(filter) => Url::parse_with_params(&base, &[("filter", filter.as_str())]),
            None => Url::parse(&base),
        };
        parsed.map_err(|e| ApiError::Transport(format!("invalid url {}: {}", base, e)))
    }
}

/// [`TrackerApi`] over HTTP with JSON payloads.
pub struct HttpTrackerApi {
    client: Client,
    token: String,
    api_url: String,
    legacy_api_url: String,
}

impl HttpTrackerApi {
    pub fn new(config: &TrackerConfig, timeout: Duration) -> DaemonResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DaemonError::Client(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            token: config.token.clone(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            legacy_api_url: config.legacy_api_url.trim_end_matches('/').to_string(),
        })
    }

    /// Listing URL for a block: iteration listings for scheduled blocks,
    /// a state search for the icebox.
    pub fn stories_url(&self, project_id: ProjectId, block: Block) -> ApiResult<Url> {
        if block.is_iteration_listing() {
            let url = format!(
                "{}/projects/{}/iterations/{}",
                self.api_url,
                project_id.get(),
                block
            );
            Url::parse(&url).map_err(|e| ApiError::Transport(format!("invalid url {}: {}", url, e)))
        } else {
            StorySearch::new(self.api_url.clone(), project_id)
                .by_states(&["unscheduled"])
                .url()
        }
    }

    pub fn activities_url(
        base_url: &str,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Url> {
        let url = format!("{}/projects/{}/activities", base_url, project_id.get());
        Url::parse_with_params(
            &url,
            &[(
                "occurred_since_date",
                since.to_rfc3339_opts(SecondsFormat::Secs, true),
            )],
        )
        .map_err(|e| ApiError::Transport(format!("invalid url {}: {}", url, e)))
    }

    async fn get(&self, url: Url) -> ApiResult<String> {
        debug!(url = %url, "GET");
        let response = self
            .client
            .get(url.clone())
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        response
            .text()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))
    }

    async fn fetch_feed(
        &self,
        base_url: &str,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        let url = Self::activities_url(base_url, project_id, since)?;
        let body = self.get(url.clone()).await?;
        Ok(parse_feed(&body, &url))
    }
}

/// Decode an activity feed body.
///
/// Returns `None` only when the body is not a JSON array. Elements that do
/// not decode as activities are logged and skipped so the rest of the batch
/// still applies.
pub fn parse_feed(body: &str, url: &Url) -> Option<Vec<Activity>> {
    let elements = match serde_json::from_str::<Vec<serde_json::Value>>(body) {
        Ok(elements) => elements,
        Err(e) => {
            warn!(url = %url, error = %e, "Could not decode activity feed");
            return None;
        }
    };

    let activities = elements
        .into_iter()
        .enumerate()
        .filter_map(|(index, element)| match serde_json::from_value::<Activity>(element) {
            Ok(activity) => Some(activity),
            Err(e) => {
                warn!(url = %url, index, error = %e, "Skipping undecodable activity");
                None
            }
        })
        .collect();
    Some(activities)
}

#[async_trait]
impl TrackerApi for HttpTrackerApi {
    async fn fetch_stories(
        &self,
        project_id: ProjectId,
        block: Block,
    ) -> ApiResult<Vec<StoryNode>> {
        let url = self.stories_url(project_id, block)?;
        let body = self.get(url.clone()).await?;
        serde_json::from_str(&body).map_err(|e| ApiError::Decode {
            url: url.to_string(),
            reason: e.to_string(),
        })
    }

    async fn fetch_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        self.fetch_feed(&self.api_url, project_id, since).await
    }

    async fn fetch_legacy_activities(
        &self,
        project_id: ProjectId,
        since: DateTime<Utc>,
    ) -> ApiResult<Option<Vec<Activity>>> {
        self.fetch_feed(&self.legacy_api_url, project_id, since).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const BASE: &str = "https://www.pivotaltracker.com/services/v3";

    fn api() -> HttpTrackerApi {
        let config = TrackerConfig {
            token: "xxxxxxxxxx".into(),
            api_url: "https://tracker.example/api/".into(),
            ..TrackerConfig::default()
        };
        HttpTrackerApi::new(&config, Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_search_single_filter() {
        let search = StorySearch::new(BASE, ProjectId::new(4)).by_states(&["state1", "state2"]);
        assert_eq!(
            search.url().unwrap().as_str(),
            "https://www.pivotaltracker.com/services/v3/projects/4/stories?filter=state%3Astate1%2Cstate2"
        );
    }

    #[test]
    fn test_search_filters_are_space_joined() {
        let search = StorySearch::new(BASE, ProjectId::new(4))
            .by_states(&["state1", "state2"])
            .by_states(&["state3", "state4"]);
        assert_eq!(
            search.url().unwrap().as_str(),
            "https://www.pivotaltracker.com/services/v3/projects/4/stories?filter=state%3Astate1%2Cstate2+state%3Astate3%2Cstate4"
        );
    }

    #[test]
    fn test_search_filter_terms() {
        let search = StorySearch::new(BASE, ProjectId::new(1))
            .by_ids(&[StoryId::new(1), StoryId::new(2)])
            .by_requester("Dana")
            .include_done()
            .by_label("ui")
            .by_type("bug");
        assert_eq!(
            search.filter(),
            Some("id:1,2 requester:Dana includedone:true label:ui type:bug")
        );

        let unfiltered = StorySearch::new(BASE, ProjectId::new(1));
        assert_eq!(
            unfiltered.url().unwrap().as_str(),
            "https://www.pivotaltracker.com/services/v3/projects/1/stories"
        );
    }

    #[test]
    fn test_stories_url_per_block() {
        let api = api();
        assert_eq!(
            api.stories_url(ProjectId::new(7), Block::Backlog)
                .unwrap()
                .as_str(),
            "https://tracker.example/api/projects/7/iterations/backlog"
        );
        assert_eq!(
            api.stories_url(ProjectId::new(7), Block::Icebox)
                .unwrap()
                .as_str(),
            "https://tracker.example/api/projects/7/stories?filter=state%3Aunscheduled"
        );
    }

    #[test]
    fn test_activities_url() {
        let since = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let url = HttpTrackerApi::activities_url("https://tracker.example", ProjectId::new(3), since)
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://tracker.example/projects/3/activities?occurred_since_date=2023-11-14T22%3A13%3A20Z"
        );
    }

    #[test]
    fn test_malformed_feed_is_none() {
        let url = Url::parse("https://tracker.example/projects/1/activities").unwrap();
        assert!(parse_feed("<activities/>", &url).is_none());
        assert!(parse_feed("{\"activities\": []}", &url).is_none());
        assert_eq!(parse_feed("[]", &url), Some(vec![]));
    }

    #[test]
    fn test_undecodable_activity_is_skipped() {
        let url = Url::parse("https://tracker.example/projects/1/activities").unwrap();
        let body = r#"[
            {"id": 1, "event_type": "story_update", "occurred_at": "2023-11-14T22:13:20Z",
             "project_id": 1, "stories": [{"id": 15, "name": "a"}]},
            {"id": 2, "event_type": "story_update", "project_id": 1,
             "stories": [{"id": 15}]},
            {"id": "3", "event_type": "task_edit", "occurred_at": "2023-11-14T22:13:21Z",
             "project_id": 1, "stories": [{"id": 15, "tasks": [{"id": 4, "complete": true}]}]}
        ]"#;

        let activities = parse_feed(body, &url).unwrap();
        let ids: Vec<&str> = activities.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
