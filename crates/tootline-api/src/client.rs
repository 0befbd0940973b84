//! The live Mastodon client: [`TimelineSource`] over HTTPS with bearer auth.

use async_trait::async_trait;
use tootline_types::{FilterRule, Status, TimelineKind, UserScope};

use crate::paging::parse_link_header;
use crate::source::{PageQuery, TimelinePage, TimelineSource};
use crate::ApiError;

pub struct MastodonClient {
    base_url: String,
    token: String,
    http: reqwest::Client,
}

impl MastodonClient {
    /// `base_url` is the instance root, e.g. `https://mastodon.example`.
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self::with_client(base_url, token, reqwest::Client::new())
    }

    /// Same, but with a caller-configured client (timeouts, proxies).
    pub fn with_client(
        base_url: impl Into<String>,
        token: impl Into<String>,
        http: reqwest::Client,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            base_url,
            token: token.into(),
            http,
        }
    }

    async fn get(
        &self,
        url: String,
        query: &[(String, String)],
    ) -> Result<reqwest::Response, ApiError> {
        tracing::debug!(%url, "GET");
        let response = self
            .http
            .get(&url)
            .query(query)
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(ApiError::Network)?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, %url, "request rejected");
            return Err(ApiError::Http {
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

/// Endpoint path (relative to the instance root) and the query parameters a
/// feed kind implies, before paging parameters are added.
fn endpoint(kind: &TimelineKind) -> (String, Vec<(String, String)>) {
    match kind {
        TimelineKind::Home => ("/api/v1/timelines/home".to_string(), Vec::new()),
        TimelineKind::PublicFederated => ("/api/v1/timelines/public".to_string(), Vec::new()),
        TimelineKind::PublicLocal => (
            "/api/v1/timelines/public".to_string(),
            vec![("local".to_string(), "true".to_string())],
        ),
        TimelineKind::Tag(names) => {
            // First tag names the endpoint, the rest ride along as any[].
            let first = names.first().map(String::as_str).unwrap_or_default();
            let extra = names
                .iter()
                .skip(1)
                .map(|name| ("any[]".to_string(), name.clone()))
                .collect();
            (format!("/api/v1/timelines/tag/{first}"), extra)
        }
        TimelineKind::User { id, scope } => {
            let params = match scope {
                UserScope::Posts => vec![("exclude_replies".to_string(), "true".to_string())],
                UserScope::WithReplies => Vec::new(),
                UserScope::Pinned => vec![("pinned".to_string(), "true".to_string())],
            };
            (format!("/api/v1/accounts/{id}/statuses"), params)
        }
        TimelineKind::Favourites => ("/api/v1/favourites".to_string(), Vec::new()),
        TimelineKind::Bookmarks => ("/api/v1/bookmarks".to_string(), Vec::new()),
        TimelineKind::List { id, .. } => (format!("/api/v1/timelines/list/{id}"), Vec::new()),
    }
}

#[async_trait]
impl TimelineSource for MastodonClient {
    async fn fetch_timeline(
        &self,
        kind: &TimelineKind,
        query: PageQuery,
    ) -> Result<TimelinePage, ApiError> {
        let (path, mut params) = endpoint(kind);
        params.push(("limit".to_string(), query.limit.to_string()));
        if let Some(max_id) = &query.max_id {
            params.push(("max_id".to_string(), max_id.to_string()));
        }
        if let Some(since_id) = &query.since_id {
            params.push(("since_id".to_string(), since_id.to_string()));
        }

        let response = self.get(format!("{}{path}", self.base_url), &params).await?;
        let links = response
            .headers()
            .get("link")
            .and_then(|value| value.to_str().ok())
            .map(parse_link_header)
            .unwrap_or_default();
        let body = response.text().await.map_err(ApiError::Network)?;
        let statuses: Vec<Status> = serde_json::from_str(&body)?;

        tracing::debug!(
            kind = %kind,
            count = statuses.len(),
            has_next = links.next_max_id.is_some(),
            "page fetched"
        );
        Ok(TimelinePage {
            statuses,
            next_max_id: links.next_max_id,
            prev_min_id: links.prev_min_id,
        })
    }

    async fn fetch_filters(&self) -> Result<Vec<FilterRule>, ApiError> {
        let response = self
            .get(format!("{}/api/v1/filters", self.base_url), &[])
            .await?;
        let body = response.text().await.map_err(ApiError::Network)?;
        Ok(serde_json::from_str(&body)?)
    }
}

// ============================================================================
// Tests
// ============================================================================
