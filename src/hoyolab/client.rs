use crate::error::ApiError;
use crate::hoyolab::mapping::RawPost;
use crate::models::{FeedItem, FeedItemCategory, FeedItemMeta, Game, Language};
use futures::StreamExt;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use url::Url;

pub const DEFAULT_BASE_URL: &str = "https://bbs-api-os.hoyolab.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

const POST_ENDPOINT: &str = "/community/post/wapi/getPostFull";
const LIST_ENDPOINT: &str = "/community/post/wapi/getNewsList";
const ORIGIN: &str = "https://www.hoyolab.com";
const LANGUAGE_HEADER: &str = "x-rpc-language";
const MAX_RESPONSE_SIZE: usize = 5 * 1024 * 1024; // 5MB

/// Errors raised while configuring a [`HoyolabNews`] client.
#[derive(Debug, Error)]
pub enum ClientBuildError {
    #[error("Invalid base URL: {0}")]
    InvalidBaseUrl(#[from] url::ParseError),
    /// Plain HTTP is only accepted for localhost (mock servers in tests)
    #[error("Insecure base URL: HTTPS required (except localhost for testing): {0}")]
    InsecureBaseUrl(String),
}

/// Client for the HoYoLAB community news API.
///
/// Game and language are fixed at construction and sent with every request.
/// The client holds no mutable state: it borrows the caller's
/// [`reqwest::Client`] for each call, never retries and never caches, so one
/// instance can serve any number of concurrent requests.
#[derive(Debug, Clone)]
pub struct HoyolabNews {
    game: Game,
    language: Language,
    base_url: String,
    timeout: Duration,
}

impl HoyolabNews {
    /// Creates a client for `game`, using the default language when `None`.
    pub fn new(game: Game, language: Option<Language>) -> Self {
        Self {
            game,
            language: language.unwrap_or_default(),
            base_url: DEFAULT_BASE_URL.to_owned(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Points the client at another API host.
    ///
    /// # Errors
    ///
    /// Returns [`ClientBuildError::InsecureBaseUrl`] for non-HTTPS URLs other
    /// than `localhost` / `127.0.0.1`.
    pub fn with_base_url(mut self, base_url: &str) -> Result<Self, ClientBuildError> {
        let parsed = Url::parse(base_url)?;

        if parsed.scheme() != "https" {
            let is_localhost = parsed.scheme() == "http"
                && matches!(parsed.host_str(), Some("127.0.0.1") | Some("localhost"));
            if !is_localhost {
                tracing::error!(base_url = %base_url, "Rejecting non-HTTPS base URL");
                return Err(ClientBuildError::InsecureBaseUrl(base_url.to_owned()));
            }
            tracing::warn!(base_url = %base_url, "Using non-HTTPS HoYoLAB base URL (localhost only)");
        }

        self.base_url = base_url.trim_end_matches('/').to_owned();
        Ok(self)
    }

    /// Sets the per-request timeout (connect, send and body read combined).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn game(&self) -> Game {
        self.game
    }

    pub fn language(&self) -> Language {
        self.language
    }

    /// Fetches the full record of one post.
    ///
    /// Returns the `data.post` object, which holds the `post`, `user`,
    /// `image_list` and `last_modify_time` fields.
    ///
    /// # Errors
    ///
    /// Any [`ApiError`] class except `Mapping`; see [`HoyolabNews::request`]
    /// for the check order. A response without `data.post` is
    /// [`ApiError::ResponseShape`].
    pub async fn get_post(
        &self,
        session: &reqwest::Client,
        post_id: u64,
    ) -> Result<RawPost, ApiError> {
        let url = self.endpoint_url(
            POST_ENDPOINT,
            &[
                ("post_id", post_id.to_string()),
                ("gids", self.game.gid().to_string()),
            ],
        )?;

        let mut response = self.request(session, &url).await?;
        match response
            .get_mut("data")
            .and_then(|data| data.get_mut("post"))
            .map(Value::take)
        {
            Some(post @ Value::Object(_)) => Ok(RawPost::new(post)),
            _ => Err(ApiError::shape(url.as_str(), "missing data.post object")),
        }
    }

    /// Fetches the newest post summaries of one category, in upstream order.
    ///
    /// # Errors
    ///
    /// Same classes as [`HoyolabNews::get_post`]; a response without a
    /// `data.list` array is [`ApiError::ResponseShape`].
    pub async fn get_news_list(
        &self,
        session: &reqwest::Client,
        category: FeedItemCategory,
        page_size: usize,
    ) -> Result<Vec<RawPost>, ApiError> {
        let url = self.endpoint_url(
            LIST_ENDPOINT,
            &[
                ("gids", self.game.gid().to_string()),
                ("page_size", page_size.to_string()),
                ("type", category.code().to_string()),
            ],
        )?;

        let mut response = self.request(session, &url).await?;
        match response
            .get_mut("data")
            .and_then(|data| data.get_mut("list"))
            .map(Value::take)
        {
            Some(Value::Array(list)) => Ok(list.into_iter().map(RawPost::new).collect()),
            _ => Err(ApiError::shape(url.as_str(), "missing data.list array")),
        }
    }

    /// Fetches change-detection metadata for the newest posts of a category.
    ///
    /// The result is sorted by `last_modified` descending (ties by id
    /// descending) and holds at most `page_size` entries, whatever order the
    /// API used.
    ///
    /// # Errors
    ///
    /// Errors of [`HoyolabNews::get_news_list`], plus [`ApiError::Mapping`] if
    /// a summary lacks its id or creation time.
    pub async fn get_latest_item_metas(
        &self,
        session: &reqwest::Client,
        category: FeedItemCategory,
        page_size: usize,
    ) -> Result<Vec<FeedItemMeta>, ApiError> {
        if page_size == 0 {
            return Ok(Vec::new());
        }

        let posts = self.get_news_list(session, category, page_size).await?;
        let metas = posts
            .iter()
            .map(RawPost::to_meta)
            .collect::<Result<Vec<_>, _>>()?;

        tracing::debug!(
            game = %self.game,
            category = %category,
            received = metas.len(),
            "Fetched latest item metas"
        );

        Ok(latest_first(metas, page_size))
    }

    /// Fetches one post and maps it into a [`FeedItem`].
    ///
    /// # Errors
    ///
    /// Errors of [`HoyolabNews::get_post`], plus [`ApiError::Mapping`] if a
    /// required field is missing or has the wrong type.
    pub async fn get_feed_item(
        &self,
        session: &reqwest::Client,
        post_id: u64,
    ) -> Result<FeedItem, ApiError> {
        let post = self.get_post(session, post_id).await?;
        post.to_feed_item()
    }

    fn endpoint_url(&self, path: &str, params: &[(&str, String)]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| ApiError::request(&self.base_url, e))?;
        url.query_pairs_mut()
            .extend_pairs(params.iter().map(|(key, value)| (*key, value.as_str())));
        Ok(url)
    }

    /// Performs one GET and validates the response envelope.
    ///
    /// Checks run in a fixed order so a failure is always reported as the
    /// earliest class that applies:
    ///
    /// 1. transport, timeout, body size, HTTP status → [`ApiError::Request`]
    /// 2. JSON decoding → [`ApiError::Decode`]
    /// 3. `retcode` and `data` present → [`ApiError::ResponseShape`]
    /// 4. `retcode == 0` → [`ApiError::Upstream`]
    ///
    /// Returns the whole decoded envelope.
    pub(crate) async fn request(
        &self,
        session: &reqwest::Client,
        url: &Url,
    ) -> Result<Value, ApiError> {
        tracing::debug!(url = %url, language = %self.language, "Requesting HoYoLAB endpoint");

        let bytes = tokio::time::timeout(self.timeout, self.fetch_bytes(session, url))
            .await
            .map_err(|_| {
                ApiError::request(
                    url.as_str(),
                    format!("timed out after {}s", self.timeout.as_secs_f32()),
                )
            })??;

        let response: Value =
            serde_json::from_slice(&bytes).map_err(|e| ApiError::decode(url.as_str(), e))?;

        let retcode = match (response.get("retcode"), response.get("data")) {
            (Some(retcode), Some(_)) => retcode
                .as_i64()
                .ok_or_else(|| ApiError::shape(url.as_str(), "retcode is not an integer"))?,
            _ => return Err(ApiError::shape(url.as_str(), "missing retcode or data")),
        };

        if retcode != 0 {
            let message = response
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned();
            tracing::debug!(url = %url, retcode, message = %message, "HoYoLAB API returned an error");
            return Err(ApiError::Upstream {
                code: retcode,
                message,
            });
        }

        Ok(response)
    }

    async fn fetch_bytes(&self, session: &reqwest::Client, url: &Url) -> Result<Vec<u8>, ApiError> {
        let response = session
            .get(url.clone())
            .header(LANGUAGE_HEADER, self.language.code())
            .header(reqwest::header::ORIGIN, ORIGIN)
            .send()
            .await
            .map_err(|e| ApiError::request(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::http(
                url.as_str(),
                status.as_u16(),
                format!("HTTP status {}", status.as_u16()),
            ));
        }

        read_limited_bytes(response, url, MAX_RESPONSE_SIZE).await
    }
}

/// Orders metas newest first (ties by id, highest first) and keeps at most `limit`.
fn latest_first(mut metas: Vec<FeedItemMeta>, limit: usize) -> Vec<FeedItemMeta> {
    metas.sort_by(|a, b| {
        b.last_modified
            .cmp(&a.last_modified)
            .then_with(|| b.id.cmp(&a.id))
    });
    metas.truncate(limit);
    metas
}

async fn read_limited_bytes(
    response: reqwest::Response,
    url: &Url,
    limit: usize,
) -> Result<Vec<u8>, ApiError> {
    let status = response.status().as_u16();

    // Fast path: check Content-Length header
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(ApiError::http(
                url.as_str(),
                status,
                format!("response too large (exceeds {limit} bytes)"),
            ));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| ApiError::request(url.as_str(), e))?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(ApiError::http(
                url.as_str(),
                status,
                format!("response too large (exceeds {limit} bytes)"),
            ));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use chrono::DateTime;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> HoyolabNews {
        HoyolabNews::new(Game::Genshin, None)
            .with_base_url(&server.uri())
            .unwrap()
    }

    fn ok_envelope(data: Value) -> Value {
        json!({ "retcode": 0, "message": "OK", "data": data })
    }

    fn meta(id: u64, secs: i64) -> FeedItemMeta {
        FeedItemMeta {
            id,
            last_modified: DateTime::from_timestamp(secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_default_construction() {
        let api = HoyolabNews::new(Game::StarRail, None);
        assert_eq!(api.game(), Game::StarRail);
        assert_eq!(api.language(), Language::English);
        assert_eq!(api.base_url, "https://bbs-api-os.hoyolab.com");
    }

    #[test]
    fn test_http_base_url_rejected() {
        let result = HoyolabNews::new(Game::Genshin, None).with_base_url("http://evil.com");
        assert!(matches!(result, Err(ClientBuildError::InsecureBaseUrl(_))));
    }

    #[test]
    fn test_localhost_base_url_allowed() {
        let result =
            HoyolabNews::new(Game::Genshin, None).with_base_url("http://127.0.0.1:8080");
        assert!(result.is_ok());
    }

    #[test]
    fn test_endpoint_url_carries_game_and_params() {
        let api = HoyolabNews::new(Game::Zenless, None);
        let url = api
            .endpoint_url(
                LIST_ENDPOINT,
                &[
                    ("gids", api.game().gid().to_string()),
                    ("page_size", "5".to_string()),
                ],
            )
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://bbs-api-os.hoyolab.com/community/post/wapi/getNewsList?gids=8&page_size=5"
        );
    }

    #[tokio::test]
    async fn test_request_http_500_is_request_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server);
        let url = Url::parse(&format!("{}/status/500", mock_server.uri())).unwrap();
        let err = api
            .request(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Request);
        assert!(err.to_string().contains("Could not request"));
        assert!(err.to_string().contains("/status/500"));
    }

    #[tokio::test]
    async fn test_request_status_decides_retryability() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("post_id", "404"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(query_param("post_id", "503"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server);
        let session = reqwest::Client::new();

        let not_found = api.get_post(&session, 404).await.unwrap_err();
        assert_eq!(not_found.kind(), ErrorKind::Request);
        assert_eq!(not_found.status(), Some(404));
        assert!(!not_found.is_retryable());

        let unavailable = api.get_post(&session, 503).await.unwrap_err();
        assert_eq!(unavailable.kind(), ErrorKind::Request);
        assert_eq!(unavailable.status(), Some(503));
        assert!(unavailable.is_retryable());
    }

    #[tokio::test]
    async fn test_oversized_body_is_not_retryable() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("x".repeat(64)))
            .mount(&mock_server)
            .await;

        let url = Url::parse(&mock_server.uri()).unwrap();
        let response = reqwest::Client::new().get(url.clone()).send().await.unwrap();
        let err = read_limited_bytes(response, &url, 16).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Request);
        assert!(err.to_string().contains("too large"));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_request_html_is_decode_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<!DOCTYPE html><html><body>hi</body></html>"),
            )
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server);
        let url = Url::parse(&format!("{}/html", mock_server.uri())).unwrap();
        let err = api
            .request(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Decode);
        assert!(err.to_string().contains("Could not decode"));
    }

    #[tokio::test]
    async fn test_request_foreign_json_is_shape_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({ "slideshow": { "title": "Sample" } })),
            )
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server);
        let url = Url::parse(&format!("{}/json", mock_server.uri())).unwrap();
        let err = api
            .request(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ResponseShape);
        assert!(err.to_string().contains("Unexpected response"));
    }

    #[tokio::test]
    async fn test_request_nonzero_retcode_is_upstream_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "retcode": -1,
                "message": "invalid request",
                "data": null
            })))
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server);
        let url = Url::parse(&format!("{}{LIST_ENDPOINT}", mock_server.uri())).unwrap();
        let err = api
            .request(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        match err {
            ApiError::Upstream { code, message } => {
                assert_eq!(code, -1);
                assert_eq!(message, "invalid request");
            }
            e => panic!("Expected Upstream error, got {:?}", e),
        }
    }

    #[tokio::test]
    async fn test_request_timeout_is_request_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(ok_envelope(json!({})))
                    .set_delay(Duration::from_secs(5)),
            )
            .mount(&mock_server)
            .await;

        let api = client_for(&mock_server).with_timeout(Duration::from_millis(100));
        let url = Url::parse(&mock_server.uri()).unwrap();
        let err = api
            .request(&reqwest::Client::new(), &url)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Request);
        assert!(err.to_string().contains("timed out"));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_post_sends_game_and_language() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(POST_ENDPOINT))
            .and(query_param("post_id", "7156359"))
            .and(query_param("gids", "2"))
            .and(header("x-rpc-language", "ja-jp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "post": {
                    "post": { "post_id": "7156359", "subject": "s" },
                    "last_modify_time": 0
                }
            }))))
            .expect(1)
            .mount(&mock_server)
            .await;

        let api = HoyolabNews::new(Game::Genshin, Some(Language::Japanese))
            .with_base_url(&mock_server.uri())
            .unwrap();
        let post = api
            .get_post(&reqwest::Client::new(), 7156359)
            .await
            .unwrap();

        assert_eq!(post.as_value()["post"]["post_id"], json!("7156359"));
    }

    #[tokio::test]
    async fn test_get_post_without_post_wrapper_is_shape_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(POST_ENDPOINT))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({}))))
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .get_post(&reqwest::Client::new(), 1)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseShape);
    }

    #[tokio::test]
    async fn test_get_news_list_preserves_upstream_order() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(LIST_ENDPOINT))
            .and(query_param("type", "3"))
            .and(query_param("page_size", "3"))
            .and(query_param("gids", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ok_envelope(json!({
                "list": [
                    { "post": { "post_id": "1", "created_at": 10 }, "last_modify_time": 0 },
                    { "post": { "post_id": "3", "created_at": 30 }, "last_modify_time": 0 },
                    { "post": { "post_id": "2", "created_at": 20 }, "last_modify_time": 0 }
                ]
            }))))
            .mount(&mock_server)
            .await;

        let list = client_for(&mock_server)
            .get_news_list(&reqwest::Client::new(), FeedItemCategory::Info, 3)
            .await
            .unwrap();

        let ids: Vec<_> = list
            .iter()
            .map(|post| post.as_value()["post"]["post_id"].clone())
            .collect();
        assert_eq!(ids, vec![json!("1"), json!("3"), json!("2")]);
    }

    #[tokio::test]
    async fn test_get_news_list_without_list_is_shape_error() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(ok_envelope(json!({ "list": "nope" }))),
            )
            .mount(&mock_server)
            .await;

        let err = client_for(&mock_server)
            .get_news_list(&reqwest::Client::new(), FeedItemCategory::Notices, 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResponseShape);
    }

    #[tokio::test]
    async fn test_zero_page_size_skips_request() {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&mock_server)
            .await;

        let metas = client_for(&mock_server)
            .get_latest_item_metas(&reqwest::Client::new(), FeedItemCategory::Events, 0)
            .await
            .unwrap();
        assert!(metas.is_empty());
    }

    #[test]
    fn test_latest_first_tie_breaks_on_id() {
        let metas = vec![meta(1, 100), meta(3, 100), meta(2, 200)];
        assert_eq!(
            latest_first(metas, 10),
            vec![meta(2, 200), meta(3, 100), meta(1, 100)]
        );
    }

    proptest! {
        #[test]
        fn prop_latest_first_sorted_and_bounded(
            raw in proptest::collection::vec((0u64..50, 0i64..1_000), 0..40),
            limit in 0usize..20,
        ) {
            let metas: Vec<_> = raw.iter().map(|&(id, secs)| meta(id, secs)).collect();
            let ordered = latest_first(metas, limit);

            prop_assert!(ordered.len() <= limit);
            prop_assert!(ordered.len() == raw.len().min(limit));
            for pair in ordered.windows(2) {
                let key_a = (pair[0].last_modified, pair[0].id);
                let key_b = (pair[1].last_modified, pair[1].id);
                prop_assert!(key_a >= key_b);
            }
        }
    }
}
