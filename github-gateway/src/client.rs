//! Shared HTTP plumbing for the GitHub gateway.
//!
//! The client is token-agnostic: every call takes the acting user's access
//! token, so one instance serves all users.

use reqwest::{Client, RequestBuilder, Response, header};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tracing::{debug, warn};

use crate::errors::{GitHubConfigError, GitHubError, GitHubProviderError, GitHubResult};
use crate::types::AuthenticatedUser;

const USER_AGENT: &str = "review-pipeline/0.1";
const API_VERSION: &str = "2022-11-28";
pub(crate) const ACCEPT_JSON: &str = "application/vnd.github+json";

/// Endpoints the gateway talks to.
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// REST base, e.g. "https://api.github.com".
    pub base_api: String,
    /// GraphQL endpoint, e.g. "https://api.github.com/graphql".
    pub graphql_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            base_api: "https://api.github.com".into(),
            graphql_url: "https://api.github.com/graphql".into(),
        }
    }
}

/// GitHub HTTP client wrapper.
#[derive(Debug, Clone)]
pub struct GitHubClient {
    pub(crate) http: Client,
    pub(crate) base_api: String,
    graphql_url: String,
}

impl GitHubClient {
    /// Builds a client with a stable user agent so GitHub can identify the integration.
    pub fn new(cfg: GitHubConfig) -> GitHubResult<Self> {
        for url in [&cfg.base_api, &cfg.graphql_url] {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(GitHubConfigError::InvalidBaseUrl(url.clone()).into());
            }
        }
        debug!(base_api = %cfg.base_api, "creating GitHubClient");

        let http = Client::builder().user_agent(USER_AGENT).build()?;

        Ok(Self {
            http,
            base_api: cfg.base_api.trim_end_matches('/').to_string(),
            graphql_url: cfg.graphql_url,
        })
    }

    /// Starts an authenticated REST request.
    pub(crate) fn request(
        &self,
        method: reqwest::Method,
        url: &str,
        token: &str,
        accept: &str,
    ) -> GitHubResult<RequestBuilder> {
        let auth = header::HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| GitHubConfigError::InvalidToken)?;
        Ok(self
            .http
            .request(method, url)
            .header(header::AUTHORIZATION, auth)
            .header(header::ACCEPT, accept)
            .header("X-GitHub-Api-Version", API_VERSION))
    }

    /// Sends and classifies non-success statuses.
    pub(crate) async fn send(&self, req: RequestBuilder) -> GitHubResult<Response> {
        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }

        let headers = resp.headers();
        let retry_after = headers
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok());
        let rate_exhausted = headers
            .get("x-ratelimit-remaining")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.trim() == "0");

        let err = GitHubProviderError::from_status(status.as_u16(), retry_after, rate_exhausted);
        warn!(status = status.as_u16(), url = %resp.url(), error = %err, "GitHub request failed");
        Err(err.into())
    }

    /// Runs a GraphQL query and unwraps `data`.
    pub(crate) async fn graphql<V, T>(&self, token: &str, query: &str, variables: V) -> GitHubResult<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let req = self
            .request(reqwest::Method::POST, &self.graphql_url, token, "application/json")?
            .json(&GraphQlRequest { query, variables });
        let body: GraphQlResponse<T> = self.send(req).await?.json().await?;
        body.into_data()
    }

    /// `GET /user`
    pub async fn authenticated_user(&self, token: &str) -> GitHubResult<AuthenticatedUser> {
        let url = format!("{}/user", self.base_api);
        debug!("GitHub authenticated_user: {}", url);
        let req = self.request(reqwest::Method::GET, &url, token, ACCEPT_JSON)?;
        Ok(self.send(req).await?.json().await?)
    }

    pub(crate) fn repo_url(&self, owner: &str, repo: &str) -> GitHubResult<String> {
        Ok(format!(
            "{}/repos/{}/{}",
            self.base_api,
            path_segment(owner)?,
            path_segment(repo)?
        ))
    }
}

/// Percent-encodes a single owner/repo segment after validating it.
pub(crate) fn path_segment(raw: &str) -> GitHubResult<String> {
    let s = raw.trim();
    if s.is_empty() || s.contains('/') {
        return Err(GitHubError::Validation(format!(
            "invalid repository path segment '{raw}'"
        )));
    }
    Ok(urlencoding::encode(s).into_owned())
}

/// Percent-encodes a repository-relative file path, keeping the separators.
pub(crate) fn encode_file_path(path: &str) -> String {
    path.split('/')
        .map(|seg| urlencoding::encode(seg).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Serialize)]
struct GraphQlRequest<'a, V> {
    query: &'a str,
    variables: V,
}

#[derive(Deserialize)]
struct GraphQlResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Deserialize)]
struct GraphQlError {
    message: String,
    #[serde(default, rename = "type")]
    kind: Option<String>,
}

impl<T> GraphQlResponse<T> {
    fn into_data(self) -> GitHubResult<T> {
        if let Some(first) = self.errors.first() {
            if first.kind.as_deref() == Some("NOT_FOUND") {
                return Err(GitHubProviderError::NotFound.into());
            }
            let joined = self
                .errors
                .iter()
                .map(|e| e.message.as_str())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(GitHubProviderError::InvalidResponse(joined).into());
        }
        self.data.ok_or_else(|| {
            GitHubProviderError::InvalidResponse("graphql response without data".into()).into()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segments_are_validated_and_encoded() {
        assert_eq!(path_segment("acme").unwrap(), "acme");
        assert_eq!(path_segment("my repo").unwrap(), "my%20repo");
        assert!(path_segment("").is_err());
        assert!(path_segment("acme/widgets").is_err());
        assert_eq!(encode_file_path("src/a b/lib.rs"), "src/a%20b/lib.rs");
    }

    #[test]
    fn graphql_errors_win_over_data() {
        let raw = r#"{"data":null,"errors":[{"type":"NOT_FOUND","message":"Could not resolve to a User"}]}"#;
        let parsed: GraphQlResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert!(matches!(
            parsed.into_data(),
            Err(GitHubError::Provider(GitHubProviderError::NotFound))
        ));

        let raw = r#"{"data":{"viewer":{"login":"octo"}}}"#;
        let parsed: GraphQlResponse<serde_json::Value> = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.into_data().unwrap()["viewer"]["login"], "octo");
    }

    #[test]
    fn rejects_non_http_base() {
        let cfg = GitHubConfig {
            base_api: "api.github.com".into(),
            ..GitHubConfig::default()
        };
        assert!(matches!(
            GitHubClient::new(cfg),
            Err(GitHubError::Config(GitHubConfigError::InvalidBaseUrl(_)))
        ));
    }
}
