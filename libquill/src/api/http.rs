//! HTTP implementation of [`ArticleApi`] over `reqwest`

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use url::Url;

use super::{bearer, ApiResult, ArticleApi};
use crate::config::ApiConfig;
use crate::error::{NetworkError, QuillError, Result};
use crate::types::{Article, Credentials, NewArticle, NewUser, SignInResponse, UserProfile};

/// Blog API client
#[derive(Clone, Debug)]
pub struct HttpApi {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpApi {
    /// Create a client from the API configuration
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unusable base URL, or a network
    /// error if the TLS backend cannot be initialized.
    pub fn new(config: &ApiConfig) -> Result<Self> {
        let base_url = config.parsed_base_url()?;
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| QuillError::Network(NetworkError::from(e)))?;

        Ok(Self {
            http_client,
            base_url,
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Join an API path onto the base URL, keeping any base path prefix
    fn endpoint_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    fn request(&self, method: Method, path: &str, token: Option<&str>) -> RequestBuilder {
        let builder = self
            .http_client
            .request(method, self.endpoint_url(path))
            .header("Accept", "application/json");

        match token {
            Some(token) => builder.header("Authorization", bearer(token)),
            None => builder,
        }
    }

    async fn send(&self, endpoint: &str, builder: RequestBuilder) -> ApiResult<Response> {
        tracing::debug!(endpoint, "Sending request");

        let response = builder.send().await.map_err(NetworkError::from)?;
        let status = response.status();

        if !status.is_success() {
            let body = response.text().await.ok().filter(|b| !b.is_empty());
            tracing::warn!(endpoint, status = status.as_u16(), "Request rejected");
            return Err(NetworkError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(endpoint: &str, response: Response) -> ApiResult<T> {
        let text = response.text().await.map_err(NetworkError::from)?;
        serde_json::from_str(&text)
            .map_err(|e| NetworkError::Decode(format!("{}: {}", endpoint, e)))
    }
}

#[async_trait]
impl ArticleApi for HttpApi {
    async fn list_articles(&self, token: Option<&str>) -> ApiResult<Vec<Article>> {
        let endpoint = "GET /articles";
        let response = self
            .send(endpoint, self.request(Method::GET, "articles", token))
            .await?;
        let articles: Vec<Article> = Self::decode(endpoint, response).await?;
        tracing::debug!("Fetched {} articles", articles.len());
        Ok(articles)
    }

    async fn create_article(&self, token: Option<&str>, article: &NewArticle) -> ApiResult<()> {
        let endpoint = "POST /articles";
        let builder = self.request(Method::POST, "articles", token).json(article);
        self.send(endpoint, builder).await?;
        Ok(())
    }

    async fn sign_in(&self, credentials: &Credentials) -> ApiResult<String> {
        let endpoint = "POST /sign-in";
        let builder = self.request(Method::POST, "sign-in", None).json(credentials);
        let response = self.send(endpoint, builder).await?;
        let body: SignInResponse = Self::decode(endpoint, response).await?;
        Ok(body.into_token())
    }

    async fn current_user(&self, token: &str) -> ApiResult<UserProfile> {
        let endpoint = "GET /users/me";
        let response = self
            .send(endpoint, self.request(Method::GET, "users/me", Some(token)))
            .await?;
        Self::decode(endpoint, response).await
    }

    async fn register(&self, user: &NewUser) -> ApiResult<UserProfile> {
        let endpoint = "POST /users";
        let builder = self.request(Method::POST, "users", None).json(user);
        let response = self.send(endpoint, builder).await?;
        Self::decode(endpoint, response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api(base_url: &str) -> HttpApi {
        HttpApi::new(&ApiConfig {
            base_url: base_url.to_string(),
            timeout_secs: 5,
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_url() {
        let api = api("http://localhost:8000");
        assert_eq!(api.endpoint_url("articles"), "http://localhost:8000/articles");
        assert_eq!(api.endpoint_url("/users/me"), "http://localhost:8000/users/me");
    }

    #[test]
    fn test_endpoint_url_keeps_base_path() {
        let api = api("https://example.com/api/");
        assert_eq!(api.endpoint_url("sign-in"), "https://example.com/api/sign-in");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        let result = HttpApi::new(&ApiConfig {
            base_url: "not a url".to_string(),
            timeout_secs: 5,
        });
        assert!(matches!(result, Err(QuillError::Config(_))));
    }

    #[test]
    fn test_request_attaches_bearer_token() {
        let api = api("http://localhost:8000");
        let request = api
            .request(Method::GET, "users/me", Some("tok"))
            .build()
            .unwrap();
        assert_eq!(
            request.headers().get("Authorization").unwrap(),
            "bearer tok"
        );
    }

    #[test]
    fn test_request_without_token_has_no_authorization() {
        let api = api("http://localhost:8000");
        let request = api.request(Method::GET, "articles", None).build().unwrap();
        assert!(request.headers().get("Authorization").is_none());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        // Port 9 (discard) is closed on CI machines
        let api = api("http://127.0.0.1:9");
        let err = api.list_articles(None).await.unwrap_err();
        assert!(matches!(err, NetworkError::Transport(_)));
        assert_eq!(err.body(), None);
    }
}
