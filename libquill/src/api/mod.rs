//! Blog API abstraction and implementations
//!
//! [`ArticleApi`] is the seam between the store and the remote server. The
//! bearer token is an explicit argument on every authenticated call; no
//! implementation keeps a hidden "current token" of its own.
//!
//! ```no_run
//! use libquill::api::{ArticleApi, HttpApi};
//! use libquill::config::ApiConfig;
//!
//! # async fn example() -> libquill::Result<()> {
//! let api = HttpApi::new(&ApiConfig::default())?;
//! let articles = api.list_articles(None).await?;
//! println!("{} articles", articles.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;

use crate::error::NetworkError;
use crate::types::{Article, Credentials, NewArticle, NewUser, UserProfile};

pub mod http;
pub mod interceptor;

// Available outside tests so integration tests and demos can drive a store offline
pub mod mock;

pub use http::HttpApi;
pub use interceptor::{Interceptors, NotifyOnError, ResponseInterceptor};
pub use mock::MockApi;

pub type ApiResult<T> = std::result::Result<T, NetworkError>;

/// Requests the store issues against the blog back-end
#[async_trait]
pub trait ArticleApi: Send + Sync {
    /// `GET /articles`
    async fn list_articles(&self, token: Option<&str>) -> ApiResult<Vec<Article>>;

    /// `POST /articles`
    async fn create_article(&self, token: Option<&str>, article: &NewArticle) -> ApiResult<()>;

    /// `POST /sign-in`, returning the opaque bearer token
    async fn sign_in(&self, credentials: &Credentials) -> ApiResult<String>;

    /// `GET /users/me`
    async fn current_user(&self, token: &str) -> ApiResult<UserProfile>;

    /// `POST /users`
    async fn register(&self, user: &NewUser) -> ApiResult<UserProfile>;
}

/// Value of the `Authorization` header for a token
pub fn bearer(token: &str) -> String {
    format!("bearer {}", token)
}
