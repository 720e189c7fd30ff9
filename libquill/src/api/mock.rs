//! In-process blog server for tests
//!
//! `MockApi` behaves like the real back-end: sign-in issues tokens, article
//! creation requires a valid token, and a created article shows up in the
//! next listing (newest first). Failures and latency can be injected per
//! endpoint, and every call is counted.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use tokio::time::sleep;

use super::{ApiResult, ArticleApi};
use crate::error::NetworkError;
use crate::types::{Article, Credentials, NewArticle, NewUser, UserProfile};

/// Endpoints of the blog API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    ListArticles,
    CreateArticle,
    SignIn,
    CurrentUser,
    Register,
}

impl Endpoint {
    pub fn label(&self) -> &'static str {
        match self {
            Endpoint::ListArticles => "GET /articles",
            Endpoint::CreateArticle => "POST /articles",
            Endpoint::SignIn => "POST /sign-in",
            Endpoint::CurrentUser => "GET /users/me",
            Endpoint::Register => "POST /users",
        }
    }

    /// A non-2xx error for this endpoint with a JSON `detail` body
    pub fn status_error(&self, status: u16, detail: &str) -> NetworkError {
        NetworkError::Status {
            endpoint: self.label().to_string(),
            status,
            body: Some(serde_json::json!({ "detail": detail }).to_string()),
        }
    }
}

struct MockUser {
    profile: UserProfile,
    password: String,
}

#[derive(Default)]
struct MockState {
    articles: Vec<Article>,
    users: HashMap<String, MockUser>,
    tokens: HashMap<String, String>,
    next_user_id: i64,
    issued: usize,
    failures: HashMap<Endpoint, NetworkError>,
    delays: HashMap<Endpoint, Duration>,
    calls: HashMap<Endpoint, usize>,
    last_tokens: HashMap<Endpoint, Option<String>>,
}

/// Mock blog back-end
///
/// Clones share state, so a test can keep a handle while the store owns
/// another.
#[derive(Clone, Default)]
pub struct MockApi {
    state: Arc<Mutex<MockState>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an account the mock will accept at sign-in
    pub fn with_user(self, username: &str, password: &str, email: Option<&str>) -> Self {
        {
            let mut state = self.lock();
            state.next_user_id += 1;
            let profile = UserProfile {
                id: state.next_user_id,
                username: username.to_string(),
                email: email.map(str::to_string),
            };
            state.users.insert(
                username.to_string(),
                MockUser {
                    profile,
                    password: password.to_string(),
                },
            );
        }
        self
    }

    pub fn with_articles(self, articles: Vec<Article>) -> Self {
        self.set_articles(articles);
        self
    }

    /// Replace what the server will return from `GET /articles`
    pub fn set_articles(&self, articles: Vec<Article>) {
        self.lock().articles = articles;
    }

    pub fn articles(&self) -> Vec<Article> {
        self.lock().articles.clone()
    }

    /// Make every call to `endpoint` fail with `error` until cleared
    pub fn fail(&self, endpoint: Endpoint, error: NetworkError) {
        self.lock().failures.insert(endpoint, error);
    }

    pub fn clear_failure(&self, endpoint: Endpoint) {
        self.lock().failures.remove(&endpoint);
    }

    /// Delay responses from `endpoint`
    pub fn set_delay(&self, endpoint: Endpoint, delay: Duration) {
        self.lock().delays.insert(endpoint, delay);
    }

    /// Forget every issued token, as if they all expired
    pub fn revoke_tokens(&self) {
        self.lock().tokens.clear();
    }

    pub fn call_count(&self, endpoint: Endpoint) -> usize {
        self.lock().calls.get(&endpoint).copied().unwrap_or(0)
    }

    /// Bearer token attached to the most recent call to `endpoint`
    pub fn last_token(&self, endpoint: Endpoint) -> Option<String> {
        self.lock().last_tokens.get(&endpoint).cloned().flatten()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call, wait out any delay, then check for injected failure
    async fn enter(&self, endpoint: Endpoint, token: Option<&str>) -> ApiResult<()> {
        let delay = {
            let mut state = self.lock();
            *state.calls.entry(endpoint).or_insert(0) += 1;
            state
                .last_tokens
                .insert(endpoint, token.map(str::to_string));
            state.delays.get(&endpoint).copied()
        };

        if let Some(delay) = delay {
            sleep(delay).await;
        }

        match self.lock().failures.get(&endpoint) {
            Some(error) => Err(error.clone()),
            None => Ok(()),
        }
    }

    fn user_for_token(state: &MockState, token: Option<&str>) -> Option<UserProfile> {
        let username = state.tokens.get(token?)?;
        state.users.get(username).map(|u| u.profile.clone())
    }
}

#[async_trait]
impl ArticleApi for MockApi {
    async fn list_articles(&self, token: Option<&str>) -> ApiResult<Vec<Article>> {
        self.enter(Endpoint::ListArticles, token).await?;
        Ok(self.lock().articles.clone())
    }

    async fn create_article(&self, token: Option<&str>, article: &NewArticle) -> ApiResult<()> {
        self.enter(Endpoint::CreateArticle, token).await?;

        let mut state = self.lock();
        if Self::user_for_token(&state, token).is_none() {
            return Err(Endpoint::CreateArticle.status_error(401, "Not authenticated"));
        }
        state.articles.insert(0, Article::from(article.clone()));
        Ok(())
    }

    async fn sign_in(&self, credentials: &Credentials) -> ApiResult<String> {
        self.enter(Endpoint::SignIn, None).await?;

        let mut state = self.lock();
        let accepted = state
            .users
            .get(&credentials.username)
            .map(|u| u.password == credentials.password.expose_secret())
            .unwrap_or(false);

        if !accepted {
            return Err(Endpoint::SignIn.status_error(401, "Incorrect username or password"));
        }

        state.issued += 1;
        let token = format!("token-{}-{}", credentials.username, state.issued);
        state
            .tokens
            .insert(token.clone(), credentials.username.clone());
        Ok(token)
    }

    async fn current_user(&self, token: &str) -> ApiResult<UserProfile> {
        self.enter(Endpoint::CurrentUser, Some(token)).await?;

        let state = self.lock();
        Self::user_for_token(&state, Some(token))
            .ok_or_else(|| Endpoint::CurrentUser.status_error(401, "Could not validate credentials"))
    }

    async fn register(&self, user: &NewUser) -> ApiResult<UserProfile> {
        self.enter(Endpoint::Register, None).await?;

        let mut state = self.lock();
        if state.users.contains_key(&user.username) {
            return Err(Endpoint::Register.status_error(409, "Username is taken"));
        }
        if let Some(email) = &user.email {
            let taken = state
                .users
                .values()
                .any(|u| u.profile.email.as_deref() == Some(email.as_str()));
            if taken {
                return Err(Endpoint::Register.status_error(409, "Email is taken"));
            }
        }

        state.next_user_id += 1;
        let profile = UserProfile {
            id: state.next_user_id,
            username: user.username.clone(),
            email: user.email.clone(),
        };
        state.users.insert(
            user.username.clone(),
            MockUser {
                profile: profile.clone(),
                password: user.password.expose_secret().to_string(),
            },
        );
        Ok(profile)
    }
}
