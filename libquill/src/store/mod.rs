//! Session and article store
//!
//! [`Store`] owns the article list and the signed-in session and exposes the
//! actions that change them. It is built with [`StoreBuilder`], whose
//! [`create`](StoreBuilder::create) runs the initialization hook once:
//!
//! 1. install the notify-on-error response interceptor
//! 2. restore a remembered session
//! 3. fetch the article list
//!
//! # Error reporting
//!
//! Every failure is reported to the user exactly once. Failed API responses
//! are reported by the interceptor; token storage failures are reported by
//! the action that hit them. `fetch_articles` and `post_article` also return
//! their error. `sign_in`, `sign_up` and `sign_out` never do: callers check
//! [`Store::is_authenticated`] afterwards.
//!
//! # Concurrency
//!
//! Actions take `&self`, so a store behind `Arc` can run several at once.
//! The state lock is only held for the instant of a read or a write, never
//! across a request, and concurrent actions interleave with the last write
//! winning.
//!
//! ```no_run
//! use std::sync::Arc;
//! use libquill::api::HttpApi;
//! use libquill::config::Config;
//! use libquill::session::open_token_store;
//! use libquill::store::StoreBuilder;
//!
//! # async fn example() -> libquill::Result<()> {
//! let config = Config::load()?;
//! let api = Arc::new(HttpApi::new(&config.api)?);
//! let tokens = open_token_store(&config.session)?;
//!
//! let store = StoreBuilder::new(api, tokens).create().await;
//! println!("{} articles", store.article_count());
//! # Ok(())
//! # }
//! ```

mod state;

pub use state::StoreState;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use secrecy::SecretString;

use crate::api::{ApiResult, ArticleApi, Interceptors, NotifyOnError};
use crate::error::{Result, StorageError};
use crate::events::{Event, EventBus, EventReceiver, Navigator, Notifier};
use crate::session::{TokenStore, JWT_KEY};
use crate::types::{Article, Credentials, NewArticle, NewUser, UserProfile};

/// Notification title for token storage failures
pub const STORAGE_FAILED_TITLE: &str = "Session storage failed";

/// Where the store redirects after a successful post or sign-in
pub const HOME_PATH: &str = "/";

/// Assembles a [`Store`] from its collaborators
///
/// Navigation and notifications default to the builder's [`EventBus`].
pub struct StoreBuilder {
    api: Arc<dyn ArticleApi>,
    tokens: Arc<dyn TokenStore>,
    events: EventBus,
    navigator: Option<Arc<dyn Navigator>>,
    notifier: Option<Arc<dyn Notifier>>,
}

impl StoreBuilder {
    pub fn new(api: Arc<dyn ArticleApi>, tokens: Arc<dyn TokenStore>) -> Self {
        Self {
            api,
            tokens,
            events: EventBus::default(),
            navigator: None,
            notifier: None,
        }
    }

    /// Use an existing bus, e.g. one a front-end already subscribed to
    pub fn event_bus(mut self, events: EventBus) -> Self {
        self.events = events;
        self
    }

    pub fn navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
        self.navigator = Some(navigator);
        self
    }

    pub fn notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Build the store and run its initialization hook
    ///
    /// Failures during session restore or the first fetch have already been
    /// reported to the user when this returns; they are only logged here.
    pub async fn create(self) -> Store {
        let bus: Arc<EventBus> = Arc::new(self.events.clone());
        let store = Store {
            api: self.api,
            tokens: self.tokens,
            navigator: self
                .navigator
                .unwrap_or_else(|| bus.clone() as Arc<dyn Navigator>),
            notifier: self
                .notifier
                .unwrap_or_else(|| bus.clone() as Arc<dyn Notifier>),
            events: self.events,
            interceptors: Interceptors::new(),
            state: RwLock::new(StoreState::default()),
            torn_down: AtomicBool::new(false),
        };

        store.after_create().await;
        store
    }
}

/// Application state container for articles and the current session
pub struct Store {
    api: Arc<dyn ArticleApi>,
    tokens: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    notifier: Arc<dyn Notifier>,
    events: EventBus,
    interceptors: Interceptors,
    state: RwLock<StoreState>,
    torn_down: AtomicBool,
}

impl Store {
    async fn after_create(&self) {
        self.interceptors
            .use_response(Arc::new(NotifyOnError::new(self.notifier.clone())));

        if let Err(e) = self.restore_session().await {
            tracing::info!(error = %e, "Session not restored");
        }

        if let Err(e) = self.fetch_articles().await {
            tracing::info!(error = %e, "Initial article fetch failed");
        }
    }

    /// Replace the article list with the server's current one
    ///
    /// # Errors
    ///
    /// Returns the network error after it has been reported. The article
    /// list is left as it was.
    pub async fn fetch_articles(&self) -> Result<()> {
        self.mutate(StoreState::begin_fetch);
        let token = self.token();
        let result = self
            .interceptors
            .run(self.api.list_articles(token.as_deref()).await);
        self.mutate(StoreState::end_fetch);

        let articles = result?;
        let count = articles.len();
        if self.mutate(|state| state.articles = articles) {
            tracing::debug!("Loaded {} articles", count);
            self.events.emit(Event::ArticlesLoaded { count });
        }
        Ok(())
    }

    /// Create an article, refresh the list, then go home
    ///
    /// Title and body are sent as given; empty strings are not rejected.
    ///
    /// # Errors
    ///
    /// Returns the network error of the create or the follow-up fetch after
    /// it has been reported. Nothing is rolled back.
    pub async fn post_article(&self, title: &str, body: &str) -> Result<()> {
        let article = NewArticle {
            title: title.to_string(),
            body: body.to_string(),
        };
        let token = self.token();

        self.interceptors
            .run(self.api.create_article(token.as_deref(), &article).await)?;
        tracing::info!("Posted article {:?}", article.title);

        self.fetch_articles().await?;
        self.go_home();
        Ok(())
    }

    /// Exchange credentials for a session
    ///
    /// With `remember` the token is persisted so a later
    /// [`restore_session`](Self::restore_session) can pick it up.
    pub async fn sign_in(&self, username: &str, password: SecretString, remember: bool) {
        let credentials = Credentials::new(username, password);
        self.authenticate(&credentials, remember).await;
    }

    /// Register an account, then sign in with it
    pub async fn sign_up(
        &self,
        username: &str,
        email: Option<&str>,
        password: SecretString,
        remember: bool,
    ) {
        let new_user = NewUser {
            username: username.to_string(),
            email: email.map(str::to_string),
            password,
        };

        match self.interceptors.run(self.api.register(&new_user).await) {
            Ok(profile) => {
                tracing::info!("Registered user {}", profile.username);
                self.authenticate(&new_user.credentials(), remember).await;
            }
            Err(e) => tracing::debug!(error = %e, "Registration failed"),
        }
    }

    /// Forget the session, in memory and in token storage
    pub fn sign_out(&self) {
        self.mutate(StoreState::clear_session);

        if let Err(e) = self.tokens.remove(JWT_KEY) {
            self.report_storage_error(&e);
        }

        tracing::info!("Signed out");
        self.events.emit(Event::SignedOut);
    }

    /// Re-establish a session from a remembered token
    ///
    /// Returns `Ok(None)` when no token was remembered.
    ///
    /// # Errors
    ///
    /// Returns the storage or network error after it has been reported. A
    /// failed profile fetch leaves the session unset, and a token the server
    /// rejected with 401 is forgotten.
    pub async fn restore_session(&self) -> Result<Option<UserProfile>> {
        let token = match self.tokens.load(JWT_KEY) {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::debug!("No remembered session");
                return Ok(None);
            }
            Err(e) => {
                self.report_storage_error(&e);
                return Err(e.into());
            }
        };

        if !self.mutate(|state| state.token = Some(token.clone())) {
            return Ok(None);
        }

        match self.load_profile(&token).await {
            Ok(profile) => Ok(profile),
            Err(e) => {
                if e.is_unauthorized() {
                    tracing::info!("Remembered token rejected, discarding it");
                    if let Err(storage) = self.tokens.remove(JWT_KEY) {
                        self.report_storage_error(&storage);
                    }
                }
                Err(e.into())
            }
        }
    }

    /// Number of articles in the current list
    pub fn article_count(&self) -> usize {
        self.read().article_count()
    }

    /// Whether a user profile is loaded
    pub fn is_authenticated(&self) -> bool {
        self.read().is_authenticated()
    }

    pub fn articles(&self) -> Vec<Article> {
        self.read().articles.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read().user.clone()
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    pub fn snapshot(&self) -> StoreState {
        self.read().clone()
    }

    /// Subscribe to store events on the builder's bus
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Stop applying results of actions that are still in flight
    pub fn teardown(&self) {
        self.torn_down.store(true, Ordering::SeqCst);
        tracing::debug!("Store torn down");
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    /// Sign-in tail shared by `sign_in` and `sign_up`
    async fn authenticate(&self, credentials: &Credentials, remember: bool) -> bool {
        let token = match self.interceptors.run(self.api.sign_in(credentials).await) {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!(error = %e, "Sign-in rejected");
                return false;
            }
        };

        if remember {
            if let Err(e) = self.tokens.save(JWT_KEY, &token) {
                self.report_storage_error(&e);
                return false;
            }
        }

        if !self.mutate(|state| state.token = Some(token.clone())) {
            return false;
        }

        match self.load_profile(&token).await {
            Ok(Some(_)) => {
                self.go_home();
                true
            }
            Ok(None) => false,
            Err(_) => {
                if remember {
                    if let Err(e) = self.tokens.remove(JWT_KEY) {
                        self.report_storage_error(&e);
                    }
                }
                false
            }
        }
    }

    /// Fetch the profile for `token` and store it
    ///
    /// The result only lands while `token` is still the session token. If a
    /// sign-out or another sign-in replaced it meanwhile, a profile is
    /// discarded (`Ok(None)`) and a failure leaves the newer session alone.
    async fn load_profile(&self, token: &str) -> ApiResult<Option<UserProfile>> {
        match self.interceptors.run(self.api.current_user(token).await) {
            Ok(profile) => {
                let stored = profile.clone();
                if !self.mutate_if_current(token, |state| state.user = Some(stored)) {
                    tracing::debug!("Session changed during profile fetch, discarding profile");
                    return Ok(None);
                }
                tracing::info!("Signed in as {}", profile.username);
                self.events.emit(Event::SignedIn {
                    username: profile.username.clone(),
                });
                Ok(Some(profile))
            }
            Err(e) => {
                self.mutate_if_current(token, StoreState::clear_session);
                Err(e)
            }
        }
    }

    fn go_home(&self) {
        if !self.is_torn_down() {
            self.navigator.navigate(HOME_PATH);
        }
    }

    fn report_storage_error(&self, error: &StorageError) {
        tracing::warn!(error = %error, "Token storage failed");
        self.notifier
            .notify_error(STORAGE_FAILED_TITLE, &error.to_string());
    }

    /// Apply a state change unless the store has been torn down
    fn mutate(&self, change: impl FnOnce(&mut StoreState)) -> bool {
        if self.is_torn_down() {
            tracing::debug!("Store torn down, dropping state update");
            return false;
        }
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        change(&mut state);
        true
    }

    /// Apply a state change only while `token` is the session token
    ///
    /// The check and the change happen under one write lock.
    fn mutate_if_current(&self, token: &str, change: impl FnOnce(&mut StoreState)) -> bool {
        let mut applied = false;
        self.mutate(|state| {
            if state.token.as_deref() == Some(token) {
                change(state);
                applied = true;
            }
        });
        applied
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::Endpoint;
    use crate::api::MockApi;
    use crate::error::NetworkError;
    use crate::session::MemoryTokenStore;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Default)]
    struct Recorder {
        paths: Mutex<Vec<String>>,
        errors: Mutex<Vec<(String, String)>>,
    }

    impl Navigator for Recorder {
        fn navigate(&self, path: &str) {
            self.paths.lock().unwrap().push(path.to_string());
        }
    }

    impl Notifier for Recorder {
        fn notify_error(&self, title: &str, description: &str) {
            self.errors
                .lock()
                .unwrap()
                .push((title.to_string(), description.to_string()));
        }
    }

    fn password(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    async fn store_with(api: &MockApi, tokens: &MemoryTokenStore) -> (Store, Arc<Recorder>) {
        let recorder = Arc::new(Recorder::default());
        let store = StoreBuilder::new(Arc::new(api.clone()), Arc::new(tokens.clone()))
            .navigator(recorder.clone())
            .notifier(recorder.clone())
            .create()
            .await;
        (store, recorder)
    }

    #[tokio::test]
    async fn test_create_restores_then_fetches() {
        let api = MockApi::new()
            .with_user("alice", "pw", None)
            .with_articles(vec![Article::new("a", "1"), Article::new("b", "2")]);
        let tokens = MemoryTokenStore::new();

        let (store, recorder) = store_with(&api, &tokens).await;

        assert_eq!(store.article_count(), 2);
        assert!(!store.is_authenticated());
        assert_eq!(api.call_count(Endpoint::ListArticles), 1);
        assert_eq!(api.call_count(Endpoint::CurrentUser), 0);
        assert!(recorder.errors.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_sets_session_and_navigates() {
        let api = MockApi::new().with_user("alice", "pw", Some("alice@example.com"));
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;

        store.sign_in("alice", password("pw"), false).await;

        assert!(store.is_authenticated());
        assert_eq!(store.user().unwrap().username, "alice");
        assert!(store.token().is_some());
        assert_eq!(api.last_token(Endpoint::CurrentUser), store.token());
        assert_eq!(*recorder.paths.lock().unwrap(), vec!["/".to_string()]);
        assert_eq!(tokens.load(JWT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_sign_in_profile_failure_rolls_back() {
        let api = MockApi::new().with_user("alice", "pw", None);
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;
        api.fail(
            Endpoint::CurrentUser,
            NetworkError::Transport("connection reset".to_string()),
        );

        store.sign_in("alice", password("pw"), true).await;

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(tokens.load(JWT_KEY).unwrap(), None);
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
        assert!(recorder.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_in_storage_failure_reported_once() {
        let api = MockApi::new().with_user("alice", "pw", None);
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;
        tokens.set_unavailable(true);

        store.sign_in("alice", password("pw"), true).await;

        assert!(!store.is_authenticated());
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, STORAGE_FAILED_TITLE);
    }

    #[tokio::test]
    async fn test_restore_with_rejected_token_discards_it() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        tokens.save(JWT_KEY, "expired").unwrap();

        let (store, recorder) = store_with(&api, &tokens).await;

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(tokens.load(JWT_KEY).unwrap(), None);
        assert_eq!(recorder.errors.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_restore_keeps_token_on_transport_failure() {
        let api = MockApi::new();
        api.fail(
            Endpoint::CurrentUser,
            NetworkError::Transport("connection refused".to_string()),
        );
        let tokens = MemoryTokenStore::new();
        tokens.save(JWT_KEY, "maybe-valid").unwrap();

        let (store, _recorder) = store_with(&api, &tokens).await;

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(tokens.load(JWT_KEY).unwrap(), Some("maybe-valid".to_string()));
    }

    #[tokio::test]
    async fn test_loading_flag_during_fetch() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        let (store, _recorder) = store_with(&api, &tokens).await;
        let store = Arc::new(store);
        assert!(!store.is_loading());

        api.set_delay(Endpoint::ListArticles, Duration::from_millis(200));
        let handle = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_articles().await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_loading());

        handle.await.unwrap().unwrap();
        assert!(!store.is_loading());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_loading_stays_set_while_overlapping_fetch_runs() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        let (store, _recorder) = store_with(&api, &tokens).await;
        let store = Arc::new(store);
        api.set_delay(Endpoint::ListArticles, Duration::from_millis(200));

        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_articles().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_articles().await })
        };

        first.await.unwrap().unwrap();
        assert!(store.is_loading());

        second.await.unwrap().unwrap();
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_sign_out_during_profile_fetch_wins() {
        let api = MockApi::new().with_user("alice", "pw", None);
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;
        let store = Arc::new(store);
        api.set_delay(Endpoint::CurrentUser, Duration::from_millis(200));

        let handle = {
            let store = store.clone();
            tokio::spawn(async move { store.sign_in("alice", password("pw"), false).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sign_out();
        handle.await.unwrap();

        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(store.user(), None);
        assert!(recorder.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_out_during_restore_wins() {
        let api = MockApi::new().with_user("alice", "pw", None);
        let tokens = MemoryTokenStore::new();
        let (store, _recorder) = store_with(&api, &tokens).await;
        let store = Arc::new(store);

        let token = api.sign_in(&Credentials::new("alice", password("pw"))).await.unwrap();
        tokens.save(JWT_KEY, &token).unwrap();
        api.set_delay(Endpoint::CurrentUser, Duration::from_millis(200));

        let handle = {
            let store = store.clone();
            tokio::spawn(async move { store.restore_session().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.sign_out();

        assert_eq!(handle.await.unwrap().unwrap(), None);
        assert!(!store.is_authenticated());
        assert_eq!(store.token(), None);
        assert_eq!(tokens.load(JWT_KEY).unwrap(), None);
    }

    #[tokio::test]
    async fn test_loading_reset_on_failure() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        let (store, _recorder) = store_with(&api, &tokens).await;
        api.fail(
            Endpoint::ListArticles,
            NetworkError::Transport("timed out".to_string()),
        );

        assert!(store.fetch_articles().await.is_err());
        assert!(!store.is_loading());
    }

    #[tokio::test]
    async fn test_teardown_drops_late_results() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;
        let store = Arc::new(store);

        api.set_articles(vec![Article::new("late", "")]);
        api.set_delay(Endpoint::ListArticles, Duration::from_millis(100));
        let handle = {
            let store = store.clone();
            tokio::spawn(async move { store.fetch_articles().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.teardown();
        handle.await.unwrap().unwrap();

        assert!(store.is_torn_down());
        assert_eq!(store.article_count(), 0);
        assert!(recorder.paths.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sign_up_then_signed_in() {
        let api = MockApi::new();
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;

        store
            .sign_up("dana", Some("dana@example.com"), password("pw"), true)
            .await;

        assert!(store.is_authenticated());
        assert_eq!(store.user().unwrap().email.as_deref(), Some("dana@example.com"));
        assert!(tokens.load(JWT_KEY).unwrap().is_some());
        assert_eq!(*recorder.paths.lock().unwrap(), vec!["/".to_string()]);
    }

    #[tokio::test]
    async fn test_sign_up_conflict_leaves_session_unset() {
        let api = MockApi::new().with_user("dana", "pw", None);
        let tokens = MemoryTokenStore::new();
        let (store, recorder) = store_with(&api, &tokens).await;

        store.sign_up("dana", None, password("other"), false).await;

        assert!(!store.is_authenticated());
        assert_eq!(api.call_count(Endpoint::SignIn), 0);
        let errors = recorder.errors.lock().unwrap();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].1.contains("Username is taken"));
    }

    #[tokio::test]
    async fn test_snapshot_matches_accessors() {
        let api = MockApi::new()
            .with_user("alice", "pw", None)
            .with_articles(vec![Article::new("t", "b")]);
        let tokens = MemoryTokenStore::new();
        let (store, _recorder) = store_with(&api, &tokens).await;
        store.sign_in("alice", password("pw"), false).await;

        let snapshot = store.snapshot();
        assert_eq!(snapshot.articles, store.articles());
        assert_eq!(snapshot.user, store.user());
        assert_eq!(snapshot.token, store.token());
        assert!(snapshot.is_authenticated());
    }
}
