//! Plain state held by the store

use serde::Serialize;

use crate::types::{Article, UserProfile};

/// Everything the store knows at one point in time
///
/// `token` and `user` together form the session. The token may be present
/// without a user while the profile fetch is in flight; a user is never
/// present without a token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StoreState {
    pub articles: Vec<Article>,
    #[serde(skip_serializing)]
    pub token: Option<String>,
    pub user: Option<UserProfile>,
    pub loading: bool,
    /// Fetches still awaiting a response; `loading` mirrors `> 0`
    #[serde(skip)]
    pub(crate) fetches_in_flight: usize,
}

impl StoreState {
    pub fn article_count(&self) -> usize {
        self.articles.len()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub(crate) fn begin_fetch(&mut self) {
        self.fetches_in_flight += 1;
        self.loading = true;
    }

    pub(crate) fn end_fetch(&mut self) {
        self.fetches_in_flight = self.fetches_in_flight.saturating_sub(1);
        self.loading = self.fetches_in_flight > 0;
    }

    pub(crate) fn clear_session(&mut self) {
        self.token = None;
        self.user = None;
    }
}
