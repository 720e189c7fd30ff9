//! Data types exchanged with the blog API

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

/// The signed-in identity, as returned by `GET /users/me`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: i64,
    pub username: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// A single post in the article list
///
/// Missing fields default to empty strings. Extra fields the server sends
/// (such as its database id) are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

impl Article {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
        }
    }
}

/// Request body for `POST /articles`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewArticle {
    pub title: String,
    pub body: String,
}

impl From<NewArticle> for Article {
    fn from(new: NewArticle) -> Self {
        Self {
            title: new.title,
            body: new.body,
        }
    }
}

/// Request body for `POST /sign-in`
#[derive(Debug, Serialize)]
pub struct Credentials {
    pub username: String,
    #[serde(serialize_with = "serialize_secret")]
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: SecretString) -> Self {
        Self {
            username: username.into(),
            password,
        }
    }
}

/// Request body for `POST /users`
#[derive(Debug, Serialize)]
pub struct NewUser {
    pub username: String,
    pub email: Option<String>,
    #[serde(serialize_with = "serialize_secret")]
    pub password: SecretString,
}

impl NewUser {
    pub fn credentials(&self) -> Credentials {
        let password = SecretString::from(self.password.expose_secret().to_owned());
        Credentials::new(self.username.clone(), password)
    }
}

fn serialize_secret<S: Serializer>(
    secret: &SecretString,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

/// Body of a successful `POST /sign-in`
///
/// The back-end answers with a bare JSON string; an object carrying a
/// `token` field is accepted as well.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SignInResponse {
    Bare(String),
    Wrapped { token: String },
}

impl SignInResponse {
    pub fn into_token(self) -> String {
        match self {
            SignInResponse::Bare(token) => token,
            SignInResponse::Wrapped { token } => token,
        }
    }
}
