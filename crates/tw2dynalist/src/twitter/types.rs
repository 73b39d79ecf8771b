//! Twitter data types.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Username used in URLs when the author was not expanded.
pub const UNKNOWN_USERNAME: &str = "user";

/// A bookmarked tweet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    /// Unique tweet ID.
    pub id: String,
    /// Tweet text content.
    pub text: String,
    /// Link to the tweet.
    pub url: String,
    /// Author handle (without @).
    pub author: String,
}

impl Bookmark {
    /// Create a bookmark, deriving its URL from the author handle.
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, author: impl Into<String>) -> Self {
        let id = id.into();
        let author = author.into();
        Self {
            url: tweet_url(&author, &id),
            id,
            text: text.into(),
            author,
        }
    }
}

/// `https://twitter.com/<username>/status/<id>`
#[must_use]
pub fn tweet_url(username: &str, id: &str) -> String {
    format!("https://twitter.com/{username}/status/{id}")
}

// =============================================================================
// Twitter API v2 wire types
// =============================================================================

/// `GET /2/users/:id/bookmarks` response.
#[derive(Debug, Default, Deserialize)]
pub(crate) struct BookmarksResponse {
    #[serde(default)]
    pub data: Option<Vec<ApiTweet>>,
    #[serde(default)]
    pub includes: Option<Includes>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiTweet {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub author_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Includes {
    #[serde(default)]
    pub users: Vec<ApiUser>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiUser {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// `GET /2/users/by/username/:username` response.
#[derive(Debug, Deserialize)]
pub(crate) struct UserLookupResponse {
    #[serde(default)]
    pub data: Option<ApiUser>,
    #[serde(default)]
    pub errors: Vec<ApiProblem>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiProblem {
    #[serde(default)]
    pub detail: String,
}

impl BookmarksResponse {
    /// Resolve authors from `includes` and build bookmarks.
    pub fn into_bookmarks(self) -> Vec<Bookmark> {
        let authors: HashMap<String, String> = self
            .includes
            .unwrap_or_default()
            .users
            .into_iter()
            .map(|user| (user.id, user.username))
            .collect();

        self.data
            .unwrap_or_default()
            .into_iter()
            .map(|tweet| {
                let author = tweet
                    .author_id
                    .as_ref()
                    .and_then(|id| authors.get(id))
                    .filter(|name| !name.is_empty())
                    .map_or(UNKNOWN_USERNAME, String::as_str);
                Bookmark::new(tweet.id, tweet.text, author)
            })
            .collect()
    }
}
