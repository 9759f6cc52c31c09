//! Thin wrappers over the storytelling endpoints.
//!
//! Every call goes through the [`RequestPipeline`](taleweave_session::RequestPipeline),
//! so it carries the session's credential and survives an expired access
//! token. Bodies are plain JSON; the backend owns their shape.
//!
//! List endpoints may be paginated. Their `results` array is returned when
//! present, the bare array otherwise.

use serde_json::{Value, json};
use taleweave_protocol::ProtocolError;

use crate::TaleweaveError;
use crate::client::Pipeline;

type Result<T> = std::result::Result<T, TaleweaveError>;

/// Pulls the items out of a list response.
pub(crate) fn unwrap_results(body: Value) -> Result<Vec<Value>> {
    match body {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(items)) => Ok(items),
            _ => Err(ProtocolError::InvalidMessage(
                "list response has no results array".into(),
            )
            .into()),
        },
        Value::Array(items) => Ok(items),
        other => Err(ProtocolError::InvalidMessage(format!(
            "expected a list, got {other}"
        ))
        .into()),
    }
}

async fn list(pipeline: &Pipeline, path: &str) -> Result<Vec<Value>> {
    unwrap_results(pipeline.get(path).await?)
}

// ---------------------------------------------------------------------------
// Stories
// ---------------------------------------------------------------------------

/// `/stories/` and everything hanging off a single story.
pub struct Stories<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> Stories<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    /// Lists stories. `query` is passed as-is (`search`, `genre`,
    /// `author`, `page`...).
    pub async fn list(&self, query: &[(&str, &str)]) -> Result<Vec<Value>> {
        let query: Vec<(String, String)> = query
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let body: Value = self.pipeline.get_with_query("/stories/", &query).await?;
        unwrap_results(body)
    }

    pub async fn get(&self, slug: &str) -> Result<Value> {
        Ok(self.pipeline.get(&format!("/stories/{slug}/")).await?)
    }

    pub async fn create(&self, story: &Value) -> Result<Value> {
        Ok(self.pipeline.post("/stories/", story).await?)
    }

    pub async fn update(&self, slug: &str, changes: &Value) -> Result<Value> {
        Ok(self
            .pipeline
            .patch(&format!("/stories/{slug}/"), changes)
            .await?)
    }

    pub async fn delete(&self, slug: &str) -> Result<()> {
        Ok(self.pipeline.delete(&format!("/stories/{slug}/")).await?)
    }

    pub async fn like(&self, slug: &str) -> Result<Value> {
        Ok(self
            .pipeline
            .post(&format!("/stories/{slug}/like/"), &json!({}))
            .await?)
    }

    pub async fn share(&self, slug: &str, platform: &str) -> Result<Value> {
        Ok(self
            .pipeline
            .post(
                &format!("/stories/{slug}/share/"),
                &json!({ "platform": platform }),
            )
            .await?)
    }

    pub async fn stats(&self, slug: &str) -> Result<Value> {
        Ok(self.pipeline.get(&format!("/stories/{slug}/stats/")).await?)
    }

    pub async fn shares(&self, slug: &str) -> Result<Vec<Value>> {
        list(self.pipeline, &format!("/stories/{slug}/shares/")).await
    }

    /// Stories written by `username`.
    pub async fn by_user(&self, username: &str) -> Result<Vec<Value>> {
        list(self.pipeline, &format!("/stories/user/{username}/")).await
    }
}

// ---------------------------------------------------------------------------
// Chapters, decision points, choices, votes
// ---------------------------------------------------------------------------

/// The chapters of one story.
pub struct Chapters<'a> {
    pipeline: &'a Pipeline,
    story: &'a str,
}

impl<'a> Chapters<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline, story: &'a str) -> Self {
        Self { pipeline, story }
    }

    fn path(&self) -> String {
        format!("/stories/{}/chapters/", self.story)
    }

    pub async fn list(&self) -> Result<Vec<Value>> {
        list(self.pipeline, &self.path()).await
    }

    pub async fn get(&self, chapter: u64) -> Result<Value> {
        Ok(self
            .pipeline
            .get(&format!("{}{chapter}/", self.path()))
            .await?)
    }

    pub async fn create(&self, chapter: &Value) -> Result<Value> {
        Ok(self.pipeline.post(&self.path(), chapter).await?)
    }

    pub async fn update(&self, chapter: u64, changes: &Value) -> Result<Value> {
        Ok(self
            .pipeline
            .patch(&format!("{}{chapter}/", self.path()), changes)
            .await?)
    }

    pub async fn delete(&self, chapter: u64) -> Result<()> {
        Ok(self
            .pipeline
            .delete(&format!("{}{chapter}/", self.path()))
            .await?)
    }

    /// Decision points of one chapter.
    pub fn decision_points(&self, chapter: u64) -> DecisionPoints<'a> {
        DecisionPoints {
            pipeline: self.pipeline,
            base: format!("{}{chapter}/decision-points/", self.path()),
        }
    }
}

/// The decision points of one chapter, with their choices and votes.
pub struct DecisionPoints<'a> {
    pipeline: &'a Pipeline,
    base: String,
}

impl DecisionPoints<'_> {
    pub async fn list(&self) -> Result<Vec<Value>> {
        list(self.pipeline, &self.base).await
    }

    pub async fn get(&self, decision: u64) -> Result<Value> {
        Ok(self
            .pipeline
            .get(&format!("{}{decision}/", self.base))
            .await?)
    }

    pub async fn create(&self, decision: &Value) -> Result<Value> {
        Ok(self.pipeline.post(&self.base, decision).await?)
    }

    pub async fn update(&self, decision: u64, changes: &Value) -> Result<Value> {
        Ok(self
            .pipeline
            .patch(&format!("{}{decision}/", self.base), changes)
            .await?)
    }

    pub async fn delete(&self, decision: u64) -> Result<()> {
        Ok(self
            .pipeline
            .delete(&format!("{}{decision}/", self.base))
            .await?)
    }

    pub async fn choices(&self, decision: u64) -> Result<Vec<Value>> {
        list(self.pipeline, &format!("{}{decision}/choices/", self.base)).await
    }

    pub async fn create_choice(&self, decision: u64, choice: &Value) -> Result<Value> {
        Ok(self
            .pipeline
            .post(&format!("{}{decision}/choices/", self.base), choice)
            .await?)
    }

    /// Casts the logged-in user's vote for `choice`.
    pub async fn vote(&self, decision: u64, choice: u64) -> Result<Value> {
        Ok(self
            .pipeline
            .post(
                &format!("{}{decision}/vote/", self.base),
                &json!({ "choice": choice }),
            )
            .await?)
    }
}

// ---------------------------------------------------------------------------
// Profiles
// ---------------------------------------------------------------------------

/// Other users' profiles and the follow graph.
///
/// Editing your own profile is
/// [`TaleweaveClient::update_profile`](crate::TaleweaveClient::update_profile),
/// which also refreshes the cached user.
pub struct Profiles<'a> {
    pipeline: &'a Pipeline,
}

impl<'a> Profiles<'a> {
    pub(crate) fn new(pipeline: &'a Pipeline) -> Self {
        Self { pipeline }
    }

    pub async fn get(&self, username: &str) -> Result<Value> {
        Ok(self.pipeline.get(&format!("/profile/{username}/")).await?)
    }

    pub async fn follow(&self, username: &str) -> Result<Value> {
        Ok(self
            .pipeline
            .post(&format!("/follow/{username}/"), &json!({}))
            .await?)
    }

    pub async fn unfollow(&self, username: &str) -> Result<Value> {
        Ok(self
            .pipeline
            .post(&format!("/unfollow/{username}/"), &json!({}))
            .await?)
    }

    pub async fn followers(&self, username: &str) -> Result<Vec<Value>> {
        list(self.pipeline, &format!("/profile/{username}/followers/")).await
    }

    pub async fn following(&self, username: &str) -> Result<Vec<Value>> {
        list(self.pipeline, &format!("/profile/{username}/following/")).await
    }
}
