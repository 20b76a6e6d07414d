//! Shared plumbing for the movie and series manager APIs
//!
//! Both expose `/api/v3` with an `X-Api-Key` header and the same quality and
//! language shapes.

use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use super::http::RateLimitedClient;
use crate::error::{SyncError, SyncResult};

pub struct ArrClient {
    http: RateLimitedClient,
    host: String,
    api_key: Option<String>,
}

impl ArrClient {
    pub fn new(name: &'static str, host: &str, api_key: Option<String>) -> SyncResult<Self> {
        if api_key.is_none() {
            warn!(provider = name, "API key not set, provider will be unavailable");
        }
        Ok(Self {
            http: RateLimitedClient::for_arr(name)?,
            host: host.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub fn name(&self) -> &'static str {
        self.http.name()
    }

    /// GET `/api/v3/{path}`; an empty body decodes as the default value
    pub async fn get<T: DeserializeOwned + Default>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> SyncResult<T> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| SyncError::provider(self.name(), "API key not configured"))?;
        let url = format!("{}/api/v3/{}", self.host, path);

        let body = self
            .http
            .get_json(&url, &[("X-Api-Key", api_key)], query)
            .await?;
        Ok(body.unwrap_or_default())
    }
}

/// `{"quality": {"name": "...", "resolution": 1080}}`
#[derive(Debug, Default, Deserialize)]
pub struct ArrQualityWrapper {
    #[serde(default)]
    pub quality: ArrQuality,
}

#[derive(Debug, Default, Deserialize)]
pub struct ArrQuality {
    pub name: Option<String>,
    pub resolution: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ArrLanguage {
    pub name: String,
}

/// Older series manager versions send a single language object
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ArrLanguages {
    One(ArrLanguage),
    Many(Vec<ArrLanguage>),
}

impl ArrLanguages {
    pub fn into_names(self) -> Vec<String> {
        match self {
            Self::One(lang) => vec![lang.name],
            Self::Many(langs) => langs.into_iter().map(|l| l.name).collect(),
        }
    }
}

impl ArrQualityWrapper {
    pub fn into_parts(self) -> (Option<String>, Option<i64>) {
        (self.quality.name, self.quality.resolution)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn language_accepts_object_or_list() {
        let one: ArrLanguages = serde_json::from_str(r#"{"id":1,"name":"English"}"#).unwrap();
        let many: ArrLanguages =
            serde_json::from_str(r#"[{"id":1,"name":"English"},{"id":2,"name":"French"}]"#)
                .unwrap();

        assert_eq!(one.into_names(), vec!["English"]);
        assert_eq!(many.into_names(), vec!["English", "French"]);
    }
}
