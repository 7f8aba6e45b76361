use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdStrategy {
    /// Milliseconds since the epoch. Two clients starting in the same
    /// millisecond collide.
    #[default]
    Timestamp,
    Random,
}

pub fn session_id(strategy: IdStrategy) -> Result<String> {
    match strategy {
        IdStrategy::Timestamp => {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .context("system time before UNIX_EPOCH")?;
            Ok(now.as_millis().to_string())
        }
        IdStrategy::Random => Ok(Uuid::new_v4().to_string()),
    }
}

/// Builds `<base>/<path_prefix>/<session_id>`.
pub fn session_url(base: &str, path_prefix: &str, session_id: &str) -> Result<Url> {
    let mut url = Url::parse(base.trim()).with_context(|| format!("invalid server url: {base}"))?;
    if !matches!(url.scheme(), "ws" | "wss") {
        bail!("server url must use ws:// or wss://, got {}", url.scheme());
    }
    if session_id.is_empty() {
        bail!("session id is empty");
    }

    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| anyhow!("server url cannot carry a path: {base}"))?;
        segments.pop_if_empty();
        for segment in path_prefix.split('/').filter(|s| !s.is_empty()) {
            segments.push(segment);
        }
        segments.push(session_id);
    }
    Ok(url)
}
