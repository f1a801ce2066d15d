use async_trait::async_trait;
use tracing::debug;

use super::model::Home;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("failed to decode house snapshot: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("house data unavailable: {0}")]
    Unavailable(String),
}

/// Where the coordinator gets house snapshots from.
///
/// This trait allows for swapping in a canned source for testing purposes
#[async_trait]
pub trait HomeSource: Send + Sync {
    /// Portal URL devices link to for configuration
    fn root_url(&self) -> &str;

    /// Fetch a complete snapshot of the house
    async fn fetch(&self) -> Result<Home, SourceError>;
}

/// Fetches the house snapshot document over HTTP
pub struct HttpSource {
    client: reqwest::Client,
    root_url: String,
    snapshot_url: String,
}

impl HttpSource {
    pub fn new(root_url: impl Into<String>, snapshot_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            root_url: root_url.into(),
            snapshot_url: snapshot_url.into(),
        }
    }
}

#[async_trait]
impl HomeSource for HttpSource {
    fn root_url(&self) -> &str {
        &self.root_url
    }

    async fn fetch(&self) -> Result<Home, SourceError> {
        debug!("Fetching house snapshot from {}", self.snapshot_url);

        let response = self
            .client
            .get(&self.snapshot_url)
            .send()
            .await
            .map_err(|source| SourceError::Request {
                url: self.snapshot_url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                url: self.snapshot_url.clone(),
                status: status.as_u16(),
            });
        }

        response.json::<Home>().await.map_err(SourceError::Decode)
    }
}

#[async_trait]
impl<T: HomeSource + ?Sized> HomeSource for std::sync::Arc<T> {
    fn root_url(&self) -> &str {
        (**self).root_url()
    }

    async fn fetch(&self) -> Result<Home, SourceError> {
        (**self).fetch().await
    }
}

/// Canned source for testing
#[cfg(test)]
pub struct StaticSource {
    next: std::sync::Mutex<Result<Home, String>>,
}

#[cfg(test)]
impl StaticSource {
    pub fn new(home: Home) -> Self {
        Self {
            next: std::sync::Mutex::new(Ok(home)),
        }
    }

    /// Replace what the next fetch returns
    pub fn set(&self, home: Home) {
        *self.next.lock().unwrap() = Ok(home);
    }

    /// Make every fetch fail until `set` is called again
    pub fn fail(&self, reason: &str) {
        *self.next.lock().unwrap() = Err(reason.to_string());
    }
}

#[cfg(test)]
#[async_trait]
impl HomeSource for StaticSource {
    fn root_url(&self) -> &str {
        "https://www.mynexia.com"
    }

    async fn fetch(&self) -> Result<Home, SourceError> {
        self.next
            .lock()
            .unwrap()
            .clone()
            .map_err(SourceError::Unavailable)
    }
}
