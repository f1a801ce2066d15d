use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use arc_swap::ArcSwap;
use tracing::debug;
use tracing::warn;

use super::model::Home;
use super::source::HomeSource;
use super::source::SourceError;

/// Shared data coordinator
///
/// Holds the last house snapshot fetched from the source. Entities never
/// fetch on their own; they project whatever snapshot is current.
pub struct Coordinator {
    source: Box<dyn HomeSource>,

    /// Last good snapshot (readers load the Arc, refresh stores a new one)
    snapshot: ArcSwap<Home>,

    last_update_success: AtomicBool,
}

impl Coordinator {
    pub fn new(source: Box<dyn HomeSource>) -> Self {
        Self {
            source,
            snapshot: ArcSwap::new(Arc::default()),
            last_update_success: AtomicBool::new(false),
        }
    }

    pub fn root_url(&self) -> &str {
        self.source.root_url()
    }

    /// Current snapshot; empty until the first successful refresh.
    pub fn snapshot(&self) -> Arc<Home> {
        self.snapshot.load_full()
    }

    pub fn last_update_success(&self) -> bool {
        self.last_update_success.load(Ordering::Acquire)
    }

    /// Fetch a new snapshot.
    ///
    /// On failure the previous snapshot is kept and `last_update_success`
    /// turns false until a later refresh succeeds.
    pub async fn refresh(&self) -> Result<(), SourceError> {
        match self.source.fetch().await {
            Ok(home) => {
                debug!("Fetched {} thermostat(s)", home.thermostats.len());
                self.snapshot.store(Arc::new(home));
                self.last_update_success.store(true, Ordering::Release);
                Ok(())
            }
            Err(e) => {
                warn!("Error fetching nexia data: {}", e);
                self.last_update_success.store(false, Ordering::Release);
                Err(e)
            }
        }
    }
}
