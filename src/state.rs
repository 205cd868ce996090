use crate::orchestrator::FetchOrchestrator;
use crate::source::ClickSource;
use crate::timekey::Zone;
use std::{collections::HashMap, sync::Arc, time::Duration};
use tokio::{sync::Mutex, time::Instant};

const MAX_TRACKED_LINKS: usize = 1024;
const IDLE_TTL: Duration = Duration::from_secs(10 * 60);

/// Orchestrators belong to one caller: a link viewed with one token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LinkKey {
    pub subject: String,
    pub token: String,
}

impl LinkKey {
    pub fn new(subject: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            token: token.into(),
        }
    }
}

struct Tracked {
    orchestrator: FetchOrchestrator,
    last_used: Instant,
}

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn ClickSource>,
    pub zone: Zone,
    links: Arc<Mutex<HashMap<LinkKey, Tracked>>>,
    max_links: usize,
    idle_ttl: Duration,
}

impl AppState {
    pub fn new(source: Arc<dyn ClickSource>, zone: Zone) -> Self {
        Self::with_limits(source, zone, MAX_TRACKED_LINKS, IDLE_TTL)
    }

    pub fn with_limits(source: Arc<dyn ClickSource>, zone: Zone, max_links: usize, idle_ttl: Duration) -> Self {
        Self {
            source,
            zone,
            links: Arc::new(Mutex::new(HashMap::new())),
            max_links,
            idle_ttl,
        }
    }

    /// Returns the caller's orchestrator for a link, creating it on first use.
    pub async fn orchestrator(&self, key: &LinkKey) -> FetchOrchestrator {
        let mut links = self.links.lock().await;
        let now = Instant::now();

        if let Some(tracked) = links.get_mut(key) {
            tracked.last_used = now;
            return tracked.orchestrator.clone();
        }

        self.evict(&mut links, now);
        let orchestrator = FetchOrchestrator::new(Arc::clone(&self.source), self.zone);
        links.insert(
            key.clone(),
            Tracked {
                orchestrator: orchestrator.clone(),
                last_used: now,
            },
        );
        orchestrator
    }

    pub async fn existing(&self, key: &LinkKey) -> Option<FetchOrchestrator> {
        let mut links = self.links.lock().await;
        let tracked = links.get_mut(key)?;
        tracked.last_used = Instant::now();
        Some(tracked.orchestrator.clone())
    }

    pub async fn tracked(&self) -> usize {
        self.links.lock().await.len()
    }

    // Busy orchestrators (subscribed or loading) are never evicted.
    fn evict(&self, links: &mut HashMap<LinkKey, Tracked>, now: Instant) {
        links.retain(|_, tracked| {
            !tracked.orchestrator.is_idle() || now.duration_since(tracked.last_used) < self.idle_ttl
        });

        while links.len() >= self.max_links {
            let oldest = links
                .iter()
                .filter(|(_, tracked)| tracked.orchestrator.is_idle())
                .min_by_key(|(_, tracked)| tracked.last_used)
                .map(|(key, _)| key.clone());
            match oldest {
                Some(key) => {
                    links.remove(&key);
                }
                None => break,
            }
        }
    }
}
