use crate::ingest::ingest;
use crate::models::{AggregationRequest, ErrorKind, Granularity, Phase, Series, StatsView};
use crate::source::ClickSource;
use crate::stats::build_series;
use crate::timekey::Zone;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

#[derive(Clone, PartialEq, Eq)]
struct Intent {
    request: AggregationRequest,
    token: String,
}

/// Per-link controller that refetches and re-aggregates clicks whenever the
/// link, token or granularity changes.
///
/// Every request bumps the view's generation. A fetch publishes only if its
/// generation is still the current one when it completes, so a slow response
/// for an older request never overwrites a newer one.
#[derive(Clone)]
pub struct FetchOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn ClickSource>,
    zone: Zone,
    intent: Mutex<Option<Intent>>,
    views: watch::Sender<StatsView>,
}

impl FetchOrchestrator {
    pub fn new(source: Arc<dyn ClickSource>, zone: Zone) -> Self {
        let (views, _) = watch::channel(StatsView::default());
        Self {
            inner: Arc::new(Inner {
                source,
                zone,
                intent: Mutex::new(None),
                views,
            }),
        }
    }

    /// Issues a request for `subject` and returns a receiver of its views.
    pub async fn observe(
        &self,
        subject: impl Into<String>,
        token: impl Into<String>,
        granularity: Granularity,
    ) -> watch::Receiver<StatsView> {
        let intent = Intent {
            request: AggregationRequest {
                subject: subject.into(),
                granularity,
            },
            token: token.into(),
        };
        self.issue(intent).await;
        self.subscribe()
    }

    pub async fn set_granularity(&self, granularity: Granularity) -> Option<u64> {
        self.update(|current| {
            let mut next = current?.clone();
            next.request.granularity = granularity;
            Some(next)
        })
        .await
    }

    pub async fn set_subject(&self, subject: impl Into<String>) -> Option<u64> {
        let subject = subject.into();
        self.update(|current| {
            let mut next = current?.clone();
            next.request.subject = subject;
            Some(next)
        })
        .await
    }

    pub async fn set_token(&self, token: impl Into<String>) -> Option<u64> {
        let token = token.into();
        self.update(|current| {
            let mut next = current?.clone();
            next.token = token;
            Some(next)
        })
        .await
    }

    /// Re-issues the current intent, e.g. after the link was just visited.
    pub async fn refresh(&self) -> Option<u64> {
        let current = self.inner.intent.lock().await.clone()?;
        Some(self.issue(current).await)
    }

    /// Issues `intent` without the change check. Returns its generation.
    async fn issue(&self, intent: Intent) -> u64 {
        let mut current = self.inner.intent.lock().await;
        self.issue_locked(&mut current, intent)
    }

    /// Issues the intent produced by `next` unless it equals the current one.
    async fn update<F>(&self, next: F) -> Option<u64>
    where
        F: FnOnce(Option<&Intent>) -> Option<Intent>,
    {
        let mut current = self.inner.intent.lock().await;
        let intent = next(current.as_ref())?;
        if current.as_ref() == Some(&intent) {
            return None;
        }
        Some(self.issue_locked(&mut current, intent))
    }

    fn issue_locked(&self, current: &mut Option<Intent>, intent: Intent) -> u64 {
        let mut generation = 0;
        let credentials_changed = current.as_ref().is_some_and(|existing| existing.token != intent.token);
        self.inner.views.send_modify(|view| {
            if credentials_changed {
                view.series = Series::empty(intent.request.granularity);
                view.series_request = None;
            }
            view.generation += 1;
            generation = view.generation;
            view.request = Some(intent.request.clone());
            view.phase = Phase::Loading;
            view.is_loading = true;
        });
        *current = Some(intent.clone());

        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move { inner.run(intent, generation).await });
        generation
    }

    pub fn subscribe(&self) -> watch::Receiver<StatsView> {
        self.inner.views.subscribe()
    }

    pub fn stream(&self) -> WatchStream<StatsView> {
        WatchStream::new(self.subscribe())
    }

    /// Nothing subscribed and no fetch in flight.
    pub fn is_idle(&self) -> bool {
        self.inner.views.receiver_count() == 0 && !self.inner.views.borrow().is_loading
    }

    pub fn current(&self) -> StatsView {
        self.inner.views.borrow().clone()
    }

    /// Waits until the request with `generation`, or a newer one, has finished.
    pub async fn settled(&self, generation: u64) -> StatsView {
        let mut views = self.subscribe();
        match views
            .wait_for(|view| view.generation >= generation && !view.is_loading)
            .await
        {
            Ok(view) => view.clone(),
            Err(_) => self.current(),
        }
    }
}

impl Inner {
    async fn run(&self, intent: Intent, generation: u64) {
        let Intent { request, token } = intent;
        let outcome = self
            .source
            .fetch_timestamps(&request.subject, &token)
            .await
            .map(|raw| {
                let ingested = ingest(&raw, &self.zone);
                let series = build_series(&ingested.timestamps, request.granularity, &self.zone);
                (series, ingested.skipped)
            });
        let failure = outcome.as_ref().err().map(ToString::to_string);
        let skipped = outcome.as_ref().map(|(_, skipped)| *skipped).unwrap_or_default();

        let published = self.views.send_if_modified(|view| {
            if view.generation != generation {
                return false;
            }
            view.is_loading = false;
            match outcome {
                Ok((series, skipped)) => {
                    view.phase = Phase::Ready;
                    view.series = series;
                    view.series_request = Some(request.clone());
                    view.skipped = skipped;
                    view.error = None;
                }
                Err(_) => {
                    // A stale series may stay on screen only if it answers the same request.
                    if view.series_request.as_ref() != Some(&request) {
                        view.series = Series::empty(request.granularity);
                        view.series_request = None;
                    }
                    view.phase = Phase::Failed;
                    view.skipped = 0;
                    view.error = Some(ErrorKind::SourceUnavailable);
                }
            }
            true
        });

        if !published {
            debug!(
                "dropping superseded result for {} ({}), generation {generation}",
                request.subject, request.granularity
            );
            return;
        }

        match failure {
            Some(err) => warn!(
                "click stats for {} ({}) unavailable: {err}",
                request.subject, request.granularity
            ),
            None if skipped > 0 => {
                debug!("skipped {skipped} malformed click timestamps for {}", request.subject)
            }
            None => {}
        }
    }
}
