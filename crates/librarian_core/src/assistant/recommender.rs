use crate::assistant::cache::TtlCache;
use crate::assistant::client::ChatCompletion;
use core::time::Duration;
use tokio::sync::Mutex;

/// Instruction sent ahead of every reading wish
pub const SYSTEM_INSTRUCTION: &str =
    "You are a helpful library assistant. Recommend books based on user preferences.";

/// Answer given whenever the chat model cannot be reached or answers with garbage
pub const FALLBACK_RECOMMENDATION: &str =
    "AI recommendation: Try 'To Kill a Mockingbird' for classics!";

/// How long identical queries are answered from memory
pub const DEFAULT_TTL: Duration = Duration::from_secs(300);

/// Turns a free-text query into a reading recommendation.
pub struct Recommender<C: ChatCompletion> {
    chat: C,
    cache: Mutex<TtlCache>,
}

impl<C: ChatCompletion> Recommender<C> {
    #[must_use]
    #[inline]
    pub fn new(chat: C, ttl: Duration) -> Self {
        Self {
            chat,
            cache: Mutex::new(TtlCache::new(ttl)),
        }
    }

    /// Asks the chat model for a recommendation. Never fails: if the model cannot answer, the
    /// fallback recommendation is returned instead. Successful answers are reused for identical
    /// queries until they expire, fallbacks are not remembered. An answer that arrives after
    /// [`Recommender::clear_cache`] was called is returned but not remembered either.
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn recommend(&self, query: &str) -> String {
        let generation = {
            let mut cache = self.cache.lock().await;
            if let Some(cached) = cache.get(query) {
                log::info!("Answering recommendation query from cache");
                return cached;
            }
            cache.generation()
        };

        match self.chat.complete(SYSTEM_INSTRUCTION, query).await {
            Ok(answer) => {
                let mut cache = self.cache.lock().await;
                if cache.generation() == generation {
                    cache.insert(query.to_owned(), answer.clone());
                } else {
                    log::info!("Cache was cleared while waiting for the model, not storing answer");
                }
                answer
            }
            Err(err) => {
                log::warn!("Recommendation failed, using fallback: {err}");
                FALLBACK_RECOMMENDATION.to_owned()
            }
        }
    }

    /// Forgets every remembered answer
    #[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
    pub async fn clear_cache(&self) {
        self.cache.lock().await.clear();
        log::info!("Recommendation cache cleared");
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "Tests are predefined and guaranteed to be Some/Ok"
)]
mod tests {
    use super::*;
    use crate::assistant::errors::AssistantError;
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Semaphore;

    /// Plays back a fixed list of outcomes and records every request
    struct ScriptedChat {
        outcomes: StdMutex<VecDeque<Option<String>>>,
        requests: StdMutex<Vec<(String, String)>>,
    }

    impl ScriptedChat {
        fn new(outcomes: &[Option<&str>]) -> Self {
            Self {
                outcomes: StdMutex::new(
                    outcomes
                        .iter()
                        .map(|outcome| outcome.map(str::to_owned))
                        .collect(),
                ),
                requests: StdMutex::default(),
            }
        }

        fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }
    }

    impl ChatCompletion for ScriptedChat {
        async fn complete(&self, system: &str, user: &str) -> Result<String, AssistantError> {
            self.requests
                .lock()
                .unwrap()
                .push((system.to_owned(), user.to_owned()));
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .flatten()
                .ok_or_else(|| AssistantError::MalformedResponse(String::from("scripted failure")))
        }
    }

    /// Holds every request until the test hands out a permit, then answers with a numbered text
    struct GatedChat {
        gate: Semaphore,
        calls: AtomicUsize,
    }

    impl ChatCompletion for GatedChat {
        async fn complete(&self, _system: &str, _user: &str) -> Result<String, AssistantError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            self.gate
                .acquire()
                .await
                .map_err(|err| AssistantError::MalformedResponse(err.to_string()))?
                .forget();
            Ok(format!("answer #{call}"))
        }
    }

    #[tokio::test]
    async fn test_passes_answer_through() {
        let recommender = Recommender::new(ScriptedChat::new(&[Some("Read Dune.")]), DEFAULT_TTL);
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");

        let requests = recommender.chat.requests.lock().unwrap().clone();
        assert_eq!(
            requests,
            vec![(SYSTEM_INSTRUCTION.to_owned(), String::from("sci-fi"))]
        );
    }

    #[tokio::test]
    async fn test_failure_returns_fallback() {
        let recommender = Recommender::new(ScriptedChat::new(&[]), DEFAULT_TTL);
        assert_eq!(recommender.recommend("anything").await, FALLBACK_RECOMMENDATION);
        assert_eq!(recommender.recommend("anything").await, FALLBACK_RECOMMENDATION);
        assert_eq!(recommender.chat.request_count(), 2);
    }

    #[tokio::test]
    async fn test_cached_answer_survives_later_failure() {
        let recommender =
            Recommender::new(ScriptedChat::new(&[Some("Read Dune."), None]), DEFAULT_TTL);
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");
        assert_eq!(recommender.chat.request_count(), 1);
    }

    #[tokio::test]
    async fn test_fallback_is_not_cached() {
        let recommender =
            Recommender::new(ScriptedChat::new(&[None, Some("Read Emma.")]), DEFAULT_TTL);
        assert_eq!(recommender.recommend("classics").await, FALLBACK_RECOMMENDATION);
        assert_eq!(recommender.recommend("classics").await, "Read Emma.");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_answer_is_requested_again() {
        let recommender = Recommender::new(
            ScriptedChat::new(&[Some("Read Dune."), Some("Read Hyperion.")]),
            DEFAULT_TTL,
        );
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");
        tokio::time::advance(DEFAULT_TTL).await;
        assert_eq!(recommender.recommend("sci-fi").await, "Read Hyperion.");
    }

    #[tokio::test]
    async fn test_clear_cache_forces_new_request() {
        let recommender = Recommender::new(
            ScriptedChat::new(&[Some("Read Dune."), Some("Read Hyperion.")]),
            DEFAULT_TTL,
        );
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");
        recommender.clear_cache().await;
        assert_eq!(recommender.recommend("sci-fi").await, "Read Hyperion.");
        assert_eq!(recommender.chat.request_count(), 2);
    }

    #[tokio::test]
    async fn test_different_queries_do_not_share_answers() {
        let recommender = Recommender::new(
            ScriptedChat::new(&[Some("Read Dune."), Some("Read Emma.")]),
            DEFAULT_TTL,
        );
        assert_eq!(recommender.recommend("sci-fi").await, "Read Dune.");
        assert_eq!(recommender.recommend("romance").await, "Read Emma.");
    }

    #[tokio::test]
    async fn test_answer_arriving_after_clear_is_not_cached() {
        let recommender = Arc::new(Recommender::new(
            GatedChat {
                gate: Semaphore::new(0),
                calls: AtomicUsize::new(0),
            },
            DEFAULT_TTL,
        ));
        let in_flight = tokio::spawn({
            let recommender = Arc::clone(&recommender);
            async move { recommender.recommend("sci-fi").await }
        });
        while recommender.chat.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        recommender.clear_cache().await;
        recommender.chat.gate.add_permits(2);
        assert_eq!(in_flight.await.unwrap(), "answer #0");

        assert_eq!(recommender.recommend("sci-fi").await, "answer #1");
        assert_eq!(recommender.chat.calls.load(Ordering::SeqCst), 2);
    }
}
