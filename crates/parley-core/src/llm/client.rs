//! Inference client: strategy selection, timeout/retry, streaming
//! accumulation, and terminal degradation to the fallback generator.
//!
//! Every call to [`InferenceClient::resolve`] reaches a terminal state
//! within `(max_retries + 1) * timeout` in the worst case and always
//! yields some utterance. Pipeline errors never escape a turn boundary.

use std::pin::Pin;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Stream, StreamExt};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::agent::{AgentId, PersonaProfile};
use parley_types::config::InferenceConfig;
use parley_types::context::ContextSnapshot;
use parley_types::event::SessionEvent;
use parley_types::llm::{
    ChatMessage, CompletionRequest, InferenceError, MessageRole, ModelPerformanceRecord,
    ParsedTurn, Strategy, StreamEvent, StreamingState,
};
use parley_types::session::{RequestId, SessionId, UtteranceSource};

use crate::context::{render_system, render_user};
use crate::event::EventBus;
use crate::fallback::FallbackGenerator;
use crate::llm::box_provider::BoxModelProvider;
use crate::llm::parse;
use crate::llm::perf::StrategyPerformance;
use crate::llm::persona_cache::PersonaCache;

/// The terminal result of one inference request.
#[derive(Debug)]
pub struct ResolvedTurn {
    pub request_id: RequestId,
    pub strategy: Strategy,
    pub source: UtteranceSource,
    pub turn: ParsedTurn,
}

/// Client for the local and cloud model backends.
///
/// Owns the persona cache and per-strategy performance records; handed by
/// `Arc` to the context builder and the session manager.
pub struct InferenceClient {
    local: BoxModelProvider,
    cloud: BoxModelProvider,
    fallback: FallbackGenerator,
    config: InferenceConfig,
    local_perf: Mutex<StrategyPerformance>,
    cloud_perf: Mutex<StrategyPerformance>,
    persona_cache: Mutex<PersonaCache>,
    local_healthy: AtomicBool,
    bus: EventBus,
}

impl InferenceClient {
    pub fn new(
        local: BoxModelProvider,
        cloud: BoxModelProvider,
        fallback: FallbackGenerator,
        config: InferenceConfig,
        bus: EventBus,
    ) -> Self {
        Self {
            local_perf: Mutex::new(StrategyPerformance::new(Strategy::Local, config.perf_window)),
            cloud_perf: Mutex::new(StrategyPerformance::new(Strategy::Cloud, config.perf_window)),
            persona_cache: Mutex::new(PersonaCache::new(config.persona_cache_capacity)),
            local_healthy: AtomicBool::new(true),
            local,
            cloud,
            fallback,
            config,
            bus,
        }
    }

    /// Rendered persona block for a speaker, served from the cache.
    pub fn persona_block(&self, agent: &AgentId, profile: &PersonaProfile) -> String {
        self.persona_cache
            .lock()
            .expect("persona cache lock poisoned")
            .get_or_render(agent, profile)
    }

    /// Pick the backend for this turn.
    ///
    /// Cloud when the turn is spotlighted, when local's rolling success
    /// rate has dropped below the floor, or when the prompt complexity
    /// exceeds the ceiling. Local otherwise.
    pub fn select_strategy(&self, ctx: &ContextSnapshot) -> Strategy {
        if ctx.directives.spotlight {
            return Strategy::Cloud;
        }
        let local_rate = self
            .local_perf
            .lock()
            .expect("perf lock poisoned")
            .success_rate();
        if local_rate < self.config.local_success_floor {
            return Strategy::Cloud;
        }
        if complexity_score(ctx) > self.config.complexity_ceiling {
            return Strategy::Cloud;
        }
        Strategy::Local
    }

    /// Resolve one turn: dispatch with retries, degrade to fallback.
    ///
    /// Exactly one performance outcome is recorded per call, success or
    /// error, never one per attempt. A request resolved by the fallback
    /// path because local is marked unhealthy records nothing, since no
    /// attempt was made.
    pub async fn resolve(&self, session_id: SessionId, ctx: &ContextSnapshot) -> ResolvedTurn {
        let request_id = Uuid::now_v7();
        let strategy = self.select_strategy(ctx);

        // Unhealthy local backend: skip network I/O entirely.
        if strategy == Strategy::Local && !self.local_healthy.load(Ordering::Relaxed) {
            debug!(%session_id, "local backend unhealthy, degrading without dispatch");
            return self.degraded(request_id, strategy, ctx);
        }

        let provider = self.provider_for(strategy);
        let request = self.build_request(ctx, strategy);

        let mut last_error = None;
        for attempt in 0..=self.config.max_retries {
            if attempt > 0 {
                let backoff = self.config.retry_delay_ms * u64::from(attempt);
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            let outcome = if request.stream {
                self.attempt_streamed(session_id, request_id, provider, &request)
                    .await
            } else {
                self.attempt(provider, &request).await
            };

            match outcome {
                Ok(turn) => {
                    self.perf_for(strategy)
                        .lock()
                        .expect("perf lock poisoned")
                        .record_success();
                    return ResolvedTurn {
                        request_id,
                        strategy,
                        source: UtteranceSource::Model,
                        turn,
                    };
                }
                Err(error) => {
                    debug!(%session_id, %strategy, attempt, %error, "inference attempt failed");
                    last_error = Some(error);
                }
            }
        }

        // Retry budget exhausted: one error against the strategy.
        self.perf_for(strategy)
            .lock()
            .expect("perf lock poisoned")
            .record_error();
        let error = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "unknown".to_string());
        warn!(%session_id, %strategy, %error, "inference exhausted retries, degrading to fallback");
        self.bus.publish(SessionEvent::RequestFailed {
            session_id,
            strategy,
            error,
        });

        self.degraded(request_id, strategy, ctx)
    }

    /// Snapshot of one strategy's performance record.
    pub fn performance(&self, strategy: Strategy) -> ModelPerformanceRecord {
        self.perf_for(strategy)
            .lock()
            .expect("perf lock poisoned")
            .record()
    }

    pub fn local_healthy(&self) -> bool {
        self.local_healthy.load(Ordering::Relaxed)
    }

    /// Set the local health flag, publishing an event on transitions.
    pub fn set_local_health(&self, healthy: bool) {
        let was = self.local_healthy.swap(healthy, Ordering::Relaxed);
        if was != healthy {
            info!(healthy, "local backend health changed");
            self.bus.publish(SessionEvent::HealthChanged { healthy });
        }
    }

    /// Periodically probe the local backend until cancelled.
    pub fn spawn_health_probe(self: &Arc<Self>, cancel: CancellationToken) -> tokio::task::JoinHandle<()> {
        let client = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(
                client.config.health_probe_interval_secs.max(1),
            ));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let healthy = client.local.probe().await;
                        client.set_local_health(healthy);
                    }
                }
            }
        })
    }

    fn degraded(
        &self,
        request_id: RequestId,
        strategy: Strategy,
        ctx: &ContextSnapshot,
    ) -> ResolvedTurn {
        let utterance = self.fallback.generate(ctx);
        ResolvedTurn {
            request_id,
            strategy,
            source: UtteranceSource::Fallback,
            turn: ParsedTurn::from_utterance(utterance, "fallback"),
        }
    }

    fn provider_for(&self, strategy: Strategy) -> &BoxModelProvider {
        match strategy {
            Strategy::Local => &self.local,
            Strategy::Cloud => &self.cloud,
        }
    }

    fn perf_for(&self, strategy: Strategy) -> &Mutex<StrategyPerformance> {
        match strategy {
            Strategy::Local => &self.local_perf,
            Strategy::Cloud => &self.cloud_perf,
        }
    }

    fn build_request(&self, ctx: &ContextSnapshot, strategy: Strategy) -> CompletionRequest {
        let provider = self.provider_for(strategy);
        let max_tokens = match strategy {
            Strategy::Local => self.config.local_max_tokens,
            Strategy::Cloud => self.config.cloud_max_tokens,
        };
        CompletionRequest {
            model: provider.model().to_string(),
            messages: vec![ChatMessage {
                role: MessageRole::User,
                content: render_user(ctx),
            }],
            system: Some(render_system(ctx)),
            max_tokens,
            temperature: Some(ctx.directives.temperature),
            stream: self.config.streaming,
        }
    }

    async fn attempt(
        &self,
        provider: &BoxModelProvider,
        request: &CompletionRequest,
    ) -> Result<ParsedTurn, InferenceError> {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let response = tokio::time::timeout(deadline, provider.complete(request))
            .await
            .map_err(|_| InferenceError::Timeout {
                elapsed_ms: self.config.timeout_ms,
            })??;
        parse::parse_turn(&response.content)
    }

    async fn attempt_streamed(
        &self,
        session_id: SessionId,
        request_id: RequestId,
        provider: &BoxModelProvider,
        request: &CompletionRequest,
    ) -> Result<ParsedTurn, InferenceError> {
        let deadline = Duration::from_millis(self.config.timeout_ms);
        let stream = provider.stream(request.clone());
        let text = tokio::time::timeout(
            deadline,
            self.stream_and_accumulate(session_id, request_id, stream),
        )
        .await
        .map_err(|_| InferenceError::Timeout {
            elapsed_ms: self.config.timeout_ms,
        })??;
        parse::parse_streamed(&text)
    }

    /// Drain a provider stream, flushing buffered partial text onto the
    /// bus at a fixed cadence independent of provider delivery timing.
    async fn stream_and_accumulate(
        &self,
        session_id: SessionId,
        request_id: RequestId,
        mut stream: Pin<Box<dyn Stream<Item = Result<StreamEvent, InferenceError>> + Send + 'static>>,
    ) -> Result<String, InferenceError> {
        let mut state = StreamingState::new(request_id);
        let mut pending = String::new();
        let mut flush = tokio::time::interval(Duration::from_millis(
            self.config.stream_flush_ms.max(1),
        ));
        flush.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = flush.tick() => {
                    if !pending.is_empty() {
                        self.bus.publish(SessionEvent::StreamChunk {
                            session_id,
                            request_id,
                            text: std::mem::take(&mut pending),
                        });
                    }
                }
                event = stream.next() => match event {
                    Some(Ok(StreamEvent::Connected)) => {}
                    Some(Ok(StreamEvent::TextDelta { text })) => {
                        state.push(&text);
                        pending.push_str(&text);
                    }
                    Some(Ok(StreamEvent::Finished { .. })) => {
                        state.is_complete = true;
                    }
                    Some(Ok(StreamEvent::Done)) | None => break,
                    Some(Err(error)) => return Err(error),
                },
            }
        }

        if !pending.is_empty() {
            self.bus.publish(SessionEvent::StreamChunk {
                session_id,
                request_id,
                text: pending,
            });
        }

        if !state.is_complete {
            return Err(InferenceError::Transport(
                "stream ended without a finish signal".to_string(),
            ));
        }
        Ok(state.accumulated_text)
    }
}

impl std::fmt::Debug for InferenceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceClient")
            .field("local", &self.local.name())
            .field("cloud", &self.cloud.name())
            .field("local_healthy", &self.local_healthy())
            .finish()
    }
}

/// Prompt complexity in `[0, 1]`: weighted by history length, participant
/// count, topic length, and memory volume.
pub fn complexity_score(ctx: &ContextSnapshot) -> f64 {
    let history = (ctx.frame.recent_turns.len() as f64 / 8.0).min(1.0);
    let participants = ((ctx.frame.participants.len().saturating_sub(2)) as f64 / 2.0).min(1.0);
    let topic = (ctx.directives.topic.split_whitespace().count() as f64 / 4.0).min(1.0);
    let memories = (ctx.memories.total() as f64 / 11.0).min(1.0);

    0.3 * history + 0.25 * participants + 0.15 * topic + 0.3 * memories
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicUsize;

    use async_stream::stream;

    use crate::llm::provider::ModelProvider;
    use parley_types::agent::{AgentVitals, TraitSet};
    use parley_types::context::{
        AgreementSignal, ConversationFrame, EnvironmentSlice, MemorySlice, TurnDirectives,
    };
    use parley_types::llm::CompletionResponse;

    const VALID_JSON: &str = r#"{
        "utterance": "The rain should hold off until evening.",
        "intent": "inform",
        "summary_note": "Weather talk.",
        "relationship_effects": [],
        "mood_shift": {"valence": 0.0, "arousal": 0.0}
    }"#;

    /// Scripted provider: pops one canned outcome per completion call.
    struct MockProvider {
        name: &'static str,
        responses: Mutex<VecDeque<Result<String, InferenceError>>>,
        stream_deltas: Vec<&'static str>,
        calls: AtomicUsize,
        delay: Option<Duration>,
    }

    impl MockProvider {
        fn new(responses: Vec<Result<String, InferenceError>>) -> Self {
            Self {
                name: "mock",
                responses: Mutex::new(responses.into_iter().collect()),
                stream_deltas: vec![],
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn streaming(deltas: Vec<&'static str>) -> Self {
            Self {
                name: "mock-stream",
                responses: Mutex::new(VecDeque::new()),
                stream_deltas: deltas,
                calls: AtomicUsize::new(0),
                delay: None,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ModelProvider for MockProvider {
        fn name(&self) -> &str {
            self.name
        }

        fn model(&self) -> &str {
            "mock-model"
        }

        async fn complete(
            &self,
            _request: &CompletionRequest,
        ) -> Result<CompletionResponse, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let scripted = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(InferenceError::Transport("exhausted script".into())));
            scripted.map(|content| CompletionResponse {
                id: "resp-1".to_string(),
                content,
                model: "mock-model".to_string(),
                finish_reason: Some("stop".to_string()),
            })
        }

        fn stream(
            &self,
            _request: CompletionRequest,
        ) -> Pin<Box<dyn Stream<Item = Result<StreamEvent, InferenceError>> + Send + 'static>>
        {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let deltas: Vec<String> = self.stream_deltas.iter().map(|s| s.to_string()).collect();
            Box::pin(stream! {
                yield Ok(StreamEvent::Connected);
                for delta in deltas {
                    yield Ok(StreamEvent::TextDelta { text: delta });
                }
                yield Ok(StreamEvent::Finished { reason: "stop".to_string() });
                yield Ok(StreamEvent::Done);
            })
        }

        async fn probe(&self) -> bool {
            true
        }
    }

    fn test_ctx() -> ContextSnapshot {
        ContextSnapshot {
            speaker: AgentId::new("elena"),
            persona_block: "<persona>Elena</persona>".to_string(),
            traits: TraitSet::default(),
            vitals: AgentVitals::default(),
            location: None,
            directives: TurnDirectives {
                topic: "weather".to_string(),
                temperature: 0.8,
                spotlight: false,
                closing: false,
                topic_just_changed: false,
                agreement: AgreementSignal::Neutral,
            },
            relationships: vec![],
            memories: MemorySlice::default(),
            frame: ConversationFrame {
                session_id: Uuid::now_v7(),
                turn_number: 1,
                turn_cap: 20,
                participants: vec![AgentId::new("elena"), AgentId::new("mira")],
                current_topic: "weather".to_string(),
                recent_turns: vec![],
            },
            environment: EnvironmentSlice {
                weather: "rain".to_string(),
                time_of_day: "morning".to_string(),
                season: "autumn".to_string(),
            },
        }
    }

    fn fast_config() -> InferenceConfig {
        InferenceConfig {
            timeout_ms: 500,
            max_retries: 3,
            retry_delay_ms: 1,
            stream_flush_ms: 5,
            ..InferenceConfig::default()
        }
    }

    fn client_with(local: MockProvider, config: InferenceConfig) -> InferenceClient {
        let cloud = MockProvider::new(vec![]);
        InferenceClient::new(
            BoxModelProvider::new(local),
            BoxModelProvider::new(cloud),
            FallbackGenerator::new(),
            config,
            EventBus::new(64),
        )
    }

    #[tokio::test]
    async fn test_success_resolves_from_model() {
        let client = client_with(
            MockProvider::new(vec![Ok(VALID_JSON.to_string())]),
            fast_config(),
        );

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;
        assert_eq!(resolved.source, UtteranceSource::Model);
        assert_eq!(resolved.strategy, Strategy::Local);
        assert_eq!(
            resolved.turn.utterance,
            "The rain should hold off until evening."
        );

        let record = client.performance(Strategy::Local);
        assert_eq!(record.success_count, 1);
        assert_eq!(record.error_count, 0);
    }

    #[tokio::test]
    async fn test_malformed_then_valid_retries_to_success() {
        let client = client_with(
            MockProvider::new(vec![
                Ok("not json at all".to_string()),
                Ok(VALID_JSON.to_string()),
            ]),
            fast_config(),
        );

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;
        assert_eq!(resolved.source, UtteranceSource::Model);
        assert_eq!(client.performance(Strategy::Local).success_count, 1);
        assert_eq!(client.performance(Strategy::Local).error_count, 0);
    }

    #[tokio::test]
    async fn test_exhausted_retries_record_exactly_one_error() {
        let failures = (0..4)
            .map(|i| Err(InferenceError::Transport(format!("refused {i}"))))
            .collect();
        let client = client_with(MockProvider::new(failures), fast_config());
        let mut rx = client.bus.subscribe();

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;

        // Four attempts (initial + 3 retries), one recorded error.
        assert_eq!(resolved.source, UtteranceSource::Fallback);
        assert!(!resolved.turn.utterance.is_empty());
        let record = client.performance(Strategy::Local);
        assert_eq!(record.error_count, 1);
        assert_eq!(record.success_count, 0);

        let event = rx.try_recv().unwrap();
        assert!(matches!(
            event,
            SessionEvent::RequestFailed {
                strategy: Strategy::Local,
                ..
            }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_unhealthy_local_short_circuits_without_dispatch() {
        let local = MockProvider::new(vec![Ok(VALID_JSON.to_string())]);
        let client = InferenceClient::new(
            BoxModelProvider::new(local),
            BoxModelProvider::new(MockProvider::new(vec![])),
            FallbackGenerator::new(),
            fast_config(),
            EventBus::new(64),
        );
        client.set_local_health(false);

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;

        assert_eq!(resolved.source, UtteranceSource::Fallback);
        // No attempt was made, so no outcome is recorded either way.
        let record = client.performance(Strategy::Local);
        assert_eq!(record.error_count, 0);
        assert_eq!(record.success_count, 0);
    }

    #[tokio::test]
    async fn test_timeout_degrades_to_fallback() {
        let mut local = MockProvider::new(vec![Ok(VALID_JSON.to_string())]);
        local.delay = Some(Duration::from_millis(100));
        let config = InferenceConfig {
            timeout_ms: 10,
            max_retries: 0,
            retry_delay_ms: 1,
            ..InferenceConfig::default()
        };
        let client = client_with(local, config);

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;
        assert_eq!(resolved.source, UtteranceSource::Fallback);
        assert_eq!(client.performance(Strategy::Local).error_count, 1);
    }

    #[tokio::test]
    async fn test_streaming_accumulates_and_resolves_once() {
        let config = InferenceConfig {
            streaming: true,
            ..fast_config()
        };
        let local = MockProvider::streaming(vec!["Hel", "lo ", " there"]);
        let client = client_with(local, config);
        let mut rx = client.bus.subscribe();

        let resolved = client.resolve(Uuid::now_v7(), &test_ctx()).await;

        assert_eq!(resolved.source, UtteranceSource::Model);
        assert_eq!(resolved.turn.utterance, "Hello  there");
        assert_eq!(client.performance(Strategy::Local).success_count, 1);

        // Flushed chunks concatenate to the full text, in order.
        let mut chunks = String::new();
        while let Ok(event) = rx.try_recv() {
            if let SessionEvent::StreamChunk { text, .. } = event {
                chunks.push_str(&text);
            }
        }
        assert_eq!(chunks, "Hello  there");
    }

    #[tokio::test]
    async fn test_spotlight_routes_to_cloud() {
        let cloud = MockProvider::new(vec![Ok(VALID_JSON.to_string())]);
        let client = InferenceClient::new(
            BoxModelProvider::new(MockProvider::new(vec![])),
            BoxModelProvider::new(cloud),
            FallbackGenerator::new(),
            fast_config(),
            EventBus::new(64),
        );

        let mut ctx = test_ctx();
        ctx.directives.spotlight = true;
        assert_eq!(client.select_strategy(&ctx), Strategy::Cloud);

        let resolved = client.resolve(Uuid::now_v7(), &ctx).await;
        assert_eq!(resolved.strategy, Strategy::Cloud);
        assert_eq!(resolved.source, UtteranceSource::Model);
    }

    #[tokio::test]
    async fn test_low_local_success_rate_routes_to_cloud() {
        let failures = (0..4)
            .map(|_| Err(InferenceError::Transport("down".into())))
            .collect();
        let client = client_with(MockProvider::new(failures), fast_config());

        // Drive the local rate to zero.
        client.resolve(Uuid::now_v7(), &test_ctx()).await;
        assert_eq!(client.select_strategy(&test_ctx()), Strategy::Cloud);
    }

    #[tokio::test]
    async fn test_health_transition_publishes_event() {
        let client = client_with(MockProvider::new(vec![]), fast_config());
        let mut rx = client.bus.subscribe();

        client.set_local_health(false);
        client.set_local_health(false);
        client.set_local_health(true);

        // Only transitions publish.
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::HealthChanged { healthy: false }
        ));
        assert!(matches!(
            rx.try_recv().unwrap(),
            SessionEvent::HealthChanged { healthy: true }
        ));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_complexity_score_grows_with_context() {
        let sparse = test_ctx();
        let mut dense = test_ctx();
        dense.frame.participants.push(AgentId::new("tomas"));
        dense.frame.participants.push(AgentId::new("ivo"));
        for i in 0..8 {
            dense.frame.recent_turns.push(parley_types::context::FrameTurn {
                speaker: AgentId::new("mira"),
                utterance: format!("turn {i}"),
            });
        }
        assert!(complexity_score(&dense) > complexity_score(&sparse));
        assert!(complexity_score(&dense) <= 1.0);
    }

    #[tokio::test]
    async fn test_build_request_sizes_tokens_by_strategy() {
        let client = client_with(MockProvider::new(vec![]), InferenceConfig::default());
        let ctx = test_ctx();

        let local = client.build_request(&ctx, Strategy::Local);
        let cloud = client.build_request(&ctx, Strategy::Cloud);
        assert_eq!(local.max_tokens, 256);
        assert_eq!(cloud.max_tokens, 512);
        assert!(local.system.as_deref().unwrap_or("").contains("<persona>"));
    }
}
