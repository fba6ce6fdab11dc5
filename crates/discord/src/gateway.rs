use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use relay_core::config::GatewayConfig;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::events::{EventContext, EventDispatcher, GatewayEnvelope, GatewayEvent, Readiness};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("gateway login failed: {0}")]
    Login(String),
    #[error("gateway read failed: {0}")]
    Receive(String),
    #[error("gateway disconnect failed: {0}")]
    Disconnect(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_retries: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { max_retries: 5, base_delay_ms: 250, max_delay_ms: 5_000 }
    }
}

impl From<&GatewayConfig> for ReconnectPolicy {
    fn from(config: &GatewayConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay_ms: config.base_delay_ms,
            max_delay_ms: config.max_delay_ms,
        }
    }
}

impl ReconnectPolicy {
    fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(16);
        let multiplier = 1_u64 << exponent;
        let delay_ms = self.base_delay_ms.saturating_mul(multiplier).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }
}

/// Source of gateway events. Session management (login, heartbeats, resume)
/// lives behind this trait.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self) -> Result<(), TransportError>;
    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError>;
    async fn disconnect(&self) -> Result<(), TransportError>;
}

#[derive(Default)]
pub struct NoopGatewayTransport;

#[async_trait]
impl GatewayTransport for NoopGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(None)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// In-process transport fed through an mpsc sender, for embedding a gateway
/// client that pushes already-decoded events.
pub struct ChannelGatewayTransport {
    receiver: Mutex<mpsc::Receiver<GatewayEnvelope>>,
}

impl ChannelGatewayTransport {
    pub fn new(buffer: usize) -> (Self, mpsc::Sender<GatewayEnvelope>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { receiver: Mutex::new(receiver) }, sender)
    }
}

#[async_trait]
impl GatewayTransport for ChannelGatewayTransport {
    async fn connect(&self) -> Result<(), TransportError> {
        Ok(())
    }

    async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(self.receiver.lock().await.recv().await)
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.receiver.lock().await.close();
        Ok(())
    }
}

pub struct GatewayRunner {
    transport: Arc<dyn GatewayTransport>,
    dispatcher: EventDispatcher,
    reconnect_policy: ReconnectPolicy,
    noop: bool,
}

impl Default for GatewayRunner {
    fn default() -> Self {
        Self::disabled(EventDispatcher::default())
    }
}

impl GatewayRunner {
    pub fn new(
        transport: Arc<dyn GatewayTransport>,
        dispatcher: EventDispatcher,
        reconnect_policy: ReconnectPolicy,
    ) -> Self {
        Self { transport, dispatcher, reconnect_policy, noop: false }
    }

    /// Runner whose transport never yields events; used when ingress is not
    /// configured.
    pub fn disabled(dispatcher: EventDispatcher) -> Self {
        Self {
            transport: Arc::new(NoopGatewayTransport),
            dispatcher,
            reconnect_policy: ReconnectPolicy::default(),
            noop: true,
        }
    }

    pub fn is_noop_transport(&self) -> bool {
        self.noop
    }

    pub fn readiness(&self) -> Readiness {
        self.dispatcher.readiness().clone()
    }

    /// Pumps sessions until the stream closes or retries run out. The retry
    /// budget is restored after every session that reached `Ready`.
    pub async fn start(&self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            let outcome = self.connect_and_pump(attempt).await;
            let reached_ready = self.dispatcher.readiness().is_ready();
            self.dispatcher.readiness().mark_disconnected();

            let transport_error = match outcome {
                Ok(()) => return Ok(()),
                Err(transport_error) => transport_error,
            };
            if reached_ready {
                attempt = 0;
            }

            warn!(
                event_name = "ingress.discord.transport_failed",
                attempt,
                max_retries = self.reconnect_policy.max_retries,
                reached_ready,
                error = %transport_error,
                "gateway transport failed"
            );

            if attempt >= self.reconnect_policy.max_retries {
                warn!(
                    max_retries = self.reconnect_policy.max_retries,
                    "gateway retries exhausted; continuing process without ingress"
                );
                return Ok(());
            }

            let delay = self.reconnect_policy.backoff(attempt);
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            attempt += 1;
        }
    }

    async fn connect_and_pump(&self, attempt: u32) -> Result<(), TransportError> {
        info!(attempt, "attempting gateway login");
        self.transport.connect().await?;
        info!(attempt, "gateway transport connected");

        loop {
            let Some(envelope) = self.transport.next_envelope().await? else {
                info!(attempt, "gateway event stream closed");
                self.transport.disconnect().await?;
                return Ok(());
            };
            let (message_id, channel_id) = correlation_fields(&envelope);

            debug!(
                event_name = "ingress.discord.envelope_received",
                envelope_id = %envelope.envelope_id,
                event_type = ?envelope.event.event_type(),
                correlation_id = %envelope.envelope_id,
                message_id = message_id.unwrap_or("unknown"),
                channel_id = channel_id.unwrap_or("unknown"),
                "received gateway envelope"
            );

            let context = EventContext { correlation_id: envelope.envelope_id.clone() };
            if let Err(error) = self.dispatcher.dispatch(&envelope, &context).await {
                warn!(
                    envelope_id = %envelope.envelope_id,
                    correlation_id = %envelope.envelope_id,
                    message_id = message_id.unwrap_or("unknown"),
                    channel_id = channel_id.unwrap_or("unknown"),
                    error = %error,
                    "event dispatch failed; continuing gateway loop"
                );
            }
        }
    }
}

fn correlation_fields(envelope: &GatewayEnvelope) -> (Option<&str>, Option<&str>) {
    match &envelope.event {
        GatewayEvent::MessageCreated(event) => {
            (Some(event.message_id.as_str()), Some(event.channel_id.as_str()))
        }
        GatewayEvent::ReactionAdded(event) | GatewayEvent::ReactionRemoved(event) => {
            (Some(event.message_id.as_str()), Some(event.channel_id.as_str()))
        }
        GatewayEvent::Ready(_) | GatewayEvent::Unsupported { .. } => (None, None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use relay_core::SubmissionStore;
    use tokio::sync::Mutex;

    use super::{
        ChannelGatewayTransport, GatewayRunner, GatewayTransport, ReconnectPolicy, TransportError,
    };
    use crate::events::{
        listener_dispatcher, Attachment, EventDispatcher, GatewayEnvelope, GatewayEvent,
        ListenerSettings, MessageCreatedEvent, ReactionEvent, ReadyEvent,
    };

    #[derive(Default)]
    struct ScriptedTransport {
        state: Mutex<ScriptedState>,
    }

    #[derive(Default)]
    struct ScriptedState {
        connect_results: VecDeque<Result<(), TransportError>>,
        envelopes: VecDeque<Result<Option<GatewayEnvelope>, TransportError>>,
        connect_attempts: usize,
        disconnect_calls: usize,
    }

    impl ScriptedTransport {
        fn with_script(
            connect_results: Vec<Result<(), TransportError>>,
            envelopes: Vec<Result<Option<GatewayEnvelope>, TransportError>>,
        ) -> Self {
            Self {
                state: Mutex::new(ScriptedState {
                    connect_results: connect_results.into(),
                    envelopes: envelopes.into(),
                    connect_attempts: 0,
                    disconnect_calls: 0,
                }),
            }
        }

        async fn connect_attempts(&self) -> usize {
            self.state.lock().await.connect_attempts
        }

        async fn disconnect_calls(&self) -> usize {
            self.state.lock().await.disconnect_calls
        }
    }

    #[async_trait::async_trait]
    impl GatewayTransport for ScriptedTransport {
        async fn connect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.connect_attempts += 1;
            state.connect_results.pop_front().unwrap_or(Ok(()))
        }

        async fn next_envelope(&self) -> Result<Option<GatewayEnvelope>, TransportError> {
            let mut state = self.state.lock().await;
            state.envelopes.pop_front().unwrap_or(Ok(None))
        }

        async fn disconnect(&self) -> Result<(), TransportError> {
            let mut state = self.state.lock().await;
            state.disconnect_calls += 1;
            Ok(())
        }
    }

    const CHANNEL: &str = "C1";

    fn ready() -> Result<Option<GatewayEnvelope>, TransportError> {
        Ok(Some(GatewayEnvelope {
            envelope_id: "env-ready".to_owned(),
            event: GatewayEvent::Ready(ReadyEvent { user_tag: "relay#0001".to_owned() }),
        }))
    }

    fn listing(message_id: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: format!("env-{message_id}"),
            event: GatewayEvent::MessageCreated(MessageCreatedEvent {
                message_id: message_id.to_owned(),
                channel_id: CHANNEL.to_owned(),
                author_id: "U1".to_owned(),
                content: "Conversion: BTC->ETH\nPrice: 0.05\nStock: 3".to_owned(),
                attachments: vec![Attachment {
                    id: "a1".to_owned(),
                    url: format!("https://cdn.example/{message_id}.png"),
                    filename: "listing.png".to_owned(),
                }],
            }),
        }
    }

    fn approve(message_id: &str) -> GatewayEnvelope {
        GatewayEnvelope {
            envelope_id: format!("env-approve-{message_id}"),
            event: GatewayEvent::ReactionAdded(ReactionEvent {
                channel_id: CHANNEL.to_owned(),
                message_id: message_id.to_owned(),
                user_id: "U2".to_owned(),
                username: "moderator".to_owned(),
                user_is_bot: false,
                emoji: "✅".to_owned(),
            }),
        }
    }

    fn no_delay(max_retries: u32) -> ReconnectPolicy {
        ReconnectPolicy { max_retries, base_delay_ms: 0, max_delay_ms: 0 }
    }

    #[tokio::test]
    async fn reconnects_after_initial_login_failure() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Err(TransportError::Login("invalid session".to_owned())), Ok(())],
            vec![
                Ok(Some(GatewayEnvelope {
                    envelope_id: "env-1".to_owned(),
                    event: GatewayEvent::Unsupported { event_type: "TYPING_START".to_owned() },
                })),
                Ok(None),
            ],
        ));

        let runner =
            GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should not fail");

        assert_eq!(transport.connect_attempts().await, 2);
        assert_eq!(transport.disconnect_calls().await, 1);
    }

    #[tokio::test]
    async fn exhausts_retries_without_crashing() {
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![
                Err(TransportError::Login("fail-1".to_owned())),
                Err(TransportError::Login("fail-2".to_owned())),
                Err(TransportError::Login("fail-3".to_owned())),
            ],
            vec![],
        ));

        let runner =
            GatewayRunner::new(transport.clone(), EventDispatcher::default(), no_delay(2));

        runner.start().await.expect("runner should degrade gracefully");
        assert_eq!(transport.connect_attempts().await, 3);
    }

    #[tokio::test]
    async fn pumps_events_into_store_only_after_ready() {
        let store = Arc::new(SubmissionStore::default());
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(())],
            vec![
                Ok(Some(listing("early"))),
                ready(),
                Ok(Some(listing("m-1"))),
                Ok(Some(approve("m-1"))),
                Ok(None),
            ],
        ));
        let dispatcher = listener_dispatcher(store.clone(), ListenerSettings::new(CHANNEL, "✅"));
        let runner = GatewayRunner::new(transport, dispatcher, no_delay(0));

        runner.start().await.expect("runner");

        let submissions = store.snapshot().await;
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].image, "https://cdn.example/m-1.png");
        assert!(submissions[0].verified);
        assert!(!runner.readiness().is_ready(), "closed stream clears readiness");
    }

    #[tokio::test]
    async fn receive_failure_clears_readiness_until_next_ready() {
        let store = Arc::new(SubmissionStore::default());
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![Ok(()), Ok(())],
            vec![
                ready(),
                Err(TransportError::Receive("connection reset".to_owned())),
                Ok(Some(listing("during-resume"))),
                ready(),
                Ok(Some(listing("m-2"))),
                Ok(None),
            ],
        ));
        let dispatcher = listener_dispatcher(store.clone(), ListenerSettings::new(CHANNEL, "✅"));
        let runner = GatewayRunner::new(transport.clone(), dispatcher, no_delay(1));

        runner.start().await.expect("runner");

        let ids: Vec<String> = store
            .snapshot()
            .await
            .into_iter()
            .filter_map(|submission| submission.source_message_id.map(|id| id.0))
            .collect();
        assert_eq!(ids, vec!["m-2"]);
        assert_eq!(transport.connect_attempts().await, 2);
    }

    #[tokio::test]
    async fn sessions_that_reach_ready_restore_the_retry_budget() {
        let store = Arc::new(SubmissionStore::default());
        let dropped = || Err(TransportError::Receive("connection reset".to_owned()));
        let transport = Arc::new(ScriptedTransport::with_script(
            vec![],
            vec![
                ready(),
                dropped(),
                ready(),
                dropped(),
                ready(),
                dropped(),
                ready(),
                Ok(Some(listing("m-4"))),
                Ok(None),
            ],
        ));
        let dispatcher = listener_dispatcher(store.clone(), ListenerSettings::new(CHANNEL, "✅"));
        let runner = GatewayRunner::new(transport.clone(), dispatcher, no_delay(1));

        runner.start().await.expect("runner");

        assert_eq!(transport.connect_attempts().await, 4);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn channel_transport_delivers_pushed_events() {
        let store = Arc::new(SubmissionStore::default());
        let (transport, sender) = ChannelGatewayTransport::new(8);
        let dispatcher = listener_dispatcher(store.clone(), ListenerSettings::new(CHANNEL, "✅"));
        let runner = GatewayRunner::new(Arc::new(transport), dispatcher, no_delay(0));

        for envelope in [ready(), Ok(Some(listing("m-3")))] {
            let envelope = envelope.expect("scripted").expect("envelope");
            sender.send(envelope).await.expect("send");
        }
        drop(sender);

        runner.start().await.expect("runner");
        assert_eq!(store.len().await, 1);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = ReconnectPolicy { max_retries: 10, base_delay_ms: 250, max_delay_ms: 1_000 };
        assert_eq!(policy.backoff(0).as_millis(), 250);
        assert_eq!(policy.backoff(1).as_millis(), 500);
        assert_eq!(policy.backoff(5).as_millis(), 1_000);
    }

    #[test]
    fn default_runner_uses_noop_transport() {
        assert!(GatewayRunner::default().is_noop_transport());
    }
}
