use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};

use async_trait::async_trait;
use relay_core::{
    parse_listing, SourceMessageId, Submission, SubmissionDraft, SubmissionError, SubmissionStore,
};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayEnvelope {
    pub envelope_id: String,
    pub event: GatewayEvent,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayEvent {
    Ready(ReadyEvent),
    MessageCreated(MessageCreatedEvent),
    ReactionAdded(ReactionEvent),
    ReactionRemoved(ReactionEvent),
    Unsupported { event_type: String },
}

impl GatewayEvent {
    pub fn event_type(&self) -> GatewayEventType {
        match self {
            Self::Ready(_) => GatewayEventType::Ready,
            Self::MessageCreated(_) => GatewayEventType::MessageCreated,
            Self::ReactionAdded(_) => GatewayEventType::ReactionAdded,
            Self::ReactionRemoved(_) => GatewayEventType::ReactionRemoved,
            Self::Unsupported { .. } => GatewayEventType::Unsupported,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum GatewayEventType {
    Ready,
    MessageCreated,
    ReactionAdded,
    ReactionRemoved,
    Unsupported,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReadyEvent {
    pub user_tag: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MessageCreatedEvent {
    pub message_id: String,
    pub channel_id: String,
    pub author_id: String,
    pub content: String,
    pub attachments: Vec<Attachment>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub id: String,
    pub url: String,
    pub filename: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReactionEvent {
    pub channel_id: String,
    pub message_id: String,
    pub user_id: String,
    pub username: String,
    pub user_is_bot: bool,
    pub emoji: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

impl Default for EventContext {
    fn default() -> Self {
        Self { correlation_id: "unknown-correlation-id".to_owned() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Recorded(Submission),
    Updated(Submission),
    Processed,
    Ignored(IgnoreReason),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    NotReady,
    NoHandler,
    OtherChannel,
    NoAttachment,
    IncompleteListing,
    BotUser,
    OtherEmoji,
    UntrackedMessage,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error(transparent)]
    Handler(#[from] EventHandlerError),
}

/// Channel and emoji the listener reacts to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerSettings {
    pub channel_id: String,
    pub approve_emoji: String,
}

impl ListenerSettings {
    pub fn new(channel_id: impl Into<String>, approve_emoji: impl Into<String>) -> Self {
        Self { channel_id: channel_id.into(), approve_emoji: approve_emoji.into() }
    }

    fn is_tracked_channel(&self, channel_id: &str) -> bool {
        self.channel_id == channel_id
    }

    fn is_approve_emoji(&self, emoji: &str) -> bool {
        normalize_emoji(emoji) == normalize_emoji(&self.approve_emoji)
    }
}

/// Whether the gateway has signalled that the feed is live.
#[derive(Clone, Debug, Default)]
pub struct Readiness {
    ready: Arc<AtomicBool>,
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn mark_disconnected(&self) {
        self.ready.store(false, Ordering::Release);
    }
}

#[async_trait]
pub trait SubmissionService: Send + Sync {
    async fn record_submission(
        &self,
        draft: SubmissionDraft,
    ) -> Result<Submission, SubmissionError>;

    async fn set_verified_for_message(
        &self,
        message_id: &SourceMessageId,
        verified: bool,
    ) -> Option<Submission>;
}

#[async_trait]
impl SubmissionService for SubmissionStore {
    async fn record_submission(
        &self,
        draft: SubmissionDraft,
    ) -> Result<Submission, SubmissionError> {
        self.create(draft).await
    }

    async fn set_verified_for_message(
        &self,
        message_id: &SourceMessageId,
        verified: bool,
    ) -> Option<Submission> {
        SubmissionStore::set_verified_for_message(self, message_id, verified).await
    }
}

#[async_trait]
pub trait EventHandler: Send + Sync {
    fn event_type(&self) -> GatewayEventType;
    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;
}

#[derive(Default)]
pub struct EventDispatcher {
    handlers: HashMap<GatewayEventType, Arc<dyn EventHandler>>,
    readiness: Readiness,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<H>(&mut self, handler: H)
    where
        H: EventHandler + 'static,
    {
        self.handlers.insert(handler.event_type(), Arc::new(handler));
    }

    pub fn readiness(&self) -> &Readiness {
        &self.readiness
    }

    pub async fn dispatch(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, DispatchError> {
        if let GatewayEvent::Ready(ready) = &envelope.event {
            self.readiness.mark_ready();
            info!(
                event_name = "ingress.discord.ready",
                correlation_id = %ctx.correlation_id,
                user_tag = %ready.user_tag,
                "gateway session ready"
            );
            return Ok(HandlerResult::Processed);
        }

        if !self.readiness.is_ready() {
            debug!(
                event_name = "ingress.discord.not_ready",
                correlation_id = %ctx.correlation_id,
                event_type = ?envelope.event.event_type(),
                "dropping event received before gateway ready"
            );
            return Ok(HandlerResult::Ignored(IgnoreReason::NotReady));
        }

        let Some(handler) = self.handlers.get(&envelope.event.event_type()) else {
            return Ok(HandlerResult::Ignored(IgnoreReason::NoHandler));
        };

        handler.handle(envelope, ctx).await.map_err(DispatchError::from)
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }
}

pub fn listener_dispatcher<S>(service: Arc<S>, settings: ListenerSettings) -> EventDispatcher
where
    S: SubmissionService + 'static,
{
    let mut dispatcher = EventDispatcher::new();
    dispatcher.register(MessageCreatedHandler::new(service.clone(), settings.clone()));
    dispatcher.register(ReactionHandler::added(service.clone(), settings.clone()));
    dispatcher.register(ReactionHandler::removed(service, settings));
    dispatcher
}

pub struct MessageCreatedHandler<S> {
    service: Arc<S>,
    settings: ListenerSettings,
}

impl<S> MessageCreatedHandler<S>
where
    S: SubmissionService,
{
    pub fn new(service: Arc<S>, settings: ListenerSettings) -> Self {
        Self { service, settings }
    }
}

#[async_trait]
impl<S> EventHandler for MessageCreatedHandler<S>
where
    S: SubmissionService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        GatewayEventType::MessageCreated
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let GatewayEvent::MessageCreated(event) = &envelope.event else {
            return Ok(HandlerResult::Ignored(IgnoreReason::NoHandler));
        };

        if !self.settings.is_tracked_channel(&event.channel_id) {
            return Ok(HandlerResult::Ignored(IgnoreReason::OtherChannel));
        }
        let Some(attachment) = event.attachments.first() else {
            return Ok(HandlerResult::Ignored(IgnoreReason::NoAttachment));
        };
        let Some(fields) = parse_listing(&event.content) else {
            debug!(
                event_name = "ingress.submission.incomplete",
                correlation_id = %ctx.correlation_id,
                message_id = %event.message_id,
                "message is missing a listing field; dropping"
            );
            return Ok(HandlerResult::Ignored(IgnoreReason::IncompleteListing));
        };

        let draft = SubmissionDraft {
            source_message_id: Some(SourceMessageId(event.message_id.clone())),
            conversion: Some(fields.conversion),
            price: Some(fields.price),
            stock: Some(fields.stock),
            image: Some(attachment.url.clone()),
        };

        match self.service.record_submission(draft).await {
            Ok(submission) => {
                info!(
                    event_name = "ingress.submission.recorded",
                    correlation_id = %ctx.correlation_id,
                    message_id = %event.message_id,
                    submission_id = %submission.id,
                    conversion = %submission.conversion,
                    "new submission"
                );
                Ok(HandlerResult::Recorded(submission))
            }
            Err(SubmissionError::MissingFields(missing)) => {
                debug!(
                    event_name = "ingress.submission.incomplete",
                    correlation_id = %ctx.correlation_id,
                    message_id = %event.message_id,
                    missing = ?missing,
                    "attachment or listing field is blank; dropping"
                );
                Ok(HandlerResult::Ignored(IgnoreReason::IncompleteListing))
            }
            Err(error) => Err(error.into()),
        }
    }
}

/// Applies approve-emoji reactions: adding one verifies the submission,
/// removing it clears the flag.
pub struct ReactionHandler<S> {
    service: Arc<S>,
    settings: ListenerSettings,
    event_type: GatewayEventType,
}

impl<S> ReactionHandler<S>
where
    S: SubmissionService,
{
    pub fn added(service: Arc<S>, settings: ListenerSettings) -> Self {
        Self { service, settings, event_type: GatewayEventType::ReactionAdded }
    }

    pub fn removed(service: Arc<S>, settings: ListenerSettings) -> Self {
        Self { service, settings, event_type: GatewayEventType::ReactionRemoved }
    }
}

#[async_trait]
impl<S> EventHandler for ReactionHandler<S>
where
    S: SubmissionService + 'static,
{
    fn event_type(&self) -> GatewayEventType {
        self.event_type
    }

    async fn handle(
        &self,
        envelope: &GatewayEnvelope,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let (event, verified) = match &envelope.event {
            GatewayEvent::ReactionAdded(event) => (event, true),
            GatewayEvent::ReactionRemoved(event) => (event, false),
            _ => return Ok(HandlerResult::Ignored(IgnoreReason::NoHandler)),
        };

        if event.user_is_bot {
            return Ok(HandlerResult::Ignored(IgnoreReason::BotUser));
        }
        if !self.settings.is_tracked_channel(&event.channel_id) {
            return Ok(HandlerResult::Ignored(IgnoreReason::OtherChannel));
        }
        if !self.settings.is_approve_emoji(&event.emoji) {
            return Ok(HandlerResult::Ignored(IgnoreReason::OtherEmoji));
        }

        let message_id = SourceMessageId(event.message_id.clone());
        let Some(submission) = self.service.set_verified_for_message(&message_id, verified).await
        else {
            return Ok(HandlerResult::Ignored(IgnoreReason::UntrackedMessage));
        };

        info!(
            event_name = "ingress.submission.verification_changed",
            correlation_id = %ctx.correlation_id,
            message_id = %event.message_id,
            submission_id = %submission.id,
            verified,
            username = %event.username,
            "{} by {}",
            if verified { "verified" } else { "unverified" },
            event.username
        );
        Ok(HandlerResult::Updated(submission))
    }
}

fn normalize_emoji(emoji: &str) -> &str {
    emoji.trim().trim_matches(':')
}
