use std::sync::Arc;

use relay_core::config::{AppConfig, ConfigError, LoadOptions};
use relay_core::SubmissionStore;
use relay_discord::events::{listener_dispatcher, EventDispatcher, GatewayEnvelope, ListenerSettings};
use relay_discord::gateway::{ChannelGatewayTransport, GatewayRunner, ReconnectPolicy};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{info, warn};

const GATEWAY_BUFFER: usize = 256;

pub struct Application {
    pub config: AppConfig,
    pub store: Arc<SubmissionStore>,
    pub gateway_runner: GatewayRunner,
    /// Entry point for the gateway client; `None` when ingress is disabled.
    pub gateway_sender: Option<mpsc::Sender<GatewayEnvelope>>,
    pub ingress_enabled: bool,
}

impl Application {
    /// Ingress is configured but nothing has taken the sender yet, so the
    /// runner will wait for a gateway client indefinitely.
    pub fn awaiting_gateway_client(&self) -> bool {
        self.gateway_sender.is_some()
    }
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );
    let config = AppConfig::load(options)?;
    Ok(bootstrap_with_config(config))
}

pub fn bootstrap_with_config(config: AppConfig) -> Application {
    info!(
        event_name = "system.bootstrap.env_check",
        correlation_id = "bootstrap",
        has_token = config.discord.has_token(),
        channel_id = config.discord.channel_id.as_deref().unwrap_or("unset"),
        "environment check"
    );

    let store = Arc::new(SubmissionStore::new(config.store.capacity));
    let ingress_enabled = config.discord.ingress_enabled();

    let (gateway_runner, gateway_sender) = match config.discord.channel_id.as_deref() {
        Some(channel_id) if ingress_enabled => {
            let settings = ListenerSettings::new(channel_id, config.discord.approve_emoji.as_str());
            let dispatcher = listener_dispatcher(store.clone(), settings);
            let (transport, sender) = ChannelGatewayTransport::new(GATEWAY_BUFFER);
            let runner = GatewayRunner::new(
                Arc::new(transport),
                dispatcher,
                ReconnectPolicy::from(&config.gateway),
            );
            (runner, Some(sender))
        }
        _ => {
            warn!(
                event_name = "system.bootstrap.ingress_disabled",
                correlation_id = "bootstrap",
                "discord token or channel id missing; ingress disabled, api still served"
            );
            (GatewayRunner::disabled(EventDispatcher::new()), None)
        }
    };

    info!(
        event_name = "system.bootstrap.store_ready",
        correlation_id = "bootstrap",
        capacity = store.capacity(),
        recent_limit = config.store.recent_limit,
        "submission store initialized"
    );

    Application { config, store, gateway_runner, gateway_sender, ingress_enabled }
}
