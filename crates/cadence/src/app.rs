// SPDX-FileCopyrightText: 2026 Cadence Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring of storage, engines, and webhook collaborators from configuration.

use std::sync::Arc;

use cadence_config::CadenceConfig;
use cadence_core::{CadenceError, DeliveryListener, Drafter, LeadDiscovery, SendTransport};
use cadence_dispatch::{DispatchSettings, Dispatcher};
use cadence_quota::QuotaTracker;
use cadence_radar::{RadarScheduler, RadarSettings};
use cadence_sequence::{SequenceEngine, SequenceSettings};
use cadence_storage::{Database, QueueStore};
use cadence_webhook::{WebhookClient, WebhookDiscovery, WebhookDrafter, WebhookTransport};
use tracing::debug;

/// Collaborators built from the `[webhook]` section. Unset URLs leave a slot empty.
struct Collaborators {
    transport: Option<Arc<dyn SendTransport>>,
    drafter: Option<Arc<dyn Drafter>>,
    discovery: Option<Arc<dyn LeadDiscovery>>,
}

impl Collaborators {
    fn from_config(config: &CadenceConfig) -> Result<Self, CadenceError> {
        let webhook = &config.webhook;
        let client = WebhookClient::from_config(webhook)?;

        let transport = webhook.transport_url.as_ref().map(|url| {
            Arc::new(WebhookTransport::new(client.clone(), url)) as Arc<dyn SendTransport>
        });
        let drafter = webhook
            .drafter_url
            .as_ref()
            .map(|url| Arc::new(WebhookDrafter::new(client.clone(), url)) as Arc<dyn Drafter>);
        let discovery = webhook.discovery_url.as_ref().map(|url| {
            Arc::new(WebhookDiscovery::new(client.clone(), url)) as Arc<dyn LeadDiscovery>
        });

        debug!(
            transport = transport.is_some(),
            drafter = drafter.is_some(),
            discovery = discovery.is_some(),
            "webhook collaborators configured"
        );
        Ok(Self {
            transport,
            drafter,
            discovery,
        })
    }
}

/// An opened database plus the components every command needs.
pub struct App {
    pub db: Database,
    pub queue: QueueStore,
    pub quota: QuotaTracker,
    pub engine: SequenceEngine,
    transport: Option<Arc<dyn SendTransport>>,
    discovery: Option<Arc<dyn LeadDiscovery>>,
    dispatch_settings: DispatchSettings,
    radar_settings: RadarSettings,
}

impl App {
    pub async fn open(config: CadenceConfig) -> Result<Self, CadenceError> {
        let safety = config.safety.settings()?;
        let collaborators = Collaborators::from_config(&config)?;
        let db = Database::from_config(&config.storage).await?;

        let mut engine = SequenceEngine::new(db.clone(), SequenceSettings::from(&config.sequence));
        if let Some(drafter) = collaborators.drafter {
            engine = engine.with_drafter(drafter);
        }
        if let Some(discovery) = &collaborators.discovery {
            engine = engine.with_discovery(discovery.clone());
        }

        Ok(Self {
            queue: QueueStore::new(db.clone()),
            quota: QuotaTracker::new(db.clone(), safety),
            engine,
            transport: collaborators.transport,
            discovery: collaborators.discovery,
            dispatch_settings: DispatchSettings::from(&config.dispatch),
            radar_settings: RadarSettings::from(&config.radar),
            db,
        })
    }

    /// The dispatcher, with the sequence engine listening for terminal failures.
    pub fn dispatcher(&self) -> Result<Dispatcher, CadenceError> {
        let transport = self.transport.clone().ok_or_else(|| {
            CadenceError::Config("webhook.transport_url must be set to dispatch messages".into())
        })?;
        let listener: Arc<dyn DeliveryListener> = Arc::new(self.engine.clone());
        Ok(Dispatcher::new(
            self.queue.clone(),
            self.quota.clone(),
            transport,
            self.dispatch_settings.clone(),
        )
        .with_listener(listener))
    }

    pub fn radar(&self) -> Result<RadarScheduler, CadenceError> {
        let discovery = self.discovery.clone().ok_or_else(|| {
            CadenceError::Config("webhook.discovery_url must be set to run radar campaigns".into())
        })?;
        Ok(RadarScheduler::new(
            self.db.clone(),
            self.engine.clone(),
            discovery,
            self.radar_settings.clone(),
        ))
    }

    pub async fn close(self) -> Result<(), CadenceError> {
        self.db.close().await
    }
}
