//! The notification service: wires every component for one user.
//!
//! ```text
//! Transport ─▶ Supervisor ─frames─▶ Router ─┐
//!                                           ├─▶ Coordinator ─▶ Notifier ─▶ NotificationSink
//! ConversationStore ─▶ Poller ──────────────┘         │
//!                                                     └──────▶ other consumers
//! ```

use std::sync::Arc;

use talkpush_core::{unix_now, ChannelKey, ConversationStore, NotificationSink, User, UserProvider};
use talkpush_protocol::{AuthParams, ClientFrame};
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::Config;
use crate::coordinator::{spawn_coordinator, CoordinatorError, CoordinatorHandle};
use crate::notifier::Notifier;
use crate::poller::{Poller, PollerHandle};
use crate::router::Router;
use crate::supervisor::{
    spawn_supervisor, ConnectionStatus, LinearBackoff, SupervisorError, SupervisorHandle,
};
use crate::transport::{ConnectTarget, Transport};

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("no current user")]
    NoCurrentUser,

    #[error("failed to encode frame: {0}")]
    Encode(String),

    #[error(transparent)]
    Coordinator(#[from] CoordinatorError),

    #[error(transparent)]
    Supervisor(#[from] SupervisorError),
}

/// External collaborators the service runs against.
#[derive(Clone)]
pub struct ServiceDeps {
    pub transport: Arc<dyn Transport>,
    pub users: Arc<dyn UserProvider>,
    pub store: Arc<dyn ConversationStore>,
    pub sink: Arc<dyn NotificationSink>,
}

pub struct NotificationService {
    user: User,
    coordinator: CoordinatorHandle,
    supervisor: SupervisorHandle,
    poller: Option<PollerHandle>,
    router: JoinHandle<()>,
    notifier: JoinHandle<()>,
    cancel: CancellationToken,
}

impl NotificationService {
    /// Starts every component and begins connecting.
    ///
    /// Fails with [`ServiceError::NoCurrentUser`] if nobody is signed in.
    pub async fn start(config: &Config, deps: ServiceDeps) -> Result<Self, ServiceError> {
        let user = deps
            .users
            .current_user()
            .ok_or(ServiceError::NoCurrentUser)?;
        let cancel = CancellationToken::new();

        let coordinator = spawn_coordinator(config.dedup);

        let notifier = Notifier::new(deps.sink, Arc::clone(&deps.users))
            .spawn(coordinator.clone(), cancel.child_token())
            .await?;

        let (supervisor, inbound) =
            spawn_supervisor(deps.transport, LinearBackoff::from(&config.reconnect));
        let router = Router::new(coordinator.clone(), Arc::clone(&deps.users)).spawn(inbound);

        let poller = config.polling.enabled.then(|| {
            Poller::new(
                coordinator.clone(),
                Arc::clone(&deps.users),
                deps.store,
                config.polling.interval(),
            )
            .spawn(cancel.clone())
        });

        let target = ConnectTarget::new(&config.server.endpoint, AuthParams::from(&config.auth))
            .with_connect_timeout(config.server.connect_timeout());
        supervisor.start(target).await?;

        info!(user = %user.user_id, polling = config.polling.enabled, "Notification service started");

        Ok(Self {
            user,
            coordinator,
            supervisor,
            poller,
            router,
            notifier,
            cancel,
        })
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.supervisor.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.supervisor.watch_status()
    }

    /// The coordinator, for registering additional consumers.
    pub fn coordinator(&self) -> &CoordinatorHandle {
        &self.coordinator
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    /// Posts a chat message to `room` over the push connection.
    pub async fn send_message(&self, room: &ChannelKey, text: &str) -> Result<(), ServiceError> {
        let frame = ClientFrame::message(room.as_str(), text)
            .from_actor(self.user.user_id.clone(), unix_now())
            .to_json()
            .map_err(|e| ServiceError::Encode(e.to_string()))?;
        self.supervisor.send(frame).await?;
        Ok(())
    }

    /// Stops the connection, the poller, the notifier and the coordinator,
    /// then waits for the background tasks to finish.
    pub async fn shutdown(self) {
        let _ = self.supervisor.stop().await;
        if let Some(poller) = self.poller {
            poller.stop().await;
        }

        self.cancel.cancel();
        let _ = self.notifier.await;

        self.coordinator.shutdown();
        // last supervisor handle: its inbound stream ends and the router exits
        drop(self.supervisor);
        let _ = self.router.await;

        info!("Notification service stopped");
    }
}
