use crate::config::BrokerConfig;
use crate::error::{RefusalReason, TransportError};
use crate::publisher::{LinkEvent, LinkHandle, Transport};
use rumqttc::{
    AsyncClient, ConnectReturnCode, ConnectionError, Event, EventLoop, MqttOptions, Outgoing,
    Packet, QoS,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Request queue depth between the client handle and its event loop.
const REQUEST_CAPACITY: usize = 64;
/// How long `close` lets a connected event loop flush the DISCONNECT packet.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

struct Session {
    client: AsyncClient,
    /// Yields the event loop back on exit, so the request queue outlives the
    /// connection until the session is joined.
    task: JoinHandle<EventLoop>,
    cancel: CancellationToken,
    link: LinkHandle,
    /// Publishes handed to `client` and not yet taken by the event loop.
    queued: Arc<AtomicUsize>,
}

/// `Transport` over rumqttc. Each `open` creates a fresh client and event
/// loop; rumqttc's own reconnect is not used, the lifecycle decides when to
/// try again.
pub struct MqttTransport {
    config: BrokerConfig,
    session: Option<Session>,
}

impl MqttTransport {
    pub fn new(config: BrokerConfig) -> Self {
        Self {
            config,
            session: None,
        }
    }

    fn session(&self) -> Result<&Session, TransportError> {
        self.session
            .as_ref()
            .ok_or_else(|| TransportError("no open session".to_string()))
    }
}

pub fn mqtt_options(config: &BrokerConfig) -> MqttOptions {
    let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
    options.set_keep_alive(config.keep_alive);
    options.set_clean_session(true);
    if let Some((username, password)) = &config.credentials {
        options.set_credentials(username.clone(), password.clone());
    }
    options
}

pub fn refusal_reason(code: ConnectReturnCode) -> RefusalReason {
    match code {
        ConnectReturnCode::RefusedProtocolVersion => RefusalReason::ProtocolVersion,
        ConnectReturnCode::BadClientId => RefusalReason::ClientId,
        ConnectReturnCode::ServiceUnavailable => RefusalReason::ServerUnavailable,
        ConnectReturnCode::BadUserNamePassword => RefusalReason::BadCredentials,
        ConnectReturnCode::NotAuthorized => RefusalReason::NotAuthorized,
        ConnectReturnCode::Success => RefusalReason::Other(0),
    }
}

impl Transport for MqttTransport {
    fn open(&mut self, link: LinkHandle) -> Result<(), TransportError> {
        if self.session.is_some() {
            return Err(TransportError("a session is already open".to_string()));
        }
        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| TransportError(e.to_string()))?;

        let (client, eventloop) = AsyncClient::new(mqtt_options(&self.config), REQUEST_CAPACITY);
        let cancel = CancellationToken::new();
        let queued = Arc::new(AtomicUsize::new(0));
        let task = runtime.spawn(drive(
            eventloop,
            link.clone(),
            cancel.clone(),
            Arc::clone(&queued),
        ));
        debug!(
            "Connecting to {}:{} as {}",
            self.config.host, self.config.port, self.config.client_id
        );

        self.session = Some(Session {
            client,
            task,
            cancel,
            link,
            queued,
        });
        Ok(())
    }

    fn reserve(&self, count: usize) -> Result<(), TransportError> {
        let session = self.session()?;
        let queued = session.queued.load(Ordering::SeqCst);
        if queued + count > REQUEST_CAPACITY {
            return Err(TransportError(format!(
                "request queue full ({queued} of {REQUEST_CAPACITY} slots in use)"
            )));
        }
        Ok(())
    }

    fn send(&self, topic: &str, payload: String) -> Result<(), TransportError> {
        let session = self.session()?;
        session
            .client
            .try_publish(topic, QoS::AtMostOnce, false, payload.into_bytes())
            .map_err(|e| TransportError(e.to_string()))?;
        session.queued.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) {
        let Some(session) = self.session.take() else {
            return;
        };
        let mut task = session.task;
        // Before ConnAck the event loop never reads the request queue, so a
        // DISCONNECT would just sit there until the grace period ran out.
        if session.link.is_connected() {
            if let Err(e) = session.client.try_disconnect() {
                debug!("Disconnect request not queued: {}", e);
            }
            if tokio::time::timeout(CLOSE_GRACE, &mut task).await.is_ok() {
                return;
            }
        }
        session.cancel.cancel();
        let _ = task.await;
    }
}

/// Polls the event loop until the session ends, reporting into `link`.
async fn drive(
    mut eventloop: EventLoop,
    link: LinkHandle,
    cancel: CancellationToken,
    queued: Arc<AtomicUsize>,
) -> EventLoop {
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = eventloop.poll() => event,
        };
        match event {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                link.apply(LinkEvent::Acknowledged);
            }
            Ok(Event::Outgoing(Outgoing::Publish(_))) => {
                let _ = queued.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                    Some(n.saturating_sub(1))
                });
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                link.apply(LinkEvent::BrokerClosed);
                break;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                link.apply(LinkEvent::Closed);
                break;
            }
            Ok(_) => {}
            Err(ConnectionError::ConnectionRefused(code)) => {
                link.apply(LinkEvent::Refused(refusal_reason(code)));
                break;
            }
            Err(e) => {
                link.apply(LinkEvent::Failed(e.to_string()));
                break;
            }
        }
    }
    debug!("MQTT event loop stopped");
    eventloop
}
