use crate::error::{
    ConnectFailure, LinkError, PublishError, RefusalReason, TransportError, UnsolicitedDisconnect,
};
use crate::metrics::MetricsSnapshot;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Notification from the broker session, delivered by the transport's
/// background task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LinkEvent {
    /// Broker accepted the connection.
    Acknowledged,
    /// Broker answered the connect with a refusal code.
    Refused(RefusalReason),
    /// Transport error, either while connecting or mid-session.
    Failed(String),
    /// Broker closed the session on its own.
    BrokerClosed,
    /// Our own graceful disconnect went out.
    Closed,
}

#[derive(Debug)]
struct LinkStatus {
    state: ConnectionState,
    last_failure: Option<LinkError>,
}

/// Shared, lock-guarded connection status. Cloned into the transport task so
/// broker events land in the same place the publish path reads from.
#[derive(Clone, Debug)]
pub struct LinkHandle {
    inner: Arc<Mutex<LinkStatus>>,
}

impl Default for LinkHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl LinkHandle {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LinkStatus {
                state: ConnectionState::Disconnected,
                last_failure: None,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkStatus> {
        match self.inner.lock() {
            Ok(g) => g,
            // Continue with the inner value even if poisoned.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn last_failure(&self) -> Option<LinkError> {
        self.lock().last_failure.clone()
    }

    /// Applies one broker event and returns the failure it represents, if any.
    pub fn apply(&self, event: LinkEvent) -> Option<LinkError> {
        let mut status = self.lock();
        let was_connected = status.state == ConnectionState::Connected;

        let failure: Option<LinkError> = match event {
            LinkEvent::Acknowledged => {
                status.state = ConnectionState::Connected;
                status.last_failure = None;
                info!("Connected to MQTT broker");
                return None;
            }
            LinkEvent::Closed => {
                status.state = ConnectionState::Disconnected;
                if was_connected {
                    info!("Gracefully disconnected from MQTT broker");
                }
                return None;
            }
            LinkEvent::Refused(reason) => Some(ConnectFailure::Refused(reason).into()),
            LinkEvent::Failed(reason) if was_connected => {
                Some(UnsolicitedDisconnect { reason }.into())
            }
            LinkEvent::Failed(reason) => Some(ConnectFailure::Transport(reason).into()),
            LinkEvent::BrokerClosed if was_connected => Some(
                UnsolicitedDisconnect {
                    reason: "closed by broker".to_string(),
                }
                .into(),
            ),
            LinkEvent::BrokerClosed => {
                Some(ConnectFailure::Transport("closed by broker".to_string()).into())
            }
        };

        status.state = ConnectionState::Disconnected;
        if let Some(f) = &failure {
            warn!("{}", f);
        }
        status.last_failure = failure.clone();
        failure
    }

    fn record(&self, failure: LinkError) {
        warn!("{}", failure);
        self.lock().last_failure = Some(failure);
    }
}

/// Broker client seam. `open` starts a session whose outcome arrives later as
/// `LinkEvent`s on the given handle; `send` never waits for delivery.
pub trait Transport {
    fn open(&mut self, link: LinkHandle) -> Result<(), TransportError>;
    /// Fails unless the next `count` sends are guaranteed to be accepted.
    fn reserve(&self, count: usize) -> Result<(), TransportError>;
    fn send(&self, topic: &str, payload: String) -> Result<(), TransportError>;
    /// Ends the current session, if any, and waits for its background work to stop.
    fn close(&mut self) -> impl Future<Output = ()> + Send;
}

/// Topic names for the published subset of a snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    pub cpu: String,
    pub ram_percent: String,
    pub disk_read: String,
    pub disk_write: String,
    pub net_recv: String,
    pub net_sent: String,
}

impl Topics {
    pub fn new(prefix: &str) -> Self {
        Self {
            cpu: format!("{prefix}/cpu"),
            ram_percent: format!("{prefix}/ram/percent"),
            disk_read: format!("{prefix}/disk/read"),
            disk_write: format!("{prefix}/disk/write"),
            net_recv: format!("{prefix}/net/recv"),
            net_sent: format!("{prefix}/net/sent"),
        }
    }

    /// Renders every (topic, payload) pair for one tick. Totals such as RAM GB
    /// and disk usage are not part of the published set.
    pub fn messages(&self, snapshot: &MetricsSnapshot) -> [(&str, String); 6] {
        [
            (self.cpu.as_str(), format_payload(snapshot.cpu_percent)),
            (self.ram_percent.as_str(), format_payload(snapshot.ram_percent)),
            (self.disk_read.as_str(), format_payload(snapshot.disk_read_rate)),
            (self.disk_write.as_str(), format_payload(snapshot.disk_write_rate)),
            (self.net_recv.as_str(), format_payload(snapshot.net_recv_rate)),
            (self.net_sent.as_str(), format_payload(snapshot.net_sent_rate)),
        ]
    }
}

/// Plain-text payload: whole numbers keep one decimal (`5.0`), anything else
/// prints its shortest round-trip form (`12.34`).
pub fn format_payload(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Keeps a best-effort broker session and gates publishing on it.
pub struct PublishLifecycle<T> {
    transport: T,
    topics: Topics,
    link: LinkHandle,
    session_open: bool,
}

impl<T: Transport> PublishLifecycle<T> {
    pub fn new(transport: T, topic_prefix: &str) -> Self {
        Self {
            transport,
            topics: Topics::new(topic_prefix),
            link: LinkHandle::new(),
            session_open: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.link.state()
    }

    pub fn link(&self) -> &LinkHandle {
        &self.link
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    pub fn last_failure(&self) -> Option<LinkError> {
        self.link.last_failure()
    }

    /// Starts a connection attempt. Success here only means the attempt is
    /// under way; the state flips to Connected when the broker acknowledges.
    /// Any stale session is torn down first.
    pub async fn connect(&mut self) -> Result<(), ConnectFailure> {
        if self.link.is_connected() {
            return Ok(());
        }
        if self.session_open {
            self.transport.close().await;
            self.session_open = false;
        }
        match self.transport.open(self.link.clone()) {
            Ok(()) => {
                self.session_open = true;
                debug!("Connection attempt started");
                Ok(())
            }
            Err(e) => {
                let failure = ConnectFailure::Transport(e.0);
                self.link.record(failure.clone().into());
                Err(failure)
            }
        }
    }

    /// Graceful close. Always ends Disconnected.
    pub async fn disconnect(&mut self) {
        if self.session_open {
            self.transport.close().await;
            self.session_open = false;
        }
        self.link.apply(LinkEvent::Closed);
    }

    /// Sends every published metric of `snapshot`, or nothing at all: when
    /// not Connected, or when the transport cannot take the whole tick.
    /// Returns the number of messages handed to the transport.
    pub fn publish(&self, snapshot: &MetricsSnapshot) -> Result<usize, PublishError> {
        if !self.link.is_connected() {
            return Err(PublishError::NotConnected);
        }
        let messages = self.topics.messages(snapshot);
        let count = messages.len();
        self.transport.reserve(count)?;
        for (topic, payload) in messages {
            self.transport.send(topic, payload)?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_text_shape() {
        assert_eq!(format_payload(5.0), "5.0");
        assert_eq!(format_payload(0.0), "0.0");
        assert_eq!(format_payload(12.34), "12.34");
        assert_eq!(format_payload(99.9), "99.9");
        assert_eq!(format_payload(100.0), "100.0");
    }

    #[test]
    fn topic_names_follow_prefix() {
        let topics = Topics::new("obsidianhub/system_monitor");
        assert_eq!(topics.cpu, "obsidianhub/system_monitor/cpu");
        assert_eq!(topics.ram_percent, "obsidianhub/system_monitor/ram/percent");
        assert_eq!(topics.disk_read, "obsidianhub/system_monitor/disk/read");
        assert_eq!(topics.disk_write, "obsidianhub/system_monitor/disk/write");
        assert_eq!(topics.net_recv, "obsidianhub/system_monitor/net/recv");
        assert_eq!(topics.net_sent, "obsidianhub/system_monitor/net/sent");
    }

    #[test]
    fn ack_then_unsolicited_drop() {
        let link = LinkHandle::new();
        assert_eq!(link.state(), ConnectionState::Disconnected);

        assert_eq!(link.apply(LinkEvent::Acknowledged), None);
        assert_eq!(link.state(), ConnectionState::Connected);

        let failure = link.apply(LinkEvent::Failed("connection reset".into()));
        assert_eq!(
            failure,
            Some(LinkError::Disconnect(UnsolicitedDisconnect {
                reason: "connection reset".into()
            }))
        );
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(link.last_failure(), failure);
    }

    #[test]
    fn failure_before_ack_is_connect_failure() {
        let link = LinkHandle::new();
        let failure = link.apply(LinkEvent::Failed("connection refused".into()));
        assert_eq!(
            failure,
            Some(LinkError::Connect(ConnectFailure::Transport(
                "connection refused".into()
            )))
        );
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn refusal_keeps_disconnected_and_ack_clears_failure() {
        let link = LinkHandle::new();
        link.apply(LinkEvent::Refused(RefusalReason::NotAuthorized));
        assert_eq!(link.state(), ConnectionState::Disconnected);
        assert_eq!(
            link.last_failure(),
            Some(LinkError::Connect(ConnectFailure::Refused(
                RefusalReason::NotAuthorized
            )))
        );

        link.apply(LinkEvent::Acknowledged);
        assert_eq!(link.last_failure(), None);
    }

    #[test]
    fn broker_close_and_graceful_close() {
        let link = LinkHandle::new();
        link.apply(LinkEvent::Acknowledged);
        assert!(matches!(
            link.apply(LinkEvent::BrokerClosed),
            Some(LinkError::Disconnect(_))
        ));

        link.apply(LinkEvent::Acknowledged);
        assert_eq!(link.apply(LinkEvent::Closed), None);
        assert_eq!(link.state(), ConnectionState::Disconnected);
    }
}
