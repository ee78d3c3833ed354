use thiserror::Error;

/// Failure reading from the OS metrics provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("metrics are not supported on this platform")]
    Unsupported,
    #[error("{0} statistics unavailable")]
    Unavailable(&'static str),
    #[error("no filesystem mounted at {0}")]
    MountNotFound(String),
    #[error("provider error: {0}")]
    Other(String),
}

/// A tick produced no snapshot. The sampler baseline is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("collecting metrics failed: {source}")]
pub struct CollectError {
    #[from]
    pub source: ProviderError,
}

/// Reason codes a broker may return when refusing a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RefusalReason {
    #[error("incorrect protocol version")]
    ProtocolVersion,
    #[error("invalid client ID")]
    ClientId,
    #[error("server unavailable")]
    ServerUnavailable,
    #[error("bad username/password")]
    BadCredentials,
    #[error("not authorized")]
    NotAuthorized,
    #[error("unknown error ({0})")]
    Other(u8),
}

/// Connect attempt did not reach the Connected state. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectFailure {
    #[error("connection refused: {0}")]
    Refused(RefusalReason),
    #[error("connection error: {0}")]
    Transport(String),
}

/// Link lost while Connected, without us asking for it. Always retryable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unexpected disconnection: {reason}")]
pub struct UnsolicitedDisconnect {
    pub reason: String,
}

/// Most recent link problem recorded by the publish lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    #[error(transparent)]
    Connect(#[from] ConnectFailure),
    #[error(transparent)]
    Disconnect(#[from] UnsolicitedDisconnect),
}

/// Error surfaced by a `Transport` implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct TransportError(pub String);

/// A tick's metrics were not published.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PublishError {
    #[error("not connected to broker")]
    NotConnected,
    #[error("publish error: {0}")]
    Transport(#[from] TransportError),
}
