//! Error types for the `sse` relay.
//!
//! These errors only surface at the seams of the relay (stream handles and
//! pub/sub brokers). The public relay operations (`add_client`,
//! `remove_client`, `send_event`) contain them and never return them.
use std::error::Error as StdError;
use std::fmt;

#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
}

#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Stream(StreamErrorKind),
    Broker(BrokerErrorKind),
    Serialization,
}

/// Failures writing to a client's streaming connection.
#[derive(Debug, PartialEq)]
pub enum StreamErrorKind {
    /// The stream was ended or the client went away.
    Closed,
}

#[derive(Debug, PartialEq)]
pub enum BrokerErrorKind {
    Connection,
    Publish,
    Subscribe,
}

impl Error {
    pub fn stream_closed() -> Self {
        Error {
            source: None,
            error_kind: ErrorKind::Stream(StreamErrorKind::Closed),
        }
    }

    pub fn broker(kind: BrokerErrorKind, err: redis::RedisError) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Broker(kind),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "SSE Error: {:?}: {source}", self.error_kind),
            None => write!(f, "SSE Error: {:?}", self.error_kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error {
            source: Some(Box::new(err)),
            error_kind: ErrorKind::Serialization,
        }
    }
}

// Connection-level failures are the only ones that can surface without
// knowing which broker operation was in flight.
impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::broker(BrokerErrorKind::Connection, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stream_closed_has_no_source() {
        let err = Error::stream_closed();
        assert_eq!(err.error_kind, ErrorKind::Stream(StreamErrorKind::Closed));
        assert!(err.source().is_none());
    }

    #[test]
    fn test_serde_error_maps_to_serialization_kind() {
        let serde_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: Error = serde_err.into();
        assert_eq!(err.error_kind, ErrorKind::Serialization);
        assert!(err.source().is_some());
        assert!(err.to_string().starts_with("SSE Error: Serialization"));
    }
}
