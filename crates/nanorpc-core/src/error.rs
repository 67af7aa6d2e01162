use std::fmt;

use nanorpc_hash::HashError;
use nanorpc_wire::{Response, ResponseStatus, WireError};

/// Unifies the five error kinds from the protocol's error-handling design
/// into one type so call sites can propagate failures with `?` regardless
/// of which layer raised them.
#[derive(Debug, Clone, PartialEq)]
pub enum NanoRpcError {
    /// Unexpected EOF during a partial frame, connection reset, dial
    /// failure. Surfaced to `on_error`; triggers reconnect on the client,
    /// session teardown on the server.
    Transport(String),
    /// Invalid varint length, size over `i32::MAX`, unmarshal failure,
    /// unknown `request_type`. Closes the offending connection; other
    /// sessions are unaffected.
    Protocol(String),
    /// A status other than `OK` returned from the peer, or detected while
    /// building a response to send. Non-fatal; delivered to user callbacks
    /// as-is.
    Application {
        status: ResponseStatus,
        message: String,
    },
    /// Bad remote address, missing callback for REQUEST/SUBSCRIBE,
    /// duplicate handler registration, hash collision on register.
    /// Surfaced synchronously to the caller; no side effects.
    Configuration(String),
    /// Session closed, or a callback invoked with no response
    /// (`NoResponse`). Delivered once to every outstanding callback on
    /// session drain.
    Termination,
}

impl NanoRpcError {
    /// Builds an `Application` error from a non-OK response status.
    pub fn application(status: ResponseStatus, message: impl Into<String>) -> Self {
        NanoRpcError::Application {
            status,
            message: message.into(),
        }
    }

    /// Classifies a response's status: `None` for `OK`, otherwise the
    /// corresponding `Application` error. `UNSPECIFIED` and any unknown
    /// status are treated as errors.
    pub fn response_to_error(response: &Response) -> Option<NanoRpcError> {
        let status = ResponseStatus::from_i32(response.response_status)
            .unwrap_or(ResponseStatus::Unspecified);
        if status == ResponseStatus::Ok {
            return None;
        }
        Some(NanoRpcError::Application {
            status,
            message: response.response_message.clone(),
        })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NanoRpcError::Application {
                status: ResponseStatus::NotFound,
                ..
            }
        )
    }

    pub fn is_not_authorized(&self) -> bool {
        matches!(
            self,
            NanoRpcError::Application {
                status: ResponseStatus::NotAuthorized,
                ..
            }
        )
    }

    pub fn is_no_response(&self) -> bool {
        matches!(self, NanoRpcError::Termination)
    }
}

impl fmt::Display for NanoRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NanoRpcError::Transport(msg) => write!(f, "transport error: {msg}"),
            NanoRpcError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            NanoRpcError::Application { status, message } => {
                write!(f, "application error ({status:?}): {message}")
            }
            NanoRpcError::Configuration(msg) => write!(f, "configuration error: {msg}"),
            NanoRpcError::Termination => write!(f, "session terminated with no response"),
        }
    }
}

impl std::error::Error for NanoRpcError {}

impl From<WireError> for NanoRpcError {
    fn from(e: WireError) -> Self {
        NanoRpcError::Protocol(e.to_string())
    }
}

impl From<HashError> for NanoRpcError {
    fn from(e: HashError) -> Self {
        NanoRpcError::Configuration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: ResponseStatus, message: &str) -> Response {
        Response {
            request_id: 1,
            response_type: nanorpc_wire::ResponseType::Response as i32,
            response_status: status as i32,
            response_message: message.to_string(),
            data: Vec::new(),
        }
    }

    #[test]
    fn ok_status_has_no_error() {
        assert!(NanoRpcError::response_to_error(&response(ResponseStatus::Ok, "")).is_none());
    }

    #[test]
    fn not_found_maps_to_application_error() {
        let err =
            NanoRpcError::response_to_error(&response(ResponseStatus::NotFound, "missing"))
                .unwrap();
        assert!(err.is_not_found());
        assert!(!err.is_not_authorized());
    }

    #[test]
    fn not_authorized_maps_to_application_error() {
        let err = NanoRpcError::response_to_error(&response(
            ResponseStatus::NotAuthorized,
            "nope",
        ))
        .unwrap();
        assert!(err.is_not_authorized());
    }

    #[test]
    fn unspecified_status_is_treated_as_an_error() {
        let mut resp = response(ResponseStatus::Ok, "");
        resp.response_status = ResponseStatus::Unspecified as i32;
        assert!(NanoRpcError::response_to_error(&resp).is_some());
    }

    #[test]
    fn unknown_status_value_is_treated_as_an_error() {
        let mut resp = response(ResponseStatus::Ok, "");
        resp.response_status = 99;
        assert!(NanoRpcError::response_to_error(&resp).is_some());
    }

    #[test]
    fn termination_is_no_response() {
        assert!(NanoRpcError::Termination.is_no_response());
    }

    #[test]
    fn wire_error_becomes_protocol_error() {
        let err: NanoRpcError = WireError::UnexpectedEof.into();
        assert!(matches!(err, NanoRpcError::Protocol(_)));
    }

    #[test]
    fn hash_error_becomes_configuration_error() {
        let err: NanoRpcError = HashError::HashCollision {
            hash: 1,
            existing: "/a".into(),
            attempted: "/b".into(),
        }
        .into();
        assert!(matches!(err, NanoRpcError::Configuration(_)));
    }
}
