//! Protobuf wire types for NanoRPC.
//!
//! These types are maintained by hand in the shape `prost-build` would
//! generate from the `.proto` schema in the protocol specification (field
//! numbers and enum values are normative and shared bit-for-bit with the
//! embedded C peer). There is no `build.rs`/`protoc` step in this crate;
//! keeping the generated-looking module in the tree and reviewing it by
//! hand is acceptable as long as the wire bytes match, which the codec
//! round-trip tests in `codec.rs` pin down.

/// A request frame sent from client to server.
///
/// `path_oneof` is absent for `PING` requests; exactly one of `path` or
/// `path_hash` is set otherwise.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Request {
    #[prost(int32, tag = "1")]
    pub request_id: i32,
    #[prost(enumeration = "RequestType", tag = "2")]
    pub request_type: i32,
    #[prost(oneof = "request::PathOneof", tags = "3, 4")]
    pub path_oneof: Option<request::PathOneof>,
    #[prost(bytes = "vec", tag = "10")]
    pub data: Vec<u8>,
}

/// Nested types for [`Request`].
pub mod request {
    /// Exactly one of a resolved string path or a cached 32-bit FNV-1a hash.
    #[derive(Clone, PartialEq, ::prost::Oneof)]
    pub enum PathOneof {
        #[prost(uint32, tag = "3")]
        PathHash(u32),
        #[prost(string, tag = "4")]
        Path(::prost::alloc::string::String),
    }
}

/// A response frame sent from server to client.
///
/// For `UPDATE` responses, `request_id` mirrors the originating
/// `SUBSCRIBE`'s request ID, not a fresh one.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Response {
    #[prost(int32, tag = "1")]
    pub request_id: i32,
    #[prost(enumeration = "ResponseType", tag = "2")]
    pub response_type: i32,
    #[prost(enumeration = "ResponseStatus", tag = "3")]
    pub response_status: i32,
    #[prost(string, tag = "4")]
    pub response_message: ::prost::alloc::string::String,
    #[prost(bytes = "vec", tag = "10")]
    pub data: Vec<u8>,
}

/// Request frame kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum RequestType {
    Unspecified = 0,
    Ping = 1,
    Request = 2,
    Subscribe = 3,
}

/// Response frame kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseType {
    Unspecified = 0,
    Pong = 1,
    Response = 2,
    Update = 3,
}

/// Response status code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ::prost::Enumeration)]
#[repr(i32)]
pub enum ResponseStatus {
    Unspecified = 0,
    Ok = 1,
    NotFound = 2,
    NotAuthorized = 3,
    InternalError = 4,
}

impl Request {
    /// A `PING` request with the given request ID and no payload.
    pub fn ping(request_id: i32) -> Self {
        Self {
            request_id,
            request_type: RequestType::Ping as i32,
            path_oneof: None,
            data: Vec::new(),
        }
    }

    /// Returns the string path if this request carries one, else `None`.
    pub fn path(&self) -> Option<&str> {
        match &self.path_oneof {
            Some(request::PathOneof::Path(p)) => Some(p),
            _ => None,
        }
    }

    /// Returns the path hash if this request carries one, else `None`.
    pub fn path_hash(&self) -> Option<u32> {
        match &self.path_oneof {
            Some(request::PathOneof::PathHash(h)) => Some(*h),
            _ => None,
        }
    }
}

impl Response {
    /// Builds a `PONG` reply mirroring `request_id` with `OK` status.
    pub fn pong(request_id: i32) -> Self {
        Self {
            request_id,
            response_type: ResponseType::Pong as i32,
            response_status: ResponseStatus::Ok as i32,
            response_message: String::new(),
            data: Vec::new(),
        }
    }

    /// Builds an `OK` `RESPONSE` reply carrying `data`.
    pub fn ok(request_id: i32, data: Vec<u8>) -> Self {
        Self {
            request_id,
            response_type: ResponseType::Response as i32,
            response_status: ResponseStatus::Ok as i32,
            response_message: String::new(),
            data,
        }
    }

    /// Builds an error `RESPONSE` reply. `status` is coerced to
    /// `INTERNAL_ERROR` if the caller passes `OK` by mistake — errors never
    /// carry `OK`.
    pub fn error(request_id: i32, status: ResponseStatus, message: impl Into<String>) -> Self {
        let status = if status == ResponseStatus::Ok {
            ResponseStatus::InternalError
        } else {
            status
        };
        Self {
            request_id,
            response_type: ResponseType::Response as i32,
            response_status: status as i32,
            response_message: message.into(),
            data: Vec::new(),
        }
    }

    /// Builds an `UPDATE` reply for a subscription, echoing the
    /// subscription's original request ID.
    pub fn update(request_id: i32, data: Vec<u8>) -> Self {
        Self {
            request_id,
            response_type: ResponseType::Update as i32,
            response_status: ResponseStatus::Ok as i32,
            response_message: String::new(),
            data,
        }
    }

    /// `true` if `response_status == OK`.
    pub fn is_ok(&self) -> bool {
        self.response_status == ResponseStatus::Ok as i32
    }
}
