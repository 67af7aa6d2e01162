//! Wire codec for NanoRPC: protobuf message shapes, varint framing, and a
//! `tokio_util` [`Decoder`](tokio_util::codec::Decoder) that streams frames
//! out of a buffered reader.

mod codec;
mod error;
mod proto;
mod varint;

pub use codec::{decode_message, encode_frame, split_frame, FrameCodec, MAX_FRAME_LEN};
pub use error::WireError;
pub use proto::{request, Request, RequestType, Response, ResponseStatus, ResponseType};
pub use varint::{decode_varint, encode_varint};
