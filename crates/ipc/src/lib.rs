mod codec;
mod error;
mod protocol;

pub use codec::FrameCodec;
pub use error::IpcError;
pub use protocol::{DEFAULT_SELECT_LIMIT, Request, RequestBody, RequestKind, Response, content_hash};
