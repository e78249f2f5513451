//! Frame codec: `topic|payload`, with the payload optionally gzip-compressed.

use std::io::{Read, Write};

use edgewire_core::Compression;
use flate2::{Compression as Level, read::GzDecoder, write::GzEncoder};

use crate::{IpcError, Request, Response};

const SEPARATOR: u8 = b'|';

#[derive(Debug, Clone)]
pub struct FrameCodec {
  topic: String,
  compression: Compression,
  max_frame_bytes: usize,
}

impl FrameCodec {
  pub fn new(topic: impl Into<String>, compression: Compression, max_frame_bytes: usize) -> Result<Self, IpcError> {
    let topic = topic.into();
    if topic.is_empty() || topic.as_bytes().contains(&SEPARATOR) {
      return Err(IpcError::InvalidTopic(topic));
    }
    Ok(Self {
      topic,
      compression,
      max_frame_bytes,
    })
  }

  pub fn topic(&self) -> &str {
    &self.topic
  }

  pub fn compression(&self) -> Compression {
    self.compression
  }

  pub fn max_frame_bytes(&self) -> usize {
    self.max_frame_bytes
  }

  /// Prefix `payload` with the topic, compressing it first if configured.
  pub fn encode_frame(&self, payload: &[u8]) -> Result<Vec<u8>, IpcError> {
    let mut frame = Vec::with_capacity(self.topic.len() + 1 + payload.len());
    frame.extend_from_slice(self.topic.as_bytes());
    frame.push(SEPARATOR);

    match self.compression {
      Compression::None => frame.extend_from_slice(payload),
      Compression::Gzip => {
        let mut encoder = GzEncoder::new(frame, Level::default());
        encoder.write_all(payload).map_err(IpcError::Compression)?;
        frame = encoder.finish().map_err(IpcError::Compression)?;
      }
    }

    if frame.len() > self.max_frame_bytes {
      return Err(IpcError::FrameTooLarge {
        size: frame.len(),
        max: self.max_frame_bytes,
      });
    }
    Ok(frame)
  }

  /// Strip and check the topic prefix and decompress.
  ///
  /// Returns `Ok(None)` for frames published under a different topic.
  pub fn decode_frame(&self, frame: &[u8]) -> Result<Option<Vec<u8>>, IpcError> {
    let split = frame
      .iter()
      .position(|b| *b == SEPARATOR)
      .ok_or(IpcError::MissingTopic)?;

    if &frame[..split] != self.topic.as_bytes() {
      return Ok(None);
    }

    let payload = &frame[split + 1..];
    match self.compression {
      Compression::None => Ok(Some(payload.to_vec())),
      Compression::Gzip => {
        let limit = self.max_frame_bytes as u64 + 1;
        let mut out = Vec::new();
        GzDecoder::new(payload)
          .take(limit)
          .read_to_end(&mut out)
          .map_err(IpcError::Compression)?;
        if out.len() > self.max_frame_bytes {
          return Err(IpcError::FrameTooLarge {
            size: out.len(),
            max: self.max_frame_bytes,
          });
        }
        Ok(Some(out))
      }
    }
  }

  pub fn encode_request(&self, request: &Request) -> Result<Vec<u8>, IpcError> {
    self.encode_frame(request.encode()?)
  }

  pub fn decode_request(&self, frame: &[u8]) -> Result<Option<Request>, IpcError> {
    self.decode_frame(frame)?.map(|payload| Request::decode(&payload)).transpose()
  }

  pub fn encode_response(&self, response: &Response) -> Result<Vec<u8>, IpcError> {
    self.encode_frame(&response.encode()?)
  }

  pub fn decode_response(&self, frame: &[u8]) -> Result<Option<Response>, IpcError> {
    self.decode_frame(frame)?.map(|payload| Response::decode(&payload)).transpose()
  }
}
