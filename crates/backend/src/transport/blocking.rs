use std::{
  io::{ErrorKind, Read, Write},
  net::{Shutdown, TcpStream},
  time::{Duration, Instant},
};

use edgewire_core::TransportConfig;
use ipc::{FrameCodec, Request, Response};
use tracing::{debug, info, trace};

use super::{Aggregate, Correlator, LENGTH_PREFIX, codec};
use crate::{error::TransportError, rules::SharedRules, state::State};

const READ_CHUNK: usize = 8 * 1024;

struct Connection {
  publish: TcpStream,
  subscribe: TcpStream,
  /// Bytes read but not yet forming a whole frame.
  read_buf: Vec<u8>,
}

/// Blocking transport. Sends and receives run on the calling thread.
pub struct Transport {
  config: TransportConfig,
  codec: FrameCodec,
  connection: Option<Connection>,
  correlator: Correlator,
  aggregate: Option<Aggregate>,
}

impl Transport {
  pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
    Ok(Self {
      codec: codec(&config)?,
      config,
      connection: None,
      correlator: Correlator::new(),
      aggregate: None,
    })
  }

  /// Route every received response into a State under `rules`.
  pub fn with_aggregate(mut self, rules: SharedRules) -> Self {
    self.aggregate = Some(Aggregate::new(rules));
    self
  }

  pub fn aggregate(&self) -> Option<&State> {
    self.aggregate.as_ref().map(Aggregate::state)
  }

  pub fn is_connected(&self) -> bool {
    self.connection.is_some()
  }

  pub fn correlator(&mut self) -> &mut Correlator {
    &mut self.correlator
  }

  /// Open both streams. A no-op when already connected.
  pub fn connect(&mut self) -> Result<(), TransportError> {
    if self.connection.is_some() {
      return Ok(());
    }

    let publish = TcpStream::connect(&self.config.publish_addr)?;
    publish.set_nodelay(true)?;
    let subscribe = TcpStream::connect(&self.config.subscribe_addr)?;

    info!(
      publish = %self.config.publish_addr,
      subscribe = %self.config.subscribe_addr,
      topic = %self.codec.topic(),
      "Transport connected"
    );
    self.connection = Some(Connection {
      publish,
      subscribe,
      read_buf: Vec::new(),
    });
    Ok(())
  }

  /// Close both streams. A no-op when not connected.
  pub fn close(&mut self) {
    if let Some(connection) = self.connection.take() {
      let _ = connection.publish.shutdown(Shutdown::Both);
      let _ = connection.subscribe.shutdown(Shutdown::Both);
      debug!("Transport closed");
    }
  }

  /// Send `request`, blocking until it is written. Returns the request so its
  /// hash can be matched against a later response.
  pub fn submit(&mut self, request: Request) -> Result<Request, TransportError> {
    let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;
    let frame = self.codec.encode_request(&request)?;
    let length = u32::try_from(frame.len()).map_err(|_| TransportError::FrameTooLarge {
      size: frame.len(),
      max: self.codec.max_frame_bytes(),
    })?;

    connection.publish.write_all(&length.to_be_bytes())?;
    connection.publish.write_all(&frame)?;
    connection.publish.flush()?;

    trace!(kind = request.kind().as_str(), bytes = frame.len(), "Request sent");
    Ok(request)
  }

  /// Wait up to `timeout` for the next response on this topic.
  ///
  /// Unsolicited data set aside by [`request`](Self::request) comes first.
  /// `None` waits indefinitely. Returns `Ok(None)` when the timeout expires.
  /// Bytes of a partially received frame are kept for the next call.
  pub fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Response>, TransportError> {
    if self.connection.is_none() {
      return Err(TransportError::NotConnected);
    }
    if let Some(response) = self.correlator.pop_unsolicited() {
      return Ok(Some(response));
    }
    self.read_response(timeout)
  }

  fn read_response(&mut self, timeout: Option<Duration>) -> Result<Option<Response>, TransportError> {
    let connection = self.connection.as_mut().ok_or(TransportError::NotConnected)?;
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let max = self.codec.max_frame_bytes();

    loop {
      while let Some(frame) = take_frame(&mut connection.read_buf, max)? {
        match self.codec.decode_response(&frame)? {
          Some(response) => {
            if let Some(aggregate) = self.aggregate.as_mut() {
              aggregate.feed(&response);
            }
            return Ok(Some(response));
          }
          None => trace!("Skipping frame for another topic"),
        }
      }

      let remaining = match deadline {
        Some(deadline) => match deadline.checked_duration_since(Instant::now()) {
          Some(remaining) if !remaining.is_zero() => Some(remaining),
          _ => return Ok(None),
        },
        None => None,
      };
      connection.subscribe.set_read_timeout(remaining)?;

      let mut chunk = [0u8; READ_CHUNK];
      match connection.subscribe.read(&mut chunk) {
        Ok(0) => return Err(TransportError::Closed),
        Ok(n) => connection.read_buf.extend_from_slice(&chunk[..n]),
        Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => return Ok(None),
        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
        Err(e) => return Err(e.into()),
      }
    }
  }

  /// Submit `request` and wait up to `timeout` for its answer.
  ///
  /// Everything else received meanwhile is kept in the correlator: answers
  /// to other requests for [`Correlator::take`], data for the next
  /// [`receive`](Self::receive).
  pub fn request(&mut self, request: Request, timeout: Duration) -> Result<Option<Response>, TransportError> {
    let request = self.submit(request)?;
    if let Some(response) = self.correlator.take(&request) {
      return Ok(Some(response));
    }

    let deadline = Instant::now() + timeout;
    loop {
      let remaining = deadline.saturating_duration_since(Instant::now());
      if remaining.is_zero() {
        return Ok(None);
      }
      match self.read_response(Some(remaining))? {
        Some(response) if response.answers(&request) => return Ok(Some(response)),
        Some(response) => {
          self.correlator.offer(response);
        }
        None => return Ok(None),
      }
    }
  }
}

impl Drop for Transport {
  fn drop(&mut self) {
    self.close();
  }
}

/// Split one length-prefixed frame off the front of `buf`, if complete.
pub(crate) fn take_frame(buf: &mut Vec<u8>, max: usize) -> Result<Option<Vec<u8>>, TransportError> {
  let Some(prefix) = buf.first_chunk::<LENGTH_PREFIX>() else {
    return Ok(None);
  };
  let size = u32::from_be_bytes(*prefix) as usize;
  if size > max {
    return Err(TransportError::FrameTooLarge { size, max });
  }
  if buf.len() < LENGTH_PREFIX + size {
    return Ok(None);
  }
  let frame = buf[LENGTH_PREFIX..LENGTH_PREFIX + size].to_vec();
  buf.drain(..LENGTH_PREFIX + size);
  Ok(Some(frame))
}
