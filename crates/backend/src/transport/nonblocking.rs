use std::time::Duration;

use edgewire_core::TransportConfig;
use futures::{SinkExt, StreamExt};
use ipc::{FrameCodec, Request, Response};
use tokio::{net::TcpStream, sync::mpsc, task::JoinHandle, time::Instant};
use tokio_util::{
  bytes::Bytes,
  codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
};
use tracing::{debug, error, info, trace};

use super::{Aggregate, Correlator, LENGTH_PREFIX, codec};
use crate::{error::TransportError, rules::SharedRules, state::State};

type FrameReader = FramedRead<TcpStream, LengthDelimitedCodec>;
type FrameWriter = FramedWrite<TcpStream, LengthDelimitedCodec>;

struct Publisher {
  tx: mpsc::UnboundedSender<Bytes>,
  task: JoinHandle<()>,
}

/// Non-blocking transport.
///
/// Sends are handed to a writer task and go out in submission order.
/// Receives wait on the subscribe stream and can be abandoned by timeout
/// without losing a partially read frame.
pub struct AsyncTransport {
  config: TransportConfig,
  codec: FrameCodec,
  publisher: Option<Publisher>,
  reader: Option<FrameReader>,
  correlator: Correlator,
  aggregate: Option<Aggregate>,
}

impl AsyncTransport {
  pub fn new(config: TransportConfig) -> Result<Self, TransportError> {
    Ok(Self {
      codec: codec(&config)?,
      config,
      publisher: None,
      reader: None,
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

  pub fn config(&self) -> &TransportConfig {
    &self.config
  }

  pub fn is_connected(&self) -> bool {
    self.publisher.is_some()
  }

  pub fn correlator(&mut self) -> &mut Correlator {
    &mut self.correlator
  }

  fn length_codec(&self) -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
      .length_field_length(LENGTH_PREFIX)
      .max_frame_length(self.codec.max_frame_bytes())
      .new_codec()
  }

  /// Open both streams and start the writer task. A no-op when already connected.
  pub async fn connect(&mut self) -> Result<(), TransportError> {
    if self.publisher.is_some() {
      return Ok(());
    }

    let publish = TcpStream::connect(&self.config.publish_addr).await?;
    publish.set_nodelay(true)?;
    let subscribe = TcpStream::connect(&self.config.subscribe_addr).await?;

    let writer = FramedWrite::new(publish, self.length_codec());
    let (tx, rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(write_loop(writer, rx));

    self.publisher = Some(Publisher { tx, task });
    self.reader = Some(FramedRead::new(subscribe, self.length_codec()));

    info!(
      publish = %self.config.publish_addr,
      subscribe = %self.config.subscribe_addr,
      topic = %self.codec.topic(),
      "Transport connected"
    );
    Ok(())
  }

  /// Drop both streams without waiting for queued sends.
  ///
  /// The writer task drains what it already holds and exits on its own.
  pub fn close(&mut self) {
    self.reader = None;
    if self.publisher.take().is_some() {
      debug!("Transport closed");
    }
  }

  /// Close and wait for every queued send to be written.
  pub async fn shutdown(&mut self) {
    self.reader = None;
    if let Some(Publisher { tx, task }) = self.publisher.take() {
      drop(tx);
      if let Err(e) = task.await {
        error!(error = %e, "Writer task failed");
      }
      debug!("Transport shut down");
    }
  }

  /// Queue `request` for sending and return it immediately.
  pub fn submit(&self, request: Request) -> Result<Request, TransportError> {
    let publisher = self.publisher.as_ref().ok_or(TransportError::NotConnected)?;
    let frame = self.codec.encode_request(&request)?;
    let bytes = frame.len();
    publisher.tx.send(Bytes::from(frame)).map_err(|_| TransportError::Closed)?;
    trace!(kind = request.kind().as_str(), bytes, "Request queued");
    Ok(request)
  }

  /// Wait up to `timeout` for the next response on this topic.
  ///
  /// Unsolicited data set aside by [`request`](Self::request) comes first.
  /// `None` waits indefinitely. Returns `Ok(None)` when the timeout expires.
  pub async fn receive(&mut self, timeout: Option<Duration>) -> Result<Option<Response>, TransportError> {
    if self.reader.is_none() {
      return Err(TransportError::NotConnected);
    }
    if let Some(response) = self.correlator.pop_unsolicited() {
      return Ok(Some(response));
    }
    self.read_response(timeout).await
  }

  async fn read_response(&mut self, timeout: Option<Duration>) -> Result<Option<Response>, TransportError> {
    let reader = self.reader.as_mut().ok_or(TransportError::NotConnected)?;
    let next = next_response(reader, &self.codec);

    let response = match timeout {
      Some(timeout) => match tokio::time::timeout(timeout, next).await {
        Ok(result) => result?,
        Err(_) => return Ok(None),
      },
      None => next.await?,
    };

    if let Some(aggregate) = self.aggregate.as_mut() {
      aggregate.feed(&response);
    }
    Ok(Some(response))
  }

  /// Submit `request` and wait up to `timeout` for its answer.
  ///
  /// Everything else received meanwhile is kept in the correlator: answers
  /// to other requests for [`Correlator::take`], data for the next
  /// [`receive`](Self::receive).
  pub async fn request(&mut self, request: Request, timeout: Duration) -> Result<Option<Response>, TransportError> {
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
      match self.read_response(Some(remaining)).await? {
        Some(response) if response.answers(&request) => return Ok(Some(response)),
        Some(response) => {
          self.correlator.offer(response);
        }
        None => return Ok(None),
      }
    }
  }
}

async fn next_response(reader: &mut FrameReader, codec: &FrameCodec) -> Result<Response, TransportError> {
  loop {
    let frame = match reader.next().await {
      Some(frame) => frame?,
      None => return Err(TransportError::Closed),
    };
    match codec.decode_response(&frame)? {
      Some(response) => return Ok(response),
      None => trace!("Skipping frame for another topic"),
    }
  }
}

async fn write_loop(mut writer: FrameWriter, mut rx: mpsc::UnboundedReceiver<Bytes>) {
  while let Some(frame) = rx.recv().await {
    if let Err(e) = writer.send(frame).await {
      error!(error = %e, "Failed to publish frame");
      break;
    }
  }
  if let Err(e) = SinkExt::<Bytes>::close(&mut writer).await {
    debug!(error = %e, "Failed to close publish stream");
  }
  debug!("Writer task exited");
}
