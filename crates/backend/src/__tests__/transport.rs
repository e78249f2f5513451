//! Transport tests against a local counterpart.

#[cfg(test)]
mod tests {
  use std::{
    io::{Read, Write},
    net::TcpListener as StdListener,
    thread,
    time::Duration,
  };

  use edgewire_core::{Compression, Message, RuleSet, TransportConfig, config::default_topics};
  use futures::{SinkExt, StreamExt};
  use ipc::{FrameCodec, IpcError, Request, RequestBody, Response};
  use tokio_util::{
    bytes::Bytes,
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
  };

  use crate::{
    __tests__::helpers::{Counterpart, MAX_FRAME, TOPIC, WAIT, temp},
    error::TransportError,
    rules::{Rules, SharedRules},
    transport::{AsyncTransport, Transport},
  };

  fn default_rules() -> SharedRules {
    SharedRules::new(
      Rules::compile(&RuleSet {
        topics: default_topics(),
        ..Default::default()
      })
      .expect("compile default rules"),
    )
  }

  #[tokio::test]
  async fn test_async_request_matches_hash() {
    let counterpart = Counterpart::bind(Compression::Gzip).await;
    let codec = counterpart.codec();
    let Counterpart {
      requests, responses, config, ..
    } = counterpart;

    let server = tokio::spawn(async move {
      let (request_stream, _) = requests.accept().await.expect("accept requests");
      let (response_stream, _) = responses.accept().await.expect("accept responses");
      let mut reader = FramedRead::new(request_stream, LengthDelimitedCodec::new());
      let mut writer = FramedWrite::new(response_stream, LengthDelimitedCodec::new());

      let frame = reader.next().await.expect("frame").expect("read frame");
      let request = codec.decode_request(&frame).expect("decode").expect("topic");

      // an answer to something else arrives first
      let other = Response::reply(&Request::poll(vec!["other".to_string()]), vec![]).expect("reply");
      writer
        .send(Bytes::from(codec.encode_response(&other).expect("encode")))
        .await
        .expect("send other");

      let reply = Response::reply(&request, vec![temp(1, 2.0)]).expect("reply");
      writer
        .send(Bytes::from(codec.encode_response(&reply).expect("encode")))
        .await
        .expect("send reply");
      request
    });

    let mut transport = AsyncTransport::new(config).expect("transport");
    transport.connect().await.expect("connect");
    transport.connect().await.expect("connect twice");

    let request = Request::select(vec!["temp".to_string()], 0, 10, 5);
    let response = transport
      .request(request.clone(), WAIT)
      .await
      .expect("request")
      .expect("answer");
    assert_eq!(response.messages(), &[temp(1, 2.0)]);
    assert_eq!(transport.correlator().len(), 1);

    let seen = server.await.expect("server");
    assert_eq!(seen, request);
    assert_eq!(seen.hash().unwrap(), request.hash().unwrap());

    transport.shutdown().await;
    transport.close();
  }

  #[tokio::test]
  async fn test_async_request_keeps_unsolicited_data() {
    let counterpart = Counterpart::bind(Compression::None).await;
    let codec = counterpart.codec();
    let Counterpart {
      requests, responses, config, ..
    } = counterpart;

    let server = tokio::spawn(async move {
      let (request_stream, _) = requests.accept().await.expect("accept requests");
      let (response_stream, _) = responses.accept().await.expect("accept responses");
      let mut reader = FramedRead::new(request_stream, LengthDelimitedCodec::new());
      let mut writer = FramedWrite::new(response_stream, LengthDelimitedCodec::new());

      let frame = reader.next().await.expect("frame").expect("read frame");
      let request = codec.decode_request(&frame).expect("decode").expect("topic");

      let data = Response::data(vec![temp(3, 9.0)]);
      writer
        .send(Bytes::from(codec.encode_response(&data).expect("encode")))
        .await
        .expect("send data");
      let reply = Response::reply(&request, vec![]).expect("reply");
      writer
        .send(Bytes::from(codec.encode_response(&reply).expect("encode")))
        .await
        .expect("send reply");
      writer
    });

    let mut transport = AsyncTransport::new(config).expect("transport").with_aggregate(default_rules());
    transport.connect().await.expect("connect");

    let request = Request::select(vec!["temp".to_string()], 0, 10, 1);
    let response = transport.request(request.clone(), WAIT).await.expect("request").expect("answer");
    assert!(response.answers(&request));
    assert_eq!(transport.correlator().len(), 0);
    assert_eq!(transport.correlator().unsolicited_len(), 1);

    let data = transport
      .receive(Some(Duration::from_millis(200)))
      .await
      .expect("receive")
      .expect("data kept");
    assert!(data.hash().is_none());
    assert_eq!(data.messages(), &[temp(3, 9.0)]);
    assert!(transport.correlator().is_empty());
    assert_eq!(transport.aggregate().and_then(|state| state.value("temp")), Some(&temp(3, 9.0)));

    drop(server.await.expect("server"));
  }

  #[tokio::test]
  async fn test_async_sends_keep_submission_order() {
    let counterpart = Counterpart::bind(Compression::None).await;
    let codec = counterpart.codec();
    let Counterpart {
      requests, responses, config, ..
    } = counterpart;

    let server = tokio::spawn(async move {
      let (request_stream, _) = requests.accept().await.expect("accept requests");
      let _response_stream = responses.accept().await.expect("accept responses");
      let mut reader = FramedRead::new(request_stream, LengthDelimitedCodec::new());
      let mut names = Vec::new();
      while let Some(frame) = reader.next().await {
        let request = codec.decode_request(&frame.expect("frame")).expect("decode").expect("topic");
        if let RequestBody::Emit { messages } = request.body() {
          names.extend(messages.iter().map(|m| m.name().to_string()));
        }
      }
      names
    });

    let mut transport = AsyncTransport::new(config).expect("transport");
    transport.connect().await.expect("connect");
    for name in ["a", "b", "c", "d"] {
      let message = Message::raw("raw.int32", name, 0, 1);
      transport.submit(Request::emit(vec![message])).expect("submit");
    }
    transport.shutdown().await;

    let names = server.await.expect("server");
    assert_eq!(names, vec!["a", "b", "c", "d"]);
  }

  #[tokio::test]
  async fn test_async_receive_times_out() {
    let counterpart = Counterpart::bind(Compression::None).await;
    let mut transport = AsyncTransport::new(counterpart.config.clone()).expect("transport");

    assert!(matches!(
      transport.receive(Some(Duration::from_millis(10))).await,
      Err(TransportError::NotConnected)
    ));

    transport.connect().await.expect("connect");
    let received = transport.receive(Some(Duration::from_millis(50))).await.expect("receive");
    assert!(received.is_none());
  }

  #[tokio::test]
  async fn test_async_missing_topic_and_aggregate() {
    let counterpart = Counterpart::bind(Compression::None).await;
    let codec = counterpart.codec();
    let Counterpart {
      requests, responses, config, ..
    } = counterpart;

    let server = tokio::spawn(async move {
      let _request_stream = requests.accept().await.expect("accept requests");
      let (response_stream, _) = responses.accept().await.expect("accept responses");
      let mut writer = FramedWrite::new(response_stream, LengthDelimitedCodec::new());

      writer.send(Bytes::from_static(b"no separator")).await.expect("send bad");

      let foreign = FrameCodec::new("elsewhere", Compression::None, MAX_FRAME).expect("codec");
      let stray = Response::data(vec![Message::raw("raw.int32", "stray", 0, 1)]);
      writer
        .send(Bytes::from(foreign.encode_response(&stray).expect("encode")))
        .await
        .expect("send stray");

      let data = Response::data(vec![temp(5, 1.0)]);
      writer
        .send(Bytes::from(codec.encode_response(&data).expect("encode")))
        .await
        .expect("send data");
      writer
    });

    let mut transport = AsyncTransport::new(config).expect("transport").with_aggregate(default_rules());
    transport.connect().await.expect("connect");

    assert!(matches!(
      transport.receive(Some(WAIT)).await,
      Err(TransportError::Ipc(IpcError::MissingTopic))
    ));

    let response = transport.receive(Some(WAIT)).await.expect("receive").expect("data");
    assert_eq!(response.messages(), &[temp(5, 1.0)]);

    let aggregate = transport.aggregate().expect("aggregate");
    assert_eq!(aggregate.value("temp"), Some(&temp(5, 1.0)));
    assert!(aggregate.get("stray").is_none());

    drop(server.await.expect("server"));
  }

  fn read_frame(stream: &mut impl Read) -> Vec<u8> {
    let mut length = [0u8; 4];
    stream.read_exact(&mut length).expect("read length");
    let mut frame = vec![0u8; u32::from_be_bytes(length) as usize];
    stream.read_exact(&mut frame).expect("read frame");
    frame
  }

  fn write_frame(stream: &mut impl Write, frame: &[u8]) {
    stream.write_all(&(frame.len() as u32).to_be_bytes()).expect("write length");
    stream.write_all(frame).expect("write frame");
  }

  #[test]
  fn test_blocking_round_trip() {
    let requests = StdListener::bind("127.0.0.1:0").expect("bind requests");
    let responses = StdListener::bind("127.0.0.1:0").expect("bind responses");
    let config = TransportConfig {
      publish_addr: requests.local_addr().unwrap().to_string(),
      subscribe_addr: responses.local_addr().unwrap().to_string(),
      topic: TOPIC.to_string(),
      compression: Compression::Gzip,
      max_frame_bytes: MAX_FRAME,
      ..Default::default()
    };
    let codec = FrameCodec::new(TOPIC, Compression::Gzip, MAX_FRAME).expect("codec");

    let server = thread::spawn(move || {
      let (mut request_stream, _) = requests.accept().expect("accept requests");
      let (mut response_stream, _) = responses.accept().expect("accept responses");
      let request = codec
        .decode_request(&read_frame(&mut request_stream))
        .expect("decode")
        .expect("topic");

      // split the reply across writes to exercise partial reads
      let reply = codec
        .encode_response(&Response::reply(&request, vec![temp(7, 3.0)]).expect("reply"))
        .expect("encode");
      let mut framed = (reply.len() as u32).to_be_bytes().to_vec();
      framed.extend_from_slice(&reply);
      let (head, tail) = framed.split_at(3);
      response_stream.write_all(head).expect("write head");
      response_stream.flush().expect("flush");
      thread::sleep(Duration::from_millis(20));
      response_stream.write_all(tail).expect("write tail");

      let unsolicited = codec
        .encode_response(&Response::data(vec![temp(8, 4.0)]))
        .expect("encode");
      write_frame(&mut response_stream, &unsolicited);
      response_stream
    });

    let mut transport = Transport::new(config).expect("transport").with_aggregate(default_rules());
    transport.connect().expect("connect");
    transport.connect().expect("connect twice");

    let request = Request::poll(vec!["temp".to_string()]);
    let response = transport.request(request.clone(), WAIT).expect("request").expect("answer");
    assert!(response.answers(&request));
    response.correlate(&request).expect("correlate");

    let data = transport.receive(Some(WAIT)).expect("receive").expect("data");
    assert!(data.hash().is_none());
    assert_eq!(
      transport.aggregate().and_then(|state| state.value("temp")),
      Some(&temp(8, 4.0))
    );

    let _response_stream = server.join().expect("server");
    assert!(transport.receive(Some(Duration::from_millis(20))).expect("receive").is_none());

    transport.close();
    transport.close();
    assert!(!transport.is_connected());
  }
}
