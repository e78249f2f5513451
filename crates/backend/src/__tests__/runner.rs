//! Runner against a local counterpart: history load, relay and shutdown.

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use edgewire_core::{AppConfig, Compression, Message, MessageInfo, MessageKey};
  use futures::{SinkExt, StreamExt};
  use ipc::{RequestBody, Response};
  use pretty_assertions::assert_eq;
  use tokio_util::{
    bytes::Bytes,
    codec::{FramedRead, FramedWrite, LengthDelimitedCodec},
    sync::CancellationToken,
  };

  use crate::{
    __tests__::helpers::{Counterpart, Recorder, SEC, START, temp},
    app::{AppStatus, Application, PRE_FILL_LIMIT},
    clock::ManualClock,
    runner::Runner,
    transport::AsyncTransport,
  };

  fn history(name: &str) -> Vec<Message> {
    match name {
      "a" => vec![Message::raw("raw.text", "a", START - SEC, "x")],
      "b" => vec![Message::raw("raw.text", "b", START - 2 * SEC, "y")],
      "temp" => vec![temp(START - 10 * SEC, 1.0)],
      _ => Vec::new(),
    }
  }

  #[tokio::test]
  async fn test_runner_loads_history_and_relays() {
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

      let mut selects = Vec::new();
      loop {
        let frame = reader.next().await.expect("frame").expect("read frame");
        let request = codec.decode_request(&frame).expect("decode").expect("topic");
        match request.body() {
          RequestBody::Select { names, limit, .. } => {
            selects.push((names.clone(), *limit));
            let reply = Response::reply(&request, history(&names[0])).expect("reply");
            writer
              .send(Bytes::from(codec.encode_response(&reply).expect("encode")))
              .await
              .expect("send reply");

            if names[0] == "temp" {
              let live = Response::data(vec![temp(START, 2.0)]);
              writer
                .send(Bytes::from(codec.encode_response(&live).expect("encode")))
                .await
                .expect("send data");
            }
          }
          RequestBody::Emit { .. } => return (selects, request),
          RequestBody::Poll { .. } => {}
        }
      }
    });

    let app_config = AppConfig {
      pre_fill: 60.0,
      last_outputs: true,
      inputs: vec![MessageInfo::new("temp", "raw.float32")],
      outputs: vec![MessageInfo::new("a", "raw.text"), MessageInfo::new("b", "raw.text")],
      ..Default::default()
    };
    let app = Application::with_clock(Recorder::echoing(), app_config, ManualClock::new(START)).expect("app");
    let transport = AsyncTransport::new(config).expect("transport");
    let runner = Runner::new(app, transport, CancellationToken::new());

    let app = tokio::time::timeout(Duration::from_secs(10), runner.run())
      .await
      .expect("runner finished")
      .expect("runner");
    let (selects, emitted) = server.await.expect("server");

    assert_eq!(
      selects,
      vec![
        (vec!["a".to_string()], 1),
        (vec!["b".to_string()], 1),
        (vec!["temp".to_string()], PRE_FILL_LIMIT),
      ]
    );

    let RequestBody::Emit { messages } = emitted.body() else {
      panic!("expected an emit, got {:?}", emitted.kind());
    };
    assert_eq!(messages, &vec![Message::raw("raw.text", "out", START, "temp")]);
    assert_eq!(emitted.source(), Some("test"));

    // pre-filled history is routed but never handed to the processor
    assert_eq!(app.status(), AppStatus::Terminated);
    assert!(app.processor().terminated);
    assert_eq!(app.processor().seen, vec![temp(START, 2.0)]);

    let state = app.state("").expect("global state");
    assert!(state.last_message(&MessageKey::new("a", "raw.text")).is_some());
    assert!(state.last_message(&MessageKey::new("b", "raw.text")).is_some());
    assert_eq!(state.value("temp"), Some(&temp(START, 2.0)));
  }

  #[tokio::test]
  async fn test_runner_polls_until_cancelled() {
    let counterpart = Counterpart::bind(Compression::None).await;
    let Counterpart {
      requests, responses, config, ..
    } = counterpart;
    let cancel = CancellationToken::new();

    let held = cancel.clone();
    let server = tokio::spawn(async move {
      let request_stream = requests.accept().await.expect("accept requests");
      let response_stream = responses.accept().await.expect("accept responses");
      held.cancelled().await;
      (request_stream, response_stream)
    });

    let mut app = Application::with_clock(Recorder::new(), AppConfig::default(), ManualClock::new(START)).expect("app");
    app.state_mut("");
    let transport = AsyncTransport::new(config).expect("transport");
    let runner = Runner::new(app, transport, cancel.clone()).with_poll_interval(Some(Duration::from_millis(10)));

    let trigger = cancel.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(100)).await;
      trigger.cancel();
    });

    let app = tokio::time::timeout(Duration::from_secs(10), runner.run())
      .await
      .expect("runner finished")
      .expect("runner");
    assert_eq!(app.status(), AppStatus::Terminated);
    assert!(app.processor().passes >= 1);
    assert!(app.processor().seen.is_empty());

    drop(server.await.expect("server"));
  }
}
