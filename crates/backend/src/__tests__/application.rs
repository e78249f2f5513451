//! Application scenarios: drive models, hold-back, rules, limits and timers.

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use edgewire_core::{AppConfig, Check, Limit, Message, MessageInfo, StorageConfig, TopicSpec};
  use pretty_assertions::assert_eq;
  use serde_json::json;

  use crate::{
    __tests__::helpers::{Recorder, SEC, START, app, app_with, callback, temp},
    app::{AppStatus, Application, DataStatus},
    error::AppError,
  };

  #[test]
  fn test_requires_initialization() {
    let mut app = Application::new(Recorder::new(), AppConfig::default()).expect("build application");
    assert_eq!(app.status(), AppStatus::NotInitialized);
    assert!(matches!(app.on_data(vec![temp(0, 1.0)]), Err(AppError::NotInitialized)));

    app.on_initialize(Vec::new()).unwrap();
    assert!(app.processor().initialized);
    assert_eq!(app.status(), AppStatus::Initialized);

    app.on_terminate();
    app.on_terminate();
    assert!(app.processor().terminated);
    assert!(matches!(app.on_poll(), Err(AppError::Terminated)));
  }

  #[test]
  fn test_duplicates_reach_processor_once() {
    let (mut app, _clock) = app();

    app.on_data(vec![temp(SEC, 21.5)]).unwrap();
    app.on_data(vec![temp(SEC, 21.5)]).unwrap();
    app.on_data(vec![temp(2 * SEC, 21.5)]).unwrap();

    assert_eq!(app.processor().seen, vec![temp(SEC, 21.5), temp(2 * SEC, 21.5)]);
    assert_eq!(app.processor().passes, 3);

    let state = app.state("").unwrap();
    assert_eq!(state.input_count(), 2);
    assert_eq!(state.value("temp"), Some(&temp(2 * SEC, 21.5)));
  }

  #[test]
  fn test_delay_holds_messages_back() {
    let config = AppConfig {
      delay: 5.0,
      ..Default::default()
    };
    let (mut app, clock) = app_with(config, Recorder::new());

    app.on_data(vec![temp(START, 1.0)]).unwrap();
    assert!(app.processor().seen.is_empty());
    assert_eq!(app.state("").unwrap().pending().len(), 1);

    clock.advance(4 * SEC);
    app.on_poll().unwrap();
    assert!(app.processor().seen.is_empty());

    clock.advance(SEC);
    app.on_poll().unwrap();
    assert_eq!(app.processor().seen, vec![temp(START, 1.0)]);
    assert!(app.state("").unwrap().pending().is_empty());
  }

  #[test]
  fn test_offset_timestamps_follow_data() {
    let config = AppConfig {
      offset_timestamps: true,
      ..Default::default()
    };
    let (mut app, _clock) = app_with(config, Recorder::new());

    app.on_data(vec![temp(50 * SEC, 1.0), temp(40 * SEC, 2.0)]).unwrap();
    assert_eq!(app.state("").unwrap().last_process_time(), 50 * SEC);

    // older data never moves processing time backwards
    app.on_data(vec![temp(45 * SEC, 3.0)]).unwrap();
    assert_eq!(app.state("").unwrap().last_process_time(), 50 * SEC);
  }

  #[test]
  fn test_assets_are_partitioned() {
    let config = AppConfig {
      asset_getter: vec!["asset".to_string()],
      ..Default::default()
    };
    let (mut app, _clock) = app_with(config, Recorder::new());

    app
      .on_data(vec![
        temp(SEC, 1.0).with_field("asset", "pump-1"),
        temp(SEC, 2.0).with_field("asset", "pump-2"),
        temp(SEC, 3.0),
      ])
      .unwrap();

    assert_eq!(app.assets().collect::<Vec<_>>(), vec!["pump-1", "pump-2"]);
    let value = |asset: &str| app.state(asset).and_then(|s| s.value("temp")).map(|m| m.field("value"));
    assert_eq!(value("pump-1"), Some(Some(json!(1.0))));
    assert_eq!(value("pump-2"), Some(Some(json!(2.0))));
  }

  #[test]
  fn test_add_topic_reprocesses_history() {
    let (mut app, _clock) = app();
    app.on_data(vec![temp(SEC, 1.0), temp(2 * SEC, 2.0)]).unwrap();

    app.add_topic(&TopicSpec::new("raw.float32.temp", "celsius"), false).unwrap();
    assert!(app.state("").unwrap().get("celsius").is_none());

    app.remove_topic("raw.float32.temp", false);
    app.add_topic(&TopicSpec::new("raw.float32.temp", "celsius"), true).unwrap();
    let state = app.state("").unwrap();
    assert_eq!(state.value("celsius"), Some(&temp(2 * SEC, 2.0)));
    assert_eq!(state.value("temp"), Some(&temp(2 * SEC, 2.0)));
  }

  #[test]
  fn test_final_topic_with_buffer() {
    let mut processor = Recorder::new();
    processor.rules.topics = vec![
      TopicSpec::new("raw.*.temp", "history")
        .buffered(StorageConfig {
          window: Some(10.0),
          ..Default::default()
        })
        .final_match(),
    ];
    let (mut app, _clock) = app_with(AppConfig::default(), processor);

    app.on_data(vec![temp(START - 20 * SEC, 1.0), temp(START - 5 * SEC, 2.0), temp(START, 3.0)]).unwrap();

    let state = app.state("").unwrap();
    assert!(state.get("temp").is_none());
    let kept: Vec<i64> = state.buffer("history").unwrap().timestamps().collect();
    assert_eq!(kept, vec![START - 5 * SEC, START]);
  }

  #[test]
  fn test_limit_applies_to_emissions() {
    let config = AppConfig {
      limits: BTreeMap::from([("out".to_string(), Limit::frequency(5.0))]),
      ..Default::default()
    };
    let (mut app, clock) = app_with(config, Recorder::echoing());
    clock.set(START + 100 * SEC);

    let delivered = app.on_data(vec![temp(START, 1.0)]).unwrap();
    assert_eq!(delivered.len(), 1);

    let delivered = app.on_data(vec![temp(START + 3 * SEC, 2.0)]).unwrap();
    assert!(delivered.is_empty());
    assert_eq!(
      app.state("").unwrap().suppressed("out").map(Message::time_of_validity),
      Some(START + 3 * SEC)
    );

    let delivered = app.on_data(vec![temp(START + 5 * SEC, 3.0)]).unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(app.state("").unwrap().output_count(), 2);
  }

  #[test]
  fn test_processing_errors_do_not_abort_the_pass() {
    let processor = Recorder::new().reacting(|ctx, message| {
      if message.name() == "bad" {
        return Err(crate::error::ProcessError::failed("boom"));
      }
      ctx.emit(Message::raw("raw.text", "out", message.time_of_validity(), "ok"));
      Ok(())
    });
    let (mut app, _clock) = app_with(AppConfig::default(), processor);

    let bad = Message::raw("raw.text", "bad", SEC, "x");
    let delivered = app.on_data(vec![temp(SEC, 1.0), bad]).unwrap();
    assert_eq!(delivered.len(), 1);
    assert_eq!(app.processor().names(), vec!["temp", "bad"]);
    assert_eq!(app.processor().passes, 1);
  }

  #[test]
  fn test_timer_fires_count_times() {
    let (mut app, clock) = app();
    app.state_mut("");
    app.on_poll().unwrap();

    let name = app
      .create_timer(
        "",
        callback(|ctx| {
          ctx.emit(Message::raw("raw.int32", "tick", ctx.now(), 1));
          Ok(())
        }),
        10.0,
        Some("tick"),
        2,
        0.0,
      )
      .unwrap();
    assert_eq!(name, "tick");

    let duplicate = app.create_timer("", callback(|_| Ok(())), 1.0, Some("tick"), 0, 0.0);
    assert!(matches!(duplicate, Err(AppError::DuplicateTimer(_))));

    let mut ticks = Vec::new();
    for _ in 0..3 {
      clock.advance(10 * SEC);
      ticks.extend(app.on_poll().unwrap());
    }

    let times: Vec<i64> = ticks.iter().map(Message::time_of_validity).collect();
    assert_eq!(times, vec![START + 10 * SEC, START + 20 * SEC]);
    assert!(app.state("").unwrap().timers().is_empty());
  }

  #[test]
  fn test_generated_timer_names_and_delete() {
    let (mut app, _clock) = app();
    let name = app.create_timer("", callback(|_| Ok(())), 1.0, None, 0, 0.0).unwrap();
    assert_eq!(name.len(), 8);
    assert!(app.delete_timer("", &name));
    assert!(!app.delete_timer("", &name));
    assert!(matches!(
      app.create_timer("", callback(|_| Ok(())), 0.0, None, 0, 0.0),
      Err(AppError::InvalidPeriod)
    ));
  }

  #[test]
  fn test_data_status() {
    let config = AppConfig {
      inputs: vec![MessageInfo::new("temp", "raw.float32"), MessageInfo::new("pressure", "raw.float32")],
      checks: BTreeMap::from([(
        "*".to_string(),
        Check {
          max_lag: Some(30.0),
          ..Default::default()
        },
      )]),
      ..Default::default()
    };
    let (mut app, clock) = app_with(config, Recorder::new());

    app.on_data(vec![temp(START, 1.0)]).unwrap();
    let status = app.data_status("");
    assert_eq!(status, BTreeMap::from([("pressure".to_string(), DataStatus::Missing)]));

    clock.advance(60 * SEC);
    app.on_poll().unwrap();
    let status = app.data_status("");
    assert_eq!(status.get("temp"), Some(&DataStatus::Stale));
  }

  #[test]
  fn test_make_message_defaults() {
    let config = AppConfig {
      delay: 2.0,
      outputs: vec![MessageInfo::new("alarm", "raw.boolean")],
      ..Default::default()
    };
    let (mut app, _clock) = app_with(config, Recorder::new());
    app.state_mut("");
    app.on_poll().unwrap();

    let payload = BTreeMap::from([("value".to_string(), json!(true))]);
    let message = app.make_message("", "alarm", payload.clone(), None, None).unwrap();
    assert_eq!(message.type_name(), "raw.boolean");
    assert_eq!(message.time_of_validity(), START - 2 * SEC);

    assert!(matches!(
      app.make_message("", "unknown", payload, None, None),
      Err(AppError::UnknownMessage(_))
    ));
  }

  #[test]
  fn test_prefill_routes_without_processing() {
    let config = AppConfig {
      pre_fill: 60.0,
      inputs: vec![MessageInfo::new("temp", "raw.float32")],
      ..Default::default()
    };
    let (mut app, _clock) = app_with(config, Recorder::new());
    assert_eq!(app.pre_fill_window(), Some((START - 60 * SEC, START)));
    assert_eq!(app.input_names(), vec!["temp".to_string()]);

    app.prefill(vec![temp(START - 10 * SEC, 2.0), temp(START - 30 * SEC, 1.0)]);
    assert!(app.processor().seen.is_empty());
    assert_eq!(app.state("").unwrap().value("temp"), Some(&temp(START - 10 * SEC, 2.0)));

    // already seen through pre-fill
    app.on_data(vec![temp(START - 10 * SEC, 2.0)]).unwrap();
    assert!(app.processor().seen.is_empty());
  }

  #[test]
  fn test_seeded_outputs_feed_limits() {
    let config = AppConfig {
      last_outputs: true,
      outputs: vec![MessageInfo::new("out", "raw.text")],
      limits: BTreeMap::from([("out".to_string(), Limit::frequency(5.0))]),
      ..Default::default()
    };
    let (mut app, clock) = app_with(config, Recorder::echoing());
    clock.set(START + 100 * SEC);
    assert_eq!(app.last_output_names(), vec!["out".to_string()]);

    app.seed_last_outputs(vec![Message::raw("raw.text", "out", START - SEC, "temp")]);
    assert!(app.on_data(vec![temp(START, 1.0)]).unwrap().is_empty());
    assert_eq!(app.on_data(vec![temp(START + 4 * SEC, 1.0)]).unwrap().len(), 1);
  }

  #[test]
  fn test_parameters_and_reset() {
    let (mut app, _clock) = app();
    app.on_parameter_change(vec![Message::raw("raw.float32", "setpoint", 0, 42.0)]);
    app.on_data(vec![temp(SEC, 1.0)]).unwrap();

    assert_eq!(app.state("").unwrap().last_process_time(), START);

    app.reset(None);
    let state = app.state("").unwrap();
    assert!(state.get("temp").is_none());
    assert_eq!(state.input_count(), 0);
    assert_eq!(state.last_process_time(), 0);
    assert!(state.param("setpoint").is_some());
  }

  #[test]
  fn test_timer_on_fresh_state_starts_from_clock() {
    let (mut app, clock) = app();
    app
      .create_timer(
        "",
        callback(|ctx| {
          ctx.emit(Message::raw("raw.int32", "tick", ctx.now(), 1));
          Ok(())
        }),
        1.0,
        None,
        0,
        0.0,
      )
      .unwrap();
    assert_eq!(app.state("").unwrap().timers().list()[0].next_fire, START + SEC);

    clock.advance(SEC);
    let ticks = app.on_poll().unwrap();
    assert_eq!(ticks.len(), 1);
    assert_eq!(ticks[0].time_of_validity(), START + SEC);
  }

  #[test]
  fn test_idle_assets_advance_with_other_data() {
    let config = AppConfig {
      delay: 5.0,
      asset_getter: vec!["asset".to_string()],
      ..Default::default()
    };
    let (mut app, clock) = app_with(config, Recorder::new());

    app.on_data(vec![temp(START, 1.0).with_field("asset", "b")]).unwrap();
    assert_eq!(app.state("b").unwrap().pending().len(), 1);

    clock.advance(10 * SEC);
    app
      .on_data(vec![temp(START + 10 * SEC, 2.0).with_field("asset", "a")])
      .unwrap();

    let b = app.state("b").unwrap();
    assert!(b.pending().is_empty());
    assert_eq!(b.last_process_time(), START + 10 * SEC);
    assert_eq!(app.processor().seen, vec![temp(START, 1.0).with_field("asset", "b")]);
  }
}
