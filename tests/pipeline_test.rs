// 该文件是 Shanan （山南西风） 项目的一部分。
// tests/pipeline_test.rs - 检测流水线集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  thread,
  time::{Duration, Instant},
};

use crossbeam_channel::{Receiver, Sender};

use shanan_overlay::{
  AdapterError, InferenceAdapter, Pipeline, PipelineConfig, RawTensor,
  frame::RgbFrame,
  input::LatestFrame,
  model::{TINY_YOLO_TENSOR_LEN, VocLabel},
  scheduler::GateState,
};

type Reply = Result<RawTensor, AdapterError>;

const WAIT: Duration = Duration::from_secs(5);

/// 每次推理都阻塞，直到测试通过对应的应答通道给出结果
struct Gated {
  ready: Arc<AtomicBool>,
  started: Sender<Sender<Reply>>,
}

impl InferenceAdapter for Gated {
  type Frame = Arc<RgbFrame>;

  fn is_ready(&self) -> bool {
    self.ready.load(Ordering::SeqCst)
  }

  fn evaluate(&self, _frame: Arc<RgbFrame>) -> Reply {
    let (reply, wait) = crossbeam_channel::bounded(1);
    self
      .started
      .send(reply)
      .map_err(|_| AdapterError::Evaluation("test finished".to_string()))?;
    wait
      .recv()
      .unwrap_or_else(|_| Err(AdapterError::Evaluation("reply dropped".to_string())))
  }
}

struct Harness {
  pipeline: Pipeline<LatestFrame>,
  started: Receiver<Sender<Reply>>,
  ready: Arc<AtomicBool>,
}

fn harness(config: PipelineConfig) -> Harness {
  let ready = Arc::new(AtomicBool::new(true));
  let (started_tx, started) = crossbeam_channel::unbounded();
  let adapter = Gated {
    ready: ready.clone(),
    started: started_tx,
  };

  let pipeline = Pipeline::start(adapter, LatestFrame::new(), config).unwrap();
  pipeline
    .source()
    .push(Arc::new(RgbFrame::with_shape(416, 416)));

  Harness {
    pipeline,
    started,
    ready,
  }
}

fn manual() -> PipelineConfig {
  PipelineConfig::default().with_evaluation_interval(None)
}

fn person_tensor() -> RawTensor {
  let mut data = vec![0.0; TINY_YOLO_TENSOR_LEN];
  data[4] = 10.0;
  data[5 + VocLabel::Person as usize] = 10.0;
  RawTensor::from(data)
}

fn wait_until(mut condition: impl FnMut() -> bool) {
  let deadline = Instant::now() + WAIT;
  while !condition() {
    assert!(Instant::now() < deadline, "condition not met in time");
    thread::sleep(Duration::from_millis(5));
  }
}

fn next_call(harness: &Harness) -> Sender<Reply> {
  harness.started.recv_timeout(WAIT).unwrap()
}

fn publish_person(harness: &Harness) {
  let before = harness.pipeline.status().stats.published;
  harness.pipeline.trigger();
  next_call(harness).send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.published > before);
  wait_until(|| harness.pipeline.status().gate == GateState::Idle);
}

#[test]
fn at_most_one_evaluation_in_flight() {
  let harness = harness(manual());
  for _ in 0..10 {
    harness.pipeline.trigger();
  }

  let reply = next_call(&harness);
  wait_until(|| harness.pipeline.status().stats.dropped_busy == 9);
  assert!(
    harness
      .started
      .recv_timeout(Duration::from_millis(50))
      .is_err()
  );
  assert_eq!(harness.pipeline.status().gate, GateState::InFlight);

  reply.send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.published == 1);
  let latest = harness.pipeline.latest_detections();
  assert_eq!(latest.len(), 1);
  assert_eq!(latest.items[0].kind, VocLabel::Person);

  wait_until(|| harness.pipeline.status().gate == GateState::Idle);
  harness.pipeline.trigger();
  next_call(&harness).send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.published == 2);
  assert_eq!(harness.pipeline.status().stats.started, 2);
}

#[test]
fn adapter_failure_keeps_previous_result() {
  let harness = harness(manual());
  publish_person(&harness);
  let reader = harness.pipeline.reader();
  let previous = reader.latest_detections();

  harness.pipeline.trigger();
  next_call(&harness)
    .send(Err(AdapterError::Evaluation("device lost".to_string())))
    .unwrap();
  wait_until(|| harness.pipeline.status().stats.failed == 1);

  assert_eq!(*reader.latest_detections(), *previous);
  wait_until(|| harness.pipeline.status().gate == GateState::Idle);
}

#[test]
fn wrong_tensor_length_keeps_previous_result() {
  let harness = harness(manual());
  publish_person(&harness);

  harness.pipeline.trigger();
  next_call(&harness)
    .send(Ok(RawTensor::from(vec![0.0; TINY_YOLO_TENSOR_LEN - 1])))
    .unwrap();
  wait_until(|| harness.pipeline.status().stats.failed == 1);

  assert_eq!(harness.pipeline.latest_detections().len(), 1);
  assert_eq!(harness.pipeline.status().stats.published, 1);
}

#[test]
fn empty_result_replaces_previous_boxes() {
  let harness = harness(manual());
  publish_person(&harness);

  harness.pipeline.trigger();
  next_call(&harness)
    .send(Ok(RawTensor::from(vec![0.0; TINY_YOLO_TENSOR_LEN])))
    .unwrap();
  wait_until(|| harness.pipeline.status().stats.published == 2);

  assert!(harness.pipeline.latest_detections().is_empty());
}

#[test]
fn ticks_are_dropped_until_model_is_ready() {
  let harness = harness(manual());
  harness.ready.store(false, Ordering::SeqCst);
  for _ in 0..3 {
    harness.pipeline.trigger();
  }
  wait_until(|| harness.pipeline.status().stats.dropped_not_ready == 3);
  assert!(
    harness
      .started
      .recv_timeout(Duration::from_millis(50))
      .is_err()
  );
  assert_eq!(harness.pipeline.status().gate, GateState::Idle);

  harness.ready.store(true, Ordering::SeqCst);
  publish_person(&harness);
}

#[test]
fn periodic_ticks_respect_single_flight() {
  let config = PipelineConfig::default().with_evaluation_interval(Some(Duration::from_millis(10)));
  let harness = harness(config);

  let reply = next_call(&harness);
  wait_until(|| harness.pipeline.status().stats.dropped_busy >= 3);
  assert_eq!(harness.pipeline.status().stats.started, 1);

  reply.send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.published == 1);
  // 门控释放后定时器会继续派发新的推理
  next_call(&harness);
}

#[test]
fn close_does_not_wait_for_in_flight_evaluation() {
  let mut harness = harness(manual());
  harness.pipeline.trigger();
  let reply = next_call(&harness);

  let closing = Instant::now();
  harness.pipeline.close();
  assert!(closing.elapsed() < Duration::from_secs(1));
  assert!(harness.pipeline.is_closed());
  assert_eq!(harness.pipeline.status().gate, GateState::Stopped);

  // 关闭后才到达的结果不会被发布
  reply.send(Ok(person_tensor())).unwrap();
  thread::sleep(Duration::from_millis(50));
  assert!(harness.pipeline.latest_detections().is_empty());
  assert_eq!(harness.pipeline.status().stats.published, 0);

  harness.pipeline.trigger();
  harness.pipeline.close();
  assert!(
    harness
      .started
      .recv_timeout(Duration::from_millis(50))
      .is_err()
  );
}

#[test]
fn timed_out_evaluation_is_abandoned() {
  let config = manual().with_evaluation_timeout(Some(Duration::from_millis(30)));
  let harness = harness(config);

  harness.pipeline.trigger();
  let stale = next_call(&harness);
  thread::sleep(Duration::from_millis(60));

  harness.pipeline.trigger();
  let fresh = next_call(&harness);

  stale.send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.discarded == 1);
  assert!(harness.pipeline.latest_detections().is_empty());
  assert_eq!(harness.pipeline.status().gate, GateState::InFlight);

  fresh.send(Ok(person_tensor())).unwrap();
  wait_until(|| harness.pipeline.status().stats.published == 1);
  assert_eq!(harness.pipeline.latest_detections().len(), 1);
}

#[test]
fn rejects_invalid_config() {
  let (started, _calls) = crossbeam_channel::unbounded();
  let adapter = Gated {
    ready: Arc::new(AtomicBool::new(true)),
    started,
  };
  let config = PipelineConfig {
    limit: 0,
    ..manual()
  };
  assert!(Pipeline::start(adapter, LatestFrame::new(), config).is_err());
}
