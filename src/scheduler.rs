// 该文件是 Shanan （山南西风） 项目的一部分。
// src/scheduler.rs - 推理调度
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

//! 推理调度器。
//!
//! 定时触发与帧率解耦，同一时刻最多只有一次推理在进行：
//!
//! - 触发（定时器或 [`Pipeline::trigger`]）进入单消费者的评估循环；
//! - 门控空闲时截取当前帧快照，在后台线程上调用推理适配器；
//! - 推理完成后作为消息回到评估循环，解码、NMS 后原子地发布到 [`LatestResult`]；
//! - 门控忙碌或模型未就绪时，本次触发直接丢弃，不排队。
//!
//! 关闭后门控进入 `Stopped`，之后到达的推理结果一律丢弃。

use std::{
  sync::{
    Arc,
    atomic::{AtomicU8, AtomicU64, Ordering},
  },
  thread::{self, JoinHandle},
  time::Instant,
};

use crossbeam_channel::{Receiver, Sender, select};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  adapter::{AdapterError, InferenceAdapter, RawTensor},
  config::{ConfigError, PipelineConfig},
  input::FrameSource,
  model::{DecodeError, DetectResult, TinyYoloDecoder, nms::suppress},
  publish::{DetectionReader, LatestResult},
};

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
  Idle = 0,
  InFlight = 1,
  Stopped = 2,
}

impl From<u8> for GateState {
  fn from(value: u8) -> Self {
    match value {
      0 => GateState::Idle,
      1 => GateState::InFlight,
      _ => GateState::Stopped,
    }
  }
}

/// 单飞门控：`Idle ⇄ InFlight`，`Stopped` 为终态
#[derive(Debug)]
pub struct EvaluationGate {
  state: AtomicU8,
}

impl Default for EvaluationGate {
  fn default() -> Self {
    Self {
      state: AtomicU8::new(GateState::Idle as u8),
    }
  }
}

impl EvaluationGate {
  pub fn state(&self) -> GateState {
    self.state.load(Ordering::Acquire).into()
  }

  /// `Idle -> InFlight`
  pub fn try_acquire(&self) -> bool {
    self.transition(GateState::Idle, GateState::InFlight)
  }

  /// `InFlight -> Idle`；已停止时返回 false
  pub fn release(&self) -> bool {
    self.transition(GateState::InFlight, GateState::Idle)
  }

  /// 进入终态，返回之前的状态
  pub fn stop(&self) -> GateState {
    self
      .state
      .swap(GateState::Stopped as u8, Ordering::AcqRel)
      .into()
  }

  fn transition(&self, from: GateState, to: GateState) -> bool {
    self
      .state
      .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
      .is_ok()
  }
}

#[derive(Debug, Default)]
pub struct EvaluationStats {
  started: AtomicU64,
  published: AtomicU64,
  failed: AtomicU64,
  dropped_busy: AtomicU64,
  dropped_not_ready: AtomicU64,
  no_frame: AtomicU64,
  discarded: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
  /// 已派发的推理次数
  pub started: u64,
  /// 成功发布的结果次数
  pub published: u64,
  /// 推理失败或输出无法解码的次数
  pub failed: u64,
  /// 因推理进行中而丢弃的触发
  pub dropped_busy: u64,
  /// 因模型未就绪而丢弃的触发
  pub dropped_not_ready: u64,
  /// 触发时尚无可用帧的次数
  pub no_frame: u64,
  /// 超时或关闭后才到达、被丢弃的结果
  pub discarded: u64,
}

impl EvaluationStats {
  fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub fn snapshot(&self) -> StatsSnapshot {
    StatsSnapshot {
      started: self.started.load(Ordering::Relaxed),
      published: self.published.load(Ordering::Relaxed),
      failed: self.failed.load(Ordering::Relaxed),
      dropped_busy: self.dropped_busy.load(Ordering::Relaxed),
      dropped_not_ready: self.dropped_not_ready.load(Ordering::Relaxed),
      no_frame: self.no_frame.load(Ordering::Relaxed),
      discarded: self.discarded.load(Ordering::Relaxed),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineStatus {
  pub gate: GateState,
  pub stats: StatsSnapshot,
}

#[derive(Error, Debug)]
pub enum EvaluationError {
  #[error("输出解码失败: {0}")]
  ShapeMismatch(#[from] DecodeError),
  #[error("推理适配器失败: {0}")]
  AdapterFailure(#[from] AdapterError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("配置无效: {0}")]
  Config(#[from] ConfigError),
  #[error("无法启动评估线程: {0}")]
  Spawn(#[source] std::io::Error),
}

/// 一次触发的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
  Started(u64),
  Busy,
  NotReady,
  NoFrame,
  Stopped,
  SpawnFailed,
}

enum Message {
  Trigger,
  Completed {
    cycle: u64,
    outcome: Result<RawTensor, AdapterError>,
  },
  Shutdown,
}

struct InFlight {
  cycle: u64,
  started_at: Instant,
}

/// 评估循环独占的上下文
struct EvaluationContext<A, S> {
  adapter: Arc<A>,
  source: Arc<S>,
  decoder: TinyYoloDecoder,
  config: PipelineConfig,
  gate: Arc<EvaluationGate>,
  latest: Arc<LatestResult>,
  stats: Arc<EvaluationStats>,
  completions: Sender<Message>,
  in_flight: Option<InFlight>,
  next_cycle: u64,
}

impl<A, S> EvaluationContext<A, S>
where
  A: InferenceAdapter,
  S: FrameSource<Frame = A::Frame>,
{
  fn on_tick(&mut self) -> TickOutcome {
    if self.gate.state() == GateState::Stopped {
      return TickOutcome::Stopped;
    }

    self.expire_stale();

    if !self.gate.try_acquire() {
      // 与 stop() 竞争失败时不计入忙碌丢弃
      if self.gate.state() == GateState::Stopped {
        return TickOutcome::Stopped;
      }
      EvaluationStats::bump(&self.stats.dropped_busy);
      debug!("推理仍在进行，丢弃本次触发");
      return TickOutcome::Busy;
    }

    if !self.adapter.is_ready() {
      self.gate.release();
      EvaluationStats::bump(&self.stats.dropped_not_ready);
      debug!("模型尚未就绪，丢弃本次触发");
      return TickOutcome::NotReady;
    }

    let Some(frame) = self.source.snapshot() else {
      self.gate.release();
      EvaluationStats::bump(&self.stats.no_frame);
      debug!("尚无可用帧，跳过本次触发");
      return TickOutcome::NoFrame;
    };

    let cycle = self.next_cycle;
    let adapter = self.adapter.clone();
    let completions = self.completions.clone();
    let spawned = thread::Builder::new()
      .name(format!("evaluation-{}", cycle))
      .spawn(move || {
        let outcome = adapter.evaluate(frame);
        if completions
          .send(Message::Completed { cycle, outcome })
          .is_err()
        {
          debug!("评估循环已退出，丢弃第 {} 轮推理结果", cycle);
        }
      });

    match spawned {
      Ok(_) => {
        self.next_cycle += 1;
        self.in_flight = Some(InFlight {
          cycle,
          started_at: Instant::now(),
        });
        EvaluationStats::bump(&self.stats.started);
        debug!("开始第 {} 轮推理", cycle);
        TickOutcome::Started(cycle)
      }
      Err(e) => {
        error!("无法启动推理线程: {}", e);
        self.gate.release();
        TickOutcome::SpawnFailed
      }
    }
  }

  fn on_completion(&mut self, cycle: u64, outcome: Result<RawTensor, AdapterError>) {
    if self.gate.state() == GateState::Stopped {
      EvaluationStats::bump(&self.stats.discarded);
      debug!("流水线已关闭，丢弃第 {} 轮推理结果", cycle);
      return;
    }

    match self.in_flight {
      Some(InFlight { cycle: current, .. }) if current == cycle => {}
      _ => {
        EvaluationStats::bump(&self.stats.discarded);
        debug!("第 {} 轮推理已被放弃，丢弃其结果", cycle);
        return;
      }
    }
    self.in_flight = None;

    match self.postprocess(outcome) {
      Ok(result) => {
        self.publish(cycle, result);
      }
      Err(EvaluationError::ShapeMismatch(e)) => {
        EvaluationStats::bump(&self.stats.failed);
        error!("第 {} 轮推理输出无效，保留上一次结果: {}", cycle, e);
      }
      Err(EvaluationError::AdapterFailure(e)) => {
        EvaluationStats::bump(&self.stats.failed);
        warn!("第 {} 轮推理失败，保留上一次结果: {}", cycle, e);
      }
    }

    self.gate.release();
  }

  /// 发布前再检查一次门控，解码期间被关闭的结果直接丢弃
  fn publish(&self, cycle: u64, result: DetectResult) -> bool {
    if self.gate.state() == GateState::Stopped {
      EvaluationStats::bump(&self.stats.discarded);
      debug!("流水线已关闭，丢弃第 {} 轮推理结果", cycle);
      return false;
    }

    info!("第 {} 轮推理完成，发布 {} 个检测框", cycle, result.len());
    self.latest.publish(result);
    EvaluationStats::bump(&self.stats.published);
    true
  }

  fn postprocess(
    &self,
    outcome: Result<RawTensor, AdapterError>,
  ) -> Result<DetectResult, EvaluationError> {
    let tensor = outcome?;
    let candidates = self
      .decoder
      .decode(tensor.as_slice(), self.config.confidence_threshold)?;
    let items = suppress(candidates, self.config.limit, self.config.iou_threshold);
    Ok(DetectResult::from(items))
  }

  fn expire_stale(&mut self) {
    let (Some(timeout), Some(flight)) = (self.config.evaluation_timeout(), &self.in_flight) else {
      return;
    };

    if flight.started_at.elapsed() >= timeout {
      warn!(
        "第 {} 轮推理超过 {:?} 未完成，放弃并释放门控",
        flight.cycle, timeout
      );
      self.in_flight = None;
      self.gate.release();
    }
  }

  fn run(mut self, messages: Receiver<Message>) {
    let ticker = match self.config.evaluation_interval() {
      Some(interval) => crossbeam_channel::tick(interval),
      None => crossbeam_channel::never(),
    };

    loop {
      select! {
        recv(ticker) -> _ => {
          self.on_tick();
        }
        recv(messages) -> message => match message {
          Ok(Message::Trigger) => {
            self.on_tick();
          }
          Ok(Message::Completed { cycle, outcome }) => self.on_completion(cycle, outcome),
          Ok(Message::Shutdown) | Err(_) => break,
        }
      }
    }

    info!("评估循环退出");
  }
}

/// 检测流水线：持有门控、最新结果和评估循环线程
pub struct Pipeline<S> {
  source: Arc<S>,
  gate: Arc<EvaluationGate>,
  latest: Arc<LatestResult>,
  stats: Arc<EvaluationStats>,
  messages: Sender<Message>,
  worker: Option<JoinHandle<()>>,
}

impl<S: FrameSource> Pipeline<S> {
  pub fn start<A>(adapter: A, source: S, config: PipelineConfig) -> Result<Self, PipelineError>
  where
    A: InferenceAdapter<Frame = S::Frame>,
  {
    config.validate()?;
    info!(
      "启动检测流水线: 置信度阈值 {}, IoU 阈值 {}, 最多 {} 个检测框, 触发间隔 {:?}",
      config.confidence_threshold,
      config.iou_threshold,
      config.limit,
      config.evaluation_interval()
    );

    let source = Arc::new(source);
    let gate = Arc::new(EvaluationGate::default());
    let latest = Arc::new(LatestResult::new());
    let stats = Arc::new(EvaluationStats::default());
    let (messages, receiver) = crossbeam_channel::unbounded();

    let context = EvaluationContext {
      adapter: Arc::new(adapter),
      source: source.clone(),
      decoder: config.decoder(),
      config,
      gate: gate.clone(),
      latest: latest.clone(),
      stats: stats.clone(),
      completions: messages.clone(),
      in_flight: None,
      next_cycle: 0,
    };

    let worker = thread::Builder::new()
      .name("evaluation-loop".to_string())
      .spawn(move || context.run(receiver))
      .map_err(PipelineError::Spawn)?;

    Ok(Self {
      source,
      gate,
      latest,
      stats,
      messages,
      worker: Some(worker),
    })
  }

  pub fn source(&self) -> &S {
    &self.source
  }

  pub fn reader(&self) -> DetectionReader {
    DetectionReader::new(self.latest.clone())
  }

  pub fn latest_detections(&self) -> Arc<DetectResult> {
    self.latest.load()
  }

  /// 立即请求一次推理，与定时触发走同一路径
  pub fn trigger(&self) {
    if self.messages.send(Message::Trigger).is_err() {
      debug!("评估循环已退出，忽略触发");
    }
  }

  pub fn status(&self) -> PipelineStatus {
    PipelineStatus {
      gate: self.gate.state(),
      stats: self.stats.snapshot(),
    }
  }

  pub fn is_closed(&self) -> bool {
    self.worker.is_none()
  }

  /// 停止触发并退出评估循环，不等待正在进行的推理
  pub fn close(&mut self) {
    let Some(worker) = self.worker.take() else {
      return;
    };

    if self.gate.stop() == GateState::InFlight {
      debug!("关闭时仍有推理在进行，其结果将被丢弃");
    }
    info!("关闭检测流水线");

    let _ = self.messages.send(Message::Shutdown);
    if worker.join().is_err() {
      error!("评估循环线程异常退出");
    }
  }
}

impl<S> Drop for Pipeline<S> {
  fn drop(&mut self) {
    if let Some(worker) = self.worker.take() {
      self.gate.stop();
      let _ = self.messages.send(Message::Shutdown);
      if worker.join().is_err() {
        error!("评估循环线程异常退出");
      }
    }
  }
}
