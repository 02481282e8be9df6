// 该文件是 Shanan （山南西风） 项目的一部分。
// src/task.rs - 检测任务
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
  sync::Arc,
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, info, warn};

use crate::{
  adapter::InferenceAdapter,
  config::PipelineConfig,
  frame::RgbFrame,
  input::LatestFrame,
  model::{DetectResult, nms::suppress},
  output::Render,
  scheduler::Pipeline,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单张图片：同步推理一次，叠加后输出
#[derive(Debug, Default)]
pub struct OneShotTask {
  config: PipelineConfig,
}

impl OneShotTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self { config }
  }
}

impl<I, A, O, RE> Task<I, A, O> for OneShotTask
where
  I: Iterator<Item = RgbFrame>,
  A: InferenceAdapter<Frame = Arc<RgbFrame>>,
  O: Render<RgbFrame, DetectResult, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: A, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = Arc::new(input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?);
    info!("输入帧获取成功，开始推理...");

    let now = Instant::now();
    let tensor = model.evaluate(frame.clone())?;
    let candidates = self
      .config
      .decoder()
      .decode(tensor.as_slice(), self.config.confidence_threshold)?;
    let result = DetectResult::from(suppress(
      candidates,
      self.config.limit,
      self.config.iou_threshold,
    ));
    info!(
      "推理完成，耗时: {:.2?}，检测到 {} 个目标",
      now.elapsed(),
      result.len()
    );

    output.render_result(&frame, &result)?;
    info!("渲染完成");

    Ok(())
  }
}

/// 连续帧：渲染路径逐帧叠加最新结果，推理在后台按配置的节奏进行
#[derive(Debug)]
pub struct ContinuousTask {
  config: PipelineConfig,
  frame_number: Option<usize>,
  frame_interval: Option<Duration>,
  handle_interrupt: bool,
}

impl ContinuousTask {
  pub fn new(config: PipelineConfig) -> Self {
    Self {
      config,
      frame_number: None,
      frame_interval: None,
      handle_interrupt: true,
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  /// 按给定帧率放帧；不设置时输入有多快就处理多快
  pub fn with_fps(mut self, fps: Option<f64>) -> Self {
    self.frame_interval = fps
      .filter(|fps| *fps > 0.0)
      .map(|fps| Duration::from_secs_f64(1.0 / fps));
    self
  }

  /// 不安装 Ctrl-C 处理器，用于嵌入到其他程序中
  pub fn without_interrupt_handler(mut self) -> Self {
    self.handle_interrupt = false;
    self
  }
}

impl<I, A, O, RE> Task<I, A, O> for ContinuousTask
where
  I: Iterator<Item = RgbFrame>,
  A: InferenceAdapter<Frame = Arc<RgbFrame>>,
  O: Render<RgbFrame, DetectResult, Error = RE>,
  RE: std::error::Error + Sync + Send + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: A, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = crossbeam_channel::bounded(1);

    if self.handle_interrupt {
      ctrlc::set_handler(move || {
        info!("收到中断信号，准备退出...");
        let _ = tx.try_send(());
        thread::spawn(|| {
          thread::sleep(Duration::from_secs(30));
          warn!("强制退出程序");
          std::process::exit(1);
        });
      })?;
    }

    let trigger_per_frame = self.config.evaluation_interval().is_none();
    if trigger_per_frame {
      info!("未配置定时推理，每帧到达时手动触发");
    }

    let mut pipeline = Pipeline::start(model, LatestFrame::new(), self.config)?;
    let reader = pipeline.reader();

    let mut frame_index = 0usize;
    for frame in input {
      let started = Instant::now();
      frame_index = frame_index.wrapping_add(1);

      let frame = Arc::new(frame);
      pipeline.source().push(frame.clone());
      if trigger_per_frame {
        pipeline.trigger();
      }

      let result = reader.latest_detections();
      output.render_result(&frame, &result)?;
      debug!(
        "第 {} 帧渲染完成，叠加 {} 个检测框，耗时: {:.2?}",
        frame_index,
        result.len(),
        started.elapsed()
      );

      if self.frame_number.is_some_and(|n| frame_index >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
      if let Some(interval) = self.frame_interval {
        thread::sleep(interval.saturating_sub(started.elapsed()));
      }
    }

    let status = pipeline.status();
    pipeline.close();
    info!("任务完成，退出: {:?}", status.stats);
    Ok(())
  }
}
