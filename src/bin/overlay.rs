// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/overlay.rs - 连续帧检测叠加
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

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use url::Url;

use shanan_overlay::{
  FromUrl,
  adapter::TensorFileAdapter,
  args::PipelineArgs,
  frame::RgbFrame,
  input::ImageFileInput,
  output::OutputWrapper,
  task::{ContinuousTask, Task},
};

/// 实时检测叠加：渲染路径逐帧输出，推理在后台单飞进行
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理结果回放文件（tensor:///path/to/output.bin?delay_ms=N）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源（image:///path/to/frame.png?repeat=forever）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径（image:///path/out.png 或 folder:///path/dir）
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  /// 处理指定帧数后退出
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,

  /// 渲染帧率
  #[arg(long, value_name = "FPS", default_value = "30")]
  pub fps: f64,

  #[command(flatten)]
  pub pipeline: PipelineArgs,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = Args::parse();

  info!("模型文件路径: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = args.pipeline.to_config()?;
  let input = ImageFileInput::from_url(&args.input)?;
  let model: TensorFileAdapter<Arc<RgbFrame>> = TensorFileAdapter::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  ContinuousTask::new(config)
    .with_frame_number(args.frame_number)
    .with_fps(Some(args.fps))
    .run_task(input.into_frames(), model, output)?;

  Ok(())
}
