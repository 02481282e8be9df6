// 该文件是 Shanan （山南西风） 项目的一部分。
// src/bin/oneshot.rs - 单张图像检测
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
  task::{OneShotTask, Task},
};

/// 单张图像检测并保存叠加结果
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 推理结果回放文件（tensor:///path/to/output.bin）
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入图像（image:///path/to/image.png）
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

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
  let input = ImageFileInput::from_url(&args.input)?.with_repeat(Some(1));
  let model: TensorFileAdapter<Arc<RgbFrame>> = TensorFileAdapter::from_url(&args.model)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask::new(config).run_task(input.into_frames(), model, output)?;

  Ok(())
}
