// 该文件是 Shanan （山南西风） 项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::Args;

use crate::config::{ConfigError, PipelineConfig};

/// 流水线参数，命令行选项覆盖配置文件与默认值
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineArgs {
  /// JSON 配置文件路径
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub confidence: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou_threshold: Option<f32>,

  /// 每帧最多保留的检测框数量
  #[arg(long, value_name = "COUNT")]
  pub limit: Option<usize>,

  /// 定时推理间隔（毫秒）
  #[arg(long, value_name = "MS", conflicts_with = "manual")]
  pub interval_ms: Option<u64>,

  /// 关闭定时推理，只在每帧到达时手动触发
  #[arg(long)]
  pub manual: bool,

  /// 推理超时（毫秒），超时的推理结果将被丢弃
  #[arg(long, value_name = "MS")]
  pub timeout_ms: Option<u64>,
}

impl PipelineArgs {
  pub fn to_config(&self) -> Result<PipelineConfig, ConfigError> {
    let mut config = match &self.config {
      Some(path) => PipelineConfig::from_json_file(path)?,
      None => PipelineConfig::default(),
    };

    if let Some(confidence) = self.confidence {
      config.confidence_threshold = confidence;
    }
    if let Some(iou) = self.iou_threshold {
      config.iou_threshold = iou;
    }
    if let Some(limit) = self.limit {
      config.limit = limit;
    }
    if let Some(interval) = self.interval_ms {
      config.evaluation_interval_ms = Some(interval);
    }
    if self.manual {
      config.evaluation_interval_ms = None;
    }
    if let Some(timeout) = self.timeout_ms {
      config.evaluation_timeout_ms = Some(timeout);
    }

    config.validate()?;
    Ok(config)
  }
}
