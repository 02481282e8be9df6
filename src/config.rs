// 该文件是 Shanan （山南西风） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AnchorPrior, TINY_YOLO_ANCHORS, TINY_YOLO_CELL_SIZE, TinyYoloDecoder};

const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.3;
const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
const DEFAULT_LIMIT: usize = 5;
const DEFAULT_EVALUATION_INTERVAL_MS: u64 = 1000;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("配置项 {field} 无效: {reason}")]
  Invalid { field: &'static str, reason: String },
}

impl ConfigError {
  fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
    ConfigError::Invalid {
      field,
      reason: reason.into(),
    }
  }
}

/// 检测流水线的全部可调参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
  /// 候选框最低置信度（objectness × 类别概率）
  pub confidence_threshold: f32,
  /// NMS 的 IoU 阈值，超过即抑制
  pub iou_threshold: f32,
  /// 每次发布的最大检测框数量
  pub limit: usize,
  /// 定时触发间隔；为 `None` 时只能手动触发
  pub evaluation_interval_ms: Option<u64>,
  /// 推理超时；超时的推理会被放弃，其结果到达时直接丢弃
  pub evaluation_timeout_ms: Option<u64>,
  /// 单个网格单元对应的像素数（输入尺寸 / 网格数）
  pub cell_size: f32,
  pub anchors: [AnchorPrior; 5],
}

impl Default for PipelineConfig {
  fn default() -> Self {
    Self {
      confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
      iou_threshold: DEFAULT_IOU_THRESHOLD,
      limit: DEFAULT_LIMIT,
      evaluation_interval_ms: Some(DEFAULT_EVALUATION_INTERVAL_MS),
      evaluation_timeout_ms: None,
      cell_size: TINY_YOLO_CELL_SIZE,
      anchors: TINY_YOLO_ANCHORS,
    }
  }
}

impl PipelineConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    let text = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&text)?;
    config.validate()?;
    Ok(config)
  }

  pub fn with_evaluation_interval(mut self, interval: Option<Duration>) -> Self {
    self.evaluation_interval_ms = interval.map(|d| d.as_millis() as u64);
    self
  }

  pub fn with_evaluation_timeout(mut self, timeout: Option<Duration>) -> Self {
    self.evaluation_timeout_ms = timeout.map(|d| d.as_millis() as u64);
    self
  }

  pub fn evaluation_interval(&self) -> Option<Duration> {
    self.evaluation_interval_ms.map(Duration::from_millis)
  }

  pub fn evaluation_timeout(&self) -> Option<Duration> {
    self.evaluation_timeout_ms.map(Duration::from_millis)
  }

  pub fn decoder(&self) -> TinyYoloDecoder {
    TinyYoloDecoder::new(self.cell_size, self.anchors)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&self.confidence_threshold) {
      return Err(ConfigError::invalid(
        "confidence_threshold",
        format!("{} 不在 [0, 1] 范围内", self.confidence_threshold),
      ));
    }
    if !(0.0..=1.0).contains(&self.iou_threshold) {
      return Err(ConfigError::invalid(
        "iou_threshold",
        format!("{} 不在 [0, 1] 范围内", self.iou_threshold),
      ));
    }
    if self.limit == 0 {
      return Err(ConfigError::invalid("limit", "必须大于 0"));
    }
    if self.evaluation_interval_ms == Some(0) {
      return Err(ConfigError::invalid("evaluation_interval_ms", "必须大于 0"));
    }
    if self.evaluation_timeout_ms == Some(0) {
      return Err(ConfigError::invalid("evaluation_timeout_ms", "必须大于 0"));
    }
    if !(self.cell_size > 0.0) {
      return Err(ConfigError::invalid("cell_size", "必须大于 0"));
    }
    if let Some(anchor) = self
      .anchors
      .iter()
      .find(|a| !(a.width > 0.0 && a.height > 0.0))
    {
      return Err(ConfigError::invalid(
        "anchors",
        format!("先验框尺寸必须大于 0: {:?}", anchor),
      ));
    }
    Ok(())
  }
}
