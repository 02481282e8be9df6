// 该文件是 Shanan （山南西风） 项目的一部分。
// src/publish.rs - 检测结果发布
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

use arc_swap::ArcSwap;

use crate::model::DetectResult;

/// 最近一次完成的检测结果。写入是一次原子替换，读者只会看到完整的旧值或新值。
#[derive(Debug, Default)]
pub struct LatestResult {
  slot: ArcSwap<DetectResult>,
}

impl LatestResult {
  pub fn new() -> Self {
    Self::default()
  }

  pub(crate) fn publish(&self, result: DetectResult) {
    self.slot.store(Arc::new(result));
  }

  pub fn load(&self) -> Arc<DetectResult> {
    self.slot.load_full()
  }
}

/// 渲染端持有的只读句柄，读取从不阻塞
#[derive(Debug, Clone)]
pub struct DetectionReader {
  latest: Arc<LatestResult>,
}

impl DetectionReader {
  pub(crate) fn new(latest: Arc<LatestResult>) -> Self {
    Self { latest }
  }

  pub fn latest_detections(&self) -> Arc<DetectResult> {
    self.latest.load()
  }
}
