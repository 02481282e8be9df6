// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input.rs - 视频/图像输入
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

use arc_swap::ArcSwapOption;

use crate::frame::RgbFrame;

/// 调度器在每次触发时通过它获取当前帧的快照
pub trait FrameSource: Send + Sync + 'static {
  type Frame: Send + 'static;

  /// 返回一个独立于渲染路径的快照；尚无帧时返回 `None`
  fn snapshot(&self) -> Option<Self::Frame>;
}

impl<S: FrameSource> FrameSource for Arc<S> {
  type Frame = S::Frame;

  fn snapshot(&self) -> Option<Self::Frame> {
    (**self).snapshot()
  }
}

/// 最新一帧。渲染路径整体替换帧，调度器拿走的快照是不可变的共享引用，
/// 因此不会被后续帧覆盖或复用。
#[derive(Default)]
pub struct LatestFrame {
  slot: ArcSwapOption<RgbFrame>,
}

impl LatestFrame {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push(&self, frame: Arc<RgbFrame>) {
    self.slot.store(Some(frame));
  }
}

impl FrameSource for LatestFrame {
  type Frame = Arc<RgbFrame>;

  fn snapshot(&self) -> Option<Self::Frame> {
    self.slot.load_full()
  }
}

mod read_image_file;
pub use self::read_image_file::{ImageFileInput, ImageFileInputError, ImageFileInputIter};

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn snapshot_survives_replacement() {
    let latest = LatestFrame::new();
    assert!(latest.snapshot().is_none());

    let mut first = RgbFrame::with_shape(2, 2);
    first.as_mut()[0] = 7;
    latest.push(Arc::new(first));
    let snapshot = latest.snapshot().unwrap();

    latest.push(Arc::new(RgbFrame::with_shape(4, 4)));
    assert_eq!(snapshot.width(), 2);
    assert_eq!(snapshot.as_hwc()[0], 7);
    assert_eq!(latest.snapshot().unwrap().width(), 4);
  }
}
