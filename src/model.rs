// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model.rs - 模型定义
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

use serde::{Deserialize, Serialize, Serializer};

pub trait WithLabel: Sized + Copy + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> usize;
  fn from_label_id(id: usize) -> Option<Self>;
}

/// Pascal VOC 的 20 个类别，顺序与模型输出的类别通道一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VocLabel {
  Aeroplane,
  Bicycle,
  Bird,
  Boat,
  Bottle,
  Bus,
  Car,
  Cat,
  Chair,
  Cow,
  DiningTable,
  Dog,
  Horse,
  Motorbike,
  Person,
  PottedPlant,
  Sheep,
  Sofa,
  Train,
  TvMonitor,
}

impl VocLabel {
  pub const ALL: [VocLabel; 20] = [
    VocLabel::Aeroplane,
    VocLabel::Bicycle,
    VocLabel::Bird,
    VocLabel::Boat,
    VocLabel::Bottle,
    VocLabel::Bus,
    VocLabel::Car,
    VocLabel::Cat,
    VocLabel::Chair,
    VocLabel::Cow,
    VocLabel::DiningTable,
    VocLabel::Dog,
    VocLabel::Horse,
    VocLabel::Motorbike,
    VocLabel::Person,
    VocLabel::PottedPlant,
    VocLabel::Sheep,
    VocLabel::Sofa,
    VocLabel::Train,
    VocLabel::TvMonitor,
  ];

  const NAMES: [&'static str; 20] = [
    "aeroplane",
    "bicycle",
    "bird",
    "boat",
    "bottle",
    "bus",
    "car",
    "cat",
    "chair",
    "cow",
    "diningtable",
    "dog",
    "horse",
    "motorbike",
    "person",
    "pottedplant",
    "sheep",
    "sofa",
    "train",
    "tvmonitor",
  ];

  pub fn as_str(&self) -> &'static str {
    Self::NAMES[*self as usize]
  }
}

impl WithLabel for VocLabel {
  fn to_label_str(&self) -> String {
    self.as_str().to_string()
  }

  fn to_label_id(&self) -> usize {
    *self as usize
  }

  fn from_label_id(id: usize) -> Option<Self> {
    Self::ALL.get(id).copied()
  }
}

impl std::fmt::Display for VocLabel {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl Serialize for VocLabel {
  fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(self.as_str())
  }
}

/// 先验框尺寸，单位为网格单元
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnchorPrior {
  pub width: f32,
  pub height: f32,
}

impl AnchorPrior {
  pub const fn new(width: f32, height: f32) -> Self {
    Self { width, height }
  }
}

/// 单个检测框，坐标为模型输入分辨率下的像素值
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Detection<T: WithLabel = VocLabel> {
  pub kind: T,
  pub score: f32,
  pub center_x: f32,
  pub center_y: f32,
  pub width: f32,
  pub height: f32,
}

impl<T: WithLabel> Detection<T> {
  /// [x_min, y_min, x_max, y_max]
  pub fn rect(&self) -> [f32; 4] {
    let half_w = self.width / 2.0;
    let half_h = self.height / 2.0;
    [
      self.center_x - half_w,
      self.center_y - half_h,
      self.center_x + half_w,
      self.center_y + half_h,
    ]
  }

  pub fn area(&self) -> f32 {
    self.width.max(0.0) * self.height.max(0.0)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectResult<T: WithLabel = VocLabel> {
  pub items: Box<[Detection<T>]>,
}

impl<T: WithLabel> Default for DetectResult<T> {
  fn default() -> Self {
    Self {
      items: Box::new([]),
    }
  }
}

impl<T: WithLabel> DetectResult<T> {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, Detection<T>> {
    self.items.iter()
  }
}

impl<T: WithLabel> From<Vec<Detection<T>>> for DetectResult<T> {
  fn from(items: Vec<Detection<T>>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

pub mod nms;
mod tiny_yolo;
pub use self::tiny_yolo::{
  DecodeError, TINY_YOLO_ANCHORS, TINY_YOLO_CELL_SIZE, TINY_YOLO_TENSOR_LEN, TinyYoloDecoder,
};
