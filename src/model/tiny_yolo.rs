// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/tiny_yolo.rs - Tiny YOLO 输出解码
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

use thiserror::Error;
use tracing::debug;

use crate::model::{AnchorPrior, Detection, VocLabel, WithLabel};

const TINY_YOLO_GRID: usize = 13;
const TINY_YOLO_ANCHOR_NUM: usize = 5;
const TINY_YOLO_CLASS_NUM: usize = 20;
const TINY_YOLO_BOX_PARAMS: usize = 5;
const TINY_YOLO_CHANNELS: usize = TINY_YOLO_BOX_PARAMS + TINY_YOLO_CLASS_NUM;
const TINY_YOLO_INPUT_SIZE: f32 = 416.0;

pub const TINY_YOLO_TENSOR_LEN: usize =
  TINY_YOLO_GRID * TINY_YOLO_GRID * TINY_YOLO_ANCHOR_NUM * TINY_YOLO_CHANNELS;
pub const TINY_YOLO_CELL_SIZE: f32 = TINY_YOLO_INPUT_SIZE / TINY_YOLO_GRID as f32;
pub const TINY_YOLO_ANCHORS: [AnchorPrior; TINY_YOLO_ANCHOR_NUM] = [
  AnchorPrior::new(1.08, 1.19),
  AnchorPrior::new(3.42, 4.41),
  AnchorPrior::new(6.63, 11.38),
  AnchorPrior::new(9.42, 5.11),
  AnchorPrior::new(16.62, 10.52),
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
  #[error("张量长度不匹配: 期望 {expected}, 实际 {actual}")]
  ShapeMismatch { expected: usize, actual: usize },
}

/// 将 13x13x5x25 的原始输出解码为候选框
#[derive(Debug, Clone)]
pub struct TinyYoloDecoder {
  cell_size: f32,
  anchors: [AnchorPrior; TINY_YOLO_ANCHOR_NUM],
}

impl Default for TinyYoloDecoder {
  fn default() -> Self {
    Self {
      cell_size: TINY_YOLO_CELL_SIZE,
      anchors: TINY_YOLO_ANCHORS,
    }
  }
}

impl TinyYoloDecoder {
  pub fn new(cell_size: f32, anchors: [AnchorPrior; TINY_YOLO_ANCHOR_NUM]) -> Self {
    Self { cell_size, anchors }
  }

  pub fn decode(
    &self,
    tensor: &[f32],
    confidence_threshold: f32,
  ) -> Result<Vec<Detection>, DecodeError> {
    if tensor.len() != TINY_YOLO_TENSOR_LEN {
      return Err(DecodeError::ShapeMismatch {
        expected: TINY_YOLO_TENSOR_LEN,
        actual: tensor.len(),
      });
    }

    let mut items = Vec::new();
    let mut class_probs = [0f32; TINY_YOLO_CLASS_NUM];

    for row in 0..TINY_YOLO_GRID {
      for col in 0..TINY_YOLO_GRID {
        let cell = row * TINY_YOLO_GRID + col;
        for (anchor_idx, anchor) in self.anchors.iter().enumerate() {
          let offset = (cell * TINY_YOLO_ANCHOR_NUM + anchor_idx) * TINY_YOLO_CHANNELS;
          let channels = &tensor[offset..offset + TINY_YOLO_CHANNELS];

          let objectness = sigmoid(channels[4]);
          softmax(&channels[TINY_YOLO_BOX_PARAMS..], &mut class_probs);
          let (best_class, best_prob) = argmax(&class_probs);
          let score = objectness * best_prob;

          // NaN 不满足比较，同样被过滤
          if !(score > confidence_threshold) {
            continue;
          }

          let Some(kind) = VocLabel::from_label_id(best_class) else {
            continue;
          };

          items.push(Detection {
            kind,
            score,
            center_x: (sigmoid(channels[0]) + col as f32) * self.cell_size,
            center_y: (sigmoid(channels[1]) + row as f32) * self.cell_size,
            width: channels[2].exp() * anchor.width * self.cell_size,
            height: channels[3].exp() * anchor.height * self.cell_size,
          });
        }
      }
    }

    debug!("解码得到 {} 个候选框", items.len());
    Ok(items)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

fn softmax(logits: &[f32], out: &mut [f32]) {
  let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let mut sum = 0.0;
  for (o, &l) in out.iter_mut().zip(logits) {
    *o = (l - max).exp();
    sum += *o;
  }
  for o in out.iter_mut() {
    *o /= sum;
  }
}

// 并列时取第一个
fn argmax(values: &[f32]) -> (usize, f32) {
  let mut best = (0usize, f32::MIN);
  for (idx, &v) in values.iter().enumerate() {
    if v > best.1 {
      best = (idx, v);
    }
  }
  best
}

#[cfg(test)]
mod tests {
  use super::*;

  fn offset(row: usize, col: usize, anchor: usize) -> usize {
    ((row * TINY_YOLO_GRID + col) * TINY_YOLO_ANCHOR_NUM + anchor) * TINY_YOLO_CHANNELS
  }

  #[test]
  fn tensor_len_matches_model_shape() {
    assert_eq!(TINY_YOLO_TENSOR_LEN, 21125);
    assert_eq!(TINY_YOLO_CELL_SIZE, 32.0);
  }

  #[test]
  fn zero_tensor_yields_no_candidates() {
    let tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let items = TinyYoloDecoder::default().decode(&tensor, 0.3).unwrap();
    assert!(items.is_empty());
  }

  #[test]
  fn zero_tensor_passes_a_low_threshold() {
    // 0.5 * 0.05 = 0.025
    let tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let items = TinyYoloDecoder::default().decode(&tensor, 0.02).unwrap();
    assert_eq!(items.len(), 169 * 5);
    assert!(items.iter().all(|d| (d.score - 0.025).abs() < 1e-6));
    assert!(items.iter().all(|d| d.kind == VocLabel::Aeroplane));
  }

  #[test]
  fn score_equal_to_threshold_is_dropped() {
    let tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let decoder = TinyYoloDecoder::default();
    let score = decoder.decode(&tensor, 0.0).unwrap()[0].score;
    assert!(decoder.decode(&tensor, score).unwrap().is_empty());
  }

  #[test]
  fn nan_objectness_is_dropped() {
    let mut tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let base = offset(2, 2, 0);
    tensor[base + 4] = f32::NAN;
    tensor[base + 5 + VocLabel::Person as usize] = 10.0;

    let items = TinyYoloDecoder::default().decode(&tensor, 0.3).unwrap();
    assert!(items.is_empty());
    let items = TinyYoloDecoder::default().decode(&tensor, 0.02).unwrap();
    assert_eq!(items.len(), 169 * 5 - 1);
    assert!(items.iter().all(|d| d.score.is_finite()));
  }

  #[test]
  fn short_tensor_is_a_shape_error() {
    let tensor = vec![0f32; TINY_YOLO_TENSOR_LEN - 1];
    let err = TinyYoloDecoder::default().decode(&tensor, 0.3).unwrap_err();
    assert_eq!(
      err,
      DecodeError::ShapeMismatch {
        expected: 21125,
        actual: 21124
      }
    );
  }

  #[test]
  fn long_tensor_is_a_shape_error() {
    let tensor = vec![0f32; TINY_YOLO_TENSOR_LEN + 25];
    assert!(TinyYoloDecoder::default().decode(&tensor, 0.3).is_err());
  }

  #[test]
  fn strong_anchor_decodes_to_pixels() {
    let mut tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let base = offset(6, 3, 1);
    tensor[base + 2] = 0.5f32.ln();
    tensor[base + 4] = 10.0;
    tensor[base + 5 + VocLabel::Person as usize] = 10.0;

    let items = TinyYoloDecoder::default().decode(&tensor, 0.3).unwrap();
    assert_eq!(items.len(), 1);
    let det = &items[0];
    assert_eq!(det.kind, VocLabel::Person);
    assert!((det.center_x - 3.5 * 32.0).abs() < 1e-3);
    assert!((det.center_y - 6.5 * 32.0).abs() < 1e-3);
    assert!((det.width - 0.5 * 3.42 * 32.0).abs() < 1e-3);
    assert!((det.height - 4.41 * 32.0).abs() < 1e-3);
    assert!(det.score > 0.99 && det.score <= 1.0);
  }

  #[test]
  fn large_logits_do_not_overflow() {
    let mut tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let base = offset(0, 0, 0);
    tensor[base + 4] = 50.0;
    tensor[base + 5 + VocLabel::Cat as usize] = 1000.0;
    tensor[base + 5 + VocLabel::Dog as usize] = 990.0;

    let items = TinyYoloDecoder::default().decode(&tensor, 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].kind, VocLabel::Cat);
    assert!(items[0].score.is_finite());
  }

  #[test]
  fn custom_cell_size_and_anchors_are_used() {
    let anchors = [AnchorPrior::new(2.0, 3.0); TINY_YOLO_ANCHOR_NUM];
    let decoder = TinyYoloDecoder::new(10.0, anchors);
    let mut tensor = vec![0f32; TINY_YOLO_TENSOR_LEN];
    let base = offset(0, 0, 4);
    tensor[base + 4] = 10.0;
    tensor[base + 5] = 10.0;

    let items = decoder.decode(&tensor, 0.3).unwrap();
    assert_eq!(items.len(), 1);
    assert!((items[0].center_x - 5.0).abs() < 1e-4);
    assert!((items[0].width - 20.0).abs() < 1e-4);
    assert!((items[0].height - 30.0).abs() < 1e-4);
  }
}
