// 该文件是 Shanan （山南西风） 项目的一部分。
// src/model/nms.rs - 非极大值抑制
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

use std::collections::VecDeque;

use tracing::debug;

use crate::model::{Detection, WithLabel};

/// 贪心 NMS，不区分类别。
///
/// 输出按置信度降序排列，长度不超过 `limit`；置信度相同时保持输入顺序。
pub fn suppress<T: WithLabel>(
  mut candidates: Vec<Detection<T>>,
  limit: usize,
  iou_threshold: f32,
) -> Vec<Detection<T>> {
  // sort_by 是稳定排序
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut remaining = VecDeque::from(candidates);
  let mut result = Vec::with_capacity(limit.min(remaining.len()));

  while result.len() < limit {
    let Some(best) = remaining.pop_front() else {
      break;
    };
    remaining.retain(|det| iou(&best, det) <= iou_threshold);
    result.push(best);
  }

  debug!("NMS 后保留 {} 个检测框", result.len());
  result
}

/// 两个检测框的交并比，不相交或并集面积为 0 时返回 0
pub fn iou<T: WithLabel>(a: &Detection<T>, b: &Detection<T>) -> f32 {
  let [ax1, ay1, ax2, ay2] = a.rect();
  let [bx1, by1, bx2, by2] = b.rect();

  let x1 = ax1.max(bx1);
  let y1 = ay1.max(by1);
  let x2 = ax2.min(bx2);
  let y2 = ay2.min(by2);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let union = a.area() + b.area() - intersection;

  if intersection > 0.0 && union > 0.0 {
    intersection / union
  } else {
    0.0
  }
}
