// 该文件是 Shanan （山南西风） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use std::{io, path::Path};

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_hollow_rect_mut, draw_text_mut},
  rect::Rect,
};
use serde::Serialize;
use url::Url;

use crate::{
  frame::RgbFrame,
  model::{DetectResult, Detection, WithLabel},
};

const LABEL_FONT_SIZE: f32 = 16.0;
// 标签文字位于检测框上方 10 像素
const LABEL_OFFSET: i32 = 10;
const BOX_STROKE: u32 = 2;
const BOX_COLOR: [u8; 3] = [255, 255, 0]; // 黄色

/// 检测框叠加绘制。未配置字体时只画框，不画标签。
#[derive(Clone)]
pub struct Draw {
  font: Option<FontArc>,
  font_size: f32,
  color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      color: BOX_COLOR,
    }
  }
}

impl Draw {
  pub fn with_font(mut self, font: FontArc) -> Self {
    self.font = Some(font);
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  /// 读取 `?font=/path/to/font.ttf`
  pub fn from_query(url: &Url) -> io::Result<Self> {
    let mut draw = Self::default();
    for (k, v) in url.query_pairs() {
      if k == "font" {
        draw = draw.with_font(load_font(Path::new(v.as_ref()))?);
      }
    }
    Ok(draw)
  }

  pub fn overlay<T: WithLabel>(&self, frame: &RgbFrame, result: &DetectResult<T>) -> RgbImage {
    let mut image = frame.to_rgb_image();
    self.draw_detections(&mut image, result);
    image
  }

  pub fn draw_detections<T: WithLabel>(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    for detection in result.iter() {
      let Some(rect) = clip_box(detection, image.width(), image.height()) else {
        continue;
      };

      for inset in 0..BOX_STROKE {
        let (w, h) = (rect.width(), rect.height());
        if w <= 2 * inset || h <= 2 * inset {
          break;
        }
        let stroke = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
          .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(image, stroke, Rgb(self.color));
      }

      if let Some(font) = &self.font {
        draw_text_mut(
          image,
          Rgb(self.color),
          rect.left(),
          rect.top() - LABEL_OFFSET,
          PxScale::from(self.font_size),
          font,
          &label_text(detection),
        );
      }
    }
  }
}

pub fn load_font(path: &Path) -> io::Result<FontArc> {
  let data = std::fs::read(path)?;
  FontArc::try_from_vec(data).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}

/// `"<label> (<confidence>)"`，置信度保留 4 位小数
pub fn label_text<T: WithLabel>(detection: &Detection<T>) -> String {
  format!("{} ({:.4})", detection.kind.to_label_str(), detection.score)
}

/// 把中心点坐标的检测框转成左上角矩形，并裁剪到画面内
pub fn clip_box<T: WithLabel>(
  detection: &Detection<T>,
  frame_width: u32,
  frame_height: u32,
) -> Option<Rect> {
  let [left, top, _, _] = detection.rect();
  let x = left.max(0.0);
  let y = top.max(0.0);
  let w = (frame_width as f32 - x).min(detection.width);
  let h = (frame_height as f32 - y).min(detection.height);

  if !(w >= 1.0 && h >= 1.0) {
    return None;
  }

  Some(Rect::at(x as i32, y as i32).of_size(w as u32, h as u32))
}

#[derive(Serialize)]
#[serde(untagged)]
enum RecordLabel {
  Name(String),
  Id(usize),
}

#[derive(Serialize)]
struct RecordEntry {
  label: RecordLabel,
  score: f32,
  bbox: [f32; 4],
}

/// 在保存的图像旁写一个同名 JSON 文件，记录检测结果
#[derive(Debug, Clone, Copy)]
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  /// `?record=name` 或 `?record=id`；未给出时返回 `None`
  pub fn from_query(url: &Url) -> Option<Self> {
    url
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| Record {
        label_with_name: v != "id",
      })
  }

  pub fn record<T: WithLabel>(&self, result: &DetectResult<T>, path: &Path) -> io::Result<()> {
    let entries: Vec<RecordEntry> = result
      .iter()
      .map(|item| RecordEntry {
        label: if self.label_with_name {
          RecordLabel::Name(item.kind.to_label_str())
        } else {
          RecordLabel::Id(item.kind.to_label_id())
        },
        score: item.score,
        bbox: item.rect(),
      })
      .collect();
    let text = serde_json::to_string_pretty(&entries).map_err(io::Error::other)?;
    std::fs::write(path.with_extension("json"), text)
  }
}
