// 该文件是 Shanan （山南西风） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI schema mismatch")]
  SchemaMismatch,
  #[error("I/O error: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Image loading error: {0}")]
  ImageLoadError(#[from] image::ImageError),
  #[error("Invalid query: {0}")]
  InvalidQuery(String),
}

/// 从单张图片产生帧，`repeat` 次数用于把静态图片当作视频流回放
pub struct ImageFileInput {
  image: RgbImage,
  repeat: Option<usize>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let mut repeat = Some(1);
    for (k, v) in url.query_pairs() {
      if k == "repeat" {
        repeat = match v.as_ref() {
          "forever" => None,
          n => Some(
            n.parse::<usize>()
              .map_err(|e| ImageFileInputError::InvalidQuery(format!("repeat={}: {}", n, e)))?,
          ),
        };
      }
    }

    let image = ImageReader::open(url.path())?.decode()?.to_rgb8();
    Ok(Self::new(image).with_repeat(repeat))
  }
}

impl ImageFileInput {
  pub fn new(image: RgbImage) -> Self {
    Self {
      image,
      repeat: Some(1),
    }
  }

  /// `None` 表示无限重复
  pub fn with_repeat(mut self, repeat: Option<usize>) -> Self {
    self.repeat = repeat;
    self
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn into_frames(self) -> ImageFileInputIter {
    ImageFileInputIter {
      frame: RgbFrame::from(self.image),
      remaining: self.repeat,
    }
  }
}

pub struct ImageFileInputIter {
  frame: RgbFrame,
  remaining: Option<usize>,
}

impl Iterator for ImageFileInputIter {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self.remaining {
      Some(0) => None,
      Some(ref mut n) => {
        *n -= 1;
        Some(self.frame.clone())
      }
      None => Some(self.frame.clone()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn repeats_the_image() {
    let input = ImageFileInput::new(RgbImage::new(4, 3)).with_repeat(Some(3));
    assert_eq!(input.width(), 4);
    let frames: Vec<_> = input.into_frames().collect();
    assert_eq!(frames.len(), 3);
    assert!(frames.iter().all(|f| f.width() == 4 && f.height() == 3));
  }

  #[test]
  fn forever_does_not_end() {
    let input = ImageFileInput::new(RgbImage::new(1, 1)).with_repeat(None);
    assert_eq!(input.into_frames().take(100).count(), 100);
  }

  #[test]
  fn reads_from_url() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("in.png");
    RgbImage::new(5, 6).save(&path).unwrap();

    let url = Url::parse(&format!("image://{}?repeat=2", path.display())).unwrap();
    let input = ImageFileInput::from_url(&url).unwrap();
    assert_eq!((input.width(), input.height()), (5, 6));
    assert_eq!(input.into_frames().count(), 2);
  }

  #[test]
  fn rejects_other_schemes() {
    let url = Url::parse("tensor:///tmp/x.bin").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
  }
}
