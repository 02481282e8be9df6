// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adapter/tensor_file.rs - 从文件回放模型输出
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

use std::{marker::PhantomData, path::Path, thread, time::Duration};

use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  adapter::{AdapterError, InferenceAdapter, RawTensor},
};

#[derive(Error, Debug)]
pub enum TensorFileError {
  #[error("URI 方案不匹配: 期望 '{expected}', 实际 '{actual}'")]
  SchemeMismatch { expected: String, actual: String },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("张量文件长度 {0} 不是 4 的倍数")]
  InvalidLength(usize),
  #[error("参数无效: {0}")]
  InvalidQuery(String),
}

impl From<TensorFileError> for AdapterError {
  fn from(err: TensorFileError) -> Self {
    match err {
      TensorFileError::IoError(e) => AdapterError::Io(e),
      other => AdapterError::InvalidData(other.to_string()),
    }
  }
}

/// 每次推理都返回同一份预先录制的输出张量（小端 f32），
/// 可通过 `delay_ms` 模拟推理耗时。
pub struct TensorFileAdapter<Frame> {
  tensor: RawTensor,
  delay: Option<Duration>,
  _phantom: PhantomData<fn(Frame)>,
}

impl<Frame> FromUrlWithScheme for TensorFileAdapter<Frame> {
  const SCHEME: &'static str = "tensor";
}

impl<Frame> FromUrl for TensorFileAdapter<Frame> {
  type Error = TensorFileError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(TensorFileError::SchemeMismatch {
        expected: Self::SCHEME.to_string(),
        actual: url.scheme().to_string(),
      });
    }

    let mut delay = None;
    for (k, v) in url.query_pairs() {
      if k == "delay_ms" {
        let ms = v
          .parse::<u64>()
          .map_err(|e| TensorFileError::InvalidQuery(format!("delay_ms={}: {}", v, e)))?;
        delay = Some(Duration::from_millis(ms));
      }
    }

    info!("加载张量文件: {}", url.path());
    let tensor = read_tensor_file(url.path())?;
    debug!("张量长度: {}", tensor.len());

    Ok(Self::new(tensor).with_delay(delay))
  }
}

impl<Frame> TensorFileAdapter<Frame> {
  pub fn new(tensor: RawTensor) -> Self {
    Self {
      tensor,
      delay: None,
      _phantom: PhantomData,
    }
  }

  pub fn with_delay(mut self, delay: Option<Duration>) -> Self {
    self.delay = delay;
    self
  }
}

impl<Frame: Send + 'static> InferenceAdapter for TensorFileAdapter<Frame> {
  type Frame = Frame;

  fn evaluate(&self, _frame: Self::Frame) -> Result<RawTensor, AdapterError> {
    if let Some(delay) = self.delay {
      thread::sleep(delay);
    }
    Ok(self.tensor.clone())
  }
}

pub fn read_tensor_file<P: AsRef<Path>>(path: P) -> Result<RawTensor, TensorFileError> {
  let bytes = std::fs::read(path)?;
  if bytes.len() % 4 != 0 {
    return Err(TensorFileError::InvalidLength(bytes.len()));
  }

  let data = bytes
    .chunks_exact(4)
    .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
    .collect::<Vec<_>>();
  Ok(RawTensor::from(data))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;

  fn write_floats(values: &[f32]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    for v in values {
      file.write_all(&v.to_le_bytes()).unwrap();
    }
    file.flush().unwrap();
    file
  }

  #[test]
  fn reads_little_endian_floats() {
    let file = write_floats(&[1.0, -2.5, 0.125]);
    let tensor = read_tensor_file(file.path()).unwrap();
    assert_eq!(tensor.as_slice(), &[1.0, -2.5, 0.125]);
  }

  #[test]
  fn rejects_truncated_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(&[0u8; 7]).unwrap();
    file.flush().unwrap();
    assert!(matches!(
      read_tensor_file(file.path()),
      Err(TensorFileError::InvalidLength(7))
    ));
  }

  #[test]
  fn from_url_parses_delay() {
    let file = write_floats(&[0.0; 4]);
    let url = Url::parse(&format!("tensor://{}?delay_ms=5", file.path().display())).unwrap();
    let adapter = TensorFileAdapter::<()>::from_url(&url).unwrap();
    assert_eq!(adapter.delay, Some(Duration::from_millis(5)));
    assert!(adapter.is_ready());
    assert_eq!(adapter.evaluate(()).unwrap().len(), 4);
  }

  #[test]
  fn from_url_rejects_other_schemes() {
    let url = Url::parse("image:///tmp/a.png").unwrap();
    assert!(matches!(
      TensorFileAdapter::<()>::from_url(&url),
      Err(TensorFileError::SchemeMismatch { .. })
    ));
  }
}
