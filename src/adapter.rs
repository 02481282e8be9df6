// 该文件是 Shanan （山南西风） 项目的一部分。
// src/adapter.rs - 推理适配器
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

/// 一次推理的原始输出
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  data: Box<[f32]>,
}

impl RawTensor {
  pub fn len(&self) -> usize {
    self.data.len()
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty()
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }
}

impl From<Vec<f32>> for RawTensor {
  fn from(data: Vec<f32>) -> Self {
    Self {
      data: data.into_boxed_slice(),
    }
  }
}

impl AsRef<[f32]> for RawTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}

#[derive(Error, Debug)]
pub enum AdapterError {
  #[error("推理失败: {0}")]
  Evaluation(String),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("张量数据无效: {0}")]
  InvalidData(String),
}

/// 推理后端。`evaluate` 会在后台线程上调用，可能耗时数百毫秒。
pub trait InferenceAdapter: Send + Sync + 'static {
  type Frame: Send + 'static;

  /// 模型尚未就绪时，调度器会直接丢弃本次触发
  fn is_ready(&self) -> bool {
    true
  }

  fn evaluate(&self, frame: Self::Frame) -> Result<RawTensor, AdapterError>;
}

impl<A: InferenceAdapter> InferenceAdapter for std::sync::Arc<A> {
  type Frame = A::Frame;

  fn is_ready(&self) -> bool {
    (**self).is_ready()
  }

  fn evaluate(&self, frame: Self::Frame) -> Result<RawTensor, AdapterError> {
    (**self).evaluate(frame)
  }
}

mod tensor_file;
pub use self::tensor_file::{TensorFileAdapter, TensorFileError};
