// 该文件是 RTMDet 推理项目的一部分。
// src/error.rs - 检测流水线错误定义
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

pub type Result<T> = std::result::Result<T, DetectError>;

/// 检测流水线的错误
///
/// `ModelLoadError` 属于加载期错误，需要重新初始化检测器；
/// 其余错误只影响单次调用，换一张图像重试即可。
#[derive(Error, Debug)]
pub enum DetectError {
  #[error("图像无效: {0}")]
  InvalidImageError(String),
  #[error("模型加载错误: {0}")]
  ModelLoadError(String),
  #[error("推理错误: {0}")]
  InferenceError(String),
  #[error("配置错误: {0}")]
  ConfigError(String),
}

impl DetectError {
  pub fn invalid_image<S: Into<String>>(msg: S) -> Self {
    DetectError::InvalidImageError(msg.into())
  }

  pub fn model_load<S: Into<String>>(msg: S) -> Self {
    DetectError::ModelLoadError(msg.into())
  }

  pub fn inference<S: Into<String>>(msg: S) -> Self {
    DetectError::InferenceError(msg.into())
  }

  pub fn config<S: Into<String>>(msg: S) -> Self {
    DetectError::ConfigError(msg.into())
  }

  /// 是否为需要重新初始化的致命错误
  pub fn is_fatal(&self) -> bool {
    matches!(self, DetectError::ModelLoadError(_))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn only_load_errors_are_fatal() {
    assert!(DetectError::model_load("bad graph").is_fatal());
    assert!(!DetectError::inference("shape").is_fatal());
    assert!(!DetectError::invalid_image("empty").is_fatal());
    assert!(!DetectError::config("threshold").is_fatal());
  }
}
