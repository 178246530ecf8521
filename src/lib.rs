// 该文件是 RTMDet 推理项目的一部分。
// src/lib.rs - 库主文件
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

pub mod adapter;
pub mod bbox;
pub mod decode;
pub mod detector;
pub mod error;
pub mod frame;
pub mod input;
pub mod letterbox;
pub mod model;
pub mod nms;
pub mod output;
pub mod session;
pub mod task;
pub mod tensor;

pub use self::detector::{Detection, DetectOptions, Detector, DetectorBuilder};
pub use self::error::DetectError;
pub use self::frame::{Frame, PixelFormat};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}

/// 取出 URL 中的文件路径（已做百分号解码）
pub fn url_path(url: &url::Url) -> std::path::PathBuf {
  let raw = url.path();
  match urlencoding::decode(raw) {
    Ok(decoded) => std::path::PathBuf::from(decoded.into_owned()),
    Err(_) => std::path::PathBuf::from(raw),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn url_path_decodes_percent_escapes() {
    let url = url::Url::parse("image:///tmp/my%20photo.jpg").unwrap();
    assert_eq!(url_path(&url), std::path::PathBuf::from("/tmp/my photo.jpg"));
  }

  #[test]
  fn url_path_keeps_relative_paths() {
    let url = url::Url::parse("onnx:models/rtmdet.onnx").unwrap();
    assert_eq!(url_path(&url), std::path::PathBuf::from("models/rtmdet.onnx"));
  }
}
