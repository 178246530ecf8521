// 该文件是 RTMDet 推理项目的一部分。
// src/frame.rs - 输入图像帧定义
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

use image::{DynamicImage, ImageBuffer, Rgb, RgbImage};

use crate::error::{DetectError, Result};

/// 像素格式（通道交错存储）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
  Rgb8,
  Bgr8,
  Rgba8,
  Bgra8,
  Luma8,
}

impl PixelFormat {
  pub fn channels(self) -> usize {
    match self {
      PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
      PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
      PixelFormat::Luma8 => 1,
    }
  }

  fn rgb_at(self, px: &[u8]) -> [u8; 3] {
    match self {
      PixelFormat::Rgb8 | PixelFormat::Rgba8 => [px[0], px[1], px[2]],
      PixelFormat::Bgr8 | PixelFormat::Bgra8 => [px[2], px[1], px[0]],
      PixelFormat::Luma8 => [px[0], px[0], px[0]],
    }
  }
}

/// 一帧图像，构造后不可变
#[derive(Debug, Clone)]
pub struct Frame {
  width: u32,
  height: u32,
  format: PixelFormat,
  data: Box<[u8]>,
}

impl Frame {
  /// 由交错像素数据构造，长度必须等于 `width * height * channels`
  pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
    let expected = (width as usize)
      .checked_mul(height as usize)
      .and_then(|n| n.checked_mul(format.channels()))
      .ok_or_else(|| DetectError::invalid_image(format!("图像尺寸过大: {}x{}", width, height)))?;
    if data.len() != expected {
      return Err(DetectError::invalid_image(format!(
        "数据长度不匹配: 期望长度 {}, 实际长度 {}",
        expected,
        data.len()
      )));
    }

    Ok(Self {
      width,
      height,
      format,
      data: data.into_boxed_slice(),
    })
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn format(&self) -> PixelFormat {
    self.format
  }

  pub fn data(&self) -> &[u8] {
    &self.data
  }

  pub fn is_empty(&self) -> bool {
    self.width == 0 || self.height == 0
  }

  /// 颜色转换为 RGB 图像
  pub fn to_rgb_image(&self) -> RgbImage {
    if self.format == PixelFormat::Rgb8
      && let Some(image) = RgbImage::from_raw(self.width, self.height, self.data.to_vec())
    {
      return image;
    }

    let channels = self.format.channels();
    let width = self.width as usize;
    ImageBuffer::from_fn(self.width, self.height, |x, y| {
      let idx = (y as usize * width + x as usize) * channels;
      Rgb(self.format.rgb_at(&self.data[idx..idx + channels]))
    })
  }
}

impl From<RgbImage> for Frame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    Self {
      width,
      height,
      format: PixelFormat::Rgb8,
      data: image.into_raw().into_boxed_slice(),
    }
  }
}

impl From<DynamicImage> for Frame {
  fn from(image: DynamicImage) -> Self {
    match image {
      DynamicImage::ImageRgba8(rgba) => {
        let (width, height) = rgba.dimensions();
        Self {
          width,
          height,
          format: PixelFormat::Rgba8,
          data: rgba.into_raw().into_boxed_slice(),
        }
      }
      DynamicImage::ImageLuma8(luma) => {
        let (width, height) = luma.dimensions();
        Self {
          width,
          height,
          format: PixelFormat::Luma8,
          data: luma.into_raw().into_boxed_slice(),
        }
      }
      other => Frame::from(other.to_rgb8()),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn rejects_mismatched_buffer() {
    let err = Frame::new(2, 2, PixelFormat::Rgb8, vec![0; 11]).unwrap_err();
    assert!(matches!(err, DetectError::InvalidImageError(_)));
  }

  #[test]
  fn bgra_converts_to_rgb() {
    let frame = Frame::new(1, 1, PixelFormat::Bgra8, vec![10, 20, 30, 255]).unwrap();
    let rgb = frame.to_rgb_image();
    assert_eq!(rgb.get_pixel(0, 0), &Rgb([30, 20, 10]));
  }

  #[test]
  fn luma_is_replicated() {
    let frame = Frame::new(2, 1, PixelFormat::Luma8, vec![7, 9]).unwrap();
    let rgb = frame.to_rgb_image();
    assert_eq!(rgb.get_pixel(1, 0), &Rgb([9, 9, 9]));
  }

  #[test]
  fn zero_sized_frame_is_empty() {
    let frame = Frame::new(0, 4, PixelFormat::Rgb8, Vec::new()).unwrap();
    assert!(frame.is_empty());
  }

  #[test]
  fn oversized_dimensions_are_rejected() {
    let err = Frame::new(u32::MAX, u32::MAX, PixelFormat::Rgba8, Vec::new()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidImageError(_)));
    let err = Frame::new(1 << 31, 1 << 31, PixelFormat::Rgba8, Vec::new()).unwrap_err();
    assert!(matches!(err, DetectError::InvalidImageError(_)));
  }
}
