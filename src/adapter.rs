// 该文件是 RTMDet 推理项目的一部分。
// src/adapter.rs - 图像到张量的转换
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

use image::{Rgb, RgbImage, imageops};
use ndarray::Array4;
use tracing::debug;

use crate::{
  error::{DetectError, Result},
  frame::Frame,
  letterbox::{Letterbox, LetterboxAlign},
  tensor::Tensor,
};

const RGB_CHANNELS: usize = 3;
const RTMDET_MEAN: [f32; 3] = [103.53, 116.28, 123.675];
const RTMDET_STD: [f32; 3] = [57.375, 57.12, 58.395];
const DEFAULT_PAD_VALUE: u8 = 114;

/// 模型期望的通道顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelOrder {
  Rgb,
  Bgr,
}

/// 模型期望的张量布局
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TensorLayout {
  /// [1, 3, H, W]
  Nchw,
  /// [1, H, W, 3]
  Nhwc,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdapterConfig {
  pub input_width: u32,
  pub input_height: u32,
  /// 按模型通道顺序给出
  pub mean: [f32; 3],
  pub std: [f32; 3],
  pub pad_value: u8,
  pub align: LetterboxAlign,
  pub channel_order: ChannelOrder,
  pub layout: TensorLayout,
}

impl AdapterConfig {
  /// mmdet RTMDet 的预处理：BGR、左上对齐填充 114
  pub fn rtmdet(input_width: u32, input_height: u32) -> Self {
    Self {
      input_width,
      input_height,
      mean: RTMDET_MEAN,
      std: RTMDET_STD,
      pad_value: DEFAULT_PAD_VALUE,
      align: LetterboxAlign::TopLeft,
      channel_order: ChannelOrder::Bgr,
      layout: TensorLayout::Nchw,
    }
  }

  /// 不做归一化的 RGB NHWC 输入，归一化已编进模型时使用
  pub fn raw_nhwc(input_width: u32, input_height: u32) -> Self {
    Self {
      input_width,
      input_height,
      mean: [0.0; 3],
      std: [1.0; 3],
      pad_value: DEFAULT_PAD_VALUE,
      align: LetterboxAlign::Center,
      channel_order: ChannelOrder::Rgb,
      layout: TensorLayout::Nhwc,
    }
  }

  pub fn with_normalization(mut self, mean: [f32; 3], std: [f32; 3]) -> Self {
    self.mean = mean;
    self.std = std;
    self
  }

  pub fn with_align(mut self, align: LetterboxAlign) -> Self {
    self.align = align;
    self
  }

  pub fn with_channel_order(mut self, order: ChannelOrder) -> Self {
    self.channel_order = order;
    self
  }

  pub fn with_layout(mut self, layout: TensorLayout) -> Self {
    self.layout = layout;
    self
  }

  pub fn with_pad_value(mut self, pad_value: u8) -> Self {
    self.pad_value = pad_value;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.input_width == 0 || self.input_height == 0 {
      return Err(DetectError::config(format!(
        "模型输入尺寸无效: {}x{}",
        self.input_width, self.input_height
      )));
    }
    if self.std.iter().any(|s| !s.is_finite() || *s == 0.0) || self.mean.iter().any(|m| !m.is_finite()) {
      return Err(DetectError::config(format!(
        "归一化参数无效: mean={:?}, std={:?}",
        self.mean, self.std
      )));
    }
    Ok(())
  }
}

impl Default for AdapterConfig {
  fn default() -> Self {
    Self::rtmdet(640, 640)
  }
}

/// 把图像编码为推理张量，并记录可逆的 letterbox 变换
#[derive(Debug, Clone)]
pub struct TensorAdapter {
  config: AdapterConfig,
}

impl TensorAdapter {
  pub fn new(config: AdapterConfig) -> Result<Self> {
    config.validate()?;
    Ok(Self { config })
  }

  pub fn config(&self) -> &AdapterConfig {
    &self.config
  }

  pub fn input_size(&self) -> (u32, u32) {
    (self.config.input_width, self.config.input_height)
  }

  pub fn encode(&self, frame: &Frame) -> Result<(Tensor, Letterbox)> {
    if frame.is_empty() {
      return Err(DetectError::invalid_image(format!(
        "图像尺寸为零: {}x{}",
        frame.width(),
        frame.height()
      )));
    }

    let letterbox = Letterbox::fit(
      (frame.width(), frame.height()),
      self.input_size(),
      self.config.align,
    );
    debug!(
      "letterbox: {}x{} -> {:?}, 缩放 {:?}, 偏移 {:?}",
      frame.width(),
      frame.height(),
      letterbox.resized_size(),
      letterbox.scale_factor(),
      letterbox.offset()
    );

    let rgb = frame.to_rgb_image();
    let canvas = self.letterbox_image(&rgb, &letterbox);
    let tensor = self.normalize(&canvas);
    Ok((tensor, letterbox))
  }

  fn letterbox_image(&self, rgb: &RgbImage, letterbox: &Letterbox) -> RgbImage {
    let (rw, rh) = letterbox.resized_size();
    let (tw, th) = letterbox.target_size();
    let (ox, oy) = letterbox.offset();

    let resized = if rgb.dimensions() == (rw, rh) {
      rgb.clone()
    } else {
      imageops::resize(rgb, rw, rh, imageops::FilterType::Triangle)
    };

    if (rw, rh) == (tw, th) {
      return resized;
    }

    let pad = self.config.pad_value;
    let mut canvas = RgbImage::from_pixel(tw, th, Rgb([pad, pad, pad]));
    imageops::replace(&mut canvas, &resized, ox as i64, oy as i64);
    canvas
  }

  fn normalize(&self, canvas: &RgbImage) -> Tensor {
    let (width, height) = canvas.dimensions();
    let (w, h) = (width as usize, height as usize);
    let shape = match self.config.layout {
      TensorLayout::Nchw => (1, RGB_CHANNELS, h, w),
      TensorLayout::Nhwc => (1, h, w, RGB_CHANNELS),
    };
    let mut tensor = Array4::<f32>::zeros(shape);

    let order: [usize; 3] = match self.config.channel_order {
      ChannelOrder::Rgb => [0, 1, 2],
      ChannelOrder::Bgr => [2, 1, 0],
    };

    for (x, y, pixel) in canvas.enumerate_pixels() {
      let (x, y) = (x as usize, y as usize);
      for (c, &src) in order.iter().enumerate() {
        let value = (pixel[src] as f32 - self.config.mean[c]) / self.config.std[c];
        match self.config.layout {
          TensorLayout::Nchw => tensor[[0, c, y, x]] = value,
          TensorLayout::Nhwc => tensor[[0, y, x, c]] = value,
        }
      }
    }

    Tensor::from(tensor)
  }
}
