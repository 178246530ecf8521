// 该文件是 RTMDet 推理项目的一部分。
// src/output/draw.rs - 在图像上绘制检测结果
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

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::{
  drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use tracing::{debug, info};
use url::Url;

use crate::{
  detector::Detection,
  frame::Frame,
  model::{DetectResult, LabelMap},
};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 按类别轮换的边框颜色
const PALETTE: [[u8; 3]; 8] = [
  [0, 0, 255],
  [255, 56, 56],
  [72, 249, 10],
  [255, 157, 151],
  [0, 194, 255],
  [255, 178, 29],
  [207, 210, 49],
  [146, 204, 23],
];

fn invalid_data<E: std::fmt::Display>(e: E) -> std::io::Error {
  std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
}

/// 边框加标签文字；没有字体时只画边框
pub struct Draw {
  labels: LabelMap,
  font: Option<FontVec>,
  font_size: f32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      labels: LabelMap::coco(),
      font: None,
      font_size: LABEL_FONT_SIZE,
    }
  }
}

impl Draw {
  pub fn new(labels: LabelMap, font: Option<FontVec>) -> Self {
    Self {
      labels,
      font,
      font_size: LABEL_FONT_SIZE,
    }
  }

  /// 从 URL 查询读取 `font=<ttf 文件>` 和 `labels=<文件>`
  pub fn from_query(url: &Url) -> std::io::Result<Self> {
    let labels = LabelMap::from_query(url)?;
    let font = match url.query_pairs().find(|(k, _)| k == "font") {
      Some((_, path)) => {
        let data = std::fs::read(&*path)?;
        info!("加载字体文件: {}", path);
        Some(FontVec::try_from_vec(data).map_err(invalid_data)?)
      }
      None => {
        debug!("未指定字体, 只绘制边框");
        None
      }
    };
    Ok(Self::new(labels, font))
  }

  pub fn labels(&self) -> &LabelMap {
    &self.labels
  }

  /// 在原图副本上绘制全部检测框
  pub fn draw_detections(&self, frame: &Frame, result: &DetectResult) -> RgbImage {
    let mut image = frame.to_rgb_image();
    if frame.is_empty() {
      return image;
    }
    for item in result.items.iter() {
      self.draw_bbox_with_label(&mut image, item);
    }
    image
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, item: &Detection) {
    let (w, h) = (image.width() as i32, image.height() as i32);
    let color = Rgb(PALETTE[item.class_id as usize % PALETTE.len()]);

    let x_min = (item.x.floor() as i32).clamp(0, w - 1);
    let y_min = (item.y.floor() as i32).clamp(0, h - 1);
    let x_max = ((item.x + item.width).ceil() as i32).clamp(0, w - 1);
    let y_max = ((item.y + item.height).ceil() as i32).clamp(0, h - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    for t in 0..BOX_THICKNESS {
      let width = x_max - x_min - 2 * t;
      let height = y_max - y_min - 2 * t;
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32, height as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let Some(font) = &self.font else {
      return;
    };

    let label = format!("{} {:.2}", self.labels.name(item.class_id), item.score);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, font, &label);
    let label_height = text_height as i32 + 2 * LABEL_TEXT_VERTICAL_PADDING;

    // 标签放在边框上方，空间不够时贴着图像顶部
    let label_x = x_min;
    let label_y = (y_min - label_height).max(0);
    let label_width = (text_width as i32).min(w - label_x);

    if label_width > 0 && label_height > 0 {
      let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
      draw_filled_rect_mut(image, rect, color);
      draw_text_mut(
        image,
        TEXT_COLOR,
        label_x,
        label_y + LABEL_TEXT_VERTICAL_PADDING,
        scale,
        font,
        &label,
      );
    }
  }
}

/// 以文本记录检测结果，每行 `类别, 分数, x_min, y_min, x_max, y_max`
pub struct Record {
  pub label_with_name: bool,
  pub labels: LabelMap,
}

impl Record {
  pub fn lines(&self, result: &DetectResult) -> Vec<String> {
    result
      .items
      .iter()
      .map(|item| {
        let name = if self.label_with_name {
          self.labels.name(item.class_id)
        } else {
          item.class_id.to_string()
        };
        let bbox = item.bbox();
        format!(
          "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
          name, item.score, bbox.x1, bbox.y1, bbox.x2, bbox.y2
        )
      })
      .collect()
  }

  /// 写到与图像同名的 `.txt` 文件
  pub fn record(&self, result: &DetectResult, path: &Path) -> std::io::Result<()> {
    std::fs::write(path.with_extension("txt"), self.lines(result).join("\n"))
  }
}
