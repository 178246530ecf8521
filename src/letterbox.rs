// 该文件是 RTMDet 推理项目的一部分。
// src/letterbox.rs - 保持宽高比的缩放与填充变换
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

use crate::bbox::BBox;

/// 缩放后图像在画布中的对齐方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LetterboxAlign {
  /// 居中，四周填充
  Center,
  /// 左上角对齐，只在右侧和下方填充
  TopLeft,
}

/// 一次 letterbox 变换：源图像坐标与张量坐标之间的可逆映射
///
/// `forward` 与 `inverse` 共用同一组缩放和偏移，推理前后不会各算一遍。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
  scale: f32,
  /// 实际缩放后尺寸与源尺寸之比，取整后各轴可能略有不同
  scale_x: f32,
  scale_y: f32,
  offset_x: f32,
  offset_y: f32,
  source: (u32, u32),
  target: (u32, u32),
  resized: (u32, u32),
}

impl Letterbox {
  /// 计算把 `source` 放进 `target` 画布的变换，源尺寸必须非零
  pub fn fit(source: (u32, u32), target: (u32, u32), align: LetterboxAlign) -> Self {
    let (sw, sh) = source;
    let (tw, th) = target;
    let scale = (tw as f32 / sw as f32).min(th as f32 / sh as f32);

    let rw = ((sw as f32 * scale).round() as u32).clamp(1, tw.max(1));
    let rh = ((sh as f32 * scale).round() as u32).clamp(1, th.max(1));

    let (offset_x, offset_y) = match align {
      LetterboxAlign::Center => ((tw - rw) / 2, (th - rh) / 2),
      LetterboxAlign::TopLeft => (0, 0),
    };

    Self {
      scale,
      scale_x: rw as f32 / sw as f32,
      scale_y: rh as f32 / sh as f32,
      offset_x: offset_x as f32,
      offset_y: offset_y as f32,
      source,
      target,
      resized: (rw, rh),
    }
  }

  /// 名义缩放比例
  pub fn scale(&self) -> f32 {
    self.scale
  }

  /// 各轴实际缩放比例 (x, y)
  pub fn scale_factor(&self) -> (f32, f32) {
    (self.scale_x, self.scale_y)
  }

  pub fn offset(&self) -> (f32, f32) {
    (self.offset_x, self.offset_y)
  }

  pub fn source_size(&self) -> (u32, u32) {
    self.source
  }

  pub fn target_size(&self) -> (u32, u32) {
    self.target
  }

  pub fn resized_size(&self) -> (u32, u32) {
    self.resized
  }

  /// 源图像坐标 -> 张量坐标
  pub fn forward(&self, bbox: BBox) -> BBox {
    BBox::new(
      bbox.x1 * self.scale_x + self.offset_x,
      bbox.y1 * self.scale_y + self.offset_y,
      bbox.x2 * self.scale_x + self.offset_x,
      bbox.y2 * self.scale_y + self.offset_y,
    )
  }

  /// 张量坐标 -> 源图像坐标（不裁剪）
  pub fn inverse(&self, bbox: BBox) -> BBox {
    BBox::new(
      (bbox.x1 - self.offset_x) / self.scale_x,
      (bbox.y1 - self.offset_y) / self.scale_y,
      (bbox.x2 - self.offset_x) / self.scale_x,
      (bbox.y2 - self.offset_y) / self.scale_y,
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn assert_close(a: BBox, b: BBox) {
    for (x, y) in [(a.x1, b.x1), (a.y1, b.y1), (a.x2, b.x2), (a.y2, b.y2)] {
      assert!((x - y).abs() < 1e-3, "{:?} != {:?}", a, b);
    }
  }

  #[test]
  fn center_letterbox_of_landscape_image() {
    let lb = Letterbox::fit((640, 480), (640, 640), LetterboxAlign::Center);
    assert_eq!(lb.scale(), 1.0);
    assert_eq!(lb.resized_size(), (640, 480));
    assert_eq!(lb.offset(), (0.0, 80.0));
  }

  #[test]
  fn top_left_letterbox_has_no_offset() {
    let lb = Letterbox::fit((1280, 960), (640, 640), LetterboxAlign::TopLeft);
    assert_eq!(lb.scale(), 0.5);
    assert_eq!(lb.resized_size(), (640, 480));
    assert_eq!(lb.offset(), (0.0, 0.0));
  }

  #[test]
  fn forward_then_inverse_round_trips() {
    let boxes = [
      BBox::new(0.0, 0.0, 640.0, 480.0),
      BBox::new(12.5, 33.25, 100.75, 240.0),
      BBox::new(300.0, 10.0, 301.0, 11.0),
    ];
    for (source, align) in [
      ((640, 480), LetterboxAlign::Center),
      ((1920, 1080), LetterboxAlign::Center),
      ((333, 777), LetterboxAlign::TopLeft),
      ((100, 50), LetterboxAlign::Center),
    ] {
      let lb = Letterbox::fit(source, (640, 640), align);
      for b in boxes {
        assert_close(lb.inverse(lb.forward(b)), b);
      }
    }
  }

  #[test]
  fn tiny_images_still_cover_a_pixel() {
    let lb = Letterbox::fit((1, 1000), (64, 64), LetterboxAlign::Center);
    assert_eq!(lb.resized_size().0, 1);
    assert_eq!(lb.resized_size().1, 64);
  }

  #[test]
  fn thin_image_uses_actual_resized_height() {
    // 1000x1 缩放 0.64 后高度取整为 1 像素
    let lb = Letterbox::fit((1000, 1), (640, 640), LetterboxAlign::TopLeft);
    assert_eq!(lb.resized_size(), (640, 1));
    assert_eq!(lb.scale_factor(), (0.64, 1.0));
    assert_close(
      lb.inverse(BBox::new(0.0, 0.0, 640.0, 1.0)),
      BBox::new(0.0, 0.0, 1000.0, 1.0),
    );
  }
}
