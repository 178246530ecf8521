// 该文件是 RTMDet 推理项目的一部分。
// src/decode/center_size.rs - 中心点加宽高编码解码（YOLOv8 风格单输出头）
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

use ndarray::s;
use tracing::debug;

use crate::{
  bbox::BBox,
  decode::{Candidate, Decode, ScoreActivation, best_class},
  error::{DetectError, Result},
  tensor::Tensor,
};

/// 单个 `[1, 4 + C, N]` 或 `[1, N, 4 + C]` 输出，
/// 每个锚点为 (cx, cy, w, h) 加 C 个类别分数
#[derive(Debug, Clone, PartialEq)]
pub struct CenterSizeDecoder {
  pub num_classes: usize,
  pub activation: ScoreActivation,
}

impl CenterSizeDecoder {
  pub fn new(num_classes: usize) -> Self {
    Self {
      num_classes,
      activation: ScoreActivation::Identity,
    }
  }

  pub fn with_activation(mut self, activation: ScoreActivation) -> Self {
    self.activation = activation;
    self
  }
}

impl Decode for CenterSizeDecoder {
  fn decode(
    &self,
    outputs: &[Tensor],
    _input_size: (u32, u32),
    score_threshold: f32,
  ) -> Result<Vec<Candidate>> {
    let rows = 4 + self.num_classes;
    let tensor = outputs
      .first()
      .ok_or_else(|| DetectError::inference("模型没有输出"))?;

    // 按维度判断通道在前还是在后，统一转成 [N, 4 + C]
    let view = tensor
      .view2()
      .filter(|v| v.dim().0 == rows || v.dim().1 == rows)
      .ok_or_else(|| {
        DetectError::inference(format!(
          "输出形状 {:?} 与类别数 {} 不匹配",
          tensor.shape(),
          self.num_classes
        ))
      })?;
    let channel_first = view.dim().0 == rows;
    let table = if channel_first { view.reversed_axes() } else { view };
    debug!(
      "中心点输出: {} 个锚点, {}",
      table.nrows(),
      if channel_first { "通道在前" } else { "通道在后" }
    );

    let mut candidates = Vec::new();
    for (anchor, row) in table.outer_iter().enumerate() {
      let Some((class_id, raw)) = best_class(row.slice(s![4..]).iter().copied()) else {
        continue;
      };
      let score = self.activation.apply(raw);
      if !(score >= score_threshold) {
        continue;
      }

      let bbox = BBox::from_center(row[0], row[1], row[2], row[3]);
      if !bbox.is_valid() {
        continue;
      }

      candidates.push(Candidate {
        bbox,
        class_id,
        score,
        index: anchor,
      });
    }

    Ok(candidates)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Axis;

  /// 2 个类别、3 个锚点，通道在前
  fn channel_first() -> Tensor {
    #[rustfmt::skip]
    let data = vec![
      // cx
      10.0, 50.0, 90.0,
      // cy
      10.0, 50.0, 90.0,
      // w
      4.0, 20.0, 10.0,
      // h
      4.0, 10.0, 10.0,
      // 类别 0
      0.1, 0.9, 0.2,
      // 类别 1
      0.2, 0.3, 0.25,
    ];
    Tensor::new(vec![1, 6, 3], data).unwrap()
  }

  fn transpose(tensor: &Tensor) -> Tensor {
    Tensor::from(tensor.view2().unwrap().t().as_standard_layout().into_owned().insert_axis(Axis(0)))
  }

  #[test]
  fn decodes_center_size_boxes() {
    let candidates = CenterSizeDecoder::new(2)
      .decode(&[channel_first()], (100, 100), 0.5)
      .unwrap();
    assert_eq!(candidates.len(), 1);
    assert_eq!(candidates[0].class_id, 0);
    assert_eq!(candidates[0].index, 1);
    assert_eq!(candidates[0].bbox, BBox::new(40.0, 45.0, 60.0, 55.0));
  }

  #[test]
  fn channel_last_gives_same_candidates() {
    let decoder = CenterSizeDecoder::new(2);
    let first = decoder.decode(&[channel_first()], (100, 100), 0.2).unwrap();
    let last = decoder
      .decode(&[transpose(&channel_first())], (100, 100), 0.2)
      .unwrap();
    assert_eq!(first.len(), 3);
    assert_eq!(first, last);
  }

  #[test]
  fn wrong_class_count_is_rejected() {
    let err = CenterSizeDecoder::new(80)
      .decode(&[channel_first()], (100, 100), 0.5)
      .unwrap_err();
    assert!(matches!(err, DetectError::InferenceError(_)));
  }
}
