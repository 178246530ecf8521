// 该文件是 RTMDet 推理项目的一部分。
// src/decode/distance_point.rs - 无锚点的距离编码解码（RTMDet / YOLO26）
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

use ndarray::{ArrayView3, s};
use tracing::{debug, error};

use crate::{
  bbox::BBox,
  decode::{Candidate, Decode, ScoreActivation, best_class},
  error::{DetectError, Result},
  tensor::Tensor,
};

const DEFAULT_STRIDES: [u32; 3] = [8, 16, 32];

/// 每个检测头输出一个 `C x H x W` 分类张量和一个 `4 x H x W` 回归张量，
/// 回归值为先验点到框四边的距离 (l, t, r, b)
#[derive(Debug, Clone, PartialEq)]
pub struct DistancePointDecoder {
  pub strides: Vec<u32>,
  pub num_classes: usize,
  /// 先验点在网格内的偏移（以步长为单位）
  pub offset: f32,
  /// 距离是否以步长为单位
  pub distance_in_strides: bool,
  pub activation: ScoreActivation,
}

impl DistancePointDecoder {
  /// mmdet RTMDet 头：先验点在网格左上角，距离已乘步长
  pub fn rtmdet(num_classes: usize) -> Self {
    Self {
      strides: DEFAULT_STRIDES.to_vec(),
      num_classes,
      offset: 0.0,
      distance_in_strides: false,
      activation: ScoreActivation::Sigmoid,
    }
  }

  /// YOLO26 头：先验点在网格中心，距离以步长为单位
  pub fn yolo26(num_classes: usize) -> Self {
    Self {
      strides: DEFAULT_STRIDES.to_vec(),
      num_classes,
      offset: 0.5,
      distance_in_strides: true,
      activation: ScoreActivation::Sigmoid,
    }
  }

  pub fn with_strides(mut self, strides: Vec<u32>) -> Self {
    self.strides = strides;
    self
  }

  pub fn with_activation(mut self, activation: ScoreActivation) -> Self {
    self.activation = activation;
    self
  }

  /// 为检测头找到 (分类, 回归) 张量
  ///
  /// 带形状的输出按 `[C, H, W]` 匹配通道数；只有展平输出按元素个数匹配，
  /// 分类数为 4 时两者大小相同，按导出顺序先取分类。
  fn match_level<'a>(
    &self,
    outputs: &'a [Tensor],
    used: &mut [bool],
    level: usize,
    map: (usize, usize),
  ) -> Result<(ArrayView3<'a, f32>, ArrayView3<'a, f32>)> {
    let (map_h, map_w) = map;

    let mut take = |channels: usize| -> Option<(usize, ArrayView3<'a, f32>)> {
      let (idx, view) = outputs
        .iter()
        .enumerate()
        .filter(|(idx, _)| !used[*idx])
        .find_map(|(idx, t)| t.view3((channels, map_h, map_w)).map(|v| (idx, v)))?;
      used[idx] = true;
      Some((idx, view))
    };

    let cls = take(self.num_classes);
    let reg = take(4);

    match (cls, reg) {
      (Some((cls_idx, cls)), Some((reg_idx, reg))) => {
        debug!("检测头 {}: 索引 {} 是分类, 索引 {} 是回归", level, cls_idx, reg_idx);
        Ok((cls, reg))
      }
      _ => {
        let shapes: Vec<&[usize]> = outputs.iter().map(Tensor::shape).collect();
        error!(
          "检测头 {}: 输出形状不匹配 - 输出形状: {:?}, 期望分类: {:?}, 期望回归: {:?}",
          level,
          shapes,
          [self.num_classes, map_h, map_w],
          [4, map_h, map_w]
        );
        Err(DetectError::inference(format!(
          "检测头 {} 找不到形状为 {:?} (分类) 和 {:?} (回归) 的输出, 实际输出形状 {:?}",
          level,
          [self.num_classes, map_h, map_w],
          [4, map_h, map_w],
          shapes
        )))
      }
    }
  }
}

impl Decode for DistancePointDecoder {
  fn decode(
    &self,
    outputs: &[Tensor],
    input_size: (u32, u32),
    score_threshold: f32,
  ) -> Result<Vec<Candidate>> {
    if self.num_classes == 0 || self.strides.is_empty() || self.strides.contains(&0) {
      return Err(DetectError::config(format!(
        "解码参数无效: 类别数 {}, 步长 {:?}",
        self.num_classes, self.strides
      )));
    }

    let (input_w, input_h) = input_size;
    let mut used = vec![false; outputs.len()];
    let mut candidates = Vec::new();
    let mut anchor_base = 0usize;

    for (level, &stride) in self.strides.iter().enumerate() {
      let map_w = input_w.div_ceil(stride) as usize;
      let map_h = input_h.div_ceil(stride) as usize;
      let spatial = map_w * map_h;
      let (cls, reg) = self.match_level(outputs, &mut used, level, (map_h, map_w))?;

      let stride = stride as f32;
      let unit = if self.distance_in_strides { stride } else { 1.0 };

      for (row, col) in (0..map_h).flat_map(|row| (0..map_w).map(move |col| (row, col))) {
        let Some((class_id, logit)) = best_class(cls.slice(s![.., row, col]).iter().copied())
        else {
          continue;
        };
        let score = self.activation.apply(logit);
        if !(score >= score_threshold) {
          continue;
        }

        let px = (col as f32 + self.offset) * stride;
        let py = (row as f32 + self.offset) * stride;
        let dist = reg.slice(s![.., row, col]);
        let (l, t, r, b) = (dist[0] * unit, dist[1] * unit, dist[2] * unit, dist[3] * unit);

        let bbox = BBox::new(px - l, py - t, px + r, py + b);
        if !bbox.is_valid() {
          continue;
        }

        candidates.push(Candidate {
          bbox,
          class_id,
          score,
          index: anchor_base + row * map_w + col,
        });
      }

      anchor_base += spatial;
    }

    debug!("解码得到 {} 个候选框", candidates.len());
    Ok(candidates)
  }
}
