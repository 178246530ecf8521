// 该文件是 RTMDet 推理项目的一部分。
// src/decode/end_to_end.rs - 端到端导出模型（图内已做 NMS）的输出解析
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

use tracing::{debug, warn};

use crate::{
  bbox::BBox,
  decode::{Candidate, Decode},
  error::{DetectError, Result},
  tensor::Tensor,
};

const DETS_WIDTH: usize = 5;

/// `dets: [1, N, 5]` 为 (x1, y1, x2, y2, score)，`labels: [1, N]` 为类别
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EndToEndDecoder;

impl Decode for EndToEndDecoder {
  fn decode(
    &self,
    outputs: &[Tensor],
    _input_size: (u32, u32),
    score_threshold: f32,
  ) -> Result<Vec<Candidate>> {
    // 类别输出在 N 为 5 时形状也可能是 [1, 5]，取秩最大的那个
    let dets_idx = outputs
      .iter()
      .enumerate()
      .filter(|(_, t)| t.shape().len() >= 2 && t.shape().last() == Some(&DETS_WIDTH))
      .max_by(|(a, ta), (b, tb)| ta.shape().len().cmp(&tb.shape().len()).then(b.cmp(a)))
      .map(|(idx, _)| idx)
      .ok_or_else(|| DetectError::inference("找不到形状为 [N, 5] 的检测框输出"))?;
    let count = outputs[dets_idx].len() / DETS_WIDTH;
    let dets = outputs[dets_idx]
      .view()
      .into_shape_with_order((count, DETS_WIDTH))
      .map_err(|e| DetectError::inference(format!("检测框输出无法视为 [N, 5]: {}", e)))?;

    let labels = outputs
      .iter()
      .enumerate()
      .find(|(idx, t)| *idx != dets_idx && t.len() == count)
      .map(|(_, t)| t)
      .ok_or_else(|| DetectError::inference(format!("找不到长度为 {} 的类别输出", count)))?;
    debug!("端到端输出: {} 个检测框", count);

    let mut candidates = Vec::new();
    for (index, (det, &label)) in dets.outer_iter().zip(labels.view().iter()).enumerate() {
      let score = det[4];
      if !(score >= score_threshold) {
        continue;
      }
      if !(label >= 0.0) || !label.is_finite() {
        warn!("检测框 {} 的类别 {} 无效, 已跳过", index, label);
        continue;
      }

      let bbox = BBox::new(det[0], det[1], det[2], det[3]);
      if !bbox.is_valid() {
        continue;
      }

      candidates.push(Candidate {
        bbox,
        class_id: label as u32,
        score: score.min(1.0),
        index,
      });
    }

    Ok(candidates)
  }
}
