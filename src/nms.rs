// 该文件是 RTMDet 推理项目的一部分。
// src/nms.rs - 按类别的非极大值抑制
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

use std::collections::HashMap;

use tracing::debug;

use crate::{bbox::BBox, decode::Candidate};

/// 贪心非极大值抑制，只在同类别之间比较
///
/// 按分数降序（同分按锚点序号升序）依次选取，与已选同类框的
/// IoU 大于 `iou_threshold` 的候选被丢弃。结果按分数降序排列。
pub fn suppress(mut candidates: Vec<Candidate>, iou_threshold: f32) -> Vec<Candidate> {
  if candidates.is_empty() {
    return candidates;
  }

  candidates.sort_by(|a, b| {
    b.score
      .total_cmp(&a.score)
      .then_with(|| a.index.cmp(&b.index))
  });

  let total = candidates.len();
  let mut selected: HashMap<u32, Vec<BBox>> = HashMap::new();
  let mut keep = Vec::with_capacity(total);

  for candidate in candidates {
    let kept = selected.entry(candidate.class_id).or_default();
    if kept
      .iter()
      .any(|other| candidate.bbox.iou(other) > iou_threshold)
    {
      continue;
    }
    kept.push(candidate.bbox);
    keep.push(candidate);
  }

  debug!("NMS: {} 个候选框保留 {} 个", total, keep.len());
  keep
}

#[cfg(test)]
mod tests {
  use super::*;
  use rand::{Rng, SeedableRng, rngs::StdRng};

  fn candidate(x: f32, y: f32, size: f32, class_id: u32, score: f32, index: usize) -> Candidate {
    Candidate {
      bbox: BBox::from_xywh(x, y, size, size),
      class_id,
      score,
      index,
    }
  }

  /// 固定种子，测试数据可复现
  fn random_candidates(seed: u64, count: usize) -> Vec<Candidate> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
      .map(|index| {
        let x = rng.gen_range(0.0..200.0);
        let y = rng.gen_range(0.0..200.0);
        let size = rng.gen_range(10.0..70.0);
        let class_id = rng.gen_range(0..3);
        let score = rng.gen_range(0.0..1.0);
        candidate(x, y, size, class_id, score, index)
      })
      .collect()
  }

  #[test]
  fn empty_input_gives_empty_output() {
    assert!(suppress(Vec::new(), 0.45).is_empty());
  }

  #[test]
  fn overlapping_same_class_is_suppressed() {
    let result = suppress(
      vec![
        candidate(0.0, 0.0, 10.0, 0, 0.6, 0),
        candidate(1.0, 0.0, 10.0, 0, 0.9, 1),
      ],
      0.45,
    );
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].index, 1);
  }

  #[test]
  fn different_classes_do_not_suppress_each_other() {
    let result = suppress(
      vec![
        candidate(0.0, 0.0, 10.0, 0, 0.9, 0),
        candidate(0.0, 0.0, 10.0, 1, 0.8, 1),
      ],
      0.45,
    );
    assert_eq!(result.len(), 2);
  }

  #[test]
  fn iou_equal_to_threshold_is_kept() {
    // IoU = 50 / 150
    let result = suppress(
      vec![
        candidate(0.0, 0.0, 10.0, 0, 0.9, 0),
        Candidate {
          bbox: BBox::new(5.0, 0.0, 15.0, 10.0),
          class_id: 0,
          score: 0.8,
          index: 1,
        },
      ],
      50.0 / 150.0,
    );
    assert_eq!(result.len(), 2);
  }

  #[test]
  fn ties_are_broken_by_index() {
    let result = suppress(
      vec![
        candidate(100.0, 0.0, 10.0, 0, 0.5, 3),
        candidate(0.0, 0.0, 10.0, 0, 0.5, 1),
        candidate(1.0, 0.0, 10.0, 0, 0.5, 2),
      ],
      0.45,
    );
    let indices: Vec<usize> = result.iter().map(|c| c.index).collect();
    assert_eq!(indices, vec![1, 3]);
  }

  #[test]
  fn output_is_sorted_and_same_class_pairs_are_below_threshold() {
    for seed in 0..8 {
      let input = random_candidates(seed, 200);
      let result = suppress(input.clone(), 0.45);
      assert!(result.len() <= input.len());
      assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
      for (i, a) in result.iter().enumerate() {
        for b in &result[i + 1..] {
          if a.class_id == b.class_id {
            assert!(a.bbox.iou(&b.bbox) <= 0.45);
          }
        }
      }
    }
  }

  #[test]
  fn suppression_is_idempotent() {
    for seed in 0..8 {
      let once = suppress(random_candidates(seed, 200), 0.45);
      let twice = suppress(once.clone(), 0.45);
      assert_eq!(once, twice);
    }
  }
}
