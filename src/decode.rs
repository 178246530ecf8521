// 该文件是 RTMDet 推理项目的一部分。
// src/decode.rs - 模型输出解码
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

use crate::{
  bbox::BBox,
  error::{DetectError, Result},
  tensor::Tensor,
};

mod center_size;
mod distance_point;
mod end_to_end;

pub use self::center_size::CenterSizeDecoder;
pub use self::distance_point::DistancePointDecoder;
pub use self::end_to_end::EndToEndDecoder;

pub const COCO_CLASS_NUM: usize = 80;

/// 分数激活函数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreActivation {
  /// 输出为 logit
  Sigmoid,
  /// 输出已是概率
  Identity,
}

impl ScoreActivation {
  pub fn apply(self, value: f32) -> f32 {
    let score = match self {
      ScoreActivation::Sigmoid => sigmoid(value),
      ScoreActivation::Identity => value,
    };
    score.clamp(0.0, 1.0)
  }
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}

/// 张量坐标系下的候选框
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Candidate {
  pub bbox: BBox,
  pub class_id: u32,
  pub score: f32,
  /// 锚点序号，用于稳定排序
  pub index: usize,
}

pub trait Decode {
  /// 把模型原始输出解码为候选框
  ///
  /// 只保留最大类别分数不小于 `score_threshold` 的位置，
  /// 输出顺序固定：先检测头，再按行优先遍历特征图，最后按锚点序号。
  fn decode(
    &self,
    outputs: &[Tensor],
    input_size: (u32, u32),
    score_threshold: f32,
  ) -> Result<Vec<Candidate>>;
}

/// 框编码方式
#[derive(Debug, Clone, PartialEq)]
pub enum BoxDecoder {
  DistancePoint(DistancePointDecoder),
  CenterSize(CenterSizeDecoder),
  EndToEnd(EndToEndDecoder),
}

impl BoxDecoder {
  pub fn rtmdet(num_classes: usize) -> Self {
    BoxDecoder::DistancePoint(DistancePointDecoder::rtmdet(num_classes))
  }

  /// 按名称选择解码方式: `rtmdet`, `yolo26`, `yolov8`, `end2end`
  pub fn from_name(name: &str, num_classes: usize) -> Result<Self> {
    match name {
      "rtmdet" => Ok(BoxDecoder::rtmdet(num_classes)),
      "yolo26" => Ok(BoxDecoder::DistancePoint(DistancePointDecoder::yolo26(
        num_classes,
      ))),
      "yolov8" => Ok(BoxDecoder::CenterSize(CenterSizeDecoder::new(num_classes))),
      "end2end" => Ok(BoxDecoder::EndToEnd(EndToEndDecoder::default())),
      other => Err(DetectError::config(format!("未知的解码方式: {}", other))),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      BoxDecoder::DistancePoint(_) => "distance-point",
      BoxDecoder::CenterSize(_) => "center-size",
      BoxDecoder::EndToEnd(_) => "end2end",
    }
  }
}

impl Default for BoxDecoder {
  fn default() -> Self {
    BoxDecoder::rtmdet(COCO_CLASS_NUM)
  }
}

impl Decode for BoxDecoder {
  fn decode(
    &self,
    outputs: &[Tensor],
    input_size: (u32, u32),
    score_threshold: f32,
  ) -> Result<Vec<Candidate>> {
    match self {
      BoxDecoder::DistancePoint(decoder) => decoder.decode(outputs, input_size, score_threshold),
      BoxDecoder::CenterSize(decoder) => decoder.decode(outputs, input_size, score_threshold),
      BoxDecoder::EndToEnd(decoder) => decoder.decode(outputs, input_size, score_threshold),
    }
  }
}

/// 在一组分数中取最大值及其下标，并列时取较小下标
fn best_class<I: Iterator<Item = f32>>(scores: I) -> Option<(u32, f32)> {
  let mut best: Option<(u32, f32)> = None;
  for (idx, value) in scores.enumerate() {
    match best {
      Some((_, current)) if !(value > current) => {}
      _ => best = Some((idx as u32, value)),
    }
  }
  best
}
