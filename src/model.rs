// 该文件是 RTMDet 推理项目的一部分。
// src/model.rs - 模型接口与类别标签
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

use tracing::info;
use url::Url;

use crate::{
  detector::{Detection, Detector},
  error::{DetectError, Result},
  frame::Frame,
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> std::result::Result<Self::Output, Self::Error>;
}

/// 一帧图像的检测结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[Detection]>,
}

impl DetectResult {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

impl From<Vec<Detection>> for DetectResult {
  fn from(items: Vec<Detection>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

/// 使用构建时给定的检测参数
impl Model for Detector {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DetectError;

  fn infer(&self, input: &Frame) -> Result<DetectResult> {
    self.detect(input, self.options()).map(DetectResult::from)
  }
}

/// COCO 数据集类别名称
pub const COCO_LABELS: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

/// 类别序号到名称的映射
#[derive(Debug, Clone, PartialEq)]
pub struct LabelMap {
  names: Box<[String]>,
}

impl Default for LabelMap {
  fn default() -> Self {
    Self::coco()
  }
}

impl LabelMap {
  pub fn coco() -> Self {
    Self {
      names: COCO_LABELS.iter().map(|s| s.to_string()).collect(),
    }
  }

  /// 从文本文件读取，每行一个类别名称，忽略空行
  pub fn from_file(path: &Path) -> std::io::Result<Self> {
    let content = std::fs::read_to_string(path)?;
    let names: Box<[String]> = content
      .lines()
      .map(str::trim)
      .filter(|line| !line.is_empty())
      .map(str::to_string)
      .collect();
    info!("从 {} 读取 {} 个类别名称", path.display(), names.len());
    Ok(Self { names })
  }

  /// 读取 URL 查询里的 `labels=<文件>`，未指定时使用 COCO 类别名
  pub fn from_query(url: &Url) -> std::io::Result<Self> {
    match url.query_pairs().find(|(k, _)| k == "labels") {
      Some((_, path)) => Self::from_file(Path::new(&*path)),
      None => Ok(Self::coco()),
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  /// 未知序号返回 `class_<id>`
  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(class_id as usize)
      .cloned()
      .unwrap_or_else(|| format!("class_{}", class_id))
  }
}
