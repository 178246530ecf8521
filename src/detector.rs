// 该文件是 RTMDet 推理项目的一部分。
// src/detector.rs - 检测流水线
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

use std::{
  num::NonZeroUsize,
  path::{Path, PathBuf},
  str::FromStr,
};

use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl,
  adapter::{AdapterConfig, TensorAdapter},
  bbox::BBox,
  decode::{BoxDecoder, COCO_CLASS_NUM, Decode},
  error::{DetectError, Result},
  frame::Frame,
  nms,
  session::{BackendKind, ModelHandle, SessionOptions, SessionPolicy},
  url_path,
};

const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_DECODER: &str = "rtmdet";

/// 单次检测的参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectOptions {
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub max_detections: usize,
}

impl Default for DetectOptions {
  fn default() -> Self {
    Self {
      score_threshold: 0.3,
      iou_threshold: 0.45,
      max_detections: 300,
    }
  }
}

impl DetectOptions {
  pub fn with_score_threshold(mut self, threshold: f32) -> Self {
    self.score_threshold = threshold;
    self
  }

  pub fn with_iou_threshold(mut self, threshold: f32) -> Self {
    self.iou_threshold = threshold;
    self
  }

  pub fn with_max_detections(mut self, max: usize) -> Self {
    self.max_detections = max;
    self
  }

  /// 阈值必须是 [0, 1] 内的有限数，最大检测数至少为 1
  pub fn validate(&self) -> Result<()> {
    let in_unit = |v: f32| v.is_finite() && (0.0..=1.0).contains(&v);
    if !in_unit(self.score_threshold) {
      return Err(DetectError::config(format!(
        "分数阈值 {} 不在 [0, 1] 内",
        self.score_threshold
      )));
    }
    if !in_unit(self.iou_threshold) {
      return Err(DetectError::config(format!(
        "IoU 阈值 {} 不在 [0, 1] 内",
        self.iou_threshold
      )));
    }
    if self.max_detections == 0 {
      return Err(DetectError::config("最大检测数必须至少为 1"));
    }
    Ok(())
  }
}

/// 原图坐标系下的检测结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection {
  /// 左上角 x 坐标
  pub x: f32,
  /// 左上角 y 坐标
  pub y: f32,
  pub width: f32,
  pub height: f32,
  pub class_id: u32,
  /// 置信度，范围 [0, 1]
  pub score: f32,
}

impl Detection {
  fn new(bbox: BBox, class_id: u32, score: f32) -> Self {
    Self {
      x: bbox.x1,
      y: bbox.y1,
      width: bbox.width(),
      height: bbox.height(),
      class_id,
      score,
    }
  }

  /// 角点形式的边界框
  pub fn bbox(&self) -> BBox {
    BBox::from_xywh(self.x, self.y, self.width, self.height)
  }
}

/// 目标检测器
///
/// 持有加载好的模型，可在线程间共享；并发调用 [`Detector::detect`]
/// 时各自使用独立的张量，会话按加载时的策略分配。
#[derive(Debug)]
pub struct Detector {
  handle: ModelHandle,
  adapter: TensorAdapter,
  decoder: BoxDecoder,
  options: DetectOptions,
}

impl Detector {
  /// 按文件扩展名选择后端，使用 RTMDet 默认配置加载模型
  pub fn initialize<P: AsRef<Path>>(model_path: P) -> Result<Self> {
    DetectorBuilder::new(model_path).build()
  }

  /// 由已加载的模型句柄组装检测器
  pub fn from_parts(handle: ModelHandle, adapter: TensorAdapter, decoder: BoxDecoder) -> Self {
    Self {
      handle,
      adapter,
      decoder,
      options: DetectOptions::default(),
    }
  }

  pub fn with_options(mut self, options: DetectOptions) -> Self {
    self.options = options;
    self
  }

  /// 构建时给定的默认检测参数
  pub fn options(&self) -> &DetectOptions {
    &self.options
  }

  pub fn backend(&self) -> BackendKind {
    self.handle.kind()
  }

  pub fn decoder(&self) -> &BoxDecoder {
    &self.decoder
  }

  /// 检测一帧图像
  ///
  /// 结果按分数降序排列，坐标在原图范围内。任何阶段出错都直接返回，
  /// 不会给出部分结果。
  pub fn detect(&self, frame: &Frame, options: &DetectOptions) -> Result<Vec<Detection>> {
    options.validate()?;

    let (input, letterbox) = self.adapter.encode(frame)?;
    debug!(
      "预处理完成: 缩放 {:?}, 偏移 {:?}",
      letterbox.scale_factor(),
      letterbox.offset()
    );

    let outputs = self.handle.run(input)?;
    let candidates = self.decoder.decode(
      &outputs,
      letterbox.target_size(),
      options.score_threshold,
    )?;
    let kept = nms::suppress(candidates, options.iou_threshold);

    let (width, height) = letterbox.source_size();
    let mut detections: Vec<Detection> = kept
      .into_iter()
      .filter_map(|c| {
        let bbox = letterbox
          .inverse(c.bbox)
          .clamp(width as f32, height as f32);
        bbox
          .is_valid()
          .then(|| Detection::new(bbox, c.class_id, c.score))
      })
      .collect();
    detections.truncate(options.max_detections);

    debug!("检测到 {} 个目标", detections.len());
    Ok(detections)
  }

  /// 释放模型
  pub fn shutdown(self) {
    info!("关闭检测器");
    self.handle.shutdown();
  }
}

/// 检测器构建器
///
/// 也可由 URL 创建，例如
/// `onnx:///models/rtmdet.onnx?size=640&sessions=2&score=0.4`。
#[derive(Debug, Clone)]
pub struct DetectorBuilder {
  model_path: PathBuf,
  backend: Option<BackendKind>,
  input_size: (u32, u32),
  adapter: Option<AdapterConfig>,
  decoder: String,
  num_classes: usize,
  session: SessionOptions,
  options: DetectOptions,
}

impl DetectorBuilder {
  pub fn new<P: AsRef<Path>>(model_path: P) -> Self {
    Self {
      model_path: model_path.as_ref().to_path_buf(),
      backend: None,
      input_size: (DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE),
      adapter: None,
      decoder: DEFAULT_DECODER.to_string(),
      num_classes: COCO_CLASS_NUM,
      session: SessionOptions::default(),
      options: DetectOptions::default(),
    }
  }

  pub fn with_backend(mut self, backend: BackendKind) -> Self {
    self.backend = Some(backend);
    self
  }

  pub fn with_input_size(mut self, width: u32, height: u32) -> Self {
    self.input_size = (width, height);
    self
  }

  /// 覆盖按后端选择的预处理配置
  pub fn with_adapter(mut self, config: AdapterConfig) -> Self {
    self.adapter = Some(config);
    self
  }

  pub fn with_decoder<S: Into<String>>(mut self, name: S) -> Self {
    self.decoder = name.into();
    self
  }

  pub fn with_num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn with_session_options(mut self, session: SessionOptions) -> Self {
    self.session = session;
    self
  }

  pub fn with_options(mut self, options: DetectOptions) -> Self {
    self.options = options;
    self
  }

  pub fn model_path(&self) -> &Path {
    &self.model_path
  }

  /// 先检查全部配置，再加载模型
  pub fn build(self) -> Result<Detector> {
    let kind = match self.backend {
      Some(kind) => kind,
      None => BackendKind::from_path(&self.model_path)?,
    };
    let (width, height) = self.input_size;

    // RKNN 模型把归一化编进图里，只需要 u8 NHWC
    let config = self.adapter.unwrap_or_else(|| match kind {
      BackendKind::Rknpu => AdapterConfig::raw_nhwc(width, height),
      _ => AdapterConfig::rtmdet(width, height),
    });
    let adapter = TensorAdapter::new(config)?;
    let decoder = BoxDecoder::from_name(&self.decoder, self.num_classes)?;
    self.options.validate()?;

    info!(
      "构建检测器: 后端 {}, 输入 {}x{}, 解码 {}, 类别数 {}",
      kind,
      width,
      height,
      decoder.name(),
      self.num_classes
    );
    let handle = ModelHandle::load(&self.model_path, kind, &self.session)?;
    Ok(Detector::from_parts(handle, adapter, decoder).with_options(self.options))
  }
}

fn parse_query<T: FromStr>(key: &str, value: &str) -> Result<T> {
  value
    .parse()
    .map_err(|_| DetectError::config(format!("参数 {} 的值 '{}' 无效", key, value)))
}

/// `640` 或 `640x480`
fn parse_size(value: &str) -> Result<(u32, u32)> {
  match value.split_once('x') {
    Some((w, h)) => Ok((parse_query("size", w)?, parse_query("size", h)?)),
    None => {
      let size = parse_query("size", value)?;
      Ok((size, size))
    }
  }
}

impl FromUrl for DetectorBuilder {
  type Error = DetectError;

  fn from_url(url: &Url) -> Result<Self> {
    let backend = match url.scheme() {
      "onnx" => BackendKind::Onnx,
      "rknn" => BackendKind::Rknpu,
      other => {
        return Err(DetectError::config(format!(
          "模型 URL 必须使用 onnx 或 rknn 方案, 实际为 {}",
          other
        )));
      }
    };

    let mut builder = DetectorBuilder::new(url_path(url)).with_backend(backend);
    for (key, value) in url.query_pairs() {
      match &*key {
        "size" => {
          let (w, h) = parse_size(&value)?;
          builder = builder.with_input_size(w, h);
        }
        "sessions" => {
          let count: usize = parse_query("sessions", &value)?;
          let policy = match NonZeroUsize::new(count) {
            Some(n) if n.get() > 1 => SessionPolicy::Pooled(n),
            Some(_) => SessionPolicy::Serialized,
            None => return Err(DetectError::config("会话数量必须至少为 1")),
          };
          builder.session.policy = policy;
        }
        "threads" => builder.session.intra_threads = Some(parse_query("threads", &value)?),
        "decoder" => builder = builder.with_decoder(value.into_owned()),
        "classes" => builder = builder.with_num_classes(parse_query("classes", &value)?),
        "score" => builder.options.score_threshold = parse_query("score", &value)?,
        "iou" => builder.options.iou_threshold = parse_query("iou", &value)?,
        "max" => builder.options.max_detections = parse_query("max", &value)?,
        // 类别名称由输出端读取
        "labels" => {}
        other => warn!("忽略未知的模型参数: {}", other),
      }
    }

    Ok(builder)
  }
}
