// 该文件是 RTMDet 推理项目的一部分。
// tests/pipeline.rs - 用合成引擎驱动完整检测流水线
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

use rtmdet::{
  DetectError, DetectOptions, Detection, Detector, Frame, PixelFormat,
  adapter::{AdapterConfig, TensorAdapter},
  decode::BoxDecoder,
  error::Result,
  model::Model,
  session::{Engine, ModelHandle},
  tensor::Tensor,
};

const CLASSES: usize = 3;
const INPUT: usize = 640;
const STRIDES: [usize; 3] = [8, 16, 32];
const BACKGROUND_LOGIT: f32 = -10.0;
const BACKGROUND_DISTANCE: f32 = 10.0;

/// 在某个检测头的某个网格点放一个目标
#[derive(Clone, Copy)]
struct Hit {
  level: usize,
  row: usize,
  col: usize,
  class: usize,
  logit: f32,
  distance: f32,
}

/// 按 RTMDet 输出格式产生固定张量的引擎
#[derive(Clone)]
struct Synthetic {
  hits: Vec<Hit>,
}

impl Engine for Synthetic {
  fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
    if input.shape() != [1, 3, INPUT, INPUT] {
      return Err(DetectError::inference(format!(
        "unexpected input shape {:?}",
        input.shape()
      )));
    }

    let mut outputs = Vec::new();
    for (level, stride) in STRIDES.iter().enumerate() {
      let map = INPUT / stride;
      let spatial = map * map;
      let mut cls = vec![BACKGROUND_LOGIT; CLASSES * spatial];
      let mut reg = vec![BACKGROUND_DISTANCE; 4 * spatial];
      for hit in self.hits.iter().filter(|h| h.level == level) {
        let idx = hit.row * map + hit.col;
        cls[hit.class * spatial + idx] = hit.logit;
        for k in 0..4 {
          reg[k * spatial + idx] = hit.distance;
        }
      }
      outputs.push(Tensor::new(vec![1, CLASSES, map, map], cls)?);
      outputs.push(Tensor::new(vec![1, 4, map, map], reg)?);
    }
    Ok(outputs)
  }
}

/// 错误形状的输出
struct Broken;

impl Engine for Broken {
  fn run(&mut self, _input: Tensor) -> Result<Vec<Tensor>> {
    Ok(vec![Tensor::new(vec![1, 7], vec![0.0; 7])?])
  }
}

fn scene() -> Vec<Hit> {
  vec![
    // 先验点 (320, 240)，框 (280, 200, 360, 280)
    Hit {
      level: 0,
      row: 30,
      col: 40,
      class: 1,
      logit: 3.0,
      distance: 40.0,
    },
    // 与上一个框 IoU 约 0.82，被抑制
    Hit {
      level: 0,
      row: 30,
      col: 41,
      class: 1,
      logit: 2.0,
      distance: 40.0,
    },
    // 先验点 (320, 160)，框 (256, 96, 384, 224)
    Hit {
      level: 2,
      row: 5,
      col: 10,
      class: 2,
      logit: 1.0,
      distance: 64.0,
    },
    // 分数 0.27，低于默认阈值
    Hit {
      level: 1,
      row: 2,
      col: 2,
      class: 0,
      logit: -1.0,
      distance: 10.0,
    },
  ]
}

fn detector_with(engines: Vec<Box<dyn Engine>>) -> Detector {
  let handle = ModelHandle::from_engines(engines).unwrap();
  let adapter = TensorAdapter::new(AdapterConfig::rtmdet(640, 640)).unwrap();
  Detector::from_parts(handle, adapter, BoxDecoder::rtmdet(CLASSES))
}

fn detector(hits: Vec<Hit>) -> Detector {
  detector_with(vec![Box::new(Synthetic { hits })])
}

fn frame(width: u32, height: u32) -> Frame {
  Frame::new(
    width,
    height,
    PixelFormat::Rgb8,
    vec![90; (width * height * 3) as usize],
  )
  .unwrap()
}

fn assert_detection(det: &Detection, x: f32, y: f32, w: f32, h: f32, class_id: u32) {
  assert_eq!(det.class_id, class_id);
  for (got, want) in [(det.x, x), (det.y, y), (det.width, w), (det.height, h)] {
    assert!((got - want).abs() < 1e-3, "{:?}", det);
  }
}

#[test]
fn square_image_keeps_tensor_coordinates() {
  let result = detector(scene())
    .detect(&frame(640, 640), &DetectOptions::default())
    .unwrap();

  assert_eq!(result.len(), 2);
  assert_detection(&result[0], 280.0, 200.0, 80.0, 80.0, 1);
  assert_detection(&result[1], 256.0, 96.0, 128.0, 128.0, 2);
  assert!((result[0].score - 0.952_574).abs() < 1e-4);
}

#[test]
fn large_image_is_mapped_back_through_letterbox() {
  let result = detector(scene())
    .detect(&frame(1280, 960), &DetectOptions::default())
    .unwrap();

  assert_eq!(result.len(), 2);
  assert_detection(&result[0], 560.0, 400.0, 160.0, 160.0, 1);
  assert_detection(&result[1], 512.0, 192.0, 256.0, 256.0, 2);
}

#[test]
fn results_are_sorted_and_inside_the_image() {
  let result = detector(scene())
    .detect(&frame(640, 480), &DetectOptions::default())
    .unwrap();

  assert!(!result.is_empty());
  assert!(result.windows(2).all(|w| w[0].score >= w[1].score));
  for det in &result {
    assert!((0.0..=1.0).contains(&det.score));
    assert!(det.width > 0.0 && det.height > 0.0);
    assert!(det.x >= 0.0 && det.x + det.width <= 640.0);
    assert!(det.y >= 0.0 && det.y + det.height <= 480.0);
  }
}

#[test]
fn boxes_are_clamped_to_the_image() {
  // 先验点 (0, 0)，框 (-50, -50, 50, 50)
  let hits = vec![Hit {
    level: 0,
    row: 0,
    col: 0,
    class: 0,
    logit: 4.0,
    distance: 50.0,
  }];
  let result = detector(hits)
    .detect(&frame(640, 640), &DetectOptions::default())
    .unwrap();

  assert_eq!(result.len(), 1);
  assert_detection(&result[0], 0.0, 0.0, 50.0, 50.0, 0);
}

#[test]
fn boxes_in_the_padding_are_dropped() {
  // 640x320 的图像填充到 640x640，框 (300, 500, 340, 540) 完全落在填充区
  let hits = vec![Hit {
    level: 0,
    row: 65,
    col: 40,
    class: 0,
    logit: 4.0,
    distance: 20.0,
  }];
  let result = detector(hits)
    .detect(&frame(640, 320), &DetectOptions::default())
    .unwrap();
  assert!(result.is_empty());
}

#[test]
fn max_detections_keeps_the_best() {
  let options = DetectOptions::default().with_max_detections(1);
  let result = detector(scene()).detect(&frame(640, 640), &options).unwrap();
  assert_eq!(result.len(), 1);
  assert_eq!(result[0].class_id, 1);
}

#[test]
fn higher_iou_threshold_keeps_overlapping_boxes() {
  let options = DetectOptions::default().with_iou_threshold(0.9);
  let result = detector(scene()).detect(&frame(640, 640), &options).unwrap();
  assert_eq!(result.len(), 3);
}

#[test]
fn score_threshold_of_one_gives_nothing() {
  let options = DetectOptions::default().with_score_threshold(1.0);
  let result = detector(scene()).detect(&frame(640, 640), &options).unwrap();
  assert!(result.is_empty());
}

#[test]
fn empty_scene_is_not_an_error() {
  let result = detector(Vec::new())
    .detect(&frame(320, 200), &DetectOptions::default())
    .unwrap();
  assert!(result.is_empty());
}

#[test]
fn detection_is_deterministic() {
  let detector = detector(scene());
  let image = frame(800, 600);
  let first = detector.detect(&image, &DetectOptions::default()).unwrap();
  let second = detector.detect(&image, &DetectOptions::default()).unwrap();
  assert_eq!(first, second);
}

#[test]
fn invalid_options_are_rejected() {
  let options = DetectOptions::default().with_iou_threshold(f32::INFINITY);
  let err = detector(scene())
    .detect(&frame(64, 64), &options)
    .unwrap_err();
  assert!(matches!(err, DetectError::ConfigError(_)));
}

#[test]
fn empty_image_is_rejected() {
  let empty = Frame::new(0, 0, PixelFormat::Rgb8, Vec::new()).unwrap();
  let err = detector(scene())
    .detect(&empty, &DetectOptions::default())
    .unwrap_err();
  assert!(matches!(err, DetectError::InvalidImageError(_)));
  assert!(!err.is_fatal());
}

#[test]
fn misshaped_outputs_are_transient_errors() {
  let detector = detector_with(vec![Box::new(Broken)]);
  let err = detector
    .detect(&frame(64, 64), &DetectOptions::default())
    .unwrap_err();
  assert!(matches!(err, DetectError::InferenceError(_)));
  assert!(!err.is_fatal());
}

#[test]
fn concurrent_calls_match_sequential_results() {
  let engines: Vec<Box<dyn Engine>> = (0..2)
    .map(|_| Box::new(Synthetic { hits: scene() }) as Box<dyn Engine>)
    .collect();
  let detector = detector_with(engines);
  let image = frame(1280, 960);
  let expected = detector.detect(&image, &DetectOptions::default()).unwrap();

  std::thread::scope(|s| {
    let handles: Vec<_> = (0..4)
      .map(|_| s.spawn(|| detector.detect(&image, &DetectOptions::default()).unwrap()))
      .collect();
    for handle in handles {
      assert_eq!(handle.join().unwrap(), expected);
    }
  });
}

#[test]
fn model_trait_uses_builder_options() {
  let detector = detector(scene()).with_options(DetectOptions::default().with_max_detections(1));
  let result = detector.infer(&frame(640, 640)).unwrap();
  assert_eq!(result.len(), 1);
}
