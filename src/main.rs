// 该文件是 RTMDet 推理项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::{info, warn};

use rtmdet::{
  DetectorBuilder, FromUrl,
  input::InputWrapper,
  model::{DetectResult, LabelMap},
  output::{OutputWrapper, Render},
};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = args::Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  if let Some(output) = &args.output {
    info!("输出地址: {}", output);
  }

  let detector = DetectorBuilder::from_url(&args.model)?.build()?;
  let mut options = *detector.options();
  if let Some(score) = args.score {
    options = options.with_score_threshold(score);
  }
  if let Some(iou) = args.iou {
    options = options.with_iou_threshold(iou);
  }
  if let Some(max) = args.max_detections {
    options = options.with_max_detections(max);
  }
  options.validate()?;
  info!(
    "检测参数: 分数阈值 {}, IoU 阈值 {}, 最多 {} 个",
    options.score_threshold, options.iou_threshold, options.max_detections
  );

  let input = InputWrapper::from_url(&args.input)?;
  let output = args.output.as_ref().map(OutputWrapper::from_url).transpose()?;
  let labels = LabelMap::from_query(&args.model)?;

  let mut frame_count = 0usize;
  let mut total_detections = 0usize;
  for frame in input {
    if args.max_frames > 0 && frame_count >= args.max_frames {
      warn!("已达到最大帧数限制: {}", args.max_frames);
      break;
    }

    let now = std::time::Instant::now();
    let detections = match detector.detect(&frame, &options) {
      Ok(detections) => detections,
      Err(e) if !e.is_fatal() => {
        warn!("第 {} 帧检测失败, 跳过: {}", frame_count + 1, e);
        frame_count += 1;
        continue;
      }
      Err(e) => return Err(e.into()),
    };
    info!(
      "第 {} 帧 ({}x{}): 检测到 {} 个目标, 耗时 {:.2?}",
      frame_count + 1,
      frame.width(),
      frame.height(),
      detections.len(),
      now.elapsed()
    );
    for det in &detections {
      info!(
        "  - {}: {:.2}% at ({:.0}, {:.0}, {:.0}x{:.0})",
        labels.name(det.class_id),
        det.score * 100.0,
        det.x,
        det.y,
        det.width,
        det.height
      );
    }
    total_detections += detections.len();

    if let Some(output) = &output {
      output.render_result(&frame, &DetectResult::from(detections))?;
    }
    frame_count += 1;
  }

  info!("处理完成: 总帧数 {}, 总检测数 {}", frame_count, total_detections);
  detector.shutdown();

  Ok(())
}
