// 该文件是 RTMDet 推理项目的一部分。
// src/args.rs - 命令行参数
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

use clap::Parser;
use url::Url;

/// RTMDet 目标检测
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址，例如 onnx:///models/rtmdet.onnx?size=640&sessions=2
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源，image:///path/to/a.jpg 或 folder:///path/to/dir
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出地址，image://、folder:// 或 json://；不指定时只打印结果
  #[arg(long, value_name = "OUTPUT")]
  pub output: Option<Url>,

  /// 分数阈值 (0.0 - 1.0)，覆盖模型地址中的设置
  #[arg(long, value_name = "THRESHOLD")]
  pub score: Option<f32>,

  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,

  /// 每帧最多保留的检测数
  #[arg(long, value_name = "COUNT")]
  pub max_detections: Option<usize>,

  /// 最大处理帧数，0 表示无限制
  #[arg(long, default_value_t = 0, value_name = "COUNT")]
  pub max_frames: usize,
}
