// 该文件是 RTMDet 推理项目的一部分。
// src/bin/simple_continueshot.rs - 逐帧处理输入
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use rtmdet::{
  DetectorBuilder, FromUrl,
  task::{ContinuousTask, Task},
};
use tracing::info;

/// 逐帧检测，直到输入结束或收到 Ctrl-C
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,

  #[arg(long, value_name = "FRAME_NUMBER")]
  pub frame_number: Option<usize>,
  /// 分数阈值，覆盖模型地址中的设置
  #[arg(long, value_name = "THRESHOLD")]
  pub score: Option<f32>,
  #[arg(long, value_name = "THRESHOLD")]
  pub iou: Option<f32>,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let input = rtmdet::input::InputWrapper::from_url(&args.input)?;
  let model = DetectorBuilder::from_url(&args.model)?.build()?;
  let mut options = *model.options();
  if let Some(score) = args.score {
    options = options.with_score_threshold(score);
  }
  if let Some(iou) = args.iou {
    options = options.with_iou_threshold(iou);
  }
  options.validate()?;
  let model = model.with_options(options);
  let output = rtmdet::output::OutputWrapper::from_url(&args.output)?;

  ContinuousTask::default()
    .with_frame_number(args.frame_number)
    .run_task(input, model, output)?;

  Ok(())
}
