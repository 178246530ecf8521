// 该文件是 RTMDet 推理项目的一部分。
// src/session/rknpu.rs - RKNN NPU 推理后端
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

use ndarray::Array1;
use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use tracing::{debug, error, info};

use crate::{
  error::{DetectError, Result},
  session::Engine,
  tensor::Tensor,
};

const RKNN_NUM_INPUTS: u32 = 1;

/// RKNN 模型把归一化编进图里，输入为 u8 NHWC
pub struct RknpuEngine {
  context: Context,
  num_outputs: u32,
}

impl RknpuEngine {
  pub fn load(path: &Path) -> Result<Self> {
    let model_data = std::fs::read(path)
      .map_err(|e| DetectError::model_load(format!("无法读取模型文件 {}: {}", path.display(), e)))?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, InitFlags::default())
      .map_err(|e| DetectError::model_load(format!("无法创建 RKNN 上下文: {}", e)))?;

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(DetectError::model_load(format!("无法查询 SDK 版本: {}", e)));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| DetectError::model_load(format!("无法获取输入数量: {}", e)))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| DetectError::model_load(format!("无法获取输出数量: {}", e)))?;

    if num_inputs != RKNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      );
      return Err(DetectError::model_load(format!(
        "预期模型输入数量为 {}, 实际为 {}",
        RKNN_NUM_INPUTS, num_inputs
      )));
    }

    debug!("模型输出数量: {}", num_outputs);
    Ok(Self {
      context,
      num_outputs,
    })
  }
}

impl Engine for RknpuEngine {
  fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
    if input.shape().len() != 4 || input.shape()[3] != 3 {
      return Err(DetectError::inference(format!(
        "RKNN 需要 NHWC 输入, 实际形状 {:?}",
        input.shape()
      )));
    }

    let bytes: Vec<u8> = input
      .view()
      .iter()
      .map(|v| v.round().clamp(0.0, 255.0) as u8)
      .collect();

    debug!("设置模型输入");
    self
      .context
      .set_input(0, &bytes, TensorFormat::NHWC, TensorType::UInt8)
      .map_err(|e| DetectError::inference(format!("设置输入失败: {}", e)))?;

    debug!("执行模型推理");
    self
      .context
      .run()
      .map_err(|e| DetectError::inference(format!("RKNN 推理失败: {}", e)))?;

    let output = self
      .context
      .get_outputs()
      .map_err(|e| DetectError::inference(format!("获取输出失败: {}", e)))?;

    // RKNN 只给出展平的数据，解码器按元素个数匹配检测头
    let mut tensors = Vec::with_capacity(self.num_outputs as usize);
    for idx in 0..self.num_outputs as usize {
      let data = output
        .get_f32(idx)
        .map_err(|e| DetectError::inference(format!("获取第 {} 个输出失败: {}", idx, e)))?;
      tensors.push(Tensor::from(Array1::from(data.to_vec())));
    }
    Ok(tensors)
  }
}
