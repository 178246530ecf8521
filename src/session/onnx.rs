// 该文件是 RTMDet 推理项目的一部分。
// src/session/onnx.rs - ONNX Runtime 推理后端
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

use ort::{
  session::{Session, builder::GraphOptimizationLevel},
  value::TensorRef,
};
use tracing::{debug, info};

use crate::{
  error::{DetectError, Result},
  session::Engine,
  tensor::Tensor,
};

pub struct OnnxEngine {
  session: Session,
}

impl OnnxEngine {
  pub fn load(path: &Path, intra_threads: Option<usize>) -> Result<Self> {
    info!("创建 ONNX Runtime 推理会话: {}", path.display());

    let mut builder = Session::builder()
      .map_err(|e| DetectError::model_load(format!("无法创建会话构建器: {}", e)))?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(|e| DetectError::model_load(format!("无法设置优化级别: {}", e)))?;

    if let Some(threads) = intra_threads {
      debug!("会话计算线程数: {}", threads);
      builder = builder
        .with_intra_threads(threads)
        .map_err(|e| DetectError::model_load(format!("无法设置线程数: {}", e)))?;
    }

    let session = builder
      .commit_from_file(path)
      .map_err(|e| DetectError::model_load(format!("模型无效: {}, 错误: {}", path.display(), e)))?;

    Ok(Self { session })
  }
}

impl Engine for OnnxEngine {
  fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
    debug!("设置模型输入, 形状 {:?}", input.shape());
    let array = input.into_array();
    let value = TensorRef::from_array_view(&array)
      .map_err(|e| DetectError::inference(format!("无法创建输入张量: {}", e)))?;

    debug!("执行模型推理");
    let outputs = self
      .session
      .run(ort::inputs![value])
      .map_err(|e| DetectError::inference(format!("ONNX Runtime 推理失败: {}", e)))?;

    let mut tensors = Vec::with_capacity(outputs.len());
    for (name, value) in outputs.iter() {
      // 标签等整型输出统一转成 f32
      let tensor = if let Ok(array) = value.try_extract_array::<f32>() {
        Tensor::from(array.into_owned())
      } else if let Ok(array) = value.try_extract_array::<i64>() {
        Tensor::from(array.mapv(|v| v as f32))
      } else if let Ok(array) = value.try_extract_array::<i32>() {
        Tensor::from(array.mapv(|v| v as f32))
      } else {
        return Err(DetectError::inference(format!(
          "输出 '{}' 的数据类型不受支持",
          name
        )));
      };
      debug!("输出 '{}': 形状 {:?}", name, tensor.shape());
      tensors.push(tensor);
    }

    Ok(tensors)
  }
}
