// 该文件是 RTMDet 推理项目的一部分。
// src/tensor.rs - 浮点张量
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

use ndarray::{Array, ArrayD, ArrayView2, ArrayView3, ArrayViewD, Dimension, IxDyn};

use crate::error::{DetectError, Result};

/// 动态维度的 f32 张量，在流水线各阶段之间按所有权转移
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
  array: ArrayD<f32>,
}

impl Tensor {
  pub fn new<S: Into<Vec<usize>>>(shape: S, data: Vec<f32>) -> Result<Self> {
    let shape = shape.into();
    let array = ArrayD::from_shape_vec(IxDyn(&shape), data).map_err(|e| {
      DetectError::inference(format!("张量形状 {:?} 与数据长度不符: {}", shape, e))
    })?;
    Ok(Self { array })
  }

  pub fn shape(&self) -> &[usize] {
    self.array.shape()
  }

  pub fn view(&self) -> ArrayViewD<'_, f32> {
    self.array.view()
  }

  pub fn len(&self) -> usize {
    self.array.len()
  }

  pub fn is_empty(&self) -> bool {
    self.array.is_empty()
  }

  /// 去掉前导的长度为 1 的维度
  pub fn squeezed_shape(&self) -> &[usize] {
    let shape = self.array.shape();
    let start = shape.iter().position(|&d| d != 1).unwrap_or(shape.len());
    &shape[start..]
  }

  /// 去掉前导的 1 后按二维查看
  pub fn view2(&self) -> Option<ArrayView2<'_, f32>> {
    match *self.squeezed_shape() {
      [rows, cols] => self.array.view().into_shape_with_order((rows, cols)).ok(),
      _ => None,
    }
  }

  /// 按 `[C, H, W]` 查看
  ///
  /// 秩不小于 3 时要求末三维完全一致且前导维度都为 1；
  /// 秩不大于 2 的张量视为展平数据，只比较元素个数。
  pub fn view3(&self, dims: (usize, usize, usize)) -> Option<ArrayView3<'_, f32>> {
    let (c, h, w) = dims;
    let shape = self.array.shape();
    let fits = match shape.len() {
      0..=2 => self.array.len() == c * h * w,
      n => shape[..n - 3].iter().all(|&d| d == 1) && shape[n - 3..] == [c, h, w],
    };
    if !fits {
      return None;
    }
    self.array.view().into_shape_with_order(dims).ok()
  }

  pub fn into_array(self) -> ArrayD<f32> {
    self.array
  }
}

impl<D: Dimension> From<Array<f32, D>> for Tensor {
  fn from(array: Array<f32, D>) -> Self {
    Self {
      array: array.into_dyn(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use ndarray::Array3;

  #[test]
  fn shape_must_match_data() {
    assert!(Tensor::new(vec![1, 2, 3], vec![0.0; 6]).is_ok());
    let err = Tensor::new(vec![1, 2, 3], vec![0.0; 5]).unwrap_err();
    assert!(matches!(err, DetectError::InferenceError(_)));
  }

  #[test]
  fn squeeze_drops_leading_ones() {
    let t = Tensor::new(vec![1, 1, 5, 4], vec![0.0; 20]).unwrap();
    assert_eq!(t.squeezed_shape(), &[5, 4]);
    assert_eq!(t.view2().unwrap().dim(), (5, 4));
  }

  #[test]
  fn view3_checks_channels_of_shaped_tensors() {
    let t = Tensor::new(vec![1, 16, 4, 4], vec![0.0; 256]).unwrap();
    assert!(t.view3((16, 4, 4)).is_some());
    // 元素个数相同但通道不同
    assert!(t.view3((4, 8, 8)).is_none());
    let nested = Tensor::new(vec![2, 16, 4, 4], vec![0.0; 512]).unwrap();
    assert!(nested.view3((16, 4, 4)).is_none());
  }

  #[test]
  fn view3_reshapes_flat_tensors() {
    let data: Vec<f32> = (0..12).map(|v| v as f32).collect();
    let t = Tensor::new(vec![12], data).unwrap();
    let view = t.view3((3, 2, 2)).unwrap();
    assert_eq!(view[[2, 1, 0]], 10.0);
    assert!(t.view3((2, 2, 2)).is_none());
  }

  #[test]
  fn from_array_keeps_shape() {
    let t = Tensor::from(Array3::<f32>::zeros((2, 3, 4)));
    assert_eq!(t.shape(), &[2, 3, 4]);
    assert_eq!(t.len(), 24);
  }
}
