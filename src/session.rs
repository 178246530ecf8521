// 该文件是 RTMDet 推理项目的一部分。
// src/session.rs - 推理会话管理
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
  path::Path,
  sync::{
    Mutex, TryLockError,
    atomic::{AtomicUsize, Ordering},
  },
};

use tracing::{debug, info, warn};

use crate::{
  error::{DetectError, Result},
  tensor::Tensor,
};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxEngine;

#[cfg(feature = "rknpu")]
mod rknpu;
#[cfg(feature = "rknpu")]
pub use self::rknpu::RknpuEngine;

/// 一个推理引擎实例，同一时刻只执行一次前向计算
pub trait Engine: Send {
  fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
  Onnx,
  Rknpu,
  Custom,
}

impl BackendKind {
  /// 根据模型文件扩展名判断后端
  pub fn from_path(path: &Path) -> Result<Self> {
    let ext = path
      .extension()
      .and_then(|e| e.to_str())
      .map(|e| e.to_ascii_lowercase());
    match ext.as_deref() {
      Some("onnx") => Ok(BackendKind::Onnx),
      Some("rknn") => Ok(BackendKind::Rknpu),
      _ => Err(DetectError::model_load(format!(
        "无法根据文件名判断模型后端: {}",
        path.display()
      ))),
    }
  }
}

impl std::fmt::Display for BackendKind {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    match self {
      BackendKind::Onnx => write!(f, "onnx"),
      BackendKind::Rknpu => write!(f, "rknpu"),
      BackendKind::Custom => write!(f, "custom"),
    }
  }
}

/// 按后端种类区分的引擎，加载时确定
pub enum Backend {
  #[cfg(feature = "onnx")]
  Onnx(OnnxEngine),
  #[cfg(feature = "rknpu")]
  Rknpu(RknpuEngine),
  Custom(Box<dyn Engine>),
}

impl Backend {
  pub fn kind(&self) -> BackendKind {
    match self {
      #[cfg(feature = "onnx")]
      Backend::Onnx(_) => BackendKind::Onnx,
      #[cfg(feature = "rknpu")]
      Backend::Rknpu(_) => BackendKind::Rknpu,
      Backend::Custom(_) => BackendKind::Custom,
    }
  }

  fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
    match self {
      #[cfg(feature = "onnx")]
      Backend::Onnx(engine) => engine.run(input),
      #[cfg(feature = "rknpu")]
      Backend::Rknpu(engine) => engine.run(input),
      Backend::Custom(engine) => engine.run(input),
    }
  }
}

/// 会话并发策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPolicy {
  /// 单个会话，所有调用串行执行
  Serialized,
  /// 多个独立会话，空闲会话可并行执行
  Pooled(NonZeroUsize),
}

impl SessionPolicy {
  pub fn sessions(&self) -> usize {
    match self {
      SessionPolicy::Serialized => 1,
      SessionPolicy::Pooled(n) => n.get(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
  pub policy: SessionPolicy,
  /// 单个会话内部的计算线程数
  pub intra_threads: Option<usize>,
}

impl Default for SessionOptions {
  fn default() -> Self {
    Self {
      policy: SessionPolicy::Serialized,
      intra_threads: None,
    }
  }
}

/// 已加载的模型，加载后只读，可在多个线程间共享
pub struct ModelHandle {
  kind: BackendKind,
  source: String,
  sessions: Box<[Mutex<Backend>]>,
  cursor: AtomicUsize,
}

impl std::fmt::Debug for ModelHandle {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ModelHandle")
      .field("kind", &self.kind)
      .field("source", &self.source)
      .field("sessions", &self.sessions.len())
      .finish()
  }
}

impl ModelHandle {
  /// 加载模型文件，按策略创建一个或多个会话
  pub fn load(path: &Path, kind: BackendKind, options: &SessionOptions) -> Result<Self> {
    info!("加载模型文件: {} (后端 {})", path.display(), kind);
    if !path.is_file() {
      return Err(DetectError::model_load(format!(
        "模型文件不存在: {}",
        path.display()
      )));
    }

    let count = options.policy.sessions();
    let mut sessions = Vec::with_capacity(count);
    for idx in 0..count {
      debug!("创建第 {} 个推理会话", idx);
      sessions.push(Mutex::new(Self::load_backend(path, kind, options)?));
    }

    info!("模型加载完成, 会话数量: {}", count);
    Ok(Self {
      kind,
      source: path.display().to_string(),
      sessions: sessions.into_boxed_slice(),
      cursor: AtomicUsize::new(0),
    })
  }

  #[allow(unused_variables)]
  fn load_backend(path: &Path, kind: BackendKind, options: &SessionOptions) -> Result<Backend> {
    match kind {
      #[cfg(feature = "onnx")]
      BackendKind::Onnx => Ok(Backend::Onnx(OnnxEngine::load(path, options.intra_threads)?)),
      #[cfg(feature = "rknpu")]
      BackendKind::Rknpu => Ok(Backend::Rknpu(RknpuEngine::load(path)?)),
      BackendKind::Custom => Err(DetectError::model_load(
        "自定义引擎不能从文件加载, 请使用 ModelHandle::from_engines",
      )),
      #[allow(unreachable_patterns)]
      other => Err(DetectError::model_load(format!(
        "后端 {} 未启用, 请打开对应的 cargo feature",
        other
      ))),
    }
  }

  /// 由调用方提供的引擎组成模型句柄，每个引擎一个会话
  pub fn from_engines(engines: Vec<Box<dyn Engine>>) -> Result<Self> {
    if engines.is_empty() {
      return Err(DetectError::model_load("至少需要一个推理引擎"));
    }
    let sessions: Vec<_> = engines
      .into_iter()
      .map(|engine| Mutex::new(Backend::Custom(engine)))
      .collect();
    Ok(Self {
      kind: BackendKind::Custom,
      source: "custom".to_string(),
      sessions: sessions.into_boxed_slice(),
      cursor: AtomicUsize::new(0),
    })
  }

  pub fn kind(&self) -> BackendKind {
    self.kind
  }

  pub fn source(&self) -> &str {
    &self.source
  }

  pub fn session_count(&self) -> usize {
    self.sessions.len()
  }

  /// 执行一次前向计算
  ///
  /// 从轮转起点开始寻找空闲会话，全部忙碌时阻塞等待起点会话。
  pub fn run(&self, input: Tensor) -> Result<Vec<Tensor>> {
    let count = self.sessions.len();
    let start = self.cursor.fetch_add(1, Ordering::Relaxed) % count;

    for step in 0..count {
      let idx = (start + step) % count;
      match self.sessions[idx].try_lock() {
        Ok(mut backend) => {
          debug!("会话 {} 执行推理", idx);
          return backend.run(input);
        }
        Err(TryLockError::WouldBlock) => continue,
        Err(TryLockError::Poisoned(_)) => {
          warn!("会话 {} 的锁已损坏", idx);
          return Err(DetectError::inference(format!("会话 {} 的锁已损坏", idx)));
        }
      }
    }

    debug!("所有会话忙碌, 等待会话 {}", start);
    let mut backend = self.sessions[start]
      .lock()
      .map_err(|_| DetectError::inference(format!("会话 {} 的锁已损坏", start)))?;
    backend.run(input)
  }

  /// 释放模型和所有会话
  pub fn shutdown(self) {
    info!("释放模型: {} ({} 个会话)", self.source, self.sessions.len());
    drop(self.sessions);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::{sync::Arc, thread, time::Duration};

  struct Echo;

  impl Engine for Echo {
    fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
      Ok(vec![input])
    }
  }

  /// 记录同时执行的最大会话数
  struct Slow {
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
  }

  impl Engine for Slow {
    fn run(&mut self, input: Tensor) -> Result<Vec<Tensor>> {
      let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
      self.peak.fetch_max(now, Ordering::SeqCst);
      thread::sleep(Duration::from_millis(100));
      self.active.fetch_sub(1, Ordering::SeqCst);
      Ok(vec![input])
    }
  }

  fn slow_handle(sessions: usize) -> (ModelHandle, Arc<AtomicUsize>) {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let engines: Vec<Box<dyn Engine>> = (0..sessions)
      .map(|_| {
        Box::new(Slow {
          active: active.clone(),
          peak: peak.clone(),
        }) as Box<dyn Engine>
      })
      .collect();
    (ModelHandle::from_engines(engines).unwrap(), peak)
  }

  fn run_in_parallel(handle: &ModelHandle, threads: usize) {
    thread::scope(|s| {
      for _ in 0..threads {
        s.spawn(|| {
          let input = Tensor::new(vec![1], vec![0.0]).unwrap();
          handle.run(input).unwrap();
        });
      }
    });
  }

  #[test]
  fn backend_kind_from_extension() {
    assert_eq!(
      BackendKind::from_path(Path::new("a/rtmdet.onnx")).unwrap(),
      BackendKind::Onnx
    );
    assert_eq!(
      BackendKind::from_path(Path::new("rtmdet.RKNN")).unwrap(),
      BackendKind::Rknpu
    );
    assert!(BackendKind::from_path(Path::new("rtmdet.bin")).is_err());
  }

  #[test]
  fn missing_model_file_is_fatal() {
    let err = ModelHandle::load(
      Path::new("/nonexistent/rtmdet.onnx"),
      BackendKind::Onnx,
      &SessionOptions::default(),
    )
    .unwrap_err();
    assert!(matches!(err, DetectError::ModelLoadError(_)));
    assert!(err.is_fatal());
  }

  #[test]
  fn empty_engine_list_is_rejected() {
    assert!(ModelHandle::from_engines(Vec::new()).is_err());
  }

  #[test]
  fn run_passes_tensor_through() {
    let handle = ModelHandle::from_engines(vec![Box::new(Echo)]).unwrap();
    let input = Tensor::new(vec![2], vec![1.0, 2.0]).unwrap();
    let outputs = handle.run(input.clone()).unwrap();
    assert_eq!(outputs, vec![input]);
  }

  #[test]
  fn serialized_handle_never_overlaps() {
    let (handle, peak) = slow_handle(1);
    run_in_parallel(&handle, 4);
    assert_eq!(peak.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn pooled_handle_runs_in_parallel() {
    let (handle, peak) = slow_handle(2);
    run_in_parallel(&handle, 2);
    assert_eq!(handle.session_count(), 2);
    assert_eq!(peak.load(Ordering::SeqCst), 2);
  }
}
