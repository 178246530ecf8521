// 该文件是 RTMDet 推理项目的一部分。
// src/output/json_record.rs - 以 JSON Lines 记录检测结果
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
  fs::{File, OpenOptions},
  io::{BufWriter, Write},
  sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
  },
};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  model::{DetectResult, LabelMap},
  output::Render,
  url_path,
};

#[derive(Error, Debug)]
pub enum JsonRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("记录文件的锁已损坏")]
  Poisoned,
}

/// 每帧一行 JSON，`append` 参数决定追加还是覆盖
pub struct JsonRecordOutput {
  writer: Mutex<BufWriter<File>>,
  labels: LabelMap,
  frame_counter: AtomicU64,
}

impl FromUrlWithScheme for JsonRecordOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(JsonRecordOutputError::SchemeMismatch);
    }

    let path = url_path(uri);
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    let append = uri.query_pairs().any(|(k, _)| k == "append");
    let file = OpenOptions::new()
      .create(true)
      .write(true)
      .append(append)
      .truncate(!append)
      .open(&path)?;
    info!("检测结果记录到 {}", path.display());

    Ok(JsonRecordOutput {
      writer: Mutex::new(BufWriter::new(file)),
      labels: LabelMap::from_query(uri)?,
      frame_counter: AtomicU64::new(0),
    })
  }
}

impl JsonRecordOutput {
  fn to_value(&self, frame_id: u64, frame: &Frame, result: &DetectResult) -> Value {
    let detections: Vec<Value> = result
      .items
      .iter()
      .map(|item| {
        json!({
          "class_id": item.class_id,
          "label": self.labels.name(item.class_id),
          "score": item.score,
          "bbox": [item.x, item.y, item.width, item.height],
        })
      })
      .collect();

    json!({
      "frame": frame_id,
      "width": frame.width(),
      "height": frame.height(),
      "detections": detections,
    })
  }
}

impl Render<Frame, DetectResult> for JsonRecordOutput {
  type Error = JsonRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    let frame_id = self.frame_counter.fetch_add(1, Ordering::Relaxed);
    let value = self.to_value(frame_id, frame, result);

    let mut writer = self
      .writer
      .lock()
      .map_err(|_| JsonRecordOutputError::Poisoned)?;
    serde_json::to_writer(&mut *writer, &value)?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{detector::Detection, frame::PixelFormat};

  #[test]
  fn writes_one_line_per_frame() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out/detections.jsonl");
    let url = Url::parse(&format!("json://{}", path.display())).unwrap();
    let output = JsonRecordOutput::from_url(&url).unwrap();

    let frame = Frame::new(4, 3, PixelFormat::Rgb8, vec![0; 4 * 3 * 3]).unwrap();
    let result = DetectResult::from(vec![Detection {
      x: 0.5,
      y: 1.0,
      width: 2.0,
      height: 1.5,
      class_id: 16,
      score: 0.75,
    }]);
    output.render_result(&frame, &result).unwrap();
    output
      .render_result(&frame, &DetectResult::default())
      .unwrap();

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<Value> = content
      .lines()
      .map(|line| serde_json::from_str(line).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["frame"], 0);
    assert_eq!(lines[0]["width"], 4);
    assert_eq!(lines[0]["detections"][0]["label"], "dog");
    assert_eq!(lines[0]["detections"][0]["score"], 0.75);
    assert_eq!(lines[1]["frame"], 1);
    assert!(lines[1]["detections"].as_array().unwrap().is_empty());
  }
}
