// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/output/json_lines.rs - JSON Lines 结果记录
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
  io::Write,
  path::{Path, PathBuf},
  sync::Mutex,
};

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::RgbFrame, input::decode_path, model::ClassificationResult,
  output::Render,
};

#[derive(Error, Debug)]
pub enum JsonLinesOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("记录路径无效: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
  #[error("记录文件锁已失效")]
  Poisoned,
}

#[derive(Debug, Serialize)]
struct Record<'a> {
  timestamp: String,
  index: u64,
  width: usize,
  height: usize,
  #[serde(flatten)]
  result: &'a ClassificationResult,
}

struct Sink {
  file: File,
  index: u64,
}

/// 每帧追加一行 JSON: `jsonl:///var/log/caiyuan/results.jsonl`
pub struct JsonLinesOutput {
  path: PathBuf,
  sink: Mutex<Sink>,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "jsonl";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonLinesOutputError::SchemeMismatch);
    }
    let path =
      decode_path(url).ok_or_else(|| JsonLinesOutputError::InvalidPath(url.to_string()))?;
    Self::create(path)
  }
}

impl JsonLinesOutput {
  pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, JsonLinesOutputError> {
    let path = path.as_ref().to_path_buf();
    if let Some(parent) = path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(&path)?;
    info!("结果记录写入: {}", path.display());

    Ok(JsonLinesOutput {
      path,
      sink: Mutex::new(Sink { file, index: 0 }),
    })
  }

  pub fn path(&self) -> &Path {
    &self.path
  }
}

impl Render<RgbFrame, ClassificationResult> for JsonLinesOutput {
  type Error = JsonLinesOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &ClassificationResult) -> Result<(), Self::Error> {
    let mut sink = self.sink.lock().map_err(|_| JsonLinesOutputError::Poisoned)?;
    sink.index += 1;
    let record = Record {
      timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
      index: sink.index,
      width: frame.width(),
      height: frame.height(),
      result,
    };
    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');
    sink.file.write_all(&line)?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_append_records() {
    let dir = std::env::temp_dir().join(format!("caiyuan-jsonl-{}", std::process::id()));
    let path = dir.join("nested").join("results.jsonl");
    let url = Url::parse(&format!("jsonl://{}", path.display())).unwrap();
    let output = JsonLinesOutput::from_url(&url).unwrap();
    assert_eq!(output.path(), path.as_path());

    let frame = RgbFrame::filled(4, 3, [0, 0, 0]);
    let ok = ClassificationResult {
      class_index: Some(3),
      class_name: "tomato",
      confidence: 0.75,
      valid: true,
    };
    output.render_result(&frame, &ok).unwrap();
    output
      .render_result(&frame, &ClassificationResult::invalid())
      .unwrap();
    drop(output);

    let text = std::fs::read_to_string(&path).unwrap();
    std::fs::remove_dir_all(&dir).unwrap();
    let lines: Vec<serde_json::Value> = text
      .lines()
      .map(|l| serde_json::from_str(l).unwrap())
      .collect();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0]["index"], 1);
    assert_eq!(lines[0]["class_name"], "tomato");
    assert_eq!(lines[0]["class_index"], 3);
    assert_eq!(lines[0]["confidence"], 0.75);
    assert_eq!(lines[0]["width"], 4);
    assert_eq!(lines[1]["valid"], false);
    assert!(lines[1]["class_index"].is_null());
    assert!(lines[1]["timestamp"].is_string());
  }
}
