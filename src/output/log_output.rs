// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/output/log_output.rs - 日志输出
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

use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme, frame::RgbFrame, model::ClassificationResult, output::Render,
};

#[derive(Error, Debug)]
pub enum LogOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
}

/// 以日志形式输出结果: `log://`，`log://?quiet` 时只记录无效结果
#[derive(Debug, Default)]
pub struct LogOutput {
  counter: AtomicU64,
  quiet: bool,
}

impl FromUrlWithScheme for LogOutput {
  const SCHEME: &'static str = "log";
}

impl FromUrl for LogOutput {
  type Error = LogOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(LogOutputError::SchemeMismatch);
    }
    let quiet = url.query_pairs().any(|(k, _)| k == "quiet");
    Ok(LogOutput {
      counter: AtomicU64::new(0),
      quiet,
    })
  }
}

impl LogOutput {
  pub fn rendered(&self) -> u64 {
    self.counter.load(Ordering::Relaxed)
  }
}

impl Render<RgbFrame, ClassificationResult> for LogOutput {
  type Error = LogOutputError;

  fn render_result(&self, frame: &RgbFrame, result: &ClassificationResult) -> Result<(), Self::Error> {
    let index = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
    if result.valid {
      if !self.quiet {
        info!(
          "第 {} 帧 ({}x{}): {} ({:.1}%)",
          index,
          frame.width(),
          frame.height(),
          result.class_name,
          result.confidence * 100.0
        );
      }
    } else {
      warn!("第 {} 帧 ({}x{}): 无有效结果", index, frame.width(), frame.height());
    }
    Ok(())
  }
}
