// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/input/raw_file.rs - 原始 RGB888 帧输入
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

use std::collections::HashMap;

use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::{RGB_CHANNELS, RgbFrame},
  input::decode_path,
};

#[derive(Error, Debug)]
pub enum RawFileInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("文件路径无效: {0}")]
  InvalidPath(String),
  #[error("缺少或无效的参数: {0}")]
  InvalidParameter(&'static str),
  #[error("帧数据长度不匹配: 期望 {expected} 的整数倍, 实际 {actual}")]
  SizeMismatch { expected: usize, actual: usize },
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 摄像头缓冲区转储: `raw:///path/frames.rgb?width=320&height=240`
///
/// 文件可包含连续多帧，长度必须是单帧大小的整数倍。
pub struct RawFileInput {
  data: Vec<u8>,
  width: usize,
  height: usize,
}

impl FromUrlWithScheme for RawFileInput {
  const SCHEME: &'static str = "raw";
}

impl FromUrl for RawFileInput {
  type Error = RawFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RawFileInputError::SchemeMismatch);
    }
    let path = decode_path(url).ok_or_else(|| RawFileInputError::InvalidPath(url.to_string()))?;

    let query_pairs: HashMap<_, _> = url.query_pairs().collect();
    let width: usize = query_pairs
      .get("width")
      .and_then(|v| v.parse().ok())
      .filter(|&v| v > 0)
      .ok_or(RawFileInputError::InvalidParameter("width"))?;
    let height: usize = query_pairs
      .get("height")
      .and_then(|v| v.parse().ok())
      .filter(|&v| v > 0)
      .ok_or(RawFileInputError::InvalidParameter("height"))?;

    let frame_len = width
      .checked_mul(height)
      .and_then(|n| n.checked_mul(RGB_CHANNELS))
      .ok_or(RawFileInputError::InvalidParameter("width"))?;
    let data = std::fs::read(&path)?;
    if data.is_empty() || data.len() % frame_len != 0 {
      return Err(RawFileInputError::SizeMismatch {
        expected: frame_len,
        actual: data.len(),
      });
    }
    debug!(
      "原始帧文件 {}: {}x{}, 共 {} 帧",
      path,
      width,
      height,
      data.len() / frame_len
    );

    Ok(RawFileInput {
      data,
      width,
      height,
    })
  }
}

impl RawFileInput {
  pub fn frame_count(&self) -> usize {
    self.data.len() / (self.width * self.height * RGB_CHANNELS)
  }

  pub fn into_frames(self) -> RawFileFrames {
    RawFileFrames {
      inner: self,
      index: 0,
    }
  }
}

pub struct RawFileFrames {
  inner: RawFileInput,
  index: usize,
}

impl Iterator for RawFileFrames {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    let RawFileInput {
      data,
      width,
      height,
    } = &self.inner;
    let frame_len = width * height * RGB_CHANNELS;
    let start = self.index * frame_len;
    let chunk = data.get(start..start + frame_len)?;
    self.index += 1;
    RgbFrame::from_raw(*width, *height, chunk.to_vec())
  }
}
