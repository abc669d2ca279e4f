// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/input/image_folder.rs - 图像目录输入
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

use std::{path::PathBuf, vec::IntoIter};

use thiserror::Error;
use tracing::{info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::RgbFrame,
  input::{decode_path, read_image_file::load_rgb_image},
};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[derive(Error, Debug)]
pub enum ImageFolderInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("目录路径无效: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 按文件名顺序逐张读取目录中的图像
pub struct ImageFolderInput {
  files: Vec<PathBuf>,
}

impl FromUrlWithScheme for ImageFolderInput {
  const SCHEME: &'static str = "folder";
}

fn is_image(path: &std::path::Path) -> bool {
  path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| IMAGE_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
    .unwrap_or(false)
}

impl FromUrl for ImageFolderInput {
  type Error = ImageFolderInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ImageFolderInputError::SchemeMismatch);
    }
    let directory =
      decode_path(url).ok_or_else(|| ImageFolderInputError::InvalidPath(url.to_string()))?;

    let mut files = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      if path.is_file() && is_image(&path) {
        files.push(path);
      }
    }
    files.sort();
    info!("图像目录 {} 中共 {} 张图像", directory, files.len());

    Ok(ImageFolderInput { files })
  }
}

impl ImageFolderInput {
  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn into_frames(self) -> ImageFolderFrames {
    ImageFolderFrames {
      files: self.files.into_iter(),
    }
  }
}

pub struct ImageFolderFrames {
  files: IntoIter<PathBuf>,
}

impl Iterator for ImageFolderFrames {
  type Item = RgbFrame;

  /// 无法解码的文件会被跳过
  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      match load_rgb_image(&path) {
        Ok(frame) => return Some(frame),
        Err(e) => warn!("跳过图像 {}: {}", path.display(), e),
      }
    }
    None
  }
}
