// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use image::{ImageReader, RgbImage};
use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame, input::decode_path};

#[derive(Error, Debug)]
pub enum ImageFileInputError {
  #[error("URI 方案不匹配")]
  SchemaMismatch,
  #[error("图像路径无效: {0}")]
  InvalidPath(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("图像加载错误: {0}")]
  ImageLoadError(#[from] image::ImageError),
}

/// 读取并解码一张图像
pub(crate) fn load_rgb_image(path: &Path) -> Result<RgbFrame, ImageFileInputError> {
  let image = ImageReader::open(path)?.decode()?;
  debug!(
    "读取图像: {} ({}x{})",
    path.display(),
    image.width(),
    image.height()
  );
  Ok(RgbFrame::from(image.to_rgb8()))
}

pub struct ImageFileInput {
  frame: Option<RgbFrame>,
}

impl FromUrlWithScheme for ImageFileInput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for ImageFileInput {
  type Error = ImageFileInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ImageFileInputError::SchemaMismatch);
    }

    let path = decode_path(url).ok_or_else(|| ImageFileInputError::InvalidPath(url.to_string()))?;
    let frame = load_rgb_image(Path::new(&path))?;

    Ok(ImageFileInput { frame: Some(frame) })
  }
}

impl ImageFileInput {
  pub fn into_frames(self) -> ImageFileFrames {
    ImageFileFrames { inner: self }
  }
}

pub struct ImageFileFrames {
  inner: ImageFileInput,
}

impl Iterator for ImageFileFrames {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.frame.take()
  }
}

impl From<RgbImage> for RgbFrame {
  fn from(image: RgbImage) -> Self {
    let (width, height) = image.dimensions();
    let mut frame = RgbFrame::with_shape(height as usize, width as usize);
    frame.as_mut().copy_from_slice(image.as_raw());
    frame
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_read_png() {
    let mut image = RgbImage::new(3, 2);
    image.put_pixel(2, 1, image::Rgb([255, 128, 1]));
    let path = std::env::temp_dir().join(format!("caiyuan-image-{}.png", std::process::id()));
    image.save(&path).unwrap();

    let url = Url::parse(&format!("image://{}", path.display())).unwrap();
    let frames: Vec<RgbFrame> = ImageFileInput::from_url(&url).unwrap().into_frames().collect();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(frames.len(), 1);
    let frame = &frames[0];
    assert_eq!((frame.width(), frame.height()), (3, 2));
    assert_eq!(frame.as_frame().pixel(2, 1), Some([255, 128, 1]));
    assert_eq!(frame.as_frame().pixel(0, 0), Some([0, 0, 0]));
  }

  #[test]
  fn test_scheme_and_missing_file() {
    let url = Url::parse("raw:///tmp/a.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::SchemaMismatch)
    ));
    let url = Url::parse("image:///nonexistent/caiyuan.png").unwrap();
    assert!(matches!(
      ImageFileInput::from_url(&url),
      Err(ImageFileInputError::IoError(_))
    ));
  }
}
