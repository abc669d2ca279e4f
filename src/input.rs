// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/input.rs - 图像输入
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

use thiserror::Error;

use crate::{FromUrl, FromUrlWithScheme, frame::RgbFrame};

#[cfg(feature = "read_image_file")]
mod read_image_file;
#[cfg(feature = "read_image_file")]
pub use self::read_image_file::{ImageFileInput, ImageFileInputError};

#[cfg(feature = "read_image_file")]
mod image_folder;
#[cfg(feature = "read_image_file")]
pub use self::image_folder::{ImageFolderInput, ImageFolderInputError};

mod raw_file;
pub use self::raw_file::{RawFileInput, RawFileInputError};

/// 把 URL 路径还原为本地路径
pub(crate) fn decode_path(url: &url::Url) -> Option<String> {
  let path = urlencoding::decode(url.path()).ok()?.into_owned();
  if path.is_empty() { None } else { Some(path) }
}

#[derive(Error, Debug)]
pub enum InputError {
  #[cfg(feature = "read_image_file")]
  #[error("图像文件输入错误: {0}")]
  ImageFileInputError(#[from] ImageFileInputError),
  #[cfg(feature = "read_image_file")]
  #[error("图像目录输入错误: {0}")]
  ImageFolderInputError(#[from] ImageFolderInputError),
  #[error("原始帧输入错误: {0}")]
  RawFileInputError(#[from] RawFileInputError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

pub enum InputWrapper {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(ImageFileInput),
  #[cfg(feature = "read_image_file")]
  ImageFolder(ImageFolderInput),
  RawFile(RawFileInput),
}

impl FromUrl for InputWrapper {
  type Error = InputError;

  fn from_url(url: &url::Url) -> Result<Self, Self::Error> {
    match url.scheme() {
      #[cfg(feature = "read_image_file")]
      ImageFileInput::SCHEME => Ok(InputWrapper::ReadImageFile(ImageFileInput::from_url(url)?)),
      #[cfg(feature = "read_image_file")]
      ImageFolderInput::SCHEME => Ok(InputWrapper::ImageFolder(ImageFolderInput::from_url(url)?)),
      RawFileInput::SCHEME => Ok(InputWrapper::RawFile(RawFileInput::from_url(url)?)),
      other => Err(InputError::SchemeMismatch(other.to_string())),
    }
  }
}

impl InputWrapper {
  pub fn into_frames(self) -> InputWrapperIter {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapper::ReadImageFile(input) => InputWrapperIter::ReadImageFile(input.into_frames()),
      #[cfg(feature = "read_image_file")]
      InputWrapper::ImageFolder(input) => InputWrapperIter::ImageFolder(input.into_frames()),
      InputWrapper::RawFile(input) => InputWrapperIter::RawFile(input.into_frames()),
    }
  }
}

pub enum InputWrapperIter {
  #[cfg(feature = "read_image_file")]
  ReadImageFile(self::read_image_file::ImageFileFrames),
  #[cfg(feature = "read_image_file")]
  ImageFolder(self::image_folder::ImageFolderFrames),
  RawFile(self::raw_file::RawFileFrames),
}

impl Iterator for InputWrapperIter {
  type Item = RgbFrame;

  fn next(&mut self) -> Option<Self::Item> {
    match self {
      #[cfg(feature = "read_image_file")]
      InputWrapperIter::ReadImageFile(input) => input.next(),
      #[cfg(feature = "read_image_file")]
      InputWrapperIter::ImageFolder(input) => input.next(),
      InputWrapperIter::RawFile(input) => input.next(),
    }
  }
}
