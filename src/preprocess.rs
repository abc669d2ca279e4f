// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/preprocess.rs - 图像预处理（最近邻缩放与张量编码）
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
use tracing::debug;

use crate::{
  frame::{PixelFrame, RGB_CHANNELS},
  tensor::{ElementType, TensorDescriptor},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PreprocessError {
  #[error("输入帧为空")]
  EmptyFrame,
  #[error("不支持的输入张量类型: {0}")]
  UnsupportedTensorType(ElementType),
  #[error("输入帧数据长度不匹配: 期望 {expected}, 实际 {actual}")]
  FrameSizeMismatch { expected: usize, actual: usize },
  #[error("输入张量缓冲区长度不匹配: 期望 {expected}, 实际 {actual}")]
  DestinationSizeMismatch { expected: usize, actual: usize },
  #[error("输入张量形状无效: {0:?}")]
  InvalidInputShape(Vec<usize>),
}

/// 最近邻采样的源坐标，向下取整
#[inline]
pub fn source_index(dst: usize, src_len: usize, dst_len: usize) -> usize {
  ((dst as u64 * src_len as u64) / dst_len as u64) as usize
}

/// 将源帧缩放到输入张量分辨率并按元素类型编码写入 `destination`
///
/// 所有校验都在写入之前完成，出错时 `destination` 保持不变。
///
/// UINT8 / INT8 的像素编码不使用量化参数，但整数输入张量缺少有效的
/// scale 时绑定阶段不会为其选择编解码器，此时同样返回
/// [`PreprocessError::UnsupportedTensorType`]。
pub fn preprocess(
  frame: &PixelFrame<'_>,
  input: &TensorDescriptor,
  destination: &mut [u8],
) -> Result<(), PreprocessError> {
  if frame.is_empty() {
    return Err(PreprocessError::EmptyFrame);
  }

  let codec = input
    .codec()
    .ok_or(PreprocessError::UnsupportedTensorType(input.element_type()))?;

  let (dst_h, dst_w, channels) = input
    .image_dims()
    .filter(|&(h, w, c)| h > 0 && w > 0 && c == RGB_CHANNELS)
    .ok_or_else(|| PreprocessError::InvalidInputShape(input.shape().to_vec()))?;

  // 宽高相乘溢出时按 usize::MAX 报告
  let expected = frame.expected_len();
  if expected.is_none_or(|len| frame.data().len() < len) {
    return Err(PreprocessError::FrameSizeMismatch {
      expected: expected.unwrap_or(usize::MAX),
      actual: frame.data().len(),
    });
  }

  if destination.len() != input.byte_len() {
    return Err(PreprocessError::DestinationSizeMismatch {
      expected: input.byte_len(),
      actual: destination.len(),
    });
  }

  debug!(
    "预处理: {}x{} -> {}x{} ({})",
    frame.width(),
    frame.height(),
    dst_w,
    dst_h,
    codec.name()
  );

  let (src_w, src_h) = (frame.width(), frame.height());
  let src = frame.data();
  let element_size = input.element_type().size();
  let mut chunks = destination.chunks_exact_mut(element_size);

  for y in 0..dst_h {
    let src_y = source_index(y, src_h, dst_h);
    for x in 0..dst_w {
      let src_x = source_index(x, src_w, dst_w);
      let offset = (src_y * src_w + src_x) * RGB_CHANNELS;
      for &byte in &src[offset..offset + channels] {
        if let Some(out) = chunks.next() {
          codec.encode_pixel(byte, out);
        }
      }
    }
  }

  Ok(())
}
