// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/frame.rs - RGB888 帧定义
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

pub const RGB_CHANNELS: usize = 3;

/// 借用的 RGB888 像素缓冲区，HWC 交错排列
///
/// 构造时不做校验，空帧和尺寸不符由预处理阶段报告。
#[derive(Debug, Clone, Copy)]
pub struct PixelFrame<'a> {
  data: &'a [u8],
  width: usize,
  height: usize,
}

impl<'a> PixelFrame<'a> {
  pub fn new(data: &'a [u8], width: usize, height: usize) -> Self {
    Self {
      data,
      width,
      height,
    }
  }

  pub fn data(&self) -> &'a [u8] {
    self.data
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  /// 按宽高计算应有的字节数，溢出时返回 None
  pub fn expected_len(&self) -> Option<usize> {
    self
      .width
      .checked_mul(self.height)?
      .checked_mul(RGB_CHANNELS)
  }

  pub fn is_empty(&self) -> bool {
    self.data.is_empty() || self.width == 0 || self.height == 0
  }

  pub fn pixel(&self, x: usize, y: usize) -> Option<[u8; RGB_CHANNELS]> {
    if x >= self.width || y >= self.height {
      return None;
    }
    let index = y
      .checked_mul(self.width)
      .and_then(|row| row.checked_add(x))
      .and_then(|i| i.checked_mul(RGB_CHANNELS))?;
    self
      .data
      .get(index..index.checked_add(RGB_CHANNELS)?)
      .map(|p| [p[0], p[1], p[2]])
  }
}

/// 自有的 RGB888 帧，输入源产出此类型
#[derive(Debug, Clone)]
pub struct RgbFrame {
  data: Box<[u8]>,
  width: usize,
  height: usize,
}

impl RgbFrame {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let size = RGB_CHANNELS * width * height;
    Self {
      data: vec![0u8; size].into_boxed_slice(),
      width,
      height,
    }
  }

  /// 数据长度与宽高不符时返回 None
  pub fn from_raw(width: usize, height: usize, data: Vec<u8>) -> Option<Self> {
    let expected = width.checked_mul(height)?.checked_mul(RGB_CHANNELS)?;
    if data.len() != expected {
      return None;
    }
    Some(Self {
      data: data.into_boxed_slice(),
      width,
      height,
    })
  }

  /// 单色帧
  pub fn filled(width: usize, height: usize, rgb: [u8; RGB_CHANNELS]) -> Self {
    let mut frame = Self::with_shape(height, width);
    for pixel in frame.data.chunks_exact_mut(RGB_CHANNELS) {
      pixel.copy_from_slice(&rgb);
    }
    frame
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  pub fn as_frame(&self) -> PixelFrame<'_> {
    PixelFrame::new(&self.data, self.width, self.height)
  }
}

impl AsRef<[u8]> for RgbFrame {
  fn as_ref(&self) -> &[u8] {
    &self.data
  }
}

impl AsMut<[u8]> for RgbFrame {
  fn as_mut(&mut self) -> &mut [u8] {
    &mut self.data
  }
}
