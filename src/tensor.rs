// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/tensor.rs - 张量描述
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

use std::fmt;

mod codec;
pub use self::codec::{ElementCodec, Float32Codec, Int8Codec, Uint8Codec, codec_for};

/// 张量元素类型，编号与模型文件中的类型码一致
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ElementType {
  Float32,
  Int32,
  UInt8,
  Int64,
  Int16,
  Int8,
  Float16,
}

impl ElementType {
  pub fn from_code(code: u8) -> Option<Self> {
    match code {
      1 => Some(ElementType::Float32),
      2 => Some(ElementType::Int32),
      3 => Some(ElementType::UInt8),
      4 => Some(ElementType::Int64),
      7 => Some(ElementType::Int16),
      9 => Some(ElementType::Int8),
      10 => Some(ElementType::Float16),
      _ => None,
    }
  }

  pub fn code(self) -> u8 {
    match self {
      ElementType::Float32 => 1,
      ElementType::Int32 => 2,
      ElementType::UInt8 => 3,
      ElementType::Int64 => 4,
      ElementType::Int16 => 7,
      ElementType::Int8 => 9,
      ElementType::Float16 => 10,
    }
  }

  /// 单个元素占用的字节数
  pub fn size(self) -> usize {
    match self {
      ElementType::UInt8 | ElementType::Int8 => 1,
      ElementType::Int16 | ElementType::Float16 => 2,
      ElementType::Float32 | ElementType::Int32 => 4,
      ElementType::Int64 => 8,
    }
  }

  pub fn name(self) -> &'static str {
    match self {
      ElementType::Float32 => "FLOAT32",
      ElementType::Int32 => "INT32",
      ElementType::UInt8 => "UINT8",
      ElementType::Int64 => "INT64",
      ElementType::Int16 => "INT16",
      ElementType::Int8 => "INT8",
      ElementType::Float16 => "FLOAT16",
    }
  }

  pub fn is_integer(self) -> bool {
    !matches!(self, ElementType::Float32 | ElementType::Float16)
  }
}

impl fmt::Display for ElementType {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.name())
  }
}

/// 仿射量化参数: real = (stored - zero_point) * scale
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quantization {
  scale: f32,
  zero_point: i32,
}

impl Quantization {
  /// scale 必须为有限正数
  pub fn new(scale: f32, zero_point: i32) -> Option<Self> {
    if scale.is_finite() && scale > 0.0 {
      Some(Self { scale, zero_point })
    } else {
      None
    }
  }

  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn zero_point(&self) -> i32 {
    self.zero_point
  }

  /// 零点可以是任意 i32，差值在 i64 中计算
  pub fn dequantize(&self, stored: i32) -> f32 {
    ((stored as i64 - self.zero_point as i64) as f64 * self.scale as f64) as f32
  }

  /// 量化并截断到 [min, max]，NaN 落在零点上
  pub fn quantize(&self, real: f32, min: i32, max: i32) -> i32 {
    let stored = (real as f64 / self.scale as f64).round() + self.zero_point as f64;
    if stored.is_nan() {
      return self.zero_point.clamp(min, max);
    }
    stored.clamp(min as f64, max as f64) as i32
  }
}

/// 张量的逻辑视图: 形状、元素类型、量化参数以及绑定时选定的编解码器
#[derive(Debug, Clone)]
pub struct TensorDescriptor {
  shape: Vec<usize>,
  element_type: ElementType,
  quantization: Option<Quantization>,
  codec: Option<Box<dyn ElementCodec>>,
}

impl TensorDescriptor {
  pub fn new(
    shape: Vec<usize>,
    element_type: ElementType,
    quantization: Option<Quantization>,
  ) -> Self {
    // 浮点张量不携带量化参数
    let quantization = if element_type.is_integer() {
      quantization
    } else {
      None
    };
    let codec = codec_for(element_type, quantization);
    Self {
      shape,
      element_type,
      quantization,
      codec,
    }
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub fn element_type(&self) -> ElementType {
    self.element_type
  }

  pub fn quantization(&self) -> Option<Quantization> {
    self.quantization
  }

  /// 元素类型没有对应编解码器（或整数类型缺少量化参数）时返回 None
  pub fn codec(&self) -> Option<&dyn ElementCodec> {
    self.codec.as_deref()
  }

  pub fn element_count(&self) -> usize {
    self.shape.iter().product()
  }

  pub fn byte_len(&self) -> usize {
    self.element_count() * self.element_type.size()
  }

  /// 按 [1,] H x W x C 解释形状，返回 (H, W, C)
  pub fn image_dims(&self) -> Option<(usize, usize, usize)> {
    let rank = self.shape.len();
    if rank < 3 {
      return None;
    }
    if self.shape[..rank - 3].iter().any(|&d| d != 1) {
      return None;
    }
    Some((
      self.shape[rank - 3],
      self.shape[rank - 2],
      self.shape[rank - 1],
    ))
  }
}
