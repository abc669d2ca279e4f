// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/tensor/codec.rs - 张量元素编解码
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

use std::fmt::Debug;

use super::{ElementType, Quantization};

/// 每种张量元素类型的编解码实现，绑定张量时选定一次
pub trait ElementCodec: Debug + Send + Sync + 'static {
  fn element_type(&self) -> ElementType;

  fn name(&self) -> &'static str {
    self.element_type().name()
  }

  /// 将 0-255 的像素通道值编码为一个张量元素
  fn encode_pixel(&self, byte: u8, out: &mut [u8]);

  /// 读取一个元素并还原为实数
  fn dequantize(&self, raw: &[u8]) -> f32;

  /// 将实数写为一个元素，整数类型会截断到取值范围
  fn quantize(&self, value: f32, out: &mut [u8]);

  fn clone_box(&self) -> Box<dyn ElementCodec>;
}

impl Clone for Box<dyn ElementCodec> {
  fn clone(&self) -> Self {
    self.clone_box()
  }
}

/// 根据元素类型选择编解码器；整数类型必须带量化参数
pub fn codec_for(
  element_type: ElementType,
  quantization: Option<Quantization>,
) -> Option<Box<dyn ElementCodec>> {
  match (element_type, quantization) {
    (ElementType::UInt8, Some(quant)) => Some(Box::new(Uint8Codec::new(quant))),
    (ElementType::Int8, Some(quant)) => Some(Box::new(Int8Codec::new(quant))),
    (ElementType::Float32, _) => Some(Box::new(Float32Codec)),
    _ => None,
  }
}

/// UINT8: 像素原样存储
#[derive(Debug, Clone)]
pub struct Uint8Codec {
  quant: Quantization,
}

impl Uint8Codec {
  pub fn new(quant: Quantization) -> Self {
    Self { quant }
  }
}

impl ElementCodec for Uint8Codec {
  fn element_type(&self) -> ElementType {
    ElementType::UInt8
  }

  fn encode_pixel(&self, byte: u8, out: &mut [u8]) {
    out[0] = byte;
  }

  fn dequantize(&self, raw: &[u8]) -> f32 {
    self.quant.dequantize(raw[0] as i32)
  }

  fn quantize(&self, value: f32, out: &mut [u8]) {
    out[0] = self.quant.quantize(value, u8::MIN as i32, u8::MAX as i32) as u8;
  }

  fn clone_box(&self) -> Box<dyn ElementCodec> {
    Box::new(self.clone())
  }
}

/// INT8: 像素减 128 映射到有符号区间
#[derive(Debug, Clone)]
pub struct Int8Codec {
  quant: Quantization,
}

impl Int8Codec {
  pub fn new(quant: Quantization) -> Self {
    Self { quant }
  }
}

impl ElementCodec for Int8Codec {
  fn element_type(&self) -> ElementType {
    ElementType::Int8
  }

  fn encode_pixel(&self, byte: u8, out: &mut [u8]) {
    out[0] = ((byte as i16 - 128) as i8) as u8;
  }

  fn dequantize(&self, raw: &[u8]) -> f32 {
    self.quant.dequantize(raw[0] as i8 as i32)
  }

  fn quantize(&self, value: f32, out: &mut [u8]) {
    out[0] = (self.quant.quantize(value, i8::MIN as i32, i8::MAX as i32) as i8) as u8;
  }

  fn clone_box(&self) -> Box<dyn ElementCodec> {
    Box::new(self.clone())
  }
}

/// FLOAT32: 像素归一化到 [0, 1]，小端存储
#[derive(Debug, Clone)]
pub struct Float32Codec;

impl ElementCodec for Float32Codec {
  fn element_type(&self) -> ElementType {
    ElementType::Float32
  }

  fn encode_pixel(&self, byte: u8, out: &mut [u8]) {
    out[..4].copy_from_slice(&(byte as f32 / 255.0).to_le_bytes());
  }

  fn dequantize(&self, raw: &[u8]) -> f32 {
    f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]])
  }

  fn quantize(&self, value: f32, out: &mut [u8]) {
    out[..4].copy_from_slice(&value.to_le_bytes());
  }

  fn clone_box(&self) -> Box<dyn ElementCodec> {
    Box::new(self.clone())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn quant(scale: f32, zero_point: i32) -> Quantization {
    Quantization::new(scale, zero_point).unwrap()
  }

  #[test]
  fn test_pixel_255_per_type() {
    let mut out = [0u8; 4];

    Uint8Codec::new(quant(1.0 / 255.0, 0)).encode_pixel(255, &mut out);
    assert_eq!(out[0], 255);

    Int8Codec::new(quant(1.0 / 255.0, -128)).encode_pixel(255, &mut out);
    assert_eq!(out[0] as i8, 127);

    Int8Codec::new(quant(1.0 / 255.0, -128)).encode_pixel(0, &mut out);
    assert_eq!(out[0] as i8, -128);

    Float32Codec.encode_pixel(255, &mut out);
    assert_eq!(f32::from_le_bytes(out), 1.0);
    Float32Codec.encode_pixel(51, &mut out);
    assert_eq!(f32::from_le_bytes(out), 51.0 / 255.0);
  }

  #[test]
  fn test_dequantize_formula() {
    let codec = Uint8Codec::new(quant(0.5, 10));
    assert_eq!(codec.dequantize(&[14]), 2.0);
    assert_eq!(codec.dequantize(&[0]), -5.0);

    let codec = Int8Codec::new(quant(0.25, -2));
    assert_eq!(codec.dequantize(&[(-6i8) as u8]), -1.0);
    assert_eq!(codec.dequantize(&[2]), 1.0);
  }

  #[test]
  fn test_quantize_round_trip_within_one_step() {
    let cases: [(Box<dyn ElementCodec>, f32, f32); 3] = [
      (Box::new(Uint8Codec::new(quant(1.0 / 255.0, 0))), 0.0, 1.0),
      (Box::new(Int8Codec::new(quant(1.0 / 256.0, -128))), 0.0, 0.99),
      (Box::new(Int8Codec::new(quant(0.05, 3))), -6.0, 6.0),
    ];

    for (codec, low, high) in cases.iter() {
      let (low, high) = (*low, *high);
      let step = match codec.element_type() {
        ElementType::UInt8 | ElementType::Int8 => {
          // 从编码 1 与 0 的差值得到量化步长
          let mut a = [0u8];
          let mut b = [0u8];
          codec.quantize(0.0, &mut a);
          b[0] = a[0].wrapping_add(1);
          codec.dequantize(&b) - codec.dequantize(&a)
        }
        _ => unreachable!(),
      };
      for i in 0..=100 {
        let v = low + (high - low) * i as f32 / 100.0;
        let mut raw = [0u8];
        codec.quantize(v, &mut raw);
        let back = codec.dequantize(&raw);
        assert!(
          (back - v).abs() <= step,
          "{}: {} -> {} (step {})",
          codec.name(),
          v,
          back,
          step
        );
      }
    }
  }

  #[test]
  fn test_quantize_clamps_to_range() {
    let mut raw = [0u8];
    Uint8Codec::new(quant(0.1, 0)).quantize(1000.0, &mut raw);
    assert_eq!(raw[0], 255);
    Uint8Codec::new(quant(0.1, 0)).quantize(-3.0, &mut raw);
    assert_eq!(raw[0], 0);
    Int8Codec::new(quant(0.1, 0)).quantize(-1000.0, &mut raw);
    assert_eq!(raw[0] as i8, -128);
  }

  #[test]
  fn test_zero_point_outside_element_range() {
    let mut raw = [0u8];

    let codec = Uint8Codec::new(quant(1.0, i32::MIN));
    assert_eq!(codec.dequantize(&[0]), 2_147_483_648.0);
    codec.quantize(0.7, &mut raw);
    assert_eq!(raw[0], 0);

    let codec = Uint8Codec::new(quant(1.0 / 256.0, 300));
    codec.quantize(0.0, &mut raw);
    assert_eq!(raw[0], 255);

    let codec = Int8Codec::new(quant(0.5, i32::MAX));
    let expected = (-((1i64 << 31) + 127) as f64 * 0.5) as f32;
    assert_eq!(codec.dequantize(&[(-128i8) as u8]), expected);
    codec.quantize(-3.0, &mut raw);
    assert_eq!(raw[0] as i8, 127);

    let codec = Int8Codec::new(quant(0.5, -1000));
    codec.quantize(1.0, &mut raw);
    assert_eq!(raw[0] as i8, -128);
  }

  #[test]
  fn test_subnormal_scale_saturates() {
    let mut raw = [0u8];
    let codec = Uint8Codec::new(quant(f32::from_bits(1), 5));
    codec.quantize(0.7, &mut raw);
    assert_eq!(raw[0], 255);
    codec.quantize(-0.7, &mut raw);
    assert_eq!(raw[0], 0);
    assert_eq!(codec.dequantize(&[5]), 0.0);

    let codec = Int8Codec::new(quant(f32::from_bits(1), 5));
    codec.quantize(0.7, &mut raw);
    assert_eq!(raw[0] as i8, 127);
  }

  #[test]
  fn test_codec_selection() {
    let q = Quantization::new(0.1, 0);
    assert_eq!(
      codec_for(ElementType::UInt8, q).map(|c| c.element_type()),
      Some(ElementType::UInt8)
    );
    assert_eq!(
      codec_for(ElementType::Float32, None).map(|c| c.element_type()),
      Some(ElementType::Float32)
    );
    assert!(codec_for(ElementType::Int8, None).is_none());
    assert!(codec_for(ElementType::Int16, q).is_none());
    assert!(codec_for(ElementType::Float16, None).is_none());
  }
}
