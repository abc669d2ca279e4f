// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model/runtime.rs - 模型运行时
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
use tracing::{debug, error, info, warn};

use crate::{
  frame::{PixelFrame, RGB_CHANNELS},
  model::{
    arena::{Arena, Region},
    blob::{ModelBlob, TensorSpec, element_product},
    graph::{Graph, Shape3, load_f32, store_f32},
  },
  preprocess::{PreprocessError, preprocess},
  tensor::TensorDescriptor,
};

/// 默认张量内存池大小 (1300 KB)
pub const DEFAULT_ARENA_CAPACITY: usize = 1300 * 1024;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelLoadError {
  #[error("模型格式版本不匹配: 期望 {expected}, 实际 {found}")]
  SchemaMismatch { expected: u32, found: u32 },
  #[error("无法分配 {requested} 字节张量内存池")]
  ArenaAllocationFailed { requested: usize },
  #[error("张量绑定失败: {0}")]
  TensorBindingFailed(String),
  #[error("模型文件损坏: {0}")]
  Malformed(String),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InferenceError {
  #[error("推理执行失败: {0}")]
  ExecutionFailed(String),
}

fn binding_failed(msg: impl Into<String>) -> ModelLoadError {
  let msg = msg.into();
  error!("{}", msg);
  ModelLoadError::TensorBindingFailed(msg)
}

/// 已绑定张量的模型解释器
///
/// 持有内存池，输入输出张量都在内存池中；`'m` 为模型字节的生命周期，
/// 权重直接从模型字节读取。
#[derive(Debug)]
pub struct Runtime<'m> {
  arena: Arena,
  graph: Graph<'m>,
  input: TensorDescriptor,
  output: TensorDescriptor,
  input_region: Region,
  output_region: Region,
  ping: Region,
  pong: Region,
}

fn checked_descriptor(spec: &TensorSpec, which: &str) -> Result<TensorDescriptor, ModelLoadError> {
  let count = element_product(&spec.shape)
    .map_err(|_| binding_failed(format!("{}张量元素数量溢出: {:?}", which, spec.shape)))?;
  if count.checked_mul(spec.element_type.size()).is_none() {
    return Err(binding_failed(format!(
      "{}张量字节数溢出: {:?}",
      which, spec.shape
    )));
  }
  Ok(spec.descriptor())
}

impl<'m> Runtime<'m> {
  /// 解析模型、预留内存池并绑定输入输出张量
  ///
  /// 模型格式版本在预留内存池之前检查，版本不符时不会分配任何内存；
  /// 绑定失败时内存池随返回的错误一并释放。
  pub fn initialize(blob: &'m [u8], arena_capacity: usize) -> Result<Self, ModelLoadError> {
    info!("解析模型: {:.2} KB", blob.len() as f64 / 1024.0);
    let model = ModelBlob::parse(blob).inspect_err(|e| error!("模型解析失败: {}", e))?;
    debug!("模型格式版本: {}, 算子数量: {}", model.schema_version, model.ops.len());

    info!("预留张量内存池: {} KB", arena_capacity / 1024);
    let mut arena = Arena::reserve(arena_capacity).map_err(|e| {
      error!("{}", e);
      ModelLoadError::ArenaAllocationFailed {
        requested: arena_capacity,
      }
    })?;

    let input = checked_descriptor(&model.input, "输入")?;
    let output = checked_descriptor(&model.output, "输出")?;

    let (height, width, channels) = input
      .image_dims()
      .ok_or_else(|| binding_failed(format!("输入张量不是图像: {:?}", input.shape())))?;
    if channels != RGB_CHANNELS {
      return Err(binding_failed(format!(
        "输入张量通道数应为 {}, 实际为 {}",
        RGB_CHANNELS, channels
      )));
    }
    if height != width {
      return Err(binding_failed(format!(
        "输入张量应为正方形, 实际为 {}x{}",
        width, height
      )));
    }
    if input.codec().is_none() {
      warn!("输入张量类型 {} 不受支持, 预处理将失败", input.element_type());
    }
    if output.codec().is_none() {
      return Err(binding_failed(format!(
        "输出张量类型 {} 不受支持",
        output.element_type()
      )));
    }

    let graph = Graph::build(model.ops, Shape3::new(height, width, channels))
      .map_err(|e| binding_failed(e.to_string()))?;
    if graph.output_shape().len() != output.element_count() {
      return Err(binding_failed(format!(
        "计算图输出 {} 与输出张量 {:?} 不符",
        graph.output_shape(),
        output.shape()
      )));
    }

    let [ping_len, pong_len] = graph.buffer_elements().map(|n| n.checked_mul(4));
    let (ping_len, pong_len) = ping_len
      .zip(pong_len)
      .ok_or_else(|| binding_failed("激活缓冲区大小溢出"))?;
    let mut alloc = |len: usize| arena.alloc(len).map_err(|e| binding_failed(e.to_string()));
    let input_region = alloc(input.byte_len())?;
    let output_region = alloc(output.byte_len())?;
    let ping = alloc(ping_len)?;
    let pong = alloc(pong_len)?;

    info!("输入尺寸: {}x{}x{} ({})", width, height, channels, input.element_type());
    info!("输出: {:?} ({})", output.shape(), output.element_type());
    info!("内存池使用: {} / {} 字节", arena.used(), arena.capacity());

    Ok(Runtime {
      arena,
      graph,
      input,
      output,
      input_region,
      output_region,
      ping,
      pong,
    })
  }

  pub fn input(&self) -> &TensorDescriptor {
    &self.input
  }

  pub fn output(&self) -> &TensorDescriptor {
    &self.output
  }

  /// 输入分辨率 (宽, 高)
  pub fn input_size(&self) -> (usize, usize) {
    let shape = self.graph.input_shape();
    (shape.width, shape.height)
  }

  pub fn input_tensor(&self) -> &[u8] {
    self.arena.slice(self.input_region)
  }

  pub fn input_tensor_mut(&mut self) -> &mut [u8] {
    self.arena.slice_mut(self.input_region)
  }

  pub fn output_tensor(&self) -> &[u8] {
    self.arena.slice(self.output_region)
  }

  pub fn arena_capacity(&self) -> usize {
    self.arena.capacity()
  }

  pub fn arena_used(&self) -> usize {
    self.arena.used()
  }

  /// 将帧写入输入张量，失败时输入张量保持不变
  pub fn preprocess_frame(&mut self, frame: &PixelFrame<'_>) -> Result<(), PreprocessError> {
    preprocess(frame, &self.input, self.arena.slice_mut(self.input_region))
  }

  /// 同步执行一次推理，结果写入输出张量
  ///
  /// 阻塞调用，耗时随模型规模增长；需要保持响应的调用方应放到
  /// [`crate::worker::InferenceWorker`] 中执行。
  pub fn invoke(&mut self) -> Result<(), InferenceError> {
    let input_codec = self.input.codec().ok_or_else(|| {
      InferenceError::ExecutionFailed(format!(
        "输入张量类型 {} 无法读取",
        self.input.element_type()
      ))
    })?;
    let output_codec = self.output.codec().ok_or_else(|| {
      InferenceError::ExecutionFailed(format!(
        "输出张量类型 {} 无法写入",
        self.output.element_type()
      ))
    })?;

    {
      let size = self.input.element_type().size();
      let (src, dst) = self.arena.split_pair(self.input_region, self.ping);
      for (i, raw) in src.chunks_exact(size).enumerate() {
        store_f32(dst, i, input_codec.dequantize(raw));
      }
    }

    let result = self.graph.run(&mut self.arena, self.ping, self.pong);

    let size = self.output.element_type().size();
    let (src, dst) = self.arena.split_pair(result, self.output_region);
    for (i, out) in dst.chunks_exact_mut(size).enumerate() {
      let value = load_f32(src, i);
      if !value.is_finite() {
        return Err(InferenceError::ExecutionFailed(format!(
          "第 {} 个输出不是有限值: {}",
          i, value
        )));
      }
      output_codec.quantize(value, out);
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{
    frame::RgbFrame,
    model::blob::{Activation, BlobWriter, MODEL_SCHEMA_VERSION},
    tensor::ElementType,
  };

  fn scores_model(input: TensorSpec, scores: &[f32]) -> Vec<u8> {
    let channels = input.shape.last().copied().unwrap_or(3);
    let n = scores.len();
    BlobWriter::new(input, TensorSpec::float32(vec![1, n]))
      .global_average_pool()
      .fully_connected(channels, n, Activation::None, &vec![0.0; channels * n], scores)
      .finish()
  }

  fn f32_output(runtime: &Runtime<'_>) -> Vec<f32> {
    runtime
      .output_tensor()
      .chunks_exact(4)
      .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
      .collect()
  }

  #[test]
  fn test_initialize_and_invoke() {
    let data = scores_model(TensorSpec::float32(vec![1, 8, 8, 3]), &[0.1, 0.6, 0.3]);
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    assert_eq!(runtime.input_size(), (8, 8));
    assert_eq!(runtime.input_tensor().len(), 8 * 8 * 3 * 4);
    assert_eq!(runtime.output_tensor().len(), 12);
    assert_eq!(runtime.arena_capacity(), 64 * 1024);
    assert!(runtime.arena_used() > 0);

    let frame = RgbFrame::filled(20, 10, [10, 20, 30]);
    runtime.preprocess_frame(&frame.as_frame()).unwrap();
    runtime.invoke().unwrap();
    assert_eq!(f32_output(&runtime), vec![0.1, 0.6, 0.3]);
  }

  #[test]
  fn test_schema_mismatch() {
    let data = BlobWriter::new(
      TensorSpec::float32(vec![1, 4, 4, 3]),
      TensorSpec::float32(vec![3]),
    )
    .schema_version(MODEL_SCHEMA_VERSION + 1)
    .global_average_pool()
    .finish();
    assert_eq!(
      Runtime::initialize(&data, DEFAULT_ARENA_CAPACITY).err(),
      Some(ModelLoadError::SchemaMismatch {
        expected: MODEL_SCHEMA_VERSION,
        found: MODEL_SCHEMA_VERSION + 1,
      })
    );
  }

  #[test]
  fn test_arena_failures() {
    let data = scores_model(TensorSpec::float32(vec![1, 8, 8, 3]), &[0.5, 0.5]);
    assert_eq!(
      Runtime::initialize(&data, usize::MAX).err(),
      Some(ModelLoadError::ArenaAllocationFailed {
        requested: usize::MAX
      })
    );
    assert!(matches!(
      Runtime::initialize(&data, 256),
      Err(ModelLoadError::TensorBindingFailed(_))
    ));
  }

  #[test]
  fn test_binding_rejects_bad_tensors() {
    // 非三通道
    let data = scores_model(TensorSpec::float32(vec![1, 8, 8, 1]), &[0.5, 0.5]);
    assert!(matches!(
      Runtime::initialize(&data, 64 * 1024),
      Err(ModelLoadError::TensorBindingFailed(_))
    ));

    // 非正方形
    let data = scores_model(TensorSpec::float32(vec![1, 8, 6, 3]), &[0.5, 0.5]);
    assert!(matches!(
      Runtime::initialize(&data, 64 * 1024),
      Err(ModelLoadError::TensorBindingFailed(_))
    ));

    // 输出类型无法解码
    let data = BlobWriter::new(
      TensorSpec::float32(vec![1, 4, 4, 3]),
      TensorSpec::quantized(vec![3], ElementType::Int16, 0.1, 0),
    )
    .global_average_pool()
    .finish();
    assert!(matches!(
      Runtime::initialize(&data, 64 * 1024),
      Err(ModelLoadError::TensorBindingFailed(_))
    ));

    // 计算图输出与输出张量不符
    let data = BlobWriter::new(
      TensorSpec::float32(vec![1, 4, 4, 3]),
      TensorSpec::float32(vec![4]),
    )
    .global_average_pool()
    .finish();
    assert!(matches!(
      Runtime::initialize(&data, 64 * 1024),
      Err(ModelLoadError::TensorBindingFailed(_))
    ));
  }

  #[test]
  fn test_unsupported_input_type_fails_at_run_time() {
    let data = scores_model(
      TensorSpec::quantized(vec![1, 4, 4, 3], ElementType::Int16, 0.1, 0),
      &[0.5, 0.5],
    );
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    let frame = RgbFrame::filled(4, 4, [1, 1, 1]);
    assert_eq!(
      runtime.preprocess_frame(&frame.as_frame()),
      Err(PreprocessError::UnsupportedTensorType(ElementType::Int16))
    );
    assert!(matches!(
      runtime.invoke(),
      Err(InferenceError::ExecutionFailed(_))
    ));
  }

  #[test]
  fn test_non_finite_output() {
    let data = BlobWriter::new(
      TensorSpec::float32(vec![1, 2, 2, 3]),
      TensorSpec::float32(vec![1]),
    )
    .global_average_pool()
    .fully_connected(3, 1, Activation::None, &[f32::INFINITY, 0.0, 0.0], &[0.0])
    .finish();
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    runtime
      .preprocess_frame(&RgbFrame::filled(2, 2, [255, 0, 0]).as_frame())
      .unwrap();
    assert!(matches!(
      runtime.invoke(),
      Err(InferenceError::ExecutionFailed(_))
    ));
  }

  #[test]
  fn test_extreme_quantization_parameters() {
    // 输入零点远超 u8 取值范围，输出 scale 为最小次正规数
    let data = BlobWriter::new(
      TensorSpec::quantized(vec![1, 4, 4, 3], ElementType::UInt8, 1.0 / 255.0, i32::MIN),
      TensorSpec::quantized(vec![1, 3], ElementType::UInt8, f32::from_bits(1), 5),
    )
    .global_average_pool()
    .fully_connected(3, 3, Activation::None, &[0.0; 9], &[0.0, 0.25, -0.25])
    .finish();
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    runtime
      .preprocess_frame(&RgbFrame::filled(6, 6, [255, 128, 0]).as_frame())
      .unwrap();
    runtime.invoke().unwrap();
    assert_eq!(runtime.output_tensor(), &[5, 255, 0]);

    let data = BlobWriter::new(
      TensorSpec::quantized(vec![1, 4, 4, 3], ElementType::Int8, 1.0, i32::MAX),
      TensorSpec::quantized(vec![1, 2], ElementType::Int8, 0.5, i32::MIN),
    )
    .global_average_pool()
    .fully_connected(3, 2, Activation::None, &[0.0; 6], &[1.0, -1.0])
    .finish();
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    runtime
      .preprocess_frame(&RgbFrame::filled(2, 2, [0, 0, 0]).as_frame())
      .unwrap();
    runtime.invoke().unwrap();
    assert_eq!(runtime.output_tensor(), &[(-128i8) as u8, (-128i8) as u8]);
  }

  #[test]
  fn test_quantized_pipeline() {
    let data = BlobWriter::new(
      TensorSpec::quantized(vec![1, 4, 4, 3], ElementType::UInt8, 1.0 / 255.0, 0),
      TensorSpec::quantized(vec![1, 2], ElementType::UInt8, 1.0 / 256.0, 0),
    )
    .global_average_pool()
    .fully_connected(3, 2, Activation::None, &[1.0, 0.0, 0.0, 0.0, 0.0, 0.0], &[0.0, 0.25])
    .finish();
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    runtime
      .preprocess_frame(&RgbFrame::filled(3, 3, [255, 0, 0]).as_frame())
      .unwrap();
    assert!(runtime.input_tensor().chunks(3).all(|p| p == [255, 0, 0]));
    runtime.invoke().unwrap();
    // 1.0 饱和为 255, 0.25 -> 64
    assert_eq!(runtime.output_tensor(), &[255, 64]);
  }
}
