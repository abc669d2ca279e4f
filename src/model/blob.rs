// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model/blob.rs - 模型文件格式
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

//! 模型文件布局（小端序）:
//!
//! ```text
//! magic            "CYML"
//! schema_version   u32
//! input  tensor    rank u8, dims u32 * rank, type u8, scale f32, zero_point i32
//! output tensor    同上
//! op_count         u32
//! ops              opcode u8, 参数, f32 权重
//! ```

use std::fmt;
use std::io::Cursor;

use byteorder::{LittleEndian, ReadBytesExt};
use tracing::debug;

use crate::{
  model::ModelLoadError,
  tensor::{ElementType, Quantization, TensorDescriptor},
};

pub const MODEL_MAGIC: [u8; 4] = *b"CYML";
pub const MODEL_SCHEMA_VERSION: u32 = 3;

const MAX_TENSOR_RANK: usize = 8;

const OP_CONV2D: u8 = 1;
const OP_MAX_POOL2D: u8 = 2;
const OP_GLOBAL_AVERAGE_POOL: u8 = 3;
const OP_FULLY_CONNECTED: u8 = 4;
const OP_SOFTMAX: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activation {
  #[default]
  None,
  Relu,
  Relu6,
}

impl Activation {
  pub fn from_code(code: u8) -> Option<Self> {
    match code {
      0 => Some(Activation::None),
      1 => Some(Activation::Relu),
      2 => Some(Activation::Relu6),
      _ => None,
    }
  }

  pub fn code(self) -> u8 {
    match self {
      Activation::None => 0,
      Activation::Relu => 1,
      Activation::Relu6 => 2,
    }
  }

  #[inline]
  pub fn apply(self, value: f32) -> f32 {
    match self {
      Activation::None => value,
      Activation::Relu => value.max(0.0),
      Activation::Relu6 => value.clamp(0.0, 6.0),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Padding {
  #[default]
  Valid,
  Same,
}

impl Padding {
  pub fn from_code(code: u8) -> Option<Self> {
    match code {
      0 => Some(Padding::Valid),
      1 => Some(Padding::Same),
      _ => None,
    }
  }

  pub fn code(self) -> u8 {
    match self {
      Padding::Valid => 0,
      Padding::Same => 1,
    }
  }
}

/// 模型文件内的 f32 权重，原地读取不复制
#[derive(Clone, Copy)]
pub struct Weights<'a> {
  bytes: &'a [u8],
}

impl<'a> Weights<'a> {
  pub fn len(&self) -> usize {
    self.bytes.len() / 4
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  #[inline]
  pub fn get(&self, index: usize) -> f32 {
    let o = index * 4;
    f32::from_le_bytes([
      self.bytes[o],
      self.bytes[o + 1],
      self.bytes[o + 2],
      self.bytes[o + 3],
    ])
  }
}

impl fmt::Debug for Weights<'_> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Weights[{}]", self.len())
  }
}

/// 模型文件中记录的张量规格
#[derive(Debug, Clone, PartialEq)]
pub struct TensorSpec {
  pub shape: Vec<usize>,
  pub element_type: ElementType,
  pub scale: f32,
  pub zero_point: i32,
}

impl TensorSpec {
  pub fn float32(shape: Vec<usize>) -> Self {
    Self {
      shape,
      element_type: ElementType::Float32,
      scale: 0.0,
      zero_point: 0,
    }
  }

  pub fn quantized(shape: Vec<usize>, element_type: ElementType, scale: f32, zero_point: i32) -> Self {
    Self {
      shape,
      element_type,
      scale,
      zero_point,
    }
  }

  pub fn descriptor(&self) -> TensorDescriptor {
    TensorDescriptor::new(
      self.shape.clone(),
      self.element_type,
      Quantization::new(self.scale, self.zero_point),
    )
  }
}

#[derive(Debug, Clone)]
pub struct Conv2DOp<'a> {
  pub in_channels: usize,
  pub out_channels: usize,
  pub kernel_h: usize,
  pub kernel_w: usize,
  pub stride: usize,
  pub padding: Padding,
  pub activation: Activation,
  /// [out][kh][kw][in]
  pub weights: Weights<'a>,
  pub bias: Weights<'a>,
}

#[derive(Debug, Clone)]
pub struct FullyConnectedOp<'a> {
  pub in_features: usize,
  pub units: usize,
  pub activation: Activation,
  /// [units][in]
  pub weights: Weights<'a>,
  pub bias: Weights<'a>,
}

#[derive(Debug, Clone)]
pub enum Op<'a> {
  Conv2D(Conv2DOp<'a>),
  MaxPool2D { size: usize, stride: usize },
  GlobalAveragePool,
  FullyConnected(FullyConnectedOp<'a>),
  Softmax,
}

impl Op<'_> {
  pub fn name(&self) -> &'static str {
    match self {
      Op::Conv2D(_) => "CONV_2D",
      Op::MaxPool2D { .. } => "MAX_POOL_2D",
      Op::GlobalAveragePool => "GLOBAL_AVERAGE_POOL",
      Op::FullyConnected(_) => "FULLY_CONNECTED",
      Op::Softmax => "SOFTMAX",
    }
  }
}

/// 解析后的模型，权重借用自原始字节
#[derive(Debug, Clone)]
pub struct ModelBlob<'a> {
  pub schema_version: u32,
  pub input: TensorSpec,
  pub output: TensorSpec,
  pub ops: Vec<Op<'a>>,
}

fn malformed(msg: impl Into<String>) -> ModelLoadError {
  ModelLoadError::Malformed(msg.into())
}

pub(crate) fn element_product(dims: &[usize]) -> Result<usize, ModelLoadError> {
  dims
    .iter()
    .try_fold(1usize, |acc, &d| acc.checked_mul(d))
    .ok_or_else(|| malformed("权重数量溢出"))
}

struct Reader<'a> {
  data: &'a [u8],
  cursor: Cursor<&'a [u8]>,
}

impl<'a> Reader<'a> {
  fn new(data: &'a [u8]) -> Self {
    Self {
      data,
      cursor: Cursor::new(data),
    }
  }

  fn u8(&mut self) -> Result<u8, ModelLoadError> {
    self
      .cursor
      .read_u8()
      .map_err(|_| malformed("模型数据截断"))
  }

  fn u32(&mut self) -> Result<u32, ModelLoadError> {
    self
      .cursor
      .read_u32::<LittleEndian>()
      .map_err(|_| malformed("模型数据截断"))
  }

  fn dim(&mut self, what: &str) -> Result<usize, ModelLoadError> {
    match self.u32()? {
      0 => Err(malformed(format!("{} 不能为 0", what))),
      v => Ok(v as usize),
    }
  }

  fn i32(&mut self) -> Result<i32, ModelLoadError> {
    self
      .cursor
      .read_i32::<LittleEndian>()
      .map_err(|_| malformed("模型数据截断"))
  }

  fn f32(&mut self) -> Result<f32, ModelLoadError> {
    self
      .cursor
      .read_f32::<LittleEndian>()
      .map_err(|_| malformed("模型数据截断"))
  }

  fn weights(&mut self, count: usize) -> Result<Weights<'a>, ModelLoadError> {
    let start = self.cursor.position() as usize;
    let end = count
      .checked_mul(4)
      .and_then(|len| start.checked_add(len))
      .filter(|&end| end <= self.data.len())
      .ok_or_else(|| malformed(format!("权重数据截断: 需要 {} 个元素", count)))?;
    self.cursor.set_position(end as u64);
    Ok(Weights {
      bytes: &self.data[start..end],
    })
  }

  fn activation(&mut self) -> Result<Activation, ModelLoadError> {
    let code = self.u8()?;
    Activation::from_code(code).ok_or_else(|| malformed(format!("未知激活函数: {}", code)))
  }

  fn tensor_spec(&mut self) -> Result<TensorSpec, ModelLoadError> {
    let rank = self.u8()? as usize;
    if rank == 0 || rank > MAX_TENSOR_RANK {
      return Err(malformed(format!("张量维数无效: {}", rank)));
    }
    let mut shape = Vec::with_capacity(rank);
    for _ in 0..rank {
      shape.push(self.dim("张量维度")?);
    }
    let code = self.u8()?;
    let element_type =
      ElementType::from_code(code).ok_or_else(|| malformed(format!("未知张量类型: {}", code)))?;
    let scale = self.f32()?;
    let zero_point = self.i32()?;
    Ok(TensorSpec {
      shape,
      element_type,
      scale,
      zero_point,
    })
  }

  fn op(&mut self) -> Result<Op<'a>, ModelLoadError> {
    let opcode = self.u8()?;
    match opcode {
      OP_CONV2D => {
        let in_channels = self.dim("输入通道数")?;
        let out_channels = self.dim("输出通道数")?;
        let kernel_h = self.dim("卷积核高度")?;
        let kernel_w = self.dim("卷积核宽度")?;
        let stride = self.dim("步长")?;
        let code = self.u8()?;
        let padding =
          Padding::from_code(code).ok_or_else(|| malformed(format!("未知填充方式: {}", code)))?;
        let activation = self.activation()?;
        let weights = self.weights(element_product(&[out_channels, kernel_h, kernel_w, in_channels])?)?;
        let bias = self.weights(out_channels)?;
        Ok(Op::Conv2D(Conv2DOp {
          in_channels,
          out_channels,
          kernel_h,
          kernel_w,
          stride,
          padding,
          activation,
          weights,
          bias,
        }))
      }
      OP_MAX_POOL2D => {
        let size = self.dim("池化窗口")?;
        let stride = self.dim("步长")?;
        Ok(Op::MaxPool2D { size, stride })
      }
      OP_GLOBAL_AVERAGE_POOL => Ok(Op::GlobalAveragePool),
      OP_FULLY_CONNECTED => {
        let in_features = self.dim("输入特征数")?;
        let units = self.dim("输出单元数")?;
        let activation = self.activation()?;
        let weights = self.weights(element_product(&[units, in_features])?)?;
        let bias = self.weights(units)?;
        Ok(Op::FullyConnected(FullyConnectedOp {
          in_features,
          units,
          activation,
          weights,
          bias,
        }))
      }
      OP_SOFTMAX => Ok(Op::Softmax),
      other => Err(malformed(format!("未知算子: {}", other))),
    }
  }
}

/// 只读取文件头中的版本号
pub fn read_schema_version(data: &[u8]) -> Result<u32, ModelLoadError> {
  if data.len() < MODEL_MAGIC.len() || data[..MODEL_MAGIC.len()] != MODEL_MAGIC {
    return Err(malformed("模型文件标识不匹配"));
  }
  let mut reader = Reader::new(&data[MODEL_MAGIC.len()..]);
  reader.u32()
}

impl<'a> ModelBlob<'a> {
  pub fn parse(data: &'a [u8]) -> Result<Self, ModelLoadError> {
    let schema_version = read_schema_version(data)?;
    if schema_version != MODEL_SCHEMA_VERSION {
      return Err(ModelLoadError::SchemaMismatch {
        expected: MODEL_SCHEMA_VERSION,
        found: schema_version,
      });
    }

    let mut reader = Reader::new(data);
    reader.cursor.set_position((MODEL_MAGIC.len() + 4) as u64);

    let input = reader.tensor_spec()?;
    let output = reader.tensor_spec()?;
    let op_count = reader.u32()? as usize;
    debug!("模型算子数量: {}", op_count);

    let mut ops = Vec::new();
    for _ in 0..op_count {
      ops.push(reader.op()?);
    }

    if (reader.cursor.position() as usize) != data.len() {
      return Err(malformed(format!(
        "模型末尾有 {} 字节多余数据",
        data.len() - reader.cursor.position() as usize
      )));
    }

    Ok(ModelBlob {
      schema_version,
      input,
      output,
      ops,
    })
  }
}

/// 卷积层参数，供 [`BlobWriter::conv2d`] 使用
#[derive(Debug, Clone, Default)]
pub struct Conv2DSpec {
  pub in_channels: usize,
  pub out_channels: usize,
  pub kernel: (usize, usize),
  pub stride: usize,
  pub padding: Padding,
  pub activation: Activation,
  pub weights: Vec<f32>,
  pub bias: Vec<f32>,
}

/// 按上述布局序列化模型，用于内置演示模型和测试夹具
#[derive(Debug, Clone)]
pub struct BlobWriter {
  schema_version: u32,
  input: TensorSpec,
  output: TensorSpec,
  op_count: u32,
  ops: Vec<u8>,
}

impl BlobWriter {
  pub fn new(input: TensorSpec, output: TensorSpec) -> Self {
    Self {
      schema_version: MODEL_SCHEMA_VERSION,
      input,
      output,
      op_count: 0,
      ops: Vec::new(),
    }
  }

  pub fn schema_version(mut self, version: u32) -> Self {
    self.schema_version = version;
    self
  }

  pub fn conv2d(mut self, spec: &Conv2DSpec) -> Self {
    self.ops.push(OP_CONV2D);
    for v in [
      spec.in_channels,
      spec.out_channels,
      spec.kernel.0,
      spec.kernel.1,
      spec.stride,
    ] {
      put_u32(&mut self.ops, v as u32);
    }
    self.ops.push(spec.padding.code());
    self.ops.push(spec.activation.code());
    put_f32s(&mut self.ops, &spec.weights);
    put_f32s(&mut self.ops, &spec.bias);
    self.op_count += 1;
    self
  }

  pub fn max_pool2d(mut self, size: usize, stride: usize) -> Self {
    self.ops.push(OP_MAX_POOL2D);
    put_u32(&mut self.ops, size as u32);
    put_u32(&mut self.ops, stride as u32);
    self.op_count += 1;
    self
  }

  pub fn global_average_pool(mut self) -> Self {
    self.ops.push(OP_GLOBAL_AVERAGE_POOL);
    self.op_count += 1;
    self
  }

  pub fn fully_connected(
    mut self,
    in_features: usize,
    units: usize,
    activation: Activation,
    weights: &[f32],
    bias: &[f32],
  ) -> Self {
    self.ops.push(OP_FULLY_CONNECTED);
    put_u32(&mut self.ops, in_features as u32);
    put_u32(&mut self.ops, units as u32);
    self.ops.push(activation.code());
    put_f32s(&mut self.ops, weights);
    put_f32s(&mut self.ops, bias);
    self.op_count += 1;
    self
  }

  pub fn softmax(mut self) -> Self {
    self.ops.push(OP_SOFTMAX);
    self.op_count += 1;
    self
  }

  pub fn finish(self) -> Vec<u8> {
    let mut out = Vec::with_capacity(64 + self.ops.len());
    out.extend_from_slice(&MODEL_MAGIC);
    put_u32(&mut out, self.schema_version);
    put_tensor_spec(&mut out, &self.input);
    put_tensor_spec(&mut out, &self.output);
    put_u32(&mut out, self.op_count);
    out.extend_from_slice(&self.ops);
    out
  }
}

fn put_u32(out: &mut Vec<u8>, v: u32) {
  out.extend_from_slice(&v.to_le_bytes());
}

fn put_f32s(out: &mut Vec<u8>, values: &[f32]) {
  for v in values {
    out.extend_from_slice(&v.to_le_bytes());
  }
}

fn put_tensor_spec(out: &mut Vec<u8>, spec: &TensorSpec) {
  out.push(spec.shape.len() as u8);
  for &d in &spec.shape {
    put_u32(out, d as u32);
  }
  out.push(spec.element_type.code());
  out.extend_from_slice(&spec.scale.to_le_bytes());
  out.extend_from_slice(&spec.zero_point.to_le_bytes());
}
