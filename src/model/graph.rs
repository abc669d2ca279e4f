// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model/graph.rs - 计算图与参考算子
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

use thiserror::Error;
use tracing::debug;

use crate::model::{
  arena::{Arena, Region},
  blob::{Conv2DOp, FullyConnectedOp, Op, Padding},
};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("第 {index} 个算子 {op} 无效: {reason}")]
pub struct GraphError {
  pub index: usize,
  pub op: &'static str,
  pub reason: String,
}

/// HWC 激活形状
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shape3 {
  pub height: usize,
  pub width: usize,
  pub channels: usize,
}

impl Shape3 {
  pub fn new(height: usize, width: usize, channels: usize) -> Self {
    Self {
      height,
      width,
      channels,
    }
  }

  pub fn len(&self) -> usize {
    self.height * self.width * self.channels
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }
}

impl fmt::Display for Shape3 {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}x{}x{}", self.height, self.width, self.channels)
  }
}

#[inline]
pub(crate) fn load_f32(buf: &[u8], index: usize) -> f32 {
  let o = index * 4;
  f32::from_le_bytes([buf[o], buf[o + 1], buf[o + 2], buf[o + 3]])
}

#[inline]
pub(crate) fn store_f32(buf: &mut [u8], index: usize, value: f32) {
  let o = index * 4;
  buf[o..o + 4].copy_from_slice(&value.to_le_bytes());
}

#[derive(Debug)]
struct Step<'a> {
  op: Op<'a>,
  input: Shape3,
  output: Shape3,
}

/// 顺序执行的算子序列，激活值以 f32 存放在内存池的两块交替缓冲区中
#[derive(Debug)]
pub struct Graph<'a> {
  steps: Vec<Step<'a>>,
  input_shape: Shape3,
  output_shape: Shape3,
  buffers: [usize; 2],
}

fn same_padding(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
  let output = input.div_ceil(stride);
  let total = ((output - 1) * stride + kernel).saturating_sub(input);
  (output, total / 2)
}

fn infer_shape(op: &Op<'_>, input: Shape3) -> Result<Shape3, String> {
  match op {
    Op::Conv2D(conv) => {
      if input.channels != conv.in_channels {
        return Err(format!(
          "输入通道数 {} 与权重 {} 不符",
          input.channels, conv.in_channels
        ));
      }
      let (height, width) = match conv.padding {
        Padding::Valid => {
          if input.height < conv.kernel_h || input.width < conv.kernel_w {
            return Err(format!(
              "卷积核 {}x{} 大于输入 {}",
              conv.kernel_h, conv.kernel_w, input
            ));
          }
          (
            (input.height - conv.kernel_h) / conv.stride + 1,
            (input.width - conv.kernel_w) / conv.stride + 1,
          )
        }
        Padding::Same => (
          same_padding(input.height, conv.kernel_h, conv.stride).0,
          same_padding(input.width, conv.kernel_w, conv.stride).0,
        ),
      };
      Ok(Shape3::new(height, width, conv.out_channels))
    }
    Op::MaxPool2D { size, stride } => {
      if input.height < *size || input.width < *size {
        return Err(format!("池化窗口 {} 大于输入 {}", size, input));
      }
      Ok(Shape3::new(
        (input.height - size) / stride + 1,
        (input.width - size) / stride + 1,
        input.channels,
      ))
    }
    Op::GlobalAveragePool => Ok(Shape3::new(1, 1, input.channels)),
    Op::FullyConnected(fc) => {
      if input.len() != fc.in_features {
        return Err(format!(
          "输入特征数 {} 与权重 {} 不符",
          input.len(),
          fc.in_features
        ));
      }
      Ok(Shape3::new(1, 1, fc.units))
    }
    Op::Softmax => Ok(input),
  }
}

impl<'a> Graph<'a> {
  /// 逐个推导算子输出形状并检查与权重是否一致
  pub fn build(ops: Vec<Op<'a>>, input_shape: Shape3) -> Result<Self, GraphError> {
    let mut steps = Vec::with_capacity(ops.len());
    let mut shape = input_shape;
    // 输入在 0 号缓冲区，第 k 个算子写入 (k + 1) % 2 号
    let mut buffers = [input_shape.len(), 0];

    for (index, op) in ops.into_iter().enumerate() {
      let output = infer_shape(&op, shape).map_err(|reason| GraphError {
        index,
        op: op.name(),
        reason,
      })?;
      debug!("算子 {} {}: {} -> {}", index, op.name(), shape, output);
      let slot = (index + 1) % 2;
      buffers[slot] = buffers[slot].max(output.len());
      steps.push(Step {
        op,
        input: shape,
        output,
      });
      shape = output;
    }

    Ok(Graph {
      steps,
      input_shape,
      output_shape: shape,
      buffers,
    })
  }

  pub fn input_shape(&self) -> Shape3 {
    self.input_shape
  }

  pub fn output_shape(&self) -> Shape3 {
    self.output_shape
  }

  /// 两块交替缓冲区各自需要容纳的 f32 元素数
  pub fn buffer_elements(&self) -> [usize; 2] {
    self.buffers
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  /// 从 `ping` 中的输入开始执行，返回存放结果的区域
  pub fn run(&self, arena: &mut Arena, ping: Region, pong: Region) -> Region {
    let (mut src, mut dst) = (ping, pong);
    for step in &self.steps {
      let (input, output) = arena.split_pair(src, dst);
      step.execute(input, output);
      std::mem::swap(&mut src, &mut dst);
    }
    src
  }
}

impl Step<'_> {
  fn execute(&self, src: &[u8], dst: &mut [u8]) {
    match &self.op {
      Op::Conv2D(conv) => conv2d(conv, self.input, self.output, src, dst),
      Op::MaxPool2D { size, stride } => {
        max_pool2d(*size, *stride, self.input, self.output, src, dst)
      }
      Op::GlobalAveragePool => global_average_pool(self.input, src, dst),
      Op::FullyConnected(fc) => fully_connected(fc, src, dst),
      Op::Softmax => softmax(self.input, src, dst),
    }
  }
}

fn conv2d(conv: &Conv2DOp<'_>, input: Shape3, output: Shape3, src: &[u8], dst: &mut [u8]) {
  let (pad_top, pad_left) = match conv.padding {
    Padding::Valid => (0, 0),
    Padding::Same => (
      same_padding(input.height, conv.kernel_h, conv.stride).1,
      same_padding(input.width, conv.kernel_w, conv.stride).1,
    ),
  };

  for oy in 0..output.height {
    for ox in 0..output.width {
      for oc in 0..output.channels {
        let mut acc = conv.bias.get(oc);
        for ky in 0..conv.kernel_h {
          let iy = (oy * conv.stride + ky) as isize - pad_top as isize;
          if iy < 0 || iy >= input.height as isize {
            continue;
          }
          for kx in 0..conv.kernel_w {
            let ix = (ox * conv.stride + kx) as isize - pad_left as isize;
            if ix < 0 || ix >= input.width as isize {
              continue;
            }
            let in_base = (iy as usize * input.width + ix as usize) * input.channels;
            let w_base = ((oc * conv.kernel_h + ky) * conv.kernel_w + kx) * input.channels;
            for ic in 0..input.channels {
              acc += load_f32(src, in_base + ic) * conv.weights.get(w_base + ic);
            }
          }
        }
        let index = (oy * output.width + ox) * output.channels + oc;
        store_f32(dst, index, conv.activation.apply(acc));
      }
    }
  }
}

fn max_pool2d(
  size: usize,
  stride: usize,
  input: Shape3,
  output: Shape3,
  src: &[u8],
  dst: &mut [u8],
) {
  for oy in 0..output.height {
    for ox in 0..output.width {
      for c in 0..output.channels {
        let mut max = f32::NEG_INFINITY;
        for ky in 0..size {
          for kx in 0..size {
            let iy = oy * stride + ky;
            let ix = ox * stride + kx;
            max = max.max(load_f32(src, (iy * input.width + ix) * input.channels + c));
          }
        }
        store_f32(dst, (oy * output.width + ox) * output.channels + c, max);
      }
    }
  }
}

fn global_average_pool(input: Shape3, src: &[u8], dst: &mut [u8]) {
  let area = (input.height * input.width) as f32;
  for c in 0..input.channels {
    let mut sum = 0.0f32;
    for p in 0..input.height * input.width {
      sum += load_f32(src, p * input.channels + c);
    }
    store_f32(dst, c, sum / area);
  }
}

fn fully_connected(fc: &FullyConnectedOp<'_>, src: &[u8], dst: &mut [u8]) {
  for u in 0..fc.units {
    let mut acc = fc.bias.get(u);
    let base = u * fc.in_features;
    for i in 0..fc.in_features {
      acc += load_f32(src, i) * fc.weights.get(base + i);
    }
    store_f32(dst, u, fc.activation.apply(acc));
  }
}

fn softmax(input: Shape3, src: &[u8], dst: &mut [u8]) {
  let channels = input.channels;
  for p in 0..input.height * input.width {
    let base = p * channels;
    let max = (0..channels)
      .map(|c| load_f32(src, base + c))
      .fold(f32::NEG_INFINITY, f32::max);
    let mut sum = 0.0f32;
    for c in 0..channels {
      let e = (load_f32(src, base + c) - max).exp();
      store_f32(dst, base + c, e);
      sum += e;
    }
    for c in 0..channels {
      let v = load_f32(dst, base + c) / sum;
      store_f32(dst, base + c, v);
    }
  }
}
