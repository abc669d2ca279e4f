// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/decode.rs - 输出张量解码
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

use tracing::{debug, error};

use crate::{label::LabelTable, model::ClassificationResult, tensor::TensorDescriptor};

/// 将输出张量反量化为 `class_count` 个分数
///
/// 运行时给出的元素多于类别数时忽略多余部分，不足时其余分数为 0。
pub fn dequantize_scores(
  output: &TensorDescriptor,
  data: &[u8],
  class_count: usize,
  scores: &mut Vec<f32>,
) {
  scores.clear();
  scores.resize(class_count, 0.0);

  let Some(codec) = output.codec() else {
    error!("输出张量类型 {} 无法解码", output.element_type());
    return;
  };

  let available = output.element_count().min(class_count);
  for (score, raw) in scores
    .iter_mut()
    .zip(data.chunks_exact(output.element_type().size()))
    .take(available)
  {
    *score = codec.dequantize(raw);
  }
}

/// 最大值下标，相同时取最先出现者；NaN 不参与比较
pub fn argmax(scores: &[f32]) -> Option<usize> {
  let mut best: Option<(usize, f32)> = None;
  for (i, &score) in scores.iter().enumerate() {
    if score.is_nan() {
      continue;
    }
    match best {
      Some((_, max)) if score <= max => {}
      _ => best = Some((i, score)),
    }
  }
  best.map(|(i, _)| i)
}

/// 从分数中选出最可能的类别
pub fn select(scores: &[f32], labels: &LabelTable) -> ClassificationResult {
  let Some(index) = argmax(scores) else {
    return ClassificationResult::invalid();
  };
  let class_name = labels
    .get(index)
    .unwrap_or(ClassificationResult::UNKNOWN_CLASS);
  ClassificationResult {
    class_index: Some(index),
    class_name,
    confidence: scores[index],
    valid: true,
  }
}

/// 解码推理后的输出张量，分数写入 `scores` 供调用方保留
pub fn decode_into(
  output: &TensorDescriptor,
  data: &[u8],
  labels: &LabelTable,
  scores: &mut Vec<f32>,
) -> ClassificationResult {
  dequantize_scores(output, data, labels.len(), scores);
  for (name, score) in labels.iter().zip(scores.iter()) {
    debug!("  {}: {:.1}%", name, score * 100.0);
  }
  select(scores, labels)
}

pub fn decode(output: &TensorDescriptor, data: &[u8], labels: &LabelTable) -> ClassificationResult {
  let mut scores = Vec::with_capacity(labels.len());
  decode_into(output, data, labels, &mut scores)
}
