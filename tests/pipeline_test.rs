// 该文件是 Caiyuan （菜园） 项目的一部分。
// tests/pipeline_test.rs - 端到端分类流程测试
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

use caiyuan::{
  classifier::{Classifier, ClassifyError},
  decode::argmax,
  frame::{PixelFrame, RgbFrame},
  label::LabelTable,
  model::{
    ClassificationResult, DEFAULT_ARENA_CAPACITY, ModelLoadError, ModelStore, Runtime,
    blob::{Activation, BlobWriter, Conv2DSpec, MODEL_SCHEMA_VERSION, Padding, TensorSpec},
  },
  preprocess::PreprocessError,
  tensor::ElementType,
  worker::InferenceWorker,
};

const SCENARIO_SCORES: [f32; 6] = [0.05, 0.05, 0.05, 0.7, 0.1, 0.05];

/// 全局平均池化后接零权重全连接层，输出恒等于偏置
fn constant_scores_model(input: TensorSpec, output: TensorSpec, scores: &[f32]) -> Vec<u8> {
  let n = scores.len();
  BlobWriter::new(input, output)
    .global_average_pool()
    .fully_connected(3, n, Activation::None, &vec![0.0; 3 * n], scores)
    .finish()
}

fn vegetable_model(size: usize) -> Vec<u8> {
  constant_scores_model(
    TensorSpec::float32(vec![1, size, size, 3]),
    TensorSpec::float32(vec![1, 6]),
    &SCENARIO_SCORES,
  )
}

// =============================================================================
// 完整流程
// =============================================================================

#[test]
fn test_float_model_classifies_tomato() {
  let data = vegetable_model(224);
  let mut classifier = Classifier::new(LabelTable::VEGETABLES);
  classifier.initialize(&data, DEFAULT_ARENA_CAPACITY).unwrap();
  assert_eq!(classifier.model_info(), "Ready 224x224");

  let frame = RgbFrame::filled(320, 240, [90, 160, 30]);
  let result = classifier.classify(&frame.as_frame());
  assert_eq!(result.class_index, Some(3));
  assert_eq!(result.class_name, "tomato");
  assert!((result.confidence - 0.7).abs() < 1e-6);
  assert!(result.valid);
  assert_eq!(classifier.probabilities(), &SCENARIO_SCORES);
}

#[test]
fn test_schema_mismatch_reserves_nothing() {
  let data = BlobWriter::new(
    TensorSpec::float32(vec![1, 224, 224, 3]),
    TensorSpec::float32(vec![6]),
  )
  .schema_version(MODEL_SCHEMA_VERSION + 1)
  .global_average_pool()
  .finish();

  // 即使请求无法满足的内存池大小，也先报告版本不符
  assert_eq!(
    Runtime::initialize(&data, usize::MAX).err(),
    Some(ModelLoadError::SchemaMismatch {
      expected: MODEL_SCHEMA_VERSION,
      found: MODEL_SCHEMA_VERSION + 1,
    })
  );

  let mut classifier = Classifier::default();
  assert!(classifier.initialize(&data, DEFAULT_ARENA_CAPACITY).is_err());
  assert!(!classifier.is_ready());
  assert_eq!(classifier.model_info(), "Not loaded");
  assert_eq!(
    classifier.classify(&RgbFrame::filled(2, 2, [0, 0, 0]).as_frame()),
    ClassificationResult::invalid()
  );
}

#[test]
fn test_empty_frame_leaves_input_tensor() {
  let data = constant_scores_model(
    TensorSpec::quantized(vec![1, 16, 16, 3], ElementType::UInt8, 1.0 / 255.0, 0),
    TensorSpec::float32(vec![6]),
    &SCENARIO_SCORES,
  );
  let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
  runtime
    .preprocess_frame(&RgbFrame::filled(5, 5, [17, 34, 51]).as_frame())
    .unwrap();
  let before = runtime.input_tensor().to_vec();

  assert_eq!(
    runtime.preprocess_frame(&PixelFrame::new(&[], 0, 0)),
    Err(PreprocessError::EmptyFrame)
  );
  assert_eq!(runtime.input_tensor(), before.as_slice());
}

#[test]
fn test_white_pixel_encoding() {
  for (element_type, zero_point, expected) in [
    (ElementType::UInt8, 0, 255u8),
    (ElementType::Int8, -128, 127i8 as u8),
  ] {
    let data = constant_scores_model(
      TensorSpec::quantized(vec![1, 4, 4, 3], element_type, 1.0 / 255.0, zero_point),
      TensorSpec::float32(vec![6]),
      &SCENARIO_SCORES,
    );
    let mut runtime = Runtime::initialize(&data, 64 * 1024).unwrap();
    runtime
      .preprocess_frame(&RgbFrame::filled(1, 1, [255, 255, 255]).as_frame())
      .unwrap();
    assert!(runtime.input_tensor().iter().all(|&v| v == expected));
  }
}

#[test]
fn test_first_maximum_wins() {
  assert_eq!(argmax(&[0.5, 0.5, 0.2]), Some(0));

  let data = constant_scores_model(
    TensorSpec::float32(vec![1, 4, 4, 3]),
    TensorSpec::float32(vec![6]),
    &[0.1, 0.4, 0.1, 0.4, 0.0, 0.0],
  );
  let mut classifier = Classifier::default();
  classifier.initialize(&data, 64 * 1024).unwrap();
  let result = classifier.classify(&RgbFrame::filled(3, 3, [1, 1, 1]).as_frame());
  assert_eq!(result.class_name, "lemon");
}

#[test]
fn test_int8_quantized_output() {
  // 输出 scale 1/256, zero_point -128: 0.7 -> round(179.2) - 128 = 51
  let data = constant_scores_model(
    TensorSpec::quantized(vec![1, 8, 8, 3], ElementType::Int8, 1.0 / 255.0, -128),
    TensorSpec::quantized(vec![1, 6], ElementType::Int8, 1.0 / 256.0, -128),
    &SCENARIO_SCORES,
  );
  let mut classifier = Classifier::default();
  classifier.initialize(&data, 64 * 1024).unwrap();
  let result = classifier.classify(&RgbFrame::filled(10, 10, [200, 100, 0]).as_frame());
  assert_eq!(result.class_index, Some(3));
  assert!((result.confidence - 0.7).abs() <= 1.0 / 256.0);
}

#[test]
fn test_output_quantization_at_range_edges() {
  let frame = RgbFrame::filled(10, 10, [10, 20, 30]);

  // 零点为 i32::MIN: 所有分数截断到 0，反量化为 2^31 * scale
  let data = constant_scores_model(
    TensorSpec::float32(vec![1, 8, 8, 3]),
    TensorSpec::quantized(vec![1, 6], ElementType::UInt8, 1.0 / 256.0, i32::MIN),
    &SCENARIO_SCORES,
  );
  let mut classifier = Classifier::default();
  classifier.initialize(&data, 64 * 1024).unwrap();
  let result = classifier.classify(&frame.as_frame());
  assert!(result.valid);
  assert_eq!(result.class_index, Some(0));
  assert_eq!(result.confidence, 8_388_608.0);

  // 最小次正规 scale: 所有正分数饱和到 255
  let data = constant_scores_model(
    TensorSpec::float32(vec![1, 8, 8, 3]),
    TensorSpec::quantized(vec![1, 6], ElementType::UInt8, f32::from_bits(1), 5),
    &SCENARIO_SCORES,
  );
  classifier.initialize(&data, 64 * 1024).unwrap();
  let result = classifier.classify(&frame.as_frame());
  assert!(result.valid);
  assert_eq!(result.class_index, Some(0));
  assert!(classifier.probabilities().iter().all(|&p| p > 0.0));
}

#[test]
fn test_oversized_frame_dimensions_rejected() {
  let data = vegetable_model(8);
  let mut classifier = Classifier::default();
  classifier.initialize(&data, 64 * 1024).unwrap();

  let pixels = [0u8; 12];
  let frame = PixelFrame::new(&pixels, usize::MAX / 2, 3);
  assert!(matches!(
    classifier.try_classify(&frame),
    Err(ClassifyError::Preprocess(PreprocessError::FrameSizeMismatch { .. }))
  ));
  assert_eq!(classifier.classify(&frame), ClassificationResult::invalid());
}

#[test]
fn test_convolution_model() {
  // 1x1 卷积把红色通道送往第 0 类、绿色送往第 1 类、蓝色送往第 2 类，再 softmax
  let mut weights = vec![0.0f32; 6 * 3];
  for c in 0..3 {
    weights[c * 3 + c] = 10.0;
  }
  let data = BlobWriter::new(
    TensorSpec::quantized(vec![1, 12, 12, 3], ElementType::UInt8, 1.0 / 255.0, 0),
    TensorSpec::float32(vec![1, 6]),
  )
  .conv2d(&Conv2DSpec {
    in_channels: 3,
    out_channels: 6,
    kernel: (1, 1),
    stride: 1,
    padding: Padding::Same,
    activation: Activation::Relu,
    weights,
    bias: vec![0.0; 6],
  })
  .max_pool2d(2, 2)
  .global_average_pool()
  .softmax()
  .finish();

  let mut classifier = Classifier::default();
  classifier.initialize(&data, DEFAULT_ARENA_CAPACITY).unwrap();

  let green = classifier.classify(&RgbFrame::filled(40, 30, [0, 255, 0]).as_frame());
  assert_eq!(green.class_name, "lemon");
  let sum: f32 = classifier.probabilities().iter().sum();
  assert!((sum - 1.0).abs() < 1e-5);

  let blue = classifier.classify(&RgbFrame::filled(7, 9, [0, 0, 255]).as_frame());
  assert_eq!(blue.class_name, "cucumber");
  assert!(blue.confidence > 0.99);
}

// =============================================================================
// 生命周期
// =============================================================================

#[test]
fn test_arena_too_small_then_retry() {
  let data = vegetable_model(32);
  let mut classifier = Classifier::default();
  assert!(matches!(
    classifier.initialize(&data, 1024),
    Err(ModelLoadError::TensorBindingFailed(_))
  ));
  assert!(!classifier.is_ready());

  classifier.initialize(&data, DEFAULT_ARENA_CAPACITY).unwrap();
  assert!(classifier.is_ready());
  let runtime = classifier.runtime().unwrap();
  assert_eq!(runtime.arena_capacity(), DEFAULT_ARENA_CAPACITY);
  assert!(runtime.arena_used() <= runtime.arena_capacity());
}

#[test]
fn test_try_classify_reports_reason() {
  let data = vegetable_model(8);
  let mut classifier = Classifier::default();
  classifier.initialize(&data, 64 * 1024).unwrap();

  let short = [0u8; 5];
  assert_eq!(
    classifier.try_classify(&PixelFrame::new(&short, 2, 2)),
    Err(ClassifyError::Preprocess(PreprocessError::FrameSizeMismatch {
      expected: 12,
      actual: 5
    }))
  );
  let result = classifier.classify(&PixelFrame::new(&short, 2, 2));
  assert!(!result.is_valid());
  assert_eq!(result.confidence, 0.0);
}

#[test]
fn test_worker_round_trip() {
  let store = ModelStore::from_owned(vegetable_model(16));
  let mut classifier = Classifier::new(LabelTable::VEGETABLES);
  classifier.initialize(store.bytes(), 64 * 1024).unwrap();

  let mut worker = InferenceWorker::spawn(classifier).unwrap();
  for frame in [
    RgbFrame::filled(4, 4, [1, 2, 3]),
    RgbFrame::with_shape(0, 0),
    RgbFrame::filled(64, 48, [200, 200, 200]),
  ] {
    let empty = frame.width() == 0;
    worker.submit(frame).unwrap();
    let reply = worker.recv().unwrap();
    assert_eq!(reply.result.valid, !empty);
    assert_eq!(reply.reason.is_some(), empty);
  }
  let classifier = worker.shutdown().unwrap();
  assert!(classifier.is_ready());
}
