// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/classifier.rs - 分类器上下文
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

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  decode::decode_into,
  frame::{PixelFrame, RgbFrame},
  label::LabelTable,
  model::{
    ClassificationResult, DEFAULT_ARENA_CAPACITY, InferenceError, Model, ModelLoadError,
    ModelStore, Runtime,
  },
  preprocess::PreprocessError,
};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClassifyError {
  #[error("模型未加载")]
  NotInitialized,
  #[error("{0}")]
  Load(#[from] ModelLoadError),
  #[error("{0}")]
  Preprocess(#[from] PreprocessError),
  #[error("{0}")]
  Inference(#[from] InferenceError),
}

/// 分类器上下文：模型运行时、标签表与最近一次的分数
///
/// 同一时刻只允许一次推理，所有操作都需要 `&mut self`。
#[derive(Debug)]
pub struct Classifier<'m> {
  runtime: Option<Runtime<'m>>,
  labels: LabelTable,
  probabilities: Vec<f32>,
}

impl Default for Classifier<'_> {
  fn default() -> Self {
    Self::new(LabelTable::default())
  }
}

impl<'m> Classifier<'m> {
  pub fn new(labels: LabelTable) -> Self {
    Self {
      runtime: None,
      labels,
      probabilities: vec![0.0; labels.len()],
    }
  }

  /// 加载模型；已有运行时会先被释放
  pub fn initialize(&mut self, blob: &'m [u8], arena_capacity: usize) -> Result<(), ModelLoadError> {
    self.teardown();

    let runtime = Runtime::initialize(blob, arena_capacity)?;
    if runtime.output().element_count() != self.labels.len() {
      warn!(
        "模型输出 {} 个分数, 标签表有 {} 个类别",
        runtime.output().element_count(),
        self.labels.len()
      );
    }
    self.runtime = Some(runtime);
    info!("分类器: {}", self.model_info());
    Ok(())
  }

  /// 释放运行时及其内存池
  pub fn teardown(&mut self) {
    if self.runtime.take().is_some() {
      info!("释放模型运行时");
    }
  }

  pub fn is_ready(&self) -> bool {
    self.runtime.is_some()
  }

  pub fn model_info(&self) -> String {
    match &self.runtime {
      Some(runtime) => {
        let (width, height) = runtime.input_size();
        format!("Ready {}x{}", width, height)
      }
      None => "Not loaded".to_string(),
    }
  }

  pub fn try_classify(&mut self, frame: &PixelFrame<'_>) -> Result<ClassificationResult, ClassifyError> {
    let runtime = self.runtime.as_mut().ok_or(ClassifyError::NotInitialized)?;

    runtime.preprocess_frame(frame)?;

    let now = Instant::now();
    runtime.invoke()?;
    info!("推理完成，耗时: {:.2?}", now.elapsed());

    let result = decode_into(
      runtime.output(),
      runtime.output_tensor(),
      &self.labels,
      &mut self.probabilities,
    );
    debug!(
      "分类结果: {} ({:.1}%)",
      result.class_name,
      result.confidence * 100.0
    );
    Ok(result)
  }

  /// 任一阶段失败都返回无效结果并记录原因
  pub fn classify(&mut self, frame: &PixelFrame<'_>) -> ClassificationResult {
    match self.try_classify(frame) {
      Ok(result) => result,
      Err(e) => {
        error!("分类失败: {}", e);
        ClassificationResult::invalid()
      }
    }
  }

  /// 最近一次成功推理的各类别分数，尚未推理时全为 0
  pub fn probabilities(&self) -> &[f32] {
    &self.probabilities
  }

  pub fn labels(&self) -> &LabelTable {
    &self.labels
  }

  pub fn runtime(&self) -> Option<&Runtime<'m>> {
    self.runtime.as_ref()
  }
}

impl Model for Classifier<'_> {
  type Input = RgbFrame;
  type Output = ClassificationResult;
  type Error = ClassifyError;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    self.try_classify(&input.as_frame())
  }
}

#[derive(Error, Debug)]
pub enum ClassifierBuilderError {
  #[error("模型路径必须使用 {scheme} 方案, 实际为 {0}", scheme = ClassifierBuilder::SCHEME)]
  SchemeMismatch(String),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("内存池大小无效: {0}")]
  InvalidArena(String),
  #[error("模型加载错误: {0}")]
  Io(#[from] std::io::Error),
  #[error("{0}")]
  Load(#[from] ModelLoadError),
}

/// 从 `model:///path/to/model.cym?arena=1331200` 构建就绪的分类器
#[derive(Debug, Clone)]
pub struct ClassifierBuilder {
  model_path: String,
  arena_capacity: usize,
  labels: LabelTable,
}

impl FromUrlWithScheme for ClassifierBuilder {
  const SCHEME: &'static str = "model";
}

impl FromUrl for ClassifierBuilder {
  type Error = ClassifierBuilderError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(ClassifierBuilderError::SchemeMismatch(
        url.scheme().to_string(),
      ));
    }

    let model_path = urlencoding::decode(url.path())
      .map_err(|e| ClassifierBuilderError::ModelPathError(e.to_string()))?
      .into_owned();
    if model_path.is_empty() {
      return Err(ClassifierBuilderError::ModelPathError(
        "模型路径为空".to_string(),
      ));
    }

    let mut arena_capacity = DEFAULT_ARENA_CAPACITY;
    for (k, v) in url.query_pairs() {
      if k == "arena" {
        arena_capacity = v
          .parse()
          .map_err(|_| ClassifierBuilderError::InvalidArena(v.to_string()))?;
      }
    }

    Ok(ClassifierBuilder {
      model_path,
      arena_capacity,
      labels: LabelTable::default(),
    })
  }
}

impl ClassifierBuilder {
  pub fn arena_capacity(mut self, capacity: usize) -> Self {
    self.arena_capacity = capacity;
    self
  }

  pub fn labels(mut self, labels: LabelTable) -> Self {
    self.labels = labels;
    self
  }

  pub fn model_path(&self) -> &str {
    &self.model_path
  }

  pub fn build(self) -> Result<Classifier<'static>, ClassifierBuilderError> {
    let store = ModelStore::load(&self.model_path)?;
    debug!("模型格式版本: {:?}", store.schema_version());

    let mut classifier = Classifier::new(self.labels);
    classifier.initialize(store.bytes(), self.arena_capacity)?;
    info!("模型加载完成");
    Ok(classifier)
  }
}
