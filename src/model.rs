// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model.rs - 模型
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

use serde::Serialize;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&mut self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 单帧分类结果
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ClassificationResult {
  pub class_index: Option<usize>,
  pub class_name: &'static str,
  pub confidence: f32,
  pub valid: bool,
}

impl ClassificationResult {
  pub const UNKNOWN_CLASS: &'static str = "unknown";

  /// 任一阶段失败时返回的结果
  pub const fn invalid() -> Self {
    Self {
      class_index: None,
      class_name: Self::UNKNOWN_CLASS,
      confidence: 0.0,
      valid: false,
    }
  }

  pub fn is_valid(&self) -> bool {
    self.valid
  }
}

impl Default for ClassificationResult {
  fn default() -> Self {
    Self::invalid()
  }
}

pub mod arena;
pub mod blob;
pub mod graph;
mod runtime;
mod store;

pub use self::runtime::{DEFAULT_ARENA_CAPACITY, InferenceError, ModelLoadError, Runtime};
pub use self::store::ModelStore;
