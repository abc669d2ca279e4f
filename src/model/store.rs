// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model/store.rs - 模型文件存储
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

use std::path::Path;

use tracing::{debug, info};

use crate::model::{ModelLoadError, blob::read_schema_version};

/// 只读模型字节，加载一次后在整个进程内有效
#[derive(Debug, Clone, Copy)]
pub struct ModelStore {
  bytes: &'static [u8],
}

impl ModelStore {
  /// 用于 `include_bytes!` 嵌入的模型
  pub const fn from_static(bytes: &'static [u8]) -> Self {
    Self { bytes }
  }

  /// 读取模型文件，字节在进程结束前不会释放
  pub fn load<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
    let path = path.as_ref();
    info!("加载模型文件: {}", path.display());
    let data = std::fs::read(path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      data.len() as f64 / (1024.0 * 1024.0)
    );
    Ok(Self::from_owned(data))
  }

  pub fn from_owned(data: Vec<u8>) -> Self {
    Self {
      bytes: Box::leak(data.into_boxed_slice()),
    }
  }

  pub fn bytes(&self) -> &'static [u8] {
    self.bytes
  }

  pub fn len(&self) -> usize {
    self.bytes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.bytes.is_empty()
  }

  pub fn schema_version(&self) -> Result<u32, ModelLoadError> {
    read_schema_version(self.bytes)
  }
}
