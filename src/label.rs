// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/label.rs - 类别标签表
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

/// 蔬菜类别，顺序必须与训练时的 labels.txt 一致
pub const VEGETABLE_LABELS: [&str; 6] = ["eggplant", "lemon", "cucumber", "tomato", "onion", "none"];

/// 只读的有序标签表，所有下标访问都做范围检查
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelTable {
  names: &'static [&'static str],
}

impl LabelTable {
  pub const VEGETABLES: LabelTable = LabelTable {
    names: &VEGETABLE_LABELS,
  };

  /// 空表返回 None
  pub fn new(names: &'static [&'static str]) -> Option<Self> {
    if names.is_empty() {
      None
    } else {
      Some(Self { names })
    }
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn get(&self, index: usize) -> Option<&'static str> {
    self.names.get(index).copied()
  }

  pub fn position(&self, name: &str) -> Option<usize> {
    self.names.iter().position(|&n| n == name)
  }

  pub fn iter(&self) -> impl Iterator<Item = &'static str> + '_ {
    self.names.iter().copied()
  }
}

impl Default for LabelTable {
  fn default() -> Self {
    Self::VEGETABLES
  }
}
