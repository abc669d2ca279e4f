// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/model/arena.rs - 张量内存池
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

use std::ops::Range;

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ArenaError {
  #[error("无法预留 {requested} 字节内存")]
  CapacityUnavailable { requested: usize },
  #[error("内存池空间不足: 请求 {requested} 字节, 剩余 {remaining} 字节")]
  Exhausted { requested: usize, remaining: usize },
}

/// 内存池中的一段区域
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Region {
  pub offset: usize,
  pub len: usize,
}

impl Region {
  pub fn end(&self) -> usize {
    self.offset + self.len
  }

  pub fn range(&self) -> Range<usize> {
    self.offset..self.end()
  }

  pub fn overlaps(&self, other: &Region) -> bool {
    self.offset < other.end() && other.offset < self.end()
  }
}

/// 固定容量的线性分配器，创建后不再扩容
///
/// 所有推理工作内存都在这里切分；分配出的区域只在 `reset` 后失效。
#[derive(Debug)]
pub struct Arena {
  buf: Box<[u8]>,
  offset: usize,
}

impl Arena {
  /// 一次性预留并清零 `capacity` 字节
  pub fn reserve(capacity: usize) -> Result<Self, ArenaError> {
    let mut buf = Vec::new();
    buf
      .try_reserve_exact(capacity)
      .map_err(|_| ArenaError::CapacityUnavailable {
        requested: capacity,
      })?;
    buf.resize(capacity, 0u8);
    Ok(Self {
      buf: buf.into_boxed_slice(),
      offset: 0,
    })
  }

  pub fn alloc(&mut self, len: usize) -> Result<Region, ArenaError> {
    if len > self.remaining() {
      return Err(ArenaError::Exhausted {
        requested: len,
        remaining: self.remaining(),
      });
    }
    let region = Region {
      offset: self.offset,
      len,
    };
    self.offset += len;
    Ok(region)
  }

  pub fn slice(&self, region: Region) -> &[u8] {
    &self.buf[region.range()]
  }

  pub fn slice_mut(&mut self, region: Region) -> &mut [u8] {
    &mut self.buf[region.range()]
  }

  /// 同时借出一段只读区域和一段可写区域，两者不得重叠
  pub fn split_pair(&mut self, src: Region, dst: Region) -> (&[u8], &mut [u8]) {
    debug_assert!(!src.overlaps(&dst), "内存池区域重叠: {:?} / {:?}", src, dst);
    if src.end() <= dst.offset {
      let (head, tail) = self.buf.split_at_mut(dst.offset);
      (&head[src.range()], &mut tail[..dst.len])
    } else {
      let (head, tail) = self.buf.split_at_mut(src.offset);
      (&tail[..src.len], &mut head[dst.range()])
    }
  }

  pub fn reset(&mut self) {
    self.offset = 0;
  }

  pub fn capacity(&self) -> usize {
    self.buf.len()
  }

  pub fn used(&self) -> usize {
    self.offset
  }

  pub fn remaining(&self) -> usize {
    self.buf.len().saturating_sub(self.offset)
  }
}
