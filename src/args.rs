// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/args.rs - 项目参数配置
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

use clap::Parser;
use url::Url;

/// Caiyuan 蔬菜识别
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型路径，例如 model:///opt/caiyuan/vegetable.cym?arena=1331200
  #[arg(long, value_name = "MODEL")]
  pub model: Url,

  /// 输入来源
  /// 支持格式:
  /// - 图片: image:///path/to/a.jpg
  /// - 图片目录: folder:///path/to/dir
  /// - 原始帧: raw:///path/to/frame.rgb?width=320&height=240
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 结果输出
  /// 支持格式:
  /// - 日志: log://
  /// - JSON Lines: jsonl:///path/to/results.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "log://")]
  pub output: Url,
}
