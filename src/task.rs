// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/task.rs - 任务执行
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

use std::{thread, time::Duration};
use tracing::{info, warn};

use crate::{
  classifier::Classifier, frame::RgbFrame, model::ClassificationResult, model::Model,
  output::Render, worker::InferenceWorker,
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

pub struct OneShotTask;

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let now = std::time::Instant::now();
    let result = model.infer(&frame)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}", elapsed);
    output.render_result(&frame, &result)?;
    info!("输出完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

const WARMUP_TIMES: usize = 2;

/// 对同一帧重复推理，统计平均耗时（不含预热）
pub struct RepeatShotTask {
  repeat: usize,
}

impl Default for RepeatShotTask {
  fn default() -> Self {
    Self { repeat: 100 }
  }
}

impl RepeatShotTask {
  pub fn with_repeat(mut self, repeat: usize) -> Self {
    self.repeat = repeat;
    self
  }
}

impl<
  F,
  D,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = F>,
  M: Model<Input = F, Output = D, Error = ME>,
  O: Render<F, D, Error = RE>,
> Task<I, M, O> for RepeatShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, mut model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    info!("输入帧获取成功，开始推理...");
    let mut times = Vec::with_capacity(self.repeat);
    for i in 0..self.repeat {
      let now = std::time::Instant::now();
      let result = model.infer(&frame)?;
      let elapsed = now.elapsed();
      info!("({})推理完成，耗时: {:.2?}", i, elapsed);
      output.render_result(&frame, &result)?;
      times.push(elapsed);
    }

    if times.len() > WARMUP_TIMES {
      warn!(
        "平均推理时间: {:.2?}",
        times.iter().skip(WARMUP_TIMES).sum::<Duration>() / (times.len() - WARMUP_TIMES) as u32
      );
    } else {
      warn!("重复次数不超过 {}, 不统计平均推理时间", WARMUP_TIMES);
    }

    Ok(())
  }
}

/// 在推理线程上逐帧分类；上一帧结果返回后才取下一帧
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }
}

impl<
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbFrame>,
  O: Render<RgbFrame, ClassificationResult, Error = RE>,
> Task<I, Classifier<'static>, O> for ContinuousTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: Classifier<'static>, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    })?;

    let mut worker = InferenceWorker::spawn(model)?;
    let mut frame_index = 0usize;
    let mut invalid = 0usize;
    let mut now = std::time::Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      info!("处理第 {} 帧图像", frame_index);
      worker.submit(frame)?;
      let reply = worker.recv()?;
      if let Some(reason) = &reply.reason {
        warn!("第 {} 帧分类失败: {}", frame_index, reason);
        invalid += 1;
      }
      output.render_result(&reply.frame, &reply.result)?;
      info!(
        "推理完成，耗时: {:.2?} / {:.2?}",
        reply.elapsed,
        now.elapsed()
      );
      now = std::time::Instant::now();
      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    let classifier = worker.shutdown()?;
    info!(
      "任务完成，共 {} 帧，失败 {} 帧，分类器状态: {}",
      frame_index,
      invalid,
      classifier.model_info()
    );
    Ok(())
  }
}
