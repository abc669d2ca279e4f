// 该文件是 Caiyuan （菜园） 项目的一部分。
// src/worker.rs - 后台推理线程
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

use std::{
  sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError},
  thread::{self, JoinHandle},
  time::{Duration, Instant},
};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{classifier::Classifier, frame::RgbFrame, model::ClassificationResult};

const WORKER_THREAD_NAME: &str = "caiyuan-infer";

#[derive(Error, Debug)]
pub enum WorkerError {
  #[error("推理线程忙，上一帧尚未完成")]
  Busy,
  #[error("推理线程已退出")]
  Disconnected,
  #[error("无法创建推理线程: {0}")]
  Spawn(#[from] std::io::Error),
}

/// 一次推理的结果，原始帧随结果一并归还
#[derive(Debug)]
pub struct WorkerReply {
  pub frame: RgbFrame,
  pub result: ClassificationResult,
  /// 失败原因，成功时为 None
  pub reason: Option<String>,
  pub elapsed: Duration,
}

/// 在独立线程上运行分类器，调用方通过通道提交帧并取回结果
///
/// 同一时刻只有一帧在推理中，推理期间内存池只被工作线程访问。
pub struct InferenceWorker {
  requests: Option<Sender<RgbFrame>>,
  replies: Receiver<WorkerReply>,
  handle: Option<JoinHandle<Classifier<'static>>>,
  in_flight: bool,
}

impl InferenceWorker {
  pub fn spawn(mut classifier: Classifier<'static>) -> Result<Self, WorkerError> {
    let (request_tx, request_rx) = mpsc::channel::<RgbFrame>();
    let (reply_tx, reply_rx) = mpsc::channel();

    let handle = thread::Builder::new()
      .name(WORKER_THREAD_NAME.to_string())
      .spawn(move || {
        info!("推理线程启动");
        for frame in request_rx {
          let now = Instant::now();
          let (result, reason) = match classifier.try_classify(&frame.as_frame()) {
            Ok(result) => (result, None),
            Err(e) => {
              warn!("分类失败: {}", e);
              (ClassificationResult::invalid(), Some(e.to_string()))
            }
          };
          let reply = WorkerReply {
            frame,
            result,
            reason,
            elapsed: now.elapsed(),
          };
          if reply_tx.send(reply).is_err() {
            debug!("结果接收端已关闭");
            break;
          }
        }
        info!("推理线程退出");
        classifier
      })?;

    Ok(Self {
      requests: Some(request_tx),
      replies: reply_rx,
      handle: Some(handle),
      in_flight: false,
    })
  }

  pub fn is_busy(&self) -> bool {
    self.in_flight
  }

  /// 提交一帧，上一帧的结果被取走之前返回 [`WorkerError::Busy`]
  pub fn submit(&mut self, frame: RgbFrame) -> Result<(), WorkerError> {
    if self.in_flight {
      return Err(WorkerError::Busy);
    }
    let requests = self.requests.as_ref().ok_or(WorkerError::Disconnected)?;
    requests.send(frame).map_err(|_| WorkerError::Disconnected)?;
    self.in_flight = true;
    Ok(())
  }

  pub fn try_recv(&mut self) -> Result<Option<WorkerReply>, WorkerError> {
    match self.replies.try_recv() {
      Ok(reply) => {
        self.in_flight = false;
        Ok(Some(reply))
      }
      Err(TryRecvError::Empty) => Ok(None),
      Err(TryRecvError::Disconnected) => Err(WorkerError::Disconnected),
    }
  }

  pub fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<WorkerReply>, WorkerError> {
    match self.replies.recv_timeout(timeout) {
      Ok(reply) => {
        self.in_flight = false;
        Ok(Some(reply))
      }
      Err(RecvTimeoutError::Timeout) => Ok(None),
      Err(RecvTimeoutError::Disconnected) => Err(WorkerError::Disconnected),
    }
  }

  pub fn recv(&mut self) -> Result<WorkerReply, WorkerError> {
    let reply = self
      .replies
      .recv()
      .map_err(|_| WorkerError::Disconnected)?;
    self.in_flight = false;
    Ok(reply)
  }

  /// 停止线程并取回分类器；正在进行的推理会先完成
  pub fn shutdown(mut self) -> Result<Classifier<'static>, WorkerError> {
    self.requests.take();
    let handle = self.handle.take().ok_or(WorkerError::Disconnected)?;
    handle.join().map_err(|_| WorkerError::Disconnected)
  }
}

impl Drop for InferenceWorker {
  fn drop(&mut self) {
    self.requests.take();
    if let Some(handle) = self.handle.take()
      && handle.join().is_err()
    {
      warn!("推理线程异常退出");
    }
  }
}
