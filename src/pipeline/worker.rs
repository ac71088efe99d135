//! 流水线工作线程 (Pipeline worker)
//! 职责: 接收FrameInput → Pipeline::process → 发送FrameOutput
//!
//! 输入通道容量为1,满时丢弃最旧的帧,保证总是处理最新画面。

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};
use tracing::{debug, error, info};

use super::{FrameInput, FrameOutput, Pipeline};
use crate::error::{SentinelError, SentinelResult};

/// 帧发送端 (drop-oldest 背压)
pub struct FrameSender {
    tx: Sender<FrameInput>,
    // 仅用于丢弃过期帧
    evict: Receiver<FrameInput>,
    dropped: Arc<AtomicU64>,
    // 消费线程退出时清除
    alive: Arc<AtomicBool>,
}

impl FrameSender {
    /// 容量为1的帧通道
    pub fn channel() -> (FrameSender, Receiver<FrameInput>) {
        let (tx, rx) = bounded(1);
        let sender = FrameSender {
            tx,
            evict: rx.clone(),
            dropped: Arc::new(AtomicU64::new(0)),
            alive: Arc::new(AtomicBool::new(true)),
        };
        (sender, rx)
    }

    /// 消费端存活标志,消费线程退出时置为 false
    pub fn liveness(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.alive)
    }

    /// 提交最新帧,队列中尚未处理的旧帧被丢弃
    pub fn submit(&self, frame: FrameInput) -> SentinelResult<()> {
        let mut frame = frame;
        loop {
            if !self.alive.load(Ordering::Acquire) {
                return Err(SentinelError::WorkerStopped);
            }
            match self.tx.try_send(frame) {
                Ok(()) => return Ok(()),
                Err(TrySendError::Full(f)) => {
                    if let Ok(stale) = self.evict.try_recv() {
                        self.dropped.fetch_add(1, Ordering::Relaxed);
                        debug!(frame_id = stale.frame_id, "stale frame dropped");
                    }
                    frame = f;
                }
                Err(TrySendError::Disconnected(_)) => return Err(SentinelError::WorkerStopped),
            }
        }
    }

    /// 因背压被丢弃的帧数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

struct AliveGuard(Arc<AtomicBool>);

impl Drop for AliveGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// 在独立线程运行的流水线
pub struct PipelineWorker {
    input: Option<FrameSender>,
    output: Receiver<FrameOutput>,
    handle: Option<JoinHandle<Pipeline>>,
}

impl PipelineWorker {
    pub fn spawn(mut pipeline: Pipeline) -> SentinelResult<Self> {
        let (input, frames) = FrameSender::channel();
        let (out_tx, output) = unbounded::<FrameOutput>();
        let alive = input.liveness();

        let handle = std::thread::Builder::new()
            .name("risk-pipeline".into())
            .spawn(move || {
                // panic 时同样清除存活标志
                let _guard = AliveGuard(alive);
                info!("🔍 风险流水线启动");
                for frame in frames.iter() {
                    let out = pipeline.process(frame);
                    if out_tx.send(out).is_err() {
                        debug!("output receiver dropped");
                    }
                }
                info!("🛑 风险流水线停止 ({} 帧)", pipeline.frames_processed());
                pipeline
            })
            .map_err(|e| {
                error!("❌ 流水线线程启动失败: {}", e);
                SentinelError::WorkerStopped
            })?;

        Ok(Self {
            input: Some(input),
            output,
            handle: Some(handle),
        })
    }

    pub fn submit(&self, frame: FrameInput) -> SentinelResult<()> {
        match &self.input {
            Some(input) => input.submit(frame),
            None => Err(SentinelError::WorkerStopped),
        }
    }

    pub fn outputs(&self) -> &Receiver<FrameOutput> {
        &self.output
    }

    pub fn dropped(&self) -> u64 {
        self.input.as_ref().map_or(0, FrameSender::dropped)
    }

    /// 停止接收新帧,等待当前帧处理完毕,返回流水线
    pub fn shutdown(mut self) -> SentinelResult<Pipeline> {
        self.input.take();
        let handle = self.handle.take().ok_or(SentinelError::WorkerStopped)?;
        handle.join().map_err(|_| SentinelError::WorkerStopped)
    }
}

impl Drop for PipelineWorker {
    fn drop(&mut self) {
        self.input.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
