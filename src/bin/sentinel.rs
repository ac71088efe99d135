/// 数字卫兵 (Digital Sentinel) - 交互风险监控
///
/// 回放姿态检测日志 (JSON Lines),逐帧执行:
/// 1. 身份跟踪
/// 2. 成对接触分类与风险累积
/// 3. 滞回告警与证据保存
///
/// 每行一帧:
/// {"timestamp": 12.34, "width": 1280, "height": 720, "frame": "frames/000123.jpg", "detections": [...]}
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use clap::Parser;
use hawkeye_rs::{Detection, FrameInput, FrameOutput, Pipeline, PipelineWorker, SentinelConfig};
use image::RgbImage;
use mimalloc::MiMalloc;
use serde::Deserialize;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// 数字卫兵参数
#[derive(Parser, Debug)]
#[command(author, version, about = "数字卫兵 - 交互风险监控", long_about = None)]
struct Args {
    /// 检测日志 (JSON Lines)
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// 配置文件 (不存在时写入默认值)
    #[arg(short, long, default_value = "sentinel.json")]
    config: PathBuf,

    /// 证据目录 (覆盖配置)
    #[arg(short, long)]
    evidence_dir: Option<PathBuf>,

    /// 按时间戳实时回放 (工作线程 + 丢弃旧帧)
    #[arg(long)]
    realtime: bool,

    /// 只写出配置文件后退出
    #[arg(long)]
    write_config: bool,
}

/// 日志中的一帧
#[derive(Debug, Deserialize)]
struct FrameRecord {
    timestamp: f64,
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default)]
    frame: Option<PathBuf>,
    #[serde(default)]
    detections: Vec<Detection>,
}

/// 回放时钟: 日志时间戳 → 单调时钟 / 本地时间
struct ReplayClock {
    origin: Option<f64>,
    base: Instant,
    base_wall: DateTime<Local>,
}

impl ReplayClock {
    fn new() -> Self {
        Self {
            origin: None,
            base: Instant::now(),
            base_wall: Local::now(),
        }
    }

    fn offset(&mut self, timestamp: f64) -> Duration {
        let origin = *self.origin.get_or_insert(timestamp);
        let secs = timestamp - origin;
        if secs.is_finite() && secs > 0.0 {
            Duration::from_secs_f64(secs)
        } else {
            Duration::ZERO
        }
    }

    fn stamp(&mut self, timestamp: f64) -> (Instant, DateTime<Local>) {
        let offset = self.offset(timestamp);
        let wall = chrono::Duration::from_std(offset)
            .map(|d| self.base_wall + d)
            .unwrap_or(self.base_wall);
        (self.base + offset, wall)
    }
}

fn load_image(record: &FrameRecord) -> RgbImage {
    let blank = || RgbImage::new(record.width.unwrap_or(640), record.height.unwrap_or(480));
    match &record.frame {
        Some(path) => match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                warn!("⚠️ 读取画面失败 {}: {}", path.display(), e);
                blank()
            }
        },
        None => blank(),
    }
}

/// 回放统计
#[derive(Default)]
struct Summary {
    frames: u64,
    alerts: u64,
    rejected: usize,
    max_risk: f32,
}

impl Summary {
    fn record(&mut self, out: &FrameOutput) -> Result<()> {
        self.frames += 1;
        self.rejected += out.rejected;
        self.max_risk = self.max_risk.max(out.scene_risk);
        debug!(
            frame_id = out.frame_id,
            risk = out.scene_risk,
            contacts = out.contacts.len(),
            "frame"
        );
        if let Some(alert) = &out.alert {
            self.alerts += 1;
            println!("{}", serde_json::to_string(alert)?);
        }
        Ok(())
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let mut config = SentinelConfig::load(&args.config)
        .with_context(|| format!("加载配置失败: {}", args.config.display()))?;
    if let Some(dir) = args.evidence_dir {
        config.alert.evidence_dir = dir;
    }
    if args.write_config {
        config.save(&args.config)?;
        return Ok(());
    }
    config.print_summary();

    let input = args.input.context("缺少检测日志: --input <FILE>")?;
    let reader = BufReader::new(
        File::open(&input).with_context(|| format!("无法打开 {}", input.display()))?,
    );

    info!("🚀 数字卫兵系统启动");
    info!("📹 检测日志: {}", input.display());

    let pipeline = Pipeline::with_evidence_writer(&config);
    let summary = if args.realtime {
        replay_realtime(pipeline, reader)?
    } else {
        replay(pipeline, reader)?
    };

    info!(
        "✅ 回放结束: {} 帧, {} 次告警, {} 个无效检测, 最高风险 {:.0}%",
        summary.frames,
        summary.alerts,
        summary.rejected,
        summary.max_risk * 100.0
    );
    Ok(())
}

/// 逐行读取日志,单行解析失败只跳过该帧
fn records(reader: impl BufRead) -> impl Iterator<Item = (u64, FrameRecord)> {
    reader
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    warn!("⚠️ 第 {} 行读取失败: {}", idx + 1, e);
                    return None;
                }
            };
            if line.trim().is_empty() {
                return None;
            }
            match serde_json::from_str::<FrameRecord>(&line) {
                Ok(record) => Some((idx as u64, record)),
                Err(e) => {
                    warn!("⚠️ 第 {} 行解析失败: {}", idx + 1, e);
                    None
                }
            }
        })
}

/// 顺序回放 (不丢帧)
fn replay(mut pipeline: Pipeline, reader: impl BufRead) -> Result<Summary> {
    let mut clock = ReplayClock::new();
    let mut summary = Summary::default();
    for (frame_id, record) in records(reader) {
        let image = load_image(&record);
        let (captured_at, wall) = clock.stamp(record.timestamp);
        let input = FrameInput::new(frame_id, image, record.detections).at(captured_at, wall);
        let out = pipeline.process(input);
        summary.record(&out)?;
    }
    Ok(summary)
}

/// 按时间戳节奏送帧,处理不过来时丢弃旧帧
fn replay_realtime(pipeline: Pipeline, reader: impl BufRead) -> Result<Summary> {
    let worker = PipelineWorker::spawn(pipeline)?;
    let mut clock = ReplayClock::new();
    let mut summary = Summary::default();

    for (frame_id, record) in records(reader) {
        let (captured_at, wall) = clock.stamp(record.timestamp);
        let wait = captured_at.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        let image = load_image(&record);
        worker.submit(FrameInput::new(frame_id, image, record.detections).at(Instant::now(), wall))?;

        for out in worker.outputs().try_iter() {
            summary.record(&out)?;
        }
    }

    let dropped = worker.dropped();
    let outputs = worker.outputs().clone();
    worker.shutdown()?;
    for out in outputs.try_iter() {
        summary.record(&out)?;
    }
    if dropped > 0 {
        info!("⏭️ 背压丢弃 {} 帧", dropped);
    }
    Ok(summary)
}
