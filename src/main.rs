// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use reeflog::model::{LabelTable, Model, ModelLoader, YoloBuilder};
use reeflog::output::Draw;
use reeflog::server::{self, AppState};
use reeflog::task::OneShotTask;

#[actix_web::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();

  let args = args::Args::parse();

  info!("ReefLog 海洋生物识别服务");
  info!("模型文件路径: {}", args.model.display());
  info!("监听地址: {}", args.bind);
  info!("置信度阈值: {}", args.confidence);
  info!("NMS 阈值: {}", args.iou);

  let labels = match &args.labels {
    Some(path) => Some(
      LabelTable::from_toml_file(path)
        .with_context(|| format!("无法读取类别表: {}", path.display()))?,
    ),
    None => None,
  };

  let builder = YoloBuilder::new(args.model.clone())
    .labels(labels)
    .confidence(args.confidence)
    .iou(args.iou)
    .threads(args.threads);
  let loader = ModelLoader::new(move || builder.clone().build());
  // 启动时加载，失败直接退出
  let model = loader
    .get()
    .with_context(|| format!("无法加载模型: {}", args.model.display()))?;
  info!("类别数: {}", model.labels().len());

  let draw = match &args.font {
    Some(path) => {
      Draw::with_font_file(path).with_context(|| format!("无法加载字体: {}", path.display()))?
    }
    None => Draw::default(),
  };
  let max_upload_bytes = upload_limit(args.max_upload_mb)?;
  let task = OneShotTask::new(draw, args.temp_dir.clone());
  let state = AppState::new(loader, task, max_upload_bytes);

  server::serve(state, &args.bind).await?;
  Ok(())
}

/// 上传大小上限，MB 转为字节
fn upload_limit(megabytes: usize) -> Result<usize> {
  megabytes
    .checked_mul(1024 * 1024)
    .with_context(|| format!("上传大小上限过大: {} MB", megabytes))
}
