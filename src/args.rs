// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
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

use std::path::PathBuf;

use clap::Parser;

/// ReefLog 项目参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// ONNX 模型文件路径
  #[arg(long, default_value = "best.onnx", value_name = "FILE")]
  pub model: PathBuf,

  /// 类别名称表（TOML），缺省时读取模型元数据
  #[arg(long, value_name = "FILE")]
  pub labels: Option<PathBuf>,

  /// 服务监听地址
  #[arg(long, default_value = "0.0.0.0:8501", value_name = "ADDR")]
  pub bind: String,

  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.25", value_name = "THRESHOLD")]
  pub confidence: f32,

  /// NMS IOU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.7", value_name = "THRESHOLD")]
  pub iou: f32,

  /// 推理线程数
  #[arg(long, default_value = "4", value_name = "COUNT")]
  pub threads: usize,

  /// 临时文件目录，缺省为系统临时目录
  #[arg(long, value_name = "DIR")]
  pub temp_dir: Option<PathBuf>,

  /// 标注文字使用的 TTF 字体，缺省使用内置字体
  #[arg(long, value_name = "FILE")]
  pub font: Option<PathBuf>,

  /// 上传文件大小上限（MB）
  #[arg(long, default_value = "20", value_name = "MB")]
  pub max_upload_mb: usize,
}
