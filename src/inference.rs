// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/inference.rs - 基于临时文件的推理适配
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

use image::{DynamicImage, ImageFormat};
use tempfile::{Builder, NamedTempFile};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DetectResult, Model};

const TEMP_IMAGE_PREFIX: &str = "reeflog-";
const TEMP_IMAGE_SUFFIX: &str = ".jpg";

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("Failed to create a temporary file: {0}")]
  TempFileError(#[source] std::io::Error),
  #[error("Failed to write the temporary image: {0}")]
  EncodeError(#[from] image::ImageError),
  #[error("Model inference failed: {0}")]
  ModelError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// 推理期间存在的临时图像文件，离开作用域即删除
pub struct TempImageFile {
  file: NamedTempFile,
}

impl TempImageFile {
  /// 以 JPEG 格式写入图像；`dir` 为空时使用系统临时目录
  pub fn create(image: &DynamicImage, dir: Option<&Path>) -> Result<Self, InferenceError> {
    let mut builder = Builder::new();
    builder.prefix(TEMP_IMAGE_PREFIX).suffix(TEMP_IMAGE_SUFFIX);
    let file = match dir {
      Some(dir) => builder.tempfile_in(dir),
      None => builder.tempfile(),
    }
    .map_err(InferenceError::TempFileError)?;

    // JPEG 不支持透明通道
    DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(file.path(), ImageFormat::Jpeg)?;
    debug!("写入临时图像: {}", file.path().display());

    Ok(TempImageFile { file })
  }

  pub fn path(&self) -> &Path {
    self.file.path()
  }
}

impl Drop for TempImageFile {
  fn drop(&mut self) {
    debug!("删除临时图像: {}", self.file.path().display());
  }
}

/// 将图像写入临时文件并调用模型，无论推理成功与否临时文件都会被删除
pub fn run_inference<M: Model>(
  model: &M,
  image: &DynamicImage,
  temp_dir: Option<&Path>,
) -> Result<DetectResult, InferenceError> {
  let temp = TempImageFile::create(image, temp_dir)?;

  info!("输入图像写入完成，开始推理...");
  let now = std::time::Instant::now();
  let result = model.infer(temp.path());
  let elapsed = now.elapsed();
  drop(temp);

  match result {
    Ok(result) => {
      info!("推理完成，耗时: {:.2?}, 检测到 {} 个对象", elapsed, result.len());
      Ok(result)
    }
    Err(e) => {
      warn!("推理失败，耗时: {:.2?}: {}", elapsed, e);
      Err(InferenceError::ModelError(Box::new(e)))
    }
  }
}
