// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/task.rs - 单次页面渲染任务
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
use std::sync::Arc;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::inference::{InferenceError, run_inference};
use crate::input::{UploadError, UploadedImage};
use crate::model::Model;
use crate::output::{Analysis, Draw, EmbeddedImage, Page, PageError, Summary};

#[derive(Error, Debug)]
pub enum TaskError {
  #[error(transparent)]
  InferenceError(#[from] InferenceError),
  #[error("Failed to render the detection image: {0}")]
  PageError(#[from] PageError),
}

/// 渲染结果的分类，决定响应状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassStatus {
  Rendered,
  BadUpload,
  Failed,
}

/// 对一张上传图像执行推理并生成结果区域
#[derive(Clone, Default)]
pub struct OneShotTask {
  draw: Arc<Draw>,
  temp_dir: Option<PathBuf>,
}

impl OneShotTask {
  pub fn new(draw: Draw, temp_dir: Option<PathBuf>) -> Self {
    OneShotTask {
      draw: Arc::new(draw),
      temp_dir,
    }
  }

  pub fn run_task<M: Model>(&self, upload: &UploadedImage, model: &M) -> Result<Analysis, TaskError> {
    info!(
      "开始任务: {} ({}x{})",
      upload.file_name,
      upload.width(),
      upload.height()
    );
    let result = run_inference(model, &upload.image, self.temp_dir.as_deref())?;

    let now = std::time::Instant::now();
    let summary = Summary::from_result(&result);
    let overlay = EmbeddedImage::png(&self.draw.plot(&result))?;
    info!("渲染完成，耗时: {:.2?}", now.elapsed());

    Ok(Analysis { summary, overlay })
  }

  /// 一次完整的页面渲染；没有上传时只渲染表单与地图
  pub fn render_page<M: Model>(
    &self,
    model: &M,
    upload: Option<Result<UploadedImage, UploadError>>,
  ) -> (Page, PassStatus) {
    let mut page = Page::default();

    let upload = match upload {
      None => return (page, PassStatus::Rendered),
      Some(Err(e)) => {
        warn!("上传图像无效: {}", e);
        page.error = Some(e.to_string());
        return (page, PassStatus::BadUpload);
      }
      Some(Ok(upload)) => upload,
    };

    page.preview = Some(EmbeddedImage::from_upload(&upload));
    match self.run_task(&upload, model) {
      Ok(analysis) => {
        page.analysis = Some(analysis);
        (page, PassStatus::Rendered)
      }
      Err(e) => {
        error!("检测失败: {}", e);
        page.error = Some(e.to_string());
        (page, PassStatus::Failed)
      }
    }
  }
}
