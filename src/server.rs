// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/server.rs - 页面服务
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

use actix_multipart::Multipart;
use actix_web::http::header::ContentType;
use actix_web::{App, HttpResponse, HttpServer, web};
use futures::TryStreamExt;
use tracing::{debug, error, info};

use crate::input::{UPLOAD_FIELD, UploadError, UploadedImage, decode_upload};
use crate::model::{Model, ModelLoader};
use crate::output::Page;
use crate::task::{OneShotTask, PassStatus};

/// 所有请求共享的状态
pub struct AppState<M: Model> {
  loader: ModelLoader<M, M::Error>,
  task: OneShotTask,
  max_upload_bytes: usize,
}

impl<M: Model> AppState<M> {
  pub fn new(loader: ModelLoader<M, M::Error>, task: OneShotTask, max_upload_bytes: usize) -> Self {
    AppState {
      loader,
      task,
      max_upload_bytes,
    }
  }

  fn render(&self, upload: Option<Result<UploadedImage, UploadError>>) -> (Page, PassStatus) {
    match self.loader.get() {
      Ok(model) => self.task.render_page(model.as_ref(), upload),
      Err(e) => {
        error!("模型不可用: {}", e);
        let page = Page {
          error: Some(format!("Failed to load the detection model: {}", e)),
          ..Page::default()
        };
        (page, PassStatus::Failed)
      }
    }
  }
}

pub fn configure<M>(cfg: &mut web::ServiceConfig)
where
  M: Model + Send + Sync + 'static,
{
  cfg.service(
    web::resource("/")
      .route(web::get().to(index::<M>))
      .route(web::post().to(upload::<M>)),
  );
}

async fn index<M>(state: web::Data<AppState<M>>) -> actix_web::Result<HttpResponse>
where
  M: Model + Send + Sync + 'static,
{
  respond(state, None).await
}

async fn upload<M>(state: web::Data<AppState<M>>, payload: Multipart) -> actix_web::Result<HttpResponse>
where
  M: Model + Send + Sync + 'static,
{
  let upload = read_upload(payload, state.max_upload_bytes).await?;
  respond(state, upload).await
}

async fn respond<M>(
  state: web::Data<AppState<M>>,
  upload: Option<Result<UploadedImage, UploadError>>,
) -> actix_web::Result<HttpResponse>
where
  M: Model + Send + Sync + 'static,
{
  let now = std::time::Instant::now();
  let (page, status) = web::block(move || state.render(upload)).await?;
  info!("页面渲染完成: {:?}, 耗时: {:.2?}", status, now.elapsed());

  let mut response = match status {
    PassStatus::Rendered => HttpResponse::Ok(),
    PassStatus::BadUpload => HttpResponse::BadRequest(),
    PassStatus::Failed => HttpResponse::InternalServerError(),
  };
  Ok(response.content_type(ContentType::html()).body(page.render()))
}

/// 读取表单中的文件字段；未选择文件时返回 `None`
async fn read_upload(
  mut payload: Multipart,
  limit: usize,
) -> actix_web::Result<Option<Result<UploadedImage, UploadError>>> {
  while let Some(mut field) = payload.try_next().await? {
    let file_name = field
      .content_disposition()
      .and_then(|cd| cd.get_filename())
      .map(|name| name.to_string());
    let is_upload_field = field.name() == Some(UPLOAD_FIELD);

    let file_name = match file_name {
      Some(name) if is_upload_field && !name.is_empty() => name,
      _ => {
        // 忽略其他字段以及空文件选择
        while field.try_next().await?.is_some() {}
        continue;
      }
    };

    let mut bytes = Vec::new();
    while let Some(chunk) = field.try_next().await? {
      if bytes.len() + chunk.len() > limit {
        return Ok(Some(Err(UploadError::TooLarge(limit))));
      }
      bytes.extend_from_slice(&chunk);
    }
    debug!("收到上传文件: {} ({} 字节)", file_name, bytes.len());

    return Ok(Some(decode_upload(&file_name, bytes)));
  }

  Ok(None)
}

/// 启动页面服务，直到进程退出
pub async fn serve<M>(state: AppState<M>, bind: &str) -> std::io::Result<()>
where
  M: Model + Send + Sync + 'static,
{
  let state = web::Data::new(state);
  let server = HttpServer::new(move || App::new().app_data(state.clone()).configure(configure::<M>))
    .bind(bind)?;
  info!("页面服务已启动: http://{}", bind);
  server.run().await
}
