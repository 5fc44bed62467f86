// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// tests/server.rs - 页面服务测试
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

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use actix_web::http::StatusCode;
use actix_web::http::header::CONTENT_TYPE;
use actix_web::{App, test, web};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};

use reeflog::model::{DetectItem, DetectResult, LabelTable, Model, ModelLoader};
use reeflog::output::Draw;
use reeflog::output::page::{FOOTER, MAP_ELEMENT_ID, REPORTS_HEADER};
use reeflog::server::{AppState, configure};
use reeflog::task::OneShotTask;

const BOUNDARY: &str = "----reeflog-test-boundary";

#[derive(Debug, thiserror::Error)]
#[error("stub model failure")]
struct StubError;

struct StubModel {
  labels: Arc<LabelTable>,
  detections: Vec<(u32, f32)>,
  fail: bool,
}

impl StubModel {
  fn new(detections: &[(u32, f32)]) -> Self {
    StubModel {
      labels: Arc::new(
        [(0, "fish".to_string()), (1, "trash".to_string())]
          .into_iter()
          .collect(),
      ),
      detections: detections.to_vec(),
      fail: false,
    }
  }
}

impl Model for StubModel {
  type Error = StubError;

  fn labels(&self) -> &Arc<LabelTable> {
    &self.labels
  }

  fn infer(&self, path: &Path) -> Result<DetectResult, StubError> {
    if self.fail {
      return Err(StubError);
    }
    let image = image::open(path).map_err(|_| StubError)?.to_rgb8();
    Ok(DetectResult {
      labels: self.labels.clone(),
      items: self
        .detections
        .iter()
        .map(|&(class_id, score)| DetectItem {
          class_id,
          score,
          bbox: [0.2, 0.2, 0.8, 0.8],
        })
        .collect(),
      image,
    })
  }
}

fn png_bytes() -> Vec<u8> {
  let mut bytes = Vec::new();
  DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 24, Rgb([0, 100, 180])))
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

fn multipart(field: &str, file_name: &str, content: &[u8]) -> Vec<u8> {
  let mut body = Vec::new();
  body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
  body.extend_from_slice(
    format!(
      "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n",
      field, file_name
    )
    .as_bytes(),
  );
  body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
  body.extend_from_slice(content);
  body.extend_from_slice(format!("\r\n--{}--\r\n", BOUNDARY).as_bytes());
  body
}

fn state(model: StubModel, temp_dir: &Path, limit: usize) -> web::Data<AppState<StubModel>> {
  let task = OneShotTask::new(Draw::default(), Some(temp_dir.to_path_buf()));
  web::Data::new(AppState::new(ModelLoader::with_model(model), task, limit))
}

async fn post(data: web::Data<AppState<StubModel>>, body: Vec<u8>) -> (StatusCode, String) {
  let app = test::init_service(App::new().app_data(data).configure(configure::<StubModel>)).await;
  let req = test::TestRequest::post()
    .uri("/")
    .insert_header((
      CONTENT_TYPE,
      format!("multipart/form-data; boundary={}", BOUNDARY),
    ))
    .set_payload(body)
    .to_request();
  let resp = test::call_service(&app, req).await;
  let status = resp.status();
  let body = test::read_body(resp).await;
  (status, String::from_utf8(body.to_vec()).unwrap())
}

fn assert_map(html: &str) {
  let header = html.find(REPORTS_HEADER).unwrap();
  let map = html.find(MAP_ELEMENT_ID).unwrap();
  let footer = html.find(FOOTER).unwrap();
  assert!(header < map && map < footer);
  assert!(html.contains("Plastic pollution near coast"));
}

#[actix_web::test]
async fn get_renders_form_and_map_only() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.9)]), dir.path(), 1 << 20);
  let app = test::init_service(App::new().app_data(data).configure(configure::<StubModel>)).await;

  let resp = test::call_service(&app, test::TestRequest::get().uri("/").to_request()).await;
  assert_eq!(resp.status(), StatusCode::OK);
  let html = String::from_utf8(test::read_body(resp).await.to_vec()).unwrap();

  assert!(html.contains(r#"name="file""#));
  assert!(!html.contains("Uploaded Image"));
  assert!(!html.contains("Detection Results"));
  assert_map(&html);
}

#[actix_web::test]
async fn upload_with_detections() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.93), (1, 0.41)]), dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("file", "reef.png", &png_bytes())).await;
  assert_eq!(status, StatusCode::OK);
  assert!(html.contains("figcaption>Uploaded Image"));
  assert!(html.contains("✅ Detected: fish (93.0%), trash (41.0%)"));
  assert!(html.contains("figcaption>Detection Results"));
  assert_map(&html);
  assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}

#[actix_web::test]
async fn upload_without_detections() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[]), dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("file", "empty_sea.png", &png_bytes())).await;
  assert_eq!(status, StatusCode::OK);
  assert!(html.contains("⚠️ No objects detected."));
  assert!(!html.contains("Detected: "));
  assert!(html.contains("figcaption>Detection Results"));
  assert_map(&html);
}

#[actix_web::test]
async fn empty_file_selection_is_no_upload() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.9)]), dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("file", "", b"")).await;
  assert_eq!(status, StatusCode::OK);
  assert!(!html.contains("Uploaded Image"));
  assert!(!html.contains("Detection Results"));
  assert_map(&html);
}

#[actix_web::test]
async fn other_fields_are_ignored() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.9)]), dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("attachment", "reef.png", &png_bytes())).await;
  assert_eq!(status, StatusCode::OK);
  assert!(!html.contains("Uploaded Image"));
  assert_map(&html);
}

#[actix_web::test]
async fn unsupported_extension_is_bad_request() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.9)]), dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("file", "reef.gif", &png_bytes())).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(html.contains(r#"class="notice error""#));
  assert!(!html.contains("Detection Results"));
  assert_map(&html);
}

#[actix_web::test]
async fn oversized_upload_is_bad_request() {
  let dir = tempfile::tempdir().unwrap();
  let data = state(StubModel::new(&[(0, 0.9)]), dir.path(), 16);

  let (status, html) = post(data, multipart("file", "reef.png", &png_bytes())).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert!(html.contains("16 byte limit"));
  assert_map(&html);
}

#[actix_web::test]
async fn model_failure_is_server_error() {
  let dir = tempfile::tempdir().unwrap();
  let model = StubModel {
    fail: true,
    ..StubModel::new(&[])
  };
  let data = state(model, dir.path(), 1 << 20);

  let (status, html) = post(data, multipart("file", "reef.png", &png_bytes())).await;
  assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
  assert!(html.contains("stub model failure"));
  assert!(html.contains("figcaption>Uploaded Image"));
  assert!(!html.contains("Detection Results"));
  assert_map(&html);
  assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
}
