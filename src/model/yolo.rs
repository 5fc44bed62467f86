// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/model/yolo.rs - YOLO 目标检测模型（ONNX）
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

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use image::{RgbImage, imageops::FilterType};
use ndarray::Array4;
use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::TensorRef;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{DetectItem, DetectResult, LabelError, LabelTable, Model};

const YOLO_DEFAULT_INPUT_SIZE: u32 = 640;
const YOLO_LETTERBOX_FILL: f32 = 114.0 / 255.0;
const YOLO_MAX_DETECTIONS: usize = 300;
const YOLO_DEFAULT_CONFIDENCE: f32 = 0.25;
const YOLO_DEFAULT_IOU: f32 = 0.7;
const YOLO_DEFAULT_THREADS: usize = 4;

#[derive(Error, Debug)]
pub enum YoloError {
  #[error("模型文件不存在: {0}")]
  ModelNotFound(PathBuf),
  #[error("推理会话错误: {0}")]
  SessionError(String),
  #[error("标签错误: {0}")]
  LabelError(#[from] LabelError),
  #[error("图像读取错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("模型输出形状不符合预期: {0:?}")]
  OutputShape(Vec<usize>),
  #[error("模型缺少输出: {0}")]
  MissingOutput(String),
  #[error("推理会话锁已失效")]
  SessionPoisoned,
}

impl YoloError {
  fn session(e: impl Display) -> Self {
    YoloError::SessionError(e.to_string())
  }
}

#[derive(Debug, Clone)]
pub struct YoloBuilder {
  model_path: PathBuf,
  labels: Option<LabelTable>,
  confidence: f32,
  iou: f32,
  threads: usize,
}

impl YoloBuilder {
  pub fn new(model_path: impl Into<PathBuf>) -> Self {
    YoloBuilder {
      model_path: model_path.into(),
      labels: None,
      confidence: YOLO_DEFAULT_CONFIDENCE,
      iou: YOLO_DEFAULT_IOU,
      threads: YOLO_DEFAULT_THREADS,
    }
  }

  /// 指定标签表，优先于模型元数据
  pub fn labels(mut self, labels: Option<LabelTable>) -> Self {
    self.labels = labels;
    self
  }

  pub fn confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn iou(mut self, iou: f32) -> Self {
    self.iou = iou;
    self
  }

  pub fn threads(mut self, threads: usize) -> Self {
    self.threads = threads;
    self
  }

  pub fn build(self) -> Result<Yolo, YoloError> {
    if !self.model_path.exists() {
      return Err(YoloError::ModelNotFound(self.model_path));
    }

    info!("加载模型文件: {}", self.model_path.display());
    if let Ok(meta) = std::fs::metadata(&self.model_path) {
      debug!(
        "模型文件大小: {:.2} MB",
        meta.len() as f64 / (1024.0 * 1024.0)
      );
    }

    info!("创建 ONNX Runtime 推理会话");
    let session = Session::builder()
      .map_err(YoloError::session)?
      .with_optimization_level(GraphOptimizationLevel::Level3)
      .map_err(YoloError::session)?
      .with_intra_threads(self.threads)
      .map_err(YoloError::session)?
      .commit_from_file(&self.model_path)
      .map_err(YoloError::session)?;

    let input_name = session
      .inputs
      .first()
      .map(|i| i.name.clone())
      .unwrap_or_else(|| "images".to_string());
    let output_name = session
      .outputs
      .first()
      .map(|o| o.name.clone())
      .unwrap_or_else(|| "output0".to_string());
    debug!("模型输入: {}, 模型输出: {}", input_name, output_name);

    let input_size = read_metadata(&session, "imgsz")
      .and_then(|s| parse_imgsz(&s))
      .unwrap_or(YOLO_DEFAULT_INPUT_SIZE);

    let labels = match self.labels {
      Some(labels) => labels,
      None => match read_metadata(&session, "names") {
        Some(names) => LabelTable::from_ultralytics_names(&names)?,
        None => {
          warn!("模型未携带类别元数据，使用 COCO 类别表");
          LabelTable::coco()
        }
      },
    };

    info!(
      "模型加载完成: 输入尺寸 {}x{}, 类别数 {}",
      input_size,
      input_size,
      labels.len()
    );

    Ok(Yolo {
      session: Mutex::new(session),
      labels: Arc::new(labels),
      input_name,
      output_name,
      input_size,
      confidence: self.confidence,
      iou: self.iou,
    })
  }
}

fn read_metadata(session: &Session, key: &str) -> Option<String> {
  let metadata = session.metadata().ok()?;
  metadata.custom(key).ok().flatten()
}

/// 解析 `[640, 640]` 或 `640` 形式的输入尺寸，仅支持正方形输入
fn parse_imgsz(text: &str) -> Option<u32> {
  let text = text.trim().trim_start_matches('[').trim_end_matches(']');
  let mut dims = text.split(',').map(|d| d.trim().parse::<u32>());
  let h = dims.next()?.ok()?;
  let w = match dims.next() {
    Some(w) => w.ok()?,
    None => h,
  };
  (h == w && h > 0).then_some(h)
}

/// YOLOv8 系列检测模型
pub struct Yolo {
  session: Mutex<Session>,
  labels: Arc<LabelTable>,
  input_name: String,
  output_name: String,
  input_size: u32,
  confidence: f32,
  iou: f32,
}

impl Yolo {
  fn run(&self, tensor: &Array4<f32>) -> Result<(Vec<f32>, Vec<usize>), YoloError> {
    let input = tensor.as_standard_layout();
    let input_tensor = TensorRef::from_array_view(&input).map_err(YoloError::session)?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| YoloError::SessionPoisoned)?;
    let outputs = session
      .run(ort::inputs![&self.input_name => input_tensor])
      .map_err(YoloError::session)?;

    let output = outputs
      .get(self.output_name.as_str())
      .ok_or_else(|| YoloError::MissingOutput(self.output_name.clone()))?;
    let (shape, data) = output
      .try_extract_tensor::<f32>()
      .map_err(YoloError::session)?;

    let shape: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    Ok((data.to_vec(), shape))
  }
}

impl Model for Yolo {
  type Error = YoloError;

  fn labels(&self) -> &Arc<LabelTable> {
    &self.labels
  }

  fn infer(&self, path: &Path) -> Result<DetectResult, Self::Error> {
    debug!("读取推理图像: {}", path.display());
    let image = image::open(path)?.to_rgb8();

    let letterbox = Letterbox::new(image.dimensions(), self.input_size);
    let tensor = letterbox.tensor(&image);

    debug!("执行模型推理");
    let now = std::time::Instant::now();
    let (data, shape) = self.run(&tensor)?;
    debug!("模型推理完成，耗时: {:.2?}, 输出形状: {:?}", now.elapsed(), shape);

    let items = decode_output(&data, &shape, &letterbox, self.confidence, self.iou)?;
    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      labels: self.labels.clone(),
      items: items.into_boxed_slice(),
      image,
    })
  }
}

impl std::fmt::Debug for Yolo {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Yolo")
      .field("input_size", &self.input_size)
      .field("num_classes", &self.labels.len())
      .field("confidence", &self.confidence)
      .field("iou", &self.iou)
      .finish()
  }
}

/// 等比缩放并填充到模型输入尺寸
#[derive(Debug, Clone, Copy, PartialEq)]
struct Letterbox {
  src_w: u32,
  src_h: u32,
  size: u32,
  scale: f32,
  new_w: u32,
  new_h: u32,
  left: u32,
  top: u32,
}

impl Letterbox {
  fn new((src_w, src_h): (u32, u32), size: u32) -> Self {
    let scale = (size as f32 / src_w as f32).min(size as f32 / src_h as f32);
    let new_w = ((src_w as f32 * scale).round() as u32).clamp(1, size);
    let new_h = ((src_h as f32 * scale).round() as u32).clamp(1, size);
    Letterbox {
      src_w,
      src_h,
      size,
      scale,
      new_w,
      new_h,
      left: (size - new_w) / 2,
      top: (size - new_h) / 2,
    }
  }

  /// 生成 NCHW、归一化到 [0, 1] 的输入张量
  fn tensor(&self, image: &RgbImage) -> Array4<f32> {
    let resized = image::imageops::resize(image, self.new_w, self.new_h, FilterType::Triangle);
    let size = self.size as usize;
    let mut tensor = Array4::<f32>::from_elem((1, 3, size, size), YOLO_LETTERBOX_FILL);
    for (x, y, pixel) in resized.enumerate_pixels() {
      let (tx, ty) = ((x + self.left) as usize, (y + self.top) as usize);
      for c in 0..3 {
        tensor[[0, c, ty, tx]] = pixel[c] as f32 / 255.0;
      }
    }
    tensor
  }

  /// 模型坐标 [x_min, y_min, x_max, y_max] 映射回原图的归一化坐标
  fn unmap(&self, bbox: [f32; 4]) -> [f32; 4] {
    let (w, h) = (self.src_w as f32, self.src_h as f32);
    let x = |v: f32| ((v - self.left as f32) / self.scale).clamp(0.0, w) / w;
    let y = |v: f32| ((v - self.top as f32) / self.scale).clamp(0.0, h) / h;
    [x(bbox[0]), y(bbox[1]), x(bbox[2]), y(bbox[3])]
  }
}

/// 解码 `[1, 4 + 类别数, 锚点数]`（或其转置）形式的输出
fn decode_output(
  data: &[f32],
  shape: &[usize],
  letterbox: &Letterbox,
  confidence: f32,
  iou: f32,
) -> Result<Vec<DetectItem>, YoloError> {
  if shape.len() != 3 || shape[0] != 1 {
    return Err(YoloError::OutputShape(shape.to_vec()));
  }

  // 特征维度通常远小于锚点数
  let features_first = shape[1] <= shape[2];
  let (features, anchors) = if features_first {
    (shape[1], shape[2])
  } else {
    (shape[2], shape[1])
  };
  if features <= 4 || data.len() != features * anchors {
    return Err(YoloError::OutputShape(shape.to_vec()));
  }

  let at = |f: usize, a: usize| {
    if features_first {
      data[f * anchors + a]
    } else {
      data[a * features + f]
    }
  };

  let mut candidates = Vec::new();
  for a in 0..anchors {
    let (class_id, score) = (4..features)
      .map(|f| (f - 4, at(f, a)))
      .fold((0usize, f32::NEG_INFINITY), |best, cur| {
        if cur.1 > best.1 { cur } else { best }
      });

    if !score.is_finite() || score < confidence {
      continue;
    }

    let (cx, cy, w, h) = (at(0, a), at(1, a), at(2, a), at(3, a));
    if !(cx.is_finite() && cy.is_finite() && w > 0.0 && h > 0.0) {
      continue;
    }

    candidates.push(DetectItem {
      class_id: class_id as u32,
      score,
      bbox: letterbox.unmap([cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]),
    });
  }

  debug!("NMS 前候选框数量: {}", candidates.len());
  Ok(nms(candidates, iou))
}

/// 按类别的非极大值抑制，结果按置信度降序
fn nms(mut candidates: Vec<DetectItem>, iou_threshold: f32) -> Vec<DetectItem> {
  candidates.sort_by(|a, b| b.score.total_cmp(&a.score));

  let mut result: Vec<DetectItem> = Vec::new();
  for candidate in candidates {
    if result.len() >= YOLO_MAX_DETECTIONS {
      break;
    }
    let suppressed = result
      .iter()
      .any(|kept| kept.class_id == candidate.class_id && iou(&kept.bbox, &candidate.bbox) > iou_threshold);
    if !suppressed {
      result.push(candidate);
    }
  }
  result
}

/// 计算两个边界框的 IoU
fn iou(a: &[f32; 4], b: &[f32; 4]) -> f32 {
  let x1 = a[0].max(b[0]);
  let y1 = a[1].max(b[1]);
  let x2 = a[2].min(b[2]);
  let y2 = a[3].min(b[3]);

  let intersection = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
  let area_a = (a[2] - a[0]) * (a[3] - a[1]);
  let area_b = (b[2] - b[0]) * (b[3] - b[1]);
  let union = area_a + area_b - intersection;

  if union > 0.0 { intersection / union } else { 0.0 }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square_letterbox() -> Letterbox {
    Letterbox::new((640, 640), 640)
  }

  const ANCHORS: usize = 8;

  // 8 个锚点（后 5 个为空）、2 个类别，特征在前
  fn features_first_output() -> (Vec<f32>, Vec<usize>) {
    let anchors = [
      // cx, cy, w, h, cls0, cls1
      [100.0, 100.0, 40.0, 40.0, 0.90, 0.05],
      [102.0, 101.0, 40.0, 40.0, 0.60, 0.10],
      [400.0, 300.0, 80.0, 60.0, 0.02, 0.45],
    ];
    let mut data = vec![0.0; 6 * ANCHORS];
    for (a, row) in anchors.iter().enumerate() {
      for (f, v) in row.iter().enumerate() {
        data[f * ANCHORS + a] = *v;
      }
    }
    (data, vec![1, 6, ANCHORS])
  }

  #[test]
  fn parse_imgsz_variants() {
    assert_eq!(parse_imgsz("[640, 640]"), Some(640));
    assert_eq!(parse_imgsz("320"), Some(320));
    assert_eq!(parse_imgsz("[640, 480]"), None);
    assert_eq!(parse_imgsz("abc"), None);
  }

  #[test]
  fn letterbox_pads_the_short_side() {
    let lb = Letterbox::new((1280, 640), 640);
    assert_eq!((lb.new_w, lb.new_h), (640, 320));
    assert_eq!((lb.left, lb.top), (0, 160));

    let image = RgbImage::from_pixel(1280, 640, image::Rgb([255, 0, 0]));
    let tensor = lb.tensor(&image);
    assert_eq!(tensor.shape(), &[1, 3, 640, 640]);
    assert!((tensor[[0, 0, 0, 0]] - YOLO_LETTERBOX_FILL).abs() < 1e-6);
    assert!((tensor[[0, 0, 320, 320]] - 1.0).abs() < 1e-6);
    assert!(tensor[[0, 1, 320, 320]].abs() < 1e-6);
  }

  #[test]
  fn unmap_removes_padding_and_normalizes() {
    let lb = Letterbox::new((1280, 640), 640);
    let bbox = lb.unmap([0.0, 160.0, 320.0, 480.0]);
    let expected = [0.0, 0.0, 0.5, 1.0];
    for (got, want) in bbox.iter().zip(expected) {
      assert!((got - want).abs() < 1e-4, "{:?}", bbox);
    }
  }

  #[test]
  fn decode_keeps_best_per_cluster_in_score_order() {
    let (data, shape) = features_first_output();
    let items = decode_output(&data, &shape, &square_letterbox(), 0.25, 0.7).unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].class_id, 0);
    assert!((items[0].score - 0.90).abs() < 1e-6);
    assert_eq!(items[1].class_id, 1);
    assert!((items[1].score - 0.45).abs() < 1e-6);

    let [x0, y0, x1, y1] = items[0].bbox;
    assert!((x0 - 80.0 / 640.0).abs() < 1e-4);
    assert!((y0 - 80.0 / 640.0).abs() < 1e-4);
    assert!((x1 - 120.0 / 640.0).abs() < 1e-4);
    assert!((y1 - 120.0 / 640.0).abs() < 1e-4);
  }

  #[test]
  fn decode_accepts_transposed_layout() {
    let (data, shape) = features_first_output();
    let mut transposed = vec![0.0; data.len()];
    for f in 0..6 {
      for a in 0..ANCHORS {
        transposed[a * 6 + f] = data[f * ANCHORS + a];
      }
    }
    let a = decode_output(&data, &shape, &square_letterbox(), 0.25, 0.7).unwrap();
    let b = decode_output(&transposed, &[1, ANCHORS, 6], &square_letterbox(), 0.25, 0.7).unwrap();
    assert_eq!(a.len(), 2);
    assert_eq!(a, b);
  }

  #[test]
  fn decode_applies_confidence_threshold() {
    let (data, shape) = features_first_output();
    let items = decode_output(&data, &shape, &square_letterbox(), 0.5, 0.7).unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].class_id, 0);
  }

  #[test]
  fn decode_rejects_bad_shapes() {
    let lb = square_letterbox();
    assert!(matches!(
      decode_output(&[0.0; 12], &[1, 4, 3], &lb, 0.25, 0.7),
      Err(YoloError::OutputShape(_))
    ));
    assert!(matches!(
      decode_output(&[0.0; 10], &[1, 6, 3], &lb, 0.25, 0.7),
      Err(YoloError::OutputShape(_))
    ));
    assert!(matches!(
      decode_output(&[0.0; 18], &[6, 3], &lb, 0.25, 0.7),
      Err(YoloError::OutputShape(_))
    ));
  }

  #[test]
  fn nms_only_suppresses_same_class() {
    let boxed = |class_id, score| DetectItem {
      class_id,
      score,
      bbox: [0.1, 0.1, 0.5, 0.5],
    };
    let kept = nms(vec![boxed(0, 0.5), boxed(1, 0.7), boxed(0, 0.8)], 0.5);
    let scores: Vec<f32> = kept.iter().map(|d| d.score).collect();
    assert_eq!(scores, vec![0.8, 0.7]);
  }

  #[test]
  fn iou_of_disjoint_and_identical_boxes() {
    let a = [0.0, 0.0, 1.0, 1.0];
    assert!((iou(&a, &a) - 1.0).abs() < 1e-6);
    assert_eq!(iou(&a, &[2.0, 2.0, 3.0, 3.0]), 0.0);
    assert!((iou(&a, &[0.5, 0.0, 1.5, 1.0]) - 1.0 / 3.0).abs() < 1e-6);
  }

  #[test]
  fn missing_model_file() {
    let result = YoloBuilder::new("nonexistent.onnx").build();
    assert!(matches!(result, Err(YoloError::ModelNotFound(_))));
  }
}
