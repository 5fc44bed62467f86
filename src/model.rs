// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/model.rs - 模型
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
use std::sync::Arc;

use image::RgbImage;

/// 目标检测模型
///
/// 推理接口以文件路径为输入，模型自行解码图像。
pub trait Model {
  type Error: std::error::Error + Send + Sync + 'static;

  fn labels(&self) -> &Arc<LabelTable>;
  fn infer(&self, path: &Path) -> Result<DetectResult, Self::Error>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]，归一化坐标
}

/// 单张图像的检测结果
#[derive(Debug, Clone)]
pub struct DetectResult {
  pub labels: Arc<LabelTable>,
  pub items: Box<[DetectItem]>,
  /// 推理时使用的原始图像，用于绘制叠加图
  pub image: RgbImage,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn label_of(&self, item: &DetectItem) -> String {
    self.labels.name(item.class_id)
  }
}

mod labels;
pub use self::labels::{COCO_CLASSES, LabelError, LabelTable};

pub mod loader;
pub use self::loader::ModelLoader;

mod yolo;
pub use self::yolo::{Yolo, YoloBuilder, YoloError};
