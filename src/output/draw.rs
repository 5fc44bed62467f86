// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use thiserror::Error;
use tracing::{error, info};

use crate::model::DetectResult;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const BOX_THICKNESS: i32 = 2;
const PALETTE_SIZE: usize = 20;
const LABEL_TEXT_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

// 内置字体 DejaVu Sans
static DEFAULT_FONT: &[u8] = include_bytes!("../../assets/font.ttf");

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体文件无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

/// 检测结果叠加图绘制
///
/// 默认使用内置字体绘制标签文字，可通过 [`Draw::with_font_file`] 替换。
pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontArc>,
  colors: Vec<Rgb<u8>>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      font: default_font(),
      colors: (0..PALETTE_SIZE)
        .map(|i| hsv_to_rgb(i as f32 / PALETTE_SIZE as f32 * 360.0, 0.8, 0.9))
        .collect(),
    }
  }
}

impl Draw {
  pub fn with_font_file(path: &Path) -> Result<Self, DrawError> {
    info!("加载标签字体: {}", path.display());
    let data = std::fs::read(path)?;
    let font = FontArc::try_from_vec(data)?;
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  pub fn color_of(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }

  /// 在原图副本上绘制所有检测框
  pub fn plot(&self, result: &DetectResult) -> RgbImage {
    let mut image = result.image.clone();
    for item in result.items.iter() {
      let label = format!("{} {:.2}", result.label_of(item), item.score);
      self.draw_bbox_with_label(&mut image, &item.bbox, &label, self.color_of(item.class_id));
    }
    image
  }

  // bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label(&self, image: &mut RgbImage, bbox: &[f32; 4], label: &str, color: Rgb<u8>) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let x_min = ((bbox[0] * w).floor() as i32).clamp(0, w as i32 - 1);
    let y_min = ((bbox[1] * h).floor() as i32).clamp(0, h as i32 - 1);
    let x_max = ((bbox[2] * w).ceil() as i32).clamp(0, w as i32 - 1);
    let y_max = ((bbox[3] * h).ceil() as i32).clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 边框加粗
    for t in 0..BOX_THICKNESS {
      let (width, height) = (x_max - x_min - 2 * t, y_max - y_min - 2 * t);
      if width <= 0 || height <= 0 {
        break;
      }
      let rect = Rect::at(x_min + t, y_min + t).of_size(width as u32 + 1, height as u32 + 1);
      draw_hollow_rect_mut(image, rect, color);
    }

    // 标签位于边框上方，空间不足时放在框内
    let text_width = (label.chars().count() as f32 * self.label_char_width) as i32;
    let label_x = x_min;
    let label_y = if y_min >= self.label_text_height {
      y_min - self.label_text_height
    } else {
      y_min
    };
    let label_width = text_width.min(w as i32 - label_x);
    let label_height = self.label_text_height.min(h as i32 - label_y);
    if label_width <= 0 || label_height <= 0 {
      return;
    }

    let rect = Rect::at(label_x, label_y).of_size(label_width as u32, label_height as u32);
    draw_filled_rect_mut(image, rect, color);

    if let Some(font) = &self.font {
      draw_text_mut(
        image,
        LABEL_TEXT_COLOR,
        label_x,
        label_y + self.label_text_vertical_padding,
        PxScale::from(self.font_size),
        font,
        label,
      );
    }
  }
}

fn default_font() -> Option<FontArc> {
  FontArc::try_from_slice(DEFAULT_FONT)
    .map_err(|e| error!("内置字体无效，标签将不显示文字: {}", e))
    .ok()
}

/// HSV 转 RGB
fn hsv_to_rgb(h: f32, s: f32, v: f32) -> Rgb<u8> {
  let c = v * s;
  let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
  let m = v - c;

  let (r, g, b) = if h < 60.0 {
    (c, x, 0.0)
  } else if h < 120.0 {
    (x, c, 0.0)
  } else if h < 180.0 {
    (0.0, c, x)
  } else if h < 240.0 {
    (0.0, x, c)
  } else if h < 300.0 {
    (x, 0.0, c)
  } else {
    (c, 0.0, x)
  };

  Rgb([
    ((r + m) * 255.0) as u8,
    ((g + m) * 255.0) as u8,
    ((b + m) * 255.0) as u8,
  ])
}
