// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/output/summary.rs - 检测结果文字摘要
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

use crate::model::{DetectItem, DetectResult, LabelTable};

pub const DETECTED_PREFIX: &str = "✅ Detected: ";
pub const NONE_DETECTED: &str = "⚠️ No objects detected.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Summary {
  /// 按模型返回顺序拼接的 `label (xx.x%)` 列表
  Detected(String),
  NoneFound,
}

impl Summary {
  pub fn from_result(result: &DetectResult) -> Self {
    Self::from_items(&result.labels, &result.items)
  }

  pub fn from_items(labels: &LabelTable, items: &[DetectItem]) -> Self {
    if items.is_empty() {
      return Summary::NoneFound;
    }
    let text = items
      .iter()
      .map(|item| format_detection(&labels.name(item.class_id), item.score))
      .collect::<Vec<_>>()
      .join(", ");
    Summary::Detected(text)
  }

  /// 页面上显示的提示文字
  pub fn notice(&self) -> String {
    match self {
      Summary::Detected(text) => format!("{}{}", DETECTED_PREFIX, text),
      Summary::NoneFound => NONE_DETECTED.to_string(),
    }
  }

  pub fn is_detected(&self) -> bool {
    matches!(self, Summary::Detected(_))
  }
}

/// 百分比在 f64 下计算，避免 f32 乘法在进位边界上的误差
pub fn format_detection(label: &str, score: f32) -> String {
  format!("{} ({:.1}%)", label, f64::from(score) * 100.0)
}
