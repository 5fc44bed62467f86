// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/model/labels.rs - 类别标签表
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

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("标签文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  TomlError(#[from] toml::de::Error),
  #[error("无效的类别编号: {0}")]
  InvalidClassId(String),
  #[error("无法解析模型中的类别元数据: {0}")]
  InvalidMetadata(String),
}

/// 类别编号到名称的映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelTable {
  names: BTreeMap<u32, String>,
}

#[derive(Deserialize)]
struct LabelFile {
  labels: BTreeMap<String, String>,
}

impl LabelTable {
  pub fn coco() -> Self {
    COCO_CLASSES
      .iter()
      .enumerate()
      .map(|(id, name)| (id as u32, name.to_string()))
      .collect()
  }

  /// 从 TOML 标签文件读取，格式为：
  ///
  /// ```toml
  /// [labels]
  /// 0 = "fish"
  /// 1 = "plastic"
  /// ```
  pub fn from_toml_file(path: &Path) -> Result<Self, LabelError> {
    info!("加载标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_toml_str(&text)
  }

  pub fn from_toml_str(text: &str) -> Result<Self, LabelError> {
    let file: LabelFile = toml::from_str(text)?;
    let mut names = BTreeMap::new();
    for (key, name) in file.labels {
      let id = key
        .trim()
        .parse::<u32>()
        .map_err(|_| LabelError::InvalidClassId(key.clone()))?;
      names.insert(id, name);
    }
    Ok(LabelTable { names })
  }

  /// 解析 Ultralytics 导出时写入的 `names` 元数据，
  /// 形如 `{0: 'fish', 1: 'plastic'}`
  pub fn from_ultralytics_names(text: &str) -> Result<Self, LabelError> {
    let body = text
      .trim()
      .strip_prefix('{')
      .and_then(|s| s.strip_suffix('}'))
      .ok_or_else(|| LabelError::InvalidMetadata(text.to_string()))?;

    let mut names = BTreeMap::new();
    let mut rest = body.trim_start();
    while !rest.is_empty() {
      let (key, after_key) = rest
        .split_once(':')
        .ok_or_else(|| LabelError::InvalidMetadata(text.to_string()))?;
      let id = key
        .trim()
        .parse::<u32>()
        .map_err(|_| LabelError::InvalidClassId(key.trim().to_string()))?;

      let (name, after_value) = read_quoted(after_key.trim_start())
        .ok_or_else(|| LabelError::InvalidMetadata(text.to_string()))?;
      names.insert(id, name);

      rest = after_value.trim_start();
      rest = rest.strip_prefix(',').unwrap_or(rest).trim_start();
    }

    debug!("从模型元数据解析出 {} 个类别", names.len());
    Ok(LabelTable { names })
  }

  /// 类别名称；表中不存在时返回 `class <id>`
  pub fn name(&self, class_id: u32) -> String {
    self
      .names
      .get(&class_id)
      .cloned()
      .unwrap_or_else(|| format!("class {}", class_id))
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }
}

/// 读取一个带引号的字符串字面量，返回内容与剩余部分
///
/// 引号可以是单引号或双引号，支持 `\'`、`\"`、`\\` 等转义。
fn read_quoted(text: &str) -> Option<(String, &str)> {
  let mut chars = text.char_indices();
  let quote = match chars.next()? {
    (_, c @ ('\'' | '"')) => c,
    _ => return None,
  };

  let mut value = String::new();
  while let Some((i, c)) = chars.next() {
    match c {
      '\\' => {
        let (_, escaped) = chars.next()?;
        match escaped {
          'n' => value.push('\n'),
          't' => value.push('\t'),
          'r' => value.push('\r'),
          '\\' | '\'' | '"' => value.push(escaped),
          other => {
            value.push('\\');
            value.push(other);
          }
        }
      }
      c if c == quote => return Some((value, &text[i + c.len_utf8()..])),
      c => value.push(c),
    }
  }
  None
}

impl FromIterator<(u32, String)> for LabelTable {
  fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
    LabelTable {
      names: iter.into_iter().collect(),
    }
  }
}
