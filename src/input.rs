// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/input.rs - 上传图像输入
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

use image::{DynamicImage, ImageFormat, ImageReader};
use sanitize_filename::sanitize;
use thiserror::Error;
use tracing::{debug, error};

/// 表单中文件字段的名称
pub const UPLOAD_FIELD: &str = "file";

/// 允许上传的文件扩展名
pub const UPLOAD_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

#[derive(Error, Debug)]
pub enum UploadError {
  #[error("Invalid filename.")]
  InvalidFilename,
  #[error("Unsupported file type '{0}', expected one of: jpg, jpeg, png.")]
  UnsupportedExtension(String),
  #[error("Unsupported image format: {0:?}")]
  UnsupportedFormat(Option<ImageFormat>),
  #[error("The uploaded file is empty.")]
  Empty,
  #[error("The uploaded file exceeds the {0} byte limit.")]
  TooLarge(usize),
  #[error("Failed to read the uploaded image: {0}")]
  IoError(#[from] std::io::Error),
  #[error("Failed to decode the uploaded image: {0}")]
  DecodeError(#[from] image::ImageError),
}

/// 解码后的上传图像
#[derive(Debug, Clone)]
pub struct UploadedImage {
  pub file_name: String,
  pub format: ImageFormat,
  /// 原始文件内容，用于回显预览
  pub bytes: Vec<u8>,
  pub image: DynamicImage,
}

impl UploadedImage {
  pub fn mime_type(&self) -> &'static str {
    self.format.to_mime_type()
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 校验文件名并解码上传内容，只接受 JPEG 与 PNG
pub fn decode_upload(file_name: &str, bytes: Vec<u8>) -> Result<UploadedImage, UploadError> {
  let file_name = sanitize(file_name);
  if file_name.is_empty() {
    return Err(UploadError::InvalidFilename);
  }

  let extension = Path::new(&file_name)
    .extension()
    .and_then(|os_str| os_str.to_str())
    .map(|ext| ext.to_ascii_lowercase())
    .unwrap_or_default();
  if !UPLOAD_EXTENSIONS.contains(&extension.as_str()) {
    error!("上传文件扩展名不受支持: {}", file_name);
    return Err(UploadError::UnsupportedExtension(extension));
  }

  if bytes.is_empty() {
    return Err(UploadError::Empty);
  }

  let reader = ImageReader::new(Cursor::new(bytes.as_slice())).with_guessed_format()?;
  let format = match reader.format() {
    Some(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => format,
    other => {
      error!("上传文件格式不受支持: {} ({:?})", file_name, other);
      return Err(UploadError::UnsupportedFormat(other));
    }
  };
  let image = reader.decode()?;

  debug!(
    "上传图像解码完成: {} {}x{} {:?}",
    file_name,
    image.width(),
    image.height(),
    format
  );

  Ok(UploadedImage {
    file_name,
    format,
    bytes,
    image,
  })
}
