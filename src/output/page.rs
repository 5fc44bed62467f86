// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/output/page.rs - 页面渲染
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

use std::fmt::Write;
use std::io::Cursor;

use base64::{Engine, engine::general_purpose::STANDARD};
use image::{ImageFormat, RgbImage};
use thiserror::Error;

use crate::input::UploadedImage;
use crate::output::map::{LEAFLET_CSS, LEAFLET_JS, MapView};
use crate::output::summary::Summary;

pub const PAGE_TITLE: &str = "ReefLog – FindingNemo";
pub const HEADING: &str = "🐠 FindingNemo – Protect Marine Life";
pub const INTRO: &str =
  "Upload a photo of marine life or pollution, and our AI will try to identify it!";
pub const UPLOAD_LABEL: &str = "📷 Upload an image";
pub const ANALYZING: &str = "⏳ Analyzing image with AI model...";
pub const REPORTS_HEADER: &str = "🌍 Global Reports";
pub const FOOTER: &str = "🐟 FindingNemo – Hackathon Prototype with YOLOv8 AI Detection";
pub const MAP_ELEMENT_ID: &str = "reports-map";

#[derive(Error, Debug)]
pub enum PageError {
  #[error("叠加图编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
}

/// 以 data URI 嵌入页面的图像
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedImage {
  pub mime: &'static str,
  pub base64: String,
}

impl EmbeddedImage {
  pub fn from_upload(upload: &UploadedImage) -> Self {
    EmbeddedImage {
      mime: upload.mime_type(),
      base64: STANDARD.encode(&upload.bytes),
    }
  }

  pub fn png(image: &RgbImage) -> Result<Self, PageError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(EmbeddedImage {
      mime: ImageFormat::Png.to_mime_type(),
      base64: STANDARD.encode(&bytes),
    })
  }

  pub fn data_uri(&self) -> String {
    format!("data:{};base64,{}", self.mime, self.base64)
  }
}

/// 检测结果区域
#[derive(Debug, Clone)]
pub struct Analysis {
  pub summary: Summary,
  pub overlay: EmbeddedImage,
}

/// 一次渲染的页面内容
#[derive(Debug, Clone)]
pub struct Page {
  pub preview: Option<EmbeddedImage>,
  pub analysis: Option<Analysis>,
  pub error: Option<String>,
  pub map: MapView,
}

impl Default for Page {
  fn default() -> Self {
    Page {
      preview: None,
      analysis: None,
      error: None,
      map: MapView::reports(),
    }
  }
}

impl Page {
  pub fn render(&self) -> String {
    let mut html = String::with_capacity(4096);

    let _ = write!(
      html,
      r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<link rel="icon" href="data:image/svg+xml,<svg xmlns='http://www.w3.org/2000/svg' viewBox='0 0 100 100'><text y='.9em' font-size='90'>🌊</text></svg>">
<link rel="stylesheet" href="{css}">
<script src="{js}"></script>
<style>
body {{ max-width: 760px; margin: 2rem auto; padding: 0 1rem; font-family: sans-serif; }}
img.result {{ width: 100%; }}
figcaption {{ color: #666; font-size: 0.9rem; text-align: center; }}
.notice {{ padding: 0.8rem 1rem; border-radius: 0.4rem; margin: 1rem 0; }}
.success {{ background: #e6f4ea; color: #1e4620; }}
.warning {{ background: #fff8e1; color: #663c00; }}
.error {{ background: #fdecea; color: #611a15; }}
footer {{ color: #666; font-size: 0.9rem; }}
</style>
</head>
<body>
<h1>{heading}</h1>
<p>{intro}</p>
<form method="post" action="/" enctype="multipart/form-data">
<label for="file">{upload_label}</label>
<input type="file" id="file" name="file" accept=".jpg,.jpeg,.png,image/jpeg,image/png" onchange="this.form.submit()">
<noscript><button type="submit">Upload</button></noscript>
</form>
"#,
      title = escape(PAGE_TITLE),
      css = LEAFLET_CSS,
      js = LEAFLET_JS,
      heading = escape(HEADING),
      intro = escape(INTRO),
      upload_label = escape(UPLOAD_LABEL),
    );

    if let Some(preview) = &self.preview {
      let _ = writeln!(
        html,
        r#"<figure><img class="result" alt="Uploaded Image" src="{}"><figcaption>Uploaded Image</figcaption></figure>"#,
        preview.data_uri()
      );
      let _ = writeln!(html, "<p>{}</p>", escape(ANALYZING));
    }

    if let Some(error) = &self.error {
      let _ = writeln!(html, r#"<div class="notice error">{}</div>"#, escape(error));
    }

    if let Some(analysis) = &self.analysis {
      let class = if analysis.summary.is_detected() {
        "success"
      } else {
        "warning"
      };
      let _ = writeln!(
        html,
        r#"<div class="notice {}">{}</div>"#,
        class,
        escape(&analysis.summary.notice())
      );
      let _ = writeln!(
        html,
        r#"<figure><img class="result" alt="Detection Results" src="{}"><figcaption>Detection Results</figcaption></figure>"#,
        analysis.overlay.data_uri()
      );
    }

    let _ = writeln!(html, "<h2>{}</h2>", escape(REPORTS_HEADER));
    let _ = writeln!(html, "{}", self.map.to_html(MAP_ELEMENT_ID));
    let _ = write!(
      html,
      "<hr>\n<footer>{}</footer>\n</body>\n</html>\n",
      escape(FOOTER)
    );

    html
  }
}

/// HTML 文本转义
pub fn escape(text: &str) -> String {
  let mut out = String::with_capacity(text.len());
  for c in text.chars() {
    match c {
      '&' => out.push_str("&amp;"),
      '<' => out.push_str("&lt;"),
      '>' => out.push_str("&gt;"),
      '"' => out.push_str("&quot;"),
      '\'' => out.push_str("&#39;"),
      c => out.push(c),
    }
  }
  out
}
