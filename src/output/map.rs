// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/output/map.rs - 污染报告地图
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

use serde::Serialize;

/// 地图中心（阿尔巴尼亚）
pub const MAP_CENTER: (f64, f64) = (41.3275, 19.8189);
pub const MAP_ZOOM: u8 = 6;
pub const MAP_WIDTH: u32 = 700;
pub const MAP_HEIGHT: u32 = 450;

pub const LEAFLET_CSS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.css";
pub const LEAFLET_JS: &str = "https://unpkg.com/leaflet@1.9.4/dist/leaflet.js";
const TILE_URL: &str = "https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png";
const TILE_ATTRIBUTION: &str = "&copy; OpenStreetMap contributors";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Marker {
  pub lat: f64,
  pub lon: f64,
  pub popup: String,
  pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapView {
  pub center: (f64, f64),
  pub zoom: u8,
  pub width: u32,
  pub height: u32,
  pub markers: Vec<Marker>,
}

impl MapView {
  /// 固定的示例报告地图，与上传内容无关
  pub fn reports() -> Self {
    MapView {
      center: MAP_CENTER,
      zoom: MAP_ZOOM,
      width: MAP_WIDTH,
      height: MAP_HEIGHT,
      markers: vec![Marker {
        lat: MAP_CENTER.0,
        lon: MAP_CENTER.1,
        popup: "Plastic pollution near coast".to_string(),
        tooltip: "Click for more info".to_string(),
      }],
    }
  }

  /// Leaflet 地图片段，需要页面已引入 [`LEAFLET_CSS`] 与 [`LEAFLET_JS`]
  pub fn to_html(&self, element_id: &str) -> String {
    // serde_json 输出中的 `<` 需转义，避免提前结束 script
    let config = serde_json::to_string(self)
      .unwrap_or_else(|_| "null".to_string())
      .replace('<', "\\u003c");
    format!(
      r#"<div id="{id}" style="width: {w}px; height: {h}px;"></div>
<script>
(function () {{
  const view = {config};
  const map = L.map("{id}").setView(view.center, view.zoom);
  L.tileLayer("{tiles}", {{ maxZoom: 18, attribution: "{attribution}" }}).addTo(map);
  for (const m of view.markers) {{
    L.marker([m.lat, m.lon]).bindPopup(m.popup).bindTooltip(m.tooltip).addTo(map);
  }}
}})();
</script>"#,
      id = element_id,
      w = self.width,
      h = self.height,
      config = config,
      tiles = TILE_URL,
      attribution = TILE_ATTRIBUTION,
    )
  }
}
