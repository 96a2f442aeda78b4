// 该文件是 yolox-detect 项目的一部分。
// src/output.rs - 输出定义
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
use std::io::Cursor;

use image::{ImageFormat, RgbImage};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::label::{Taxonomy, TaxonomyError};
use crate::model::DetectResult;

pub mod draw;
pub use self::draw::{Draw, Palette};

mod record;
pub use self::record::{DirectoryRecordStore, ImageRecord, RecordStore, RecordStoreError, RecordSummary};

pub const DEFAULT_CONFIDENCE: f32 = 0.45;

#[derive(Error, Debug)]
pub enum RenderError {
  #[error("字体加载错误: {0}")]
  FontError(#[from] ab_glyph::InvalidFont),
  #[error("图像编码错误: {0}")]
  EncodeError(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BBox {
  pub x_min: i32,
  pub y_min: i32,
  pub x_max: i32,
  pub y_max: i32,
}

/// 最终可见的一个检测结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropInfo {
  pub bbox: BBox,
  pub class: String,
  /// 百分比，保留一位小数
  pub confidence: f32,
  #[serde(skip)]
  pub class_id: u32,
}

/// 按展示置信度再次过滤，并解析类别名称
pub fn extract_crops(
  result: &DetectResult,
  taxonomy: &Taxonomy,
  confidence: f32,
) -> Result<Vec<CropInfo>, TaxonomyError> {
  let crops = result
    .iter()
    .filter(|item| item.score >= confidence)
    .map(|item| {
      Ok(CropInfo {
        // 向零截断取整
        bbox: BBox {
          x_min: item.bbox[0] as i32,
          y_min: item.bbox[1] as i32,
          x_max: item.bbox[2] as i32,
          y_max: item.bbox[3] as i32,
        },
        class: taxonomy.name(item.class_id)?.to_string(),
        confidence: ((item.score as f64 * 1000.0).round() / 10.0) as f32,
        class_id: item.class_id,
      })
    })
    .collect::<Result<Vec<_>, TaxonomyError>>()?;
  debug!("置信度 {} 过滤后剩余 {} 个目标", confidence, crops.len());
  Ok(crops)
}

/// 类别名称到检测数量的映射
pub fn summarize(crops: &[CropInfo]) -> BTreeMap<String, u32> {
  let mut summary = BTreeMap::new();
  for crop in crops {
    *summary.entry(crop.class.clone()).or_insert(0) += 1;
  }
  summary
}

/// 无损 PNG 编码
pub fn encode_png(image: &RgbImage) -> Result<Vec<u8>, RenderError> {
  let mut buffer = Vec::new();
  image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
  Ok(buffer)
}
