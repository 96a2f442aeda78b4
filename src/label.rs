// 该文件是 yolox-detect 项目的一部分。
// src/label.rs - 类别标签表
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

use thiserror::Error;
use tracing::debug;

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
pub enum TaxonomyError {
  #[error("类别编号 {id} 超出类别表范围 (共 {len} 类)")]
  OutOfRange { id: u32, len: usize },
  #[error("类别表为空")]
  Empty,
  #[error("读取类别文件错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 固定的类别表，创建后只读，可在线程间共享
#[derive(Debug, Clone)]
pub struct Taxonomy {
  names: Arc<[String]>,
}

impl Default for Taxonomy {
  fn default() -> Self {
    Self::coco()
  }
}

impl Taxonomy {
  pub fn coco() -> Self {
    Self {
      names: COCO_CLASSES.iter().map(|s| s.to_string()).collect(),
    }
  }

  pub fn new<I, S>(names: I) -> Result<Self, TaxonomyError>
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    let names: Arc<[String]> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(TaxonomyError::Empty);
    }
    Ok(Self { names })
  }

  /// 从每行一个类别名的文本文件加载，空行忽略
  pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, TaxonomyError> {
    let content = std::fs::read_to_string(path.as_ref())?;
    let taxonomy = Self::new(
      content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty()),
    )?;
    debug!(
      "从 {} 加载 {} 个类别",
      path.as_ref().display(),
      taxonomy.len()
    );
    Ok(taxonomy)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name(&self, id: u32) -> Result<&str, TaxonomyError> {
    self
      .names
      .get(id as usize)
      .map(String::as_str)
      .ok_or(TaxonomyError::OutOfRange {
        id,
        len: self.names.len(),
      })
  }

  pub fn names(&self) -> &[String] {
    &self.names
  }
}
