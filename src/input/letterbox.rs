// 该文件是 yolox-detect 项目的一部分。
// src/input/letterbox.rs - 显示尺寸归一化与 Letterbox 预处理
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

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};
use thiserror::Error;
use tracing::{debug, error};

use crate::frame::{ChannelOrder, PreprocessedTensor};

pub const DEFAULT_INPUT_SIZE: u32 = 640;
pub const PAD_VALUE: u8 = 114;
pub const DISPLAY_MAX_HEIGHT: u32 = 1024;
pub const DISPLAY_MAX_WIDTH: u32 = 720;

#[derive(Error, Debug)]
pub enum PreprocessError {
  #[error("图像尺寸无效: {width}x{height}")]
  InvalidDimensions { width: u32, height: u32 },
  #[error("目标尺寸无效: {width}x{height}")]
  InvalidTarget { width: u32, height: u32 },
  #[error("目标尺寸 {size} 无法被步长 {stride} 整除")]
  IndivisibleTarget { size: u32, stride: u32 },
}

fn check_dimensions(image: &RgbImage) -> Result<(), PreprocessError> {
  let (width, height) = image.dimensions();
  if width == 0 || height == 0 {
    error!("图像尺寸无效: {}x{}", width, height);
    return Err(PreprocessError::InvalidDimensions { width, height });
  }
  Ok(())
}

/// 按比例缩放一条边，向零截断，且至少保留 1 个像素
fn scale_side(side: u32, scale: f64) -> u32 {
  ((side as f64 * scale) as u32).max(1)
}

/// 显示尺寸上限：超过上限的图像会被等比缩小
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplayCap {
  pub max_width: u32,
  pub max_height: u32,
}

impl Default for DisplayCap {
  fn default() -> Self {
    Self {
      max_width: DISPLAY_MAX_WIDTH,
      max_height: DISPLAY_MAX_HEIGHT,
    }
  }
}

impl DisplayCap {
  /// 返回后续所有坐标所在的“归一化图像”。
  /// 未超过上限时原样返回，否则用区域平均插值等比缩小。
  pub fn normalize(&self, image: &RgbImage) -> Result<RgbImage, PreprocessError> {
    check_dimensions(image)?;
    let (width, height) = image.dimensions();
    if width <= self.max_width && height <= self.max_height {
      return Ok(image.clone());
    }

    let scale = (self.max_height as f64 / height as f64).min(self.max_width as f64 / width as f64);
    let new_width = scale_side(width, scale);
    let new_height = scale_side(height, scale);
    debug!(
      "图像超过显示上限，缩放 {}x{} -> {}x{}",
      width, height, new_width, new_height
    );

    Ok(imageops::thumbnail(image, new_width, new_height))
  }
}

/// Letterbox 预处理：等比缩放后贴到固定尺寸画布的左上角，其余部分以常量填充
#[derive(Debug, Clone)]
pub struct Letterbox {
  target_width: u32,
  target_height: u32,
  pad_value: u8,
  channel_order: ChannelOrder,
}

impl Default for Letterbox {
  fn default() -> Self {
    Self::new(DEFAULT_INPUT_SIZE, DEFAULT_INPUT_SIZE)
  }
}

impl Letterbox {
  pub fn new(target_width: u32, target_height: u32) -> Self {
    Self {
      target_width,
      target_height,
      pad_value: PAD_VALUE,
      channel_order: ChannelOrder::default(),
    }
  }

  pub fn with_pad_value(mut self, pad_value: u8) -> Self {
    self.pad_value = pad_value;
    self
  }

  pub fn with_channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.channel_order = channel_order;
    self
  }

  pub fn target_width(&self) -> u32 {
    self.target_width
  }

  pub fn target_height(&self) -> u32 {
    self.target_height
  }

  /// 检查目标尺寸能否被每个步长整除
  pub fn validate(&self, strides: &[u32]) -> Result<(), PreprocessError> {
    if self.target_width == 0 || self.target_height == 0 {
      return Err(PreprocessError::InvalidTarget {
        width: self.target_width,
        height: self.target_height,
      });
    }
    for &stride in strides {
      for size in [self.target_width, self.target_height] {
        if stride == 0 || size % stride != 0 {
          return Err(PreprocessError::IndivisibleTarget { size, stride });
        }
      }
    }
    Ok(())
  }

  /// 缩放比 `min(target_h / h, target_w / w)`
  pub fn ratio(&self, width: u32, height: u32) -> f64 {
    (self.target_height as f64 / height as f64).min(self.target_width as f64 / width as f64)
  }

  pub fn apply(&self, image: &RgbImage) -> Result<PreprocessedTensor, PreprocessError> {
    check_dimensions(image)?;
    self.validate(&[])?;

    let (width, height) = image.dimensions();
    let ratio = self.ratio(width, height);
    let new_width = scale_side(width, ratio).min(self.target_width);
    let new_height = scale_side(height, ratio).min(self.target_height);

    let mut canvas = RgbImage::from_pixel(
      self.target_width,
      self.target_height,
      Rgb([self.pad_value; 3]),
    );
    if (new_width, new_height) == (width, height) {
      imageops::replace(&mut canvas, image, 0, 0);
    } else {
      let resized = imageops::resize(image, new_width, new_height, FilterType::Triangle);
      imageops::replace(&mut canvas, &resized, 0, 0);
    }

    debug!(
      "Letterbox: {}x{} -> {}x{}, 画布 {}x{}, 缩放比 {:.4}",
      width, height, new_width, new_height, self.target_width, self.target_height, ratio
    );

    Ok(PreprocessedTensor::from_canvas(
      &canvas,
      self.channel_order,
      ratio as f32,
    ))
  }
}
