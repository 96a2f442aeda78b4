// 该文件是 yolox-detect 项目的一部分。
// src/input.rs - 图像输入与预处理
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

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, error};

mod letterbox;
pub use self::letterbox::{
  DEFAULT_INPUT_SIZE, DISPLAY_MAX_HEIGHT, DISPLAY_MAX_WIDTH, DisplayCap, Letterbox, PAD_VALUE,
  PreprocessError,
};

mod read_image_file;
pub use self::read_image_file::ImageFileInput;

#[derive(Error, Debug)]
pub enum DecodeError {
  #[error("图像数据为空")]
  Empty,
  #[error("图像解码错误: {0}")]
  ImageError(#[from] image::ImageError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 将任意常见编码的图像字节解码为 RGB 图像
pub fn decode_image(bytes: &[u8]) -> Result<RgbImage, DecodeError> {
  if bytes.is_empty() {
    error!("收到空的图像数据");
    return Err(DecodeError::Empty);
  }

  let image = image::load_from_memory(bytes).inspect_err(|e| error!("图像解码失败: {}", e))?;
  debug!("图像解码完成: {}x{}", image.width(), image.height());
  Ok(image.to_rgb8())
}
