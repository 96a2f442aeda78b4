// 该文件是 yolox-detect 项目的一部分。
// src/frame.rs - 预处理张量定义
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
use ndarray::Array3;

pub const RGB_CHANNELS: usize = 3;

/// 张量的通道排列顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelOrder {
  /// YOLOX 官方导出模型以 BGR 训练
  #[default]
  Bgr,
  Rgb,
}

impl ChannelOrder {
  /// 张量第 `c` 个通道对应的 RGB 像素分量下标
  fn source_channel(self, c: usize) -> usize {
    match self {
      ChannelOrder::Bgr => RGB_CHANNELS - 1 - c,
      ChannelOrder::Rgb => c,
    }
  }
}

/// Letterbox 后的 CHW 浮点张量，以及回到归一化图像坐标所需的缩放比
#[derive(Debug, Clone)]
pub struct PreprocessedTensor {
  data: Array3<f32>,
  ratio: f32,
}

impl PreprocessedTensor {
  /// 由已填充完毕的画布构建张量，像素值保持 0~255 不做归一化
  pub fn from_canvas(canvas: &RgbImage, order: ChannelOrder, ratio: f32) -> Self {
    let (width, height) = canvas.dimensions();
    let data = Array3::from_shape_fn(
      (RGB_CHANNELS, height as usize, width as usize),
      |(c, y, x)| canvas.get_pixel(x as u32, y as u32)[order.source_channel(c)] as f32,
    );
    Self { data, ratio }
  }

  pub fn data(&self) -> &Array3<f32> {
    &self.data
  }

  pub fn ratio(&self) -> f32 {
    self.ratio
  }

  pub fn channels(&self) -> usize {
    self.data.dim().0
  }

  pub fn height(&self) -> usize {
    self.data.dim().1
  }

  pub fn width(&self) -> usize {
    self.data.dim().2
  }

  /// 添加批次维度后的形状 `[1, C, H, W]`
  pub fn nchw_shape(&self) -> [usize; 4] {
    [1, self.channels(), self.height(), self.width()]
  }
}
