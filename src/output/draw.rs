// 该文件是 yolox-detect 项目的一部分。
// src/output/draw.rs - 目标检测结果可视化
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

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;

use super::{CropInfo, RenderError};
use crate::label::COCO_CLASSES;

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 16.0;
const LABEL_TEXT_COLOR: [u8; 3] = [0, 0, 0];
const BOX_THICKNESS: i32 = 4;

static FONT_DATA: &[u8] = include_bytes!("../../assets/font.ttf");

/// 按类别编号索引的固定调色板
#[derive(Debug, Clone)]
pub struct Palette {
  colors: Box<[Rgb<u8>]>,
}

impl Default for Palette {
  fn default() -> Self {
    Self::new(COCO_CLASSES.len())
  }
}

impl Palette {
  /// 在色相环上均匀取 `size` 种颜色
  pub fn new(size: usize) -> Self {
    let size = size.max(1);
    let colors = (0..size)
      .map(|i| {
        let hue = (i as f32 / size as f32) * 360.0;
        hue_color(hue, 0.8, 0.9)
      })
      .collect();
    Self { colors }
  }

  pub fn color(&self, class_id: u32) -> Rgb<u8> {
    self.colors[class_id as usize % self.colors.len()]
  }
}

/// 色相（度）、饱和度、明度转为 RGB 像素
fn hue_color(hue: f32, saturation: f32, value: f32) -> Rgb<u8> {
  let chroma = value * saturation;
  let sector = hue.rem_euclid(360.0) / 60.0;
  let second = chroma * (1.0 - (sector % 2.0 - 1.0).abs());
  let base = value - chroma;

  let (r, g, b) = match sector as u32 {
    0 => (chroma, second, 0.0),
    1 => (second, chroma, 0.0),
    2 => (0.0, chroma, second),
    3 => (0.0, second, chroma),
    4 => (second, 0.0, chroma),
    _ => (chroma, 0.0, second),
  };
  Rgb([r, g, b].map(|c| ((c + base) * 255.0).round() as u8))
}

/// 把坐标限制在画布外一个像素以内，越界的边保持在画布之外
fn clamp_to_canvas(v: i64, len: u32) -> i64 {
  v.clamp(-1, i64::from(len))
}

/// 标注绘制器，字体与调色板创建后只读
pub struct Draw {
  font: FontArc,
  font_size: f32,
  thickness: i32,
  palette: Palette,
}

impl Draw {
  pub fn new() -> Result<Self, RenderError> {
    let font = FontArc::try_from_slice(FONT_DATA)?;
    Ok(Self {
      font,
      font_size: LABEL_FONT_SIZE,
      thickness: BOX_THICKNESS,
      palette: Palette::default(),
    })
  }

  pub fn with_palette(mut self, palette: Palette) -> Self {
    self.palette = palette;
    self
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  pub fn with_thickness(mut self, thickness: i32) -> Self {
    self.thickness = thickness.max(1);
    self
  }

  pub fn palette(&self) -> &Palette {
    &self.palette
  }

  /// 在新的图像缓冲区上绘制标注，输入图像不会被修改
  pub fn annotate(&self, image: &RgbImage, crops: &[CropInfo]) -> RgbImage {
    let mut canvas = image.clone();
    for crop in crops {
      self.draw_bbox_with_label(&mut canvas, crop);
    }
    canvas
  }

  fn draw_bbox_with_label(&self, image: &mut RgbImage, crop: &CropInfo) {
    let color = self.palette.color(crop.class_id);
    let (canvas_width, canvas_height) = image.dimensions();
    let bbox = crop.bbox;
    let [x_min, y_min, x_max, y_max] =
      [bbox.x_min, bbox.y_min, bbox.x_max, bbox.y_max].map(i64::from);

    // 边框向内加粗，端点包含在内；框坐标未经裁剪，可能远超画布
    for t in 0..i64::from(self.thickness) {
      let (left, top, right, bottom) = (x_min + t, y_min + t, x_max - t, y_max - t);
      if right < left || bottom < top {
        break;
      }
      let outside = right < 0
        || bottom < 0
        || left >= i64::from(canvas_width)
        || top >= i64::from(canvas_height);
      if outside {
        continue;
      }
      let left = clamp_to_canvas(left, canvas_width);
      let top = clamp_to_canvas(top, canvas_height);
      let right = clamp_to_canvas(right, canvas_width);
      let bottom = clamp_to_canvas(bottom, canvas_height);
      let rect = Rect::at(left as i32, top as i32)
        .of_size((right - left + 1) as u32, (bottom - top + 1) as u32);
      draw_hollow_rect_mut(image, rect, color);
    }

    let label = format!("{} {:.1}%", crop.class, crop.confidence);
    let scale = PxScale::from(self.font_size);
    let (text_width, text_height) = text_size(scale, &self.font, &label);

    // 标签背景放在边框上方，超出画布时贴边
    let label_x = x_min.clamp(-i64::from(text_width), i64::from(canvas_width)) as i32;
    let label_y = (y_min - i64::from(text_height)).clamp(0, i64::from(canvas_height)) as i32;
    let rect = Rect::at(label_x, label_y).of_size(text_width.max(1), text_height.max(1));
    draw_filled_rect_mut(image, rect, color);

    draw_text_mut(
      image,
      Rgb(LABEL_TEXT_COLOR),
      label_x,
      label_y,
      scale,
      &self.font,
      &label,
    );
  }
}
