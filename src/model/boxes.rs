// 该文件是 yolox-detect 项目的一部分。
// src/model/boxes.rs - 边界框坐标变换与 IoU
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

use ndarray::{Array2, ArrayView2};

/// 中心点宽高 `[N, 4]` 转为角点坐标，并除以 `ratio` 回到归一化图像坐标。
/// 不做越界裁剪。
pub fn to_corners(centers: ArrayView2<'_, f32>, ratio: f32) -> Array2<f32> {
  let mut corners = Array2::<f32>::zeros((centers.nrows(), 4));
  for (i, row) in centers.outer_iter().enumerate() {
    let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
    corners[[i, 0]] = (cx - w / 2.0) / ratio;
    corners[[i, 1]] = (cy - h / 2.0) / ratio;
    corners[[i, 2]] = (cx + w / 2.0) / ratio;
    corners[[i, 3]] = (cy + h / 2.0) / ratio;
  }
  corners
}

pub fn row_bbox(boxes: &ArrayView2<'_, f32>, i: usize) -> [f32; 4] {
  [boxes[[i, 0]], boxes[[i, 1]], boxes[[i, 2]], boxes[[i, 3]]]
}

/// 面积计算约定
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AreaConvention {
  /// 像素计数 `(x2 - x1 + 1) * (y2 - y1 + 1)`
  #[default]
  Inclusive,
  /// 连续坐标 `(x2 - x1) * (y2 - y1)`
  Exclusive,
}

impl AreaConvention {
  fn offset(self) -> f32 {
    match self {
      AreaConvention::Inclusive => 1.0,
      AreaConvention::Exclusive => 0.0,
    }
  }

  pub fn area(self, bbox: &[f32; 4]) -> f32 {
    (bbox[2] - bbox[0] + self.offset()) * (bbox[3] - bbox[1] + self.offset())
  }

  pub fn iou(self, a: &[f32; 4], b: &[f32; 4]) -> f32 {
    let xx1 = a[0].max(b[0]);
    let yy1 = a[1].max(b[1]);
    let xx2 = a[2].min(b[2]);
    let yy2 = a[3].min(b[3]);

    let w = (xx2 - xx1 + self.offset()).max(0.0);
    let h = (yy2 - yy1 + self.offset()).max(0.0);
    let inter = w * h;
    let union = self.area(a) + self.area(b) - inter;

    if union > 0.0 { inter / union } else { 0.0 }
  }
}
