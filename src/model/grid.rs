// 该文件是 yolox-detect 项目的一部分。
// src/model/grid.rs - 多步长网格解码
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

use ndarray::Array2;
use tracing::{debug, error};

use super::{BOX_PARAMS, InferenceError, RawOutput};

/// 检测头步长，从小到大，与原始输出的行拼接顺序一致
pub const STRIDES: [u32; 3] = [8, 16, 32];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
  pub x: u32,
  pub y: u32,
  pub stride: u32,
}

/// 所有检测头的网格单元，按步长递增拼接，每个步长内按行优先排列
#[derive(Debug, Clone)]
pub struct Grid {
  cells: Box<[GridCell]>,
}

impl Grid {
  /// 调用方需保证目标尺寸能被每个步长整除
  pub fn new(target_width: u32, target_height: u32, strides: &[u32]) -> Self {
    let mut cells = Vec::with_capacity(Self::expected_len(target_width, target_height, strides));
    for &stride in strides {
      let (hsize, wsize) = (target_height / stride, target_width / stride);
      for y in 0..hsize {
        for x in 0..wsize {
          cells.push(GridCell { x, y, stride });
        }
      }
    }
    debug!(
      "构建网格: {}x{}, 步长 {:?}, 共 {} 个单元",
      target_width,
      target_height,
      strides,
      cells.len()
    );
    Self {
      cells: cells.into_boxed_slice(),
    }
  }

  /// Σ (target_h / s) × (target_w / s)
  pub fn expected_len(target_width: u32, target_height: u32, strides: &[u32]) -> usize {
    strides
      .iter()
      .map(|&s| (target_height / s) as usize * (target_width / s) as usize)
      .sum()
  }

  pub fn len(&self) -> usize {
    self.cells.len()
  }

  pub fn is_empty(&self) -> bool {
    self.cells.is_empty()
  }

  pub fn cells(&self) -> &[GridCell] {
    &self.cells
  }

  /// 解码为中心点与宽高 `[N, 4]`：
  /// `center = (raw + offset) * stride`，`size = exp(raw) * stride`
  pub fn decode(&self, raw: &RawOutput) -> Result<Array2<f32>, InferenceError> {
    if raw.rows() != self.len() || raw.cols() < BOX_PARAMS {
      error!(
        "原始输出行数 {} 与网格单元数 {} 不一致",
        raw.rows(),
        self.len()
      );
      return Err(InferenceError::ShapeMismatch {
        expected: vec![self.len(), BOX_PARAMS],
        actual: vec![raw.rows(), raw.cols()],
      });
    }

    let view = raw.view();
    let mut decoded = Array2::<f32>::zeros((self.len(), BOX_PARAMS));
    for (i, cell) in self.cells.iter().enumerate() {
      let stride = cell.stride as f32;
      decoded[[i, 0]] = (view[[i, 0]] + cell.x as f32) * stride;
      decoded[[i, 1]] = (view[[i, 1]] + cell.y as f32) * stride;
      decoded[[i, 2]] = view[[i, 2]].exp() * stride;
      decoded[[i, 3]] = view[[i, 3]].exp() * stride;
    }
    Ok(decoded)
  }
}
