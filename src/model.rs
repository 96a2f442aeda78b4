// 该文件是 yolox-detect 项目的一部分。
// src/model.rs - 模型
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
use ndarray::{Array2, ArrayView2, Axis};
use thiserror::Error;

use crate::frame::PreprocessedTensor;

/// 每行前 5 列: cx, cy, w, h, objectness
pub const BOX_PARAMS: usize = 4;
pub const RAW_HEAD_COLUMNS: usize = BOX_PARAMS + 1;

/// 检测器能力接口：预处理、推理、后处理。
/// 加载由各检测器的构建器完成，且只进行一次。
pub trait Model {
  type Input;
  type Raw;
  type Output;
  type Error;

  fn preprocess(&self, image: &RgbImage) -> Result<Self::Input, Self::Error>;
  fn infer(&self, input: &Self::Input) -> Result<Self::Raw, Self::Error>;
  fn postprocess(&self, input: &Self::Input, raw: Self::Raw) -> Result<Self::Output, Self::Error>;

  fn detect(&self, image: &RgbImage) -> Result<Self::Output, Self::Error> {
    let input = self.preprocess(image)?;
    let raw = self.infer(&input)?;
    self.postprocess(&input, raw)
  }
}

#[derive(Error, Debug)]
pub enum InferenceError {
  #[error("模型加载错误: {0}")]
  ModelLoad(String),
  #[error("模型路径错误: {0}")]
  ModelPath(String),
  #[error("推理执行错误: {0}")]
  Runtime(String),
  #[error("模型输出形状不匹配: 期望 {expected:?}, 实际 {actual:?}")]
  ShapeMismatch {
    expected: Vec<usize>,
    actual: Vec<usize>,
  },
}

/// 推理运行时的接缝：输入固定尺寸张量，输出固定形状的原始预测
pub trait InferenceExecutor: Send + Sync {
  fn forward(&self, input: &PreprocessedTensor) -> Result<RawOutput, InferenceError>;
}

impl<E: InferenceExecutor + ?Sized> InferenceExecutor for Box<E> {
  fn forward(&self, input: &PreprocessedTensor) -> Result<RawOutput, InferenceError> {
    (**self).forward(input)
  }
}

/// 原始预测 `[N, 5 + C]`，行顺序与各步长网格的拼接顺序一致
#[derive(Debug, Clone)]
pub struct RawOutput {
  data: Array2<f32>,
}

impl From<Array2<f32>> for RawOutput {
  fn from(data: Array2<f32>) -> Self {
    Self { data }
  }
}

impl RawOutput {
  pub fn from_shape_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, InferenceError> {
    let actual = data.len();
    Array2::from_shape_vec((rows, cols), data)
      .map(Self::from)
      .map_err(|_| InferenceError::ShapeMismatch {
        expected: vec![rows, cols],
        actual: vec![actual],
      })
  }

  pub fn view(&self) -> ArrayView2<'_, f32> {
    self.data.view()
  }

  pub fn rows(&self) -> usize {
    self.data.nrows()
  }

  pub fn cols(&self) -> usize {
    self.data.ncols()
  }

  pub fn num_classes(&self) -> usize {
    self.cols().saturating_sub(RAW_HEAD_COLUMNS)
  }

  /// 校验形状是否为 `[rows, 5 + num_classes]`
  pub fn check_shape(&self, rows: usize, num_classes: usize) -> Result<(), InferenceError> {
    let expected = vec![rows, RAW_HEAD_COLUMNS + num_classes];
    let actual = vec![self.rows(), self.cols()];
    if expected != actual {
      return Err(InferenceError::ShapeMismatch { expected, actual });
    }
    Ok(())
  }

  /// 每个类别的最终得分 = objectness × 类别得分，形状 `[N, C]`
  pub fn class_scores(&self) -> Array2<f32> {
    let objectness = self.data.column(BOX_PARAMS).insert_axis(Axis(1));
    let classes = self.data.slice(ndarray::s![.., RAW_HEAD_COLUMNS..]);
    &classes * &objectness
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectItem {
  pub class_id: u32,
  pub score: f32,
  pub bbox: [f32; 4], // [x_min, y_min, x_max, y_max]
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectResult {
  pub items: Box<[DetectItem]>,
}

impl From<Vec<DetectItem>> for DetectResult {
  fn from(items: Vec<DetectItem>) -> Self {
    Self {
      items: items.into_boxed_slice(),
    }
  }
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn iter(&self) -> std::slice::Iter<'_, DetectItem> {
    self.items.iter()
  }
}

pub mod boxes;
pub mod grid;
pub mod nms;

mod yolox;
pub use self::yolox::{YoloX, YoloXBuilder, YoloXError};

#[cfg(feature = "onnx")]
mod onnx;
#[cfg(feature = "onnx")]
pub use self::onnx::OnnxExecutor;
