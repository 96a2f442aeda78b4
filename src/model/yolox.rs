// 该文件是 yolox-detect 项目的一部分。
// src/model/yolox.rs - YOLOX 检测器
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
use tracing::{debug, info};

use crate::frame::{ChannelOrder, PreprocessedTensor};
use crate::input::{DEFAULT_INPUT_SIZE, Letterbox, PreprocessError};
use crate::label::COCO_CLASSES;
use crate::model::boxes::to_corners;
use crate::model::grid::{Grid, STRIDES};
use crate::model::nms::NmsConfig;
use crate::model::{DetectResult, InferenceError, InferenceExecutor, Model, RawOutput};

#[derive(Error, Debug)]
pub enum YoloXError {
  #[error("预处理错误: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理错误: {0}")]
  Inference(#[from] InferenceError),
}

/// YOLOX 检测器。执行器只在构建时传入一次，之后只读共享。
pub struct YoloX<E> {
  executor: E,
  letterbox: Letterbox,
  grid: Grid,
  nms: NmsConfig,
  num_classes: usize,
}

pub struct YoloXBuilder {
  input_width: u32,
  input_height: u32,
  num_classes: usize,
  channel_order: ChannelOrder,
  nms: NmsConfig,
}

impl Default for YoloXBuilder {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_SIZE,
      input_height: DEFAULT_INPUT_SIZE,
      num_classes: COCO_CLASSES.len(),
      channel_order: ChannelOrder::default(),
      nms: NmsConfig::default(),
    }
  }
}

impl YoloXBuilder {
  pub fn input_size(mut self, width: u32, height: u32) -> Self {
    self.input_width = width;
    self.input_height = height;
    self
  }

  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn channel_order(mut self, channel_order: ChannelOrder) -> Self {
    self.channel_order = channel_order;
    self
  }

  pub fn nms(mut self, nms: NmsConfig) -> Self {
    self.nms = nms;
    self
  }

  pub fn build<E: InferenceExecutor>(self, executor: E) -> Result<YoloX<E>, YoloXError> {
    let letterbox =
      Letterbox::new(self.input_width, self.input_height).with_channel_order(self.channel_order);
    letterbox.validate(&STRIDES)?;
    let grid = Grid::new(self.input_width, self.input_height, &STRIDES);

    info!(
      "YOLOX 检测器就绪: 输入 {}x{}, {} 类, 网格 {} 单元",
      self.input_width,
      self.input_height,
      self.num_classes,
      grid.len()
    );
    debug!("NMS 配置: {:?}", self.nms);

    Ok(YoloX {
      executor,
      letterbox,
      grid,
      nms: self.nms,
      num_classes: self.num_classes,
    })
  }
}

impl<E> YoloX<E> {
  pub fn grid(&self) -> &Grid {
    &self.grid
  }

  pub fn letterbox(&self) -> &Letterbox {
    &self.letterbox
  }

  pub fn nms_config(&self) -> &NmsConfig {
    &self.nms
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }
}

impl<E: InferenceExecutor> Model for YoloX<E> {
  type Input = PreprocessedTensor;
  type Raw = RawOutput;
  type Output = DetectResult;
  type Error = YoloXError;

  fn preprocess(&self, image: &RgbImage) -> Result<Self::Input, Self::Error> {
    Ok(self.letterbox.apply(image)?)
  }

  fn infer(&self, input: &Self::Input) -> Result<Self::Raw, Self::Error> {
    debug!("执行模型推理");
    let raw = self.executor.forward(input)?;
    raw.check_shape(self.grid.len(), self.num_classes)?;
    Ok(raw)
  }

  fn postprocess(&self, input: &Self::Input, raw: Self::Raw) -> Result<Self::Output, Self::Error> {
    let centers = self.grid.decode(&raw)?;
    let corners = to_corners(centers.view(), input.ratio());
    let scores = raw.class_scores();
    Ok(self.nms.suppress(corners.view(), scores.view()))
  }
}
