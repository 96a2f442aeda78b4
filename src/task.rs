// 该文件是 yolox-detect 项目的一部分。
// src/task.rs - 单张图像的检测任务
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
use std::thread;
use std::time::Instant;

use image::RgbImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::input::{DecodeError, DisplayCap, PreprocessError, decode_image};
use crate::label::{Taxonomy, TaxonomyError};
use crate::model::{DetectResult, InferenceError, Model, YoloXError};
use crate::output::{
  CropInfo, DEFAULT_CONFIDENCE, Draw, Palette, RenderError, encode_png, extract_crops, summarize,
};

#[derive(Error, Debug)]
pub enum PipelineError {
  #[error("解码失败: {0}")]
  Decode(#[from] DecodeError),
  #[error("预处理失败: {0}")]
  Preprocess(#[from] PreprocessError),
  #[error("推理失败: {0}")]
  Inference(#[from] InferenceError),
  #[error("类别解析失败: {0}")]
  Taxonomy(#[from] TaxonomyError),
  #[error("渲染失败: {0}")]
  Render(#[from] RenderError),
}

impl From<YoloXError> for PipelineError {
  fn from(e: YoloXError) -> Self {
    match e {
      YoloXError::Preprocess(e) => Self::Preprocess(e),
      YoloXError::Inference(e) => Self::Inference(e),
    }
  }
}

/// 一次检测的全部结果
#[derive(Debug, Clone)]
pub struct Prediction {
  pub file_name: String,
  pub crops: Vec<CropInfo>,
  pub image_summary: BTreeMap<String, u32>,
  /// 标注后的图像，尺寸与限幅后的显示图像相同
  pub image: RgbImage,
  pub png: Vec<u8>,
}

/// 解码、限幅、检测、裁剪信息与标注的完整流程。
/// 所有状态只读，可在多个线程间共享。
pub struct Pipeline<M> {
  model: M,
  taxonomy: Taxonomy,
  display_cap: DisplayCap,
  confidence: f32,
  draw: Draw,
}

impl<M> Pipeline<M>
where
  M: Model<Output = DetectResult>,
  PipelineError: From<M::Error>,
{
  pub fn new(model: M, taxonomy: Taxonomy) -> Result<Self, PipelineError> {
    // 每个类别一种颜色
    let draw = Draw::new()?.with_palette(Palette::new(taxonomy.len()));
    Ok(Self {
      model,
      taxonomy,
      display_cap: DisplayCap::default(),
      confidence: DEFAULT_CONFIDENCE,
      draw,
    })
  }

  pub fn with_confidence(mut self, confidence: f32) -> Self {
    self.confidence = confidence;
    self
  }

  pub fn with_display_cap(mut self, display_cap: DisplayCap) -> Self {
    self.display_cap = display_cap;
    self
  }

  pub fn with_draw(mut self, draw: Draw) -> Self {
    self.draw = draw;
    self
  }

  pub fn model(&self) -> &M {
    &self.model
  }

  pub fn taxonomy(&self) -> &Taxonomy {
    &self.taxonomy
  }

  pub fn draw(&self) -> &Draw {
    &self.draw
  }

  pub fn run(&self, bytes: &[u8], file_name: &str) -> Result<Prediction, PipelineError> {
    info!("开始处理图像: {}", file_name);
    let now = Instant::now();

    let decoded = decode_image(bytes)?;
    let image = self.display_cap.normalize(&decoded)?;
    debug!(
      "显示图像尺寸: {}x{} (原始 {}x{})",
      image.width(),
      image.height(),
      decoded.width(),
      decoded.height()
    );

    let result = self.model.detect(&image)?;
    let elapsed = now.elapsed();
    info!("推理完成，耗时: {:.2?}, 候选 {} 个", elapsed, result.len());

    let crops = extract_crops(&result, &self.taxonomy, self.confidence)?;
    let image_summary = summarize(&crops);
    let annotated = self.draw.annotate(&image, &crops);
    let png = encode_png(&annotated)?;
    info!(
      "{} 处理完成，共 {} 个目标，耗时: {:.2?}",
      file_name,
      crops.len(),
      now.elapsed()
    );

    Ok(Prediction {
      file_name: file_name.to_string(),
      crops,
      image_summary,
      image: annotated,
      png,
    })
  }
}

/// 以最多 `workers` 个线程分批并行处理，结果顺序与输入一致。
/// 工作线程 panic 时在调用线程上重新抛出。
pub fn run_bounded<T, R, F>(items: &[T], workers: usize, f: F) -> Vec<R>
where
  T: Sync,
  R: Send,
  F: Fn(&T) -> R + Sync,
{
  let workers = workers.max(1);
  let f = &f;
  let mut results = Vec::with_capacity(items.len());
  for (batch, chunk) in items.chunks(workers).enumerate() {
    debug!("第 {} 批, {} 个任务", batch, chunk.len());
    thread::scope(|scope| {
      let handles: Vec<_> = chunk.iter().map(|item| scope.spawn(move || f(item))).collect();
      for handle in handles {
        match handle.join() {
          Ok(result) => results.push(result),
          Err(panic) => std::panic::resume_unwind(panic),
        }
      }
    });
  }
  results
}
