// 该文件是 yolox-detect 项目的一部分。
// src/model/nms.rs - 多类别非极大值抑制
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

use ndarray::ArrayView2;
use tracing::debug;

use super::boxes::{AreaConvention, row_bbox};
use super::{DetectItem, DetectResult};

pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.1;
pub const DEFAULT_NMS_THRESHOLD: f32 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NmsPolicy {
  /// 每个类别通道独立做 NMS
  #[default]
  ClassAware,
  /// 先取每个框得分最高的类别，再对所有框做一次 NMS
  ClassAgnostic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmsConfig {
  pub score_threshold: f32,
  pub nms_threshold: f32,
  pub policy: NmsPolicy,
  pub area: AreaConvention,
}

impl Default for NmsConfig {
  fn default() -> Self {
    Self {
      score_threshold: DEFAULT_SCORE_THRESHOLD,
      nms_threshold: DEFAULT_NMS_THRESHOLD,
      policy: NmsPolicy::default(),
      area: AreaConvention::default(),
    }
  }
}

/// 单类别贪心 NMS，返回保留框的下标（按得分降序）。
/// 得分相同的框保持输入顺序。
pub fn nms(boxes: &[[f32; 4]], scores: &[f32], nms_threshold: f32, area: AreaConvention) -> Vec<usize> {
  let mut order: Vec<usize> = (0..scores.len()).collect();
  order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

  let mut keep = Vec::new();
  while !order.is_empty() {
    let best = order[0];
    keep.push(best);
    order = order[1..]
      .iter()
      .copied()
      .filter(|&j| area.iou(&boxes[best], &boxes[j]) <= nms_threshold)
      .collect();
  }
  keep
}

impl NmsConfig {
  /// `boxes` 为 `[N, 4]` 角点坐标，`scores` 为 `[N, C]` 类别得分
  pub fn suppress(&self, boxes: ArrayView2<'_, f32>, scores: ArrayView2<'_, f32>) -> DetectResult {
    let result = match self.policy {
      NmsPolicy::ClassAware => self.class_aware(&boxes, &scores),
      NmsPolicy::ClassAgnostic => self.class_agnostic(&boxes, &scores),
    };
    debug!("NMS ({:?}) 后保留 {} 个检测", self.policy, result.len());
    result
  }

  fn class_aware(&self, boxes: &ArrayView2<'_, f32>, scores: &ArrayView2<'_, f32>) -> DetectResult {
    let mut items = Vec::new();
    for (class_id, class_scores) in scores.columns().into_iter().enumerate() {
      let (valid_boxes, valid_scores): (Vec<[f32; 4]>, Vec<f32>) = class_scores
        .iter()
        .enumerate()
        .filter(|&(_, &score)| score > self.score_threshold)
        .map(|(i, &score)| (row_bbox(boxes, i), score))
        .unzip();
      if valid_scores.is_empty() {
        continue;
      }

      let keep = nms(&valid_boxes, &valid_scores, self.nms_threshold, self.area);
      items.extend(keep.into_iter().map(|k| DetectItem {
        class_id: class_id as u32,
        score: valid_scores[k],
        bbox: valid_boxes[k],
      }));
    }
    DetectResult::from(items)
  }

  fn class_agnostic(&self, boxes: &ArrayView2<'_, f32>, scores: &ArrayView2<'_, f32>) -> DetectResult {
    let mut valid_boxes = Vec::new();
    let mut valid_scores = Vec::new();
    let mut valid_classes = Vec::new();
    for (i, row) in scores.outer_iter().enumerate() {
      let Some((class_id, score)) = argmax(row.iter().copied()) else {
        continue;
      };
      if score > self.score_threshold {
        valid_boxes.push(row_bbox(boxes, i));
        valid_scores.push(score);
        valid_classes.push(class_id as u32);
      }
    }
    // 没有框通过得分过滤时直接返回空结果
    if valid_scores.is_empty() {
      return DetectResult::default();
    }

    let keep = nms(&valid_boxes, &valid_scores, self.nms_threshold, self.area);
    keep
      .into_iter()
      .map(|k| DetectItem {
        class_id: valid_classes[k],
        score: valid_scores[k],
        bbox: valid_boxes[k],
      })
      .collect::<Vec<_>>()
      .into()
  }
}

/// 第一个最大值的下标与取值
fn argmax(values: impl Iterator<Item = f32>) -> Option<(usize, f32)> {
  values.enumerate().fold(None, |best, (i, v)| match best {
    Some((_, b)) if v <= b => best,
    _ => Some((i, v)),
  })
}
