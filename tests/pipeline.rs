// 该文件是 yolox-detect 项目的一部分。
// tests/pipeline.rs - 完整检测流程测试
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

use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use ndarray::Array2;

use yolox_detect::{
  Pipeline, PipelineError,
  frame::PreprocessedTensor,
  label::{COCO_CLASSES, Taxonomy},
  model::{
    InferenceError, InferenceExecutor, RAW_HEAD_COLUMNS, RawOutput, YoloX, YoloXBuilder,
    boxes::{AreaConvention, to_corners},
    grid::{Grid, STRIDES},
  },
  output::{DirectoryRecordStore, RecordStore},
};

const INPUT_SIZE: usize = 640;
const NUM_CLASSES: usize = COCO_CLASSES.len();
const CELLS: usize = 8400;

/// 模拟的目标：类别、归一化图像坐标下的真实框、objectness 与类别得分
struct Target {
  class_id: usize,
  bbox: [f32; 4],
  objectness: f32,
  class_score: f32,
}

/// 把给定目标编码进步长 32 的网格单元，其余行全为 0
struct SyntheticExecutor {
  targets: Vec<Target>,
}

impl SyntheticExecutor {
  fn empty() -> Self {
    Self { targets: Vec::new() }
  }

  fn single(target: Target) -> Self {
    Self {
      targets: vec![target],
    }
  }
}

impl InferenceExecutor for SyntheticExecutor {
  fn forward(&self, input: &PreprocessedTensor) -> Result<RawOutput, InferenceError> {
    let shape = input.nchw_shape();
    if shape != [1, 3, INPUT_SIZE, INPUT_SIZE] {
      return Err(InferenceError::ShapeMismatch {
        expected: vec![1, 3, INPUT_SIZE, INPUT_SIZE],
        actual: shape.to_vec(),
      });
    }

    let mut raw = Array2::<f32>::zeros((CELLS, RAW_HEAD_COLUMNS + NUM_CLASSES));
    let ratio = input.ratio();
    let stride = 32.0f32;
    let cols = INPUT_SIZE / 32;
    let offset = (INPUT_SIZE / 8).pow(2) + (INPUT_SIZE / 16).pow(2);

    for target in &self.targets {
      let [x1, y1, x2, y2] = target.bbox.map(|v| v * ratio);
      let (cx, cy) = ((x1 + x2) / 2.0 / stride, (y1 + y2) / 2.0 / stride);
      let (gx, gy) = (cx.floor(), cy.floor());
      let row = offset + gy as usize * cols + gx as usize;

      raw[[row, 0]] = cx - gx;
      raw[[row, 1]] = cy - gy;
      raw[[row, 2]] = ((x2 - x1) / stride).ln();
      raw[[row, 3]] = ((y2 - y1) / stride).ln();
      raw[[row, 4]] = target.objectness;
      raw[[row, RAW_HEAD_COLUMNS + target.class_id]] = target.class_score;
    }
    Ok(RawOutput::from(raw))
  }
}

fn pipeline(executor: SyntheticExecutor, taxonomy: Taxonomy) -> Pipeline<YoloX<SyntheticExecutor>> {
  let model = YoloXBuilder::default().build(executor).unwrap();
  Pipeline::new(model, taxonomy).unwrap()
}

fn png_bytes(image: &RgbImage) -> Vec<u8> {
  let mut bytes = Vec::new();
  image
    .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
    .unwrap();
  bytes
}

fn dog() -> Target {
  Target {
    class_id: 16,
    bbox: [100.0, 50.0, 300.0, 250.0],
    objectness: 0.95,
    class_score: 0.9,
  }
}

#[test]
fn solid_image_has_no_detections() {
  let image = RgbImage::from_pixel(400, 300, Rgb([200, 30, 30]));
  let pipeline = pipeline(SyntheticExecutor::empty(), Taxonomy::coco());

  let prediction = pipeline.run(&png_bytes(&image), "solid.png").unwrap();
  assert!(prediction.crops.is_empty());
  assert!(prediction.image_summary.is_empty());
  assert_eq!(prediction.image, image);

  let decoded = image::load_from_memory(&prediction.png).unwrap().to_rgb8();
  assert_eq!(decoded, image);
}

#[test]
fn single_object_yields_single_crop() {
  let image = RgbImage::from_pixel(400, 300, Rgb([90, 90, 90]));
  let pipeline = pipeline(SyntheticExecutor::single(dog()), Taxonomy::coco());

  let prediction = pipeline.run(&png_bytes(&image), "dog.png").unwrap();
  assert_eq!(prediction.file_name, "dog.png");
  assert_eq!(prediction.crops.len(), 1);

  let crop = &prediction.crops[0];
  assert_eq!(crop.class, "dog");
  assert_eq!(crop.confidence, 85.5);
  let found = [
    crop.bbox.x_min as f32,
    crop.bbox.y_min as f32,
    crop.bbox.x_max as f32,
    crop.bbox.y_max as f32,
  ];
  assert!(AreaConvention::Inclusive.iou(&found, &dog().bbox) > 0.5);
  assert_eq!(prediction.image_summary.get("dog"), Some(&1));

  // 标注绘制在副本上，尺寸保持不变
  assert_eq!(prediction.image.dimensions(), image.dimensions());
  assert_ne!(prediction.image, image);
}

#[test]
fn low_confidence_is_dropped_after_nms() {
  let image = RgbImage::from_pixel(400, 300, Rgb([90, 90, 90]));
  let target = Target {
    objectness: 0.5,
    class_score: 0.5,
    ..dog()
  };
  let pipeline = pipeline(SyntheticExecutor::single(target), Taxonomy::coco());

  let prediction = pipeline.run(&png_bytes(&image), "faint.png").unwrap();
  assert!(prediction.crops.is_empty());
  assert_eq!(prediction.image, image);

  let lenient = pipeline.with_confidence(0.2);
  let prediction = lenient.run(&png_bytes(&image), "faint.png").unwrap();
  assert_eq!(prediction.crops.len(), 1);
  assert_eq!(prediction.crops[0].confidence, 25.0);
}

#[test]
fn runs_are_idempotent() {
  let image = RgbImage::from_fn(320, 240, |x, y| Rgb([x as u8, y as u8, 64]));
  let bytes = png_bytes(&image);
  let target = Target {
    bbox: [40.0, 30.0, 200.0, 180.0],
    ..dog()
  };
  let pipeline = pipeline(SyntheticExecutor::single(target), Taxonomy::coco());

  let first = pipeline.run(&bytes, "a.png").unwrap();
  let second = pipeline.run(&bytes, "a.png").unwrap();
  assert_eq!(first.crops, second.crops);
  assert_eq!(first.image_summary, second.image_summary);
  assert_eq!(first.png, second.png);
}

#[test]
fn oversized_image_is_capped() {
  let image = RgbImage::from_pixel(1440, 900, Rgb([10, 20, 30]));
  let pipeline = pipeline(SyntheticExecutor::empty(), Taxonomy::coco());

  let prediction = pipeline.run(&png_bytes(&image), "wide.png").unwrap();
  assert_eq!(prediction.image.dimensions(), (720, 450));
}

#[test]
fn undecodable_bytes_are_decode_errors() {
  let pipeline = pipeline(SyntheticExecutor::empty(), Taxonomy::coco());
  assert!(matches!(
    pipeline.run(b"not an image", "broken.jpg"),
    Err(PipelineError::Decode(_))
  ));
  assert!(matches!(
    pipeline.run(&[], "empty.jpg"),
    Err(PipelineError::Decode(_))
  ));
}

#[test]
fn unknown_class_is_taxonomy_error() {
  let image = RgbImage::from_pixel(400, 300, Rgb([0, 0, 0]));
  let taxonomy = Taxonomy::new(["person", "bicycle"]).unwrap();
  let pipeline = pipeline(SyntheticExecutor::single(dog()), taxonomy);
  assert!(matches!(
    pipeline.run(&png_bytes(&image), "dog.png"),
    Err(PipelineError::Taxonomy(_))
  ));
}

#[test]
fn decode_and_transform_recover_known_boxes() {
  let grid = Grid::new(640, 640, &STRIDES);
  let ratio = 0.8f32;
  let known = [
    (0usize, [4.0f32, 4.0, 24.0, 14.0]),
    (6400 + 41, [10.0, 40.0, 70.0, 90.0]),
    (8000 + 399, [700.0, 700.0, 790.0, 795.0]),
  ];

  let mut raw = Array2::<f32>::zeros((grid.len(), RAW_HEAD_COLUMNS + 1));
  for &(row, bbox) in &known {
    let cell = grid.cells()[row];
    let stride = cell.stride as f32;
    let [x1, y1, x2, y2] = bbox.map(|v| v * ratio);
    raw[[row, 0]] = (x1 + x2) / 2.0 / stride - cell.x as f32;
    raw[[row, 1]] = (y1 + y2) / 2.0 / stride - cell.y as f32;
    raw[[row, 2]] = ((x2 - x1) / stride).ln();
    raw[[row, 3]] = ((y2 - y1) / stride).ln();
  }

  let centers = grid.decode(&RawOutput::from(raw)).unwrap();
  let corners = to_corners(centers.view(), ratio);
  for &(row, bbox) in &known {
    for k in 0..4 {
      assert!(
        (corners[[row, k]] - bbox[k]).abs() < 1e-2,
        "row {} coord {}: {} vs {}",
        row,
        k,
        corners[[row, k]],
        bbox[k]
      );
    }
  }
}

#[test]
fn predictions_are_persisted() {
  let dir = tempfile::tempdir().unwrap();
  let store = DirectoryRecordStore::new(dir.path());
  let image = RgbImage::from_pixel(400, 300, Rgb([90, 90, 90]));
  let pipeline = pipeline(SyntheticExecutor::single(dog()), Taxonomy::coco());

  let prediction = pipeline.run(&png_bytes(&image), "dog.png").unwrap();
  let record = store.save(&prediction).unwrap();
  assert_eq!(record.original_file_name, "dog.png");
  assert_eq!(record.crops, prediction.crops);

  let summary = store.image_summary(&record.id.to_string()).unwrap();
  assert_eq!(summary.image_summary.get("dog"), Some(&1));
  assert_eq!(store.global_summary().unwrap().len(), 1);
}

#[test]
fn pipeline_is_shared_across_threads() {
  let image = RgbImage::from_pixel(400, 300, Rgb([90, 90, 90]));
  let bytes = png_bytes(&image);
  let pipeline = pipeline(SyntheticExecutor::single(dog()), Taxonomy::coco());

  let results: Vec<_> = std::thread::scope(|scope| {
    let handles: Vec<_> = (0..4)
      .map(|i| {
        let pipeline = &pipeline;
        let bytes = &bytes;
        scope.spawn(move || pipeline.run(bytes, &format!("{}.png", i)).unwrap())
      })
      .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
  });

  for prediction in &results {
    assert_eq!(prediction.crops, results[0].crops);
  }
}

/// 某一行的宽高取极大值，解码后角点为无穷远
struct OverflowingExecutor;

impl InferenceExecutor for OverflowingExecutor {
  fn forward(&self, _input: &PreprocessedTensor) -> Result<RawOutput, InferenceError> {
    let mut raw = Array2::<f32>::zeros((CELLS, RAW_HEAD_COLUMNS + NUM_CLASSES));
    raw[[100, 2]] = 100.0;
    raw[[100, 3]] = 100.0;
    raw[[100, 4]] = 0.9;
    raw[[100, RAW_HEAD_COLUMNS]] = 0.9;
    Ok(RawOutput::from(raw))
  }
}

#[test]
fn unbounded_boxes_are_annotated_without_overflow() {
  let model = YoloXBuilder::default().build(OverflowingExecutor).unwrap();
  let pipeline = Pipeline::new(model, Taxonomy::coco()).unwrap();
  let image = RgbImage::from_pixel(400, 300, Rgb([90, 90, 90]));

  let prediction = pipeline.run(&png_bytes(&image), "huge.png").unwrap();
  assert_eq!(prediction.crops.len(), 1);
  let bbox = prediction.crops[0].bbox;
  assert_eq!((bbox.x_min, bbox.y_min), (i32::MIN, i32::MIN));
  assert_eq!((bbox.x_max, bbox.y_max), (i32::MAX, i32::MAX));
  assert_eq!(prediction.image.dimensions(), (400, 300));
}

#[test]
fn palette_covers_every_label() {
  let names: Vec<String> = (0..120).map(|i| format!("class-{}", i)).collect();
  let taxonomy = Taxonomy::new(names).unwrap();
  let pipeline = pipeline(SyntheticExecutor::empty(), taxonomy);

  let palette = pipeline.draw().palette();
  assert_ne!(palette.color(0), palette.color(80));
  assert_ne!(palette.color(119), palette.color(0));
}
