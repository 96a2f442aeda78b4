// 该文件是 yolox-detect 项目的一部分。
// src/bin/detect.rs - 命令行入口
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

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::thread;

use anyhow::{Result, anyhow};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::{error, info};
use url::Url;

use yolox_detect::{
  FromUrl, Pipeline,
  task::run_bounded,
  input::ImageFileInput,
  label::Taxonomy,
  model::{
    OnnxExecutor, YoloXBuilder,
    nms::{DEFAULT_NMS_THRESHOLD, DEFAULT_SCORE_THRESHOLD, NmsConfig, NmsPolicy},
  },
  output::{DEFAULT_CONFIDENCE, DirectoryRecordStore, RecordStore},
};

/// YOLOX 目标检测命令行工具
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
  /// 记录存储目录
  #[arg(long, value_name = "DIR", global = true, default_value = "records")]
  store: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// 检测图像并保存记录
  Detect {
    /// ONNX 模型地址，例如 onnx:///models/yolox_s.onnx
    #[arg(long, value_name = "MODEL")]
    model: Url,
    /// 类别名称文件，每行一个；缺省为 COCO 80 类
    #[arg(long, value_name = "FILE")]
    labels: Option<PathBuf>,
    /// 候选框得分阈值
    #[arg(long, default_value_t = DEFAULT_SCORE_THRESHOLD, value_name = "THRESHOLD")]
    score_threshold: f32,
    /// NMS IoU 阈值
    #[arg(long, default_value_t = DEFAULT_NMS_THRESHOLD, value_name = "THRESHOLD")]
    nms_threshold: f32,
    /// 展示置信度阈值
    #[arg(long, default_value_t = DEFAULT_CONFIDENCE, value_name = "THRESHOLD")]
    confidence: f32,
    /// 先取最高类别，再对所有框做一次 NMS
    #[arg(long)]
    class_agnostic: bool,
    /// 输入图像
    #[arg(value_name = "IMAGES", required = true)]
    images: Vec<PathBuf>,
  },
  /// 列出所有记录
  List,
  /// 显示单条记录的摘要
  Show {
    #[arg(value_name = "ID")]
    id: String,
  },
  /// 所有记录的摘要
  Summary,
  /// 导出单条记录的标注图像
  Image {
    #[arg(value_name = "ID")]
    id: String,
    /// 输出 PNG 文件路径
    #[arg(long, value_name = "FILE")]
    output: PathBuf,
  },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectReport<'a> {
  id: String,
  original_file_name: &'a str,
  image_summary: &'a std::collections::BTreeMap<String, u32>,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();
  let store = DirectoryRecordStore::new(&args.store);
  info!("记录存储目录: {}", store.root().display());

  match args.command {
    Command::Detect {
      model,
      labels,
      score_threshold,
      nms_threshold,
      confidence,
      class_agnostic,
      images,
    } => {
      info!("模型地址: {}", model);
      let taxonomy = match labels {
        Some(path) => Taxonomy::from_file(path)?,
        None => Taxonomy::coco(),
      };
      let nms = NmsConfig {
        score_threshold,
        nms_threshold,
        policy: if class_agnostic {
          NmsPolicy::ClassAgnostic
        } else {
          NmsPolicy::ClassAware
        },
        ..NmsConfig::default()
      };

      // 模型只加载一次，加载失败直接退出
      let executor = OnnxExecutor::from_url(&model)?;
      let detector = YoloXBuilder::default()
        .num_classes(taxonomy.len())
        .nms(nms)
        .build(executor)?;
      let pipeline = Pipeline::new(detector, taxonomy)?.with_confidence(confidence);

      // 每批最多使用可用核心数个线程
      let workers = thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1);
      info!("共 {} 张图像, 并行度 {}", images.len(), workers);

      let outcomes = run_bounded(&images, workers, |path| -> Result<()> {
        let input = ImageFileInput::open(path)?;
        let prediction = pipeline.run(input.bytes(), input.file_name())?;
        let record = store.save(&prediction)?;
        print_json(&DetectReport {
          id: record.id.to_string(),
          original_file_name: &record.original_file_name,
          image_summary: &record.image_summary,
        })
      });

      let failures = outcomes
        .iter()
        .zip(&images)
        .filter(|(outcome, path)| match outcome {
          Ok(()) => false,
          Err(e) => {
            error!("{} 处理失败: {:#}", path.display(), e);
            true
          }
        })
        .count();

      if failures > 0 {
        return Err(anyhow!("{} 张图像处理失败", failures));
      }
    }
    Command::List => print_json(&store.list()?)?,
    Command::Show { id } => print_json(&store.image_summary(&id)?)?,
    Command::Summary => print_json(&store.global_summary()?)?,
    Command::Image { id, output } => {
      let bytes = store.image(&id)?;
      std::fs::write(&output, bytes)?;
      info!("记录 {} 的图像已写入 {}", id, output.display());
    }
  }

  Ok(())
}
