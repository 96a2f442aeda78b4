// 该文件是 yolox-detect 项目的一部分。
// src/model/onnx.rs - ONNX Runtime 推理执行器
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

use std::sync::Mutex;

use ort::session::{Session, builder::GraphOptimizationLevel};
use ort::value::Tensor;
use tracing::{debug, error, info};
use url::Url;

use crate::frame::PreprocessedTensor;
use crate::model::{InferenceError, InferenceExecutor, RawOutput};
use crate::{FromUrl, FromUrlWithScheme};

const ONNX_INTRA_THREADS: usize = 4;

fn load_session(model_path: &str) -> Result<Session, ort::Error> {
  let session = Session::builder()?
    .with_optimization_level(GraphOptimizationLevel::Level3)?
    .with_intra_threads(ONNX_INTRA_THREADS)?
    .commit_from_file(model_path)?;
  Ok(session)
}

/// 基于 ONNX Runtime 的执行器。
/// `Session::run` 需要可变借用，因此会话放在互斥锁中；锁只在执行器内部持有。
pub struct OnnxExecutor {
  session: Mutex<Session>,
  input_name: String,
}

impl FromUrlWithScheme for OnnxExecutor {
  const SCHEME: &'static str = "onnx";
}

impl FromUrl for OnnxExecutor {
  type Error = InferenceError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InferenceError::ModelPath(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Self::load(url.path())
  }
}

impl OnnxExecutor {
  pub fn load(model_path: &str) -> Result<Self, InferenceError> {
    info!("加载模型文件: {}", model_path);
    let session = load_session(model_path).map_err(|e| {
      error!("模型加载失败: {}", e);
      InferenceError::ModelLoad(format!("{}: {}", model_path, e))
    })?;

    let input_name = session
      .inputs
      .first()
      .map(|input| input.name.clone())
      .ok_or_else(|| InferenceError::ModelLoad("模型没有输入".to_string()))?;
    debug!("模型输入名称: {}", input_name);
    info!("模型加载完成");

    Ok(Self {
      session: Mutex::new(session),
      input_name,
    })
  }
}

impl InferenceExecutor for OnnxExecutor {
  fn forward(&self, input: &PreprocessedTensor) -> Result<RawOutput, InferenceError> {
    let shape = input.nchw_shape();
    let data: Vec<f32> = input.data().iter().copied().collect();
    let tensor =
      Tensor::from_array((shape, data)).map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let mut session = self
      .session
      .lock()
      .map_err(|_| InferenceError::Runtime("推理会话锁已失效".to_string()))?;
    let outputs = session
      .run(ort::inputs![self.input_name.as_str() => tensor])
      .map_err(|e| InferenceError::Runtime(e.to_string()))?;

    let (shape, data) = outputs[0]
      .try_extract_tensor::<f32>()
      .map_err(|e| InferenceError::Runtime(e.to_string()))?;
    let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
    debug!("模型输出形状: {:?}", dims);

    // YOLOX 导出模型输出为 [1, N, 5 + C]
    if let [1, rows, cols] = dims[..] {
      return RawOutput::from_shape_vec(rows, cols, data.to_vec());
    }
    error!("模型输出维度不符合 [1, N, 5 + C]: {:?}", dims);
    Err(InferenceError::ShapeMismatch {
      expected: vec![1, 0, 0],
      actual: dims,
    })
  }
}
