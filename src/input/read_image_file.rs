// 该文件是 yolox-detect 项目的一部分。
// src/input/read_image_file.rs - 图像文件输入
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

use std::path::Path;

use tracing::{debug, error};

use super::DecodeError;

/// 从磁盘读取的原始编码图像，解码延后到流水线内部进行
#[derive(Debug, Clone)]
pub struct ImageFileInput {
  file_name: String,
  bytes: Vec<u8>,
}

impl ImageFileInput {
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DecodeError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).inspect_err(|e| error!("读取 {} 失败: {}", path.display(), e))?;
    let file_name = path
      .file_name()
      .map(|name| name.to_string_lossy().into_owned())
      .unwrap_or_else(|| path.display().to_string());
    debug!("读取图像文件 {} ({} 字节)", file_name, bytes.len());

    Ok(Self { file_name, bytes })
  }

  pub fn file_name(&self) -> &str {
    &self.file_name
  }

  pub fn bytes(&self) -> &[u8] {
    &self.bytes
  }
}
