// 该文件是 yolox-detect 项目的一部分。
// src/output/record.rs - 检测记录的目录存储
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
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{Datelike, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::CropInfo;
use crate::task::Prediction;
use crate::{FromUrl, FromUrlWithScheme};

const CREATED_ON_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const RECORD_EXTENSION: &str = "json";
const IMAGE_EXTENSION: &str = "png";

#[derive(Error, Debug)]
pub enum RecordStoreError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("记录序列化错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("记录不存在: {0}")]
  NotFound(String),
}

/// 一次检测的持久化记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageRecord {
  pub id: Uuid,
  pub original_file_name: String,
  pub created_on: String,
  pub crops: Vec<CropInfo>,
  pub file_path: String,
  pub image_summary: BTreeMap<String, u32>,
}

/// 记录摘要，不包含文件位置与时间
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordSummary {
  pub id: Uuid,
  pub original_file_name: String,
  pub crops: Vec<CropInfo>,
  pub image_summary: BTreeMap<String, u32>,
}

impl From<ImageRecord> for RecordSummary {
  fn from(record: ImageRecord) -> Self {
    Self {
      id: record.id,
      original_file_name: record.original_file_name,
      crops: record.crops,
      image_summary: record.image_summary,
    }
  }
}

pub trait RecordStore {
  fn save(&self, prediction: &Prediction) -> Result<ImageRecord, RecordStoreError>;

  fn list(&self) -> Result<Vec<ImageRecord>, RecordStoreError>;

  fn get(&self, id: &str) -> Result<ImageRecord, RecordStoreError>;

  fn image_summary(&self, id: &str) -> Result<RecordSummary, RecordStoreError> {
    self.get(id).map(RecordSummary::from)
  }

  fn global_summary(&self) -> Result<Vec<RecordSummary>, RecordStoreError> {
    Ok(self.list()?.into_iter().map(RecordSummary::from).collect())
  }

  /// 读取记录对应的标注图像（PNG 字节）
  fn image(&self, id: &str) -> Result<Vec<u8>, RecordStoreError> {
    let record = self.get(id)?;
    fs::read(&record.file_path).map_err(|e| match e.kind() {
      std::io::ErrorKind::NotFound => {
        warn!("记录 {} 的图像文件缺失: {}", id, record.file_path);
        RecordStoreError::NotFound(id.to_string())
      }
      _ => RecordStoreError::IoError(e),
    })
  }
}

/// 按日期分区的目录存储：`root/YYYY/MM/DD/<id>.png` 与 `<id>.json`
#[derive(Debug, Clone)]
pub struct DirectoryRecordStore {
  root: PathBuf,
}

impl FromUrlWithScheme for DirectoryRecordStore {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordStore {
  type Error = RecordStoreError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(RecordStoreError::SchemeMismatch);
    }
    Ok(Self::new(uri.path()))
  }
}

impl DirectoryRecordStore {
  pub fn new(root: impl Into<PathBuf>) -> Self {
    Self { root: root.into() }
  }

  pub fn root(&self) -> &Path {
    &self.root
  }

  fn day_directory(&self) -> Result<PathBuf, RecordStoreError> {
    let now = Utc::now();
    let directory = self
      .root
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    fs::create_dir_all(&directory)?;
    Ok(directory)
  }

  fn collect_records(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), RecordStoreError> {
    for entry in fs::read_dir(dir)? {
      let path = entry?.path();
      if path.is_dir() {
        Self::collect_records(&path, found)?;
      } else if path.extension().is_some_and(|ext| ext == RECORD_EXTENSION) {
        found.push(path);
      }
    }
    Ok(())
  }

  fn read_record(path: &Path) -> Result<ImageRecord, RecordStoreError> {
    let text = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&text)?)
  }
}

impl RecordStore for DirectoryRecordStore {
  fn save(&self, prediction: &Prediction) -> Result<ImageRecord, RecordStoreError> {
    let id = Uuid::new_v4();
    let directory = self.day_directory()?;
    let image_path = directory.join(format!("{}.{}", id, IMAGE_EXTENSION));
    let record_path = directory.join(format!("{}.{}", id, RECORD_EXTENSION));

    fs::write(&image_path, &prediction.png)?;
    let record = ImageRecord {
      id,
      original_file_name: prediction.file_name.clone(),
      created_on: Utc::now().format(CREATED_ON_FORMAT).to_string(),
      crops: prediction.crops.clone(),
      file_path: image_path.to_string_lossy().into_owned(),
      image_summary: prediction.image_summary.clone(),
    };
    fs::write(&record_path, serde_json::to_string_pretty(&record)?)?;
    info!("记录已保存: {} -> {}", record.original_file_name, record_path.display());
    Ok(record)
  }

  fn list(&self) -> Result<Vec<ImageRecord>, RecordStoreError> {
    if !self.root.exists() {
      debug!("存储目录不存在: {}", self.root.display());
      return Ok(Vec::new());
    }
    let mut paths = Vec::new();
    Self::collect_records(&self.root, &mut paths)?;

    let mut records = paths
      .iter()
      .map(|path| Self::read_record(path))
      .collect::<Result<Vec<_>, _>>()?;
    records.sort_by(|a, b| a.created_on.cmp(&b.created_on).then(a.id.cmp(&b.id)));
    debug!("共读取 {} 条记录", records.len());
    Ok(records)
  }

  fn get(&self, id: &str) -> Result<ImageRecord, RecordStoreError> {
    // 只接受合法的 UUID，避免拼接出存储目录之外的路径
    let Ok(id) = Uuid::parse_str(id) else {
      warn!("非法的记录编号: {}", id);
      return Err(RecordStoreError::NotFound(id.to_string()));
    };
    if !self.root.exists() {
      return Err(RecordStoreError::NotFound(id.to_string()));
    }

    let file_name = format!("{}.{}", id, RECORD_EXTENSION);
    let mut paths = Vec::new();
    Self::collect_records(&self.root, &mut paths)?;
    let path = paths
      .into_iter()
      .find(|path| path.file_name().is_some_and(|name| name == file_name.as_str()))
      .ok_or_else(|| RecordStoreError::NotFound(id.to_string()))?;
    Self::read_record(&path)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::output::BBox;
  use image::{Rgb, RgbImage};

  fn prediction(file_name: &str, classes: &[&str]) -> Prediction {
    let crops: Vec<CropInfo> = classes
      .iter()
      .enumerate()
      .map(|(i, class)| CropInfo {
        bbox: BBox {
          x_min: i as i32,
          y_min: 0,
          x_max: 10,
          y_max: 10,
        },
        class: class.to_string(),
        confidence: 50.0,
        class_id: 0,
      })
      .collect();
    let image_summary = crate::output::summarize(&crops);
    Prediction {
      file_name: file_name.to_string(),
      crops,
      image_summary,
      image: RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])),
      png: vec![0x89, b'P', b'N', b'G'],
    }
  }

  #[test]
  fn save_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryRecordStore::new(dir.path());
    let saved = store.save(&prediction("dog.jpg", &["dog", "dog"])).unwrap();

    assert!(Path::new(&saved.file_path).exists());
    assert_eq!(fs::read(&saved.file_path).unwrap(), vec![0x89, b'P', b'N', b'G']);
    assert_eq!(saved.created_on.len(), "2026-01-01 00:00:00".len());

    let loaded = store.get(&saved.id.to_string()).unwrap();
    assert_eq!(loaded, saved);
    assert_eq!(loaded.image_summary.get("dog"), Some(&2));
  }

  #[test]
  fn record_json_uses_camel_case() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryRecordStore::new(dir.path());
    let saved = store.save(&prediction("a.png", &["cat"])).unwrap();
    let value = serde_json::to_value(&saved).unwrap();
    for key in ["id", "originalFileName", "createdOn", "crops", "filePath", "imageSummary"] {
      assert!(value.get(key).is_some(), "missing {}", key);
    }
  }

  #[test]
  fn missing_record_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryRecordStore::new(dir.path());
    store.save(&prediction("a.png", &[])).unwrap();

    let unknown = Uuid::new_v4().to_string();
    assert!(matches!(store.get(&unknown), Err(RecordStoreError::NotFound(_))));
    assert!(matches!(store.get("../etc/passwd"), Err(RecordStoreError::NotFound(_))));
    assert!(matches!(
      store.image_summary(&unknown),
      Err(RecordStoreError::NotFound(_))
    ));
  }

  #[test]
  fn list_and_global_summary() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryRecordStore::new(dir.path().join("nested"));
    assert!(store.list().unwrap().is_empty());

    let a = store.save(&prediction("a.png", &["person"])).unwrap();
    let b = store.save(&prediction("b.png", &[])).unwrap();

    let records = store.list().unwrap();
    assert_eq!(records.len(), 2);
    let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
    assert!(ids.contains(&a.id) && ids.contains(&b.id));

    let summary = store.global_summary().unwrap();
    assert_eq!(summary.len(), 2);
    let first = summary.iter().find(|s| s.id == a.id).unwrap();
    assert_eq!(first.original_file_name, "a.png");
    assert_eq!(first.image_summary.get("person"), Some(&1));
  }

  #[test]
  fn from_url_checks_scheme() {
    let url = url::Url::parse("folder:///tmp/records").unwrap();
    let store = DirectoryRecordStore::from_url(&url).unwrap();
    assert_eq!(store.root(), Path::new("/tmp/records"));

    let url = url::Url::parse("onnx:///tmp/records").unwrap();
    assert!(matches!(
      DirectoryRecordStore::from_url(&url),
      Err(RecordStoreError::SchemeMismatch)
    ));
  }

  #[test]
  fn image_bytes_by_id() {
    let dir = tempfile::tempdir().unwrap();
    let store = DirectoryRecordStore::new(dir.path());
    let saved = store.save(&prediction("dog.jpg", &["dog"])).unwrap();

    let bytes = store.image(&saved.id.to_string()).unwrap();
    assert_eq!(bytes, vec![0x89, b'P', b'N', b'G']);

    let unknown = Uuid::new_v4().to_string();
    assert!(matches!(store.image(&unknown), Err(RecordStoreError::NotFound(_))));

    fs::remove_file(&saved.file_path).unwrap();
    assert!(matches!(
      store.image(&saved.id.to_string()),
      Err(RecordStoreError::NotFound(_))
    ));
  }
}
