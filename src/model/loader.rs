// 该文件是 ReefLog （寻找尼莫） 项目的一部分。
// src/model/loader.rs - 模型单例加载
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

use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::info;

type LoadFn<M, E> = Box<dyn Fn() -> Result<Arc<M>, E> + Send + Sync>;

/// 进程内只加载一次的模型句柄
///
/// 第一次 `get` 时执行加载，之后所有调用返回同一个 `Arc`。
pub struct ModelLoader<M, E> {
  cell: OnceCell<Arc<M>>,
  load: LoadFn<M, E>,
}

impl<M, E> ModelLoader<M, E> {
  pub fn new<F>(load: F) -> Self
  where
    F: Fn() -> Result<M, E> + Send + Sync + 'static,
  {
    ModelLoader {
      cell: OnceCell::new(),
      load: Box::new(move || load().map(Arc::new)),
    }
  }

  /// 直接以已构建的模型初始化
  pub fn with_model(model: M) -> Self
  where
    M: Send + Sync + 'static,
  {
    let model = Arc::new(model);
    let shared = model.clone();
    ModelLoader {
      cell: OnceCell::with_value(model),
      load: Box::new(move || Ok(shared.clone())),
    }
  }

  pub fn get(&self) -> Result<Arc<M>, E> {
    self
      .cell
      .get_or_try_init(|| {
        info!("首次使用，加载模型...");
        let now = std::time::Instant::now();
        let model = (self.load)()?;
        info!("模型加载完成，耗时: {:.2?}", now.elapsed());
        Ok(model)
      })
      .cloned()
  }

  pub fn is_loaded(&self) -> bool {
    self.cell.get().is_some()
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicUsize, Ordering};

  use super::*;

  #[test]
  fn loads_exactly_once() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let loader: ModelLoader<String, std::io::Error> = ModelLoader::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok("model".to_string())
    });

    assert!(!loader.is_loaded());
    let first = loader.get().unwrap();
    for _ in 0..10 {
      let again = loader.get().unwrap();
      assert!(Arc::ptr_eq(&first, &again));
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(loader.is_loaded());
  }

  #[test]
  fn concurrent_callers_share_one_load() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let loader: Arc<ModelLoader<u64, std::io::Error>> = Arc::new(ModelLoader::new(move || {
      counter.fetch_add(1, Ordering::SeqCst);
      std::thread::sleep(std::time::Duration::from_millis(20));
      Ok(42)
    }));

    let handles: Vec<_> = (0..8)
      .map(|_| {
        let loader = loader.clone();
        std::thread::spawn(move || loader.get().unwrap())
      })
      .collect();
    let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(models.iter().all(|m| Arc::ptr_eq(m, &models[0])));
  }

  #[test]
  fn load_failure_is_propagated() {
    let loader: ModelLoader<u64, std::io::Error> = ModelLoader::new(|| {
      Err(std::io::Error::new(
        std::io::ErrorKind::NotFound,
        "best.onnx",
      ))
    });
    let err = loader.get().unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotFound);
    assert!(!loader.is_loaded());
  }

  #[test]
  fn prebuilt_model_is_returned() {
    let loader: ModelLoader<&str, std::io::Error> = ModelLoader::with_model("ready");
    assert!(loader.is_loaded());
    assert_eq!(*loader.get().unwrap(), "ready");
    assert!(Arc::ptr_eq(&loader.get().unwrap(), &loader.get().unwrap()));
  }
}
