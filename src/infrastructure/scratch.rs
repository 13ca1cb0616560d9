//! 临时存储 - 基础设施层
//!
//! 每条题目链独占一个临时目录，存放下载的数据文件和生成的图表。
//! 目录随 `ScratchSpace` 一起释放：正常结束、超时取消或 panic 展开时都会删除。

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{debug, warn};

pub struct ScratchSpace {
    dir: TempDir,
}

impl ScratchSpace {
    /// 在 `root` 下为 `chain_id` 创建临时目录
    pub fn create(root: &Path, chain_id: &str) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        let dir = tempfile::Builder::new()
            .prefix(&format!("quiz-chain-{}-", chain_id))
            .tempdir_in(root)?;
        debug!("创建临时目录: {}", dir.path().display());
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// 目录内的文件路径，文件名中的路径分隔符会被替换
    pub fn file_path(&self, name: &str) -> PathBuf {
        let safe: String = name
            .chars()
            .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
            .collect();
        let safe = if safe.is_empty() || safe == "." || safe == ".." {
            "download".to_string()
        } else {
            safe
        };
        self.dir.path().join(safe)
    }

    /// 显式删除目录并记录失败
    pub fn close(self) {
        let path = self.dir.path().display().to_string();
        match self.dir.close() {
            Ok(()) => debug!("🗑️ 临时目录已删除: {}", path),
            Err(e) => warn!("⚠️ 删除临时目录失败 ({}): {}", path, e),
        }
    }
}
