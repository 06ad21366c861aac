//! 影像导入
//!
//! 校验身份字段后把选中的文件批量读入内存。读取是扇出/扇入的：
//! 任意单个文件失败即放弃整批，影像序列不会出现部分提交。

use mammo_core::{ImageBlob, MammoError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::session::SessionState;

/// 按扩展名推断内容类型
fn content_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("bmp") => "image/bmp",
        Some("tif") | Some("tiff") => "image/tiff",
        Some("dcm") | Some("dicom") => "application/dicom",
        _ => "application/octet-stream",
    }
}

async fn read_image(path: PathBuf) -> Result<ImageBlob> {
    let data = tokio::fs::read(&path).await?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("mammogram.bin")
        .to_string();

    Ok(ImageBlob {
        content_type: content_type_for(&path).to_string(),
        file_name,
        data,
    })
}

/// 导入一批影像文件
///
/// 身份字段不完整时立即拒绝：临时提示、字段标红，影像序列不变。
/// 空选择是无操作。全部读取成功后等待过渡延迟，再原子替换影像
/// 序列并重置依赖状态（分析结果、保存状态、选中影像索引）。
pub async fn ingest_files(state: &Arc<Mutex<SessionState>>, paths: Vec<PathBuf>) -> Result<()> {
    if paths.is_empty() {
        return Ok(());
    }

    let transition = {
        let mut session = state.lock().await;
        if !session.draft().identity_complete() {
            session.flag_missing_identity();
            session.set_transient_notice("Patient ID and patient name are required before upload");
            warn!("Upload rejected, identity fields incomplete");
            return Err(MammoError::Validation(
                "patient id and name are required before upload".to_string(),
            ));
        }
        Duration::from_millis(session.config.upload_transition_ms)
    };

    let reads = paths.into_iter().map(read_image);
    let blobs = match futures::future::try_join_all(reads).await {
        Ok(blobs) => blobs,
        Err(e) => {
            let mut session = state.lock().await;
            session.set_transient_notice("Failed to read the selected files. Please try again.");
            warn!("Image batch aborted: {}", e);
            return Err(MammoError::Ingest(e.to_string()));
        }
    };

    // 固定过渡延迟，给前端展示加载动画留出时间
    tokio::time::sleep(transition).await;

    let mut session = state.lock().await;
    info!("Ingested {} images", blobs.len());
    session.replace_images(blobs);
    Ok(())
}
