//! Loading attachments from disk.

use parley_core::session::Attachment;
use parley_core::{ParleyError, Result};
use serde_json::Value;
use std::path::Path;

/// Infers the MIME type from a filename extension using the `mime_guess` library.
fn infer_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}

/// Reads `path` into an [`Attachment`].
///
/// The attachment name is the file name, `metadata.source_path` the path as
/// given, and the type is inferred from the extension.
///
/// # Errors
///
/// - `NotFound` if the file does not exist
/// - `InvalidArgument` if the path is a directory
/// - `StorageIo` for any other read failure
pub async fn load_attachment(path: impl AsRef<Path>) -> Result<Attachment> {
    let path = path.as_ref();
    let target = path.display().to_string();

    let meta = tokio::fs::metadata(path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ParleyError::not_found("File", target.clone()),
        _ => ParleyError::storage_io("attach", target.clone(), e),
    })?;
    if meta.is_dir() {
        return Err(ParleyError::invalid_argument(format!(
            "Cannot attach a directory: {}",
            target
        )));
    }

    let content = tokio::fs::read(path)
        .await
        .map_err(|e| ParleyError::storage_io("attach", target.clone(), e))?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| target.clone());

    let mut attachment = Attachment::new(name, infer_mime_type(path), content);
    let source = Value::String(target);
    attachment.metadata.insert("source_path".into(), source);
    Ok(attachment)
}
