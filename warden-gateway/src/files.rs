//! Filesystem collaborator endpoints.
//!
//! Each verb consults the path guard before touching the filesystem and
//! maps I/O failures through the shared classifier, path attached.

use serde::Deserialize;
use serde_json::{json, Value};

use warden_core::{classify_io, validate_path, ApiError, Domain};

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathBody {
    pub path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MkdirBody {
    pub path: String,
    #[serde(default)]
    pub recursive: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteBody {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenameBody {
    pub old_path: String,
    pub new_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveBody {
    pub source_path: String,
    pub destination_path: String,
}

fn file_error(err: &std::io::Error, path: &str) -> GatewayError {
    GatewayError(
        ApiError::new(Domain::File, classify_io(Domain::File, err), err.to_string())
            .with_path(path),
    )
}

/// `POST /api/mkdir`
pub async fn mkdir(body: MkdirBody) -> Result<Value, GatewayError> {
    validate_path(&body.path)?;
    let result = if body.recursive {
        tokio::fs::create_dir_all(&body.path).await
    } else {
        tokio::fs::create_dir(&body.path).await
    };
    result.map_err(|e| file_error(&e, &body.path))?;
    Ok(json!({ "success": true, "path": body.path }))
}

/// `POST /api/write`
pub async fn write(body: WriteBody) -> Result<Value, GatewayError> {
    validate_path(&body.path)?;
    tokio::fs::write(&body.path, body.content.as_bytes())
        .await
        .map_err(|e| file_error(&e, &body.path))?;
    Ok(json!({ "success": true, "path": body.path }))
}

/// `POST /api/read`
pub async fn read(body: PathBody) -> Result<Value, GatewayError> {
    validate_path(&body.path)?;
    let content = tokio::fs::read_to_string(&body.path)
        .await
        .map_err(|e| file_error(&e, &body.path))?;
    Ok(json!({ "success": true, "path": body.path, "content": content }))
}

/// `POST /api/delete` — removes a file or a directory tree.
pub async fn delete(body: PathBody) -> Result<Value, GatewayError> {
    validate_path(&body.path)?;
    let metadata = tokio::fs::metadata(&body.path)
        .await
        .map_err(|e| file_error(&e, &body.path))?;
    let result = if metadata.is_dir() {
        tokio::fs::remove_dir_all(&body.path).await
    } else {
        tokio::fs::remove_file(&body.path).await
    };
    result.map_err(|e| file_error(&e, &body.path))?;
    Ok(json!({ "success": true, "path": body.path }))
}

/// `POST /api/rename`
pub async fn rename(body: RenameBody) -> Result<Value, GatewayError> {
    validate_path(&body.old_path)?;
    validate_path(&body.new_path)?;
    tokio::fs::rename(&body.old_path, &body.new_path)
        .await
        .map_err(|e| file_error(&e, &body.old_path))?;
    Ok(json!({ "success": true, "path": body.new_path }))
}

/// `POST /api/move`
pub async fn move_entry(body: MoveBody) -> Result<Value, GatewayError> {
    validate_path(&body.source_path)?;
    validate_path(&body.destination_path)?;
    tokio::fs::rename(&body.source_path, &body.destination_path)
        .await
        .map_err(|e| file_error(&e, &body.source_path))?;
    Ok(json!({ "success": true, "path": body.destination_path }))
}
