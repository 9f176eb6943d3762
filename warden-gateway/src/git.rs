//! Git checkout collaborator endpoint.
//!
//! Clones are delegated to the `git` binary; stderr text is classified
//! into the auth / not-found / branch / network taxonomy.

use serde::Deserialize;
use serde_json::{json, Value};

use warden_core::{classify_git, validate_path, ApiError, Domain, GitPhase};

use crate::error::GatewayError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutBody {
    pub repo_url: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub target_dir: Option<String>,
}

/// `POST /api/git/checkout` — clone a repository into the workspace.
pub async fn checkout(body: CheckoutBody, workspace_dir: &str) -> Result<Value, GatewayError> {
    if body.repo_url.trim().is_empty() {
        return Err(GatewayError::bad_request("repoUrl cannot be empty"));
    }
    let target_dir = match body.target_dir {
        Some(dir) => dir,
        None => format!("{workspace_dir}/{}", derive_repo_name(&body.repo_url)),
    };
    validate_path(&target_dir)?;

    let mut command = tokio::process::Command::new("git");
    command.arg("clone");
    if let Some(branch) = &body.branch {
        command.arg("--branch").arg(branch);
    }
    command.arg(&body.repo_url).arg(&target_dir);

    tracing::info!(repo = %body.repo_url, target = %target_dir, "cloning repository");
    let output = command.output().await.map_err(|e| {
        GatewayError(
            ApiError::new(Domain::Git, warden_core::ErrorCode::Internal, e.to_string())
                .with_path(target_dir.clone()),
        )
    })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        let code = classify_git(&stderr, body.branch.as_deref(), GitPhase::Clone);
        tracing::warn!(repo = %body.repo_url, "clone failed: {}", stderr.trim());
        return Err(GatewayError(
            ApiError::new(Domain::Git, code, "git clone failed")
                .with_details(stderr)
                .with_path(target_dir),
        ));
    }

    Ok(json!({
        "success": true,
        "repoUrl": body.repo_url,
        "branch": body.branch,
        "targetDir": target_dir,
    }))
}

/// Last path segment of the repository URL, `.git` stripped.
fn derive_repo_name(repo_url: &str) -> String {
    let trimmed = repo_url.trim_end_matches('/');
    let last = trimmed.rsplit('/').next().unwrap_or(trimmed);
    last.trim_end_matches(".git").to_owned()
}
