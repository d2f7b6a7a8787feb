//! Evaluator image bootstrap for the docker launcher.

use std::path::Path;
use std::process::Stdio;

use tokio::process::Command;
use tracing::{info, warn};

use crate::error::EvalError;

/// What `ensure_image` found or did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageStatus {
    /// Already present locally.
    Present,
    /// Was missing and has been built.
    Built,
    /// Missing and no build context was configured.
    Missing,
}

/// Arguments for `docker images -q {image}`.
pub fn inspect_args(image: &str) -> Vec<String> {
    vec!["images".into(), "-q".into(), image.into()]
}

/// Arguments for `docker build -t {image} -f {dir}/Dockerfile {dir}`.
pub fn build_args(image: &str, context_dir: &Path) -> Vec<String> {
    vec![
        "build".into(),
        "-t".into(),
        image.into(),
        "-f".into(),
        context_dir.join("Dockerfile").display().to_string(),
        context_dir.display().to_string(),
    ]
}

/// Make sure `image` exists, building it from `context_dir` when it does not.
pub async fn ensure_image(
    image: &str,
    context_dir: Option<&Path>,
) -> Result<ImageStatus, EvalError> {
    ensure_image_with("docker", image, context_dir).await
}

/// `ensure_image` against an arbitrary docker-compatible CLI.
pub async fn ensure_image_with(
    docker: &str,
    image: &str,
    context_dir: Option<&Path>,
) -> Result<ImageStatus, EvalError> {
    let output = Command::new(docker)
        .args(inspect_args(image))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| EvalError::ImageUnavailable {
            image: image.to_string(),
            reason: format!("failed to run {docker}: {e}"),
        })?;

    if !output.status.success() {
        return Err(EvalError::ImageUnavailable {
            image: image.to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    if !String::from_utf8_lossy(&output.stdout).trim().is_empty() {
        info!(image, "Evaluator image present");
        return Ok(ImageStatus::Present);
    }

    let Some(dir) = context_dir else {
        warn!(image, "Evaluator image missing and no build context configured");
        return Ok(ImageStatus::Missing);
    };

    info!(image, context = %dir.display(), "Building evaluator image");
    let status = Command::new(docker)
        .args(build_args(image, dir))
        .stdin(Stdio::null())
        .status()
        .await
        .map_err(|e| EvalError::ImageUnavailable {
            image: image.to_string(),
            reason: format!("failed to run {docker} build: {e}"),
        })?;

    if !status.success() {
        return Err(EvalError::ImageUnavailable {
            image: image.to_string(),
            reason: format!("build exited with {status}"),
        });
    }

    info!(image, "Evaluator image built");
    Ok(ImageStatus::Built)
}

#[cfg(test)]
mod tests {
    use std::os::unix::fs::PermissionsExt;

    use super::*;

    #[test]
    fn command_lines() {
        assert_eq!(inspect_args("eval_server"), vec!["images", "-q", "eval_server"]);
        assert_eq!(
            build_args("eval_server", Path::new("/srv/eval")),
            vec!["build", "-t", "eval_server", "-f", "/srv/eval/Dockerfile", "/srv/eval"]
        );
    }

    /// A fake docker CLI: `images -q` prints `$IMAGE_ID`, `build` exits with `$BUILD_EXIT`.
    fn fake_docker(dir: &Path, image_id: &str, build_exit: i32) -> String {
        let path = dir.join("docker");
        let script = format!(
            "#!/bin/sh\ncase \"$1\" in\n  images) printf '%s' '{image_id}' ;;\n  build) exit {build_exit} ;;\nesac\n"
        );
        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path.display().to_string()
    }

    #[tokio::test]
    async fn present_image_is_not_rebuilt() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = fake_docker(tmp.path(), "3f2a1b", 1);
        let status = ensure_image_with(&docker, "eval_server", Some(tmp.path()))
            .await
            .unwrap();
        assert_eq!(status, ImageStatus::Present);
    }

    #[tokio::test]
    async fn missing_image_is_built() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = fake_docker(tmp.path(), "", 0);
        let status = ensure_image_with(&docker, "eval_server", Some(tmp.path()))
            .await
            .unwrap();
        assert_eq!(status, ImageStatus::Built);
    }

    #[tokio::test]
    async fn missing_without_context() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = fake_docker(tmp.path(), "", 0);
        let status = ensure_image_with(&docker, "eval_server", None).await.unwrap();
        assert_eq!(status, ImageStatus::Missing);
    }

    #[tokio::test]
    async fn failed_build_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let docker = fake_docker(tmp.path(), "", 2);
        let err = ensure_image_with(&docker, "eval_server", Some(tmp.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ImageUnavailable { .. }));
    }

    #[tokio::test]
    async fn missing_cli_is_error() {
        let err = ensure_image_with("/nonexistent/docker", "eval_server", None)
            .await
            .unwrap_err();
        assert!(matches!(err, EvalError::ImageUnavailable { .. }));
    }
}
