//! Disk provisioning with `qemu-img`.

use crate::command::run;
use crate::error::{Result, VirtError};
use std::path::{Path, PathBuf};

/// Thin wrapper around the `qemu-img` binary.
#[derive(Debug, Clone)]
pub struct QemuImg {
    binary: PathBuf,
}

impl Default for QemuImg {
    fn default() -> Self {
        Self::new("qemu-img")
    }
}

impl QemuImg {
    /// Use the `qemu-img` found at `binary` (a bare name is resolved on `PATH`).
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Path of the binary this wrapper invokes.
    pub fn binary(&self) -> &Path {
        &self.binary
    }

    /// Create a qcow2 overlay at `dest` backed by the qcow2 image at `base`.
    pub async fn create_overlay(&self, base: &Path, dest: &Path) -> Result<()> {
        run(
            &self.binary,
            Self::overlay_args(base, dest).iter().map(String::as_str),
        )
        .await?;
        Ok(())
    }

    /// Resize `image` to `size_gb` GiB.
    ///
    /// `allow_shrink` must be set for a size below the current virtual size;
    /// `qemu-img` refuses to shrink otherwise since it can discard data.
    pub async fn resize(&self, image: &Path, size_gb: u32, allow_shrink: bool) -> Result<()> {
        run(
            &self.binary,
            Self::resize_args(image, size_gb, allow_shrink)
                .iter()
                .map(String::as_str),
        )
        .await?;
        Ok(())
    }

    /// Clone `base` into a new overlay at `dest`, then resize it.
    pub async fn clone_and_resize(
        &self,
        base: &Path,
        dest: &Path,
        size_gb: u32,
        allow_shrink: bool,
    ) -> Result<()> {
        let start = std::time::Instant::now();
        tracing::debug!(
            base = %base.display(),
            dest = %dest.display(),
            size_gb,
            allow_shrink,
            "Provisioning disk image"
        );

        self.create_overlay(base, dest)
            .await
            .map_err(|e| VirtError::Provision {
                step: "clone",
                source: Box::new(e),
            })?;

        self.resize(dest, size_gb, allow_shrink)
            .await
            .map_err(|e| VirtError::Provision {
                step: "resize",
                source: Box::new(e),
            })?;

        tracing::info!(
            dest = %dest.display(),
            size_gb,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Disk image provisioned"
        );
        Ok(())
    }

    fn overlay_args(base: &Path, dest: &Path) -> Vec<String> {
        vec![
            "create".into(),
            "-f".into(),
            "qcow2".into(),
            "-F".into(),
            "qcow2".into(),
            "-b".into(),
            base.to_string_lossy().into_owned(),
            dest.to_string_lossy().into_owned(),
        ]
    }

    fn resize_args(image: &Path, size_gb: u32, allow_shrink: bool) -> Vec<String> {
        let mut args = vec!["resize".to_string()];
        if allow_shrink {
            args.push("--shrink".into());
        }
        args.push(image.to_string_lossy().into_owned());
        args.push(format!("{size_gb}G"));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_args() {
        let args = QemuImg::overlay_args(Path::new("/images/base.qcow2"), Path::new("/vm/a.qcow2"));
        assert_eq!(
            args,
            [
                "create",
                "-f",
                "qcow2",
                "-F",
                "qcow2",
                "-b",
                "/images/base.qcow2",
                "/vm/a.qcow2"
            ]
        );
    }

    #[test]
    fn test_resize_args() {
        let grow = QemuImg::resize_args(Path::new("/vm/a.qcow2"), 20, false);
        assert_eq!(grow, ["resize", "/vm/a.qcow2", "20G"]);

        let shrink = QemuImg::resize_args(Path::new("/vm/a.qcow2"), 5, true);
        assert_eq!(shrink, ["resize", "--shrink", "/vm/a.qcow2", "5G"]);
    }

    #[tokio::test]
    async fn test_clone_failure_is_tagged() {
        let img = QemuImg::new("/nonexistent/qemu-img");
        let err = img
            .clone_and_resize(Path::new("/a"), Path::new("/b"), 1, true)
            .await
            .unwrap_err();
        assert!(matches!(err, VirtError::Provision { step: "clone", .. }));
    }
}
