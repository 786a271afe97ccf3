use anyhow::{Context, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

fn model_filename(model_name: &str) -> String {
    format!("ggml-{model_name}.bin")
}

fn model_url(model_name: &str) -> String {
    format!("{MODEL_BASE_URL}/{}", model_filename(model_name))
}

/// Makes sure the offline model exists at `model_path`
///
/// Returns `true` if it had to be downloaded.
///
/// # Errors
/// Returns error if the download or the write fails
pub fn ensure_model(model_name: &str, model_path: &Path) -> Result<bool> {
    if model_path.exists() {
        tracing::debug!(path = %model_path.display(), "offline model present");
        return Ok(false);
    }

    tracing::info!(
        model = model_name,
        path = %model_path.display(),
        "offline model missing, downloading"
    );
    download(model_name, model_path)?;
    Ok(true)
}

fn download(model_name: &str, model_path: &Path) -> Result<()> {
    if model_name.trim().is_empty() {
        anyhow::bail!("offline model name is empty");
    }
    let url = model_url(model_name);

    if let Some(parent) = model_path.parent() {
        fs::create_dir_all(parent).context("failed to create model directory")?;
    }

    let response = reqwest::blocking::get(&url)
        .with_context(|| format!("failed to download model from {url}"))?;
    if !response.status().is_success() {
        anyhow::bail!("download failed with status {}: {url}", response.status());
    }
    let bytes = response.bytes().context("failed to read response bytes")?;

    // rename into place so a partial download is never picked up as a model
    let partial = model_path.with_extension("part");
    let mut file = fs::File::create(&partial)
        .with_context(|| format!("failed to create {}", partial.display()))?;
    file.write_all(&bytes)
        .context("failed to write model file")?;
    drop(file);

    fs::rename(&partial, model_path).with_context(|| {
        format!(
            "failed to move {} to {}",
            partial.display(),
            model_path.display()
        )
    })?;

    tracing::info!(path = %model_path.display(), size = bytes.len(), "offline model downloaded");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_url() {
        assert_eq!(model_filename("base.en"), "ggml-base.en.bin");
        assert_eq!(
            model_url("tiny"),
            "https://huggingface.co/ggerganov/whisper.cpp/resolve/main/ggml-tiny.bin"
        );
    }

    #[test]
    fn test_existing_model_is_not_downloaded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggml-base.en.bin");
        fs::write(&path, b"model").unwrap();

        assert!(!ensure_model("base.en", &path).unwrap());
        assert_eq!(fs::read(&path).unwrap(), b"model");
    }

    #[test]
    fn test_empty_model_name_fails_without_network() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("models").join("ggml-.bin");
        assert!(ensure_model(" ", &path).is_err());
        assert!(!path.exists());
    }

    #[test]
    #[ignore = "requires network access and downloads a model"]
    fn test_download_tiny_model() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ggml-tiny.bin");
        assert!(ensure_model("tiny", &path).unwrap());
        assert!(fs::metadata(&path).unwrap().len() > 0);
    }
}
