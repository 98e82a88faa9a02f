use std::path::PathBuf;

use tracing::debug;

use crate::error::FetchError;

/// Where subtitle text is read from, after blob handles have been resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchSource {
    File(PathBuf),
    Url(String),
}

impl FetchSource {
    /// Classify a remote locator.  Only http(s) is fetchable.
    pub fn from_remote(url: &str) -> Result<Self, FetchError> {
        let lower = url.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Ok(FetchSource::Url(url.to_string()))
        } else {
            Err(FetchError::Unsupported(url.to_string()))
        }
    }
}

/// Read the whole subtitle document.  Invalid UTF-8 is replaced rather than
/// rejected; legacy-encoded files still yield usable timings.
pub async fn fetch_subtitle(source: FetchSource) -> Result<String, FetchError> {
    match source {
        FetchSource::File(path) => {
            debug!("subtitle: reading {}", path.display());
            let bytes = tokio::fs::read(&path).await?;
            Ok(String::from_utf8_lossy(&bytes).into_owned())
        }
        FetchSource::Url(url) => {
            debug!("subtitle: fetching {}", url);
            let response = reqwest::get(&url).await?;
            if !response.status().is_success() {
                return Err(FetchError::Status(response.status()));
            }
            Ok(response.text().await?)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_http_is_remote_fetchable() {
        assert!(matches!(
            FetchSource::from_remote("HTTPS://subs.example/a.srt"),
            Ok(FetchSource::Url(_))
        ));
        assert!(matches!(
            FetchSource::from_remote("ftp://subs.example/a.srt"),
            Err(FetchError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_reads_local_file_lossily() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latin1.srt");
        std::fs::write(&path, b"00:00:01,000 --> 00:00:02,000\ncaf\xe9\n").unwrap();
        let text = fetch_subtitle(FetchSource::File(path)).await.unwrap();
        assert!(text.starts_with("00:00:01,000"));
        assert!(text.contains("caf\u{fffd}"));
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = fetch_subtitle(FetchSource::File(dir.path().join("nope.srt"))).await;
        assert!(matches!(result, Err(FetchError::Io(_))));
    }
}
