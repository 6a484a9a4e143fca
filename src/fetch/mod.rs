//! Loading raw input bytes from a local path or an HTTP(S) URL.

mod basic;
mod client;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::{Context, Result};
use tracing::debug;

pub async fn fetch_bytes<C: HttpClient>(client: &C, url: &str) -> Result<Vec<u8>> {
    let req = reqwest::Request::new(reqwest::Method::GET, url.parse()?);

    let resp = client.execute(req).await?;
    Ok(resp.bytes().await?.to_vec())
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

/// Reads `source` from disk, or downloads it when it is an `http(s)://` URL.
#[tracing::instrument(fields(source = %source))]
pub async fn read_source(source: &str) -> Result<Vec<u8>> {
    let bytes = if is_url(source) {
        let client = BasicClient::new();
        fetch_bytes(&client, source)
            .await
            .with_context(|| format!("failed to download {source}"))?
    } else {
        tokio::fs::read(source)
            .await
            .with_context(|| format!("failed to read {source}"))?
    };
    debug!(bytes = bytes.len(), "Source loaded");
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::fs;

    #[test]
    fn test_is_url() {
        assert!(is_url("https://example.org/data.csv"));
        assert!(is_url("http://localhost:8080/a.csv"));
        assert!(!is_url("httpdata.csv"));
        assert!(!is_url("data/weather.csv"));
    }

    #[tokio::test]
    async fn test_read_source_from_file() {
        let path = env::temp_dir().join("aeth_ona_test_read_source.csv");
        fs::write(&path, "timestamp,blueBC1\n").unwrap();

        let bytes = read_source(path.to_str().unwrap()).await.unwrap();
        assert_eq!(bytes, b"timestamp,blueBC1\n");

        fs::remove_file(&path).unwrap();
    }

    #[tokio::test]
    async fn test_read_source_missing_file_names_path() {
        let err = read_source("/nonexistent/aeth.csv").await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/aeth.csv"));
    }
}
