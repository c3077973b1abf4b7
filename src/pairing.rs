use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use base64::Engine;
use tokio::time::Instant;
use tracing::{info, warn};

/// Decode a bridge QR payload: base64 PNG, optionally as a `data:` URL.
pub fn decode_qr(qr: &str) -> Result<Vec<u8>> {
    let encoded = match qr.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => qr,
    };
    base64::engine::general_purpose::STANDARD
        .decode(encoded.trim())
        .context("QR code is not valid base64")
}

/// Tracks first-time pairing: the QR image on disk and how long the user
/// has left to scan it.
pub struct Pairing {
    qr_path: PathBuf,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl Pairing {
    pub fn new(qr_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            qr_path: qr_path.into(),
            timeout,
            deadline: None,
        }
    }

    /// Set while a QR code is waiting to be scanned
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Write (or refresh) the QR image. The first code starts the timeout.
    pub async fn show_qr(&mut self, qr: &str) -> Result<()> {
        let png = decode_qr(qr)?;
        tokio::fs::write(&self.qr_path, png)
            .await
            .with_context(|| format!("Failed to write QR code to {}", self.qr_path.display()))?;

        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.timeout);
            println!("Scan the QR code saved to {}", self.qr_path.display());
        }
        info!("QR code saved to {}", self.qr_path.display());
        Ok(())
    }

    /// Paired: the QR image is no longer needed.
    pub async fn connected(&mut self) -> Result<()> {
        if self.deadline.take().is_some() {
            info!("Pairing complete");
        }
        self.remove_qr().await
    }

    pub async fn timed_out(&mut self) -> Result<()> {
        self.deadline = None;
        warn!(
            "Pairing timed out after {}s; restart the bot to request a new QR code",
            self.timeout.as_secs()
        );
        self.remove_qr().await
    }

    /// Delete the QR image if present.
    pub async fn remove_qr(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.qr_path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to remove QR code {}", self.qr_path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_B64: &str = "iVBORw0KGgo=";

    #[test]
    fn test_decode_qr_accepts_data_url() {
        let plain = decode_qr(PNG_B64).unwrap();
        let data_url = decode_qr(&format!("data:image/png;base64,{}", PNG_B64)).unwrap();
        assert_eq!(plain, data_url);
        assert_eq!(&plain[1..4], b"PNG");
        assert!(decode_qr("not base64!").is_err());
    }

    #[tokio::test]
    async fn test_qr_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrcode.png");
        let mut pairing = Pairing::new(&path, Duration::from_secs(120));
        assert!(pairing.deadline().is_none());

        pairing.show_qr(PNG_B64).await.unwrap();
        assert!(path.exists());
        let deadline = pairing.deadline().unwrap();

        pairing.show_qr(PNG_B64).await.unwrap();
        assert_eq!(pairing.deadline(), Some(deadline));

        pairing.connected().await.unwrap();
        assert!(!path.exists());
        assert!(pairing.deadline().is_none());
    }

    #[tokio::test]
    async fn test_timeout_removes_qr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("qrcode.png");
        let mut pairing = Pairing::new(&path, Duration::from_secs(1));

        pairing.show_qr(PNG_B64).await.unwrap();
        pairing.timed_out().await.unwrap();
        assert!(!path.exists());
        assert!(pairing.deadline().is_none());

        // removing twice is fine
        pairing.remove_qr().await.unwrap();
    }
}
