use std::{fs, path::Path, time::Duration};

use photoloop_state::{MediaId, MediaKind};

use crate::{SourceError, SourceResult};

/// Read timeout for media downloads.
const DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Some album hosts refuse requests with a default library user agent.
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120.0.0.0";

/// URL variant that returns the original-size image.
pub fn full_resolution_url(base: &str) -> String {
    format!("{base}=s0")
}

/// URL variant that returns the image constrained to `width` x `height`.
pub fn sized_url(base: &str, width: u32, height: u32) -> String {
    format!("{base}=w{width}-h{height}")
}

/// URL variant that returns a downloadable video stream.
pub fn video_download_url(base: &str) -> String {
    format!("{base}=dv")
}

/// Derive the concrete download URL for an item from the image-acquisition
/// policy.
pub fn download_url(base: &str, kind: MediaKind, full_resolution: bool, max_dimension: u32) -> String {
    match kind {
        MediaKind::Video => video_download_url(base),
        MediaKind::Photo => {
            if full_resolution {
                full_resolution_url(base)
            } else {
                sized_url(base, max_dimension, max_dimension)
            }
        }
    }
}

/// Deterministic cache filename for a downloaded item.
pub fn cache_file_name(media_id: &MediaId, kind: MediaKind) -> String {
    match kind {
        MediaKind::Photo => format!("{media_id}.jpg"),
        MediaKind::Video => format!("{media_id}.mp4"),
    }
}

/// Acquires bytes for a URL into a destination file. Abstracted so sync tests
/// can run without a network.
pub trait MediaFetcher: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path) -> SourceResult<()>;
}

/// Blocking HTTP fetcher used in production. Runs on the dedicated sync
/// thread, streaming the response body straight to disk.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(DOWNLOAD_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()
            .expect("failed to construct http client");
        HttpFetcher { client }
    }

    fn try_fetch(&self, url: &str, dest: &Path) -> SourceResult<()> {
        tracing::debug!("downloading {url}");
        let mut response = self.client.get(url).send()?.error_for_status()?;
        let mut file = fs::File::create(dest)?;
        response.copy_to(&mut file).map_err(SourceError::Http)?;
        Ok(())
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl MediaFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> SourceResult<()> {
        let result = self.try_fetch(url, dest);
        if result.is_err() {
            // Never leave a truncated download behind.
            let _ = fs::remove_file(dest);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_variants() {
        assert_eq!(full_resolution_url("https://h/x"), "https://h/x=s0");
        assert_eq!(sized_url("https://h/x", 1920, 1920), "https://h/x=w1920-h1920");
        assert_eq!(video_download_url("https://h/x"), "https://h/x=dv");
    }

    #[test]
    fn download_url_follows_acquisition_policy() {
        assert_eq!(
            download_url("https://h/x", MediaKind::Photo, true, 1920),
            "https://h/x=s0"
        );
        assert_eq!(
            download_url("https://h/x", MediaKind::Photo, false, 1280),
            "https://h/x=w1280-h1280"
        );
        assert_eq!(
            download_url("https://h/x", MediaKind::Video, true, 1920),
            "https://h/x=dv"
        );
    }

    #[test]
    fn cache_file_names_are_deterministic() {
        let id = MediaId::from_uri("https://h/x");
        assert_eq!(
            cache_file_name(&id, MediaKind::Photo),
            format!("{id}.jpg")
        );
        assert_eq!(cache_file_name(&id, MediaKind::Video), format!("{id}.mp4"));
    }
}
