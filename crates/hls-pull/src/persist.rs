//! Optional on-disk copy of the raw segments of a session.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use tracing::{debug, info};
use url::Url;

use crate::HlsPullError;

/// Turns segment saving on while at least one holder keeps it active.
#[derive(Debug, Default, Clone)]
pub struct SaveSwitch {
    inner: Arc<SaveState>,
}

#[derive(Debug, Default)]
struct SaveState {
    holders: AtomicUsize,
    permanent: AtomicBool,
}

/// Keeps saving active until dropped.
#[derive(Debug)]
pub struct SaveGuard {
    inner: Arc<SaveState>,
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        self.inner.holders.fetch_sub(1, Ordering::AcqRel);
    }
}

impl SaveSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self) -> SaveGuard {
        self.inner.holders.fetch_add(1, Ordering::AcqRel);
        SaveGuard {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Keeps saving active for the rest of the switch's life.
    pub fn hold(&self) {
        self.inner.permanent.store(true, Ordering::Release);
    }

    pub fn is_active(&self) -> bool {
        self.inner.permanent.load(Ordering::Acquire)
            || self.inner.holders.load(Ordering::Acquire) > 0
    }
}

/// Writes segments of one rendition below `<base>/<stream path>/<rendition>/`.
///
/// Renditions get their own directory since their playlists commonly reuse
/// segment names.
#[derive(Debug, Clone)]
pub struct SegmentWriter {
    dir: PathBuf,
}

impl SegmentWriter {
    pub fn new(base: &Path, stream_path: &str, rendition: &str) -> Self {
        Self {
            dir: base
                .join(stream_path.trim_matches('/'))
                .join(rendition),
        }
    }

    pub async fn write(&self, segment_url: &Url, body: &[u8]) -> Result<PathBuf, HlsPullError> {
        let name = segment_file_name(segment_url).ok_or_else(|| {
            HlsPullError::UrlError(format!("Segment URL {segment_url} has no file name"))
        })?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.dir.join(name);
        tokio::fs::write(&path, body).await?;
        debug!(path = %path.display(), len = body.len(), "Segment saved");
        Ok(path)
    }
}

/// Base file name of a segment URL, query string excluded.
pub fn segment_file_name(url: &Url) -> Option<&str> {
    url.path_segments()?.next_back().filter(|name| !name.is_empty())
}

/// Creates the persistence base directory when the plugin starts.
pub fn prepare_base_dir(base: &Path) -> Result<(), HlsPullError> {
    std::fs::create_dir_all(base)?;
    info!(path = %base.display(), "HLS persistence directory ready");
    Ok(())
}
