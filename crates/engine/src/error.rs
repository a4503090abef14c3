use std::io;
use std::path::PathBuf;

/// Failures of the region codec and region enumeration.
///
/// Every variant is local to one region or one world: callers log it and
/// move on, nothing here aborts a scan.
#[derive(Debug, thiserror::Error)]
pub enum RegionError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to make {} writable", path.display())]
    NotWritable { path: PathBuf },

    #[error("unable to list regions in {}: {source}", path.display())]
    Listing {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RegionError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Failures while asking protection hooks about a chunk.
#[derive(Debug, thiserror::Error)]
pub enum HookError {
    #[error("protection hook '{name}' failed: {source}")]
    Hook {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("main-thread executor is not accepting work")]
    MainThreadUnavailable,
}
