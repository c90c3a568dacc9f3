//! Session-level events derived from raw CDP traffic.

use serde::{Deserialize, Serialize};

/// A network response whose body has finished loading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkResponse {
    pub request_id: String,
    pub url: String,
    pub method: String,
    pub status: i64,
    pub mime_type: Option<String>,
}

/// States reported by `Browser.downloadProgress`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DownloadState {
    InProgress,
    Completed,
    Canceled,
    Interrupted,
}

/// Events observable on the shared browser session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum SessionEvent {
    Response(NetworkResponse),
    DownloadWillBegin {
        guid: String,
        url: String,
        suggested_filename: String,
    },
    DownloadProgress {
        guid: String,
        state: DownloadState,
        error: Option<String>,
        received_bytes: Option<f64>,
        total_bytes: Option<f64>,
    },
}

/// Arguments for `Browser.setDownloadBehavior`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadBehavior {
    pub behavior: String,
    pub events_enabled: bool,
    pub download_path: String,
}

impl DownloadBehavior {
    pub fn allow_into(download_path: impl Into<String>) -> Self {
        Self {
            behavior: "allow".to_string(),
            events_enabled: true,
            download_path: download_path.into(),
        }
    }
}
