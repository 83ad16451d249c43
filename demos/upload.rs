//! Uploads a local file to a drive folder.
//!
//! ```text
//! RANGE_UPLOAD_TOKEN=... cargo run --example upload -- <drive-id> <folder-id> <path>
//! ```
//!
//! `RANGE_UPLOAD_API` points the client somewhere other than the public API,
//! `RANGE_UPLOAD_CHUNK_SIZE` and `RANGE_UPLOAD_CONFLICT_BEHAVIOR` tune the
//! upload. Ctrl-C cancels.

use std::env;
use std::path::Path;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use range_upload::{DriveClient, HttpTransport, KnownSize, UploadConfig, UploadTarget, DEFAULT_API_BASE};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    if let Err(e) = run().await {
        error!(error = %e, "upload failed");
        std::process::exit(1);
    }
}

async fn run() -> range_upload::Result<()> {
    let args: Vec<String> = env::args().skip(1).collect();
    let [drive_id, folder_id, path] = args.as_slice() else {
        return Err(range_upload::UploadError::Configuration(
            "usage: upload <drive-id> <folder-id> <path>".to_string(),
        ));
    };

    let mut headers = HeaderMap::new();
    if let Ok(token) = env::var("RANGE_UPLOAD_TOKEN") {
        headers.insert(AUTHORIZATION, HeaderValue::from_str(&format!("Bearer {token}"))?);
    }
    let base = env::var("RANGE_UPLOAD_API").unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
    let transport = HttpTransport::with_default_headers(&base, headers)?;
    let client = DriveClient::new(transport).with_config(UploadConfig::from_env());

    let name = Path::new(path)
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or(path.as_str());
    let target = UploadTarget::new(drive_id.as_str(), folder_id.as_str(), name);
    let mut source = KnownSize::open(path).await?;

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let item = client.upload_file(&target, &mut source, cancel).await?;
    info!(id = %item.id, size = ?item.size, url = ?item.web_url, "uploaded");
    Ok(())
}
