//! Client for the update server.
//!
//! The states only ever see this narrow surface: probe for an update, fetch
//! one object. The wire protocol stays in here.

use std::{fs::File, io, path::{Path, PathBuf}, time::Duration};

use once_cell::sync::OnceCell;
use ota_update_agent_core::UpdateMetadata;
use reqwest::{blocking::Client, StatusCode};
use serde::Serialize;
use tracing::{debug, info};
use url::Url;

const APP_USER_AGENT: &str =
    concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);

/// Extra time the server may ask us to wait before the next probe.
const EXTRA_POLL_HEADER: &str = "add-extra-poll";

static INSTANCE: OnceCell<Client> = OnceCell::new();

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    #[error("failed initializing HTTP client")]
    BuildClient(#[source] reqwest::Error),
    #[error("failed parsing `{address}` as server URL")]
    ParseAddress {
        address: String,
        #[source]
        source: url::ParseError,
    },
    #[error("probe request to `{0}` failed")]
    ProbeRequest(Url, #[source] reqwest::Error),
    #[error("probe request to `{0}` returned unexpected status `{1}`")]
    ProbeStatus(Url, StatusCode),
    #[error("failed reading probe response body")]
    ProbeBody(#[source] reqwest::Error),
    #[error("server sent invalid update metadata")]
    Metadata(#[from] ota_update_agent_core::metadata::Error),
    #[error("download request for object `{object}` failed")]
    DownloadRequest {
        object: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("download request for object `{object}` returned status `{status}`")]
    DownloadStatus { object: String, status: StatusCode },
    #[error("could not open download target `{}`", .path.display())]
    OpenDownloadTarget {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed writing object `{object}` to disk")]
    WriteObject {
        object: String,
        #[source]
        source: io::Error,
    },
}

// Return a HTTPS client with explicit reasonable defaults
fn http() -> Result<&'static Client, Error> {
    INSTANCE.get_or_try_init(|| {
        // We explicitly do not pin certificates and default to using the
        // system's root CAs. This avoids a device that went a long time
        // without updates falling out of sync with pinned certificates and
        // becoming unable to reach the update backend at all.
        Client::builder()
            .tls_built_in_root_certs(true)
            .min_tls_version(reqwest::tls::Version::TLS_1_3)
            .redirect(reqwest::redirect::Policy::none())
            .https_only(true)
            .user_agent(APP_USER_AGENT)
            .timeout(Duration::from_secs(120))
            .build()
            .map_err(Error::BuildClient)
    })
}

/// The device identity reported to the server on every probe.
#[derive(Clone, Debug, Serialize)]
pub struct DeviceIdentity {
    #[serde(rename = "product-uid")]
    pub product_uid: String,
    #[serde(rename = "device-identity")]
    pub device_id: String,
    pub hardware: String,
}

/// Answer to a probe: either there is nothing to do, or the server handed us
/// the metadata of the package we should install.
#[derive(Debug, PartialEq)]
pub enum ProbeResponse {
    NoUpdate { extra_poll: Option<Duration> },
    Update(UpdateMetadata),
}

/// Handle to the update server, identified by its address.
///
/// Cloning is cheap; the underlying HTTP client is shared process-wide.
#[derive(Clone, Debug)]
pub struct ApiClient {
    server_address: String,
}

// States compare equal only if they talk to the same server.
impl PartialEq for ApiClient {
    fn eq(&self, other: &Self) -> bool {
        self.server_address == other.server_address
    }
}

impl ApiClient {
    pub fn new(server_address: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
        }
    }

    pub fn server_address(&self) -> &str {
        &self.server_address
    }

    fn endpoint(&self, path: &str) -> Result<Url, Error> {
        let joined = format!("{}/{}", self.server_address.trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|source| Error::ParseAddress {
            address: joined,
            source,
        })
    }

    /// Asks the server whether an update is available for this device.
    pub fn probe(&self, identity: &DeviceIdentity) -> Result<ProbeResponse, Error> {
        let url = self.endpoint("upgrades")?;
        debug!("probing `{url}` for updates");
        let response = http()?
            .post(url.clone())
            .json(identity)
            .send()
            .map_err(|e| Error::ProbeRequest(url.clone(), e))?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                let extra_poll = response
                    .headers()
                    .get(EXTRA_POLL_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
                    .map(Duration::from_secs);
                Ok(ProbeResponse::NoUpdate { extra_poll })
            }
            StatusCode::OK => {
                let body = response.bytes().map_err(Error::ProbeBody)?;
                let metadata = UpdateMetadata::from_json(&body)?;
                info!(
                    "server offered package `{}` version `{}`",
                    metadata.package_uid(),
                    metadata.version,
                );
                Ok(ProbeResponse::Update(metadata))
            }
            status => Err(Error::ProbeStatus(url, status)),
        }
    }

    /// Downloads one object of a package into `dst_dir`. The file on disk is
    /// named after the object's sha256, matching what
    /// `Downloading` uses to detect already fetched objects.
    pub fn download_object(
        &self,
        product_uid: &str,
        package_uid: &str,
        object_sha256: &str,
        dst_dir: &Path,
    ) -> Result<PathBuf, Error> {
        let url = self.endpoint(&format!(
            "products/{product_uid}/packages/{package_uid}/objects/{object_sha256}"
        ))?;
        debug!("downloading object from `{url}`");
        let mut response = http()?
            .get(url)
            .send()
            .and_then(reqwest::blocking::Response::error_for_status)
            .map_err(|source| Error::DownloadRequest {
                object: object_sha256.to_owned(),
                source,
            })?;
        if response.status() != StatusCode::OK {
            return Err(Error::DownloadStatus {
                object: object_sha256.to_owned(),
                status: response.status(),
            });
        }

        let path = dst_dir.join(object_sha256);
        let mut file = File::create(&path).map_err(|source| Error::OpenDownloadTarget {
            path: path.clone(),
            source,
        })?;
        response
            .copy_to(&mut file)
            .map_err(|source| Error::DownloadRequest {
                object: object_sha256.to_owned(),
                source,
            })?;
        Ok(path)
    }
}
