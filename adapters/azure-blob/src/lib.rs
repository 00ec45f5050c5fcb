//! Azure Blob Storage adapter implementing the `BlobStore` port.
//!
//! Purpose
//! - Provision containers and upload/download block blobs through
//!   `azure_storage_blobs`, configured from a storage connection string.
//! - Works against Azurite: `BlobEndpoint=` in the connection string becomes
//!   a custom cloud location, `UseDevelopmentStorage=true` the default
//!   emulator address.
//!
//! Notes
//! - Service errors carry an `x-ms-error-code`; "already exists" and
//!   "not found" codes are mapped onto the matching `CoreError` variants.
//! - Calls are bridged to the async SDK through `runtime_bridge`.

use azure_core::error::ErrorKind;
use azure_core::request_options::IfMatchCondition;
use azure_storage::{CloudLocation, ConnectionString, StorageCredentials};
use azure_storage_blobs::prelude::{BlobServiceClient, ClientBuilder};
use domain::{BlobStore, CoreError, ResourceName, Service};
use runtime_bridge::BlockingRuntime;
use tracing::{debug, info};

const CONTAINER_EXISTS: &str = "ContainerAlreadyExists";
const BLOB_EXISTS: &str = "BlobAlreadyExists";
const NOT_FOUND_CODES: [&str; 2] = ["ContainerNotFound", "BlobNotFound"];

/// Where the blob service lives, resolved from a connection string.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Endpoint {
    /// `UseDevelopmentStorage=true`: Azurite on its default address.
    DevelopmentStorage,
    /// Explicit `BlobEndpoint=` URI (Azurite containers, sovereign clouds).
    Custom { account: String, uri: String },
    /// Public Azure cloud for the named account.
    Public { account: String },
}

impl Endpoint {
    /// Resolve the blob endpoint described by a parsed connection string.
    pub fn from_connection_string(cs: &ConnectionString<'_>) -> Result<Self, CoreError> {
        if cs.use_development_storage == Some(true) {
            return Ok(Self::DevelopmentStorage);
        }
        let account = cs
            .account_name
            .ok_or_else(|| config_err("connection string has no AccountName"))?
            .to_string();
        Ok(match cs.blob_endpoint {
            Some(uri) => Self::Custom {
                account,
                uri: uri.trim_end_matches('/').to_string(),
            },
            None => Self::Public { account },
        })
    }
}

/// Blob store backed by Azure Blob Storage (or Azurite).
#[derive(Clone)]
pub struct AzureBlobStore {
    service: BlobServiceClient,
    rt: BlockingRuntime,
}

impl AzureBlobStore {
    /// Build a service client from a storage connection string.
    pub fn from_connection_string(conn: &str, rt: BlockingRuntime) -> Result<Self, CoreError> {
        let cs = ConnectionString::new(conn)
            .map_err(|e| config_err(format!("invalid connection string: {e}")))?;
        let endpoint = Endpoint::from_connection_string(&cs)?;
        let builder = match &endpoint {
            Endpoint::DevelopmentStorage => ClientBuilder::emulator(),
            Endpoint::Custom { account, uri } => {
                let credentials = credentials_from(&cs)?;
                ClientBuilder::with_location(
                    CloudLocation::Custom {
                        account: account.clone(),
                        uri: uri.clone(),
                    },
                    credentials,
                )
            }
            Endpoint::Public { account } => {
                let credentials = credentials_from(&cs)?;
                ClientBuilder::new(account.clone(), credentials)
            }
        };
        info!(endpoint = ?endpoint, "blob service client ready");
        Ok(Self::with_client(builder.blob_service_client(), rt))
    }

    pub fn with_client(service: BlobServiceClient, rt: BlockingRuntime) -> Self {
        Self { service, rt }
    }
}

impl BlobStore for AzureBlobStore {
    fn create_container(&self, container: &ResourceName) -> Result<(), CoreError> {
        let client = self.service.container_client(container.as_str());
        self.rt
            .block_on(async { client.create().await })
            .map_err(|e| map_azure_err(e, CONTAINER_EXISTS))?;
        debug!(container = %container, "container created");
        Ok(())
    }

    fn upload_blob(
        &self,
        container: &ResourceName,
        name: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<(), CoreError> {
        let blob = self
            .service
            .container_client(container.as_str())
            .blob_client(name);
        let data = body.to_vec();
        let fut = async {
            let mut req = blob.put_block_blob(data).content_type("text/plain");
            if !overwrite {
                // If-None-Match: * makes the service refuse to replace an existing blob
                req = req.if_match(IfMatchCondition::NotMatch("*".into()));
            }
            req.await
        };
        self.rt
            .block_on(fut)
            .map_err(|e| map_azure_err(e, BLOB_EXISTS))?;
        debug!(container = %container, blob = name, bytes = body.len(), overwrite, "blob uploaded");
        Ok(())
    }

    fn download_blob(
        &self,
        container: &ResourceName,
        name: &str,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        let blob = self
            .service
            .container_client(container.as_str())
            .blob_client(name);
        match self.rt.block_on(async { blob.get_content().await }) {
            Ok(data) => Ok(Some(data)),
            Err(e) if error_code(&e) == Some("BlobNotFound") => Ok(None),
            Err(e) => Err(map_azure_err(e, BLOB_EXISTS)),
        }
    }
}

fn credentials_from(cs: &ConnectionString<'_>) -> Result<StorageCredentials, CoreError> {
    cs.storage_credentials()
        .map_err(|e| config_err(format!("unusable connection string credentials: {e}")))
}

fn config_err(msg: impl Into<String>) -> CoreError {
    CoreError::provider(Service::BlobStorage, msg)
}

/// The `x-ms-error-code` of a service error, if any.
fn error_code(e: &azure_core::Error) -> Option<&str> {
    match e.kind() {
        ErrorKind::HttpResponse { error_code, .. } => error_code.as_deref(),
        _ => None,
    }
}

/// Classify a service error code; `exists_code` is the code that means
/// the resource being created is already there.
fn classify(code: Option<&str>, exists_code: &str) -> Option<CoreError> {
    match code {
        Some(c) if c == exists_code => Some(CoreError::AlreadyExists),
        Some(c) if NOT_FOUND_CODES.contains(&c) => Some(CoreError::NotFound),
        _ => None,
    }
}

fn map_azure_err(e: azure_core::Error, exists_code: &str) -> CoreError {
    classify(error_code(&e), exists_code)
        .unwrap_or_else(|| CoreError::provider(Service::BlobStorage, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const AZURITE: &str = "DefaultEndpointsProtocol=http;AccountName=devstoreaccount1;\
        AccountKey=Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==;\
        BlobEndpoint=http://azurite:10000/devstoreaccount1/;";

    #[test]
    fn azurite_connection_string_resolves_to_custom_endpoint() {
        let cs = ConnectionString::new(AZURITE).expect("parse");
        let ep = Endpoint::from_connection_string(&cs).unwrap();
        assert_eq!(
            ep,
            Endpoint::Custom {
                account: "devstoreaccount1".into(),
                uri: "http://azurite:10000/devstoreaccount1".into(),
            }
        );
    }

    #[test]
    fn development_storage_shortcut() {
        let cs = ConnectionString::new("UseDevelopmentStorage=true").expect("parse");
        assert_eq!(
            Endpoint::from_connection_string(&cs).unwrap(),
            Endpoint::DevelopmentStorage
        );
    }

    #[test]
    fn account_without_endpoint_is_public_cloud() {
        let cs = ConnectionString::new("AccountName=acme;AccountKey=a2V5").expect("parse");
        assert_eq!(
            Endpoint::from_connection_string(&cs).unwrap(),
            Endpoint::Public { account: "acme".into() }
        );
    }

    #[test]
    fn missing_account_is_rejected() {
        let cs = ConnectionString::new("BlobEndpoint=http://localhost:10000/x").expect("parse");
        assert!(Endpoint::from_connection_string(&cs).is_err());
    }

    #[test]
    fn error_codes_map_to_domain_errors() {
        assert_eq!(
            classify(Some("ContainerAlreadyExists"), CONTAINER_EXISTS),
            Some(CoreError::AlreadyExists)
        );
        assert_eq!(
            classify(Some("BlobAlreadyExists"), BLOB_EXISTS),
            Some(CoreError::AlreadyExists)
        );
        assert_eq!(
            classify(Some("ContainerNotFound"), CONTAINER_EXISTS),
            Some(CoreError::NotFound)
        );
        assert_eq!(classify(Some("AuthorizationFailure"), CONTAINER_EXISTS), None);
        assert_eq!(classify(None, CONTAINER_EXISTS), None);
    }

    #[test]
    fn builds_client_from_azurite_string_without_network() {
        let rt = BlockingRuntime::new().expect("runtime");
        assert!(AzureBlobStore::from_connection_string(AZURITE, rt).is_ok());
    }
}
