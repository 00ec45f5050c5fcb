//! S3 adapter implementing the `ObjectStore` port.
//!
//! Backed by `aws-sdk-s3` and aimed at S3-compatible emulators (LocalStack)
//! as well as real S3:
//! - Static credentials, region and endpoint come from `S3Settings`.
//! - Path-style addressing is forced whenever a custom endpoint is set, since
//!   emulators rarely resolve virtual-host bucket names.
//! - Outside `us-east-1` the create request carries a location constraint.
//!
//! Notes:
//! - The domain ports are synchronous. Calls are bridged to the async SDK
//!   through a shared `runtime_bridge::BlockingRuntime`.

use aws_config::BehaviorVersion;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client;
use aws_smithy_types::error::display::DisplayErrorContext;
use aws_smithy_types::error::metadata::ProvideErrorMetadata;
use domain::{CoreError, ObjectStore, ResourceName, Service};
use runtime_bridge::BlockingRuntime;
use tracing::{debug, info};

/// Error codes S3 uses when a bucket with the requested name already exists.
pub const BUCKET_EXISTS_CODES: [&str; 2] = ["BucketAlreadyOwnedByYou", "BucketAlreadyExists"];

/// Region S3 treats as the default; it rejects an explicit constraint for it.
const DEFAULT_REGION: &str = "us-east-1";

/// Connection settings for the S3 client.
#[derive(Clone, Debug)]
pub struct S3Settings {
    pub endpoint_url: Option<String>,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Settings {
    pub fn new(
        endpoint_url: Option<String>,
        region: impl Into<String>,
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
    ) -> Self {
        Self {
            endpoint_url,
            region: region.into(),
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
        }
    }

    fn force_path_style(&self) -> bool {
        self.endpoint_url.is_some()
    }
}

/// Object store backed by S3 (or an S3-compatible emulator).
#[derive(Clone)]
pub struct S3ObjectStore {
    client: Client,
    region: String,
    rt: BlockingRuntime,
}

impl S3ObjectStore {
    /// Build a client from explicit settings. Runs the SDK config loader on `rt`.
    pub fn new(settings: &S3Settings, rt: BlockingRuntime) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.clone(),
            settings.secret_access_key.clone(),
            None,
            None,
            "triapp-static",
        );
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .credentials_provider(credentials);
        if let Some(endpoint) = &settings.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared = rt.block_on(loader.load());
        let conf = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(settings.force_path_style())
            .build();
        info!(
            region = %settings.region,
            endpoint = settings.endpoint_url.as_deref().unwrap_or("default"),
            "s3 client ready"
        );
        Self::with_client(Client::from_conf(conf), settings.region.clone(), rt)
    }

    /// Wrap an already configured SDK client.
    pub fn with_client(client: Client, region: String, rt: BlockingRuntime) -> Self {
        Self { client, region, rt }
    }
}

impl ObjectStore for S3ObjectStore {
    fn create_bucket(&self, bucket: &ResourceName) -> Result<(), CoreError> {
        let name = bucket.as_str().to_string();
        let constraint = location_constraint_for(&self.region);
        let fut = async {
            let mut req = self.client.create_bucket().bucket(name);
            if let Some(c) = constraint {
                req = req.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(c)
                        .build(),
                );
            }
            req.send().await
        };
        self.rt.block_on(fut).map_err(|e| match e.as_service_error() {
            Some(se) if is_bucket_exists_code(se.code()) => CoreError::AlreadyExists,
            _ => map_sdk_err(e),
        })?;
        debug!(bucket = %bucket, "bucket created");
        Ok(())
    }

    fn put_object(&self, bucket: &ResourceName, key: &str, body: &[u8]) -> Result<(), CoreError> {
        let fut = async {
            self.client
                .put_object()
                .bucket(bucket.as_str())
                .key(key)
                .body(ByteStream::from(body.to_vec()))
                .send()
                .await
        };
        self.rt.block_on(fut).map_err(map_sdk_err)?;
        debug!(bucket = %bucket, key, bytes = body.len(), "object written");
        Ok(())
    }

    fn get_object(&self, bucket: &ResourceName, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let fut = async {
            let out = match self
                .client
                .get_object()
                .bucket(bucket.as_str())
                .key(key)
                .send()
                .await
            {
                Ok(out) => out,
                Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                    return Ok(None);
                }
                Err(e) => return Err(map_sdk_err(e)),
            };
            let data = out.body.collect().await.map_err(|e| {
                CoreError::provider(Service::ObjectStorage, format!("read body: {e}"))
            })?;
            Ok::<_, CoreError>(Some(data.into_bytes().to_vec()))
        };
        self.rt.block_on(fut)
    }
}

/// True when `code` is one of the "bucket already exists" error codes.
pub fn is_bucket_exists_code(code: Option<&str>) -> bool {
    code.is_some_and(|c| BUCKET_EXISTS_CODES.contains(&c))
}

/// Location constraint to send with a create request, if any.
fn location_constraint_for(region: &str) -> Option<BucketLocationConstraint> {
    if region.is_empty() || region == DEFAULT_REGION {
        None
    } else {
        Some(BucketLocationConstraint::from(region))
    }
}

fn map_sdk_err<E>(e: E) -> CoreError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
{
    if e.code() == Some("NoSuchBucket") {
        return CoreError::NotFound;
    }
    CoreError::provider(Service::ObjectStorage, format!("{}", DisplayErrorContext(&e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn already_exists_codes_are_recognised() {
        assert!(is_bucket_exists_code(Some("BucketAlreadyOwnedByYou")));
        assert!(is_bucket_exists_code(Some("BucketAlreadyExists")));
        assert!(!is_bucket_exists_code(Some("AccessDenied")));
        assert!(!is_bucket_exists_code(Some("InvalidBucketName")));
        assert!(!is_bucket_exists_code(None));
    }

    #[test]
    fn no_constraint_for_default_region() {
        assert!(location_constraint_for("us-east-1").is_none());
        assert!(location_constraint_for("").is_none());
    }

    #[test]
    fn constraint_for_other_regions() {
        let c = location_constraint_for("eu-west-1").expect("constraint");
        assert_eq!(c.as_str(), "eu-west-1");
    }

    #[test]
    fn custom_endpoint_forces_path_style() {
        let local = S3Settings::new(Some("http://localstack:4566".into()), "us-east-1", "test", "test");
        assert!(local.force_path_style());
        let aws = S3Settings::new(None, "us-east-1", "k", "s");
        assert!(!aws.force_path_style());
    }
}
