//! Domain library for the emulator demo runner.
//!
//! This crate is dependency-free (inherits workspace metadata only) and holds
//! the resource types, ports (traits), provisioning policy, and error
//! definitions. Keep SDK clients and IO concerns out of this crate.

use std::error::Error;
use std::fmt::{Display, Formatter};

/// Key used for both the demo object and the demo blob.
pub const DEMO_OBJECT_KEY: &str = "from-app.txt";

/// Payload written to object storage.
pub const OBJECT_PAYLOAD: &[u8] = b"hi from app -> S3";
/// Payload uploaded to blob storage.
pub const BLOB_PAYLOAD: &[u8] = b"hi from app -> Azurite";
/// Payload published to the messaging topic.
pub const MESSAGE_PAYLOAD: &[u8] = b"hi from app -> PubSub";

/// Name of a provider-side resource (bucket, container, topic, subscription).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceName(String);

impl ResourceName {
    pub fn new<S: Into<String>>(s: S) -> Result<Self, CoreError> {
        let val = s.into();
        // Presence is the only requirement; providers enforce their own rules
        if val.trim().is_empty() {
            return Err(CoreError::InvalidName("empty".into()));
        }
        Ok(Self(val))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ResourceName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque delivery handle returned with a pulled message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AckId(String);

impl AckId {
    pub fn new<S: Into<String>>(s: S) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A message returned by a pull, together with its ack handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub data: Vec<u8>,
    pub ack_id: AckId,
}

impl ReceivedMessage {
    /// Payload decoded as UTF-8, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// The three emulated services, used to tag provider errors.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Service {
    ObjectStorage,
    BlobStorage,
    Messaging,
}

impl Service {
    pub fn as_str(&self) -> &'static str {
        match self {
            Service::ObjectStorage => "object-storage",
            Service::BlobStorage => "blob-storage",
            Service::Messaging => "messaging",
        }
    }

    /// Prefix used on the per-demo status lines.
    pub fn tag(&self) -> &'static str {
        match self {
            Service::ObjectStorage => "AWS",
            Service::BlobStorage => "AZURE",
            Service::Messaging => "GCP",
        }
    }
}

/// Object storage port (S3-style buckets).
pub trait ObjectStore: Send + Sync {
    /// Create a bucket. Must return `CoreError::AlreadyExists` when the
    /// provider reports the bucket as already existing or already owned.
    fn create_bucket(&self, bucket: &ResourceName) -> Result<(), CoreError>;
    /// Unconditionally write (overwrite) an object.
    fn put_object(&self, bucket: &ResourceName, key: &str, body: &[u8]) -> Result<(), CoreError>;
    /// Read an object back; `None` when it does not exist.
    fn get_object(&self, bucket: &ResourceName, key: &str) -> Result<Option<Vec<u8>>, CoreError>;
}

/// Blob storage port (Azure-style containers).
pub trait BlobStore: Send + Sync {
    fn create_container(&self, container: &ResourceName) -> Result<(), CoreError>;
    /// Upload a block blob. With `overwrite = false` an existing blob yields
    /// `CoreError::AlreadyExists`.
    fn upload_blob(
        &self,
        container: &ResourceName,
        name: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<(), CoreError>;
    fn download_blob(&self, container: &ResourceName, name: &str)
        -> Result<Option<Vec<u8>>, CoreError>;
}

/// Publishing side of the messaging port.
pub trait Publisher: Send + Sync {
    fn create_topic(&self, topic: &ResourceName) -> Result<(), CoreError>;
    /// Publish and wait until the provider has accepted the message.
    /// Returns the provider-assigned message id.
    fn publish(&self, topic: &ResourceName, data: &[u8]) -> Result<String, CoreError>;
}

/// Subscribing side of the messaging port.
pub trait Subscriber: Send + Sync {
    fn create_subscription(
        &self,
        subscription: &ResourceName,
        topic: &ResourceName,
    ) -> Result<(), CoreError>;
    /// A single bounded pull; an empty vector is a normal outcome.
    fn pull(
        &self,
        subscription: &ResourceName,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, CoreError>;
    fn acknowledge(&self, subscription: &ResourceName, ack_ids: &[AckId])
        -> Result<(), CoreError>;
}

impl<T: ObjectStore + ?Sized> ObjectStore for &T {
    fn create_bucket(&self, bucket: &ResourceName) -> Result<(), CoreError> {
        (**self).create_bucket(bucket)
    }
    fn put_object(&self, bucket: &ResourceName, key: &str, body: &[u8]) -> Result<(), CoreError> {
        (**self).put_object(bucket, key, body)
    }
    fn get_object(&self, bucket: &ResourceName, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        (**self).get_object(bucket, key)
    }
}

impl<T: BlobStore + ?Sized> BlobStore for &T {
    fn create_container(&self, container: &ResourceName) -> Result<(), CoreError> {
        (**self).create_container(container)
    }
    fn upload_blob(
        &self,
        container: &ResourceName,
        name: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<(), CoreError> {
        (**self).upload_blob(container, name, body, overwrite)
    }
    fn download_blob(
        &self,
        container: &ResourceName,
        name: &str,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        (**self).download_blob(container, name)
    }
}

impl<T: Publisher + ?Sized> Publisher for &T {
    fn create_topic(&self, topic: &ResourceName) -> Result<(), CoreError> {
        (**self).create_topic(topic)
    }
    fn publish(&self, topic: &ResourceName, data: &[u8]) -> Result<String, CoreError> {
        (**self).publish(topic, data)
    }
}

impl<T: Subscriber + ?Sized> Subscriber for &T {
    fn create_subscription(
        &self,
        subscription: &ResourceName,
        topic: &ResourceName,
    ) -> Result<(), CoreError> {
        (**self).create_subscription(subscription, topic)
    }
    fn pull(
        &self,
        subscription: &ResourceName,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, CoreError> {
        (**self).pull(subscription, max_messages)
    }
    fn acknowledge(&self, subscription: &ResourceName, ack_ids: &[AckId])
        -> Result<(), CoreError> {
        (**self).acknowledge(subscription, ack_ids)
    }
}

/// Core domain errors (no external error crates to keep deps at zero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    InvalidName(String),
    AlreadyExists,
    NotFound,
    Provider { service: Service, message: String },
    /// A data-plane failure that followed a provisioning error the lenient
    /// policy swallowed; `suppressed` is usually the real cause.
    Masked {
        error: Box<CoreError>,
        suppressed: Box<CoreError>,
    },
}

impl CoreError {
    pub fn provider<S: Into<String>>(service: Service, message: S) -> Self {
        CoreError::Provider {
            service,
            message: message.into(),
        }
    }

    /// The swallowed provisioning error behind this failure, if any.
    pub fn suppressed(&self) -> Option<&CoreError> {
        match self {
            CoreError::Masked { suppressed, .. } => Some(suppressed.as_ref()),
            _ => None,
        }
    }
}

impl Display for CoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::InvalidName(msg) => write!(f, "invalid resource name: {}", msg),
            CoreError::AlreadyExists => write!(f, "resource already exists"),
            CoreError::NotFound => write!(f, "not found"),
            CoreError::Provider { service, message } => {
                write!(f, "{} error: {}", service.as_str(), message)
            }
            CoreError::Masked { error, suppressed } => {
                write!(f, "{} (after suppressed provisioning error: {})", error, suppressed)
            }
        }
    }
}

impl Error for CoreError {}

/// Return a short about/version line for the binary to print.
pub fn about() -> String {
    let pkg = env!("CARGO_PKG_NAME");
    let ver = env!("CARGO_PKG_VERSION");
    format!("{} v{} (in-memory emulators)", pkg, ver)
}

pub mod adapters;
pub mod provision;
pub mod service;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resource_name_accepts_simple_values() {
        let n = ResourceName::new("demo-bucket").expect("valid name");
        assert_eq!(n.as_str(), "demo-bucket");
        assert_eq!(n.to_string(), "demo-bucket");
    }

    #[test]
    fn resource_name_rejects_blank() {
        assert!(matches!(ResourceName::new(""), Err(CoreError::InvalidName(_))));
        assert!(matches!(ResourceName::new("   "), Err(CoreError::InvalidName(_))));
    }

    #[test]
    fn received_message_text_is_lossy() {
        let m = ReceivedMessage {
            message_id: "1".into(),
            data: MESSAGE_PAYLOAD.to_vec(),
            ack_id: AckId::new("a"),
        };
        assert_eq!(m.text(), "hi from app -> PubSub");
    }

    #[test]
    fn provider_error_display_names_service() {
        let e = CoreError::provider(Service::BlobStorage, "boom");
        assert_eq!(e.to_string(), "blob-storage error: boom");
    }

    #[test]
    fn masked_error_keeps_suppressed_cause() {
        let e = CoreError::Masked {
            error: Box::new(CoreError::NotFound),
            suppressed: Box::new(CoreError::provider(Service::BlobStorage, "AuthorizationFailure")),
        };
        assert_eq!(
            e.to_string(),
            "not found (after suppressed provisioning error: blob-storage error: AuthorizationFailure)"
        );
        assert!(matches!(e.suppressed(), Some(CoreError::Provider { .. })));
        assert!(CoreError::NotFound.suppressed().is_none());
    }
}
