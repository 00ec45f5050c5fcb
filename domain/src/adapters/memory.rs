use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::{
    AckId, BlobStore, CoreError, ObjectStore, Publisher, ReceivedMessage, ResourceName, Service,
    Subscriber,
};

fn lock<T>(m: &Mutex<T>, service: Service) -> Result<MutexGuard<'_, T>, CoreError> {
    m.lock()
        .map_err(|_| CoreError::provider(service, "mutex poisoned"))
}

/// One-shot error returned by the next create call, for failure tests.
struct Injected {
    next_create: Mutex<Option<CoreError>>,
}

impl Injected {
    fn new() -> Self {
        Self {
            next_create: Mutex::new(None),
        }
    }

    // The slot is a plain Option, so a poisoned lock still holds valid state
    fn slot(&self) -> MutexGuard<'_, Option<CoreError>> {
        self.next_create
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn set(&self, err: CoreError) {
        *self.slot() = Some(err);
    }

    fn take(&self) -> Result<(), CoreError> {
        match self.slot().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

type Buckets = BTreeMap<String, BTreeMap<String, Vec<u8>>>;

/// In-memory bucket/object store.
pub struct InMemoryObjectStore {
    buckets: Mutex<Buckets>,
    injected: Injected,
}

impl InMemoryObjectStore {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new(BTreeMap::new()),
            injected: Injected::new(),
        }
    }

    /// Make the next `create_bucket` fail with `err`.
    pub fn fail_create_with(&self, err: CoreError) {
        self.injected.set(err);
    }

    /// Number of objects across all buckets.
    pub fn object_count(&self) -> usize {
        self.buckets
            .lock()
            .map(|b| b.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }
}

impl Default for InMemoryObjectStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn create_bucket(&self, bucket: &ResourceName) -> Result<(), CoreError> {
        self.injected.take()?;
        let mut buckets = lock(&self.buckets, Service::ObjectStorage)?;
        if buckets.contains_key(bucket.as_str()) {
            return Err(CoreError::AlreadyExists);
        }
        buckets.insert(bucket.as_str().to_string(), BTreeMap::new());
        Ok(())
    }

    fn put_object(&self, bucket: &ResourceName, key: &str, body: &[u8]) -> Result<(), CoreError> {
        let mut buckets = lock(&self.buckets, Service::ObjectStorage)?;
        let objects = buckets.get_mut(bucket.as_str()).ok_or(CoreError::NotFound)?;
        objects.insert(key.to_string(), body.to_vec());
        Ok(())
    }

    fn get_object(&self, bucket: &ResourceName, key: &str) -> Result<Option<Vec<u8>>, CoreError> {
        let buckets = lock(&self.buckets, Service::ObjectStorage)?;
        let objects = buckets.get(bucket.as_str()).ok_or(CoreError::NotFound)?;
        Ok(objects.get(key).cloned())
    }
}

/// In-memory container/blob store.
pub struct InMemoryBlobStore {
    containers: Mutex<Buckets>,
    injected: Injected,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            containers: Mutex::new(BTreeMap::new()),
            injected: Injected::new(),
        }
    }

    /// Make the next `create_container` fail with `err`.
    pub fn fail_create_with(&self, err: CoreError) {
        self.injected.set(err);
    }

    pub fn blob_count(&self) -> usize {
        self.containers
            .lock()
            .map(|c| c.values().map(BTreeMap::len).sum())
            .unwrap_or(0)
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    fn create_container(&self, container: &ResourceName) -> Result<(), CoreError> {
        self.injected.take()?;
        let mut containers = lock(&self.containers, Service::BlobStorage)?;
        if containers.contains_key(container.as_str()) {
            return Err(CoreError::AlreadyExists);
        }
        containers.insert(container.as_str().to_string(), BTreeMap::new());
        Ok(())
    }

    fn upload_blob(
        &self,
        container: &ResourceName,
        name: &str,
        body: &[u8],
        overwrite: bool,
    ) -> Result<(), CoreError> {
        let mut containers = lock(&self.containers, Service::BlobStorage)?;
        let blobs = containers
            .get_mut(container.as_str())
            .ok_or(CoreError::NotFound)?;
        if !overwrite && blobs.contains_key(name) {
            return Err(CoreError::AlreadyExists);
        }
        blobs.insert(name.to_string(), body.to_vec());
        Ok(())
    }

    fn download_blob(
        &self,
        container: &ResourceName,
        name: &str,
    ) -> Result<Option<Vec<u8>>, CoreError> {
        let containers = lock(&self.containers, Service::BlobStorage)?;
        let blobs = containers.get(container.as_str()).ok_or(CoreError::NotFound)?;
        Ok(blobs.get(name).cloned())
    }
}

struct Pending {
    message_id: String,
    data: Vec<u8>,
    // Current delivery handle; replaced on every redelivery
    ack_id: Option<String>,
}

struct SubscriptionState {
    topic: String,
    backlog: Vec<Pending>,
}

#[derive(Default)]
struct BrokerState {
    topics: BTreeSet<String>,
    subscriptions: BTreeMap<String, SubscriptionState>,
    next_message_id: u64,
    next_ack_id: u64,
    acknowledged: usize,
}

/// In-memory publish/subscribe broker.
///
/// A message reaches the subscriptions attached to its topic at publish time.
/// Unacknowledged messages are handed out again on the next pull under a new
/// ack id; acknowledging removes them for good.
pub struct InMemoryBroker {
    state: Mutex<BrokerState>,
    injected: Injected,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(BrokerState::default()),
            injected: Injected::new(),
        }
    }

    /// Make the next `create_topic` or `create_subscription` fail with `err`.
    pub fn fail_create_with(&self, err: CoreError) {
        self.injected.set(err);
    }

    /// Total messages acknowledged across all subscriptions.
    pub fn acknowledged_count(&self) -> usize {
        self.state.lock().map(|s| s.acknowledged).unwrap_or(0)
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl Publisher for InMemoryBroker {
    fn create_topic(&self, topic: &ResourceName) -> Result<(), CoreError> {
        self.injected.take()?;
        let mut state = lock(&self.state, Service::Messaging)?;
        if !state.topics.insert(topic.as_str().to_string()) {
            return Err(CoreError::AlreadyExists);
        }
        Ok(())
    }

    fn publish(&self, topic: &ResourceName, data: &[u8]) -> Result<String, CoreError> {
        let mut state = lock(&self.state, Service::Messaging)?;
        if !state.topics.contains(topic.as_str()) {
            return Err(CoreError::NotFound);
        }
        state.next_message_id += 1;
        let message_id = state.next_message_id.to_string();
        for sub in state
            .subscriptions
            .values_mut()
            .filter(|s| s.topic == topic.as_str())
        {
            sub.backlog.push(Pending {
                message_id: message_id.clone(),
                data: data.to_vec(),
                ack_id: None,
            });
        }
        Ok(message_id)
    }
}

impl Subscriber for InMemoryBroker {
    fn create_subscription(
        &self,
        subscription: &ResourceName,
        topic: &ResourceName,
    ) -> Result<(), CoreError> {
        self.injected.take()?;
        let mut state = lock(&self.state, Service::Messaging)?;
        if !state.topics.contains(topic.as_str()) {
            return Err(CoreError::NotFound);
        }
        if state.subscriptions.contains_key(subscription.as_str()) {
            return Err(CoreError::AlreadyExists);
        }
        state.subscriptions.insert(
            subscription.as_str().to_string(),
            SubscriptionState {
                topic: topic.as_str().to_string(),
                backlog: Vec::new(),
            },
        );
        Ok(())
    }

    fn pull(
        &self,
        subscription: &ResourceName,
        max_messages: usize,
    ) -> Result<Vec<ReceivedMessage>, CoreError> {
        let mut guard = lock(&self.state, Service::Messaging)?;
        let state = &mut *guard;
        let sub = state
            .subscriptions
            .get_mut(subscription.as_str())
            .ok_or(CoreError::NotFound)?;
        let mut out = Vec::new();
        for pending in sub.backlog.iter_mut().take(max_messages) {
            state.next_ack_id += 1;
            let ack = format!("ack-{}", state.next_ack_id);
            pending.ack_id = Some(ack.clone());
            out.push(ReceivedMessage {
                message_id: pending.message_id.clone(),
                data: pending.data.clone(),
                ack_id: AckId::new(ack),
            });
        }
        Ok(out)
    }

    fn acknowledge(&self, subscription: &ResourceName, ack_ids: &[AckId]) -> Result<(), CoreError> {
        let mut guard = lock(&self.state, Service::Messaging)?;
        let state = &mut *guard;
        let sub = state
            .subscriptions
            .get_mut(subscription.as_str())
            .ok_or(CoreError::NotFound)?;
        let before = sub.backlog.len();
        // Stale or unknown ack ids are ignored
        sub.backlog.retain(|p| {
            !p.ack_id
                .as_deref()
                .is_some_and(|id| ack_ids.iter().any(|a| a.as_str() == id))
        });
        state.acknowledged += before - sub.backlog.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> ResourceName {
        ResourceName::new(s).unwrap()
    }

    #[test]
    fn injection_survives_poisoned_lock() {
        let injected = Injected::new();
        let _ = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _guard = injected.next_create.lock().unwrap();
            panic!("poison the slot");
        }));
        assert!(injected.next_create.is_poisoned());

        injected.set(CoreError::NotFound);
        assert_eq!(injected.take(), Err(CoreError::NotFound));
        assert_eq!(injected.take(), Ok(()));
    }

    #[test]
    fn create_bucket_twice_reports_already_exists() {
        let store = InMemoryObjectStore::new();
        store.create_bucket(&name("b")).unwrap();
        let err = store.create_bucket(&name("b")).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
    }

    #[test]
    fn put_into_missing_bucket_fails() {
        let store = InMemoryObjectStore::new();
        let err = store.put_object(&name("nope"), "k", b"v").unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn injected_error_is_one_shot() {
        let store = InMemoryObjectStore::new();
        store.fail_create_with(CoreError::provider(Service::ObjectStorage, "boom"));
        assert!(store.create_bucket(&name("b")).is_err());
        assert!(store.create_bucket(&name("b")).is_ok());
    }

    #[test]
    fn upload_without_overwrite_rejects_existing_blob() {
        let store = InMemoryBlobStore::new();
        store.create_container(&name("c")).unwrap();
        store.upload_blob(&name("c"), "x", b"1", false).unwrap();
        let err = store.upload_blob(&name("c"), "x", b"2", false).unwrap_err();
        assert!(matches!(err, CoreError::AlreadyExists));
        store.upload_blob(&name("c"), "x", b"2", true).unwrap();
        assert_eq!(
            store.download_blob(&name("c"), "x").unwrap().as_deref(),
            Some(&b"2"[..])
        );
    }

    #[test]
    fn messages_published_before_subscribing_are_not_delivered() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&name("t")).unwrap();
        broker.publish(&name("t"), b"early").unwrap();
        broker.create_subscription(&name("s"), &name("t")).unwrap();
        assert!(broker.pull(&name("s"), 1).unwrap().is_empty());
    }

    #[test]
    fn unacked_message_is_redelivered_with_new_ack_id() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&name("t")).unwrap();
        broker.create_subscription(&name("s"), &name("t")).unwrap();
        broker.publish(&name("t"), b"hello").unwrap();

        let first = broker.pull(&name("s"), 1).unwrap();
        let second = broker.pull(&name("s"), 1).unwrap();
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 1);
        assert_eq!(first[0].message_id, second[0].message_id);
        assert_ne!(first[0].ack_id, second[0].ack_id);

        // Stale handle does nothing
        broker.acknowledge(&name("s"), &[first[0].ack_id.clone()]).unwrap();
        assert_eq!(broker.acknowledged_count(), 0);

        broker.acknowledge(&name("s"), &[second[0].ack_id.clone()]).unwrap();
        assert_eq!(broker.acknowledged_count(), 1);
        assert!(broker.pull(&name("s"), 1).unwrap().is_empty());
    }

    #[test]
    fn pull_honors_max_messages() {
        let broker = InMemoryBroker::new();
        broker.create_topic(&name("t")).unwrap();
        broker.create_subscription(&name("s"), &name("t")).unwrap();
        for i in 0..3 {
            broker.publish(&name("t"), format!("m{}", i).as_bytes()).unwrap();
        }
        let got = broker.pull(&name("s"), 2).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].text(), "m0");
    }

    #[test]
    fn subscription_requires_topic() {
        let broker = InMemoryBroker::new();
        let err = broker
            .create_subscription(&name("s"), &name("missing"))
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }
}
