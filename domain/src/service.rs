use crate::provision::{ensure, ProvisionPolicy, Provisioned};
use crate::{
    BlobStore, CoreError, ObjectStore, Publisher, ResourceName, Service, Subscriber,
    BLOB_PAYLOAD, DEMO_OBJECT_KEY, MESSAGE_PAYLOAD, OBJECT_PAYLOAD,
};

/// Resource names and provisioning policies shared by the three demos.
///
/// Default policies mirror the historical behavior: object storage only
/// tolerates "already exists", blob storage and messaging swallow every
/// provisioning error.
#[derive(Clone, Debug)]
pub struct DemoSettings {
    pub bucket: ResourceName,
    pub container: ResourceName,
    pub topic: ResourceName,
    pub subscription: ResourceName,
    pub object_policy: ProvisionPolicy,
    pub blob_policy: ProvisionPolicy,
    pub messaging_policy: ProvisionPolicy,
}

impl DemoSettings {
    pub fn new(
        bucket: ResourceName,
        container: ResourceName,
        topic: ResourceName,
        subscription: ResourceName,
    ) -> Self {
        Self {
            bucket,
            container,
            topic,
            subscription,
            object_policy: ProvisionPolicy::Strict,
            blob_policy: ProvisionPolicy::Lenient,
            messaging_policy: ProvisionPolicy::Lenient,
        }
    }

    /// Use the strict policy for every demo.
    pub fn strict(mut self) -> Self {
        self.object_policy = ProvisionPolicy::Strict;
        self.blob_policy = ProvisionPolicy::Strict;
        self.messaging_policy = ProvisionPolicy::Strict;
        self
    }
}

/// What the messaging demo observed on its single pull.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PullOutcome {
    /// A message was received (decoded payload) and acknowledged.
    Received(String),
    Empty,
}

/// Outcome of one demo routine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoReport {
    pub service: Service,
    pub provisioned: Vec<(ResourceName, Provisioned)>,
    pub pull: Option<PullOutcome>,
}

impl DemoReport {
    /// The line printed when the demo finishes.
    pub fn status_line(&self) -> String {
        match &self.pull {
            Some(PullOutcome::Received(text)) => format!("[{}] received: {}", self.service.tag(), text),
            Some(PullOutcome::Empty) => format!("[{}] no messages", self.service.tag()),
            None => format!("[{}] OK", self.service.tag()),
        }
    }

    /// Provisioning errors that the policy swallowed.
    pub fn suppressed(&self) -> impl Iterator<Item = (&ResourceName, &CoreError)> {
        self.provisioned.iter().filter_map(|(name, p)| match p {
            Provisioned::Suppressed(e) => Some((name, e)),
            _ => None,
        })
    }
}

/// Ensure a bucket, then write the demo object.
pub struct ObjectStorageDemo<S: ObjectStore> {
    store: S,
    bucket: ResourceName,
    policy: ProvisionPolicy,
}

impl<S: ObjectStore> ObjectStorageDemo<S> {
    pub fn new(store: S, bucket: ResourceName, policy: ProvisionPolicy) -> Self {
        Self {
            store,
            bucket,
            policy,
        }
    }

    pub fn ensure_bucket(&self) -> Result<Provisioned, CoreError> {
        ensure(self.policy, || self.store.create_bucket(&self.bucket))
    }

    pub fn run(&self) -> Result<DemoReport, CoreError> {
        let provisioned = self.ensure_bucket()?;
        self.store
            .put_object(&self.bucket, DEMO_OBJECT_KEY, OBJECT_PAYLOAD)
            .map_err(|e| carry_suppressed(e, [&provisioned]))?;
        Ok(DemoReport {
            service: Service::ObjectStorage,
            provisioned: vec![(self.bucket.clone(), provisioned)],
            pull: None,
        })
    }
}

/// Ensure a container, then upload the demo blob with overwrite.
pub struct BlobStorageDemo<S: BlobStore> {
    store: S,
    container: ResourceName,
    policy: ProvisionPolicy,
}

impl<S: BlobStore> BlobStorageDemo<S> {
    pub fn new(store: S, container: ResourceName, policy: ProvisionPolicy) -> Self {
        Self {
            store,
            container,
            policy,
        }
    }

    pub fn ensure_container(&self) -> Result<Provisioned, CoreError> {
        ensure(self.policy, || self.store.create_container(&self.container))
    }

    pub fn run(&self) -> Result<DemoReport, CoreError> {
        let provisioned = self.ensure_container()?;
        self.store
            .upload_blob(&self.container, DEMO_OBJECT_KEY, BLOB_PAYLOAD, true)
            .map_err(|e| carry_suppressed(e, [&provisioned]))?;
        Ok(DemoReport {
            service: Service::BlobStorage,
            provisioned: vec![(self.container.clone(), provisioned)],
            pull: None,
        })
    }
}

/// Ensure topic and subscription, publish one message, pull at most one and
/// acknowledge it if present.
pub struct MessagingDemo<P: Publisher, S: Subscriber> {
    publisher: P,
    subscriber: S,
    topic: ResourceName,
    subscription: ResourceName,
    policy: ProvisionPolicy,
}

impl<P: Publisher, S: Subscriber> MessagingDemo<P, S> {
    pub fn new(
        publisher: P,
        subscriber: S,
        topic: ResourceName,
        subscription: ResourceName,
        policy: ProvisionPolicy,
    ) -> Self {
        Self {
            publisher,
            subscriber,
            topic,
            subscription,
            policy,
        }
    }

    pub fn ensure_topic(&self) -> Result<Provisioned, CoreError> {
        ensure(self.policy, || self.publisher.create_topic(&self.topic))
    }

    pub fn ensure_subscription(&self) -> Result<Provisioned, CoreError> {
        ensure(self.policy, || {
            self.subscriber
                .create_subscription(&self.subscription, &self.topic)
        })
    }

    /// Single pull of at most one message; acknowledges what it receives.
    pub fn pull_one(&self) -> Result<PullOutcome, CoreError> {
        let received = self.subscriber.pull(&self.subscription, 1)?;
        match received.into_iter().next() {
            Some(m) => {
                self.subscriber
                    .acknowledge(&self.subscription, std::slice::from_ref(&m.ack_id))?;
                Ok(PullOutcome::Received(m.text()))
            }
            None => Ok(PullOutcome::Empty),
        }
    }

    pub fn run(&self) -> Result<DemoReport, CoreError> {
        let topic = self.ensure_topic()?;
        // Subscribe before publishing so the message is routed to it
        let subscription = self.ensure_subscription()?;
        let pull = self
            .publisher
            .publish(&self.topic, MESSAGE_PAYLOAD)
            .and_then(|_| self.pull_one())
            .map_err(|e| carry_suppressed(e, [&topic, &subscription]))?;
        Ok(DemoReport {
            service: Service::Messaging,
            provisioned: vec![
                (self.topic.clone(), topic),
                (self.subscription.clone(), subscription),
            ],
            pull: Some(pull),
        })
    }
}

/// Attach the first swallowed provisioning error to a later data-plane
/// failure so it is not lost.
fn carry_suppressed<'a, I>(error: CoreError, outcomes: I) -> CoreError
where
    I: IntoIterator<Item = &'a Provisioned>,
{
    let suppressed = outcomes.into_iter().find_map(|p| match p {
        Provisioned::Suppressed(e) => Some(e.clone()),
        _ => None,
    });
    match suppressed {
        Some(s) => CoreError::Masked {
            error: Box::new(error),
            suppressed: Box::new(s),
        },
        None => error,
    }
}

/// Run the three demos in their fixed order, handing each report to
/// `on_report` as soon as it completes. Stops at the first fatal error.
pub fn run_all<O, B, P, S, F>(
    object_store: O,
    blob_store: B,
    publisher: P,
    subscriber: S,
    settings: &DemoSettings,
    mut on_report: F,
) -> Result<Vec<DemoReport>, CoreError>
where
    O: ObjectStore,
    B: BlobStore,
    P: Publisher,
    S: Subscriber,
    F: FnMut(&DemoReport),
{
    let mut reports = Vec::with_capacity(3);

    let object = ObjectStorageDemo::new(object_store, settings.bucket.clone(), settings.object_policy);
    let report = object.run()?;
    on_report(&report);
    reports.push(report);

    let blob = BlobStorageDemo::new(blob_store, settings.container.clone(), settings.blob_policy);
    let report = blob.run()?;
    on_report(&report);
    reports.push(report);

    let messaging = MessagingDemo::new(
        publisher,
        subscriber,
        settings.topic.clone(),
        settings.subscription.clone(),
        settings.messaging_policy,
    );
    let report = messaging.run()?;
    on_report(&report);
    reports.push(report);

    Ok(reports)
}
