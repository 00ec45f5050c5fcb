//! Idempotent provisioning: create a named resource before first use and
//! decide which creation failures count as "already provisioned".

use crate::CoreError;

/// How provisioning errors are treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProvisionPolicy {
    /// Only `CoreError::AlreadyExists` is success; anything else propagates.
    Strict,
    /// Every creation error is swallowed and the resource is assumed to exist.
    Lenient,
}

/// Result of a provisioning attempt that did not fail the demo.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Provisioned {
    Created,
    AlreadyExisted,
    /// Creation failed for another reason and the policy swallowed it.
    Suppressed(CoreError),
}

impl Provisioned {
    /// True when the outcome hides an error other than "already exists".
    pub fn is_suppressed(&self) -> bool {
        matches!(self, Provisioned::Suppressed(_))
    }
}

impl ProvisionPolicy {
    /// Apply the policy to the result of a create call.
    pub fn resolve(self, created: Result<(), CoreError>) -> Result<Provisioned, CoreError> {
        match created {
            Ok(()) => Ok(Provisioned::Created),
            Err(CoreError::AlreadyExists) => Ok(Provisioned::AlreadyExisted),
            Err(e) => match self {
                ProvisionPolicy::Strict => Err(e),
                ProvisionPolicy::Lenient => Ok(Provisioned::Suppressed(e)),
            },
        }
    }
}

/// Run `create` and resolve its outcome under `policy`.
pub fn ensure<F>(policy: ProvisionPolicy, create: F) -> Result<Provisioned, CoreError>
where
    F: FnOnce() -> Result<(), CoreError>,
{
    policy.resolve(create())
}
