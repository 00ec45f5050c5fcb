//! Blocking bridge shared by the SDK adapters.
//!
//! The domain ports are synchronous while the provider SDKs are async. Each
//! adapter owns a `BlockingRuntime` and drives its futures through it:
//! - Standalone (no runtime running): a small multi-thread runtime is created
//!   and owned by the bridge.
//! - Inside a multi-thread Tokio runtime: the current handle is reused via
//!   `block_in_place`.

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

/// Runs async SDK calls to completion from synchronous code.
#[derive(Clone, Debug)]
pub struct BlockingRuntime {
    // None when reusing the runtime we were constructed in
    rt: Option<Arc<Runtime>>,
}

impl BlockingRuntime {
    /// Reuse the current runtime if there is one, otherwise create our own.
    pub fn new() -> std::io::Result<Self> {
        if Handle::try_current().is_ok() {
            debug!("runtime-bridge: reusing current tokio runtime");
            Ok(Self { rt: None })
        } else {
            let rt = Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()?;
            Ok(Self {
                rt: Some(Arc::new(rt)),
            })
        }
    }

    /// Whether this bridge owns its runtime.
    pub fn is_owned(&self) -> bool {
        self.rt.is_some()
    }

    /// Run a future to completion.
    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        match &self.rt {
            Some(rt) => rt.block_on(fut),
            None => tokio::task::block_in_place(|| Handle::current().block_on(fut)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standalone_bridge_owns_runtime() {
        let bridge = BlockingRuntime::new().expect("runtime");
        assert!(bridge.is_owned());
        let v = bridge.block_on(async { 40 + 2 });
        assert_eq!(v, 42);
    }

    #[test]
    fn clones_share_the_runtime() {
        let bridge = BlockingRuntime::new().expect("runtime");
        let other = bridge.clone();
        assert_eq!(other.block_on(async { "ok" }), "ok");
        assert_eq!(bridge.block_on(async { 1 }), 1);
    }

    #[test]
    fn reuses_current_multi_thread_runtime() {
        let rt = Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .expect("outer runtime");
        let bridge = rt.block_on(async { BlockingRuntime::new().expect("bridge") });
        assert!(!bridge.is_owned());
    }
}
