//! Interfaces of the collaborators around the coordination core.
//!
//! Identifier allocation, diagnostic output and process launching belong to
//! the surrounding middleware. The coordinator only depends on the traits
//! below, and the crate ships the simple implementations it needs for tests
//! and for the demo binary.

use std::{
    ffi::OsStr,
    sync::atomic::{AtomicU64, Ordering},
};

use rand::{thread_rng, Rng};
use tracing::info;

use crate::common::{InstanceId, INVALID_INSTANCE_ID};

/// Source of instance (and type) identifiers.
///
/// Identifiers must be unique for the lifetime of the entity they name and
/// never equal to [`INVALID_INSTANCE_ID`].
pub trait IdAllocator: Send + Sync {
    fn allocate(&self) -> InstanceId;
}

#[derive(Debug)]
pub struct SequentialIdAllocator {
    next: AtomicU64,
}

impl SequentialIdAllocator {
    pub fn starting_at(first: InstanceId) -> Self {
        assert_ne!(first, INVALID_INSTANCE_ID);
        Self {
            next: AtomicU64::new(first),
        }
    }
}

impl Default for SequentialIdAllocator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdAllocator for SequentialIdAllocator {
    fn allocate(&self) -> InstanceId {
        self.next.fetch_add(1, Ordering::SeqCst)
    }
}

// collision is possible in theory, same as for client ids
#[derive(Debug, Default)]
pub struct RandomIdAllocator;

impl IdAllocator for RandomIdAllocator {
    fn allocate(&self) -> InstanceId {
        thread_rng().gen_range(1..=InstanceId::MAX)
    }
}

/// Where `print` requests end up. Must not fail the caller.
pub trait DiagnosticSink: Send + Sync {
    fn print(&self, caller: InstanceId, text: &str);
}

#[derive(Debug, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn print(&self, caller: InstanceId, text: &str) {
        info!(target: "syndic::print", caller, "{}", text);
    }
}

/// Starts a program as a detached child process.
pub trait Launch {
    fn launch(&self, program: &OsStr, args: &[&OsStr]) -> bool;
}
