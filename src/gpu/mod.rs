//! GPU abstraction layer.
//!
//! - `states` caches pipeline state so redundant pass commands are never recorded
//! - `units` hands out texture units per shader use
//! - `reflect` and `uniform` turn naga IR into name-keyed binding tables
//! - `shader` is the compiled program with typed uniform/attribute binding
//! - `cache` memoizes device buffers and textures by scene index
//! - `frame` records draws and replays them into render passes

pub mod cache;
pub mod frame;
pub mod reflect;
pub mod shader;
pub mod states;
pub mod uniform;
pub mod units;

use std::{
    ops::Deref,
    sync::atomic::{AtomicU64, Ordering},
};

/// Identity of a device object, used as cache key and for state comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

/// A wgpu handle paired with a stable [`ResourceId`].
///
/// wgpu handles are reference counted, so cloning a `Tracked` is cheap and keeps the id.
#[derive(Clone, Debug)]
pub struct Tracked<T> {
    id: ResourceId,
    handle: T,
}

impl<T> Tracked<T> {
    pub fn new(handle: T) -> Self {
        Self {
            id: ResourceId::next(),
            handle,
        }
    }

    pub fn id(&self) -> ResourceId {
        self.id
    }

    pub fn handle(&self) -> &T {
        &self.handle
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T> PartialEq for Tracked<T> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
