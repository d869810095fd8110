use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info};

use crate::element::{Element, Parent};
use crate::error::{Error, Result};
use crate::extensions::ExtensionTable;
use crate::heap::SegmentedHeap;
use crate::names::NameTable;
use crate::values::ValueTable;

/// The four heaps and side tables a loader hands to [`DataCenter::open`].
///
/// This is the crate's entire external-loader contract: an already
/// decompressed, fully-resident image plus its side tables. Producing
/// this structure from a compressed file is the loader's job, not this
/// crate's.
pub struct DataCenterTables {
    pub element_heap: SegmentedHeap,
    pub attribute_heap: SegmentedHeap,
    pub names: NameTable,
    pub values: ValueTable,
    pub extensions: ExtensionTable,
}

pub(crate) struct DataCenterInner {
    pub(crate) element_heap: SegmentedHeap,
    pub(crate) attribute_heap: SegmentedHeap,
    pub(crate) names: NameTable,
    pub(crate) values: ValueTable,
    pub(crate) extensions: ExtensionTable,
    pub(crate) lock: RwLock<()>,
    frozen: AtomicBool,
    closed: AtomicBool,
    root_cache: Mutex<Option<Element>>,
}

impl DataCenterInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Owner of a data center's heaps and tables.
///
/// Cloning a `DataCenter` is cheap (it is a handle around a shared,
/// reference-counted inner state); every clone observes the same
/// `frozen`/closed state.
#[derive(Clone)]
pub struct DataCenter {
    pub(crate) inner: Arc<DataCenterInner>,
}

impl DataCenter {
    /// Open a data center over loader-supplied tables (§6 of the format).
    pub fn open(tables: DataCenterTables) -> Self {
        info!(
            names = tables.names.len(),
            extensions = tables.extensions.len(),
            "opening data center"
        );
        DataCenter {
            inner: Arc::new(DataCenterInner {
                element_heap: tables.element_heap,
                attribute_heap: tables.attribute_heap,
                names: tables.names,
                values: tables.values,
                extensions: tables.extensions,
                lock: RwLock::new(()),
                frozen: AtomicBool::new(false),
                closed: AtomicBool::new(false),
                root_cache: Mutex::new(None),
            }),
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(Error::UseAfterDispose);
        }
        Ok(())
    }

    /// The root element, materialized (and cached) on first access.
    ///
    /// If the name table is empty, returns a synthetic dummy root named
    /// `"__root__"` with no attributes or children.
    pub fn root(&self) -> Result<Element> {
        self.check_open()?;
        let mut guard = self.inner.root_cache.lock();
        if let Some(root) = &*guard {
            return Ok(root.clone());
        }
        let root = Element::materialize(
            Arc::downgrade(&self.inner),
            crate::address::Address::ZERO,
            Parent::Root(Arc::downgrade(&self.inner)),
        )?;
        *guard = Some(root.clone());
        Ok(root)
    }

    /// Mark the data center frozen: `close` will subsequently fail.
    /// Reads continue to succeed.
    pub fn freeze(&self) {
        info!("freezing data center");
        self.inner.frozen.store(true, Ordering::Release);
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::Acquire)
    }

    /// Tear down the data center. Fails with `FrozenViolation` if frozen;
    /// operations on this `DataCenter` or any `Element` obtained from it
    /// fail with `UseAfterDispose` afterwards.
    pub fn close(&self) -> Result<()> {
        if self.inner.frozen.load(Ordering::Acquire) {
            return Err(Error::FrozenViolation);
        }
        let _write_guard = self.inner.lock.write();
        self.inner.closed.store(true, Ordering::Release);
        *self.inner.root_cache.lock() = None;
        debug!("data center closed");
        Ok(())
    }
}
