//! Host-owned containers and the non-owning handles that point at them
//!
//! The host keeps the strong reference (`HostArray`, `HostObject`). Anything
//! that crosses into the script engine carries only a weak handle
//! (`ArrayRef`, `ObjectRef`), so disposal on the host side turns every later
//! access into a checked `BridgeError::Disposed` instead of a dangling read.

use crate::error::BridgeError;
use crate::value::{HostElement, HostKind, HostValue};
use std::any::Any;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

/// Type-erased, element-addressable host storage.
pub trait ArrayStorage: Send + Sync {
    /// Kind the value bridge must produce when script writes an element.
    fn element_kind(&self) -> HostKind;

    /// Rust type name of the elements.
    fn element_type(&self) -> &'static str;

    /// Current element count of the backing storage.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read element `index`, or `None` past the end.
    fn get(&self, index: usize) -> Option<HostValue>;

    /// Overwrite element `index` in place. Never grows the storage.
    fn set(&self, index: usize, value: HostValue) -> Result<(), BridgeError>;
}

struct ArrayCells<T> {
    items: RwLock<Vec<T>>,
}

impl<T> ArrayCells<T> {
    fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: HostElement> ArrayStorage for ArrayCells<T> {
    fn element_kind(&self) -> HostKind {
        T::KIND
    }

    fn element_type(&self) -> &'static str {
        std::any::type_name::<T>()
    }

    fn len(&self) -> usize {
        self.read().len()
    }

    fn get(&self, index: usize) -> Option<HostValue> {
        self.read().get(index).cloned().map(T::into_host)
    }

    fn set(&self, index: usize, value: HostValue) -> Result<(), BridgeError> {
        let found = value.type_name();
        let item = T::from_host(value).ok_or_else(|| BridgeError::mismatch(T::KIND, found))?;

        let mut items = self.write();
        let length = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(BridgeError::IndexOutOfRange { index, length })?;
        *slot = item;
        Ok(())
    }
}

/// Shared, host-owned array.
///
/// Clones share the same storage. When the last clone is dropped the array is
/// disposed and every `ArrayRef` pointing at it stops resolving.
pub struct HostArray<T> {
    cells: Arc<ArrayCells<T>>,
}

impl<T: HostElement> HostArray<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            cells: Arc::new(ArrayCells {
                items: RwLock::new(items),
            }),
        }
    }

    /// Non-owning handle suitable for crossing the boundary.
    pub fn handle(&self) -> ArrayRef {
        let erased: Arc<dyn ArrayStorage> = self.cells.clone();
        ArrayRef {
            storage: Arc::downgrade(&erased),
            element_type: std::any::type_name::<T>(),
        }
    }

    pub fn len(&self) -> usize {
        self.cells.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.cells.read().get(index).cloned()
    }

    pub fn set(&self, index: usize, value: T) -> Result<(), BridgeError> {
        let mut items = self.cells.write();
        let length = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(BridgeError::IndexOutOfRange { index, length })?;
        *slot = value;
        Ok(())
    }

    pub fn to_vec(&self) -> Vec<T> {
        self.cells.read().clone()
    }

    /// Shared access to the backing vector.
    pub fn read(&self) -> RwLockReadGuard<'_, Vec<T>> {
        self.cells.read()
    }

    /// Exclusive access to the backing vector.
    ///
    /// The host may resize through this guard; proxies already handed to
    /// script keep the length they captured.
    pub fn write(&self) -> RwLockWriteGuard<'_, Vec<T>> {
        self.cells.write()
    }
}

impl<T> Clone for HostArray<T> {
    fn clone(&self) -> Self {
        Self {
            cells: Arc::clone(&self.cells),
        }
    }
}

impl<T: HostElement> From<Vec<T>> for HostArray<T> {
    fn from(items: Vec<T>) -> Self {
        Self::new(items)
    }
}

impl<T: HostElement> FromIterator<T> for HostArray<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<T: HostElement + fmt::Debug> fmt::Debug for HostArray<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("HostArray").field(&*self.read()).finish()
    }
}

/// Weak handle to a host array.
#[derive(Clone)]
pub struct ArrayRef {
    storage: Weak<dyn ArrayStorage>,
    element_type: &'static str,
}

impl ArrayRef {
    /// Resolve the handle, failing if the host has disposed the array.
    pub fn upgrade(&self) -> Result<Arc<dyn ArrayStorage>, BridgeError> {
        self.storage.upgrade().ok_or_else(|| BridgeError::Disposed {
            what: format!("array of {}", self.element_type),
        })
    }

    pub fn is_alive(&self) -> bool {
        self.storage.strong_count() > 0
    }

    pub fn element_type(&self) -> &'static str {
        self.element_type
    }

    /// Identity of the referenced host array.
    ///
    /// Stable for as long as any handle exists: the weak count pins the
    /// allocation even after disposal.
    pub fn id(&self) -> usize {
        self.storage.as_ptr() as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ArrayRef) -> bool {
        self.id() == other.id()
    }
}

impl PartialEq for ArrayRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayRef")
            .field("element_type", &self.element_type)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl fmt::Display for ArrayRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.storage.upgrade() {
            Some(storage) => write!(f, "[array {}; {}]", self.element_type, storage.len()),
            None => write!(f, "[disposed array {}]", self.element_type),
        }
    }
}

/// Shared, host-owned object.
pub struct HostObject<T> {
    inner: Arc<T>,
}

impl<T: Any + Send + Sync> HostObject<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(value),
        }
    }

    pub fn handle(&self) -> ObjectRef {
        let erased: Arc<dyn Any + Send + Sync> = self.inner.clone();
        ObjectRef {
            target: Arc::downgrade(&erased),
            type_name: std::any::type_name::<T>(),
        }
    }
}

impl<T> Clone for HostObject<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for HostObject<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

/// Weak handle to a host object.
#[derive(Clone)]
pub struct ObjectRef {
    target: Weak<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ObjectRef {
    /// Resolve to the concrete host type.
    pub fn upgrade<T: Any + Send + Sync>(&self) -> Result<Arc<T>, BridgeError> {
        let strong = self.target.upgrade().ok_or_else(|| BridgeError::Disposed {
            what: format!("object {}", self.type_name),
        })?;
        strong
            .downcast::<T>()
            .map_err(|_| BridgeError::mismatch(HostKind::Object, self.type_name))
    }

    pub fn is_alive(&self) -> bool {
        self.target.strong_count() > 0
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    pub fn id(&self) -> usize {
        self.target.as_ptr() as *const () as usize
    }

    pub fn ptr_eq(&self, other: &ObjectRef) -> bool {
        self.id() == other.id()
    }
}

impl PartialEq for ObjectRef {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectRef")
            .field("type_name", &self.type_name)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_alive() {
            write!(f, "[object {}]", self.type_name)
        } else {
            write!(f, "[disposed object {}]", self.type_name)
        }
    }
}
