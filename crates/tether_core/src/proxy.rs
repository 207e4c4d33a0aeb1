//! Fixed-length array proxy over host storage
//!
//! The proxy captures the element count once, at creation, and advertises it
//! for its whole life. Reads past the end are soft (`Ok(None)`, which script
//! sees as `undefined`); writes past the end are hard errors. Structural
//! mutation is always rejected.

use crate::bridge::{from_engine_value, to_engine_value};
use crate::error::BridgeError;
use crate::host::ArrayRef;
use crate::value::BoundaryValue;

/// Script-facing view of a host array.
#[derive(Debug, Clone)]
pub struct ArrayProxy {
    array: ArrayRef,
    length: usize,
}

impl ArrayProxy {
    /// Open a proxy, capturing the current element count.
    pub fn new(array: ArrayRef) -> Result<Self, BridgeError> {
        let length = array.upgrade()?.len();
        tracing::trace!(element_type = array.element_type(), length, "array proxy opened");
        Ok(Self { array, length })
    }

    /// Open a proxy from a boundary value, which must be an array reference.
    pub fn from_value(value: &BoundaryValue) -> Result<Self, BridgeError> {
        match value {
            BoundaryValue::ArrayRef(array) => Self::new(array.clone()),
            other => Err(BridgeError::TypeMismatch {
                expected: crate::HostKind::Array,
                found: other.kind_name().to_string(),
            }),
        }
    }

    #[inline]
    pub fn length(&self) -> usize {
        self.length
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn array(&self) -> &ArrayRef {
        &self.array
    }

    /// Read element `index`.
    ///
    /// `Ok(None)` means "undefined": the index is past the captured length, or
    /// the host shrank its storage underneath the proxy.
    pub fn get(&self, index: usize) -> Result<Option<BoundaryValue>, BridgeError> {
        let storage = self.array.upgrade()?;
        if index >= self.length {
            return Ok(None);
        }
        storage.get(index).map(to_engine_value).transpose()
    }

    /// Write element `index` through to host storage.
    pub fn set(&self, index: usize, value: &BoundaryValue) -> Result<(), BridgeError> {
        let storage = self.array.upgrade()?;
        if index >= self.length {
            return Err(BridgeError::IndexOutOfRange {
                index,
                length: self.length,
            });
        }
        let host = from_engine_value(value, storage.element_kind())?;
        storage.set(index, host)
    }

    /// Visit every index in ascending order.
    ///
    /// Each element is read at the moment it is visited, so writes made by the
    /// callback to later indices are observed.
    pub fn for_each<F>(&self, mut callback: F) -> Result<(), BridgeError>
    where
        F: FnMut(usize, Option<BoundaryValue>),
    {
        self.try_for_each(|index, value| {
            callback(index, value);
            Ok::<_, BridgeError>(())
        })
    }

    /// Fallible [`for_each`](Self::for_each); stops at the first error.
    pub fn try_for_each<F, E>(&self, mut callback: F) -> Result<(), E>
    where
        F: FnMut(usize, Option<BoundaryValue>) -> Result<(), E>,
        E: From<BridgeError>,
    {
        for index in 0..self.length {
            let value = self.get(index)?;
            callback(index, value)?;
        }
        Ok(())
    }

    /// Lazy ascending iterator over the elements.
    pub fn iter(&self) -> ProxyIter<'_> {
        ProxyIter {
            proxy: self,
            next: 0,
        }
    }

    /// Appending would grow the fixed backing store.
    pub fn append(&self, _value: &BoundaryValue) -> Result<(), BridgeError> {
        self.reject("append")
    }

    /// Removing would shrink the fixed backing store.
    pub fn remove(&self, _index: usize) -> Result<BoundaryValue, BridgeError> {
        self.reject("remove")
    }

    /// Reject a named structural operation (`push`, `splice`, `length = n`, ...).
    pub fn reject<T>(&self, operation: &str) -> Result<T, BridgeError> {
        tracing::debug!(operation, length = self.length, "structural mutation rejected");
        Err(BridgeError::NotSupported {
            operation: operation.to_string(),
        })
    }
}

/// Iterator returned by [`ArrayProxy::iter`].
pub struct ProxyIter<'a> {
    proxy: &'a ArrayProxy,
    next: usize,
}

impl Iterator for ProxyIter<'_> {
    type Item = Result<Option<BoundaryValue>, BridgeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.proxy.length {
            return None;
        }
        let index = self.next;
        self.next += 1;
        Some(self.proxy.get(index))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.proxy.length - self.next;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for ProxyIter<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::HostArray;

    fn proxy_over(items: Vec<i32>) -> (HostArray<i32>, ArrayProxy) {
        let array = HostArray::new(items);
        let proxy = ArrayProxy::new(array.handle()).unwrap();
        (array, proxy)
    }

    #[test]
    fn length_is_captured_once() {
        let (array, proxy) = proxy_over(vec![3, 4, 6]);
        assert_eq!(proxy.length(), 3);

        array.write().push(10);
        assert_eq!(proxy.length(), 3);
        assert_eq!(proxy.get(3).unwrap(), None);
    }

    #[test]
    fn indexed_read() {
        let (_array, proxy) = proxy_over(vec![3, 4, 6]);
        assert_eq!(proxy.get(1).unwrap(), Some(BoundaryValue::Int(4)));
    }

    #[test]
    fn read_at_length_is_undefined_but_write_is_an_error() {
        let (array, proxy) = proxy_over(vec![3, 4, 7]);

        assert_eq!(proxy.get(3).unwrap(), None);
        assert_eq!(
            proxy.set(3, &BoundaryValue::Int(1)),
            Err(BridgeError::IndexOutOfRange { index: 3, length: 3 })
        );
        assert_eq!(array.to_vec(), vec![3, 4, 7]);
    }

    #[test]
    fn write_through_is_visible_on_both_sides() {
        let (array, proxy) = proxy_over(vec![3, 4, 7]);

        proxy.set(2, &BoundaryValue::Int(234)).unwrap();
        assert_eq!(array.to_vec(), vec![3, 4, 234]);
        assert_eq!(proxy.get(2).unwrap(), Some(BoundaryValue::Int(234)));

        array.set(0, 9).unwrap();
        assert_eq!(proxy.get(0).unwrap(), Some(BoundaryValue::Int(9)));
    }

    #[test]
    fn write_converts_through_value_bridge() {
        let (array, proxy) = proxy_over(vec![1, 2]);

        proxy.set(0, &BoundaryValue::Double(5.0)).unwrap();
        assert_eq!(array.get(0), Some(5));

        assert!(matches!(
            proxy.set(1, &BoundaryValue::from("5")),
            Err(BridgeError::TypeMismatch { .. })
        ));
        assert!(matches!(
            proxy.set(1, &BoundaryValue::Int(i64::MAX)),
            Err(BridgeError::Range { .. })
        ));
        assert_eq!(array.to_vec(), vec![5, 2]);
    }

    #[test]
    fn for_each_visits_in_order_and_observes_writes() {
        let (_array, proxy) = proxy_over(vec![3, 4, 7]);
        let mut seen = Vec::new();

        proxy
            .for_each(|index, value| {
                if index == 0 {
                    proxy.set(2, &BoundaryValue::Int(70)).unwrap();
                }
                seen.push(value.and_then(|v| v.as_int()));
            })
            .unwrap();

        assert_eq!(seen, vec![Some(3), Some(4), Some(70)]);
    }

    #[test]
    fn structural_mutation_is_rejected() {
        let (array, proxy) = proxy_over(vec![3, 4, 7]);

        assert!(matches!(
            proxy.append(&BoundaryValue::Int(23)),
            Err(BridgeError::NotSupported { .. })
        ));
        assert!(matches!(proxy.remove(0), Err(BridgeError::NotSupported { .. })));
        assert_eq!(proxy.length(), 3);
        assert_eq!(array.to_vec(), vec![3, 4, 7]);
    }

    #[test]
    fn disposed_array_fails_access() {
        let (array, proxy) = proxy_over(vec![1]);
        drop(array);

        assert!(matches!(proxy.get(0), Err(BridgeError::Disposed { .. })));
        assert!(matches!(
            proxy.set(0, &BoundaryValue::Int(1)),
            Err(BridgeError::Disposed { .. })
        ));
    }

    #[test]
    fn host_shrink_reads_undefined_and_rejects_writes() {
        let (array, proxy) = proxy_over(vec![1, 2, 3]);
        array.write().truncate(1);

        assert_eq!(proxy.get(2).unwrap(), None);
        assert!(matches!(
            proxy.set(2, &BoundaryValue::Int(1)),
            Err(BridgeError::IndexOutOfRange { index: 2, length: 1 })
        ));
    }

    #[test]
    fn iterator_matches_length() {
        let (_array, proxy) = proxy_over(vec![5, 6]);
        let values: Vec<_> = proxy.iter().map(|v| v.unwrap().unwrap()).collect();
        assert_eq!(values, vec![BoundaryValue::Int(5), BoundaryValue::Int(6)]);
        assert_eq!(proxy.iter().len(), 2);
    }

    #[test]
    fn from_value_requires_array_reference() {
        assert!(matches!(
            ArrayProxy::from_value(&BoundaryValue::Int(1)),
            Err(BridgeError::TypeMismatch { .. })
        ));
    }
}
