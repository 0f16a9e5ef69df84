//! Per-packet storage of header field values

use std::marker::PhantomData;

use bytes::Bytes;

use crate::schema::FieldId;

/// Field values of one packet, keyed by the protocol's field enum
///
/// Each field has a slot holding either its value, right-aligned in a buffer
/// of the schema's storage size, or `None` when the field is absent. Absent
/// fields are skipped on encode.
#[derive(Debug, Clone)]
pub struct FieldMap<F> {
    values: Vec<Option<Bytes>>,
    _field: PhantomData<F>,
}

impl<F: FieldId> FieldMap<F> {
    /// Create a map with every field absent
    pub fn new() -> Self {
        FieldMap {
            values: vec![None; F::COUNT],
            _field: PhantomData,
        }
    }

    /// Value of a field, if present
    pub fn get(&self, id: F) -> Option<&Bytes> {
        self.values.get(id.index())?.as_ref()
    }

    /// Store a field value, returning the previous one
    pub fn insert(&mut self, id: F, value: Bytes) -> Option<Bytes> {
        self.values[id.index()].replace(value)
    }

    /// Remove a field value
    pub fn remove(&mut self, id: F) -> Option<Bytes> {
        self.values[id.index()].take()
    }

    /// Check whether a field is present
    pub fn contains(&self, id: F) -> bool {
        self.get(id).is_some()
    }

    /// Mark every field absent
    pub fn clear(&mut self) {
        self.values.iter_mut().for_each(|slot| *slot = None);
    }

    /// Number of present fields
    pub fn len(&self) -> usize {
        self.values.iter().filter(|slot| slot.is_some()).count()
    }

    /// True if no field is present
    pub fn is_empty(&self) -> bool {
        self.values.iter().all(Option::is_none)
    }
}

impl<F: FieldId> Default for FieldMap<F> {
    fn default() -> Self {
        Self::new()
    }
}

/// True if the value is absent or every byte is zero
pub(crate) fn is_zero(value: Option<&Bytes>) -> bool {
    value.map_or(true, |bytes| bytes.iter().all(|&b| b == 0))
}

/// Field equality where an absent value equals an all-zero one
pub(crate) fn values_equivalent(a: Option<&Bytes>, b: Option<&Bytes>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a == b,
        (a, b) => is_zero(a) && is_zero(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::header_fields;

    header_fields! {
        enum Pair {
            Left => "left",
            Right => "right",
        }
    }

    #[test]
    fn test_insert_get_remove() {
        let mut map = FieldMap::<Pair>::new();
        assert!(map.is_empty());

        assert!(map.insert(Pair::Left, Bytes::from_static(&[1, 2])).is_none());
        assert_eq!(map.get(Pair::Left).unwrap().as_ref(), &[1, 2]);
        assert!(!map.contains(Pair::Right));
        assert_eq!(map.len(), 1);

        assert!(map.remove(Pair::Left).is_some());
        assert!(map.is_empty());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut map = FieldMap::<Pair>::new();
        map.insert(Pair::Left, Bytes::from_static(&[7]));
        let copy = map.clone();
        map.insert(Pair::Left, Bytes::from_static(&[8]));
        assert_eq!(copy.get(Pair::Left).unwrap().as_ref(), &[7]);
    }

    #[test]
    fn test_absent_equals_zero() {
        let zero = Bytes::from_static(&[0, 0]);
        let one = Bytes::from_static(&[0, 1]);
        assert!(values_equivalent(None, None));
        assert!(values_equivalent(None, Some(&zero)));
        assert!(values_equivalent(Some(&zero), None));
        assert!(!values_equivalent(None, Some(&one)));
        assert!(!values_equivalent(Some(&zero), Some(&one)));
    }
}
