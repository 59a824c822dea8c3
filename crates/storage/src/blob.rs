//! Binary values spread over consecutive slots
//!
//! The value is serialised with postcard, base64 encoded and cut into
//! slot-sized pieces.

use crate::store::ParameterStore;
use crate::{StorageError, PARAM_MAX, PARAM_VALUE_CAPACITY};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

fn check_range(start: usize, slots: usize, needed: usize) -> Result<(), StorageError> {
    let available = PARAM_MAX.saturating_sub(start).min(slots);
    if needed > available || start + slots > PARAM_MAX {
        return Err(StorageError::BlobOverflow {
            start,
            needed,
            available,
        });
    }
    Ok(())
}

/// Store `value` in `slots` slots starting at `start`; unused slots are cleared.
pub fn set_blob<S, T>(store: &mut S, start: usize, slots: usize, value: &T) -> Result<(), StorageError>
where
    S: ParameterStore + ?Sized,
    T: Serialize,
{
    let bytes =
        postcard::to_allocvec(value).map_err(|e| StorageError::SerializationError(e.to_string()))?;
    let encoded = STANDARD.encode(bytes);
    let needed = encoded.len().div_ceil(PARAM_VALUE_CAPACITY);
    check_range(start, slots, needed)?;

    let mut pieces = encoded.as_bytes().chunks(PARAM_VALUE_CAPACITY);
    for index in start..start + slots {
        // base64 output is ASCII, so every piece is valid UTF-8
        let piece = pieces
            .next()
            .and_then(|p| std::str::from_utf8(p).ok())
            .unwrap_or("");
        store.set(index, piece)?;
    }
    Ok(())
}

/// Read back a value written by [`set_blob`]
pub fn get_blob<S, T>(store: &S, start: usize, slots: usize) -> Result<T, StorageError>
where
    S: ParameterStore + ?Sized,
    T: DeserializeOwned,
{
    check_range(start, slots, 0)?;
    let encoded: String = (start..start + slots).map(|i| store.get(i)).collect();
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|e| StorageError::SerializationError(e.to_string()))?;
    postcard::from_bytes(&bytes).map_err(|e| StorageError::SerializationError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{param, SlotStore};
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Geofence {
        latitude: i32,
        longitude: i32,
        radius_m: u16,
        label: String,
    }

    #[test]
    fn test_blob_spans_slots() {
        let mut store = SlotStore::new();
        let fence = Geofence {
            latitude: 46_000_000,
            longitude: -7_000_000,
            radius_m: 250,
            label: "home charger bay".into(),
        };
        set_blob(&mut store, param::ACC_S, param::ACC_COUNT, &fence).unwrap();
        assert_eq!(store.get(param::ACC_S).len(), PARAM_VALUE_CAPACITY);

        let back: Geofence = get_blob(&store, param::ACC_S, param::ACC_COUNT).unwrap();
        assert_eq!(back, fence);
        // Neighbours untouched
        assert_eq!(store.get(param::COOLDOWN), "");
        assert_eq!(store.get(param::ACC_S + param::ACC_COUNT), "");
    }

    #[test]
    fn test_blob_overflow() {
        let mut store = SlotStore::new();
        let big = vec![7u8; 100];
        assert!(matches!(
            set_blob(&mut store, param::ACC_S, 1, &big),
            Err(StorageError::BlobOverflow { needed: 5, .. })
        ));
        assert!(matches!(
            set_blob(&mut store, 30, 4, &1u8),
            Err(StorageError::BlobOverflow { .. })
        ));
    }

    #[test]
    fn test_blob_shrinks_clear_trailing_slots() {
        let mut store = SlotStore::new();
        set_blob(&mut store, param::ACC_S, 4, &vec![1u8; 60]).unwrap();
        assert!(!store.get(param::ACC_S + 2).is_empty());
        set_blob(&mut store, param::ACC_S, 4, &3u32).unwrap();
        assert_eq!(store.get(param::ACC_S + 2), "");
        assert_eq!(get_blob::<_, u32>(&store, param::ACC_S, 4).unwrap(), 3);
    }
}
