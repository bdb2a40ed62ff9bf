//! Spent key image index (`k/`): image → height at which it was consumed.

use basalt_crypto::KeyImage;
use basalt_storage::keys::{read_varint_suffix, write_varint_sqlite4};
use basalt_storage::{Column, KeyValueStore, StoreError, WriteBatch};

pub fn spent_height<S: KeyValueStore>(
    store: &S,
    key_image: &KeyImage,
) -> Result<Option<u32>, StoreError> {
    let Some(bytes) = store.get(Column::SpentKeyImages, key_image)? else {
        return Ok(None);
    };
    read_varint_suffix(&bytes)
        .map(|height| Some(height as u32))
        .ok_or_else(|| StoreError::Backend("invalid spent key image entry".to_string()))
}

pub fn is_spent<S: KeyValueStore>(store: &S, key_image: &KeyImage) -> Result<bool, StoreError> {
    Ok(store.get(Column::SpentKeyImages, key_image)?.is_some())
}

pub fn put(batch: &mut WriteBatch, key_image: &KeyImage, height: u32) {
    batch.put(
        Column::SpentKeyImages,
        key_image,
        write_varint_sqlite4(height as u64).to_vec(),
    );
}

pub fn delete(batch: &mut WriteBatch, key_image: &KeyImage) {
    batch.delete(Column::SpentKeyImages, key_image);
}
