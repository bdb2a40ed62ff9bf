use std::path::Path;
use std::time::{Duration, Instant};

use fjall::PersistMode;
use fjall::{AbstractTree, Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle};

use crate::{Column, KeyValueStore, ScanVisitor, StoreError, WriteBatch, WriteOp};

const PARTITION_NAME: &str = "chain";
const SLOW_COMMIT_THRESHOLD: Duration = Duration::from_millis(500);

/// Persistent store over a single ordered fjall partition.
///
/// All columns share one keyspace; the printable column prefixes keep the
/// namespaces disjoint and the prefix cursors cheap.
pub struct FjallStore {
    keyspace: Keyspace,
    partition: PartitionHandle,
}

#[derive(Clone, Debug, Default)]
pub struct FjallOptions {
    pub cache_bytes: Option<u64>,
    pub write_buffer_bytes: Option<u64>,
    pub fsync_ms: Option<u16>,
}

impl FjallOptions {
    fn apply_config(&self, mut config: Config) -> Config {
        if let Some(bytes) = self.cache_bytes {
            config = config.cache_size(bytes);
        }
        if let Some(bytes) = self.write_buffer_bytes {
            config = config.max_write_buffer_size(bytes);
        }
        if let Some(ms) = self.fsync_ms {
            config = config.fsync_ms(Some(ms));
        }
        config
    }
}

impl FjallStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Self::open_with_options(path, FjallOptions::default())
    }

    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: FjallOptions,
    ) -> Result<Self, StoreError> {
        let config = options.apply_config(Config::new(path));
        let keyspace = config.open().map_err(map_err)?;
        let partition = keyspace
            .open_partition(PARTITION_NAME, PartitionCreateOptions::default())
            .map_err(map_err)?;
        Ok(Self {
            keyspace,
            partition,
        })
    }

    pub fn disk_space(&self) -> u64 {
        self.partition.tree.disk_space()
    }
}

impl KeyValueStore for FjallStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.partition.get(column.key(key)).map_err(map_err)?;
        Ok(value.map(|bytes| bytes.to_vec()))
    }

    fn put(&self, column: Column, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.partition
            .insert(column.key(key), value)
            .map_err(map_err)?;
        Ok(())
    }

    fn delete(&self, column: Column, key: &[u8]) -> Result<(), StoreError> {
        self.partition.remove(column.key(key)).map_err(map_err)?;
        Ok(())
    }

    fn for_each_forward<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        let low = match start {
            Some(suffix) => column.key(suffix),
            None => column.prefix().to_vec(),
        };
        let high = column.upper_bound();
        let prefix_len = column.prefix().len();
        for entry in self.partition.range(low..high) {
            let (key, value) = entry.map_err(map_err)?;
            if !visitor(&key[prefix_len..], &value)? {
                break;
            }
        }
        Ok(())
    }

    fn for_each_reverse<'a>(
        &self,
        column: Column,
        start: Option<&[u8]>,
        visitor: &mut ScanVisitor<'a>,
    ) -> Result<(), StoreError> {
        let low = column.prefix().to_vec();
        let high = match start {
            Some(suffix) => {
                // Inclusive upper bound: extend past the exact key.
                let mut bound = column.key(suffix);
                bound.push(0);
                bound
            }
            None => column.upper_bound(),
        };
        let prefix_len = column.prefix().len();
        for entry in self.partition.range(low..high).rev() {
            let (key, value) = entry.map_err(map_err)?;
            if !visitor(&key[prefix_len..], &value)? {
                break;
            }
        }
        Ok(())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut fjall_batch = Batch::with_capacity(self.keyspace.clone(), batch.len())
            .durability(Some(PersistMode::Buffer));
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    fjall_batch.insert(
                        &self.partition,
                        column.key(key.as_slice()),
                        value.as_slice(),
                    );
                }
                WriteOp::Delete { column, key } => {
                    fjall_batch.remove(&self.partition, column.key(key.as_slice()));
                }
            }
        }
        let commit_start = Instant::now();
        fjall_batch.commit().map_err(map_err)?;
        let elapsed = commit_start.elapsed();
        if elapsed >= SLOW_COMMIT_THRESHOLD {
            basalt_log::log_warn!(
                "slow store commit: {}ms for {} ops (write_buffer {}B)",
                elapsed.as_millis(),
                batch.len(),
                self.keyspace.write_buffer_size(),
            );
        }
        Ok(())
    }
}

fn map_err(err: fjall::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}
