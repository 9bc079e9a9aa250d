use crate::keys::validate_key;
use crate::traits::{
    ByteReader, Storage, StorageError, StorageObject, StorageResult, MAX_PREALLOC_BYTES,
};
use crate::StorageBackend;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use std::collections::HashMap;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::sync::RwLock;

#[derive(Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
}

/// In-memory storage backend
///
/// Used by tests and local runs. Behaves like the S3 backend for every
/// operation of the [`Storage`] contract.
pub struct MemoryStorage {
    objects: RwLock<HashMap<String, StoredObject>>,
    base_url: String,
}

impl MemoryStorage {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Number of stored objects
    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new("memory://depot")
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn upload(
        &self,
        key: &str,
        mut reader: ByteReader,
        content_type: &str,
        content_length: Option<u64>,
    ) -> StorageResult<()> {
        validate_key(key)?;

        let mut buffer =
            Vec::with_capacity(content_length.unwrap_or(0).min(MAX_PREALLOC_BYTES) as usize);
        reader.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        if let Some(expected) = content_length {
            if buffer.len() as u64 != expected {
                return Err(StorageError::UploadFailed(format!(
                    "Declared length {} does not match {} bytes read",
                    expected,
                    buffer.len()
                )));
            }
        }

        let size = buffer.len();
        self.objects.write().await.insert(
            key.to_string(),
            StoredObject {
                data: Bytes::from(buffer),
                content_type: content_type.to_string(),
            },
        );

        tracing::debug!(key = %key, size_bytes = size, "Memory upload successful");
        Ok(())
    }

    async fn download(&self, key: &str) -> StorageResult<StorageObject> {
        validate_key(key)?;

        let object = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(key.to_string()))?;

        let content_length = object.data.len() as u64;
        let data = object.data;
        Ok(StorageObject {
            content_type: Some(object.content_type),
            content_length,
            body: Box::pin(futures::stream::once(async move { Ok(data) })),
        })
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        validate_key(key)?;
        self.objects.write().await.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        validate_key(key)?;
        Ok(self.objects.read().await.contains_key(key))
    }

    async fn presign(&self, key: &str, ttl: Duration) -> StorageResult<String> {
        validate_key(key)?;
        if !self.objects.read().await.contains_key(key) {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let expires_at = Utc::now().timestamp() + ttl.as_secs() as i64;
        let encoded_key = key
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");

        Ok(format!(
            "{}/{}?X-Expires={}&X-Expires-At={}",
            self.base_url,
            encoded_key,
            ttl.as_secs(),
            expires_at
        ))
    }

    fn backend_type(&self) -> StorageBackend {
        StorageBackend::Memory
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn reader(data: &[u8]) -> ByteReader {
        Box::pin(std::io::Cursor::new(data.to_vec()))
    }

    #[tokio::test]
    async fn test_memory_storage_upload_download() {
        let storage = MemoryStorage::default();
        let data = b"test data";

        storage
            .upload("media/test.txt", reader(data), "text/plain", Some(9))
            .await
            .unwrap();

        let object = storage.download("media/test.txt").await.unwrap();
        assert_eq!(object.content_type.as_deref(), Some("text/plain"));
        assert_eq!(object.content_length, 9);
        assert_eq!(object.bytes().await.unwrap().as_ref(), data);
    }

    #[tokio::test]
    async fn test_upload_overwrites() {
        let storage = MemoryStorage::default();
        storage
            .upload("k", reader(b"one"), "text/plain", None)
            .await
            .unwrap();
        storage
            .upload("k", reader(b"second"), "application/json", None)
            .await
            .unwrap();

        let object = storage.download("k").await.unwrap();
        assert_eq!(object.content_type.as_deref(), Some("application/json"));
        assert_eq!(object.bytes().await.unwrap().as_ref(), b"second");
    }

    #[tokio::test]
    async fn test_length_mismatch_not_committed() {
        let storage = MemoryStorage::default();
        let result = storage
            .upload("media/short.bin", reader(b"abc"), "application/octet-stream", Some(10))
            .await;

        assert!(matches!(result, Err(StorageError::UploadFailed(_))));
        assert!(!storage.exists("media/short.bin").await.unwrap());
    }

    #[tokio::test]
    async fn test_huge_declared_length_rejected() {
        let storage = MemoryStorage::default();
        let result = storage
            .upload("media/x", reader(b"abc"), "text/plain", Some(u64::MAX))
            .await;

        assert!(matches!(result, Err(StorageError::UploadFailed(_))));
        assert!(!storage.exists("media/x").await.unwrap());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let storage = MemoryStorage::default();
        storage
            .upload("media/a", reader(b"a"), "text/plain", None)
            .await
            .unwrap();

        storage.delete("media/a").await.unwrap();
        storage.delete("media/a").await.unwrap();
        storage.delete("never/existed").await.unwrap();
        assert!(!storage.exists("media/a").await.unwrap());
    }

    #[tokio::test]
    async fn test_not_found() {
        let storage = MemoryStorage::default();
        assert!(matches!(
            storage.download("missing").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.presign("missing", Duration::from_secs(60)).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_presign_embeds_expiry() {
        let storage = MemoryStorage::new("http://localhost:9000/bucket/");
        storage
            .upload("media/my file.png", reader(b"png"), "image/png", None)
            .await
            .unwrap();

        let before = Utc::now().timestamp();
        let url = storage
            .presign("media/my file.png", Duration::from_secs(900))
            .await
            .unwrap();

        assert!(url.starts_with("http://localhost:9000/bucket/media/my%20file.png?"));
        assert!(url.contains("X-Expires=900"));
        let expires_at: i64 = url
            .rsplit("X-Expires-At=")
            .next()
            .unwrap()
            .parse()
            .unwrap();
        assert!(expires_at >= before + 900);
    }

    #[tokio::test]
    async fn test_invalid_keys_rejected() {
        let storage = MemoryStorage::default();
        assert!(matches!(
            storage.download("../../etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.delete("/etc/passwd").await,
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(
            storage.upload("", reader(b"x"), "text/plain", None).await,
            Err(StorageError::InvalidKey(_))
        ));
    }

    #[tokio::test]
    async fn test_concurrent_access() {
        let storage = Arc::new(MemoryStorage::default());
        let mut handles = Vec::new();

        for i in 0..32 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                let key = format!("media/{}.txt", i);
                let body = format!("body-{}", i);
                storage
                    .upload(&key, reader(body.as_bytes()), "text/plain", None)
                    .await
                    .unwrap();
                let object = storage.download(&key).await.unwrap();
                assert_eq!(object.bytes().await.unwrap(), Bytes::from(body));
                if i % 2 == 0 {
                    storage.delete(&key).await.unwrap();
                }
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(storage.len().await, 16);
    }
}
