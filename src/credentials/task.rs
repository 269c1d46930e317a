//! Async facade over `CredentialStore`
//!
//! Vault calls block; this runs each one on tokio's blocking pool so async
//! callers are not stalled.

use std::sync::Arc;

use super::error::CredentialError;
use super::platform::CredentialPlatform;
use super::store::CredentialStore;
use super::types::{CredentialRecord, CredentialType, WriteMode};

/// Cloneable, `Send` handle to a store for use from async code.
pub struct SharedStore<P> {
    inner: Arc<CredentialStore<P>>,
}

impl<P> Clone for SharedStore<P> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P> SharedStore<P>
where
    P: CredentialPlatform + Send + Sync + 'static,
{
    pub fn new(store: CredentialStore<P>) -> Self {
        Self {
            inner: Arc::new(store),
        }
    }

    pub fn store(&self) -> &CredentialStore<P> {
        &self.inner
    }

    pub async fn read_credential(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<CredentialRecord, CredentialError> {
        let store = Arc::clone(&self.inner);
        let target_name = target_name.to_string();
        run_blocking(move || store.read_credential(&target_name, cred_type)).await
    }

    pub async fn write_credential(
        &self,
        record: CredentialRecord,
        mode: WriteMode,
    ) -> Result<(), CredentialError> {
        let store = Arc::clone(&self.inner);
        run_blocking(move || store.write_credential(&record, mode)).await
    }

    pub async fn delete_credential(
        &self,
        target_name: &str,
        cred_type: CredentialType,
    ) -> Result<(), CredentialError> {
        let store = Arc::clone(&self.inner);
        let target_name = target_name.to_string();
        run_blocking(move || store.delete_credential(&target_name, cred_type)).await
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T, CredentialError>
where
    F: FnOnce() -> Result<T, CredentialError> + Send + 'static,
    T: Send + 'static,
{
    match tokio::task::spawn_blocking(f).await {
        Ok(result) => result,
        Err(e) => Err(CredentialError::Task(e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::memory::{InMemoryVault, VaultOp};
    use crate::credentials::PlatformCode;

    fn shared() -> SharedStore<InMemoryVault> {
        SharedStore::new(CredentialStore::new(InMemoryVault::new()))
    }

    #[tokio::test]
    async fn test_async_roundtrip() {
        let store = shared();
        let record = CredentialRecord::generic("atto:seed", b"words".to_vec());
        store
            .write_credential(record.clone(), WriteMode::Replace)
            .await
            .unwrap();

        let read = store
            .read_credential("atto:seed", CredentialType::Generic)
            .await
            .unwrap();
        assert!(read.same_content(&record));

        store
            .delete_credential("atto:seed", CredentialType::Generic)
            .await
            .unwrap();
        let err = store
            .read_credential("atto:seed", CredentialType::Generic)
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_async_platform_error() {
        let store = shared();
        store
            .store()
            .platform()
            .fail_next(VaultOp::Delete, PlatformCode(1312));
        let err = store
            .delete_credential("x", CredentialType::Generic)
            .await
            .unwrap_err();
        assert_eq!(err.platform_code(), Some(PlatformCode(1312)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_concurrent_callers_share_store() {
        let store = shared();
        let mut tasks = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let name = format!("target-{i}");
                let record = CredentialRecord::generic(name.as_str(), vec![i as u8; 4]);
                store
                    .write_credential(record, WriteMode::Replace)
                    .await
                    .unwrap();
                store
                    .read_credential(&name, CredentialType::Generic)
                    .await
                    .unwrap()
            }));
        }
        for (i, task) in tasks.into_iter().enumerate() {
            let record = task.await.unwrap();
            assert_eq!(record.secret_blob.as_slice(), &[i as u8; 4]);
        }
        assert_eq!(store.store().platform().outstanding_handles(), 0);
    }
}
