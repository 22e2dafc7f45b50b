// Keywarden: Lifecycle test harness
//
// An in-memory store plus a mock remote environment wired into a
// `KeyLifecycle`, shared by the lifecycle, scheduler and gateway tests.

use std::sync::Arc;

use super::{KeyLifecycle, LifecyclePolicy};
use crate::crypto::{KeyCodec, SecretCipher};
use crate::distributor::mock::MockRemote;
use crate::distributor::Distributor;
use crate::store::{Database, SqliteKeyStore};

pub const ENC_SECRET: &str = "lifecycle-test-encryption-secret-0123456789";
pub const SHARED_SECRET: &str = "lifecycle-test-shared-secret";

pub struct Harness {
    pub lifecycle: Arc<KeyLifecycle>,
    pub store: Arc<SqliteKeyStore>,
    pub remote: Arc<MockRemote>,
}

impl Harness {
    /// Generate and activate a key, returning its fingerprint.
    pub async fn active_key(&self) -> String {
        let generated = self.lifecycle.generate_and_persist().await.unwrap();
        let fp = generated.fingerprint().to_string();
        self.lifecycle.activate_key(&fp).await.unwrap();
        fp
    }
}

pub fn harness_with(policy: LifecyclePolicy, enc_secret: Option<&str>) -> Harness {
    let store = Arc::new(SqliteKeyStore::new(Database::open_in_memory().unwrap()));
    let remote = Arc::new(MockRemote::new());
    let distributor = Distributor::new(remote.clone(), Some(SHARED_SECRET));
    let lifecycle = KeyLifecycle::new(
        store.clone(),
        KeyCodec::new(),
        SecretCipher::new(enc_secret),
        distributor,
        policy,
    );
    Harness {
        lifecycle: Arc::new(lifecycle),
        store,
        remote,
    }
}

pub fn harness() -> Harness {
    harness_with(LifecyclePolicy::default(), Some(ENC_SECRET))
}
