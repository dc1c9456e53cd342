//! Credential store - durable record of one identity's sealed tokens
//!
//! One JSON record per owner identity; writing a new record replaces the old
//! one atomically (write to a temp file, then rename). Tokens are sealed by
//! the codec before they reach disk; only ownership metadata is plaintext.

use crate::codec::{SealedSecret, SecretCodec};
use crate::grant::{GrantFlowAuthenticator, TokenGrant};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Durable record of one identity's tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialRecord {
    pub encrypted_access_token: SealedSecret,
    pub encrypted_refresh_token: Option<SealedSecret>,
    /// `None` means "treat as always near-expiry, never trust silently"
    pub expires_at: Option<DateTime<Utc>>,
    pub owner_identity: String,
    pub backend_url: String,
    pub created_at: DateTime<Utc>,
}

/// Persistent credential storage for a single owner identity
pub struct CredentialStore {
    storage_dir: PathBuf,
    owner: String,
    codec: SecretCodec,
    expiry_margin_secs: i64,
    /// Serializes save/refresh/logout for this owner
    write_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    /// Create a store rooted at `storage_dir` for one owner identity
    pub fn new<P: AsRef<Path>>(
        storage_dir: P,
        owner: &str,
        codec: SecretCodec,
        expiry_margin_secs: i64,
    ) -> AuthResult<Self> {
        let storage_dir = storage_dir.as_ref().join("credentials");
        std::fs::create_dir_all(&storage_dir)?;
        info!(dir = %storage_dir.display(), owner, "credential store initialized");

        Ok(Self {
            storage_dir,
            owner: owner.to_string(),
            codec,
            expiry_margin_secs,
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The owner identity this store is bound to
    pub fn owner(&self) -> &str {
        &self.owner
    }

    fn record_path(&self) -> PathBuf {
        // File names derive from the owner identity; anything unusual is
        // flattened so the identity cannot escape the storage directory.
        let sanitized: String = self
            .owner
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '.' { c } else { '_' })
            .collect();
        self.storage_dir.join(format!("{}.json", sanitized))
    }

    /// Load the persisted record, if any
    pub fn load(&self) -> AuthResult<Option<CredentialRecord>> {
        let path = self.record_path();
        if !path.exists() {
            return Ok(None);
        }

        let json_data = std::fs::read_to_string(&path)?;
        let record: CredentialRecord = serde_json::from_str(&json_data)?;
        debug!(owner = self.owner.as_str(), "loaded credential record");
        Ok(Some(record))
    }

    /// Persist a record, replacing any prior one atomically
    pub async fn save(&self, record: &CredentialRecord) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        self.save_locked(record)
    }

    fn save_locked(&self, record: &CredentialRecord) -> AuthResult<()> {
        let path = self.record_path();
        let tmp = path.with_extension("json.tmp");

        let json_data = serde_json::to_string_pretty(record)?;
        std::fs::write(&tmp, json_data)?;
        std::fs::rename(&tmp, &path)?;

        debug!(owner = self.owner.as_str(), path = %path.display(), "saved credential record");
        Ok(())
    }

    /// Expiry check with a safety margin, so a token is treated as expired
    /// slightly before the backend would reject it
    pub fn is_expired(record: &CredentialRecord, margin_secs: i64) -> bool {
        match record.expires_at {
            Some(expires_at) => expires_at - ChronoDuration::seconds(margin_secs) <= Utc::now(),
            None => true,
        }
    }

    /// Seal a token grant into a persistable record
    pub fn seal_grant(&self, grant: &TokenGrant, backend_url: &str) -> AuthResult<CredentialRecord> {
        let encrypted_access_token = self.codec.seal(&grant.access_token)?;
        let encrypted_refresh_token = grant
            .refresh_token
            .as_deref()
            .map(|t| self.codec.seal(t))
            .transpose()?;

        Ok(CredentialRecord {
            encrypted_access_token,
            encrypted_refresh_token,
            expires_at: grant.expires_at,
            owner_identity: self.owner.clone(),
            backend_url: backend_url.to_string(),
            created_at: Utc::now(),
        })
    }

    /// Seal and persist a token grant in one step
    pub async fn store_grant(
        &self,
        grant: &TokenGrant,
        backend_url: &str,
    ) -> AuthResult<CredentialRecord> {
        let record = self.seal_grant(grant, backend_url)?;
        self.save(&record).await?;
        Ok(record)
    }

    /// Decrypt the access token if the record exists and is not near expiry.
    ///
    /// A decrypt failure (corrupted store, wrong passphrase) is treated
    /// identically to a missing credential.
    pub fn valid_access_token(&self) -> AuthResult<Option<String>> {
        let Some(record) = self.load()? else {
            return Ok(None);
        };
        if Self::is_expired(&record, self.expiry_margin_secs) {
            debug!(owner = self.owner.as_str(), "stored access token is past the safety margin");
            return Ok(None);
        }
        match self.codec.open(&record.encrypted_access_token) {
            Ok(token) => Ok(Some(token)),
            Err(AuthError::Decrypt { message }) => {
                warn!(
                    owner = self.owner.as_str(),
                    reason = message.as_str(),
                    "stored credential could not be decrypted; treating as missing"
                );
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Refresh the stored tokens through the grant flow.
    ///
    /// Returns the new access token on success. Transient failures (and a
    /// missing refresh token) return `Ok(None)` and leave the prior record
    /// untouched - a failed refresh never corrupts a working record. Only a
    /// definitive backend rejection clears the record, because the refresh
    /// token is dead and a full re-authentication is required.
    pub async fn refresh(&self, grant_flow: &GrantFlowAuthenticator) -> AuthResult<Option<String>> {
        let _guard = self.write_lock.lock().await;

        let Some(record) = self.load()? else {
            return Ok(None);
        };
        let Some(sealed_refresh) = record.encrypted_refresh_token.as_ref() else {
            debug!(owner = self.owner.as_str(), "no refresh token in stored record");
            return Ok(None);
        };
        let refresh_token = match self.codec.open(sealed_refresh) {
            Ok(token) => token,
            Err(AuthError::Decrypt { message }) => {
                warn!(reason = message.as_str(), "refresh token could not be decrypted");
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        match grant_flow.refresh(&refresh_token).await {
            Ok(grant) => {
                let mut new_record = self.seal_grant(&grant, &record.backend_url)?;
                // Re-sealing keeps the original refresh token alive if the
                // backend did not rotate it
                if new_record.encrypted_refresh_token.is_none() {
                    new_record.encrypted_refresh_token = Some(self.codec.seal(&refresh_token)?);
                }
                new_record.created_at = record.created_at;
                let token = grant.access_token.clone();
                self.save_locked(&new_record)?;
                info!(owner = self.owner.as_str(), "refreshed stored credential");
                Ok(Some(token))
            }
            Err(AuthError::RefreshFailed { message }) => {
                warn!(
                    owner = self.owner.as_str(),
                    reason = message.as_str(),
                    "refresh token rejected; clearing stored record"
                );
                self.delete_locked()?;
                Err(AuthError::refresh_failed(message))
            }
            Err(e) => {
                warn!(
                    owner = self.owner.as_str(),
                    error = %e,
                    "refresh attempt failed; keeping prior record"
                );
                Ok(None)
            }
        }
    }

    /// Secure delete of the persisted record
    pub async fn logout(&self) -> AuthResult<()> {
        let _guard = self.write_lock.lock().await;
        self.delete_locked()
    }

    fn delete_locked(&self) -> AuthResult<()> {
        let path = self.record_path();
        if !path.exists() {
            return Ok(());
        }
        // Best-effort overwrite before unlinking so the sealed blobs do not
        // linger in the file's old blocks
        if let Ok(metadata) = std::fs::metadata(&path) {
            let zeros = vec![0u8; metadata.len() as usize];
            let _ = std::fs::write(&path, zeros);
        }
        std::fs::remove_file(&path)?;
        info!(owner = self.owner.as_str(), "deleted credential record");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grant::GrantFlowAuthenticator;
    use std::time::Duration;
    use url::Url;

    fn test_store(dir: &Path) -> CredentialStore {
        let codec = SecretCodec::new("test-passphrase").unwrap();
        CredentialStore::new(dir, "alice", codec, 300).unwrap()
    }

    fn grant_with_expiry(secs: i64) -> TokenGrant {
        TokenGrant {
            access_token: "abc".into(),
            refresh_token: Some("refresh-1".into()),
            expires_at: Some(Utc::now() + ChronoDuration::seconds(secs)),
        }
    }

    #[tokio::test]
    async fn save_load_round_trip_keeps_tokens_sealed() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        let record = store
            .store_grant(&grant_with_expiry(3600), "https://cms.example.com")
            .await
            .unwrap();

        // On-disk bytes never contain the plaintext token values (the blob
        // fields are hex, so quoted plaintext cannot appear)
        let raw = std::fs::read_to_string(dir.path().join("credentials/alice.json")).unwrap();
        assert!(!raw.contains("\"abc\""));
        assert!(!raw.contains("refresh-1"));

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.owner_identity, "alice");
        assert_eq!(loaded.backend_url, "https://cms.example.com");
        assert_eq!(loaded.expires_at, record.expires_at);
        assert_eq!(store.valid_access_token().unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn expiry_margin_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());

        // 200 s of validity is inside the 300 s margin: expired
        let near = store.seal_grant(&grant_with_expiry(200), "http://cms").unwrap();
        assert!(CredentialStore::is_expired(&near, 300));

        // 400 s of validity is outside the margin: still valid
        let far = store.seal_grant(&grant_with_expiry(400), "http://cms").unwrap();
        assert!(!CredentialStore::is_expired(&far, 300));

        // No expiry is never trusted silently
        let mut unknown = store.seal_grant(&grant_with_expiry(400), "http://cms").unwrap();
        unknown.expires_at = None;
        assert!(CredentialStore::is_expired(&unknown, 300));
    }

    #[tokio::test]
    async fn near_expiry_token_is_not_returned() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .store_grant(&grant_with_expiry(200), "http://cms")
            .await
            .unwrap();
        assert_eq!(store.valid_access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn wrong_passphrase_reads_as_missing_credential() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .store_grant(&grant_with_expiry(3600), "http://cms")
            .await
            .unwrap();

        let other = CredentialStore::new(
            dir.path(),
            "alice",
            SecretCodec::new("different-passphrase").unwrap(),
            300,
        )
        .unwrap();
        assert_eq!(other.valid_access_token().unwrap(), None);
    }

    #[tokio::test]
    async fn failed_refresh_leaves_record_intact() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .store_grant(&grant_with_expiry(3600), "http://cms")
            .await
            .unwrap();

        // Port 1 on loopback refuses connections: a transient network
        // failure, not a rejection
        let grant_flow = GrantFlowAuthenticator::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            None,
            Duration::from_secs(2),
        );

        let outcome = store.refresh(&grant_flow).await.unwrap();
        assert_eq!(outcome, None);

        // The pre-refresh record is still loadable and valid
        assert_eq!(store.valid_access_token().unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn refresh_without_refresh_token_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        let grant = TokenGrant {
            access_token: "abc".into(),
            refresh_token: None,
            expires_at: Some(Utc::now() + ChronoDuration::seconds(3600)),
        };
        store.store_grant(&grant, "http://cms").await.unwrap();

        let grant_flow = GrantFlowAuthenticator::new(
            reqwest::Client::new(),
            Url::parse("http://127.0.0.1:1").unwrap(),
            None,
            Duration::from_secs(2),
        );
        assert_eq!(store.refresh(&grant_flow).await.unwrap(), None);
        assert_eq!(store.valid_access_token().unwrap().as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn logout_removes_the_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .store_grant(&grant_with_expiry(3600), "http://cms")
            .await
            .unwrap();

        store.logout().await.unwrap();
        assert!(store.load().unwrap().is_none());
        assert!(!dir.path().join("credentials/alice.json").exists());

        // Logging out twice is fine
        store.logout().await.unwrap();
    }

    #[tokio::test]
    async fn save_replaces_previous_record() {
        let dir = tempfile::tempdir().unwrap();
        let store = test_store(dir.path());
        store
            .store_grant(&grant_with_expiry(3600), "http://cms")
            .await
            .unwrap();

        let second = TokenGrant {
            access_token: "xyz".into(),
            refresh_token: None,
            expires_at: Some(Utc::now() + ChronoDuration::seconds(7200)),
        };
        store.store_grant(&second, "http://cms").await.unwrap();
        assert_eq!(store.valid_access_token().unwrap().as_deref(), Some("xyz"));
    }
}
