use std::path::Path;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rocksdb::{Options, WriteBatch, DB};
use tokio::sync::Mutex;
use tracing::debug;

use crate::model::user::User;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created,
    Updated,
}

/// Document collection holding one [`User`] per unique email.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Create-if-absent, else add `device_token` to the existing record.
    /// Keyed by `email` and atomic with respect to other upserts.
    async fn upsert_device(
        &self,
        name: &str,
        email: &str,
        device_token: &str,
    ) -> Result<(User, UpsertOutcome)>;

    /// Cheap round-trip used by the health check.
    async fn ping(&self) -> Result<()>;
}

pub struct DBLayer {
    db: DB,
    collection: String,
    write_lock: Mutex<()>,
}

impl DBLayer {
    pub fn open(path: impl AsRef<Path>, collection: &str) -> Result<Self> {
        let path = path.as_ref();
        let mut opts = Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)
            .with_context(|| format!("Failed to open store at {}", path.display()))?;
        Ok(Self {
            db,
            collection: collection.to_string(),
            write_lock: Mutex::new(()),
        })
    }

    // ============================================================
    // KEYS
    // ============================================================
    fn user_key(&self, id: &str) -> String {
        format!("{}:user:{id}", self.collection)
    }

    // unique index: email → user id
    fn email_key(&self, email: &str) -> String {
        format!("{}:email:{email}", self.collection)
    }

    fn load_user(&self, id: &str) -> Result<Option<User>> {
        match self.db.get(self.user_key(id))? {
            Some(v) => Ok(Some(
                serde_json::from_slice(&v).with_context(|| format!("Corrupt user record {id}"))?,
            )),
            None => Ok(None),
        }
    }

    fn lookup(&self, email: &str) -> Result<Option<User>> {
        let Some(id) = self.db.get(self.email_key(email))? else {
            return Ok(None);
        };
        let id = String::from_utf8(id).context("Corrupt email index entry")?;
        self.load_user(&id)
    }

    fn write_user(&self, user: &User, index_email: bool) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put(self.user_key(&user.id), serde_json::to_vec(user)?);
        if index_email {
            batch.put(self.email_key(&user.email), user.id.as_bytes());
        }
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for DBLayer {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>> {
        self.lookup(email)
    }

    async fn upsert_device(
        &self,
        name: &str,
        email: &str,
        device_token: &str,
    ) -> Result<(User, UpsertOutcome)> {
        let _guard = self.write_lock.lock().await;

        match self.lookup(email)? {
            Some(mut user) => {
                let added = user.add_token(device_token);
                self.write_user(&user, false)?;
                debug!(
                    user_id = %user.id,
                    added,
                    tokens = user.latest_tokens().len(),
                    "updated device tokens"
                );
                Ok((user, UpsertOutcome::Updated))
            }
            None => {
                let user = User::new(name, email, device_token);
                self.write_user(&user, true)?;
                debug!(user_id = %user.id, "created user");
                Ok((user, UpsertOutcome::Created))
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.db
            .get(format!("{}:ping", self.collection))
            .context("Store read failed")?;
        Ok(())
    }
}
