//! In-process share-link table. Entries live for 30 days; expired entries
//! are dropped lazily on read and swept opportunistically on every write.
//! Not durable: a restart empties the table.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{BookPayload, SharedBook};

const SHARE_TTL_DAYS: i64 = 30;

pub enum ShareLookup {
    Found(SharedBook),
    Missing,
    Expired,
}

pub struct ShareStore {
    entries: RwLock<HashMap<String, SharedBook>>,
    ttl: Duration,
}

impl Default for ShareStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ShareStore {
    pub fn new() -> Self {
        Self::with_ttl(Duration::days(SHARE_TTL_DAYS))
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        ShareStore {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    pub async fn publish(&self, book: BookPayload) -> SharedBook {
        self.publish_at(book, Utc::now()).await
    }

    pub(crate) async fn publish_at(&self, book: BookPayload, now: DateTime<Utc>) -> SharedBook {
        let entry = SharedBook {
            id: format!("share_{}", Uuid::new_v4().simple()),
            title: book.title,
            description: book.description,
            chapters: book.chapters,
            created_at: now,
            expires_at: now + self.ttl,
        };

        let mut entries = self.entries.write().await;
        entries.retain(|_, b| b.expires_at > now);
        entries.insert(entry.id.clone(), entry.clone());
        entry
    }

    pub async fn fetch(&self, id: &str) -> ShareLookup {
        self.fetch_at(id, Utc::now()).await
    }

    pub(crate) async fn fetch_at(&self, id: &str, now: DateTime<Utc>) -> ShareLookup {
        let mut entries = self.entries.write().await;
        match entries.get(id) {
            None => ShareLookup::Missing,
            Some(book) if book.expires_at <= now => {
                entries.remove(id);
                ShareLookup::Expired
            }
            Some(book) => ShareLookup::Found(book.clone()),
        }
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}
