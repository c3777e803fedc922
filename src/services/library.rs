//! Per-user persistence: projects, books with ordered chapters, credit
//! usage and per-project conversation memory, stored as one JSON blob per
//! user under the data directory. Every operation takes the user
//! explicitly; there is no ambient session state. A blob that fails to
//! parse is replaced by a freshly initialised empty state.
//!
//! Writes are whole-blob read-modify-write, so all access to a user's file
//! goes through that user's mutex; without it two concurrent handlers would
//! each load, then each save, and one acknowledged write would vanish.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::models::{Book, Chapter, Conversation, CreditUsage, Project, ProjectMemory};

/// Memory keeps at most this many exchanges per project, oldest first out.
const MAX_CONVERSATIONS: usize = 50;
/// How many recent exchanges feed the rolling context.
const CONTEXT_WINDOW: usize = 5;

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserData {
    projects: Vec<Project>,
    books: Vec<Book>,
    credit_usage: Vec<CreditUsage>,
    total_credits_used: f64,
    memories: HashMap<String, ProjectMemory>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreditSummary {
    pub credit_usage: Vec<CreditUsage>,
    pub total_credits_used: f64,
}

pub struct Library {
    data_dir: PathBuf,
    // One lock per user file. Reads take it too: fs::write truncates
    // before writing, so an unlocked read could see a half-written blob
    // and mistake it for corruption.
    locks: StdMutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Library {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("creating data directory {}", data_dir.display()))?;
        Ok(Library {
            data_dir,
            locks: StdMutex::new(HashMap::new()),
        })
    }

    fn user_lock(&self, user: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(user.to_string()).or_default().clone()
    }

    fn user_path(&self, user: &str) -> PathBuf {
        let safe: String = user
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.data_dir.join(format!("{safe}.json"))
    }

    async fn load(&self, user: &str) -> UserData {
        match fs::read_to_string(self.user_path(user)).await {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|err| {
                tracing::warn!(user, error = %err, "stored data unreadable, starting fresh");
                UserData::default()
            }),
            Err(_) => UserData::default(),
        }
    }

    async fn save(&self, user: &str, data: &UserData) -> Result<()> {
        let path = self.user_path(user);
        let raw = serde_json::to_string_pretty(data)?;
        fs::write(&path, raw)
            .await
            .with_context(|| format!("writing {}", path.display()))
    }

    // -- projects --------------------------------------------------------

    pub async fn list_projects(&self, user: &str) -> Vec<Project> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        self.load(user).await.projects
    }

    pub async fn create_project(&self, user: &str, title: &str) -> Result<Project> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let now = Utc::now();
        let project = Project {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: String::new(),
            created_at: now,
            updated_at: now,
        };
        data.memories.insert(
            project.id.clone(),
            ProjectMemory {
                project_id: project.id.clone(),
                conversations: Vec::new(),
                context: String::new(),
                last_updated: now,
            },
        );
        data.projects.push(project.clone());
        self.save(user, &data).await?;
        Ok(project)
    }

    pub async fn update_project(
        &self,
        user: &str,
        id: &str,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Option<Project>> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let Some(project) = data.projects.iter_mut().find(|p| p.id == id) else {
            return Ok(None);
        };

        if let Some(title) = title {
            project.title = title;
        }
        if let Some(content) = content {
            project.content = content.clone();
            // The memory context tracks the latest body of the project.
            if let Some(memory) = data.memories.get_mut(id) {
                memory.context = content;
                memory.last_updated = Utc::now();
            }
        }
        project.updated_at = Utc::now();

        let updated = project.clone();
        self.save(user, &data).await?;
        Ok(Some(updated))
    }

    pub async fn delete_project(&self, user: &str, id: &str) -> Result<bool> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let before = data.projects.len();
        data.projects.retain(|p| p.id != id);
        data.memories.remove(id);
        if data.projects.len() == before {
            return Ok(false);
        }
        self.save(user, &data).await?;
        Ok(true)
    }

    // -- conversation memory ----------------------------------------------

    pub async fn record_conversation(
        &self,
        user: &str,
        project_id: &str,
        prompt: &str,
        response: &str,
        tokens: u64,
        cost: f64,
    ) -> Result<Conversation> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let now = Utc::now();
        let memory = data
            .memories
            .entry(project_id.to_string())
            .or_insert_with(|| ProjectMemory {
                project_id: project_id.to_string(),
                conversations: Vec::new(),
                context: String::new(),
                last_updated: now,
            });

        let conversation = Conversation {
            id: Uuid::new_v4().to_string(),
            timestamp: now,
            prompt: prompt.to_string(),
            response: response.to_string(),
            tokens,
            cost,
        };

        memory.conversations.push(conversation.clone());
        if memory.conversations.len() > MAX_CONVERSATIONS {
            let excess = memory.conversations.len() - MAX_CONVERSATIONS;
            memory.conversations.drain(..excess);
        }
        memory.context = response.to_string();
        memory.last_updated = now;

        self.save(user, &data).await?;
        Ok(conversation)
    }

    /// Rolling context for follow-up prompts: the stored context plus the
    /// last few exchanges.
    pub async fn project_context(&self, user: &str, project_id: &str) -> String {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let data = self.load(user).await;
        let Some(memory) = data.memories.get(project_id) else {
            return String::new();
        };

        let recent = memory
            .conversations
            .iter()
            .rev()
            .take(CONTEXT_WINDOW)
            .collect::<Vec<_>>();
        let mut parts: Vec<String> = Vec::new();
        if !memory.context.is_empty() {
            parts.push(memory.context.clone());
        }
        for conversation in recent.into_iter().rev() {
            parts.push(format!(
                "Q: {}\nA: {}",
                conversation.prompt, conversation.response
            ));
        }
        parts.join("\n\n")
    }

    pub async fn conversation_history(
        &self,
        user: &str,
        project_id: &str,
        limit: usize,
    ) -> Vec<Conversation> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let data = self.load(user).await;
        data.memories
            .get(project_id)
            .map(|m| {
                let skip = m.conversations.len().saturating_sub(limit);
                m.conversations[skip..].to_vec()
            })
            .unwrap_or_default()
    }

    // -- credits -----------------------------------------------------------

    pub async fn add_credit_usage(&self, user: &str, tokens: u64, cost: f64) -> Result<()> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        data.credit_usage.push(CreditUsage {
            tokens,
            cost,
            timestamp: Utc::now(),
        });
        data.total_credits_used += cost;
        self.save(user, &data).await
    }

    pub async fn credit_summary(&self, user: &str) -> CreditSummary {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let data = self.load(user).await;
        CreditSummary {
            credit_usage: data.credit_usage,
            total_credits_used: data.total_credits_used,
        }
    }

    // -- books -------------------------------------------------------------

    pub async fn list_books(&self, user: &str) -> Vec<Book> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        self.load(user).await.books
    }

    pub async fn create_book(
        &self,
        user: &str,
        title: &str,
        description: Option<String>,
    ) -> Result<Book> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let now = Utc::now();
        let book = Book {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            description,
            chapters: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        data.books.push(book.clone());
        self.save(user, &data).await?;
        Ok(book)
    }

    /// Appends a chapter; its order is always one past the current last.
    pub async fn add_chapter(
        &self,
        user: &str,
        book_id: &str,
        title: &str,
        content: &str,
    ) -> Result<Option<Chapter>> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let Some(book) = data.books.iter_mut().find(|b| b.id == book_id) else {
            return Ok(None);
        };

        let now = Utc::now();
        let chapter = Chapter {
            id: Uuid::new_v4().to_string(),
            title: title.to_string(),
            content: content.to_string(),
            order: book.chapters.len() as u32 + 1,
            created_at: now,
            updated_at: now,
        };
        book.chapters.push(chapter.clone());
        book.updated_at = now;

        self.save(user, &data).await?;
        Ok(Some(chapter))
    }

    pub async fn update_chapter(
        &self,
        user: &str,
        book_id: &str,
        chapter_id: &str,
        title: Option<String>,
        content: Option<String>,
    ) -> Result<Option<Chapter>> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let Some(book) = data.books.iter_mut().find(|b| b.id == book_id) else {
            return Ok(None);
        };
        let Some(chapter) = book.chapters.iter_mut().find(|c| c.id == chapter_id) else {
            return Ok(None);
        };

        if let Some(title) = title {
            chapter.title = title;
        }
        if let Some(content) = content {
            chapter.content = content;
        }
        chapter.updated_at = Utc::now();
        book.updated_at = chapter.updated_at;

        let updated = chapter.clone();
        self.save(user, &data).await?;
        Ok(Some(updated))
    }

    /// Removes a chapter and renumbers the remainder so orders stay unique
    /// and contiguous starting at 1.
    pub async fn delete_chapter(&self, user: &str, book_id: &str, chapter_id: &str) -> Result<bool> {
        let lock = self.user_lock(user);
        let _guard = lock.lock().await;
        let mut data = self.load(user).await;
        let Some(book) = data.books.iter_mut().find(|b| b.id == book_id) else {
            return Ok(false);
        };

        let before = book.chapters.len();
        book.chapters.retain(|c| c.id != chapter_id);
        if book.chapters.len() == before {
            return Ok(false);
        }

        book.chapters.sort_by_key(|c| c.order);
        for (index, chapter) in book.chapters.iter_mut().enumerate() {
            chapter.order = index as u32 + 1;
        }
        book.updated_at = Utc::now();

        self.save(user, &data).await?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn library() -> (tempfile::TempDir, Library) {
        let dir = tempdir().unwrap();
        let library = Library::new(dir.path()).unwrap();
        (dir, library)
    }

    #[tokio::test]
    async fn projects_round_trip_per_user() {
        let (_dir, lib) = library();
        let created = lib.create_project("alpha", "Draft").await.unwrap();

        let listed = lib.list_projects("alpha").await;
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, created.id);
        // A different user sees nothing.
        assert!(lib.list_projects("beta").await.is_empty());
    }

    #[tokio::test]
    async fn updating_content_refreshes_memory_context() {
        let (_dir, lib) = library();
        let project = lib.create_project("alpha", "Draft").await.unwrap();
        lib.update_project("alpha", &project.id, None, Some("New body".to_string()))
            .await
            .unwrap();

        assert_eq!(lib.project_context("alpha", &project.id).await, "New body");
    }

    #[tokio::test]
    async fn deleting_a_project_drops_its_memory() {
        let (_dir, lib) = library();
        let project = lib.create_project("alpha", "Draft").await.unwrap();
        lib.record_conversation("alpha", &project.id, "Q", "A", 10, 0.01)
            .await
            .unwrap();

        assert!(lib.delete_project("alpha", &project.id).await.unwrap());
        assert!(lib.list_projects("alpha").await.is_empty());
        assert!(lib.project_context("alpha", &project.id).await.is_empty());
    }

    #[tokio::test]
    async fn conversations_are_capped_fifo() {
        let (_dir, lib) = library();
        let project = lib.create_project("alpha", "Draft").await.unwrap();
        for i in 0..55 {
            lib.record_conversation("alpha", &project.id, &format!("q{i}"), "a", 1, 0.0)
                .await
                .unwrap();
        }

        let history = lib.conversation_history("alpha", &project.id, 100).await;
        assert_eq!(history.len(), 50);
        assert_eq!(history[0].prompt, "q5");
        assert_eq!(history[49].prompt, "q54");
    }

    #[tokio::test]
    async fn context_uses_the_last_five_exchanges() {
        let (_dir, lib) = library();
        let project = lib.create_project("alpha", "Draft").await.unwrap();
        for i in 0..7 {
            lib.record_conversation("alpha", &project.id, &format!("q{i}"), &format!("a{i}"), 1, 0.0)
                .await
                .unwrap();
        }

        let context = lib.project_context("alpha", &project.id).await;
        assert!(context.contains("Q: q2"));
        assert!(context.contains("Q: q6"));
        assert!(!context.contains("Q: q1"));
    }

    #[tokio::test]
    async fn chapter_orders_stay_contiguous_after_delete() {
        let (_dir, lib) = library();
        let book = lib.create_book("alpha", "Novel", None).await.unwrap();
        let c1 = lib.add_chapter("alpha", &book.id, "One", "x").await.unwrap().unwrap();
        let c2 = lib.add_chapter("alpha", &book.id, "Two", "y").await.unwrap().unwrap();
        let c3 = lib.add_chapter("alpha", &book.id, "Three", "z").await.unwrap().unwrap();
        assert_eq!((c1.order, c2.order, c3.order), (1, 2, 3));

        assert!(lib.delete_chapter("alpha", &book.id, &c2.id).await.unwrap());
        let chapters = lib.list_books("alpha").await[0].chapters.clone();
        let orders: Vec<u32> = chapters.iter().map(|c| c.order).collect();
        assert_eq!(orders, vec![1, 2]);
        assert_eq!(chapters[1].title, "Three");
    }

    #[tokio::test]
    async fn corrupt_blob_resets_to_empty_state() {
        let (dir, lib) = library();
        lib.create_project("alpha", "Draft").await.unwrap();
        std::fs::write(dir.path().join("alpha.json"), "{not json").unwrap();

        assert!(lib.list_projects("alpha").await.is_empty());
        // And the store remains usable afterwards.
        lib.create_project("alpha", "Recovered").await.unwrap();
        assert_eq!(lib.list_projects("alpha").await.len(), 1);
    }

    #[tokio::test]
    async fn credit_usage_accumulates() {
        let (_dir, lib) = library();
        lib.add_credit_usage("alpha", 100, 0.5).await.unwrap();
        lib.add_credit_usage("alpha", 200, 0.25).await.unwrap();

        let summary = lib.credit_summary("alpha").await;
        assert_eq!(summary.credit_usage.len(), 2);
        assert!((summary.total_credits_used - 0.75).abs() < f64::EPSILON);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_lose_no_updates() {
        let (_dir, lib) = library();
        let lib = Arc::new(lib);

        let mut handles = Vec::new();
        for _ in 0..4 {
            let lib = Arc::clone(&lib);
            handles.push(tokio::spawn(async move {
                for _ in 0..25 {
                    lib.add_credit_usage("alpha", 10, 0.01).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let summary = lib.credit_summary("alpha").await;
        assert_eq!(summary.credit_usage.len(), 100);
        assert!((summary.total_credits_used - 1.0).abs() < 1e-9);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_conversations_all_survive() {
        let (_dir, lib) = library();
        let lib = Arc::new(lib);
        let project = lib.create_project("alpha", "Draft").await.unwrap();

        let mut handles = Vec::new();
        for task in 0..4 {
            let lib = Arc::clone(&lib);
            let project_id = project.id.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..10 {
                    lib.record_conversation(
                        "alpha",
                        &project_id,
                        &format!("q{task}-{i}"),
                        "a",
                        1,
                        0.0,
                    )
                    .await
                    .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let history = lib.conversation_history("alpha", &project.id, 100).await;
        assert_eq!(history.len(), 40);
    }
}
