//! SQLite-backed content store.
//!
//! Tables are created on connect. Every translation write runs in its own
//! transaction so content, fingerprint and the manual-edit flag always change
//! together.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::models::{
    Language, NewPost, Post, PostStatus, TranslatableFields, Translation, TranslationWrite,
    UpsertOutcome, WriteGuard,
};
use crate::store::ContentStore;

const SCHEMA: [&str; 4] = [
    "CREATE TABLE IF NOT EXISTS languages (
        code TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        is_active INTEGER NOT NULL DEFAULT 1,
        is_default INTEGER NOT NULL DEFAULT 0,
        is_rtl INTEGER NOT NULL DEFAULT 0
    )",
    "CREATE UNIQUE INDEX IF NOT EXISTS idx_languages_single_default
        ON languages(is_default) WHERE is_default = 1",
    "CREATE TABLE IF NOT EXISTS posts (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        status TEXT NOT NULL,
        featured_image TEXT,
        tags TEXT NOT NULL DEFAULT '[]'
    )",
    "CREATE TABLE IF NOT EXISTS translations (
        post_id INTEGER NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
        language_code TEXT NOT NULL REFERENCES languages(code),
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        excerpt TEXT,
        meta_title TEXT,
        meta_description TEXT,
        is_manually_edited INTEGER NOT NULL DEFAULT 0,
        source_fingerprint TEXT,
        updated_at TEXT NOT NULL,
        PRIMARY KEY (post_id, language_code)
    )",
];

const TRANSLATION_COLUMNS: &str = "post_id, language_code, title, content, excerpt, meta_title, \
     meta_description, is_manually_edited, source_fingerprint, updated_at";

#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect using a `sqlite://` URL, creating the file if needed.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?;
        Self::connect_with(options).await
    }

    /// Open (or create) a database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        Self::connect_with(SqliteConnectOptions::new().filename(path)).await
    }

    async fn connect_with(options: SqliteConnectOptions) -> Result<Self, StoreError> {
        let options = options
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("Content store schema ready");
        Ok(())
    }

    /// Insert or replace a language. Making one default clears the others.
    pub async fn upsert_language(&self, language: &Language) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        if language.is_default {
            sqlx::query("UPDATE languages SET is_default = 0 WHERE code <> ?1")
                .bind(&language.code)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "INSERT INTO languages (code, name, is_active, is_default, is_rtl)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(code) DO UPDATE SET
                name = excluded.name,
                is_active = excluded.is_active,
                is_default = excluded.is_default,
                is_rtl = excluded.is_rtl",
        )
        .bind(&language.code)
        .bind(&language.name)
        .bind(language.is_active)
        .bind(language.is_default)
        .bind(language.is_rtl)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn create_post(&self, post: &NewPost) -> Result<Post, StoreError> {
        let tags = serde_json::to_string(&post.tags)?;
        let result = sqlx::query(
            "INSERT INTO posts (slug, status, featured_image, tags) VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(&post.slug)
        .bind(post.status.as_str())
        .bind(&post.featured_image)
        .bind(&tags)
        .execute(&self.pool)
        .await?;

        Ok(Post {
            id: result.last_insert_rowid(),
            slug: post.slug.clone(),
            status: post.status,
            featured_image: post.featured_image.clone(),
            tags: post.tags.clone(),
        })
    }

    /// Delete a post; its translations go with it.
    pub async fn delete_post(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM posts WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Record a human edit; the row is protected from non-forced runs.
    pub async fn save_manual_translation(
        &self,
        post_id: i64,
        language_code: &str,
        fields: &TranslatableFields,
    ) -> Result<Translation, StoreError> {
        sqlx::query(
            "INSERT INTO translations (post_id, language_code, title, content, excerpt,
                meta_title, meta_description, is_manually_edited, source_fingerprint, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 1, NULL, ?8)
             ON CONFLICT(post_id, language_code) DO UPDATE SET
                title = excluded.title,
                content = excluded.content,
                excerpt = excluded.excerpt,
                meta_title = excluded.meta_title,
                meta_description = excluded.meta_description,
                is_manually_edited = 1,
                updated_at = excluded.updated_at",
        )
        .bind(post_id)
        .bind(language_code)
        .bind(&fields.title)
        .bind(&fields.content)
        .bind(&fields.excerpt)
        .bind(&fields.meta_title)
        .bind(&fields.meta_description)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        self.get_translation(post_id, language_code)
            .await?
            .ok_or_else(|| StoreError::NotFound {
                entity: "translation",
                key: format!("{}/{}", post_id, language_code),
            })
    }
}

fn post_from_row(row: &SqliteRow) -> Result<Post, StoreError> {
    let status: String = row.try_get("status")?;
    let tags: String = row.try_get("tags")?;
    Ok(Post {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        status: status.parse()?,
        featured_image: row.try_get("featured_image")?,
        tags: serde_json::from_str(&tags)?,
    })
}

fn language_from_row(row: &SqliteRow) -> Result<Language, StoreError> {
    Ok(Language {
        code: row.try_get("code")?,
        name: row.try_get("name")?,
        is_active: row.try_get("is_active")?,
        is_default: row.try_get("is_default")?,
        is_rtl: row.try_get("is_rtl")?,
    })
}

fn translation_from_row(row: &SqliteRow) -> Result<Translation, StoreError> {
    let updated_at: DateTime<Utc> = row.try_get("updated_at")?;
    Ok(Translation {
        post_id: row.try_get("post_id")?,
        language_code: row.try_get("language_code")?,
        fields: TranslatableFields {
            title: row.try_get("title")?,
            content: row.try_get("content")?,
            excerpt: row.try_get("excerpt")?,
            meta_title: row.try_get("meta_title")?,
            meta_description: row.try_get("meta_description")?,
        },
        is_manually_edited: row.try_get("is_manually_edited")?,
        source_fingerprint: row.try_get("source_fingerprint")?,
        updated_at,
    })
}

#[async_trait]
impl ContentStore for SqliteStore {
    async fn get_post(&self, id: i64) -> Result<Option<Post>, StoreError> {
        let row = sqlx::query("SELECT id, slug, status, featured_image, tags FROM posts WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(post_from_row).transpose()
    }

    async fn list_posts(&self) -> Result<Vec<Post>, StoreError> {
        let rows = sqlx::query("SELECT id, slug, status, featured_image, tags FROM posts ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(post_from_row).collect()
    }

    async fn list_languages(&self, active_only: bool) -> Result<Vec<Language>, StoreError> {
        let rows = sqlx::query(
            "SELECT code, name, is_active, is_default, is_rtl FROM languages
             WHERE ?1 = 0 OR is_active = 1
             ORDER BY code",
        )
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(language_from_row).collect()
    }

    async fn get_translation(
        &self,
        post_id: i64,
        language_code: &str,
    ) -> Result<Option<Translation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM translations WHERE post_id = ?1 AND language_code = ?2",
            TRANSLATION_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(post_id)
            .bind(language_code)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(translation_from_row).transpose()
    }

    async fn list_translations(&self, post_id: i64) -> Result<Vec<Translation>, StoreError> {
        let sql = format!(
            "SELECT {} FROM translations WHERE post_id = ?1 ORDER BY language_code",
            TRANSLATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(post_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(translation_from_row).collect()
    }

    async fn upsert_translation(
        &self,
        write: &TranslationWrite,
        guard: WriteGuard,
    ) -> Result<UpsertOutcome, StoreError> {
        let now = Utc::now();
        let force = guard == WriteGuard::Force;
        let mut tx = self.pool.begin().await?;

        // Write first so the transaction takes the write lock up front
        let updated = sqlx::query(
            "UPDATE translations SET
                title = ?3,
                content = ?4,
                excerpt = ?5,
                meta_title = ?6,
                meta_description = ?7,
                is_manually_edited = 0,
                source_fingerprint = ?8,
                updated_at = ?9
             WHERE post_id = ?1 AND language_code = ?2
               AND (?10 = 1 OR is_manually_edited = 0)",
        )
        .bind(write.post_id)
        .bind(&write.language_code)
        .bind(&write.fields.title)
        .bind(&write.fields.content)
        .bind(&write.fields.excerpt)
        .bind(&write.fields.meta_title)
        .bind(&write.fields.meta_description)
        .bind(&write.source_fingerprint)
        .bind(now)
        .bind(force)
        .execute(&mut *tx)
        .await?;

        if updated.rows_affected() > 0 {
            tx.commit().await?;
            return Ok(UpsertOutcome::Updated);
        }

        let exists: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM translations WHERE post_id = ?1 AND language_code = ?2",
        )
        .bind(write.post_id)
        .bind(&write.language_code)
        .fetch_one(&mut *tx)
        .await?;

        if exists > 0 {
            tx.rollback().await?;
            debug!(
                post_id = write.post_id,
                lang = %write.language_code,
                "Row was edited by a human, write refused"
            );
            return Ok(UpsertOutcome::Preserved);
        }

        sqlx::query(
            "INSERT INTO translations (post_id, language_code, title, content, excerpt,
                meta_title, meta_description, is_manually_edited, source_fingerprint, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 0, ?8, ?9)",
        )
        .bind(write.post_id)
        .bind(&write.language_code)
        .bind(&write.fields.title)
        .bind(&write.fields.content)
        .bind(&write.fields.excerpt)
        .bind(&write.fields.meta_title)
        .bind(&write.fields.meta_description)
        .bind(&write.source_fingerprint)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(UpsertOutcome::Created)
    }
}
