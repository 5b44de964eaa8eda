//! The retrieval store: course catalog plus embedded chunk index.
//!
//! Two kinds of data live side by side in SQLite:
//!
//! - **catalog metadata** (`courses`): one row per course keyed by title,
//!   with the lesson list serialized as JSON;
//! - **content** (`chunks` + `chunk_vectors`): embedded text chunks used for
//!   similarity search.
//!
//! Search failures never propagate: any store or embedding error during a
//! search is absorbed into [`SearchOutcome::Failed`] so one bad query cannot
//! abort the orchestration pipeline. Catalog lookups degrade to `None` on
//! missing courses, missing lessons, and malformed stored metadata.
//!
//! Reads may run concurrently; ingestion writes serialize behind an internal
//! mutex so a reader never observes a partially loaded document.

use anyhow::Result;
use sqlx::{Row, SqlitePool};

use crate::config::Config;
use crate::db;
use crate::embedding::{self, EmbeddingProvider};
use crate::fuzzy;
use crate::migrate;
use crate::models::{Course, CourseAnalytics, CourseChunk, Lesson, SearchHit, SearchOutcome};

pub struct RetrievalStore {
    pool: SqlitePool,
    provider: Box<dyn EmbeddingProvider>,
    max_results: i64,
    batch_size: usize,
    write_lock: tokio::sync::Mutex<()>,
}

impl RetrievalStore {
    /// Open (and if necessary create) the store described by the config.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(&config.db.path).await?;
        migrate::apply_schema(&pool).await?;
        let provider = embedding::create_provider(&config.embedding)?;

        Ok(Self {
            pool,
            provider,
            max_results: config.retrieval.max_results,
            batch_size: config.embedding.batch_size.max(1),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    /// The underlying connection pool (analytics and tests).
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert or replace a course's catalog entry, keyed by title.
    pub async fn upsert_course(&self, course: &Course) -> Result<()> {
        let lessons_json = serde_json::to_string(&course.lessons)?;
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO courses (title, link, instructor, lessons_json, ingested_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(title) DO UPDATE SET
                link = excluded.link,
                instructor = excluded.instructor,
                lessons_json = excluded.lessons_json
            "#,
        )
        .bind(&course.title)
        .bind(&course.course_link)
        .bind(&course.instructor)
        .bind(&lessons_json)
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Embed chunk contents and persist chunks + vectors transactionally.
    ///
    /// Existing chunks for the same course are replaced, so re-ingesting a
    /// document is idempotent. Returns the number of chunks written.
    pub async fn embed_and_store(&self, chunks: &[CourseChunk]) -> Result<u64> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let _guard = self.write_lock.lock().await;

        let mut vectors = Vec::with_capacity(chunks.len());
        for batch in chunks.chunks(self.batch_size) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            vectors.extend(self.provider.embed(&texts).await?);
        }

        let mut tx = self.pool.begin().await?;

        let titles: std::collections::BTreeSet<&str> =
            chunks.iter().map(|c| c.course_title.as_str()).collect();
        for title in titles {
            sqlx::query(
                "DELETE FROM chunk_vectors WHERE chunk_id IN \
                 (SELECT id FROM chunks WHERE course_title = ?)",
            )
            .bind(title)
            .execute(&mut *tx)
            .await?;
            sqlx::query("DELETE FROM chunks WHERE course_title = ?")
                .bind(title)
                .execute(&mut *tx)
                .await?;
        }

        for (chunk, vector) in chunks.iter().zip(vectors.iter()) {
            let id = chunk.id();
            sqlx::query(
                "INSERT INTO chunks (id, course_title, lesson_number, chunk_index, content) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&id)
            .bind(&chunk.course_title)
            .bind(chunk.lesson_number.map(|n| n as i64))
            .bind(chunk.chunk_index)
            .bind(&chunk.content)
            .execute(&mut *tx)
            .await?;

            sqlx::query("INSERT INTO chunk_vectors (chunk_id, embedding) VALUES (?, ?)")
                .bind(&id)
                .bind(embedding::vec_to_blob(vector))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(chunks.len() as u64)
    }

    /// Similarity search over chunk embeddings, with optional filters.
    ///
    /// `course_name` is resolved by fuzzy match against the catalog before
    /// filtering; an unresolvable name yields `CourseNotFound`, which is
    /// distinct from a resolved filter that matched zero chunks.
    pub async fn search(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<i64>,
    ) -> SearchOutcome {
        match self
            .search_inner(query, course_name, lesson_number, limit)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => SearchOutcome::Failed(format!("Search error: {}", e)),
        }
    }

    async fn search_inner(
        &self,
        query: &str,
        course_name: Option<&str>,
        lesson_number: Option<u32>,
        limit: Option<i64>,
    ) -> Result<SearchOutcome> {
        let resolved_title = match course_name {
            Some(name) => match self.resolve_course_name(name).await? {
                Some(title) => Some(title),
                None => return Ok(SearchOutcome::CourseNotFound(name.to_string())),
            },
            None => None,
        };

        let query_vec = self
            .provider
            .embed(&[query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("Empty embedding response"))?;

        let mut sql = String::from(
            "SELECT c.content, c.course_title, c.lesson_number, v.embedding \
             FROM chunks c JOIN chunk_vectors v ON v.chunk_id = c.id",
        );
        let mut conditions = Vec::new();
        if resolved_title.is_some() {
            conditions.push("c.course_title = ?");
        }
        if lesson_number.is_some() {
            conditions.push("c.lesson_number = ?");
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        let mut q = sqlx::query(&sql);
        if let Some(ref title) = resolved_title {
            q = q.bind(title);
        }
        if let Some(n) = lesson_number {
            q = q.bind(n as i64);
        }

        let rows = q.fetch_all(&self.pool).await?;

        let mut hits: Vec<SearchHit> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vec = embedding::blob_to_vec(&blob);
                let similarity = embedding::cosine_similarity(&query_vec, &vec) as f64;
                SearchHit {
                    content: row.get("content"),
                    course_title: row.get("course_title"),
                    lesson_number: row
                        .get::<Option<i64>, _>("lesson_number")
                        .map(|n| n as u32),
                    distance: 1.0 - similarity,
                }
            })
            .collect();

        // Ascending distance, then course/lesson for a deterministic order.
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.course_title.cmp(&b.course_title))
                .then_with(|| a.lesson_number.cmp(&b.lesson_number))
        });
        hits.truncate(limit.unwrap_or(self.max_results).max(0) as usize);

        Ok(SearchOutcome::Hits(hits))
    }

    /// Resolve a partial course name against the catalog.
    pub async fn resolve_course_name(&self, name: &str) -> Result<Option<String>> {
        let titles = self.existing_course_titles().await?;
        Ok(fuzzy::best_match(name, &titles).map(|t| t.to_string()))
    }

    /// Look up the link of one lesson.
    ///
    /// Never errors: a missing course, a missing lesson number, and
    /// malformed stored lesson metadata all degrade to `None`.
    pub async fn get_lesson_link(&self, course_title: &str, lesson_number: u32) -> Option<String> {
        let lessons_json: String =
            sqlx::query_scalar("SELECT lessons_json FROM courses WHERE title = ?")
                .bind(course_title)
                .fetch_optional(&self.pool)
                .await
                .ok()??;

        let lessons: Vec<Lesson> = serde_json::from_str(&lessons_json).ok()?;
        lessons
            .into_iter()
            .find(|l| l.lesson_number == lesson_number)?
            .lesson_link
    }

    /// Look up a course's own link; degrades to `None` like lesson links.
    pub async fn get_course_link(&self, course_title: &str) -> Option<String> {
        sqlx::query_scalar("SELECT link FROM courses WHERE title = ?")
            .bind(course_title)
            .fetch_optional(&self.pool)
            .await
            .ok()
            .flatten()
            .flatten()
    }

    /// All catalog titles, sorted for deterministic output.
    pub async fn existing_course_titles(&self) -> Result<Vec<String>> {
        let titles: Vec<String> = sqlx::query_scalar("SELECT title FROM courses ORDER BY title")
            .fetch_all(&self.pool)
            .await?;
        Ok(titles)
    }

    pub async fn course_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM courses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Catalog summary for the `courses` command.
    pub async fn analytics(&self) -> Result<CourseAnalytics> {
        Ok(CourseAnalytics {
            total_courses: self.course_count().await?,
            course_titles: self.existing_course_titles().await?,
        })
    }

    /// Wipe catalog and content for a fresh rebuild.
    pub async fn clear_all(&self) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM chunk_vectors").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM chunks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM courses").execute(&mut *tx).await?;
        tx.commit().await?;
        Ok(())
    }
}
