//! Ingestion pipeline orchestration.
//!
//! Coordinates the full load flow for course documents: parse → catalog
//! upsert → chunk → embed → store. A malformed document fails only itself;
//! the rest of the batch proceeds.

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use walkdir::WalkDir;

use crate::chunk::chunk_document;
use crate::config::Config;
use crate::document::parse_course_document;
use crate::store::RetrievalStore;

/// Counters reported after an ingestion run.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub courses_added: u64,
    pub chunks_written: u64,
    pub skipped: u64,
    pub failed: u64,
}

/// Ingest a single course document or a folder of them.
///
/// Folder mode picks up `.txt` files, skips course titles already present
/// in the catalog, and optionally clears all existing data first.
pub async fn run_ingest(
    config: &Config,
    store: &RetrievalStore,
    path: &Path,
    clear_existing: bool,
) -> Result<IngestReport> {
    if clear_existing {
        println!("Clearing existing data for fresh rebuild...");
        store.clear_all().await?;
    }

    let mut existing: HashSet<String> = store
        .existing_course_titles()
        .await?
        .into_iter()
        .collect();

    let mut report = IngestReport::default();

    if path.is_file() {
        ingest_file(config, store, path, &mut existing, &mut report).await;
    } else if path.is_dir() {
        let mut files: Vec<_> = WalkDir::new(path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| {
                entry.file_type().is_file()
                    && entry
                        .path()
                        .extension()
                        .map(|ext| ext.eq_ignore_ascii_case("txt"))
                        .unwrap_or(false)
            })
            .map(|entry| entry.into_path())
            .collect();
        files.sort();

        for file in files {
            ingest_file(config, store, &file, &mut existing, &mut report).await;
        }
    } else {
        anyhow::bail!("Path does not exist: {}", path.display());
    }

    println!("ingest {}", path.display());
    println!("  courses added: {}", report.courses_added);
    println!("  chunks written: {}", report.chunks_written);
    println!("  skipped (already present): {}", report.skipped);
    println!("  failed: {}", report.failed);
    println!("ok");

    Ok(report)
}

/// Process one document. Failures are counted and printed, not propagated,
/// so one bad file cannot abort a batch load.
async fn ingest_file(
    config: &Config,
    store: &RetrievalStore,
    path: &Path,
    existing: &mut HashSet<String>,
    report: &mut IngestReport,
) {
    match load_one(config, store, path, existing).await {
        Ok(Some((title, chunk_count))) => {
            println!("Added course: {} ({} chunks)", title, chunk_count);
            report.courses_added += 1;
            report.chunks_written += chunk_count;
        }
        Ok(None) => {
            report.skipped += 1;
        }
        Err(e) => {
            eprintln!("Error processing {}: {:#}", path.display(), e);
            report.failed += 1;
        }
    }
}

async fn load_one(
    config: &Config,
    store: &RetrievalStore,
    path: &Path,
    existing: &mut HashSet<String>,
) -> Result<Option<(String, u64)>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let doc = parse_course_document(&text)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if existing.contains(&doc.course.title) {
        println!("Course already exists: {} - skipping", doc.course.title);
        return Ok(None);
    }

    let chunks = chunk_document(
        &doc,
        config.chunking.chunk_size,
        config.chunking.chunk_overlap,
    );

    store.upsert_course(&doc.course).await?;
    let written = store.embed_and_store(&chunks).await?;

    existing.insert(doc.course.title.clone());
    Ok(Some((doc.course.title.clone(), written)))
}
