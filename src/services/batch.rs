use anyhow::Result;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{ExtractionFailure, ReviewError};
use crate::models::{DocumentStatus, ExtractedFields, SourceFile};
use crate::services::preview::PreviewHandle;
use crate::utils::{is_pdf, sha256_bytes};

/// One uploaded file under review.
#[derive(Debug)]
pub struct ReviewDocument {
    pub id: String,
    pub source: SourceFile,
    pub preview: PreviewHandle,
    pub file_hash: String,
    /// Fields as the extractor returned them; `None` if extraction failed.
    pub extracted: Option<ExtractedFields>,
    /// Operator-edited copy of `extracted`. This is what gets submitted.
    pub edited: Option<ExtractedFields>,
    pub status: DocumentStatus,
    pub error: Option<String>,
}

impl ReviewDocument {
    fn from_source(source: SourceFile) -> Result<Self> {
        let id = uuid::Uuid::new_v4().to_string();
        let file_hash = sha256_bytes(&source.bytes);
        let preview = PreviewHandle::acquire(&id, &source.bytes)?;
        Ok(ReviewDocument {
            id,
            source,
            preview,
            file_hash,
            extracted: None,
            edited: None,
            status: DocumentStatus::Pending,
            error: None,
        })
    }

    pub fn is_ready(&self) -> bool {
        self.status == DocumentStatus::Ready
    }

    /// Edited value of `field` as a non-empty string, if present.
    pub fn edited_field_str(&self, field: &str) -> Option<String> {
        let value = self.edited.as_ref()?.get(field)?;
        let text = match value {
            Value::String(text) => text.trim().to_string(),
            Value::Number(number) => number.to_string(),
            _ => return None,
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// Ordered set of documents under review plus the focused index.
///
/// Invariant: `focused` is a valid index whenever the batch is non-empty.
#[derive(Debug, Default)]
pub struct DocumentBatch {
    documents: Vec<ReviewDocument>,
    focused: usize,
}

impl DocumentBatch {
    pub fn new() -> Self {
        DocumentBatch::default()
    }

    /// Reads the given paths and adds every accepted PDF to the batch.
    /// Returns the ids of the documents created.
    pub fn add_files(&mut self, paths: &[PathBuf]) -> Result<Vec<String>, ReviewError> {
        let mut sources = Vec::new();
        for path in paths.iter().filter(|path| is_pdf(path)) {
            match std::fs::read(path) {
                Ok(bytes) => sources.push(SourceFile::new(file_name_of(path), bytes)),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable file");
                }
            }
        }
        self.add_sources(sources)
    }

    /// Adds in-memory files (hosts that already hold the dropped payloads).
    /// Non-PDF names are filtered out; a file whose content hash already sits
    /// in the batch is skipped.
    pub fn add_sources(&mut self, sources: Vec<SourceFile>) -> Result<Vec<String>, ReviewError> {
        let accepted: Vec<SourceFile> = sources
            .into_iter()
            .filter(|source| is_pdf(Path::new(&source.name)))
            .collect();
        if accepted.is_empty() {
            return Err(ReviewError::NoAcceptedFiles);
        }

        let mut added = Vec::new();
        for source in accepted {
            let hash = sha256_bytes(&source.bytes);
            if self.documents.iter().any(|doc| doc.file_hash == hash) {
                debug!(name = %source.name, "skipping file already in the batch");
                continue;
            }
            match ReviewDocument::from_source(source) {
                Ok(document) => {
                    added.push(document.id.clone());
                    self.documents.push(document);
                }
                Err(err) => {
                    warn!(%err, "could not stage document for review");
                }
            }
        }
        Ok(added)
    }

    /// Replaces one entry in a document's edited data. No-op if the id is
    /// unknown or the document has nothing editable.
    pub fn update_field(&mut self, document_id: &str, field: &str, value: Value) {
        let Some(document) = self
            .documents
            .iter_mut()
            .find(|doc| doc.id == document_id)
        else {
            return;
        };
        if let Some(edited) = document.edited.as_mut() {
            edited.insert(field.to_string(), value);
        }
    }

    /// Removes a document, releasing its preview. Returns false if the id is
    /// unknown (a second remove of the same id is a no-op). Focus moves to
    /// the previous valid index when the removed document was focused.
    pub fn remove(&mut self, document_id: &str) -> bool {
        let Some(index) = self.documents.iter().position(|doc| doc.id == document_id) else {
            return false;
        };
        let mut document = self.documents.remove(index);
        document.preview.release();
        if self.documents.is_empty() {
            self.focused = 0;
        } else if self.focused >= self.documents.len() {
            self.focused = self.documents.len() - 1;
        }
        true
    }

    /// Releases every preview and empties the batch.
    pub fn clear(&mut self) {
        for document in &mut self.documents {
            document.preview.release();
        }
        self.documents.clear();
        self.focused = 0;
    }

    pub fn focused_index(&self) -> usize {
        self.focused
    }

    pub fn set_focus(&mut self, index: usize) {
        if index < self.documents.len() {
            self.focused = index;
        }
    }

    pub fn focused_document(&self) -> Option<&ReviewDocument> {
        self.documents.get(self.focused)
    }

    pub fn get(&self, document_id: &str) -> Option<&ReviewDocument> {
        self.documents.iter().find(|doc| doc.id == document_id)
    }

    pub fn find_by_file_name(&self, name: &str) -> Option<&ReviewDocument> {
        self.documents.iter().find(|doc| doc.source.name == name)
    }

    pub fn documents(&self) -> &[ReviewDocument] {
        &self.documents
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn ready_count(&self) -> usize {
        self.documents.iter().filter(|doc| doc.is_ready()).count()
    }

    /// Source files of every `Ready` document, in batch order.
    pub fn ready_sources(&self) -> Vec<SourceFile> {
        self.documents
            .iter()
            .filter(|doc| doc.is_ready())
            .map(|doc| doc.source.clone())
            .collect()
    }

    pub(crate) fn mark_extracting(&mut self, ids: &[String]) {
        for document in &mut self.documents {
            if ids.contains(&document.id) {
                document.status = DocumentStatus::Extracting;
            }
        }
    }

    pub(crate) fn apply_extraction(
        &mut self,
        document_id: &str,
        outcome: Result<ExtractedFields, ExtractionFailure>,
    ) {
        let Some(document) = self
            .documents
            .iter_mut()
            .find(|doc| doc.id == document_id)
        else {
            return;
        };
        match outcome {
            Ok(fields) => {
                document.edited = Some(fields.clone());
                document.extracted = Some(fields);
                document.status = DocumentStatus::Ready;
                document.error = None;
            }
            Err(failure) => {
                document.extracted = None;
                document.edited = None;
                document.status = DocumentStatus::ExtractionFailed;
                document.error = Some(failure.reason);
            }
        }
    }
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string())
}
