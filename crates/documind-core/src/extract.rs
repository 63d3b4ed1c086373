//! Text extraction from uploaded documents.
//!
//! PDFs (detected by the `%PDF-` magic) are read page by page with
//! `pdf-extract`; everything else is decoded as UTF-8, lossily, and split into
//! pages on form feeds. A page that fails to parse counts as an empty page, a
//! document that fails to load contributes nothing; extraction of a batch
//! never fails.

use std::panic::{self, AssertUnwindSafe};

use tracing::{debug, warn};

use crate::types::Document;

const PDF_MAGIC: &[u8] = b"%PDF-";
const PAGE_BREAK: char = '\x0C';
const PAGE_SEPARATOR: &str = "\n";
const DOCUMENT_SEPARATOR: &str = "\n\n";

/// All text recovered from one ingestion batch.
#[derive(Debug, Clone, Default)]
pub struct ExtractedText {
    pub text: String,
    pub pages: usize,
    pub empty_pages: usize,
}

impl ExtractedText {
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    pub fn extract(&self, documents: &[Document]) -> ExtractedText {
        let mut out = ExtractedText::default();
        let mut doc_texts = Vec::with_capacity(documents.len());
        for doc in documents {
            let pages = self.pages_of(doc);
            let mut kept = Vec::with_capacity(pages.len());
            for page in &pages {
                out.pages += 1;
                if page.trim().is_empty() {
                    out.empty_pages += 1;
                } else {
                    kept.push(page.as_str());
                }
            }
            debug!(document = %doc.name, pages = pages.len(), kept = kept.len(), "extracted document");
            if !kept.is_empty() {
                doc_texts.push(kept.join(PAGE_SEPARATOR));
            }
        }
        out.text = doc_texts.join(DOCUMENT_SEPARATOR);
        out
    }

    fn pages_of(&self, doc: &Document) -> Vec<String> {
        if doc.bytes.starts_with(PDF_MAGIC) {
            return pdf_pages(doc);
        }
        let raw = String::from_utf8_lossy(&doc.bytes);
        if raw.is_empty() {
            return Vec::new();
        }
        let mut pages: Vec<String> = raw.split(PAGE_BREAK).map(str::to_string).collect();
        // A trailing form feed closes the last page rather than opening a new one.
        if pages.len() > 1 && pages.last().is_some_and(|p| p.trim().is_empty()) {
            pages.pop();
        }
        pages
    }
}

fn pdf_pages(doc: &Document) -> Vec<String> {
    let loaded = panic::catch_unwind(AssertUnwindSafe(|| pdf_extract::Document::load_mem(&doc.bytes)));
    let mut pdf = match loaded {
        Ok(Ok(pdf)) => pdf,
        Ok(Err(e)) => {
            warn!(document = %doc.name, error = %e, "unreadable PDF; document contributes no text");
            return Vec::new();
        }
        Err(_) => {
            warn!(document = %doc.name, "PDF parser panicked while loading; document contributes no text");
            return Vec::new();
        }
    };
    if pdf.is_encrypted() {
        if let Err(e) = pdf.decrypt("") {
            warn!(document = %doc.name, error = %e, "encrypted PDF; document contributes no text");
            return Vec::new();
        }
    }
    pdf.get_pages()
        .into_keys()
        .map(|page_num| match pdf_page_text(&pdf, page_num) {
            Ok(text) => text.trim().to_string(),
            Err(reason) => {
                warn!(document = %doc.name, page = page_num, %reason, "page text extraction failed");
                String::new()
            }
        })
        .collect()
}

fn pdf_page_text(pdf: &pdf_extract::Document, page_num: u32) -> Result<String, String> {
    let mut text = String::new();
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
        let mut output = pdf_extract::PlainTextOutput::new(&mut text);
        pdf_extract::output_doc_page(pdf, &mut output, page_num)
    }));
    match outcome {
        Ok(Ok(())) => Ok(text),
        Ok(Err(e)) => Err(e.to_string()),
        Err(_) => Err("PDF parser panicked".to_string()),
    }
}
