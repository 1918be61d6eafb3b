//! Export rendering: a deterministic function of the job's type, format and
//! filters over the owner's domain rows.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use gradelens_core::{DomainError, ExportFormat, ExportJob, ExportType, Filters, OwnerId};

/// One exported record.
pub type Row = BTreeMap<String, Value>;

/// Reserved filter key: truncate to the first N matching rows.
pub const LIMIT_FILTER: &str = "limit";

const PDF_LINES_PER_PAGE: usize = 50;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("data source failed: {0}")]
    Source(String),
    #[error("invalid filter {key:?}: {reason}")]
    InvalidFilter { key: String, reason: String },
    #[error("artifact storage failed: {0}")]
    Artifact(#[from] crate::artifacts::ArtifactError),
}

impl From<ExportError> for DomainError {
    fn from(err: ExportError) -> Self {
        DomainError::upstream(err.to_string())
    }
}

/// Source of the domain data an export extracts (students, assessments, ...).
#[async_trait]
pub trait DomainDataSource: Send + Sync {
    async fn rows(&self, owner_id: OwnerId, export_type: ExportType)
    -> Result<Vec<Row>, ExportError>;
}

/// In-memory data source for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryDataSource {
    rows: RwLock<HashMap<(OwnerId, ExportType), Vec<Row>>>,
}

impl InMemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_rows(&self, owner_id: OwnerId, export_type: ExportType, rows: Vec<Row>) {
        if let Ok(mut map) = self.rows.write() {
            map.entry((owner_id, export_type)).or_default().extend(rows);
        }
    }
}

#[async_trait]
impl DomainDataSource for InMemoryDataSource {
    async fn rows(
        &self,
        owner_id: OwnerId,
        export_type: ExportType,
    ) -> Result<Vec<Row>, ExportError> {
        let map = self
            .rows
            .read()
            .map_err(|_| ExportError::Source("data source lock poisoned".to_string()))?;
        Ok(map.get(&(owner_id, export_type)).cloned().unwrap_or_default())
    }
}

/// Turns a job into artifact bytes.
#[derive(Clone)]
pub struct Exporter {
    source: Arc<dyn DomainDataSource>,
}

impl Exporter {
    pub fn new(source: Arc<dyn DomainDataSource>) -> Self {
        Self { source }
    }

    pub async fn render(&self, job: &ExportJob, now: DateTime<Utc>) -> Result<Vec<u8>, ExportError> {
        let rows = self.source.rows(job.owner_id, job.export_type).await?;
        let rows = apply_filters(rows, &job.filters)?;

        Ok(match job.format {
            ExportFormat::Csv => render_csv(&rows).into_bytes(),
            ExportFormat::Pdf => render_pdf(job.export_type, &rows, now),
        })
    }
}

impl core::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Exporter").finish_non_exhaustive()
    }
}

/// Exact-match filtering on row fields. An array filter value also matches a
/// field equal to any one of its elements. `limit` truncates after filtering.
pub fn apply_filters(rows: Vec<Row>, filters: &Filters) -> Result<Vec<Row>, ExportError> {
    let mut limit = None;
    let mut predicates = Vec::new();

    for (key, value) in filters {
        if key == LIMIT_FILTER {
            let n = value.as_u64().ok_or_else(|| ExportError::InvalidFilter {
                key: key.clone(),
                reason: "expected a non-negative integer".to_string(),
            })?;
            limit = Some(n as usize);
        } else {
            predicates.push((key, value));
        }
    }

    let mut out: Vec<Row> = rows
        .into_iter()
        .filter(|row| {
            predicates.iter().all(|(key, wanted)| match (row.get(*key), wanted) {
                (Some(actual), _) if actual == *wanted => true,
                (Some(actual), Value::Array(options)) => options.contains(actual),
                _ => false,
            })
        })
        .collect();

    if let Some(n) = limit {
        out.truncate(n);
    }
    Ok(out)
}

fn cell_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn csv_quote(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// CSV with a header of the sorted union of all row keys.
pub fn render_csv(rows: &[Row]) -> String {
    let columns: BTreeSet<&str> = rows
        .iter()
        .flat_map(|r| r.keys().map(String::as_str))
        .collect();

    let mut csv = columns
        .iter()
        .map(|c| csv_quote(c))
        .collect::<Vec<_>>()
        .join(",");
    csv.push('\n');

    for row in rows {
        let line = columns
            .iter()
            .map(|c| row.get(*c).map(cell_text).unwrap_or_default())
            .map(|cell| csv_quote(&cell))
            .collect::<Vec<_>>()
            .join(",");
        csv.push_str(&line);
        csv.push('\n');
    }
    csv
}

fn pdf_escape(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    for ch in line.chars() {
        match ch {
            '(' | ')' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            c if c.is_ascii() && !c.is_ascii_control() => out.push(c),
            _ => out.push('?'),
        }
    }
    out
}

/// A plain text report as a minimal PDF 1.4 document (Helvetica, Letter).
pub fn render_pdf(export_type: ExportType, rows: &[Row], now: DateTime<Utc>) -> Vec<u8> {
    let mut lines = vec![
        format!("{} export", export_type.label()),
        format!("Generated {}", now.format("%Y-%m-%d %H:%M UTC")),
        format!("{} record(s)", rows.len()),
        String::new(),
    ];
    lines.extend(rows.iter().map(|row| {
        row.iter()
            .map(|(k, v)| format!("{k}: {}", cell_text(v)))
            .collect::<Vec<_>>()
            .join(" | ")
    }));

    let pages: Vec<&[String]> = lines.chunks(PDF_LINES_PER_PAGE).collect();
    let page_count = pages.len();

    // 1: catalog, 2: page tree, 3: font, then (page, content) pairs.
    let mut objects = Vec::with_capacity(3 + page_count * 2);
    objects.push("<< /Type /Catalog /Pages 2 0 R >>".to_string());
    let kids = (0..page_count)
        .map(|i| format!("{} 0 R", 4 + i * 2))
        .collect::<Vec<_>>()
        .join(" ");
    objects.push(format!(
        "<< /Type /Pages /Kids [{kids}] /Count {page_count} >>"
    ));
    objects.push("<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica >>".to_string());

    for (i, page_lines) in pages.iter().enumerate() {
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 3 0 R >> >> /Contents {} 0 R >>",
            5 + i * 2
        ));
        let mut stream = String::from("BT\n/F1 10 Tf\n14 TL\n50 750 Td\n");
        for line in page_lines.iter() {
            stream.push_str(&format!("({}) Tj T*\n", pdf_escape(line)));
        }
        stream.push_str("ET");
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{offset:010} 00000 n \n"));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));
    out.into_bytes()
}
