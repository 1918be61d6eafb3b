//! Line-oriented ingress for the worker binary.
//!
//! Submissions arrive as one JSON object per line:
//!
//! ```text
//! {"owner_id":"0190...","export_type":"student_data","export_format":"csv","filters":{"class":"7A"}}
//! ```
//!
//! Each line gets one JSON reply line (`accepted` with the persisted job, or
//! `rejected` with an error code). Domain rows for the in-memory data source
//! can be seeded from a JSON file of [`DataSet`]s.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use gradelens_core::{ExportJob, ExportType, OwnerId};
use gradelens_events::{EventBus, ExportEvent};

use crate::jobs::{ExportRequest, ExportService, InMemoryDataSource, Row};

#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionLine {
    pub owner_id: OwnerId,
    #[serde(flatten)]
    pub request: ExportRequest,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IngressReply {
    Accepted { line: usize, job: ExportJob },
    Rejected { line: usize, code: String, error: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngressStats {
    pub accepted: usize,
    pub rejected: usize,
}

/// Submit every line of `reader` until EOF, writing one reply per line.
///
/// Blank lines are skipped. Malformed lines and rejected submissions are
/// answered and counted; only I/O errors end the loop early.
pub async fn submit_lines<R, W, B>(
    reader: R,
    mut writer: W,
    service: &ExportService<B>,
) -> std::io::Result<IngressStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    B: EventBus<ExportEvent>,
{
    let mut stats = IngressStats::default();
    let mut lines = reader.lines();
    let mut line_no = 0;

    while let Some(raw) = lines.next_line().await? {
        line_no += 1;
        if raw.trim().is_empty() {
            continue;
        }

        let reply = match serde_json::from_str::<SubmissionLine>(&raw) {
            Ok(submission) => match service.submit(submission.owner_id, submission.request).await {
                Ok(job) => IngressReply::Accepted { line: line_no, job },
                Err(err) => IngressReply::Rejected {
                    line: line_no,
                    code: err.code().to_string(),
                    error: err.to_string(),
                },
            },
            Err(err) => IngressReply::Rejected {
                line: line_no,
                code: "invalid_json".to_string(),
                error: err.to_string(),
            },
        };

        match &reply {
            IngressReply::Accepted { .. } => stats.accepted += 1,
            IngressReply::Rejected { code, error, .. } => {
                warn!(line = line_no, code = %code, error = %error, "submission rejected");
                stats.rejected += 1;
            }
        }

        let mut out = serde_json::to_vec(&reply).map_err(std::io::Error::other)?;
        out.push(b'\n');
        writer.write_all(&out).await?;
        writer.flush().await?;
    }

    info!(accepted = stats.accepted, rejected = stats.rejected, "ingress reached end of input");
    Ok(stats)
}

/// Rows of one owner and export type.
#[derive(Debug, Clone, Deserialize)]
pub struct DataSet {
    pub owner_id: OwnerId,
    pub export_type: ExportType,
    #[serde(default)]
    pub rows: Vec<Row>,
}

/// Load a JSON array of data sets into `source`; returns the number of rows.
pub fn seed_data_source(source: &InMemoryDataSource, json: &str) -> serde_json::Result<usize> {
    let sets: Vec<DataSet> = serde_json::from_str(json)?;
    let mut total = 0;
    for set in sets {
        total += set.rows.len();
        source.insert_rows(set.owner_id, set.export_type, set.rows);
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::{Value, json};

    use super::*;
    use crate::artifacts::InMemoryArtifactStorage;
    use crate::jobs::{DomainDataSource, WorkerConfig};
    use crate::pipeline::Pipeline;
    use gradelens_core::ExportStatus;

    fn replies(out: &[u8]) -> Vec<Value> {
        String::from_utf8(out.to_vec())
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn each_line_gets_one_reply() {
        let pipeline = Pipeline::in_memory(
            Arc::new(InMemoryDataSource::new()),
            Arc::new(InMemoryArtifactStorage::new()),
        );
        let owner = OwnerId::new();
        let input = format!(
            "{}\n\n{}\nnot json\n{}\n",
            json!({"owner_id": owner, "export_type": "student_data", "export_format": "csv"}),
            json!({"owner_id": owner, "export_type": "class_summary", "export_format": "pdf",
                   "filters": {"class": "7A"}}),
            json!({"owner_id": owner, "export_type": "attendance", "export_format": "csv"}),
        );

        let mut out = Vec::new();
        let stats = submit_lines(input.as_bytes(), &mut out, &pipeline.service)
            .await
            .unwrap();
        assert_eq!(stats, IngressStats { accepted: 2, rejected: 2 });

        let replies = replies(&out);
        assert_eq!(replies.len(), 4);
        assert_eq!(replies[0]["result"], "accepted");
        assert_eq!(replies[0]["job"]["status"], "pending");
        assert_eq!(replies[1]["line"], 3);
        assert_eq!(replies[1]["job"]["filters"]["class"], "7A");
        assert_eq!(replies[2]["result"], "rejected");
        assert_eq!(replies[2]["code"], "invalid_json");
        assert_eq!(replies[3]["code"], "validation_error");

        let jobs = pipeline.service.list(owner).await.unwrap();
        assert_eq!(jobs.len(), 2);
        assert!(jobs.iter().all(|j| j.status == ExportStatus::Pending));
    }

    #[tokio::test]
    async fn seeded_rows_flow_into_submitted_exports() {
        let owner = OwnerId::new();
        let source = Arc::new(InMemoryDataSource::new());
        let seeded = seed_data_source(
            &source,
            &json!([
                {"owner_id": owner, "export_type": "student_data",
                 "rows": [{"name": "Ada", "score": 91}, {"name": "Alan", "score": 74}]},
                {"owner_id": owner, "export_type": "class_summary"}
            ])
            .to_string(),
        )
        .unwrap();
        assert_eq!(seeded, 2);
        assert_eq!(
            source.rows(owner, ExportType::StudentData).await.unwrap().len(),
            2
        );

        let pipeline = Pipeline::in_memory(source, Arc::new(InMemoryArtifactStorage::new()));
        let input = json!({"owner_id": owner, "export_type": "student_data", "export_format": "csv"})
            .to_string();
        submit_lines(input.as_bytes(), tokio::io::sink(), &pipeline.service)
            .await
            .unwrap();

        let worker = pipeline.worker(WorkerConfig::default());
        let done = worker.run_once().await.unwrap().unwrap();
        assert_eq!(done.status, ExportStatus::Completed);
        let (_, bytes) = pipeline.service.artifact(owner, done.id).await.unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "name,score\nAda,91\nAlan,74\n");
    }

    #[test]
    fn malformed_seed_file_is_an_error() {
        let source = InMemoryDataSource::new();
        assert!(seed_data_source(&source, "{\"not\": \"a list\"}").is_err());
    }
}
