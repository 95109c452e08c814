use std::path::Path;

use crate::error::{HarnessError, Result};
use crate::models::*;
use crate::summary::RunSummary;

pub struct ExportEngine;

impl ExportEngine {
    pub fn export_json(
        run: &TestRun,
        results: &[RequestOutcome],
        summary: &RunSummary,
        output_path: &Path,
    ) -> Result<()> {
        let params = run
            .params_json
            .as_deref()
            .map(serde_json::from_str::<serde_json::Value>)
            .transpose()?;
        let data = serde_json::json!({
            "type": "seat_contention_report",
            "run": {
                "id": run.id,
                "scenario": run.scenario,
                "status": run.status,
                "started_at": run.started_at,
                "completed_at": run.completed_at,
                "params": params,
            },
            "summary": summary,
            "results": results,
        });
        let json = serde_json::to_string_pretty(&data)?;
        std::fs::write(output_path, json)
            .map_err(|e| HarnessError::Export(format!("Failed to write {}: {}", output_path.display(), e)))?;
        Ok(())
    }

    pub fn export_csv(results: &[RequestOutcome], output_path: &Path) -> Result<()> {
        let mut wtr = csv::Writer::from_path(output_path)
            .map_err(|e| HarnessError::Export(format!("Failed to create CSV writer: {}", e)))?;

        wtr.write_record([
            "Timestamp", "Operation", "VU", "Iteration", "Resource", "Identity",
            "Status Code", "Category", "Duration (ms)", "Message",
        ])
        .map_err(Self::csv_error)?;

        for r in results {
            wtr.write_record([
                r.timestamp.as_str(),
                r.operation.as_str(),
                &r.vu_index.to_string(),
                &r.iteration.to_string(),
                &r.resource_id.to_string(),
                &r.identity_id.to_string(),
                &r.http_status.to_string(),
                r.category.as_str(),
                &r.duration_ms.to_string(),
                r.message.as_deref().unwrap_or(""),
            ])
            .map_err(Self::csv_error)?;
        }

        wtr.flush()?;
        Ok(())
    }

    fn csv_error(e: csv::Error) -> HarnessError {
        HarnessError::Export(format!("CSV write error: {}", e))
    }
}
