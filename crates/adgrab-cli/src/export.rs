//! Dataset export: flattens a run's `ads.jsonl` into one row per record.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use serde_json::{json, Value};

/// Projects one pipeline result line into a flat export row: the archive
/// payload fields plus local asset paths and any extracted text.
fn flatten(result: &Value) -> Value {
    let mut row = result
        .get("record")
        .and_then(|r| r.get("payload"))
        .cloned()
        .unwrap_or_else(|| json!({}));

    let mut asset_paths = Vec::new();
    let mut texts = Vec::new();
    if let Some(media) = result.get("media").and_then(Value::as_array) {
        for outcome in media {
            if let Some(path) = outcome.pointer("/outcome/succeeded/path") {
                asset_paths.push(path.clone());
            }
            if let Some(text) = outcome.get("ocr_text").and_then(Value::as_str) {
                texts.push(text.to_owned());
            }
        }
    }
    row["ingest_state"] = result.get("state").cloned().unwrap_or(Value::Null);
    row["asset_paths"] = Value::Array(asset_paths);
    if !texts.is_empty() {
        row["extracted_text"] = json!(texts.join("\n"));
    }
    row
}

pub(crate) fn run_export(dataset: &Path, format: &str, out: Option<&Path>) -> anyhow::Result<()> {
    if format != "jsonl" {
        anyhow::bail!("unsupported export format '{format}' (expected: jsonl)");
    }

    let source = dataset.join("ads.jsonl");
    let reader = BufReader::new(std::fs::File::open(&source).map_err(|e| {
        anyhow::anyhow!("cannot open {}: {e} (is this a run output directory?)", source.display())
    })?);

    let mut writer: Box<dyn Write> = match out {
        Some(path) => Box::new(BufWriter::new(std::fs::File::create(path)?)),
        None => Box::new(BufWriter::new(std::io::stdout().lock())),
    };

    let mut rows = 0usize;
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let result: Value = serde_json::from_str(&line)
            .map_err(|e| anyhow::anyhow!("corrupt result line {}: {e}", rows + 1))?;
        serde_json::to_writer(&mut writer, &flatten(&result))?;
        writer.write_all(b"\n")?;
        rows += 1;
    }
    writer.flush()?;
    tracing::info!(rows, source = %source.display(), "export finished");
    Ok(())
}
