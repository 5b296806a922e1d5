//! Dataset writers: Snappy-compressed Parquet and JSON Lines.
//!
//! Both writers go through a `.part` sibling that is renamed into place once
//! the file is complete, so a failed export never leaves a truncated dataset.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Int32Array, StringArray, TimestampMicrosecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::Datelike;
use leizilla_shared::{ExportFormat, LawRecord, LeizillaError, Result};
use parquet::arrow::ArrowWriter;
use parquet::basic::Compression;
use parquet::file::properties::WriterProperties;

/// `NaiveDate::num_days_from_ce` of 1970-01-01.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// Arrow schema of an exported law dataset.
pub fn law_schema() -> Arc<Schema> {
    let utc = Some("UTC".into());
    Arc::new(Schema::new(vec![
        Field::new("id", DataType::Utf8, false),
        Field::new("title", DataType::Utf8, false),
        Field::new("origin", DataType::Utf8, false),
        Field::new("law_type", DataType::Utf8, true),
        Field::new("number", DataType::Utf8, true),
        Field::new("year", DataType::Int32, true),
        Field::new("publication_date", DataType::Date32, true),
        Field::new("original_url", DataType::Utf8, true),
        Field::new("pdf_url", DataType::Utf8, true),
        Field::new("archive_url", DataType::Utf8, true),
        Field::new("archive_item_id", DataType::Utf8, true),
        Field::new("collection_metadata", DataType::Utf8, true),
        Field::new("full_text", DataType::Utf8, true),
        Field::new("normalized_text", DataType::Utf8, true),
        Field::new("content_hash", DataType::Utf8, true),
        Field::new("status", DataType::Utf8, false),
        Field::new("stage", DataType::Utf8, false),
        Field::new(
            "created_at",
            DataType::Timestamp(TimeUnit::Microsecond, utc.clone()),
            false,
        ),
        Field::new(
            "updated_at",
            DataType::Timestamp(TimeUnit::Microsecond, utc),
            false,
        ),
    ]))
}

fn opt_str(laws: &[LawRecord], f: impl Fn(&LawRecord) -> Option<&str>) -> ArrayRef {
    Arc::new(StringArray::from(laws.iter().map(f).collect::<Vec<_>>()))
}

/// Build a single record batch from `laws`.
pub fn laws_to_batch(laws: &[LawRecord]) -> Result<RecordBatch> {
    let metadata: Vec<Option<String>> = laws
        .iter()
        .map(|l| l.collection_metadata.as_ref().map(|v| v.to_string()))
        .collect();

    let columns: Vec<ArrayRef> = vec![
        Arc::new(StringArray::from(
            laws.iter().map(|l| l.id.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            laws.iter().map(|l| l.title.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            laws.iter().map(|l| l.origin.as_str()).collect::<Vec<_>>(),
        )),
        opt_str(laws, |l| l.law_type.as_deref()),
        opt_str(laws, |l| l.number.as_deref()),
        Arc::new(Int32Array::from(
            laws.iter().map(|l| l.year).collect::<Vec<_>>(),
        )),
        Arc::new(Date32Array::from(
            laws.iter()
                .map(|l| {
                    l.publication_date
                        .map(|d| d.num_days_from_ce() - UNIX_EPOCH_DAYS_FROM_CE)
                })
                .collect::<Vec<_>>(),
        )),
        opt_str(laws, |l| l.original_url.as_deref()),
        opt_str(laws, |l| l.pdf_url.as_deref()),
        opt_str(laws, |l| l.archive_url.as_deref()),
        opt_str(laws, |l| l.archive_item_id.as_deref()),
        Arc::new(StringArray::from(
            metadata.iter().map(|m| m.as_deref()).collect::<Vec<_>>(),
        )),
        opt_str(laws, |l| l.full_text.as_deref()),
        opt_str(laws, |l| l.normalized_text.as_deref()),
        opt_str(laws, |l| l.content_hash.as_deref()),
        Arc::new(StringArray::from(
            laws.iter().map(|l| l.status.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(StringArray::from(
            laws.iter().map(|l| l.stage.as_str()).collect::<Vec<_>>(),
        )),
        Arc::new(
            TimestampMicrosecondArray::from(
                laws.iter()
                    .map(|l| l.created_at.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
        Arc::new(
            TimestampMicrosecondArray::from(
                laws.iter()
                    .map(|l| l.updated_at.timestamp_micros())
                    .collect::<Vec<_>>(),
            )
            .with_timezone("UTC"),
        ),
    ];

    RecordBatch::try_new(law_schema(), columns)
        .map_err(|e| LeizillaError::Export(format!("building record batch: {e}")))
}

fn write_parquet(file: File, laws: &[LawRecord]) -> Result<()> {
    let batch = laws_to_batch(laws)?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
        .map_err(|e| LeizillaError::Export(format!("opening parquet writer: {e}")))?;
    writer
        .write(&batch)
        .map_err(|e| LeizillaError::Export(format!("writing parquet batch: {e}")))?;
    writer
        .close()
        .map_err(|e| LeizillaError::Export(format!("closing parquet writer: {e}")))?;
    Ok(())
}

fn write_jsonl(file: File, path: &Path, laws: &[LawRecord]) -> Result<()> {
    let mut out = BufWriter::new(file);
    for law in laws {
        // Local paths are machine-specific and stay out of published datasets.
        let row = LawRecord {
            local_pdf_path: None,
            ..law.clone()
        };
        serde_json::to_writer(&mut out, &row)
            .map_err(|e| LeizillaError::Export(format!("serializing {}: {e}", law.id)))?;
        out.write_all(b"\n").map_err(|e| LeizillaError::io(path, e))?;
    }
    out.flush().map_err(|e| LeizillaError::io(path, e))
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".part");
    path.with_file_name(name)
}

/// Write `laws` to `path` in the given format, replacing any existing file.
pub fn write_dataset(path: &Path, format: ExportFormat, laws: &[LawRecord]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| LeizillaError::io(parent, e))?;
    }

    let tmp = part_path(path);
    let file = File::create(&tmp).map_err(|e| LeizillaError::io(&tmp, e))?;

    let written = match format {
        ExportFormat::Parquet => write_parquet(file, laws),
        ExportFormat::Jsonl => write_jsonl(file, &tmp, laws),
    };

    if let Err(e) = written {
        let _ = std::fs::remove_file(&tmp);
        return Err(e);
    }

    std::fs::rename(&tmp, path).map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        LeizillaError::io(path, e)
    })
}
