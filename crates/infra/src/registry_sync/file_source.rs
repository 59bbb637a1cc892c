//! DGII bulk registry file (`RNC_CONTRIBUYENTES`).
//!
//! Pipe-delimited, one taxpayer per line, UTF-8 or Latin-1:
//!
//! ```text
//! 0 id | 1 legal name | 2 business name | 3 economic activity | 4..8 (unused) | 9 status | 10 payment regime
//! ```
//!
//! Progress is reported in bytes read against the file size.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::fs::File;
use tokio::io::{AsyncBufReadExt, BufReader};

use fiscalpos_registry::{RegistryRecord, TaxpayerId, TaxpayerStatus};

use super::source::{RegistrySource, RegistrySourceFactory, SourceError, SourcePosition};

const COL_ID: usize = 0;
const COL_LEGAL_NAME: usize = 1;
const COL_BUSINESS_NAME: usize = 2;
const COL_ACTIVITY: usize = 3;
const COL_STATUS: usize = 9;
const COL_PAYMENT_REGIME: usize = 10;

pub struct DgiiFileSource {
    reader: BufReader<File>,
    size: u64,
    consumed: u64,
    line_no: u64,
    imported_at: DateTime<Utc>,
    /// Whether a non-blank line has been seen; only that first one may be a header.
    past_header: bool,
    eof: bool,
}

impl DgiiFileSource {
    pub async fn open(path: &Path, imported_at: DateTime<Utc>) -> Result<Self, SourceError> {
        let file = File::open(path)
            .await
            .map_err(|e| SourceError::Unreachable(format!("{}: {e}", path.display())))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| SourceError::Io(format!("{}: {e}", path.display())))?
            .len();
        Ok(Self {
            reader: BufReader::new(file),
            size,
            consumed: 0,
            line_no: 0,
            imported_at,
            past_header: false,
            eof: false,
        })
    }
}

#[async_trait]
impl RegistrySource for DgiiFileSource {
    async fn next_batch(&mut self, max: usize) -> Result<Option<Vec<RegistryRecord>>, SourceError> {
        let mut batch = Vec::with_capacity(max.min(4096));
        let mut buf = Vec::new();
        while !self.eof && batch.len() < max.max(1) {
            buf.clear();
            let n = self
                .reader
                .read_until(b'\n', &mut buf)
                .await
                .map_err(|e| SourceError::Io(e.to_string()))?;
            if n == 0 {
                self.eof = true;
                break;
            }
            self.consumed += n as u64;
            self.line_no += 1;
            let line = decode_line(&buf);
            if !self.past_header && !is_blank(&line) {
                self.past_header = true;
                if is_header(&line) {
                    continue;
                }
            }
            if let Some(record) = parse_line(&line, self.line_no, self.imported_at)? {
                batch.push(record);
            }
        }
        if batch.is_empty() && self.eof {
            return Ok(None);
        }
        Ok(Some(batch))
    }

    fn position(&self) -> SourcePosition {
        SourcePosition {
            consumed: self.consumed,
            total: Some(self.size),
        }
    }
}

/// UTF-8 when valid, Latin-1 otherwise (the published file has used both).
fn decode_line(bytes: &[u8]) -> String {
    let trimmed = bytes
        .strip_suffix(b"\n")
        .map(|b| b.strip_suffix(b"\r").unwrap_or(b))
        .unwrap_or(bytes);
    match std::str::from_utf8(trimmed) {
        Ok(s) => s.to_string(),
        Err(_) => trimmed.iter().map(|&b| char::from(b)).collect(),
    }
}

fn is_blank(line: &str) -> bool {
    line.trim_start_matches('\u{feff}').trim().is_empty()
}

/// Column titles instead of data: the id column carries no digits.
pub fn is_header(line: &str) -> bool {
    let line = line.trim_start_matches('\u{feff}');
    let first = line.split('|').next().unwrap_or_default();
    !is_blank(line) && !first.chars().any(|c| c.is_ascii_digit())
}

/// Parse one data line. Blank lines yield `Ok(None)`.
pub fn parse_line(
    line: &str,
    line_no: u64,
    imported_at: DateTime<Utc>,
) -> Result<Option<RegistryRecord>, SourceError> {
    let line = line.trim_start_matches('\u{feff}');
    if is_blank(line) {
        return Ok(None);
    }
    let fields: Vec<&str> = line.split('|').map(str::trim).collect();
    let malformed = |reason: String| SourceError::Malformed {
        line: line_no,
        reason,
    };

    let raw_id = fields.get(COL_ID).copied().unwrap_or_default();
    let id = TaxpayerId::parse_shape(raw_id).map_err(|e| malformed(e.to_string()))?;

    let legal_name = fields
        .get(COL_LEGAL_NAME)
        .copied()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| malformed("missing legal name".to_string()))?;

    let optional = |idx: usize| {
        fields
            .get(idx)
            .copied()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let mut record = RegistryRecord::new(id.into_inner(), legal_name, imported_at);
    record.business_name = optional(COL_BUSINESS_NAME);
    record.economic_activity = optional(COL_ACTIVITY);
    record.payment_regime = optional(COL_PAYMENT_REGIME);
    // Rows without a status column are listed, hence active.
    record.status = optional(COL_STATUS)
        .map(|s| TaxpayerStatus::from_label(&s))
        .unwrap_or(TaxpayerStatus::Active);
    Ok(Some(record))
}

/// Opens the configured DGII file for each run.
#[derive(Debug, Clone)]
pub struct DgiiFileSourceFactory {
    path: PathBuf,
}

impl DgiiFileSourceFactory {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl RegistrySourceFactory for DgiiFileSourceFactory {
    async fn open(&self, started_at: DateTime<Utc>) -> Result<Box<dyn RegistrySource>, SourceError> {
        Ok(Box::new(DgiiFileSource::open(&self.path, started_at).await?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap()
    }

    #[test]
    fn parses_full_line() {
        let line = "101010632|CERVECERIA NACIONAL DOMINICANA SA|PRESIDENTE|FABRICACION DE CERVEZA| | | | |15/05/1980|ACTIVO|NORMAL";
        let r = parse_line(line, 7, at()).unwrap().unwrap();
        assert_eq!(r.taxpayer_id, "101010632");
        assert_eq!(r.legal_name, "CERVECERIA NACIONAL DOMINICANA SA");
        assert_eq!(r.business_name.as_deref(), Some("PRESIDENTE"));
        assert_eq!(r.economic_activity.as_deref(), Some("FABRICACION DE CERVEZA"));
        assert_eq!(r.status, TaxpayerStatus::Active);
        assert_eq!(r.payment_regime.as_deref(), Some("NORMAL"));
        assert_eq!(r.updated_at, at());
    }

    #[test]
    fn short_lines_leave_optional_fields_empty() {
        let r = parse_line("00113918205|JUAN PEREZ", 3, at()).unwrap().unwrap();
        assert_eq!(r.business_name, None);
        assert_eq!(r.status, TaxpayerStatus::Active);
    }

    #[test]
    fn recognises_header_and_blank_lines() {
        assert!(is_header("RNC|RAZON SOCIAL|NOMBRE COMERCIAL"));
        assert!(is_header("\u{feff}RNC|RAZON SOCIAL"));
        assert!(!is_header("101010632|UNO SA"));
        assert!(!is_header("   "));
        assert_eq!(parse_line("   ", 5, at()).unwrap(), None);
        // A header past the first non-blank line is data, and bad data.
        assert!(parse_line("RNC|RAZON SOCIAL", 9, at()).is_err());
    }

    #[test]
    fn malformed_id_reports_line() {
        match parse_line("12AB|EMPRESA", 42, at()) {
            Err(SourceError::Malformed { line, .. }) => assert_eq!(line, 42),
            other => panic!("expected Malformed, got {other:?}"),
        }
        assert!(parse_line("101010632|", 2, at()).is_err());
    }

    #[test]
    fn decodes_latin1_fallback() {
        let bytes = b"101010632|PANADER\xcdA LA ESPA\xd1OLA\r\n";
        assert_eq!(decode_line(bytes), "101010632|PANADERÍA LA ESPAÑOLA");
        assert_eq!(decode_line("101010632|AÑIL\n".as_bytes()), "101010632|AÑIL");
    }

    #[tokio::test]
    async fn reads_file_in_batches() {
        let dir = std::env::temp_dir().join(format!("fiscalpos-dgii-{}", uuid::Uuid::now_v7()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("RNC_CONTRIBUYENTES.csv");
        let body = "101010632|UNO SA\n131028561|DOS SRL\n401001128|TRES EIRL\n";
        tokio::fs::write(&path, body).await.unwrap();

        let mut source = DgiiFileSource::open(&path, at()).await.unwrap();
        assert_eq!(source.next_batch(2).await.unwrap().unwrap().len(), 2);
        let pos = source.position();
        assert!(pos.consumed > 0 && pos.consumed < body.len() as u64);
        assert_eq!(source.next_batch(2).await.unwrap().unwrap().len(), 1);
        assert!(source.next_batch(2).await.unwrap().is_none());
        assert_eq!(source.position().consumed, body.len() as u64);

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn header_after_leading_blank_lines_is_skipped() {
        let dir = std::env::temp_dir().join(format!("fiscalpos-dgii-{}", uuid::Uuid::now_v7()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("RNC_CONTRIBUYENTES.csv");
        let body = "\r\n\nRNC|RAZON SOCIAL|NOMBRE COMERCIAL\n101010632|UNO SA\n131028561|DOS SRL\n";
        tokio::fs::write(&path, body).await.unwrap();

        let mut source = DgiiFileSource::open(&path, at()).await.unwrap();
        let batch = source.next_batch(10).await.unwrap().unwrap();
        let ids: Vec<_> = batch.iter().map(|r| r.taxpayer_id.as_str()).collect();
        assert_eq!(ids, vec!["101010632", "131028561"]);
        assert!(source.next_batch(10).await.unwrap().is_none());

        tokio::fs::remove_dir_all(&dir).await.unwrap();
    }

    #[tokio::test]
    async fn missing_file_is_unreachable() {
        let factory = DgiiFileSourceFactory::new("/nonexistent/RNC_CONTRIBUYENTES.csv");
        let err = factory.open(at()).await.err().unwrap();
        assert!(matches!(err, SourceError::Unreachable(_)));
    }
}
