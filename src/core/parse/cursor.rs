//! Row cursors over vendor files
//!
//! A [`RowCursor`] is a synchronous pull iterator over the records of one file,
//! bound to the exact column list of the schema version resolved for the batch.
//! Delimited text is read with the `csv` crate, vendor XML with `quick-xml`.

use super::cell::Cell;
use super::schema::SchemaRegistry;
use crate::domain::{
    CellError, CellProvenance, RecordError, RecordProvenance, Result, SchemaVersion,
    TributaryError,
};
use quick_xml::events::Event;
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Resolved column layout of one open file
#[derive(Debug, Clone)]
pub struct FileSchema {
    file: String,
    file_type: String,
    version: SchemaVersion,
    columns: Vec<String>,
    index: HashMap<String, usize>,
}

impl FileSchema {
    /// Creates a file schema from the resolved column list
    pub fn new(
        file: impl Into<String>,
        file_type: impl Into<String>,
        version: SchemaVersion,
        columns: Vec<String>,
    ) -> Self {
        let index = columns
            .iter()
            .enumerate()
            .map(|(i, c)| (c.clone(), i))
            .collect();
        Self {
            file: file.into(),
            file_type: file_type.into(),
            version,
            columns,
            index,
        }
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn file_type(&self) -> &str {
        &self.file_type
    }

    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Returns the index of a column, if it is part of this schema
    pub fn position(&self, column: &str) -> Option<usize> {
        self.index.get(column).copied()
    }

    /// Returns true if the column is part of this schema
    pub fn has_column(&self, column: &str) -> bool {
        self.index.contains_key(column)
    }
}

/// One parsed row of one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceRecord {
    provenance: RecordProvenance,
    values: Vec<String>,
}

impl SourceRecord {
    /// Creates a new source record
    pub fn new(provenance: RecordProvenance, values: Vec<String>) -> Self {
        Self { provenance, values }
    }

    /// Returns where this record came from
    pub fn provenance(&self) -> &RecordProvenance {
        &self.provenance
    }

    /// Returns the physical row number
    pub fn row_number(&self) -> u64 {
        self.provenance.row
    }

    /// Returns the declared file type
    pub fn file_type(&self) -> &str {
        &self.provenance.file_type
    }

    /// Returns the raw values in schema column order
    pub fn values(&self) -> &[String] {
        &self.values
    }
}

/// Pull iterator over the records of one file
///
/// Accessors on the current record go through [`RowCursor::cell`], which fails
/// with [`CellError::UnknownColumn`] for a column the resolved schema does not
/// declare. Calling `cell` before the first `next` or after end-of-data fails the
/// same way a missing row would: it reports the column as unavailable.
pub trait RowCursor: Send + Sync {
    /// Resolved schema of the underlying file
    fn schema(&self) -> &FileSchema;

    /// Advances to the next record, returning `None` at end-of-data
    fn next(&mut self) -> Result<Option<&SourceRecord>>;

    /// The record the cursor is positioned on
    fn current(&self) -> Option<&SourceRecord>;

    /// Releases the underlying file handle
    fn close(&mut self);

    fn is_closed(&self) -> bool;

    /// Returns the named cell of the current record
    fn cell(&self, column: &str) -> std::result::Result<Cell<'_>, CellError> {
        let schema = self.schema();
        let unknown = || CellError::UnknownColumn {
            file: schema.file().to_string(),
            file_type: schema.file_type().to_string(),
            column: column.to_string(),
        };
        let index = schema.position(column).ok_or_else(unknown)?;
        let record = self.current().ok_or_else(unknown)?;
        let raw = record.values.get(index).map(String::as_str).unwrap_or("");
        Ok(Cell::new(
            raw,
            CellProvenance::new(record.provenance.clone(), column, index),
        ))
    }

    /// Returns true if the resolved schema declares the column
    fn has_column(&self, column: &str) -> bool {
        self.schema().has_column(column)
    }

    /// Provenance of the current record
    fn provenance(&self) -> Option<&RecordProvenance> {
        self.current().map(|r| &r.provenance)
    }
}

/// Reads the header row of a delimited file
///
/// Returns the observed header names for a file with a header row, or the
/// width of the first record for a headerless file.
pub fn read_delimited_header(path: &Path, delimiter: u8, has_headers: bool) -> Result<HeaderSample> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(has_headers)
        .flexible(true)
        .from_path(path)
        .map_err(|e| TributaryError::Csv(format!("{}: {e}", path.display())))?;

    if has_headers {
        let headers = reader
            .headers()
            .map_err(|e| TributaryError::Csv(format!("{}: {e}", path.display())))?;
        return Ok(HeaderSample::Named(
            headers.iter().map(|h| h.trim().to_string()).collect(),
        ));
    }

    let mut record = csv::StringRecord::new();
    let width = if reader
        .read_record(&mut record)
        .map_err(|e| TributaryError::Csv(format!("{}: {e}", path.display())))?
    {
        record.len()
    } else {
        0
    };
    Ok(HeaderSample::Width(width))
}

/// What can be learned about a file's layout before it is opened
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderSample {
    /// Observed header names in file order
    Named(Vec<String>),
    /// Column count of the first record of a headerless file
    Width(usize),
}

/// Cursor over a comma or tab delimited file
pub struct CsvCursor {
    schema: FileSchema,
    reader: Option<csv::Reader<BufReader<File>>>,
    record: csv::StringRecord,
    current: Option<SourceRecord>,
    has_headers: bool,
    rows_read: u64,
}

impl CsvCursor {
    /// Opens a delimited file against a resolved schema version
    ///
    /// With a header row the observed header must match the version's column
    /// list (modulo known misspellings). Either way, a row whose field count
    /// differs from the version's column count is a record error on that row.
    pub fn open(
        path: &Path,
        file_type: &str,
        version: &SchemaVersion,
        registry: &SchemaRegistry,
        delimiter: u8,
        has_headers: bool,
    ) -> Result<Self> {
        let columns = registry.columns(file_type, version)?.to_vec();
        let file = File::open(path).map_err(|e| {
            TributaryError::Io(format!("Failed to open {}: {e}", path.display()))
        })?;

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(has_headers)
            .flexible(true)
            .from_reader(BufReader::new(file));

        if has_headers {
            let observed: Vec<String> = reader
                .headers()
                .map_err(|e| TributaryError::Csv(format!("{}: {e}", path.display())))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect();
            registry
                .validate_header(file_type, version, &observed)
                .map_err(|e| {
                    TributaryError::SchemaVersion(format!("{}: {e}", path.display()))
                })?;
        }

        tracing::debug!(
            file = %path.display(),
            file_type = file_type,
            version = %version,
            "Opened delimited file"
        );

        Ok(Self {
            schema: FileSchema::new(
                path.display().to_string(),
                file_type,
                version.clone(),
                columns,
            ),
            reader: Some(reader),
            record: csv::StringRecord::new(),
            current: None,
            has_headers,
            rows_read: 0,
        })
    }
}

impl RowCursor for CsvCursor {
    fn schema(&self) -> &FileSchema {
        &self.schema
    }

    fn next(&mut self) -> Result<Option<&SourceRecord>> {
        let Some(reader) = self.reader.as_mut() else {
            self.current = None;
            return Ok(None);
        };

        let advanced = reader.read_record(&mut self.record).map_err(|e| {
            TributaryError::Csv(format!("{} ({}): {e}", self.schema.file, self.schema.file_type))
        })?;
        if !advanced {
            self.current = None;
            return Ok(None);
        }
        self.rows_read += 1;

        let fallback = self.rows_read + u64::from(self.has_headers);
        let row = self
            .record
            .position()
            .map(|p| p.line())
            .unwrap_or(fallback);

        let provenance = RecordProvenance::new(
            self.schema.file.clone(),
            self.schema.file_type.clone(),
            row,
        );

        // The row is consumed either way; the next call reads the row after it.
        if self.record.len() != self.schema.columns.len() {
            self.current = None;
            return Err(TributaryError::Record(RecordError::new(
                provenance,
                format!(
                    "expected {} fields for version {}, found {}",
                    self.schema.columns.len(),
                    self.schema.version,
                    self.record.len()
                ),
            )));
        }

        self.current = Some(SourceRecord::new(
            provenance,
            self.record.iter().map(str::to_string).collect(),
        ));
        Ok(self.current.as_ref())
    }

    fn current(&self) -> Option<&SourceRecord> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        if self.reader.take().is_some() {
            tracing::debug!(
                file = %self.schema.file,
                rows = self.rows_read,
                "Closed delimited file"
            );
        }
        self.current = None;
    }

    fn is_closed(&self) -> bool {
        self.reader.is_none()
    }
}

/// Cursor over a vendor XML document
///
/// The document is a root element holding repeated record elements whose child
/// elements are the columns. The header is every element name seen across all
/// records, merged in document order, so a record may omit an element (an
/// empty cell) even when it is the first record. An element the schema does
/// not declare is a schema error. Row numbers are 1-based record ordinals.
pub struct XmlCursor {
    schema: FileSchema,
    records: std::vec::IntoIter<SourceRecord>,
    current: Option<SourceRecord>,
    closed: bool,
}

impl XmlCursor {
    /// Parses a vendor XML file against a resolved schema version
    pub fn open(
        path: &Path,
        file_type: &str,
        version: &SchemaVersion,
        registry: &SchemaRegistry,
        record_element: &str,
    ) -> Result<Self> {
        let columns = registry.columns(file_type, version)?.to_vec();
        let parsed = parse_xml_records(path, record_element)?;

        if !parsed.is_empty() {
            let observed = merged_element_names(&parsed);
            registry
                .validate_header(file_type, version, &observed)
                .map_err(|e| {
                    TributaryError::SchemaVersion(format!("{}: {e}", path.display()))
                })?;
        }

        let file = path.display().to_string();
        let mut records = Vec::with_capacity(parsed.len());
        for (ordinal, elements) in parsed.into_iter().enumerate() {
            let row = ordinal as u64 + 1;
            let mut values = vec![String::new(); columns.len()];
            for (name, value) in elements {
                let index = columns
                    .iter()
                    .position(|c| c == &name)
                    .or_else(|| canonical_position(registry, file_type, &columns, &name))
                    .ok_or_else(|| {
                        TributaryError::SchemaVersion(format!(
                            "{file} ({file_type}) row {row}: element '{name}' is not part of version {version}"
                        ))
                    })?;
                values[index] = value;
            }
            records.push(SourceRecord::new(
                RecordProvenance::new(file.clone(), file_type, row),
                values,
            ));
        }

        tracing::debug!(
            file = %file,
            file_type = file_type,
            records = records.len(),
            "Parsed XML file"
        );

        Ok(Self {
            schema: FileSchema::new(file, file_type, version.clone(), columns),
            records: records.into_iter(),
            current: None,
            closed: false,
        })
    }
}

fn canonical_position(
    registry: &SchemaRegistry,
    file_type: &str,
    columns: &[String],
    observed: &str,
) -> Option<usize> {
    columns.iter().position(|c| {
        registry.header_matches(
            file_type,
            std::slice::from_ref(c),
            &[observed.to_string()],
        )
    })
}

impl RowCursor for XmlCursor {
    fn schema(&self) -> &FileSchema {
        &self.schema
    }

    fn next(&mut self) -> Result<Option<&SourceRecord>> {
        if self.closed {
            self.current = None;
            return Ok(None);
        }
        self.current = self.records.next();
        Ok(self.current.as_ref())
    }

    fn current(&self) -> Option<&SourceRecord> {
        self.current.as_ref()
    }

    fn close(&mut self) {
        self.closed = true;
        self.current = None;
        self.records = Vec::new().into_iter();
    }

    fn is_closed(&self) -> bool {
        self.closed
    }
}

/// Reads the merged element names of every record of a vendor XML file
pub fn read_xml_header(path: &Path, record_element: &str) -> Result<HeaderSample> {
    let records = parse_xml_records(path, record_element)?;
    Ok(HeaderSample::Named(merged_element_names(&records)))
}

type XmlRecord = Vec<(String, String)>;

/// Union of element names across records
///
/// A name first seen in a later record is placed after the name that precedes
/// it in that record, so `[A, B, D]` then `[A, B, C, D]` merges to
/// `[A, B, C, D]`.
fn merged_element_names(records: &[XmlRecord]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for record in records {
        let mut previous: Option<usize> = None;
        for (name, _) in record {
            let index = match merged.iter().position(|seen| seen == name) {
                Some(index) => index,
                None => {
                    let at = previous.map_or(0, |p| p + 1);
                    merged.insert(at, name.clone());
                    at
                }
            };
            previous = Some(index);
        }
    }
    merged
}

fn parse_xml_records(path: &Path, record_element: &str) -> Result<Vec<XmlRecord>> {
    let mut reader = Reader::from_file(path)
        .map_err(|e| TributaryError::Xml(format!("{}: {e}", path.display())))?;
    reader.config_mut().trim_text(true);

    let xml_err = |e: quick_xml::Error| TributaryError::Xml(format!("{}: {e}", path.display()));

    let mut buf = Vec::new();
    let mut records = Vec::new();
    let mut current: Option<XmlRecord> = None;
    let mut field: Option<(String, String)> = None;

    loop {
        match reader.read_event_into(&mut buf).map_err(xml_err)? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if current.is_none() {
                    if name == record_element {
                        current = Some(Vec::new());
                    }
                } else if field.is_none() {
                    field = Some((name, String::new()));
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                match current.as_mut() {
                    Some(record) if field.is_none() => record.push((name, String::new())),
                    None if name == record_element => records.push(Vec::new()),
                    _ => {}
                }
            }
            Event::Text(e) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&e.unescape().map_err(xml_err)?);
                }
            }
            Event::CData(e) => {
                if let Some((_, value)) = field.as_mut() {
                    value.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                let closes_field = field.as_ref().map(|(n, _)| n == &name).unwrap_or(false);
                if closes_field {
                    if let (Some(record), Some(done)) = (current.as_mut(), field.take()) {
                        record.push(done);
                    }
                } else if name == record_element {
                    if let Some(record) = current.take() {
                        records.push(record);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    if current.is_some() {
        return Err(TributaryError::Xml(format!(
            "{}: unterminated <{record_element}> element",
            path.display()
        )));
    }
    Ok(records)
}
