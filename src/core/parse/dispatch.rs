//! Format dispatch
//!
//! The [`FormatDispatcher`] is a static registry from a delivered file's type
//! tag to the factory that opens a cursor over it. Opening a batch constructs
//! exactly one cursor per file; if any file fails to open, every cursor opened
//! before it is released before the error is returned.

use super::cursor::{read_delimited_header, read_xml_header, CsvCursor, HeaderSample, RowCursor, XmlCursor};
use super::schema::SchemaRegistry;
use crate::adapters::exchange::ExchangeFile;
use crate::domain::{Result, SchemaVersion, TributaryError};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Tag of the vendor organisation file
pub const ADMIN_ORGANISATION: &str = "Admin_Organisation";
/// Tag of the vendor patient file
pub const ADMIN_PATIENT: &str = "Admin_Patient";
/// Tag of the vendor problem file
pub const CARE_RECORD_PROBLEM: &str = "CareRecord_Problem";
/// Tag of the vendor observation file
pub const CARE_RECORD_OBSERVATION: &str = "CareRecord_Observation";
/// Tag of the vendor medication file
pub const PRESCRIBING_MEDICATION: &str = "Prescribing_Medication";

/// Physical encoding of a vendor file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEncoding {
    /// Delimited text
    Delimited { delimiter: u8, has_headers: bool },
    /// Repeated record elements under a document root
    Xml { record_element: String },
}

/// Everything a cursor factory needs to open one file
pub struct CursorRequest<'a> {
    pub file: &'a ExchangeFile,
    pub version: &'a SchemaVersion,
    pub registry: &'a SchemaRegistry,
    pub encoding: &'a SourceEncoding,
}

/// Constructor for the cursor of one format
pub type CursorFactory = fn(&CursorRequest<'_>) -> Result<Box<dyn RowCursor>>;

/// Registered vendor file format
#[derive(Clone)]
pub struct FormatSpec {
    /// Type tag; also the format name in the schema registry
    pub tag: String,
    pub encoding: SourceEncoding,
    pub factory: CursorFactory,
}

impl std::fmt::Debug for FormatSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatSpec")
            .field("tag", &self.tag)
            .field("encoding", &self.encoding)
            .finish_non_exhaustive()
    }
}

impl FormatSpec {
    /// A delimited text format opened with [`CsvCursor`]
    pub fn delimited(tag: &str, delimiter: u8, has_headers: bool) -> Self {
        Self {
            tag: tag.to_string(),
            encoding: SourceEncoding::Delimited {
                delimiter,
                has_headers,
            },
            factory: open_delimited,
        }
    }

    /// A vendor XML format opened with [`XmlCursor`]
    pub fn xml(tag: &str, record_element: &str) -> Self {
        Self {
            tag: tag.to_string(),
            encoding: SourceEncoding::Xml {
                record_element: record_element.to_string(),
            },
            factory: open_xml,
        }
    }

    /// Replaces the cursor factory
    pub fn with_factory(mut self, factory: CursorFactory) -> Self {
        self.factory = factory;
        self
    }
}

fn open_delimited(request: &CursorRequest<'_>) -> Result<Box<dyn RowCursor>> {
    let SourceEncoding::Delimited {
        delimiter,
        has_headers,
    } = request.encoding
    else {
        return Err(TributaryError::Configuration(format!(
            "{} is not registered as a delimited format",
            request.file.type_tag
        )));
    };
    let cursor = CsvCursor::open(
        &request.file.path,
        &request.file.type_tag,
        request.version,
        request.registry,
        *delimiter,
        *has_headers,
    )?;
    Ok(Box::new(cursor))
}

fn open_xml(request: &CursorRequest<'_>) -> Result<Box<dyn RowCursor>> {
    let SourceEncoding::Xml { record_element } = request.encoding else {
        return Err(TributaryError::Configuration(format!(
            "{} is not registered as an XML format",
            request.file.type_tag
        )));
    };
    let cursor = XmlCursor::open(
        &request.file.path,
        &request.file.type_tag,
        request.version,
        request.registry,
        record_element,
    )?;
    Ok(Box::new(cursor))
}

/// Static registry from type tag to format
#[derive(Debug, Clone)]
pub struct FormatDispatcher {
    formats: BTreeMap<String, FormatSpec>,
    registry: Arc<SchemaRegistry>,
}

impl FormatDispatcher {
    /// Creates a dispatcher with no registered formats
    pub fn new(registry: Arc<SchemaRegistry>) -> Self {
        Self {
            formats: BTreeMap::new(),
            registry,
        }
    }

    /// Creates a dispatcher for the bundled vendor formats
    pub fn with_builtin_formats(registry: Arc<SchemaRegistry>) -> Self {
        let mut dispatcher = Self::new(registry);
        dispatcher.register(FormatSpec::xml(ADMIN_ORGANISATION, "Organisation"));
        dispatcher.register(FormatSpec::delimited(ADMIN_PATIENT, b',', true));
        dispatcher.register(FormatSpec::delimited(CARE_RECORD_PROBLEM, b',', true));
        dispatcher.register(FormatSpec::delimited(CARE_RECORD_OBSERVATION, b',', true));
        dispatcher.register(FormatSpec::delimited(PRESCRIBING_MEDICATION, b'\t', true));
        dispatcher
    }

    /// Registers a format, replacing any earlier format with the same tag
    pub fn register(&mut self, spec: FormatSpec) {
        self.formats.insert(spec.tag.clone(), spec);
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    /// Returns the registered tags in sorted order
    pub fn supported_tags(&self) -> Vec<&str> {
        self.formats.keys().map(String::as_str).collect()
    }

    /// Looks up the format registered for a file's type tag
    ///
    /// # Errors
    ///
    /// Returns [`TributaryError::UnknownFileType`] for an unrecognised tag.
    pub fn spec_for(&self, file: &ExchangeFile) -> Result<&FormatSpec> {
        self.formats
            .get(&file.type_tag)
            .ok_or_else(|| TributaryError::UnknownFileType {
                type_tag: file.type_tag.clone(),
                path: file.path.display().to_string(),
            })
    }

    /// Samples a file's header without opening a cursor
    pub fn read_header(&self, file: &ExchangeFile) -> Result<HeaderSample> {
        match &self.spec_for(file)?.encoding {
            SourceEncoding::Delimited {
                delimiter,
                has_headers,
            } => read_delimited_header(&file.path, *delimiter, *has_headers),
            SourceEncoding::Xml { record_element } => read_xml_header(&file.path, record_element),
        }
    }

    /// Opens one cursor for a file at the given version
    pub fn open(&self, file: &ExchangeFile, version: &SchemaVersion) -> Result<Box<dyn RowCursor>> {
        let spec = self.spec_for(file)?;
        let request = CursorRequest {
            file,
            version,
            registry: &self.registry,
            encoding: &spec.encoding,
        };
        (spec.factory)(&request)
    }

    /// Opens one cursor per file, all at the batch version
    ///
    /// Fails fast on the first unrecognised tag or open failure. Cursors already
    /// opened are closed before the error is returned.
    pub fn open_batch(&self, files: &[ExchangeFile], version: &SchemaVersion) -> Result<OpenedBatch> {
        let mut batch = OpenedBatch {
            version: version.clone(),
            entries: Vec::with_capacity(files.len()),
        };

        for file in files {
            match self.open(file, version) {
                Ok(cursor) => batch.entries.push((file.clone(), cursor)),
                Err(e) => {
                    tracing::warn!(
                        file = %file.path.display(),
                        file_type = %file.type_tag,
                        opened = batch.entries.len(),
                        "Failed to open batch file, releasing cursors opened so far"
                    );
                    batch.close();
                    return Err(e);
                }
            }
        }

        Ok(batch)
    }
}

/// The set of cursors for one batch
///
/// Every cursor is closed on [`OpenedBatch::close`] or when the batch is dropped.
pub struct OpenedBatch {
    version: SchemaVersion,
    entries: Vec<(ExchangeFile, Box<dyn RowCursor>)>,
}

impl OpenedBatch {
    /// Version assigned to every file of the batch
    pub fn version(&self) -> &SchemaVersion {
        &self.version
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the cursors for one type tag, in delivery order
    pub fn cursors_for<'a>(
        &'a mut self,
        tag: &'a str,
    ) -> impl Iterator<Item = (&'a ExchangeFile, &'a mut Box<dyn RowCursor>)> + 'a {
        self.entries
            .iter_mut()
            .filter(move |(file, _)| file.type_tag == tag)
            .map(|(file, cursor)| (&*file, cursor))
    }

    /// Closes every cursor of the batch
    pub fn close(&mut self) {
        for (_, cursor) in self.entries.iter_mut() {
            if !cursor.is_closed() {
                cursor.close();
            }
        }
    }
}

impl Drop for OpenedBatch {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parse::cursor::{FileSchema, SourceRecord};
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static OPENED: AtomicUsize = AtomicUsize::new(0);
    static CLOSED: AtomicUsize = AtomicUsize::new(0);

    struct CountingCursor {
        schema: FileSchema,
        closed: bool,
    }

    impl RowCursor for CountingCursor {
        fn schema(&self) -> &FileSchema {
            &self.schema
        }
        fn next(&mut self) -> Result<Option<&SourceRecord>> {
            Ok(None)
        }
        fn current(&self) -> Option<&SourceRecord> {
            None
        }
        fn close(&mut self) {
            if !self.closed {
                self.closed = true;
                CLOSED.fetch_add(1, Ordering::SeqCst);
            }
        }
        fn is_closed(&self) -> bool {
            self.closed
        }
    }

    fn counting_factory(request: &CursorRequest<'_>) -> Result<Box<dyn RowCursor>> {
        if request.file.path.ends_with("broken.csv") {
            return Err(TributaryError::Io("cannot open broken.csv".to_string()));
        }
        OPENED.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingCursor {
            schema: FileSchema::new(
                request.file.path.display().to_string(),
                request.file.type_tag.clone(),
                request.version.clone(),
                vec![],
            ),
            closed: false,
        }))
    }

    fn file(tag: &str, name: &str) -> ExchangeFile {
        ExchangeFile::new(tag, PathBuf::from("/extract").join(name))
    }

    #[test]
    fn test_failed_open_releases_already_opened_cursors() {
        let mut dispatcher = FormatDispatcher::new(Arc::new(SchemaRegistry::new()));
        dispatcher.register(FormatSpec::delimited("Counted", b',', true).with_factory(counting_factory));

        let files = vec![
            file("Counted", "a.csv"),
            file("Counted", "b.csv"),
            file("Counted", "broken.csv"),
            file("Counted", "c.csv"),
        ];

        let before_open = OPENED.load(Ordering::SeqCst);
        let before_close = CLOSED.load(Ordering::SeqCst);
        let result = dispatcher.open_batch(&files, &SchemaVersion::new("1").unwrap());

        assert!(result.is_err());
        let opened = OPENED.load(Ordering::SeqCst) - before_open;
        let closed = CLOSED.load(Ordering::SeqCst) - before_close;
        assert_eq!(opened, 2);
        assert_eq!(closed, 2);
    }

    #[test]
    fn test_unknown_tag_fails_fast() {
        let dispatcher = FormatDispatcher::with_builtin_formats(Arc::new(SchemaRegistry::builtin()));
        let err = dispatcher
            .open_batch(&[file("Admin_Unknown", "x.csv")], &SchemaVersion::new("5.3").unwrap())
            .err()
            .unwrap();
        assert!(matches!(err, TributaryError::UnknownFileType { .. }));
    }

    #[test]
    fn test_builtin_tags() {
        let dispatcher = FormatDispatcher::with_builtin_formats(Arc::new(SchemaRegistry::builtin()));
        assert_eq!(
            dispatcher.supported_tags(),
            vec![
                ADMIN_ORGANISATION,
                ADMIN_PATIENT,
                CARE_RECORD_OBSERVATION,
                CARE_RECORD_PROBLEM,
                PRESCRIBING_MEDICATION
            ]
        );
    }
}
