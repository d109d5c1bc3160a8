use thiserror::Error;

pub type ExporterResult<T> = Result<T, ExporterError>;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML parsing error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("XML stream error: {0}")]
    XmlStream(#[from] quick_xml::Error),

    #[error("XML attribute error: {0}")]
    XmlAttr(#[from] quick_xml::events::attributes::AttrError),

    #[error("Workbook archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Excel read error: {0}")]
    Calamine(#[from] calamine::XlsxError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Excel write error: {0}")]
    XlsxWriter(#[from] rust_xlsxwriter::XlsxError),

    #[error("Field {tag} is not a number: '{text}'")]
    InvalidNumber { tag: String, text: String },

    #[error("Invalid TaksMenesis period: '{0}'")]
    InvalidPeriod(String),

    #[error("Period {period} maps to column index {index}, outside A..XFD")]
    ColumnOutOfRange { period: i64, index: i64 },

    #[error("Workbook part not found: {0}")]
    MissingPart(String),

    #[error("Invalid workbook: {0}")]
    Workbook(String),

    #[error("{failed} of {total} files were not written to the workbook")]
    Incomplete { failed: usize, total: usize },
}
