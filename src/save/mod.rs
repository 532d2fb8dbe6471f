pub mod export;
pub mod import;

pub use export::export;
pub use export::export_to_string;
pub use import::import;
pub use import::import_from_string;

/// separator between serialized program lines inside a dot label.
pub(crate) const LINE_SEPARATOR: &str = "&#92;n";
