mod encoding;
pub mod errors;
pub mod reader;
pub mod schema;
mod typing;

pub use encoding::{decode_to_utf8, encode_text};
pub use errors::ExtractError;
pub use reader::{read_extract, read_typed, DelimitedFormat, Extract};
pub use schema::{ColumnSpec, ColumnType, DatasetKind, ExtractSchema, NumberFormat, TextEncoding};
pub use typing::{apply_column_types, has_column};
