use std::borrow::Cow;

use encoding_rs::WINDOWS_1252;

use crate::errors::ExtractError;
use crate::schema::TextEncoding;

impl TextEncoding {
    pub fn label(&self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Windows1252 => WINDOWS_1252.name(),
        }
    }
}

/// Transcodes raw file bytes to UTF-8. UTF-8 input is passed through untouched
/// so the CSV parser still rejects invalid sequences.
pub fn decode_to_utf8(bytes: Vec<u8>, encoding: TextEncoding) -> Vec<u8> {
    match encoding {
        TextEncoding::Utf8 => bytes,
        TextEncoding::Windows1252 => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(&bytes);
            text.into_owned().into_bytes()
        }
    }
}

/// Encodes UTF-8 text back into the file's encoding.
pub fn encode_text(text: &str, encoding: TextEncoding) -> Result<Cow<'_, [u8]>, ExtractError> {
    match encoding {
        TextEncoding::Utf8 => Ok(Cow::Borrowed(text.as_bytes())),
        TextEncoding::Windows1252 => {
            let (bytes, _, unmappable) = WINDOWS_1252.encode(text);
            if unmappable {
                return Err(ExtractError::Unencodable {
                    encoding: encoding.label(),
                });
            }
            Ok(bytes)
        }
    }
}
