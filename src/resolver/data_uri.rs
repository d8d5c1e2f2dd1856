use base64::Engine;

use crate::error::{ImportError, Result};

/// A `data:` URI split into its parts. The payload stays borrowed until
/// [`DataUri::decode`] is called.
pub(crate) struct DataUri<'a> {
    pub mime_type: &'a str,
    base64: bool,
    data: &'a str,
}

impl<'a> DataUri<'a> {
    /// `None` when `uri` is not a data URI at all.
    pub fn parse(uri: &'a str) -> Option<DataUri<'a>> {
        let uri = uri.strip_prefix("data:")?;
        let (mime_type, data) = uri.split_once(',')?;
        let (mime_type, base64) = match mime_type.strip_suffix(";base64") {
            Some(mime_type) => (mime_type, true),
            None => (mime_type, false),
        };
        Some(DataUri {
            mime_type,
            base64,
            data,
        })
    }

    pub fn decode(&self) -> Result<Vec<u8>> {
        if self.base64 {
            Ok(base64::engine::general_purpose::STANDARD.decode(self.data)?)
        } else {
            Ok(percent_encoding::percent_decode_str(self.data).collect())
        }
    }

    pub fn mime_type(&self) -> Option<&'a str> {
        (!self.mime_type.is_empty()).then_some(self.mime_type)
    }
}

const BUFFER_MIME_TYPES: &[&str] = &["application/octet-stream", "application/gltf-buffer", ""];

pub(crate) fn decode_buffer_uri(uri: &str) -> Result<Option<Vec<u8>>> {
    let Some(data_uri) = DataUri::parse(uri) else {
        return Ok(None);
    };
    if !BUFFER_MIME_TYPES.contains(&data_uri.mime_type) {
        return Err(ImportError::UnsupportedDataUri(data_uri.mime_type.to_owned()));
    }
    data_uri.decode().map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_payloads() {
        let uri = "data:application/octet-stream;base64,AAECAw==";
        assert_eq!(decode_buffer_uri(uri).unwrap(), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn plain_uris_are_not_data() {
        assert!(decode_buffer_uri("buffer.bin").unwrap().is_none());
    }

    #[test]
    fn image_mime_is_not_a_buffer() {
        assert!(matches!(
            decode_buffer_uri("data:image/png;base64,AAAA"),
            Err(ImportError::UnsupportedDataUri(mime)) if mime == "image/png"
        ));
    }

    #[test]
    fn bad_base64_is_an_error() {
        assert!(matches!(
            decode_buffer_uri("data:application/octet-stream;base64,@@@"),
            Err(ImportError::Base64(_))
        ));
    }

    #[test]
    fn mime_type_is_optional() {
        let uri = DataUri::parse("data:;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type(), None);
        let uri = DataUri::parse("data:image/jpeg;base64,AAAA").unwrap();
        assert_eq!(uri.mime_type(), Some("image/jpeg"));
    }
}
