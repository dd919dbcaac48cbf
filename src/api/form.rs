//! `multipart/form-data` upload bodies.
//!
//! The body is fed to `multer` in fixed-size chunks read from the connection
//! and the parse is driven to completion on the connection thread. The file
//! part is spooled straight to a temp file; plain fields are kept as text.

use std::collections::HashMap;
use std::io::{Read, Write};

use bytes::Bytes;
use futures::executor::block_on;
use futures::stream;
use tempfile::NamedTempFile;

use super::http::RequestError;
use super::{extension, secure_filename};

const CHUNK_BYTES: usize = 64 * 1024;

pub(crate) struct UploadedFile {
    /// Client-supplied filename, unsanitized. May be empty.
    pub filename: String,
    pub spool: NamedTempFile,
    pub size: u64,
}

#[derive(Default)]
pub(crate) struct Form {
    pub file: Option<UploadedFile>,
    pub fields: HashMap<String, String>,
}

impl Form {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

pub(crate) fn is_multipart(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|value| {
        value
            .trim_start()
            .to_ascii_lowercase()
            .starts_with("multipart/form-data")
    })
}

struct BodyChunks<R> {
    reader: R,
    done: bool,
}

impl<R: Read> Iterator for BodyChunks<R> {
    type Item = std::io::Result<Bytes>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut buf = vec![0u8; CHUNK_BYTES];
        match self.reader.read(&mut buf) {
            Ok(0) => {
                self.done = true;
                None
            }
            Ok(n) => {
                buf.truncate(n);
                Some(Ok(Bytes::from(buf)))
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

fn malformed(err: multer::Error) -> RequestError {
    RequestError::Malformed(format!("invalid multipart body: {}", err))
}

/// Parse a whole form body. `file_fields` lists the accepted file part names
/// in order of preference; the most preferred one present wins.
pub(crate) fn read_form<R: Read + Send>(
    body: R,
    content_type: &str,
    file_fields: &[&str],
) -> Result<Form, RequestError> {
    let boundary = multer::parse_boundary(content_type).map_err(malformed)?;
    let chunks = stream::iter(BodyChunks {
        reader: body,
        done: false,
    });
    let mut multipart = multer::Multipart::new(chunks, boundary);

    block_on(async {
        let mut form = Form::default();
        let mut rank = usize::MAX;
        while let Some(mut field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match file_fields.iter().position(|accepted| *accepted == name) {
                Some(pos) if pos < rank => {
                    let filename = field.file_name().unwrap_or_default().to_string();
                    let ext = extension(&secure_filename(&filename));
                    let mut spool = tempfile::Builder::new()
                        .prefix("mareye-upload-")
                        .suffix(&format!(".{}", ext))
                        .tempfile()?;
                    let mut size = 0u64;
                    while let Some(chunk) = field.chunk().await.map_err(malformed)? {
                        spool.write_all(&chunk)?;
                        size += chunk.len() as u64;
                    }
                    spool.flush()?;
                    rank = pos;
                    form.file = Some(UploadedFile {
                        filename,
                        spool,
                        size,
                    });
                }
                Some(_) => {
                    while field.chunk().await.map_err(malformed)?.is_some() {}
                }
                None if field.file_name().is_some() => {
                    log::debug!("ignoring unexpected file part '{}'", name);
                    while field.chunk().await.map_err(malformed)?.is_some() {}
                }
                None => {
                    let value = field.text().await.map_err(malformed)?;
                    form.fields.insert(name, value);
                }
            }
        }
        Ok::<Form, RequestError>(form)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=XyZ";

    fn body(parts: &[(&str, Option<&str>, &[u8])]) -> Vec<u8> {
        let mut out = Vec::new();
        for (name, filename, data) in parts {
            out.extend_from_slice(b"--XyZ\r\n");
            match filename {
                Some(filename) => out.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
                    )
                    .as_bytes(),
                ),
                None => out.extend_from_slice(
                    format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes(),
                ),
            }
            out.extend_from_slice(data);
            out.extend_from_slice(b"\r\n");
        }
        out.extend_from_slice(b"--XyZ--\r\n");
        out
    }

    #[test]
    fn recognizes_form_content_types() {
        assert!(is_multipart(Some("multipart/form-data; boundary=abc")));
        assert!(is_multipart(Some("Multipart/Form-Data; boundary=abc")));
        assert!(!is_multipart(Some("application/octet-stream")));
        assert!(!is_multipart(None));
    }

    #[test]
    fn spools_file_part_and_keeps_text_fields() {
        let payload: &[u8] = b"\x00\x01binary\r\n--not-a-boundary";
        let raw = body(&[
            ("frame_interval", None, &b"15"[..]),
            ("video", Some("dive clip.MP4"), payload),
        ]);
        let form = read_form(Cursor::new(raw), CONTENT_TYPE, &["file", "video"]).unwrap();

        assert_eq!(form.field("frame_interval"), Some("15"));
        let file = form.file.unwrap();
        assert_eq!(file.filename, "dive clip.MP4");
        assert_eq!(file.size, payload.len() as u64);
        assert!(file.spool.path().to_string_lossy().ends_with(".mp4"));
        assert_eq!(std::fs::read(file.spool.path()).unwrap(), payload);
    }

    #[test]
    fn preferred_file_field_wins() {
        let raw = body(&[
            ("image", Some("second.png"), &b"bb"[..]),
            ("file", Some("first.png"), &b"a"[..]),
            ("image", Some("third.png"), &b"ccc"[..]),
        ]);
        let form = read_form(Cursor::new(raw), CONTENT_TYPE, &["file", "image"]).unwrap();
        assert_eq!(form.file.unwrap().filename, "first.png");
    }

    #[test]
    fn missing_file_part_and_bad_boundary() {
        let raw = body(&[("notes", None, &b"hello"[..])]);
        let form = read_form(Cursor::new(raw), CONTENT_TYPE, &["file"]).unwrap();
        assert!(form.file.is_none());

        let err = read_form(Cursor::new(Vec::new()), "multipart/form-data", &["file"]);
        assert!(matches!(err, Err(RequestError::Malformed(_))));
    }
}
