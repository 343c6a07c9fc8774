//! Content type resolution for uploads
//!
//! Resolution order, first match wins:
//! 1. the path's file extension, via the `mime_guess` table
//! 2. the leading [`SNIFF_LEN`] bytes of the content, via magic numbers
//! 3. nothing, in which case the upload carries no content type
//!
//! When the content has to be sniffed, the sniffed bytes are put back in front
//! of the rest of the stream so the upload body is unchanged.

use std::io::Cursor;

use mime::Mime;
use tokio::io::AsyncReadExt;

use crate::errors::{Result, StorageError};
use crate::storage::ObjectReader;

/// Number of leading bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 512;

/// Content type from the path's extension, if the extension is known.
pub fn from_extension(path: &str) -> Option<Mime> {
    mime_guess::from_path(path).first()
}

/// Resolve the content type for `path`, sniffing `content` if needed.
///
/// Returns the content type (if any) and the body to upload, which always
/// yields exactly the bytes `content` would have.
pub async fn resolve(path: &str, mut content: ObjectReader) -> Result<(Option<Mime>, ObjectReader)> {
    if let Some(mime) = from_extension(path) {
        return Ok((Some(mime), content));
    }

    let mut prefix = Vec::with_capacity(SNIFF_LEN);
    (&mut content)
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut prefix)
        .await
        .map_err(StorageError::Read)?;

    let mime = sniff(&prefix);
    let body: ObjectReader = Box::pin(Cursor::new(prefix).chain(content));
    Ok((mime, body))
}

/// Content type from leading bytes.
///
/// Follows the WHATWG MIME sniffing signatures. Empty input has nothing to
/// sniff and yields `None`; unrecognised binary data is
/// `application/octet-stream`.
pub fn sniff(data: &[u8]) -> Option<Mime> {
    if data.is_empty() {
        return None;
    }
    let data = &data[..data.len().min(SNIFF_LEN)];
    let first_non_ws = data
        .iter()
        .position(|b| !is_whitespace(*b))
        .unwrap_or(data.len());

    let detected = SIGNATURES
        .iter()
        .find_map(|sig| sig.matches(data, first_non_ws))
        .unwrap_or("application/octet-stream");
    detected.parse().ok()
}

enum Signature {
    /// Case-insensitive HTML tag after leading whitespace, followed by a
    /// space or `>`.
    Html(&'static [u8]),
    Masked {
        mask: &'static [u8],
        pattern: &'static [u8],
        skip_ws: bool,
        mime: &'static str,
    },
    Exact(&'static [u8], &'static str),
    Mp4,
    Text,
}

const fn exact(pattern: &'static [u8], mime: &'static str) -> Signature {
    Signature::Exact(pattern, mime)
}

const fn masked(mask: &'static [u8], pattern: &'static [u8], mime: &'static str) -> Signature {
    Signature::Masked {
        mask,
        pattern,
        skip_ws: false,
        mime,
    }
}

const HTML: &str = "text/html; charset=utf-8";

static SIGNATURES: &[Signature] = &[
    Signature::Html(b"<!DOCTYPE HTML"),
    Signature::Html(b"<HTML"),
    Signature::Html(b"<HEAD"),
    Signature::Html(b"<SCRIPT"),
    Signature::Html(b"<IFRAME"),
    Signature::Html(b"<H1"),
    Signature::Html(b"<DIV"),
    Signature::Html(b"<FONT"),
    Signature::Html(b"<TABLE"),
    Signature::Html(b"<A"),
    Signature::Html(b"<STYLE"),
    Signature::Html(b"<TITLE"),
    Signature::Html(b"<B"),
    Signature::Html(b"<BODY"),
    Signature::Html(b"<BR"),
    Signature::Html(b"<P"),
    Signature::Html(b"<!--"),
    Signature::Masked {
        mask: b"\xFF\xFF\xFF\xFF\xFF",
        pattern: b"<?xml",
        skip_ws: true,
        mime: "text/xml; charset=utf-8",
    },
    exact(b"%PDF-", "application/pdf"),
    exact(b"%!PS-Adobe-", "application/postscript"),
    // byte order marks
    masked(b"\xFF\xFF\x00\x00", b"\xFE\xFF\x00\x00", "text/plain; charset=utf-16be"),
    masked(b"\xFF\xFF\x00\x00", b"\xFF\xFE\x00\x00", "text/plain; charset=utf-16le"),
    masked(b"\xFF\xFF\xFF", b"\xEF\xBB\xBF", "text/plain; charset=utf-8"),
    // images
    exact(b"\x00\x00\x01\x00", "image/x-icon"),
    exact(b"\x00\x00\x02\x00", "image/x-icon"),
    exact(b"BM", "image/bmp"),
    exact(b"GIF87a", "image/gif"),
    exact(b"GIF89a", "image/gif"),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WEBPVP",
        "image/webp",
    ),
    exact(b"\x89PNG\x0D\x0A\x1A\x0A", "image/png"),
    exact(b"\xFF\xD8\xFF", "image/jpeg"),
    // audio and video
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"FORM\x00\x00\x00\x00AIFF",
        "audio/aiff",
    ),
    masked(b"\xFF\xFF\xFF", b"ID3", "audio/mpeg"),
    masked(b"\xFF\xFF\xFF\xFF\xFF", b"OggS\x00", "application/ogg"),
    masked(
        b"\xFF\xFF\xFF\xFF\xFF\xFF\xFF\xFF",
        b"MThd\x00\x00\x00\x06",
        "audio/midi",
    ),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00AVI ",
        "video/avi",
    ),
    masked(
        b"\xFF\xFF\xFF\xFF\x00\x00\x00\x00\xFF\xFF\xFF\xFF",
        b"RIFF\x00\x00\x00\x00WAVE",
        "audio/wave",
    ),
    Signature::Mp4,
    exact(b"\x1A\x45\xDF\xA3", "video/webm"),
    // fonts
    masked(
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\xFF\xFF",
        b"\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00\x00LP",
        "application/vnd.ms-fontobject",
    ),
    exact(b"\x00\x01\x00\x00", "font/ttf"),
    exact(b"OTTO", "font/otf"),
    exact(b"ttcf", "font/collection"),
    exact(b"wOFF", "font/woff"),
    exact(b"wOF2", "font/woff2"),
    // archives
    exact(b"\x1F\x8B\x08", "application/x-gzip"),
    exact(b"PK\x03\x04", "application/zip"),
    exact(b"Rar!\x1A\x07\x00", "application/x-rar-compressed"),
    exact(b"Rar!\x1A\x07\x01\x00", "application/x-rar-compressed"),
    exact(b"\x00\x61\x73\x6D", "application/wasm"),
    Signature::Text,
];

impl Signature {
    fn matches(&self, data: &[u8], first_non_ws: usize) -> Option<&'static str> {
        match self {
            Signature::Html(tag) => {
                let data = &data[first_non_ws..];
                // tag plus the terminating byte
                if data.len() < tag.len() + 1 {
                    return None;
                }
                let same = data
                    .iter()
                    .zip(tag.iter())
                    .all(|(b, t)| b.to_ascii_uppercase() == *t);
                let terminated = matches!(data[tag.len()], b' ' | b'>');
                (same && terminated).then_some(HTML)
            }
            Signature::Masked {
                mask,
                pattern,
                skip_ws,
                mime,
            } => {
                let data = if *skip_ws { &data[first_non_ws..] } else { data };
                if data.len() < pattern.len() {
                    return None;
                }
                data.iter()
                    .zip(mask.iter())
                    .zip(pattern.iter())
                    .all(|((b, m), p)| b & m == *p)
                    .then_some(*mime)
            }
            Signature::Exact(pattern, mime) => data.starts_with(pattern).then_some(*mime),
            Signature::Mp4 => is_mp4(data).then_some("video/mp4"),
            Signature::Text => data[first_non_ws..]
                .iter()
                .all(|b| !is_binary(*b))
                .then_some("text/plain; charset=utf-8"),
        }
    }
}

fn is_mp4(data: &[u8]) -> bool {
    if data.len() < 12 {
        return false;
    }
    let box_size = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if data.len() < box_size || box_size % 4 != 0 {
        return false;
    }
    if &data[4..8] != b"ftyp" {
        return false;
    }
    // major brand, then compatible brands after the minor version
    (8..box_size)
        .step_by(4)
        .filter(|st| *st != 12)
        .any(|st| data.get(st..st + 3) == Some(&b"mp4"[..]))
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b'\t' | b'\n' | b'\x0C' | b'\r' | b' ')
}

fn is_binary(b: u8) -> bool {
    matches!(b, 0x00..=0x08 | 0x0B | 0x0E..=0x1A | 0x1C..=0x1F)
}
