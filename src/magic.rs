//! Leading-byte signatures of the media formats the sources serve

use crate::types::MediaKind;

/// Bytes needed to recognise every supported signature
pub const SNIFF_LEN: usize = 512;

/// A recognised container or image format
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Signature {
    /// JPEG
    Jpeg,
    /// PNG
    Png,
    /// GIF87a / GIF89a
    Gif,
    /// WebP (RIFF)
    WebP,
    /// AVIF (ISO BMFF)
    Avif,
    /// HEIC/HEIF (ISO BMFF)
    Heic,
    /// Windows bitmap
    Bmp,
    /// TIFF, either byte order
    Tiff,
    /// MP4 / M4V / 3GP (ISO BMFF)
    Mp4,
    /// QuickTime MOV
    QuickTime,
    /// WebM (Matroska with the webm doctype)
    WebM,
    /// Matroska
    Matroska,
    /// Ogg container
    Ogg,
    /// AVI (RIFF)
    Avi,
    /// SVG (XML text)
    Svg,
}

impl Signature {
    /// Media kind the format carries
    pub fn kind(&self) -> MediaKind {
        match self {
            Signature::Jpeg
            | Signature::Png
            | Signature::Gif
            | Signature::WebP
            | Signature::Avif
            | Signature::Heic
            | Signature::Bmp
            | Signature::Tiff
            | Signature::Svg => MediaKind::Image,
            Signature::Mp4
            | Signature::QuickTime
            | Signature::WebM
            | Signature::Matroska
            | Signature::Ogg
            | Signature::Avi => MediaKind::Video,
        }
    }

    /// Conventional file extension
    pub fn extension(&self) -> &'static str {
        match self {
            Signature::Jpeg => "jpg",
            Signature::Png => "png",
            Signature::Gif => "gif",
            Signature::WebP => "webp",
            Signature::Avif => "avif",
            Signature::Heic => "heic",
            Signature::Bmp => "bmp",
            Signature::Tiff => "tif",
            Signature::Mp4 => "mp4",
            Signature::QuickTime => "mov",
            Signature::WebM => "webm",
            Signature::Matroska => "mkv",
            Signature::Ogg => "ogv",
            Signature::Avi => "avi",
            Signature::Svg => "svg",
        }
    }
}

/// Identify the format from the first bytes of a payload
pub fn sniff(head: &[u8]) -> Option<Signature> {
    if head.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(Signature::Jpeg);
    }
    if head.starts_with(b"\x89PNG\r\n\x1a\n") {
        return Some(Signature::Png);
    }
    if head.starts_with(b"GIF87a") || head.starts_with(b"GIF89a") {
        return Some(Signature::Gif);
    }
    if head.starts_with(b"RIFF") && head.len() >= 12 {
        return match &head[8..12] {
            b"WEBP" => Some(Signature::WebP),
            b"AVI " => Some(Signature::Avi),
            _ => None,
        };
    }
    if head.len() >= 12 && &head[4..8] == b"ftyp" {
        return Some(match &head[8..12] {
            b"avif" | b"avis" => Signature::Avif,
            b"heic" | b"heix" | b"heim" | b"heis" | b"mif1" | b"msf1" => Signature::Heic,
            b"qt  " => Signature::QuickTime,
            _ => Signature::Mp4,
        });
    }
    if head.starts_with(&[0x1A, 0x45, 0xDF, 0xA3]) {
        let is_webm = head.windows(4).any(|w| w == b"webm");
        return Some(if is_webm {
            Signature::WebM
        } else {
            Signature::Matroska
        });
    }
    if head.starts_with(b"OggS") {
        return Some(Signature::Ogg);
    }
    if head.starts_with(b"II*\0") || head.starts_with(b"MM\0*") {
        return Some(Signature::Tiff);
    }
    if head.starts_with(b"BM") && head.len() >= 14 {
        return Some(Signature::Bmp);
    }
    if is_svg(head) {
        return Some(Signature::Svg);
    }
    None
}

/// An `<svg>` root, possibly after a BOM, an XML declaration, comments or an SVG doctype
fn is_svg(head: &[u8]) -> bool {
    let head = head.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(head);
    let start = head
        .iter()
        .position(|b| !b.is_ascii_whitespace())
        .unwrap_or(head.len());
    let text = head[start..].to_ascii_lowercase();
    let contains = |needle: &[u8]| text.windows(needle.len()).any(|w| w == needle);

    if text.starts_with(b"<svg") {
        return true;
    }
    let preamble = text.starts_with(b"<?xml")
        || text.starts_with(b"<!--")
        || text.starts_with(b"<!doctype svg");
    preamble && contains(b"<svg") && !contains(b"<html")
}
