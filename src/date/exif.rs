//! Minimal EXIF reader: locates the APP1 `Exif` segment of a JPEG stream and
//! pulls `DateTimeOriginal` out of its Exif sub-IFD.

use chrono::NaiveDateTime;
use thiserror::Error;

const EXIF_HEADER: &[u8] = b"Exif\0\0";
const TIFF_HEADER_LEN: usize = 8;
const IFD_ENTRY_LEN: usize = 12;
const MAX_IFD_ENTRIES: u16 = 4096;

const TAG_EXIF_IFD: u16 = 0x8769;
const TAG_DATE_TIME_ORIGINAL: u16 = 0x9003;
const TYPE_ASCII: u16 = 2;
const TYPE_LONG: u16 = 4;

pub const EXIF_DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

#[derive(Debug, Error)]
pub enum ExifError {
    #[error("not a jpeg stream")]
    NotJpeg,
    #[error("no exif segment")]
    Missing,
    #[error("truncated exif data")]
    Truncated,
    #[error("invalid tiff header")]
    BadHeader,
    #[error("tiff IFD entry count too large")]
    TooManyEntries,
    #[error("DateTimeOriginal not present")]
    NoDate,
    #[error("malformed date value: {0}")]
    BadDate(String),
}

#[derive(Debug, Clone, Copy)]
enum Endian {
    Little,
    Big,
}

/// Capture date recorded by the camera, if the stream carries a readable one.
pub fn extract_capture_date(jpeg: &[u8]) -> Result<NaiveDateTime, ExifError> {
    let tiff = find_exif_payload(jpeg)?;
    date_time_original(tiff)
}

/// Walks the JPEG marker segments up to start-of-scan looking for APP1 `Exif`.
pub fn find_exif_payload(jpeg: &[u8]) -> Result<&[u8], ExifError> {
    if jpeg.len() < 2 || jpeg[0] != 0xFF || jpeg[1] != 0xD8 {
        return Err(ExifError::NotJpeg);
    }
    let mut pos = 2usize;
    while pos + 1 < jpeg.len() {
        if jpeg[pos] != 0xFF {
            return Err(ExifError::Missing);
        }
        let marker = jpeg[pos + 1];
        match marker {
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD7 => {
                pos += 2;
                continue;
            }
            0xD9 | 0xDA => return Err(ExifError::Missing),
            _ => {}
        }
        let len_bytes = jpeg.get(pos + 2..pos + 4).ok_or(ExifError::Truncated)?;
        let seg_len = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if seg_len < 2 {
            return Err(ExifError::Truncated);
        }
        let body_end = (pos + 2 + seg_len).min(jpeg.len());
        let body = &jpeg[pos + 4..body_end];
        if marker == 0xE1 && body.starts_with(EXIF_HEADER) {
            return Ok(&body[EXIF_HEADER.len()..]);
        }
        pos += 2 + seg_len;
    }
    Err(ExifError::Missing)
}

fn date_time_original(tiff: &[u8]) -> Result<NaiveDateTime, ExifError> {
    let header = tiff.get(..TIFF_HEADER_LEN).ok_or(ExifError::Truncated)?;
    let endian = match &header[0..4] {
        [0x49, 0x49, 0x2A, 0x00] => Endian::Little,
        [0x4D, 0x4D, 0x00, 0x2A] => Endian::Big,
        _ => return Err(ExifError::BadHeader),
    };
    let ifd0 = read_u32(&header[4..8], endian) as usize;

    let exif_entry = find_entry(tiff, ifd0, TAG_EXIF_IFD, endian)?.ok_or(ExifError::NoDate)?;
    if exif_entry.typ != TYPE_LONG {
        return Err(ExifError::NoDate);
    }
    let exif_ifd = read_u32(&exif_entry.value, endian) as usize;

    let date_entry =
        find_entry(tiff, exif_ifd, TAG_DATE_TIME_ORIGINAL, endian)?.ok_or(ExifError::NoDate)?;
    if date_entry.typ != TYPE_ASCII {
        return Err(ExifError::NoDate);
    }
    let count = date_entry.count as usize;
    let raw = if count <= 4 {
        &date_entry.value[..count]
    } else {
        let offset = read_u32(&date_entry.value, endian) as usize;
        tiff.get(offset..offset.saturating_add(count))
            .ok_or(ExifError::Truncated)?
    };
    parse_exif_date(raw)
}

/// Parses an EXIF ASCII date (`YYYY:MM:DD HH:MM:SS`, NUL terminated).
pub fn parse_exif_date(raw: &[u8]) -> Result<NaiveDateTime, ExifError> {
    let text = std::str::from_utf8(raw)
        .map_err(|_| ExifError::BadDate(String::from_utf8_lossy(raw).into_owned()))?;
    let text = text.trim_end_matches(['\0', ' ']);
    NaiveDateTime::parse_from_str(text, EXIF_DATE_FORMAT)
        .map_err(|_| ExifError::BadDate(text.to_string()))
}

struct IfdEntry {
    typ: u16,
    count: u32,
    value: [u8; 4],
}

fn find_entry(
    tiff: &[u8],
    ifd_offset: usize,
    tag: u16,
    endian: Endian,
) -> Result<Option<IfdEntry>, ExifError> {
    if ifd_offset < TIFF_HEADER_LEN {
        return Err(ExifError::BadHeader);
    }
    let count_buf = tiff
        .get(ifd_offset..ifd_offset + 2)
        .ok_or(ExifError::Truncated)?;
    let count = read_u16(count_buf, endian);
    if count > MAX_IFD_ENTRIES {
        return Err(ExifError::TooManyEntries);
    }
    for i in 0..count as usize {
        let entry_start = ifd_offset + 2 + i * IFD_ENTRY_LEN;
        let entry = tiff
            .get(entry_start..entry_start + IFD_ENTRY_LEN)
            .ok_or(ExifError::Truncated)?;
        if read_u16(&entry[0..2], endian) != tag {
            continue;
        }
        return Ok(Some(IfdEntry {
            typ: read_u16(&entry[2..4], endian),
            count: read_u32(&entry[4..8], endian),
            value: [entry[8], entry[9], entry[10], entry[11]],
        }));
    }
    Ok(None)
}

fn read_u16(bytes: &[u8], endian: Endian) -> u16 {
    match endian {
        Endian::Little => u16::from_le_bytes([bytes[0], bytes[1]]),
        Endian::Big => u16::from_be_bytes([bytes[0], bytes[1]]),
    }
}

fn read_u32(bytes: &[u8], endian: Endian) -> u32 {
    match endian {
        Endian::Little => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
        Endian::Big => u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}
