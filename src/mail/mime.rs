//! Turns a raw RFC 822 message into a [`MessageSummary`].
//!
//! Decoding never fails as a whole: a part that cannot be decoded is logged
//! and skipped, and a message without a usable body gets an empty one.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use encoding_rs::{Encoding, UTF_8};
use image::ImageFormat;
use log::{debug, warn};
use mailparse::body::Body;
use mailparse::{DispositionType, MailHeader, MailHeaderMap, ParsedMail};

use crate::domain::email::{Attachment, BodyFormat, InlineImage, MessageSummary, RawMessage};
use crate::error::DecodeError;

/// Largest inline image kept, in decoded bytes.
pub const MAX_INLINE_IMAGE_BYTES: usize = 10 * 1024 * 1024;
pub const MAX_INLINE_IMAGES: usize = 32;
/// Cap on the assembled body text, in bytes.
pub const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;
pub const MAX_PARTS: usize = 512;
/// Above this many declared boundaries only the headers are decoded; the
/// MIME parser recurses once per nesting level.
pub const MAX_MULTIPART_BOUNDARIES: usize = 64;

enum PartKind {
    Body(BodyFormat),
    InlineImage,
    Other,
}

#[derive(Default)]
struct Collected {
    html: Vec<String>,
    plain: Vec<String>,
    images: Vec<InlineImage>,
    attachments: Vec<Attachment>,
}

/// Decodes headers, body text, inline images and attachment names of `raw`.
pub fn decode(raw: &RawMessage) -> MessageSummary {
    let mut summary = MessageSummary {
        id: raw.id.clone(),
        ..MessageSummary::default()
    };

    let boundaries = count_boundaries(&raw.rfc822);
    if boundaries > MAX_MULTIPART_BOUNDARIES {
        warn!(
            "Message {} declares {boundaries} multipart boundaries; decoding headers only",
            raw.id
        );
        fill_headers_only(&mut summary, &raw.rfc822);
        return summary;
    }

    let parsed = match mailparse::parse_mail(&raw.rfc822) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Message {} is not parseable MIME: {e}", raw.id);
            fill_headers_only(&mut summary, &raw.rfc822);
            return summary;
        }
    };

    fill_headers(&mut summary, &parsed.headers);

    let collected = walk(&raw.id, &parsed);
    let (format, texts) = if collected.html.is_empty() {
        (BodyFormat::Plain, collected.plain)
    } else {
        (BodyFormat::Html, collected.html)
    };
    summary.body = texts.join("\n");
    truncate_at_char_boundary(&mut summary.body, MAX_BODY_BYTES);
    summary.body_format = format;
    summary.inline_images = collected.images;
    summary.attachments = collected.attachments;
    summary
}

/// Depth-first, in encounter order, with an explicit stack.
fn walk(id: &str, root: &ParsedMail<'_>) -> Collected {
    let mut collected = Collected::default();
    let mut stack: Vec<&ParsedMail<'_>> = vec![root];
    let mut visited = 0usize;

    while let Some(part) = stack.pop() {
        visited += 1;
        if visited > MAX_PARTS {
            warn!("Message {id} has more than {MAX_PARTS} parts; ignoring the rest");
            break;
        }

        if part.ctype.mimetype.starts_with("multipart/") {
            stack.extend(part.subparts.iter().rev());
            continue;
        }

        match classify(part) {
            PartKind::Body(format) => match decode_text(part) {
                Ok(text) if format == BodyFormat::Html => collected.html.push(text),
                Ok(text) => collected.plain.push(text),
                Err(e) => debug!("Message {id}: skipping {} part: {e}", part.ctype.mimetype),
            },
            PartKind::InlineImage => {
                if collected.images.len() >= MAX_INLINE_IMAGES {
                    debug!("Message {id}: inline image limit reached");
                    continue;
                }
                match inline_image(part) {
                    Ok(image) => collected.images.push(image),
                    Err(e) => debug!("Message {id}: skipping inline {}: {e}", part.ctype.mimetype),
                }
            }
            PartKind::Other => {
                if let Some(attachment) = attachment(part) {
                    collected.attachments.push(attachment);
                }
            }
        }
    }

    collected
}

fn classify(part: &ParsedMail<'_>) -> PartKind {
    let mime = part.ctype.mimetype.as_str();
    let disposition = part.get_content_disposition();
    let has_filename =
        disposition.params.contains_key("filename") || part.ctype.params.contains_key("name");

    match mime {
        "text/html" if !has_filename => return PartKind::Body(BodyFormat::Html),
        "text/plain" if !has_filename => return PartKind::Body(BodyFormat::Plain),
        _ => {}
    }

    // mailparse reports `inline` when the header is absent, so look for it.
    let declared_inline = part.headers.get_first_header("Content-Disposition").is_some()
        && matches!(disposition.disposition, DispositionType::Inline);

    if !mime.starts_with("text/") && (declared_inline || content_id(part).is_some()) {
        PartKind::InlineImage
    } else {
        PartKind::Other
    }
}

fn inline_image(part: &ParsedMail<'_>) -> Result<InlineImage, DecodeError> {
    let data = transfer_decode(part)?;
    if data.len() > MAX_INLINE_IMAGE_BYTES {
        return Err(DecodeError::TooLarge {
            size: data.len(),
            limit: MAX_INLINE_IMAGE_BYTES,
        });
    }
    verify_image(&part.ctype.mimetype, &data)?;

    let content_id = content_id(part).or_else(|| filename(part)).unwrap_or_default();

    Ok(InlineImage {
        content_id,
        mime_type: part.ctype.mimetype.clone(),
        data,
    })
}

/// Rejects `image/*` payloads the image decoder cannot read to the end, so a
/// truncated picture never reaches the viewer. Types the decoder does not
/// know (SVG and friends) are passed through untouched.
fn verify_image(mime: &str, data: &[u8]) -> Result<(), DecodeError> {
    if !mime.starts_with("image/") {
        return Ok(());
    }
    let format = match image::guess_format(data) {
        Ok(format) => format,
        Err(e) if ImageFormat::from_mime_type(mime).is_some() => return Err(e.into()),
        Err(_) => return Ok(()),
    };
    image::load_from_memory_with_format(data, format)?;
    Ok(())
}

fn attachment(part: &ParsedMail<'_>) -> Option<Attachment> {
    let filename = filename(part)?;
    Some(Attachment {
        filename,
        mime_type: part.ctype.mimetype.clone(),
        size: transfer_decode(part).ok().map(|data| data.len()),
    })
}

fn filename(part: &ParsedMail<'_>) -> Option<String> {
    part.get_content_disposition()
        .params
        .get("filename")
        .or_else(|| part.ctype.params.get("name"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}

fn content_id(part: &ParsedMail<'_>) -> Option<String> {
    part.headers
        .get_first_value("Content-ID")
        .map(|v| {
            v.trim()
                .trim_start_matches('<')
                .trim_end_matches('>')
                .trim()
                .to_string()
        })
        .filter(|v| !v.is_empty())
}

/// Body text in its declared charset; UTF-8 when the charset is missing or
/// unknown. Undecodable sequences become U+FFFD. Trailing line breaks are
/// dropped so joined parts stay one newline apart.
fn decode_text(part: &ParsedMail<'_>) -> Result<String, DecodeError> {
    let bytes = transfer_decode(part)?;
    let encoding = part
        .ctype
        .params
        .get("charset")
        .and_then(|label| Encoding::for_label(label.trim().as_bytes()))
        .unwrap_or(UTF_8);

    let (text, used, had_errors) = encoding.decode(&bytes);
    if had_errors {
        debug!("Replaced malformed {} sequences in text part", used.name());
    }
    Ok(text.trim_end_matches(['\r', '\n']).to_string())
}

fn transfer_decode(part: &ParsedMail<'_>) -> Result<Vec<u8>, DecodeError> {
    match part.get_body_encoded() {
        Body::Base64(body) => decode_base64(body.get_raw()),
        Body::QuotedPrintable(body) => Ok(body.get_decoded()?),
        Body::SevenBit(body) | Body::EightBit(body) => Ok(body.get_raw().to_vec()),
        Body::Binary(body) => Ok(body.get_raw().to_vec()),
    }
}

fn decode_base64(raw: &[u8]) -> Result<Vec<u8>, DecodeError> {
    let cleaned: Vec<u8> = raw
        .iter()
        .copied()
        .filter(|b| !b.is_ascii_whitespace())
        .collect();
    Ok(STANDARD.decode(cleaned)?)
}

fn header_value(headers: &[MailHeader<'_>], name: &str) -> String {
    headers
        .get_first_value(name)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn fill_headers(summary: &mut MessageSummary, headers: &[MailHeader<'_>]) {
    summary.sender = header_value(headers, "From");
    summary.subject = header_value(headers, "Subject");
    summary.date = header_value(headers, "Date");
    if !summary.date.is_empty() {
        summary.timestamp = mailparse::dateparse(&summary.date).ok();
    }
}

fn fill_headers_only(summary: &mut MessageSummary, rfc822: &[u8]) {
    if let Ok((headers, _)) = mailparse::parse_headers(rfc822) {
        fill_headers(summary, &headers);
    }
}

/// Counts `boundary` parameters of `Content-Type` fields in header blocks.
/// A header block starts the message and follows every `--` delimiter line;
/// it ends at the first empty line. Body text is never counted.
fn count_boundaries(rfc822: &[u8]) -> usize {
    let mut count = 0;
    let mut in_headers = true;
    let mut in_content_type = false;

    for line in rfc822.split(|&b| b == b'\n') {
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if line.is_empty() {
            in_headers = false;
            in_content_type = false;
            continue;
        }
        if line.starts_with(b"--") {
            in_headers = true;
            in_content_type = false;
            continue;
        }
        if !in_headers {
            continue;
        }

        let folded = matches!(line[0], b' ' | b'\t');
        if !folded {
            in_content_type = line.len() >= 13 && line[..13].eq_ignore_ascii_case(b"content-type:");
        }
        if in_content_type {
            count += boundary_params(line);
        }
    }
    count
}

/// Occurrences of `boundary` followed by optional blanks and `=`.
fn boundary_params(line: &[u8]) -> usize {
    const NAME: &[u8] = b"boundary";
    line.windows(NAME.len())
        .enumerate()
        .filter(|(_, w)| w.eq_ignore_ascii_case(NAME))
        .filter(|(at, _)| {
            line[at + NAME.len()..]
                .iter()
                .find(|&&b| b != b' ' && b != b'\t')
                == Some(&b'=')
        })
        .count()
}

fn truncate_at_char_boundary(s: &mut String, max: usize) {
    if s.len() <= max {
        return;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    s.truncate(cut);
}
