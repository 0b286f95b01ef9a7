//! Email (`.eml`) text extraction.
//!
//! Mirrors the usual mail-client behavior: prefer the first `text/plain` part
//! of a multipart message, otherwise fall back to the top-level body. Subject,
//! sender, recipient, and date headers are captured as document metadata.

use super::{LoadedDocument, LoaderError};
use mailparse::{MailHeaderMap, ParsedMail};
use serde_json::{Map, Value};

pub(super) fn extract(bytes: &[u8]) -> Result<LoadedDocument, LoaderError> {
    let mail = mailparse::parse_mail(bytes).map_err(parse_error)?;

    let mut metadata = Map::new();
    for (key, header) in [
        ("subject", "Subject"),
        ("from", "From"),
        ("to", "To"),
        ("date", "Date"),
    ] {
        if let Some(value) = mail.headers.get_first_value(header) {
            metadata.insert(key.to_string(), Value::String(value));
        }
    }

    let body = match first_text_plain(&mail) {
        Some(part) => part.get_body().map_err(parse_error)?,
        None => mail.get_body().map_err(parse_error)?,
    };

    Ok(LoadedDocument {
        text: body,
        metadata,
    })
}

fn first_text_plain<'a, 'b>(mail: &'a ParsedMail<'b>) -> Option<&'a ParsedMail<'b>> {
    if mail.ctype.mimetype.eq_ignore_ascii_case("text/plain") {
        return Some(mail);
    }
    mail.subparts.iter().find_map(first_text_plain)
}

fn parse_error(err: mailparse::MailParseError) -> LoaderError {
    LoaderError::Parse {
        format: "email",
        message: err.to_string(),
    }
}
