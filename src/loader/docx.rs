//! DOCX text extraction.
//!
//! A `.docx` file is a zip archive; the document body lives in
//! `word/document.xml`. Text is collected from `<w:t>` runs, with paragraph
//! ends and explicit breaks mapped to newlines.

use super::{LoadedDocument, LoaderError};
use quick_xml::Reader;
use quick_xml::events::Event;
use serde_json::Map;
use std::io::Read;

pub(super) fn extract(bytes: &[u8]) -> Result<LoadedDocument, LoaderError> {
    let cursor = std::io::Cursor::new(bytes);
    let mut archive = zip::ZipArchive::new(cursor).map_err(parse_error)?;
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(parse_error)?
        .read_to_string(&mut xml)
        .map_err(parse_error)?;

    Ok(LoadedDocument {
        text: plaintext_from_document_xml(&xml)?,
        metadata: Map::new(),
    })
}

fn plaintext_from_document_xml(xml: &str) -> Result<String, LoaderError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run_text = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) if element.name().as_ref() == b"w:t" => {
                in_run_text = true;
            }
            Ok(Event::End(element)) => match element.name().as_ref() {
                b"w:t" => in_run_text = false,
                b"w:p" => text.push('\n'),
                _ => {}
            },
            Ok(Event::Empty(element)) => match element.name().as_ref() {
                b"w:br" => text.push('\n'),
                b"w:tab" => text.push(' '),
                _ => {}
            },
            Ok(Event::Text(segment)) if in_run_text => {
                let segment = segment.unescape().map_err(parse_error)?;
                text.push_str(&segment);
            }
            Ok(Event::Eof) => break,
            Err(err) => return Err(parse_error(err)),
            Ok(_) => {}
        }
    }

    Ok(text)
}

fn parse_error(err: impl std::fmt::Display) -> LoaderError {
    LoaderError::Parse {
        format: "docx",
        message: err.to_string(),
    }
}
