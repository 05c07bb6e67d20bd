//! Streaming reader for the media catalog export.
//!
//! The payload lives under a `<cmPublishImport>` element as a flat list of
//! `<media id="...">` entries. Each entry becomes one [`TransferCommand`];
//! the document is pulled lazily so a large catalog never sits in memory.

use crate::error::ManifestError;
use crate::pipeline::channel::{TagBundle, TransferCommand};
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::QName;
use quick_xml::Reader;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

const ROOT: &[u8] = b"cmPublishImport";
const MEDIA: &[u8] = b"media";

/// One `<media>` entry as it appears in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MediaItem {
    pub id: String,
    pub path: String,
    pub title: String,
    pub description: String,
    pub author: String,
    pub credit: String,
    pub copyright: String,
}

impl MediaItem {
    fn set(&mut self, field: &[u8], value: String) {
        let slot = match field {
            b"path" => &mut self.path,
            b"title" => &mut self.title,
            b"description" => &mut self.description,
            b"author" => &mut self.author,
            b"credit" => &mut self.credit,
            b"copyright" => &mut self.copyright,
            _ => return,
        };
        *slot = value;
    }
}

/// Turns manifest entries into transfer commands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    /// Origin root, no trailing slash
    pub origin: String,
    pub bucket: String,
    /// Destination key prefix, ending in `/`
    pub key_prefix: String,
}

impl CommandTemplate {
    pub fn new(
        origin: impl Into<String>,
        bucket: impl Into<String>,
        key_prefix: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            bucket: bucket.into(),
            key_prefix: key_prefix.into(),
        }
    }

    /// Object keys never start with `/`, so a prefix of `/` is the bucket root.
    fn key_prefix(&self) -> &str {
        self.key_prefix.trim_start_matches('/')
    }

    pub fn command(&self, item: MediaItem) -> Result<TransferCommand, ManifestError> {
        let path = item.path.trim_start_matches('/');
        if path.is_empty() {
            return Err(ManifestError::MissingPath { id: item.id });
        }

        Ok(TransferCommand {
            source_url: format!("{}/{}", self.origin, path),
            destination_bucket: self.bucket.clone(),
            destination_key: format!("{}{}", self.key_prefix(), path),
            tags: Some(TagBundle {
                id: item.id,
                title: item.title,
                description: item.description,
                author: item.author,
                credit: item.credit,
                copyright: item.copyright,
            }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Still looking for the root element
    Prelude,
    InRoot,
    Done,
}

/// Lazy, single-pass manifest reader.
pub struct ManifestReader<R: BufRead> {
    reader: Reader<R>,
    template: CommandTemplate,
    state: State,
}

impl ManifestReader<BufReader<File>> {
    pub fn open(path: &Path, template: CommandTemplate) -> Result<Self, ManifestError> {
        let file = File::open(path).map_err(|source| ManifestError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::new(BufReader::new(file), template))
    }
}

impl<R: BufRead> ManifestReader<R> {
    pub fn new(reader: R, template: CommandTemplate) -> Self {
        let mut reader = Reader::from_reader(reader);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            template,
            state: State::Prelude,
        }
    }

    /// Next command, or `Ok(None)` once the root element closes.
    pub fn next_command(&mut self) -> Result<Option<TransferCommand>, ManifestError> {
        let result = self.advance();
        if !matches!(result, Ok(Some(_))) {
            self.state = State::Done;
        }
        result
    }

    fn advance(&mut self) -> Result<Option<TransferCommand>, ManifestError> {
        if self.state == State::Prelude {
            self.find_root()?;
        }

        let mut buf = Vec::new();
        while self.state == State::InRoot {
            match self.event(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == MEDIA => {
                    let id = self.media_id(&e)?;
                    let item = self.read_media(id)?;
                    return self.template.command(item).map(Some);
                }
                Event::Empty(e) if e.local_name().as_ref() == MEDIA => {
                    let id = self.media_id(&e)?;
                    return Err(ManifestError::MissingPath { id });
                }
                Event::Start(e) => {
                    let name = e.name().as_ref().to_vec();
                    tracing::debug!(element = %String::from_utf8_lossy(&name), "skipping unknown element");
                    self.skip(&name)?;
                }
                Event::End(_) | Event::Eof => self.state = State::Done,
                _ => {}
            }
        }
        Ok(None)
    }

    fn event<'b>(&mut self, buf: &'b mut Vec<u8>) -> Result<Event<'b>, ManifestError> {
        buf.clear();
        match self.reader.read_event_into(buf) {
            Ok(event) => Ok(event),
            Err(source) => Err(self.xml_error(source)),
        }
    }

    fn xml_error(&self, source: quick_xml::Error) -> ManifestError {
        ManifestError::Xml {
            position: self.reader.error_position() as u64,
            source,
        }
    }

    fn find_root(&mut self) -> Result<(), ManifestError> {
        let mut buf = Vec::new();
        loop {
            match self.event(&mut buf)? {
                Event::Start(e) if e.local_name().as_ref() == ROOT => {
                    self.state = State::InRoot;
                    return Ok(());
                }
                Event::Empty(e) if e.local_name().as_ref() == ROOT => {
                    self.state = State::Done;
                    return Ok(());
                }
                Event::Eof => return Err(ManifestError::MissingRoot),
                _ => {}
            }
        }
    }

    fn media_id(&self, element: &BytesStart<'_>) -> Result<String, ManifestError> {
        for attr in element.attributes() {
            let attr = attr.map_err(|e| self.xml_error(e.into()))?;
            if attr.key.local_name().as_ref() == b"id" {
                let value = attr.unescape_value().map_err(|e| self.xml_error(e))?;
                return Ok(value.into_owned());
            }
        }
        Ok(String::new())
    }

    /// Read children of an open `<media>` up to its end tag.
    fn read_media(&mut self, id: String) -> Result<MediaItem, ManifestError> {
        let mut item = MediaItem {
            id,
            ..Default::default()
        };
        let mut buf = Vec::new();
        loop {
            match self.event(&mut buf)? {
                Event::Start(e) => {
                    let field = e.local_name().as_ref().to_vec();
                    let value = self.read_text(&field)?;
                    item.set(&field, value);
                }
                Event::End(_) => return Ok(item),
                Event::Eof => return Err(truncated(MEDIA)),
                _ => {}
            }
        }
    }

    /// Concatenated text content of an open element.
    fn read_text(&mut self, element: &[u8]) -> Result<String, ManifestError> {
        let mut text = String::new();
        let mut depth = 0usize;
        let mut buf = Vec::new();
        loop {
            match self.event(&mut buf)? {
                Event::Text(t) => {
                    let value = t.unescape().map_err(|e| self.xml_error(e))?;
                    text.push_str(&value);
                }
                Event::CData(c) => text.push_str(&String::from_utf8_lossy(&c)),
                Event::Start(_) => depth += 1,
                Event::End(_) if depth == 0 => return Ok(text),
                Event::End(_) => depth -= 1,
                Event::Eof => return Err(truncated(element)),
                _ => {}
            }
        }
    }

    fn skip(&mut self, name: &[u8]) -> Result<(), ManifestError> {
        let mut buf = Vec::new();
        match self.reader.read_to_end_into(QName(name), &mut buf) {
            Ok(_) => Ok(()),
            Err(source) => Err(self.xml_error(source)),
        }
    }
}

fn truncated(element: &[u8]) -> ManifestError {
    ManifestError::Truncated {
        element: String::from_utf8_lossy(element).into_owned(),
    }
}

impl<R: BufRead> Iterator for ManifestReader<R> {
    type Item = Result<TransferCommand, ManifestError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state == State::Done {
            return None;
        }
        self.next_command().transpose()
    }
}
