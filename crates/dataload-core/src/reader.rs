//! XML element reader
//!
//! Turns a load file into a flat stream of [`ReadEvent`]s:
//!
//! ```xml
//! <archetype>
//!     <data id="C1" archetype="party.customerperson" firstName="Foo" lastName="Bar">
//!         <data collection="contacts" archetype="contact.phoneNumber" telephoneNumber="555"/>
//!         <data collection="classifications" childId="id:V1"/>
//!     </data>
//! </archetype>
//! ```
//!
//! `<archetype>` wrappers are transparent and may appear anywhere. Every
//! `<data>` element yields one [`ReadEvent::Data`] or [`ReadEvent::ChildRef`]
//! followed, after its nested elements, by one [`ReadEvent::End`].

use crate::data::{ChildRef, Data, SourceLocation, CHILD_ID, COLLECTION};
use crate::error::LoadError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::sync::Arc;

const DATA: &[u8] = b"data";
const WRAPPER: &[u8] = b"archetype";

/// One element boundary
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// Start of an object-producing element
    Data(Data),

    /// Start of an element attaching a declared object
    ChildRef(ChildRef),

    /// End of the most recently started element
    End,
}

/// Reads [`ReadEvent`]s from an XML document held in memory
pub struct XmlReader<'a> {
    reader: Reader<&'a [u8]>,
    source: &'a str,
    path: Arc<str>,
    line: usize,
    counted: usize,
    open: Vec<bool>,
    pending_end: bool,
    done: bool,
}

impl<'a> XmlReader<'a> {
    /// Create a reader; `path` is used for diagnostics only
    #[must_use]
    pub fn new(source: &'a str, path: &str) -> Self {
        let mut reader = Reader::from_str(source);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            source,
            path: Arc::from(path),
            line: 1,
            counted: 0,
            open: Vec::new(),
            pending_end: false,
            done: false,
        }
    }

    fn next_event(&mut self) -> Result<Option<ReadEvent>, LoadError> {
        if std::mem::take(&mut self.pending_end) {
            return Ok(Some(ReadEvent::End));
        }
        loop {
            let event = self.reader.read_event().map_err(|source| self.xml_error(source))?;
            match event {
                Event::Start(start) => {
                    let name = start.local_name();
                    if name.as_ref() == WRAPPER {
                        self.open.push(false);
                        continue;
                    }
                    let element = self.element(&start, 2)?;
                    self.open.push(true);
                    return Ok(Some(element));
                }
                Event::Empty(start) => {
                    let name = start.local_name();
                    if name.as_ref() == WRAPPER {
                        continue;
                    }
                    let element = self.element(&start, 3)?;
                    self.pending_end = true;
                    return Ok(Some(element));
                }
                Event::End(_) => {
                    if self.open.pop() == Some(true) {
                        return Ok(Some(ReadEvent::End));
                    }
                }
                Event::Eof => return Ok(None),
                _ => {}
            }
        }
    }

    /// Build the event for a `<data>` tag of `delimiters` extra bytes
    fn element(&mut self, start: &BytesStart<'_>, delimiters: usize) -> Result<ReadEvent, LoadError> {
        let end = usize::try_from(self.reader.buffer_position()).unwrap_or(self.source.len());
        let location = self.locate(end.saturating_sub(start.len() + delimiters));
        let name = start.local_name();
        if name.as_ref() != DATA {
            return Err(LoadError::UnexpectedElement {
                element: String::from_utf8_lossy(name.as_ref()).into_owned(),
                location,
            });
        }

        let mut attributes = Vec::new();
        for attribute in start.attributes() {
            let attribute = attribute
                .map_err(quick_xml::Error::from)
                .map_err(|source| self.xml_error(source))?;
            let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).into_owned();
            let value = attribute
                .unescape_value()
                .map_err(|source| self.xml_error(source))?
                .into_owned();
            attributes.push((key, value));
        }

        let child_id = attributes
            .iter()
            .position(|(key, value)| key == CHILD_ID && !value.is_empty());
        match child_id {
            Some(index) => {
                let (_, child_id) = attributes.swap_remove(index);
                let collection = attributes
                    .into_iter()
                    .find(|(key, _)| key == COLLECTION)
                    .map(|(_, value)| value);
                Ok(ReadEvent::ChildRef(ChildRef::new(collection, &child_id, location)?))
            }
            None => Ok(ReadEvent::Data(Data::new(attributes, location)?)),
        }
    }

    fn locate(&mut self, offset: usize) -> SourceLocation {
        let offset = offset.min(self.source.len());
        if offset > self.counted {
            let newlines = self.source.as_bytes()[self.counted..offset]
                .iter()
                .filter(|b| **b == b'\n')
                .count();
            self.line += newlines;
            self.counted = offset;
        }
        SourceLocation::new(Arc::clone(&self.path), self.line)
    }

    fn xml_error(&self, source: quick_xml::Error) -> LoadError {
        let position = usize::try_from(self.reader.error_position()).unwrap_or(self.source.len());
        let position = position.min(self.source.len());
        let line = 1 + self.source.as_bytes()[..position]
            .iter()
            .filter(|b| **b == b'\n')
            .count();
        LoadError::Xml {
            path: self.path.to_string(),
            line,
            source,
        }
    }
}

impl Iterator for XmlReader<'_> {
    type Item = Result<ReadEvent, LoadError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(err) => {
                self.done = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn events(source: &str) -> Vec<ReadEvent> {
        XmlReader::new(source, "test.xml")
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    fn describe(event: &ReadEvent) -> String {
        match event {
            ReadEvent::Data(data) => format!("{}@{}", data.archetype(), data.location().line()),
            ReadEvent::ChildRef(child) => format!("child {}@{}", child.child_id(), child.location().line()),
            ReadEvent::End => "end".to_owned(),
        }
    }

    #[test]
    fn nested_elements_with_lines() {
        let source = r#"<?xml version="1.0"?>
<archetype>
    <data id="C1" archetype="party.customerperson" firstName="Foo">
        <data collection="contacts" archetype="contact.phoneNumber"
              telephoneNumber="555"/>
        <data collection="classifications" childId="id:V1"/>
    </data>
    <!-- trailing comment -->
    <data archetype="lookup.staff" code="VET"></data>
</archetype>
"#;
        let described: Vec<_> = events(source).iter().map(describe).collect();
        assert_eq!(
            described,
            vec![
                "party.customerperson@3",
                "contact.phoneNumber@4",
                "end",
                "child V1@6",
                "end",
                "end",
                "lookup.staff@9",
                "end",
            ]
        );
    }

    #[test]
    fn attributes_are_unescaped() {
        let source = r#"<data archetype="x" note="Fish &amp; Chips"/>"#;
        let events = events(source);
        let ReadEvent::Data(data) = &events[0] else {
            panic!("expected data");
        };
        assert_eq!(data.attributes().collect::<Vec<_>>(), vec![("note", "Fish & Chips")]);
    }

    #[test]
    fn nested_wrappers_are_transparent() {
        let source = r#"<archetype><archetype><data archetype="x"/></archetype><archetype/></archetype>"#;
        assert_eq!(events(source).len(), 2);
    }

    #[test]
    fn unexpected_element() {
        let source = "<archetype>\n  <object archetype=\"x\"/>\n</archetype>";
        let err = XmlReader::new(source, "bad.xml").find_map(Result::err).unwrap();
        assert!(matches!(
            err,
            LoadError::UnexpectedElement { ref element, ref location } if element == "object" && location.line() == 2
        ));
    }

    #[test]
    fn child_ref_without_collection() {
        let err = XmlReader::new(r#"<data childId="V1"/>"#, "bad.xml")
            .find_map(Result::err)
            .unwrap();
        assert!(matches!(err, LoadError::NoCollectionAttribute { .. }));
    }

    #[test]
    fn malformed_xml_stops_the_stream() {
        let mut reader = XmlReader::new("<archetype>\n<data archetype=\"x\">\n</archetype>", "bad.xml");
        assert!(matches!(reader.next(), Some(Ok(ReadEvent::Data(_)))));
        assert!(matches!(reader.next(), Some(Err(LoadError::Xml { .. }))));
        assert!(reader.next().is_none());
    }
}
