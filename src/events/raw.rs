/*!
 * Raw Buffer Records
 * Name/value view of one `<event>` element before normalization
 */

use crate::core::errors::{CaptureError, CaptureResult};
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// One `<data>` or `<action>` entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    /// `<value>` content; nested markup is kept verbatim, plain text is unescaped
    pub value: String,
    /// Optional `<text>` content (map-valued fields such as `result`)
    pub text: Option<String>,
}

/// One buffer record, fields kept as strings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub name: String,
    pub timestamp: Option<String>,
    pub data: Vec<RawField>,
    pub actions: Vec<RawField>,
}

impl RawRecord {
    /// Parse the inner content of an `<event>` element
    pub fn parse_body(
        name: impl Into<String>,
        timestamp: Option<String>,
        body: &str,
    ) -> CaptureResult<Self> {
        let mut record = RawRecord {
            name: name.into(),
            timestamp,
            data: Vec::new(),
            actions: Vec::new(),
        };

        let mut reader = Reader::from_str(body);
        reader.trim_text(true);
        let mut depth = 0usize;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let local = e.local_name();
                    let target = match local.as_ref() {
                        b"data" if depth == 0 => Some(&mut record.data),
                        b"action" if depth == 0 => Some(&mut record.actions),
                        _ => None,
                    };
                    match target {
                        Some(fields) => {
                            let name = attr_value(&e, b"name").unwrap_or_default();
                            fields.push(read_field(&mut reader, name)?);
                        }
                        None => depth += 1,
                    }
                }
                Event::Empty(e) => {
                    let local = e.local_name();
                    let target = match local.as_ref() {
                        b"data" if depth == 0 => Some(&mut record.data),
                        b"action" if depth == 0 => Some(&mut record.actions),
                        _ => None,
                    };
                    if let Some(fields) = target {
                        fields.push(RawField {
                            name: attr_value(&e, b"name").unwrap_or_default(),
                            value: String::new(),
                            text: None,
                        });
                    }
                }
                Event::End(_) => {
                    depth = depth.checked_sub(1).ok_or_else(|| {
                        CaptureError::MalformedPayload("unbalanced end tag".into())
                    })?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if depth != 0 {
            return Err(CaptureError::MalformedPayload(format!(
                "record '{}' ended with {} open elements",
                record.name, depth
            )));
        }
        Ok(record)
    }

    /// Non-empty `<data>` value by name
    pub fn data(&self, name: &str) -> Option<&str> {
        lookup(&self.data, name)
    }

    /// `<text>` of a map-valued `<data>` field
    pub fn data_text(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|f| f.name == name)
            .and_then(|f| f.text.as_deref())
            .filter(|t| !t.is_empty())
    }

    /// Non-empty `<action>` value by name
    pub fn action(&self, name: &str) -> Option<&str> {
        lookup(&self.actions, name)
    }
}

fn lookup<'a>(fields: &'a [RawField], name: &str) -> Option<&'a str> {
    fields
        .iter()
        .find(|f| f.name == name)
        .map(|f| f.value.as_str())
        .filter(|v| !v.is_empty())
}

/// Read a `<data>`/`<action>` element whose start tag was just consumed
fn read_field(reader: &mut Reader<&[u8]>, name: String) -> CaptureResult<RawField> {
    let mut field = RawField {
        name,
        value: String::new(),
        text: None,
    };
    let mut depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Start(e) if depth == 0 && e.local_name().as_ref() == b"value" => {
                field.value = decode_content(&reader.read_text(e.name())?);
            }
            Event::Start(e) if depth == 0 && e.local_name().as_ref() == b"text" => {
                field.text = Some(decode_content(&reader.read_text(e.name())?));
            }
            Event::Start(_) => depth += 1,
            Event::End(_) => {
                if depth == 0 {
                    return Ok(field);
                }
                depth -= 1;
            }
            Event::Eof => {
                return Err(CaptureError::MalformedPayload(format!(
                    "field '{}' is not closed",
                    field.name
                )))
            }
            _ => {}
        }
    }
}

/// Raw element content: nested markup verbatim, otherwise unescaped text
pub(crate) fn decode_content(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('<') {
        return strip_cdata(trimmed).to_string();
    }
    match unescape(trimmed) {
        Ok(text) => text.into_owned(),
        Err(_) => trimmed.to_string(),
    }
}

fn strip_cdata(raw: &str) -> &str {
    raw.strip_prefix("<![CDATA[")
        .and_then(|inner| inner.strip_suffix("]]>"))
        .unwrap_or(raw)
}

/// Unescaped attribute value by local name
pub(crate) fn attr_value(e: &BytesStart<'_>, key: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == key)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BODY: &str = r#"
        <data name="duration"><type name="uint64" package="package0"/><value>1500</value></data>
        <data name="result"><value>0</value><text>OK</text></data>
        <data name="batch_text"><value>SELECT a &lt; 5</value></data>
        <data name="empty"/>
        <action name="database_name" package="sqlserver"><value>sales</value></action>
    "#;

    #[test]
    fn test_parse_body_fields() {
        let record = RawRecord::parse_body("sql_batch_completed", None, BODY).unwrap();

        assert_eq!(record.data("duration"), Some("1500"));
        assert_eq!(record.data("result"), Some("0"));
        assert_eq!(record.data_text("result"), Some("OK"));
        assert_eq!(record.data("batch_text"), Some("SELECT a < 5"));
        assert_eq!(record.data("empty"), None);
        assert_eq!(record.action("database_name"), Some("sales"));
        assert_eq!(record.action("missing"), None);
    }

    #[test]
    fn test_nested_markup_kept_verbatim() {
        let body = r#"<data name="xml_report"><value><deadlock><victim-list/></deadlock></value></data>"#;
        let record = RawRecord::parse_body("xml_deadlock_report", None, body).unwrap();
        assert_eq!(
            record.data("xml_report"),
            Some("<deadlock><victim-list/></deadlock>")
        );
    }

    #[test]
    fn test_unclosed_field_is_malformed() {
        let body = r#"<data name="duration"><value>15"#;
        let result = RawRecord::parse_body("rpc_completed", None, body);
        assert!(matches!(result, Err(CaptureError::MalformedPayload(_))));
    }

    #[test]
    fn test_decode_content_unescapes_plain_text() {
        assert_eq!(decode_content("  &lt;deadlock/&gt; "), "<deadlock/>");
        assert_eq!(decode_content("<![CDATA[select 1]]>"), "select 1");
    }
}
