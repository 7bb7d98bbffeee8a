// src/action/xml.rs

//! XML descriptor rewriter
//!
//! The document is tokenized with `quick-xml` and copied span by span.
//! Only text nodes, CDATA sections and attribute values are rewritten;
//! every other byte (declarations, comments, whitespace, quoting style,
//! attribute order) is emitted exactly as read.
//!
//! Each non-blank text node and each attribute is one provider, so the
//! ledger reports real replacement counts.

use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::{Error, Result};
use crate::rules::{RuleSet, substitute};
use quick_xml::Reader;
use quick_xml::events::Event;
use std::ops::Range;
use tracing::debug;

pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let substitutions: Vec<(&str, &str)> = rules
        .text_substitutions_for(name)
        .map(|(from, to)| (from.as_str(), to.as_str()))
        .collect();
    let rewriter = ValueRewriter {
        rules,
        substitutions: &substitutions,
    };

    let mut changes = Changes::new(name, Some(ActionKind::Xml));
    let mut out = Vec::with_capacity(data.len() + 64);
    let mut reader = Reader::from_reader(data);
    let mut last = 0;

    loop {
        let start = reader.buffer_position() as usize;
        let event = reader.read_event().map_err(|e| {
            Error::malformed(
                name,
                format!("XML error at byte {}: {}", reader.error_position(), e),
            )
        })?;
        let end = reader.buffer_position() as usize;

        out.extend_from_slice(&data[last..start]);
        last = end;
        let raw = &data[start..end];

        match event {
            Event::Eof => break,
            Event::Text(_) | Event::CData(_) => {
                if raw.iter().all(u8::is_ascii_whitespace) {
                    out.extend_from_slice(raw);
                    continue;
                }
                match rewriter.rewrite(raw, false) {
                    Some(rewritten) => {
                        out.extend_from_slice(&rewritten);
                        changes.add_changed_provider();
                    }
                    None => {
                        out.extend_from_slice(raw);
                        changes.add_unchanged_provider();
                    }
                }
            }
            Event::Start(ref tag) | Event::Empty(ref tag) => {
                for attribute in tag.attributes() {
                    attribute.map_err(|e| {
                        Error::malformed(name, format!("bad attribute at byte {}: {}", start, e))
                    })?;
                }
                rewrite_tag(&rewriter, raw, &mut out, &mut changes);
            }
            _ => out.extend_from_slice(raw),
        }
    }
    out.extend_from_slice(&data[last.min(data.len())..]);

    debug!(
        "XML {}: {} replacements, {} unchanged",
        name,
        changes.changed_providers(),
        changes.unchanged_providers()
    );

    Ok(ActionOutput {
        name: name.to_string(),
        data: out,
        changes,
    })
}

/// Rewrites one text node or attribute value
struct ValueRewriter<'a> {
    rules: &'a RuleSet,
    /// Per-format literal substitutions for this resource
    substitutions: &'a [(&'a str, &'a str)],
}

impl ValueRewriter<'_> {
    /// Namespace declarations only take per-format substitutions
    fn rewrite(&self, raw: &[u8], namespace: bool) -> Option<Vec<u8>> {
        let mut current = substitute(raw, self.substitutions, false).map(|(out, _)| out);
        if namespace {
            return current;
        }

        let source = current.as_deref().unwrap_or(raw);
        if let Some(renamed) = self.rename_bundle(source) {
            return Some(renamed);
        }
        if let Some((out, _)) = self.rules.rewrite_text(source) {
            current = Some(out);
        }
        current.filter(|out| out != raw)
    }

    /// A value consisting only of a bundle symbolic name
    fn rename_bundle(&self, value: &[u8]) -> Option<Vec<u8>> {
        let text = std::str::from_utf8(value).ok()?;
        let trimmed = text.trim();
        let renamed = self.rules.rename_bundle(trimmed)?;
        let start = text.len() - text.trim_start().len();

        let mut out = Vec::with_capacity(value.len() + renamed.len());
        out.extend_from_slice(&value[..start]);
        out.extend_from_slice(renamed.as_bytes());
        out.extend_from_slice(&value[start + trimmed.len()..]);
        Some(out)
    }
}

/// Copy a start or empty tag, rewriting attribute values in place
fn rewrite_tag(rewriter: &ValueRewriter<'_>, raw: &[u8], out: &mut Vec<u8>, changes: &mut Changes) {
    let Some(attributes) = attribute_spans(raw) else {
        out.extend_from_slice(raw);
        return;
    };

    let mut pos = 0;
    for attribute in attributes {
        let key = &raw[attribute.key];
        let namespace = key == b"xmlns" || key.starts_with(b"xmlns:");
        let quote = raw[attribute.value.end];
        let rewritten = rewriter
            .rewrite(&raw[attribute.value.clone()], namespace)
            .filter(|value| !value.contains(&quote));

        match rewritten {
            Some(value) => {
                out.extend_from_slice(&raw[pos..attribute.value.start]);
                out.extend_from_slice(&value);
                pos = attribute.value.end;
                changes.add_changed_provider();
            }
            None => changes.add_unchanged_provider(),
        }
    }
    out.extend_from_slice(&raw[pos..]);
}

#[derive(Debug)]
struct AttributeSpan {
    key: Range<usize>,
    /// Value bytes, excluding the quotes
    value: Range<usize>,
}

/// Locate `key="value"` pairs in the raw bytes of a tag
///
/// `None` if the tag does not have the expected shape.
fn attribute_spans(tag: &[u8]) -> Option<Vec<AttributeSpan>> {
    let is_space = |b: u8| matches!(b, b' ' | b'\t' | b'\r' | b'\n');
    let mut spans = Vec::new();
    let mut i = 1;

    while i < tag.len() && !is_space(tag[i]) && tag[i] != b'/' && tag[i] != b'>' {
        i += 1;
    }

    loop {
        while i < tag.len() && is_space(tag[i]) {
            i += 1;
        }
        match tag.get(i)? {
            b'/' | b'>' => return Some(spans),
            _ => {}
        }

        let key_start = i;
        while i < tag.len() && !is_space(tag[i]) && tag[i] != b'=' {
            i += 1;
        }
        let key = key_start..i;

        while i < tag.len() && is_space(tag[i]) {
            i += 1;
        }
        if *tag.get(i)? != b'=' {
            return None;
        }
        i += 1;
        while i < tag.len() && is_space(tag[i]) {
            i += 1;
        }

        let quote = *tag.get(i)?;
        if quote != b'"' && quote != b'\'' {
            return None;
        }
        let value_start = i + 1;
        let value_len = tag[value_start..].iter().position(|b| *b == quote)?;
        let value = value_start..value_start + value_len;
        i = value.end + 1;

        spans.push(AttributeSpan { key, value });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules() -> RuleSet {
        RuleSet::builder()
            .rename("javax.servlet", "jakarta.servlet")
            .rename("javax.faces", "jakarta.faces")
            .bundle("com.example.web", "com.example.jakarta.web")
            .text(
                "*.xml",
                vec![(
                    "http://xmlns.jcp.org/xml/ns/javaee".to_string(),
                    "https://jakarta.ee/xml/ns/jakartaee".to_string(),
                )],
            )
            .build()
            .unwrap()
    }

    const WEB_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- javax.servlet.Filter stays in comments -->
<web-app xmlns="http://xmlns.jcp.org/xml/ns/javaee" version='4.0'>
  <filter>
    <filter-name>guard</filter-name>
    <filter-class>javax.servlet.example.Guard</filter-class>
  </filter>
  <listener listener-class="javax.faces.webapp.Listener"/>
  <bundle> com.example.web </bundle>
</web-app>
"#;

    #[test]
    fn test_rewrites_text_and_attributes() {
        let output = apply(&rules(), "WEB-INF/web.xml", WEB_XML.as_bytes()).unwrap();
        let text = String::from_utf8(output.data).unwrap();

        assert!(text.contains("<!-- javax.servlet.Filter stays in comments -->"));
        assert!(text.contains(r#"xmlns="https://jakarta.ee/xml/ns/jakartaee" version='4.0'"#));
        assert!(text.contains("<filter-class>jakarta.servlet.example.Guard</filter-class>"));
        assert!(text.contains(r#"<listener listener-class="jakarta.faces.webapp.Listener"/>"#));
        assert!(text.contains("<bundle> com.example.jakarta.web </bundle>"));
        assert!(text.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
    }

    #[test]
    fn test_counts_are_real() {
        let output = apply(&rules(), "WEB-INF/web.xml", WEB_XML.as_bytes()).unwrap();
        // xmlns, filter-class text, listener-class, bundle text
        assert_eq!(output.changes.changed_providers(), 4);
        // version attribute, filter-name text
        assert_eq!(output.changes.unchanged_providers(), 2);
        assert!(output.changes.has_non_resource_name_changes());
    }

    #[test]
    fn test_idempotent_and_deterministic() {
        let first = apply(&rules(), "WEB-INF/web.xml", WEB_XML.as_bytes()).unwrap();
        let again = apply(&rules(), "WEB-INF/web.xml", WEB_XML.as_bytes()).unwrap();
        assert_eq!(first.data, again.data);

        let second = apply(&rules(), "WEB-INF/web.xml", &first.data).unwrap();
        assert_eq!(second.data, first.data);
        assert_eq!(second.changes.changed_providers(), 0);
    }

    #[test]
    fn test_untouched_document_is_identical() {
        let xml = "<a b=\"c\">\n  <d>plain</d><![CDATA[x < y]]>\n</a>";
        let output = apply(&rules(), "a.xml", xml.as_bytes()).unwrap();
        assert_eq!(output.data, xml.as_bytes());
        assert!(!output.changes.has_changes());
    }

    #[test]
    fn test_cdata_is_rewritten() {
        let xml = "<a><![CDATA[javax.servlet.Filter]]></a>";
        let output = apply(&rules(), "a.xml", xml.as_bytes()).unwrap();
        assert_eq!(output.data, b"<a><![CDATA[jakarta.servlet.Filter]]></a>");
    }

    #[test]
    fn test_mismatched_tags_are_malformed() {
        assert!(matches!(
            apply(&rules(), "bad.xml", b"<a><b></a>"),
            Err(Error::MalformedResource { .. })
        ));
    }

    #[test]
    fn test_attribute_spans() {
        let tag = br#"<x a="1" b = '2' c="">"#;
        let spans = attribute_spans(tag).unwrap();
        assert_eq!(spans.len(), 3);
        assert_eq!(&tag[spans[1].key.clone()], b"b");
        assert_eq!(&tag[spans[1].value.clone()], b"2");
        assert!(spans[2].value.is_empty());
    }
}
