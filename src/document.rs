//! Full-text extraction from a news XML document.
//!
//! The document holds `<noticia>` records, each with a `Url_Noticia` child and
//! a `FullText` child. Records are keyed by the article code embedded in the
//! URL (`.../index/1/<code>` or `.../VerNoticia/<code>`).

use crate::models::TextRecord;
use encoding_rs::{Encoding, UTF_16BE, UTF_16LE, UTF_8};
use regex::Regex;
use std::borrow::Cow;
use std::collections::{BTreeMap, HashSet};
use std::sync::OnceLock;
use thiserror::Error;
use tracing::debug;

/// Element holding one news item.
pub const RECORD_TAG: &str = "noticia";
/// Child element with the article URL.
pub const URL_TAG: &str = "Url_Noticia";
/// Child element with the article full text.
pub const TEXT_TAG: &str = "FullText";

#[derive(Error, Debug)]
pub enum DocumentError {
    #[error("document is not valid UTF-8: {0}")]
    NotUtf8(#[from] std::str::Utf8Error),
    #[error("unsupported document encoding '{0}'")]
    UnknownEncoding(String),
    #[error("document is not valid {0}")]
    Undecodable(&'static str),
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
}

/// Pattern capturing the article code from a URL.
pub fn code_pattern() -> &'static Regex {
    static CODE_RE: OnceLock<Regex> = OnceLock::new();
    CODE_RE.get_or_init(|| {
        Regex::new(r"/(?:index/1|VerNoticia)/(\d+)").expect("article code pattern is valid")
    })
}

/// Extract the article code from a URL-like string.
pub fn extract_code(url: &str) -> Option<&str> {
    code_pattern()
        .captures(url)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

/// Parse all text records in document order.
///
/// Records whose URL carries no code are skipped. When a code appears more
/// than once, the first record wins.
pub fn parse_text_records(document: &[u8]) -> Result<Vec<TextRecord>, DocumentError> {
    let xml = decode_document(document)?;

    let options = roxmltree::ParsingOptions {
        allow_dtd: true,
        ..roxmltree::ParsingOptions::default()
    };
    let doc = roxmltree::Document::parse_with_options(&xml, options)?;

    let mut seen = HashSet::new();
    let mut records = Vec::new();
    let mut total = 0usize;
    let mut without_code = 0usize;

    for item in doc
        .root_element()
        .descendants()
        .skip(1)
        .filter(|n| n.is_element() && n.tag_name().name() == RECORD_TAG)
    {
        total += 1;
        let url = child_text(item, URL_TAG);
        let Some(code) = extract_code(url) else {
            without_code += 1;
            continue;
        };
        if !seen.insert(code.to_string()) {
            continue;
        }
        records.push(TextRecord {
            code: code.to_string(),
            text: child_text(item, TEXT_TAG).trim().to_string(),
        });
    }

    debug!(
        total,
        kept = records.len(),
        without_code,
        "parsed news document"
    );

    Ok(records)
}

/// Decode a document to text: a byte order mark wins, then the encoding in
/// the XML declaration, then UTF-8.
fn decode_document(document: &[u8]) -> Result<Cow<'_, str>, DocumentError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(document) {
        return decode_with(encoding, &document[bom_len..]);
    }

    let Some(label) = declared_encoding(document) else {
        return Ok(Cow::Borrowed(std::str::from_utf8(document)?));
    };
    let encoding = Encoding::for_label(label)
        .ok_or_else(|| DocumentError::UnknownEncoding(String::from_utf8_lossy(label).into_owned()))?;

    // A declaration readable as ASCII means the bytes are not UTF-16.
    if encoding == UTF_8 || encoding == UTF_16LE || encoding == UTF_16BE {
        return Ok(Cow::Borrowed(std::str::from_utf8(document)?));
    }
    debug!(encoding = encoding.name(), "decoding news document");
    decode_with(encoding, document)
}

fn decode_with<'a>(
    encoding: &'static Encoding,
    bytes: &'a [u8],
) -> Result<Cow<'a, str>, DocumentError> {
    let (text, had_errors) = encoding.decode_without_bom_handling(bytes);
    if had_errors {
        return Err(DocumentError::Undecodable(encoding.name()));
    }
    Ok(text)
}

/// Encoding label from the `<?xml ... encoding="..."?>` declaration.
fn declared_encoding(document: &[u8]) -> Option<&[u8]> {
    static DECL_RE: OnceLock<regex::bytes::Regex> = OnceLock::new();
    let re = DECL_RE.get_or_init(|| {
        regex::bytes::Regex::new(r#"^\s*<\?xml[^>]*?\sencoding\s*=\s*["']([A-Za-z0-9._:-]+)["']"#)
            .expect("declaration pattern is valid")
    });
    re.captures(document)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_bytes())
}

/// Extract the code → full text map from a news document.
pub fn extract_text_records(document: &[u8]) -> Result<BTreeMap<String, String>, DocumentError> {
    Ok(parse_text_records(document)?
        .into_iter()
        .map(|r| (r.code, r.text))
        .collect())
}

/// Text of the first direct child named `tag`, or `""`.
fn child_text<'a>(node: roxmltree::Node<'a, '_>, tag: &str) -> &'a str {
    node.children()
        .find(|c| c.is_element() && c.tag_name().name() == tag)
        .and_then(|c| c.text())
        .unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<resultados>
  <noticias>
    <noticia>
      <Url_Noticia>https://simbiu.cl/index/1/12345</Url_Noticia>
      <FullText>
        Hello
      </FullText>
    </noticia>
    <noticia>
      <Url_Noticia>https://simbiu.cl/VerNoticia/678</Url_Noticia>
    </noticia>
    <noticia>
      <Url_Noticia>https://otro.cl/articulo/999</Url_Noticia>
      <FullText>descartada</FullText>
    </noticia>
    <noticia>
      <Url_Noticia>https://simbiu.cl/VerNoticia/12345</Url_Noticia>
      <FullText>duplicada</FullText>
    </noticia>
  </noticias>
</resultados>"#;

    #[test]
    fn test_extract_code() {
        assert_eq!(extract_code("https://a.cl/index/1/42"), Some("42"));
        assert_eq!(extract_code("https://a.cl/VerNoticia/7?x=1"), Some("7"));
        assert_eq!(extract_code("https://a.cl/index/2/42"), None);
        assert_eq!(extract_code("https://a.cl/VerNoticia/abc"), None);
        assert_eq!(extract_code(""), None);
    }

    #[test]
    fn test_extracts_trimmed_text_by_code() {
        let map = extract_text_records(DOC.as_bytes()).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map["12345"], "Hello");
        assert_eq!(map["678"], "");
    }

    #[test]
    fn test_first_duplicate_wins() {
        let records = parse_text_records(DOC.as_bytes()).unwrap();
        let dup: Vec<_> = records.iter().filter(|r| r.code == "12345").collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].text, "Hello");
    }

    #[test]
    fn test_cdata_and_bom() {
        let doc = "\u{feff}<r><noticia><Url_Noticia>/VerNoticia/5</Url_Noticia>\
                   <FullText><![CDATA[ a < b ]]></FullText></noticia></r>";
        let map = extract_text_records(doc.as_bytes()).unwrap();
        assert_eq!(map["5"], "a < b");
    }

    #[test]
    fn test_malformed_document_fails() {
        assert!(matches!(
            extract_text_records(b"<noticia><Url_Noticia>"),
            Err(DocumentError::Xml(_))
        ));
        assert!(matches!(
            extract_text_records(&[b'<', 0xc3, 0x28]),
            Err(DocumentError::NotUtf8(_))
        ));
    }

    #[test]
    fn test_document_without_records_is_empty() {
        let map = extract_text_records(b"<resultados/>").unwrap();
        assert!(map.is_empty());
    }

    #[test]
    fn test_latin1_document_uses_declared_encoding() {
        let mut doc = b"<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?>\n<r><noticia>\
<Url_Noticia>https://simbiu.cl/VerNoticia/3</Url_Noticia><FullText>Informaci"
            .to_vec();
        doc.push(0xF3);
        doc.extend_from_slice(b"n p\xFAblica</FullText></noticia></r>");
        assert!(std::str::from_utf8(&doc).is_err());

        let map = extract_text_records(&doc).unwrap();
        assert_eq!(map["3"], "Información pública");
    }

    #[test]
    fn test_utf16_document_with_bom() {
        let xml = "\u{feff}<?xml version=\"1.0\" encoding=\"UTF-16\"?>\
<r><noticia><Url_Noticia>/index/1/8</Url_Noticia><FullText>Año</FullText></noticia></r>";
        let doc: Vec<u8> = xml.encode_utf16().flat_map(u16::to_le_bytes).collect();

        let map = extract_text_records(&doc).unwrap();
        assert_eq!(map["8"], "Año");
    }

    #[test]
    fn test_declared_utf8_and_unknown_encodings() {
        let doc = "<?xml version='1.0' encoding='utf-8'?><r><noticia>\
<Url_Noticia>/VerNoticia/1</Url_Noticia><FullText>ñ</FullText></noticia></r>";
        assert_eq!(extract_text_records(doc.as_bytes()).unwrap()["1"], "ñ");

        let unknown = b"<?xml version=\"1.0\" encoding=\"x-nada\"?><r/>";
        assert!(matches!(
            extract_text_records(unknown),
            Err(DocumentError::UnknownEncoding(label)) if label == "x-nada"
        ));
    }
}
