//! Allowlist cleanup for uploaded SVG files.
//!
//! Shapes and the root `<svg>` element survive. Script-like elements are
//! dropped with their content, other elements are unwrapped (children
//! kept), and event handler, `style`, and `javascript:` link attributes are
//! removed.

use anyhow::Result;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

const ALLOWED_TAGS: &[&str] = &[
    "svg", "circle", "ellipse", "line", "path", "polygon", "polyline", "rect",
];

const KILLED_TAGS: &[&str] = &[
    "script",
    "style",
    "foreignobject",
    "iframe",
    "object",
    "embed",
];

fn tag_of(name: &[u8]) -> String {
    String::from_utf8_lossy(name).to_ascii_lowercase()
}

fn clean_start(e: &BytesStart<'_>) -> Result<BytesStart<'static>> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut out = BytesStart::new(name);
    for attr in e.attributes() {
        let attr = attr?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let lower = key.to_ascii_lowercase();
        let value = attr.unescape_value()?;
        if lower.starts_with("on") || lower == "style" {
            continue;
        }
        let is_link = lower == "href" || lower.ends_with(":href");
        if is_link
            && value
                .trim_start()
                .to_ascii_lowercase()
                .starts_with("javascript:")
        {
            continue;
        }
        out.push_attribute((key.as_str(), value.as_ref()));
    }
    Ok(out)
}

/// Returns `dirty` with everything outside the allowlist removed.
pub fn allowlist_svg(dirty: &str) -> Result<String> {
    let mut reader = Reader::from_str(dirty);
    let mut writer = Writer::new(Vec::new());
    let mut killed_depth = 0usize;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(e) => {
                let tag = tag_of(e.local_name().as_ref());
                if killed_depth > 0 || KILLED_TAGS.contains(&tag.as_str()) {
                    killed_depth += 1;
                } else if ALLOWED_TAGS.contains(&tag.as_str()) {
                    writer.write_event(Event::Start(clean_start(&e)?))?;
                }
            }
            Event::End(e) => {
                if killed_depth > 0 {
                    killed_depth -= 1;
                } else if ALLOWED_TAGS.contains(&tag_of(e.local_name().as_ref()).as_str()) {
                    writer.write_event(Event::End(e))?;
                }
            }
            Event::Empty(e) => {
                let tag = tag_of(e.local_name().as_ref());
                if killed_depth == 0 && ALLOWED_TAGS.contains(&tag.as_str()) {
                    writer.write_event(Event::Empty(clean_start(&e)?))?;
                }
            }
            Event::Text(t) if killed_depth == 0 => writer.write_event(Event::Text(t))?,
            Event::CData(t) if killed_depth == 0 => writer.write_event(Event::CData(t))?,
            Event::Decl(d) => writer.write_event(Event::Decl(d))?,
            _ => {}
        }
    }

    Ok(String::from_utf8(writer.into_inner())?)
}
