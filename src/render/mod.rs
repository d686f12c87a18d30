//! DOCX rendering: placeholder substitution in the word-processing XML parts.

use std::fs::File;
use std::io::{Cursor, Read, Write};
use std::path::Path;

use regex::Regex;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

use crate::error::RenderError;
use crate::models::ReportContext;

/// Render `template` (a DOCX file) by replacing `{{ NAME }}` placeholders
/// with context fields. Parts other than the document body, headers and
/// footers are copied verbatim. Placeholders with no matching field are left
/// in place so a drifted template stays visible in the output.
pub fn render_docx(template: &Path, context: &ReportContext) -> Result<Vec<u8>, RenderError> {
    if !template.is_file() {
        return Err(RenderError::TemplateMissing(template.to_path_buf()));
    }

    let mut archive = ZipArchive::new(File::open(template)?)?;
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default();

    let mut replaced = 0usize;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if entry.is_dir() {
            writer.add_directory(name, options)?;
            continue;
        }

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut bytes)?;

        if is_text_part(&name) {
            let xml = String::from_utf8(bytes).map_err(|_| {
                RenderError::RenderFailed(format!("part {name} is not valid UTF-8"))
            })?;
            let (rendered, count) = substitute(&xml, context);
            replaced += count;
            bytes = rendered.into_bytes();
        }

        writer.start_file(name, options)?;
        writer.write_all(&bytes)?;
    }

    let cursor = writer.finish()?;
    info!(
        "Rendered {} with {replaced} placeholder substitution(s)",
        template.display()
    );
    Ok(cursor.into_inner())
}

/// Parts subject to substitution: the main body plus every header/footer.
fn is_text_part(name: &str) -> bool {
    name == "word/document.xml"
        || (name.starts_with("word/header") && name.ends_with(".xml"))
        || (name.starts_with("word/footer") && name.ends_with(".xml"))
}

fn substitute(xml: &str, context: &ReportContext) -> (String, usize) {
    let placeholder = Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").unwrap();
    let mut count = 0usize;
    let rendered = placeholder.replace_all(xml, |caps: &regex::Captures| {
        let key = &caps[1];
        match context.get(key) {
            Some(value) => {
                count += 1;
                xml_escape(&value.to_string())
            }
            None => {
                debug!("Placeholder '{key}' has no context field, left as-is");
                caps[0].to_string()
            }
        }
    });
    (rendered.into_owned(), count)
}

fn xml_escape(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
