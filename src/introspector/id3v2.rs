//! Native ID3v2 introspector backed by the `id3` crate
//!
//! Frames surface under the `ID3` namespace with ExifTool-style names
//! (`TIT2` → `ID3:Title`, `USLT` in Portuguese → `ID3:Lyrics-por`).
//! Described comment and lyrics frames get their own key
//! (`ID3:Comment (iTunNORM)`) and are only rewritten when named.
//! Merging rewrites the leading tag as ID3v2.4 and keeps the audio
//! stream that follows it byte-for-byte.

use super::{mime_matches, TagIntrospector};
use crate::error::{MetadataError, Result};
use crate::types::{Blob, MergeOutcome, PayloadDescriptor, TagKey, TagMap, TagValue};
use ::id3::frame::{Comment, Content, Frame, Lyrics};
use ::id3::{ErrorKind, Tag, TagLike, Version};
use bytes::Bytes;
use std::io::Cursor;

/// Namespace of every key produced by [`Id3Introspector`]
pub const ID3_NAMESPACE: &str = "ID3";

const MIME_TYPES: &[&str] = &["audio/mpeg", "audio/mp3", "audio/x-mpeg"];

/// Text frame id → tag name
const TEXT_FRAMES: &[(&str, &str)] = &[
    ("TIT1", "Grouping"),
    ("TIT2", "Title"),
    ("TIT3", "Subtitle"),
    ("TPE1", "Artist"),
    ("TPE2", "Band"),
    ("TPE3", "Conductor"),
    ("TPE4", "InterpretedBy"),
    ("TALB", "Album"),
    ("TCOM", "Composer"),
    ("TEXT", "Lyricist"),
    ("TCON", "Genre"),
    ("TRCK", "Track"),
    ("TPOS", "PartOfSet"),
    ("TYER", "Year"),
    ("TDRC", "RecordingTime"),
    ("TPUB", "Publisher"),
    ("TCOP", "Copyright"),
    ("TENC", "EncodedBy"),
    ("TSSE", "EncoderSettings"),
    ("TBPM", "BeatsPerMinute"),
    ("TKEY", "InitialKey"),
    ("TLAN", "Language"),
    ("TLEN", "Length"),
    ("TMOO", "Mood"),
    ("TSRC", "ISRC"),
    ("TCMP", "Compilation"),
    ("TSOT", "TitleSortOrder"),
    ("TSOP", "PerformerSortOrder"),
    ("TSOA", "AlbumSortOrder"),
    ("TSO2", "AlbumArtistSortOrder"),
];

/// Text frames whose content is a plain integer
const NUMERIC_FRAMES: &[&str] = &["TBPM", "TLEN", "TYER"];

/// Link frame id → tag name
const LINK_FRAMES: &[(&str, &str)] = &[
    ("WCOM", "CommercialURL"),
    ("WCOP", "CopyrightURL"),
    ("WOAF", "FileURL"),
    ("WOAR", "ArtistURL"),
    ("WOAS", "SourceURL"),
    ("WPUB", "PublisherURL"),
];

const DEFAULT_LANG: &str = "eng";

/// ID3v2 introspector for MP3 payloads
#[derive(Debug, Clone, Default)]
pub struct Id3Introspector;

impl Id3Introspector {
    /// Create a new ID3 introspector
    pub fn new() -> Self {
        Self
    }

    fn read_tag(&self, payload: &Blob) -> std::result::Result<Option<Tag>, String> {
        match Tag::read_from2(Cursor::new(&payload.data[..])) {
            Ok(tag) => Ok(Some(tag)),
            Err(e) if matches!(e.kind, ErrorKind::NoTag) => Ok(None),
            Err(e) => Err(e.to_string()),
        }
    }
}

impl TagIntrospector for Id3Introspector {
    fn name(&self) -> &str {
        "id3"
    }

    fn supports(&self, descriptor: &PayloadDescriptor) -> bool {
        MIME_TYPES
            .iter()
            .any(|m| mime_matches(m, &descriptor.mime_type))
            || descriptor.format.as_deref() == Some("mp3")
    }

    fn extract_all(&self, payload: &Blob) -> Result<TagMap> {
        let tag = self
            .read_tag(payload)
            .map_err(|reason| MetadataError::extraction(payload.descriptor().mime_type, reason))?;

        let mut tags = TagMap::new();
        let Some(tag) = tag else {
            return Ok(tags);
        };

        for frame in tag.frames() {
            if let Some((name, value)) = frame_entry(frame) {
                tags.insert(TagKey::namespaced(ID3_NAMESPACE, &name), value);
            }
        }

        tracing::debug!(frames = tags.len(), "Extracted ID3 frames");
        Ok(tags)
    }

    fn merge(&self, payload: &Blob, tags: &TagMap) -> Result<MergeOutcome> {
        let mime_type = payload.descriptor().mime_type;
        if tags.is_empty() {
            return Ok(MergeOutcome::Unchanged {
                reason: "No tags to write".to_string(),
            });
        }

        let mut tag = self
            .read_tag(payload)
            .map_err(|reason| MetadataError::write(mime_type.clone(), reason))?
            .unwrap_or_else(Tag::new);

        for (key, value) in tags {
            if key.namespace() != Some(ID3_NAMESPACE) {
                return Err(MetadataError::write(
                    mime_type,
                    format!("Key '{}' is not in the {} namespace", key, ID3_NAMESPACE),
                ));
            }
            apply_field(&mut tag, key.field(), value)
                .map_err(|reason| MetadataError::write(mime_type.clone(), reason))?;
        }

        let mut out = Vec::with_capacity(payload.len() + 1024);
        tag.write_to(&mut out, Version::Id3v24)
            .map_err(|e| MetadataError::write(mime_type.clone(), e.to_string()))?;
        out.extend_from_slice(&payload.data[leading_tag_len(&payload.data)..]);

        tracing::debug!(
            tags = tags.len(),
            size = out.len(),
            "Rewrote ID3 tag"
        );
        Ok(MergeOutcome::Rewritten(Bytes::from(out)))
    }
}

/// Map one frame to its tag name and value; unsupported content is skipped
fn frame_entry(frame: &Frame) -> Option<(String, TagValue)> {
    let id = frame.id();
    match frame.content() {
        Content::Text(text) => {
            let text = text.trim_end_matches('\0').to_string();
            let name = lookup(TEXT_FRAMES, id).unwrap_or(id).to_string();
            let value = if NUMERIC_FRAMES.contains(&id) {
                text.trim()
                    .parse::<i64>()
                    .map(TagValue::Integer)
                    .unwrap_or(TagValue::Text(text))
            } else {
                TagValue::Text(text)
            };
            Some((name, value))
        }
        Content::Comment(c) => Some((
            lang_name("Comment", &c.lang, &c.description),
            TagValue::Text(c.text.clone()),
        )),
        Content::Lyrics(l) => Some((
            lang_name("Lyrics", &l.lang, &l.description),
            TagValue::Text(l.text.clone()),
        )),
        Content::ExtendedText(et) => {
            let name: String = et.description.split_whitespace().collect();
            let name = if name.is_empty() {
                "UserDefinedText".to_string()
            } else {
                name
            };
            Some((name, TagValue::Text(et.value.clone())))
        }
        Content::Link(url) => {
            let name = lookup(LINK_FRAMES, id).unwrap_or(id).to_string();
            Some((name, TagValue::Text(url.clone())))
        }
        Content::ExtendedLink(el) => Some(("UserDefinedURL".to_string(), TagValue::Text(el.link.clone()))),
        Content::Picture(p) => Some((
            "Picture".to_string(),
            TagValue::Text(format!("(Binary data {} bytes, {})", p.data.len(), p.mime_type)),
        )),
        Content::Popularimeter(p) => Some((
            "Popularimeter".to_string(),
            TagValue::Text(format!("{} Rating={} Count={}", p.user, p.rating, p.counter)),
        )),
        _ => None,
    }
}

/// Write one named field into the tag
fn apply_field(tag: &mut Tag, field: &str, value: &TagValue) -> std::result::Result<(), String> {
    let text = value.to_string();

    if let Some((lang, description)) = lang_target(field, "Comment") {
        remove_lang_frame(tag, "COMM", &lang, &description);
        let _ = tag.add_frame(Comment {
            lang,
            description,
            text,
        });
        return Ok(());
    }

    if let Some((lang, description)) = lang_target(field, "Lyrics") {
        remove_lang_frame(tag, "USLT", &lang, &description);
        let _ = tag.add_frame(Lyrics {
            lang,
            description,
            text,
        });
        return Ok(());
    }

    let frame_id = reverse_lookup(TEXT_FRAMES, field)
        .map(str::to_string)
        .or_else(|| raw_text_frame_id(field));

    match frame_id {
        Some(id) => {
            tag.set_text(id, text);
            Ok(())
        }
        None => Err(format!("Tag '{}:{}' is not writable", ID3_NAMESPACE, field)),
    }
}

/// Drop the `frame_id` frame with this language and description; frames
/// with any other (language, description) pair are kept
fn remove_lang_frame(tag: &mut Tag, frame_id: &str, lang: &str, description: &str) {
    let kept: Vec<Frame> = tag
        .remove(frame_id)
        .into_iter()
        .filter(|f| {
            frame_target(f)
                .map(|(l, d)| l != lang || d != description)
                .unwrap_or(true)
        })
        .collect();
    for frame in kept {
        let _ = tag.add_frame(frame);
    }
}

/// Normalized (language, description) of a comment or lyrics frame
fn frame_target(frame: &Frame) -> Option<(String, String)> {
    match frame.content() {
        Content::Comment(c) => Some((normalize_lang(&c.lang), c.description.trim().to_string())),
        Content::Lyrics(l) => Some((normalize_lang(&l.lang), l.description.trim().to_string())),
        _ => None,
    }
}

fn normalize_lang(lang: &str) -> String {
    let lang = lang.trim().to_ascii_lowercase();
    if lang.is_empty() || lang == "xxx" {
        DEFAULT_LANG.to_string()
    } else {
        lang
    }
}

/// `Comment`, `Comment-por` or `Comment (iTunNORM)` style name
///
/// The language suffix is omitted for the default language; a non-empty
/// description is appended in parentheses so described frames never
/// shadow the plain one.
fn lang_name(base: &str, lang: &str, description: &str) -> String {
    let lang = normalize_lang(lang);
    let mut name = base.to_string();
    if lang != DEFAULT_LANG {
        name.push('-');
        name.push_str(&lang);
    }
    let description = description.trim();
    if !description.is_empty() {
        name.push_str(&format!(" ({})", description));
    }
    name
}

/// Inverse of [`lang_name`]: the (language, description) a field targets
fn lang_target(field: &str, base: &str) -> Option<(String, String)> {
    let (head, description) = match field.strip_suffix(')').and_then(|f| f.split_once(" (")) {
        Some((head, description)) => (head, description.trim().to_string()),
        None => (field, String::new()),
    };

    let lang = if head == base {
        DEFAULT_LANG.to_string()
    } else {
        head.strip_prefix(base)
            .and_then(|rest| rest.strip_prefix('-'))
            .filter(|lang| lang.len() == 3)
            .map(normalize_lang)?
    };
    Some((lang, description))
}

/// Accept raw text frame ids such as `TOWN`
fn raw_text_frame_id(field: &str) -> Option<String> {
    let valid = field.len() == 4
        && field.starts_with('T')
        && field != "TXXX"
        && field
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    valid.then(|| field.to_string())
}

fn lookup<'a>(table: &'a [(&'a str, &'a str)], id: &str) -> Option<&'a str> {
    table.iter().find(|(k, _)| *k == id).map(|(_, v)| *v)
}

fn reverse_lookup<'a>(table: &'a [(&'a str, &'a str)], name: &str) -> Option<&'a str> {
    table.iter().find(|(_, v)| *v == name).map(|(k, _)| *k)
}

/// Byte length of a leading ID3v2 tag (header, body, padding, footer)
fn leading_tag_len(data: &[u8]) -> usize {
    if data.len() < 10 || &data[..3] != b"ID3" {
        return 0;
    }
    let size = data[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b as usize & 0x7f));
    let footer = if data[5] & 0x10 != 0 { 10 } else { 0 };
    (10 + size + footer).min(data.len())
}
