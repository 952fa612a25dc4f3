//! Memory introspector integration tests
//!
//! End-to-end tests exercising `MetadataService` with JSON tag fixtures.
//! Covers extraction, keyed reads, write-back, rule mapping, contribution
//! loading, missing-rule diagnostics, and concurrent readers during reload.

use a3s_metadata::{
    Blob, Diagnostic, FieldBinding, FileMappingLoader, MappingConfig, MappingLoader,
    MappingRegistry, MappingRule, MemoryIntrospector, MemoryRecord, MemorySink, MetadataService,
    PayloadMatcher, RuleContribution, StaticMappingLoader, TagMap, TagValue,
};
use std::sync::Arc;

const MISSING_HELLO: &str = "Missing binary metadata descriptor with id 'hello'. Or check your rule contribution with proper metadataMapping-id.";

fn music_payload() -> Blob {
    let mut tags = TagMap::new();
    tags.insert("ID3:Title", "Twist");
    tags.insert("ID3:Publisher", "Divine Recordings");
    tags.insert("ID3:Lyrics-por", "Dança, dança");
    tags.insert("ID3:Comment", "Remastered");
    tags.insert("ID3:Artist", "Twisted Sister");
    tags.insert("ID3:Album", "Divine");
    tags.insert("ID3:Year", 2010);
    tags.insert("ID3:BeatsPerMinute", 128);
    for i in 0..40 {
        tags.insert(format!("MPEG:Frame{:02}", i), i);
    }
    assert_eq!(tags.len(), 48);

    MemoryIntrospector::payload("audio/mpeg", &tags)
        .unwrap()
        .with_filename("twist.mp3")
}

fn image_payload() -> Blob {
    let mut tags = TagMap::new();
    tags.insert("EXIF:ImageHeight", 100);
    tags.insert("EXIF:ImageWidth", 100);
    tags.insert("EXIF:Software", "Adobe Photoshop CS4 Macintosh");
    tags.insert("Photoshop:ColorMode", "RGB");
    MemoryIntrospector::payload("image/vnd.adobe.photoshop", &tags)
        .unwrap()
        .with_filename("montagehanoi.psd")
}

fn document_payload() -> Blob {
    let mut tags = TagMap::new();
    tags.insert("XMP:Language", "en-US");
    tags.insert("PDF:Producer", "OpenOffice.org 3.2");
    tags.insert("PDF:PageCount", 1);
    tags.insert("File:FileSize", "30 kB");
    MemoryIntrospector::payload("application/pdf", &tags)
        .unwrap()
        .with_filename("hello.pdf")
}

fn document_config() -> MappingConfig {
    MappingConfig {
        mappings: vec![
            MappingRule::new("pdfMapping")
                .with_matcher(PayloadMatcher::mime_type("application/pdf"))
                .with_binding(FieldBinding::read("XMP:Language", "dc:title"))
                .with_binding(FieldBinding::read("PDF:Producer", "dc:source"))
                .with_binding(FieldBinding::read("File:FileSize", "dc:description")),
            MappingRule::new("imageMapping")
                .with_matcher(PayloadMatcher::mime_type("image/*"))
                .with_binding(FieldBinding::read("EXIF:Software", "dc:format")),
        ],
        rules: vec![RuleContribution::new(
            "documents",
            ["pdfMapping", "hello", "imageMapping"],
        )],
    }
}

fn test_service(registry: MappingRegistry, sink: Arc<MemorySink>) -> MetadataService {
    MetadataService::new(registry)
        .with_introspector(
            MemoryIntrospector::new()
                .with_mime_type("audio/*")
                .with_mime_type("image/*")
                .with_mime_type("application/pdf"),
        )
        .with_sink(sink)
}

// ─── Extraction ──────────────────────────────────────────────────

#[test]
fn test_read_all_music_tags() {
    let svc = test_service(MappingRegistry::empty(), Arc::new(MemorySink::new()));
    let tags = svc.read_metadata(&music_payload()).unwrap();

    assert_eq!(tags.len(), 48);
    assert_eq!(tags.get("ID3:Title").unwrap().to_string(), "Twist");
    assert_eq!(
        tags.get("ID3:Publisher").unwrap().to_string(),
        "Divine Recordings"
    );
}

#[test]
fn test_read_requested_music_tags() {
    let svc = test_service(MappingRegistry::empty(), Arc::new(MemorySink::new()));
    let keys = ["ID3:Title", "ID3:Lyrics-por", "ID3:Publisher", "ID3:Comment"];
    let tags = svc.read_metadata_keys(&music_payload(), &keys).unwrap();

    assert_eq!(tags.len(), 4);
    assert_eq!(tags.get("ID3:Title").unwrap().to_string(), "Twist");
    assert_eq!(tags.get("ID3:Comment").unwrap().to_string(), "Remastered");
}

#[test]
fn test_requested_keys_are_subset_of_full_read() {
    let svc = test_service(MappingRegistry::empty(), Arc::new(MemorySink::new()));
    let payload = music_payload();
    let keys = ["ID3:Title", "ID3:Year", "ID3:Nope", "MPEG:Frame07", "Other:Missing"];

    let all = svc.read_metadata(&payload).unwrap();
    let some = svc.read_metadata_keys(&payload, &keys).unwrap();

    let expected: TagMap = all
        .iter()
        .filter(|(k, _)| keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    assert_eq!(some, expected);
    assert_eq!(some.len(), 3);
}

#[test]
fn test_missing_keys_are_tolerated() {
    let svc = test_service(MappingRegistry::empty(), Arc::new(MemorySink::new()));
    let tags = svc
        .read_metadata_keys(&image_payload(), &["EXIF:GPSLatitude", "XMP:Rating"])
        .unwrap();
    assert!(tags.is_empty());
}

// ─── Write-back ──────────────────────────────────────────────────

#[test]
fn test_write_image_tags_roundtrip() {
    let svc = test_service(MappingRegistry::empty(), Arc::new(MemorySink::new()));
    let mut payload = image_payload();

    let before = svc
        .read_metadata_keys(&payload, &["EXIF:ImageHeight", "EXIF:Software"])
        .unwrap();
    assert_eq!(before.get("EXIF:ImageHeight"), Some(&TagValue::Integer(100)));
    assert_eq!(
        before.get("EXIF:Software").unwrap().to_string(),
        "Adobe Photoshop CS4 Macintosh"
    );

    let mut values = TagMap::new();
    values.insert("EXIF:ImageHeight", 200);
    values.insert("EXIF:Software", "Nuxeo");
    assert!(svc.write_metadata(&mut payload, &values).unwrap());

    let after = svc
        .read_metadata_keys(&payload, &["EXIF:ImageHeight", "EXIF:Software"])
        .unwrap();
    assert_eq!(after, values);

    // Tags outside the write are preserved
    let all = svc.read_metadata(&payload).unwrap();
    assert_eq!(all.get("Photoshop:ColorMode").unwrap().to_string(), "RGB");
    assert_eq!(payload.filename.as_deref(), Some("montagehanoi.psd"));
}

#[test]
fn test_write_unchanged_keeps_payload() {
    let svc = MetadataService::new(MappingRegistry::empty()).with_introspector(
        MemoryIntrospector::new()
            .with_mime_type("image/*")
            .with_read_only_keys(["EXIF:ImageWidth"]),
    );
    let mut payload = image_payload();
    let original = payload.data.clone();

    let mut values = TagMap::new();
    values.insert("EXIF:ImageWidth", 640);
    assert!(!svc.write_metadata(&mut payload, &values).unwrap());
    assert_eq!(payload.data, original);
}

// ─── Mapping ─────────────────────────────────────────────────────

#[test]
fn test_document_mapping_with_missing_rule() {
    let sink = Arc::new(MemorySink::new());
    let registry = StaticMappingLoader::new(document_config()).load().unwrap();
    let svc = test_service(registry, sink.clone());

    let mut record = MemoryRecord::new("hello-doc");
    let report = svc
        .apply_mappings(
            &mut record,
            &document_payload(),
            &["pdfMapping", "hello", "imageMapping"],
        )
        .unwrap();

    assert_eq!(record.get("dc:title").unwrap().to_string(), "en-US");
    assert_eq!(
        record.get("dc:source").unwrap().to_string(),
        "OpenOffice.org 3.2"
    );
    assert_eq!(record.get("dc:description").unwrap().to_string(), "30 kB");
    assert!(record.get("dc:format").is_none());

    assert_eq!(report.missing_rules, vec!["hello"]);
    assert_eq!(report.skipped_rules, vec!["imageMapping"]);

    assert_eq!(sink.messages(), vec![MISSING_HELLO.to_string()]);
    assert_eq!(
        sink.diagnostics(),
        vec![Diagnostic::MissingDescriptor {
            id: "hello".to_string()
        }]
    );
}

#[test]
fn test_write_document_from_contributions() {
    let sink = Arc::new(MemorySink::new());
    let registry = document_config().into_registry().unwrap();
    let svc = test_service(registry, sink.clone());

    let mut record = MemoryRecord::new("hello-doc").with_property("dc:title", "Untitled");
    let report = svc.write_document(&mut record, &document_payload()).unwrap();

    assert_eq!(
        report.applied_fields,
        vec!["dc:title", "dc:source", "dc:description"]
    );
    assert_eq!(record.get("dc:title").unwrap().to_string(), "en-US");
    assert_eq!(sink.messages(), vec![MISSING_HELLO.to_string()]);
}

#[test]
fn test_rejected_matcher_is_silent() {
    let sink = Arc::new(MemorySink::new());
    let registry = document_config().into_registry().unwrap();
    let svc = test_service(registry, sink.clone());

    let mut record = MemoryRecord::new("song");
    let report = svc
        .apply_mappings(&mut record, &music_payload(), &["pdfMapping", "imageMapping"])
        .unwrap();

    assert!(report.applied_fields.is_empty());
    assert_eq!(report.skipped_rules.len(), 2);
    assert!(record.properties.is_empty());
    assert!(sink.diagnostics().is_empty());
}

#[test]
fn test_one_warning_per_missing_rule() {
    let sink = Arc::new(MemorySink::new());
    let registry = document_config().into_registry().unwrap();
    let svc = test_service(registry, sink.clone());

    let mut record = MemoryRecord::new("doc");
    let report = svc
        .apply_mappings(
            &mut record,
            &document_payload(),
            &["ghost-1", "pdfMapping", "ghost-2", "ghost-1"],
        )
        .unwrap();

    assert_eq!(report.missing_rules, vec!["ghost-1", "ghost-2", "ghost-1"]);
    assert_eq!(sink.diagnostics().len(), 3);
    assert_eq!(record.properties.len(), 3);
}

#[test]
fn test_write_document_selects_contributions_by_context() {
    let sink = Arc::new(MemorySink::new());
    let mut config = document_config();
    config.rules = vec![
        RuleContribution::new("documents", ["pdfMapping"])
            .with_matcher(PayloadMatcher::mime_type("application/pdf")),
        RuleContribution::new("pictures", ["imageMapping", "hello"])
            .with_matcher(PayloadMatcher::mime_type("image/*"))
            .with_record_type("Picture"),
    ];
    let svc = test_service(config.into_registry().unwrap(), sink.clone());

    // The picture contribution (and its unregistered id) stays out of document passes
    let mut doc = MemoryRecord::new("hello-doc").with_record_type("File");
    let report = svc.write_document(&mut doc, &document_payload()).unwrap();
    assert_eq!(report.applied_fields.len(), 3);
    assert!(report.is_complete());
    assert!(sink.diagnostics().is_empty());

    // Right payload, wrong record type
    let mut file = MemoryRecord::new("psd").with_record_type("File");
    let report = svc.write_document(&mut file, &image_payload()).unwrap();
    assert!(report.applied_fields.is_empty());
    assert!(file.properties.is_empty());
    assert!(sink.diagnostics().is_empty());

    let mut picture = MemoryRecord::new("psd").with_record_type("Picture");
    let report = svc.write_document(&mut picture, &image_payload()).unwrap();
    assert_eq!(report.applied_fields, vec!["dc:format"]);
    assert_eq!(
        picture.get("dc:format").unwrap().to_string(),
        "Adobe Photoshop CS4 Macintosh"
    );
    assert_eq!(sink.messages(), vec![MISSING_HELLO.to_string()]);
}

// ─── Loading & reload ────────────────────────────────────────────

#[test]
fn test_file_loader_drives_service() {
    let dir = std::env::temp_dir().join(format!("a3s-metadata-it-{}", uuid::Uuid::new_v4()));
    let loader = FileMappingLoader::new(dir.join("mappings.json"));
    loader.save(&document_config()).unwrap();

    let sink = Arc::new(MemorySink::new());
    let svc = test_service(MappingRegistry::empty(), sink.clone());
    assert!(svc.registry().is_empty());

    svc.reload_from(&loader).unwrap();
    assert_eq!(svc.registry().len(), 2);

    let mut record = MemoryRecord::new("doc");
    svc.write_document(&mut record, &document_payload()).unwrap();
    assert_eq!(record.properties.len(), 3);

    std::fs::remove_dir_all(&dir).unwrap();
}

#[test]
fn test_concurrent_mapping_during_reload() {
    let sink = Arc::new(MemorySink::new());
    let registry = document_config().into_registry().unwrap();
    let svc = Arc::new(test_service(registry, sink));
    let payload = document_payload();

    let mut handles = Vec::new();
    for i in 0..8 {
        let svc = svc.clone();
        let payload = payload.clone();
        handles.push(std::thread::spawn(move || {
            for _ in 0..20 {
                let mut record = MemoryRecord::new(format!("doc-{}", i));
                svc.apply_mappings(&mut record, &payload, &["pdfMapping"])
                    .unwrap();
                // Each pass sees either the full rule or none at all
                assert!(record.properties.is_empty() || record.properties.len() == 3);
            }
        }));
    }

    for _ in 0..10 {
        svc.reload(MappingRegistry::empty());
        svc.reload(document_config().into_registry().unwrap());
    }

    for handle in handles {
        handle.join().unwrap();
    }
}
