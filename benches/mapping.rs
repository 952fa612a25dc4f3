//! Performance benchmarks for a3s-metadata
//!
//! Run with: cargo bench

use a3s_metadata::{
    FieldBinding, MappingRegistry, MappingRule, MemoryIntrospector, MemoryRecord,
    MetadataService, PayloadMatcher, TagMap,
};
use criterion::{criterion_group, criterion_main, Criterion};

fn payload() -> a3s_metadata::Blob {
    let mut tags = TagMap::new();
    tags.insert("PDF:Producer", "OpenOffice.org 3.2");
    tags.insert("XMP:Language", "en-US");
    tags.insert("File:FileSize", "30 kB");
    for i in 0..64 {
        tags.insert(format!("XMP:Extra{}", i), i);
    }
    MemoryIntrospector::payload("application/pdf", &tags).unwrap()
}

fn service() -> MetadataService {
    let mut builder = MappingRegistry::builder();
    builder
        .register_rule(
            MappingRule::new("pdf")
                .with_matcher(PayloadMatcher::mime_type("application/pdf"))
                .with_binding(FieldBinding::read("XMP:Language", "dc:title"))
                .with_binding(FieldBinding::read("PDF:Producer", "dc:source"))
                .with_binding(FieldBinding::read("File:FileSize", "dc:description")),
        )
        .unwrap();
    for i in 0..32 {
        builder
            .register_rule(
                MappingRule::new(format!("image-{}", i))
                    .with_matcher(PayloadMatcher::mime_type("image/*")),
            )
            .unwrap();
    }

    MetadataService::new(builder.build())
        .with_introspector(MemoryIntrospector::new().with_mime_type("application/pdf"))
}

fn bench_read(c: &mut Criterion) {
    let svc = service();
    let payload = payload();

    c.bench_function("read_metadata", |b| {
        b.iter(|| svc.read_metadata(&payload).unwrap());
    });

    c.bench_function("read_metadata_keys", |b| {
        b.iter(|| {
            svc.read_metadata_keys(&payload, &["PDF:Producer", "XMP:Language"])
                .unwrap()
        });
    });
}

fn bench_apply_mappings(c: &mut Criterion) {
    let svc = service();
    let payload = payload();
    let rule_ids: Vec<String> = std::iter::once("pdf".to_string())
        .chain((0..32).map(|i| format!("image-{}", i)))
        .collect();

    c.bench_function("apply_mappings (33 rules)", |b| {
        b.iter(|| {
            let mut record = MemoryRecord::new("doc");
            svc.apply_mappings(&mut record, &payload, rule_ids.as_slice()).unwrap()
        });
    });
}

fn bench_write(c: &mut Criterion) {
    let svc = service();
    let mut values = TagMap::new();
    values.insert("XMP:Language", "pt-BR");

    c.bench_function("write_metadata", |b| {
        b.iter(|| {
            let mut payload = payload();
            svc.write_metadata(&mut payload, &values).unwrap()
        });
    });
}

criterion_group!(benches, bench_read, bench_apply_mappings, bench_write);
criterion_main!(benches);
