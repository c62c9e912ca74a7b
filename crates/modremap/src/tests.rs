use super::*;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use zip::write::FileOptions;
use zip::ZipWriter;

mod access_rules;
mod nesting;
mod refmap;

/// Builds a minimal but valid class file: constant pool, this/super,
/// optional declared members with empty attribute tables.
pub(crate) struct TestClass {
    name: String,
    superclass: String,
    fields: Vec<(String, String)>,
    methods: Vec<(String, String)>,
    strings: Vec<Vec<u8>>,
}

impl TestClass {
    pub(crate) fn new(name: &str, superclass: &str) -> Self {
        Self {
            name: name.to_string(),
            superclass: superclass.to_string(),
            fields: Vec::new(),
            methods: Vec::new(),
            strings: Vec::new(),
        }
    }

    pub(crate) fn field(mut self, name: &str, descriptor: &str) -> Self {
        self.fields.push((name.to_string(), descriptor.to_string()));
        self
    }

    pub(crate) fn method(mut self, name: &str, descriptor: &str) -> Self {
        self.methods
            .push((name.to_string(), descriptor.to_string()));
        self
    }

    /// Add a string constant with the given raw Utf8 payload. The payload is
    /// not required to be valid standard UTF-8.
    pub(crate) fn string_constant(mut self, bytes: &[u8]) -> Self {
        self.strings.push(bytes.to_vec());
        self
    }

    pub(crate) fn build(self) -> Vec<u8> {
        fn raw_utf8_entry(bytes: &[u8]) -> Vec<u8> {
            let mut entry = vec![1];
            entry.extend((bytes.len() as u16).to_be_bytes());
            entry.extend(bytes);
            entry
        }
        fn utf8_entry(value: &str) -> Vec<u8> {
            raw_utf8_entry(value.as_bytes())
        }
        fn class_entry(utf8: u16) -> Vec<u8> {
            let mut entry = vec![7];
            entry.extend(utf8.to_be_bytes());
            entry
        }

        let mut entries: Vec<Vec<u8>> = Vec::new();
        let push = |entry: Vec<u8>, entries: &mut Vec<Vec<u8>>| -> u16 {
            entries.push(entry);
            entries.len() as u16
        };

        let this_utf8 = push(utf8_entry(&self.name), &mut entries);
        let this_class = push(class_entry(this_utf8), &mut entries);
        let super_utf8 = push(utf8_entry(&self.superclass), &mut entries);
        let super_class = push(class_entry(super_utf8), &mut entries);

        let mut field_indices = Vec::new();
        for (name, descriptor) in &self.fields {
            let name_index = push(utf8_entry(name), &mut entries);
            let descriptor_index = push(utf8_entry(descriptor), &mut entries);
            field_indices.push((name_index, descriptor_index));
        }
        let mut method_indices = Vec::new();
        for (name, descriptor) in &self.methods {
            let name_index = push(utf8_entry(name), &mut entries);
            let descriptor_index = push(utf8_entry(descriptor), &mut entries);
            method_indices.push((name_index, descriptor_index));
        }
        for bytes in &self.strings {
            let utf8 = push(raw_utf8_entry(bytes), &mut entries);
            let mut string = vec![8];
            string.extend(utf8.to_be_bytes());
            push(string, &mut entries);
        }

        let mut out = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x00, 0x00, 0x34];
        out.extend(((entries.len() + 1) as u16).to_be_bytes());
        for entry in entries {
            out.extend(entry);
        }
        out.extend(0x0021u16.to_be_bytes()); // ACC_PUBLIC | ACC_SUPER
        out.extend(this_class.to_be_bytes());
        out.extend(super_class.to_be_bytes());
        out.extend(0u16.to_be_bytes()); // interfaces

        out.extend((field_indices.len() as u16).to_be_bytes());
        for (name, descriptor) in field_indices {
            out.extend(0x0001u16.to_be_bytes());
            out.extend(name.to_be_bytes());
            out.extend(descriptor.to_be_bytes());
            out.extend(0u16.to_be_bytes()); // attributes
        }
        out.extend((method_indices.len() as u16).to_be_bytes());
        for (name, descriptor) in method_indices {
            out.extend(0x0001u16.to_be_bytes());
            out.extend(name.to_be_bytes());
            out.extend(descriptor.to_be_bytes());
            out.extend(0u16.to_be_bytes()); // attributes
        }
        out.extend(0u16.to_be_bytes()); // class attributes

        out
    }
}

pub(crate) fn write_jar(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("create jar");
    let mut writer = ZipWriter::new(file);
    let options = FileOptions::default();
    for (name, bytes) in entries {
        writer.start_file(*name, options).expect("start entry");
        writer.write_all(bytes).expect("write entry");
    }
    writer.finish().expect("finish jar");
}

#[test]
fn classpath_filters_missing_input_and_duplicates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("input.jar");
    let present = dir.path().join("dep.jar");
    let missing = dir.path().join("missing.jar");
    std::fs::write(&input, b"jar").expect("write input");
    std::fs::write(&present, b"jar").expect("write dep");

    let files = vec![
        present.clone(),
        input.clone(),
        missing,
        present.clone(),
    ];
    let resolved = resolve_classpath(&files, &input);

    assert_eq!(resolved.len(), 1);
    assert_eq!(resolved[0].path(), present.as_path());
}

#[test]
fn classpath_preserves_insertion_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let input = dir.path().join("input.jar");
    let first = dir.path().join("a.jar");
    let second = dir.path().join("b.jar");
    for path in [&input, &first, &second] {
        std::fs::write(path, b"jar").expect("write jar");
    }

    let resolved = resolve_classpath(&[second.clone(), first.clone()], &input);
    let paths: Vec<_> = resolved.iter().map(|entry| entry.path()).collect();
    assert_eq!(paths, vec![second.as_path(), first.as_path()]);
}

#[test]
fn empty_classpath_is_valid() {
    let resolved = resolve_classpath(&[], Path::new("/nonexistent/input.jar"));
    assert!(resolved.is_empty());
}
