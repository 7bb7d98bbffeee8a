// tests/common/mod.rs

//! Shared fixtures for integration tests: a minimal class file builder
//! and in-memory archive helpers.

#![allow(dead_code)]

use nsmigrate::{RuleSet, TransformConfig, Transformer};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const TAG_UTF8: u8 = 1;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;

/// Builds class files with a hand-assembled constant pool
#[derive(Default)]
pub struct ClassBuilder {
    pool: Vec<Vec<u8>>,
}

impl ClassBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn utf8(&mut self, text: &str) -> u16 {
        let mut entry = vec![TAG_UTF8];
        entry.extend_from_slice(&(text.len() as u16).to_be_bytes());
        entry.extend_from_slice(text.as_bytes());
        self.push(entry)
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let utf8 = self.utf8(name);
        let mut entry = vec![TAG_CLASS];
        entry.extend_from_slice(&utf8.to_be_bytes());
        self.push(entry)
    }

    pub fn string(&mut self, value: &str) -> u16 {
        let utf8 = self.utf8(value);
        let mut entry = vec![TAG_STRING];
        entry.extend_from_slice(&utf8.to_be_bytes());
        self.push(entry)
    }

    fn push(&mut self, entry: Vec<u8>) -> u16 {
        self.pool.push(entry);
        self.pool.len() as u16
    }

    /// Serialize a public class with a single method `service`
    pub fn build(mut self, this_class: &str, super_class: &str, descriptor: &str) -> Vec<u8> {
        let this_index = self.class(this_class);
        let super_index = self.class(super_class);
        let method_name = self.utf8("service");
        let method_descriptor = self.utf8(descriptor);

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes());
        out.extend_from_slice(&52u16.to_be_bytes());
        out.extend_from_slice(&((self.pool.len() + 1) as u16).to_be_bytes());
        for entry in &self.pool {
            out.extend_from_slice(entry);
        }
        out.extend_from_slice(&0x0021u16.to_be_bytes());
        out.extend_from_slice(&this_index.to_be_bytes());
        out.extend_from_slice(&super_index.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // interfaces
        out.extend_from_slice(&0u16.to_be_bytes()); // fields
        out.extend_from_slice(&1u16.to_be_bytes()); // methods
        out.extend_from_slice(&0x0001u16.to_be_bytes());
        out.extend_from_slice(&method_name.to_be_bytes());
        out.extend_from_slice(&method_descriptor.to_be_bytes());
        out.extend_from_slice(&0u16.to_be_bytes()); // method attributes
        out.extend_from_slice(&0u16.to_be_bytes()); // class attributes
        out
    }
}

/// A servlet filter class in package `com/acme/web` referencing javax.servlet
pub fn filter_class(simple_name: &str) -> Vec<u8> {
    let mut builder = ClassBuilder::new();
    builder.class("javax/servlet/Filter");
    builder.string("javax.servlet.http.HttpServlet");
    builder.build(
        &format!("com/acme/web/{}", simple_name),
        "java/lang/Object",
        "(Ljavax/servlet/ServletRequest;Ljavax/servlet/ServletResponse;)V",
    )
}

/// A class with no references to renamed packages
pub fn plain_class(simple_name: &str) -> Vec<u8> {
    ClassBuilder::new().build(
        &format!("com/acme/util/{}", simple_name),
        "java/lang/Object",
        "(Ljava/lang/String;)V",
    )
}

pub fn rules() -> RuleSet {
    RuleSet::builder()
        .rename("javax.servlet", "jakarta.servlet")
        .rename("javax.annotation", "jakarta.annotation")
        .rename("com.example", "com.sample")
        .version("jakarta.servlet", "[5.0,6)")
        .build()
        .unwrap()
}

pub fn transformer() -> Transformer {
    transformer_with(&TransformConfig::default())
}

pub fn transformer_with(config: &TransformConfig) -> Transformer {
    Transformer::new(rules(), config).unwrap()
}

/// Build an archive in memory, deflating every entry
pub fn jar(entries: &[(&str, &[u8])]) -> Vec<u8> {
    jar_with(entries, CompressionMethod::Deflated)
}

pub fn jar_with(entries: &[(&str, &[u8])], method: CompressionMethod) -> Vec<u8> {
    let options = SimpleFileOptions::default().compression_method(method);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in entries {
        writer.start_file(*name, options).unwrap();
        writer.write_all(data).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// Entry read back from an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub name: String,
    pub data: Vec<u8>,
    pub compression: CompressionMethod,
}

pub fn read_entries(archive: &[u8]) -> Vec<Entry> {
    let mut archive = ZipArchive::new(Cursor::new(archive)).unwrap();
    (0..archive.len())
        .map(|i| {
            let mut file = archive.by_index(i).unwrap();
            let mut data = Vec::new();
            file.read_to_end(&mut data).unwrap();
            Entry {
                name: file.name().to_string(),
                data,
                compression: file.compression(),
            }
        })
        .collect()
}

pub fn entry_names(archive: &[u8]) -> Vec<String> {
    read_entries(archive).into_iter().map(|e| e.name).collect()
}
