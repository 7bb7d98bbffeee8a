// src/action/class.rs

//! Binary class file rewriter
//!
//! Walks the constant pool and rewrites UTF8 entries in place. Each entry
//! is interpreted by how the pool refers to it: class names (including
//! array descriptors), package names, descriptors and string literals.
//! UTF8 entries only referenced from fields, methods or attributes are
//! rewritten when they parse as a descriptor or generic signature, which
//! covers member descriptors, `Signature` attributes and annotation types.
//!
//! Pool indices never change, so everything after the constant pool is
//! copied through byte for byte.

use crate::action::signature;
use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::error::{Error, Result};
use crate::rules::RuleSet;
use std::ops::Range;
use tracing::debug;

const MAGIC: u32 = 0xCAFE_BABE;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

/// Decoded constant pool entry; only the references the rewriter needs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Constant {
    Utf8,
    Class(u16),
    String(u16),
    NameAndType { descriptor: u16 },
    MethodType(u16),
    Package(u16),
    Other,
    /// Second slot of a long or double
    Unusable,
}

#[derive(Debug, Clone)]
struct Entry {
    range: Range<usize>,
    constant: Constant,
}

/// How a UTF8 entry is used; lower variants win when an entry is shared
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Role {
    ClassName,
    Package,
    Descriptor,
    StringLiteral,
}

/// Parsed class file layout
struct ClassFile<'a> {
    data: &'a [u8],
    /// Index 0 is a placeholder, matching JVM pool numbering
    pool: Vec<Entry>,
    pool_start: usize,
    pool_end: usize,
    this_class: u16,
}

struct ByteReader<'a> {
    name: &'a str,
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(name: &'a str, data: &'a [u8]) -> Self {
        Self { name, data, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self.pos.checked_add(len).filter(|end| *end <= self.data.len());
        let Some(end) = end else {
            return Err(Error::malformed(
                self.name,
                format!("truncated at offset {}", self.pos),
            ));
        };
        let slice = &self.data[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

impl<'a> ClassFile<'a> {
    fn parse(name: &str, data: &'a [u8]) -> Result<Self> {
        let mut reader = ByteReader::new(name, data);

        let magic = reader.u32()?;
        if magic != MAGIC {
            return Err(Error::malformed(name, format!("bad magic 0x{:08X}", magic)));
        }
        let _minor = reader.u16()?;
        let _major = reader.u16()?;
        let count = reader.u16()? as usize;
        if count == 0 {
            return Err(Error::malformed(name, "empty constant pool"));
        }

        let pool_start = reader.pos;
        let mut pool = Vec::with_capacity(count);
        pool.push(Entry {
            range: 0..0,
            constant: Constant::Unusable,
        });

        while pool.len() < count {
            let start = reader.pos;
            let tag = reader.u8()?;
            let constant = match tag {
                TAG_UTF8 => {
                    let len = reader.u16()? as usize;
                    reader.take(len)?;
                    Constant::Utf8
                }
                TAG_INTEGER | TAG_FLOAT => {
                    reader.take(4)?;
                    Constant::Other
                }
                TAG_LONG | TAG_DOUBLE => {
                    reader.take(8)?;
                    Constant::Other
                }
                TAG_CLASS => Constant::Class(reader.u16()?),
                TAG_STRING => Constant::String(reader.u16()?),
                TAG_FIELDREF | TAG_METHODREF | TAG_INTERFACE_METHODREF => {
                    reader.take(4)?;
                    Constant::Other
                }
                TAG_NAME_AND_TYPE => {
                    let _name = reader.u16()?;
                    Constant::NameAndType {
                        descriptor: reader.u16()?,
                    }
                }
                TAG_METHOD_HANDLE => {
                    reader.take(3)?;
                    Constant::Other
                }
                TAG_METHOD_TYPE => Constant::MethodType(reader.u16()?),
                TAG_DYNAMIC | TAG_INVOKE_DYNAMIC => {
                    reader.take(4)?;
                    Constant::Other
                }
                TAG_MODULE => {
                    reader.u16()?;
                    Constant::Other
                }
                TAG_PACKAGE => Constant::Package(reader.u16()?),
                other => {
                    return Err(Error::malformed(
                        name,
                        format!("unknown constant pool tag {} at index {}", other, pool.len()),
                    ));
                }
            };

            pool.push(Entry {
                range: start..reader.pos,
                constant,
            });
            if matches!(tag, TAG_LONG | TAG_DOUBLE) {
                pool.push(Entry {
                    range: reader.pos..reader.pos,
                    constant: Constant::Unusable,
                });
            }
        }
        let pool_end = reader.pos;

        let _access = reader.u16()?;
        let this_class = reader.u16()?;
        let super_class = reader.u16()?;
        let interfaces = reader.u16()?;
        let mut class_refs = vec![this_class];
        if super_class != 0 {
            class_refs.push(super_class);
        }
        for _ in 0..interfaces {
            class_refs.push(reader.u16()?);
        }

        let class = Self {
            data,
            pool,
            pool_start,
            pool_end,
            this_class,
        };

        for index in class_refs {
            if !matches!(class.constant(index), Some(Constant::Class(_))) {
                return Err(Error::malformed(
                    name,
                    format!("index {} is not a class constant", index),
                ));
            }
        }
        for entry in &class.pool {
            let target = match entry.constant {
                Constant::Class(i)
                | Constant::String(i)
                | Constant::MethodType(i)
                | Constant::Package(i)
                | Constant::NameAndType { descriptor: i } => i,
                _ => continue,
            };
            if class.constant(target) != Some(Constant::Utf8) {
                return Err(Error::malformed(
                    name,
                    format!("index {} is not a UTF8 constant", target),
                ));
            }
        }

        Ok(class)
    }

    fn constant(&self, index: u16) -> Option<Constant> {
        self.pool.get(index as usize).map(|e| e.constant)
    }

    /// Raw bytes of a UTF8 entry (without tag and length)
    fn utf8(&self, index: usize) -> &'a [u8] {
        let range = &self.pool[index].range;
        &self.data[range.start + 3..range.end]
    }

    /// Role of each UTF8 entry, by the constants that reference it
    fn roles(&self) -> Vec<Option<Role>> {
        let mut roles = vec![None; self.pool.len()];
        let mut assign = |index: u16, role: Role| {
            let slot: &mut Option<Role> = &mut roles[index as usize];
            if slot.is_none_or(|current| role < current) {
                *slot = Some(role);
            }
        };

        for entry in &self.pool {
            match entry.constant {
                Constant::Class(i) => assign(i, Role::ClassName),
                Constant::Package(i) => assign(i, Role::Package),
                Constant::NameAndType { descriptor } => assign(descriptor, Role::Descriptor),
                Constant::MethodType(i) => assign(i, Role::Descriptor),
                Constant::String(i) => assign(i, Role::StringLiteral),
                _ => {}
            }
        }
        roles
    }

    fn class_name(&self, index: u16) -> Option<&'a str> {
        match self.constant(index)? {
            Constant::Class(name) => std::str::from_utf8(self.utf8(name as usize)).ok(),
            _ => None,
        }
    }
}

/// Outcome of rewriting one UTF8 entry
enum Rewrite {
    /// Not a rule-matchable unit
    Skip,
    Unchanged,
    Changed(String),
}

fn rewrite_utf8(rules: &RuleSet, role: Option<Role>, text: &str) -> Rewrite {
    let rename = |name: &str| rules.rename_binary_name(name);

    let renamed = match role {
        Some(Role::ClassName) if text.starts_with('[') => {
            return rewrite_signature(text, rename);
        }
        Some(Role::ClassName) | Some(Role::Package) => rules.rename_binary_name(text),
        Some(Role::Descriptor) | None => return rewrite_signature(text, rename),
        Some(Role::StringLiteral) => {
            if let Some(direct) = rules.direct(text) {
                Some(direct.to_string())
            } else if !text.contains(['.', '/']) {
                return Rewrite::Skip;
            } else {
                rules
                    .rewrite_text(text.as_bytes())
                    .and_then(|(bytes, _)| String::from_utf8(bytes).ok())
            }
        }
    };

    match renamed {
        Some(renamed) => Rewrite::Changed(renamed),
        None => Rewrite::Unchanged,
    }
}

fn rewrite_signature<F>(text: &str, rename: F) -> Rewrite
where
    F: Fn(&str) -> Option<String>,
{
    match signature::rewrite(text, rename) {
        Some(result) if result.renamed > 0 => Rewrite::Changed(result.text),
        Some(_) => Rewrite::Unchanged,
        None => Rewrite::Skip,
    }
}

/// Rewrite a class file
///
/// Fails with [`Error::MalformedResource`] when the class structure cannot
/// be parsed; the caller copies the resource through in that case.
pub fn apply(rules: &RuleSet, name: &str, data: &[u8]) -> Result<ActionOutput> {
    let class = ClassFile::parse(name, data)?;
    let roles = class.roles();
    let mut changes = Changes::new(name, Some(ActionKind::Class));

    let mut out = Vec::with_capacity(data.len() + 64);
    out.extend_from_slice(&data[..class.pool_start]);

    for (index, entry) in class.pool.iter().enumerate().skip(1) {
        if entry.constant != Constant::Utf8 {
            out.extend_from_slice(&data[entry.range.clone()]);
            continue;
        }

        let raw = class.utf8(index);
        // Modified UTF-8 (embedded NUL, surrogate pairs) is never a rename candidate
        let Ok(text) = std::str::from_utf8(raw) else {
            out.extend_from_slice(&data[entry.range.clone()]);
            continue;
        };

        match rewrite_utf8(rules, roles[index], text) {
            Rewrite::Skip => out.extend_from_slice(&data[entry.range.clone()]),
            Rewrite::Unchanged => {
                changes.add_unchanged_provider();
                out.extend_from_slice(&data[entry.range.clone()]);
            }
            Rewrite::Changed(renamed) => {
                let len = u16::try_from(renamed.len()).map_err(|_| {
                    Error::malformed(name, format!("constant {} too long after rename", index))
                })?;
                changes.add_changed_provider();
                out.push(TAG_UTF8);
                out.extend_from_slice(&len.to_be_bytes());
                out.extend_from_slice(renamed.as_bytes());
            }
        }
    }

    out.extend_from_slice(&data[class.pool_end..]);

    let output_name = output_name(rules, name, class.class_name(class.this_class));
    changes.set_output_name(&output_name);

    debug!(
        "Class {} -> {}: {} changed, {} unchanged",
        name,
        output_name,
        changes.changed_providers(),
        changes.unchanged_providers()
    );

    let data = if changes.changed_providers() > 0 {
        out
    } else {
        data.to_vec()
    };

    Ok(ActionOutput {
        name: output_name,
        data,
        changes,
    })
}

/// Output path of a class resource
///
/// When the path ends with the binary name of the class, the renamed
/// binary name is substituted; otherwise the package directory is renamed.
fn output_name(rules: &RuleSet, name: &str, this_class: Option<&str>) -> String {
    if let Some(class_name) = this_class {
        let suffix = format!("{}.class", class_name);
        if let Some(root) = path_root(name, &suffix) {
            return match rules.rename_binary_name(class_name) {
                Some(renamed) => format!("{}{}.class", root, renamed),
                None => name.to_string(),
            };
        }
    }
    rules
        .rename_resource_path(name)
        .unwrap_or_else(|| name.to_string())
}

/// Leading part of `name` before `suffix`, if `suffix` is a whole path tail
fn path_root<'a>(name: &'a str, suffix: &str) -> Option<&'a str> {
    let root = name.strip_suffix(suffix)?;
    (root.is_empty() || root.ends_with('/')).then_some(root)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal class file builder for tests
    #[derive(Default)]
    struct ClassBuilder {
        pool: Vec<Vec<u8>>,
    }

    impl ClassBuilder {
        fn utf8(&mut self, text: &str) -> u16 {
            let mut entry = vec![TAG_UTF8];
            entry.extend_from_slice(&(text.len() as u16).to_be_bytes());
            entry.extend_from_slice(text.as_bytes());
            self.push(entry)
        }

        fn class(&mut self, name: &str) -> u16 {
            let utf8 = self.utf8(name);
            let mut entry = vec![TAG_CLASS];
            entry.extend_from_slice(&utf8.to_be_bytes());
            self.push(entry)
        }

        fn string(&mut self, value: &str) -> u16 {
            let utf8 = self.utf8(value);
            let mut entry = vec![TAG_STRING];
            entry.extend_from_slice(&utf8.to_be_bytes());
            self.push(entry)
        }

        fn long(&mut self, value: i64) -> u16 {
            let mut entry = vec![TAG_LONG];
            entry.extend_from_slice(&value.to_be_bytes());
            let index = self.push(entry);
            self.pool.push(Vec::new());
            index
        }

        fn push(&mut self, entry: Vec<u8>) -> u16 {
            self.pool.push(entry);
            self.pool.len() as u16
        }

        /// Serialize with one method using `descriptor`
        fn build(mut self, this_class: &str, super_class: &str, descriptor: &str) -> Vec<u8> {
            let this_index = self.class(this_class);
            let super_index = self.class(super_class);
            let method_name = self.utf8("service");
            let method_descriptor = self.utf8(descriptor);

            let mut out = Vec::new();
            out.extend_from_slice(&MAGIC.to_be_bytes());
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

    fn rules() -> RuleSet {
        RuleSet::builder()
            .rename("javax.servlet", "jakarta.servlet")
            .direct("javax.servlet.resources", "jakarta.servlet.resources.v5")
            .build()
            .unwrap()
    }

    fn servlet_class() -> Vec<u8> {
        let mut builder = ClassBuilder::default();
        builder.string("javax.servlet.include.request_uri");
        builder.string("plain text");
        builder.long(42);
        builder.utf8("Ljava/util/List<Ljavax/servlet/Filter;>;");
        builder.build(
            "javax/servlet/http/MyServlet",
            "javax/servlet/GenericServlet",
            "(Ljavax/servlet/ServletRequest;Ljavax/servlet/ServletResponse;)V",
        )
    }

    fn pool_strings(data: &[u8]) -> Vec<String> {
        let class = ClassFile::parse("test", data).unwrap();
        class
            .pool
            .iter()
            .enumerate()
            .filter(|(_, e)| e.constant == Constant::Utf8)
            .map(|(i, _)| String::from_utf8(class.utf8(i).to_vec()).unwrap())
            .collect()
    }

    #[test]
    fn test_rewrites_class_references() {
        let rules = rules();
        let output = apply(&rules, "javax/servlet/http/MyServlet.class", &servlet_class()).unwrap();

        assert_eq!(output.name, "jakarta/servlet/http/MyServlet.class");
        let strings = pool_strings(&output.data);
        assert!(strings.contains(&"jakarta/servlet/http/MyServlet".to_string()));
        assert!(strings.contains(&"jakarta/servlet/GenericServlet".to_string()));
        assert!(strings.contains(&"jakarta.servlet.include.request_uri".to_string()));
        assert!(strings.contains(&"Ljava/util/List<Ljakarta/servlet/Filter;>;".to_string()));
        assert!(strings.contains(
            &"(Ljakarta/servlet/ServletRequest;Ljakarta/servlet/ServletResponse;)V".to_string()
        ));
        assert!(strings.contains(&"plain text".to_string()));
        assert!(strings.contains(&"service".to_string()));

        assert_eq!(output.changes.changed_providers(), 5);
        assert!(output.changes.has_non_resource_name_changes());
        assert!(output.changes.has_resource_name_changes());
    }

    #[test]
    fn test_second_pass_is_idempotent() {
        let rules = rules();
        let first = apply(&rules, "javax/servlet/http/MyServlet.class", &servlet_class()).unwrap();
        let second = apply(&rules, &first.name, &first.data).unwrap();

        assert_eq!(second.data, first.data);
        assert_eq!(second.name, first.name);
        assert_eq!(second.changes.changed_providers(), 0);
        assert!(!second.changes.has_changes());
    }

    #[test]
    fn test_deterministic() {
        let rules = rules();
        let a = apply(&rules, "javax/servlet/http/MyServlet.class", &servlet_class()).unwrap();
        let b = apply(&rules, "javax/servlet/http/MyServlet.class", &servlet_class()).unwrap();
        assert_eq!(a.data, b.data);
        assert_eq!(a.changes.changed_providers(), b.changes.changed_providers());
        assert_eq!(a.changes.unchanged_providers(), b.changes.unchanged_providers());
    }

    #[test]
    fn test_unmatched_class_is_byte_identical() {
        let mut builder = ClassBuilder::default();
        builder.string("hello");
        let data = builder.build("com/acme/Widget", "java/lang/Object", "()V");

        let output = apply(&rules(), "com/acme/Widget.class", &data).unwrap();
        assert_eq!(output.data, data);
        assert_eq!(output.name, "com/acme/Widget.class");
        assert_eq!(output.changes.changed_providers(), 0);
        assert_eq!(output.changes.unchanged_providers(), 2);
    }

    #[test]
    fn test_direct_rule_on_string_literal() {
        let mut builder = ClassBuilder::default();
        builder.string("javax.servlet.resources");
        let data = builder.build("com/acme/Widget", "java/lang/Object", "()V");

        let output = apply(&rules(), "com/acme/Widget.class", &data).unwrap();
        assert!(pool_strings(&output.data).contains(&"jakarta.servlet.resources.v5".to_string()));
    }

    #[test]
    fn test_web_inf_classes_output_name() {
        let rules = rules();
        let output = apply(
            &rules,
            "WEB-INF/classes/javax/servlet/http/MyServlet.class",
            &servlet_class(),
        )
        .unwrap();
        assert_eq!(output.name, "WEB-INF/classes/jakarta/servlet/http/MyServlet.class");
    }

    #[test]
    fn test_malformed_inputs() {
        let rules = rules();
        assert!(matches!(
            apply(&rules, "Bad.class", b"not a class"),
            Err(Error::MalformedResource { .. })
        ));

        let mut truncated = servlet_class();
        truncated.truncate(40);
        assert!(matches!(
            apply(&rules, "Trunc.class", &truncated),
            Err(Error::MalformedResource { .. })
        ));

        let mut bad_tag = servlet_class();
        bad_tag[10] = 99;
        assert!(matches!(
            apply(&rules, "Tag.class", &bad_tag),
            Err(Error::MalformedResource { .. })
        ));
    }
}
