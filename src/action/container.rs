// src/action/container.rs

//! Zip-family archive rewriter
//!
//! Entries are read in central directory order, transformed (in parallel
//! when enabled) through the owning [`Transformer`], and written back in
//! their original order. Entries whose bytes did not change are raw-copied
//! so their compressed data, timestamps and extra fields survive exactly;
//! an archive in which nothing changed is returned as the original bytes.

use crate::action::service;
use crate::action::{ActionKind, ActionOutput};
use crate::changes::Changes;
use crate::config::SignaturePolicy;
use crate::error::{Error, Result};
use crate::selector::is_signature_file;
use crate::transform::Transformer;
use rayon::prelude::*;
use std::collections::HashMap;
use std::io::{Cursor, Read, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

/// Upper bound on buffer pre-allocation from a declared entry size
const MAX_PREALLOCATION: u64 = 1 << 20;

/// Entry read from the source archive
#[derive(Debug)]
struct SourceEntry {
    name: String,
    is_dir: bool,
    compression: CompressionMethod,
    modified: Option<DateTime>,
    unix_mode: Option<u32>,
    /// Decompressed content, or the reason it could not be read
    content: std::result::Result<Vec<u8>, String>,
}

/// How one source entry is written to the output archive
#[derive(Debug)]
enum Plan {
    /// Raw copy under the original name
    Copy,
    /// Raw copy under a new name
    CopyRenamed(String),
    /// Recompress new content
    Write { name: String, data: Vec<u8> },
    /// Omitted from the output (stripped signature or merged service file)
    Skip,
}

/// Rewrite an archive at the given nesting depth (0 for a root resource)
pub fn apply(transformer: &Transformer, name: &str, data: &[u8], depth: usize) -> Result<ActionOutput> {
    let limit = transformer.options().max_depth;
    if depth > limit {
        return Err(Error::RecursionLimit {
            resource: name.to_string(),
            limit,
        });
    }

    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| Error::malformed(name, format!("not a readable zip archive: {}", e)))?;
    let entries = read_entries(&mut archive, name)?;

    let strip = transformer.options().signature_policy == SignaturePolicy::Strip;
    let process = |entry: &SourceEntry| process_entry(transformer, entry, depth, strip);
    let mut outputs: Vec<Option<ActionOutput>> = if transformer.options().parallel {
        entries.par_iter().map(process).collect()
    } else {
        entries.iter().map(process).collect()
    };

    let mut changes = Changes::new(name, Some(ActionKind::Archive));
    let mut plans: Vec<Plan> = Vec::with_capacity(entries.len());
    for (entry, output) in entries.iter().zip(outputs.iter()) {
        plans.push(match output {
            None => {
                changes.add_removed_entry();
                Plan::Skip
            }
            Some(output) => plan_entry(entry, output),
        });
    }
    resolve_collisions(name, &entries, &mut plans, &mut outputs, &mut changes);

    for output in outputs.into_iter().flatten() {
        changes.add_entry(output.changes);
    }

    if !changes.has_changes() {
        debug!("Archive {} unchanged ({} entries)", name, entries.len());
        return Ok(ActionOutput {
            name: name.to_string(),
            data: data.to_vec(),
            changes,
        });
    }

    let rewritten = write_archive(&mut archive, name, &entries, plans)?;
    debug!(
        "Archive {}: {} entries, {} renamed, {} removed, {} merged",
        name,
        changes.entries().len(),
        changes.renamed_entries(),
        changes.removed_entries(),
        changes.merged_entries()
    );

    Ok(ActionOutput {
        name: name.to_string(),
        data: rewritten,
        changes,
    })
}

fn read_entries<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_name: &str,
) -> Result<Vec<SourceEntry>> {
    let mut entries = Vec::with_capacity(archive.len());

    for index in 0..archive.len() {
        let mut entry = {
            let file = archive
                .by_index_raw(index)
                .map_err(|e| Error::malformed(archive_name, format!("entry {}: {}", index, e)))?;
            SourceEntry {
                name: file.name().to_string(),
                is_dir: file.is_dir(),
                compression: file.compression(),
                modified: file.last_modified(),
                unix_mode: file.unix_mode(),
                content: Ok(Vec::new()),
            }
        };

        if !entry.is_dir {
            entry.content = match archive.by_index(index) {
                Ok(mut file) => {
                    let mut buf = Vec::with_capacity(file.size().min(MAX_PREALLOCATION) as usize);
                    file.read_to_end(&mut buf).map(|_| buf).map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };
        }
        entries.push(entry);
    }

    Ok(entries)
}

/// Transform one entry; `None` when the entry is dropped from the output
fn process_entry(
    transformer: &Transformer,
    entry: &SourceEntry,
    depth: usize,
    strip_signatures: bool,
) -> Option<ActionOutput> {
    if strip_signatures && is_signature_file(&entry.name) {
        return None;
    }

    if entry.is_dir {
        let mut output = ActionOutput::unchanged(&entry.name, &[], None);
        if let Some(renamed) = transformer.rules().rename_resource_path(&entry.name) {
            output.changes.set_output_name(&renamed);
            output.name = renamed;
        }
        return Some(output);
    }

    match &entry.content {
        Ok(data) => Some(transformer.transform_at_depth(&entry.name, data, depth + 1)),
        Err(reason) => {
            let error = Error::malformed(entry.name.as_str(), reason);
            warn!("{}", error);
            let mut output = ActionOutput::unchanged(&entry.name, &[], None);
            output.changes.mark_failed(&error);
            Some(output)
        }
    }
}

fn plan_entry(entry: &SourceEntry, output: &ActionOutput) -> Plan {
    if output.changes.is_failed() {
        return Plan::Copy;
    }
    let renamed = output.name != entry.name;
    let same_content = entry.is_dir
        || matches!(&entry.content, Ok(data) if *data == output.data);

    match (renamed, same_content) {
        (false, true) => Plan::Copy,
        (true, true) => Plan::CopyRenamed(output.name.clone()),
        (_, false) => Plan::Write {
            name: output.name.clone(),
            data: output.data.clone(),
        },
    }
}

fn planned_name<'a>(entry: &'a SourceEntry, plan: &'a Plan) -> Option<&'a str> {
    match plan {
        Plan::Copy => Some(&entry.name),
        Plan::CopyRenamed(name) | Plan::Write { name, .. } => Some(name),
        Plan::Skip => None,
    }
}

/// Make output names unique
///
/// Entries keeping their name claim it first. A renamed entry landing on a
/// claimed name is merged into the claimant when both are service
/// configurations; otherwise it keeps its original name.
fn resolve_collisions(
    archive_name: &str,
    entries: &[SourceEntry],
    plans: &mut [Plan],
    outputs: &mut [Option<ActionOutput>],
    changes: &mut Changes,
) {
    let mut claimed: HashMap<String, usize> = HashMap::new();
    for (index, (entry, plan)) in entries.iter().zip(plans.iter()).enumerate() {
        if let Some(name) = planned_name(entry, plan) {
            if name == entry.name {
                claimed.insert(name.to_string(), index);
            }
        }
    }

    for index in 0..plans.len() {
        let entry = &entries[index];
        let Some(target) = planned_name(entry, &plans[index]).map(str::to_string) else {
            continue;
        };
        if target == entry.name {
            continue;
        }

        let Some(&owner) = claimed.get(&target) else {
            claimed.insert(target, index);
            continue;
        };

        if service::service_type(&target).is_some() {
            let incoming = planned_data(entry, &plans[index]).to_vec();
            let existing = planned_data(&entries[owner], &plans[owner]).to_vec();
            plans[owner] = Plan::Write {
                name: target.clone(),
                data: service::merge(&existing, &incoming),
            };
            plans[index] = Plan::Skip;
            changes.add_merged_entry();
            debug!("Merged {} into {} in {}", entry.name, target, archive_name);
        } else {
            warn!(
                "Entry {} in {} would be renamed onto existing {}; keeping original name",
                entry.name, archive_name, target
            );
            keep_original_name(archive_name, entries, plans, outputs, &mut claimed, index);
        }
    }
}

/// Put an entry back under its original name
///
/// A renamed entry that already claimed that name is sent back to its own
/// original name in turn, until every claim is unique.
fn keep_original_name(
    archive_name: &str,
    entries: &[SourceEntry],
    plans: &mut [Plan],
    outputs: &mut [Option<ActionOutput>],
    claimed: &mut HashMap<String, usize>,
    index: usize,
) {
    let mut pending = Some(index);
    while let Some(current) = pending.take() {
        let entry = &entries[current];
        plans[current] = match std::mem::replace(&mut plans[current], Plan::Copy) {
            Plan::Write { data, .. } => Plan::Write {
                name: entry.name.clone(),
                data,
            },
            _ => Plan::Copy,
        };
        if let Some(output) = outputs[current].as_mut() {
            output.changes.set_output_name(&entry.name);
        }

        match claimed.insert(entry.name.clone(), current) {
            Some(previous) if previous != current && entries[previous].name != entry.name => {
                warn!(
                    "Entry {} in {} displaced by {}; keeping original name",
                    entries[previous].name, archive_name, entry.name
                );
                pending = Some(previous);
            }
            _ => {}
        }
    }
}

fn planned_data<'a>(entry: &'a SourceEntry, plan: &'a Plan) -> &'a [u8] {
    match plan {
        Plan::Write { data, .. } => data,
        _ => entry.content.as_deref().unwrap_or_default(),
    }
}

fn write_archive<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    archive_name: &str,
    entries: &[SourceEntry],
    plans: Vec<Plan>,
) -> Result<Vec<u8>> {
    let zip_error = |e: zip::result::ZipError| Error::malformed(archive_name, e);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (index, (entry, plan)) in entries.iter().zip(plans).enumerate() {
        match plan {
            Plan::Skip => {}
            Plan::Copy => {
                let file = archive.by_index_raw(index).map_err(zip_error)?;
                writer.raw_copy_file(file).map_err(zip_error)?;
            }
            Plan::CopyRenamed(name) => {
                let file = archive.by_index_raw(index).map_err(zip_error)?;
                writer.raw_copy_file_rename(file, name).map_err(zip_error)?;
            }
            Plan::Write { name, data } => {
                let method = match entry.compression {
                    CompressionMethod::Stored => CompressionMethod::Stored,
                    _ => CompressionMethod::Deflated,
                };
                let mut options = SimpleFileOptions::default()
                    .compression_method(method)
                    .large_file(data.len() as u64 >= u32::MAX as u64);
                if let Some(modified) = entry.modified {
                    options = options.last_modified_time(modified);
                }
                if let Some(mode) = entry.unix_mode {
                    options = options.unix_permissions(mode);
                }
                writer.start_file(name, options).map_err(zip_error)?;
                writer
                    .write_all(&data)
                    .map_err(|e| Error::malformed(archive_name, e))?;
            }
        }
    }

    writer.set_raw_comment(archive.comment().into());
    let cursor = writer.finish().map_err(zip_error)?;
    Ok(cursor.into_inner())
}
