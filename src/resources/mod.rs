// Resources module - instruction and icon discovery on removable storage
//
// This module provides three components:
// 1. ResourceParser: Pure mapping from a storage entry name to a typed resource
// 2. Storage: Port over the backing file system (plus the desktop implementation)
// 3. InstructionStore: Retried, single-flight discovery with a cached snapshot
//
// The discovery workflow:
// 1. Verify storage, ensure directory and marker file (retried with backoff)
// 2. List entries and parse each one
// 3. Partition into instructions, icons and per-file failures

pub mod parser;
pub mod storage;
pub mod store;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use parser::ResourceParser;
pub use storage::{FsStorage, IndexingRegistry, Storage, StorageEntry};
pub use store::InstructionStore;

/// One audio instruction, identified by (subject, language)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub subject: String,
    pub language: String,
    /// Opaque location handed back to the audio player
    pub audio_location: String,
    /// Offset of the cue inside the audio track; negative values are kept as-is
    pub cue_start_offset_ms: i64,
}

impl Instruction {
    pub fn key(&self) -> (String, String) {
        (self.subject.clone(), self.language.clone())
    }
}

/// Icon image for a subject
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Icon {
    pub subject: String,
    pub image_location: String,
}

/// Reason a storage entry could not be turned into a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParseFailureKind {
    /// Extension is neither a recognised audio nor icon format
    FileFormat,
    /// Entry name is not valid UTF-8
    FileNameEncoding,
    /// Audio name does not split into subject, language and cue offset
    InstructionFileNameFormat,
    /// Cue offset is not an integer
    InstructionCueTime,
}

/// A storage entry rejected by the parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnparsableResource {
    pub original_name: String,
    pub failure: ParseFailureKind,
}

/// Successful parse result
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedResource {
    Instruction(Instruction),
    Icon(Icon),
}

/// Immutable snapshot of one discovery pass
///
/// Instructions are keyed by (subject, language) and icons by subject. A later
/// entry with the same key replaces an earlier one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResourceSet {
    instructions: BTreeMap<(String, String), Instruction>,
    icons: BTreeMap<String, Icon>,
    failures: Vec<UnparsableResource>,
}

impl ParsedResourceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one parser outcome
    pub fn insert(&mut self, result: Result<ParsedResource, UnparsableResource>) {
        match result {
            Ok(ParsedResource::Instruction(instruction)) => {
                if let Some(previous) = self.instructions.insert(instruction.key(), instruction) {
                    log::warn!(
                        "[Resources] Duplicate instruction {}/{}: {} replaced",
                        previous.subject,
                        previous.language,
                        previous.audio_location
                    );
                }
            }
            Ok(ParsedResource::Icon(icon)) => {
                if let Some(previous) = self.icons.insert(icon.subject.clone(), icon) {
                    log::warn!(
                        "[Resources] Duplicate icon for {}: {} replaced",
                        previous.subject,
                        previous.image_location
                    );
                }
            }
            Err(failure) => self.failures.push(failure),
        }
    }

    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.values()
    }

    pub fn icons(&self) -> impl Iterator<Item = &Icon> {
        self.icons.values()
    }

    pub fn failures(&self) -> &[UnparsableResource] {
        &self.failures
    }

    pub fn instruction(&self, subject: &str, language: &str) -> Option<&Instruction> {
        self.instructions
            .get(&(subject.to_string(), language.to_string()))
    }

    pub fn icon(&self, subject: &str) -> Option<&Icon> {
        self.icons.get(subject)
    }

    /// Distinct subjects that have at least one instruction, sorted
    pub fn subjects(&self) -> Vec<String> {
        let mut subjects: Vec<String> = self
            .instructions
            .keys()
            .map(|(subject, _)| subject.clone())
            .collect();
        subjects.dedup();
        subjects
    }

    /// Languages available for a subject, sorted
    pub fn languages_for(&self, subject: &str) -> Vec<String> {
        self.instructions
            .keys()
            .filter(|(s, _)| s == subject)
            .map(|(_, language)| language.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty() && self.icons.is_empty() && self.failures.is_empty()
    }
}

impl FromIterator<Result<ParsedResource, UnparsableResource>> for ParsedResourceSet {
    fn from_iter<T: IntoIterator<Item = Result<ParsedResource, UnparsableResource>>>(
        iter: T,
    ) -> Self {
        let mut set = Self::new();
        for result in iter {
            set.insert(result);
        }
        set
    }
}
