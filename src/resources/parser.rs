// ResourceParser - storage entry name to typed resource
//
// Naming convention:
//   <subject>_<language>_<cueStartOffsetMillis>.<audioExt>   instruction
//   <subject>.<imageExt>                                    icon
//
// The parser performs no I/O and holds no mutable state, so it can be shared
// across threads and called repeatedly on the same input.

use crate::config::ResourceConfig;

use super::{
    Icon, Instruction, ParseFailureKind, ParsedResource, StorageEntry, UnparsableResource,
};

/// File-format category decided from the extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ResourceKind {
    Audio,
    Icon,
}

/// Parses storage entries against configured extension sets
#[derive(Debug, Clone)]
pub struct ResourceParser {
    audio_extensions: Vec<String>,
    icon_extensions: Vec<String>,
    delimiter: char,
}

impl ResourceParser {
    /// Create a parser
    ///
    /// # Arguments
    /// * `audio_extensions` - Extensions recognised as instruction audio
    /// * `icon_extensions` - Extensions recognised as icons
    /// * `delimiter` - Separator between subject, language and cue offset
    pub fn new<I, J>(audio_extensions: I, icon_extensions: J, delimiter: char) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        J: IntoIterator,
        J::Item: AsRef<str>,
    {
        Self {
            audio_extensions: audio_extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
            icon_extensions: icon_extensions
                .into_iter()
                .map(|ext| ext.as_ref().to_lowercase())
                .collect(),
            delimiter,
        }
    }

    pub fn from_config(config: &ResourceConfig) -> Self {
        Self::new(
            &config.audio_extensions,
            &config.icon_extensions,
            config.delimiter,
        )
    }

    /// Parse a listed storage entry
    pub fn parse_entry(&self, entry: &StorageEntry) -> Result<ParsedResource, UnparsableResource> {
        self.parse(&entry.name, &entry.location)
    }

    /// Parse a raw entry name
    ///
    /// # Arguments
    /// * `name` - Entry name bytes as reported by storage
    /// * `location` - Opaque location recorded on the resulting resource
    ///
    /// # Returns
    /// * `Ok(ParsedResource)` - Instruction or icon
    /// * `Err(UnparsableResource)` - Entry name and failure kind
    pub fn parse(&self, name: &[u8], location: &str) -> Result<ParsedResource, UnparsableResource> {
        let name = std::str::from_utf8(name).map_err(|_| UnparsableResource {
            original_name: String::from_utf8_lossy(name).into_owned(),
            failure: ParseFailureKind::FileNameEncoding,
        })?;

        let fail = |failure| UnparsableResource {
            original_name: name.to_string(),
            failure,
        };

        let (base, extension) = name
            .rsplit_once('.')
            .ok_or_else(|| fail(ParseFailureKind::FileFormat))?;

        match self.classify(extension) {
            Some(ResourceKind::Audio) => self
                .parse_instruction(base, location)
                .map(ParsedResource::Instruction)
                .map_err(fail),
            Some(ResourceKind::Icon) => Ok(ParsedResource::Icon(Icon {
                subject: base.to_string(),
                image_location: location.to_string(),
            })),
            None => Err(fail(ParseFailureKind::FileFormat)),
        }
    }

    fn classify(&self, extension: &str) -> Option<ResourceKind> {
        let extension = extension.to_lowercase();
        if self.audio_extensions.contains(&extension) {
            Some(ResourceKind::Audio)
        } else if self.icon_extensions.contains(&extension) {
            Some(ResourceKind::Icon)
        } else {
            None
        }
    }

    fn parse_instruction(
        &self,
        base: &str,
        location: &str,
    ) -> Result<Instruction, ParseFailureKind> {
        let fields: Vec<&str> = base.split(self.delimiter).collect();
        let [subject, language, cue] = fields.as_slice() else {
            return Err(ParseFailureKind::InstructionFileNameFormat);
        };

        if subject.is_empty() || language.is_empty() {
            return Err(ParseFailureKind::InstructionFileNameFormat);
        }

        let cue_start_offset_ms = cue
            .parse::<i64>()
            .map_err(|_| ParseFailureKind::InstructionCueTime)?;

        Ok(Instruction {
            subject: subject.to_string(),
            language: language.to_string(),
            audio_location: location.to_string(),
            cue_start_offset_ms,
        })
    }
}

impl Default for ResourceParser {
    fn default() -> Self {
        Self::from_config(&ResourceConfig::default())
    }
}
