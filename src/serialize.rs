//! Serialization and Persistence
//!
//! Programs serialize as their raw instruction words. The packed layouts
//! are the contract between assemblers and the interpreter, so definitions
//! round-trip bit-exactly; names, descriptions, and tags ride along as
//! metadata.

use crate::program::{BuildError, PatchProgram};
use crate::voice::{VoiceBuildError, VoiceProgram};
use serde::{Deserialize, Serialize};

/// Serializable patch program definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatchDef {
    /// Schema version for forward compatibility
    pub version: u32,

    /// Definition metadata
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,

    /// Raw 64-bit instruction words, in execution order
    pub code: Vec<u64>,
}

impl PatchDef {
    /// Capture a program under a name.
    pub fn from_program(name: impl Into<String>, program: &PatchProgram) -> Self {
        Self {
            version: 1,
            name: name.into(),
            description: None,
            tags: vec![],
            code: program.instrs().iter().map(|i| i.0).collect(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Rebuild the executable program, validating capacity.
    pub fn to_program(&self) -> Result<PatchProgram, BuildError> {
        PatchProgram::from_words(&self.code)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

/// Serializable voice program definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceDef {
    /// Schema version for forward compatibility
    pub version: u32,

    /// Definition metadata
    pub name: String,
    pub description: Option<String>,
    pub tags: Vec<String>,

    /// Raw 32-bit score instruction words, in score order
    pub code: Vec<u32>,
}

impl VoiceDef {
    /// Capture a score under a name.
    pub fn from_program(name: impl Into<String>, program: &VoiceProgram) -> Self {
        Self {
            version: 1,
            name: name.into(),
            description: None,
            tags: vec![],
            code: program.instrs().iter().map(|i| i.0).collect(),
        }
    }

    /// Set the description
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = Some(desc.into());
        self
    }

    /// Add a tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Rebuild the executable score, validating capacity.
    pub fn to_program(&self) -> Result<VoiceProgram, VoiceBuildError> {
        VoiceProgram::from_words(&self.code)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
