//! Handle virtualization
//!
//! Object names handed out by the driver at capture time rarely match the names a replay
//! driver hands out. These tables translate record-time ids to replay-time ids per object
//! kind, with reverse lookups for the kinds that need them.

mod concurrent;
mod table;

pub use concurrent::ConcurrentHandleTables;
pub use table::HandleTable;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of driver-side object named by a handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    Buffer,
    Texture,
    Program,
    Shader,
    Framebuffer,
    Renderbuffer,
    Sampler,
    Sync,
    VertexArray,
    TransformFeedback,
    Query,
    Pipeline,
    UniformLocation,
    UniformBlock,
}

impl ObjectKind {
    pub const ALL: [ObjectKind; 14] = [
        ObjectKind::Buffer,
        ObjectKind::Texture,
        ObjectKind::Program,
        ObjectKind::Shader,
        ObjectKind::Framebuffer,
        ObjectKind::Renderbuffer,
        ObjectKind::Sampler,
        ObjectKind::Sync,
        ObjectKind::VertexArray,
        ObjectKind::TransformFeedback,
        ObjectKind::Query,
        ObjectKind::Pipeline,
        ObjectKind::UniformLocation,
        ObjectKind::UniformBlock,
    ];

    /// Dense index into per-kind arrays
    pub fn index(self) -> usize {
        self as usize
    }

    /// Kinds that need driver-id to trace-id lookups
    pub fn tracks_reverse(self) -> bool {
        matches!(
            self,
            ObjectKind::Program
                | ObjectKind::Shader
                | ObjectKind::Pipeline
                | ObjectKind::Texture
                | ObjectKind::Buffer
        )
    }

    /// Kinds whose entries are additionally keyed by the owning program
    pub fn is_program_scoped(self) -> bool {
        matches!(self, ObjectKind::UniformLocation | ObjectKind::UniformBlock)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ObjectKind::Buffer => "buffer",
            ObjectKind::Texture => "texture",
            ObjectKind::Program => "program",
            ObjectKind::Shader => "shader",
            ObjectKind::Framebuffer => "framebuffer",
            ObjectKind::Renderbuffer => "renderbuffer",
            ObjectKind::Sampler => "sampler",
            ObjectKind::Sync => "sync",
            ObjectKind::VertexArray => "vertex_array",
            ObjectKind::TransformFeedback => "transform_feedback",
            ObjectKind::Query => "query",
            ObjectKind::Pipeline => "pipeline",
            ObjectKind::UniformLocation => "uniform_location",
            ObjectKind::UniformBlock => "uniform_block",
        }
    }

    /// The "delete N objects" entry point for kinds that have one
    pub fn delete_function(self) -> Option<&'static str> {
        Some(match self {
            ObjectKind::Buffer => "glDeleteBuffers",
            ObjectKind::Texture => "glDeleteTextures",
            ObjectKind::Framebuffer => "glDeleteFramebuffers",
            ObjectKind::Renderbuffer => "glDeleteRenderbuffers",
            ObjectKind::Sampler => "glDeleteSamplers",
            ObjectKind::VertexArray => "glDeleteVertexArrays",
            ObjectKind::TransformFeedback => "glDeleteTransformFeedbacks",
            ObjectKind::Query => "glDeleteQueries",
            ObjectKind::Pipeline => "glDeleteProgramPipelines",
            _ => return None,
        })
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ObjectKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ObjectKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| format!("unknown object kind '{}'", s))
    }
}
