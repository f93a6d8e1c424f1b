use std::fmt::{self, Display, Formatter};

use thiserror::Error;

use crate::gl;

/// A hard failure: a programmer error or an unsupported construct.
///
/// Legacy-compatible failures (bad enums, type-mismatched uniform writes)
/// never surface here; they latch a [`GlError`] readable via `get_error`
/// instead.
#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(#[from] ErrorImpl);

#[derive(Debug, Error)]
pub(crate) enum ErrorImpl {
    #[error("not implemented yet: {0}")]
    NotImplemented(&'static str),
    #[error("no program is bound for the draw call")]
    NoProgramBound,
    #[error("the bound program is not linked")]
    ProgramNotLinked,
    #[error("indexed draw without a bound element array buffer")]
    NoIndexBuffer,
    #[error("unsupported primitive topology: 0x{0:04X}")]
    UnsupportedTopology(u32),
    #[error("unsupported index type: 0x{0:04X} (UNSIGNED_SHORT or UNSIGNED_INT required)")]
    UnsupportedIndexType(u32),
    #[error("enabled vertex attribute {0} has no bound buffer")]
    AttributeWithoutBuffer(u32),
    #[error("unsupported vertex format: type 0x{ty:04X} with {size} components")]
    UnsupportedVertexFormat { ty: u32, size: i32 },
    #[error("shader translation failed: {message}{trace}")]
    Translation {
        message: String,
        trace: AncestorTrace,
    },
    #[error("{0}")]
    Parse(String),
}

impl Error {
    pub(crate) fn not_implemented(what: &'static str) -> Self {
        Self(ErrorImpl::NotImplemented(what))
    }

    pub(crate) fn translation(message: impl Into<String>, trace: Vec<String>) -> Self {
        Self(ErrorImpl::Translation {
            message: message.into(),
            trace: AncestorTrace::new(trace),
        })
    }

    pub(crate) fn parse(message: impl Into<String>) -> Self {
        Self(ErrorImpl::Parse(message.into()))
    }

    /// `true` if the error marks a named hook for unimplemented
    /// functionality rather than a malformed input.
    pub fn is_not_implemented(&self) -> bool {
        matches!(self.0, ErrorImpl::NotImplemented(_))
    }
}

/// Latched error codes of the legacy API.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum GlError {
    InvalidEnum,
    InvalidValue,
    InvalidOperation,
    OutOfMemory,
}

impl GlError {
    pub const fn code(self) -> u32 {
        match self {
            Self::InvalidEnum => gl::INVALID_ENUM,
            Self::InvalidValue => gl::INVALID_VALUE,
            Self::InvalidOperation => gl::INVALID_OPERATION,
            Self::OutOfMemory => gl::OUT_OF_MEMORY,
        }
    }
}

/// The path of AST nodes visited when a translation failure occurred.
///
/// Long paths keep the first ten and last ten entries.
#[derive(Clone, Debug, Default)]
pub struct AncestorTrace {
    nodes: Vec<String>,
}

impl AncestorTrace {
    pub(crate) fn new(nodes: Vec<String>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }
}

impl Display for AncestorTrace {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if self.nodes.is_empty() {
            return Ok(());
        }

        f.write_str("\n  at ")?;
        if self.nodes.len() <= 20 {
            f.write_str(&self.nodes.join(" > "))
        } else {
            let head = self.nodes[..10].join(" > ");
            let tail = self.nodes[self.nodes.len() - 10..].join(" > ");
            write!(
                f,
                "{} > ... ({} elided) ... > {}",
                head,
                self.nodes.len() - 20,
                tail,
            )
        }
    }
}
