use crate::handles::ObjectKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Fixed-width literal types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarType {
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    U64,
    F32,
    F64,
    Bool,
}

impl ScalarType {
    /// Width in bytes before padding
    pub fn width(self) -> usize {
        match self {
            ScalarType::I8 | ScalarType::U8 | ScalarType::Bool => 1,
            ScalarType::I16 | ScalarType::U16 => 2,
            ScalarType::I32 | ScalarType::U32 | ScalarType::F32 => 4,
            ScalarType::I64 | ScalarType::U64 | ScalarType::F64 => 8,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Some(match s {
            "i8" => ScalarType::I8,
            "u8" => ScalarType::U8,
            "i16" => ScalarType::I16,
            "u16" => ScalarType::U16,
            "i32" => ScalarType::I32,
            "u32" => ScalarType::U32,
            "i64" => ScalarType::I64,
            "u64" => ScalarType::U64,
            "f32" => ScalarType::F32,
            "f64" => ScalarType::F64,
            "bool" => ScalarType::Bool,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ScalarType::I8 => "i8",
            ScalarType::U8 => "u8",
            ScalarType::I16 => "i16",
            ScalarType::U16 => "u16",
            ScalarType::I32 => "i32",
            ScalarType::U32 => "u32",
            ScalarType::I64 => "i64",
            ScalarType::U64 => "u64",
            ScalarType::F32 => "f32",
            ScalarType::F64 => "f64",
            ScalarType::Bool => "bool",
        }
    }
}

/// How a handle argument is looked up at replay time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleUse {
    /// Must already be mapped
    Lookup,
    /// Bind-style call: create the object on first use
    Bind,
}

/// Which capture rule an opaque pointer argument follows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpaqueRole {
    /// Texture upload, sourced from `GL_PIXEL_UNPACK_BUFFER` or client memory
    Texture,
    /// Pixel read-back, written to `GL_PIXEL_PACK_BUFFER` or client memory
    Readback,
    /// Any other client pointer
    Generic,
}

impl OpaqueRole {
    pub fn as_str(self) -> &'static str {
        match self {
            OpaqueRole::Texture => "texture",
            OpaqueRole::Readback => "readback",
            OpaqueRole::Generic => "generic",
        }
    }
}

/// Declared type of an argument or return value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgType {
    Void,
    Scalar(ScalarType),
    /// 32-bit enumerant; the string names the enum table used for display
    Enum(String),
    Handle { kind: ObjectKind, usage: HandleUse },
    HandleArray(ObjectKind),
    /// Program-scoped index (uniform location or uniform block index)
    Scoped(ObjectKind),
    String,
    StringArray,
    Array(ScalarType),
    Blob,
    Pointer(Box<ArgType>),
    Opaque(OpaqueRole),
}

impl ArgType {
    /// Parse the schema type grammar, e.g. `handle:texture:bind` or `ptr:i32`
    pub fn parse(s: &str) -> Result<Self, String> {
        let s = s.trim();
        if let Some(scalar) = ScalarType::parse(s) {
            return Ok(ArgType::Scalar(scalar));
        }
        match s {
            "void" => return Ok(ArgType::Void),
            "string" => return Ok(ArgType::String),
            "string[]" => return Ok(ArgType::StringArray),
            "blob" => return Ok(ArgType::Blob),
            "uniform_location" => return Ok(ArgType::Scoped(ObjectKind::UniformLocation)),
            "uniform_block" => return Ok(ArgType::Scoped(ObjectKind::UniformBlock)),
            _ => {}
        }

        let (head, rest) = s
            .split_once(':')
            .ok_or_else(|| format!("unknown type '{}'", s))?;
        match head {
            "enum" => {
                if rest.is_empty() {
                    return Err("enum needs a table name".into());
                }
                Ok(ArgType::Enum(rest.to_string()))
            }
            "handle" => {
                let (kind, usage) = match rest.split_once(':') {
                    Some((kind, "bind")) => (kind, HandleUse::Bind),
                    Some((_, other)) => return Err(format!("unknown handle usage '{}'", other)),
                    None => (rest, HandleUse::Lookup),
                };
                let kind: ObjectKind = kind.parse()?;
                if kind.is_program_scoped() {
                    return Err(format!("'{}' is program-scoped, not a handle", kind));
                }
                Ok(ArgType::Handle { kind, usage })
            }
            "handle[]" => Ok(ArgType::HandleArray(rest.parse()?)),
            "array" => ScalarType::parse(rest)
                .map(ArgType::Array)
                .ok_or_else(|| format!("unknown array element '{}'", rest)),
            "ptr" => Ok(ArgType::Pointer(Box::new(ArgType::parse(rest)?))),
            "opaque" => match rest {
                "texture" => Ok(ArgType::Opaque(OpaqueRole::Texture)),
                "readback" => Ok(ArgType::Opaque(OpaqueRole::Readback)),
                "generic" => Ok(ArgType::Opaque(OpaqueRole::Generic)),
                other => Err(format!("unknown opaque role '{}'", other)),
            },
            _ => Err(format!("unknown type '{}'", s)),
        }
    }

    /// Whether every encoding of this type has the same byte length
    pub fn is_fixed_length(&self) -> bool {
        matches!(
            self,
            ArgType::Void
                | ArgType::Scalar(_)
                | ArgType::Enum(_)
                | ArgType::Handle { .. }
                | ArgType::Scoped(_)
        )
    }
}

impl fmt::Display for ArgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgType::Void => f.write_str("void"),
            ArgType::Scalar(s) => f.write_str(s.as_str()),
            ArgType::Enum(table) => write!(f, "enum:{}", table),
            ArgType::Handle {
                kind,
                usage: HandleUse::Lookup,
            } => write!(f, "handle:{}", kind),
            ArgType::Handle {
                kind,
                usage: HandleUse::Bind,
            } => write!(f, "handle:{}:bind", kind),
            ArgType::HandleArray(kind) => write!(f, "handle[]:{}", kind),
            ArgType::Scoped(kind) => f.write_str(kind.as_str()),
            ArgType::String => f.write_str("string"),
            ArgType::StringArray => f.write_str("string[]"),
            ArgType::Array(s) => write!(f, "array:{}", s.as_str()),
            ArgType::Blob => f.write_str("blob"),
            ArgType::Pointer(inner) => write!(f, "ptr:{}", inner),
            ArgType::Opaque(role) => write!(f, "opaque:{}", role.as_str()),
        }
    }
}

/// Argument direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    In,
    Out,
    InOut,
}

/// Capture-time length of an array, blob or opaque argument
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LenExpr {
    /// Fixed element count
    Fixed(u32),
    /// Value of an earlier integer argument times a multiplier
    Arg { index: usize, multiplier: u32 },
    /// Pixel rectangle size from format/type/dimension arguments
    Image {
        format: usize,
        ty: usize,
        width: usize,
        height: usize,
        depth: Option<usize>,
    },
}

/// One declared parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Param {
    pub name: String,
    pub ty: ArgType,
    pub dir: Direction,
    pub len: Option<LenExpr>,
    /// Binding target that turns a generic opaque pointer into a buffer offset
    pub buffer_target: Option<u32>,
}

/// A traced entry point
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub id: u16,
    pub name: String,
    pub params: Vec<Param>,
    pub ret: ArgType,
    pub side_effects: bool,
    pub frame_boundary: bool,
    pub unsupported: bool,
}

impl Signature {
    /// Whether records of this function always have the same length
    pub fn is_fixed_length(&self) -> bool {
        self.ret.is_fixed_length() && self.params.iter().all(|p| p.ty.is_fixed_length())
    }

    pub fn param_index(&self, name: &str) -> Option<usize> {
        self.params.iter().position(|p| p.name == name)
    }

    pub fn has_return(&self) -> bool {
        self.ret != ArgType::Void
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_grammar() {
        assert_eq!(ArgType::parse("u32").unwrap(), ArgType::Scalar(ScalarType::U32));
        assert_eq!(
            ArgType::parse("enum:GLenum").unwrap(),
            ArgType::Enum("GLenum".into())
        );
        assert_eq!(
            ArgType::parse("handle:texture:bind").unwrap(),
            ArgType::Handle {
                kind: ObjectKind::Texture,
                usage: HandleUse::Bind
            }
        );
        assert_eq!(
            ArgType::parse("handle[]:buffer").unwrap(),
            ArgType::HandleArray(ObjectKind::Buffer)
        );
        assert_eq!(
            ArgType::parse("ptr:array:i32").unwrap(),
            ArgType::Pointer(Box::new(ArgType::Array(ScalarType::I32)))
        );
        assert_eq!(
            ArgType::parse("opaque:readback").unwrap(),
            ArgType::Opaque(OpaqueRole::Readback)
        );
        assert_eq!(
            ArgType::parse("uniform_location").unwrap(),
            ArgType::Scoped(ObjectKind::UniformLocation)
        );
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(ArgType::parse("handle:widget").is_err());
        assert!(ArgType::parse("handle:texture:gen").is_err());
        assert!(ArgType::parse("handle:uniform_location").is_err());
        assert!(ArgType::parse("opaque:vertex").is_err());
        assert!(ArgType::parse("enum:").is_err());
        assert!(ArgType::parse("u128").is_err());
    }

    #[test]
    fn test_display_matches_grammar() {
        for s in [
            "void",
            "f32",
            "enum:GLenum",
            "handle:program",
            "handle:buffer:bind",
            "handle[]:query",
            "string[]",
            "array:u8",
            "ptr:i64",
            "opaque:generic",
            "uniform_block",
        ] {
            assert_eq!(ArgType::parse(s).unwrap().to_string(), s);
        }
    }

    #[test]
    fn test_fixed_length() {
        assert!(ArgType::parse("handle:texture").unwrap().is_fixed_length());
        assert!(!ArgType::parse("blob").unwrap().is_fixed_length());
        assert!(!ArgType::parse("ptr:u32").unwrap().is_fixed_length());
    }
}
