//! Blob signature parsing for fields, properties and methods,
//! ECMA-335 II.23.2.

use crate::{file::parser::Parser, metadata::token::Token, Error::RecursionLimit, Result};

// Element type codes, ECMA-335 II.23.1.16.
pub const ELEMENT_TYPE_VOID: u8 = 0x01;
pub const ELEMENT_TYPE_BOOLEAN: u8 = 0x02;
pub const ELEMENT_TYPE_CHAR: u8 = 0x03;
pub const ELEMENT_TYPE_I1: u8 = 0x04;
pub const ELEMENT_TYPE_U1: u8 = 0x05;
pub const ELEMENT_TYPE_I2: u8 = 0x06;
pub const ELEMENT_TYPE_U2: u8 = 0x07;
pub const ELEMENT_TYPE_I4: u8 = 0x08;
pub const ELEMENT_TYPE_U4: u8 = 0x09;
pub const ELEMENT_TYPE_I8: u8 = 0x0A;
pub const ELEMENT_TYPE_U8: u8 = 0x0B;
pub const ELEMENT_TYPE_R4: u8 = 0x0C;
pub const ELEMENT_TYPE_R8: u8 = 0x0D;
pub const ELEMENT_TYPE_STRING: u8 = 0x0E;
pub const ELEMENT_TYPE_PTR: u8 = 0x0F;
pub const ELEMENT_TYPE_BYREF: u8 = 0x10;
pub const ELEMENT_TYPE_VALUETYPE: u8 = 0x11;
pub const ELEMENT_TYPE_CLASS: u8 = 0x12;
pub const ELEMENT_TYPE_VAR: u8 = 0x13;
pub const ELEMENT_TYPE_ARRAY: u8 = 0x14;
pub const ELEMENT_TYPE_GENERICINST: u8 = 0x15;
pub const ELEMENT_TYPE_TYPEDBYREF: u8 = 0x16;
pub const ELEMENT_TYPE_I: u8 = 0x18;
pub const ELEMENT_TYPE_U: u8 = 0x19;
pub const ELEMENT_TYPE_FNPTR: u8 = 0x1B;
pub const ELEMENT_TYPE_OBJECT: u8 = 0x1C;
pub const ELEMENT_TYPE_SZARRAY: u8 = 0x1D;
pub const ELEMENT_TYPE_MVAR: u8 = 0x1E;
pub const ELEMENT_TYPE_CMOD_REQD: u8 = 0x1F;
pub const ELEMENT_TYPE_CMOD_OPT: u8 = 0x20;
pub const ELEMENT_TYPE_SENTINEL: u8 = 0x41;
pub const ELEMENT_TYPE_PINNED: u8 = 0x45;

// Calling convention bits of the signature header byte.
const SIG_KIND_MASK: u8 = 0x0F;
const SIG_FIELD: u8 = 0x06;
const SIG_PROPERTY: u8 = 0x08;
const SIG_GENERIC: u8 = 0x10;
const SIG_HAS_THIS: u8 = 0x20;

/// Nesting limit for recursive type signatures.
const MAX_TYPE_DEPTH: usize = 50;

/// A parsed type from a signature blob.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TypeSig {
    Void,
    Boolean,
    Char,
    I1,
    U1,
    I2,
    U2,
    I4,
    U4,
    I8,
    U8,
    R4,
    R8,
    String,
    Object,
    IntPtr,
    UIntPtr,
    TypedByRef,
    /// `T*`
    Ptr(Box<TypeSig>),
    /// `T&`
    ByRef(Box<TypeSig>),
    /// A value type by `TypeDef`/`TypeRef`/`TypeSpec` token.
    ValueType(Token),
    /// A class type by `TypeDef`/`TypeRef`/`TypeSpec` token.
    Class(Token),
    /// An instantiated generic type with its arguments.
    GenericInst(Box<TypeSig>, Vec<TypeSig>),
    /// A generic parameter of the enclosing type, by position.
    Var(u32),
    /// A generic parameter of the enclosing method, by position.
    MVar(u32),
    /// A multi-dimensional array with the given rank.
    Array(Box<TypeSig>, u32),
    /// `T[]`
    SzArray(Box<TypeSig>),
    /// A required custom modifier around a type.
    ModReq(Token, Box<TypeSig>),
    /// An optional custom modifier around a type.
    ModOpt(Token, Box<TypeSig>),
}

/// A parsed method signature: calling convention, return type and parameters.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct MethodSignature {
    pub has_this: bool,
    pub generic_params: u32,
    pub return_type: TypeSig,
    pub params: Vec<TypeSig>,
}

/// Parse a `Field` signature blob.
///
/// # Errors
/// Returns an error if the header is not a field signature or the type is
/// malformed or unsupported.
pub fn parse_field_signature(data: &[u8]) -> Result<TypeSig> {
    let mut parser = Parser::new(data);

    let header = parser.read_le::<u8>()?;
    if header & SIG_KIND_MASK != SIG_FIELD {
        return Err(malformed_error!(
            "Not a field signature - header 0x{:02X}",
            header
        ));
    }

    parse_type(&mut parser, 0)
}

/// Parse a `Property` signature blob and return the property type.
///
/// # Errors
/// Returns an error if the header is not a property signature or the type is
/// malformed or unsupported.
pub fn parse_property_signature(data: &[u8]) -> Result<TypeSig> {
    let mut parser = Parser::new(data);

    let header = parser.read_le::<u8>()?;
    if header & SIG_KIND_MASK != SIG_PROPERTY {
        return Err(malformed_error!(
            "Not a property signature - header 0x{:02X}",
            header
        ));
    }

    // parameter count of the indexer parameters, not needed for the type
    parser.read_compressed_uint()?;

    parse_type(&mut parser, 0)
}

/// Parse a `MethodDef` or `MemberRef` method signature blob.
///
/// # Errors
/// Returns an error if any contained type is malformed or unsupported.
pub fn parse_method_signature(data: &[u8]) -> Result<MethodSignature> {
    let mut parser = Parser::new(data);

    let header = parser.read_le::<u8>()?;
    let generic_params = if header & SIG_GENERIC != 0 {
        parser.read_compressed_uint()?
    } else {
        0
    };

    let param_count = parser.read_compressed_uint()?;
    let return_type = parse_type(&mut parser, 0)?;

    let mut params = Vec::with_capacity(param_count as usize);
    for _ in 0..param_count {
        if parser.peek_byte()? == ELEMENT_TYPE_SENTINEL {
            parser.advance()?;
        }

        params.push(parse_type(&mut parser, 0)?);
    }

    Ok(MethodSignature {
        has_this: header & SIG_HAS_THIS != 0,
        generic_params,
        return_type,
        params,
    })
}

fn parse_type(parser: &mut Parser<'_>, depth: usize) -> Result<TypeSig> {
    if depth > MAX_TYPE_DEPTH {
        return Err(RecursionLimit(MAX_TYPE_DEPTH));
    }

    let element_type = parser.read_le::<u8>()?;
    match element_type {
        ELEMENT_TYPE_VOID => Ok(TypeSig::Void),
        ELEMENT_TYPE_BOOLEAN => Ok(TypeSig::Boolean),
        ELEMENT_TYPE_CHAR => Ok(TypeSig::Char),
        ELEMENT_TYPE_I1 => Ok(TypeSig::I1),
        ELEMENT_TYPE_U1 => Ok(TypeSig::U1),
        ELEMENT_TYPE_I2 => Ok(TypeSig::I2),
        ELEMENT_TYPE_U2 => Ok(TypeSig::U2),
        ELEMENT_TYPE_I4 => Ok(TypeSig::I4),
        ELEMENT_TYPE_U4 => Ok(TypeSig::U4),
        ELEMENT_TYPE_I8 => Ok(TypeSig::I8),
        ELEMENT_TYPE_U8 => Ok(TypeSig::U8),
        ELEMENT_TYPE_R4 => Ok(TypeSig::R4),
        ELEMENT_TYPE_R8 => Ok(TypeSig::R8),
        ELEMENT_TYPE_STRING => Ok(TypeSig::String),
        ELEMENT_TYPE_OBJECT => Ok(TypeSig::Object),
        ELEMENT_TYPE_I => Ok(TypeSig::IntPtr),
        ELEMENT_TYPE_U => Ok(TypeSig::UIntPtr),
        ELEMENT_TYPE_TYPEDBYREF => Ok(TypeSig::TypedByRef),
        ELEMENT_TYPE_PTR => Ok(TypeSig::Ptr(Box::new(parse_type(parser, depth + 1)?))),
        ELEMENT_TYPE_BYREF => Ok(TypeSig::ByRef(Box::new(parse_type(parser, depth + 1)?))),
        ELEMENT_TYPE_VALUETYPE => Ok(TypeSig::ValueType(parser.read_compressed_token()?)),
        ELEMENT_TYPE_CLASS => Ok(TypeSig::Class(parser.read_compressed_token()?)),
        ELEMENT_TYPE_VAR => Ok(TypeSig::Var(parser.read_compressed_uint()?)),
        ELEMENT_TYPE_MVAR => Ok(TypeSig::MVar(parser.read_compressed_uint()?)),
        ELEMENT_TYPE_SZARRAY => Ok(TypeSig::SzArray(Box::new(parse_type(parser, depth + 1)?))),
        ELEMENT_TYPE_GENERICINST => {
            // CLASS or VALUETYPE marker precedes the generic type token
            let base = parse_type(parser, depth + 1)?;
            let arg_count = parser.read_compressed_uint()?;

            let mut args = Vec::with_capacity(arg_count as usize);
            for _ in 0..arg_count {
                args.push(parse_type(parser, depth + 1)?);
            }

            Ok(TypeSig::GenericInst(Box::new(base), args))
        }
        ELEMENT_TYPE_ARRAY => {
            let element = parse_type(parser, depth + 1)?;
            let rank = parser.read_compressed_uint()?;

            let size_count = parser.read_compressed_uint()?;
            for _ in 0..size_count {
                parser.read_compressed_uint()?;
            }

            let bound_count = parser.read_compressed_uint()?;
            for _ in 0..bound_count {
                parser.read_compressed_uint()?;
            }

            Ok(TypeSig::Array(Box::new(element), rank))
        }
        ELEMENT_TYPE_CMOD_REQD => {
            let modifier = parser.read_compressed_token()?;
            Ok(TypeSig::ModReq(
                modifier,
                Box::new(parse_type(parser, depth + 1)?),
            ))
        }
        ELEMENT_TYPE_CMOD_OPT => {
            let modifier = parser.read_compressed_token()?;
            Ok(TypeSig::ModOpt(
                modifier,
                Box::new(parse_type(parser, depth + 1)?),
            ))
        }
        ELEMENT_TYPE_FNPTR => Err(malformed_error!(
            "Function pointer signatures are not supported"
        )),
        ELEMENT_TYPE_PINNED => Err(malformed_error!("Pinned types are not supported")),
        _ => Err(malformed_error!(
            "Unexpected element type - 0x{:02X}",
            element_type
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_signatures() {
        assert_eq!(parse_field_signature(&[0x06, 0x08]).unwrap(), TypeSig::I4);
        assert_eq!(
            parse_field_signature(&[0x06, 0x1D, 0x0E]).unwrap(),
            TypeSig::SzArray(Box::new(TypeSig::String))
        );

        // a method header is not a field signature
        assert!(parse_field_signature(&[0x20, 0x00, 0x01]).is_err());
    }

    #[test]
    fn field_signature_with_class_token() {
        // class token: TypeRef row 2
        let sig = parse_field_signature(&[0x06, 0x12, 0x09]).unwrap();
        match sig {
            TypeSig::Class(token) => assert_eq!(token.value(), 0x0100_0002),
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn property_signature() {
        assert_eq!(
            parse_property_signature(&[0x28, 0x00, 0x0E]).unwrap(),
            TypeSig::String
        );
        assert!(parse_property_signature(&[0x06, 0x08]).is_err());
    }

    #[test]
    fn method_signatures() {
        // static int (int, string)
        let sig = parse_method_signature(&[0x00, 0x02, 0x08, 0x08, 0x0E]).unwrap();
        assert!(!sig.has_this);
        assert_eq!(sig.generic_params, 0);
        assert_eq!(sig.return_type, TypeSig::I4);
        assert_eq!(sig.params, vec![TypeSig::I4, TypeSig::String]);

        // instance generic void<1> (!!0)
        let sig = parse_method_signature(&[0x30, 0x01, 0x01, 0x01, 0x1E, 0x00]).unwrap();
        assert!(sig.has_this);
        assert_eq!(sig.generic_params, 1);
        assert_eq!(sig.return_type, TypeSig::Void);
        assert_eq!(sig.params, vec![TypeSig::MVar(0)]);
    }

    #[test]
    fn generic_instance() {
        // List<int> as class GenericInst
        let sig = parse_field_signature(&[0x06, 0x15, 0x12, 0x0D, 0x01, 0x08]).unwrap();
        match sig {
            TypeSig::GenericInst(base, args) => {
                assert_eq!(*base, TypeSig::Class(crate::metadata::token::Token::new(0x0100_0003)));
                assert_eq!(args, vec![TypeSig::I4]);
            }
            other => panic!("expected generic instance, got {other:?}"),
        }
    }

    #[test]
    fn modified_type() {
        // modreq(TypeRef row 1) int
        let sig = parse_field_signature(&[0x06, 0x1F, 0x05, 0x08]).unwrap();
        match sig {
            TypeSig::ModReq(modifier, inner) => {
                assert_eq!(modifier.value(), 0x0100_0001);
                assert_eq!(*inner, TypeSig::I4);
            }
            other => panic!("expected modreq, got {other:?}"),
        }
    }

    #[test]
    fn multi_dimensional_array() {
        // int[,] with no sizes or bounds
        let sig = parse_field_signature(&[0x06, 0x14, 0x08, 0x02, 0x00, 0x00]).unwrap();
        assert_eq!(sig, TypeSig::Array(Box::new(TypeSig::I4), 2));
    }

    #[test]
    fn unsupported_constructs() {
        assert!(parse_field_signature(&[0x06, 0x1B]).is_err());
        assert!(parse_field_signature(&[0x06, 0x45, 0x08]).is_err());
        assert!(parse_field_signature(&[0x06, 0x7F]).is_err());
    }

    #[test]
    fn recursion_limit() {
        let mut data = vec![0x06];
        data.extend(std::iter::repeat(0x1D).take(60));
        data.push(0x08);

        assert!(matches!(
            parse_field_signature(&data),
            Err(RecursionLimit(_))
        ));
    }
}
