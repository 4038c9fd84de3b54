//! Display-string rendering for types and members. These strings are the
//! identity keys the differ matches on, so their exact shape matters.

use crate::{
    metadata::{
        signatures::{self, TypeSig},
        tables::{FieldAttributes, FieldRaw, MethodAttributes, MethodDefRaw, PropertyRaw},
        token::Token,
        view::MetadataView,
    },
    Result,
};

/// The generic parameter names in scope while rendering a signature: the
/// enclosing type's parameters and, inside a method signature, the method's
/// own parameters.
pub struct GenericContext<'a> {
    pub type_params: &'a [&'a str],
    pub method_params: &'a [&'a str],
}

impl<'a> GenericContext<'a> {
    /// Context for a member of `type_rid` outside any method signature.
    #[must_use]
    pub fn for_type(view: &'a MetadataView<'a>, type_rid: u32) -> GenericContext<'a> {
        GenericContext {
            type_params: view.type_generic_params(type_rid),
            method_params: &[],
        }
    }
}

/// Render a parsed signature type to its display form.
///
/// # Errors
/// Returns an error for constructs the renderer does not support and for
/// generic parameter references outside the active context.
pub fn render_type(
    view: &MetadataView<'_>,
    sig: &TypeSig,
    context: &GenericContext<'_>,
) -> Result<String> {
    match sig {
        TypeSig::Void => Ok("void".to_string()),
        TypeSig::Boolean => Ok("bool".to_string()),
        TypeSig::Char => Ok("char".to_string()),
        TypeSig::I1 => Ok("sbyte".to_string()),
        TypeSig::U1 => Ok("byte".to_string()),
        TypeSig::I2 => Ok("short".to_string()),
        TypeSig::U2 => Ok("ushort".to_string()),
        TypeSig::I4 => Ok("int".to_string()),
        TypeSig::U4 => Ok("uint".to_string()),
        TypeSig::I8 => Ok("long".to_string()),
        TypeSig::U8 => Ok("ulong".to_string()),
        TypeSig::R4 => Ok("float".to_string()),
        TypeSig::R8 => Ok("double".to_string()),
        TypeSig::String => Ok("string".to_string()),
        TypeSig::Object => Ok("object".to_string()),
        TypeSig::IntPtr => Ok("IntPtr".to_string()),
        TypeSig::UIntPtr => Ok("UIntPtr".to_string()),
        TypeSig::TypedByRef => Ok("TypedReference".to_string()),
        TypeSig::Ptr(inner) => Ok(format!("{}*", render_type(view, inner, context)?)),
        TypeSig::ByRef(inner) => Ok(format!("{}&", render_type(view, inner, context)?)),
        TypeSig::SzArray(element) => Ok(format!("{}[]", render_type(view, element, context)?)),
        TypeSig::Array(element, rank) => {
            let commas = ",".repeat(rank.saturating_sub(1) as usize);
            Ok(format!(
                "{}[{}]",
                render_type(view, element, context)?,
                commas
            ))
        }
        TypeSig::ValueType(token) | TypeSig::Class(token) => token_name(view, *token),
        TypeSig::GenericInst(base, args) => {
            let rendered = args
                .iter()
                .map(|arg| render_type(view, arg, context))
                .collect::<Result<Vec<_>>>()?;

            Ok(format!(
                "{}<{}>",
                render_type(view, base, context)?,
                rendered.join(",")
            ))
        }
        TypeSig::Var(index) => {
            let name = context.type_params.get(*index as usize).ok_or_else(|| {
                malformed_error!("Type generic parameter index out of range - {}", index)
            })?;

            Ok(format!("!{name}"))
        }
        TypeSig::MVar(index) => {
            let name = context.method_params.get(*index as usize).ok_or_else(|| {
                malformed_error!("Method generic parameter index out of range - {}", index)
            })?;

            Ok(format!("!!{name}"))
        }
        TypeSig::ModReq(modifier, inner) => Ok(format!(
            "{}modreq({})",
            render_type(view, inner, context)?,
            token_name(view, *modifier)?
        )),
        TypeSig::ModOpt(modifier, inner) => Ok(format!(
            "{}modopt({})",
            render_type(view, inner, context)?,
            token_name(view, *modifier)?
        )),
    }
}

fn token_name(view: &MetadataView<'_>, token: Token) -> Result<String> {
    match token.table() {
        0x02 => view.type_def_path(token.row()),
        0x01 => view.type_ref_name(token.row()),
        _ => Err(malformed_error!(
            "Cannot render type token - {}",
            token
        )),
    }
}

/// The display key of a field: modifiers, rendered type and name.
///
/// # Errors
/// Returns an error if the signature cannot be parsed or rendered.
pub fn field_string(view: &MetadataView<'_>, type_rid: u32, field: &FieldRaw) -> Result<String> {
    let sig = signatures::parse_field_signature(view.blob(field.signature)?)?;
    let context = GenericContext::for_type(view, type_rid);

    let mut result = field_prefix(field);
    result.push_str(&render_type(view, &sig, &context)?);
    result.push(' ');
    result.push_str(view.string(field.name)?);

    Ok(result)
}

/// The placeholder key used when a field signature fails to decode, so the
/// field still participates in the comparison by name.
///
/// # Errors
/// Returns an error if the field name cannot be resolved.
pub fn field_error_string(view: &MetadataView<'_>, field: &FieldRaw) -> Result<String> {
    let mut result = field_prefix(field);
    result.push_str("SIGERR ");
    result.push_str(view.string(field.name)?);

    Ok(result)
}

fn field_prefix(field: &FieldRaw) -> String {
    let mut prefix = String::new();

    let attributes = field.attributes();
    if attributes.contains(FieldAttributes::PUBLIC) {
        prefix.push_str("public ");
    }
    if attributes.contains(FieldAttributes::STATIC) {
        prefix.push_str("static ");
    }
    if attributes.contains(FieldAttributes::INIT_ONLY) {
        prefix.push_str("readonly ");
    }

    prefix
}

/// The display key of a property: rendered type, name and accessor list.
///
/// # Errors
/// Returns an error if the signature cannot be parsed or rendered.
pub fn property_string(
    view: &MetadataView<'_>,
    type_rid: u32,
    property: &PropertyRaw,
) -> Result<String> {
    let sig = signatures::parse_property_signature(view.blob(property.signature)?)?;
    let context = GenericContext::for_type(view, type_rid);

    Ok(format!(
        "{} {} {}",
        render_type(view, &sig, &context)?,
        view.string(property.name)?,
        property_accessor_list(view, property.rid)
    ))
}

/// The placeholder key used when a property signature fails to decode, so the
/// property still participates in the comparison by name.
///
/// # Errors
/// Returns an error if the property name cannot be resolved.
pub fn property_error_string(view: &MetadataView<'_>, property: &PropertyRaw) -> Result<String> {
    Ok(format!(
        "SIGERR {} {}",
        view.string(property.name)?,
        property_accessor_list(view, property.rid)
    ))
}

fn property_accessor_list(view: &MetadataView<'_>, property_rid: u32) -> String {
    use crate::metadata::tables::MethodSemanticsAttributes;

    let mut result = String::from("{ ");

    let accessors = view.property_accessors(property_rid);
    if accessors.contains(MethodSemanticsAttributes::GETTER) {
        result.push_str("get; ");
    }
    if accessors.contains(MethodSemanticsAttributes::SETTER) {
        result.push_str("set; ");
    }
    result.push('}');

    result
}

/// The display key of a method: modifiers, rendered return type, name and
/// parameter list.
///
/// # Errors
/// Returns an error if the signature cannot be parsed or rendered; callers
/// fall back to [`method_error_string`].
pub fn method_string(
    view: &MetadataView<'_>,
    type_rid: u32,
    method: &MethodDefRaw,
) -> Result<String> {
    let sig = signatures::parse_method_signature(view.blob(method.signature)?)?;
    let context = GenericContext {
        type_params: view.type_generic_params(type_rid),
        method_params: view.method_generic_params(method.rid),
    };

    let mut result = method_prefix(method);
    result.push_str(&render_type(view, &sig.return_type, &context)?);
    result.push(' ');
    result.push_str(view.string(method.name)?);
    result.push_str(" (");

    for (index, param) in sig.params.iter().enumerate() {
        if index > 0 {
            result.push_str(", ");
        }
        result.push_str(&render_type(view, param, &context)?);
    }
    result.push(')');

    Ok(result)
}

/// The placeholder key used when a method signature fails to decode, so the
/// method still participates in the comparison by name.
///
/// # Errors
/// Returns an error if the method name cannot be resolved.
pub fn method_error_string(view: &MetadataView<'_>, method: &MethodDefRaw) -> Result<String> {
    let mut result = method_prefix(method);
    result.push_str("SIGERR ");
    result.push_str(view.string(method.name)?);
    result.push_str(" (SIGERR)");

    Ok(result)
}

fn method_prefix(method: &MethodDefRaw) -> String {
    let mut prefix = String::new();

    let attributes = method.attributes();
    if attributes.contains(MethodAttributes::PUBLIC) {
        prefix.push_str("public ");
    }
    if attributes.contains(MethodAttributes::STATIC) {
        prefix.push_str("static ");
    }

    prefix
}
