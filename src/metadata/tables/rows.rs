//! Raw rows of the tables the differ reads, parsed straight from the `#~`
//! stream without heap resolution.

use bitflags::bitflags;

use crate::{
    file::io::read_le_at,
    metadata::tables::{CodedIndex, CodedIndexType, RowReadable, TableId, TableInfo},
    Result,
};

bitflags! {
    /// Field attribute bits compared by the differ, ECMA-335 II.23.1.5.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct FieldAttributes: u16 {
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
        const INIT_ONLY = 0x0020;
    }
}

bitflags! {
    /// Method attribute bits compared by the differ, ECMA-335 II.23.1.10.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MethodAttributes: u16 {
        const PUBLIC = 0x0006;
        const STATIC = 0x0010;
    }
}

bitflags! {
    /// Accessor kinds in the `MethodSemantics` table, ECMA-335 II.23.1.12.
    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    pub struct MethodSemanticsAttributes: u16 {
        const SETTER = 0x0001;
        const GETTER = 0x0002;
    }
}

fn read_str_index(data: &[u8], offset: &mut usize, info: &TableInfo) -> Result<u32> {
    crate::file::io::read_le_at_dyn(data, offset, info.is_large_str())
}

fn read_blob_index(data: &[u8], offset: &mut usize, info: &TableInfo) -> Result<u32> {
    crate::file::io::read_le_at_dyn(data, offset, info.is_large_blob())
}

fn read_table_index(
    data: &[u8],
    offset: &mut usize,
    info: &TableInfo,
    table_id: TableId,
) -> Result<u32> {
    crate::file::io::read_le_at_dyn(data, offset, info.table_index_bytes(table_id) == 4)
}

/// One `TypeDef` row: attributes, name and namespace, base type, and the
/// starts of the owned field and method runs.
pub struct TypeDefRaw {
    pub rid: u32,
    pub flags: u32,
    pub type_name: u32,
    pub type_namespace: u32,
    pub extends: CodedIndex,
    pub field_list: u32,
    pub method_list: u32,
}

impl RowReadable for TypeDefRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(TypeDefRaw {
            rid,
            flags: read_le_at::<u32>(data, offset)?,
            type_name: read_str_index(data, offset, info)?,
            type_namespace: read_str_index(data, offset, info)?,
            extends: CodedIndex::read(data, offset, info, CodedIndexType::TypeDefOrRef)?,
            field_list: read_table_index(data, offset, info, TableId::Field)?,
            method_list: read_table_index(data, offset, info, TableId::MethodDef)?,
        })
    }

    fn table_id() -> TableId {
        TableId::TypeDef
    }
}

/// One `TypeRef` row.
pub struct TypeRefRaw {
    pub rid: u32,
    pub resolution_scope: CodedIndex,
    pub type_name: u32,
    pub type_namespace: u32,
}

impl RowReadable for TypeRefRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(TypeRefRaw {
            rid,
            resolution_scope: CodedIndex::read(
                data,
                offset,
                info,
                CodedIndexType::ResolutionScope,
            )?,
            type_name: read_str_index(data, offset, info)?,
            type_namespace: read_str_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::TypeRef
    }
}

/// One `Field` row.
pub struct FieldRaw {
    pub rid: u32,
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
}

impl FieldRaw {
    #[must_use]
    pub fn attributes(&self) -> FieldAttributes {
        FieldAttributes::from_bits_truncate(self.flags)
    }
}

impl RowReadable for FieldRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(FieldRaw {
            rid,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_str_index(data, offset, info)?,
            signature: read_blob_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::Field
    }
}

/// One `MethodDef` row.
pub struct MethodDefRaw {
    pub rid: u32,
    pub rva: u32,
    pub impl_flags: u16,
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
    pub param_list: u32,
}

impl MethodDefRaw {
    #[must_use]
    pub fn attributes(&self) -> MethodAttributes {
        MethodAttributes::from_bits_truncate(self.flags)
    }
}

impl RowReadable for MethodDefRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(MethodDefRaw {
            rid,
            rva: read_le_at::<u32>(data, offset)?,
            impl_flags: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_str_index(data, offset, info)?,
            signature: read_blob_index(data, offset, info)?,
            param_list: read_table_index(data, offset, info, TableId::Param)?,
        })
    }

    fn table_id() -> TableId {
        TableId::MethodDef
    }
}

/// One `Property` row.
pub struct PropertyRaw {
    pub rid: u32,
    pub flags: u16,
    pub name: u32,
    pub signature: u32,
}

impl RowReadable for PropertyRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(PropertyRaw {
            rid,
            flags: read_le_at::<u16>(data, offset)?,
            name: read_str_index(data, offset, info)?,
            signature: read_blob_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::Property
    }
}

/// One `PropertyMap` row: a type and the start of its property run.
pub struct PropertyMapRaw {
    pub rid: u32,
    pub parent: u32,
    pub property_list: u32,
}

impl RowReadable for PropertyMapRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(PropertyMapRaw {
            rid,
            parent: read_table_index(data, offset, info, TableId::TypeDef)?,
            property_list: read_table_index(data, offset, info, TableId::Property)?,
        })
    }

    fn table_id() -> TableId {
        TableId::PropertyMap
    }
}

/// One `MethodSemantics` row: which method implements which accessor of an
/// event or property.
pub struct MethodSemanticsRaw {
    pub rid: u32,
    pub semantics: u16,
    pub method: u32,
    pub association: CodedIndex,
}

impl MethodSemanticsRaw {
    #[must_use]
    pub fn attributes(&self) -> MethodSemanticsAttributes {
        MethodSemanticsAttributes::from_bits_truncate(self.semantics)
    }
}

impl RowReadable for MethodSemanticsRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(MethodSemanticsRaw {
            rid,
            semantics: read_le_at::<u16>(data, offset)?,
            method: read_table_index(data, offset, info, TableId::MethodDef)?,
            association: CodedIndex::read(data, offset, info, CodedIndexType::HasSemantics)?,
        })
    }

    fn table_id() -> TableId {
        TableId::MethodSemantics
    }
}

/// One `MemberRef` row.
pub struct MemberRefRaw {
    pub rid: u32,
    pub class: CodedIndex,
    pub name: u32,
    pub signature: u32,
}

impl RowReadable for MemberRefRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(MemberRefRaw {
            rid,
            class: CodedIndex::read(data, offset, info, CodedIndexType::MemberRefParent)?,
            name: read_str_index(data, offset, info)?,
            signature: read_blob_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::MemberRef
    }
}

/// One `CustomAttribute` row.
pub struct CustomAttributeRaw {
    pub rid: u32,
    pub parent: CodedIndex,
    pub constructor: CodedIndex,
    pub value: u32,
}

impl RowReadable for CustomAttributeRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(CustomAttributeRaw {
            rid,
            parent: CodedIndex::read(data, offset, info, CodedIndexType::HasCustomAttribute)?,
            constructor: CodedIndex::read(
                data,
                offset,
                info,
                CodedIndexType::CustomAttributeType,
            )?,
            value: read_blob_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::CustomAttribute
    }
}

/// One `NestedClass` row: a nested type and its enclosing type.
pub struct NestedClassRaw {
    pub rid: u32,
    pub nested_class: u32,
    pub enclosing_class: u32,
}

impl RowReadable for NestedClassRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(NestedClassRaw {
            rid,
            nested_class: read_table_index(data, offset, info, TableId::TypeDef)?,
            enclosing_class: read_table_index(data, offset, info, TableId::TypeDef)?,
        })
    }

    fn table_id() -> TableId {
        TableId::NestedClass
    }
}

/// One `GenericParam` row.
pub struct GenericParamRaw {
    pub rid: u32,
    pub number: u16,
    pub flags: u16,
    pub owner: CodedIndex,
    pub name: u32,
}

impl RowReadable for GenericParamRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(GenericParamRaw {
            rid,
            number: read_le_at::<u16>(data, offset)?,
            flags: read_le_at::<u16>(data, offset)?,
            owner: CodedIndex::read(data, offset, info, CodedIndexType::TypeOrMethodDef)?,
            name: read_str_index(data, offset, info)?,
        })
    }

    fn table_id() -> TableId {
        TableId::GenericParam
    }
}

/// One `ManifestResource` row.
pub struct ManifestResourceRaw {
    pub rid: u32,
    pub data_offset: u32,
    pub flags: u32,
    pub name: u32,
    pub implementation: CodedIndex,
}

impl ManifestResourceRaw {
    /// True when the resource data lives in this image rather than behind a
    /// `File` or `AssemblyRef` implementation.
    #[must_use]
    pub fn is_embedded(&self) -> bool {
        self.implementation.row == 0
    }
}

impl RowReadable for ManifestResourceRaw {
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self> {
        Ok(ManifestResourceRaw {
            rid,
            data_offset: read_le_at::<u32>(data, offset)?,
            flags: read_le_at::<u32>(data, offset)?,
            name: read_str_index(data, offset, info)?,
            implementation: CodedIndex::read(data, offset, info, CodedIndexType::Implementation)?,
        })
    }

    fn table_id() -> TableId {
        TableId::ManifestResource
    }
}
