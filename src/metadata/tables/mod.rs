//! The `#~` tables stream: table identifiers, physical row sizing and the
//! generic row reader, ECMA-335 II.22 and II.24.2.6.

mod rows;
mod stream;

pub use rows::{
    CustomAttributeRaw, FieldAttributes, FieldRaw, GenericParamRaw, ManifestResourceRaw,
    MemberRefRaw, MethodAttributes, MethodDefRaw, MethodSemanticsAttributes, MethodSemanticsRaw,
    NestedClassRaw, PropertyMapRaw, PropertyRaw, TypeDefRaw, TypeRefRaw,
};
pub use stream::TablesStream;

use std::marker::PhantomData;

use strum::{Display, EnumCount, EnumIter, IntoEnumIterator};

use crate::{
    file::io::{read_le, read_le_at, read_le_at_dyn},
    Error::OutOfBounds,
    Result,
};

/// Identifier of a metadata table, the numbering following ECMA-335 II.22.
///
/// All 45 table kinds are listed, including the uncompressed-metadata pointer
/// tables and the edit-and-continue tables, so that every byte of the `#~`
/// stream can be attributed to a table.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Display, EnumIter, EnumCount)]
#[repr(u8)]
pub enum TableId {
    Module = 0x00,
    TypeRef = 0x01,
    TypeDef = 0x02,
    FieldPtr = 0x03,
    Field = 0x04,
    MethodPtr = 0x05,
    MethodDef = 0x06,
    ParamPtr = 0x07,
    Param = 0x08,
    InterfaceImpl = 0x09,
    MemberRef = 0x0A,
    Constant = 0x0B,
    CustomAttribute = 0x0C,
    FieldMarshal = 0x0D,
    DeclSecurity = 0x0E,
    ClassLayout = 0x0F,
    FieldLayout = 0x10,
    StandAloneSig = 0x11,
    EventMap = 0x12,
    EventPtr = 0x13,
    Event = 0x14,
    PropertyMap = 0x15,
    PropertyPtr = 0x16,
    Property = 0x17,
    MethodSemantics = 0x18,
    MethodImpl = 0x19,
    ModuleRef = 0x1A,
    TypeSpec = 0x1B,
    ImplMap = 0x1C,
    FieldRva = 0x1D,
    EncLog = 0x1E,
    EncMap = 0x1F,
    Assembly = 0x20,
    AssemblyProcessor = 0x21,
    #[strum(serialize = "AssemblyOS")]
    AssemblyOs = 0x22,
    AssemblyRef = 0x23,
    AssemblyRefProcessor = 0x24,
    #[strum(serialize = "AssemblyRefOS")]
    AssemblyRefOs = 0x25,
    File = 0x26,
    ExportedType = 0x27,
    ManifestResource = 0x28,
    NestedClass = 0x29,
    GenericParam = 0x2A,
    MethodSpec = 0x2B,
    GenericParamConstraint = 0x2C,
}

/// The coded index families used by the table columns this crate reads,
/// ECMA-335 II.24.2.6.
#[derive(Clone, Copy, PartialEq, Eq, Debug, EnumIter, EnumCount)]
pub enum CodedIndexType {
    TypeDefOrRef,
    HasConstant,
    HasCustomAttribute,
    HasFieldMarshal,
    HasDeclSecurity,
    MemberRefParent,
    HasSemantics,
    MethodDefOrRef,
    MemberForwarded,
    Implementation,
    CustomAttributeType,
    ResolutionScope,
    TypeOrMethodDef,
}

impl CodedIndexType {
    /// The tables a tag value of this family selects, in tag order.
    #[must_use]
    pub fn tables(&self) -> &'static [TableId] {
        match self {
            CodedIndexType::TypeDefOrRef => {
                &[TableId::TypeDef, TableId::TypeRef, TableId::TypeSpec]
            }
            CodedIndexType::HasConstant => &[TableId::Field, TableId::Param, TableId::Property],
            CodedIndexType::HasCustomAttribute => &[
                TableId::MethodDef,
                TableId::Field,
                TableId::TypeRef,
                TableId::TypeDef,
                TableId::Param,
                TableId::InterfaceImpl,
                TableId::MemberRef,
                TableId::Module,
                TableId::DeclSecurity,
                TableId::Property,
                TableId::Event,
                TableId::StandAloneSig,
                TableId::ModuleRef,
                TableId::TypeSpec,
                TableId::Assembly,
                TableId::AssemblyRef,
                TableId::File,
                TableId::ExportedType,
                TableId::ManifestResource,
                TableId::GenericParam,
                TableId::GenericParamConstraint,
                TableId::MethodSpec,
            ],
            CodedIndexType::HasFieldMarshal => &[TableId::Field, TableId::Param],
            CodedIndexType::HasDeclSecurity => {
                &[TableId::TypeDef, TableId::MethodDef, TableId::Assembly]
            }
            CodedIndexType::MemberRefParent => &[
                TableId::TypeDef,
                TableId::TypeRef,
                TableId::ModuleRef,
                TableId::MethodDef,
                TableId::TypeSpec,
            ],
            CodedIndexType::HasSemantics => &[TableId::Event, TableId::Property],
            CodedIndexType::MethodDefOrRef => &[TableId::MethodDef, TableId::MemberRef],
            CodedIndexType::MemberForwarded => &[TableId::Field, TableId::MethodDef],
            CodedIndexType::Implementation => {
                &[TableId::File, TableId::AssemblyRef, TableId::ExportedType]
            }
            // tags 0, 1 and 4 are unused per the standard; MethodDef padding
            // keeps the tag arithmetic uniform
            CodedIndexType::CustomAttributeType => &[
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MethodDef,
                TableId::MemberRef,
                TableId::MemberRef,
            ],
            CodedIndexType::ResolutionScope => &[
                TableId::Module,
                TableId::ModuleRef,
                TableId::AssemblyRef,
                TableId::TypeRef,
            ],
            CodedIndexType::TypeOrMethodDef => &[TableId::TypeDef, TableId::MethodDef],
        }
    }

    /// Number of tag bits occupied by this family.
    #[must_use]
    pub fn tag_bits(&self) -> u32 {
        (self.tables().len() as u32).next_power_of_two().trailing_zeros()
    }
}

/// A decoded coded index: the selected table plus a 1-based row index, zero
/// meaning null.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct CodedIndex {
    pub table: TableId,
    pub row: u32,
}

impl CodedIndex {
    /// Read and decode a coded index column, advancing `offset`.
    ///
    /// # Errors
    /// Returns an error if the data is exhausted or the tag selects an
    /// out-of-range table.
    pub fn read(
        data: &[u8],
        offset: &mut usize,
        info: &TableInfo,
        coded_index_type: CodedIndexType,
    ) -> Result<CodedIndex> {
        let value = read_le_at_dyn(data, offset, info.coded_index_bytes(coded_index_type) == 4)?;

        let tag_bits = coded_index_type.tag_bits();
        let tag = (value & ((1 << tag_bits) - 1)) as usize;

        let tables = coded_index_type.tables();
        if tag >= tables.len() {
            return Err(malformed_error!(
                "Coded index tag out of range - {} for {:?}",
                tag,
                coded_index_type
            ));
        }

        Ok(CodedIndex {
            table: tables[tag],
            row: value >> tag_bits,
        })
    }
}

/// Row count and index width of one table.
#[derive(Clone, Copy, Default, PartialEq, Debug)]
struct TableRowInfo {
    rows: u32,
    bits: u8,
}

impl TableRowInfo {
    fn new(rows: u32) -> Self {
        let bits = if rows == 0 {
            1
        } else {
            (32 - rows.leading_zeros()) as u8
        };

        TableRowInfo { rows, bits }
    }
}

/// Physical layout of the `#~` stream: per-table row counts, heap index
/// widths and the derived coded index widths, everything needed to size any
/// row without materializing it.
#[derive(Clone)]
pub struct TableInfo {
    rows: Vec<TableRowInfo>,
    coded_index_bits: Vec<u8>,
    large_str: bool,
    large_guid: bool,
    large_blob: bool,
    extra_data: bool,
}

impl TableInfo {
    /// Parse the `#~` stream header.
    ///
    /// # Errors
    /// Returns an error if the header or the row count array runs past the
    /// stream data.
    pub fn new(data: &[u8]) -> Result<TableInfo> {
        if data.len() < 24 {
            return Err(OutOfBounds);
        }

        let heap_flags = read_le::<u8>(&data[6..])?;
        let valid = read_le::<u64>(&data[8..])?;

        let mut rows = vec![TableRowInfo::default(); TableId::COUNT];
        let mut offset = 24;
        for table_id in TableId::iter() {
            if (valid & (1_u64 << table_id as usize)) == 0 {
                continue;
            }

            let row_count = read_le_at::<u32>(data, &mut offset)?;
            rows[table_id as usize] = TableRowInfo::new(row_count);
        }

        let mut info = TableInfo {
            rows,
            coded_index_bits: vec![0; CodedIndexType::COUNT],
            large_str: heap_flags & 0x01 != 0,
            large_guid: heap_flags & 0x02 != 0,
            large_blob: heap_flags & 0x04 != 0,
            extra_data: heap_flags & 0x40 != 0,
        };
        info.calculate_coded_index_bits();

        Ok(info)
    }

    #[cfg(test)]
    /// Build a layout directly from (table, row count) pairs.
    pub fn new_test(valid_tables: &[(TableId, u32)], large_str: bool, large_blob: bool) -> Self {
        let mut info = TableInfo {
            rows: vec![TableRowInfo::default(); TableId::COUNT],
            coded_index_bits: vec![0; CodedIndexType::COUNT],
            large_str,
            large_guid: false,
            large_blob,
            extra_data: false,
        };

        for (table_id, row_count) in valid_tables {
            info.rows[*table_id as usize] = TableRowInfo::new(*row_count);
        }

        info.calculate_coded_index_bits();
        info
    }

    fn calculate_coded_index_bits(&mut self) {
        for coded_index in CodedIndexType::iter() {
            let max_bits = coded_index
                .tables()
                .iter()
                .map(|table| self.rows[*table as usize].bits)
                .max()
                .unwrap_or(1);

            self.coded_index_bits[coded_index as usize] =
                max_bits + coded_index.tag_bits() as u8;
        }
    }

    /// Number of rows in a table, zero for absent tables.
    #[must_use]
    pub fn row_count(&self, table_id: TableId) -> u32 {
        self.rows[table_id as usize].rows
    }

    /// Width in bytes of an index into a table.
    #[must_use]
    pub fn table_index_bytes(&self, table_id: TableId) -> u32 {
        if self.rows[table_id as usize].bits > 16 {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a coded index of the given family.
    #[must_use]
    pub fn coded_index_bytes(&self, coded_index_type: CodedIndexType) -> u32 {
        if self.coded_index_bits[coded_index_type as usize] > 16 {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#Strings` index.
    #[must_use]
    pub fn str_bytes(&self) -> u32 {
        if self.large_str {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#GUID` index.
    #[must_use]
    pub fn guid_bytes(&self) -> u32 {
        if self.large_guid {
            4
        } else {
            2
        }
    }

    /// Width in bytes of a `#Blob` index.
    #[must_use]
    pub fn blob_bytes(&self) -> u32 {
        if self.large_blob {
            4
        } else {
            2
        }
    }

    /// True when `#Strings` indexes are 4 bytes wide.
    #[must_use]
    pub fn is_large_str(&self) -> bool {
        self.large_str
    }

    /// True when `#Blob` indexes are 4 bytes wide.
    #[must_use]
    pub fn is_large_blob(&self) -> bool {
        self.large_blob
    }

    /// Size of the `#~` header in bytes: the fixed part, one row count per
    /// present table, and the optional extra data word.
    #[must_use]
    pub fn header_size(&self) -> usize {
        let present = self.rows.iter().filter(|info| info.rows != 0).count();

        24 + present * 4 + if self.extra_data { 4 } else { 0 }
    }

    /// Physical size in bytes of one row of the given table.
    #[must_use]
    pub fn row_size(&self, table_id: TableId) -> u32 {
        let str = self.str_bytes();
        let guid = self.guid_bytes();
        let blob = self.blob_bytes();

        match table_id {
            TableId::Module => 2 + str + 3 * guid,
            TableId::TypeRef => {
                self.coded_index_bytes(CodedIndexType::ResolutionScope) + 2 * str
            }
            TableId::TypeDef => {
                4 + 2 * str
                    + self.coded_index_bytes(CodedIndexType::TypeDefOrRef)
                    + self.table_index_bytes(TableId::Field)
                    + self.table_index_bytes(TableId::MethodDef)
            }
            TableId::FieldPtr => self.table_index_bytes(TableId::Field),
            TableId::Field => 2 + str + blob,
            TableId::MethodPtr => self.table_index_bytes(TableId::MethodDef),
            TableId::MethodDef => 8 + str + blob + self.table_index_bytes(TableId::Param),
            TableId::ParamPtr => self.table_index_bytes(TableId::Param),
            TableId::Param => 4 + str,
            TableId::InterfaceImpl => {
                self.table_index_bytes(TableId::TypeDef)
                    + self.coded_index_bytes(CodedIndexType::TypeDefOrRef)
            }
            TableId::MemberRef => {
                self.coded_index_bytes(CodedIndexType::MemberRefParent) + str + blob
            }
            TableId::Constant => 2 + self.coded_index_bytes(CodedIndexType::HasConstant) + blob,
            TableId::CustomAttribute => {
                self.coded_index_bytes(CodedIndexType::HasCustomAttribute)
                    + self.coded_index_bytes(CodedIndexType::CustomAttributeType)
                    + blob
            }
            TableId::FieldMarshal => {
                self.coded_index_bytes(CodedIndexType::HasFieldMarshal) + blob
            }
            TableId::DeclSecurity => {
                2 + self.coded_index_bytes(CodedIndexType::HasDeclSecurity) + blob
            }
            TableId::ClassLayout => 6 + self.table_index_bytes(TableId::TypeDef),
            TableId::FieldLayout => 4 + self.table_index_bytes(TableId::Field),
            TableId::StandAloneSig => blob,
            TableId::EventMap => {
                self.table_index_bytes(TableId::TypeDef) + self.table_index_bytes(TableId::Event)
            }
            TableId::EventPtr => self.table_index_bytes(TableId::Event),
            TableId::Event => 2 + str + self.coded_index_bytes(CodedIndexType::TypeDefOrRef),
            TableId::PropertyMap => {
                self.table_index_bytes(TableId::TypeDef)
                    + self.table_index_bytes(TableId::Property)
            }
            TableId::PropertyPtr => self.table_index_bytes(TableId::Property),
            TableId::Property => 2 + str + blob,
            TableId::MethodSemantics => {
                2 + self.table_index_bytes(TableId::MethodDef)
                    + self.coded_index_bytes(CodedIndexType::HasSemantics)
            }
            TableId::MethodImpl => {
                self.table_index_bytes(TableId::TypeDef)
                    + 2 * self.coded_index_bytes(CodedIndexType::MethodDefOrRef)
            }
            TableId::ModuleRef => str,
            TableId::TypeSpec => blob,
            TableId::ImplMap => {
                2 + self.coded_index_bytes(CodedIndexType::MemberForwarded)
                    + str
                    + self.table_index_bytes(TableId::ModuleRef)
            }
            TableId::FieldRva => 4 + self.table_index_bytes(TableId::Field),
            TableId::EncLog => 8,
            TableId::EncMap => 4,
            TableId::Assembly => 16 + blob + 2 * str,
            TableId::AssemblyProcessor => 4,
            TableId::AssemblyOs => 12,
            TableId::AssemblyRef => 12 + 2 * blob + 2 * str,
            TableId::AssemblyRefProcessor => 4 + self.table_index_bytes(TableId::AssemblyRef),
            TableId::AssemblyRefOs => 12 + self.table_index_bytes(TableId::AssemblyRef),
            TableId::File => 4 + str + blob,
            TableId::ExportedType => {
                8 + 2 * str + self.coded_index_bytes(CodedIndexType::Implementation)
            }
            TableId::ManifestResource => {
                8 + str + self.coded_index_bytes(CodedIndexType::Implementation)
            }
            TableId::NestedClass => 2 * self.table_index_bytes(TableId::TypeDef),
            TableId::GenericParam => {
                4 + self.coded_index_bytes(CodedIndexType::TypeOrMethodDef) + str
            }
            TableId::MethodSpec => self.coded_index_bytes(CodedIndexType::MethodDefOrRef) + blob,
            TableId::GenericParamConstraint => {
                self.table_index_bytes(TableId::GenericParam)
                    + self.coded_index_bytes(CodedIndexType::TypeDefOrRef)
            }
        }
    }

    /// Physical size in bytes of an entire table.
    #[must_use]
    pub fn table_size(&self, table_id: TableId) -> u64 {
        u64::from(self.row_size(table_id)) * u64::from(self.row_count(table_id))
    }
}

/// A parsed table row.
pub trait RowReadable: Sized {
    /// Parse one row starting at `offset`, advancing it past the row.
    ///
    /// # Errors
    /// Returns an error if the row runs past the table data.
    fn read_row(data: &[u8], offset: &mut usize, rid: u32, info: &TableInfo) -> Result<Self>;

    /// The table this row type belongs to.
    fn table_id() -> TableId;
}

/// Typed view over the raw bytes of one table, rows parsed on access.
pub struct MetadataTable<'a, T> {
    data: &'a [u8],
    row_count: u32,
    row_size: u32,
    info: &'a TableInfo,
    _marker: PhantomData<T>,
}

impl<'a, T: RowReadable> MetadataTable<'a, T> {
    pub(crate) fn new(data: &'a [u8], info: &'a TableInfo) -> MetadataTable<'a, T> {
        MetadataTable {
            data,
            row_count: info.row_count(T::table_id()),
            row_size: info.row_size(T::table_id()),
            info,
            _marker: PhantomData,
        }
    }

    /// Number of rows.
    #[must_use]
    pub fn row_count(&self) -> u32 {
        self.row_count
    }

    /// Parse the row with the given 1-based index.
    ///
    /// # Errors
    /// Returns an error if the index is zero, past the table, or the row data
    /// is truncated.
    pub fn get(&self, rid: u32) -> Result<T> {
        if rid == 0 || rid > self.row_count {
            return Err(malformed_error!(
                "Row index out of range - {} of {} in {}",
                rid,
                self.row_count,
                T::table_id()
            ));
        }

        let mut offset = (rid as usize - 1) * self.row_size as usize;
        T::read_row(self.data, &mut offset, rid, self.info)
    }

    /// Iterate all rows in physical order.
    pub fn iter(&self) -> impl Iterator<Item = Result<T>> + '_ {
        (1..=self.row_count).map(|rid| self.get(rid))
    }
}
