//! The parsed `#~` stream: header plus the physical position of every table.

use strum::IntoEnumIterator;

use crate::{
    metadata::tables::{
        CustomAttributeRaw, FieldRaw, GenericParamRaw, ManifestResourceRaw, MemberRefRaw,
        MetadataTable, MethodDefRaw, MethodSemanticsRaw, NestedClassRaw, PropertyMapRaw,
        PropertyRaw, RowReadable, TableId, TableInfo, TypeDefRaw, TypeRefRaw,
    },
    Error::OutOfBounds,
    Result,
};

/// The `#~` stream with per-table start offsets precomputed, giving typed
/// access to any table without copying row data.
pub struct TablesStream<'a> {
    data: &'a [u8],
    info: TableInfo,
    offsets: Vec<usize>,
}

impl<'a> TablesStream<'a> {
    /// Parse the stream header and lay out the tables.
    ///
    /// # Errors
    /// Returns an error if the header is malformed or the declared rows run
    /// past the stream data.
    pub fn new(data: &'a [u8]) -> Result<TablesStream<'a>> {
        let info = TableInfo::new(data)?;

        let mut offsets = vec![0_usize; TableId::iter().count()];
        let mut offset = info.header_size();
        for table_id in TableId::iter() {
            offsets[table_id as usize] = offset;

            let size = usize::try_from(info.table_size(table_id))
                .map_err(|_| malformed_error!("Table size too large - {}", table_id))?;
            offset = offset.checked_add(size).ok_or(OutOfBounds)?;
        }

        if offset > data.len() {
            return Err(malformed_error!(
                "Tables run past the end of the #~ stream - {} > {}",
                offset,
                data.len()
            ));
        }

        Ok(TablesStream {
            data,
            info,
            offsets,
        })
    }

    /// The physical layout of the stream.
    #[must_use]
    pub fn info(&self) -> &TableInfo {
        &self.info
    }

    /// A typed view over one table.
    #[must_use]
    pub fn table<T: RowReadable>(&self) -> MetadataTable<'_, T> {
        let start = self.offsets[T::table_id() as usize];
        let size = self.info.table_size(T::table_id()) as usize;

        MetadataTable::new(&self.data[start..start + size], &self.info)
    }

    #[must_use]
    pub fn type_defs(&self) -> MetadataTable<'_, TypeDefRaw> {
        self.table()
    }

    #[must_use]
    pub fn type_refs(&self) -> MetadataTable<'_, TypeRefRaw> {
        self.table()
    }

    #[must_use]
    pub fn fields(&self) -> MetadataTable<'_, FieldRaw> {
        self.table()
    }

    #[must_use]
    pub fn methods(&self) -> MetadataTable<'_, MethodDefRaw> {
        self.table()
    }

    #[must_use]
    pub fn properties(&self) -> MetadataTable<'_, PropertyRaw> {
        self.table()
    }

    #[must_use]
    pub fn property_maps(&self) -> MetadataTable<'_, PropertyMapRaw> {
        self.table()
    }

    #[must_use]
    pub fn method_semantics(&self) -> MetadataTable<'_, MethodSemanticsRaw> {
        self.table()
    }

    #[must_use]
    pub fn member_refs(&self) -> MetadataTable<'_, MemberRefRaw> {
        self.table()
    }

    #[must_use]
    pub fn custom_attributes(&self) -> MetadataTable<'_, CustomAttributeRaw> {
        self.table()
    }

    #[must_use]
    pub fn nested_classes(&self) -> MetadataTable<'_, NestedClassRaw> {
        self.table()
    }

    #[must_use]
    pub fn generic_params(&self) -> MetadataTable<'_, GenericParamRaw> {
        self.table()
    }

    #[must_use]
    pub fn manifest_resources(&self) -> MetadataTable<'_, ManifestResourceRaw> {
        self.table()
    }
}
