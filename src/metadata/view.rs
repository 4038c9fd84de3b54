//! A resolved view over one assembly's metadata: heaps, tables and the
//! derived lookup maps the differ walks.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::{
    container::AssemblyImage,
    file::{io::read_le, File},
    metadata::{
        body,
        cor20::Cor20Header,
        root::{self, Root},
        streams::{Blob, Strings},
        tables::{
            CustomAttributeRaw, MethodDefRaw, MethodSemanticsAttributes, TableId, TablesStream,
        },
    },
    Error::OutOfBounds,
    Result,
};

/// Who owns a custom attribute constructor.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum AttributeOwner {
    /// A `MethodDef` constructor, attribute type defined in this image.
    Method(u32),
    /// A `MemberRef` constructor, attribute type defined elsewhere.
    Member(u32),
    /// A null or unexpected constructor reference.
    Unsupported,
}

/// Parsed metadata of one assembly image with the cross-table maps resolved
/// up front: nesting, generic parameter names, property accessors and
/// custom attribute ownership.
pub struct MetadataView<'a> {
    file: &'a File,
    meta: &'a [u8],
    cor20: Cor20Header,
    tables: TablesStream<'a>,
    strings: Strings<'a>,
    blob: Blob<'a>,
    resource_offset: Option<usize>,
    nested_parent: HashMap<u32, u32>,
    nested_children: HashMap<u32, Vec<u32>>,
    field_ranges: Vec<(u32, u32)>,
    method_ranges: Vec<(u32, u32)>,
    property_ranges: HashMap<u32, (u32, u32)>,
    property_semantics: HashMap<u32, MethodSemanticsAttributes>,
    type_generic_params: HashMap<u32, Vec<&'a str>>,
    method_generic_params: HashMap<u32, Vec<&'a str>>,
    type_attributes: HashMap<u32, Vec<u32>>,
    method_owner: HashMap<u32, u32>,
}

impl<'a> MetadataView<'a> {
    /// Parse the metadata of a loaded image and build the lookup maps.
    ///
    /// # Errors
    /// Returns an error if the CLR header, metadata root, required streams
    /// or any referenced row is malformed.
    pub fn new(image: &'a AssemblyImage) -> Result<MetadataView<'a>> {
        let file = image.file();

        let (clr_rva, _) = file.clr();
        let clr_offset = file.rva_to_offset(clr_rva)?;
        let cor20 = Cor20Header::read(file.data_slice(clr_offset, 72)?)?;

        let meta_offset = file.rva_to_offset(cor20.meta_data_rva as usize)?;
        let meta = file.data_slice(meta_offset, cor20.meta_data_size as usize)?;
        let root = Root::read(meta)?;

        let tables = TablesStream::new(Self::stream_data(&root, meta, "#~")?)?;
        let strings = Strings::from(Self::stream_data(&root, meta, "#Strings")?)?;
        let blob = Blob::from(Self::stream_data(&root, meta, "#Blob")?)?;

        let resource_offset = if cor20.resource_rva == 0 {
            None
        } else {
            file.rva_to_offset(cor20.resource_rva as usize).ok()
        };

        let mut view = MetadataView {
            file,
            meta,
            cor20,
            tables,
            strings,
            blob,
            resource_offset,
            nested_parent: HashMap::new(),
            nested_children: HashMap::new(),
            field_ranges: Vec::new(),
            method_ranges: Vec::new(),
            property_ranges: HashMap::new(),
            property_semantics: HashMap::new(),
            type_generic_params: HashMap::new(),
            method_generic_params: HashMap::new(),
            type_attributes: HashMap::new(),
            method_owner: HashMap::new(),
        };
        view.build_maps()?;

        Ok(view)
    }

    fn stream_data(root: &Root, meta: &'a [u8], name: &str) -> Result<&'a [u8]> {
        let header = root
            .stream(name)
            .ok_or_else(|| malformed_error!("Image has no {} stream", name))?;

        Ok(&meta[header.offset as usize..(header.offset + header.size) as usize])
    }

    fn build_maps(&mut self) -> Result<()> {
        for row in self.tables.nested_classes().iter() {
            let row = row?;
            self.nested_parent
                .insert(row.nested_class, row.enclosing_class);
            self.nested_children
                .entry(row.enclosing_class)
                .or_default()
                .push(row.nested_class);
        }

        let type_defs = self.tables.type_defs();
        let type_count = type_defs.row_count();
        let field_count = self.tables.info().row_count(TableId::Field);
        let method_count = self.tables.info().row_count(TableId::MethodDef);

        for rid in 1..=type_count {
            let row = type_defs.get(rid)?;
            let (field_end, method_end) = if rid < type_count {
                let next = type_defs.get(rid + 1)?;
                (next.field_list, next.method_list)
            } else {
                (field_count + 1, method_count + 1)
            };

            self.field_ranges.push((row.field_list, field_end));
            self.method_ranges.push((row.method_list, method_end));

            for method_rid in row.method_list..method_end {
                self.method_owner.insert(method_rid, rid);
            }
        }

        let property_maps = self.tables.property_maps();
        let property_count = self.tables.info().row_count(TableId::Property);
        for rid in 1..=property_maps.row_count() {
            let row = property_maps.get(rid)?;
            let end = if rid < property_maps.row_count() {
                property_maps.get(rid + 1)?.property_list
            } else {
                property_count + 1
            };

            self.property_ranges
                .insert(row.parent, (row.property_list, end));
        }

        for row in self.tables.method_semantics().iter() {
            let row = row?;
            if row.association.table == TableId::Property {
                *self
                    .property_semantics
                    .entry(row.association.row)
                    .or_insert(MethodSemanticsAttributes::empty()) |= row.attributes();
            }
        }

        let mut type_params: HashMap<u32, Vec<(u16, &str)>> = HashMap::new();
        let mut method_params: HashMap<u32, Vec<(u16, &str)>> = HashMap::new();
        for row in self.tables.generic_params().iter() {
            let row = row?;
            let name = self.strings.get(row.name as usize)?;
            match row.owner.table {
                TableId::TypeDef => {
                    type_params
                        .entry(row.owner.row)
                        .or_default()
                        .push((row.number, name));
                }
                TableId::MethodDef => {
                    method_params
                        .entry(row.owner.row)
                        .or_default()
                        .push((row.number, name));
                }
                _ => {}
            }
        }
        self.type_generic_params = Self::order_params(type_params);
        self.method_generic_params = Self::order_params(method_params);

        for rid in 1..=self.tables.custom_attributes().row_count() {
            let row = self.tables.custom_attributes().get(rid)?;
            if row.parent.table == TableId::TypeDef {
                self.type_attributes
                    .entry(row.parent.row)
                    .or_default()
                    .push(rid);
            }
        }

        Ok(())
    }

    fn order_params(raw: HashMap<u32, Vec<(u16, &str)>>) -> HashMap<u32, Vec<&str>> {
        raw.into_iter()
            .map(|(owner, mut params)| {
                params.sort_by_key(|(number, _)| *number);
                (owner, params.into_iter().map(|(_, name)| name).collect())
            })
            .collect()
    }

    /// The parsed `#~` stream.
    #[must_use]
    pub fn tables(&self) -> &TablesStream<'a> {
        &self.tables
    }

    /// The raw metadata byte range.
    #[must_use]
    pub fn metadata(&self) -> &'a [u8] {
        self.meta
    }

    /// Declared metadata size from the CLR header.
    #[must_use]
    pub fn metadata_size(&self) -> u32 {
        self.cor20.meta_data_size
    }

    /// A `#Strings` heap entry.
    ///
    /// # Errors
    /// Returns an error if the index is invalid.
    pub fn string(&self, index: u32) -> Result<&'a str> {
        self.strings.get(index as usize)
    }

    /// A `#Blob` heap entry.
    ///
    /// # Errors
    /// Returns an error if the index is invalid.
    pub fn blob(&self, index: u32) -> Result<&'a [u8]> {
        self.blob.get(index as usize)
    }

    /// Number of `TypeDef` rows.
    #[must_use]
    pub fn type_count(&self) -> u32 {
        self.tables.type_defs().row_count()
    }

    /// True when the type is listed in `NestedClass`.
    #[must_use]
    pub fn is_nested(&self, type_rid: u32) -> bool {
        self.nested_parent.contains_key(&type_rid)
    }

    /// Rids of the types nested directly in `type_rid`.
    #[must_use]
    pub fn nested_types(&self, type_rid: u32) -> &[u32] {
        self.nested_children
            .get(&type_rid)
            .map_or(&[], Vec::as_slice)
    }

    /// Display key of a type: `Namespace.Name`, plus the name of the first
    /// generic parameter in angle brackets when the type is generic.
    ///
    /// # Errors
    /// Returns an error if the row or its heap entries are invalid.
    pub fn type_key(&self, type_rid: u32) -> Result<String> {
        let mut key = self.type_full_name(type_rid)?;

        if let Some(first) = self
            .type_generic_params
            .get(&type_rid)
            .and_then(|params| params.first())
        {
            key.push('<');
            key.push_str(first);
            key.push('>');
        }

        Ok(key)
    }

    /// `Namespace.Name` of a `TypeDef` row, without any generic suffix.
    ///
    /// # Errors
    /// Returns an error if the row or its heap entries are invalid.
    pub fn type_full_name(&self, type_rid: u32) -> Result<String> {
        let row = self.tables.type_defs().get(type_rid)?;
        let name = self.string(row.type_name)?;
        let namespace = self.string(row.type_namespace)?;

        Ok(if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        })
    }

    /// Path of a `TypeDef` for signature rendering: enclosing types joined
    /// with `/`, innermost last.
    ///
    /// # Errors
    /// Returns an error if any row on the nesting chain is invalid.
    pub fn type_def_path(&self, type_rid: u32) -> Result<String> {
        let name = self.type_full_name(type_rid)?;

        match self.nested_parent.get(&type_rid) {
            Some(parent) => Ok(format!("{}/{}", self.type_def_path(*parent)?, name)),
            None => Ok(name),
        }
    }

    /// `Namespace.Name` of a `TypeRef` row.
    ///
    /// # Errors
    /// Returns an error if the row or its heap entries are invalid.
    pub fn type_ref_name(&self, type_ref_rid: u32) -> Result<String> {
        let row = self.tables.type_refs().get(type_ref_rid)?;
        let name = self.string(row.type_name)?;
        let namespace = self.string(row.type_namespace)?;

        Ok(if namespace.is_empty() {
            name.to_string()
        } else {
            format!("{namespace}.{name}")
        })
    }

    /// Field rids owned by a type.
    #[must_use]
    pub fn field_range(&self, type_rid: u32) -> std::ops::Range<u32> {
        let (start, end) = self.field_ranges[type_rid as usize - 1];
        start..end
    }

    /// Method rids owned by a type.
    #[must_use]
    pub fn method_range(&self, type_rid: u32) -> std::ops::Range<u32> {
        let (start, end) = self.method_ranges[type_rid as usize - 1];
        start..end
    }

    /// Property rids owned by a type, empty when the type has no
    /// `PropertyMap` row.
    #[must_use]
    pub fn property_range(&self, type_rid: u32) -> std::ops::Range<u32> {
        match self.property_ranges.get(&type_rid) {
            Some((start, end)) => *start..*end,
            None => 0..0,
        }
    }

    /// Accessor kinds attached to a property via `MethodSemantics`.
    #[must_use]
    pub fn property_accessors(&self, property_rid: u32) -> MethodSemanticsAttributes {
        self.property_semantics
            .get(&property_rid)
            .copied()
            .unwrap_or(MethodSemanticsAttributes::empty())
    }

    /// Generic parameter names of a type, in declaration order.
    #[must_use]
    pub fn type_generic_params(&self, type_rid: u32) -> &[&'a str] {
        self.type_generic_params
            .get(&type_rid)
            .map_or(&[], Vec::as_slice)
    }

    /// Generic parameter names of a method, in declaration order.
    #[must_use]
    pub fn method_generic_params(&self, method_rid: u32) -> &[&'a str] {
        self.method_generic_params
            .get(&method_rid)
            .map_or(&[], Vec::as_slice)
    }

    /// `CustomAttribute` rids attached to a type.
    #[must_use]
    pub fn type_attributes(&self, type_rid: u32) -> &[u32] {
        self.type_attributes
            .get(&type_rid)
            .map_or(&[], Vec::as_slice)
    }

    /// Classify the constructor reference of a custom attribute.
    #[must_use]
    pub fn attribute_owner(&self, attribute: &CustomAttributeRaw) -> AttributeOwner {
        if attribute.constructor.row == 0 {
            return AttributeOwner::Unsupported;
        }

        match attribute.constructor.table {
            TableId::MethodDef => AttributeOwner::Method(attribute.constructor.row),
            TableId::MemberRef => AttributeOwner::Member(attribute.constructor.row),
            _ => AttributeOwner::Unsupported,
        }
    }

    /// Name of the attribute type a custom attribute instantiates, `None`
    /// when the constructor reference cannot be resolved to a type name.
    ///
    /// # Errors
    /// Returns an error if a referenced row or heap entry is invalid.
    pub fn attribute_type_name(&self, attribute: &CustomAttributeRaw) -> Result<Option<String>> {
        match self.attribute_owner(attribute) {
            AttributeOwner::Method(method_rid) => {
                let owner = self.method_owner.get(&method_rid).ok_or_else(|| {
                    malformed_error!("Constructor method {} has no declaring type", method_rid)
                })?;

                Ok(Some(self.type_key(*owner)?))
            }
            AttributeOwner::Member(member_rid) => {
                let member = self.tables.member_refs().get(member_rid)?;
                match member.class.table {
                    TableId::TypeDef => Ok(Some(self.type_key(member.class.row)?)),
                    TableId::TypeRef => Ok(Some(self.type_ref_name(member.class.row)?)),
                    _ => Ok(None),
                }
            }
            AttributeOwner::Unsupported => Ok(None),
        }
    }

    /// Total size of a method body, zero for bodiless methods.
    ///
    /// # Errors
    /// Returns an error if the RVA does not resolve or the body header is
    /// malformed.
    pub fn method_body_size(&self, method: &MethodDefRaw) -> Result<u64> {
        if method.rva == 0 {
            return Ok(0);
        }

        let offset = self.file.rva_to_offset(method.rva as usize)?;
        let data = self.file.data();
        if offset >= data.len() {
            return Err(OutOfBounds);
        }

        body::method_body_size(&data[offset..])
    }

    /// Sizes of the embedded manifest resources, keyed by resource name.
    /// Resources stored behind a `File` or `AssemblyRef` are skipped; an
    /// image without a resource directory yields an empty map.
    ///
    /// # Errors
    /// Returns an error if a resource row or its size prefix is invalid.
    pub fn resources(&self) -> Result<IndexMap<String, i32>> {
        let mut resources = IndexMap::new();

        let Some(start) = self.resource_offset else {
            return Ok(resources);
        };

        for row in self.tables.manifest_resources().iter() {
            let row = row?;
            if !row.is_embedded() {
                continue;
            }

            let name = self.string(row.name)?;
            let prefix = self.file.data_slice(start + row.data_offset as usize, 4)?;
            resources.insert(name.to_string(), read_le::<i32>(prefix)?);
        }

        Ok(resources)
    }

    /// Declared sizes of all metadata streams, via the lenient directory
    /// walk.
    #[must_use]
    pub fn stream_sizes(&self) -> IndexMap<String, u32> {
        root::stream_sizes(self.meta)
    }
}
