//! Shared test support: a builder that emits minimal but well-formed PE32
//! images with CLI metadata, so tests can compare real bytes instead of
//! mocking the loader.

use std::path::PathBuf;

use indexmap::IndexMap;

/// A `Field` signature for `int`.
pub const SIG_FIELD_I4: &[u8] = &[0x06, 0x08];
/// A `Field` signature for `string`.
pub const SIG_FIELD_STRING: &[u8] = &[0x06, 0x0E];
/// A static method signature `void ()`.
pub const SIG_METHOD_VOID: &[u8] = &[0x00, 0x00, 0x01];
/// An instance method signature `int (string)`.
pub const SIG_METHOD_I4_STRING: &[u8] = &[0x20, 0x01, 0x08, 0x0E];
/// A `Property` signature for `int`.
pub const SIG_PROPERTY_I4: &[u8] = &[0x28, 0x00, 0x08];

/// Public field flags.
pub const FIELD_PUBLIC: u16 = 0x0006;
/// Public static method flags.
pub const METHOD_PUBLIC_STATIC: u16 = 0x0016;

struct FieldEntry {
    name: String,
    flags: u16,
    signature: Vec<u8>,
}

struct MethodEntry {
    name: String,
    flags: u16,
    signature: Vec<u8>,
    body_size: u32,
}

struct PropertyEntry {
    name: String,
    signature: Vec<u8>,
    getter: bool,
    setter: bool,
}

struct TypeEntry {
    namespace: String,
    name: String,
    nested_in: Option<usize>,
    fields: Vec<FieldEntry>,
    methods: Vec<MethodEntry>,
    properties: Vec<PropertyEntry>,
    generic_params: Vec<String>,
    attributes: Vec<(String, String)>,
}

impl TypeEntry {
    fn new(namespace: &str, name: &str, nested_in: Option<usize>) -> TypeEntry {
        TypeEntry {
            namespace: namespace.to_string(),
            name: name.to_string(),
            nested_in,
            fields: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            generic_params: Vec::new(),
            attributes: Vec::new(),
        }
    }
}

/// Builds a single-section PE32 image with a CLR header, `#~`, `#Strings`
/// and `#Blob` streams, tiny or fat method bodies, and embedded resource
/// size prefixes.
pub struct AssemblyBuilder {
    types: Vec<TypeEntry>,
    resources: Vec<(String, i32)>,
}

impl AssemblyBuilder {
    pub fn new() -> AssemblyBuilder {
        AssemblyBuilder {
            types: vec![TypeEntry::new("", "<Module>", None)],
            resources: Vec::new(),
        }
    }

    /// Add a top-level type; members added next attach to it.
    pub fn ty(mut self, namespace: &str, name: &str) -> AssemblyBuilder {
        self.types.push(TypeEntry::new(namespace, name, None));
        self
    }

    /// Add a type nested in the most recently added type.
    pub fn nested(mut self, name: &str) -> AssemblyBuilder {
        let owner = self.types.len() - 1;
        self.types.push(TypeEntry::new("", name, Some(owner)));
        self
    }

    pub fn field(mut self, name: &str, flags: u16, signature: &[u8]) -> AssemblyBuilder {
        self.current().fields.push(FieldEntry {
            name: name.to_string(),
            flags,
            signature: signature.to_vec(),
        });
        self
    }

    pub fn method(
        mut self,
        name: &str,
        flags: u16,
        signature: &[u8],
        body_size: u32,
    ) -> AssemblyBuilder {
        self.current().methods.push(MethodEntry {
            name: name.to_string(),
            flags,
            signature: signature.to_vec(),
            body_size,
        });
        self
    }

    pub fn property(
        mut self,
        name: &str,
        signature: &[u8],
        getter: bool,
        setter: bool,
    ) -> AssemblyBuilder {
        self.current().properties.push(PropertyEntry {
            name: name.to_string(),
            signature: signature.to_vec(),
            getter,
            setter,
        });
        self
    }

    pub fn generic_param(mut self, name: &str) -> AssemblyBuilder {
        self.current().generic_params.push(name.to_string());
        self
    }

    /// Attach a custom attribute to the current type. The constructor is a
    /// `MemberRef` whose parent is a `TypeRef` with the given name.
    pub fn attribute(mut self, namespace: &str, name: &str) -> AssemblyBuilder {
        self.current()
            .attributes
            .push((namespace.to_string(), name.to_string()));
        self
    }

    /// Declare an embedded resource with the given size prefix.
    pub fn resource(mut self, name: &str, size: i32) -> AssemblyBuilder {
        self.resources.push((name.to_string(), size));
        self
    }

    fn current(&mut self) -> &mut TypeEntry {
        self.types.last_mut().unwrap()
    }

    pub fn build(self) -> Vec<u8> {
        const VA_SECTION: u32 = 0x1000;
        const FILE_SECTION: u32 = 0x200;

        let mut strings = StringHeap::new();
        let mut blob = BlobHeap::new();

        // type refs and member refs backing custom attribute constructors
        let mut type_refs: IndexMap<(String, String), u32> = IndexMap::new();
        for ty in &self.types {
            for attr in &ty.attributes {
                let next = type_refs.len() as u32 + 1;
                type_refs.entry(attr.clone()).or_insert(next);
            }
        }

        // body placement: resources first, then bodies, then metadata
        let va_resources = VA_SECTION + 72;
        let resource_bytes: Vec<u8> = self
            .resources
            .iter()
            .flat_map(|(_, size)| size.to_le_bytes())
            .collect();

        let va_bodies = va_resources + resource_bytes.len() as u32;
        let mut body_bytes = Vec::new();
        let mut body_rvas = Vec::new();
        for ty in &self.types {
            for method in &ty.methods {
                if method.body_size == 0 {
                    body_rvas.push(0);
                    continue;
                }

                body_rvas.push(va_bodies + body_bytes.len() as u32);
                emit_body(&mut body_bytes, method.body_size);
            }
        }

        let va_metadata = align4(va_bodies + body_bytes.len() as u32);

        // row serialization, all heaps small and all indexes 2 bytes
        let mut module_rows = Vec::new();
        push_u16(&mut module_rows, 0);
        push_u16(&mut module_rows, strings.intern("test.dll") as u16);
        push_u16(&mut module_rows, 0);
        push_u16(&mut module_rows, 0);
        push_u16(&mut module_rows, 0);

        let mut type_ref_rows = Vec::new();
        for (namespace, name) in type_refs.keys() {
            // resolution scope: Module row 1
            push_u16(&mut type_ref_rows, 1 << 2);
            push_u16(&mut type_ref_rows, strings.intern(name) as u16);
            push_u16(&mut type_ref_rows, strings.intern(namespace) as u16);
        }

        let mut member_ref_rows = Vec::new();
        for type_ref_rid in type_refs.values() {
            // parent: TypeRef (tag 1 of MemberRefParent)
            push_u16(&mut member_ref_rows, ((type_ref_rid << 3) | 1) as u16);
            push_u16(&mut member_ref_rows, strings.intern(".ctor") as u16);
            push_u16(&mut member_ref_rows, blob.add(&[0x20, 0x00, 0x01]) as u16);
        }

        let mut type_def_rows = Vec::new();
        let mut field_rows = Vec::new();
        let mut method_rows = Vec::new();
        let mut property_rows = Vec::new();
        let mut property_map_rows = Vec::new();
        let mut semantics_rows = Vec::new();
        let mut nested_rows = Vec::new();
        let mut generic_rows = Vec::new();
        let mut attribute_rows = Vec::new();

        let mut next_field = 1_u32;
        let mut next_method = 1_u32;
        let mut next_property = 1_u32;
        let mut method_index = 0_usize;

        for (type_index, ty) in self.types.iter().enumerate() {
            let type_rid = type_index as u32 + 1;

            push_u32(&mut type_def_rows, 0);
            push_u16(&mut type_def_rows, strings.intern(&ty.name) as u16);
            push_u16(&mut type_def_rows, strings.intern(&ty.namespace) as u16);
            push_u16(&mut type_def_rows, 0); // extends: null
            push_u16(&mut type_def_rows, next_field as u16);
            push_u16(&mut type_def_rows, next_method as u16);

            for field in &ty.fields {
                push_u16(&mut field_rows, field.flags);
                push_u16(&mut field_rows, strings.intern(&field.name) as u16);
                push_u16(&mut field_rows, blob.add(&field.signature) as u16);
                next_field += 1;
            }

            for method in &ty.methods {
                push_u32(&mut method_rows, body_rvas[method_index]);
                push_u16(&mut method_rows, 0);
                push_u16(&mut method_rows, method.flags);
                push_u16(&mut method_rows, strings.intern(&method.name) as u16);
                push_u16(&mut method_rows, blob.add(&method.signature) as u16);
                push_u16(&mut method_rows, 1); // no params emitted
                next_method += 1;
                method_index += 1;
            }

            if !ty.properties.is_empty() {
                push_u16(&mut property_map_rows, type_rid as u16);
                push_u16(&mut property_map_rows, next_property as u16);

                for property in &ty.properties {
                    push_u16(&mut property_rows, 0);
                    push_u16(&mut property_rows, strings.intern(&property.name) as u16);
                    push_u16(&mut property_rows, blob.add(&property.signature) as u16);

                    // association: Property (tag 1 of HasSemantics)
                    let association = ((next_property << 1) | 1) as u16;
                    if property.getter {
                        push_u16(&mut semantics_rows, 0x0002);
                        push_u16(&mut semantics_rows, 0);
                        push_u16(&mut semantics_rows, association);
                    }
                    if property.setter {
                        push_u16(&mut semantics_rows, 0x0001);
                        push_u16(&mut semantics_rows, 0);
                        push_u16(&mut semantics_rows, association);
                    }

                    next_property += 1;
                }
            }

            if let Some(owner) = ty.nested_in {
                push_u16(&mut nested_rows, type_rid as u16);
                push_u16(&mut nested_rows, owner as u16 + 1);
            }

            for (number, name) in ty.generic_params.iter().enumerate() {
                push_u16(&mut generic_rows, number as u16);
                push_u16(&mut generic_rows, 0);
                // owner: TypeDef (tag 0 of TypeOrMethodDef)
                push_u16(&mut generic_rows, (type_rid << 1) as u16);
                push_u16(&mut generic_rows, strings.intern(name) as u16);
            }

            for attr in &ty.attributes {
                let member_ref_rid = type_refs[attr];
                // parent: TypeDef (tag 3 of HasCustomAttribute)
                push_u16(&mut attribute_rows, ((type_rid << 5) | 3) as u16);
                // constructor: MemberRef (tag 3 of CustomAttributeType)
                push_u16(&mut attribute_rows, ((member_ref_rid << 3) | 3) as u16);
                push_u16(&mut attribute_rows, 0);
            }
        }

        let mut resource_rows = Vec::new();
        for (index, (name, _)) in self.resources.iter().enumerate() {
            push_u32(&mut resource_rows, index as u32 * 4);
            push_u32(&mut resource_rows, 1); // public
            push_u16(&mut resource_rows, strings.intern(name) as u16);
            push_u16(&mut resource_rows, 0); // implementation: null
        }

        let semantics_count = semantics_rows.len() as u32 / 6;
        let tables: &[(usize, u32, &Vec<u8>)] = &[
            (0x00, 1, &module_rows),
            (0x01, type_refs.len() as u32, &type_ref_rows),
            (0x02, self.types.len() as u32, &type_def_rows),
            (0x04, next_field - 1, &field_rows),
            (0x06, next_method - 1, &method_rows),
            (0x0A, type_refs.len() as u32, &member_ref_rows),
            (0x0C, attribute_rows.len() as u32 / 6, &attribute_rows),
            (0x15, property_map_rows.len() as u32 / 4, &property_map_rows),
            (0x17, next_property - 1, &property_rows),
            (0x18, semantics_count, &semantics_rows),
            (0x28, self.resources.len() as u32, &resource_rows),
            (0x29, nested_rows.len() as u32 / 4, &nested_rows),
            (0x2A, generic_rows.len() as u32 / 8, &generic_rows),
        ];

        let mut valid = 0_u64;
        let mut tables_stream = Vec::new();
        for (id, row_count, _) in tables {
            if *row_count != 0 {
                valid |= 1_u64 << id;
            }
        }

        // #~ header
        push_u32(&mut tables_stream, 0);
        tables_stream.push(2);
        tables_stream.push(0);
        tables_stream.push(0); // small heaps
        tables_stream.push(1);
        tables_stream.extend_from_slice(&valid.to_le_bytes());
        tables_stream.extend_from_slice(&valid.to_le_bytes()); // sorted
        for (_, row_count, _) in tables {
            if *row_count != 0 {
                push_u32(&mut tables_stream, *row_count);
            }
        }
        for (_, row_count, rows) in tables {
            if *row_count != 0 {
                tables_stream.extend_from_slice(rows);
            }
        }
        pad4(&mut tables_stream);

        let mut strings_stream = strings.data;
        pad4(&mut strings_stream);
        let mut blob_stream = blob.data;
        pad4(&mut blob_stream);

        // metadata root with three stream headers
        let version = b"v4.0.30319\0\0";
        let header_size = 16 + version.len() + 4 + (8 + 4) + (8 + 12) + (8 + 8);
        let mut metadata = Vec::new();
        push_u32(&mut metadata, 0x424A_5342);
        push_u16(&mut metadata, 1);
        push_u16(&mut metadata, 1);
        push_u32(&mut metadata, 0);
        push_u32(&mut metadata, version.len() as u32);
        metadata.extend_from_slice(version);
        push_u16(&mut metadata, 0);
        push_u16(&mut metadata, 3);

        let tables_offset = header_size as u32;
        let strings_offset = tables_offset + tables_stream.len() as u32;
        let blob_offset = strings_offset + strings_stream.len() as u32;

        push_u32(&mut metadata, tables_offset);
        push_u32(&mut metadata, tables_stream.len() as u32);
        metadata.extend_from_slice(b"#~\0\0");
        push_u32(&mut metadata, strings_offset);
        push_u32(&mut metadata, strings_stream.len() as u32);
        metadata.extend_from_slice(b"#Strings\0\0\0\0");
        push_u32(&mut metadata, blob_offset);
        push_u32(&mut metadata, blob_stream.len() as u32);
        metadata.extend_from_slice(b"#Blob\0\0\0");

        assert_eq!(metadata.len(), header_size);
        metadata.extend_from_slice(&tables_stream);
        metadata.extend_from_slice(&strings_stream);
        metadata.extend_from_slice(&blob_stream);

        // cor20 header
        let mut cor20 = Vec::new();
        push_u32(&mut cor20, 72);
        push_u16(&mut cor20, 2);
        push_u16(&mut cor20, 5);
        push_u32(&mut cor20, va_metadata);
        push_u32(&mut cor20, metadata.len() as u32);
        push_u32(&mut cor20, 1); // ILONLY
        push_u32(&mut cor20, 0);
        if self.resources.is_empty() {
            push_u32(&mut cor20, 0);
            push_u32(&mut cor20, 0);
        } else {
            push_u32(&mut cor20, va_resources);
            push_u32(&mut cor20, resource_bytes.len() as u32);
        }
        cor20.resize(72, 0);

        // section content
        let mut section = Vec::new();
        section.extend_from_slice(&cor20);
        section.extend_from_slice(&resource_bytes);
        section.extend_from_slice(&body_bytes);
        while (VA_SECTION + section.len() as u32) < va_metadata {
            section.push(0);
        }
        section.extend_from_slice(&metadata);

        let virtual_size = section.len() as u32;
        let raw_size = align(virtual_size, FILE_SECTION);
        section.resize(raw_size as usize, 0);

        // PE headers
        let mut image = vec![0_u8; FILE_SECTION as usize];
        image[0] = b'M';
        image[1] = b'Z';
        image[0x3C] = 0x80;

        image[0x80..0x84].copy_from_slice(b"PE\0\0");
        write_u16(&mut image, 0x84, 0x014C); // i386
        write_u16(&mut image, 0x86, 1); // one section
        write_u16(&mut image, 0x94, 0x00E0); // optional header size
        write_u16(&mut image, 0x96, 0x2102); // executable, dll, 32-bit

        write_u16(&mut image, 0x98, 0x010B); // PE32
        write_u32(&mut image, 0x9C, raw_size); // size of code
        write_u32(&mut image, 0xA8, VA_SECTION); // base of code
        write_u32(&mut image, 0xB4, 0x0040_0000); // image base
        write_u32(&mut image, 0xB8, 0x1000); // section alignment
        write_u32(&mut image, 0xBC, FILE_SECTION); // file alignment
        write_u16(&mut image, 0xC0, 4); // os major
        write_u16(&mut image, 0xC8, 4); // subsystem major
        write_u32(&mut image, 0xD0, VA_SECTION + align(virtual_size, 0x1000)); // size of image
        write_u32(&mut image, 0xD4, FILE_SECTION); // size of headers
        write_u16(&mut image, 0xDC, 3); // console subsystem
        write_u32(&mut image, 0xE0, 0x0010_0000); // stack reserve
        write_u32(&mut image, 0xE4, 0x1000);
        write_u32(&mut image, 0xE8, 0x0010_0000); // heap reserve
        write_u32(&mut image, 0xEC, 0x1000);
        write_u32(&mut image, 0xF4, 16); // number of data directories

        // CLR runtime header directory (index 14)
        write_u32(&mut image, 0xF8 + 14 * 8, VA_SECTION);
        write_u32(&mut image, 0xF8 + 14 * 8 + 4, 72);

        // .text section header
        image[0x178..0x17D].copy_from_slice(b".text");
        write_u32(&mut image, 0x180, virtual_size);
        write_u32(&mut image, 0x184, VA_SECTION);
        write_u32(&mut image, 0x188, raw_size);
        write_u32(&mut image, 0x18C, FILE_SECTION);
        write_u32(&mut image, 0x19C, 0x6000_0020); // code, execute, read

        image.extend_from_slice(&section);
        image
    }
}

struct StringHeap {
    data: Vec<u8>,
    interned: IndexMap<String, u32>,
}

impl StringHeap {
    fn new() -> StringHeap {
        StringHeap {
            data: vec![0],
            interned: IndexMap::new(),
        }
    }

    fn intern(&mut self, value: &str) -> u32 {
        if value.is_empty() {
            return 0;
        }

        if let Some(offset) = self.interned.get(value) {
            return *offset;
        }

        let offset = self.data.len() as u32;
        self.data.extend_from_slice(value.as_bytes());
        self.data.push(0);
        self.interned.insert(value.to_string(), offset);
        offset
    }
}

struct BlobHeap {
    data: Vec<u8>,
    interned: IndexMap<Vec<u8>, u32>,
}

impl BlobHeap {
    fn new() -> BlobHeap {
        BlobHeap {
            data: vec![0],
            interned: IndexMap::new(),
        }
    }

    fn add(&mut self, value: &[u8]) -> u32 {
        assert!(value.len() < 0x80);

        if let Some(offset) = self.interned.get(value) {
            return *offset;
        }

        let offset = self.data.len() as u32;
        self.data.push(value.len() as u8);
        self.data.extend_from_slice(value);
        self.interned.insert(value.to_vec(), offset);
        offset
    }
}

fn emit_body(bytes: &mut Vec<u8>, total_size: u32) {
    if total_size <= 64 {
        let code_size = total_size - 1;
        bytes.push(((code_size as u8) << 2) | 0x02);
        bytes.extend(std::iter::repeat(0x00).take(code_size as usize));
    } else {
        let code_size = total_size - 12;
        bytes.extend_from_slice(&0x3013_u16.to_le_bytes());
        bytes.extend_from_slice(&8_u16.to_le_bytes());
        bytes.extend_from_slice(&code_size.to_le_bytes());
        bytes.extend_from_slice(&0_u32.to_le_bytes());
        bytes.extend(std::iter::repeat(0x00).take(code_size as usize));
    }
}

fn push_u16(bytes: &mut Vec<u8>, value: u16) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn push_u32(bytes: &mut Vec<u8>, value: u32) {
    bytes.extend_from_slice(&value.to_le_bytes());
}

fn write_u16(bytes: &mut [u8], offset: usize, value: u16) {
    bytes[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn write_u32(bytes: &mut [u8], offset: usize, value: u32) {
    bytes[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

fn align(value: u32, alignment: u32) -> u32 {
    value.div_ceil(alignment) * alignment
}

fn align4(value: u32) -> u32 {
    align(value, 4)
}

fn pad4(bytes: &mut Vec<u8>) {
    while bytes.len() % 4 != 0 {
        bytes.push(0);
    }
}

/// Write `bytes` to a unique temp file and return its path.
pub fn write_temp(name: &str, bytes: &[u8]) -> PathBuf {
    let path = std::env::temp_dir().join(format!("asmdiff_{}_{}", std::process::id(), name));
    std::fs::write(&path, bytes).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emits_tiny_and_fat_bodies() {
        let mut bytes = Vec::new();
        emit_body(&mut bytes, 11);
        assert_eq!(bytes.len(), 11);
        assert_eq!(bytes[0] & 0x03, 0x02);

        let mut bytes = Vec::new();
        emit_body(&mut bytes, 100);
        assert_eq!(bytes.len(), 100);
        assert_eq!(bytes[0] & 0x03, 0x03);
    }

    #[test]
    fn builds_loadable_image() {
        let image = AssemblyBuilder::new()
            .ty("N", "T")
            .field("value", FIELD_PUBLIC, SIG_FIELD_I4)
            .method("Run", METHOD_PUBLIC_STATIC, SIG_METHOD_VOID, 10)
            .build();

        let file = crate::file::File::from_mem(image).unwrap();
        let (clr_rva, clr_size) = file.clr();
        assert_eq!(clr_size, 72);

        let offset = file.rva_to_offset(clr_rva).unwrap();
        assert_eq!(&file.data()[offset..offset + 4], &[72, 0, 0, 0]);
    }
}
