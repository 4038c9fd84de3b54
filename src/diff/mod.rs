//! The structural differ: loads both images, renders canonical keys for
//! every type and member, and walks the two type trees in lock-step.
//!
//! Emission order follows map insertion order: all side-1 keys first (removed
//! or changed), then side-2-only keys (added). Duplicate canonical keys are
//! last-write-wins and never flagged.

pub mod summary;

use std::path::Path;

use indexmap::{IndexMap, IndexSet};
use log::warn;
use regex::Regex;
use strum::IntoEnumIterator;

use crate::{
    container::AssemblyImage,
    metadata::{tables::TableId, view::MetadataView},
    render,
    report::{Category, DiffEntry, DiffSign, Report},
    Result,
};

pub use summary::{category_totals, DiffSummary};

/// What the differ compares beyond the type trees.
#[derive(Debug, Default)]
pub struct DiffOptions {
    /// Diff the metadata length, stream sizes and per-table sizes.
    pub compare_metadata: bool,
    /// Diff per-method body sizes and accumulate their totals.
    pub compare_method_bodies: bool,
    /// Only walk top-level types whose key matches; suspended for members
    /// and nested types of a matching type.
    pub type_filter: Option<Regex>,
}

/// Output of one comparison: the report plus the figures for the summary.
pub struct DiffResult {
    pub report: Report,
    pub summary: DiffSummary,
}

/// Accumulators threaded through the walk.
#[derive(Default)]
struct DiffStats {
    body_sizes: (u64, u64),
    sig_err_warned: bool,
}

/// Compare two assembly images on disk.
///
/// # Errors
/// Returns an error if either image fails to load or either metadata tree is
/// malformed.
pub fn compare(path1: &Path, path2: &Path, options: &DiffOptions) -> Result<DiffResult> {
    let (image1, image2) = rayon::join(|| AssemblyImage::open(path1), || AssemblyImage::open(path2));

    compare_images(&image1?, &image2?, options)
}

/// Compare two already-loaded assembly images.
///
/// # Errors
/// Returns an error if either metadata tree is malformed.
pub fn compare_images(
    image1: &AssemblyImage,
    image2: &AssemblyImage,
    options: &DiffOptions,
) -> Result<DiffResult> {
    let view1 = MetadataView::new(image1)?;
    let view2 = MetadataView::new(image2)?;

    let mut engine = DiffEngine {
        view1: &view1,
        view2: &view2,
        options,
        filter: options.type_filter.as_ref(),
        report: Report::new(),
        stats: DiffStats::default(),
    };
    engine.run("")?;

    let summary = DiffSummary {
        file_sizes: (image1.raw_length(), image2.raw_length()),
        logical_sizes: (image1.logical_length(), image2.logical_length()),
        metadata_sizes: (view1.metadata_size(), view2.metadata_size()),
        body_sizes: options.compare_method_bodies.then_some(engine.stats.body_sizes),
        type_counts: (view1.type_count(), view2.type_count()),
    };

    Ok(DiffResult {
        report: engine.report,
        summary,
    })
}

struct DiffEngine<'a> {
    view1: &'a MetadataView<'a>,
    view2: &'a MetadataView<'a>,
    options: &'a DiffOptions,
    filter: Option<&'a Regex>,
    report: Report,
    stats: DiffStats,
}

impl<'a> DiffEngine<'a> {
    fn run(&mut self, padding: &str) -> Result<()> {
        if self.options.compare_metadata {
            self.compare_metadata_streams(padding)?;
        }

        self.compare_resources(padding)?;

        let types1 = Self::top_level_types(self.view1)?;
        let types2 = Self::top_level_types(self.view2)?;
        self.compare_type_maps(&types1, &types2, padding)
    }

    /// Canonical keys of all non-nested types, in row order.
    fn top_level_types(view: &MetadataView<'_>) -> Result<IndexMap<String, u32>> {
        let mut types = IndexMap::new();

        for rid in 1..=view.type_count() {
            if !view.is_nested(rid) {
                types.insert(view.type_key(rid)?, rid);
            }
        }

        Ok(types)
    }

    fn nested_types(view: &MetadataView<'_>, type_rid: u32) -> Result<IndexMap<String, u32>> {
        let mut types = IndexMap::new();

        for &rid in view.nested_types(type_rid) {
            types.insert(view.type_key(rid)?, rid);
        }

        Ok(types)
    }

    fn compare_type_maps(
        &mut self,
        types1: &IndexMap<String, u32>,
        types2: &IndexMap<String, u32>,
        padding: &str,
    ) -> Result<()> {
        let filter = self.filter;

        for (key, rid1) in types1 {
            if matches!(filter, Some(regex) if !regex.is_match(key)) {
                continue;
            }

            // members and nested types of a matching type are always walked
            self.filter = None;

            match types2.get(key) {
                None => self.entry(
                    padding,
                    DiffSign::Removed,
                    Category::Type,
                    key.clone(),
                    None,
                ),
                Some(rid2) => self.compare_types(*rid1, *rid2, &format!("{padding}  "))?,
            }

            self.filter = filter;
        }

        for key in types2.keys() {
            if matches!(filter, Some(regex) if !regex.is_match(key)) {
                continue;
            }

            if !types1.contains_key(key) {
                self.entry(padding, DiffSign::Added, Category::Type, key.clone(), None);
            }
        }

        Ok(())
    }

    fn compare_types(&mut self, rid1: u32, rid2: u32, padding: &str) -> Result<()> {
        let token = self
            .report
            .enter(format!("{}Type {}", padding, self.view1.type_key(rid1)?));

        self.compare_attributes(rid1, rid2, padding)?;
        self.compare_fields(rid1, rid2, padding)?;
        self.compare_properties(rid1, rid2, padding)?;
        self.compare_methods(rid1, rid2, padding)?;

        let nested1 = Self::nested_types(self.view1, rid1)?;
        let nested2 = Self::nested_types(self.view2, rid2)?;
        self.compare_type_maps(&nested1, &nested2, padding)?;

        self.report.leave(token);

        Ok(())
    }

    fn compare_attributes(&mut self, rid1: u32, rid2: u32, padding: &str) -> Result<()> {
        let keys1 = Self::attribute_keys(self.view1, rid1)?;
        let keys2 = Self::attribute_keys(self.view2, rid2)?;

        self.compare_key_sets(&keys1, &keys2, Category::CustomAttribute, padding);

        Ok(())
    }

    fn attribute_keys(view: &MetadataView<'_>, type_rid: u32) -> Result<IndexSet<String>> {
        let mut keys = IndexSet::new();

        for &rid in view.type_attributes(type_rid) {
            let attribute = view.tables().custom_attributes().get(rid)?;
            match view.attribute_type_name(&attribute)? {
                Some(name) => {
                    keys.insert(name);
                }
                None => warn!("Unexpected constructor handle on a custom attribute"),
            }
        }

        Ok(keys)
    }

    fn compare_fields(&mut self, rid1: u32, rid2: u32, padding: &str) -> Result<()> {
        let keys1 = self.field_keys(self.view1, rid1)?;
        let keys2 = self.field_keys(self.view2, rid2)?;

        self.compare_key_sets(&keys1, &keys2, Category::Field, padding);

        Ok(())
    }

    fn field_keys(
        &mut self,
        view: &MetadataView<'_>,
        type_rid: u32,
    ) -> Result<IndexSet<String>> {
        let mut keys = IndexSet::new();

        for rid in view.field_range(type_rid) {
            let field = view.tables().fields().get(rid)?;
            let key = match render::field_string(view, type_rid, &field) {
                Ok(key) => key,
                Err(_) => {
                    self.warn_signature_error();
                    render::field_error_string(view, &field)?
                }
            };

            keys.insert(key);
        }

        Ok(keys)
    }

    fn compare_properties(&mut self, rid1: u32, rid2: u32, padding: &str) -> Result<()> {
        let keys1 = self.property_keys(self.view1, rid1)?;
        let keys2 = self.property_keys(self.view2, rid2)?;

        self.compare_key_sets(&keys1, &keys2, Category::Property, padding);

        Ok(())
    }

    fn property_keys(
        &mut self,
        view: &MetadataView<'_>,
        type_rid: u32,
    ) -> Result<IndexSet<String>> {
        let mut keys = IndexSet::new();

        for rid in view.property_range(type_rid) {
            let property = view.tables().properties().get(rid)?;
            let key = match render::property_string(view, type_rid, &property) {
                Ok(key) => key,
                Err(_) => {
                    self.warn_signature_error();
                    render::property_error_string(view, &property)?
                }
            };

            keys.insert(key);
        }

        Ok(keys)
    }

    fn compare_methods(&mut self, rid1: u32, rid2: u32, padding: &str) -> Result<()> {
        let methods1 = self.method_keys(self.view1, rid1)?;
        let methods2 = self.method_keys(self.view2, rid2)?;
        let has_size = self.options.compare_method_bodies;

        for (key, method_rid) in &methods1 {
            let size1 = if has_size {
                let method = self.view1.tables().methods().get(*method_rid)?;
                let size = self.view1.method_body_size(&method)? as i64;
                self.stats.body_sizes.0 += size as u64;
                size
            } else {
                0
            };

            match methods2.get(key) {
                None => self.entry(
                    padding,
                    DiffSign::Removed,
                    Category::Method,
                    key.clone(),
                    has_size.then_some(-size1),
                ),
                Some(other_rid) if has_size => {
                    let method = self.view2.tables().methods().get(*other_rid)?;
                    let size2 = self.view2.method_body_size(&method)? as i64;
                    self.stats.body_sizes.1 += size2 as u64;

                    let delta = size2 - size1;
                    if delta != 0 {
                        self.entry(
                            padding,
                            DiffSign::Changed,
                            Category::Method,
                            key.clone(),
                            Some(delta),
                        );
                    }
                }
                Some(_) => {}
            }
        }

        for (key, method_rid) in &methods2 {
            if methods1.contains_key(key) {
                continue;
            }

            let size2 = if has_size {
                let method = self.view2.tables().methods().get(*method_rid)?;
                let size = self.view2.method_body_size(&method)? as i64;
                self.stats.body_sizes.1 += size as u64;
                size
            } else {
                0
            };

            self.entry(
                padding,
                DiffSign::Added,
                Category::Method,
                key.clone(),
                has_size.then_some(size2),
            );
        }

        Ok(())
    }

    fn method_keys(
        &mut self,
        view: &MetadataView<'_>,
        type_rid: u32,
    ) -> Result<IndexMap<String, u32>> {
        let mut keys = IndexMap::new();

        for rid in view.method_range(type_rid) {
            let method = view.tables().methods().get(rid)?;
            let key = match render::method_string(view, type_rid, &method) {
                Ok(key) => key,
                Err(_) => {
                    self.warn_signature_error();
                    render::method_error_string(view, &method)?
                }
            };

            keys.insert(key, rid);
        }

        Ok(keys)
    }

    /// Emitted at most once per run, however many signatures fail to decode.
    fn warn_signature_error(&mut self) {
        if !self.stats.sig_err_warned {
            warn!("Exception in signature decoder. Some differences might be missing.");
            self.stats.sig_err_warned = true;
        }
    }

    fn compare_key_sets(
        &mut self,
        keys1: &IndexSet<String>,
        keys2: &IndexSet<String>,
        category: Category,
        padding: &str,
    ) {
        for key in keys1 {
            if !keys2.contains(key) {
                self.entry(padding, DiffSign::Removed, category, key.clone(), None);
            }
        }

        for key in keys2 {
            if !keys1.contains(key) {
                self.entry(padding, DiffSign::Added, category, key.clone(), None);
            }
        }
    }

    fn compare_resources(&mut self, padding: &str) -> Result<()> {
        let resources1 = self.view1.resources()?;
        let resources2 = self.view2.resources()?;

        for (name, s1) in &resources1 {
            match resources2.get(name) {
                None => self.entry(
                    padding,
                    DiffSign::Removed,
                    Category::Resource,
                    name.clone(),
                    None,
                ),
                Some(s2) if s1 != s2 => self.entry(
                    padding,
                    DiffSign::Changed,
                    Category::Resource,
                    name.clone(),
                    Some(i64::from(*s2) - i64::from(*s1)),
                ),
                Some(_) => {}
            }
        }

        for name in resources2.keys() {
            if !resources1.contains_key(name) {
                self.entry(padding, DiffSign::Added, Category::Resource, name.clone(), None);
            }
        }

        Ok(())
    }

    fn compare_metadata_streams(&mut self, padding: &str) -> Result<()> {
        let delta =
            i64::from(self.view2.metadata_size()) - i64::from(self.view1.metadata_size());
        if delta != 0 {
            self.entry(
                padding,
                DiffSign::Changed,
                Category::Metadata,
                String::new(),
                Some(delta),
            );
        }

        let sizes1 = self.view1.stream_sizes();
        let sizes2 = self.view2.stream_sizes();
        let padding = format!("{padding}  ");

        for (name, s1) in &sizes1 {
            match sizes2.get(name) {
                None => self.entry(
                    &padding,
                    DiffSign::Removed,
                    Category::Stream,
                    name.clone(),
                    None,
                ),
                Some(s2) => self.compare_stream(name, *s1, *s2, &padding)?,
            }
        }

        for name in sizes2.keys() {
            if !sizes1.contains_key(name) {
                self.entry(&padding, DiffSign::Added, Category::Stream, name.clone(), None);
            }
        }

        Ok(())
    }

    /// The `#~` stream gets a per-table size breakdown even when its overall
    /// size is unchanged.
    fn compare_stream(&mut self, name: &str, s1: u32, s2: u32, padding: &str) -> Result<()> {
        if s1 != s2 {
            self.entry(
                padding,
                DiffSign::Changed,
                Category::Stream,
                stream_key(name),
                Some(i64::from(s2) - i64::from(s1)),
            );
        }

        if name != "#~" {
            return Ok(());
        }

        let padding = format!("{padding}  ");
        let info1 = self.view1.tables().info();
        let info2 = self.view2.tables().info();

        for id in TableId::iter() {
            let len1 = info1.table_size(id) as i64;
            let len2 = info2.table_size(id) as i64;
            if len1 == len2 {
                continue;
            }

            self.entry(
                &padding,
                DiffSign::Changed,
                Category::Table,
                id.to_string(),
                Some(len2 - len1),
            );
        }

        Ok(())
    }

    fn entry(
        &mut self,
        padding: &str,
        sign: DiffSign,
        category: Category,
        key: String,
        delta: Option<i64>,
    ) {
        self.report.entry(
            padding,
            DiffEntry {
                sign,
                category,
                key,
                delta,
            },
        );
    }
}

fn stream_key(name: &str) -> String {
    if name == "#~" {
        "#~ (tables)".to_string()
    } else {
        name.to_string()
    }
}
