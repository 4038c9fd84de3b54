//! Run totals: the summary block printed after the report and the
//! size-regression check.

use indexmap::IndexMap;

use crate::report::{difference_line, thousands, Category, DiffEntry};

/// Figures gathered over one comparison, rendered after the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffSummary {
    /// On-disk byte counts of both sides.
    pub file_sizes: (u64, u64),
    /// Uncompressed image sizes, equal to `file_sizes` for plain images.
    pub logical_sizes: (u64, u64),
    pub metadata_sizes: (u32, u32),
    /// Method body byte totals, present when body comparison was requested.
    pub body_sizes: Option<(u64, u64)>,
    pub type_counts: (u32, u32),
}

impl DiffSummary {
    /// Render the summary block. The uncompressed-size line only appears
    /// when at least one side was wrapped in the compressed container.
    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        let mut lines = vec!["Summary:".to_string()];

        let (file1, file2) = self.file_sizes;
        lines.push(difference_line(
            "",
            "File size",
            file2 as i64 - file1 as i64,
            Some(file1 as i64),
        ));

        let (logical1, logical2) = self.logical_sizes;
        if logical1 != file1 || logical2 != file2 {
            lines.push(difference_line(
                "",
                "Uncompressed size",
                logical2 as i64 - logical1 as i64,
                Some(logical1 as i64),
            ));
        }

        let (meta1, meta2) = self.metadata_sizes;
        lines.push(difference_line(
            "",
            "Metadata size",
            i64::from(meta2) - i64::from(meta1),
            Some(i64::from(meta1)),
        ));

        if let Some((bodies1, bodies2)) = self.body_sizes {
            lines.push(difference_line(
                "",
                "Method bodies size",
                bodies2 as i64 - bodies1 as i64,
                Some(bodies1 as i64),
            ));
        }

        let (types1, types2) = self.type_counts;
        lines.push(difference_line(
            "",
            "Types count",
            i64::from(types2) - i64::from(types1),
            None,
        ));

        lines
    }

    /// Growth of the uncompressed image in bytes, negative when it shrank.
    #[must_use]
    pub fn size_delta(&self) -> i64 {
        self.logical_sizes.1 as i64 - self.logical_sizes.0 as i64
    }

    /// Check the uncompressed-size delta against a regression threshold,
    /// returning the error message to report when it is exceeded.
    #[must_use]
    pub fn regression(&self, threshold: i64) -> Option<String> {
        let delta = self.size_delta();
        if delta <= threshold {
            return None;
        }

        Some(format!(
            "Size increase {} is {} bytes more than the threshold {}.",
            thousands(delta.unsigned_abs()),
            thousands((delta - threshold).unsigned_abs()),
            thousands(threshold.unsigned_abs())
        ))
    }
}

/// Sum the size deltas of the emitted entries per category. Entries without
/// a size contribute zero.
#[must_use]
pub fn category_totals(entries: &[DiffEntry]) -> IndexMap<Category, i64> {
    let mut totals = IndexMap::new();

    for entry in entries {
        *totals.entry(entry.category).or_insert(0) += entry.delta.unwrap_or(0);
    }

    totals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::DiffSign;

    fn summary() -> DiffSummary {
        DiffSummary {
            file_sizes: (50_000, 55_000),
            logical_sizes: (50_000, 55_000),
            metadata_sizes: (20_000, 21_000),
            body_sizes: None,
            type_counts: (100, 98),
        }
    }

    #[test]
    fn summary_lines() {
        assert_eq!(
            summary().lines(),
            [
                "Summary:",
                "  +       5,000 File size 10.00% (of 50,000)",
                "  +       1,000 Metadata size 5.00% (of 20,000)",
                "  -           2 Types count",
            ]
        );
    }

    #[test]
    fn uncompressed_line_only_for_wrapped_images() {
        let mut wrapped = summary();
        wrapped.logical_sizes = (80_000, 90_000);
        wrapped.body_sizes = Some((30_000, 29_000));

        assert_eq!(
            wrapped.lines(),
            [
                "Summary:",
                "  +       5,000 File size 10.00% (of 50,000)",
                "  +      10,000 Uncompressed size 12.50% (of 80,000)",
                "  +       1,000 Metadata size 5.00% (of 20,000)",
                "  -       1,000 Method bodies size -3.33% (of 30,000)",
                "  -           2 Types count",
            ]
        );
    }

    #[test]
    fn regression_threshold() {
        let plain = summary();
        assert_eq!(plain.size_delta(), 5_000);
        assert!(plain.regression(5_000).is_none());
        assert_eq!(
            plain.regression(3_000).unwrap(),
            "Size increase 5,000 is 2,000 bytes more than the threshold 3,000."
        );
    }

    #[test]
    fn totals_fold_deltas_per_category() {
        let entries = [
            DiffEntry {
                sign: DiffSign::Changed,
                category: Category::Method,
                key: "public void M ()".to_string(),
                delta: Some(5),
            },
            DiffEntry {
                sign: DiffSign::Removed,
                category: Category::Method,
                key: "public void N ()".to_string(),
                delta: Some(-12),
            },
            DiffEntry {
                sign: DiffSign::Added,
                category: Category::Field,
                key: "int x".to_string(),
                delta: None,
            },
        ];

        let totals = category_totals(&entries);
        assert_eq!(totals[&Category::Method], -7);
        assert_eq!(totals[&Category::Field], 0);
    }
}
