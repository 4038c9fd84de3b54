//! Line-oriented diff output with lazily printed context headers.
//!
//! Headers such as `Type N.Foo` are pushed while the differ descends and only
//! written once the first difference underneath them surfaces, so unchanged
//! subtrees leave no trace in the report.

use std::fmt;

/// Direction of a reported difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffSign {
    Added,
    Removed,
    Changed,
}

/// What kind of item a [`DiffEntry`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Type,
    Field,
    Property,
    Method,
    CustomAttribute,
    Resource,
    Stream,
    Table,
    Metadata,
}

impl Category {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::Type => "Type",
            Category::Field => "Field",
            Category::Property => "Property",
            Category::Method => "Method",
            Category::CustomAttribute => "CustomAttribute",
            Category::Resource => "Resource",
            Category::Stream => "Stream",
            Category::Table => "Table",
            Category::Metadata => "Metadata",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One reported difference. `delta` is `None` for entries reported without a
/// size, such as added or removed custom attributes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffEntry {
    pub sign: DiffSign,
    pub category: Category,
    pub key: String,
    pub delta: Option<i64>,
}

impl DiffEntry {
    fn sign_char(&self) -> char {
        match (self.sign, self.delta) {
            (DiffSign::Removed, _) => '-',
            (DiffSign::Added, _) => '+',
            (DiffSign::Changed, Some(delta)) if delta < 0 => '-',
            (DiffSign::Changed, _) => '+',
        }
    }
}

/// Collects report lines and the structured entries behind them.
#[derive(Debug, Default)]
pub struct Report {
    pending: Vec<String>,
    lines: Vec<String>,
    entries: Vec<DiffEntry>,
}

impl Report {
    #[must_use]
    pub fn new() -> Report {
        Report::default()
    }

    /// Push a context header. It is only written if a difference is reported
    /// while it is on the stack. Returns a token for [`Report::leave`].
    pub fn enter(&mut self, header: String) -> usize {
        self.pending.push(header);
        self.pending.len()
    }

    /// Drop the header belonging to `token` if it was never written. After a
    /// flush the stack is empty and the call is a no-op.
    pub fn leave(&mut self, token: usize) {
        if self.pending.len() == token {
            self.pending.pop();
        }
    }

    fn flush_headers(&mut self) {
        self.lines.append(&mut self.pending);
    }

    /// Report one difference at the given indentation.
    pub fn entry(&mut self, padding: &str, entry: DiffEntry) {
        self.flush_headers();

        let mut line = format!("{}  {}", padding, entry.sign_char());
        match entry.delta {
            Some(delta) => {
                line.push_str(&format!("{:>12} ", thousands(delta.unsigned_abs())));
            }
            None => line.push_str(&" ".repeat(13)),
        }
        line.push_str(entry.category.label());
        if !entry.key.is_empty() {
            line.push(' ');
            line.push_str(&entry.key);
        }

        self.lines.push(line);
        self.entries.push(entry);
    }

    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    #[must_use]
    pub fn entries(&self) -> &[DiffEntry] {
        &self.entries
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// Format a summary-style difference line, e.g.
/// `  +       5,000 File size 10.00% (of 50,000)`.
#[must_use]
pub(crate) fn difference_line(
    padding: &str,
    label: &str,
    delta: i64,
    orig: Option<i64>,
) -> String {
    let sign = if delta < 0 { '-' } else { '+' };
    let mut line = format!(
        "{}  {}{:>12} {}",
        padding,
        sign,
        thousands(delta.unsigned_abs()),
        label
    );

    if let Some(orig) = orig.filter(|orig| *orig != 0) {
        let percent = delta as f64 * 100.0 / orig as f64;
        line.push_str(&format!(" {:.2}% (of {})", percent, thousands(orig.unsigned_abs())));
    }

    line
}

/// Group digits in threes, `1234567` becoming `1,234,567`.
#[must_use]
pub(crate) fn thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut result = String::with_capacity(digits.len() + digits.len() / 3);

    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            result.push(',');
        }
        result.push(digit);
    }

    result
}
