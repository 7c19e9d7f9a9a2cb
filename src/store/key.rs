//! Storage keys, categories and path templates.

use crate::error::{EnsembleError, EnsembleResult};
use std::fmt;
use std::path::PathBuf;

/// Storage partition; each one is served by its own driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    DynamicForecast,
    DynamicAnalyzed,
    Static,
    Parameter,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::DynamicForecast,
        Category::DynamicAnalyzed,
        Category::Static,
        Category::Parameter,
    ];

    /// Directory name used by the plain filesystem layout
    pub fn dir_name(&self) -> &'static str {
        match self {
            Category::DynamicForecast => "Forecast",
            Category::DynamicAnalyzed => "Analyzed",
            Category::Static => "Static",
            Category::Parameter => "Parameter",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}

/// Identity of one stored blob
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    pub category: Category,
    pub realization: usize,
    pub report_step: usize,
    pub name: String,
}

impl StorageKey {
    pub fn new<S: Into<String>>(
        category: Category,
        realization: usize,
        report_step: usize,
        name: S,
    ) -> Self {
        Self {
            category,
            realization,
            report_step,
            name: name.into(),
        }
    }

    /// Same key in another category
    pub fn with_category(&self, category: Category) -> Self {
        Self {
            category,
            ..self.clone()
        }
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{:04}/{:04}/{}",
            self.category, self.report_step, self.realization, self.name
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Int { width: usize, zero_pad: bool },
}

/// Printf-style directory template such as `/data/%04d/mem%03d/Forecast`
///
/// Placeholders are `%d`, `%Nd` and `%0Nd`; `%%` is a literal percent sign.
/// With two placeholders they receive `(report_step, realization)` in that
/// order, with one placeholder only the realization. Templates with zero or
/// more than two placeholders are rejected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathTemplate {
    source: String,
    segments: Vec<Segment>,
    placeholders: usize,
}

impl PathTemplate {
    /// Parse a template with one or two `%d`-style integer placeholders
    pub fn new(template: &str) -> EnsembleResult<Self> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                literal.push('%');
                continue;
            }
            let mut spec = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() {
                    spec.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            if chars.next() != Some('d') {
                return Err(EnsembleError::configuration(format!(
                    "unsupported placeholder in path template '{template}'"
                )));
            }
            if !literal.is_empty() {
                segments.push(Segment::Literal(std::mem::take(&mut literal)));
            }
            let zero_pad = spec.starts_with('0');
            let width = spec.parse::<usize>().unwrap_or(0);
            segments.push(Segment::Int { width, zero_pad });
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }

        let placeholders = segments
            .iter()
            .filter(|s| matches!(s, Segment::Int { .. }))
            .count();
        if placeholders == 0 || placeholders > 2 {
            return Err(EnsembleError::configuration(format!(
                "path template '{template}' needs one or two integer placeholders, found {placeholders}"
            )));
        }

        Ok(Self {
            source: template.to_string(),
            segments,
            placeholders,
        })
    }

    /// Whether the template distinguishes report steps
    pub fn uses_report_step(&self) -> bool {
        self.placeholders == 2
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Substitute the placeholders
    pub fn render(&self, report_step: usize, realization: usize) -> PathBuf {
        let mut args = if self.uses_report_step() {
            vec![report_step, realization]
        } else {
            vec![realization]
        }
        .into_iter();

        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(text) => out.push_str(text),
                Segment::Int { width, zero_pad } => {
                    let value = args.next().unwrap_or_default();
                    if *zero_pad {
                        out.push_str(&format!("{value:0width$}", width = *width));
                    } else {
                        out.push_str(&format!("{value:width$}", width = *width));
                    }
                }
            }
        }
        PathBuf::from(out)
    }
}

impl fmt::Display for PathTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_placeholders_take_step_then_realization() {
        let template = PathTemplate::new("/tmp/enkf/Ensemble/%04d/mem%03d/Forecast").unwrap();
        assert!(template.uses_report_step());
        assert_eq!(
            template.render(12, 7),
            PathBuf::from("/tmp/enkf/Ensemble/0012/mem007/Forecast")
        );
    }

    #[test]
    fn test_single_placeholder_is_realization() {
        let template = PathTemplate::new("run/realization-%d").unwrap();
        assert!(!template.uses_report_step());
        assert_eq!(template.render(99, 3), PathBuf::from("run/realization-3"));
    }

    #[test]
    fn test_space_padding_and_percent_escape() {
        let template = PathTemplate::new("a%%b/%3d").unwrap();
        assert_eq!(template.render(0, 5), PathBuf::from("a%b/  5"));
    }

    #[test]
    fn test_invalid_templates() {
        assert!(PathTemplate::new("/no/placeholders").is_err());
        assert!(PathTemplate::new("/%d/%d/%d").is_err());
        assert!(PathTemplate::new("/%s").is_err());
        assert!(PathTemplate::new("/trailing%").is_err());
    }

    #[test]
    fn test_key_display_and_category_change() {
        let key = StorageKey::new(Category::Parameter, 5, 0, "MULTFLT");
        assert_eq!(key.to_string(), "Parameter/0000/0005/MULTFLT");
        let moved = key.with_category(Category::Static);
        assert_eq!(moved.category, Category::Static);
        assert_eq!(moved.name, "MULTFLT");
        assert_ne!(moved, key);
    }
}
