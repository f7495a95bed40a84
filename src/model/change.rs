//! Semantic change model - typed, localized edits extracted by the analyzer.
//!
//! A [`SemanticChange`] classifies one edit to a file: what kind of edit it
//! is, which symbol it affects, and which structural scope it lands in. The
//! conflict rules operate on two derived notions:
//!
//! - **Additivity**: a change is additive when it only introduces new code
//!   (a new import, function, class, or hook call) without touching code
//!   that already existed. Modifications and removals are never additive.
//! - **Overlap**: two changes overlap exactly when their `location` scope
//!   keys are equal. Changes in different structural scopes never overlap,
//!   regardless of how their line ranges relate.
//!
//! # Serialization
//!
//! All types use snake_case JSON for clean, agent-parseable output:
//!
//! ```json
//! {
//!   "change_type": "add_function",
//!   "target": "parse_config",
//!   "location": "function:parse_config",
//!   "line_start": 12,
//!   "line_end": 29,
//!   "content_after": "def parse_config():\n    ..."
//! }
//! ```

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Scope key for changes at the top of a file (imports, module references).
pub const FILE_TOP: &str = "file_top";

/// Scope key for changes inside a named function.
#[must_use]
pub fn function_scope(name: &str) -> String {
    format!("function:{name}")
}

/// Scope key for changes to a named class or type definition.
#[must_use]
pub fn class_scope(name: &str) -> String {
    format!("class:{name}")
}

// ---------------------------------------------------------------------------
// ChangeKind
// ---------------------------------------------------------------------------

/// The kind of semantic change made to a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    /// An import or module reference was added.
    AddImport,
    /// An import or module reference was removed.
    RemoveImport,
    /// A new function or method definition was added.
    AddFunction,
    /// An existing function's body or signature changed (name unchanged).
    ModifyFunction,
    /// A function definition was removed.
    RemoveFunction,
    /// A new class or type definition was added.
    AddClass,
    /// An existing class or type definition changed (name unchanged).
    ModifyClass,
    /// A class or type definition was removed.
    RemoveClass,
    /// A hook-style call was newly introduced inside a component function.
    AddHookCall,
}

impl ChangeKind {
    /// Returns `true` if this kind only introduces new code.
    ///
    /// Modification and removal kinds are never additive.
    #[must_use]
    pub const fn is_additive(self) -> bool {
        matches!(
            self,
            Self::AddImport | Self::AddFunction | Self::AddClass | Self::AddHookCall
        )
    }
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AddImport => write!(f, "add import"),
            Self::RemoveImport => write!(f, "remove import"),
            Self::AddFunction => write!(f, "add function"),
            Self::ModifyFunction => write!(f, "modify function"),
            Self::RemoveFunction => write!(f, "remove function"),
            Self::AddClass => write!(f, "add class"),
            Self::ModifyClass => write!(f, "modify class"),
            Self::RemoveClass => write!(f, "remove class"),
            Self::AddHookCall => write!(f, "add hook call"),
        }
    }
}

// ---------------------------------------------------------------------------
// SemanticChange
// ---------------------------------------------------------------------------

/// One classified edit to a file.
///
/// # Example
///
/// Task `task-1` adds `import os` at the top of `app/main.py`:
///
/// ```
/// use braid::model::change::{ChangeKind, SemanticChange, FILE_TOP};
///
/// let change = SemanticChange::new(ChangeKind::AddImport, "os", FILE_TOP, 1, 1);
/// assert!(change.is_additive());
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticChange {
    /// What kind of edit this is.
    pub change_type: ChangeKind,

    /// The symbol name affected (function name, class name, module name,
    /// hook name).
    pub target: String,

    /// Structural scope key: [`FILE_TOP`], `function:<name>`, or
    /// `class:<name>`. Overlap is decided by equality on this key alone.
    pub location: String,

    /// First line of the affected unit (1-based, inclusive).
    pub line_start: u32,

    /// Last line of the affected unit (1-based, inclusive).
    pub line_end: u32,

    /// New source text of the changed unit, when available. Used when
    /// reconstructing a merged file; absent for removals.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_after: Option<String>,
}

impl SemanticChange {
    /// Create a new semantic change without replacement content.
    #[must_use]
    pub fn new(
        change_type: ChangeKind,
        target: impl Into<String>,
        location: impl Into<String>,
        line_start: u32,
        line_end: u32,
    ) -> Self {
        Self {
            change_type,
            target: target.into(),
            location: location.into(),
            line_start,
            line_end,
            content_after: None,
        }
    }

    /// Attach the unit's new source text.
    #[must_use]
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content_after = Some(content.into());
        self
    }

    /// Returns `true` if this change only introduces new code.
    #[must_use]
    pub const fn is_additive(&self) -> bool {
        self.change_type.is_additive()
    }

    /// Returns `true` if this change occupies the same structural scope as
    /// `other`. Line numbers are deliberately ignored: scopes either
    /// coincide or they do not.
    #[must_use]
    pub fn overlaps_with(&self, other: &Self) -> bool {
        self.location == other.location
    }
}

impl fmt::Display for SemanticChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} `{}` @ {} (lines {}-{})",
            self.change_type, self.target, self.location, self.line_start, self.line_end
        )
    }
}

// ---------------------------------------------------------------------------
// FileAnalysis
// ---------------------------------------------------------------------------

/// The analyzer's output for one file version or before/after pair.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAnalysis {
    /// Path of the analyzed file, relative to the worktree root.
    pub file_path: PathBuf,

    /// Ordered semantic changes, in source order of the "after" text.
    #[serde(default)]
    pub changes: Vec<SemanticChange>,
}

impl FileAnalysis {
    /// Create an analysis with the given changes.
    #[must_use]
    pub fn new(file_path: impl Into<PathBuf>, changes: Vec<SemanticChange>) -> Self {
        Self {
            file_path: file_path.into(),
            changes,
        }
    }

    /// Create an empty analysis (unsupported language or parse failure).
    #[must_use]
    pub fn empty(file_path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: file_path.into(),
            changes: Vec::new(),
        }
    }

    /// Returns `true` iff every contained change is additive.
    ///
    /// Vacuously true for an empty change list.
    #[must_use]
    pub fn is_additive_only(&self) -> bool {
        self.changes.iter().all(SemanticChange::is_additive)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn add_import(target: &str) -> SemanticChange {
        SemanticChange::new(ChangeKind::AddImport, target, FILE_TOP, 1, 1)
    }

    // -- ChangeKind --

    #[test]
    fn additive_kinds() {
        assert!(ChangeKind::AddImport.is_additive());
        assert!(ChangeKind::AddFunction.is_additive());
        assert!(ChangeKind::AddClass.is_additive());
        assert!(ChangeKind::AddHookCall.is_additive());
    }

    #[test]
    fn non_additive_kinds() {
        assert!(!ChangeKind::RemoveImport.is_additive());
        assert!(!ChangeKind::ModifyFunction.is_additive());
        assert!(!ChangeKind::RemoveFunction.is_additive());
        assert!(!ChangeKind::ModifyClass.is_additive());
        assert!(!ChangeKind::RemoveClass.is_additive());
    }

    #[test]
    fn change_kind_serde_snake_case() {
        let json = serde_json::to_string(&ChangeKind::AddHookCall).unwrap();
        assert_eq!(json, "\"add_hook_call\"");
        let decoded: ChangeKind = serde_json::from_str("\"modify_function\"").unwrap();
        assert_eq!(decoded, ChangeKind::ModifyFunction);
    }

    // -- scope keys --

    #[test]
    fn scope_key_helpers() {
        assert_eq!(function_scope("render"), "function:render");
        assert_eq!(class_scope("Widget"), "class:Widget");
    }

    // -- SemanticChange --

    #[test]
    fn overlap_is_location_equality() {
        let a = SemanticChange::new(
            ChangeKind::AddHookCall,
            "useState",
            function_scope("App"),
            5,
            5,
        );
        let b = SemanticChange::new(
            ChangeKind::AddHookCall,
            "useEffect",
            function_scope("App"),
            40,
            40,
        );
        assert!(a.overlaps_with(&b));
    }

    #[test]
    fn different_scopes_never_overlap() {
        // Same line range, different scopes: no overlap.
        let a = SemanticChange::new(ChangeKind::AddFunction, "f", function_scope("f"), 3, 9);
        let b = SemanticChange::new(ChangeKind::AddFunction, "g", function_scope("g"), 3, 9);
        assert!(!a.overlaps_with(&b));
    }

    #[test]
    fn with_content_attaches_text() {
        let change = SemanticChange::new(ChangeKind::AddFunction, "f", function_scope("f"), 1, 2)
            .with_content("fn f() {}\n");
        assert_eq!(change.content_after.as_deref(), Some("fn f() {}\n"));
    }

    #[test]
    fn change_serde_roundtrip() {
        let change = SemanticChange::new(
            ChangeKind::ModifyFunction,
            "process",
            function_scope("process"),
            10,
            24,
        )
        .with_content("def process():\n    return 2\n");
        let json = serde_json::to_string(&change).unwrap();
        let decoded: SemanticChange = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, change);
    }

    #[test]
    fn change_serde_omits_absent_content() {
        let change = add_import("os");
        let json = serde_json::to_string(&change).unwrap();
        assert!(!json.contains("content_after"));
    }

    #[test]
    fn change_serde_tolerates_unknown_fields() {
        let json = r#"{
            "change_type": "add_import",
            "target": "os",
            "location": "file_top",
            "line_start": 1,
            "line_end": 1,
            "provenance": "future-field"
        }"#;
        let decoded: SemanticChange = serde_json::from_str(json).unwrap();
        assert_eq!(decoded.change_type, ChangeKind::AddImport);
    }

    #[test]
    fn change_display() {
        let change = add_import("sys");
        let text = format!("{change}");
        assert!(text.contains("add import"));
        assert!(text.contains("sys"));
        assert!(text.contains("file_top"));
    }

    // -- FileAnalysis --

    #[test]
    fn empty_analysis_is_additive_only() {
        let analysis = FileAnalysis::empty("a.py");
        assert!(analysis.is_additive_only());
        assert!(analysis.changes.is_empty());
    }

    #[test]
    fn additive_only_with_all_additions() {
        let analysis = FileAnalysis::new("a.py", vec![add_import("os"), add_import("sys")]);
        assert!(analysis.is_additive_only());
    }

    #[test]
    fn one_modification_breaks_additive_only() {
        let analysis = FileAnalysis::new(
            "a.py",
            vec![
                add_import("os"),
                SemanticChange::new(ChangeKind::ModifyFunction, "f", function_scope("f"), 3, 5),
            ],
        );
        assert!(!analysis.is_additive_only());
    }

    #[test]
    fn analysis_serde_roundtrip() {
        let analysis = FileAnalysis::new(
            "src/app.ts",
            vec![SemanticChange::new(
                ChangeKind::AddHookCall,
                "useMemo",
                function_scope("App"),
                8,
                8,
            )],
        );
        let json = serde_json::to_string(&analysis).unwrap();
        let decoded: FileAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, analysis);
    }
}
