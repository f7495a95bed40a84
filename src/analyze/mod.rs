//! Semantic analysis layer using tree-sitter.
//!
//! Given a file's before/after texts, the analyzer produces an ordered list
//! of typed [`SemanticChange`]s: imports added or removed, top-level
//! functions and classes added, modified, or removed, and (for the
//! component languages) hook-style calls newly introduced inside a
//! function.
//!
//! The pipeline per file:
//! 1. Detect the language family from the file extension
//! 2. Parse both versions and extract imports + top-level items
//! 3. Compute the edit script by matching items on (category, name)
//! 4. For component languages, split pure hook insertions out of function
//!    modifications
//!
//! # Supported languages
//!
//! Rust, Python, TypeScript, JavaScript, and Go. Languages are detected
//! from file extensions; unknown extensions map to a no-op analysis.
//!
//! # Robustness
//!
//! tree-sitter produces a tree for any input, folding malformed regions
//! into error nodes, so syntactically invalid files degrade to a partial
//! or empty analysis instead of an error. Item matching uses keyed maps,
//! keeping full-file analysis linear (up to map lookups) in the number of
//! top-level definitions.

use std::collections::BTreeMap;
use std::path::Path;

use tree_sitter::{Language, Node, Parser};

use crate::model::change::{
    ChangeKind, FILE_TOP, FileAnalysis, SemanticChange, class_scope, function_scope,
};

// ---------------------------------------------------------------------------
// Language detection
// ---------------------------------------------------------------------------

/// Languages supported by the semantic analyzer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceLanguage {
    Rust,
    Python,
    TypeScript,
    JavaScript,
    Go,
}

impl SourceLanguage {
    /// Detect language from file extension.
    ///
    /// Returns `None` for unsupported or unrecognized extensions.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()? {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            "ts" | "tsx" => Some(Self::TypeScript),
            "js" | "jsx" | "mjs" | "cjs" => Some(Self::JavaScript),
            "go" => Some(Self::Go),
            _ => None,
        }
    }

    /// Get the tree-sitter `Language` for this language.
    fn tree_sitter_language(self) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
            Self::Go => tree_sitter_go::LANGUAGE.into(),
        }
    }

    /// Node kinds that represent top-level function definitions.
    const fn function_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["function_item"],
            Self::Python => &["function_definition"],
            Self::TypeScript | Self::JavaScript => &["function_declaration"],
            Self::Go => &["function_declaration", "method_declaration"],
        }
    }

    /// Node kinds that represent top-level class/type definitions.
    const fn class_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &[
                "struct_item",
                "enum_item",
                "trait_item",
                "impl_item",
                "type_item",
            ],
            Self::Python => &["class_definition"],
            Self::TypeScript => &[
                "class_declaration",
                "interface_declaration",
                "type_alias_declaration",
                "enum_declaration",
            ],
            Self::JavaScript => &["class_declaration"],
            Self::Go => &["type_declaration"],
        }
    }

    /// Node kinds that represent imports or module references.
    const fn import_kinds(self) -> &'static [&'static str] {
        match self {
            Self::Rust => &["use_declaration"],
            Self::Python => &["import_statement", "import_from_statement"],
            Self::TypeScript | Self::JavaScript => &["import_statement"],
            Self::Go => &["import_declaration"],
        }
    }

    /// Field name used to extract the identifier from a named item node.
    fn name_field(self, node_kind: &str) -> &'static str {
        match (self, node_kind) {
            (Self::Rust, "impl_item") => "type",
            _ => "name",
        }
    }

    /// Whether hook-call detection applies (UI component languages).
    #[must_use]
    pub const fn is_component_language(self) -> bool {
        matches!(self, Self::TypeScript | Self::JavaScript)
    }
}

impl std::fmt::Display for SourceLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rust => write!(f, "rust"),
            Self::Python => write!(f, "python"),
            Self::TypeScript => write!(f, "typescript"),
            Self::JavaScript => write!(f, "javascript"),
            Self::Go => write!(f, "go"),
        }
    }
}

/// All supported languages, for default analyzer construction.
pub const ALL_LANGUAGES: &[SourceLanguage] = &[
    SourceLanguage::Rust,
    SourceLanguage::Python,
    SourceLanguage::TypeScript,
    SourceLanguage::JavaScript,
    SourceLanguage::Go,
];

// ---------------------------------------------------------------------------
// Extracted structure
// ---------------------------------------------------------------------------

/// Whether an item is a function or a class/type definition.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ItemCategory {
    Function,
    Class,
}

impl ItemCategory {
    const fn added(self) -> ChangeKind {
        match self {
            Self::Function => ChangeKind::AddFunction,
            Self::Class => ChangeKind::AddClass,
        }
    }

    const fn modified(self) -> ChangeKind {
        match self {
            Self::Function => ChangeKind::ModifyFunction,
            Self::Class => ChangeKind::ModifyClass,
        }
    }

    const fn removed(self) -> ChangeKind {
        match self {
            Self::Function => ChangeKind::RemoveFunction,
            Self::Class => ChangeKind::RemoveClass,
        }
    }
}

/// One import/module reference extracted from a parse.
#[derive(Clone, Debug)]
struct ImportRecord {
    /// The referenced module or path, for reporting.
    target: String,
    /// Normalized full text, used as the matching key.
    text: String,
    /// A standalone statement reintroducing this import, used as the
    /// recorded text of an addition. Differs from `text` only for Go,
    /// where a grouped spec needs its `import` keyword back.
    stmt: String,
    line_start: u32,
    line_end: u32,
    byte_end: usize,
}

/// One top-level item extracted from a parse.
#[derive(Clone, Debug)]
struct ItemRecord {
    category: ItemCategory,
    name: Option<String>,
    line_start: u32,
    line_end: u32,
    byte_start: usize,
    byte_end: usize,
    content: String,
    /// Hook callee names inside the item body (component languages only).
    hooks: Vec<String>,
}

impl ItemRecord {
    /// Stable identity for matching items across versions. Named items use
    /// (category, name); unnamed items fall back to (category, index).
    fn identity_key(&self, index: usize) -> ItemKey {
        self.name.as_ref().map_or(
            ItemKey::Positional {
                category: self.category,
                index,
            },
            |name| ItemKey::Named {
                category: self.category,
                name: name.clone(),
            },
        )
    }

    /// Structural scope key for changes to this item.
    fn scope(&self, index: usize) -> String {
        let fallback = format!("#{index}");
        let name = self.name.as_deref().unwrap_or(&fallback);
        match self.category {
            ItemCategory::Function => function_scope(name),
            ItemCategory::Class => class_scope(name),
        }
    }

    /// Reported symbol name.
    fn target(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("#{index}"))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum ItemKey {
    Named {
        category: ItemCategory,
        name: String,
    },
    Positional {
        category: ItemCategory,
        index: usize,
    },
}

/// The structure extracted from one file version.
#[derive(Debug, Default)]
struct ParsedFile {
    imports: Vec<ImportRecord>,
    items: Vec<ItemRecord>,
}

// ---------------------------------------------------------------------------
// SemanticAnalyzer
// ---------------------------------------------------------------------------

/// Extension-dispatched semantic analyzer over the supported languages.
#[derive(Clone, Debug)]
pub struct SemanticAnalyzer {
    enabled: Vec<SourceLanguage>,
}

impl Default for SemanticAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticAnalyzer {
    /// Create an analyzer with all supported languages enabled.
    #[must_use]
    pub fn new() -> Self {
        Self {
            enabled: ALL_LANGUAGES.to_vec(),
        }
    }

    /// Create an analyzer restricted to specific languages.
    #[must_use]
    pub fn with_languages(languages: Vec<SourceLanguage>) -> Self {
        Self { enabled: languages }
    }

    /// Returns `true` if the file's extension maps to an enabled language.
    #[must_use]
    pub fn is_supported(&self, path: &Path) -> bool {
        SourceLanguage::from_path(path).is_some_and(|lang| self.enabled.contains(&lang))
    }

    /// Analyze the degenerate fresh-baseline case (`before` empty).
    #[must_use]
    pub fn analyze_single(&self, path: &Path, text: &str) -> FileAnalysis {
        self.analyze(path, "", text)
    }

    /// Analyze a before/after pair into an ordered list of semantic changes.
    ///
    /// Unsupported extensions and unparseable input yield an analysis with
    /// zero changes rather than an error.
    #[must_use]
    pub fn analyze(&self, path: &Path, before: &str, after: &str) -> FileAnalysis {
        let Some(lang) = SourceLanguage::from_path(path) else {
            return FileAnalysis::empty(path);
        };
        if !self.enabled.contains(&lang) {
            return FileAnalysis::empty(path);
        }

        let (Some(parsed_before), Some(parsed_after)) =
            (parse_file(before, lang), parse_file(after, lang))
        else {
            tracing::warn!(path = %path.display(), %lang, "parser unavailable, skipping analysis");
            return FileAnalysis::empty(path);
        };

        let changes = diff_parsed(&parsed_before, &parsed_after, lang);
        tracing::debug!(
            path = %path.display(),
            %lang,
            changes = changes.len(),
            "analyzed file"
        );
        FileAnalysis::new(path, changes)
    }
}

// ---------------------------------------------------------------------------
// Source layout (merge-reconstruction support)
// ---------------------------------------------------------------------------

/// Byte-level layout of one file version, used by the union merge to splice
/// additive changes into base text.
#[derive(Debug)]
pub(crate) struct SourceLayout {
    /// Byte offset where newly added imports should be inserted: after the
    /// last existing import, after a Go package clause, or at the start.
    pub import_insert_at: usize,
    /// Byte span of each named top-level scope (`function:<name>`,
    /// `class:<name>`).
    pub scopes: BTreeMap<String, (usize, usize)>,
}

/// Compute the byte layout of a source file.
///
/// Returns `None` for unsupported extensions or grammar failures.
pub(crate) fn source_layout(path: &Path, source: &str) -> Option<SourceLayout> {
    let lang = SourceLanguage::from_path(path)?;
    let parsed = parse_file(source, lang)?;

    // Go files always anchor new imports below the package clause: added
    // imports are standalone statements, which may not land inside an
    // existing grouped import block.
    let import_insert_at = if lang == SourceLanguage::Go {
        go_package_clause_end(source).unwrap_or(0)
    } else {
        parsed.imports.iter().map(|i| i.byte_end).max().unwrap_or(0)
    };

    let mut scopes = BTreeMap::new();
    for (index, item) in parsed.items.iter().enumerate() {
        scopes.insert(item.scope(index), (item.byte_start, item.byte_end));
    }

    Some(SourceLayout {
        import_insert_at,
        scopes,
    })
}

fn go_package_clause_end(source: &str) -> Option<usize> {
    let mut parser = Parser::new();
    parser
        .set_language(&SourceLanguage::Go.tree_sitter_language())
        .ok()?;
    let tree = parser.parse(source, None)?;
    let root = tree.root_node();
    for i in 0..root.child_count() {
        if let Some(child) = root.child(i)
            && child.kind() == "package_clause"
        {
            return Some(child.end_byte());
        }
    }
    None
}

// ---------------------------------------------------------------------------
// Parsing and extraction
// ---------------------------------------------------------------------------

fn narrow_line(row: usize) -> u32 {
    u32::try_from(row + 1).unwrap_or(u32::MAX)
}

fn node_text<'a>(node: Node<'_>, source: &'a str) -> &'a str {
    source.get(node.start_byte()..node.end_byte()).unwrap_or("")
}

/// Parse one file version and extract imports + top-level items.
///
/// Returns `None` only when the grammar cannot be loaded; malformed input
/// still produces a (possibly partial) extraction.
fn parse_file(source: &str, lang: SourceLanguage) -> Option<ParsedFile> {
    let mut parser = Parser::new();
    parser.set_language(&lang.tree_sitter_language()).ok()?;
    let tree = parser.parse(source, None)?;

    let root = tree.root_node();
    let mut parsed = ParsedFile::default();

    for i in 0..root.child_count() {
        let Some(child) = root.child(i) else { continue };
        extract_top_level(child, source, lang, &mut parsed);
    }

    Some(parsed)
}

/// Classify one top-level node, unwrapping export/decorator wrappers.
fn extract_top_level(node: Node<'_>, source: &str, lang: SourceLanguage, out: &mut ParsedFile) {
    let kind = node.kind();

    // TS/JS `export function f() {}` wraps the declaration; Python
    // decorators wrap the definition. Extract the inner node but keep the
    // wrapper's span so decorator/export text stays part of the content.
    if kind == "export_statement" || kind == "decorated_definition" {
        for i in 0..node.named_child_count() {
            let Some(inner) = node.named_child(i) else {
                continue;
            };
            if let Some(item) = extract_item(inner, node, source, lang) {
                out.items.push(item);
                return;
            }
        }
        return;
    }

    if lang.import_kinds().contains(&kind) {
        extract_imports(node, source, lang, &mut out.imports);
        return;
    }

    // `const App = () => {}` style components in TS/JS.
    if matches!(lang, SourceLanguage::TypeScript | SourceLanguage::JavaScript)
        && kind == "lexical_declaration"
    {
        if let Some(item) = extract_arrow_function(node, node, source, lang) {
            out.items.push(item);
        }
        return;
    }

    if let Some(item) = extract_item(node, node, source, lang) {
        out.items.push(item);
    }
}

/// Extract a function or class item. `span` is the node whose text/lines
/// define the item's extent (the wrapper, when one exists).
fn extract_item(
    node: Node<'_>,
    span: Node<'_>,
    source: &str,
    lang: SourceLanguage,
) -> Option<ItemRecord> {
    let kind = node.kind();
    let category = if lang.function_kinds().contains(&kind) {
        ItemCategory::Function
    } else if lang.class_kinds().contains(&kind) {
        ItemCategory::Class
    } else if matches!(lang, SourceLanguage::TypeScript | SourceLanguage::JavaScript)
        && kind == "lexical_declaration"
    {
        return extract_arrow_function(node, span, source, lang);
    } else {
        return None;
    };

    let name = item_name(node, source, lang, kind);
    let hooks = if lang.is_component_language() && category == ItemCategory::Function {
        collect_hook_calls(node, source)
    } else {
        Vec::new()
    };

    Some(ItemRecord {
        category,
        name,
        line_start: narrow_line(span.start_position().row),
        line_end: narrow_line(span.end_position().row),
        byte_start: span.start_byte(),
        byte_end: span.end_byte(),
        content: node_text(span, source).to_owned(),
        hooks,
    })
}

/// Extract the identifier of a named item.
fn item_name(node: Node<'_>, source: &str, lang: SourceLanguage, kind: &str) -> Option<String> {
    // Go type declarations nest the name inside a type_spec child.
    if lang == SourceLanguage::Go && kind == "type_declaration" {
        for i in 0..node.named_child_count() {
            let Some(spec) = node.named_child(i) else {
                continue;
            };
            if spec.kind() == "type_spec"
                && let Some(name) = spec.child_by_field_name("name")
            {
                return Some(node_text(name, source).to_owned());
            }
        }
        return None;
    }

    node.child_by_field_name(lang.name_field(kind))
        .map(|n| node_text(n, source).to_owned())
}

/// Treat `const Name = () => {}` / `= function() {}` as a function item.
fn extract_arrow_function(
    node: Node<'_>,
    span: Node<'_>,
    source: &str,
    _lang: SourceLanguage,
) -> Option<ItemRecord> {
    for i in 0..node.named_child_count() {
        let Some(decl) = node.named_child(i) else {
            continue;
        };
        if decl.kind() != "variable_declarator" {
            continue;
        }
        let value = decl.child_by_field_name("value")?;
        if !matches!(value.kind(), "arrow_function" | "function_expression") {
            return None;
        }
        let name = decl
            .child_by_field_name("name")
            .map(|n| node_text(n, source).to_owned());
        return Some(ItemRecord {
            category: ItemCategory::Function,
            name,
            line_start: narrow_line(span.start_position().row),
            line_end: narrow_line(span.end_position().row),
            byte_start: span.start_byte(),
            byte_end: span.end_byte(),
            content: node_text(span, source).to_owned(),
            hooks: collect_hook_calls(value, source),
        });
    }
    None
}

/// Extract one or more import records from an import node.
fn extract_imports(
    node: Node<'_>,
    source: &str,
    lang: SourceLanguage,
    out: &mut Vec<ImportRecord>,
) {
    let text = node_text(node, source).trim().to_owned();
    let line_start = narrow_line(node.start_position().row);
    let line_end = narrow_line(node.end_position().row);

    // Go groups several specs under one declaration; each spec is its own
    // module reference.
    if lang == SourceLanguage::Go {
        let mut found = false;
        collect_go_import_specs(node, source, &mut found, out);
        if found {
            return;
        }
    }

    out.push(ImportRecord {
        target: import_target(&text, lang),
        stmt: text.clone(),
        text,
        line_start,
        line_end,
        byte_end: node.end_byte(),
    });
}

fn collect_go_import_specs(
    node: Node<'_>,
    source: &str,
    found: &mut bool,
    out: &mut Vec<ImportRecord>,
) {
    for i in 0..node.named_child_count() {
        let Some(child) = node.named_child(i) else {
            continue;
        };
        if child.kind() == "import_spec" {
            *found = true;
            let text = node_text(child, source).trim().to_owned();
            out.push(ImportRecord {
                target: text.trim_matches('"').to_owned(),
                stmt: format!("import {text}"),
                text,
                line_start: narrow_line(child.start_position().row),
                line_end: narrow_line(child.end_position().row),
                byte_end: child.end_byte(),
            });
        } else {
            collect_go_import_specs(child, source, found, out);
        }
    }
}

/// Extract the referenced module name from an import's text, for reporting.
fn import_target(text: &str, lang: SourceLanguage) -> String {
    let cleaned = match lang {
        SourceLanguage::Rust => text
            .strip_prefix("pub use ")
            .or_else(|| text.strip_prefix("use "))
            .unwrap_or(text)
            .trim_end_matches(';'),
        SourceLanguage::Python => {
            if let Some(rest) = text.strip_prefix("from ") {
                rest.split(" import").next().unwrap_or(rest)
            } else {
                text.strip_prefix("import ").unwrap_or(text)
            }
        }
        SourceLanguage::TypeScript | SourceLanguage::JavaScript => {
            // The module string literal, if present.
            text.split('"')
                .nth(1)
                .or_else(|| text.split('\'').nth(1))
                .unwrap_or(text)
        }
        SourceLanguage::Go => text.split('"').nth(1).unwrap_or(text),
    };
    cleaned.trim().to_owned()
}

// ---------------------------------------------------------------------------
// Hook-call detection
// ---------------------------------------------------------------------------

/// Collect hook-style callee names (`use` + uppercase) under a node.
fn collect_hook_calls(node: Node<'_>, source: &str) -> Vec<String> {
    let mut hooks = Vec::new();
    collect_hook_calls_into(node, source, &mut hooks);
    hooks
}

fn collect_hook_calls_into(node: Node<'_>, source: &str, out: &mut Vec<String>) {
    if node.kind() == "call_expression"
        && let Some(callee) = node.child_by_field_name("function")
        && callee.kind() == "identifier"
    {
        let name = node_text(callee, source);
        if is_hook_name(name) {
            out.push(name.to_owned());
        }
    }
    for i in 0..node.named_child_count() {
        if let Some(child) = node.named_child(i) {
            collect_hook_calls_into(child, source, out);
        }
    }
}

/// `use` followed by an uppercase letter, e.g. `useState`, `useMyThing`.
fn is_hook_name(name: &str) -> bool {
    name.strip_prefix("use")
        .and_then(|rest| rest.chars().next())
        .is_some_and(char::is_uppercase)
}

/// Does this line introduce one of the named hooks?
fn line_adds_hook(line: &str, new_hooks: &BTreeMap<String, usize>) -> bool {
    new_hooks
        .keys()
        .any(|hook| line.contains(hook.as_str()))
}

// ---------------------------------------------------------------------------
// Edit script computation
// ---------------------------------------------------------------------------

/// Compute semantic changes between two parsed versions.
fn diff_parsed(
    before: &ParsedFile,
    after: &ParsedFile,
    lang: SourceLanguage,
) -> Vec<SemanticChange> {
    let mut changes = Vec::new();

    diff_imports(&before.imports, &after.imports, &mut changes);
    diff_items(&before.items, &after.items, lang, &mut changes);

    changes
}

fn diff_imports(
    before: &[ImportRecord],
    after: &[ImportRecord],
    out: &mut Vec<SemanticChange>,
) {
    let before_keys: BTreeMap<&str, &ImportRecord> =
        before.iter().map(|i| (i.text.as_str(), i)).collect();
    let after_keys: BTreeMap<&str, &ImportRecord> =
        after.iter().map(|i| (i.text.as_str(), i)).collect();

    for import in after {
        if !before_keys.contains_key(import.text.as_str()) {
            out.push(
                SemanticChange::new(
                    ChangeKind::AddImport,
                    import.target.as_str(),
                    FILE_TOP,
                    import.line_start,
                    import.line_end,
                )
                .with_content(import.stmt.as_str()),
            );
        }
    }

    for import in before {
        if !after_keys.contains_key(import.text.as_str()) {
            out.push(SemanticChange::new(
                ChangeKind::RemoveImport,
                import.target.as_str(),
                FILE_TOP,
                import.line_start,
                import.line_end,
            ));
        }
    }
}

fn diff_items(
    before: &[ItemRecord],
    after: &[ItemRecord],
    lang: SourceLanguage,
    out: &mut Vec<SemanticChange>,
) {
    let before_map: BTreeMap<ItemKey, (usize, &ItemRecord)> = before
        .iter()
        .enumerate()
        .map(|(i, item)| (item.identity_key(i), (i, item)))
        .collect();
    let after_map: BTreeMap<ItemKey, (usize, &ItemRecord)> = after
        .iter()
        .enumerate()
        .map(|(i, item)| (item.identity_key(i), (i, item)))
        .collect();

    // Added and modified items, in after-source order.
    for (index, item) in after.iter().enumerate() {
        let key = item.identity_key(index);
        match before_map.get(&key) {
            None => {
                out.push(
                    SemanticChange::new(
                        item.category.added(),
                        item.target(index),
                        item.scope(index),
                        item.line_start,
                        item.line_end,
                    )
                    .with_content(item.content.as_str()),
                );
            }
            Some((_, base)) if base.content != item.content => {
                diff_modified_item(base, item, index, lang, out);
            }
            Some(_) => {}
        }
    }

    // Removed items, in before-source order.
    for (index, item) in before.iter().enumerate() {
        if !after_map.contains_key(&item.identity_key(index)) {
            out.push(SemanticChange::new(
                item.category.removed(),
                item.target(index),
                item.scope(index),
                item.line_start,
                item.line_end,
            ));
        }
    }
}

/// Classify one modified item.
///
/// For component-language functions whose only difference is newly inserted
/// hook-call lines, the change is reported as `AddHookCall` per hook, which
/// keeps a hooks-only edit additive. Any other difference is a
/// modification.
fn diff_modified_item(
    base: &ItemRecord,
    item: &ItemRecord,
    index: usize,
    lang: SourceLanguage,
    out: &mut Vec<SemanticChange>,
) {
    if lang.is_component_language() && item.category == ItemCategory::Function {
        let new_hooks = hook_delta(&base.hooks, &item.hooks);
        if !new_hooks.is_empty() && is_pure_hook_insertion(&base.content, &item.content, &new_hooks)
        {
            for (hook, count) in &new_hooks {
                for _ in 0..*count {
                    out.push(
                        SemanticChange::new(
                            ChangeKind::AddHookCall,
                            hook.as_str(),
                            item.scope(index),
                            item.line_start,
                            item.line_end,
                        )
                        .with_content(item.content.as_str()),
                    );
                }
            }
            return;
        }
    }

    out.push(
        SemanticChange::new(
            item.category.modified(),
            item.target(index),
            item.scope(index),
            item.line_start,
            item.line_end,
        )
        .with_content(item.content.as_str()),
    );
}

/// Multiset difference of hook callees: after minus before.
fn hook_delta(before: &[String], after: &[String]) -> BTreeMap<String, usize> {
    let mut counts: BTreeMap<String, isize> = BTreeMap::new();
    for hook in after {
        *counts.entry(hook.clone()).or_default() += 1;
    }
    for hook in before {
        *counts.entry(hook.clone()).or_default() -= 1;
    }
    counts
        .into_iter()
        .filter_map(|(hook, n)| usize::try_from(n).ok().filter(|n| *n > 0).map(|n| (hook, n)))
        .collect()
}

/// True when `after` is `before` with lines inserted, and every inserted
/// non-empty line introduces one of the new hooks.
fn is_pure_hook_insertion(
    before: &str,
    after: &str,
    new_hooks: &BTreeMap<String, usize>,
) -> bool {
    let before_lines: Vec<&str> = before.lines().map(str::trim).collect();
    let mut base_iter = before_lines.iter().peekable();

    for line in after.lines().map(str::trim) {
        if base_iter.peek().copied().copied() == Some(line) {
            base_iter.next();
        } else if !line.is_empty() && !line_adds_hook(line, new_hooks) {
            return false;
        }
    }

    // Every original line must have been matched in order.
    base_iter.next().is_none()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
