use crate::error::{ExporterError, ExporterResult};
use crate::types::{Declaration, FieldMap, FieldTag};
use roxmltree::{Document, Node, ParsingOptions};
use std::path::Path;
use tracing::debug;

/// Element holding the declaration, identified by its `Id` attribute
pub const DECLARATION_TAG: &str = "Declaration";
pub const DECLARATION_ID_ATTR: &str = "Id";
pub const DECLARATION_ID: &str = "DEC";

/// Container of the period and value fields
pub const CONTAINER_TAG: &str = "DokUIENv5";

/// Month index of the declaration
pub const PERIOD_TAG: &str = "TaksMenesis";

/// Extract the period and R01..R32 values from a declaration XML file.
///
/// This is the main entry point for reading EDS declaration exports. The
/// document is searched for `Declaration[@Id="DEC"]`, then for a nested
/// `DokUIENv5` container, then for `TaksMenesis` inside that container. All
/// three are matched anywhere in the subtree, not only as direct children.
///
/// # Returns
/// * `Ok(Some(Declaration))` - period text plus all 32 fields (`None` where absent)
/// * `Ok(None)` - the document lacks the declaration, the container or the period
/// * `Err(ExporterError)` - the file is unreadable, not well-formed XML, the
///   period is blank, or a field holds non-numeric text
///
/// # Example
/// ```no_run
/// use cit_exporter::parser::extract_declaration;
/// use std::path::Path;
///
/// if let Some(decl) = extract_declaration(Path::new("declaration.xml"))? {
///     println!("TaksMenesis: {}", decl.period);
/// }
/// # Ok::<(), cit_exporter::error::ExporterError>(())
/// ```
pub fn extract_declaration(path: &Path) -> ExporterResult<Option<Declaration>> {
    let content = std::fs::read_to_string(path)?;
    let declaration = parse_declaration(&content)?;
    if declaration.is_none() {
        debug!(file = %path.display(), "no DEC declaration with a period found");
    }
    Ok(declaration)
}

/// Extract a declaration from XML text. See [`extract_declaration`].
pub fn parse_declaration(xml: &str) -> ExporterResult<Option<Declaration>> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(xml, options)?;

    let Some(declaration) = find_descendant(doc.root_element(), |n| {
        n.has_tag_name(DECLARATION_TAG) && n.attribute(DECLARATION_ID_ATTR) == Some(DECLARATION_ID)
    }) else {
        return Ok(None);
    };

    let Some(container) = find_descendant(declaration, |n| n.has_tag_name(CONTAINER_TAG)) else {
        return Ok(None);
    };

    let Some(period_node) = find_descendant(container, |n| n.has_tag_name(PERIOD_TAG)) else {
        return Ok(None);
    };

    // An empty period cannot be placed; the file contributes nothing
    let Some(raw_period) = element_text(period_node) else {
        return Ok(None);
    };
    let period = raw_period.trim();
    if period.is_empty() {
        return Err(ExporterError::InvalidPeriod(raw_period.to_string()));
    }

    let mut fields = FieldMap::new();
    for tag in FieldTag::all() {
        let name = tag.name();
        let value = match find_descendant(container, |n| n.has_tag_name(name.as_str())) {
            Some(node) => parse_field(tag, node)?,
            None => None,
        };
        fields.set(tag, value);
    }

    Ok(Some(Declaration {
        period: period.to_string(),
        fields,
    }))
}

/// First element strictly below `node` (document order) matching `pred`
fn find_descendant<'a, 'input, F>(node: Node<'a, 'input>, pred: F) -> Option<Node<'a, 'input>>
where
    F: Fn(&Node<'a, 'input>) -> bool,
{
    node.descendants()
        .skip(1)
        .find(|n| n.is_element() && pred(n))
}

/// Text of an element with content; whitespace-only text still counts
fn element_text<'a>(node: Node<'a, '_>) -> Option<&'a str> {
    node.text().filter(|t| !t.is_empty())
}

fn parse_field(tag: FieldTag, node: Node<'_, '_>) -> ExporterResult<Option<f64>> {
    let Some(text) = element_text(node) else {
        return Ok(None);
    };

    match text.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Ok(Some(value)),
        _ => Err(ExporterError::InvalidNumber {
            tag: tag.name(),
            text: text.to_string(),
        }),
    }
}
