//! Values XML Parser
//!
//! Parses `res/values*/*.xml` files into resource items.

use std::path::Path;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use r_droid_resources::{
    AttrRef, FolderConfiguration, ResourceItem, ResourceType, ResourceValue, SourceId, SourceLocator,
};
use tracing::{debug, warn};

use crate::{line_of, tag_start, ParseError};

/// Element with its attributes, flattened text and children
#[derive(Debug, Default)]
struct Element {
    tag: String,
    attrs: Vec<(String, String)>,
    text: String,
    children: Vec<Element>,
    offset: usize,
}

impl Element {
    fn from_start(e: &BytesStart, offset: usize) -> Self {
        let tag = String::from_utf8_lossy(e.name().as_ref()).into_owned();
        let attrs = e
            .attributes()
            .filter_map(|a| a.ok())
            .filter_map(|attr| {
                let key = std::str::from_utf8(attr.key.as_ref()).ok()?.to_string();
                let value = attr.unescape_value().ok()?.into_owned();
                Some((key, value))
            })
            .collect();
        Self {
            tag,
            attrs,
            offset,
            ..Default::default()
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn value(&self) -> String {
        unescape_resource_text(self.text.trim())
    }

    fn children_named<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |c| c.tag == tag)
    }
}

/// Tags inside `<resources>` that declare nothing
const IGNORED_TAGS: &[&str] = &[
    "public",
    "public-group",
    "skip",
    "eat-comment",
    "macro",
    "overlayable",
    "java-symbol",
    "add-resource",
    "staging-public-group",
];

/// Parse the content of a values file
///
/// Entries that cannot be understood are skipped with a warning; only
/// malformed XML fails the whole file.
pub fn parse_values(
    xml: &str,
    file: &Path,
    config: &FolderConfiguration,
    source: &SourceId,
) -> Result<Vec<ResourceItem>, ParseError> {
    let root = read_tree(xml, file)?;
    let Some(resources) = root.children.iter().find(|e| e.tag == "resources") else {
        debug!("No <resources> element in {:?}", file);
        return Ok(Vec::new());
    };

    let builder = ItemBuilder {
        xml,
        file,
        config,
        source,
    };

    let mut items = Vec::new();
    for element in &resources.children {
        builder.element(element, &mut items);
    }
    Ok(items)
}

fn read_tree(xml: &str, file: &Path) -> Result<Element, ParseError> {
    let mut reader = Reader::from_str(xml);
    let mut stack = vec![Element::default()];

    loop {
        let position = reader.buffer_position();
        let event = reader.read_event().map_err(|source| ParseError::Xml {
            file: file.to_path_buf(),
            source,
        })?;

        match event {
            Event::Start(ref e) => {
                stack.push(Element::from_start(e, tag_start(xml, position)));
            }
            Event::Empty(ref e) => {
                let element = Element::from_start(e, tag_start(xml, position));
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(element);
                }
            }
            Event::End(_) => {
                if stack.len() > 1 {
                    if let Some(element) = stack.pop() {
                        if let Some(parent) = stack.last_mut() {
                            // Markup inside a value (`<xliff:g>`, `<b>`) still contributes text
                            parent.text.push_str(&element.text);
                            parent.children.push(element);
                        }
                    }
                }
            }
            Event::Text(e) => {
                let text = e
                    .unescape()
                    .map(|t| t.into_owned())
                    .unwrap_or_else(|_| String::from_utf8_lossy(&e).into_owned());
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::CData(e) => {
                let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if stack.len() > 1 {
        let open = stack.last().map(|e| e.tag.clone()).unwrap_or_default();
        return Err(ParseError::Xml {
            file: file.to_path_buf(),
            source: quick_xml::Error::UnexpectedEof(format!("unclosed <{}>", open)),
        });
    }

    Ok(stack.pop().unwrap_or_default())
}

struct ItemBuilder<'a> {
    xml: &'a str,
    file: &'a Path,
    config: &'a FolderConfiguration,
    source: &'a SourceId,
}

impl ItemBuilder<'_> {
    fn item(&self, resource_type: ResourceType, name: &str, value: ResourceValue, element: &Element) -> ResourceItem {
        ResourceItem::new(
            resource_type,
            name,
            self.config.clone(),
            value,
            self.source.clone(),
            SourceLocator::at(self.file, line_of(self.xml, element.offset), element.offset as u64),
        )
    }

    fn element(&self, element: &Element, items: &mut Vec<ResourceItem>) {
        if IGNORED_TAGS.contains(&element.tag.as_str()) {
            return;
        }

        let Some(name) = element.attr("name").filter(|n| !n.is_empty()) else {
            warn!(
                "Skipping <{}> without a name in {:?}:{}",
                element.tag,
                self.file,
                line_of(self.xml, element.offset)
            );
            return;
        };

        match element.tag.as_str() {
            "string" | "color" | "dimen" | "bool" | "integer" | "fraction" | "drawable" => {
                let resource_type = ResourceType::from_name(&element.tag).unwrap_or(ResourceType::String);
                items.push(self.item(resource_type, name, ResourceValue::text(element.value()), element));
            }
            "item" => self.typed_item(element, name, items),
            "id" => items.push(self.item(ResourceType::Id, name, ResourceValue::Id, element)),
            "style" => {
                let parent = element
                    .attr("parent")
                    .map(|p| p.to_string())
                    .or_else(|| name.rfind('.').map(|i| name[..i].to_string()))
                    .filter(|p| !p.is_empty());
                let style_items = element
                    .children_named("item")
                    .filter_map(|i| Some((i.attr("name")?.to_string(), i.value())))
                    .collect();
                items.push(self.item(
                    ResourceType::Style,
                    name,
                    ResourceValue::Style {
                        parent,
                        items: style_items,
                    },
                    element,
                ));
            }
            "attr" => self.attr(element, name, items),
            "declare-styleable" => {
                let mut attrs = Vec::new();
                for child in element.children_named("attr") {
                    let Some(attr_name) = child.attr("name") else {
                        continue;
                    };
                    let reference = AttrRef::parse(attr_name);
                    // Attrs with a format or values are defined here, the rest are references
                    if !reference.framework
                        && (child.attr("format").is_some() || !child.children.is_empty())
                    {
                        self.attr(child, attr_name, items);
                    }
                    attrs.push(reference);
                }
                items.push(self.item(ResourceType::Styleable, name, ResourceValue::Styleable { attrs }, element));
            }
            "array" | "string-array" | "integer-array" => {
                let values = element.children_named("item").map(|i| i.value()).collect();
                items.push(self.item(ResourceType::Array, name, ResourceValue::Array(values), element));
            }
            "plurals" => {
                let quantities = element
                    .children_named("item")
                    .filter_map(|i| Some((i.attr("quantity")?.to_string(), i.value())))
                    .collect();
                items.push(self.item(ResourceType::Plurals, name, ResourceValue::Plurals(quantities), element));
            }
            other => {
                warn!(
                    "Skipping unknown values element <{}> '{}' in {:?}:{}",
                    other,
                    name,
                    self.file,
                    line_of(self.xml, element.offset)
                );
            }
        }
    }

    fn typed_item(&self, element: &Element, name: &str, items: &mut Vec<ResourceItem>) {
        let Some(type_name) = element.attr("type") else {
            warn!("Skipping <item> '{}' without a type in {:?}", name, self.file);
            return;
        };

        match ResourceType::from_name(type_name) {
            Some(ResourceType::Id) => items.push(self.item(ResourceType::Id, name, ResourceValue::Id, element)),
            Some(resource_type) if resource_type.is_value_type() => {
                items.push(self.item(resource_type, name, ResourceValue::text(element.value()), element));
            }
            _ => warn!("Skipping <item> '{}' of unsupported type '{}' in {:?}", name, type_name, self.file),
        }
    }

    /// An attr definition; its enum and flag values declare ids
    fn attr(&self, element: &Element, name: &str, items: &mut Vec<ResourceItem>) {
        if name.starts_with("android:") {
            return;
        }
        let format = element.attr("format").map(|f| f.to_string());
        items.push(self.item(ResourceType::Attr, name, ResourceValue::Attr { format }, element));

        for value in element.children.iter().filter(|c| c.tag == "enum" || c.tag == "flag") {
            if let Some(value_name) = value.attr("name") {
                items.push(self.item(ResourceType::Id, value_name, ResourceValue::Id, value));
            }
        }
    }
}

/// Undo the escaping of Android string resources
fn unescape_resource_text(text: &str) -> String {
    let text = text
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .unwrap_or(text);

    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
