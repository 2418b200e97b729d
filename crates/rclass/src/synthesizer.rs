//! R Class Synthesis
//!
//! Builds the bytecode of `R` and its nested `R$<type>` classes for one
//! package straight from a [`LayeredRepository`] and the shared
//! [`IdAllocator`]. Output only depends on the repository contents and the
//! allocator state, so unchanged state yields byte-identical classes.

use std::collections::BTreeSet;
use std::sync::Arc;
use bytes::Bytes;
use r_droid_core::{RClassConfig, RDroidError, Result};
use r_droid_resources::{field_name, IdAllocator, LayeredRepository, ResourceId, ResourceType, ResourceValue};
use tracing::{debug, warn};

use crate::class_file::{
    ClassWriter, CodeBuilder, InnerClassEntry, SynthesisError, ACC_FINAL, ACC_PUBLIC, ACC_STATIC, ACC_SUPER,
};

const OBJECT: &str = "java/lang/Object";
const SOURCE_FILE: &str = "R.java";
const CLASS_ACCESS: u16 = ACC_PUBLIC | ACC_FINAL | ACC_SUPER;
const MEMBER_ACCESS: u16 = ACC_PUBLIC | ACC_STATIC | ACC_FINAL;

enum Field {
    Int(String, i32),
    IntArray(String, Vec<i32>),
}

impl Field {
    fn name(&self) -> &str {
        match self {
            Field::Int(name, _) | Field::IntArray(name, _) => name,
        }
    }
}

/// Generator of the `R` classes of one package
pub struct RClassGenerator {
    package: String,
    repository: Arc<LayeredRepository>,
    ids: Arc<IdAllocator>,
    config: RClassConfig,
}

impl RClassGenerator {
    pub fn new(
        package: impl Into<String>,
        repository: Arc<LayeredRepository>,
        ids: Arc<IdAllocator>,
        config: &RClassConfig,
    ) -> Self {
        Self {
            package: package.into(),
            repository,
            ids,
            config: config.clone(),
        }
    }

    pub fn package(&self) -> &str {
        &self.package
    }

    pub fn repository(&self) -> &Arc<LayeredRepository> {
        &self.repository
    }

    /// Resource types that get a nested class, in ordinal order
    pub fn types_with_members(&self) -> Vec<ResourceType> {
        self.repository.types()
    }

    /// Internal name of `R`, e.g. `com/example/R`
    pub fn r_internal_name(&self) -> String {
        format!("{}/R", self.package.replace('.', "/"))
    }

    fn type_internal_name(&self, resource_type: ResourceType) -> String {
        format!("{}${}", self.r_internal_name(), resource_type.name())
    }

    fn inner_entry(&self, resource_type: ResourceType) -> InnerClassEntry {
        InnerClassEntry {
            inner: self.type_internal_name(resource_type),
            outer: self.r_internal_name(),
            name: resource_type.name().to_string(),
            access: MEMBER_ACCESS,
        }
    }

    /// Bytes of the outer `R` class
    pub fn generate_r(&self) -> Result<Bytes> {
        let name = self.r_internal_name();
        self.write_r(&name).map_err(|e| synthesis_error(&name, e))
    }

    fn write_r(&self, name: &str) -> std::result::Result<Bytes, SynthesisError> {
        let mut writer = ClassWriter::new(self.config.class_file_major_version, CLASS_ACCESS, name, OBJECT)?;
        writer.add_default_constructor(ACC_PUBLIC)?;

        let entries: Vec<InnerClassEntry> = self
            .types_with_members()
            .into_iter()
            .map(|ty| self.inner_entry(ty))
            .collect();
        writer.add_inner_classes(&entries)?;
        if self.config.emit_source_file {
            writer.add_source_file(SOURCE_FILE)?;
        }

        let bytes = writer.finish();
        debug!("Generated {} ({} bytes, {} nested types)", name, bytes.len(), entries.len());
        Ok(bytes)
    }

    /// Bytes of `R$<type>`, or `None` when the type has no members
    pub fn generate_type(&self, resource_type: ResourceType) -> Result<Option<Bytes>> {
        let fields = if resource_type == ResourceType::Styleable {
            self.styleable_fields()
        } else {
            self.id_fields(resource_type)
        };
        if fields.is_empty() {
            return Ok(None);
        }

        let name = self.type_internal_name(resource_type);
        self.write_type(resource_type, &name, fields)
            .map(Some)
            .map_err(|e| synthesis_error(&name, e))
    }

    fn write_type(
        &self,
        resource_type: ResourceType,
        name: &str,
        fields: Vec<Field>,
    ) -> std::result::Result<Bytes, SynthesisError> {
        let mut writer = ClassWriter::new(self.config.class_file_major_version, CLASS_ACCESS, name, OBJECT)?;

        let mut clinit = CodeBuilder::new(4, 0);
        let mut arrays = 0;
        for field in &fields {
            match field {
                Field::Int(member, value) => writer.add_int_constant(MEMBER_ACCESS, member, *value)?,
                Field::IntArray(member, values) => {
                    writer.add_field(MEMBER_ACCESS, member, "[I")?;
                    let length = i32::try_from(values.len())
                        .map_err(|_| SynthesisError::TooManyMembers("array elements"))?;
                    clinit.push_int(writer.pool(), length)?.new_int_array();
                    for (index, value) in values.iter().enumerate() {
                        clinit.dup();
                        clinit.push_int(writer.pool(), index as i32)?;
                        clinit.push_int(writer.pool(), *value)?;
                        clinit.iastore();
                    }
                    let fieldref = writer.pool().fieldref(name, member, "[I")?;
                    clinit.putstatic(fieldref);
                    arrays += 1;
                }
            }
        }

        writer.add_default_constructor(ACC_PUBLIC)?;
        if arrays > 0 {
            clinit.return_void();
            writer.add_method(ACC_STATIC, "<clinit>", "()V", clinit)?;
        }
        writer.add_inner_classes(&[self.inner_entry(resource_type)])?;
        if self.config.emit_source_file {
            writer.add_source_file(SOURCE_FILE)?;
        }

        let bytes = writer.finish();
        debug!("Generated {} ({} bytes, {} fields)", name, bytes.len(), fields.len());
        Ok(bytes)
    }

    fn id_fields(&self, resource_type: ResourceType) -> Vec<Field> {
        let names: BTreeSet<String> = self
            .repository
            .names_of_type(resource_type)
            .iter()
            .map(|name| field_name(name))
            .collect();

        names
            .into_iter()
            .map(|name| {
                let id = self.ids.id_for(resource_type, &name);
                Field::Int(name, id.as_i32())
            })
            .collect()
    }

    fn styleable_fields(&self) -> Vec<Field> {
        let mut fields = Vec::new();

        for styleable in self.repository.names_of_type(ResourceType::Styleable) {
            let definitions = self.repository.definitions(ResourceType::Styleable, &styleable);
            let Some(attrs) = definitions.iter().find_map(|item| match &item.value {
                ResourceValue::Styleable { attrs } => Some(attrs),
                _ => None,
            }) else {
                continue;
            };

            let prefix = field_name(&styleable);
            let mut entries: Vec<(ResourceId, String)> = Vec::with_capacity(attrs.len());
            for attr in attrs {
                let (id, suffix) = if attr.framework {
                    let id = self.ids.framework_id(&attr.name).unwrap_or_else(|| {
                        warn!("Unknown framework attribute android:{} in {}", attr.name, styleable);
                        ResourceId(0)
                    });
                    (id, format!("android_{}", field_name(&attr.name)))
                } else {
                    (self.ids.id_for(ResourceType::Attr, &attr.name), field_name(&attr.name))
                };
                if !entries.iter().any(|(_, existing)| *existing == suffix) {
                    entries.push((id, suffix));
                }
            }
            entries.sort_by_key(|(id, _)| *id);

            fields.push(Field::IntArray(
                prefix.clone(),
                entries.iter().map(|(id, _)| id.as_i32()).collect(),
            ));
            for (index, (_, suffix)) in entries.iter().enumerate() {
                fields.push(Field::Int(format!("{}_{}", prefix, suffix), index as i32));
            }
        }

        fields.sort_by(|a, b| a.name().cmp(b.name()));
        fields.dedup_by(|a, b| a.name() == b.name());
        fields
    }
}

impl std::fmt::Debug for RClassGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RClassGenerator")
            .field("package", &self.package)
            .field("repository", &self.repository.name())
            .finish()
    }
}

fn synthesis_error(class: &str, error: SynthesisError) -> RDroidError {
    RDroidError::ClassSynthesis {
        class: class.replace('/', "."),
        reason: error.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use r_droid_resources::{
        AttrRef, FolderConfiguration, LayerKey, LayerSlot, ResourceItem, ResourceMerger, SourceId,
        SourceLocator, SourceResourceSet, SymbolTable,
    };
    use crate::inspect::ClassSummary;

    fn item(ty: ResourceType, name: &str, value: ResourceValue) -> ResourceItem {
        ResourceItem::new(
            ty,
            name,
            FolderConfiguration::from_qualifiers("").unwrap(),
            value,
            SourceId::new("app/res"),
            SourceLocator::file("values/values.xml"),
        )
    }

    fn repository(items: Vec<ResourceItem>) -> Arc<LayeredRepository> {
        let source = SourceId::new("app/res");
        let slot = Arc::new(LayerSlot::new(LayerKey::Module("app".into()), vec![source.clone()]));
        slot.recompute(
            &ResourceMerger::default(),
            &[Arc::new(SourceResourceSet::with_items(source, items))],
        );
        Arc::new(LayeredRepository::new("app", vec![slot]))
    }

    fn generator(items: Vec<ResourceItem>) -> (RClassGenerator, Arc<IdAllocator>) {
        let ids = Arc::new(IdAllocator::default());
        let generator = RClassGenerator::new(
            "com.example.app",
            repository(items),
            ids.clone(),
            &RClassConfig::default(),
        );
        (generator, ids)
    }

    #[test]
    fn test_outer_class() {
        let (generator, _) = generator(vec![
            item(ResourceType::String, "title", ResourceValue::text("Title")),
            item(ResourceType::Color, "accent", ResourceValue::text("#ff0000")),
        ]);

        let summary = ClassSummary::parse(&generator.generate_r().unwrap()).unwrap();
        assert_eq!(summary.name, "com/example/app/R");
        assert_eq!(summary.access, 0x0031);
        assert_eq!(summary.major_version, 52);
        assert_eq!(summary.source_file.as_deref(), Some("R.java"));
        assert!(summary.fields.is_empty());
        assert_eq!(summary.method("<init>").unwrap().access, ACC_PUBLIC);

        let inner: Vec<&str> = summary.inner_classes.iter().map(|c| c.inner.as_str()).collect();
        assert_eq!(inner, vec!["com/example/app/R$color", "com/example/app/R$string"]);
        assert_eq!(summary.inner_classes[0].access, 0x0019);
    }

    #[test]
    fn test_type_class_fields() {
        let (generator, ids) = generator(vec![
            item(ResourceType::String, "title", ResourceValue::text("Title")),
            item(ResourceType::String, "app.name", ResourceValue::text("App")),
        ]);

        let bytes = generator.generate_type(ResourceType::String).unwrap().unwrap();
        let summary = ClassSummary::parse(&bytes).unwrap();
        assert_eq!(summary.name, "com/example/app/R$string");

        let names: Vec<&str> = summary.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec!["app_name", "title"]);
        for field in &summary.fields {
            assert_eq!(field.access, 0x0019);
            assert_eq!(field.descriptor, "I");
            let id = ids.get(ResourceType::String, &field.name).unwrap();
            assert_eq!(field.constant, Some(id.as_i32()));
        }
        assert_eq!(summary.inner_classes[0].name.as_deref(), Some("string"));
        assert!(summary.method("<clinit>").is_none());
    }

    #[test]
    fn test_empty_type_has_no_class() {
        let (generator, _) = generator(vec![item(ResourceType::String, "title", ResourceValue::text("Title"))]);
        assert!(generator.generate_type(ResourceType::Drawable).unwrap().is_none());
        assert!(generator.generate_type(ResourceType::Styleable).unwrap().is_none());
    }

    #[test]
    fn test_styleable_arrays_and_indices() {
        let (generator, ids) = generator(vec![
            item(ResourceType::Attr, "chartColor", ResourceValue::Attr { format: Some("color".into()) }),
            item(ResourceType::Attr, "chartLabel", ResourceValue::Attr { format: Some("string".into()) }),
            item(
                ResourceType::Styleable,
                "ChartView",
                ResourceValue::Styleable {
                    attrs: vec![
                        AttrRef::parse("chartLabel"),
                        AttrRef::parse("android:gravity"),
                        AttrRef::parse("chartColor"),
                        AttrRef::parse("android:unknownThing"),
                    ],
                },
            ),
        ]);

        let mut framework = SymbolTable::new();
        framework.insert(ResourceType::Attr, "gravity", 0x010100af);
        ids.register_framework(&framework);

        // Mint in a fixed order so chartColor sorts first
        let color = ids.id_for(ResourceType::Attr, "chartColor");
        let label = ids.id_for(ResourceType::Attr, "chartLabel");

        let bytes = generator.generate_type(ResourceType::Styleable).unwrap().unwrap();
        let summary = ClassSummary::parse(&bytes).unwrap();

        let names: Vec<&str> = summary.fields.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "ChartView",
                "ChartView_android_gravity",
                "ChartView_android_unknownThing",
                "ChartView_chartColor",
                "ChartView_chartLabel",
            ]
        );
        assert_eq!(summary.field("ChartView").unwrap().descriptor, "[I");
        assert_eq!(summary.field("ChartView_android_unknownThing").unwrap().constant, Some(0));
        assert_eq!(summary.field("ChartView_android_gravity").unwrap().constant, Some(1));
        assert_eq!(summary.field("ChartView_chartColor").unwrap().constant, Some(2));
        assert_eq!(summary.field("ChartView_chartLabel").unwrap().constant, Some(3));

        let arrays = summary.static_int_arrays().unwrap();
        assert_eq!(
            arrays["ChartView"],
            vec![0, 0x010100af, color.as_i32(), label.as_i32()]
        );
    }

    #[test]
    fn test_output_is_deterministic() {
        let items = || {
            vec![
                item(ResourceType::String, "b", ResourceValue::text("B")),
                item(ResourceType::String, "a", ResourceValue::text("A")),
                item(ResourceType::Id, "root", ResourceValue::Id),
            ]
        };
        let (first, _) = generator(items());
        let (second, _) = generator(items());

        assert_eq!(first.generate_r().unwrap(), second.generate_r().unwrap());
        assert_eq!(
            first.generate_type(ResourceType::String).unwrap(),
            second.generate_type(ResourceType::String).unwrap()
        );
        assert_eq!(
            first.generate_type(ResourceType::String).unwrap(),
            first.generate_type(ResourceType::String).unwrap()
        );
    }

    #[test]
    fn test_source_file_can_be_disabled() {
        let config = RClassConfig {
            class_file_major_version: 55,
            emit_source_file: false,
        };
        let generator = RClassGenerator::new(
            "a.b",
            repository(vec![item(ResourceType::Bool, "flag", ResourceValue::text("true"))]),
            Arc::new(IdAllocator::default()),
            &config,
        );
        let summary = ClassSummary::parse(&generator.generate_r().unwrap()).unwrap();
        assert_eq!(summary.major_version, 55);
        assert!(summary.source_file.is_none());
    }
}
