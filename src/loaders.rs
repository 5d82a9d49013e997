//! Model loading
//!
//! Builds a [`SchemaSet`] from a JSON description of resolved declarations.
//! Names use Clark notation (`{namespace}local`). A particle object carries
//! optional `minOccurs`/`maxOccurs` (numbers or strings, `"unbounded"`) and
//! exactly one term key:
//!
//! ```json
//! {
//!   "targetNamespace": "urn:example",
//!   "elements": [
//!     { "name": "{urn:example}root", "content": {
//!         "sequence": [
//!           { "ref": "{urn:example}item", "maxOccurs": "unbounded" },
//!           { "element": { "name": "note", "type": "atomic" }, "minOccurs": 0 },
//!           { "any": { "namespace": "##other" } }
//!         ] } },
//!     { "name": "{urn:example}item", "type": "atomic", "nillable": true }
//!   ],
//!   "groups": { "{urn:example}shared": { "choice": [] } }
//! }
//! ```

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use tracing::debug;

use crate::error::{Error, Result, SchemaStructureError};
use crate::limits::Limits;
use crate::model::{
    parse_occurs, Compositor, ElementDecl, ElementId, ModelGroup, NamespaceConstraint, Particle,
    ProcessContents, SchemaSet, Term, TypeInfo, TypeKind, Wildcard,
};
use crate::namespaces::QName;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ModelDef {
    #[serde(default)]
    target_namespace: Option<String>,
    #[serde(default)]
    elements: Vec<ElementDef>,
    #[serde(default)]
    groups: IndexMap<QName, ParticleDef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ElementDef {
    name: QName,
    #[serde(default, rename = "type")]
    kind: Option<TypeKind>,
    #[serde(default)]
    type_name: Option<QName>,
    #[serde(default)]
    mixed: bool,
    #[serde(default)]
    content: Option<ParticleDef>,
    #[serde(default, rename = "abstract")]
    abstract_element: bool,
    #[serde(default)]
    nillable: bool,
    #[serde(default)]
    substitution_group: Option<QName>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct ParticleDef {
    #[serde(default)]
    min_occurs: Option<OccursValue>,
    #[serde(default)]
    max_occurs: Option<OccursValue>,
    #[serde(default)]
    element: Option<Box<ElementDef>>,
    #[serde(default, rename = "ref")]
    reference: Option<QName>,
    #[serde(default)]
    sequence: Option<Vec<ParticleDef>>,
    #[serde(default)]
    choice: Option<Vec<ParticleDef>>,
    #[serde(default)]
    all: Option<Vec<ParticleDef>>,
    #[serde(default)]
    group: Option<QName>,
    #[serde(default)]
    any: Option<AnyDef>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct AnyDef {
    #[serde(default)]
    namespace: Option<String>,
    #[serde(default)]
    not_namespace: Option<String>,
    #[serde(default)]
    process_contents: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OccursValue {
    Number(u32),
    Text(String),
}

impl OccursValue {
    fn to_text(&self) -> String {
        match self {
            OccursValue::Number(n) => n.to_string(),
            OccursValue::Text(s) => s.clone(),
        }
    }
}

/// Loader for JSON model descriptions
#[derive(Debug, Default)]
pub struct ModelLoader {
    limits: Limits,
}

impl ModelLoader {
    /// Create a loader with default limits
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the limits carried by loaded schema sets
    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    /// Load a model from a JSON string
    pub fn load_str(&self, json: &str) -> Result<SchemaSet> {
        let def: ModelDef = serde_json::from_str(json)
            .map_err(|e| Error::Model(format!("Invalid model description: {}", e)))?;

        let mut builder = Builder {
            schema: SchemaSet::with_limits(def.target_namespace.as_deref(), self.limits),
            target_namespace: def.target_namespace.clone(),
        };
        for (name, group) in def.groups {
            let group = builder.model_group(group, &name)?;
            builder.schema.add_group(name, group)?;
        }
        for element in def.elements {
            let decl = builder.declaration(element)?;
            builder.schema.add_global(decl)?;
        }

        debug!(
            target_namespace = ?def.target_namespace,
            elements = builder.schema.len(),
            "Loaded schema model"
        );
        Ok(builder.schema)
    }

    /// Load a model from a JSON file
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<SchemaSet> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| {
            Error::Model(format!("Failed to read model '{}': {}", path.display(), e))
        })?;
        self.load_str(&json)
    }
}

/// Load a model from a JSON string with default limits
pub fn load_model_str(json: &str) -> Result<SchemaSet> {
    ModelLoader::new().load_str(json)
}

/// Load a model from a JSON file with default limits
pub fn load_model_file(path: impl AsRef<Path>) -> Result<SchemaSet> {
    ModelLoader::new().load_file(path)
}

struct Builder {
    schema: SchemaSet,
    target_namespace: Option<String>,
}

impl Builder {
    fn declaration(&mut self, def: ElementDef) -> Result<ElementDecl> {
        let content = def
            .content
            .map(|content| self.particle(content))
            .transpose()?;
        let kind = def.kind.unwrap_or(if content.is_some() {
            TypeKind::Complex
        } else {
            TypeKind::Atomic
        });

        let mut type_info = TypeInfo::new(kind);
        type_info.name = def.type_name;
        type_info.mixed = def.mixed;
        Ok(ElementDecl {
            name: def.name,
            type_info,
            content,
            abstract_element: def.abstract_element,
            nillable: def.nillable,
            substitution_group: def.substitution_group,
        })
    }

    fn local(&mut self, def: ElementDef) -> Result<ElementId> {
        let decl = self.declaration(def)?;
        Ok(self.schema.add_local(decl))
    }

    fn particle(&mut self, def: ParticleDef) -> Result<Particle> {
        let min = def.min_occurs.as_ref().map(OccursValue::to_text);
        let max = def.max_occurs.as_ref().map(OccursValue::to_text);
        let occurs = parse_occurs(min.as_deref(), max.as_deref())?;

        let terms = [
            def.element.is_some(),
            def.reference.is_some(),
            def.sequence.is_some(),
            def.choice.is_some(),
            def.all.is_some(),
            def.group.is_some(),
            def.any.is_some(),
        ];
        if terms.iter().filter(|&&t| t).count() != 1 {
            return Err(Error::Model(
                "a particle needs exactly one of element, ref, sequence, choice, all, group, any"
                    .to_string(),
            ));
        }

        let term = if let Some(element) = def.element {
            Term::Element(self.local(*element)?)
        } else if let Some(name) = def.reference {
            Term::ElementRef(name)
        } else if let Some(particles) = def.sequence {
            Term::Group(self.members(Compositor::Sequence, particles)?)
        } else if let Some(particles) = def.choice {
            Term::Group(self.members(Compositor::Choice, particles)?)
        } else if let Some(particles) = def.all {
            Term::Group(self.members(Compositor::All, particles)?)
        } else if let Some(name) = def.group {
            Term::GroupRef(name)
        } else if let Some(any) = def.any {
            Term::Any(self.wildcard(any)?)
        } else {
            return Err(Error::Model("particle has no term".to_string()));
        };
        Ok(Particle::new(term, occurs))
    }

    fn members(&mut self, compositor: Compositor, particles: Vec<ParticleDef>) -> Result<ModelGroup> {
        let particles = particles
            .into_iter()
            .map(|particle| self.particle(particle))
            .collect::<Result<Vec<_>>>()?;
        Ok(ModelGroup::new(compositor, particles))
    }

    /// A named group definition: a bare sequence, choice or all
    fn model_group(&mut self, def: ParticleDef, name: &QName) -> Result<ModelGroup> {
        if def.min_occurs.is_some() || def.max_occurs.is_some() {
            return Err(SchemaStructureError::new("named model groups carry no occurrence bounds")
                .with_component(name.to_string())
                .into());
        }
        match self.particle(def)?.term {
            Term::Group(group) => Ok(group),
            _ => Err(SchemaStructureError::new(
                "named model group must be a sequence, choice or all",
            )
            .with_component(name.to_string())
            .into()),
        }
    }

    fn wildcard(&self, def: AnyDef) -> Result<Wildcard> {
        let tns = self.target_namespace.as_deref();
        let constraint = match (&def.namespace, &def.not_namespace) {
            (Some(_), Some(_)) => {
                return Err(SchemaStructureError::new(
                    "namespace and notNamespace are mutually exclusive",
                )
                .into())
            }
            (Some(value), None) => NamespaceConstraint::from_namespace_attr(value, tns)?,
            (None, Some(value)) => NamespaceConstraint::from_not_namespace_attr(value, tns)?,
            (None, None) => NamespaceConstraint::Any,
        };
        let process_contents = match def.process_contents.as_deref() {
            Some(value) => ProcessContents::parse(value).ok_or_else(|| {
                SchemaStructureError::new("invalid processContents value").with_component(value)
            })?,
            None => ProcessContents::default(),
        };
        Ok(Wildcard::new(constraint, tns).with_process_contents(process_contents))
    }
}
