//! Reference to another model's entity.

use crate::error::{CoreError, CoreResult};
use crate::field::traits::{Field, FieldOptions, IndexKind};
use crate::field::value::FieldValue;
use crate::model::{Entity, ModelType, Registry};
use std::sync::{Arc, OnceLock, Weak};

#[derive(Debug, Clone)]
enum Target {
    Model(Arc<ModelType>),
    /// Bound once after creation; shared by every clone of the field.
    Deferred(Arc<OnceLock<Weak<ModelType>>>),
}

/// Stores the id of an entity of the target model.
///
/// Reading the field looks the id up in the target model's identity map,
/// registering a fresh (unloaded) entity if it is not there yet.
///
/// A model that references itself cannot name its target before it is
/// built; declare the field with [`Reference::deferred`] and bind it once
/// the model exists:
///
/// ```rust,ignore
/// let parent = Reference::deferred("parent").indexed();
/// let nodes = ModelType::builder("Node").field(&parent).register(&registry)?;
/// parent.bind(&nodes)?;
/// ```
#[derive(Debug, Clone)]
pub struct Reference {
    options: FieldOptions<Entity>,
    target: Target,
}

impl Reference {
    /// Creates a reference to `target` stored under `name`.
    pub fn new(name: impl Into<String>, target: &Arc<ModelType>) -> Self {
        Self {
            options: FieldOptions::new(name),
            target: Target::Model(Arc::clone(target)),
        }
    }

    /// Creates a reference whose target is bound later with
    /// [`Reference::bind`] or [`Reference::bind_named`].
    pub fn deferred(name: impl Into<String>) -> Self {
        Self {
            options: FieldOptions::new(name),
            target: Target::Deferred(Arc::new(OnceLock::new())),
        }
    }

    /// Binds a deferred reference to `target`.
    ///
    /// The binding is shared with every clone of this field, including the
    /// copy held by the model it was declared on. The target is held weakly.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the reference was created
    /// with a target or is already bound.
    pub fn bind(&self, target: &Arc<ModelType>) -> CoreResult<()> {
        match &self.target {
            Target::Deferred(slot) => slot.set(Arc::downgrade(target)).map_err(|_| {
                CoreError::invalid_operation(format!("reference {} is already bound", self.name()))
            }),
            Target::Model(_) => Err(CoreError::invalid_operation(format!(
                "reference {} already has a target",
                self.name()
            ))),
        }
    }

    /// Binds a deferred reference to the model registered as `model`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if `registry` has no such
    /// model, plus the errors of [`Reference::bind`].
    pub fn bind_named(&self, registry: &Registry, model: &str) -> CoreResult<()> {
        let target = registry.get(model).ok_or_else(|| {
            CoreError::invalid_operation(format!("model {model} is not registered"))
        })?;
        self.bind(&target)
    }

    /// The referenced model.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] for a deferred reference that
    /// is unbound or whose target was dropped.
    pub fn target(&self) -> CoreResult<Arc<ModelType>> {
        match &self.target {
            Target::Model(model) => Ok(Arc::clone(model)),
            Target::Deferred(slot) => slot.get().and_then(Weak::upgrade).ok_or_else(|| {
                CoreError::invalid_operation(format!("reference {} has no target", self.name()))
            }),
        }
    }

    /// Stages a write of a raw target id.
    pub fn write_id(&self, entity: &Entity, id: &str) {
        entity.set(self.name(), id);
    }
}

impl Field for Reference {
    type Value = Entity;

    fn options(&self) -> &FieldOptions<Entity> {
        &self.options
    }

    fn options_mut(&mut self) -> &mut FieldOptions<Entity> {
        &mut self.options
    }

    fn index_kind(&self) -> IndexKind {
        IndexKind::Exact
    }

    fn to_storage(&self, value: &Entity) -> CoreResult<String> {
        let target = self.target()?;
        if !Arc::ptr_eq(value.model(), &target) {
            return Err(CoreError::validation(
                self.name(),
                format!(
                    "expected a {} entity, got {}",
                    target.name(),
                    value.model().name()
                ),
            ));
        }
        Ok(value.id().to_string())
    }

    fn from_storage(&self, raw: &str) -> CoreResult<Entity> {
        Ok(self.target()?.lookup(raw))
    }

    fn to_field_value(&self, value: Entity) -> FieldValue {
        FieldValue::Reference(value)
    }
}
