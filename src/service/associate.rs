//! Composite actions over a main resource and one of its associations.

use crate::error::{ActionError, ActionResult};
use crate::input::{ActionInput, AssociationInput};
use crate::resource::{AssociationSpec, ResourceSpec};
use crate::service::actions::Actions;
use crate::service::scope::ActionScope;
use crate::store::{Record, Store};
use crate::value::value_in;

struct Participants<'s, 'i, 'a, Tx> {
    main: &'s ResourceSpec,
    association: &'s ResourceSpec,
    name: &'s str,
    main_input: &'i ActionInput<'a, Tx>,
    association_input: &'i ActionInput<'a, Tx>,
}

/// Both specs, both inputs and the association name must be given.
fn participants<'s, 'i, 'a, Tx>(
    spec: &'s AssociationSpec,
    input: &'i AssociationInput<'a, Tx>,
) -> ActionResult<Participants<'s, 'i, 'a, Tx>> {
    match (
        &spec.main,
        &spec.association,
        &input.main,
        &input.association,
        spec.association_name.as_deref().filter(|n| !n.is_empty()),
    ) {
        (Some(main), Some(association), Some(main_input), Some(association_input), Some(name)) => Ok(Participants {
            main,
            association,
            name,
            main_input,
            association_input,
        }),
        _ => {
            let mut missing = Vec::new();
            if spec.main.is_none() {
                missing.push("spec.main");
            }
            if spec.association.is_none() {
                missing.push("spec.association");
            }
            if input.main.is_none() {
                missing.push("input.main");
            }
            if input.association.is_none() {
                missing.push("input.association");
            }
            if spec.association_name.as_deref().map_or(true, str::is_empty) {
                missing.push("spec.associationName");
            }
            Err(ActionError::InvalidAssociationProperties(
                missing.into_iter().map(String::from).collect(),
            ))
        }
    }
}

impl<S: Store> Actions<S> {
    /// Fetch main (with `name` loaded) and associated under one scope, both concurrently.
    async fn fetch_pair<'a>(
        &self,
        parts: &Participants<'_, '_, 'a, S::Scope>,
        scope: &S::Scope,
    ) -> ActionResult<(Record, Record)> {
        let mut main_input = parts.main_input.scoped(scope);
        main_input.relations = Some(vec![parts.name.to_string()]);
        let association_input = parts.association_input.scoped(scope);
        tokio::try_join!(
            self.fetch_item(parts.main, &main_input),
            self.fetch_item(parts.association, &association_input),
        )
    }

    /// Link the associated record to the main record's relation. Returns the main record
    /// with the linked record appended to that relation.
    pub async fn add_associated_item(
        &self,
        spec: &AssociationSpec,
        input: &AssociationInput<'_, S::Scope>,
    ) -> ActionResult<Record> {
        self.logged(async {
            let parts = participants(spec, input)?;
            let inbound = input.transacting.or(parts.main_input.transacting);
            let scope = ActionScope::enter(&self.store, inbound).await?;
            let result = async {
                let (mut main, associated) = self.fetch_pair(&parts, scope.handle()).await?;
                tracing::debug!(
                    action = "addAssociatedItem",
                    model = %parts.main.model_name,
                    association = %parts.name,
                    "attaching"
                );
                self.store
                    .attach(scope.handle(), &parts.main.model_name, &main, parts.name, &associated)
                    .await
                    .map_err(ActionError::third_party)?;
                main.push_related(parts.name, associated);
                Ok(main)
            }
            .await;
            scope.finish(&self.store, result).await
        })
        .await
    }

    /// The associated record when it is linked to the main record; 404 otherwise.
    pub async fn has_associated_item(
        &self,
        spec: &AssociationSpec,
        input: &AssociationInput<'_, S::Scope>,
    ) -> ActionResult<Record> {
        self.logged(async {
            let parts = participants(spec, input)?;
            let inbound = input.transacting.or(parts.main_input.transacting);
            let scope = ActionScope::enter(&self.store, inbound).await?;
            let result = async {
                let (main, associated) = self.fetch_pair(&parts, scope.handle()).await?;
                let id_attribute = self
                    .store
                    .model(&parts.association.model_name)
                    .map(|m| m.id_attribute.as_str())
                    .unwrap_or("id");
                let linked = match (associated.get(id_attribute), main.related(parts.name)) {
                    (Some(id), Some(related)) => value_in(id, &related.pluck(id_attribute)),
                    _ => false,
                };
                tracing::debug!(
                    action = "hasAssociatedItem",
                    model = %parts.main.model_name,
                    association = %parts.name,
                    linked,
                    "checked"
                );
                if linked {
                    Ok(associated)
                } else {
                    Err(ActionError::AssociationDoesNotExist(parts.association.model_name.clone()))
                }
            }
            .await;
            scope.release(&self.store, result).await
        })
        .await
    }
}
